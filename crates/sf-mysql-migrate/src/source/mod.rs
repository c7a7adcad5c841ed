//! Source catalog abstraction: describe metadata and bulk query jobs.
//!
//! [`SourceApi`] is the seam between the migration pipeline and the remote
//! catalog. The production implementation is [`RestSource`]; tests provide
//! in-process fakes. The source session is passed into each component as a
//! value, never held as a global.

mod rest;

pub use rest::RestSource;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::Result;

/// One entry from catalog discovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SObjectInfo {
    /// Object API name.
    pub name: String,

    /// Whether the object supports queries.
    #[serde(default)]
    pub queryable: bool,

    /// Whether individual records can be retrieved.
    #[serde(default)]
    pub retrieveable: bool,
}

/// Remote metadata describing one field of an object.
///
/// Immutable once fetched; the describe call is the sole source of truth,
/// no descriptor is ever synthesized locally.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDescriptor {
    /// Field API name.
    #[serde(default)]
    pub name: String,

    /// Wire type tag, e.g. "string", "reference", "picklist".
    #[serde(rename = "type")]
    pub field_type: String,

    /// Declared length for string-like types.
    #[serde(default)]
    pub length: u32,

    /// Numeric precision.
    #[serde(default)]
    pub precision: u32,

    /// Numeric scale.
    #[serde(default)]
    pub scale: u32,

    /// Whether the field accepts null.
    #[serde(default)]
    pub nillable: bool,

    /// Possible target objects for reference fields, in declared order.
    #[serde(default)]
    pub reference_to: Vec<String>,

    /// Relationship name for reference fields.
    #[serde(default)]
    pub relationship_name: Option<String>,

    /// Whether the reference may point at more than one object type.
    #[serde(default)]
    pub polymorphic_foreign_key: bool,
}

/// State of an asynchronous bulk query job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryJobState {
    /// Job accepted, not yet running.
    Queued,
    /// Job running.
    InProgress,
    /// Results are ready to stream.
    Complete,
    /// Job failed with a remote error message.
    Failed(String),
    /// Job was aborted on the remote side.
    Aborted,
}

/// A streamed bulk query result set.
///
/// `columns` is the header in result order; `rows` yields one record per
/// result row through a bounded channel, so memory stays bounded by the
/// channel capacity rather than the result size.
pub struct ResultStream {
    /// Column names in result order.
    pub columns: Vec<String>,

    /// Row values, positionally matching `columns`.
    pub rows: mpsc::Receiver<Result<Vec<String>>>,
}

/// Remote catalog and bulk query operations.
#[async_trait]
pub trait SourceApi: Send + Sync {
    /// Enumerate all objects exposed by the catalog.
    async fn describe_global(&self) -> Result<Vec<SObjectInfo>>;

    /// Fetch the ordered field descriptors for one object.
    async fn describe_object(&self, object: &str) -> Result<Vec<FieldDescriptor>>;

    /// Submit a bulk query job; returns the job id.
    async fn submit_query_job(&self, soql: &str) -> Result<String>;

    /// Poll the state of a bulk query job.
    async fn query_job_state(&self, job_id: &str) -> Result<QueryJobState>;

    /// Open the result stream of a completed bulk query job.
    async fn open_results(&self, job_id: &str) -> Result<ResultStream>;
}
