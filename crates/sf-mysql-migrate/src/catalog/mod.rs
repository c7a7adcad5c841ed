//! Metadata catalog: object discovery and per-object field describes.

use std::sync::Arc;

use futures::future::try_join_all;
use tokio::sync::Semaphore;
use tracing::{debug, info};

use crate::error::{MigrateError, Result};
use crate::source::{FieldDescriptor, SourceApi};

/// One object with its fetched field descriptors.
#[derive(Debug, Clone)]
pub struct ObjectMeta {
    /// Object API name.
    pub name: String,

    /// Field descriptors in describe order.
    pub fields: Vec<FieldDescriptor>,
}

/// Enumerates remote objects and fetches their field metadata.
pub struct Catalog {
    source: Arc<dyn SourceApi>,
    include: Vec<String>,
    concurrency: usize,
}

impl Catalog {
    /// Create a catalog over `source`, restricted to the `include`
    /// allow-list. The allow-list is the sole selection mechanism.
    pub fn new(source: Arc<dyn SourceApi>, include: Vec<String>, concurrency: usize) -> Self {
        Self {
            source,
            include,
            concurrency: concurrency.max(1),
        }
    }

    /// Enumerate catalog objects, keeping only allow-listed names.
    pub async fn list_objects(&self) -> Result<Vec<String>> {
        let sobjects = self.source.describe_global().await?;
        let names: Vec<String> = sobjects
            .into_iter()
            .filter(|o| self.include.iter().any(|name| name == &o.name))
            .map(|o| o.name)
            .collect();

        info!(
            "Catalog exposes {} of {} allow-listed objects",
            names.len(),
            self.include.len()
        );
        Ok(names)
    }

    /// Fetch the ordered field descriptors for one object.
    pub async fn describe_fields(&self, object: &str) -> Result<Vec<FieldDescriptor>> {
        debug!("Describing fields for {}", object);
        self.source
            .describe_object(object)
            .await
            .map_err(|e| MigrateError::metadata_fetch(object, e))
    }

    /// Discover objects and fetch all field metadata with bounded
    /// concurrency, preserving discovery order. Fails fast on the first
    /// describe error.
    pub async fn load_metadata(&self) -> Result<Vec<ObjectMeta>> {
        let names = self.list_objects().await?;
        let semaphore = Arc::new(Semaphore::new(self.concurrency));

        let fetches = names.into_iter().map(|name| {
            let semaphore = semaphore.clone();
            async move {
                let _permit = semaphore.acquire_owned().await.unwrap();
                let fields = self.describe_fields(&name).await?;
                debug!("Retrieved {} field descriptors for {}", fields.len(), name);
                Ok::<ObjectMeta, MigrateError>(ObjectMeta { name, fields })
            }
        });

        try_join_all(fetches).await
    }
}
