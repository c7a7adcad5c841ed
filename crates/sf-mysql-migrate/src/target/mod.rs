//! Target store abstraction.
//!
//! [`TargetStore`] is the complete DDL/DML contract the migration needs
//! from the target: five schema operations, single-row insert, and the
//! referential-integrity toggle. The production implementation is
//! [`MysqlTarget`]; tests provide in-process fakes.

mod mysql;

pub use mysql::MysqlTarget;

use async_trait::async_trait;

use crate::error::Result;
use crate::schema::ColumnSpec;

/// Write schema and data to the target database.
#[async_trait]
pub trait TargetStore: Send + Sync {
    /// Drop a table if it exists.
    async fn drop_table(&self, table: &str) -> Result<()>;

    /// Create a table with the given columns. The `Id` column becomes the
    /// primary key.
    async fn create_table(&self, table: &str, columns: &[ColumnSpec]) -> Result<()>;

    /// Add columns to an existing table in one batched alter.
    async fn add_columns(&self, table: &str, columns: &[ColumnSpec]) -> Result<()>;

    /// Add a named foreign-key constraint from `table.column` to the
    /// `Id` column of `ref_table`.
    async fn add_foreign_key(
        &self,
        table: &str,
        column: &str,
        ref_table: &str,
        constraint: &str,
    ) -> Result<()>;

    /// Toggle referential-integrity checking for this session.
    async fn set_foreign_key_checks(&self, enabled: bool) -> Result<()>;

    /// Insert one row with an explicit column list and positional values.
    /// `None` values are written as NULL.
    async fn insert_row(
        &self,
        table: &str,
        columns: &[String],
        values: Vec<Option<String>>,
    ) -> Result<()>;

    /// Close the connection pool.
    async fn close(&self);
}
