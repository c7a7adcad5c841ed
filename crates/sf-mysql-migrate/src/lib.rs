//! # sf-mysql-migrate
//!
//! Migrate a Salesforce object catalog into MySQL.
//!
//! The migration runs as a strictly ordered sequence of phases:
//!
//! 1. **Metadata** — enumerate the allow-listed objects and fetch their
//!    field descriptors from the source describe API
//! 2. **Schema synthesis** — map field descriptors to MySQL column
//!    specifications, resolving lookup relationships to foreign keys
//! 3. **DDL** — drop/create all tables, then add foreign-key columns and
//!    named constraints behind a global barrier
//! 4. **Export** — one asynchronous bulk query job per table, streamed
//!    into a per-table CSV artifact
//! 5. **Import** — stream each artifact into MySQL, one insert per row,
//!    with foreign-key checking disabled for the duration
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sf_mysql_migrate::{Config, MysqlTarget, Orchestrator, RestSource};
//!
//! #[tokio::main]
//! async fn main() -> sf_mysql_migrate::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let source = Arc::new(RestSource::login(&config.source).await?);
//!     let target = Arc::new(MysqlTarget::connect(&config.target).await?);
//!     let result = Orchestrator::new(config, source, target).run().await?;
//!     println!("Imported {} rows", result.rows_imported);
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod config;
pub mod ddl;
pub mod error;
pub mod export;
pub mod import;
pub mod orchestrator;
pub mod schema;
pub mod source;
pub mod target;

// Re-exports for convenient access
pub use catalog::{Catalog, ObjectMeta};
pub use config::{Config, MigrationConfig, SourceConfig, TargetConfig};
pub use error::{MigrateError, Result};
pub use orchestrator::{MigrationResult, Orchestrator, Phase};
pub use schema::{ColumnSpec, FieldType, TableSpec};
pub use source::{FieldDescriptor, RestSource, SObjectInfo, SourceApi};
pub use target::{MysqlTarget, TargetStore};
