//! Error types for the migration library.

use std::time::Duration;
use thiserror::Error;

/// Main error type for migration operations.
///
/// Every fatal failure is attributable to a table and, for import
/// failures, to a row index within the artifact.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Object metadata could not be fetched from the source catalog.
    #[error("Metadata fetch failed for {object}: {message}")]
    MetadataFetch { object: String, message: String },

    /// A DDL statement failed on the target. Fatal for the run.
    #[error("DDL failed for table {table}: {message}\n  Statement: {statement}")]
    Ddl {
        table: String,
        statement: String,
        message: String,
    },

    /// Bulk export failed for a table (job failure or stream error).
    #[error("Export failed for table {table}: {message}")]
    Export { table: String, message: String },

    /// Bulk query job did not reach a terminal state within the bound.
    #[error("Export timed out for table {table} after {waited:?}")]
    ExportTimeout { table: String, waited: Duration },

    /// A row in an artifact could not be parsed. Row indexes are 1-based
    /// over data rows (the header row is row 0).
    #[error("Import parse error in {table} at row {row}: {message}")]
    ImportParse {
        table: String,
        row: u64,
        message: String,
    },

    /// A row insert failed on the target.
    #[error("Import write failed for {table} at row {row}: {message}")]
    ImportWrite {
        table: String,
        row: u64,
        message: String,
    },

    /// Source API transport error.
    #[error("Source API error: {0}")]
    Source(#[from] reqwest::Error),

    /// Target database connection or query error.
    #[error("Target database error: {0}")]
    Target(#[from] mysql_async::Error),

    /// IO error (artifact file operations).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV encode/decode error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl MigrateError {
    /// Create a MetadataFetch error.
    pub fn metadata_fetch(object: impl Into<String>, message: impl ToString) -> Self {
        MigrateError::MetadataFetch {
            object: object.into(),
            message: message.to_string(),
        }
    }

    /// Create a Ddl error carrying the failed statement.
    pub fn ddl(
        table: impl Into<String>,
        statement: impl Into<String>,
        message: impl ToString,
    ) -> Self {
        MigrateError::Ddl {
            table: table.into(),
            statement: statement.into(),
            message: message.to_string(),
        }
    }

    /// Create an Export error.
    pub fn export(table: impl Into<String>, message: impl ToString) -> Self {
        MigrateError::Export {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Create an ImportParse error.
    pub fn import_parse(table: impl Into<String>, row: u64, message: impl ToString) -> Self {
        MigrateError::ImportParse {
            table: table.into(),
            row,
            message: message.to_string(),
        }
    }

    /// Create an ImportWrite error.
    pub fn import_write(table: impl Into<String>, row: u64, message: impl ToString) -> Self {
        MigrateError::ImportWrite {
            table: table.into(),
            row,
            message: message.to_string(),
        }
    }

    /// Format error with full details including error chain.
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
