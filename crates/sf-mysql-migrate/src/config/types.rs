//! Configuration type definitions.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source catalog (Salesforce) configuration.
    pub source: SourceConfig,

    /// Target database (MySQL) configuration.
    pub target: TargetConfig,

    /// Migration behavior configuration.
    #[serde(default)]
    pub migration: MigrationConfig,
}

/// Source catalog configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Login endpoint, e.g. "https://login.salesforce.com".
    pub login_url: String,

    /// Connected-app consumer key.
    pub client_id: String,

    /// Connected-app consumer secret.
    pub client_secret: String,

    /// Username.
    pub username: String,

    /// Password (with security token appended if required by the org).
    pub password: String,

    /// REST API version (default: "59.0").
    #[serde(default = "default_api_version")]
    pub api_version: String,
}

impl std::fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceConfig")
            .field("login_url", &self.login_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("api_version", &self.api_version)
            .finish()
    }
}

/// Target database (MySQL) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 3306).
    #[serde(default = "default_mysql_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    pub password: String,

    /// Maximum pooled connections (default: 8).
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

impl std::fmt::Debug for TargetConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TargetConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

/// Migration behavior configuration.
///
/// Tunable fields use `Option<T>` to distinguish "not set" (use the
/// default) from "explicitly set".
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MigrationConfig {
    /// Objects to migrate. This inclusion allow-list is the sole
    /// selection mechanism; objects not named here are never touched.
    #[serde(default)]
    pub include_objects: Vec<String>,

    /// Directory for per-table CSV artifacts (default: "./sfData").
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: PathBuf,

    /// Bulk job poll interval in seconds (default: 5).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_interval_secs: Option<u64>,

    /// Maximum total wait for a bulk job in seconds (default: 600).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_timeout_secs: Option<u64>,

    /// Concurrent per-object describe calls (default: 4).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_concurrency: Option<usize>,

    /// Concurrent table create/alter statements (default: 4).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ddl_concurrency: Option<usize>,

    /// Concurrent bulk export jobs (default: 2).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export_concurrency: Option<usize>,

    /// Concurrent artifact imports. Within one artifact rows are always
    /// strictly sequential (default: 2).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub import_concurrency: Option<usize>,
}

impl MigrationConfig {
    pub fn get_poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.unwrap_or(5))
    }

    pub fn get_poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs.unwrap_or(600))
    }

    pub fn get_metadata_concurrency(&self) -> usize {
        self.metadata_concurrency.unwrap_or(4).max(1)
    }

    pub fn get_ddl_concurrency(&self) -> usize {
        self.ddl_concurrency.unwrap_or(4).max(1)
    }

    pub fn get_export_concurrency(&self) -> usize {
        self.export_concurrency.unwrap_or(2).max(1)
    }

    pub fn get_import_concurrency(&self) -> usize {
        self.import_concurrency.unwrap_or(2).max(1)
    }
}

// Default value functions for serde

fn default_api_version() -> String {
    "59.0".to_string()
}

fn default_mysql_port() -> u16 {
    3306
}

fn default_max_connections() -> usize {
    8
}

fn default_artifact_dir() -> PathBuf {
    PathBuf::from("./sfData")
}
