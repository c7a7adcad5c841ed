//! Configuration validation.

use super::Config;
use crate::error::{MigrateError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Source validation
    if config.source.login_url.is_empty() {
        return Err(MigrateError::Config("source.login_url is required".into()));
    }
    if config.source.username.is_empty() {
        return Err(MigrateError::Config("source.username is required".into()));
    }
    if config.source.client_id.is_empty() {
        return Err(MigrateError::Config("source.client_id is required".into()));
    }

    // Target validation
    if config.target.host.is_empty() {
        return Err(MigrateError::Config("target.host is required".into()));
    }
    if config.target.database.is_empty() {
        return Err(MigrateError::Config("target.database is required".into()));
    }
    if config.target.user.is_empty() {
        return Err(MigrateError::Config("target.user is required".into()));
    }

    // Migration validation
    if config.migration.include_objects.is_empty() {
        return Err(MigrateError::Config(
            "migration.include_objects must name at least one object".into(),
        ));
    }
    if let Some(0) = config.migration.poll_interval_secs {
        return Err(MigrateError::Config(
            "migration.poll_interval_secs must be at least 1".into(),
        ));
    }
    if config.migration.get_poll_timeout() < config.migration.get_poll_interval() {
        return Err(MigrateError::Config(
            "migration.poll_timeout_secs must not be smaller than poll_interval_secs".into(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MigrationConfig, SourceConfig, TargetConfig};

    fn valid_config() -> Config {
        Config {
            source: SourceConfig {
                login_url: "https://login.salesforce.com".to_string(),
                client_id: "client".to_string(),
                client_secret: "secret".to_string(),
                username: "user@example.com".to_string(),
                password: "password".to_string(),
                api_version: "59.0".to_string(),
            },
            target: TargetConfig {
                host: "localhost".to_string(),
                port: 3306,
                database: "sfdata".to_string(),
                user: "root".to_string(),
                password: "root".to_string(),
                max_connections: 8,
            },
            migration: MigrationConfig {
                include_objects: vec!["Account".to_string()],
                ..MigrationConfig::default()
            },
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(validate(&valid_config()).is_ok());
    }

    #[test]
    fn test_missing_login_url() {
        let mut config = valid_config();
        config.source.login_url = "".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_empty_allow_list_rejected() {
        let mut config = valid_config();
        config.migration.include_objects.clear();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_timeout_smaller_than_interval_rejected() {
        let mut config = valid_config();
        config.migration.poll_interval_secs = Some(30);
        config.migration.poll_timeout_secs = Some(10);
        assert!(validate(&config).is_err());
    }
}
