//! Configuration validation.

use super::Config;
use crate::core::DestinationKind;
use crate::error::{MigrateError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Source validation
    if config.source.table.is_empty() {
        return Err(MigrateError::Config("source.table is required".into()));
    }
    if config.source.r#type != "maxcompute" {
        return Err(MigrateError::Config(format!(
            "source.type must be 'maxcompute', got '{}'",
            config.source.r#type
        )));
    }

    // Destination validation
    match config.destination.r#type {
        DestinationKind::Relational => {
            let mysql = config.destination.mysql.as_ref().ok_or_else(|| {
                MigrateError::Config("destination.mysql is required for a relational destination".into())
            })?;
            if mysql.host.is_empty() {
                return Err(MigrateError::Config("destination.mysql.host is required".into()));
            }
            if mysql.database.is_empty() {
                return Err(MigrateError::Config(
                    "destination.mysql.database is required".into(),
                ));
            }
            if mysql.user.is_empty() {
                return Err(MigrateError::Config("destination.mysql.user is required".into()));
            }
            if let Some(0) = mysql.max_connections {
                return Err(MigrateError::Config(
                    "destination.mysql.max_connections must be at least 1".into(),
                ));
            }
        }
        DestinationKind::Analytical => {
            if config.destination.dataset.is_empty() {
                return Err(MigrateError::Config("destination.dataset is required".into()));
            }
        }
    }

    // Run validation - only check if explicitly set
    if let Some(0) = config.run.batch_size {
        return Err(MigrateError::Config("run.batch_size must be at least 1".into()));
    }

    if config
        .mappings
        .tables
        .iter()
        .any(|t| t.source_table.trim().is_empty())
    {
        return Err(MigrateError::Config(
            "mappings.tables[].source_table must not be empty".into(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        CompatConfig, DestinationConfig, MappingsConfig, MysqlConfig, NullPolicy, RunConfig,
        SourceConfig,
    };

    fn valid_config() -> Config {
        Config {
            source: SourceConfig {
                r#type: "maxcompute".to_string(),
                project: "sales".to_string(),
                endpoint: "http://service.example.com/api".to_string(),
                access_id: "id".to_string(),
                secret_key: "key".to_string(),
                table: "orders".to_string(),
            },
            destination: DestinationConfig {
                r#type: DestinationKind::Relational,
                table: None,
                project: String::new(),
                dataset: String::new(),
                mysql: Some(MysqlConfig {
                    host: "localhost".to_string(),
                    port: 3306,
                    user: "loader".to_string(),
                    password: "password".to_string(),
                    database: "dw".to_string(),
                    max_connections: None,
                }),
            },
            run: RunConfig::default(),
            compat: CompatConfig::default(),
            mappings: MappingsConfig::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(validate(&valid_config()).is_ok());
    }

    #[test]
    fn test_missing_source_table() {
        let mut config = valid_config();
        config.source.table = "".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_wrong_source_type() {
        let mut config = valid_config();
        config.source.r#type = "hive".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_relational_requires_mysql_block() {
        let mut config = valid_config();
        config.destination.mysql = None;
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("destination.mysql"));
    }

    #[test]
    fn test_missing_mysql_host() {
        let mut config = valid_config();
        if let Some(m) = config.destination.mysql.as_mut() {
            m.host.clear();
        }
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("destination.mysql.host is required"));
    }

    #[test]
    fn test_analytical_requires_dataset() {
        let mut config = valid_config();
        config.destination.r#type = DestinationKind::Analytical;
        assert!(validate(&config).is_err());
        config.destination.dataset = "raw".to_string();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_zero_batch_size() {
        let mut config = valid_config();
        config.run.batch_size = Some(0);
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_fill_policy_without_sentinel_is_valid() {
        let mut config = valid_config();
        config.compat.null_on_non_nullable = NullPolicy::Fill;
        assert!(validate(&config).is_ok());
        config.compat.null_fill_sentinel = Some("N/A".to_string());
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_table_mapping_needs_source_table() {
        let mut config = valid_config();
        config.mappings.tables.push(crate::config::TableMapping {
            source_table: " ".to_string(),
            plan: Default::default(),
        });
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_source_config_debug_redacts_secret() {
        let mut config = valid_config();
        config.source.secret_key = "super_secret_key_123".to_string();
        let debug_output = format!("{:?}", config.source);
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_secret_key_123"));
    }

    #[test]
    fn test_mysql_config_debug_redacts_password() {
        let mut config = valid_config();
        if let Some(m) = config.destination.mysql.as_mut() {
            m.password = "super_secret_password_456".to_string();
        }
        let debug_output = format!("{:?}", config.destination);
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_secret_password_456"));
    }
}
