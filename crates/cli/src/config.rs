//! Command-line configuration, read from the environment

use elif_migrations::{ConfigError, ConfigSource, MigrationConfig};
use std::collections::HashMap;
use std::env;

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Only commands that touch the ledger need it
    pub database_url: Option<String>,
    pub migrations: MigrationConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "compact" => Ok(LogFormat::Compact),
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => Err(ConfigError::InvalidValue {
                field: "LOG_FORMAT".to_string(),
                value: s.to_string(),
                expected: "compact, pretty, or json".to_string(),
            }),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = env::var("DATABASE_URL").ok().filter(|url| !url.is_empty());
        let migrations = MigrationConfig::from_env()?;
        let logging = LoggingConfig::from_env()?;

        let config = AppConfig {
            database_url,
            migrations,
            logging,
        };
        config.migrations.validate()?;
        Ok(config)
    }

    pub fn database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .ok_or_else(|| ConfigError::MissingEnvVar {
                var: "DATABASE_URL".to_string(),
            })
    }

    pub fn config_sources(&self) -> HashMap<String, ConfigSource> {
        let mut sources = self.migrations.config_sources();
        sources.insert(
            "database_url".to_string(),
            ConfigSource::EnvVar("DATABASE_URL".to_string()),
        );
        sources.insert("log_level".to_string(), source_of("LOG_LEVEL", "info"));
        sources.insert("log_format".to_string(), source_of("LOG_FORMAT", "compact"));
        sources
    }
}

impl LoggingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let level = get_env_or_default("LOG_LEVEL", "info");
        let format = get_env_or_default("LOG_FORMAT", "compact").parse()?;

        Ok(LoggingConfig { level, format })
    }
}

fn get_env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn source_of(key: &str, default: &str) -> ConfigSource {
    if env::var(key).is_ok() {
        ConfigSource::EnvVar(key.to_string())
    } else {
        ConfigSource::Default(default.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::path::PathBuf;

    fn set_test_env() {
        env::set_var("DATABASE_URL", "postgres://localhost/app_test");
        env::set_var("MIGRATIONS_DIR", "db/migrations");
        env::set_var("LOG_LEVEL", "debug");
        env::set_var("LOG_FORMAT", "json");
    }

    fn clean_test_env() {
        env::remove_var("DATABASE_URL");
        env::remove_var("MIGRATIONS_DIR");
        env::remove_var("MIGRATIONS_TABLE");
        env::remove_var("MIGRATIONS_EXTENSION");
        env::remove_var("MIGRATIONS_VERBOSE");
        env::remove_var("LOG_LEVEL");
        env::remove_var("LOG_FORMAT");
    }

    #[test]
    #[serial]
    fn test_app_config_from_env() {
        set_test_env();

        let config = AppConfig::from_env().unwrap();

        assert_eq!(config.database_url().unwrap(), "postgres://localhost/app_test");
        assert_eq!(config.migrations.migrations_dir, PathBuf::from("db/migrations"));
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);

        clean_test_env();
    }

    #[test]
    #[serial]
    fn test_defaults_without_database_url() {
        clean_test_env();

        let config = AppConfig::from_env().unwrap();

        assert_eq!(config.logging.format, LogFormat::Compact);
        match config.database_url() {
            Err(ConfigError::MissingEnvVar { var }) => assert_eq!(var, "DATABASE_URL"),
            other => panic!("Expected MissingEnvVar error, got {:?}", other),
        }
    }

    #[test]
    #[serial]
    fn test_invalid_log_format() {
        clean_test_env();
        env::set_var("LOG_FORMAT", "xml");

        let result = AppConfig::from_env();
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));

        clean_test_env();
    }

    #[test]
    #[serial]
    fn test_config_sources() {
        clean_test_env();
        env::set_var("LOG_LEVEL", "warn");

        let sources = AppConfig::from_env().unwrap().config_sources();

        assert!(matches!(sources.get("log_level"), Some(ConfigSource::EnvVar(_))));
        assert!(matches!(sources.get("log_format"), Some(ConfigSource::Default(_))));

        clean_test_env();
    }
}
