//! Migration configuration
//!
//! Loaded from environment variables with defaults, then validated before use.

use regex::Regex;
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use thiserror::Error;

/// Configuration source information for debugging
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    EnvVar(String),
    Default(String),
}

/// Configuration for the migration system
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    /// Directory where migration files are stored
    pub migrations_dir: PathBuf,
    /// Table name for tracking applied versions
    pub migrations_table: String,
    /// File extension of migration files, without the dot
    pub extension: String,
    /// Print announcements while migrating
    pub verbose: bool,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            migrations_dir: PathBuf::from("db/migrate"),
            migrations_table: "schema_migrations".to_string(),
            extension: "sql".to_string(),
            verbose: true,
        }
    }
}

impl MigrationConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let migrations_dir = get_env_or_default(
            "MIGRATIONS_DIR",
            &defaults.migrations_dir.to_string_lossy(),
        );
        let migrations_table = get_env_or_default("MIGRATIONS_TABLE", &defaults.migrations_table);
        let extension = get_env_or_default("MIGRATIONS_EXTENSION", &defaults.extension);
        let verbose = get_env_or_default("MIGRATIONS_VERBOSE", "true");
        let verbose = parse_bool("verbose", &verbose)?;

        Ok(Self {
            migrations_dir: PathBuf::from(migrations_dir),
            migrations_table,
            extension: extension.trim_start_matches('.').to_string(),
            verbose,
        })
    }

    pub fn with_migrations_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.migrations_dir = dir.into();
        self
    }

    pub fn with_migrations_table(mut self, table: impl Into<String>) -> Self {
        self.migrations_table = table.into();
        self
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.migrations_dir.as_os_str().is_empty() {
            return Err(ConfigError::ValidationFailed {
                field: "migrations_dir".to_string(),
                reason: "Migrations directory cannot be empty".to_string(),
            });
        }

        if self.extension.is_empty()
            || !self.extension.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(ConfigError::InvalidValue {
                field: "extension".to_string(),
                value: self.extension.clone(),
                expected: "a non-empty alphanumeric file extension".to_string(),
            });
        }

        // The table name is interpolated into SQL
        let identifier = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").map_err(|e| {
            ConfigError::ParseError {
                message: e.to_string(),
            }
        })?;
        if !identifier.is_match(&self.migrations_table) {
            return Err(ConfigError::InvalidValue {
                field: "migrations_table".to_string(),
                value: self.migrations_table.clone(),
                expected: "a plain SQL identifier".to_string(),
            });
        }

        Ok(())
    }

    /// Get configuration source information for debugging
    pub fn config_sources(&self) -> HashMap<String, ConfigSource> {
        let mut sources = HashMap::new();
        for (field, var, default) in [
            ("migrations_dir", "MIGRATIONS_DIR", "db/migrate"),
            ("migrations_table", "MIGRATIONS_TABLE", "schema_migrations"),
            ("extension", "MIGRATIONS_EXTENSION", "sql"),
            ("verbose", "MIGRATIONS_VERBOSE", "true"),
        ] {
            let source = if env::var(var).is_ok() {
                ConfigSource::EnvVar(var.to_string())
            } else {
                ConfigSource::Default(default.to_string())
            };
            sources.insert(field.to_string(), source);
        }
        sources
    }
}

fn get_env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_bool(field: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
            expected: "true or false".to_string(),
        }),
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}")]
    MissingEnvVar { var: String },

    #[error("Invalid value for {field}: '{value}', expected {expected}")]
    InvalidValue {
        field: String,
        value: String,
        expected: String,
    },

    #[error("Validation failed for {field}: {reason}")]
    ValidationFailed { field: String, reason: String },

    #[error("Configuration parsing error: {message}")]
    ParseError { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clean_test_env() {
        env::remove_var("MIGRATIONS_DIR");
        env::remove_var("MIGRATIONS_TABLE");
        env::remove_var("MIGRATIONS_EXTENSION");
        env::remove_var("MIGRATIONS_VERBOSE");
    }

    #[test]
    #[serial]
    fn test_config_defaults() {
        clean_test_env();

        let config = MigrationConfig::from_env().unwrap();
        assert_eq!(config.migrations_dir, PathBuf::from("db/migrate"));
        assert_eq!(config.migrations_table, "schema_migrations");
        assert_eq!(config.extension, "sql");
        assert!(config.verbose);
        assert!(config.validate().is_ok());
        assert_eq!(
            config.config_sources().get("extension"),
            Some(&ConfigSource::Default("sql".to_string()))
        );
    }

    #[test]
    #[serial]
    fn test_config_from_env() {
        clean_test_env();
        env::set_var("MIGRATIONS_DIR", "mongodb/migrate");
        env::set_var("MIGRATIONS_TABLE", "applied_versions");
        env::set_var("MIGRATIONS_EXTENSION", ".rb");
        env::set_var("MIGRATIONS_VERBOSE", "off");

        let config = MigrationConfig::from_env().unwrap();
        assert_eq!(config.migrations_dir, PathBuf::from("mongodb/migrate"));
        assert_eq!(config.migrations_table, "applied_versions");
        assert_eq!(config.extension, "rb");
        assert!(!config.verbose);
        assert_eq!(
            config.config_sources().get("migrations_table"),
            Some(&ConfigSource::EnvVar("MIGRATIONS_TABLE".to_string()))
        );

        clean_test_env();
    }

    #[test]
    #[serial]
    fn test_invalid_verbose_flag() {
        clean_test_env();
        env::set_var("MIGRATIONS_VERBOSE", "loud");

        match MigrationConfig::from_env() {
            Err(ConfigError::InvalidValue { field, .. }) => assert_eq!(field, "verbose"),
            other => panic!("Expected InvalidValue error for verbose, got {:?}", other),
        }

        clean_test_env();
    }

    #[test]
    fn test_table_name_validation() {
        let config = MigrationConfig::default().with_migrations_table("users; DROP TABLE x");
        match config.validate() {
            Err(ConfigError::InvalidValue { field, .. }) => assert_eq!(field, "migrations_table"),
            other => panic!("Expected InvalidValue error for table, got {:?}", other),
        }
    }

    #[test]
    fn test_extension_validation() {
        let config = MigrationConfig::default().with_extension("");
        assert!(config.validate().is_err());

        let config = MigrationConfig::default().with_extension("rs");
        assert!(config.validate().is_ok());
    }
}
