//! Error types for the migration engine
//!
//! Discovery errors abort resolution before anything runs. Failures raised by
//! a unit during a ranged run come back wrapped in [`MigrationError::Canceled`],
//! which keeps the original error as its source.

use std::path::PathBuf;
use thiserror::Error;

use crate::config::ConfigError;
use crate::version::Version;

/// Result type alias for migration operations
pub type MigrationResult<T> = Result<T, MigrationError>;

/// Error types for migration operations
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Illegal name for migration file: {filename}\n\t(only lower case letters, numbers, and '_' allowed)")]
    IllegalName { filename: String },

    #[error("Multiple migrations have the version number {0}")]
    DuplicateVersion(Version),

    #[error("Multiple migrations have the name {0}")]
    DuplicateName(String),

    #[error("No migration with version number {0}")]
    UnknownVersion(Version),

    #[error("Irreversible migration: {0}")]
    Irreversible(String),

    #[error("An error has occurred in {name} ({version}), all later migrations canceled:\n\n{source}")]
    Canceled {
        version: Version,
        name: String,
        #[source]
        source: Box<MigrationError>,
    },

    #[error("No migration named {name} is registered (from {})", filename.display())]
    Unregistered { name: String, filename: PathBuf },

    #[error("Invalid migration syntax in {}: {message}", filename.display())]
    InvalidSyntax { filename: PathBuf, message: String },

    #[error(transparent)]
    Execution(#[from] anyhow::Error),

    #[error("Ledger error: {0}")]
    Ledger(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl MigrationError {
    /// Signal from a unit's down logic that it cannot be reverted
    pub fn irreversible(reason: impl Into<String>) -> Self {
        Self::Irreversible(reason.into())
    }

    /// Wrap a plain message as a unit failure
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution(anyhow::anyhow!(message.into()))
    }

    pub fn ledger(message: impl Into<String>) -> Self {
        Self::Ledger(message.into())
    }

    /// Wrap a unit failure so that it names the unit and the canceled run
    pub fn canceled(version: Version, name: impl Into<String>, source: MigrationError) -> Self {
        Self::Canceled {
            version,
            name: name.into(),
            source: Box::new(source),
        }
    }

    /// The error a unit originally raised, looking through cancellation
    pub fn root(&self) -> &MigrationError {
        match self {
            Self::Canceled { source, .. } => source.root(),
            other => other,
        }
    }

    /// Check if a unit refused to revert, even after cancellation wrapping
    pub fn is_irreversible(&self) -> bool {
        matches!(self.root(), Self::Irreversible(_))
    }

    /// Check if a ranged run was aborted by this error
    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled { .. })
    }

    /// Version of the unit that failed, when the error carries one
    pub fn failed_version(&self) -> Option<Version> {
        match self {
            Self::Canceled { version, .. } => Some(*version),
            _ => None,
        }
    }

    /// Check if the error is raised by catalog discovery
    pub fn is_discovery(&self) -> bool {
        matches!(
            self,
            Self::IllegalName { .. } | Self::DuplicateVersion(_) | Self::DuplicateName(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discovery_messages() {
        let err = MigrationError::DuplicateVersion(Version(20240101120000));
        assert_eq!(err.to_string(), "Multiple migrations have the version number 20240101120000");
        assert!(err.is_discovery());

        let err = MigrationError::DuplicateName("CreateUsers".to_string());
        assert_eq!(err.to_string(), "Multiple migrations have the name CreateUsers");

        let err = MigrationError::IllegalName { filename: "abc_foo.sql".to_string() };
        assert!(err.to_string().starts_with("Illegal name for migration file: abc_foo.sql"));
    }

    #[test]
    fn test_canceled_wraps_source() {
        let err = MigrationError::canceled(
            Version(2),
            "AddIndex",
            MigrationError::execution("relation does not exist"),
        );

        let message = err.to_string();
        assert!(message.contains("AddIndex (2)"));
        assert!(message.contains("all later migrations canceled"));
        assert!(message.ends_with("relation does not exist"));
        assert_eq!(err.failed_version(), Some(Version(2)));
        assert!(!err.is_irreversible());
    }

    #[test]
    fn test_irreversible_survives_wrapping() {
        let err = MigrationError::canceled(
            Version(7),
            "DropLegacy",
            MigrationError::irreversible("legacy data is gone"),
        );

        assert!(err.is_canceled());
        assert!(err.is_irreversible());
        assert!(matches!(err.root(), MigrationError::Irreversible(_)));
    }
}
