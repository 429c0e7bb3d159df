//! # elif-migrations: Versioned Migrations for elif.rs
//!
//! Ordered, versioned, bidirectional migrations with a persistent record of
//! what has been applied.
//!
//! Migration files live in one directory and are named
//! `<version>_<name>[.<scope>].<ext>`. The [`MigrationRunner`] resolves them
//! into a [`MigrationCatalog`], compares it against a [`Ledger`] of applied
//! versions, and runs the difference in order through a [`Migrator`]. Units
//! bind their executable logic lazily through a [`MigrationLoader`]: SQL files
//! via [`SqlFileLoader`], compiled units via a [`Registry`].

pub mod catalog;
pub mod config;
pub mod copier;
pub mod definitions;
pub mod error;
pub mod generator;
pub mod ledger;
pub mod loader;
pub mod migrator;
pub mod reporter;
pub mod runner;
pub mod sql;
pub mod unit;
pub mod version;

pub use catalog::{camelize, parse_filename, MigrationCatalog, MigrationProxy, MigrationSource};
pub use config::{ConfigError, ConfigSource, MigrationConfig};
pub use copier::Copier;
pub use definitions::{Direction, MigrationRecord, MigrationRunResult, MigrationStatus, StatusEntry};
pub use error::{MigrationError, MigrationResult};
pub use generator::{create_migration, next_migration_number};
pub use ledger::{Ledger, MemoryLedger, PgLedger};
pub use loader::{MigrationLoader, Registry};
pub use migrator::Migrator;
pub use reporter::{CapturedOutput, Reporter, RowCount};
pub use runner::MigrationRunner;
pub use sql::{split_sql_statements, SqlExecutor, SqlFileLoader, SqlMigration};
pub use unit::{Migration, MigrationContext};
pub use version::{next_number, Version};

// Units implement the async trait through this re-export
pub use async_trait::async_trait;
