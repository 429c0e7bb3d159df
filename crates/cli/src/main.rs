mod commands;
mod config;
mod logging;

use clap::{Parser, Subcommand};
use commands::migrate;
use elif_migrations::Direction;
use std::path::PathBuf;

use crate::config::AppConfig;

#[derive(Parser)]
#[command(name = "elif-migrate")]
#[command(about = "Versioned database migrations for elif.rs applications")]
struct Cli {
    /// Migrations directory (overrides MIGRATIONS_DIR)
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    /// Suppress migration announcements
    #[arg(long, short, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Migrate to a version, or apply every pending migration
    Migrate {
        /// Target version; lower than the current version migrates down
        #[arg(long)]
        version: Option<u64>,
    },

    /// Apply exactly one migration
    #[command(name = "migrate:up")]
    MigrateUp {
        /// Version of the migration to apply
        #[arg(long)]
        version: u64,
    },

    /// Revert exactly one migration
    #[command(name = "migrate:down")]
    MigrateDown {
        /// Version of the migration to revert
        #[arg(long)]
        version: u64,
    },

    /// Revert the latest applied migrations
    Rollback {
        /// Number of migrations to revert
        #[arg(long, default_value = "1", value_parser = clap::value_parser!(u64).range(1..))]
        step: u64,
    },

    /// Apply the migrations following the current one
    Forward {
        /// Number of migrations to apply
        #[arg(long, default_value = "1", value_parser = clap::value_parser!(u64).range(1..))]
        step: u64,
    },

    /// Show applied, pending and orphaned migrations
    #[command(name = "migrate:status")]
    MigrateStatus {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the current schema version
    #[command(name = "migrate:version")]
    MigrateVersion,

    /// Create a new migration file
    #[command(name = "migrate:make")]
    MigrateMake {
        /// Migration name (e.g., create_users or CreateUsers)
        name: String,
    },

    /// Copy migrations from other directories into this one
    #[command(name = "migrate:copy")]
    MigrateCopy {
        /// Source as scope=path; may be repeated
        #[arg(long = "from", required = true, value_parser = migrate::parse_source)]
        sources: Vec<(String, PathBuf)>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::from_env()?;
    logging::init_logging(&config.logging)?;

    if let Some(dir) = cli.dir {
        config.migrations.migrations_dir = dir;
    }
    if cli.quiet {
        config.migrations.verbose = false;
    }

    match cli.command {
        Commands::Migrate { version } => migrate::migrate(&config, version).await?,
        Commands::MigrateUp { version } => migrate::run(&config, Direction::Up, version).await?,
        Commands::MigrateDown { version } => {
            migrate::run(&config, Direction::Down, version).await?
        }
        Commands::Rollback { step } => migrate::rollback(&config, step as usize).await?,
        Commands::Forward { step } => migrate::forward(&config, step as usize).await?,
        Commands::MigrateStatus { json } => migrate::status(&config, json).await?,
        Commands::MigrateVersion => migrate::version(&config).await?,
        Commands::MigrateMake { name } => migrate::make(&config, &name)?,
        Commands::MigrateCopy { sources } => migrate::copy(&config, &sources)?,
    }

    Ok(())
}
