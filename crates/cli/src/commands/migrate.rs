use anyhow::{bail, Context};
use elif_migrations::{
    create_migration, Copier, Direction, MigrationCatalog, MigrationRunResult, MigrationRunner,
    MigrationStatus, PgLedger, SqlFileLoader, Version,
};
use sqlx::PgPool;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::AppConfig;

async fn runner(config: &AppConfig) -> anyhow::Result<MigrationRunner<PgPool>> {
    let url = config.database_url()?;
    let ledger = PgLedger::connect(url, &config.migrations)
        .await
        .context("Failed to open the migrations ledger")?;
    let store = Arc::new(ledger.pool().clone());

    Ok(MigrationRunner::new(
        &config.migrations,
        store,
        Arc::new(ledger),
        Arc::new(SqlFileLoader),
    ))
}

fn summarize(result: &MigrationRunResult) {
    if result.is_noop() {
        println!("Nothing to migrate");
        return;
    }
    println!(
        "{} {} migration(s) in {}ms",
        result.direction.completed_message(),
        result.executed_count(),
        result.execution_time_ms
    );
}

pub async fn migrate(config: &AppConfig, version: Option<u64>) -> anyhow::Result<()> {
    let result = runner(config).await?.migrate(version.map(Version)).await?;
    summarize(&result);
    Ok(())
}

/// Run a single migration in one direction
pub async fn run(config: &AppConfig, direction: Direction, version: u64) -> anyhow::Result<()> {
    let result = runner(config).await?.run(direction, Version(version)).await?;
    if result.is_noop() {
        println!(
            "Migration {} is already {}",
            version,
            direction.completed_message()
        );
    } else {
        summarize(&result);
    }
    Ok(())
}

pub async fn rollback(config: &AppConfig, steps: usize) -> anyhow::Result<()> {
    let result = runner(config).await?.rollback(steps).await?;
    summarize(&result);
    Ok(())
}

pub async fn forward(config: &AppConfig, steps: usize) -> anyhow::Result<()> {
    let result = runner(config).await?.forward(steps).await?;
    summarize(&result);
    Ok(())
}

pub async fn status(config: &AppConfig, json: bool) -> anyhow::Result<()> {
    let entries = runner(config).await?.status().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    println!("Migration Status:");
    println!("================");

    if entries.is_empty() {
        println!("No migrations found");
        return Ok(());
    }

    for entry in &entries {
        let name = entry.name.as_deref().unwrap_or("*** NO FILE ***");
        match &entry.status {
            MigrationStatus::Applied { applied_at } => println!(
                "  up      {:<16} {} ({})",
                entry.version,
                name,
                applied_at.format("%Y-%m-%d %H:%M:%S")
            ),
            MigrationStatus::Pending => println!("  down    {:<16} {}", entry.version, name),
            MigrationStatus::Orphaned { .. } => println!("  up      {:<16} {}", entry.version, name),
        }
    }

    Ok(())
}

pub async fn version(config: &AppConfig) -> anyhow::Result<()> {
    let current = runner(config).await?.current_version().await?;
    println!("Current version: {}", current);
    Ok(())
}

pub fn make(config: &AppConfig, name: &str) -> anyhow::Result<()> {
    let catalog = MigrationCatalog::from_config(&config.migrations);
    let source = create_migration(&catalog, name)?;
    println!("Created migration: {}", source.filename.display());
    Ok(())
}

pub fn copy(config: &AppConfig, sources: &[(String, PathBuf)]) -> anyhow::Result<()> {
    if sources.is_empty() {
        bail!("Nothing to copy, pass at least one --from scope=path");
    }

    let sources: Vec<(&str, &PathBuf)> = sources
        .iter()
        .map(|(scope, path)| (scope.as_str(), path))
        .collect();

    let copied = Copier::new(&config.migrations.migrations_dir, &config.migrations.extension)
        .on_skip(|scope, migration| {
            println!(
                "NOTE: Migration {} from {} has been skipped. Migration with the same name already exists.",
                migration.basename(),
                scope
            );
        })
        .on_copy(|scope, migration, _old_path| {
            println!("Copied migration {} from {}", migration.basename(), scope);
        })
        .copy(sources.as_slice())?;

    println!("Copied {} migration(s)", copied.len());
    Ok(())
}

/// Parse a `scope=path` pair
pub fn parse_source(value: &str) -> Result<(String, PathBuf), String> {
    match value.split_once('=') {
        Some((scope, path)) if !scope.is_empty() && !path.is_empty() => {
            if !scope.chars().all(|c| c.is_ascii_lowercase()) {
                return Err(format!("scope '{}' must be lower case letters only", scope));
            }
            Ok((scope.to_string(), PathBuf::from(path)))
        }
        _ => Err(format!("expected scope=path, got '{}'", value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_source() {
        assert_eq!(
            parse_source("blog=../blog/db/migrate").unwrap(),
            ("blog".to_string(), PathBuf::from("../blog/db/migrate"))
        );
        assert!(parse_source("blog").is_err());
        assert!(parse_source("=path").is_err());
        assert!(parse_source("Blog2=path").is_err());
    }
}
