//! Version Ledger - the durable record of applied migrations
//!
//! An entry's existence means its version has been applied. Entries are
//! created after a successful up and deleted after a successful down.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::MigrationConfig;
use crate::definitions::MigrationRecord;
use crate::error::{MigrationError, MigrationResult};
use crate::version::Version;

/// Persistent set of applied versions
#[async_trait]
pub trait Ledger: Send + Sync {
    /// All entries, ascending by version
    async fn records(&self) -> MigrationResult<Vec<MigrationRecord>>;

    /// Mark a version as applied; recording an applied version again is a no-op
    async fn record_applied(&self, version: Version) -> MigrationResult<()>;

    /// Forget a version
    async fn record_reverted(&self, version: Version) -> MigrationResult<()>;

    /// All applied versions, ascending
    async fn all_versions(&self) -> MigrationResult<Vec<Version>> {
        Ok(self.records().await?.into_iter().map(|r| r.version).collect())
    }

    /// Highest applied version, or zero
    async fn current_version(&self) -> MigrationResult<Version> {
        Ok(self
            .all_versions()
            .await?
            .into_iter()
            .max()
            .unwrap_or(Version::ZERO))
    }
}

/// Ledger kept in process memory; clones share the same entries
#[derive(Debug, Clone, Default)]
pub struct MemoryLedger(Arc<RwLock<BTreeMap<Version, DateTime<Utc>>>>);

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ledger pre-populated with applied versions
    pub fn with_versions<I, V>(versions: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Version>,
    {
        let now = Utc::now();
        let entries = versions.into_iter().map(|v| (v.into(), now)).collect();
        Self(Arc::new(RwLock::new(entries)))
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn records(&self) -> MigrationResult<Vec<MigrationRecord>> {
        Ok(self
            .0
            .read()
            .await
            .iter()
            .map(|(version, applied_at)| MigrationRecord {
                version: *version,
                applied_at: *applied_at,
            })
            .collect())
    }

    async fn record_applied(&self, version: Version) -> MigrationResult<()> {
        self.0.write().await.entry(version).or_insert_with(Utc::now);
        Ok(())
    }

    async fn record_reverted(&self, version: Version) -> MigrationResult<()> {
        self.0.write().await.remove(&version);
        Ok(())
    }
}

/// Ledger stored in a Postgres table, one row per applied version
#[derive(Debug, Clone)]
pub struct PgLedger {
    pool: PgPool,
    table: String,
}

impl PgLedger {
    /// Create a ledger over an existing pool; call [`PgLedger::ensure_table`] before use
    pub fn new(pool: PgPool, table: impl Into<String>) -> Self {
        Self {
            pool,
            table: table.into(),
        }
    }

    /// Connect, then make sure the ledger table exists
    pub async fn connect(database_url: &str, config: &MigrationConfig) -> MigrationResult<Self> {
        config.validate()?;
        let pool = PgPool::connect(database_url).await?;
        let ledger = Self::new(pool, &config.migrations_table);
        ledger.ensure_table().await?;
        Ok(ledger)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Ensure the ledger table exists
    pub async fn ensure_table(&self) -> MigrationResult<()> {
        sqlx::query(&create_table_sql(&self.table))
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Ledger for PgLedger {
    async fn records(&self) -> MigrationResult<Vec<MigrationRecord>> {
        let rows = sqlx::query(&select_sql(&self.table))
            .fetch_all(&self.pool)
            .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let version: String = row.try_get("version")?;
            let applied_at: DateTime<Utc> = row.try_get("applied_at")?;
            let version = version.parse::<Version>().map_err(|_| {
                MigrationError::ledger(format!(
                    "Invalid version '{}' in table {}",
                    version, self.table
                ))
            })?;
            records.push(MigrationRecord { version, applied_at });
        }

        // Versions are stored as strings, so order numerically here
        records.sort_by_key(|r| r.version);
        Ok(records)
    }

    async fn record_applied(&self, version: Version) -> MigrationResult<()> {
        sqlx::query(&insert_sql(&self.table))
            .bind(version.to_string())
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn record_reverted(&self, version: Version) -> MigrationResult<()> {
        sqlx::query(&delete_sql(&self.table))
            .bind(version.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// SQL to create the ledger table
fn create_table_sql(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    \
            version VARCHAR(255) PRIMARY KEY,\n    \
            applied_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP\n\
        );",
        table
    )
}

/// SQL to read all ledger entries
fn select_sql(table: &str) -> String {
    format!("SELECT version, applied_at FROM {}", table)
}

/// SQL to record a version as applied
fn insert_sql(table: &str) -> String {
    format!(
        "INSERT INTO {} (version, applied_at) VALUES ($1, $2) ON CONFLICT (version) DO NOTHING",
        table
    )
}

/// SQL to remove a version
fn delete_sql(table: &str) -> String {
    format!("DELETE FROM {} WHERE version = $1", table)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_ledger_lifecycle() {
        let ledger = MemoryLedger::new();
        assert_eq!(ledger.current_version().await.unwrap(), Version::ZERO);

        ledger.record_applied(Version(3)).await.unwrap();
        ledger.record_applied(Version(1)).await.unwrap();
        ledger.record_applied(Version(2)).await.unwrap();

        assert_eq!(
            ledger.all_versions().await.unwrap(),
            vec![Version(1), Version(2), Version(3)]
        );
        assert_eq!(ledger.current_version().await.unwrap(), Version(3));

        ledger.record_reverted(Version(3)).await.unwrap();
        assert_eq!(ledger.current_version().await.unwrap(), Version(2));
    }

    #[tokio::test]
    async fn test_memory_ledger_reapply_keeps_original_timestamp() {
        let ledger = MemoryLedger::with_versions([5u64]);
        let before = ledger.records().await.unwrap()[0].applied_at;

        ledger.record_applied(Version(5)).await.unwrap();

        let records = ledger.records().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].applied_at, before);
    }

    #[tokio::test]
    async fn test_memory_ledger_clones_share_state() {
        let ledger = MemoryLedger::new();
        let clone = ledger.clone();

        clone.record_applied(Version(9)).await.unwrap();

        assert_eq!(ledger.all_versions().await.unwrap(), vec![Version(9)]);
    }

    #[test]
    fn test_ledger_sql_generation() {
        let create = create_table_sql("schema_migrations");
        assert!(create.contains("CREATE TABLE IF NOT EXISTS schema_migrations"));
        assert!(create.contains("version VARCHAR(255) PRIMARY KEY"));

        assert_eq!(
            select_sql("schema_migrations"),
            "SELECT version, applied_at FROM schema_migrations"
        );
        assert!(insert_sql("schema_migrations").contains("ON CONFLICT (version) DO NOTHING"));
        assert_eq!(
            delete_sql("schema_migrations"),
            "DELETE FROM schema_migrations WHERE version = $1"
        );
    }
}
