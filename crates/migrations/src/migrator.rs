//! Migrator - the execution engine
//!
//! One migrator instance travels in one direction towards an optional target.
//! It resolves the catalog once, snapshots the applied versions once, and then
//! walks the runnable slice, updating the ledger after every unit it runs.

use once_cell::sync::OnceCell;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

use crate::catalog::{MigrationCatalog, MigrationProxy};
use crate::definitions::{Direction, MigrationRunResult};
use crate::error::{MigrationError, MigrationResult};
use crate::ledger::Ledger;
use crate::loader::MigrationLoader;
use crate::reporter::Reporter;
use crate::version::Version;

pub struct Migrator<S: ?Sized + 'static> {
    direction: Direction,
    catalog: MigrationCatalog,
    target_version: Option<Version>,
    store: Arc<S>,
    ledger: Arc<dyn Ledger>,
    loader: Arc<dyn MigrationLoader<S>>,
    reporter: Reporter,
    migrations: OnceCell<Vec<MigrationProxy<S>>>,
    migrated: Mutex<Option<BTreeSet<Version>>>,
}

impl<S: ?Sized + 'static> fmt::Debug for Migrator<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Migrator")
            .field("direction", &self.direction)
            .field("catalog", &self.catalog)
            .field("target_version", &self.target_version)
            .finish()
    }
}

impl<S> Migrator<S>
where
    S: ?Sized + Send + Sync + 'static,
{
    pub fn new(
        direction: Direction,
        catalog: MigrationCatalog,
        target_version: Option<Version>,
        store: Arc<S>,
        ledger: Arc<dyn Ledger>,
        loader: Arc<dyn MigrationLoader<S>>,
    ) -> Self {
        Self {
            direction,
            catalog,
            target_version,
            store,
            ledger,
            loader,
            reporter: Reporter::default(),
            migrations: OnceCell::new(),
            migrated: Mutex::new(None),
        }
    }

    pub fn with_reporter(mut self, reporter: Reporter) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn target_version(&self) -> Option<Version> {
        self.target_version
    }

    /// The catalog, ordered for this migrator's direction. Resolved once.
    pub fn migrations(&self) -> MigrationResult<&[MigrationProxy<S>]> {
        self.migrations
            .get_or_try_init(|| self.catalog.resolve(self.direction, self.loader.clone()))
            .map(Vec::as_slice)
    }

    /// Applied versions, read from the ledger on first use and then kept in step
    pub async fn migrated(&self) -> MigrationResult<BTreeSet<Version>> {
        let mut migrated = self.migrated.lock().await;
        if let Some(versions) = migrated.as_ref() {
            return Ok(versions.clone());
        }

        let versions: BTreeSet<Version> = self.ledger.all_versions().await?.into_iter().collect();
        *migrated = Some(versions.clone());
        Ok(versions)
    }

    async fn is_migrated(&self, version: Version) -> MigrationResult<bool> {
        Ok(self.migrated().await?.contains(&version))
    }

    pub async fn current_version(&self) -> MigrationResult<Version> {
        Ok(self
            .migrated()
            .await?
            .iter()
            .next_back()
            .copied()
            .unwrap_or(Version::ZERO))
    }

    pub async fn current_migration(&self) -> MigrationResult<Option<&MigrationProxy<S>>> {
        let current = self.current_version().await?;
        Ok(self.migrations()?.iter().find(|m| m.version() == current))
    }

    /// Catalog entries not yet applied, in this migrator's order
    pub async fn pending_migrations(&self) -> MigrationResult<Vec<&MigrationProxy<S>>> {
        let migrated = self.migrated().await?;
        Ok(self
            .migrations()?
            .iter()
            .filter(|m| !migrated.contains(&m.version()))
            .collect())
    }

    /// Run exactly the target unit, unless it is already in the requested state
    pub async fn run(&self) -> MigrationResult<MigrationRunResult> {
        let started = Instant::now();
        let target_version = self.target_version.unwrap_or(Version::ZERO);
        let target = self
            .migrations()?
            .iter()
            .find(|m| m.version() == target_version)
            .ok_or(MigrationError::UnknownVersion(target_version))?;

        let mut result = MigrationRunResult::empty(self.direction);
        let applied = self.is_migrated(target.version()).await?;

        if (self.direction.is_up() && applied) || (self.direction.is_down() && !applied) {
            tracing::debug!(
                "{} ({}) is already {}, nothing to run",
                target.name(),
                target.version(),
                if applied { "applied" } else { "reverted" }
            );
            result.skipped.push(target.version());
        } else {
            target
                .migrate(self.direction, &*self.store, &self.reporter)
                .await?;
            self.record_version_state_after_migrating(target.version())
                .await?;
            result.executed.push(target.version());
        }

        result.execution_time_ms = started.elapsed().as_millis();
        Ok(result)
    }

    /// Walk from the current version to the target, stopping at the first failure
    pub async fn migrate(&self) -> MigrationResult<MigrationRunResult> {
        let started = Instant::now();
        let migrations = self.migrations()?;
        let current_version = self.current_version().await?;

        let current = migrations.iter().position(|m| m.version() == current_version);
        let target = self
            .target_version
            .and_then(|version| migrations.iter().position(|m| m.version() == version));

        if let (None, Some(version)) = (target, self.target_version) {
            if !version.is_zero() {
                return Err(MigrationError::UnknownVersion(version));
            }
        }

        let mut result = MigrationRunResult::empty(self.direction);

        for migration in self.runnable(migrations, current, target) {
            let version = migration.version();
            tracing::info!("Migrating to {} ({})", migration.name(), version);

            let applied = self.is_migrated(version).await?;

            if self.direction.is_up() && applied {
                tracing::debug!("{} ({}) already applied, skipping", migration.name(), version);
                result.skipped.push(version);
                continue;
            }

            if self.direction.is_down() && !applied {
                tracing::warn!("{} ({}) never migrated, skipping", migration.name(), version);
                migration.announce(&self.reporter, "never migrated, skipping");
                self.reporter.write("");
                result.skipped.push(version);
                continue;
            }

            if let Err(e) = self.execute(migration).await {
                tracing::error!("{} ({}) failed: {}", migration.name(), version, e);
                return Err(MigrationError::canceled(version, migration.name(), e));
            }
            result.executed.push(version);
        }

        result.execution_time_ms = started.elapsed().as_millis();
        Ok(result)
    }

    async fn execute(&self, migration: &MigrationProxy<S>) -> MigrationResult<()> {
        migration
            .migrate(self.direction, &*self.store, &self.reporter)
            .await?;
        self.record_version_state_after_migrating(migration.version())
            .await
    }

    /// Slice of the catalog a ranged run walks over
    fn runnable<'m>(
        &self,
        migrations: &'m [MigrationProxy<S>],
        current: Option<usize>,
        target: Option<usize>,
    ) -> &'m [MigrationProxy<S>] {
        if migrations.is_empty() {
            return &[];
        }

        let start = match self.direction {
            Direction::Up => 0,
            Direction::Down => current.unwrap_or(0),
        };
        let finish = target.unwrap_or(migrations.len() - 1);
        if start > finish {
            return &[];
        }

        let runnable = &migrations[start..=finish];

        // Heading down to a target: the target stays applied
        if self.direction.is_down() && target.is_some() {
            &runnable[..runnable.len() - 1]
        } else {
            runnable
        }
    }

    async fn record_version_state_after_migrating(&self, version: Version) -> MigrationResult<()> {
        match self.direction {
            Direction::Up => self.ledger.record_applied(version).await?,
            Direction::Down => self.ledger.record_reverted(version).await?,
        }

        let mut migrated = self.migrated.lock().await;
        let versions = migrated.get_or_insert_with(BTreeSet::new);
        match self.direction {
            Direction::Up => {
                versions.insert(version);
            }
            Direction::Down => {
                versions.remove(&version);
            }
        }
        Ok(())
    }
}
