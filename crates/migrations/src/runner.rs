//! Migration Runner - the public entry points
//!
//! Wraps the catalog, store, ledger and loader of one migrations directory and
//! builds a fresh [`Migrator`] per operation.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::catalog::{MigrationCatalog, MigrationSource};
use crate::config::MigrationConfig;
use crate::definitions::{Direction, MigrationRunResult, MigrationStatus, StatusEntry};
use crate::error::MigrationResult;
use crate::ledger::Ledger;
use crate::loader::MigrationLoader;
use crate::migrator::Migrator;
use crate::reporter::Reporter;
use crate::version::Version;

pub struct MigrationRunner<S: ?Sized + 'static> {
    catalog: MigrationCatalog,
    store: Arc<S>,
    ledger: Arc<dyn Ledger>,
    loader: Arc<dyn MigrationLoader<S>>,
    reporter: Reporter,
}

impl<S> MigrationRunner<S>
where
    S: ?Sized + Send + Sync + 'static,
{
    pub fn new(
        config: &MigrationConfig,
        store: Arc<S>,
        ledger: Arc<dyn Ledger>,
        loader: Arc<dyn MigrationLoader<S>>,
    ) -> Self {
        Self {
            catalog: MigrationCatalog::from_config(config),
            store,
            ledger,
            loader,
            reporter: Reporter::stdout().with_verbose(config.verbose),
        }
    }

    /// Replace the progress output sink
    pub fn with_reporter(mut self, reporter: Reporter) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn catalog(&self) -> &MigrationCatalog {
        &self.catalog
    }

    pub fn ledger(&self) -> &dyn Ledger {
        self.ledger.as_ref()
    }

    pub fn reporter(&self) -> &Reporter {
        &self.reporter
    }

    /// A migrator for one operation in one direction
    pub fn migrator(&self, direction: Direction, target_version: Option<Version>) -> Migrator<S> {
        Migrator::new(
            direction,
            self.catalog.clone(),
            target_version,
            self.store.clone(),
            self.ledger.clone(),
            self.loader.clone(),
        )
        .with_reporter(self.reporter.clone())
    }

    /// Migrate towards a target, choosing the direction from the current version.
    ///
    /// Without a target every pending migration is applied.
    pub async fn migrate(&self, target: Option<Version>) -> MigrationResult<MigrationRunResult> {
        let Some(target) = target else {
            return self.up(None).await;
        };

        let current = self.current_version().await?;
        if current.is_zero() && target.is_zero() {
            tracing::debug!("Nothing to migrate, database and target are both at version 0");
            return Ok(MigrationRunResult::empty(Direction::Up));
        }

        if current > target {
            self.down(Some(target)).await
        } else {
            self.up(Some(target)).await
        }
    }

    pub async fn up(&self, target: Option<Version>) -> MigrationResult<MigrationRunResult> {
        self.migrator(Direction::Up, target).migrate().await
    }

    pub async fn down(&self, target: Option<Version>) -> MigrationResult<MigrationRunResult> {
        self.migrator(Direction::Down, target).migrate().await
    }

    /// Run exactly one migration in a direction
    pub async fn run(
        &self,
        direction: Direction,
        version: Version,
    ) -> MigrationResult<MigrationRunResult> {
        self.migrator(direction, Some(version)).run().await
    }

    /// Revert the latest `steps` applied migrations
    pub async fn rollback(&self, steps: usize) -> MigrationResult<MigrationRunResult> {
        self.move_by(Direction::Down, steps).await
    }

    /// Apply the next `steps` migrations after the current one
    pub async fn forward(&self, steps: usize) -> MigrationResult<MigrationRunResult> {
        self.move_by(Direction::Up, steps).await
    }

    async fn move_by(
        &self,
        direction: Direction,
        steps: usize,
    ) -> MigrationResult<MigrationRunResult> {
        let migrator = self.migrator(direction, None);
        let migrations = migrator.migrations()?;
        let current = migrator.current_version().await?;

        let Some(start) = migrations.iter().position(|m| m.version() == current) else {
            tracing::warn!(
                "Current version {} has no migration file in {}, nothing to {}",
                current,
                self.catalog.dir().display(),
                match direction {
                    Direction::Up => "forward",
                    Direction::Down => "roll back",
                }
            );
            return Ok(MigrationRunResult::empty(direction));
        };

        // Past the end of the list means "all the way"
        let target = migrations
            .get(start.saturating_add(steps))
            .map(|m| m.version())
            .unwrap_or(Version::ZERO);

        match direction {
            Direction::Up => self.up(Some(target)).await,
            Direction::Down => self.down(Some(target)).await,
        }
    }

    /// Highest applied version, or zero
    pub async fn current_version(&self) -> MigrationResult<Version> {
        self.ledger.current_version().await
    }

    /// Migration files not yet applied, ascending
    pub async fn pending_migrations(&self) -> MigrationResult<Vec<MigrationSource>> {
        let applied = self.ledger.all_versions().await?;
        Ok(self
            .catalog
            .scan()?
            .into_iter()
            .filter(|source| !applied.contains(&source.version))
            .collect())
    }

    /// Every known version with its state, ascending.
    ///
    /// Ledger entries without a migration file are reported as orphaned.
    pub async fn status(&self) -> MigrationResult<Vec<StatusEntry>> {
        let mut applied: BTreeMap<Version, _> = self
            .ledger
            .records()
            .await?
            .into_iter()
            .map(|record| (record.version, record.applied_at))
            .collect();

        let mut entries: Vec<StatusEntry> = self
            .catalog
            .scan()?
            .into_iter()
            .map(|source| {
                let status = match applied.remove(&source.version) {
                    Some(applied_at) => MigrationStatus::Applied { applied_at },
                    None => MigrationStatus::Pending,
                };
                StatusEntry {
                    version: source.version,
                    name: Some(source.name),
                    filename: Some(source.filename),
                    status,
                }
            })
            .collect();

        entries.extend(applied.into_iter().map(|(version, applied_at)| StatusEntry {
            version,
            name: None,
            filename: None,
            status: MigrationStatus::Orphaned { applied_at },
        }));
        entries.sort_by_key(|entry| entry.version);

        Ok(entries)
    }
}
