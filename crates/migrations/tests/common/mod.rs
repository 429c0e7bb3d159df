#![allow(dead_code)]

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use elif_migrations::{
    async_trait, CapturedOutput, Direction, Ledger, MemoryLedger, Migration, MigrationConfig,
    MigrationContext, MigrationError, MigrationResult, MigrationRunner, MigrationSource, Reporter,
    Version,
};
use tempfile::TempDir;

/// Store that records what each unit did
#[derive(Debug, Default)]
pub struct Journal(Mutex<Vec<String>>);

impl Journal {
    pub fn push(&self, entry: String) {
        self.0.lock().unwrap().push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

/// Writes `up:<Name>` / `down:<Name>` to the journal
pub struct Recorder(String);

#[async_trait]
impl Migration<Journal> for Recorder {
    async fn up(&self, ctx: &MigrationContext<'_, Journal>) -> MigrationResult<Option<u64>> {
        ctx.store().push(format!("up:{}", self.0));
        Ok(None)
    }

    async fn down(&self, ctx: &MigrationContext<'_, Journal>) -> MigrationResult<Option<u64>> {
        ctx.store().push(format!("down:{}", self.0));
        Ok(None)
    }
}

pub struct Failing;

#[async_trait]
impl Migration<Journal> for Failing {
    async fn up(&self, _ctx: &MigrationContext<'_, Journal>) -> MigrationResult<Option<u64>> {
        Err(anyhow!("collection is locked").into())
    }
}

pub struct UpOnly(String);

#[async_trait]
impl Migration<Journal> for UpOnly {
    fn handles(&self, direction: Direction) -> bool {
        direction.is_up()
    }

    async fn up(&self, ctx: &MigrationContext<'_, Journal>) -> MigrationResult<Option<u64>> {
        ctx.store().push(format!("up:{}", self.0));
        Ok(None)
    }
}

pub struct Permanent;

#[async_trait]
impl Migration<Journal> for Permanent {
    async fn down(&self, _ctx: &MigrationContext<'_, Journal>) -> MigrationResult<Option<u64>> {
        Err(MigrationError::irreversible("dropped data cannot be restored"))
    }
}

/// Picks the unit by name prefix: `Fail*`, `UpOnly*`, `Irreversible*`, else a recorder
fn unit_for(source: &MigrationSource) -> Box<dyn Migration<Journal>> {
    let name = source.name.as_str();
    if name.starts_with("Fail") {
        Box::new(Failing)
    } else if name.starts_with("UpOnly") {
        Box::new(UpOnly(name.to_string()))
    } else if name.starts_with("Irreversible") {
        Box::new(Permanent)
    } else {
        Box::new(Recorder(name.to_string()))
    }
}

pub fn touch(dir: &Path, name: &str) {
    fs::create_dir_all(dir).unwrap();
    fs::write(dir.join(name), "").unwrap();
}

pub struct Fixture {
    pub dir: TempDir,
    pub journal: Arc<Journal>,
    pub ledger: MemoryLedger,
    pub output: CapturedOutput,
    pub loads: Arc<AtomicUsize>,
    reporter: Reporter,
}

impl Fixture {
    pub fn new(files: &[&str]) -> Self {
        let dir = TempDir::new().unwrap();
        for file in files {
            touch(dir.path(), file);
        }
        let (reporter, output) = Reporter::capture();

        Self {
            dir,
            journal: Arc::new(Journal::default()),
            ledger: MemoryLedger::new(),
            output,
            loads: Arc::new(AtomicUsize::new(0)),
            reporter,
        }
    }

    pub async fn with_applied(self, versions: &[u64]) -> Self {
        for version in versions {
            self.ledger.record_applied(Version(*version)).await.unwrap();
        }
        self
    }

    pub fn config(&self) -> MigrationConfig {
        MigrationConfig::default().with_migrations_dir(self.dir.path())
    }

    pub fn runner(&self) -> MigrationRunner<Journal> {
        let loads = self.loads.clone();
        let loader = move |source: &MigrationSource| -> MigrationResult<Box<dyn Migration<Journal>>> {
            loads.fetch_add(1, Ordering::SeqCst);
            Ok(unit_for(source))
        };

        MigrationRunner::new(
            &self.config(),
            self.journal.clone(),
            Arc::new(self.ledger.clone()),
            Arc::new(loader),
        )
        .with_reporter(self.reporter.clone())
    }

    pub async fn applied(&self) -> Vec<u64> {
        self.ledger
            .all_versions()
            .await
            .unwrap()
            .into_iter()
            .map(|v| v.0)
            .collect()
    }

    pub fn journal(&self) -> Vec<String> {
        self.journal.entries()
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}
