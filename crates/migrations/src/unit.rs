//! Migration units
//!
//! A unit is a named, versioned piece of work with optional up and down
//! logic. Units are generic over the store `S` they act upon; the engine
//! hands that store to them through a [`MigrationContext`].

use async_trait::async_trait;
use std::future::Future;
use std::time::Instant;

use crate::definitions::Direction;
use crate::error::MigrationResult;
use crate::reporter::{Reporter, RowCount};
use crate::version::Version;

/// A single versioned, directional change
///
/// Units that cannot run in one direction return `false` from
/// [`Migration::handles`] for it; executing that direction is then a silent
/// no-op. Units that must refuse to revert return
/// [`MigrationError::Irreversible`](crate::MigrationError::Irreversible) from
/// `down` instead.
#[async_trait]
pub trait Migration<S: ?Sized + Sync>: Send + Sync {
    /// Whether this unit defines logic for the direction
    ///
    /// Defaults to `true` for both directions, so a unit that only implements
    /// `up` still announces "reverting"/"reverted" when rolled back and runs
    /// the empty default `down`. Override this to make the missing direction
    /// a silent no-op.
    fn handles(&self, direction: Direction) -> bool {
        let _ = direction;
        true
    }

    /// Apply the change. A returned count is reported as affected rows.
    async fn up(&self, _ctx: &MigrationContext<'_, S>) -> MigrationResult<Option<u64>> {
        Ok(None)
    }

    /// Revert the change
    async fn down(&self, _ctx: &MigrationContext<'_, S>) -> MigrationResult<Option<u64>> {
        Ok(None)
    }
}

/// What a unit sees while it runs
pub struct MigrationContext<'a, S: ?Sized> {
    store: &'a S,
    reporter: &'a Reporter,
    version: Version,
    name: &'a str,
}

impl<'a, S: ?Sized> MigrationContext<'a, S> {
    pub fn new(store: &'a S, reporter: &'a Reporter, version: Version, name: &'a str) -> Self {
        Self {
            store,
            reporter,
            version,
            name,
        }
    }

    /// The store the migration applies to
    pub fn store(&self) -> &'a S {
        self.store
    }

    pub fn reporter(&self) -> &'a Reporter {
        self.reporter
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn name(&self) -> &'a str {
        self.name
    }

    pub fn say(&self, message: &str) {
        self.reporter.say(message);
    }

    pub fn say_subitem(&self, message: &str) {
        self.reporter.say_subitem(message);
    }

    pub async fn say_with_time<F, T>(&self, message: &str, work: F) -> T
    where
        F: Future<Output = T>,
        T: RowCount,
    {
        self.reporter.say_with_time(message, work).await
    }
}

/// Run one unit in a direction, announcing start and completion with timing.
///
/// A unit that does not handle the direction is skipped without output.
pub async fn execute<S>(
    migration: &dyn Migration<S>,
    direction: Direction,
    version: Version,
    name: &str,
    store: &S,
    reporter: &Reporter,
) -> MigrationResult<Option<u64>>
where
    S: ?Sized + Sync,
{
    if !migration.handles(direction) {
        return Ok(None);
    }

    reporter.announce(version, name, direction.starting_message());

    let ctx = MigrationContext::new(store, reporter, version, name);
    let started = Instant::now();
    let result = match direction {
        Direction::Up => migration.up(&ctx).await?,
        Direction::Down => migration.down(&ctx).await?,
    };
    let elapsed = started.elapsed().as_secs_f64();

    reporter.announce(
        version,
        name,
        &format!("{} ({:.4}s)", direction.completed_message(), elapsed),
    );
    if let Some(rows) = result {
        reporter.say_subitem(&format!("{} rows", rows));
    }
    reporter.write("");

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MigrationError;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Products(Mutex<Vec<String>>);

    struct CreateFoo;

    #[async_trait]
    impl Migration<Products> for CreateFoo {
        async fn up(&self, ctx: &MigrationContext<'_, Products>) -> MigrationResult<Option<u64>> {
            ctx.store().0.lock().unwrap().push("foo".to_string());
            Ok(Some(1))
        }

        async fn down(&self, ctx: &MigrationContext<'_, Products>) -> MigrationResult<Option<u64>> {
            ctx.store().0.lock().unwrap().retain(|name| name != "foo");
            Ok(None)
        }
    }

    struct UpOnly;

    #[async_trait]
    impl Migration<Products> for UpOnly {
        fn handles(&self, direction: Direction) -> bool {
            direction.is_up()
        }

        async fn up(&self, _ctx: &MigrationContext<'_, Products>) -> MigrationResult<Option<u64>> {
            Ok(None)
        }
    }

    struct Seed;

    #[async_trait]
    impl Migration<Products> for Seed {
        async fn up(&self, ctx: &MigrationContext<'_, Products>) -> MigrationResult<Option<u64>> {
            ctx.store().0.lock().unwrap().push("seed".to_string());
            Ok(None)
        }
    }

    struct Permanent;

    #[async_trait]
    impl Migration<Products> for Permanent {
        async fn down(&self, _ctx: &MigrationContext<'_, Products>) -> MigrationResult<Option<u64>> {
            Err(MigrationError::irreversible("cannot restore dropped rows"))
        }
    }

    #[tokio::test]
    async fn test_execute_announces_and_reports_rows() {
        let store = Products::default();
        let (reporter, output) = Reporter::capture();

        let result = execute(&CreateFoo, Direction::Up, Version(1), "CreateFoo", &store, &reporter)
            .await
            .unwrap();

        assert_eq!(result, Some(1));
        assert_eq!(store.0.lock().unwrap().as_slice(), ["foo".to_string()]);

        let lines = output.lines();
        assert!(lines[0].starts_with("== 1 CreateFoo: migrating "));
        assert!(lines[1].starts_with("== 1 CreateFoo: migrated ("));
        assert_eq!(lines[2], "   -> 1 rows");
        assert_eq!(lines[3], "");
    }

    #[tokio::test]
    async fn test_execute_down_uses_reverting_messages() {
        let store = Products::default();
        let (reporter, output) = Reporter::capture();

        execute(&CreateFoo, Direction::Down, Version(1), "CreateFoo", &store, &reporter)
            .await
            .unwrap();

        assert!(output.contains("CreateFoo: reverting"));
        assert!(output.contains("CreateFoo: reverted ("));
    }

    #[tokio::test]
    async fn test_unhandled_direction_is_silent_noop() {
        let store = Products::default();
        let (reporter, output) = Reporter::capture();

        let result = execute(&UpOnly, Direction::Down, Version(2), "UpOnly", &store, &reporter)
            .await
            .unwrap();

        assert_eq!(result, None);
        assert!(output.lines().is_empty());
    }

    #[tokio::test]
    async fn test_default_down_is_announced_without_handles_override() {
        let store = Products::default();
        let (reporter, output) = Reporter::capture();

        let result = execute(&Seed, Direction::Down, Version(4), "Seed", &store, &reporter)
            .await
            .unwrap();

        assert_eq!(result, None);
        assert!(store.0.lock().unwrap().is_empty());
        assert!(output.contains("Seed: reverting"));
        assert!(output.contains("Seed: reverted ("));
    }

    #[tokio::test]
    async fn test_irreversible_is_surfaced() {
        let store = Products::default();
        let reporter = Reporter::silent();

        let err = execute(&Permanent, Direction::Down, Version(3), "Permanent", &store, &reporter)
            .await
            .unwrap_err();

        assert!(err.is_irreversible());
    }
}
