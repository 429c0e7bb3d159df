//! Migration Copier - merge migrations from several scopes into one directory
//!
//! Each source directory is tagged with a scope label. Source migrations whose
//! name already exists in the destination are skipped; the rest are renumbered
//! after the destination's last version, annotated with their origin and
//! written as `<version>_<slug>.<scope>.<ext>`.

use chrono::{DateTime, Utc};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::catalog::{MigrationCatalog, MigrationSource};
use crate::error::{MigrationError, MigrationResult};
use crate::version::{next_number_at, Version};

type SkipHook = Arc<dyn Fn(&str, &MigrationSource) + Send + Sync>;
type CopyHook = Arc<dyn Fn(&str, &MigrationSource, &Path) + Send + Sync>;
type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Line comment syntax for migration files of an extension
pub fn comment_prefix(extension: &str) -> &'static str {
    match extension {
        "sql" => "--",
        "rs" => "//",
        _ => "#",
    }
}

#[derive(Clone)]
pub struct Copier {
    destination: PathBuf,
    extension: String,
    on_skip: Option<SkipHook>,
    on_copy: Option<CopyHook>,
    clock: Clock,
}

impl fmt::Debug for Copier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Copier")
            .field("destination", &self.destination)
            .field("extension", &self.extension)
            .finish()
    }
}

impl Copier {
    pub fn new(destination: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            extension: extension.into(),
            on_skip: None,
            on_copy: None,
            clock: Arc::new(Utc::now),
        }
    }

    /// Called when a destination migration of the same name came from another scope
    pub fn on_skip<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str, &MigrationSource) + Send + Sync + 'static,
    {
        self.on_skip = Some(Arc::new(hook));
        self
    }

    /// Called after each file is written, with the path it was copied from
    pub fn on_copy<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str, &MigrationSource, &Path) + Send + Sync + 'static,
    {
        self.on_copy = Some(Arc::new(hook));
        self
    }

    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Copy every new migration from the `(scope, directory)` sources.
    ///
    /// Returns the copied migrations as they now exist in the destination.
    pub fn copy<P: AsRef<Path>>(
        &self,
        sources: &[(&str, P)],
    ) -> MigrationResult<Vec<MigrationSource>> {
        // Scopes end up in filenames, so they must satisfy the catalog's pattern
        if let Some((scope, _)) = sources
            .iter()
            .find(|(scope, _)| scope.is_empty() || !scope.chars().all(|c| c.is_ascii_lowercase()))
        {
            return Err(MigrationError::IllegalName {
                filename: format!("<version>_<name>.{}.{}", scope, self.extension),
            });
        }

        fs::create_dir_all(&self.destination)?;

        let mut destination = MigrationCatalog::new(&self.destination, &self.extension).scan()?;
        let mut last = destination.last().map(|m| m.version);
        let mut copied = Vec::new();

        for (scope, path) in sources {
            let catalog = MigrationCatalog::new(path.as_ref(), &self.extension);

            for migration in catalog.scan()? {
                if let Some(duplicate) = destination.iter().find(|m| m.name == migration.name) {
                    if duplicate.scope.as_deref() != Some(*scope) {
                        if let Some(hook) = &self.on_skip {
                            hook(scope, &migration);
                        }
                    }
                    tracing::debug!(
                        "Skipping {} from {}, destination already has it",
                        migration.name,
                        scope
                    );
                    continue;
                }

                let content = fs::read_to_string(&migration.filename)?;
                let content = format!(
                    "{} This migration comes from {} (originally {})\n{}",
                    comment_prefix(&self.extension),
                    scope,
                    migration.version,
                    content
                );

                let next = last.map(|v| v.succ()).unwrap_or(Version::ZERO);
                let version = next_number_at((self.clock)(), next.as_u64())
                    .parse::<Version>()
                    .map_err(|e| MigrationError::execution(e.to_string()))?;

                let new_path = self.destination.join(format!(
                    "{}_{}.{}.{}",
                    version, migration.slug, scope, self.extension
                ));
                fs::write(&new_path, content)?;

                let copy = MigrationSource {
                    version,
                    name: migration.name.clone(),
                    slug: migration.slug.clone(),
                    scope: Some(scope.to_string()),
                    filename: new_path,
                };
                tracing::info!(
                    "Copied {} from {} as {}",
                    migration.basename(),
                    scope,
                    copy.basename()
                );

                if let Some(hook) = &self.on_copy {
                    hook(scope, &copy, &migration.filename);
                }

                last = Some(version);
                destination.push(copy.clone());
                copied.push(copy);
            }
        }

        Ok(copied)
    }
}
