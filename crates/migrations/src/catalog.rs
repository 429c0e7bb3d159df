//! Migration Catalog - discovery and resolution of migration files
//!
//! Files are named `<version>_<name>[.<scope>].<ext>`. Resolution parses and
//! validates every matching file, orders the result by version, and wraps each
//! entry in a [`MigrationProxy`] that binds its executable logic on first use.

use once_cell::sync::OnceCell;
use regex::Regex;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::MigrationConfig;
use crate::definitions::Direction;
use crate::error::{MigrationError, MigrationResult};
use crate::loader::MigrationLoader;
use crate::reporter::Reporter;
use crate::unit::{execute, Migration};
use crate::version::Version;

/// Parsed identity of one migration file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationSource {
    pub version: Version,
    /// CamelCase name, unique within a catalog
    pub name: String,
    /// Name as written in the filename
    pub slug: String,
    /// Origin tag of copied migrations
    pub scope: Option<String>,
    pub filename: PathBuf,
}

impl MigrationSource {
    pub fn basename(&self) -> String {
        self.filename
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Validated, ordered collection of migration files in one directory
#[derive(Debug, Clone)]
pub struct MigrationCatalog {
    dir: PathBuf,
    extension: String,
}

impl MigrationCatalog {
    pub fn new(dir: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            extension: extension.into(),
        }
    }

    pub fn from_config(config: &MigrationConfig) -> Self {
        Self::new(&config.migrations_dir, &config.extension)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// List, parse and validate all migration files, ascending by version.
    ///
    /// A missing directory is an empty catalog.
    pub fn scan(&self) -> MigrationResult<Vec<MigrationSource>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let pattern = filename_pattern(&self.extension)?;

        let mut files = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.is_file() && has_extension(&path, &self.extension) {
                files.push(path);
            }
        }
        files.sort();

        let mut migrations: Vec<MigrationSource> = Vec::with_capacity(files.len());
        for file in files {
            let migration = parse_with(&pattern, &file)?;

            if migrations.iter().any(|m| m.version == migration.version) {
                return Err(MigrationError::DuplicateVersion(migration.version));
            }
            if migrations.iter().any(|m| m.name == migration.name) {
                return Err(MigrationError::DuplicateName(migration.name));
            }

            migrations.push(migration);
        }

        migrations.sort_by_key(|m| m.version);
        tracing::debug!(
            dir = %self.dir.display(),
            count = migrations.len(),
            "resolved migration catalog"
        );

        Ok(migrations)
    }

    /// Scan and bind each entry to the loader, ordered for the direction
    pub fn resolve<S>(
        &self,
        direction: Direction,
        loader: Arc<dyn MigrationLoader<S>>,
    ) -> MigrationResult<Vec<MigrationProxy<S>>>
    where
        S: ?Sized + Sync + 'static,
    {
        let mut proxies: Vec<_> = self
            .scan()?
            .into_iter()
            .map(|source| MigrationProxy::new(source, loader.clone()))
            .collect();

        if direction.is_down() {
            proxies.reverse();
        }

        Ok(proxies)
    }

    /// Highest version present in the directory, or zero
    pub fn last_version(&self) -> MigrationResult<Version> {
        Ok(self
            .scan()?
            .last()
            .map(|m| m.version)
            .unwrap_or(Version::ZERO))
    }
}

/// Parse one filename against the naming convention
pub fn parse_filename(path: &Path, extension: &str) -> MigrationResult<MigrationSource> {
    parse_with(&filename_pattern(extension)?, path)
}

fn filename_pattern(extension: &str) -> MigrationResult<Regex> {
    let pattern = format!(
        r"^([0-9]+)_([a-z0-9_]*)\.?([a-z]*)\.{}$",
        regex::escape(extension)
    );
    Regex::new(&pattern).map_err(|e| MigrationError::execution(e.to_string()))
}

fn parse_with(pattern: &Regex, path: &Path) -> MigrationResult<MigrationSource> {
    let illegal = || MigrationError::IllegalName {
        filename: path.display().to_string(),
    };

    let basename = path.file_name().and_then(|n| n.to_str()).ok_or_else(illegal)?;
    let captures = pattern.captures(basename).ok_or_else(illegal)?;

    let version = captures[1].parse::<Version>().map_err(|_| illegal())?;
    let slug = captures[2].to_string();
    let scope = Some(captures[3].to_string()).filter(|s| !s.is_empty());

    Ok(MigrationSource {
        version,
        name: camelize(&slug),
        slug,
        scope,
        filename: path.to_path_buf(),
    })
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension().map_or(false, |ext| ext == extension)
}

/// `create_users_table` -> `CreateUsersTable`
pub fn camelize(name: &str) -> String {
    name.split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

/// Descriptor whose executable logic is loaded on first use
pub struct MigrationProxy<S: ?Sized> {
    source: MigrationSource,
    loader: Arc<dyn MigrationLoader<S>>,
    migration: OnceCell<Box<dyn Migration<S>>>,
}

impl<S: ?Sized> fmt::Debug for MigrationProxy<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationProxy")
            .field("source", &self.source)
            .field("loaded", &self.migration.get().is_some())
            .finish()
    }
}

impl<S> MigrationProxy<S>
where
    S: ?Sized + Sync + 'static,
{
    pub fn new(source: MigrationSource, loader: Arc<dyn MigrationLoader<S>>) -> Self {
        Self {
            source,
            loader,
            migration: OnceCell::new(),
        }
    }

    pub fn source(&self) -> &MigrationSource {
        &self.source
    }

    pub fn version(&self) -> Version {
        self.source.version
    }

    pub fn name(&self) -> &str {
        &self.source.name
    }

    pub fn scope(&self) -> Option<&str> {
        self.source.scope.as_deref()
    }

    pub fn filename(&self) -> &Path {
        &self.source.filename
    }

    /// Whether the executable logic has been bound yet
    pub fn is_loaded(&self) -> bool {
        self.migration.get().is_some()
    }

    /// Bind the executable logic, once
    pub fn migration(&self) -> MigrationResult<&dyn Migration<S>> {
        self.migration
            .get_or_try_init(|| self.loader.load(&self.source))
            .map(|migration| migration.as_ref())
    }

    /// Run the unit in a direction with announcements
    pub async fn migrate(
        &self,
        direction: Direction,
        store: &S,
        reporter: &Reporter,
    ) -> MigrationResult<Option<u64>> {
        let migration = self.migration()?;
        execute(migration, direction, self.version(), self.name(), store, reporter).await
    }

    pub fn announce(&self, reporter: &Reporter, message: &str) {
        reporter.announce(self.version(), self.name(), message);
    }
}
