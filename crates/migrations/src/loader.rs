//! Binding catalog entries to executable logic
//!
//! Discovery only knows filenames. A loader turns a [`MigrationSource`] into a
//! runnable unit when the engine first needs it.

use std::collections::HashMap;
use std::fmt;

use crate::catalog::MigrationSource;
use crate::error::{MigrationError, MigrationResult};
use crate::unit::Migration;

/// Produces the unit behind a catalog entry
pub trait MigrationLoader<S: ?Sized>: Send + Sync {
    fn load(&self, source: &MigrationSource) -> MigrationResult<Box<dyn Migration<S>>>;
}

impl<S, F> MigrationLoader<S> for F
where
    S: ?Sized,
    F: Fn(&MigrationSource) -> MigrationResult<Box<dyn Migration<S>>> + Send + Sync,
{
    fn load(&self, source: &MigrationSource) -> MigrationResult<Box<dyn Migration<S>>> {
        self(source)
    }
}

type Factory<S> = Box<dyn Fn() -> Box<dyn Migration<S>> + Send + Sync>;

/// Compiled-in units keyed by their CamelCase name
pub struct Registry<S: ?Sized> {
    factories: HashMap<String, Factory<S>>,
}

impl<S: ?Sized> fmt::Debug for Registry<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.factories.keys().collect();
        names.sort();
        f.debug_struct("Registry").field("migrations", &names).finish()
    }
}

impl<S: ?Sized + Sync + 'static> Default for Registry<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: ?Sized + Sync + 'static> Registry<S> {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a unit under the CamelCase name its file resolves to
    pub fn register<M, F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        M: Migration<S> + 'static,
        F: Fn() -> M + Send + Sync + 'static,
    {
        self.factories
            .insert(name.into(), Box::new(move || Box::new(factory()) as Box<dyn Migration<S>>));
        self
    }

    /// Chaining form of [`Registry::register`]
    pub fn with<M, F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        M: Migration<S> + 'static,
        F: Fn() -> M + Send + Sync + 'static,
    {
        self.register(name, factory);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl<S: ?Sized + Sync + 'static> MigrationLoader<S> for Registry<S> {
    fn load(&self, source: &MigrationSource) -> MigrationResult<Box<dyn Migration<S>>> {
        self.factories
            .get(&source.name)
            .map(|factory| factory())
            .ok_or_else(|| MigrationError::Unregistered {
                name: source.name.clone(),
                filename: source.filename.clone(),
            })
    }
}
