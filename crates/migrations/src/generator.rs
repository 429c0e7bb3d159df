//! New migration files
//!
//! Numbers handed out are UTC timestamps, unless the directory already holds a
//! version at or beyond the current second.

use chrono::{DateTime, Utc};
use std::fs;

use crate::catalog::{camelize, parse_filename, MigrationCatalog, MigrationSource};
use crate::copier::comment_prefix;
use crate::error::{MigrationError, MigrationResult};
use crate::version::next_number_at;

/// Number for the next migration file in the catalog's directory
pub fn next_migration_number(catalog: &MigrationCatalog) -> MigrationResult<String> {
    next_migration_number_at(catalog, Utc::now())
}

pub fn next_migration_number_at(
    catalog: &MigrationCatalog,
    now: DateTime<Utc>,
) -> MigrationResult<String> {
    let last = catalog.last_version()?;
    Ok(next_number_at(now, last.succ().as_u64()))
}

/// Write an empty migration named `name` into the catalog's directory
pub fn create_migration(catalog: &MigrationCatalog, name: &str) -> MigrationResult<MigrationSource> {
    create_migration_at(catalog, name, Utc::now())
}

pub fn create_migration_at(
    catalog: &MigrationCatalog,
    name: &str,
    now: DateTime<Utc>,
) -> MigrationResult<MigrationSource> {
    let slug = underscore(name);
    let existing = catalog.scan()?;
    if existing.iter().any(|m| m.name == camelize(&slug)) {
        return Err(MigrationError::DuplicateName(camelize(&slug)));
    }

    let number = next_migration_number_at(catalog, now)?;
    let filename = catalog
        .dir()
        .join(format!("{}_{}.{}", number, slug, catalog.extension()));

    // Reject names the catalog would refuse before anything touches the disk
    let source = parse_filename(&filename, catalog.extension())?;

    fs::create_dir_all(catalog.dir())?;
    fs::write(
        &filename,
        migration_template(&source, catalog.extension(), now),
    )?;

    tracing::info!("Created migration {}", filename.display());
    Ok(source)
}

fn migration_template(source: &MigrationSource, extension: &str, now: DateTime<Utc>) -> String {
    let comment = comment_prefix(extension);
    format!(
        "{c} Migration: {name}\n\
         {c} Version: {version}\n\
         {c} Created: {created}\n\n\
         {c} Up migration\n\
         {c} Add your schema changes here\n\n\n\
         {c} Down migration\n\
         {c} Add rollback statements here\n",
        c = comment,
        name = source.name,
        version = source.version,
        created = now.format("%Y-%m-%d %H:%M:%S UTC"),
    )
}

/// `AddProducts`, `add products` and `add-products` all become `add_products`
pub fn underscore(name: &str) -> String {
    let mut slug = String::with_capacity(name.len() + 4);
    let mut previous: Option<char> = None;

    for ch in name.trim().chars() {
        if ch.is_whitespace() || ch == '-' {
            if !slug.ends_with('_') {
                slug.push('_');
            }
        } else if ch.is_uppercase() {
            if previous.map_or(false, |p| p.is_lowercase() || p.is_ascii_digit()) {
                slug.push('_');
            }
            slug.extend(ch.to_lowercase());
        } else {
            slug.push(ch);
        }
        previous = Some(ch);
    }

    slug
}
