//! SQL file migrations
//!
//! A SQL migration file carries an up section and an optional down section:
//!
//! ```sql
//! -- Up migration
//! CREATE TABLE users (id SERIAL PRIMARY KEY);
//!
//! -- Down migration
//! DROP TABLE users;
//! ```
//!
//! A file without a down section does not revert (reverting it is a no-op).
//! A down section containing `-- irreversible` refuses to revert.

use async_trait::async_trait;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use sqlx::PgPool;
use std::fs;
use std::path::Path;

use crate::catalog::MigrationSource;
use crate::definitions::Direction;
use crate::error::{MigrationError, MigrationResult};
use crate::loader::MigrationLoader;
use crate::unit::{Migration, MigrationContext};

/// A store that can run SQL statements
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    /// Execute one statement and return the affected row count
    async fn execute(&self, statement: &str) -> MigrationResult<u64>;

    /// Execute the statements of one migration unit
    async fn execute_batch(&self, statements: &[String]) -> MigrationResult<u64> {
        let mut total = 0;
        for statement in statements {
            total += self.execute(statement).await?;
        }
        Ok(total)
    }
}

#[async_trait]
impl SqlExecutor for PgPool {
    async fn execute(&self, statement: &str) -> MigrationResult<u64> {
        let result = sqlx::query(statement).execute(self).await?;
        Ok(result.rows_affected())
    }

    /// Runs inside one transaction, so a failing unit leaves no partial changes
    async fn execute_batch(&self, statements: &[String]) -> MigrationResult<u64> {
        let mut transaction = self.begin().await?;

        let mut total = 0;
        for statement in statements {
            let result = sqlx::query(statement).execute(&mut *transaction).await?;
            total += result.rows_affected();
        }

        transaction.commit().await?;
        Ok(total)
    }
}

/// Parsed contents of a SQL migration file
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SqlMigration {
    up: Vec<String>,
    down: Vec<String>,
    irreversible: bool,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    Preamble,
    Up,
    Down,
}

impl SqlMigration {
    pub fn new(up: Vec<String>, down: Vec<String>) -> Self {
        Self {
            up,
            down,
            irreversible: false,
        }
    }

    /// Parse file content into up and down statements
    pub fn parse(content: &str, filename: &Path) -> MigrationResult<Self> {
        let mut up_sql = Vec::new();
        let mut down_sql = Vec::new();
        let mut preamble = Vec::new();
        let mut irreversible = false;
        let mut section = Section::Preamble;
        let mut seen_up = false;
        let mut seen_down = false;

        for line in content.lines() {
            let trimmed = line.trim().to_lowercase();

            match section_marker(&trimmed) {
                Some(Section::Up) => {
                    if seen_up {
                        return Err(syntax_error(filename, "more than one up section"));
                    }
                    seen_up = true;
                    section = Section::Up;
                    continue;
                }
                Some(Section::Down) => {
                    if seen_down {
                        return Err(syntax_error(filename, "more than one down section"));
                    }
                    seen_down = true;
                    section = Section::Down;
                    continue;
                }
                _ => {}
            }
            if section == Section::Down && trimmed == "-- irreversible" {
                irreversible = true;
                continue;
            }

            if trimmed.is_empty() || trimmed.starts_with("--") {
                continue;
            }

            match section {
                Section::Preamble => preamble.push(line),
                Section::Up => up_sql.push(line),
                Section::Down => down_sql.push(line),
            }
        }

        // Files without markers are all up
        if !seen_up && !seen_down {
            up_sql = preamble;
        }

        Ok(Self {
            up: split_sql_statements(&up_sql.join("\n")),
            down: split_sql_statements(&down_sql.join("\n")),
            irreversible,
        })
    }

    /// Read and parse a migration file
    pub fn from_file(path: &Path) -> MigrationResult<Self> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content, path)
    }

    pub fn up_statements(&self) -> &[String] {
        &self.up
    }

    pub fn down_statements(&self) -> &[String] {
        &self.down
    }

    pub fn is_irreversible(&self) -> bool {
        self.irreversible
    }
}

/// A marker is a whole comment line: `-- Up`, `-- Up migration`, `-- Down`
/// or `-- Down migration`. Any other comment is just a comment.
fn section_marker(line: &str) -> Option<Section> {
    let words: Vec<&str> = line.strip_prefix("--")?.split_whitespace().collect();
    let section = match words.first().copied() {
        Some("up") => Section::Up,
        Some("down") => Section::Down,
        _ => return None,
    };
    match words[1..] {
        [] | ["migration"] => Some(section),
        _ => None,
    }
}

fn syntax_error(filename: &Path, message: &str) -> MigrationError {
    MigrationError::InvalidSyntax {
        filename: filename.to_path_buf(),
        message: message.to_string(),
    }
}

#[async_trait]
impl<S> Migration<S> for SqlMigration
where
    S: SqlExecutor + ?Sized,
{
    fn handles(&self, direction: Direction) -> bool {
        match direction {
            Direction::Up => !self.up.is_empty(),
            Direction::Down => self.irreversible || !self.down.is_empty(),
        }
    }

    async fn up(&self, ctx: &MigrationContext<'_, S>) -> MigrationResult<Option<u64>> {
        let rows = ctx.store().execute_batch(&self.up).await?;
        Ok(Some(rows))
    }

    async fn down(&self, ctx: &MigrationContext<'_, S>) -> MigrationResult<Option<u64>> {
        if self.irreversible {
            return Err(MigrationError::irreversible(format!(
                "{} ({}) cannot be reverted",
                ctx.name(),
                ctx.version()
            )));
        }
        let rows = ctx.store().execute_batch(&self.down).await?;
        Ok(Some(rows))
    }
}

/// Loads units by parsing the migration file as SQL
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlFileLoader;

impl<S> MigrationLoader<S> for SqlFileLoader
where
    S: SqlExecutor + ?Sized + 'static,
{
    fn load(&self, source: &MigrationSource) -> MigrationResult<Box<dyn Migration<S>>> {
        Ok(Box::new(SqlMigration::from_file(&source.filename)?))
    }
}

/// Split SQL statements for execution using proper SQL parsing
pub fn split_sql_statements(sql: &str) -> Vec<String> {
    if sql.trim().is_empty() {
        return Vec::new();
    }

    let dialect = GenericDialect {};
    match Parser::parse_sql(&dialect, sql) {
        Ok(statements) => statements
            .into_iter()
            .map(|statement| format!("{};", statement))
            .collect(),
        Err(e) => {
            tracing::warn!("SQL parsing failed, using naive semicolon splitting: {}", e);
            sql.split(';')
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(|s| format!("{};", s))
                .collect()
        }
    }
}
