//! Migration Definitions - Core types shared by the engine
//!
//! Direction of travel, ledger records, run summaries and status rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::version::Version;

/// Migration direction for execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Apply the migration
    Up,
    /// Revert the migration
    Down,
}

impl Direction {
    pub fn is_up(&self) -> bool {
        matches!(self, Direction::Up)
    }

    pub fn is_down(&self) -> bool {
        matches!(self, Direction::Down)
    }

    /// Announcement printed before a unit runs
    pub fn starting_message(&self) -> &'static str {
        match self {
            Direction::Up => "migrating",
            Direction::Down => "reverting",
        }
    }

    /// Announcement printed after a unit ran, without the timing suffix
    pub fn completed_message(&self) -> &'static str {
        match self {
            Direction::Up => "migrated",
            Direction::Down => "reverted",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => write!(f, "up"),
            Direction::Down => write!(f, "down"),
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "up" => Ok(Direction::Up),
            "down" => Ok(Direction::Down),
            other => Err(format!("unknown migration direction '{}', expected up or down", other)),
        }
    }
}

/// A ledger entry: this version has been applied
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRecord {
    pub version: Version,
    pub applied_at: DateTime<Utc>,
}

impl MigrationRecord {
    pub fn new(version: Version) -> Self {
        Self {
            version,
            applied_at: Utc::now(),
        }
    }
}

/// Result of a ranged migration run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationRunResult {
    pub direction: Direction,
    /// Versions whose logic ran, in execution order
    pub executed: Vec<Version>,
    /// Versions passed over because they were already in the requested state
    pub skipped: Vec<Version>,
    pub execution_time_ms: u128,
}

impl MigrationRunResult {
    pub fn empty(direction: Direction) -> Self {
        Self {
            direction,
            executed: Vec::new(),
            skipped: Vec::new(),
            execution_time_ms: 0,
        }
    }

    pub fn executed_count(&self) -> usize {
        self.executed.len()
    }

    pub fn is_noop(&self) -> bool {
        self.executed.is_empty()
    }
}

/// Migration status in the system
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum MigrationStatus {
    /// Present in the catalog, not in the ledger
    Pending,
    /// Present in the catalog and in the ledger
    Applied { applied_at: DateTime<Utc> },
    /// In the ledger, but no file carries this version
    Orphaned { applied_at: DateTime<Utc> },
}

impl MigrationStatus {
    pub fn is_applied(&self) -> bool {
        !matches!(self, MigrationStatus::Pending)
    }
}

/// One row of a status report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusEntry {
    pub version: Version,
    pub name: Option<String>,
    pub filename: Option<PathBuf>,
    pub status: MigrationStatus,
}
