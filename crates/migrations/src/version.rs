//! Migration version numbers
//!
//! A version is a plain unsigned integer, conventionally a `YYYYMMDDHHMMSS`
//! timestamp. Versions are totally ordered and must be unique in a catalog.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

/// Width of a timestamp-style version number
pub const VERSION_WIDTH: usize = 14;

/// Identifier of a migration unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(pub u64);

impl Version {
    /// The version of an empty ledger
    pub const ZERO: Version = Version(0);

    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// The following version number
    pub fn succ(&self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Version {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u64>().map(Version)
    }
}

impl From<u64> for Version {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<Version> for u64 {
    fn from(version: Version) -> Self {
        version.0
    }
}

/// Next number to hand out for a new migration file.
///
/// Returns the current UTC timestamp as 14 digits, unless `number` is
/// larger, in which case `number` zero-padded to 14 digits is returned.
pub fn next_number(number: u64) -> String {
    next_number_at(Utc::now(), number)
}

/// Same as [`next_number`] with an explicit clock reading
pub fn next_number_at(now: DateTime<Utc>, number: u64) -> String {
    let timestamp = now.format("%Y%m%d%H%M%S").to_string();
    let stamp_value = timestamp.parse::<u64>().unwrap_or(0);

    if number > stamp_value {
        format!("{:0width$}", number, width = VERSION_WIDTH)
    } else {
        timestamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn clock() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap()
    }

    #[test]
    fn test_small_number_yields_timestamp() {
        assert_eq!(next_number_at(clock(), 5), "20240309140507");
        assert_eq!(next_number_at(clock(), 0), "20240309140507");
    }

    #[test]
    fn test_future_number_wins_over_clock() {
        assert_eq!(next_number_at(clock(), 20240309140508), "20240309140508");
        assert_eq!(next_number_at(clock(), 99999999999999), "99999999999999");
    }

    #[test]
    fn test_equal_number_keeps_timestamp() {
        assert_eq!(next_number_at(clock(), 20240309140507), "20240309140507");
    }

    #[test]
    fn test_wall_clock_numbering() {
        let number = next_number(5);
        assert_eq!(number.len(), VERSION_WIDTH);
        assert!(number.parse::<u64>().unwrap() > 5);
    }

    #[test]
    fn test_version_parsing_and_ordering() {
        let a: Version = "20240101120000".parse().unwrap();
        let b = Version::new(20240101120001);

        assert!(a < b);
        assert_eq!(a.succ(), b);
        assert_eq!(a.to_string(), "20240101120000");
        assert!("abc".parse::<Version>().is_err());
        assert!(Version::ZERO.is_zero());
    }
}
