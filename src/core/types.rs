//! Core type definitions for identifiers and date codes.

use chrono::{DateTime, Datelike, TimeZone};
use std::fmt;

/// Unique identifier for a task (the configuration section it came from).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(String);

/// Integer encoding of a calendar day, `YYYYMMDD`.
///
/// Date codes are the only ordering key the retention policy uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DateCode(u64);

impl TaskId {
    /// Create a new TaskId from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the underlying string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl DateCode {
    /// Wrap a raw date code.
    pub fn new(code: u64) -> Self {
        Self(code)
    }

    /// Derive the date code of the calendar day `at` falls on.
    ///
    /// Returns `None` outside years 0 to 9999, which have no eight-digit code.
    pub fn from_datetime<Tz: TimeZone>(at: &DateTime<Tz>) -> Option<Self> {
        let year = u64::try_from(at.year()).ok().filter(|y| *y <= 9999)?;
        Some(Self(
            year * 10000 + u64::from(at.month()) * 100 + u64::from(at.day()),
        ))
    }

    /// Parse a date code from a run of ASCII digits.
    ///
    /// Returns `None` for empty input, non-digits, or values that overflow.
    pub fn parse_digits(digits: &str) -> Option<Self> {
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok().map(Self)
    }

    /// Get the raw integer value.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for DateCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08}", self.0)
    }
}
