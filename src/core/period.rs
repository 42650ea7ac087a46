//! Task period parsing.
//!
//! A period is written `<integer><unit>` where the unit is one of
//! `w` (weeks), `d` (days), `h` (hours), `m` (minutes) or `s` (seconds),
//! e.g. `1d`, `12h`, `90s`.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when parsing a period.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PeriodError {
    /// The string does not have the `<integer><unit>` shape.
    #[error("invalid period '{0}': expected <integer><w|d|h|m|s>")]
    Malformed(String),

    /// Unknown unit suffix.
    #[error("invalid period '{input}': unknown unit '{unit}'")]
    UnknownUnit { input: String, unit: char },

    /// Periods must be strictly positive.
    #[error("invalid period '{0}': must be greater than zero")]
    Zero(String),

    /// The period does not fit in 64-bit seconds.
    #[error("invalid period '{0}': too large")]
    Overflow(String),

    /// The period exceeds [`Period::MAX`].
    #[error("invalid period '{0}': longer than {max}", max = Period::MAX)]
    TooLong(String),
}

/// A strictly positive task period with whole-second resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Period {
    secs: u64,
}

impl Period {
    /// One day.
    pub const DAY: Period = Period { secs: 86400 };

    /// Longest accepted period, 520 weeks.
    pub const MAX: Period = Period {
        secs: 520 * 7 * 86400,
    };

    /// Build a period from a number of seconds.
    pub fn from_secs(secs: u64) -> Result<Self, PeriodError> {
        Self::checked(secs, || format!("{}s", secs))
    }

    fn checked(secs: u64, input: impl FnOnce() -> String) -> Result<Self, PeriodError> {
        if secs == 0 {
            return Err(PeriodError::Zero(input()));
        }
        if secs > Self::MAX.secs {
            return Err(PeriodError::TooLong(input()));
        }
        Ok(Self { secs })
    }

    /// Parse a period string like "1d", "6h", "30m".
    pub fn parse(s: &str) -> Result<Self, PeriodError> {
        let trimmed = s.trim();
        let mut chars = trimmed.chars();
        let unit = chars
            .next_back()
            .ok_or_else(|| PeriodError::Malformed(s.to_string()))?;
        let digits = chars.as_str();

        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(PeriodError::Malformed(s.to_string()));
        }

        let num: u64 = digits
            .parse()
            .map_err(|_| PeriodError::Overflow(s.to_string()))?;

        let multiplier: u64 = match unit {
            's' => 1,
            'm' => 60,
            'h' => 3600,
            'd' => 86400,
            'w' => 7 * 86400,
            other => {
                return Err(PeriodError::UnknownUnit {
                    input: s.to_string(),
                    unit: other,
                });
            }
        };

        let secs = num
            .checked_mul(multiplier)
            .ok_or_else(|| PeriodError::Overflow(s.to_string()))?;

        Self::checked(secs, || s.to_string())
    }

    /// Length of the period in seconds.
    pub fn as_secs(&self) -> u64 {
        self.secs
    }

    /// The period as a `Duration`.
    pub fn as_duration(&self) -> Duration {
        Duration::from_secs(self.secs)
    }
}

impl FromStr for Period {
    type Err = PeriodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const UNITS: [(u64, char); 4] = [(7 * 86400, 'w'), (86400, 'd'), (3600, 'h'), (60, 'm')];
        for (size, unit) in UNITS {
            if self.secs % size == 0 {
                return write!(f, "{}{}", self.secs / size, unit);
            }
        }
        write!(f, "{}s", self.secs)
    }
}
