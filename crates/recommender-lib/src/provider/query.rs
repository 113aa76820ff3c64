//! Relative time windows for metrics queries
//!
//! The metrics backend only understands "how long" and "how long ago"
//! relative to the evaluation time, so an absolute `[start, end]` timeframe
//! has to be turned into a lookback and an offset.

use chrono::{DateTime, Duration, Utc};
use std::fmt;
use std::str::FromStr;

const MINUTE_MS: i64 = 60 * 1000;
const HOUR_MS: i64 = 60 * MINUTE_MS;
const DAY_MS: i64 = 24 * HOUR_MS;
const WEEK_MS: i64 = 7 * DAY_MS;
const YEAR_MS: i64 = 365 * DAY_MS;

/// Units of the backend duration grammar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DurationUnit {
    Minutes,
    Hours,
    Days,
    Weeks,
    Years,
}

impl DurationUnit {
    pub fn suffix(&self) -> char {
        match self {
            DurationUnit::Minutes => 'm',
            DurationUnit::Hours => 'h',
            DurationUnit::Days => 'd',
            DurationUnit::Weeks => 'w',
            DurationUnit::Years => 'y',
        }
    }

    fn millis(&self) -> i64 {
        match self {
            DurationUnit::Minutes => MINUTE_MS,
            DurationUnit::Hours => HOUR_MS,
            DurationUnit::Days => DAY_MS,
            DurationUnit::Weeks => WEEK_MS,
            DurationUnit::Years => YEAR_MS,
        }
    }

    fn from_suffix(c: char) -> Option<Self> {
        match c {
            'm' => Some(DurationUnit::Minutes),
            'h' => Some(DurationUnit::Hours),
            'd' => Some(DurationUnit::Days),
            'w' => Some(DurationUnit::Weeks),
            'y' => Some(DurationUnit::Years),
            _ => None,
        }
    }
}

/// A whole number of one duration unit, rendered like `90d` or `61m`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PromDuration {
    pub value: u64,
    pub unit: DurationUnit,
}

impl PromDuration {
    pub const fn new(value: u64, unit: DurationUnit) -> Self {
        Self { value, unit }
    }

    pub const fn minutes(value: u64) -> Self {
        Self::new(value, DurationUnit::Minutes)
    }

    pub const fn hours(value: u64) -> Self {
        Self::new(value, DurationUnit::Hours)
    }

    pub const fn days(value: u64) -> Self {
        Self::new(value, DurationUnit::Days)
    }

    pub const fn weeks(value: u64) -> Self {
        Self::new(value, DurationUnit::Weeks)
    }

    pub const fn years(value: u64) -> Self {
        Self::new(value, DurationUnit::Years)
    }

    pub fn to_duration(&self) -> Duration {
        Duration::milliseconds((self.value as i64).saturating_mul(self.unit.millis()))
    }
}

impl fmt::Display for PromDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.value, self.unit.suffix())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DurationParseError {
    #[error("duration is empty")]
    Empty,
    #[error("invalid duration '{0}': expected a whole number followed by one of m, h, d, w, y")]
    Invalid(String),
}

impl FromStr for PromDuration {
    type Err = DurationParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let suffix = s.chars().last().ok_or(DurationParseError::Empty)?;
        let unit = DurationUnit::from_suffix(suffix)
            .ok_or_else(|| DurationParseError::Invalid(s.to_string()))?;
        let value = s[..s.len() - suffix.len_utf8()]
            .parse::<u64>()
            .map_err(|_| DurationParseError::Invalid(s.to_string()))?;
        Ok(Self::new(value, unit))
    }
}

/// Range and optional offset of one query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryWindow {
    pub lookback: PromDuration,
    pub offset: Option<PromDuration>,
}

impl QueryWindow {
    /// A window ending now
    pub fn lookback(lookback: PromDuration) -> Self {
        Self {
            lookback,
            offset: None,
        }
    }

    pub fn with_offset(lookback: PromDuration, offset: PromDuration) -> Self {
        Self {
            lookback,
            offset: Some(offset),
        }
    }

    /// Range selector suffix, e.g. `[60m] offset 2h`
    pub fn range_selector(&self) -> String {
        match self.offset {
            Some(offset) => format!("[{}] offset {}", self.lookback, offset),
            None => format!("[{}]", self.lookback),
        }
    }
}

/// Why a timeframe cannot be queried
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WindowError {
    #[error("timeframe start {start} is not before end {end}")]
    Inverted {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    #[error("timeframe end {end} is after now ({now})")]
    InFuture {
        end: DateTime<Utc>,
        now: DateTime<Utc>,
    },
}

/// Translate an absolute `[start, end]` window into a lookback and offset
/// relative to `now`.
///
/// The lookback is the window length in whole minutes, rounded up. The
/// offset is the time elapsed since `end` in the largest readable unit
/// (hours up to a day, days up to a week, weeks up to a year, years beyond),
/// always rounded up so the queried range never extends past `end`.
pub fn timeframe_window(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<QueryWindow, WindowError> {
    if end <= start {
        return Err(WindowError::Inverted { start, end });
    }
    if now < end {
        return Err(WindowError::InFuture { end, now });
    }

    let length_ms = (end - start).num_milliseconds();
    let lookback = PromDuration::minutes(ceil_div(length_ms, MINUTE_MS).max(1));
    let offset = offset_for((now - end).num_milliseconds());

    Ok(QueryWindow::with_offset(lookback, offset))
}

fn offset_for(elapsed_ms: i64) -> PromDuration {
    if elapsed_ms > YEAR_MS {
        PromDuration::years(ceil_div(elapsed_ms, YEAR_MS))
    } else if elapsed_ms > WEEK_MS {
        PromDuration::weeks(ceil_div(elapsed_ms, WEEK_MS))
    } else if elapsed_ms > DAY_MS {
        PromDuration::days(ceil_div(elapsed_ms, DAY_MS))
    } else {
        PromDuration::hours(ceil_div(elapsed_ms, HOUR_MS))
    }
}

fn ceil_div(value: i64, unit: i64) -> u64 {
    if value <= 0 {
        return 0;
    }
    ((value + unit - 1) / unit) as u64
}
