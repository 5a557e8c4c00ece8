//! Business calendar and accounting periods
//!
//! Batch windows, reconciliation windows and settlement periods are all
//! expressed in the platform's business timezone (East Africa Time by
//! default). Every calculation here takes its "as of" instant as an explicit
//! argument; nothing reads the wall clock.

use chrono::{DateTime, Datelike, Days, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use std::str::FromStr;

/// Default business timezone of the platform
pub const DEFAULT_TIMEZONE: &str = "Africa/Nairobi";

/// Errors related to temporal operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemporalError {
    #[error("Invalid period: start {start} must be before end {end}")]
    InvalidPeriod {
        start: String,
        end: String,
    },

    #[error("Unknown timezone: {0}")]
    UnknownTimezone(String),

    #[error("Local time {0} does not exist in the business timezone")]
    NonexistentLocalTime(String),
}

/// Timezone wrapper for the business calendar
///
/// Wraps chrono_tz::Tz with custom serialization support.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timezone(pub Tz);

impl Serialize for Timezone {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.0.name())
    }
}

impl<'de> Deserialize<'de> for Timezone {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Timezone::from_name(&s).map_err(serde::de::Error::custom)
    }
}

impl Timezone {
    pub fn new(tz: Tz) -> Self {
        Self(tz)
    }

    /// Parses an IANA timezone name
    pub fn from_name(name: &str) -> Result<Self, TemporalError> {
        Tz::from_str(name)
            .map(Timezone)
            .map_err(|_| TemporalError::UnknownTimezone(name.to_string()))
    }

    /// The business-local calendar date of an instant
    pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.0).date_naive()
    }

    /// Gets the start of day (00:00) in this timezone as UTC
    pub fn start_of_day(&self, date: NaiveDate) -> Result<DateTime<Utc>, TemporalError> {
        date.and_hms_opt(0, 0, 0)
            .and_then(|naive| naive.and_local_timezone(self.0).earliest())
            .map(|local| local.with_timezone(&Utc))
            .ok_or_else(|| TemporalError::NonexistentLocalTime(date.to_string()))
    }

    /// The half-open UTC interval covering one business day
    pub fn day_period(&self, date: NaiveDate) -> Result<Period, TemporalError> {
        let next = date
            .checked_add_days(Days::new(1))
            .ok_or_else(|| TemporalError::NonexistentLocalTime(date.to_string()))?;
        Period::new(self.start_of_day(date)?, self.start_of_day(next)?)
    }

    /// The half-open UTC interval covering the business month containing `date`
    pub fn month_period(&self, date: NaiveDate) -> Result<Period, TemporalError> {
        let first = date.with_day(1).ok_or_else(|| TemporalError::NonexistentLocalTime(date.to_string()))?;
        let next_first = if first.month() == 12 {
            NaiveDate::from_ymd_opt(first.year() + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(first.year(), first.month() + 1, 1)
        }
        .ok_or_else(|| TemporalError::NonexistentLocalTime(date.to_string()))?;

        Period::new(self.start_of_day(first)?, self.start_of_day(next_first)?)
    }

    /// A window of business days `date - grace ..= date + grace`
    pub fn day_window(&self, date: NaiveDate, grace_days: u32) -> Result<Period, TemporalError> {
        let grace = Days::new(u64::from(grace_days));
        let first = date
            .checked_sub_days(grace)
            .ok_or_else(|| TemporalError::NonexistentLocalTime(date.to_string()))?;
        let last = date
            .checked_add_days(grace)
            .ok_or_else(|| TemporalError::NonexistentLocalTime(date.to_string()))?;

        Period::new(self.day_period(first)?.start, self.day_period(last)?.end)
    }

    /// Widens a window of whole business days by `days` local calendar days on each side
    ///
    /// Counted on local dates, so a DST change inside the grace does not
    /// shift the bounds off midnight.
    pub fn widen(&self, window: Period, days: u32) -> Result<Period, TemporalError> {
        let grace = Days::new(u64::from(days));
        let first = self
            .local_date(window.start)
            .checked_sub_days(grace)
            .ok_or_else(|| TemporalError::NonexistentLocalTime(window.start.to_string()))?;
        let end = self
            .local_date(window.end)
            .checked_add_days(grace)
            .ok_or_else(|| TemporalError::NonexistentLocalTime(window.end.to_string()))?;

        Period::new(self.start_of_day(first)?, self.start_of_day(end)?)
    }
}

impl Default for Timezone {
    fn default() -> Self {
        Self(chrono_tz::Africa::Nairobi)
    }
}

/// A half-open interval of instants `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Period {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, TemporalError> {
        if start >= end {
            return Err(TemporalError::InvalidPeriod {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        Ok(Self { start, end })
    }

    /// Returns true if this period contains the given timestamp
    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        timestamp >= self.start && timestamp < self.end
    }

    /// Returns the duration of the period
    pub fn duration(&self) -> chrono::Duration {
        self.end - self.start
    }
}
