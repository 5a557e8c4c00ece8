//! Human-readable entry numbers
//!
//! Entry numbers are `JE-YYYYMM-NNNNNN`. The sequence is allocated by the
//! store from an atomic per-month counter keyed by `JE-YYYYMM`.

use chrono::{DateTime, Datelike, NaiveDate, Utc};

use core_kernel::Timezone;

/// Counter key for the business month of `entry_date`
pub fn entry_sequence_key(entry_date: DateTime<Utc>, tz: &Timezone) -> String {
    month_key(tz.local_date(entry_date))
}

fn month_key(date: NaiveDate) -> String {
    format!("JE-{:04}{:02}", date.year(), date.month())
}

/// Formats an entry number from its counter key and sequence value
pub fn format_entry_number(key: &str, sequence: u64) -> String {
    format!("{}-{:06}", key, sequence)
}
