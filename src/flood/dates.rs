//! Fixed-width UTC timestamps and date ranges.
//!
//! Timestamps are formatted as `YYYY-MM-DDTHHMMSS.ffffffZ`, so their
//! lexical order coincides with chronological order everywhere keys are
//! compared as strings.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use lazy_static::lazy_static;

use crate::{Error, Result};

/// Timestamp format, microsecond precision, fixed width.
pub const TS_FORMAT: &str = "%Y-%m-%dT%H%M%S%.6fZ";

lazy_static! {
    /// Lower bound standing in for an unspecified from-date.
    pub static ref DISTANT_PAST: DateTime<Utc> = DateTime::from_utc(
        NaiveDate::from_ymd(1, 1, 1).and_hms_micro(0, 0, 0, 0),
        Utc
    );
    /// Upper bound standing in for an unspecified to-date.
    pub static ref FAR_FUTURE: DateTime<Utc> = DateTime::from_utc(
        NaiveDate::from_ymd(5000, 1, 1).and_hms_micro(0, 0, 0, 0),
        Utc
    );
}

/// Format `date` as a fixed-width timestamp.
pub fn to_timestamp(date: &DateTime<Utc>) -> String {
    date.format(TS_FORMAT).to_string()
}

/// Parse a fixed-width timestamp back into a date.
pub fn from_timestamp(ts: &str) -> Result<DateTime<Utc>> {
    let naive = err_at!(FailConvert, NaiveDateTime::parse_from_str(ts, TS_FORMAT), "{:?}", ts)?;
    Ok(DateTime::from_utc(naive, Utc))
}

/// Current time as a fixed-width timestamp.
pub fn timestamp_now() -> String {
    to_timestamp(&Utc::now())
}

/// A date range, exclusive of its start and inclusive of its end.
///
/// Unspecified bounds default to [DISTANT_PAST] and [FAR_FUTURE].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Result<DateRange> {
        let start = start.unwrap_or(*DISTANT_PAST);
        let end = end.unwrap_or(*FAR_FUTURE);
        if start > end {
            err_at!(InvalidInput, msg: "date range {} > {}", start, end)
        } else {
            Ok(DateRange { start, end })
        }
    }

    /// Test whether `(start : end]` contains `date`.
    pub fn contains(&self, date: &DateTime<Utc>) -> bool {
        self.start < *date && *date <= self.end
    }

    /// Test whether the closed intervals `[start : end]` intersect.
    pub fn overlaps(&self, other: &DateRange) -> bool {
        let (a, b) = (self, other);
        (b.start <= a.start && a.end <= b.end)
            || (a.start <= b.start && b.end <= a.end)
            || (a.start <= b.start && b.start < a.end)
            || (a.start <= b.end && b.end <= a.end)
    }

    /// Test whether `date` falls past the end of the range. A range with
    /// an unspecified end has no future.
    pub fn is_future(&self, date: &DateTime<Utc>) -> bool {
        self.end != *FAR_FUTURE && *date > self.end
    }
}

#[cfg(test)]
#[path = "dates_test.rs"]
mod dates_test;
