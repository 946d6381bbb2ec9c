//! Common types and utilities shared across models.
//!
//! Timestamps are stored as fixed-width UTC strings (`2026-03-01T09:30:00Z`)
//! so that lexicographic order in SQL matches chronological order. Dates are
//! `YYYY-MM-DD` and wall-clock times `HH:MM`.

use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, Timelike, Utc};
use serde::{Deserialize, Serialize};

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M";

/// Format an instant for storage, truncated to whole seconds
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    let at = at.with_nanosecond(0).unwrap_or(at);
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Current instant in storage format
pub fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

/// Parse a stored timestamp (any RFC 3339 offset is accepted)
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, DATE_FORMAT).ok()
}

pub fn format_time(time: NaiveTime) -> String {
    time.format(TIME_FORMAT).to_string()
}

pub fn parse_time(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value, TIME_FORMAT).ok()
}

/// Generate a new row id
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Convert SQLite's integer booleans
pub fn int_to_bool(value: i64) -> bool {
    value != 0
}

/// Paging parameters accepted by list endpoints
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct Page {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            offset: 0,
        }
    }
}

impl Page {
    /// Clamp to sane bounds before binding into SQL
    pub fn clamped(self) -> Self {
        Self {
            limit: self.limit.clamp(1, 200),
            offset: self.offset.max(0),
        }
    }
}

fn default_limit() -> i64 {
    50
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamp_format_is_fixed_width() {
        let at = Utc.with_ymd_and_hms(2026, 1, 5, 7, 3, 9).unwrap();
        assert_eq!(format_timestamp(at), "2026-01-05T07:03:09Z");
        assert_eq!(parse_timestamp("2026-01-05T07:03:09Z"), Some(at));
        assert_eq!(parse_timestamp("2026-01-05T10:03:09+03:00"), Some(at));
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn test_timestamps_sort_lexicographically() {
        let early = format_timestamp(Utc.with_ymd_and_hms(2026, 1, 5, 9, 0, 0).unwrap());
        let late = format_timestamp(Utc.with_ymd_and_hms(2026, 1, 5, 10, 0, 0).unwrap());
        assert!(early < late);
    }

    #[test]
    fn test_dates_and_times() {
        let date = NaiveDate::from_ymd_opt(2026, 2, 28).unwrap();
        assert_eq!(format_date(date), "2026-02-28");
        assert_eq!(parse_date("2026-02-28"), Some(date));
        assert_eq!(parse_date("28/02/2026"), None);

        let time = NaiveTime::from_hms_opt(6, 30, 0).unwrap();
        assert_eq!(format_time(time), "06:30");
        assert_eq!(parse_time("06:30"), Some(time));
        assert_eq!(parse_time("25:00"), None);
    }

    #[test]
    fn test_page_clamped() {
        let page = Page { limit: 10_000, offset: -4 }.clamped();
        assert_eq!(page.limit, 200);
        assert_eq!(page.offset, 0);
    }
}
