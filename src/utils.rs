//! Small helpers shared by the API and engine modules.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, FixedOffset, NaiveDate, NaiveTime, Offset, Utc};
use std::future::Future;
use std::path::Path;
use std::time::Duration;

/// Create a directory (and parents) if it does not exist yet
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)
            .with_context(|| format!("Failed to create directory: {}", path.display()))?;
    }
    Ok(())
}

/// Returned by [`with_timeout`] when the wrapped future did not finish in time
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("operation timed out after {0:?}")]
pub struct TimedOut(pub Duration);

/// Await `future`, giving up after `limit`
pub async fn with_timeout<F, T>(limit: Duration, future: F) -> Result<T, TimedOut>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(limit, future)
        .await
        .map_err(|_| TimedOut(limit))
}

/// Fixed offset of the gym's local clock. Out-of-range offsets fall back to UTC.
pub fn gym_offset(utc_offset_minutes: i32) -> FixedOffset {
    FixedOffset::east_opt(utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix())
}

/// Calendar date at the gym for the given instant
pub fn local_date(now: DateTime<Utc>, utc_offset_minutes: i32) -> NaiveDate {
    now.with_timezone(&gym_offset(utc_offset_minutes)).date_naive()
}

/// UTC bounds `[start, end)` of a local calendar day at the gym
pub fn local_day_bounds(date: NaiveDate, utc_offset_minutes: i32) -> (DateTime<Utc>, DateTime<Utc>) {
    let midnight = date.and_time(NaiveTime::MIN);
    let offset = ChronoDuration::minutes(utc_offset_minutes as i64);
    let start = DateTime::<Utc>::from_naive_utc_and_offset(midnight - offset, Utc);
    (start, start + ChronoDuration::days(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test]
    async fn test_with_timeout_returns_value() {
        let value = with_timeout(Duration::from_secs(1), async { 42 }).await;
        assert_eq!(value, Ok(42));
    }

    #[tokio::test]
    async fn test_with_timeout_expires() {
        let result = with_timeout(
            Duration::from_millis(10),
            tokio::time::sleep(Duration::from_secs(5)),
        )
        .await;
        assert_eq!(result, Err(TimedOut(Duration::from_millis(10))));
    }

    #[test]
    fn test_local_date_with_offset() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 22, 30, 0).unwrap();
        assert_eq!(local_date(now, 0), NaiveDate::from_ymd_opt(2026, 3, 1).unwrap());
        // UTC+3 is already the next day
        assert_eq!(local_date(now, 180), NaiveDate::from_ymd_opt(2026, 3, 2).unwrap());
    }

    #[test]
    fn test_local_day_bounds() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let (start, end) = local_day_bounds(date, 180);
        assert_eq!(start, Utc.with_ymd_and_hms(2026, 3, 1, 21, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2026, 3, 2, 21, 0, 0).unwrap());
    }
}
