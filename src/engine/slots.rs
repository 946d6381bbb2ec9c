//! Free booking slots for a coach on a given day.
//!
//! A slot must fit inside the gym's opening hours and one of the coach's
//! availability windows for that weekday, must not overlap a scheduled
//! booking, and must start no earlier than `not_before`. Coaches without
//! any availability configured are treated as available whenever the gym
//! is open.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::Serialize;

use super::scheduler::intervals_overlap;
use crate::db::{
    parse_timestamp, Booking, BookingListQuery, BookingStatus, CoachAvailability, WorkingHours,
    MAX_SESSION_MINUTES,
};
use crate::utils::{gym_offset, local_day_bounds};
use crate::DbPool;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Slot {
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

/// Everything needed to compute one day's slots
#[derive(Debug, Clone)]
pub struct DayPlan {
    pub date: NaiveDate,
    pub utc_offset_minutes: i32,
    /// Opening hours, `None` when the gym is closed
    pub open: Option<(NaiveTime, NaiveTime)>,
    /// Coach windows; `None` means no availability is configured at all
    pub availability: Option<Vec<(NaiveTime, NaiveTime)>>,
    pub busy: Vec<(DateTime<Utc>, DateTime<Utc>)>,
    pub session_minutes: i64,
    pub not_before: DateTime<Utc>,
}

/// Weekday index used by the settings tables (0 = Monday)
pub fn weekday_index(date: NaiveDate) -> i64 {
    date.weekday().num_days_from_monday() as i64
}

pub fn compute_slots(plan: &DayPlan) -> Vec<Slot> {
    let Some((open, close)) = plan.open else {
        return Vec::new();
    };
    if plan.session_minutes <= 0 {
        return Vec::new();
    }

    let windows = match &plan.availability {
        Some(windows) => windows.clone(),
        None => vec![(open, close)],
    };

    let offset = gym_offset(plan.utc_offset_minutes);
    let to_utc = |time: NaiveTime| {
        offset
            .from_local_datetime(&plan.date.and_time(time))
            .single()
            .map(|local| local.with_timezone(&Utc))
    };
    let length = Duration::minutes(plan.session_minutes);

    let mut slots = Vec::new();
    for (window_start, window_end) in windows {
        let start = window_start.max(open);
        let end = window_end.min(close);
        let (Some(mut cursor), Some(end)) = (to_utc(start), to_utc(end)) else {
            continue;
        };

        while cursor + length <= end {
            let slot_end = cursor + length;
            let free = !plan
                .busy
                .iter()
                .any(|(busy_start, busy_end)| intervals_overlap(cursor, slot_end, *busy_start, *busy_end));
            if free && cursor >= plan.not_before {
                slots.push(Slot {
                    starts_at: cursor,
                    ends_at: slot_end,
                });
            }
            cursor = slot_end;
        }
    }

    slots.sort_by_key(|slot| slot.starts_at);
    slots.dedup_by_key(|slot| slot.starts_at);
    slots
}

/// Load the day's configuration and bookings, then compute free slots
pub async fn available_slots(
    db: &DbPool,
    coach_id: &str,
    date: NaiveDate,
    session_minutes: i64,
    utc_offset_minutes: i32,
    not_before: DateTime<Utc>,
) -> Result<Vec<Slot>, sqlx::Error> {
    let weekday = weekday_index(date);

    let open = WorkingHours::for_weekday(db, weekday)
        .await?
        .and_then(|hours| hours.open_interval());

    let availability = if CoachAvailability::list_for_coach(db, coach_id).await?.is_empty() {
        None
    } else {
        Some(
            CoachAvailability::for_coach_weekday(db, coach_id, weekday)
                .await?
                .iter()
                .filter_map(CoachAvailability::interval)
                .collect(),
        )
    };

    let (day_start, day_end) = local_day_bounds(date, utc_offset_minutes);
    let query = BookingListQuery {
        // Include sessions that started the evening before and run past midnight
        from: Some(day_start - Duration::minutes(MAX_SESSION_MINUTES)),
        to: Some(day_end),
        status: Some(BookingStatus::Scheduled),
    };
    let busy = Booking::list_for_coach(db, coach_id, &query)
        .await?
        .into_iter()
        .filter_map(|booking| {
            let start = parse_timestamp(&booking.scheduled_at)?;
            Some((start, start + Duration::minutes(booking.duration_minutes)))
        })
        .collect();

    Ok(compute_slots(&DayPlan {
        date,
        utc_offset_minutes,
        open,
        availability,
        busy,
        session_minutes,
        not_before,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn utc(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 4, h, m, 0).unwrap()
    }

    fn plan() -> DayPlan {
        DayPlan {
            date: NaiveDate::from_ymd_opt(2026, 5, 4).unwrap(),
            utc_offset_minutes: 0,
            open: Some((time(6, 0), time(22, 0))),
            availability: Some(vec![(time(9, 0), time(12, 0))]),
            busy: Vec::new(),
            session_minutes: 60,
            not_before: utc(0, 0),
        }
    }

    fn starts(slots: &[Slot]) -> Vec<DateTime<Utc>> {
        slots.iter().map(|s| s.starts_at).collect()
    }

    #[test]
    fn test_weekday_index_starts_monday() {
        // 2026-05-04 is a Monday
        assert_eq!(weekday_index(NaiveDate::from_ymd_opt(2026, 5, 4).unwrap()), 0);
        assert_eq!(weekday_index(NaiveDate::from_ymd_opt(2026, 5, 10).unwrap()), 6);
    }

    #[test]
    fn test_slots_skip_busy_intervals() {
        let mut plan = plan();
        plan.busy = vec![(utc(10, 0), utc(11, 0))];
        assert_eq!(starts(&compute_slots(&plan)), vec![utc(9, 0), utc(11, 0)]);
    }

    #[test]
    fn test_slots_clip_to_opening_hours_and_not_before() {
        let mut plan = plan();
        plan.open = Some((time(10, 0), time(22, 0)));
        plan.not_before = utc(10, 30);
        assert_eq!(starts(&compute_slots(&plan)), vec![utc(11, 0)]);
    }

    #[test]
    fn test_closed_day_and_missing_availability() {
        let mut closed = plan();
        closed.open = None;
        assert!(compute_slots(&closed).is_empty());

        let mut unconfigured = plan();
        unconfigured.availability = None;
        unconfigured.open = Some((time(6, 0), time(8, 0)));
        assert_eq!(starts(&compute_slots(&unconfigured)), vec![utc(6, 0), utc(7, 0)]);

        let mut off_today = plan();
        off_today.availability = Some(Vec::new());
        assert!(compute_slots(&off_today).is_empty());
    }

    #[test]
    fn test_local_offset_shifts_slots() {
        let mut plan = plan();
        plan.utc_offset_minutes = 120;
        plan.availability = Some(vec![(time(9, 0), time(10, 0))]);
        assert_eq!(starts(&compute_slots(&plan)), vec![utc(7, 0)]);
    }
}
