//! Booking workflow: conflict detection, reservation and status transitions.
//!
//! Both writes run inside a single SQLite transaction. Reservation opens
//! with a write to the coach row, so the transaction holds the database
//! write lock before the conflict check runs and two requests for the same
//! slot are serialized instead of both passing the check.

use chrono::{DateTime, Duration, Utc};
use sqlx::SqliteConnection;

use crate::db::{
    format_timestamp, new_id, now_timestamp, parse_timestamp, Booking, BookingStatus, PTPackage,
    MAX_SESSION_MINUTES,
};
use crate::DbPool;

#[derive(Debug, thiserror::Error)]
pub enum SchedulingError {
    #[error("This time slot is no longer available")]
    SlotUnavailable,
    #[error("Coach is not available for booking")]
    CoachUnavailable,
    #[error("{0}")]
    PackageUnavailable(&'static str),
    #[error("Booking not found")]
    BookingNotFound,
    #[error("Cannot change a {from} booking to {to}")]
    InvalidTransition {
        from: BookingStatus,
        to: BookingStatus,
    },
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Half-open overlap: `[a_start, a_end)` and `[b_start, b_end)` share an instant
pub fn intervals_overlap<T: PartialOrd>(a_start: T, a_end: T, b_start: T, b_end: T) -> bool {
    a_start < b_end && b_start < a_end
}

/// Whether any scheduled booking of `coach_id` overlaps `[start, start + duration)`
pub async fn has_conflict(
    conn: &mut SqliteConnection,
    coach_id: &str,
    start: DateTime<Utc>,
    duration_minutes: i64,
) -> Result<bool, sqlx::Error> {
    let end = start + Duration::minutes(duration_minutes);
    // Nothing starting earlier than this can still be running at `start`
    let earliest = start - Duration::minutes(MAX_SESSION_MINUTES);

    let candidates: Vec<(String, i64)> = sqlx::query_as(
        r#"
        SELECT scheduled_at, duration_minutes FROM bookings
        WHERE coach_id = ? AND status = 'scheduled'
          AND scheduled_at >= ? AND scheduled_at < ?
        "#,
    )
    .bind(coach_id)
    .bind(format_timestamp(earliest))
    .bind(format_timestamp(end))
    .fetch_all(&mut *conn)
    .await?;

    Ok(candidates.iter().any(|(scheduled_at, minutes)| {
        parse_timestamp(scheduled_at)
            .map(|other_start| {
                let other_end = other_start + Duration::minutes(*minutes);
                intervals_overlap(start, end, other_start, other_end)
            })
            // Unparseable rows count as conflicts
            .unwrap_or(true)
    }))
}

/// A validated booking request
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub member_id: String,
    pub coach_id: String,
    pub package_id: Option<String>,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: i64,
    pub notes: Option<String>,
}

/// Reserve the slot and insert the booking atomically
pub async fn create_booking(db: &DbPool, new: &NewBooking) -> Result<Booking, SchedulingError> {
    let mut tx = db.begin().await?;

    let locked = sqlx::query(
        "UPDATE coaches SET updated_at = updated_at WHERE id = ? AND is_active = 1",
    )
    .bind(&new.coach_id)
    .execute(&mut *tx)
    .await?;
    if locked.rows_affected() == 0 {
        return Err(SchedulingError::CoachUnavailable);
    }

    if let Some(package_id) = &new.package_id {
        check_package(&mut tx, package_id, new).await?;
    }

    if has_conflict(&mut tx, &new.coach_id, new.scheduled_at, new.duration_minutes).await? {
        tracing::info!(
            coach_id = %new.coach_id,
            scheduled_at = %new.scheduled_at,
            "Booking rejected: slot taken"
        );
        return Err(SchedulingError::SlotUnavailable);
    }

    let id = new_id();
    let now = now_timestamp();
    sqlx::query(
        r#"
        INSERT INTO bookings
            (id, member_id, coach_id, package_id, scheduled_at, duration_minutes, status, notes, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, 'scheduled', ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&new.member_id)
    .bind(&new.coach_id)
    .bind(&new.package_id)
    .bind(format_timestamp(new.scheduled_at))
    .bind(new.duration_minutes)
    .bind(&new.notes)
    .bind(&now)
    .bind(&now)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(
        booking_id = %id,
        coach_id = %new.coach_id,
        member_id = %new.member_id,
        scheduled_at = %new.scheduled_at,
        "Booking created"
    );

    Booking::get_by_id(db, &id)
        .await?
        .ok_or(SchedulingError::BookingNotFound)
}

/// The package must belong to this member and coach and have a session
/// left that is not already held by another scheduled booking.
async fn check_package(
    conn: &mut SqliteConnection,
    package_id: &str,
    new: &NewBooking,
) -> Result<(), SchedulingError> {
    let package = PTPackage::get_for_update(&mut *conn, package_id)
        .await?
        .filter(|p| p.member_id == new.member_id)
        .ok_or(SchedulingError::PackageUnavailable("PT package not found"))?;

    if package.coach_id != new.coach_id {
        return Err(SchedulingError::PackageUnavailable(
            "PT package belongs to a different coach",
        ));
    }
    if !package.is_active() {
        return Err(SchedulingError::PackageUnavailable("PT package is no longer active"));
    }

    let reserved = PTPackage::reserved_sessions(&mut *conn, package_id).await?;
    if package.remaining_sessions - reserved <= 0 {
        return Err(SchedulingError::PackageUnavailable(
            "No sessions left on this PT package",
        ));
    }
    Ok(())
}

/// Result of a status change
#[derive(Debug, Clone)]
pub struct Transition {
    pub booking: Booking,
    /// The package after its session was consumed, when one was
    pub package: Option<PTPackage>,
}

/// Move a scheduled booking to a terminal status. Completing a booking
/// that draws on a PT package consumes one of its sessions in the same
/// transaction.
pub async fn transition_booking(
    db: &DbPool,
    booking_id: &str,
    next: BookingStatus,
) -> Result<Transition, SchedulingError> {
    let mut tx = db.begin().await?;

    // Write first so the transaction holds the write lock before any read
    let updated = if next.is_terminal() {
        sqlx::query(
            "UPDATE bookings SET status = ?, updated_at = ? WHERE id = ? AND status = 'scheduled'",
        )
        .bind(next.as_str())
        .bind(now_timestamp())
        .bind(booking_id)
        .execute(&mut *tx)
        .await?
        .rows_affected()
    } else {
        0
    };

    let booking: Booking = sqlx::query_as("SELECT * FROM bookings WHERE id = ?")
        .bind(booking_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(SchedulingError::BookingNotFound)?;

    if updated == 0 {
        return Err(SchedulingError::InvalidTransition {
            from: booking.status_enum().unwrap_or(BookingStatus::Cancelled),
            to: next,
        });
    }

    let package = match (&booking.package_id, next) {
        (Some(package_id), BookingStatus::Completed) => {
            let package = PTPackage::use_session(&mut tx, package_id).await?;
            if package.is_none() {
                tracing::warn!(
                    booking_id = %booking_id,
                    package_id = %package_id,
                    "Completed booking references an inactive package; no session consumed"
                );
            }
            package
        }
        _ => None,
    };

    tx.commit().await?;

    tracing::info!(
        booking_id = %booking_id,
        status = %next,
        remaining_sessions = package.as_ref().map(|p| p.remaining_sessions),
        "Booking status changed"
    );

    let booking = Booking::get_by_id(db, booking_id)
        .await?
        .ok_or(SchedulingError::BookingNotFound)?;
    Ok(Transition { booking, package })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use chrono::TimeZone;

    async fn seed(db: &DbPool) {
        for (id, email) in [("c-1", "sam@example.com"), ("c-2", "lena@example.com")] {
            sqlx::query("INSERT INTO coaches (id, full_name, email) VALUES (?, 'Coach', ?)")
                .bind(id)
                .bind(email)
                .execute(db)
                .await
                .unwrap();
        }
        sqlx::query("INSERT INTO members (id, full_name, email) VALUES ('m-1', 'Dana', 'dana@example.com')")
            .execute(db)
            .await
            .unwrap();
    }

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 4, hour, minute, 0).unwrap()
    }

    fn request(coach_id: &str, start: DateTime<Utc>, minutes: i64) -> NewBooking {
        NewBooking {
            member_id: "m-1".to_string(),
            coach_id: coach_id.to_string(),
            package_id: None,
            scheduled_at: start,
            duration_minutes: minutes,
            notes: None,
        }
    }

    #[test]
    fn test_intervals_overlap_is_half_open() {
        assert!(intervals_overlap(0, 10, 5, 15));
        assert!(intervals_overlap(5, 15, 0, 10));
        assert!(intervals_overlap(0, 10, 2, 3));
        assert!(!intervals_overlap(0, 10, 10, 20));
        assert!(!intervals_overlap(10, 20, 0, 10));
    }

    #[tokio::test]
    async fn test_conflict_detection() {
        let db = test_pool().await;
        seed(&db).await;
        create_booking(&db, &request("c-1", at(9, 0), 60)).await.unwrap();

        let mut conn = db.acquire().await.unwrap();
        // Overlapping starts
        assert!(has_conflict(&mut conn, "c-1", at(9, 30), 60).await.unwrap());
        assert!(has_conflict(&mut conn, "c-1", at(8, 30), 45).await.unwrap());
        assert!(has_conflict(&mut conn, "c-1", at(8, 0), 180).await.unwrap());
        // Touching intervals do not conflict
        assert!(!has_conflict(&mut conn, "c-1", at(10, 0), 60).await.unwrap());
        assert!(!has_conflict(&mut conn, "c-1", at(8, 0), 60).await.unwrap());
        // Other coaches are independent
        assert!(!has_conflict(&mut conn, "c-2", at(9, 0), 60).await.unwrap());
    }

    #[tokio::test]
    async fn test_long_session_blocks_later_start() {
        let db = test_pool().await;
        seed(&db).await;
        create_booking(&db, &request("c-1", at(8, 0), 180)).await.unwrap();

        let mut conn = db.acquire().await.unwrap();
        assert!(has_conflict(&mut conn, "c-1", at(10, 45), 30).await.unwrap());
        assert!(!has_conflict(&mut conn, "c-1", at(11, 0), 30).await.unwrap());
    }

    #[tokio::test]
    async fn test_overlapping_booking_is_rejected() {
        let db = test_pool().await;
        seed(&db).await;

        let first = request("c-1", at(9, 0), 60);
        let second = request("c-1", at(9, 30), 60);
        create_booking(&db, &first).await.unwrap();
        let result = create_booking(&db, &second).await;
        assert!(matches!(result, Err(SchedulingError::SlotUnavailable)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_requests_for_one_slot_book_once() {
        let dir = std::env::temp_dir().join(format!("gymflow-race-{}", new_id()));
        crate::utils::ensure_dir(&dir).unwrap();
        let db = crate::db::init(&dir).await.unwrap();
        seed(&db).await;

        let mut handles = Vec::new();
        for offset in 0..10 {
            let db = db.clone();
            // Every request overlaps the 09:00-10:00 window
            let new = request("c-1", at(9, offset * 5), 60);
            handles.push(tokio::spawn(async move { create_booking(&db, &new).await }));
        }

        let mut booked = 0;
        let mut rejected = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => booked += 1,
                Err(SchedulingError::SlotUnavailable) => rejected += 1,
                Err(e) => panic!("unexpected error: {}", e),
            }
        }
        assert_eq!(booked, 1);
        assert_eq!(rejected, 9);

        let stored: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM bookings WHERE coach_id = 'c-1'")
            .fetch_one(&db)
            .await
            .unwrap();
        assert_eq!(stored.0, 1);

        db.close().await;
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_cancelled_booking_frees_slot() {
        let db = test_pool().await;
        seed(&db).await;
        let booking = create_booking(&db, &request("c-1", at(9, 0), 60)).await.unwrap();
        transition_booking(&db, &booking.id, BookingStatus::Cancelled)
            .await
            .unwrap();

        create_booking(&db, &request("c-1", at(9, 0), 60)).await.unwrap();
    }

    #[tokio::test]
    async fn test_inactive_coach_cannot_be_booked() {
        let db = test_pool().await;
        seed(&db).await;
        sqlx::query("UPDATE coaches SET is_active = 0 WHERE id = 'c-2'")
            .execute(&db)
            .await
            .unwrap();

        let result = create_booking(&db, &request("c-2", at(9, 0), 60)).await;
        assert!(matches!(result, Err(SchedulingError::CoachUnavailable)));
    }

    #[tokio::test]
    async fn test_completion_consumes_package_session() {
        let db = test_pool().await;
        seed(&db).await;

        for (remaining, expected_remaining, expected_status) in
            [(2, 1, "active"), (1, 0, "completed")]
        {
            let package = PTPackage::create(&db, "m-1", "c-1", 5, 200.0).await.unwrap();
            sqlx::query("UPDATE pt_packages SET remaining_sessions = ? WHERE id = ?")
                .bind(remaining)
                .bind(&package.id)
                .execute(&db)
                .await
                .unwrap();

            let mut new = request("c-1", at(6 + remaining as u32 * 2, 0), 60);
            new.package_id = Some(package.id.clone());
            let booking = create_booking(&db, &new).await.unwrap();

            let transition = transition_booking(&db, &booking.id, BookingStatus::Completed)
                .await
                .unwrap();
            assert_eq!(transition.booking.status, "completed");
            let package = transition.package.unwrap();
            assert_eq!(package.remaining_sessions, expected_remaining);
            assert_eq!(package.status, expected_status);
        }
    }

    #[tokio::test]
    async fn test_no_show_keeps_package_sessions() {
        let db = test_pool().await;
        seed(&db).await;
        let package = PTPackage::create(&db, "m-1", "c-1", 3, 150.0).await.unwrap();
        let mut new = request("c-1", at(9, 0), 60);
        new.package_id = Some(package.id.clone());
        let booking = create_booking(&db, &new).await.unwrap();

        let transition = transition_booking(&db, &booking.id, BookingStatus::NoShow)
            .await
            .unwrap();
        assert!(transition.package.is_none());
        let package = PTPackage::get_by_id(&db, &package.id).await.unwrap().unwrap();
        assert_eq!(package.remaining_sessions, 3);
    }

    #[tokio::test]
    async fn test_terminal_status_cannot_change() {
        let db = test_pool().await;
        seed(&db).await;
        let booking = create_booking(&db, &request("c-1", at(9, 0), 60)).await.unwrap();
        transition_booking(&db, &booking.id, BookingStatus::Completed)
            .await
            .unwrap();

        let result = transition_booking(&db, &booking.id, BookingStatus::Cancelled).await;
        assert!(matches!(
            result,
            Err(SchedulingError::InvalidTransition {
                from: BookingStatus::Completed,
                to: BookingStatus::Cancelled
            })
        ));

        let missing = transition_booking(&db, "nope", BookingStatus::Completed).await;
        assert!(matches!(missing, Err(SchedulingError::BookingNotFound)));
    }

    #[tokio::test]
    async fn test_package_cannot_be_overbooked() {
        let db = test_pool().await;
        seed(&db).await;
        let package = PTPackage::create(&db, "m-1", "c-1", 1, 60.0).await.unwrap();

        let mut first = request("c-1", at(9, 0), 60);
        first.package_id = Some(package.id.clone());
        create_booking(&db, &first).await.unwrap();

        let mut second = request("c-1", at(11, 0), 60);
        second.package_id = Some(package.id.clone());
        let result = create_booking(&db, &second).await;
        assert!(matches!(result, Err(SchedulingError::PackageUnavailable(_))));

        let mut other_coach = request("c-2", at(11, 0), 60);
        other_coach.package_id = Some(package.id.clone());
        let result = create_booking(&db, &other_coach).await;
        assert!(matches!(result, Err(SchedulingError::PackageUnavailable(_))));
    }
}
