//! Daily reminder job.
//!
//! Triggered from the cron endpoint. Each run queues:
//! - session reminders for scheduled bookings on the next local day
//! - expiry notices for active memberships ending in exactly 7 or 3 days
//! - low-balance notices for active PT packages with 1 or 2 sessions left
//!
//! Every reminder carries a dedupe key of kind, entity, date and channel, so
//! running the job twice on the same day queues nothing new. It also marks
//! memberships that ended before today as expired.

use anyhow::Result;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;

use crate::db::{
    format_date, parse_timestamp, Booking, GymMembership, Member, NotificationKind, PTPackage,
};
use crate::notifications::{queue_for_member, templates, Message, QueueTally};
use crate::utils::{gym_offset, local_date, local_day_bounds};
use crate::DbPool;

/// Days before the end date on which expiry notices go out
pub const MEMBERSHIP_NOTICE_DAYS: [i64; 2] = [7, 3];

/// Counts for one reminder category. `sent` counts notifications handed to
/// the outbox for delivery.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CategorySummary {
    pub sent: u32,
    pub failed: u32,
    pub skipped: u32,
}

impl CategorySummary {
    fn record(&mut self, tally: QueueTally) {
        self.sent += tally.queued;
        self.skipped += tally.duplicates + tally.skipped;
    }
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct ReminderSummary {
    pub date: String,
    pub sessions: CategorySummary,
    pub memberships: CategorySummary,
    pub packages: CategorySummary,
    pub memberships_expired: u64,
    pub errors: Vec<String>,
}

impl ReminderSummary {
    pub fn total_sent(&self) -> u32 {
        self.sessions.sent + self.memberships.sent + self.packages.sent
    }
}

pub struct ReminderJob {
    db: DbPool,
    utc_offset_minutes: i32,
}

impl ReminderJob {
    pub fn new(db: DbPool, utc_offset_minutes: i32) -> Self {
        Self {
            db,
            utc_offset_minutes,
        }
    }

    /// Run one pass as of `now`. Individual failures are collected in the
    /// summary; only a failure to read the candidate rows aborts the run.
    pub async fn run(&self, now: DateTime<Utc>) -> Result<ReminderSummary> {
        let today = local_date(now, self.utc_offset_minutes);
        let mut summary = ReminderSummary {
            date: format_date(today),
            ..Default::default()
        };

        tracing::info!(date = %summary.date, "Running reminder job");

        match GymMembership::expire_lapsed(&self.db, today).await {
            Ok(count) => summary.memberships_expired = count,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to expire lapsed memberships");
                summary.errors.push(format!("expire memberships: {}", e));
            }
        }

        self.session_reminders(today, &mut summary).await?;
        self.membership_reminders(today, &mut summary).await?;
        self.package_reminders(today, &mut summary).await?;

        tracing::info!(
            date = %summary.date,
            sent = summary.total_sent(),
            errors = summary.errors.len(),
            memberships_expired = summary.memberships_expired,
            "Reminder job finished"
        );

        Ok(summary)
    }

    async fn session_reminders(&self, today: NaiveDate, summary: &mut ReminderSummary) -> Result<()> {
        let tomorrow = today + Duration::days(1);
        let (from, to) = local_day_bounds(tomorrow, self.utc_offset_minutes);
        let offset = gym_offset(self.utc_offset_minutes);

        for booking in Booking::scheduled_between(&self.db, from, to).await? {
            let Some(at) = parse_timestamp(&booking.scheduled_at) else {
                summary.sessions.failed += 1;
                summary
                    .errors
                    .push(format!("booking {}: unreadable start time", booking.id));
                continue;
            };
            let local = at.with_timezone(&offset);
            let key = format!("{}:{}:{}", NotificationKind::SessionReminder, booking.id, format_date(tomorrow));

            self.queue(
                &booking.member_id,
                NotificationKind::SessionReminder,
                |name| templates::session_reminder(name, &booking.coach_name, &local),
                &key,
                &mut summary.sessions,
                &mut summary.errors,
            )
            .await;
        }
        Ok(())
    }

    async fn membership_reminders(&self, today: NaiveDate, summary: &mut ReminderSummary) -> Result<()> {
        for days in MEMBERSHIP_NOTICE_DAYS {
            let end_date = today + Duration::days(days);
            for membership in GymMembership::expiring_on(&self.db, end_date).await? {
                let key = format!(
                    "{}:{}:{}",
                    NotificationKind::MembershipExpiring,
                    membership.id,
                    format_date(today)
                );

                self.queue(
                    &membership.member_id,
                    NotificationKind::MembershipExpiring,
                    |name| templates::membership_expiring(name, end_date, days),
                    &key,
                    &mut summary.memberships,
                    &mut summary.errors,
                )
                .await;
            }
        }
        Ok(())
    }

    async fn package_reminders(&self, today: NaiveDate, summary: &mut ReminderSummary) -> Result<()> {
        for package in PTPackage::low_remaining(&self.db).await? {
            let key = format!(
                "{}:{}:{}",
                NotificationKind::PackageLow,
                package.id,
                format_date(today)
            );

            self.queue(
                &package.member_id,
                NotificationKind::PackageLow,
                |name| templates::package_low(name, package.remaining_sessions),
                &key,
                &mut summary.packages,
                &mut summary.errors,
            )
            .await;
        }
        Ok(())
    }

    async fn queue(
        &self,
        member_id: &str,
        kind: NotificationKind,
        message_for: impl FnOnce(&str) -> Message,
        dedupe_key: &str,
        category: &mut CategorySummary,
        errors: &mut Vec<String>,
    ) {
        let member = match Member::get_by_id(&self.db, member_id).await {
            Ok(Some(member)) => member,
            Ok(None) => {
                category.failed += 1;
                errors.push(format!("{} {}: member {} not found", kind, dedupe_key, member_id));
                return;
            }
            Err(e) => {
                category.failed += 1;
                errors.push(format!("{} {}: {}", kind, dedupe_key, e));
                return;
            }
        };

        let message = message_for(&member.full_name);
        match queue_for_member(&self.db, &member, kind, &message, Some(dedupe_key)).await {
            Ok(tally) => category.record(tally),
            Err(e) => {
                tracing::warn!(member_id = %member_id, kind = %kind, error = %e, "Failed to queue reminder");
                category.failed += 1;
                errors.push(format!("{} {}: {}", kind, dedupe_key, e));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{format_timestamp, test_pool, MembershipType};
    use chrono::TimeZone;

    async fn seed(db: &DbPool) {
        sqlx::query("INSERT INTO coaches (id, full_name, email) VALUES ('c-1', 'Sam', 'sam@example.com')")
            .execute(db)
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO members (id, full_name, email, phone, preferred_channel) VALUES ('m-1', 'Dana', 'dana@example.com', '+15550100123', 'both')",
        )
        .execute(db)
        .await
        .unwrap();
        sqlx::query("INSERT INTO members (id, full_name, email) VALUES ('m-2', 'Omar', 'omar@example.com')")
            .execute(db)
            .await
            .unwrap();
    }

    async fn book(db: &DbPool, id: &str, member_id: &str, at: DateTime<Utc>) {
        sqlx::query(
            "INSERT INTO bookings (id, member_id, coach_id, scheduled_at, duration_minutes) VALUES (?, ?, 'c-1', ?, 60)",
        )
        .bind(id)
        .bind(member_id)
        .bind(format_timestamp(at))
        .execute(db)
        .await
        .unwrap();
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 4, 18, 0, 0).unwrap()
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 5, d).unwrap()
    }

    #[tokio::test]
    async fn test_reminders_cover_all_categories() {
        let db = test_pool().await;
        seed(&db).await;

        // Tomorrow, today, and the day after
        book(&db, "b-1", "m-1", Utc.with_ymd_and_hms(2026, 5, 5, 9, 0, 0).unwrap()).await;
        book(&db, "b-2", "m-2", Utc.with_ymd_and_hms(2026, 5, 4, 20, 0, 0).unwrap()).await;
        book(&db, "b-3", "m-2", Utc.with_ymd_and_hms(2026, 5, 6, 9, 0, 0).unwrap()).await;

        GymMembership::create(&db, "m-2", MembershipType::Monthly, day(1) - Duration::days(23), day(11), 49.0)
            .await
            .unwrap();
        GymMembership::create(&db, "m-2", MembershipType::Monthly, day(1), day(10), 49.0)
            .await
            .unwrap();
        let lapsed = GymMembership::create(&db, "m-1", MembershipType::Monthly, day(1) - Duration::days(40), day(2), 49.0)
            .await
            .unwrap();

        PTPackage::create(&db, "m-2", "c-1", 2, 100.0).await.unwrap();
        PTPackage::create(&db, "m-2", "c-1", 8, 300.0).await.unwrap();

        let job = ReminderJob::new(db.clone(), 0);
        let summary = job.run(now()).await.unwrap();

        // m-1 prefers both channels and has a phone
        assert_eq!(summary.sessions, CategorySummary { sent: 2, failed: 0, skipped: 0 });
        assert_eq!(summary.memberships.sent, 1);
        assert_eq!(summary.packages.sent, 1);
        assert_eq!(summary.memberships_expired, 1);
        assert!(summary.errors.is_empty(), "{:?}", summary.errors);

        let lapsed = GymMembership::get_by_id(&db, &lapsed.id).await.unwrap().unwrap();
        assert_eq!(lapsed.status, "expired");
    }

    #[tokio::test]
    async fn test_second_run_same_day_is_skipped() {
        let db = test_pool().await;
        seed(&db).await;
        book(&db, "b-1", "m-2", Utc.with_ymd_and_hms(2026, 5, 5, 9, 0, 0).unwrap()).await;

        let job = ReminderJob::new(db.clone(), 0);
        let first = job.run(now()).await.unwrap();
        assert_eq!(first.sessions.sent, 1);

        let second = job.run(now() + Duration::hours(2)).await.unwrap();
        assert_eq!(second.sessions, CategorySummary { sent: 0, failed: 0, skipped: 1 });

        let (rows,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM notifications_log")
            .fetch_one(&db)
            .await
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[tokio::test]
    async fn test_tomorrow_follows_gym_offset() {
        let db = test_pool().await;
        seed(&db).await;
        // 22:30 UTC on the 4th is already the 5th at UTC+3, so "tomorrow" is the 6th
        book(&db, "b-1", "m-2", Utc.with_ymd_and_hms(2026, 5, 5, 21, 30, 0).unwrap()).await;
        book(&db, "b-2", "m-2", Utc.with_ymd_and_hms(2026, 5, 5, 20, 0, 0).unwrap()).await;

        let job = ReminderJob::new(db.clone(), 180);
        let summary = job
            .run(Utc.with_ymd_and_hms(2026, 5, 4, 22, 30, 0).unwrap())
            .await
            .unwrap();

        assert_eq!(summary.date, "2026-05-05");
        assert_eq!(summary.sessions.sent, 1);
    }
}
