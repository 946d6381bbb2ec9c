//! Notification outbox / audit log models.
//!
//! Every outbound message is first written to `notifications_log` as
//! `pending`; the outbox worker delivers it and records the outcome.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

use super::common::{new_id, now_timestamp, Page};

/// Delivery channel
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum NotificationChannel {
    Email,
    #[serde(rename = "whatsapp")]
    WhatsApp,
}

impl NotificationChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::WhatsApp => "whatsapp",
        }
    }
}

impl std::fmt::Display for NotificationChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for NotificationChannel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "email" => Ok(Self::Email),
            "whatsapp" => Ok(Self::WhatsApp),
            _ => Err(format!("Unknown channel: {}", s)),
        }
    }
}

/// What a message is about
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    BookingConfirmed,
    BookingCancelled,
    SessionReminder,
    MembershipExpiring,
    PackageLow,
    Welcome,
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BookingConfirmed => write!(f, "booking_confirmed"),
            Self::BookingCancelled => write!(f, "booking_cancelled"),
            Self::SessionReminder => write!(f, "session_reminder"),
            Self::MembershipExpiring => write!(f, "membership_expiring"),
            Self::PackageLow => write!(f, "package_low"),
            Self::Welcome => write!(f, "welcome"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Pending,
    Sent,
    Failed,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct NotificationLog {
    pub id: String,
    pub member_id: Option<String>,
    pub channel: String,
    pub kind: String,
    pub recipient_name: String,
    /// Email address or phone number, depending on the channel
    pub recipient: String,
    pub subject: String,
    pub content: String,
    pub status: String,
    pub attempts: i64,
    pub last_error: Option<String>,
    pub dedupe_key: Option<String>,
    pub next_attempt_at: String,
    pub created_at: String,
    pub sent_at: Option<String>,
}

impl NotificationLog {
    pub fn channel_enum(&self) -> Option<NotificationChannel> {
        self.channel.parse().ok()
    }
}

/// A message ready to be queued
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub member_id: Option<String>,
    pub channel: NotificationChannel,
    pub kind: NotificationKind,
    pub recipient_name: String,
    pub recipient: String,
    pub subject: String,
    pub content: String,
    /// Rows sharing a dedupe key are only queued once
    pub dedupe_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Queued(String),
    Duplicate,
}

#[derive(Debug, Default, Deserialize)]
pub struct NotificationLogQuery {
    pub member_id: Option<String>,
    pub status: Option<String>,
}

impl NotificationLog {
    /// Persist a pending notification, due immediately
    pub async fn enqueue(
        db: &SqlitePool,
        notification: &NewNotification,
    ) -> Result<EnqueueOutcome, sqlx::Error> {
        let id = new_id();
        let now = now_timestamp();

        let result = sqlx::query(
            r#"
            INSERT INTO notifications_log
                (id, member_id, channel, kind, recipient_name, recipient, subject, content,
                 status, attempts, dedupe_key, next_attempt_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'pending', 0, ?, ?, ?)
            ON CONFLICT(dedupe_key) DO NOTHING
            "#,
        )
        .bind(&id)
        .bind(&notification.member_id)
        .bind(notification.channel.as_str())
        .bind(notification.kind.to_string())
        .bind(&notification.recipient_name)
        .bind(&notification.recipient)
        .bind(&notification.subject)
        .bind(&notification.content)
        .bind(&notification.dedupe_key)
        .bind(&now)
        .bind(&now)
        .execute(db)
        .await?;

        if result.rows_affected() == 0 {
            Ok(EnqueueOutcome::Duplicate)
        } else {
            Ok(EnqueueOutcome::Queued(id))
        }
    }

    pub async fn get_by_id(db: &SqlitePool, id: &str) -> Result<Option<NotificationLog>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM notifications_log WHERE id = ?")
            .bind(id)
            .fetch_optional(db)
            .await
    }

    /// Pending rows whose next attempt is due, oldest first
    pub async fn due(
        db: &SqlitePool,
        now: &str,
        limit: u32,
    ) -> Result<Vec<NotificationLog>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT * FROM notifications_log
            WHERE status = 'pending' AND next_attempt_at <= ?
            ORDER BY next_attempt_at ASC, created_at ASC
            LIMIT ?
            "#,
        )
        .bind(now)
        .bind(limit as i64)
        .fetch_all(db)
        .await
    }

    pub async fn mark_sent(db: &SqlitePool, id: &str) -> Result<(), sqlx::Error> {
        let now = now_timestamp();
        sqlx::query(
            r#"
            UPDATE notifications_log
            SET status = 'sent', attempts = attempts + 1, last_error = NULL, sent_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&now)
        .bind(id)
        .execute(db)
        .await?;
        Ok(())
    }

    /// Record a failed attempt and push the next attempt back
    pub async fn mark_retry(
        db: &SqlitePool,
        id: &str,
        error: &str,
        next_attempt_at: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE notifications_log
            SET attempts = attempts + 1, last_error = ?, next_attempt_at = ?
            WHERE id = ?
            "#,
        )
        .bind(error)
        .bind(next_attempt_at)
        .bind(id)
        .execute(db)
        .await?;
        Ok(())
    }

    pub async fn mark_failed(db: &SqlitePool, id: &str, error: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE notifications_log
            SET status = 'failed', attempts = attempts + 1, last_error = ?
            WHERE id = ?
            "#,
        )
        .bind(error)
        .bind(id)
        .execute(db)
        .await?;
        Ok(())
    }

    pub async fn list(
        db: &SqlitePool,
        query: &NotificationLogQuery,
        page: Page,
    ) -> Result<Vec<NotificationLog>, sqlx::Error> {
        let page = page.clamped();
        sqlx::query_as(
            r#"
            SELECT * FROM notifications_log
            WHERE (? IS NULL OR member_id = ?)
              AND (? IS NULL OR status = ?)
            ORDER BY created_at DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(&query.member_id)
        .bind(&query.member_id)
        .bind(&query.status)
        .bind(&query.status)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(db)
        .await
    }
}
