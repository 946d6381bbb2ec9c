//! Personal-training session bookings.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

use super::common::{format_timestamp, parse_timestamp};

/// Longest session a booking may span
pub const MAX_SESSION_MINUTES: i64 = 240;

/// Shortest session a booking may span
pub const MIN_SESSION_MINUTES: i64 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Scheduled,
    Completed,
    Cancelled,
    NoShow,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::NoShow => "no_show",
        }
    }

    /// `scheduled` is the only state a booking can leave
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Scheduled)
    }

    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        matches!(self, Self::Scheduled) && next.is_terminal()
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "scheduled" => Ok(Self::Scheduled),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            "no_show" => Ok(Self::NoShow),
            _ => Err(format!("Unknown booking status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Booking {
    pub id: String,
    pub member_id: String,
    pub coach_id: String,
    pub package_id: Option<String>,
    pub scheduled_at: String,
    pub duration_minutes: i64,
    pub status: String,
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Booking {
    pub fn status_enum(&self) -> Option<BookingStatus> {
        self.status.parse().ok()
    }

    pub fn starts_at(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.scheduled_at)
    }

    pub fn ends_at(&self) -> Option<DateTime<Utc>> {
        self.starts_at()
            .map(|start| start + Duration::minutes(self.duration_minutes))
    }
}

/// Booking joined with the names shown in schedules
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BookingDetail {
    pub id: String,
    pub member_id: String,
    pub member_name: String,
    pub coach_id: String,
    pub coach_name: String,
    pub package_id: Option<String>,
    pub scheduled_at: String,
    pub duration_minutes: i64,
    pub status: String,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    /// Defaults to the member's assigned coach
    pub coach_id: Option<String>,
    /// Required when a coach books on behalf of a member
    pub member_id: Option<String>,
    pub package_id: Option<String>,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: Option<i64>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateBookingStatusRequest {
    pub status: BookingStatus,
}

#[derive(Debug, Default, Deserialize)]
pub struct BookingListQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub status: Option<BookingStatus>,
}

const DETAIL_SELECT: &str = r#"
    SELECT b.id, b.member_id, m.full_name AS member_name, b.coach_id, c.full_name AS coach_name,
           b.package_id, b.scheduled_at, b.duration_minutes, b.status, b.notes
    FROM bookings b
    INNER JOIN members m ON m.id = b.member_id
    INNER JOIN coaches c ON c.id = b.coach_id
"#;

impl Booking {
    pub async fn get_by_id(db: &SqlitePool, id: &str) -> Result<Option<Booking>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM bookings WHERE id = ?")
            .bind(id)
            .fetch_optional(db)
            .await
    }

    pub async fn list_for_member(
        db: &SqlitePool,
        member_id: &str,
        query: &BookingListQuery,
    ) -> Result<Vec<BookingDetail>, sqlx::Error> {
        Self::list_filtered(db, "b.member_id = ?", member_id, query).await
    }

    pub async fn list_for_coach(
        db: &SqlitePool,
        coach_id: &str,
        query: &BookingListQuery,
    ) -> Result<Vec<BookingDetail>, sqlx::Error> {
        Self::list_filtered(db, "b.coach_id = ?", coach_id, query).await
    }

    async fn list_filtered(
        db: &SqlitePool,
        owner_clause: &str,
        owner_id: &str,
        query: &BookingListQuery,
    ) -> Result<Vec<BookingDetail>, sqlx::Error> {
        let sql = format!(
            r#"{}
            WHERE {}
              AND (? IS NULL OR b.scheduled_at >= ?)
              AND (? IS NULL OR b.scheduled_at < ?)
              AND (? IS NULL OR b.status = ?)
            ORDER BY b.scheduled_at ASC"#,
            DETAIL_SELECT, owner_clause
        );

        let from = query.from.map(format_timestamp);
        let to = query.to.map(format_timestamp);
        let status = query.status.map(|s| s.as_str());

        sqlx::query_as(&sql)
            .bind(owner_id)
            .bind(&from)
            .bind(&from)
            .bind(&to)
            .bind(&to)
            .bind(status)
            .bind(status)
            .fetch_all(db)
            .await
    }

    /// Scheduled sessions starting within `[from, to)`
    pub async fn scheduled_between(
        db: &SqlitePool,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<BookingDetail>, sqlx::Error> {
        let sql = format!(
            r#"{}
            WHERE b.status = 'scheduled' AND b.scheduled_at >= ? AND b.scheduled_at < ?
            ORDER BY b.scheduled_at ASC"#,
            DETAIL_SELECT
        );

        sqlx::query_as(&sql)
            .bind(format_timestamp(from))
            .bind(format_timestamp(to))
            .fetch_all(db)
            .await
    }
}
