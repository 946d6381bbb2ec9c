//! Gym membership (facility subscription) models.
//!
//! A membership covers `[start_date, end_date]` in the gym's local calendar.
//! Rows stay `active` in storage until the reminder job sweeps them to
//! `expired`, so readers should use [`GymMembership::effective_status`].

use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

use super::common::{format_date, new_id, now_timestamp, parse_date};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipType {
    Monthly,
    Quarterly,
    Yearly,
}

impl MembershipType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Monthly => "monthly",
            Self::Quarterly => "quarterly",
            Self::Yearly => "yearly",
        }
    }

    pub fn months(&self) -> u32 {
        match self {
            Self::Monthly => 1,
            Self::Quarterly => 3,
            Self::Yearly => 12,
        }
    }

    /// Key of this membership's row in the pricing table
    pub fn pricing_key(&self) -> String {
        format!("membership_{}", self.as_str())
    }

    /// Last covered day. Month ends clamp (Jan 31 + 1 month = Feb 28).
    pub fn end_date(&self, start: NaiveDate) -> Option<NaiveDate> {
        start.checked_add_months(Months::new(self.months()))
    }
}

impl std::fmt::Display for MembershipType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for MembershipType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "monthly" => Ok(Self::Monthly),
            "quarterly" => Ok(Self::Quarterly),
            "yearly" => Ok(Self::Yearly),
            _ => Err(format!("Unknown membership type: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipStatus {
    Active,
    Cancelled,
    Expired,
}

impl MembershipStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
        }
    }
}

impl std::str::FromStr for MembershipStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "cancelled" => Ok(Self::Cancelled),
            "expired" => Ok(Self::Expired),
            _ => Err(format!("Unknown membership status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GymMembership {
    pub id: String,
    pub member_id: String,
    pub membership_type: String,
    pub start_date: String,
    pub end_date: String,
    pub status: String,
    pub price_paid: f64,
    pub created_at: String,
    pub updated_at: String,
}

impl GymMembership {
    /// Stored status, with `active` rows past their end date reported as expired
    pub fn effective_status(&self, today: NaiveDate) -> MembershipStatus {
        let stored = self.status.parse().unwrap_or(MembershipStatus::Expired);
        match (stored, parse_date(&self.end_date)) {
            (MembershipStatus::Active, Some(end)) if end < today => MembershipStatus::Expired,
            (status, _) => status,
        }
    }

    pub fn days_until_end(&self, today: NaiveDate) -> Option<i64> {
        parse_date(&self.end_date).map(|end| (end - today).num_days())
    }
}

/// Membership as returned by the API
#[derive(Debug, Clone, Serialize)]
pub struct MembershipResponse {
    #[serde(flatten)]
    pub membership: GymMembership,
    pub effective_status: MembershipStatus,
}

impl MembershipResponse {
    pub fn new(membership: GymMembership, today: NaiveDate) -> Self {
        Self {
            effective_status: membership.effective_status(today),
            membership,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PurchaseMembershipRequest {
    /// Coaches purchase on behalf of a member; members purchase for themselves
    pub member_id: Option<String>,
    pub membership_type: MembershipType,
    /// Defaults to today at the gym
    pub start_date: Option<NaiveDate>,
    /// Defaults to the pricing table entry
    pub price_paid: Option<f64>,
}

impl GymMembership {
    pub async fn create(
        db: &SqlitePool,
        member_id: &str,
        membership_type: MembershipType,
        start_date: NaiveDate,
        end_date: NaiveDate,
        price_paid: f64,
    ) -> Result<GymMembership, sqlx::Error> {
        let id = new_id();
        let now = now_timestamp();

        sqlx::query(
            r#"
            INSERT INTO gym_memberships
                (id, member_id, membership_type, start_date, end_date, status, price_paid, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, 'active', ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(member_id)
        .bind(membership_type.as_str())
        .bind(format_date(start_date))
        .bind(format_date(end_date))
        .bind(price_paid)
        .bind(&now)
        .bind(&now)
        .execute(db)
        .await?;

        Self::get_by_id(db, &id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn get_by_id(db: &SqlitePool, id: &str) -> Result<Option<GymMembership>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM gym_memberships WHERE id = ?")
            .bind(id)
            .fetch_optional(db)
            .await
    }

    pub async fn list_for_member(
        db: &SqlitePool,
        member_id: &str,
    ) -> Result<Vec<GymMembership>, sqlx::Error> {
        sqlx::query_as(
            "SELECT * FROM gym_memberships WHERE member_id = ? ORDER BY start_date DESC, created_at DESC",
        )
        .bind(member_id)
        .fetch_all(db)
        .await
    }

    /// Cancel an active membership. Rows that are already cancelled or expired
    /// are returned unchanged.
    pub async fn cancel(db: &SqlitePool, id: &str) -> Result<GymMembership, sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE gym_memberships
            SET status = 'cancelled', updated_at = ?
            WHERE id = ? AND status = 'active'
            "#,
        )
        .bind(now_timestamp())
        .bind(id)
        .execute(db)
        .await?;

        Self::get_by_id(db, id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    /// Mark active memberships that ended before `today` as expired
    pub async fn expire_lapsed(db: &SqlitePool, today: NaiveDate) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE gym_memberships
            SET status = 'expired', updated_at = ?
            WHERE status = 'active' AND end_date < ?
            "#,
        )
        .bind(now_timestamp())
        .bind(format_date(today))
        .execute(db)
        .await?;
        Ok(result.rows_affected())
    }

    /// Active memberships whose last day is `date`
    pub async fn expiring_on(
        db: &SqlitePool,
        date: NaiveDate,
    ) -> Result<Vec<GymMembership>, sqlx::Error> {
        sqlx::query_as(
            "SELECT * FROM gym_memberships WHERE status = 'active' AND end_date = ? ORDER BY member_id",
        )
        .bind(format_date(date))
        .fetch_all(db)
        .await
    }
}
