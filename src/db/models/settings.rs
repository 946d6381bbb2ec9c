//! Gym configuration: pricing, general settings, opening hours and coach
//! availability. Edited by coaches, read by everyone.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

use super::common::{int_to_bool, new_id, now_timestamp, parse_time};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PricingItem {
    pub id: String,
    pub product_key: String,
    pub label: String,
    pub price: f64,
    pub currency: String,
    pub updated_at: String,
}

#[derive(Debug, Deserialize)]
pub struct UpsertPricingRequest {
    pub product_key: String,
    pub label: String,
    pub price: f64,
    pub currency: Option<String>,
}

impl PricingItem {
    pub async fn list(db: &SqlitePool) -> Result<Vec<PricingItem>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM pricing ORDER BY product_key ASC")
            .fetch_all(db)
            .await
    }

    pub async fn get_by_key(
        db: &SqlitePool,
        product_key: &str,
    ) -> Result<Option<PricingItem>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM pricing WHERE product_key = ?")
            .bind(product_key)
            .fetch_optional(db)
            .await
    }

    /// Price for a product, if one is configured
    pub async fn price_for(db: &SqlitePool, product_key: &str) -> Result<Option<f64>, sqlx::Error> {
        Ok(Self::get_by_key(db, product_key).await?.map(|p| p.price))
    }

    pub async fn upsert(
        db: &SqlitePool,
        req: &UpsertPricingRequest,
        default_currency: &str,
    ) -> Result<PricingItem, sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO pricing (id, product_key, label, price, currency, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(product_key) DO UPDATE SET
                label = excluded.label,
                price = excluded.price,
                currency = excluded.currency,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(new_id())
        .bind(&req.product_key)
        .bind(&req.label)
        .bind(req.price)
        .bind(req.currency.as_deref().unwrap_or(default_currency))
        .bind(now_timestamp())
        .execute(db)
        .await?;

        Self::get_by_key(db, &req.product_key)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn delete(db: &SqlitePool, product_key: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM pricing WHERE product_key = ?")
            .bind(product_key)
            .execute(db)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GymSettings {
    pub gym_name: String,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    pub currency: String,
    pub default_session_minutes: i64,
    /// Minimum notice, in minutes, for a new booking
    pub booking_lead_minutes: i64,
    pub updated_at: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateGymSettingsRequest {
    pub gym_name: Option<String>,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    pub currency: Option<String>,
    pub default_session_minutes: Option<i64>,
    pub booking_lead_minutes: Option<i64>,
}

impl GymSettings {
    pub async fn get(db: &SqlitePool) -> Result<GymSettings, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT gym_name, contact_email, contact_phone, currency,
                   default_session_minutes, booking_lead_minutes, updated_at
            FROM gym_settings WHERE id = 1
            "#,
        )
        .fetch_one(db)
        .await
    }

    pub async fn update(
        db: &SqlitePool,
        req: &UpdateGymSettingsRequest,
    ) -> Result<GymSettings, sqlx::Error> {
        let existing = Self::get(db).await?;

        sqlx::query(
            r#"
            UPDATE gym_settings
            SET gym_name = ?, contact_email = ?, contact_phone = ?, currency = ?,
                default_session_minutes = ?, booking_lead_minutes = ?, updated_at = ?
            WHERE id = 1
            "#,
        )
        .bind(req.gym_name.as_ref().unwrap_or(&existing.gym_name))
        .bind(req.contact_email.as_ref().or(existing.contact_email.as_ref()))
        .bind(req.contact_phone.as_ref().or(existing.contact_phone.as_ref()))
        .bind(req.currency.as_ref().unwrap_or(&existing.currency))
        .bind(req.default_session_minutes.unwrap_or(existing.default_session_minutes))
        .bind(req.booking_lead_minutes.unwrap_or(existing.booking_lead_minutes))
        .bind(now_timestamp())
        .execute(db)
        .await?;

        Self::get(db).await
    }
}

/// Opening hours for one weekday (0 = Monday)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WorkingHours {
    pub weekday: i64,
    pub open_time: String,
    pub close_time: String,
    pub is_closed: i64,
}

impl WorkingHours {
    pub fn closed(&self) -> bool {
        int_to_bool(self.is_closed)
    }

    /// Open interval for the day, `None` when closed or malformed
    pub fn open_interval(&self) -> Option<(NaiveTime, NaiveTime)> {
        if self.closed() {
            return None;
        }
        let open = parse_time(&self.open_time)?;
        let close = parse_time(&self.close_time)?;
        (open < close).then_some((open, close))
    }
}

#[derive(Debug, Deserialize)]
pub struct WorkingHoursEntry {
    pub weekday: i64,
    pub open_time: String,
    pub close_time: String,
    #[serde(default)]
    pub is_closed: bool,
}

impl WorkingHours {
    pub async fn list(db: &SqlitePool) -> Result<Vec<WorkingHours>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM gym_working_hours ORDER BY weekday ASC")
            .fetch_all(db)
            .await
    }

    pub async fn for_weekday(
        db: &SqlitePool,
        weekday: i64,
    ) -> Result<Option<WorkingHours>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM gym_working_hours WHERE weekday = ?")
            .bind(weekday)
            .fetch_optional(db)
            .await
    }

    /// Replace the given weekdays in one transaction
    pub async fn set_many(
        db: &SqlitePool,
        entries: &[WorkingHoursEntry],
    ) -> Result<Vec<WorkingHours>, sqlx::Error> {
        let mut tx = db.begin().await?;
        for entry in entries {
            sqlx::query(
                r#"
                INSERT INTO gym_working_hours (weekday, open_time, close_time, is_closed)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(weekday) DO UPDATE SET
                    open_time = excluded.open_time,
                    close_time = excluded.close_time,
                    is_closed = excluded.is_closed
                "#,
            )
            .bind(entry.weekday)
            .bind(&entry.open_time)
            .bind(&entry.close_time)
            .bind(entry.is_closed as i64)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Self::list(db).await
    }
}

/// A weekly window in which a coach takes sessions
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CoachAvailability {
    pub id: String,
    pub coach_id: String,
    pub weekday: i64,
    pub start_time: String,
    pub end_time: String,
}

impl CoachAvailability {
    pub fn interval(&self) -> Option<(NaiveTime, NaiveTime)> {
        let start = parse_time(&self.start_time)?;
        let end = parse_time(&self.end_time)?;
        (start < end).then_some((start, end))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AvailabilityWindow {
    pub weekday: i64,
    pub start_time: String,
    pub end_time: String,
}

#[derive(Debug, Deserialize)]
pub struct SetAvailabilityRequest {
    pub windows: Vec<AvailabilityWindow>,
}

impl CoachAvailability {
    pub async fn list_for_coach(
        db: &SqlitePool,
        coach_id: &str,
    ) -> Result<Vec<CoachAvailability>, sqlx::Error> {
        sqlx::query_as(
            "SELECT * FROM coach_availability WHERE coach_id = ? ORDER BY weekday ASC, start_time ASC",
        )
        .bind(coach_id)
        .fetch_all(db)
        .await
    }

    pub async fn for_coach_weekday(
        db: &SqlitePool,
        coach_id: &str,
        weekday: i64,
    ) -> Result<Vec<CoachAvailability>, sqlx::Error> {
        sqlx::query_as(
            "SELECT * FROM coach_availability WHERE coach_id = ? AND weekday = ? ORDER BY start_time ASC",
        )
        .bind(coach_id)
        .bind(weekday)
        .fetch_all(db)
        .await
    }

    /// Replace a coach's whole weekly availability
    pub async fn replace_for_coach(
        db: &SqlitePool,
        coach_id: &str,
        windows: &[AvailabilityWindow],
    ) -> Result<Vec<CoachAvailability>, sqlx::Error> {
        let mut tx = db.begin().await?;

        sqlx::query("DELETE FROM coach_availability WHERE coach_id = ?")
            .bind(coach_id)
            .execute(&mut *tx)
            .await?;

        for window in windows {
            sqlx::query(
                r#"
                INSERT INTO coach_availability (id, coach_id, weekday, start_time, end_time)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(new_id())
            .bind(coach_id)
            .bind(window.weekday)
            .bind(&window.start_time)
            .bind(&window.end_time)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Self::list_for_coach(db, coach_id).await
    }
}
