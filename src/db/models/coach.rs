//! Coach (staff) model.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

use super::common::{int_to_bool, now_timestamp};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Coach {
    pub id: String,
    pub full_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub specialty: Option<String>,
    pub is_active: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// Public view of a coach
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoachResponse {
    pub id: String,
    pub full_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub specialty: Option<String>,
    pub is_active: bool,
}

impl From<Coach> for CoachResponse {
    fn from(coach: Coach) -> Self {
        Self {
            is_active: int_to_bool(coach.is_active),
            id: coach.id,
            full_name: coach.full_name,
            email: coach.email,
            phone: coach.phone,
            specialty: coach.specialty,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateCoachProfileRequest {
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub specialty: Option<String>,
}

impl Coach {
    pub fn is_active(&self) -> bool {
        int_to_bool(self.is_active)
    }

    pub async fn get_by_id(db: &SqlitePool, id: &str) -> Result<Option<Coach>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM coaches WHERE id = ?")
            .bind(id)
            .fetch_optional(db)
            .await
    }

    /// Look up an active coach; inactive staff cannot act as coaches
    pub async fn get_active(db: &SqlitePool, id: &str) -> Result<Option<Coach>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM coaches WHERE id = ? AND is_active = 1")
            .bind(id)
            .fetch_optional(db)
            .await
    }

    pub async fn list_active(db: &SqlitePool) -> Result<Vec<Coach>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM coaches WHERE is_active = 1 ORDER BY full_name ASC")
            .fetch_all(db)
            .await
    }

    /// Insert a coach row. Coaches are provisioned administratively (seeders, tooling).
    pub async fn create(
        db: &SqlitePool,
        id: &str,
        full_name: &str,
        email: &str,
        specialty: Option<&str>,
    ) -> Result<Coach, sqlx::Error> {
        let now = now_timestamp();
        sqlx::query(
            r#"
            INSERT INTO coaches (id, full_name, email, specialty, is_active, created_at, updated_at)
            VALUES (?, ?, ?, ?, 1, ?, ?)
            "#,
        )
        .bind(id)
        .bind(full_name)
        .bind(email)
        .bind(specialty)
        .bind(&now)
        .bind(&now)
        .execute(db)
        .await?;

        Self::get_by_id(db, id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn update_profile(
        db: &SqlitePool,
        id: &str,
        req: &UpdateCoachProfileRequest,
    ) -> Result<Coach, sqlx::Error> {
        let existing = Self::get_by_id(db, id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)?;

        sqlx::query(
            "UPDATE coaches SET full_name = ?, phone = ?, specialty = ?, updated_at = ? WHERE id = ?",
        )
        .bind(req.full_name.as_ref().unwrap_or(&existing.full_name))
        .bind(req.phone.as_ref().or(existing.phone.as_ref()))
        .bind(req.specialty.as_ref().or(existing.specialty.as_ref()))
        .bind(now_timestamp())
        .bind(id)
        .execute(db)
        .await?;

        Self::get_by_id(db, id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }
}
