//! Member model and contact preferences.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

use super::common::{now_timestamp, Page};
use super::notification::NotificationChannel;

/// Which channels a member wants reminders on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelPreference {
    Email,
    Whatsapp,
    Both,
}

impl ChannelPreference {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Whatsapp => "whatsapp",
            Self::Both => "both",
        }
    }

    pub fn channels(&self) -> Vec<NotificationChannel> {
        match self {
            Self::Email => vec![NotificationChannel::Email],
            Self::Whatsapp => vec![NotificationChannel::WhatsApp],
            Self::Both => vec![NotificationChannel::Email, NotificationChannel::WhatsApp],
        }
    }
}

impl std::fmt::Display for ChannelPreference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ChannelPreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "email" => Ok(Self::Email),
            "whatsapp" => Ok(Self::Whatsapp),
            "both" => Ok(Self::Both),
            _ => Err(format!("Unknown notification channel: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Member {
    pub id: String,
    pub full_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub preferred_language: String,
    pub preferred_channel: String,
    pub coach_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Member {
    pub fn channel_preference(&self) -> ChannelPreference {
        self.preferred_channel
            .parse()
            .unwrap_or(ChannelPreference::Email)
    }
}

/// Request to register a member (coach action)
#[derive(Debug, Deserialize)]
pub struct CreateMemberRequest {
    pub full_name: String,
    pub email: String,
    pub phone: Option<String>,
    #[serde(default = "default_language")]
    pub preferred_language: String,
    #[serde(default = "default_channel")]
    pub preferred_channel: ChannelPreference,
    pub coach_id: Option<String>,
    /// Initial password; generated when omitted
    pub password: Option<String>,
}

fn default_language() -> String {
    "en".to_string()
}

fn default_channel() -> ChannelPreference {
    ChannelPreference::Email
}

/// Profile edit; absent fields are left unchanged
#[derive(Debug, Default, Deserialize)]
pub struct UpdateMemberRequest {
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub preferred_language: Option<String>,
    pub preferred_channel: Option<ChannelPreference>,
    /// Only honoured for coaches
    pub coach_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MemberListQuery {
    pub search: Option<String>,
    pub coach_id: Option<String>,
}

impl Member {
    pub async fn get_by_id(db: &SqlitePool, id: &str) -> Result<Option<Member>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM members WHERE id = ?")
            .bind(id)
            .fetch_optional(db)
            .await
    }

    pub async fn list(
        db: &SqlitePool,
        query: &MemberListQuery,
        page: Page,
    ) -> Result<Vec<Member>, sqlx::Error> {
        let page = page.clamped();
        let pattern = query
            .search
            .as_ref()
            .map(|s| format!("%{}%", s.trim().to_lowercase()));

        sqlx::query_as(
            r#"
            SELECT * FROM members
            WHERE (? IS NULL OR lower(full_name) LIKE ? OR lower(email) LIKE ?)
              AND (? IS NULL OR coach_id = ?)
            ORDER BY full_name ASC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(&pattern)
        .bind(&pattern)
        .bind(&pattern)
        .bind(&query.coach_id)
        .bind(&query.coach_id)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(db)
        .await
    }

    /// Insert the member row for an identity that already exists upstream
    pub async fn create(
        db: &SqlitePool,
        id: &str,
        req: &CreateMemberRequest,
    ) -> Result<Member, sqlx::Error> {
        let now = now_timestamp();
        sqlx::query(
            r#"
            INSERT INTO members
                (id, full_name, email, phone, preferred_language, preferred_channel, coach_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(req.full_name.trim())
        .bind(req.email.trim().to_lowercase())
        .bind(&req.phone)
        .bind(&req.preferred_language)
        .bind(req.preferred_channel.as_str())
        .bind(&req.coach_id)
        .bind(&now)
        .bind(&now)
        .execute(db)
        .await?;

        Self::get_by_id(db, id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn update(
        db: &SqlitePool,
        id: &str,
        req: &UpdateMemberRequest,
    ) -> Result<Member, sqlx::Error> {
        let existing = Self::get_by_id(db, id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)?;

        let channel = req
            .preferred_channel
            .map(|c| c.as_str().to_string())
            .unwrap_or(existing.preferred_channel);

        sqlx::query(
            r#"
            UPDATE members
            SET full_name = ?, phone = ?, preferred_language = ?, preferred_channel = ?, coach_id = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(req.full_name.as_deref().map(str::trim).unwrap_or(&existing.full_name))
        .bind(req.phone.as_ref().or(existing.phone.as_ref()))
        .bind(req.preferred_language.as_ref().unwrap_or(&existing.preferred_language))
        .bind(&channel)
        .bind(req.coach_id.as_ref().or(existing.coach_id.as_ref()))
        .bind(now_timestamp())
        .bind(id)
        .execute(db)
        .await?;

        Self::get_by_id(db, id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }
}
