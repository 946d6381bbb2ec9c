//! Personal-training package models.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection, SqlitePool};

use super::common::{new_id, now_timestamp};

/// Remaining-session counts that trigger a "package running low" reminder
pub const LOW_SESSIONS_MIN: i64 = 1;
pub const LOW_SESSIONS_MAX: i64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageStatus {
    Active,
    Completed,
    Expired,
}

impl PackageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Expired => "expired",
        }
    }
}

impl std::str::FromStr for PackageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "expired" => Ok(Self::Expired),
            _ => Err(format!("Unknown package status: {}", s)),
        }
    }
}

/// Remaining count and status after one session of a package is used
pub fn session_used(remaining_sessions: i64) -> (i64, PackageStatus) {
    let remaining = (remaining_sessions - 1).max(0);
    let status = if remaining == 0 {
        PackageStatus::Completed
    } else {
        PackageStatus::Active
    };
    (remaining, status)
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PTPackage {
    pub id: String,
    pub member_id: String,
    pub coach_id: String,
    pub total_sessions: i64,
    pub remaining_sessions: i64,
    pub price_paid: f64,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

impl PTPackage {
    pub fn status_enum(&self) -> Option<PackageStatus> {
        self.status.parse().ok()
    }

    pub fn is_active(&self) -> bool {
        self.status_enum() == Some(PackageStatus::Active)
    }
}

#[derive(Debug, Deserialize)]
pub struct CreatePackageRequest {
    pub member_id: String,
    /// Defaults to the calling coach
    pub coach_id: Option<String>,
    pub total_sessions: i64,
    /// Defaults to the `pt_package_<sessions>` pricing entry
    pub price_paid: Option<f64>,
}

/// Key of a package size in the pricing table
pub fn package_pricing_key(total_sessions: i64) -> String {
    format!("pt_package_{}", total_sessions)
}

impl PTPackage {
    pub async fn create(
        db: &SqlitePool,
        member_id: &str,
        coach_id: &str,
        total_sessions: i64,
        price_paid: f64,
    ) -> Result<PTPackage, sqlx::Error> {
        let id = new_id();
        let now = now_timestamp();

        sqlx::query(
            r#"
            INSERT INTO pt_packages
                (id, member_id, coach_id, total_sessions, remaining_sessions, price_paid, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, 'active', ?, ?)
            "#,
        )
        .bind(&id)
        .bind(member_id)
        .bind(coach_id)
        .bind(total_sessions)
        .bind(total_sessions)
        .bind(price_paid)
        .bind(&now)
        .bind(&now)
        .execute(db)
        .await?;

        Self::get_by_id(db, &id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn get_by_id(db: &SqlitePool, id: &str) -> Result<Option<PTPackage>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM pt_packages WHERE id = ?")
            .bind(id)
            .fetch_optional(db)
            .await
    }

    pub async fn list_for_member(
        db: &SqlitePool,
        member_id: &str,
    ) -> Result<Vec<PTPackage>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM pt_packages WHERE member_id = ? ORDER BY created_at DESC")
            .bind(member_id)
            .fetch_all(db)
            .await
    }

    pub async fn list_for_coach(
        db: &SqlitePool,
        coach_id: &str,
    ) -> Result<Vec<PTPackage>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM pt_packages WHERE coach_id = ? ORDER BY created_at DESC")
            .bind(coach_id)
            .fetch_all(db)
            .await
    }

    /// Manually end a package. Only active packages move to `expired`.
    pub async fn cancel(db: &SqlitePool, id: &str) -> Result<PTPackage, sqlx::Error> {
        sqlx::query(
            "UPDATE pt_packages SET status = 'expired', updated_at = ? WHERE id = ? AND status = 'active'",
        )
        .bind(now_timestamp())
        .bind(id)
        .execute(db)
        .await?;

        Self::get_by_id(db, id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    /// Active packages with only a session or two left
    pub async fn low_remaining(db: &SqlitePool) -> Result<Vec<PTPackage>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT * FROM pt_packages
            WHERE status = 'active' AND remaining_sessions BETWEEN ? AND ?
            ORDER BY member_id
            "#,
        )
        .bind(LOW_SESSIONS_MIN)
        .bind(LOW_SESSIONS_MAX)
        .fetch_all(db)
        .await
    }

    /// Scheduled bookings already drawing on this package
    pub async fn reserved_sessions(
        conn: &mut SqliteConnection,
        id: &str,
    ) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM bookings WHERE package_id = ? AND status = 'scheduled'",
        )
        .bind(id)
        .fetch_one(&mut *conn)
        .await?;
        Ok(count)
    }

    pub async fn get_for_update(
        conn: &mut SqliteConnection,
        id: &str,
    ) -> Result<Option<PTPackage>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM pt_packages WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await
    }

    /// Consume one session of an active package inside the caller's transaction.
    /// Returns the updated package, or `None` when the package is not active.
    pub async fn use_session(
        conn: &mut SqliteConnection,
        id: &str,
    ) -> Result<Option<PTPackage>, sqlx::Error> {
        let Some(package) = Self::get_for_update(&mut *conn, id).await? else {
            return Ok(None);
        };
        if !package.is_active() {
            return Ok(None);
        }

        let (remaining, status) = session_used(package.remaining_sessions);
        sqlx::query(
            "UPDATE pt_packages SET remaining_sessions = ?, status = ?, updated_at = ? WHERE id = ?",
        )
        .bind(remaining)
        .bind(status.as_str())
        .bind(now_timestamp())
        .bind(id)
        .execute(&mut *conn)
        .await?;

        Self::get_for_update(conn, id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    async fn seed(db: &SqlitePool) {
        sqlx::query("INSERT INTO coaches (id, full_name, email) VALUES ('c-1', 'Sam', 'sam@example.com')")
            .execute(db)
            .await
            .unwrap();
        sqlx::query("INSERT INTO members (id, full_name, email) VALUES ('m-1', 'Dana', 'dana@example.com')")
            .execute(db)
            .await
            .unwrap();
    }

    #[test]
    fn test_session_used() {
        assert_eq!(session_used(2), (1, PackageStatus::Active));
        assert_eq!(session_used(1), (0, PackageStatus::Completed));
        assert_eq!(session_used(0), (0, PackageStatus::Completed));
    }

    #[tokio::test]
    async fn test_use_session_completes_package() {
        let db = test_pool().await;
        seed(&db).await;
        let package = PTPackage::create(&db, "m-1", "c-1", 2, 120.0).await.unwrap();

        let mut conn = db.acquire().await.unwrap();
        let after_first = PTPackage::use_session(&mut conn, &package.id).await.unwrap().unwrap();
        assert_eq!(after_first.remaining_sessions, 1);
        assert_eq!(after_first.status, "active");

        let after_second = PTPackage::use_session(&mut conn, &package.id).await.unwrap().unwrap();
        assert_eq!(after_second.remaining_sessions, 0);
        assert_eq!(after_second.status, "completed");

        // Completed packages are left alone
        assert!(PTPackage::use_session(&mut conn, &package.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cancel_and_low_remaining() {
        let db = test_pool().await;
        seed(&db).await;
        let low = PTPackage::create(&db, "m-1", "c-1", 2, 120.0).await.unwrap();
        let plenty = PTPackage::create(&db, "m-1", "c-1", 10, 500.0).await.unwrap();

        let found = PTPackage::low_remaining(&db).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, low.id);

        let cancelled = PTPackage::cancel(&db, &plenty.id).await.unwrap();
        assert_eq!(cancelled.status, "expired");
        assert_eq!(cancelled.remaining_sessions, 10);
        assert_eq!(package_pricing_key(10), "pt_package_10");
    }
}
