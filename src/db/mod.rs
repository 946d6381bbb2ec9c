mod models;
mod seeders;

pub use models::*;
pub use seeders::seed_demo_data;

use anyhow::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

pub type DbPool = SqlitePool;

/// Tables the service cannot run without, checked at startup
pub const ESSENTIAL_TABLES: [&str; 10] = [
    "members",
    "coaches",
    "bookings",
    "gym_memberships",
    "pt_packages",
    "pricing",
    "gym_settings",
    "coach_availability",
    "gym_working_hours",
    "notifications_log",
];

/// Execute a SQL migration file, properly handling comments
async fn execute_sql(pool: &SqlitePool, sql: &str) -> Result<()> {
    for statement in sql.split(';') {
        // Strip SQL comment lines (lines starting with --)
        let cleaned: String = statement
            .lines()
            .filter(|line| !line.trim().starts_with("--"))
            .collect::<Vec<_>>()
            .join("\n");
        let trimmed = cleaned.trim();
        if !trimmed.is_empty() {
            sqlx::query(trimmed).execute(pool).await?;
        }
    }
    Ok(())
}

pub async fn init(data_dir: &Path) -> Result<DbPool> {
    let db_path = data_dir.join("gymflow.db");
    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

    info!("Initializing database at {}", db_path.display());

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&db_url)
        .await?;

    // WAL lets readers proceed while a booking transaction holds the write lock
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous = NORMAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await?;

    run_migrations(&pool).await?;

    info!("Database initialized successfully");
    Ok(pool)
}

async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    info!("Running database migrations...");

    // Migration 001: members, coaches, bookings, memberships, packages
    execute_sql(pool, include_str!("../../migrations/001_initial.sql")).await?;

    // Migration 002: pricing, gym settings, working hours, coach availability
    let has_settings: Option<(String,)> = sqlx::query_as(
        "SELECT name FROM sqlite_master WHERE type='table' AND name='gym_settings'",
    )
    .fetch_optional(pool)
    .await?;
    if has_settings.is_none() {
        execute_sql(pool, include_str!("../../migrations/002_settings.sql")).await?;
    }

    // Migration 003: notification outbox
    let has_notifications: Option<(String,)> = sqlx::query_as(
        "SELECT name FROM sqlite_master WHERE type='table' AND name='notifications_log'",
    )
    .fetch_optional(pool)
    .await?;
    if has_notifications.is_none() {
        execute_sql(pool, include_str!("../../migrations/003_notifications.sql")).await?;
    }

    Ok(())
}

/// Single-connection in-memory database with the full schema, for tests
#[cfg(test)]
pub async fn test_pool() -> DbPool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory database");
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await
        .expect("enable foreign keys");
    run_migrations(&pool).await.expect("migrations");
    pool
}
