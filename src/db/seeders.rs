//! Fixture data for demo mode.
//!
//! Every insert is `INSERT OR IGNORE` on fixed ids, so restarting a demo
//! instance keeps whatever the previous run changed.

use anyhow::Result;
use chrono::{Duration, Months, Utc};
use sqlx::SqlitePool;
use tracing::info;

use super::models::{format_date, format_timestamp};
use crate::config::DemoConfig;

/// Seed demo coaches, members, pricing, availability and a few sessions
pub async fn seed_demo_data(pool: &SqlitePool, demo: &DemoConfig) -> Result<()> {
    info!("Seeding demo data...");

    // (id, full_name, email, specialty)
    let coaches = [
        (demo.coach_id.as_str(), "Sam Okafor", "sam.coach@demo.gym", "Strength"),
        ("demo-coach-2", "Lena Fischer", "lena.coach@demo.gym", "Mobility"),
    ];
    for (id, name, email, specialty) in coaches {
        sqlx::query(
            "INSERT OR IGNORE INTO coaches (id, full_name, email, specialty, is_active) VALUES (?, ?, ?, ?, 1)",
        )
        .bind(id)
        .bind(name)
        .bind(email)
        .bind(specialty)
        .execute(pool)
        .await?;
    }

    // (id, full_name, email, phone, channel)
    let members = [
        (demo.member_id.as_str(), "Dana Reyes", "dana@demo.gym", Some("+15550100"), "both"),
        ("demo-member-2", "Omar Haddad", "omar@demo.gym", None, "email"),
    ];
    for (id, name, email, phone, channel) in members {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO members (id, full_name, email, phone, preferred_channel, coach_id)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(email)
        .bind(phone)
        .bind(channel)
        .bind(&demo.coach_id)
        .execute(pool)
        .await?;
    }

    // (product_key, label, price)
    let pricing = [
        ("membership_monthly", "Monthly membership", 49.0),
        ("membership_quarterly", "Quarterly membership", 135.0),
        ("membership_yearly", "Yearly membership", 480.0),
        ("pt_package_5", "5 PT sessions", 250.0),
        ("pt_package_10", "10 PT sessions", 450.0),
    ];
    for (key, label, price) in pricing {
        sqlx::query("INSERT OR IGNORE INTO pricing (id, product_key, label, price) VALUES (?, ?, ?, ?)")
            .bind(format!("demo-{}", key))
            .bind(key)
            .bind(label)
            .bind(price)
            .execute(pool)
            .await?;
    }

    // Weekday mornings and afternoons for the main demo coach
    for weekday in 0..5i64 {
        for (slot, start, end) in [("am", "08:00", "12:00"), ("pm", "14:00", "19:00")] {
            sqlx::query(
                r#"
                INSERT OR IGNORE INTO coach_availability (id, coach_id, weekday, start_time, end_time)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(format!("demo-avail-{}-{}", weekday, slot))
            .bind(&demo.coach_id)
            .bind(weekday)
            .bind(start)
            .bind(end)
            .execute(pool)
            .await?;
        }
    }

    let today = Utc::now().date_naive();
    let start = today - Months::new(1) + chrono::Days::new(7);
    let end = start + Months::new(1);
    sqlx::query(
        r#"
        INSERT OR IGNORE INTO gym_memberships (id, member_id, membership_type, start_date, end_date, status, price_paid)
        VALUES ('demo-membership', ?, 'monthly', ?, ?, 'active', 49.0)
        "#,
    )
    .bind(&demo.member_id)
    .bind(format_date(start))
    .bind(format_date(end))
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        INSERT OR IGNORE INTO pt_packages (id, member_id, coach_id, total_sessions, remaining_sessions, price_paid, status)
        VALUES ('demo-package', ?, ?, 10, 2, 450.0, 'active')
        "#,
    )
    .bind(&demo.member_id)
    .bind(&demo.coach_id)
    .execute(pool)
    .await?;

    let tomorrow_morning = (Utc::now() + Duration::days(1))
        .date_naive()
        .and_hms_opt(9, 0, 0)
        .map(|naive| naive.and_utc());
    if let Some(at) = tomorrow_morning {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO bookings (id, member_id, coach_id, package_id, scheduled_at, duration_minutes, status)
            VALUES ('demo-booking', ?, ?, 'demo-package', ?, 60, 'scheduled')
            "#,
        )
        .bind(&demo.member_id)
        .bind(&demo.coach_id)
        .bind(format_timestamp(at))
        .execute(pool)
        .await?;
    }

    info!(
        coach_id = %demo.coach_id,
        member_id = %demo.member_id,
        "Demo data ready"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    #[tokio::test]
    async fn test_seeding_twice_is_harmless() {
        let db = test_pool().await;
        let demo = DemoConfig::default();
        seed_demo_data(&db, &demo).await.unwrap();
        seed_demo_data(&db, &demo).await.unwrap();

        let (members,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM members")
            .fetch_one(&db)
            .await
            .unwrap();
        assert_eq!(members, 2);

        let (bookings,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM bookings")
            .fetch_one(&db)
            .await
            .unwrap();
        assert_eq!(bookings, 1);
    }
}
