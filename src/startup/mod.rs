//! Startup self-checks module
//!
//! This module performs system verification before the server starts accepting requests.
//! Checks include:
//! - Database connectivity and schema
//! - Data directory is writable
//! - Optional integrations (cron secret, identity provider, notification channels)

use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::db::ESSENTIAL_TABLES;
use crate::DbPool;

/// Result of a single startup check
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    /// A failed critical check aborts startup
    pub critical: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl CheckResult {
    pub fn pass(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            critical: false,
            message: message.into(),
            details: None,
        }
    }

    pub fn fail(name: impl Into<String>, message: impl Into<String>, critical: bool) -> Self {
        Self {
            name: name.into(),
            passed: false,
            critical,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Aggregated startup check results
#[derive(Debug, Clone, Serialize)]
pub struct StartupCheckReport {
    pub checks: Vec<CheckResult>,
    pub all_critical_passed: bool,
    pub all_passed: bool,
    pub summary: String,
}

impl StartupCheckReport {
    pub fn new(checks: Vec<CheckResult>) -> Self {
        let all_critical_passed = checks.iter().filter(|c| c.critical).all(|c| c.passed);
        let all_passed = checks.iter().all(|c| c.passed);

        let failed_critical = checks.iter().filter(|c| c.critical && !c.passed).count();
        let failed_non_critical = checks.iter().filter(|c| !c.critical && !c.passed).count();
        let total = checks.len();
        let passed = checks.iter().filter(|c| c.passed).count();

        let summary = if all_passed {
            format!("All {} startup checks passed", total)
        } else if all_critical_passed {
            format!(
                "{}/{} checks passed ({} non-critical warnings)",
                passed, total, failed_non_critical
            )
        } else {
            format!(
                "{}/{} checks passed ({} critical failures)",
                passed, total, failed_critical
            )
        };

        Self {
            checks,
            all_critical_passed,
            all_passed,
            summary,
        }
    }
}

/// Run all startup self-checks
pub async fn run_startup_checks(config: &Config, db: &DbPool) -> StartupCheckReport {
    info!("Running startup self-checks...");

    let checks = vec![
        check_database_connectivity(db).await,
        check_database_schema(db).await,
        check_directory_writability(config),
        check_cron_secret(config),
        check_identity_provider(config),
        check_notification_channels(config),
    ];

    let report = StartupCheckReport::new(checks);

    for check in &report.checks {
        if check.passed {
            info!(check = %check.name, message = %check.message, "Startup check PASSED");
        } else if check.critical {
            error!(
                check = %check.name,
                message = %check.message,
                details = ?check.details,
                "Startup check FAILED (CRITICAL)"
            );
        } else {
            warn!(
                check = %check.name,
                message = %check.message,
                details = ?check.details,
                "Startup check FAILED (non-critical)"
            );
        }
    }

    info!(
        summary = %report.summary,
        all_passed = report.all_passed,
        all_critical_passed = report.all_critical_passed,
        "Startup checks completed"
    );

    report
}

async fn check_database_connectivity(db: &DbPool) -> CheckResult {
    match sqlx::query("SELECT 1").fetch_one(db).await {
        Ok(_) => CheckResult::pass("database_connectivity", "Database connection successful"),
        Err(e) => CheckResult::fail("database_connectivity", "Failed to connect to database", true)
            .with_details(e.to_string()),
    }
}

async fn check_database_schema(db: &DbPool) -> CheckResult {
    let result: Result<Vec<(String,)>, _> = sqlx::query_as(
        "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
    )
    .fetch_all(db)
    .await;

    match result {
        Ok(tables) => {
            let table_names: Vec<&str> = tables.iter().map(|(n,)| n.as_str()).collect();
            let missing: Vec<&str> = ESSENTIAL_TABLES
                .iter()
                .filter(|t| !table_names.contains(*t))
                .copied()
                .collect();

            if missing.is_empty() {
                CheckResult::pass(
                    "database_schema",
                    format!("Database schema valid ({} tables)", tables.len()),
                )
            } else {
                CheckResult::fail("database_schema", "Missing essential database tables", true)
                    .with_details(format!("Missing: {}", missing.join(", ")))
            }
        }
        Err(e) => CheckResult::fail("database_schema", "Failed to query database schema", true)
            .with_details(e.to_string()),
    }
}

fn check_directory_writability(config: &Config) -> CheckResult {
    let data_dir = &config.server.data_dir;
    let test_file = data_dir.join(".gymflow_write_test");

    match std::fs::write(&test_file, "test") {
        Ok(_) => {
            let _ = std::fs::remove_file(&test_file);
            CheckResult::pass("directory_writability", "Data directory is writable")
                .with_details(format!("Path: {}", data_dir.display()))
        }
        Err(e) => CheckResult::fail("directory_writability", "Data directory is not writable", true)
            .with_details(format!("{}: {}", data_dir.display(), e)),
    }
}

fn check_cron_secret(config: &Config) -> CheckResult {
    match config.auth.cron_secret.as_deref() {
        Some(secret) if !secret.is_empty() => {
            CheckResult::pass("cron_secret", "Cron secret configured")
        }
        _ => CheckResult::fail("cron_secret", "Cron secret not set", false)
            .with_details("The reminder endpoint will answer 503"),
    }
}

fn check_identity_provider(config: &Config) -> CheckResult {
    if config.identity.is_configured() {
        CheckResult::pass("identity_provider", "Identity provider configured")
    } else {
        CheckResult::fail("identity_provider", "Identity provider not configured", false)
            .with_details("Member registration is unavailable")
    }
}

fn check_notification_channels(config: &Config) -> CheckResult {
    let mut channels = Vec::new();
    if config.notifications.email.is_some() {
        channels.push("email");
    }
    if config.notifications.whatsapp.is_some() {
        channels.push("whatsapp");
    }

    if channels.is_empty() {
        CheckResult::fail("notification_channels", "No notification channel configured", false)
            .with_details("Queued notifications will fail until a channel is set up")
    } else {
        CheckResult::pass(
            "notification_channels",
            format!("Notification channels: {}", channels.join(", ")),
        )
    }
}

/// Health status for the health endpoint
pub async fn get_system_health(config: &Config, db: &DbPool) -> SystemHealthStatus {
    let db_check = check_database_connectivity(db).await;
    let database_healthy = db_check.passed;
    let checks = vec![
        db_check,
        check_directory_writability(config),
        check_notification_channels(config),
    ];

    SystemHealthStatus {
        // Only the database is required to serve requests
        healthy: database_healthy,
        database_healthy,
        checks,
        version: env!("CARGO_PKG_VERSION").to_string(),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemHealthStatus {
    pub healthy: bool,
    pub database_healthy: bool,
    pub checks: Vec<CheckResult>,
    pub version: String,
}
