//! Scheduled-job endpoints, called by an external scheduler with the cron secret.

use axum::{extract::State, http::HeaderMap, Json};
use chrono::Utc;
use std::sync::Arc;

use crate::engine::{ReminderJob, ReminderSummary};
use crate::AppState;

use super::auth::verify_cron_secret;
use super::error::ApiError;

/// POST /api/cron/reminders
pub async fn run_reminders(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ReminderSummary>, ApiError> {
    verify_cron_secret(&headers, state.config.auth.cron_secret.as_deref())?;

    let job = ReminderJob::new(state.db.clone(), state.config.gym.utc_offset_minutes);
    let summary = job.run(Utc::now()).await?;

    if summary.total_sent() > 0 {
        state.wake_outbox();
    }
    tracing::info!(
        date = %summary.date,
        sent = summary.total_sent(),
        expired = summary.memberships_expired,
        errors = summary.errors.len(),
        "Reminder run finished"
    );

    Ok(Json(summary))
}
