//! Health endpoint.

use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use crate::startup::{get_system_health, SystemHealthStatus};
use crate::AppState;

/// GET /health
/// Answers 503 while the database is unreachable.
pub async fn health_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<SystemHealthStatus>) {
    let health = get_system_health(&state.config, &state.db).await;
    let status = if health.healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(health))
}
