//! Notification log endpoints and the request-side queueing helper.

use axum::{
    extract::{Query, State},
    Json,
};
use std::sync::Arc;

use crate::db::{Member, NotificationKind, NotificationLog, NotificationLogQuery, Page};
use crate::notifications::{queue_for_member, Message};
use crate::AppState;

use super::auth::CoachUser;
use super::error::ApiError;

/// Queue a message for a member and wake the outbox.
///
/// The triggering action has already succeeded, so a queueing failure is
/// logged rather than returned.
pub async fn queue_and_wake(
    state: &AppState,
    member: &Member,
    kind: NotificationKind,
    message: &Message,
    dedupe_key: Option<&str>,
) {
    match queue_for_member(&state.db, member, kind, message, dedupe_key).await {
        Ok(tally) if tally.queued > 0 => state.wake_outbox(),
        Ok(_) => {}
        Err(e) => {
            tracing::warn!(member_id = %member.id, kind = %kind, error = %e, "Failed to queue notification");
        }
    }
}

/// Recent outbox rows, newest first
pub async fn list_notifications(
    State(state): State<Arc<AppState>>,
    _coach: CoachUser,
    Query(query): Query<NotificationLogQuery>,
    Query(page): Query<Page>,
) -> Result<Json<Vec<NotificationLog>>, ApiError> {
    if let Some(status) = &query.status {
        if !matches!(status.as_str(), "pending" | "sent" | "failed") {
            return Err(ApiError::validation_field(
                "status",
                "Status must be pending, sent or failed",
            ));
        }
    }
    let rows = NotificationLog::list(&state.db, &query, page).await?;
    Ok(Json(rows))
}
