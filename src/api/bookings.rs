//! Booking endpoints: reserve a session, list sessions, change status.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{Duration, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::db::{
    Booking, BookingDetail, BookingListQuery, BookingStatus, Coach, CreateBookingRequest,
    GymSettings, Member, NotificationKind, PTPackage, UpdateBookingStatusRequest,
};
use crate::engine::{create_booking, transition_booking, NewBooking};
use crate::notifications::templates;
use crate::utils::gym_offset;
use crate::AppState;

use super::auth::Principal;
use super::error::{ApiError, ValidationErrorBuilder};
use super::notifications::queue_and_wake;
use super::validation::{validate_duration, validate_id, validate_notes};

/// Work out who is booking whom. Members book for themselves with their
/// assigned coach by default; coaches book on behalf of a member.
fn resolve_parties(principal: &Principal, req: &CreateBookingRequest) -> Result<(String, String), ApiError> {
    match principal {
        Principal::Member(member) => {
            if req.member_id.as_ref().is_some_and(|id| id != &member.id) {
                return Err(ApiError::forbidden("Access denied"));
            }
            let coach_id = req
                .coach_id
                .clone()
                .or_else(|| member.coach_id.clone())
                .ok_or_else(|| ApiError::validation_field("coach_id", "coach_id is required"))?;
            Ok((member.id.clone(), coach_id))
        }
        Principal::Coach(coach) => {
            let member_id = req
                .member_id
                .clone()
                .ok_or_else(|| ApiError::validation_field("member_id", "member_id is required"))?;
            let coach_id = req.coach_id.clone().unwrap_or_else(|| coach.id.clone());
            Ok((member_id, coach_id))
        }
    }
}

pub async fn book_session(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Json(req): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<Booking>), ApiError> {
    let (member_id, coach_id) = resolve_parties(&principal, &req)?;
    let settings = GymSettings::get(&state.db).await?;
    let duration = req
        .duration_minutes
        .unwrap_or(settings.default_session_minutes);

    let mut errors = ValidationErrorBuilder::new();
    errors.check("member_id", validate_id(&member_id, "member_id"));
    errors.check("coach_id", validate_id(&coach_id, "coach_id"));
    if let Some(package_id) = &req.package_id {
        errors.check("package_id", validate_id(package_id, "package_id"));
    }
    errors.check("duration_minutes", validate_duration(duration));
    errors.check("notes", validate_notes(&req.notes));
    let earliest = Utc::now() + Duration::minutes(settings.booking_lead_minutes.max(0));
    if req.scheduled_at < earliest {
        errors.add(
            "scheduled_at",
            format!(
                "Sessions must be booked at least {} minutes in advance",
                settings.booking_lead_minutes
            ),
        );
    }
    errors.finish()?;

    let member = Member::get_by_id(&state.db, &member_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Member not found"))?;
    let coach = Coach::get_active(&state.db, &coach_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Coach not found"))?;

    let booking = create_booking(
        &state.db,
        &NewBooking {
            member_id: member.id.clone(),
            coach_id: coach.id.clone(),
            package_id: req.package_id.clone(),
            scheduled_at: req.scheduled_at,
            duration_minutes: duration,
            notes: req.notes.clone(),
        },
    )
    .await?;

    let local = req
        .scheduled_at
        .with_timezone(&gym_offset(state.config.gym.utc_offset_minutes));
    let message = templates::booking_confirmed(&member.full_name, &coach.full_name, &local, duration);
    let key = format!("{}:{}", NotificationKind::BookingConfirmed, booking.id);
    queue_and_wake(&state, &member, NotificationKind::BookingConfirmed, &message, Some(&key)).await;

    Ok((StatusCode::CREATED, Json(booking)))
}

/// Members see their own sessions, coaches their own schedule
pub async fn list_bookings(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Query(query): Query<BookingListQuery>,
) -> Result<Json<Vec<BookingDetail>>, ApiError> {
    let bookings = match &principal {
        Principal::Member(member) => Booking::list_for_member(&state.db, &member.id, &query).await?,
        Principal::Coach(coach) => Booking::list_for_coach(&state.db, &coach.id, &query).await?,
    };
    Ok(Json(bookings))
}

pub async fn list_member_bookings(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(member_id): Path<String>,
    Query(query): Query<BookingListQuery>,
) -> Result<Json<Vec<BookingDetail>>, ApiError> {
    principal.ensure_member_access(&member_id)?;
    let bookings = Booking::list_for_member(&state.db, &member_id, &query).await?;
    Ok(Json(bookings))
}

pub async fn get_booking(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<String>,
) -> Result<Json<Booking>, ApiError> {
    let booking = Booking::get_by_id(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("Booking not found"))?;
    // Hide other members' bookings behind the same 404
    if !principal.can_access_member(&booking.member_id) {
        return Err(ApiError::not_found("Booking not found"));
    }
    Ok(Json(booking))
}

#[derive(Debug, Serialize)]
pub struct StatusChangeResponse {
    pub booking: Booking,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package: Option<PTPackage>,
}

/// Complete, cancel or mark a no-show. Members may only cancel their own.
pub async fn update_booking_status(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<String>,
    Json(req): Json<UpdateBookingStatusRequest>,
) -> Result<Json<StatusChangeResponse>, ApiError> {
    let booking = Booking::get_by_id(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("Booking not found"))?;
    if !principal.can_access_member(&booking.member_id) {
        return Err(ApiError::not_found("Booking not found"));
    }
    if !principal.is_coach() && req.status != BookingStatus::Cancelled {
        return Err(ApiError::forbidden("Only coaches can record session outcomes"));
    }

    let transition = transition_booking(&state.db, &id, req.status).await?;
    tracing::info!(
        booking_id = %id,
        status = %req.status,
        changed_by = %principal.id(),
        "Booking status updated"
    );

    if req.status == BookingStatus::Cancelled {
        notify_cancelled(&state, &transition.booking).await;
    }

    Ok(Json(StatusChangeResponse {
        booking: transition.booking,
        package: transition.package,
    }))
}

async fn notify_cancelled(state: &AppState, booking: &Booking) {
    let member = match Member::get_by_id(&state.db, &booking.member_id).await {
        Ok(Some(member)) => member,
        Ok(None) => return,
        Err(e) => {
            tracing::warn!(booking_id = %booking.id, error = %e, "Could not load member for cancellation notice");
            return;
        }
    };
    let coach_name = Coach::get_by_id(&state.db, &booking.coach_id)
        .await
        .ok()
        .flatten()
        .map(|c| c.full_name)
        .unwrap_or_else(|| "your coach".to_string());
    let Some(start) = booking.starts_at() else {
        return;
    };

    let local = start.with_timezone(&gym_offset(state.config.gym.utc_offset_minutes));
    let message = templates::booking_cancelled(&member.full_name, &coach_name, &local);
    let key = format!("{}:{}", NotificationKind::BookingCancelled, booking.id);
    queue_and_wake(state, &member, NotificationKind::BookingCancelled, &message, Some(&key)).await;
}
