//! Coach directory, schedules, free slots and weekly availability.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{Duration, NaiveDate, Utc};
use serde::Deserialize;
use std::sync::Arc;

use crate::db::{
    Booking, BookingDetail, BookingListQuery, Coach, CoachAvailability, CoachResponse, GymSettings,
    SetAvailabilityRequest, UpdateCoachProfileRequest,
};
use crate::engine::{available_slots, Slot};
use crate::AppState;

use super::auth::{CoachUser, Principal};
use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::{
    validate_duration, validate_full_name, validate_phone, validate_time_range, validate_weekday,
};

/// Most availability windows a coach may have in one week
const MAX_AVAILABILITY_WINDOWS: usize = 50;

pub async fn list_coaches(
    State(state): State<Arc<AppState>>,
    _principal: Principal,
) -> Result<Json<Vec<CoachResponse>>, ApiError> {
    let coaches = Coach::list_active(&state.db).await?;
    Ok(Json(coaches.into_iter().map(CoachResponse::from).collect()))
}

pub async fn get_coach(
    State(state): State<Arc<AppState>>,
    _principal: Principal,
    Path(id): Path<String>,
) -> Result<Json<CoachResponse>, ApiError> {
    let coach = Coach::get_active(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("Coach not found"))?;
    Ok(Json(coach.into()))
}

pub async fn get_me(CoachUser(coach): CoachUser) -> Json<CoachResponse> {
    Json(coach.into())
}

pub async fn update_me(
    State(state): State<Arc<AppState>>,
    CoachUser(coach): CoachUser,
    Json(req): Json<UpdateCoachProfileRequest>,
) -> Result<Json<CoachResponse>, ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if let Some(name) = &req.full_name {
        errors.check("full_name", validate_full_name(name));
    }
    errors.check("phone", validate_phone(&req.phone));
    if req.specialty.as_ref().is_some_and(|s| s.chars().count() > 100) {
        errors.add("specialty", "Specialty is too long (max 100 characters)");
    }
    errors.finish()?;

    let updated = Coach::update_profile(&state.db, &coach.id, &req).await?;
    Ok(Json(updated.into()))
}

/// The calling coach's sessions, optionally filtered by range and status
pub async fn my_schedule(
    State(state): State<Arc<AppState>>,
    CoachUser(coach): CoachUser,
    Query(query): Query<BookingListQuery>,
) -> Result<Json<Vec<BookingDetail>>, ApiError> {
    let bookings = Booking::list_for_coach(&state.db, &coach.id, &query).await?;
    Ok(Json(bookings))
}

#[derive(Debug, Deserialize)]
pub struct SlotsQuery {
    pub date: NaiveDate,
    /// Defaults to the gym's session length
    pub duration_minutes: Option<i64>,
}

/// Bookable start times for a coach on one local day
pub async fn list_slots(
    State(state): State<Arc<AppState>>,
    _principal: Principal,
    Path(id): Path<String>,
    Query(query): Query<SlotsQuery>,
) -> Result<Json<Vec<Slot>>, ApiError> {
    if Coach::get_active(&state.db, &id).await?.is_none() {
        return Err(ApiError::not_found("Coach not found"));
    }

    let settings = GymSettings::get(&state.db).await?;
    let minutes = query
        .duration_minutes
        .unwrap_or(settings.default_session_minutes);
    validate_duration(minutes).map_err(|e| ApiError::validation_field("duration_minutes", e))?;

    let not_before = Utc::now() + Duration::minutes(settings.booking_lead_minutes.max(0));
    let slots = available_slots(
        &state.db,
        &id,
        query.date,
        minutes,
        state.config.gym.utc_offset_minutes,
        not_before,
    )
    .await?;
    Ok(Json(slots))
}

pub async fn get_availability(
    State(state): State<Arc<AppState>>,
    _principal: Principal,
    Path(id): Path<String>,
) -> Result<Json<Vec<CoachAvailability>>, ApiError> {
    let windows = CoachAvailability::list_for_coach(&state.db, &id).await?;
    Ok(Json(windows))
}

fn validate_availability(req: &SetAvailabilityRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if req.windows.len() > MAX_AVAILABILITY_WINDOWS {
        errors.add(
            "windows",
            format!("At most {} windows are allowed", MAX_AVAILABILITY_WINDOWS),
        );
    }
    for (i, window) in req.windows.iter().enumerate() {
        let field = format!("windows[{}]", i);
        errors.check(&field, validate_weekday(window.weekday));
        errors.check(&field, validate_time_range(&window.start_time, &window.end_time));
    }
    errors.finish()
}

/// Replace a coach's weekly availability. Coaches edit their own.
pub async fn set_availability(
    State(state): State<Arc<AppState>>,
    CoachUser(coach): CoachUser,
    Path(id): Path<String>,
    Json(req): Json<SetAvailabilityRequest>,
) -> Result<Json<Vec<CoachAvailability>>, ApiError> {
    if coach.id != id {
        return Err(ApiError::forbidden("Access denied"));
    }
    validate_availability(&req)?;

    let windows = CoachAvailability::replace_for_coach(&state.db, &id, &req.windows).await?;
    tracing::info!(coach_id = %id, windows = windows.len(), "Coach availability updated");
    Ok(Json(windows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::AvailabilityWindow;

    fn window(weekday: i64, start: &str, end: &str) -> AvailabilityWindow {
        AvailabilityWindow {
            weekday,
            start_time: start.to_string(),
            end_time: end.to_string(),
        }
    }

    #[test]
    fn test_availability_validation() {
        let ok = SetAvailabilityRequest {
            windows: vec![window(0, "09:00", "12:00"), window(0, "14:00", "18:00")],
        };
        assert!(validate_availability(&ok).is_ok());

        let bad = SetAvailabilityRequest {
            windows: vec![window(7, "09:00", "12:00"), window(1, "12:00", "09:00")],
        };
        let err = validate_availability(&bad).unwrap_err();
        assert!(err.message().contains("2 fields"));
    }
}
