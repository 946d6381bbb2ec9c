//! Gym configuration endpoints: general settings, pricing and opening hours.
//! Any signed-in user can read them; only coaches can change them.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::collections::HashSet;
use std::sync::Arc;

use crate::db::{
    GymSettings, PricingItem, UpdateGymSettingsRequest, UpsertPricingRequest, WorkingHours,
    WorkingHoursEntry,
};
use crate::AppState;

use super::auth::{CoachUser, Principal};
use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::{
    validate_currency, validate_duration, validate_email, validate_full_name, validate_phone,
    validate_price, validate_product_key, validate_time_range, validate_weekday,
};

/// One week
const MAX_LEAD_MINUTES: i64 = 7 * 24 * 60;

pub async fn get_settings(
    State(state): State<Arc<AppState>>,
    _principal: Principal,
) -> Result<Json<GymSettings>, ApiError> {
    Ok(Json(GymSettings::get(&state.db).await?))
}

fn validate_settings_update(req: &UpdateGymSettingsRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if let Some(name) = &req.gym_name {
        errors.check("gym_name", validate_full_name(name));
    }
    if let Some(email) = &req.contact_email {
        errors.check("contact_email", validate_email(email));
    }
    errors.check("contact_phone", validate_phone(&req.contact_phone));
    if let Some(currency) = &req.currency {
        errors.check("currency", validate_currency(currency));
    }
    if let Some(minutes) = req.default_session_minutes {
        errors.check("default_session_minutes", validate_duration(minutes));
    }
    if let Some(lead) = req.booking_lead_minutes {
        if !(0..=MAX_LEAD_MINUTES).contains(&lead) {
            errors.add(
                "booking_lead_minutes",
                format!("Lead time must be between 0 and {} minutes", MAX_LEAD_MINUTES),
            );
        }
    }
    errors.finish()
}

pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    CoachUser(coach): CoachUser,
    Json(req): Json<UpdateGymSettingsRequest>,
) -> Result<Json<GymSettings>, ApiError> {
    validate_settings_update(&req)?;
    let settings = GymSettings::update(&state.db, &req).await?;
    tracing::info!(updated_by = %coach.id, "Gym settings updated");
    Ok(Json(settings))
}

pub async fn list_pricing(
    State(state): State<Arc<AppState>>,
    _principal: Principal,
) -> Result<Json<Vec<PricingItem>>, ApiError> {
    Ok(Json(PricingItem::list(&state.db).await?))
}

pub async fn upsert_pricing(
    State(state): State<Arc<AppState>>,
    CoachUser(coach): CoachUser,
    Json(req): Json<UpsertPricingRequest>,
) -> Result<Json<PricingItem>, ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    errors.check("product_key", validate_product_key(&req.product_key));
    errors.check("label", validate_full_name(&req.label));
    errors.check("price", validate_price(req.price));
    if let Some(currency) = &req.currency {
        errors.check("currency", validate_currency(currency));
    }
    errors.finish()?;

    let default_currency = GymSettings::get(&state.db).await?.currency;
    let item = PricingItem::upsert(&state.db, &req, &default_currency).await?;
    tracing::info!(product_key = %item.product_key, price = item.price, updated_by = %coach.id, "Price updated");
    Ok(Json(item))
}

pub async fn delete_pricing(
    State(state): State<Arc<AppState>>,
    _coach: CoachUser,
    Path(product_key): Path<String>,
) -> Result<StatusCode, ApiError> {
    if PricingItem::delete(&state.db, &product_key).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found("Price not found"))
    }
}

pub async fn list_working_hours(
    State(state): State<Arc<AppState>>,
    _principal: Principal,
) -> Result<Json<Vec<WorkingHours>>, ApiError> {
    Ok(Json(WorkingHours::list(&state.db).await?))
}

fn validate_working_hours(entries: &[WorkingHoursEntry]) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    let mut seen = HashSet::new();
    for (i, entry) in entries.iter().enumerate() {
        let field = format!("hours[{}]", i);
        errors.check(&field, validate_weekday(entry.weekday));
        if !seen.insert(entry.weekday) {
            errors.add(&field, "Weekday listed more than once");
        }
        if !entry.is_closed {
            errors.check(&field, validate_time_range(&entry.open_time, &entry.close_time));
        }
    }
    errors.finish()
}

/// Update opening hours for the weekdays given; others are left alone
pub async fn set_working_hours(
    State(state): State<Arc<AppState>>,
    CoachUser(coach): CoachUser,
    Json(entries): Json<Vec<WorkingHoursEntry>>,
) -> Result<Json<Vec<WorkingHours>>, ApiError> {
    validate_working_hours(&entries)?;
    let hours = WorkingHours::set_many(&state.db, &entries).await?;
    tracing::info!(days = entries.len(), updated_by = %coach.id, "Working hours updated");
    Ok(Json(hours))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(weekday: i64, open: &str, close: &str, is_closed: bool) -> WorkingHoursEntry {
        WorkingHoursEntry {
            weekday,
            open_time: open.to_string(),
            close_time: close.to_string(),
            is_closed,
        }
    }

    #[test]
    fn test_working_hours_validation() {
        assert!(validate_working_hours(&[entry(0, "06:00", "22:00", false)]).is_ok());
        // Closed days skip the time check
        assert!(validate_working_hours(&[entry(6, "", "", true)]).is_ok());
        assert!(validate_working_hours(&[entry(0, "06:00", "22:00", false), entry(0, "07:00", "21:00", false)]).is_err());
        assert!(validate_working_hours(&[entry(2, "22:00", "06:00", false)]).is_err());
    }

    #[test]
    fn test_settings_validation() {
        assert!(validate_settings_update(&UpdateGymSettingsRequest::default()).is_ok());
        let bad = UpdateGymSettingsRequest {
            currency: Some("dollars".to_string()),
            booking_lead_minutes: Some(-5),
            ..Default::default()
        };
        assert!(validate_settings_update(&bad).unwrap_err().message().contains("2 fields"));
    }
}
