//! Personal-training package endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::db::{package_pricing_key, Coach, CreatePackageRequest, Member, PTPackage, PricingItem};
use crate::AppState;

use super::auth::{CoachUser, Principal};
use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::{validate_id, validate_price, validate_total_sessions};

/// Sell a package. The price defaults to the matching pricing entry.
pub async fn create_package(
    State(state): State<Arc<AppState>>,
    CoachUser(coach): CoachUser,
    Json(req): Json<CreatePackageRequest>,
) -> Result<(StatusCode, Json<PTPackage>), ApiError> {
    let coach_id = req.coach_id.clone().unwrap_or_else(|| coach.id.clone());

    let mut errors = ValidationErrorBuilder::new();
    errors.check("member_id", validate_id(&req.member_id, "member_id"));
    errors.check("coach_id", validate_id(&coach_id, "coach_id"));
    errors.check("total_sessions", validate_total_sessions(req.total_sessions));
    if let Some(price) = req.price_paid {
        errors.check("price_paid", validate_price(price));
    }
    errors.finish()?;

    if Member::get_by_id(&state.db, &req.member_id).await?.is_none() {
        return Err(ApiError::not_found("Member not found"));
    }
    if Coach::get_active(&state.db, &coach_id).await?.is_none() {
        return Err(ApiError::validation_field("coach_id", "Coach not found"));
    }

    let price = match req.price_paid {
        Some(price) => price,
        None => PricingItem::price_for(&state.db, &package_pricing_key(req.total_sessions))
            .await?
            .ok_or_else(|| {
                ApiError::validation_field(
                    "price_paid",
                    format!("No price configured for a {}-session package", req.total_sessions),
                )
            })?,
    };

    let package =
        PTPackage::create(&state.db, &req.member_id, &coach_id, req.total_sessions, price).await?;
    tracing::info!(
        package_id = %package.id,
        member_id = %req.member_id,
        coach_id = %coach_id,
        total_sessions = req.total_sessions,
        "PT package created"
    );

    Ok((StatusCode::CREATED, Json(package)))
}

/// Packages sold under the calling coach
pub async fn list_coach_packages(
    State(state): State<Arc<AppState>>,
    CoachUser(coach): CoachUser,
) -> Result<Json<Vec<PTPackage>>, ApiError> {
    let packages = PTPackage::list_for_coach(&state.db, &coach.id).await?;
    Ok(Json(packages))
}

pub async fn list_member_packages(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(member_id): Path<String>,
) -> Result<Json<Vec<PTPackage>>, ApiError> {
    principal.ensure_member_access(&member_id)?;
    let packages = PTPackage::list_for_member(&state.db, &member_id).await?;
    Ok(Json(packages))
}

/// End an active package early. Its remaining sessions are forfeited.
pub async fn cancel_package(
    State(state): State<Arc<AppState>>,
    CoachUser(coach): CoachUser,
    Path(id): Path<String>,
) -> Result<Json<PTPackage>, ApiError> {
    let package = PTPackage::get_by_id(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("PT package not found"))?;
    if !package.is_active() {
        return Err(ApiError::conflict(format!(
            "PT package is already {}",
            package.status
        )));
    }

    let package = PTPackage::cancel(&state.db, &id).await?;
    tracing::info!(package_id = %id, cancelled_by = %coach.id, "PT package cancelled");
    Ok(Json(package))
}
