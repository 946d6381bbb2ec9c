//! Gym membership endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use std::sync::Arc;

use crate::db::{
    GymMembership, Member, MembershipResponse, PricingItem, PurchaseMembershipRequest,
};
use crate::utils::local_date;
use crate::AppState;

use super::auth::Principal;
use super::error::ApiError;
use super::validation::validate_price;

fn gym_today(state: &AppState) -> chrono::NaiveDate {
    local_date(Utc::now(), state.config.gym.utc_offset_minutes)
}

/// Buy a membership. Members buy for themselves at the listed price;
/// coaches may record a purchase for any member at a negotiated price.
pub async fn purchase_membership(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Json(req): Json<PurchaseMembershipRequest>,
) -> Result<(StatusCode, Json<MembershipResponse>), ApiError> {
    let (member_id, price_override) = match &principal {
        Principal::Member(member) => {
            if req.member_id.as_ref().is_some_and(|id| id != &member.id) {
                return Err(ApiError::forbidden("Access denied"));
            }
            (member.id.clone(), None)
        }
        Principal::Coach(_) => {
            let member_id = req
                .member_id
                .clone()
                .ok_or_else(|| ApiError::validation_field("member_id", "member_id is required"))?;
            (member_id, req.price_paid)
        }
    };

    if Member::get_by_id(&state.db, &member_id).await?.is_none() {
        return Err(ApiError::not_found("Member not found"));
    }

    let today = gym_today(&state);
    let start = req.start_date.unwrap_or(today);
    if start < today {
        return Err(ApiError::validation_field(
            "start_date",
            "Start date cannot be in the past",
        ));
    }
    let end = req
        .membership_type
        .end_date(start)
        .ok_or_else(|| ApiError::validation_field("start_date", "Start date is out of range"))?;

    let price = match price_override {
        Some(price) => price,
        None => PricingItem::price_for(&state.db, &req.membership_type.pricing_key())
            .await?
            .ok_or_else(|| {
                ApiError::validation_field(
                    "membership_type",
                    format!("No price configured for {} memberships", req.membership_type.as_str()),
                )
            })?,
    };
    validate_price(price).map_err(|e| ApiError::validation_field("price_paid", e))?;

    let membership =
        GymMembership::create(&state.db, &member_id, req.membership_type, start, end, price).await?;
    tracing::info!(
        membership_id = %membership.id,
        member_id = %member_id,
        membership_type = %req.membership_type.as_str(),
        end_date = %membership.end_date,
        "Membership purchased"
    );

    Ok((StatusCode::CREATED, Json(MembershipResponse::new(membership, today))))
}

pub async fn list_member_memberships(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(member_id): Path<String>,
) -> Result<Json<Vec<MembershipResponse>>, ApiError> {
    principal.ensure_member_access(&member_id)?;
    let today = gym_today(&state);
    let memberships = GymMembership::list_for_member(&state.db, &member_id)
        .await?
        .into_iter()
        .map(|m| MembershipResponse::new(m, today))
        .collect();
    Ok(Json(memberships))
}

/// Cancel a membership. Repeating the call, or cancelling an expired one,
/// returns the row unchanged.
pub async fn cancel_membership(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<String>,
) -> Result<Json<MembershipResponse>, ApiError> {
    let membership = GymMembership::get_by_id(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("Membership not found"))?;
    if !principal.can_access_member(&membership.member_id) {
        return Err(ApiError::not_found("Membership not found"));
    }

    let cancelled = GymMembership::cancel(&state.db, &id).await?;
    tracing::info!(membership_id = %id, cancelled_by = %principal.id(), "Membership cancelled");
    Ok(Json(MembershipResponse::new(cancelled, gym_today(&state))))
}
