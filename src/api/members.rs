//! Member endpoints.
//!
//! Coaches register and manage members; members read and edit their own
//! profile. Registration creates the identity first and removes it again if
//! the member row cannot be written.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::db::{
    Coach, CreateMemberRequest, GymSettings, Member, MemberListQuery, NotificationKind, Page,
    UpdateMemberRequest,
};
use crate::identity::{generate_password, NewIdentity};
use crate::notifications::templates;
use crate::AppState;

use super::auth::{CoachUser, MemberUser, Principal};
use super::error::{ApiError, ValidationErrorBuilder};
use super::notifications::queue_and_wake;
use super::validation::{
    validate_email, validate_full_name, validate_id, validate_language, validate_phone,
};

const MIN_PASSWORD_LEN: usize = 8;

fn validate_create_request(req: &CreateMemberRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    errors.check("full_name", validate_full_name(&req.full_name));
    errors.check("email", validate_email(&req.email));
    errors.check("phone", validate_phone(&req.phone));
    errors.check("preferred_language", validate_language(&req.preferred_language));
    if let Some(coach_id) = &req.coach_id {
        errors.check("coach_id", validate_id(coach_id, "coach_id"));
    }
    if let Some(password) = &req.password {
        if password.chars().count() < MIN_PASSWORD_LEN {
            errors.add(
                "password",
                format!("Password must be at least {} characters", MIN_PASSWORD_LEN),
            );
        }
    }
    errors.finish()
}

fn validate_update_request(req: &UpdateMemberRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if let Some(name) = &req.full_name {
        errors.check("full_name", validate_full_name(name));
    }
    errors.check("phone", validate_phone(&req.phone));
    if let Some(language) = &req.preferred_language {
        errors.check("preferred_language", validate_language(language));
    }
    if let Some(coach_id) = &req.coach_id {
        errors.check("coach_id", validate_id(coach_id, "coach_id"));
    }
    errors.finish()
}

async fn ensure_active_coach(state: &AppState, coach_id: &Option<String>) -> Result<(), ApiError> {
    if let Some(coach_id) = coach_id {
        if Coach::get_active(&state.db, coach_id).await?.is_none() {
            return Err(ApiError::validation_field("coach_id", "Coach not found"));
        }
    }
    Ok(())
}

/// Register a member: identity first, then the member row
pub async fn create_member(
    State(state): State<Arc<AppState>>,
    CoachUser(coach): CoachUser,
    Json(mut req): Json<CreateMemberRequest>,
) -> Result<(StatusCode, Json<Member>), ApiError> {
    validate_create_request(&req)?;
    ensure_active_coach(&state, &req.coach_id).await?;

    let identity = state
        .identity
        .clone()
        .ok_or_else(|| ApiError::service_unavailable("Member registration is not configured"))?;

    req.email = req.email.trim().to_lowercase();
    if req.coach_id.is_none() {
        req.coach_id = Some(coach.id.clone());
    }
    let password = req.password.clone().unwrap_or_else(generate_password);

    let user_id = identity
        .create_user(&NewIdentity {
            email: &req.email,
            password: &password,
            full_name: req.full_name.trim(),
        })
        .await?;

    let member = match Member::create(&state.db, &user_id, &req).await {
        Ok(member) => member,
        Err(e) => {
            tracing::warn!(user_id = %user_id, error = %e, "Member insert failed, removing identity");
            if let Err(rollback) = identity.delete_user(&user_id).await {
                tracing::error!(
                    user_id = %user_id,
                    email = %req.email,
                    error = %rollback,
                    "Failed to remove identity after member insert failed; manual cleanup required"
                );
            }
            return Err(e.into());
        }
    };

    tracing::info!(member_id = %member.id, coach_id = %coach.id, "Member registered");

    let gym_name = GymSettings::get(&state.db)
        .await
        .map(|s| s.gym_name)
        .unwrap_or_else(|_| "the gym".to_string());
    let message = templates::welcome(&member.full_name, &gym_name);
    queue_and_wake(&state, &member, NotificationKind::Welcome, &message, None).await;

    Ok((StatusCode::CREATED, Json(member)))
}

pub async fn list_members(
    State(state): State<Arc<AppState>>,
    _coach: CoachUser,
    Query(query): Query<MemberListQuery>,
    Query(page): Query<Page>,
) -> Result<Json<Vec<Member>>, ApiError> {
    let members = Member::list(&state.db, &query, page).await?;
    Ok(Json(members))
}

pub async fn get_member(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<String>,
) -> Result<Json<Member>, ApiError> {
    principal.ensure_member_access(&id)?;
    let member = Member::get_by_id(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("Member not found"))?;
    Ok(Json(member))
}

pub async fn update_member(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<String>,
    Json(mut req): Json<UpdateMemberRequest>,
) -> Result<Json<Member>, ApiError> {
    principal.ensure_member_access(&id)?;
    if !principal.is_coach() {
        // Members cannot reassign themselves
        req.coach_id = None;
    }
    validate_update_request(&req)?;
    ensure_active_coach(&state, &req.coach_id).await?;

    if Member::get_by_id(&state.db, &id).await?.is_none() {
        return Err(ApiError::not_found("Member not found"));
    }
    let member = Member::update(&state.db, &id, &req).await?;
    tracing::info!(member_id = %id, updated_by = %principal.id(), "Member profile updated");
    Ok(Json(member))
}

/// The calling member's own profile
pub async fn get_me(MemberUser(member): MemberUser) -> Json<Member> {
    Json(member)
}

pub async fn update_me(
    State(state): State<Arc<AppState>>,
    MemberUser(member): MemberUser,
    Json(mut req): Json<UpdateMemberRequest>,
) -> Result<Json<Member>, ApiError> {
    req.coach_id = None;
    validate_update_request(&req)?;
    let member = Member::update(&state.db, &member.id, &req).await?;
    Ok(Json(member))
}
