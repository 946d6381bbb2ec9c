//! Request authentication.
//!
//! Callers present a bearer JWT issued by the identity provider. The token's
//! `sub` is looked up in `coaches` and then `members` to decide the role.
//! In demo mode, requests without a token act as the configured demo user.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
    Json,
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use subtle::ConstantTimeEq;

use super::error::ApiError;
use crate::db::{Coach, CoachResponse, Member};
use crate::AppState;

/// Header that picks the demo role when no token is sent
pub const DEMO_ROLE_HEADER: &str = "x-demo-role";

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    #[serde(default)]
    pub email: Option<String>,
}

/// Verify an HS256 token and return its claims
pub fn decode_token(token: &str, secret: &str) -> Option<Claims> {
    if secret.is_empty() {
        tracing::warn!("JWT secret is empty; refusing every bearer token");
        return None;
    }
    let key = DecodingKey::from_secret(secret.as_bytes());
    let mut validation = Validation::new(Algorithm::HS256);
    // Provider tokens carry an audience we do not pin
    validation.validate_aud = false;

    match decode::<Claims>(token, &key, &validation) {
        Ok(data) => Some(data.claims),
        Err(e) => {
            tracing::debug!(error = %e, "Rejected bearer token");
            None
        }
    }
}

/// Extract the bearer token from the Authorization header
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// The authenticated caller
#[derive(Debug, Clone)]
pub enum Principal {
    Coach(Coach),
    Member(Member),
}

impl Principal {
    pub fn id(&self) -> &str {
        match self {
            Principal::Coach(c) => &c.id,
            Principal::Member(m) => &m.id,
        }
    }

    pub fn role(&self) -> &'static str {
        match self {
            Principal::Coach(_) => "coach",
            Principal::Member(_) => "member",
        }
    }

    pub fn is_coach(&self) -> bool {
        matches!(self, Principal::Coach(_))
    }

    /// Coaches see every member; members only themselves
    pub fn can_access_member(&self, member_id: &str) -> bool {
        match self {
            Principal::Coach(_) => true,
            Principal::Member(m) => m.id == member_id,
        }
    }

    /// Fail with 403 unless the caller may see `member_id`'s records
    pub fn ensure_member_access(&self, member_id: &str) -> Result<(), ApiError> {
        if self.can_access_member(member_id) {
            Ok(())
        } else {
            Err(ApiError::forbidden("Access denied"))
        }
    }
}

/// Resolve a user id to a role by table membership
pub async fn resolve_principal(state: &AppState, user_id: &str) -> Result<Option<Principal>, ApiError> {
    if let Some(coach) = Coach::get_active(&state.db, user_id).await? {
        return Ok(Some(Principal::Coach(coach)));
    }
    if let Some(member) = Member::get_by_id(&state.db, user_id).await? {
        return Ok(Some(Principal::Member(member)));
    }
    Ok(None)
}

async fn demo_principal(state: &AppState, headers: &HeaderMap) -> Result<Principal, ApiError> {
    let demo = &state.config.demo;
    let as_member = headers
        .get(DEMO_ROLE_HEADER)
        .and_then(|h| h.to_str().ok())
        .is_some_and(|role| role.eq_ignore_ascii_case("member"));
    let id = if as_member { &demo.member_id } else { &demo.coach_id };

    resolve_principal(state, id)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for Principal {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let Some(token) = bearer_token(&parts.headers) else {
            if state.config.demo.enabled {
                return demo_principal(state, &parts.headers).await;
            }
            return Err(ApiError::unauthorized("Authentication required"));
        };

        let claims = decode_token(token, &state.config.auth.jwt_secret)
            .ok_or_else(|| ApiError::unauthorized("Invalid or expired token"))?;

        match resolve_principal(state, &claims.sub).await? {
            Some(principal) => Ok(principal),
            None => {
                tracing::warn!(user_id = %claims.sub, "Token subject is neither a coach nor a member");
                Err(ApiError::forbidden("Access denied"))
            }
        }
    }
}

/// Extractor that only admits active coaches
#[derive(Debug, Clone)]
pub struct CoachUser(pub Coach);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for CoachUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        match Principal::from_request_parts(parts, state).await? {
            Principal::Coach(coach) => Ok(CoachUser(coach)),
            Principal::Member(_) => Err(ApiError::forbidden("Access denied")),
        }
    }
}

/// Extractor that only admits members
#[derive(Debug, Clone)]
pub struct MemberUser(pub Member);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for MemberUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        match Principal::from_request_parts(parts, state).await? {
            Principal::Member(member) => Ok(MemberUser(member)),
            Principal::Coach(_) => Err(ApiError::forbidden("Access denied")),
        }
    }
}

/// Check the cron bearer secret in constant time.
///
/// No configured secret is a configuration error (503), never an open door.
pub fn verify_cron_secret(headers: &HeaderMap, configured: Option<&str>) -> Result<(), ApiError> {
    let Some(expected) = configured.filter(|s| !s.is_empty()) else {
        tracing::error!("Cron endpoint called but no cron secret is configured");
        return Err(ApiError::service_unavailable("Cron endpoint is not configured"));
    };

    let provided = bearer_token(headers).ok_or_else(|| ApiError::unauthorized("Unauthorized"))?;

    let expected = expected.as_bytes();
    let provided = provided.as_bytes();
    if expected.len() == provided.len() && bool::from(expected.ct_eq(provided)) {
        Ok(())
    } else {
        Err(ApiError::unauthorized("Unauthorized"))
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum WhoAmIResponse {
    Coach { profile: CoachResponse },
    Member { profile: Member },
}

/// Who the caller is, for clients deciding which portal to show
pub async fn whoami(principal: Principal) -> Json<WhoAmIResponse> {
    Json(match principal {
        Principal::Coach(coach) => WhoAmIResponse::Coach {
            profile: coach.into(),
        },
        Principal::Member(member) => WhoAmIResponse::Member { profile: member },
    })
}


#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn headers_with(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("Authorization", HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn test_decode_token_checks_signature_and_expiry() {
        let token = testing::token_for("user-1", "secret");
        assert_eq!(decode_token(&token, "secret").unwrap().sub, "user-1");
        assert!(decode_token(&token, "other").is_none());

        let expired = Claims {
            sub: "user-1".to_string(),
            exp: 1_000,
            email: None,
        };
        let expired = encode(&Header::default(), &expired, &EncodingKey::from_secret(b"secret")).unwrap();
        assert!(decode_token(&expired, "secret").is_none());
        assert!(decode_token("not-a-jwt", "secret").is_none());
    }

    #[test]
    fn test_empty_secret_accepts_nothing() {
        // A token anyone can forge with the empty key
        let forged = testing::token_for("coach-1", "");
        assert!(decode_token(&forged, "").is_none());
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token(&headers_with("Bearer abc")), Some("abc"));
        assert_eq!(bearer_token(&headers_with("Bearer ")), None);
        assert_eq!(bearer_token(&headers_with("Basic abc")), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }

    #[test]
    fn test_cron_secret() {
        use axum::http::StatusCode;

        let err = verify_cron_secret(&headers_with("Bearer s3cret"), None).unwrap_err();
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);

        let err = verify_cron_secret(&HeaderMap::new(), Some("s3cret")).unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);

        let err = verify_cron_secret(&headers_with("Bearer s3cre"), Some("s3cret")).unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);

        assert!(verify_cron_secret(&headers_with("Bearer s3cret"), Some("s3cret")).is_ok());
    }
}
