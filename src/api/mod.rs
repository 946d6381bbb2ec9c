pub mod auth;
mod bookings;
mod coaches;
mod cron;
pub mod error;
mod members;
mod memberships;
mod notifications;
mod packages;
pub mod rate_limit;
mod settings;
mod system;
pub mod validation;

use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let auth_limit = middleware::from_fn_with_state(state.clone(), rate_limit::rate_limit_auth);

    // Identity endpoints share the stricter auth tier
    let auth_routes = Router::new()
        .route("/me", get(auth::whoami))
        .layer(auth_limit.clone());

    let cron_routes = Router::new()
        .route("/reminders", post(cron::run_reminders))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_cron,
        ));

    let api_routes = Router::new()
        // Members
        .route(
            "/members",
            get(members::list_members).merge(post(members::create_member).layer(auth_limit)),
        )
        .route("/members/me", get(members::get_me).put(members::update_me))
        .route(
            "/members/:id",
            get(members::get_member).put(members::update_member),
        )
        .route("/members/:id/bookings", get(bookings::list_member_bookings))
        .route(
            "/members/:id/memberships",
            get(memberships::list_member_memberships),
        )
        .route("/members/:id/packages", get(packages::list_member_packages))
        // Coaches
        .route("/coaches", get(coaches::list_coaches))
        .route("/coaches/me", get(coaches::get_me).put(coaches::update_me))
        .route("/coaches/me/schedule", get(coaches::my_schedule))
        .route("/coaches/:id", get(coaches::get_coach))
        .route("/coaches/:id/slots", get(coaches::list_slots))
        .route(
            "/coaches/:id/availability",
            get(coaches::get_availability).put(coaches::set_availability),
        )
        // Bookings
        .route(
            "/bookings",
            get(bookings::list_bookings).post(bookings::book_session),
        )
        .route("/bookings/:id", get(bookings::get_booking))
        .route("/bookings/:id/status", put(bookings::update_booking_status))
        // Memberships
        .route("/memberships", post(memberships::purchase_membership))
        .route(
            "/memberships/:id/cancel",
            post(memberships::cancel_membership),
        )
        // PT packages
        .route(
            "/packages",
            get(packages::list_coach_packages).post(packages::create_package),
        )
        .route("/packages/:id/cancel", post(packages::cancel_package))
        // Gym configuration
        .route(
            "/settings",
            get(settings::get_settings).put(settings::update_settings),
        )
        .route(
            "/pricing",
            get(settings::list_pricing).put(settings::upsert_pricing),
        )
        .route("/pricing/:key", delete(settings::delete_pricing))
        .route(
            "/working-hours",
            get(settings::list_working_hours).put(settings::set_working_hours),
        )
        .route("/notifications", get(notifications::list_notifications))
        .route("/system/health", get(system::health_check))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_api,
        ));

    Router::new()
        .route("/health", get(system::health_check))
        .nest("/api/auth", auth_routes)
        .nest("/api/cron", cron_routes)
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::{test_pool, ChannelPreference, Coach, CreateMemberRequest, Member};
    use crate::identity::testing::FakeIdentityProvider;
    use crate::notifications::NotificationSenders;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::response::Response;
    use chrono::{Duration, Timelike, Utc};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    const SECRET: &str = "test-jwt-secret";
    const COACH_ID: &str = "coach-1";
    const MEMBER_ID: &str = "member-1";

    fn test_config() -> Config {
        let mut config = Config::default();
        config.auth.jwt_secret = SECRET.to_string();
        config
    }

    async fn test_state(config: Config) -> AppState {
        let db = test_pool().await;
        Coach::create(&db, COACH_ID, "Sam Okafor", "sam@example.com", Some("Strength"))
            .await
            .unwrap();
        Member::create(&db, MEMBER_ID, &member_request("dana@example.com"))
            .await
            .unwrap();
        AppState::new(config, db, Arc::new(NotificationSenders::default()))
    }

    fn member_request(email: &str) -> CreateMemberRequest {
        CreateMemberRequest {
            full_name: "Dana Reyes".to_string(),
            email: email.to_string(),
            phone: None,
            preferred_language: "en".to_string(),
            preferred_channel: ChannelPreference::Email,
            coach_id: Some(COACH_ID.to_string()),
            password: None,
        }
    }

    fn request(method: &str, uri: &str, as_user: Option<&str>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = as_user {
            builder = builder.header(
                "Authorization",
                format!("Bearer {}", auth::testing::token_for(user, SECRET)),
            );
        }
        match body {
            Some(body) => builder
                .header("Content-Type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn json_body(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_requests_without_token_are_rejected() {
        let app = create_router(Arc::new(test_state(test_config()).await));
        let response = app
            .oneshot(request("GET", "/api/bookings", None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "unauthorized");
    }

    #[tokio::test]
    async fn test_members_cannot_use_coach_endpoints() {
        let app = create_router(Arc::new(test_state(test_config()).await));
        let response = app
            .oneshot(request("GET", "/api/members", Some(MEMBER_ID), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_cron_requires_configured_secret() {
        let app = create_router(Arc::new(test_state(test_config()).await));
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/cron/reminders")
                    .header("Authorization", "Bearer anything")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_cron_checks_token_and_runs_job() {
        let mut config = test_config();
        config.auth.cron_secret = Some("cron-secret".to_string());
        let app = create_router(Arc::new(test_state(config).await));

        let cron_request = |token: &str| {
            Request::builder()
                .method("POST")
                .uri("/api/cron/reminders")
                .header("Authorization", format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap()
        };

        let response = app.clone().oneshot(cron_request("wrong")).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app.oneshot(cron_request("cron-secret")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let summary = json_body(response).await;
        assert!(summary["date"].is_string());
        assert_eq!(summary["sessions"]["sent"], 0);
    }

    #[tokio::test]
    async fn test_double_booking_is_rejected() {
        let app = create_router(Arc::new(test_state(test_config()).await));
        let start = (Utc::now() + Duration::days(1))
            .with_hour(10)
            .and_then(|t| t.with_minute(0))
            .and_then(|t| t.with_second(0))
            .and_then(|t| t.with_nanosecond(0))
            .unwrap();
        let body = json!({
            "member_id": MEMBER_ID,
            "scheduled_at": start.to_rfc3339(),
            "duration_minutes": 60,
        });

        let response = app
            .clone()
            .oneshot(request("POST", "/api/bookings", Some(COACH_ID), Some(body)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let booking = json_body(response).await;
        assert_eq!(booking["status"], "scheduled");
        assert_eq!(booking["coach_id"], COACH_ID);

        // Overlaps the first session by half an hour
        let overlapping = json!({
            "member_id": MEMBER_ID,
            "scheduled_at": (start + Duration::minutes(30)).to_rfc3339(),
            "duration_minutes": 60,
        });
        let response = app
            .clone()
            .oneshot(request("POST", "/api/bookings", Some(MEMBER_ID), Some(overlapping)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        // Back-to-back is fine
        let adjacent = json!({
            "member_id": MEMBER_ID,
            "scheduled_at": (start + Duration::minutes(60)).to_rfc3339(),
        });
        let response = app
            .oneshot(request("POST", "/api/bookings", Some(MEMBER_ID), Some(adjacent)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_member_registration_creates_identity_and_row() {
        let identity = Arc::new(FakeIdentityProvider::default());
        let state = test_state(test_config()).await.with_identity(identity.clone());
        let app = create_router(Arc::new(state));

        let body = json!({ "full_name": "Omar Haddad", "email": "Omar@Example.com" });
        let response = app
            .oneshot(request("POST", "/api/members", Some(COACH_ID), Some(body)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let member = json_body(response).await;
        assert_eq!(member["email"], "omar@example.com");
        assert_eq!(member["coach_id"], COACH_ID);
        assert_eq!(identity.user_count(), 1);
    }

    #[tokio::test]
    async fn test_member_registration_removes_identity_when_insert_fails() {
        let identity = Arc::new(FakeIdentityProvider::default());
        let state = test_state(test_config()).await.with_identity(identity.clone());
        let app = create_router(Arc::new(state));

        // The identity provider accepts the email but the members table already has it
        let body = json!({ "full_name": "Dana Again", "email": "dana@example.com" });
        let response = app
            .oneshot(request("POST", "/api/members", Some(COACH_ID), Some(body)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(identity.user_count(), 0);
        assert_eq!(identity.deleted.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_member_registration_unavailable_without_provider() {
        let app = create_router(Arc::new(test_state(test_config()).await));
        let body = json!({ "full_name": "Omar Haddad", "email": "omar@example.com" });
        let response = app
            .oneshot(request("POST", "/api/members", Some(COACH_ID), Some(body)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_demo_mode_resolves_demo_identity() {
        let mut config = test_config();
        config.demo.enabled = true;
        config.demo.coach_id = COACH_ID.to_string();
        config.demo.member_id = MEMBER_ID.to_string();
        let app = create_router(Arc::new(test_state(config).await));

        let response = app
            .clone()
            .oneshot(request("GET", "/api/auth/me", None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["role"], "coach");

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/auth/me")
                    .header(auth::DEMO_ROLE_HEADER, "member")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["role"], "member");
    }

    #[tokio::test]
    async fn test_auth_tier_limit_returns_429_with_headers() {
        let mut config = test_config();
        config.rate_limit.auth_requests_per_window = 1;
        let app = create_router(Arc::new(test_state(config).await));

        let response = app
            .clone()
            .oneshot(request("GET", "/api/auth/me", Some(COACH_ID), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["X-RateLimit-Remaining"], "0");

        let response = app
            .oneshot(request("GET", "/api/auth/me", Some(COACH_ID), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().contains_key("Retry-After"));
        assert_eq!(response.headers()["X-RateLimit-Limit"], "1");
    }

    #[tokio::test]
    async fn test_health_reports_database() {
        let app = create_router(Arc::new(test_state(test_config()).await));
        let response = app
            .oneshot(request("GET", "/health", None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["database_healthy"], true);
    }
}
