//! Fixed-window rate limiting.
//!
//! Each identifier gets a counter that resets `window` after its first
//! request. The limiter is owned by `AppState` and its expired entries are
//! swept by a background task tied to the shutdown token.

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use super::error::ApiError;
use crate::config::RateLimitConfig;
use crate::AppState;

/// Rate limit tier for different endpoint types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitTier {
    /// General API endpoints (100 req/min default)
    Api,
    /// Endpoints that talk to the identity provider (20 req/min default)
    Auth,
    /// Cron triggers (5 req/min default)
    Cron,
}

impl RateLimitTier {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::Auth => "auth",
            Self::Cron => "cron",
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct WindowEntry {
    count: u32,
    reset: Instant,
}

/// Outcome of one [`RateLimiter::check`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitResult {
    pub success: bool,
    pub remaining: u32,
    /// When the current window ends
    pub reset: Instant,
}

impl RateLimitResult {
    /// Whole seconds until the window resets, at least 1
    pub fn reset_after(&self, now: Instant) -> u64 {
        let left = self.reset.saturating_duration_since(now);
        (left.as_secs() + u64::from(left.subsec_nanos() > 0)).max(1)
    }
}

#[derive(Debug)]
pub struct RateLimiter {
    entries: DashMap<String, WindowEntry>,
    config: RateLimitConfig,
    window: Duration,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            entries: DashMap::new(),
            window: Duration::from_secs(config.window_seconds.max(1)),
            config,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn limit_for(&self, tier: RateLimitTier) -> u32 {
        match tier {
            RateLimitTier::Api => self.config.api_requests_per_window,
            RateLimitTier::Auth => self.config.auth_requests_per_window,
            RateLimitTier::Cron => self.config.cron_requests_per_window,
        }
    }

    /// Count one request for `identifier` against `limit` per `window`
    pub fn check(&self, identifier: &str, limit: u32, window: Duration) -> RateLimitResult {
        self.check_at(identifier, limit, window, Instant::now())
    }

    pub fn check_at(
        &self,
        identifier: &str,
        limit: u32,
        window: Duration,
        now: Instant,
    ) -> RateLimitResult {
        let mut entry = self
            .entries
            .entry(identifier.to_string())
            .or_insert_with(|| WindowEntry {
                count: 0,
                reset: now,
            });

        // A fresh entry starts out expired so it takes the same path as a lapsed window
        if entry.count == 0 || now > entry.reset {
            entry.count = 1;
            entry.reset = now + window;
            return RateLimitResult {
                success: true,
                remaining: limit.saturating_sub(1),
                reset: entry.reset,
            };
        }

        if entry.count >= limit {
            return RateLimitResult {
                success: false,
                remaining: 0,
                reset: entry.reset,
            };
        }

        entry.count += 1;
        RateLimitResult {
            success: true,
            remaining: limit - entry.count,
            reset: entry.reset,
        }
    }

    /// Drop entries whose window has ended
    pub fn cleanup_expired(&self) {
        self.cleanup_expired_at(Instant::now());
    }

    fn cleanup_expired_at(&self, now: Instant) {
        self.entries.retain(|_, entry| now <= entry.reset);
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }
}

/// Extract client IP from proxy headers, falling back to loopback
fn extract_client_ip(headers: &HeaderMap) -> IpAddr {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|ip| ip.trim().parse().ok());
    if let Some(ip) = forwarded {
        return ip;
    }

    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .and_then(|ip| ip.trim().parse().ok())
        .unwrap_or(IpAddr::from([127, 0, 0, 1]))
}

pub async fn rate_limit_api(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    rate_limit_with_tier(&state, request, next, RateLimitTier::Api).await
}

pub async fn rate_limit_auth(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    rate_limit_with_tier(&state, request, next, RateLimitTier::Auth).await
}

pub async fn rate_limit_cron(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    rate_limit_with_tier(&state, request, next, RateLimitTier::Cron).await
}

async fn rate_limit_with_tier(
    state: &AppState,
    request: Request<Body>,
    next: Next,
    tier: RateLimitTier,
) -> Response {
    let limiter = &state.rate_limiter;
    if !limiter.is_enabled() {
        return next.run(request).await;
    }

    let ip = extract_client_ip(request.headers());
    let limit = limiter.limit_for(tier);
    let now = Instant::now();
    let result = limiter.check_at(&format!("{}:{}", tier.as_str(), ip), limit, limiter.window(), now);
    let reset_after = result.reset_after(now);

    let mut response = if result.success {
        next.run(request).await
    } else {
        tracing::warn!(ip = %ip, tier = tier.as_str(), "Rate limit exceeded");
        let mut response = ApiError::rate_limited(format!(
            "Rate limit exceeded. Try again in {} seconds.",
            reset_after
        ))
        .into_response();
        response
            .headers_mut()
            .insert("Retry-After", HeaderValue::from(reset_after));
        response
    };

    let headers = response.headers_mut();
    headers.insert("X-RateLimit-Limit", HeaderValue::from(limit));
    headers.insert("X-RateLimit-Remaining", HeaderValue::from(result.remaining));
    headers.insert("X-RateLimit-Reset", HeaderValue::from(reset_after));
    response
}

/// Periodically sweep expired entries until `shutdown` is cancelled
pub fn spawn_cleanup_task(
    rate_limiter: Arc<RateLimiter>,
    cleanup_interval_secs: u64,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let interval = Duration::from_secs(cleanup_interval_secs.max(1));
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    rate_limiter.cleanup_expired();
                    tracing::debug!(
                        entries = rate_limiter.entry_count(),
                        "Rate limiter cleanup complete"
                    );
                }
                _ = shutdown.cancelled() => {
                    tracing::debug!("Rate limiter cleanup task stopped");
                    return;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(60);

    fn limiter() -> RateLimiter {
        RateLimiter::new(RateLimitConfig::default())
    }

    #[test]
    fn test_limit_of_three() {
        let limiter = limiter();
        let now = Instant::now();

        let remaining: Vec<_> = (0..3)
            .map(|_| limiter.check_at("ip:1", 3, WINDOW, now))
            .inspect(|r| assert!(r.success))
            .map(|r| r.remaining)
            .collect();
        assert_eq!(remaining, vec![2, 1, 0]);

        let blocked = limiter.check_at("ip:1", 3, WINDOW, now);
        assert!(!blocked.success);
        assert_eq!(blocked.remaining, 0);
        assert_eq!(blocked.reset, now + WINDOW);
    }

    #[test]
    fn test_limit_of_zero_allows_only_first_request() {
        let limiter = limiter();
        let now = Instant::now();

        let first = limiter.check_at("ip:1", 0, WINDOW, now);
        assert!(first.success);
        assert_eq!(first.remaining, 0);
        assert!(!limiter.check_at("ip:1", 0, WINDOW, now).success);
    }

    #[test]
    fn test_window_expiry_starts_new_window() {
        let limiter = limiter();
        let now = Instant::now();
        limiter.check_at("ip:1", 1, WINDOW, now);
        assert!(!limiter.check_at("ip:1", 1, WINDOW, now + WINDOW).success);

        let later = now + WINDOW + Duration::from_millis(1);
        let fresh = limiter.check_at("ip:1", 1, WINDOW, later);
        assert!(fresh.success);
        assert_eq!(fresh.reset, later + WINDOW);
    }

    #[test]
    fn test_identifiers_are_isolated() {
        let limiter = limiter();
        let now = Instant::now();
        limiter.check_at("ip:1", 1, WINDOW, now);
        assert!(!limiter.check_at("ip:1", 1, WINDOW, now).success);
        assert!(limiter.check_at("ip:2", 1, WINDOW, now).success);
    }

    #[test]
    fn test_cleanup_drops_only_expired_entries() {
        let limiter = limiter();
        let now = Instant::now();
        limiter.check_at("old", 5, Duration::from_secs(1), now);
        limiter.check_at("new", 5, WINDOW, now);

        limiter.cleanup_expired_at(now + Duration::from_secs(2));
        assert_eq!(limiter.entry_count(), 1);
        assert!(limiter.entries.contains_key("new"));
    }

    #[test]
    fn test_reset_after_rounds_up() {
        let now = Instant::now();
        let result = RateLimitResult {
            success: true,
            remaining: 0,
            reset: now + Duration::from_millis(1500),
        };
        assert_eq!(result.reset_after(now), 2);
        assert_eq!(result.reset_after(now + Duration::from_secs(5)), 1);
    }

    #[test]
    fn test_client_ip_from_headers() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_client_ip(&headers), IpAddr::from([127, 0, 0, 1]));

        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.9"));
        assert_eq!(extract_client_ip(&headers), IpAddr::from([10, 0, 0, 9]));

        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        assert_eq!(extract_client_ip(&headers), IpAddr::from([203, 0, 113, 7]));
    }

    #[tokio::test]
    async fn test_cleanup_task_stops_on_shutdown() {
        let shutdown = CancellationToken::new();
        let handle = spawn_cleanup_task(Arc::new(limiter()), 3600, shutdown.clone());
        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
