pub mod api;
pub mod config;
pub mod db;
pub mod engine;
pub mod identity;
pub mod notifications;
pub mod startup;
pub mod utils;

pub use db::DbPool;

use config::Config;
use std::sync::Arc;
use tokio::sync::Notify;

use crate::api::rate_limit::RateLimiter;
use crate::identity::IdentityProvider;
use crate::notifications::NotificationSenders;

pub struct AppState {
    pub config: Config,
    pub db: DbPool,
    pub rate_limiter: Arc<RateLimiter>,
    pub notifiers: Arc<NotificationSenders>,
    /// Admin API of the identity provider; member registration needs it
    pub identity: Option<Arc<dyn IdentityProvider>>,
    /// Wakes the outbox worker after a request queues a message
    pub outbox_wake: Arc<Notify>,
}

impl AppState {
    pub fn new(config: Config, db: DbPool, notifiers: Arc<NotificationSenders>) -> Self {
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));
        Self {
            config,
            db,
            rate_limiter,
            notifiers,
            identity: None,
            outbox_wake: Arc::new(Notify::new()),
        }
    }

    pub fn with_identity(mut self, identity: Arc<dyn IdentityProvider>) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Let the outbox worker deliver freshly queued rows without waiting a poll
    pub fn wake_outbox(&self) {
        self.outbox_wake.notify_one();
    }
}
