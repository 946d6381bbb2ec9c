//! Outbox delivery worker.
//!
//! Polls `notifications_log` for due `pending` rows and hands each to the
//! sender for its channel. A failed attempt is retried with exponential
//! backoff until `max_attempts`, after which the row is marked `failed`.
//! Permanent errors (bad address, channel not configured) fail at once.

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::config::NotificationsConfig;
use crate::db::{format_timestamp, NotificationLog};
use crate::notifications::{Message, NotificationSenders, NotifyError, Recipient};
use crate::utils::with_timeout;
use crate::DbPool;

const BASE_BACKOFF_SECS: u64 = 30;
const MAX_BACKOFF_SECS: u64 = 3600;

/// Delay before retry number `attempt` (1-based): 30s, 60s, 120s, ... capped at an hour
pub fn backoff(attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    let secs = BASE_BACKOFF_SECS.saturating_mul(1u64 << exponent);
    Duration::from_secs(secs.min(MAX_BACKOFF_SECS))
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainStats {
    pub sent: u32,
    pub retried: u32,
    pub failed: u32,
}

#[derive(Debug, Clone)]
pub struct OutboxSettings {
    pub poll_interval: Duration,
    pub batch_size: u32,
    pub max_attempts: u32,
    pub send_timeout: Duration,
}

impl From<&NotificationsConfig> for OutboxSettings {
    fn from(config: &NotificationsConfig) -> Self {
        Self {
            poll_interval: Duration::from_secs(config.poll_interval.max(1)),
            batch_size: config.batch_size.max(1),
            max_attempts: config.max_attempts.max(1),
            send_timeout: Duration::from_secs(config.send_timeout.max(1)),
        }
    }
}

pub struct OutboxWorker {
    db: DbPool,
    senders: Arc<NotificationSenders>,
    settings: OutboxSettings,
    wake: Arc<Notify>,
    shutdown: CancellationToken,
}

impl OutboxWorker {
    pub fn new(
        db: DbPool,
        senders: Arc<NotificationSenders>,
        settings: OutboxSettings,
        wake: Arc<Notify>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            db,
            senders,
            settings,
            wake,
            shutdown,
        }
    }

    /// Poll until shutdown. `wake` short-circuits the poll interval when
    /// a request has just queued something.
    pub async fn run(self) {
        tracing::info!(
            poll_secs = self.settings.poll_interval.as_secs(),
            batch_size = self.settings.batch_size,
            max_attempts = self.settings.max_attempts,
            "Notification outbox worker started"
        );

        loop {
            if let Err(e) = self.drain_once(Utc::now()).await {
                tracing::error!(error = %e, "Outbox drain failed");
            }

            tokio::select! {
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
                _ = self.wake.notified() => {}
                _ = self.shutdown.cancelled() => {
                    tracing::info!("Notification outbox worker received shutdown signal");
                    return;
                }
            }
        }
    }

    /// Deliver one batch of due rows
    pub async fn drain_once(&self, now: DateTime<Utc>) -> Result<DrainStats> {
        let mut stats = DrainStats::default();
        let due = NotificationLog::due(&self.db, &format_timestamp(now), self.settings.batch_size).await?;

        for row in due {
            match self.deliver(&row).await {
                Ok(()) => {
                    NotificationLog::mark_sent(&self.db, &row.id).await?;
                    stats.sent += 1;
                }
                Err(e) => {
                    let attempt = row.attempts as u32 + 1;
                    if e.is_permanent() || attempt >= self.settings.max_attempts {
                        tracing::warn!(
                            notification_id = %row.id,
                            channel = %row.channel,
                            attempt = attempt,
                            error = %e,
                            "Notification delivery failed permanently"
                        );
                        NotificationLog::mark_failed(&self.db, &row.id, &e.to_string()).await?;
                        stats.failed += 1;
                    } else {
                        let delay = backoff(attempt);
                        let next = now + chrono::Duration::seconds(delay.as_secs() as i64);
                        tracing::info!(
                            notification_id = %row.id,
                            channel = %row.channel,
                            attempt = attempt,
                            retry_in_secs = delay.as_secs(),
                            error = %e,
                            "Notification delivery failed, will retry"
                        );
                        NotificationLog::mark_retry(&self.db, &row.id, &e.to_string(), &format_timestamp(next))
                            .await?;
                        stats.retried += 1;
                    }
                }
            }
        }

        if stats != DrainStats::default() {
            tracing::debug!(
                sent = stats.sent,
                retried = stats.retried,
                failed = stats.failed,
                "Outbox batch processed"
            );
        }
        Ok(stats)
    }

    async fn deliver(&self, row: &NotificationLog) -> Result<(), NotifyError> {
        let channel = row
            .channel_enum()
            .ok_or_else(|| NotifyError::InvalidRecipient(format!("unknown channel {}", row.channel)))?;
        let sender = self
            .senders
            .get(channel)
            .ok_or(NotifyError::NotConfigured(channel))?;

        let recipient = Recipient {
            name: row.recipient_name.clone(),
            address: row.recipient.clone(),
        };
        let message = Message {
            subject: row.subject.clone(),
            body: row.content.clone(),
        };

        with_timeout(self.settings.send_timeout, sender.send(&recipient, &message)).await?
    }
}
