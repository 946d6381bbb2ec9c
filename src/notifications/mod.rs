//! Outbound member notifications.
//!
//! Messages are never sent inline by request handlers. They are queued in
//! `notifications_log` through [`queue_for_member`] and delivered by the
//! outbox worker through one [`NotificationSender`] per channel.

mod email;
pub mod templates;
mod whatsapp;

pub use email::EmailSender;
pub use templates::Message;
pub use whatsapp::WhatsAppSender;

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::NotificationsConfig;
use crate::db::{
    EnqueueOutcome, Member, NewNotification, NotificationChannel, NotificationKind, NotificationLog,
};
use crate::utils::TimedOut;
use crate::DbPool;

/// Who a message goes to. `address` is an email address or a phone number,
/// depending on the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    pub name: String,
    pub address: String,
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("{0} notifications are not configured")]
    NotConfigured(NotificationChannel),
    #[error("invalid recipient: {0}")]
    InvalidRecipient(String),
    #[error("provider rejected the message ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("message refused: {0}")]
    Refused(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error(transparent)]
    TimedOut(#[from] TimedOut),
}

impl NotifyError {
    /// Failures that will not go away on retry
    pub fn is_permanent(&self) -> bool {
        match self {
            Self::NotConfigured(_) | Self::InvalidRecipient(_) | Self::Refused(_) => true,
            Self::Rejected { status, .. } => (400..500).contains(status) && *status != 429,
            Self::Transport(_) | Self::TimedOut(_) => false,
        }
    }
}

/// A delivery channel (SMTP, WhatsApp API, or a test double)
#[async_trait]
pub trait NotificationSender: Send + Sync {
    fn channel(&self) -> NotificationChannel;

    async fn send(&self, recipient: &Recipient, message: &Message) -> Result<(), NotifyError>;
}

/// The configured senders, keyed by channel
#[derive(Clone, Default)]
pub struct NotificationSenders {
    senders: HashMap<NotificationChannel, Arc<dyn NotificationSender>>,
}

impl NotificationSenders {
    pub fn from_config(config: &NotificationsConfig) -> Result<Self> {
        let mut senders = Self::default();

        if let Some(smtp) = &config.email {
            senders = senders.with_sender(Arc::new(EmailSender::new(smtp.clone())?));
        }
        if let Some(whatsapp) = &config.whatsapp {
            senders = senders.with_sender(Arc::new(WhatsAppSender::new(whatsapp.clone())));
        }

        let channels = senders.channels();
        if channels.is_empty() {
            tracing::warn!("No notification channels configured; queued messages will fail");
        } else {
            tracing::info!(channels = ?channels, "Notification channels configured");
        }

        Ok(senders)
    }

    pub fn with_sender(mut self, sender: Arc<dyn NotificationSender>) -> Self {
        self.senders.insert(sender.channel(), sender);
        self
    }

    pub fn get(&self, channel: NotificationChannel) -> Option<Arc<dyn NotificationSender>> {
        self.senders.get(&channel).cloned()
    }

    pub fn channels(&self) -> Vec<NotificationChannel> {
        let mut channels: Vec<_> = self.senders.keys().copied().collect();
        channels.sort_by_key(|c| c.as_str());
        channels
    }
}

/// Per-call tally of [`queue_for_member`]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct QueueTally {
    pub queued: u32,
    /// Already queued under the same dedupe key
    pub duplicates: u32,
    /// Channel preferred but the member has no address for it
    pub skipped: u32,
}

/// Queue `message` on every channel the member prefers.
///
/// When `dedupe_key` is given, each channel's row is keyed
/// `<dedupe_key>:<channel>` so a repeat call is recorded as a duplicate.
pub async fn queue_for_member(
    db: &DbPool,
    member: &Member,
    kind: NotificationKind,
    message: &Message,
    dedupe_key: Option<&str>,
) -> Result<QueueTally, sqlx::Error> {
    let mut tally = QueueTally::default();

    for channel in member.channel_preference().channels() {
        let address = match channel {
            NotificationChannel::Email => Some(member.email.clone()),
            NotificationChannel::WhatsApp => member.phone.clone().filter(|p| !p.trim().is_empty()),
        };
        let Some(recipient) = address else {
            tracing::debug!(member_id = %member.id, channel = %channel, "No address for channel");
            tally.skipped += 1;
            continue;
        };

        let notification = NewNotification {
            member_id: Some(member.id.clone()),
            channel,
            kind,
            recipient_name: member.full_name.clone(),
            recipient,
            subject: message.subject.clone(),
            content: message.body.clone(),
            dedupe_key: dedupe_key.map(|key| format!("{}:{}", key, channel)),
        };

        match NotificationLog::enqueue(db, &notification).await? {
            EnqueueOutcome::Queued(id) => {
                tracing::debug!(notification_id = %id, kind = %kind, channel = %channel, "Notification queued");
                tally.queued += 1;
            }
            EnqueueOutcome::Duplicate => tally.duplicates += 1,
        }
    }

    Ok(tally)
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{test_pool, ChannelPreference, CreateMemberRequest};

    async fn member(db: &DbPool, channel: ChannelPreference, phone: Option<&str>) -> Member {
        Member::create(
            db,
            "m-1",
            &CreateMemberRequest {
                full_name: "Dana Reyes".to_string(),
                email: "dana@example.com".to_string(),
                phone: phone.map(str::to_string),
                preferred_language: "en".to_string(),
                preferred_channel: channel,
                coach_id: None,
                password: None,
            },
        )
        .await
        .unwrap()
    }

    fn message() -> Message {
        Message {
            subject: "Hello".to_string(),
            body: "Body".to_string(),
        }
    }

    #[tokio::test]
    async fn test_queue_for_member_fans_out_and_dedupes() {
        let db = test_pool().await;
        let member = member(&db, ChannelPreference::Both, Some("+15550100")).await;

        let first = queue_for_member(&db, &member, NotificationKind::Welcome, &message(), Some("welcome:m-1"))
            .await
            .unwrap();
        assert_eq!(first.queued, 2);

        let again = queue_for_member(&db, &member, NotificationKind::Welcome, &message(), Some("welcome:m-1"))
            .await
            .unwrap();
        assert_eq!(again.queued, 0);
        assert_eq!(again.duplicates, 2);
    }

    #[tokio::test]
    async fn test_queue_skips_channel_without_address() {
        let db = test_pool().await;
        let member = member(&db, ChannelPreference::Both, None).await;

        let tally = queue_for_member(&db, &member, NotificationKind::Welcome, &message(), None)
            .await
            .unwrap();
        assert_eq!(tally, QueueTally { queued: 1, duplicates: 0, skipped: 1 });
    }

    #[test]
    fn test_permanent_errors() {
        assert!(NotifyError::InvalidRecipient("x".into()).is_permanent());
        assert!(NotifyError::Rejected { status: 400, body: String::new() }.is_permanent());
        assert!(!NotifyError::Rejected { status: 429, body: String::new() }.is_permanent());
        assert!(!NotifyError::Rejected { status: 503, body: String::new() }.is_permanent());
        assert!(!NotifyError::Transport("reset".into()).is_permanent());
    }

    #[test]
    fn test_registry_keys_by_channel() {
        let senders = NotificationSenders::default()
            .with_sender(Arc::new(testing::RecordingSender::new(NotificationChannel::WhatsApp)))
            .with_sender(Arc::new(testing::RecordingSender::new(NotificationChannel::Email)));
        assert_eq!(
            senders.channels(),
            vec![NotificationChannel::Email, NotificationChannel::WhatsApp]
        );
        assert!(senders.get(NotificationChannel::Email).is_some());
    }
}
