//! WhatsApp Cloud API delivery.

use async_trait::async_trait;
use serde_json::json;

use super::{Message, NotificationSender, NotifyError, Recipient};
use crate::config::WhatsAppConfig;
use crate::db::NotificationChannel;

pub struct WhatsAppSender {
    config: WhatsAppConfig,
    http_client: reqwest::Client,
}

impl WhatsAppSender {
    pub fn new(config: WhatsAppConfig) -> Self {
        Self {
            config,
            http_client: reqwest::Client::new(),
        }
    }
}

/// Digits of a phone number in international form, without the leading `+`
pub fn normalize_phone(phone: &str) -> Option<String> {
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    (8..=15).contains(&digits.len()).then_some(digits)
}

#[async_trait]
impl NotificationSender for WhatsAppSender {
    fn channel(&self) -> NotificationChannel {
        NotificationChannel::WhatsApp
    }

    async fn send(&self, recipient: &Recipient, message: &Message) -> Result<(), NotifyError> {
        let to = normalize_phone(&recipient.address)
            .ok_or_else(|| NotifyError::InvalidRecipient(recipient.address.clone()))?;

        let payload = json!({
            "messaging_product": "whatsapp",
            "to": to,
            "type": "text",
            "text": {
                "preview_url": false,
                "body": format!("*{}*\n{}", message.subject, message.body),
            }
        });

        let response = self
            .http_client
            .post(&self.config.api_url)
            .bearer_auth(&self.config.access_token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        tracing::info!(to = %to, "WhatsApp message sent");
        Ok(())
    }
}
