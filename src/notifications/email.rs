//! SMTP delivery through lettre.

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    Address, AsyncSmtpTransport, AsyncTransport, Message as EmailMessage, Tokio1Executor,
};

use super::{Message, NotificationSender, NotifyError, Recipient};
use crate::config::SmtpConfig;
use crate::db::NotificationChannel;

pub struct EmailSender {
    from: Mailbox,
    mailer: AsyncSmtpTransport<Tokio1Executor>,
}

impl EmailSender {
    pub fn new(config: SmtpConfig) -> anyhow::Result<Self> {
        let from = Mailbox::new(
            Some(config.from_name.clone()),
            config.from_address.parse::<Address>()?,
        );

        let mailer = if config.smtp_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_host)
        }
        .port(config.smtp_port);

        let mailer = if let (Some(username), Some(password)) =
            (&config.smtp_username, &config.smtp_password)
        {
            mailer.credentials(Credentials::new(username.clone(), password.clone()))
        } else {
            mailer
        };

        Ok(Self {
            from,
            mailer: mailer.build(),
        })
    }
}

/// Display names go through lettre's encoder, so commas and quotes in a
/// member's name are fine; only the address itself has to parse.
fn recipient_mailbox(recipient: &Recipient) -> Result<Mailbox, NotifyError> {
    let address = recipient
        .address
        .parse::<Address>()
        .map_err(|e| NotifyError::InvalidRecipient(format!("{}: {}", recipient.address, e)))?;
    let name = Some(recipient.name.clone()).filter(|n| !n.trim().is_empty());
    Ok(Mailbox::new(name, address))
}

#[async_trait]
impl NotificationSender for EmailSender {
    fn channel(&self) -> NotificationChannel {
        NotificationChannel::Email
    }

    async fn send(&self, recipient: &Recipient, message: &Message) -> Result<(), NotifyError> {
        let to = recipient_mailbox(recipient)?;

        let email = EmailMessage::builder()
            .from(self.from.clone())
            .to(to)
            .subject(&message.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(message.body.clone())
            .map_err(|e| NotifyError::InvalidRecipient(e.to_string()))?;

        self.mailer.send(email).await.map_err(|e| {
            if e.is_permanent() {
                NotifyError::Refused(e.to_string())
            } else {
                NotifyError::Transport(e.to_string())
            }
        })?;

        tracing::info!(to = %recipient.address, subject = %message.subject, "Email sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recipient(name: &str, address: &str) -> Recipient {
        Recipient {
            name: name.to_string(),
            address: address.to_string(),
        }
    }

    #[test]
    fn test_names_with_punctuation_are_deliverable() {
        for name in ["Reyes, Dana", "O'Neil; Sam", "Dana \"DJ\" Reyes", "Dana Reyes"] {
            let mailbox = recipient_mailbox(&recipient(name, "dana@example.com")).unwrap();
            assert_eq!(mailbox.name.as_deref(), Some(name));
            assert_eq!(mailbox.email.to_string(), "dana@example.com");

            let email = EmailMessage::builder()
                .from("Gym <gym@example.com>".parse().unwrap())
                .to(mailbox)
                .subject("Reminder")
                .body("See you tomorrow".to_string());
            assert!(email.is_ok(), "message for {:?} should build", name);
        }
    }

    #[test]
    fn test_bad_address_is_rejected() {
        let result = recipient_mailbox(&recipient("Dana", "not-an-address"));
        assert!(matches!(result, Err(NotifyError::InvalidRecipient(_))));
    }

    #[test]
    fn test_sender_name_with_comma() {
        let sender = EmailSender::new(SmtpConfig {
            smtp_host: "localhost".to_string(),
            smtp_port: 25,
            smtp_username: None,
            smtp_password: None,
            smtp_tls: false,
            from_address: "front-desk@example.com".to_string(),
            from_name: "Iron Temple, Downtown".to_string(),
        })
        .unwrap();
        assert_eq!(sender.from.name.as_deref(), Some("Iron Temple, Downtown"));
    }
}
