use async_trait::async_trait;
use lettre::message::{Mailbox, Mailboxes, Message, header::ContentType};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use skintrack_core::config::EmailConfig;
use skintrack_core::notify::error::NotifyError;
use skintrack_core::notify::port::Notifier;
use tracing::debug;

/// Prefix that lets mail filters pick out alert mails.
const SUBJECT_TAG: &str = "[skintrack]";

/// # Summary
/// Delivers price alerts as plain-text mail through an authenticated SMTP relay.
///
/// # Invariants
/// - Sender and every recipient were parsed when the notifier was built.
/// - One transport (and its connection pool) serves all alerts.
pub struct EmailNotifier {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    recipients: Vec<Mailbox>,
}

impl EmailNotifier {
    /// # Summary
    /// Builds the notifier from its configuration section.
    ///
    /// # Logic
    /// 1. Parses `from` and the comma separated `to` list; an empty list is rejected.
    /// 2. Opens a STARTTLS relay to `host`, on `port` when one is set.
    ///
    /// # Returns
    /// * `NotifyError::Config` for an unusable address or host.
    pub fn from_config(config: &EmailConfig) -> Result<Self, NotifyError> {
        let from: Mailbox = config
            .from
            .parse()
            .map_err(|e| NotifyError::Config(format!("Invalid sender '{}': {}", config.from, e)))?;
        let recipients: Mailboxes = config
            .to
            .parse()
            .map_err(|e| NotifyError::Config(format!("Invalid recipients '{}': {}", config.to, e)))?;
        let recipients: Vec<Mailbox> = recipients.into_iter().collect();
        if recipients.is_empty() {
            return Err(NotifyError::Config("At least one recipient is required".into()));
        }

        let mut relay = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| NotifyError::Config(format!("Invalid SMTP host '{}': {}", config.host, e)))?
            .credentials(Credentials::new(config.user.clone(), config.password.clone()));
        if let Some(port) = config.port {
            relay = relay.port(port);
        }

        Ok(Self {
            mailer: relay.build(),
            from,
            recipients,
        })
    }

    fn build_message(&self, subject: &str, content: &str) -> Result<Message, NotifyError> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(format!("{} {}", SUBJECT_TAG, subject))
            .header(ContentType::TEXT_PLAIN);
        for recipient in &self.recipients {
            builder = builder.to(recipient.clone());
        }
        builder
            .body(content.to_string())
            .map_err(|e| NotifyError::Platform(format!("Failed to build email: {}", e)))
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    fn name(&self) -> &str {
        "email"
    }

    async fn notify(&self, subject: &str, content: &str) -> Result<(), NotifyError> {
        let message = self.build_message(subject, content)?;
        self.mailer
            .send(message)
            .await
            .map_err(|e| NotifyError::Network(format!("SMTP delivery failed: {}", e)))?;

        debug!(recipients = self.recipients.len(), "Alert email sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(to: &str) -> EmailConfig {
        EmailConfig {
            host: "smtp.example.com".into(),
            port: Some(2525),
            user: "tracker@example.com".into(),
            password: "secret".into(),
            from: "skintrack <tracker@example.com>".into(),
            to: to.into(),
        }
    }

    #[tokio::test]
    async fn test_multiple_recipients_and_tagged_subject() {
        let notifier = EmailNotifier::from_config(&config("a@example.com, b@example.com")).unwrap();
        assert_eq!(notifier.recipients.len(), 2);

        let message = notifier.build_message("Price alert: AWP | Asiimov", "body").unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("Subject: [skintrack] Price alert: AWP | Asiimov"));
        assert!(raw.contains("b@example.com"));
    }

    #[tokio::test]
    async fn test_empty_recipient_list_is_rejected() {
        assert!(matches!(
            EmailNotifier::from_config(&config("")),
            Err(NotifyError::Config(_))
        ));
    }
}
