use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use std::sync::{Arc, Mutex};
use tracing::info;

use crate::config::MailConfig;
use crate::error::MailError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError>;
}

/// The password reset message for `to`, linking to `reset_url`.
pub fn reset_email(to: &str, reset_url: &str) -> OutgoingMail {
    OutgoingMail {
        to: to.to_string(),
        subject: "Password Reset Request".to_string(),
        body: format!(
            "To reset your password, visit the following link:\n{}\n\n\
             If you did not make this request then simply ignore this email and no changes will be made.\n",
            reset_url
        ),
    }
}

/// Delivers through an SMTP relay with STARTTLS and credentials.
pub struct SmtpMailer {
    transport: SmtpTransport,
    sender: String,
}

impl SmtpMailer {
    pub fn new(config: &MailConfig) -> Result<Self, MailError> {
        let transport = SmtpTransport::starttls_relay(&config.host)
            .map_err(|e| MailError::Transport(format!("Failed to create SMTP transport: {}", e)))?
            .credentials(Credentials::new(config.username.clone(), config.password.clone()))
            .port(config.port)
            .build();

        Ok(Self {
            transport,
            sender: config.sender.clone(),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        let OutgoingMail { to, subject, body } = mail;
        let email = Message::builder()
            .from(self.sender.parse().map_err(|e| MailError::Address(format!("{}: {}", self.sender, e)))?)
            .to(to.parse().map_err(|e| MailError::Address(format!("{}: {}", to, e)))?)
            .subject(subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|e| MailError::Build(e.to_string()))?;

        let transport = self.transport.clone();
        tokio::task::spawn_blocking(move || transport.send(&email))
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?
            .map_err(|e| MailError::Transport(e.to_string()))?;

        info!("Sent '{}' to {}", subject, to);
        Ok(())
    }
}

/// Keeps sent mail in memory and logs it. Used when no SMTP relay is configured.
#[derive(Clone, Default)]
pub struct OutboxMailer {
    sent: Arc<Mutex<Vec<OutgoingMail>>>,
}

impl OutboxMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Mailer for OutboxMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        info!("Mail to {} ({}):\n{}", mail.to, mail.subject, mail.body);
        self.sent
            .lock()
            .map_err(|_| MailError::Transport("outbox lock poisoned".into()))?
            .push(mail);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_email_contains_link() {
        let mail = reset_email("alice@x.com", "http://localhost/reset_password/abc.def.ghi");
        assert_eq!(mail.to, "alice@x.com");
        assert_eq!(mail.subject, "Password Reset Request");
        assert!(mail.body.contains("\nhttp://localhost/reset_password/abc.def.ghi\n"));
        assert!(mail.body.contains("simply ignore this email"));
    }

    #[tokio::test]
    async fn test_outbox_records() {
        let outbox = OutboxMailer::new();
        outbox.send(reset_email("alice@x.com", "http://x/1")).await.unwrap();
        outbox.send(reset_email("bob@x.com", "http://x/2")).await.unwrap();

        let sent = outbox.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].to, "bob@x.com");
    }

    #[tokio::test]
    async fn test_smtp_rejects_bad_recipient_before_connecting() {
        let config = MailConfig {
            enabled: true,
            host: "localhost".into(),
            port: 2525,
            username: "user".into(),
            password: "pass".into(),
            sender: "noreply@demo.com".into(),
        };
        let mailer = SmtpMailer::new(&config).unwrap();
        let result = mailer.send(reset_email("not an address", "http://x/1")).await;
        assert!(matches!(result, Err(MailError::Address(_))));
    }
}
