//! Email channel using SMTP.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::debug;

use super::DeliveryChannel;
use crate::relay::task::{ChannelKind, DeliveryTask};
use crate::{Error, Result};

/// Subject used for outage notifications.
pub const NOTIFICATION_SUBJECT: &str = "System Notification";

/// A single plain-text message to one or more recipients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailEnvelope {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
}

/// Something that can deliver a [`MailEnvelope`].
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, envelope: MailEnvelope) -> Result<()>;
}

/// SMTP settings for [`SmtpMailer`].
#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub server: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub starttls: bool,
    pub timeout: Duration,
}

/// lettre-backed SMTP mailer.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(settings: &SmtpSettings) -> Result<Self> {
        let builder = if settings.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.server).map_err(|e| {
                Error::config(format!("Invalid SMTP server '{}': {}", settings.server, e))
            })?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&settings.server)
        };

        let mut builder = builder.port(settings.port).timeout(Some(settings.timeout));
        if let (Some(user), Some(password)) = (&settings.username, &settings.password) {
            builder = builder.credentials(Credentials::new(user.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
        })
    }
}

/// Parse an address such as `ops@example.com` or `Ops <ops@example.com>`.
pub fn parse_mailbox(address: &str) -> Result<Mailbox> {
    address
        .parse::<Mailbox>()
        .map_err(|e| Error::config(format!("Invalid email address '{}': {}", address, e)))
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, envelope: MailEnvelope) -> Result<()> {
        let mut builder = Message::builder()
            .from(parse_mailbox(&envelope.from)?)
            .subject(envelope.subject)
            .header(ContentType::TEXT_PLAIN);
        for to in &envelope.to {
            builder = builder.to(parse_mailbox(to)?);
        }

        let message = builder
            .body(envelope.body)
            .map_err(|e| Error::config(format!("Failed to build email: {}", e)))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| Error::transport(format!("SMTP send failed: {}", e)))?;
        Ok(())
    }
}

/// Sends every task as one email to all configured recipients.
pub struct EmailChannel {
    mailer: Option<Arc<dyn Mailer>>,
    from: String,
    recipients: Vec<String>,
    max_retries: u32,
}

impl EmailChannel {
    pub fn new(
        mailer: Arc<dyn Mailer>,
        from: impl Into<String>,
        recipients: Vec<String>,
        max_retries: u32,
    ) -> Self {
        Self {
            mailer: Some(mailer),
            from: from.into(),
            recipients,
            max_retries,
        }
    }

    /// Channel for a relay without an SMTP server. Skips every task.
    pub fn disabled() -> Self {
        Self {
            mailer: None,
            from: String::new(),
            recipients: Vec::new(),
            max_retries: 0,
        }
    }

    fn subject(task: &DeliveryTask) -> String {
        if task.is_notification() {
            NOTIFICATION_SUBJECT.to_string()
        } else {
            format!("SMS from {} at {}", task.sender, task.timestamp_display())
        }
    }

    pub fn envelope(&self, task: &DeliveryTask) -> MailEnvelope {
        MailEnvelope {
            from: self.from.clone(),
            to: self.recipients.clone(),
            subject: Self::subject(task),
            body: task.forward_body(),
        }
    }
}

#[async_trait]
impl DeliveryChannel for EmailChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Email
    }

    fn is_configured(&self) -> bool {
        self.mailer.is_some() && !self.recipients.is_empty()
    }

    fn max_retries(&self, _task: &DeliveryTask) -> u32 {
        self.max_retries
    }

    async fn deliver(&self, task: &DeliveryTask) -> Result<()> {
        let Some(mailer) = &self.mailer else {
            return Err(Error::config("No SMTP server configured"));
        };
        mailer.send(self.envelope(task)).await?;
        debug!("Email sent to {} recipient(s)", self.recipients.len());
        Ok(())
    }
}
