//! Delivery channels.
//!
//! This module provides the three outbound surfaces a message is relayed to:
//! - HTTP API providers
//! - SMS recipients through the modem
//! - Email (SMTP)

mod api;
mod email;
mod sms;

pub use api::ApiChannel;
pub use email::{
    EmailChannel, MailEnvelope, Mailer, NOTIFICATION_SUBJECT, SmtpMailer, SmtpSettings, parse_mailbox,
};
pub use sms::SmsChannel;

use async_trait::async_trait;

use super::task::{ChannelKind, DeliveryTask};
use crate::Result;

/// Capability a dispatcher drives: one send attempt plus its retry policy.
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    /// Which surface this is.
    fn kind(&self) -> ChannelKind;

    /// False when there are no recipients or providers to deliver to.
    fn is_configured(&self) -> bool;

    /// Number of failed attempts after which `task` is given up.
    fn max_retries(&self, task: &DeliveryTask) -> u32;

    /// Make one delivery attempt.
    ///
    /// `Error::Configuration` aborts the task; any other error is retried.
    async fn deliver(&self, task: &DeliveryTask) -> Result<()>;
}

#[async_trait]
impl<T: DeliveryChannel + ?Sized> DeliveryChannel for std::sync::Arc<T> {
    fn kind(&self) -> ChannelKind {
        (**self).kind()
    }

    fn is_configured(&self) -> bool {
        (**self).is_configured()
    }

    fn max_retries(&self, task: &DeliveryTask) -> u32 {
        (**self).max_retries(task)
    }

    async fn deliver(&self, task: &DeliveryTask) -> Result<()> {
        (**self).deliver(task).await
    }
}
