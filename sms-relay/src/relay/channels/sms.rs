//! SMS channel: forwards messages to fixed recipients through the modem.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::DeliveryChannel;
use crate::modem::Modem;
use crate::relay::task::{ChannelKind, DeliveryTask};
use crate::{Error, Result};

pub struct SmsChannel {
    modem: Arc<dyn Modem>,
    recipients: Vec<String>,
    max_retries: u32,
}

impl SmsChannel {
    pub fn new(modem: Arc<dyn Modem>, recipients: Vec<String>, max_retries: u32) -> Self {
        Self {
            modem,
            recipients,
            max_retries,
        }
    }
}

#[async_trait]
impl DeliveryChannel for SmsChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Sms
    }

    fn is_configured(&self) -> bool {
        !self.recipients.is_empty()
    }

    fn max_retries(&self, _task: &DeliveryTask) -> u32 {
        self.max_retries
    }

    /// Succeeds when at least one recipient accepted the message.
    async fn deliver(&self, task: &DeliveryTask) -> Result<()> {
        let body = task.forward_body();
        let mut sent = 0usize;
        let mut last_error = None;

        for recipient in &self.recipients {
            match self.modem.send(recipient, &body).await {
                Ok(()) => {
                    debug!("Forwarded SMS to {}", recipient);
                    sent += 1;
                }
                Err(e) => {
                    warn!("Failed to forward SMS to {}: {}", recipient, e);
                    last_error = Some(e);
                }
            }
        }

        if sent > 0 {
            return Ok(());
        }
        Err(match last_error {
            Some(Error::Configuration(msg)) => Error::Configuration(msg),
            Some(e) => Error::transport(format!("SMS delivery failed for all recipients: {}", e)),
            None => Error::transport("No SMS recipients configured"),
        })
    }
}
