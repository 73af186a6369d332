//! Modem side of the relay.
//!
//! The relay consumes two capabilities from the modem: inbound messages
//! arriving as [`InboundSms`] values, and [`Modem::send`] for outbound text.
//! The shipped adapters drive an external gateway command for sending and
//! read inbound messages as JSON lines.

mod command;
mod lines;

pub use command::{CommandModem, DEFAULT_SEND_COMMAND};
pub use lines::{InboundLine, read_inbound_lines};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::Result;
use crate::relay::Fragment;

/// One SMS (or one part of a multipart SMS) as delivered by the modem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundSms {
    pub sender: String,
    pub timestamp: DateTime<Utc>,
    pub text: String,
    pub fragment: Option<Fragment>,
    /// Route the API delivery to this provider instead of the defaults.
    pub provider: Option<String>,
}

impl InboundSms {
    pub fn new(sender: impl Into<String>, timestamp: DateTime<Utc>, text: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            timestamp,
            text: text.into(),
            fragment: None,
            provider: None,
        }
    }

    pub fn with_fragment(mut self, fragment: Fragment) -> Self {
        self.fragment = Some(fragment);
        self
    }
}

/// Outbound half of the modem.
#[async_trait]
pub trait Modem: Send + Sync {
    /// Send `body` to `recipient`. Any error counts as a failed send.
    async fn send(&self, recipient: &str, body: &str) -> Result<()>;
}
