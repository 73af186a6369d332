//! Message database model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::relay::ChannelKind;

/// One logical inbound message and its per-channel delivery flags.
///
/// For multipart messages `message_text` holds a best-effort preview until
/// every part has arrived, then the authoritative reassembled text.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct MessageDbModel {
    pub id: i64,
    pub sender: String,
    /// RFC 3339 timestamp reported by the modem
    pub timestamp: String,
    pub reference: Option<i64>,
    pub total_parts: Option<i64>,
    pub message_text: String,
    pub api_forwarded: bool,
    pub sms_forwarded: bool,
    pub email_forwarded: bool,
    pub created_at: String,
}

impl MessageDbModel {
    /// Whether the given channel has delivered this message.
    pub fn is_forwarded(&self, channel: ChannelKind) -> bool {
        match channel {
            ChannelKind::Api => self.api_forwarded,
            ChannelKind::Sms => self.sms_forwarded,
            ChannelKind::Email => self.email_forwarded,
        }
    }

    /// Whether every channel has delivered this message.
    pub fn is_fully_forwarded(&self) -> bool {
        ChannelKind::ALL.iter().all(|c| self.is_forwarded(*c))
    }
}
