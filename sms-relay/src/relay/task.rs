//! Delivery task and channel identity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sender name used for synthesized outage notifications.
pub const NOTIFICATION_SENDER: &str = "sms-relay";

/// One of the three outbound delivery surfaces.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(ascii_case_insensitive)]
pub enum ChannelKind {
    #[strum(serialize = "API")]
    Api,
    #[strum(serialize = "SMS")]
    Sms,
    #[strum(serialize = "Email")]
    Email,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 3] = [Self::Api, Self::Sms, Self::Email];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Api => "API",
            Self::Sms => "SMS",
            Self::Email => "Email",
        }
    }
}

/// A unit of work for one channel's dispatcher.
///
/// A task lives in exactly one queue or one worker at a time. Tasks without
/// a `message_id` are synthesized notifications and never touch the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryTask {
    pub sender: String,
    pub timestamp: DateTime<Utc>,
    pub text: String,
    pub message_id: Option<i64>,
    pub retry_count: u32,
    /// API provider name to target instead of the default providers.
    pub provider: Option<String>,
}

impl DeliveryTask {
    /// Fresh task for a persisted, fully assembled message.
    pub fn for_message(
        sender: impl Into<String>,
        timestamp: DateTime<Utc>,
        text: impl Into<String>,
        message_id: i64,
    ) -> Self {
        Self {
            sender: sender.into(),
            timestamp,
            text: text.into(),
            message_id: Some(message_id),
            retry_count: 0,
            provider: None,
        }
    }

    /// Outage notification task.
    pub fn notification(text: impl Into<String>) -> Self {
        Self {
            sender: NOTIFICATION_SENDER.to_string(),
            timestamp: Utc::now(),
            text: text.into(),
            message_id: None,
            retry_count: 0,
            provider: None,
        }
    }

    pub fn with_provider(mut self, provider: Option<String>) -> Self {
        self.provider = provider;
        self
    }

    pub fn is_notification(&self) -> bool {
        self.message_id.is_none()
    }

    /// Timestamp as shown in forwarded bodies and templates.
    pub fn timestamp_display(&self) -> String {
        self.timestamp.format("%Y-%m-%d %H:%M:%S%:z").to_string()
    }

    /// Plain-text body shared by the SMS and email channels.
    pub fn forward_body(&self) -> String {
        format!(
            "From: {}\nTime: {}\nMessage: {}",
            self.sender,
            self.timestamp_display(),
            self.text
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::str::FromStr;

    #[test]
    fn test_channel_kind_names() {
        assert_eq!(ChannelKind::Api.to_string(), "API");
        assert_eq!(ChannelKind::Sms.to_string(), "SMS");
        assert_eq!(ChannelKind::Email.to_string(), "Email");
        assert_eq!(ChannelKind::from_str("email").unwrap(), ChannelKind::Email);
        assert_eq!(ChannelKind::Sms.as_str(), ChannelKind::Sms.to_string());
    }

    #[test]
    fn test_forward_body() {
        let ts = Utc.with_ymd_and_hms(2025, 3, 1, 10, 30, 0).unwrap();
        let task = DeliveryTask::for_message("+111", ts, "hello", 1);
        assert_eq!(
            task.forward_body(),
            "From: +111\nTime: 2025-03-01 10:30:00+00:00\nMessage: hello"
        );
        assert!(!task.is_notification());
    }

    #[test]
    fn test_notification_task() {
        let task = DeliveryTask::notification("SMS down");
        assert!(task.is_notification());
        assert_eq!(task.retry_count, 0);
        assert_eq!(task.sender, NOTIFICATION_SENDER);
        assert!(task.provider.is_none());
    }
}
