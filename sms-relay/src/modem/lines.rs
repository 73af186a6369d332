//! Inbound messages as JSON lines.
//!
//! One object per line:
//! `{"sender": "+111", "text": "hi", "timestamp": "...", "reference": 7,
//! "part_index": 1, "total_parts": 2, "provider": "hook"}`. Only `sender`
//! and `text` are required. Malformed lines are logged and skipped.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::InboundSms;
use crate::relay::{Fragment, IntakeHandle};
use crate::{Error, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct InboundLine {
    pub sender: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    pub text: String,
    #[serde(default)]
    pub reference: Option<u16>,
    #[serde(default)]
    pub part_index: Option<u8>,
    #[serde(default)]
    pub total_parts: Option<u8>,
    #[serde(default)]
    pub provider: Option<String>,
}

impl InboundLine {
    /// Convert into an inbound SMS, stamping `now` when no timestamp was sent.
    ///
    /// Fragment fields must be given all together or not at all.
    pub fn into_inbound(self, now: DateTime<Utc>) -> Result<InboundSms> {
        let fragment = match (self.reference, self.part_index, self.total_parts) {
            (None, None, None) => None,
            (Some(reference), Some(part_index), Some(total_parts)) => Some(Fragment {
                reference,
                part_index,
                total_parts,
            }),
            _ => {
                return Err(Error::validation(format!(
                    "incomplete fragment info from {}: reference, part_index and total_parts are required together",
                    self.sender
                )));
            }
        };

        Ok(InboundSms {
            sender: self.sender,
            timestamp: self.timestamp.unwrap_or(now),
            text: self.text,
            fragment,
            provider: self.provider.filter(|p| !p.is_empty()),
        })
    }
}

/// Feed every line of `reader` into the intake until EOF or cancellation.
///
/// Returns the number of messages handed over.
pub async fn read_inbound_lines<R>(
    reader: R,
    intake: &IntakeHandle,
    cancel: CancellationToken,
) -> Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let mut accepted = 0;

    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            info!("Inbound stream closed");
            break;
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let parsed = serde_json::from_str::<InboundLine>(line)
            .map_err(Error::from)
            .and_then(|l| l.into_inbound(Utc::now()));
        match parsed {
            Ok(sms) => {
                debug!("Inbound SMS from {}", sms.sender);
                if !intake.on_message(sms) {
                    warn!("Intake closed, stopping inbound reader");
                    break;
                }
                accepted += 1;
            }
            Err(e) => warn!("Skipping malformed inbound line: {}", e),
        }
    }

    Ok(accepted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn parse(line: &str) -> Result<InboundSms> {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        serde_json::from_str::<InboundLine>(line)?.into_inbound(now)
    }

    #[test]
    fn test_plain_line_uses_now() {
        let sms = parse(r#"{"sender": "+111", "text": "hello"}"#).unwrap();
        assert_eq!(sms.sender, "+111");
        assert_eq!(sms.text, "hello");
        assert!(sms.fragment.is_none());
        assert_eq!(sms.timestamp, Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_fragment_line() {
        let sms = parse(
            r#"{"sender": "+111", "text": "world", "timestamp": "2025-03-02T08:00:00Z",
                "reference": 7, "part_index": 2, "total_parts": 2, "provider": "hook"}"#,
        )
        .unwrap();
        assert_eq!(
            sms.fragment,
            Some(Fragment {
                reference: 7,
                part_index: 2,
                total_parts: 2
            })
        );
        assert_eq!(sms.provider.as_deref(), Some("hook"));
        assert_eq!(sms.timestamp, Utc.with_ymd_and_hms(2025, 3, 2, 8, 0, 0).unwrap());
    }

    #[test]
    fn test_partial_fragment_info_is_rejected() {
        let err = parse(r#"{"sender": "+111", "text": "x", "reference": 7}"#).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_reader_skips_bad_lines() {
        let (intake, mut rx) = IntakeHandle::channel();
        let input = b"{\"sender\": \"+1\", \"text\": \"a\"}\nnot json\n\n{\"sender\": \"+2\", \"text\": \"b\"}\n";

        let n = read_inbound_lines(&input[..], &intake, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(n, 2);
        assert_eq!(rx.recv().await.unwrap().sender, "+1");
        assert_eq!(rx.recv().await.unwrap().sender, "+2");
    }
}
