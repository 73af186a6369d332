//! Multipart SMS reassembly.
//!
//! Fragments are buffered per `(sender, reference)` until every part is
//! present. The buffer map is owned by the single intake task, so no locking
//! is needed here.
//!
//! After every fragment a human-readable preview of the growing text is
//! persisted so that a crash mid-assembly still leaves an auditable row. The
//! preview is built by appending parts with an index above 1 and prepending
//! part 1, which is *not* an ordering algorithm: parts arriving as 3, 2, 1
//! produce a preview of `1 3 2`. Only the text returned on completion,
//! sorted by part index, is authoritative. The preview is never read back to
//! resume an assembly after a restart; buffered parts are lost with the
//! process.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::database::repositories::{MessageRepository, NewMessage};
use crate::{Error, Result};

/// Concatenation info carried by one part of a multipart SMS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    pub reference: u16,
    /// 1-based index of this part.
    pub part_index: u8,
    pub total_parts: u8,
}

/// Result of feeding one inbound SMS into the reassembler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestOutcome {
    pub message_id: i64,
    /// Timestamp of the logical message (first-seen fragment for multipart).
    pub timestamp: DateTime<Utc>,
    /// Authoritative text once the message is complete.
    pub complete_text: Option<String>,
}

impl IngestOutcome {
    pub fn is_complete(&self) -> bool {
        self.complete_text.is_some()
    }
}

#[derive(Debug)]
struct PartialAssembly {
    message_id: i64,
    total_parts: u8,
    timestamp: DateTime<Utc>,
    first_seen: Instant,
    parts: BTreeMap<u8, String>,
    preview: String,
}

impl PartialAssembly {
    fn apply_preview(&mut self, part_index: u8, text: &str) {
        if part_index > 1 {
            self.preview.push_str(text);
        } else {
            self.preview.insert_str(0, text);
        }
    }

    fn is_complete(&self) -> bool {
        self.parts.len() == self.total_parts as usize
    }

    fn assemble(&self) -> String {
        self.parts.values().map(String::as_str).collect()
    }
}

type AssemblyKey = (String, u16);

/// Accumulates fragments and persists messages through the record store.
pub struct Reassembler {
    repo: Arc<dyn MessageRepository>,
    buffers: HashMap<AssemblyKey, PartialAssembly>,
}

impl Reassembler {
    pub fn new(repo: Arc<dyn MessageRepository>) -> Self {
        Self {
            repo,
            buffers: HashMap::new(),
        }
    }

    /// Number of assemblies still waiting for parts.
    pub fn pending(&self) -> usize {
        self.buffers.len()
    }

    /// Feed one inbound SMS.
    ///
    /// Without fragment info the text is a complete message and is persisted
    /// immediately. With fragment info the part is buffered and the message
    /// completes once `total_parts` distinct indices have been seen.
    pub async fn ingest(
        &mut self,
        sender: &str,
        timestamp: DateTime<Utc>,
        text: &str,
        fragment: Option<Fragment>,
    ) -> Result<IngestOutcome> {
        let Some(fragment) = fragment else {
            let message_id = self
                .repo
                .create(&NewMessage {
                    sender: sender.to_string(),
                    timestamp,
                    text: text.to_string(),
                    reference: None,
                    total_parts: None,
                })
                .await?;
            return Ok(IngestOutcome {
                message_id,
                timestamp,
                complete_text: Some(text.to_string()),
            });
        };

        let key = (sender.to_string(), fragment.reference);
        let governing_total = self
            .buffers
            .get(&key)
            .map(|b| b.total_parts)
            .unwrap_or(fragment.total_parts);

        if governing_total == 0 {
            return Err(Error::validation(format!(
                "fragment from {} (reference {}) reports zero total parts",
                sender, fragment.reference
            )));
        }
        if fragment.part_index == 0 || fragment.part_index > governing_total {
            return Err(Error::validation(format!(
                "fragment index {} out of range 1..={} for {} (reference {})",
                fragment.part_index, governing_total, sender, fragment.reference
            )));
        }

        let is_new = !self.buffers.contains_key(&key);
        if is_new {
            let message_id = self
                .repo
                .create(&NewMessage {
                    sender: sender.to_string(),
                    timestamp,
                    text: text.to_string(),
                    reference: Some(fragment.reference),
                    total_parts: Some(fragment.total_parts),
                })
                .await?;
            self.buffers.insert(
                key.clone(),
                PartialAssembly {
                    message_id,
                    total_parts: fragment.total_parts,
                    timestamp,
                    first_seen: Instant::now(),
                    parts: BTreeMap::new(),
                    preview: String::new(),
                },
            );
        }

        let Some(buffer) = self.buffers.get_mut(&key) else {
            return Err(Error::Other("assembly buffer vanished".to_string()));
        };

        if fragment.total_parts != buffer.total_parts {
            debug!(
                "Ignoring total_parts={} from {} (reference {}), first fragment said {}",
                fragment.total_parts, sender, fragment.reference, buffer.total_parts
            );
        }

        if buffer
            .parts
            .insert(fragment.part_index, text.to_string())
            .is_some()
        {
            warn!(
                "Duplicate part {} from {} (reference {}), keeping the latest",
                fragment.part_index, sender, fragment.reference
            );
        }
        buffer.apply_preview(fragment.part_index, text);

        if !is_new {
            if let Err(e) = self.repo.update_text(buffer.message_id, &buffer.preview).await {
                warn!(
                    "Failed to persist preview for SMS ID={}: {}",
                    buffer.message_id, e
                );
            }
        }

        debug!(
            "Received part {}/{} from {} (reference {})",
            fragment.part_index, buffer.total_parts, sender, fragment.reference
        );

        if !buffer.is_complete() {
            let outcome = IngestOutcome {
                message_id: buffer.message_id,
                timestamp: buffer.timestamp,
                complete_text: None,
            };
            debug!(
                "Waiting for {} more parts for message from {} (reference {})",
                buffer.total_parts as usize - buffer.parts.len(),
                sender,
                fragment.reference
            );
            return Ok(outcome);
        }

        let Some(buffer) = self.buffers.remove(&key) else {
            return Err(Error::Other("assembly buffer vanished".to_string()));
        };
        let complete = buffer.assemble();

        if complete != buffer.preview {
            if let Err(e) = self.repo.update_text(buffer.message_id, &complete).await {
                warn!(
                    "Failed to persist reassembled text for SMS ID={}: {}",
                    buffer.message_id, e
                );
            }
        }

        info!(
            "Reassembled {}-part message from {} (reference {}): ID={}",
            buffer.total_parts, sender, fragment.reference, buffer.message_id
        );

        Ok(IngestOutcome {
            message_id: buffer.message_id,
            timestamp: buffer.timestamp,
            complete_text: Some(complete),
        })
    }

    /// Drop assemblies whose first part arrived more than `max_age` ago.
    ///
    /// Returns the message ids of the dropped assemblies. Their rows keep the
    /// last persisted preview.
    pub fn evict_stale(&mut self, max_age: Duration) -> Vec<i64> {
        let now = Instant::now();
        let mut evicted = Vec::new();
        self.buffers.retain(|(sender, reference), buffer| {
            if now.duration_since(buffer.first_seen) <= max_age {
                return true;
            }
            warn!(
                "Dropping incomplete message from {} (reference {}, SMS ID={}): {}/{} parts after {:?}",
                sender,
                reference,
                buffer.message_id,
                buffer.parts.len(),
                buffer.total_parts,
                max_age
            );
            evicted.push(buffer.message_id);
            false
        });
        evicted
    }
}
