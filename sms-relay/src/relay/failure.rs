//! Channel outage tracking.
//!
//! Holds the set of channels currently considered down. Transitions are
//! edge-triggered: only the first terminal failure of an outage reports a
//! change, so callers emit at most one notification per outage. Each
//! dispatcher only ever touches its own channel's entry.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::Mutex;

use super::task::ChannelKind;

/// Shared, cloneable failure set.
#[derive(Debug, Clone, Default)]
pub struct FailureTracker {
    failed: Arc<Mutex<BTreeSet<ChannelKind>>>,
}

impl FailureTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `channel` down. Returns `true` when it was not already down.
    pub fn mark_failed(&self, channel: ChannelKind) -> bool {
        self.failed.lock().insert(channel)
    }

    /// Clear `channel`. Returns `true` when it was down.
    pub fn mark_recovered(&self, channel: ChannelKind) -> bool {
        self.failed.lock().remove(&channel)
    }

    pub fn is_failed(&self, channel: ChannelKind) -> bool {
        self.failed.lock().contains(&channel)
    }

    /// Channels currently down, in a stable order.
    pub fn snapshot(&self) -> Vec<ChannelKind> {
        self.failed.lock().iter().copied().collect()
    }
}
