//! Per-channel FIFO queues and the router that feeds them.
//!
//! Every channel owns one unbounded queue: pushing never blocks (the intake
//! path and the retry path both rely on that) and the single worker awaits
//! the next task.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::task::{ChannelKind, DeliveryTask};

/// Receiving end of one channel's queue, owned by its dispatcher.
pub type QueueReceiver = mpsc::UnboundedReceiver<DeliveryTask>;

#[derive(Debug)]
struct Route {
    kind: ChannelKind,
    tx: mpsc::UnboundedSender<DeliveryTask>,
    configured: bool,
}

/// Cloneable handle to every channel queue.
#[derive(Debug, Clone)]
pub struct DispatchRouter {
    routes: Arc<[Route]>,
}

/// Collects one queue per channel before the router is frozen.
#[derive(Debug, Default)]
pub struct DispatchRouterBuilder {
    routes: Vec<Route>,
}

impl DispatchRouterBuilder {
    /// Register a channel queue and return its receiving end.
    ///
    /// `configured` is false when the channel has no recipients or
    /// providers; such channels are left out of notification fan-out.
    pub fn route(&mut self, kind: ChannelKind, configured: bool) -> QueueReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        self.routes.retain(|r| r.kind != kind);
        self.routes.push(Route {
            kind,
            tx,
            configured,
        });
        rx
    }

    pub fn build(self) -> DispatchRouter {
        DispatchRouter {
            routes: self.routes.into(),
        }
    }
}

impl DispatchRouter {
    pub fn builder() -> DispatchRouterBuilder {
        DispatchRouterBuilder::default()
    }

    /// Push `task` to the tail of `kind`'s queue.
    ///
    /// Returns false when the channel has no queue or its worker is gone.
    pub fn enqueue(&self, kind: ChannelKind, task: DeliveryTask) -> bool {
        let Some(route) = self.routes.iter().find(|r| r.kind == kind) else {
            warn!("No queue registered for {} channel", kind);
            return false;
        };
        match route.tx.send(task) {
            Ok(()) => true,
            Err(_) => {
                debug!("{} queue closed, dropping task", kind);
                false
            }
        }
    }

    /// Push a copy of `task` onto every channel queue.
    ///
    /// Unconfigured channels still receive the task; their worker skips it.
    pub fn fan_out(&self, task: &DeliveryTask) -> usize {
        self.routes
            .iter()
            .filter(|r| self.enqueue(r.kind, task.clone()))
            .count()
    }

    /// Inject an outage notification into every configured channel except
    /// the one that failed. Returns the channels that received it.
    pub fn notify_others(&self, failed: ChannelKind, task: &DeliveryTask) -> Vec<ChannelKind> {
        self.routes
            .iter()
            .filter(|r| r.kind != failed && r.configured)
            .filter(|r| self.enqueue(r.kind, task.clone()))
            .map(|r| r.kind)
            .collect()
    }

    pub fn is_configured(&self, kind: ChannelKind) -> bool {
        self.routes.iter().any(|r| r.kind == kind && r.configured)
    }
}
