//! Per-channel delivery worker.
//!
//! One [`Dispatcher`] drains one channel queue with a single worker, so a
//! channel never has two attempts in flight. A failed attempt blocks only
//! this worker for `base_delay * retry_count` and then re-enters the task at
//! the tail of the same queue. Once a task has failed `max_retries` times the
//! channel is marked down and, on the first such failure of an outage, the
//! other configured channels are told about it.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::channels::DeliveryChannel;
use super::failure::FailureTracker;
use super::queue::{DispatchRouter, QueueReceiver};
use super::task::{ChannelKind, DeliveryTask};
use crate::database::repositories::MessageRepository;

/// Default pause before the first retry; later retries wait a multiple of it.
pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_secs(5);

/// What happened to a task after one pass through the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Delivered,
    /// Requeued after waiting `delay`; `attempt` is the new retry count.
    RetryScheduled { attempt: u32, delay: Duration },
    /// Gave up. `notified` lists the channels that received an outage notice.
    FailedTerminal { notified: Vec<ChannelKind> },
    /// The channel has nothing to deliver to.
    Skipped,
    /// Dropped because of a configuration problem.
    Rejected,
}

/// Text of the outage notice sent to the remaining channels.
pub fn failure_notice(channel: ChannelKind, attempts: u32, message_id: i64) -> String {
    format!(
        "{} forwarding failed after {} attempts (message ID {})",
        channel, attempts, message_id
    )
}

pub struct Dispatcher<C> {
    channel: C,
    repo: Arc<dyn MessageRepository>,
    failures: FailureTracker,
    router: DispatchRouter,
    base_delay: Duration,
}

impl<C: DeliveryChannel> Dispatcher<C> {
    pub fn new(
        channel: C,
        repo: Arc<dyn MessageRepository>,
        failures: FailureTracker,
        router: DispatchRouter,
    ) -> Self {
        Self {
            channel,
            repo,
            failures,
            router,
            base_delay: DEFAULT_RETRY_BASE_DELAY,
        }
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn kind(&self) -> ChannelKind {
        self.channel.kind()
    }

    /// Drain `rx` until cancelled.
    ///
    /// Cancellation is only observed between tasks; a task that is being
    /// delivered or waiting for its retry slot finishes that step first.
    pub async fn run(self, mut rx: QueueReceiver, cancel: CancellationToken) {
        let kind = self.kind();
        info!("{} dispatcher started", kind);

        loop {
            let task = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                task = rx.recv() => match task {
                    Some(task) => task,
                    None => break,
                },
            };
            self.process(task).await;
        }

        info!("{} dispatcher stopped", kind);
    }

    /// Run one delivery attempt for `task` and apply the retry policy.
    pub async fn process(&self, mut task: DeliveryTask) -> TaskOutcome {
        let kind = self.kind();

        if !self.channel.is_configured() {
            debug!("{} channel not configured, skipping task", kind);
            return TaskOutcome::Skipped;
        }

        debug!(
            "{} attempt {} for message {}",
            kind,
            task.retry_count + 1,
            describe(&task)
        );

        let err = match self.channel.deliver(&task).await {
            Ok(()) => {
                self.on_delivered(&task).await;
                return TaskOutcome::Delivered;
            }
            Err(err) => err,
        };

        if !err.is_retryable() {
            error!(
                "{} delivery of message {} dropped: {}",
                kind,
                describe(&task),
                err
            );
            return TaskOutcome::Rejected;
        }

        let attempts = task.retry_count + 1;
        let cap = self.channel.max_retries(&task).max(1);

        if attempts < cap {
            task.retry_count = attempts;
            let delay = self.base_delay * attempts;
            warn!(
                "{} delivery of message {} failed ({}/{}), retrying in {:?}: {}",
                kind,
                describe(&task),
                attempts,
                cap,
                delay,
                err
            );
            tokio::time::sleep(delay).await;
            if !self.router.enqueue(kind, task) {
                warn!("{} queue closed, retry dropped", kind);
            }
            return TaskOutcome::RetryScheduled {
                attempt: attempts,
                delay,
            };
        }

        error!(
            "{} delivery of message {} failed after {} attempts: {}",
            kind,
            describe(&task),
            attempts,
            err
        );
        self.on_terminal_failure(&task, attempts)
    }

    async fn on_delivered(&self, task: &DeliveryTask) {
        let kind = self.kind();
        if let Some(id) = task.message_id {
            if let Err(e) = self.repo.set_forwarded(id, kind).await {
                warn!("Failed to mark SMS ID={} forwarded via {}: {}", id, kind, e);
            }
        }
        if self.failures.mark_recovered(kind) {
            info!("{} channel recovered", kind);
        }
        info!("{} delivered message {}", kind, describe(task));
    }

    fn on_terminal_failure(&self, task: &DeliveryTask, attempts: u32) -> TaskOutcome {
        let kind = self.kind();
        let newly_failed = self.failures.mark_failed(kind);

        let Some(message_id) = task.message_id else {
            // Notices never trigger further notices.
            return TaskOutcome::FailedTerminal { notified: vec![] };
        };
        if !newly_failed {
            debug!("{} already marked down, not notifying again", kind);
            return TaskOutcome::FailedTerminal { notified: vec![] };
        }

        let notice = DeliveryTask::notification(failure_notice(kind, attempts, message_id));
        let notified = self.router.notify_others(kind, &notice);
        warn!("{} marked down, notified {:?}", kind, notified);
        TaskOutcome::FailedTerminal { notified }
    }
}

fn describe(task: &DeliveryTask) -> String {
    match task.message_id {
        Some(id) => format!("ID={}", id),
        None => "notification".to_string(),
    }
}
