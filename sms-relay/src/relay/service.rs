//! Relay orchestration.
//!
//! [`RelayService`] owns the shared state of a running relay: the failure
//! tracker, the dispatch router and the worker tasks. Inbound messages enter
//! through an [`IntakeHandle`], whose push never blocks. A single intake task
//! owns the [`Reassembler`], persists each message and fans completed ones
//! out to every channel queue.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::channels::DeliveryChannel;
use super::dispatcher::{DEFAULT_RETRY_BASE_DELAY, Dispatcher};
use super::failure::FailureTracker;
use super::queue::DispatchRouter;
use super::reassembly::Reassembler;
use super::task::DeliveryTask;
use crate::database::repositories::MessageRepository;
use crate::modem::InboundSms;

/// Default age after which an incomplete multipart message is dropped.
pub const DEFAULT_REASSEMBLY_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Cloneable entry point for inbound messages.
#[derive(Debug, Clone)]
pub struct IntakeHandle {
    tx: mpsc::UnboundedSender<InboundSms>,
}

impl IntakeHandle {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<InboundSms>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Hand a message to the intake task. Returns false once it has stopped.
    pub fn on_message(&self, sms: InboundSms) -> bool {
        self.tx.send(sms).is_ok()
    }
}

/// Timing knobs of a running relay.
#[derive(Debug, Clone)]
pub struct RelayOptions {
    pub retry_base_delay: Duration,
    pub reassembly_timeout: Duration,
    /// How often incomplete assemblies are checked against the timeout.
    pub eviction_interval: Duration,
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self {
            retry_base_delay: DEFAULT_RETRY_BASE_DELAY,
            reassembly_timeout: DEFAULT_REASSEMBLY_TIMEOUT,
            eviction_interval: Duration::from_secs(60),
        }
    }
}

pub struct RelayService {
    intake: IntakeHandle,
    router: DispatchRouter,
    failures: FailureTracker,
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl RelayService {
    /// Spawn one dispatcher per channel plus the intake task.
    pub fn start(
        repo: Arc<dyn MessageRepository>,
        channels: Vec<Arc<dyn DeliveryChannel>>,
        options: RelayOptions,
        cancel: CancellationToken,
    ) -> Self {
        let failures = FailureTracker::new();

        let mut builder = DispatchRouter::builder();
        let queues: Vec<_> = channels
            .into_iter()
            .map(|channel| {
                let rx = builder.route(channel.kind(), channel.is_configured());
                (channel, rx)
            })
            .collect();
        let router = builder.build();

        let mut handles = Vec::with_capacity(queues.len() + 1);
        for (channel, rx) in queues {
            if !channel.is_configured() {
                info!("{} channel not configured, its tasks will be skipped", channel.kind());
            }
            let dispatcher = Dispatcher::new(channel, repo.clone(), failures.clone(), router.clone())
                .with_base_delay(options.retry_base_delay);
            handles.push(tokio::spawn(dispatcher.run(rx, cancel.child_token())));
        }

        let (intake, intake_rx) = IntakeHandle::channel();
        let intake_task = IntakeTask {
            reassembler: Reassembler::new(repo),
            router: router.clone(),
            options,
        };
        handles.push(tokio::spawn(intake_task.run(intake_rx, cancel.child_token())));

        Self {
            intake,
            router,
            failures,
            cancel,
            handles,
        }
    }

    pub fn intake(&self) -> IntakeHandle {
        self.intake.clone()
    }

    pub fn failures(&self) -> &FailureTracker {
        &self.failures
    }

    pub fn router(&self) -> &DispatchRouter {
        &self.router
    }

    /// Wait for every worker to stop.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!("Relay worker panicked: {}", e);
            }
        }
    }

    /// Cancel all workers and wait for them.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        self.join().await;
    }
}

struct IntakeTask {
    reassembler: Reassembler,
    router: DispatchRouter,
    options: RelayOptions,
}

impl IntakeTask {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<InboundSms>, cancel: CancellationToken) {
        let mut sweep = tokio::time::interval(self.options.eviction_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                sms = rx.recv() => match sms {
                    Some(sms) => self.handle(sms).await,
                    None => break,
                },
                _ = sweep.tick() => {
                    let evicted = self.reassembler.evict_stale(self.options.reassembly_timeout);
                    if !evicted.is_empty() {
                        warn!("Dropped {} incomplete message(s)", evicted.len());
                    }
                }
            }
        }

        debug!(
            "Intake stopped with {} incomplete message(s) buffered",
            self.reassembler.pending()
        );
    }

    async fn handle(&mut self, sms: InboundSms) {
        let outcome = match self
            .reassembler
            .ingest(&sms.sender, sms.timestamp, &sms.text, sms.fragment)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Failed to store SMS from {}: {}", sms.sender, e);
                return;
            }
        };

        let Some(text) = outcome.complete_text else {
            return;
        };

        let task = DeliveryTask::for_message(sms.sender, outcome.timestamp, text, outcome.message_id)
            .with_provider(sms.provider);
        let queued = self.router.fan_out(&task);
        info!("Queued SMS ID={} for {} channel(s)", outcome.message_id, queued);
    }
}
