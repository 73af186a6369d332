//! Message relay core.
//!
//! Inbound SMS are reassembled and persisted, then delivered independently
//! through three channels (API, SMS, email). Each channel has its own queue
//! and worker with linear retry backoff; exhausting the retries marks the
//! channel down and notifies the others once per outage.

pub mod channels;
pub mod dispatcher;
pub mod failure;
pub mod provider;
pub mod queue;
pub mod reassembly;
pub mod service;
pub mod task;

#[cfg(test)]
pub(crate) mod test_support;

pub use channels::DeliveryChannel;
pub use dispatcher::{Dispatcher, TaskOutcome};
pub use failure::FailureTracker;
pub use provider::{HttpMethod, ProviderDescriptor, ProviderResolver};
pub use queue::DispatchRouter;
pub use reassembly::{Fragment, IngestOutcome, Reassembler};
pub use service::{IntakeHandle, RelayOptions, RelayService};
pub use task::{ChannelKind, DeliveryTask};
