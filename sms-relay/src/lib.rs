//! sms-relay library crate.
//!
//! Bridges an inbound SMS modem to three outbound surfaces (HTTP providers,
//! SMS recipients and email) with durable delivery tracking, per-channel
//! retry and outage notification deduplication.

pub mod config;
pub mod database;
pub mod error;
pub mod logging;
pub mod modem;
pub mod relay;
pub mod utils;

pub use error::{Error, Result};
