//! Database models.

pub mod message;

pub use message::*;
