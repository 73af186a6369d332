//! Repository layer for database access.

pub mod message;

pub use message::*;
