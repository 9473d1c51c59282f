//! Bookkeeping the coordinator mutates under its state lock.
//!
//! - [`registry`] - connected workers, their active chunk and timing.
//! - [`targets`] - remaining and recovered target hashes.

pub mod registry;
pub mod targets;
