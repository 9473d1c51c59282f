//! gRPC surface of the coordinator.
//!
//! - [`handler`] - [`handler::PcfgService`], the tonic entry point. It only
//!   resolves the caller and converts messages.
//! - [`coordinator`] - [`coordinator::Coordinator`], the shared run state
//!   every RPC is delegated to.

pub mod coordinator;
pub mod handler;
