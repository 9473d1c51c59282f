//! Definitions shared by the coordinator and its workers.
//!
//! - [`error`] - the service error type and its gRPC status mapping.
//! - [`convert`] - conversions between engine types and wire messages.
//! - [`proto`] - the generated messages and service bindings.

pub mod convert;
pub mod error;
pub mod proto {
    tonic::include_proto!("pcfg");
    pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("pcfg_descriptor");
}

pub use error::{Error, Result};
