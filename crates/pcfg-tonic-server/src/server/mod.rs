//! The coordinator: configuration, RPC surface, shared run state and the
//! merged structure stream.
//!
//! - [`config`] - CLI/env configuration and its validated form.
//! - [`service`] - the gRPC handler and the [`service::coordinator::Coordinator`]
//!   it delegates to.
//! - [`streaming`] - the fair merge of the ordered structure stream with the
//!   reinjection channel, and chunk building on top of it.
//! - [`pool`] - per-worker bookkeeping and the target set.
//! - [`telemetry`] - tracing subscriber and optional OpenTelemetry export.

pub mod config;
pub mod pool;
pub mod service;
pub mod streaming;
pub mod telemetry;
