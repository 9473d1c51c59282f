//! The worker binary.
//!
//! - [`config`] - `work` / `local` subcommands and their validated form.
//! - [`worker`] - the session with a coordinator: connect, fetch, process,
//!   submit, disconnect.
//! - [`engine`] - the external cracking engine process.
//! - [`local`] - single-machine generation to stdout.
//! - [`telemetry`] - console logging.

pub mod config;
pub mod engine;
pub mod local;
pub mod telemetry;
pub mod worker;
