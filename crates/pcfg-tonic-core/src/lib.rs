#![doc = include_str!("../README.md")]

mod common;
pub use common::*;
// Public re-export so downstream crates can reach the engine via
// `pcfg_tonic_core::pcfg`
pub use pcfg;
