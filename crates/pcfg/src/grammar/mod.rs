//! The grammar model and its loader.
//!
//! - [`model`] - [`Grammar`], [`Section`], [`Replacement`], [`Mapping`].
//! - [`source`] - the [`RuleSource`] seam and the on-disk [`RuleDirectory`].
//! - [`builder`] - depth-first construction from `START`.

mod builder;
mod model;
mod source;

#[cfg(test)]
pub(crate) use builder::testing::{MemorySource, password_source};
pub use builder::*;
pub use model::*;
pub use source::*;
