//! Structure delivery from the enumeration thread to workers.
//!
//! - [`merge`] - [`merge::MergedStream`], the ordered primary stream fairly
//!   merged with the reinjection channel that reclaimed chunks flow back
//!   through.
//! - [`chunker`] - fills a chunk from the merged stream up to a guess target.

pub mod chunker;
pub mod merge;
