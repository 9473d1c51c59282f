//! # `pcfg`: probability-ordered guess generation from a PCFG
//!
//! This crate holds the single-process core of the PCFG relay:
//!
//! - [`Grammar`] - the immutable, parsed grammar (sections of probability
//!   ranked replacements), built from a [`RuleSource`] such as a
//!   [`RuleDirectory`].
//! - [`PcfgQueue`] - the priority enumeration engine. Every call to
//!   [`PcfgQueue::next`] yields the next pre-terminal structure in
//!   non-increasing probability order, each structure exactly once.
//! - [`GuessGenerator`] - expands one pre-terminal structure into its
//!   concrete guesses, lazily, and can count them without enumerating.
//! - [`Generator`] - drives the queue, either through a local worker pool or
//!   as an ordered stream for a remote coordinator.
//!
//! ```
//! use pcfg::{Function, Grammar, GuessGenerator, Mapping, PcfgQueue, Replacement, Section};
//! use std::sync::Arc;
//!
//! let start = Section::new(
//!     "START",
//!     "Grammar",
//!     vec![
//!         Replacement::terminal(0.6, Function::Copy, ["foo"]),
//!         Replacement::terminal(0.4, Function::Copy, ["bar"]),
//!     ],
//! );
//! let grammar = Arc::new(Grammar::from_parts("Default", vec![start], Mapping::default()).unwrap());
//! let mut queue = PcfgQueue::new(grammar.clone()).unwrap();
//!
//! let first = queue.next().unwrap().unwrap();
//! let guesses: Vec<String> = GuessGenerator::new(&grammar, &first.tree).unwrap().collect();
//! assert_eq!(guesses, ["foo"]);
//! ```

mod error;
mod generator;
mod grammar;
mod guess;
mod queue;
mod tree;

pub use crate::error::*;
pub use crate::generator::*;
pub use crate::grammar::*;
pub use crate::guess::*;
pub use crate::queue::*;
pub use crate::tree::*;
