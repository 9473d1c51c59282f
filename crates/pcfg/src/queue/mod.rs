//! The priority enumeration engine.
//!
//! [`PcfgQueue`] keeps the frontier of candidate structures in a max-heap
//! keyed by probability. Popping an entry pushes the children it is
//! responsible for (see [`Step`] and [`Grammar::deadbeat_dad`]); every child
//! is at most as probable as its parent, so the sequence of popped
//! probabilities never increases.

mod deadbeat;
mod item;

pub use deadbeat::Step;
pub use item::QueueItem;

use crate::{Grammar, Result, TreeItem};
use std::{collections::BinaryHeap, sync::Arc};

/// Yields every pre-terminal structure of a grammar exactly once, most
/// probable first.
///
/// The engine is single-threaded and stateful; wrap it in a lock or give it
/// a dedicated thread when it is shared.
#[derive(Debug)]
pub struct PcfgQueue {
    grammar: Arc<Grammar>,
    heap: BinaryHeap<QueueItem>,
}

impl PcfgQueue {
    /// Seeds the frontier with the unexpanded `START` structure.
    pub fn new(grammar: Arc<Grammar>) -> Result<Self> {
        let mut queue = Self {
            heap: BinaryHeap::new(),
            grammar,
        };
        let seed = TreeItem::leaf(queue.grammar.start_index());
        queue.push(seed)?;
        Ok(queue)
    }

    pub fn grammar(&self) -> &Arc<Grammar> {
        &self.grammar
    }

    /// Number of structures waiting in the frontier.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Pops the next fully terminal structure.
    ///
    /// Structures that still have unexpanded structural leaves are popped,
    /// expanded and skipped internally. Returns `Ok(None)` once the frontier
    /// is empty.
    ///
    /// # Errors
    ///
    /// [`crate::Error::IndexOutOfRange`] if a structure disagrees with the
    /// grammar, which is a bug rather than a recoverable condition.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Result<Option<QueueItem>> {
        while let Some(item) = self.heap.pop() {
            for child in self.grammar.deadbeat_dad(&item.tree)? {
                self.push(child)?;
            }
            if item.is_terminal {
                return Ok(Some(item));
            }
        }
        Ok(None)
    }

    fn push(&mut self, tree: TreeItem) -> Result<()> {
        let item = QueueItem {
            probability: self.grammar.probability(&tree)?,
            is_terminal: self.grammar.is_terminal(&tree)?,
            tree,
        };
        self.heap.push(item);
        Ok(())
    }
}
