use crate::TreeItem;
use core::cmp::Ordering;

/// A frontier entry: a structure and its cached total probability.
///
/// Ordered by probability alone so a [`std::collections::BinaryHeap`] of
/// items pops the most probable structure first.
#[derive(Clone, Debug)]
pub struct QueueItem {
    pub probability: f64,
    pub is_terminal: bool,
    pub tree: TreeItem,
}

impl PartialEq for QueueItem {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueueItem {}

impl PartialOrd for QueueItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueItem {
    fn cmp(&self, other: &Self) -> Ordering {
        self.probability.total_cmp(&other.probability)
    }
}
