//! Structure evaluation and duplicate-free child discovery.
//!
//! Every structure except the seed can be derived from several parents by a
//! single local edit: advancing one leaf to its next replacement, or
//! expanding one structural leaf into its first-choice children. The
//! "deadbeat dad" rule assigns each structure exactly one responsible
//! parent, so a parent only pushes the children it is responsible for and
//! nothing is enumerated twice.
//!
//! Responsibility is decided on the child alone. Every possible undo of the
//! child is scored by the probability it gives back (`p[t-1] - p[t]` for an
//! advanced leaf, `1 - prod(p_children[0])` for a fresh expansion), and the
//! first minimum in a fixed traversal order wins. Since all parents evaluate
//! the same child tree, they all agree on the winner.

use crate::{Grammar, Result, TreeItem};

/// The single local edit that turned a parent into a candidate child.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    /// A leaf moved to the next, less probable replacement.
    Advance,
    /// A structural leaf was replaced by its first-choice children.
    Expand,
}

impl Grammar {
    /// Product of the chosen replacement probability at every node.
    pub fn probability(&self, tree: &TreeItem) -> Result<f64> {
        let own = self.replacement(tree.index, tree.transition)?.probability;
        tree.children
            .iter()
            .try_fold(own, |acc, child| Ok(acc * self.probability(child)?))
    }

    /// Whether every leaf holds a terminal replacement.
    pub fn is_terminal(&self, tree: &TreeItem) -> Result<bool> {
        if tree.is_leaf() {
            return Ok(self.replacement(tree.index, tree.transition)?.is_terminal);
        }
        for child in &tree.children {
            if !self.is_terminal(child)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Returns the children of `tree` that `tree` is responsible for.
    pub fn deadbeat_dad(&self, tree: &TreeItem) -> Result<Vec<TreeItem>> {
        let mut children = Vec::with_capacity(4);

        for path in tree.leaf_paths() {
            let Some(leaf) = tree.node(&path) else {
                continue;
            };
            let section = self.section(leaf.index)?;
            let chosen = self.replacement(leaf.index, leaf.transition)?;

            if leaf.transition + 1 < section.replacements.len() {
                let mut candidate = tree.clone();
                if let Some(node) = candidate.node_mut(&path) {
                    node.transition += 1;
                }
                if self.is_my_parent(&candidate, &path, Step::Advance)? {
                    children.push(candidate);
                }
            }

            if !chosen.is_terminal && !chosen.pos.is_empty() {
                let mut candidate = tree.clone();
                if let Some(node) = candidate.node_mut(&path) {
                    node.children = chosen.pos.iter().copied().map(TreeItem::leaf).collect();
                }
                if self.is_my_parent(&candidate, &path, Step::Expand)? {
                    children.push(candidate);
                }
            }
        }

        Ok(children)
    }

    /// Decides whether undoing `step` at `changed` is the designated way
    /// back from `child` to its parent.
    pub fn is_my_parent(&self, child: &TreeItem, changed: &[usize], step: Step) -> Result<bool> {
        let Some(marked) = child.node(changed) else {
            return Ok(false);
        };

        let mut stack = vec![child];
        let mut min_diff = f64::INFINITY;
        let mut found = false;

        while let Some(node) = stack.pop() {
            let is_marked = core::ptr::eq(node, marked);

            let (diff, kind) = if node.is_leaf() {
                if node.transition == 0 {
                    continue;
                }
                let previous = self.replacement(node.index, node.transition - 1)?;
                let current = self.replacement(node.index, node.transition)?;
                (previous.probability - current.probability, Step::Advance)
            } else {
                let mut fresh = true;
                for c in &node.children {
                    if c.transition != 0 || !c.is_leaf() {
                        fresh = false;
                        stack.push(c);
                    }
                }
                if !fresh {
                    continue;
                }
                let mut expansion = 1.0;
                for c in &node.children {
                    expansion *= self.replacement(c.index, 0)?.probability;
                }
                (1.0 - expansion, Step::Expand)
            };

            let is_origin = is_marked && kind == step;
            if diff < min_diff {
                if is_origin {
                    found = true;
                } else if found {
                    return Ok(false);
                }
                min_diff = diff;
            } else if is_origin {
                return Ok(false);
            }
        }

        Ok(found)
    }
}
