use core::fmt;

/// A pre-terminal structure: one specific choice of replacement at every
/// node of a fixed tree shape.
///
/// `index` names a [`crate::Section`] and `transition` the rank of the
/// chosen replacement within it (0 is the most probable). A node without
/// children is a leaf; it is either terminal or a structural choice that has
/// not been expanded yet.
///
/// Trees are plain values. Cloning is a deep copy, so a snapshot taken
/// during enumeration never aliases the tree it was taken from.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct TreeItem {
    pub index: usize,
    pub transition: usize,
    pub children: Vec<TreeItem>,
}

impl TreeItem {
    pub const fn new(index: usize, transition: usize, children: Vec<TreeItem>) -> Self {
        Self {
            index,
            transition,
            children,
        }
    }

    /// The unexpanded, most probable choice of section `index`.
    pub const fn leaf(index: usize) -> Self {
        Self::new(index, 0, Vec::new())
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Follows child positions from this node.
    pub fn node(&self, path: &[usize]) -> Option<&TreeItem> {
        path.iter()
            .try_fold(self, |node, &i| node.children.get(i))
    }

    pub fn node_mut(&mut self, path: &[usize]) -> Option<&mut TreeItem> {
        path.iter()
            .try_fold(self, |node, &i| node.children.get_mut(i))
    }

    /// Paths to every leaf, left to right.
    pub fn leaf_paths(&self) -> Vec<Vec<usize>> {
        fn walk(node: &TreeItem, path: &mut Vec<usize>, out: &mut Vec<Vec<usize>>) {
            if node.is_leaf() {
                out.push(path.clone());
                return;
            }
            for (i, child) in node.children.iter().enumerate() {
                path.push(i);
                walk(child, path, out);
                path.pop();
            }
        }

        let mut out = Vec::new();
        walk(self, &mut Vec::new(), &mut out);
        out
    }
}

impl fmt::Display for TreeItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{}", self.index, self.transition)?;
        if !self.children.is_empty() {
            f.write_str(",[")?;
            for (i, child) in self.children.iter().enumerate() {
                if i > 0 {
                    f.write_str(" ")?;
                }
                write!(f, "{child}")?;
            }
            f.write_str("]")?;
        }
        f.write_str(")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TreeItem {
        TreeItem::new(
            3,
            0,
            vec![
                TreeItem::new(1, 0, vec![TreeItem::new(0, 2, Vec::new())]),
                TreeItem::new(2, 1, Vec::new()),
            ],
        )
    }

    #[test]
    fn leaf_paths_are_left_to_right() {
        assert_eq!(sample().leaf_paths(), vec![vec![0, 0], vec![1]]);
        assert_eq!(TreeItem::leaf(7).leaf_paths(), vec![Vec::<usize>::new()]);
    }

    #[test]
    fn node_lookup_follows_paths() {
        let mut tree = sample();
        assert_eq!(tree.node(&[0, 0]).map(|n| n.transition), Some(2));
        assert!(tree.node(&[0, 1]).is_none());

        tree.node_mut(&[1]).unwrap().transition = 5;
        assert_eq!(tree.children[1].transition, 5);
    }

    #[test]
    fn clones_do_not_alias() {
        let original = sample();
        let mut copy = original.clone();
        copy.node_mut(&[0, 0]).unwrap().transition += 1;
        assert_ne!(original, copy);
        assert_eq!(original.node(&[0, 0]).unwrap().transition, 2);
    }

    #[test]
    fn displays_as_nested_tuples() {
        assert_eq!(sample().to_string(), "(3,0,[(1,0,[(0,2)]) (2,1)])");
    }
}
