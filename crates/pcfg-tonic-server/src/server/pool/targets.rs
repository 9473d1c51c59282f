use std::{
    collections::{BTreeMap, HashMap, HashSet},
    path::Path,
};

/// Target hashes still to recover, and the plaintexts recovered so far.
#[derive(Debug, Default)]
pub struct TargetSet {
    remaining: HashSet<String>,
    completed: BTreeMap<String, String>,
}

impl TargetSet {
    /// Reads one target per line, skipping blank lines and duplicates.
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(contents.lines().collect())
    }

    pub fn remaining_len(&self) -> usize {
        self.remaining.len()
    }

    /// Remaining targets in a stable order.
    pub fn remaining(&self) -> Vec<String> {
        let mut list: Vec<String> = self.remaining.iter().cloned().collect();
        list.sort_unstable();
        list
    }

    pub fn completed(&self) -> &BTreeMap<String, String> {
        &self.completed
    }

    pub fn is_done(&self) -> bool {
        self.remaining.is_empty()
    }

    /// Moves every reported target that is still remaining into the
    /// completed set. Unknown and already recovered targets are ignored.
    /// Returns how many targets were newly recovered.
    pub fn record(&mut self, results: HashMap<String, String>) -> usize {
        let mut recovered = 0;
        for (target, plaintext) in results {
            if self.remaining.remove(&target) {
                self.completed.insert(target, plaintext);
                recovered += 1;
            }
        }
        recovered
    }
}

impl<'a> FromIterator<&'a str> for TargetSet {
    fn from_iter<T: IntoIterator<Item = &'a str>>(iter: T) -> Self {
        Self {
            remaining: iter
                .into_iter()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect(),
            completed: BTreeMap::new(),
        }
    }
}
