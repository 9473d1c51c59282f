use super::merge::{MergedStream, Pull};
use pcfg::{Grammar, GuessGenerator, TreeItem};

/// A unit of work: structures handed to one worker at once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub id: u64,
    pub items: Vec<TreeItem>,
    /// Guesses the items expand into.
    pub terminals: u64,
}

/// Structures pulled for one chunk, before an id is assigned.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Batch {
    pub items: Vec<TreeItem>,
    pub terminals: u64,
    /// The stream reported exhaustion while filling this batch.
    pub exhausted: bool,
}

impl Batch {
    pub fn into_chunk(self, id: u64) -> Chunk {
        Chunk {
            id,
            items: self.items,
            terminals: self.terminals,
        }
    }
}

/// Pulls structures until their guesses reach `target`, the stream goes
/// idle for one pull timeout, or it is exhausted.
///
/// At least one structure is taken whenever one is available, so a single
/// structure larger than `target` still makes progress.
pub async fn fill(
    stream: &mut MergedStream,
    grammar: &Grammar,
    target: u64,
) -> pcfg::Result<Batch> {
    let mut batch = Batch::default();
    while batch.terminals < target.max(1) {
        match stream.pull().await {
            Pull::Item(tree) => {
                let count = GuessGenerator::new(grammar, &tree)?.guess_count();
                batch.terminals = batch.terminals.saturating_add(count);
                batch.items.push(tree);
            }
            Pull::Idle => break,
            Pull::Exhausted => {
                batch.exhausted = true;
                break;
            }
        }
    }
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::time::Duration;
    use pcfg::{Function, Mapping, Replacement, Section};
    use tokio::sync::mpsc;

    /// One section; replacement `i` has `i + 1` values.
    fn grammar() -> Grammar {
        let start = Section::new(
            "START",
            "Grammar",
            vec![
                Replacement::terminal(0.5, Function::Copy, ["a"]),
                Replacement::terminal(0.3, Function::Copy, ["b", "c"]),
                Replacement::terminal(0.2, Function::Copy, ["d", "e", "f"]),
            ],
        );
        Grammar::from_parts("r", vec![start], Mapping::default()).unwrap()
    }

    fn tree(t: usize) -> TreeItem {
        TreeItem::new(0, t, Vec::new())
    }

    #[tokio::test]
    async fn stops_once_the_target_is_reached() {
        let (tx, rx) = mpsc::channel(8);
        for t in [2, 1, 0] {
            tx.send(tree(t)).await.unwrap();
        }
        let mut stream = MergedStream::new(rx, Duration::from_millis(20));

        let batch = fill(&mut stream, &grammar(), 4).await.unwrap();
        assert_eq!(batch.items, [tree(2), tree(1)]);
        assert_eq!(batch.terminals, 5);
        assert!(!batch.exhausted);
    }

    #[tokio::test(start_paused = true)]
    async fn returns_a_partial_batch_when_idle() {
        let (tx, rx) = mpsc::channel(8);
        tx.send(tree(0)).await.unwrap();
        let mut stream = MergedStream::new(rx, Duration::from_millis(20));

        let batch = fill(&mut stream, &grammar(), 100).await.unwrap();
        assert_eq!(batch.items, [tree(0)]);
        assert!(!batch.exhausted);
        drop(tx);
    }

    #[tokio::test]
    async fn flags_exhaustion() {
        let (tx, rx) = mpsc::channel(8);
        tx.send(tree(1)).await.unwrap();
        drop(tx);
        let mut stream = MergedStream::new(rx, Duration::from_millis(20));

        let batch = fill(&mut stream, &grammar(), 100).await.unwrap();
        assert_eq!(batch.terminals, 2);
        assert!(batch.exhausted);

        let empty = fill(&mut stream, &grammar(), 100).await.unwrap();
        assert!(empty.items.is_empty());
        assert!(empty.exhausted);
    }

    #[tokio::test]
    async fn rejects_structures_outside_the_grammar() {
        let (tx, rx) = mpsc::channel(1);
        tx.send(tree(5)).await.unwrap();
        let mut stream = MergedStream::new(rx, Duration::from_millis(20));
        assert!(fill(&mut stream, &grammar(), 1).await.is_err());
    }
}
