use core::time::Duration;
use pcfg::TreeItem;
use tokio::sync::mpsc;

/// Outcome of one [`MergedStream::pull`].
#[derive(Debug, PartialEq, Eq)]
pub enum Pull {
    Item(TreeItem),
    /// Nothing arrived within the pull timeout.
    Idle,
    /// The primary stream is closed and nothing is waiting to be reinjected.
    Exhausted,
}

/// The ordered structure stream merged with a reinjection channel.
///
/// Reinjected structures are served first. Reinjection goes through an
/// unbounded channel with its own sender handle, so reclaiming a chunk
/// never waits on a chunk build that is holding the stream.
#[derive(Debug)]
pub struct MergedStream {
    primary: mpsc::Receiver<TreeItem>,
    primary_closed: bool,
    secondary: mpsc::UnboundedReceiver<TreeItem>,
    reinject: mpsc::UnboundedSender<TreeItem>,
    timeout: Duration,
}

impl MergedStream {
    pub fn new(primary: mpsc::Receiver<TreeItem>, timeout: Duration) -> Self {
        let (reinject, secondary) = mpsc::unbounded_channel();
        Self {
            primary,
            primary_closed: false,
            secondary,
            reinject,
            timeout,
        }
    }

    /// A handle for pushing structures back into the stream.
    pub fn reinjector(&self) -> mpsc::UnboundedSender<TreeItem> {
        self.reinject.clone()
    }

    /// The primary stream has closed and no reinjected structure is queued.
    pub fn is_drained(&self) -> bool {
        self.primary_closed && self.secondary.is_empty()
    }

    /// Waits up to the pull timeout for the next structure.
    pub async fn pull(&mut self) -> Pull {
        if let Ok(item) = self.secondary.try_recv() {
            return Pull::Item(item);
        }
        if self.primary_closed {
            return Pull::Exhausted;
        }

        let timeout = self.timeout;
        let Self {
            primary, secondary, ..
        } = &mut *self;
        let next = tokio::time::timeout(timeout, async {
            tokio::select! {
                biased;
                Some(item) = secondary.recv() => Some(item),
                item = primary.recv() => item,
            }
        })
        .await;

        match next {
            Err(_) => Pull::Idle,
            Ok(Some(item)) => Pull::Item(item),
            Ok(None) => {
                self.primary_closed = true;
                match self.secondary.try_recv() {
                    Ok(item) => Pull::Item(item),
                    Err(_) => Pull::Exhausted,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(i: usize) -> TreeItem {
        TreeItem::leaf(i)
    }

    #[tokio::test]
    async fn reinjected_items_jump_the_queue() {
        let (tx, rx) = mpsc::channel(4);
        let mut stream = MergedStream::new(rx, Duration::from_millis(50));
        tx.send(leaf(1)).await.unwrap();
        tx.send(leaf(2)).await.unwrap();
        stream.reinjector().send(leaf(9)).unwrap();

        assert_eq!(stream.pull().await, Pull::Item(leaf(9)));
        assert_eq!(stream.pull().await, Pull::Item(leaf(1)));
        assert_eq!(stream.pull().await, Pull::Item(leaf(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_primary_times_out() {
        let (_tx, rx) = mpsc::channel(1);
        let mut stream = MergedStream::new(rx, Duration::from_millis(50));
        assert_eq!(stream.pull().await, Pull::Idle);
    }

    #[tokio::test]
    async fn exhausted_only_once_reinjections_drain() {
        let (tx, rx) = mpsc::channel(1);
        let mut stream = MergedStream::new(rx, Duration::from_millis(50));
        drop(tx);
        assert_eq!(stream.pull().await, Pull::Exhausted);

        assert!(stream.is_drained());

        stream.reinjector().send(leaf(3)).unwrap();
        assert!(!stream.is_drained());
        assert_eq!(stream.pull().await, Pull::Item(leaf(3)));
        assert_eq!(stream.pull().await, Pull::Exhausted);
    }

    #[tokio::test]
    async fn reinjection_wakes_a_waiting_pull() {
        let (_tx, rx) = mpsc::channel(1);
        let mut stream = MergedStream::new(rx, Duration::from_secs(5));
        let reinject = stream.reinjector();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            reinject.send(leaf(4)).unwrap();
        });
        assert_eq!(stream.pull().await, Pull::Item(leaf(4)));
    }
}
