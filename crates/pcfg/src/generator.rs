use crate::{Error, Grammar, GuessGenerator, PcfgQueue, Result, TreeItem};
use core::sync::atomic::Ordering;
use portable_atomic::AtomicU64;
use std::{io::Write, sync::Arc, thread};
#[cfg(feature = "tracing")]
use tracing::instrument;

/// Knobs for [`Generator::run`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GenerateOptions {
    /// Number of expansion threads; at least one is always started.
    pub workers: usize,
    /// Stop once this many guesses were produced; `0` means no limit.
    pub max_guesses: u64,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            workers: 1,
            max_guesses: 0,
        }
    }
}

/// Drives a [`PcfgQueue`] and keeps a running count of produced guesses.
///
/// The queue itself is single-threaded. [`Generator::run`] pops structures
/// on the calling thread and hands them to a pool of expansion threads;
/// [`Generator::spawn_stream`] moves the queue onto a dedicated producer
/// thread and exposes the structures as an ordered channel.
#[derive(Debug)]
pub struct Generator {
    grammar: Arc<Grammar>,
    queue: PcfgQueue,
    generated: Arc<AtomicU64>,
}

impl Generator {
    pub fn new(grammar: Arc<Grammar>) -> Result<Self> {
        Ok(Self {
            queue: PcfgQueue::new(Arc::clone(&grammar))?,
            grammar,
            generated: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn grammar(&self) -> &Arc<Grammar> {
        &self.grammar
    }

    /// Guesses produced so far.
    pub fn generated(&self) -> u64 {
        self.generated.load(Ordering::Relaxed)
    }

    /// A shared handle to the guess counter, readable after the generator
    /// moved onto another thread.
    pub fn counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.generated)
    }

    /// Expands structures in probability order with `options.workers`
    /// threads, each writing to the sink `make_sink` creates for it.
    ///
    /// Returns once the queue is exhausted or `options.max_guesses` is
    /// reached. Structures already handed out are always finished, so the
    /// limit can be overshot by up to one structure per worker. Guesses of
    /// different structures may interleave across sinks.
    ///
    /// # Errors
    ///
    /// - [`Error::Sink`] if a sink fails; remaining workers keep draining.
    /// - [`Error::IndexOutOfRange`] if the engine reports an inconsistent tree.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self, make_sink)))]
    pub fn run<W, F>(&mut self, options: &GenerateOptions, make_sink: F) -> Result<u64>
    where
        W: Write,
        F: Fn(usize) -> W + Sync,
    {
        let queue = &mut self.queue;
        let max_guesses = options.max_guesses;
        expand_pool(
            &self.grammar,
            options.workers,
            &self.generated,
            &make_sink,
            |tx, generated| produce(queue, tx, generated, max_guesses),
        )?;

        #[cfg(feature = "tracing")]
        tracing::info!(generated = self.generated(), "Generation finished");
        Ok(self.generated())
    }

    /// Moves the engine onto a producer thread and streams terminal
    /// structures, in probability order, through a bounded channel.
    ///
    /// Each structure's guess count is added to the counter as it is
    /// queued, so `max_guesses` bounds the stream just like a local run.
    /// The producer stops when the queue is exhausted, the limit is
    /// reached, the engine fails, or the receiver is dropped; in every case
    /// the channel then closes.
    #[cfg(feature = "async-tokio")]
    pub fn spawn_stream(
        mut self,
        max_guesses: u64,
        capacity: usize,
    ) -> tokio::sync::mpsc::Receiver<TreeItem> {
        let (tx, rx) = tokio::sync::mpsc::channel(capacity.max(1));
        thread::spawn(move || {
            if let Err(_e) = self.stream_into(&tx, max_guesses) {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %_e, "Structure stream stopped early");
            }
        });
        rx
    }

    #[cfg(feature = "async-tokio")]
    fn stream_into(
        &mut self,
        tx: &tokio::sync::mpsc::Sender<TreeItem>,
        max_guesses: u64,
    ) -> Result<()> {
        while !limit_reached(&self.generated, max_guesses) {
            let Some(item) = self.queue.next()? else {
                #[cfg(feature = "tracing")]
                tracing::info!(generated = self.generated(), "Structure queue exhausted");
                return Ok(());
            };
            let count = GuessGenerator::new(&self.grammar, &item.tree)?.guess_count();
            if tx.blocking_send(item.tree).is_err() {
                return Ok(());
            }
            self.generated.fetch_add(count, Ordering::Relaxed);
        }
        #[cfg(feature = "tracing")]
        tracing::info!(max_guesses, "Guess limit reached");
        Ok(())
    }
}

/// Expands an already chosen set of structures with `workers` threads, in
/// the order given, and returns the number of guesses written.
///
/// This is the worker side of a distributed run: the structures come from
/// a coordinator instead of a local queue.
#[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all, fields(items = items.len())))]
pub fn expand_all<W, F>(
    grammar: &Grammar,
    items: Vec<TreeItem>,
    workers: usize,
    make_sink: F,
) -> Result<u64>
where
    W: Write,
    F: Fn(usize) -> W + Sync,
{
    let generated = AtomicU64::new(0);
    expand_pool(grammar, workers, &generated, &make_sink, |tx, _| {
        for tree in items {
            if tx.send(tree).is_err() {
                break;
            }
        }
        Ok(())
    })?;
    Ok(generated.load(Ordering::Relaxed))
}

/// Runs `feed` on the calling thread while `workers` scoped threads expand
/// whatever it sends. The first error wins; a worker panic is resumed.
fn expand_pool<W, F, P>(
    grammar: &Grammar,
    workers: usize,
    generated: &AtomicU64,
    make_sink: &F,
    feed: P,
) -> Result<()>
where
    W: Write,
    F: Fn(usize) -> W + Sync,
    P: FnOnce(&crossbeam_channel::Sender<TreeItem>, &AtomicU64) -> Result<()>,
{
    let workers = workers.max(1);
    let (tx, rx) = crossbeam_channel::bounded::<TreeItem>(workers);

    thread::scope(|s| {
        let handles: Vec<_> = (0..workers)
            .map(|id| {
                let rx = rx.clone();
                s.spawn(move || -> Result<()> {
                    let mut sink = make_sink(id);
                    for tree in rx {
                        let written = GuessGenerator::new(grammar, &tree)?
                            .write_to(&mut sink)
                            .map_err(Error::Sink)?;
                        generated.fetch_add(written, Ordering::Relaxed);
                    }
                    sink.flush().map_err(Error::Sink)
                })
            })
            .collect();
        drop(rx);

        let mut result = feed(&tx, generated);
        drop(tx);

        for handle in handles {
            match handle.join() {
                Ok(outcome) => {
                    if result.is_ok() {
                        result = outcome;
                    }
                }
                Err(panic) => std::panic::resume_unwind(panic),
            }
        }
        result
    })
}

fn produce(
    queue: &mut PcfgQueue,
    tx: &crossbeam_channel::Sender<TreeItem>,
    generated: &AtomicU64,
    max_guesses: u64,
) -> Result<()> {
    loop {
        if limit_reached(generated, max_guesses) {
            #[cfg(feature = "tracing")]
            tracing::info!(max_guesses, "Guess limit reached");
            return Ok(());
        }
        let Some(item) = queue.next()? else {
            return Ok(());
        };
        // Every worker is gone; their errors surface on join.
        if tx.send(item.tree).is_err() {
            return Ok(());
        }
    }
}

fn limit_reached(generated: &AtomicU64, max_guesses: u64) -> bool {
    max_guesses > 0 && generated.load(Ordering::Relaxed) >= max_guesses
}
