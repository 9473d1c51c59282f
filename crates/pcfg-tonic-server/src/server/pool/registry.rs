use crate::server::{config::ChunkPolicy, streaming::chunker::Chunk};
use core::time::Duration;
use std::{collections::HashMap, time::Instant};

/// What the coordinator knows about one connected worker.
#[derive(Debug)]
pub struct WorkerInfo {
    pub addr: String,
    /// The chunk handed out and not yet reported back.
    pub active: Option<Chunk>,
    /// When `active` (or the last chunk) was handed out.
    pub start: Option<Instant>,
    /// When the last chunk was reported back.
    pub end: Option<Instant>,
    /// Guesses in the last completed chunk.
    pub previous_terminals: u64,
}

impl WorkerInfo {
    fn new(addr: String) -> Self {
        Self {
            addr,
            active: None,
            start: None,
            end: None,
            previous_terminals: 0,
        }
    }

    /// The last completed chunk's size and how long it took.
    fn last_measurement(&self) -> Option<(u64, Duration)> {
        match (self.start, self.end) {
            (Some(start), Some(end)) if end > start => {
                Some((self.previous_terminals, end - start))
            }
            _ => None,
        }
    }
}

/// Connected workers keyed by peer address.
#[derive(Debug, Default)]
pub struct WorkerRegistry {
    workers: HashMap<String, WorkerInfo>,
}

impl WorkerRegistry {
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn contains(&self, addr: &str) -> bool {
        self.workers.contains_key(addr)
    }

    /// Registers `addr` with fresh timing. A worker reconnecting from the
    /// same address gives back the chunk it still held.
    pub fn register(&mut self, addr: &str) -> Option<Chunk> {
        self.workers
            .insert(addr.to_string(), WorkerInfo::new(addr.to_string()))
            .and_then(|old| old.active)
    }

    /// Unregisters `addr`, returning its unfinished chunk. `None` for the
    /// outer option means the worker was not registered.
    pub fn remove(&mut self, addr: &str) -> Option<Option<Chunk>> {
        self.workers.remove(addr).map(|info| info.active)
    }

    /// Guesses to put in the next chunk for `addr`.
    pub fn chunk_target(&self, addr: &str, policy: &ChunkPolicy) -> u64 {
        policy.target(self.workers.get(addr).and_then(WorkerInfo::last_measurement))
    }

    /// Takes back the chunk `addr` still holds without unregistering it.
    pub fn take_active(&mut self, addr: &str) -> Option<Chunk> {
        self.workers.get_mut(addr).and_then(|w| w.active.take())
    }

    /// Records that `chunk` was handed to `addr` at `now`. Gives the chunk
    /// back if `addr` is no longer registered.
    pub fn assign(&mut self, addr: &str, chunk: Chunk, now: Instant) -> Result<(), Chunk> {
        match self.workers.get_mut(addr) {
            Some(worker) => {
                worker.active = Some(chunk);
                worker.start = Some(now);
                worker.end = None;
                Ok(())
            }
            None => Err(chunk),
        }
    }

    /// Closes `addr`'s active chunk at `now`, keeping its size for the next
    /// chunk target. Returns the closed chunk.
    pub fn complete(&mut self, addr: &str, now: Instant) -> Option<Chunk> {
        let worker = self.workers.get_mut(addr)?;
        let chunk = worker.active.take()?;
        worker.end = Some(now);
        worker.previous_terminals = chunk.terminals;
        Some(chunk)
    }

    /// Whether any worker holds an unfinished chunk.
    pub fn any_active(&self) -> bool {
        self.workers.values().any(|w| w.active.is_some())
    }

    /// Workers whose active chunk was handed out more than `lease` before
    /// `now`.
    pub fn overdue(&self, now: Instant, lease: Duration) -> Vec<String> {
        self.workers
            .values()
            .filter(|w| w.active.is_some())
            .filter(|w| w.start.is_some_and(|start| now.saturating_duration_since(start) > lease))
            .map(|w| w.addr.clone())
            .collect()
    }
}
