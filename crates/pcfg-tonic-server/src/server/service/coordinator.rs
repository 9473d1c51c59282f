//! Run state shared by every RPC.
//!
//! [`Coordinator`] is the single writer of the target set, the worker
//! registry and the chunk-id counter; all three live behind one
//! `parking_lot` mutex that is never held across an `.await`. The merged
//! structure stream sits behind its own async mutex so exactly one chunk is
//! built at a time, while reclaiming a chunk only needs the reinjection
//! sender and never waits for a build to finish.
//!
//! Reclaimed structures are queued while the state lock is held, and the
//! end-of-work verdict is taken under the same lock, so no worker can be
//! told the run is exhausted while a reclaimed chunk is in flight.

use crate::server::{
    config::ChunkPolicy,
    pool::{registry::WorkerRegistry, targets::TargetSet},
    streaming::{
        chunker::{self, Chunk},
        merge::MergedStream,
    },
    telemetry,
};
use core::time::Duration;
use parking_lot::Mutex;
use pcfg::{Grammar, TreeItem};
use pcfg_tonic_core::{
    Error, Result,
    proto::{self, ConnectResponse, WorkChunk},
};
use std::{collections::HashMap, sync::Arc, time::Instant};
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
struct State {
    targets: TargetSet,
    workers: WorkerRegistry,
    next_chunk_id: u64,
}

/// Everything the coordinator needs besides the structure stream.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub hashcat_mode: String,
    pub chunk: ChunkPolicy,
}

pub struct Coordinator {
    settings: RunSettings,
    grammar: Arc<Grammar>,
    wire_grammar: proto::Grammar,
    state: Mutex<State>,
    stream: AsyncMutex<MergedStream>,
    reinject: mpsc::UnboundedSender<TreeItem>,
    shutdown: CancellationToken,
    started: Instant,
}

impl Coordinator {
    pub fn new(
        settings: RunSettings,
        grammar: Arc<Grammar>,
        targets: TargetSet,
        structures: mpsc::Receiver<TreeItem>,
        shutdown: CancellationToken,
    ) -> Self {
        let stream = MergedStream::new(structures, settings.chunk.pull_timeout);
        Self {
            wire_grammar: proto::Grammar::from(grammar.as_ref()),
            reinject: stream.reinjector(),
            stream: AsyncMutex::new(stream),
            state: Mutex::new(State {
                targets,
                workers: WorkerRegistry::default(),
                next_chunk_id: 1,
            }),
            settings,
            grammar,
            shutdown,
            started: Instant::now(),
        }
    }

    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    fn ensure_running(&self) -> Result<()> {
        if self.shutdown.is_cancelled() {
            return Err(Error::ServiceShutdown);
        }
        Ok(())
    }

    /// Queues `chunk` for reinjection. Callers hold the state lock.
    fn reclaim(&self, chunk: Chunk) {
        let count = chunk.items.len();
        for item in chunk.items {
            if self.reinject.send(item).is_err() {
                tracing::warn!(chunk = chunk.id, "Structure stream gone, dropping reclaimed work");
                return;
            }
        }
        telemetry::increment_reclaimed(count as u64);
        tracing::info!(chunk = chunk.id, structures = count, "Reclaimed unfinished chunk");
    }

    /// Registers `peer` and returns the grammar, the remaining targets and
    /// the cracking mode.
    pub fn connect(&self, peer: &str) -> Result<ConnectResponse> {
        self.ensure_running()?;
        let (hash_list, workers) = {
            let mut state = self.state.lock();
            match state.workers.register(peer) {
                Some(chunk) => self.reclaim(chunk),
                None => telemetry::worker_connected(),
            }
            (state.targets.remaining(), state.workers.len())
        };
        tracing::info!(peer, workers, "Worker connected");

        Ok(ConnectResponse {
            grammar: Some(self.wire_grammar.clone()),
            hash_list,
            hashcat_mode: self.settings.hashcat_mode.clone(),
        })
    }

    /// Unregisters `peer` and reclaims the chunk it still held. Unknown
    /// peers are ignored, so a repeated disconnect is harmless.
    pub fn disconnect(&self, peer: &str) {
        let mut state = self.state.lock();
        let removed = state.workers.remove(peer);
        match removed {
            Some(active) => {
                if let Some(chunk) = active {
                    self.reclaim(chunk);
                }
                drop(state);
                telemetry::worker_disconnected();
                tracing::info!(peer, "Worker disconnected");
            }
            None => tracing::debug!(peer, "Disconnect from unknown worker"),
        }
    }

    /// Builds and assigns the next chunk for `peer`.
    ///
    /// An empty chunk with `exhausted == false` means nothing arrived within
    /// the pull timeout, or other workers still hold chunks that may come
    /// back; the worker should ask again. `exhausted == true` is final.
    pub async fn get_next_work(&self, peer: &str) -> Result<WorkChunk> {
        self.ensure_running()?;

        let target = {
            let mut state = self.state.lock();
            if !state.workers.contains(peer) {
                return Err(Error::UnknownWorker {
                    peer: peer.to_string(),
                });
            }
            // Asking again without reporting gives the old chunk up.
            if let Some(chunk) = state.workers.take_active(peer) {
                self.reclaim(chunk);
            }
            state.workers.chunk_target(peer, &self.settings.chunk)
        };

        let build_start = Instant::now();
        let mut stream = self.stream.lock().await;
        let batch = chunker::fill(&mut stream, &self.grammar, target).await?;
        telemetry::record_chunk_build(build_start.elapsed().as_secs_f64() * 1_000.0);

        if batch.items.is_empty() {
            let exhausted = batch.exhausted && self.end_of_work(&stream);
            drop(stream);
            tracing::debug!(peer, exhausted, "No structures available");
            return Ok(WorkChunk {
                id: 0,
                items: Vec::new(),
                terminals: 0,
                exhausted,
            });
        }

        let reply = WorkChunk {
            id: 0,
            items: batch.items.iter().map(proto::TreeItem::from).collect(),
            terminals: batch.terminals,
            exhausted: false,
        };
        let assigned = {
            let mut state = self.state.lock();
            let id = state.next_chunk_id;
            state.next_chunk_id += 1;
            match state.workers.assign(peer, batch.into_chunk(id), Instant::now()) {
                Ok(()) => Some(id),
                // The worker disconnected while its chunk was being built.
                Err(chunk) => {
                    self.reclaim(chunk);
                    None
                }
            }
        };
        // Held until the chunk is recorded as active, so a concurrent
        // end-of-work verdict sees either the structures or their holder.
        drop(stream);

        match assigned {
            Some(id) => {
                telemetry::record_chunk_issued(reply.items.len() as u64, reply.terminals);
                tracing::info!(
                    peer,
                    chunk = id,
                    structures = reply.items.len(),
                    terminals = reply.terminals,
                    target,
                    "Issued chunk"
                );
                Ok(WorkChunk { id, ..reply })
            }
            None => Err(Error::UnknownWorker {
                peer: peer.to_string(),
            }),
        }
    }

    /// True once nothing can produce more work: no worker holds a chunk
    /// and the stream has neither new nor reclaimed structures left.
    fn end_of_work(&self, stream: &MergedStream) -> bool {
        let state = self.state.lock();
        !state.workers.any_active() && stream.is_drained()
    }

    /// Records recovered targets and closes `peer`'s chunk. Returns whether
    /// the run has ended.
    ///
    /// Results are accepted from any caller, including workers whose lease
    /// already expired, and after the run ended.
    pub fn submit_results(&self, peer: &str, hashes: HashMap<String, String>) -> bool {
        let reported = hashes.len();
        let (recovered, remaining, done, closed) = {
            let mut state = self.state.lock();
            let recovered = state.targets.record(hashes);
            let closed = state.workers.complete(peer, Instant::now());
            let targets = &state.targets;
            (recovered, targets.remaining_len(), targets.is_done(), closed)
        };

        telemetry::increment_hashes_cracked(recovered as u64);
        tracing::info!(
            peer,
            chunk = closed.as_ref().map(|c| c.id),
            reported,
            recovered,
            remaining,
            "Results submitted"
        );

        if done {
            if !self.shutdown.is_cancelled() {
                tracing::info!("All targets recovered, ending run");
                self.shutdown.cancel();
            }
            return true;
        }
        false
    }

    /// Treats every worker whose chunk is older than `lease` as
    /// disconnected. Returns how many were reaped.
    pub fn reap_expired(&self, lease: Duration) -> usize {
        let expired: Vec<_> = {
            let mut state = self.state.lock();
            let overdue = state.workers.overdue(Instant::now(), lease);
            overdue
                .into_iter()
                .filter(|peer| match state.workers.remove(peer) {
                    Some(active) => {
                        if let Some(chunk) = active {
                            self.reclaim(chunk);
                        }
                        true
                    }
                    None => false,
                })
                .collect()
        };

        for peer in &expired {
            telemetry::worker_disconnected();
            tracing::warn!(peer = %peer, "Worker lease expired");
        }
        expired.len()
    }

    /// Recovered `(target, plaintext)` pairs, sorted by target.
    pub fn completed(&self) -> Vec<(String, String)> {
        self.state
            .lock()
            .targets
            .completed()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// Periodically reclaims expired leases until `shutdown` fires.
pub async fn reap_leases(coordinator: Arc<Coordinator>, lease: Duration) {
    let mut interval = tokio::time::interval((lease / 2).max(Duration::from_millis(100)));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            () = coordinator.shutdown_token().cancelled() => break,
            _ = interval.tick() => {
                let reaped = coordinator.reap_expired(lease);
                if reaped > 0 {
                    tracing::info!(reaped, "Reaped expired leases");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pcfg::{Function, Mapping, Replacement, Section};

    const A: &str = "10.0.0.1:5000";
    const B: &str = "10.0.0.2:5000";

    /// One section of four single-value replacements.
    fn grammar() -> Arc<Grammar> {
        let start = Section::new(
            "START",
            "Grammar",
            vec![
                Replacement::terminal(0.4, Function::Copy, ["a"]),
                Replacement::terminal(0.3, Function::Copy, ["b"]),
                Replacement::terminal(0.2, Function::Copy, ["c"]),
                Replacement::terminal(0.1, Function::Copy, ["d"]),
            ],
        );
        Arc::new(Grammar::from_parts("r", vec![start], Mapping::default()).unwrap())
    }

    fn tree(t: usize) -> TreeItem {
        TreeItem::new(0, t, Vec::new())
    }

    fn settings(start_size: u64) -> RunSettings {
        RunSettings {
            hashcat_mode: "1000".into(),
            chunk: ChunkPolicy {
                duration: Duration::from_secs(30),
                start_size,
                pull_timeout: Duration::from_millis(20),
            },
        }
    }

    /// A coordinator fed `items` followed by a closed stream.
    fn coordinator(items: &[usize], start_size: u64) -> Coordinator {
        let (tx, rx) = mpsc::channel(items.len().max(1));
        for &t in items {
            tx.try_send(tree(t)).unwrap();
        }
        drop(tx);
        let targets: TargetSet = ["h1", "h2"].into_iter().collect();
        Coordinator::new(
            settings(start_size),
            grammar(),
            targets,
            rx,
            CancellationToken::new(),
        )
    }

    fn decode(chunk: &WorkChunk) -> Vec<TreeItem> {
        chunk
            .items
            .iter()
            .cloned()
            .map(|t| TreeItem::try_from(t).unwrap())
            .collect()
    }

    fn results(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(h, p)| ((*h).to_string(), (*p).to_string()))
            .collect()
    }

    #[tokio::test]
    async fn connect_ships_grammar_targets_and_mode() {
        let coordinator = coordinator(&[], 1);
        let response = coordinator.connect(A).unwrap();
        assert_eq!(response.hash_list, ["h1", "h2"]);
        assert_eq!(response.hashcat_mode, "1000");
        let grammar = Grammar::try_from(response.grammar.unwrap()).unwrap();
        assert_eq!(grammar.sections().len(), 1);
    }

    #[tokio::test]
    async fn chunks_follow_stream_order_with_increasing_ids() {
        let coordinator = coordinator(&[0, 1, 2, 3], 2);
        coordinator.connect(A).unwrap();

        let first = coordinator.get_next_work(A).await.unwrap();
        assert_eq!(first.id, 1);
        assert_eq!(decode(&first), [tree(0), tree(1)]);
        assert_eq!(first.terminals, 2);
        assert!(!coordinator.submit_results(A, HashMap::new()));

        let second = coordinator.get_next_work(A).await.unwrap();
        assert_eq!(second.id, 2);
        assert_eq!(decode(&second), [tree(2), tree(3)]);
    }

    #[tokio::test]
    async fn unknown_workers_must_connect_first() {
        let coordinator = coordinator(&[0], 1);
        assert!(matches!(
            coordinator.get_next_work(A).await,
            Err(Error::UnknownWorker { .. })
        ));
    }

    #[tokio::test]
    async fn disconnect_reclaims_the_unfinished_chunk() {
        let coordinator = coordinator(&[0, 1, 2, 3], 2);
        coordinator.connect(A).unwrap();
        coordinator.connect(B).unwrap();

        let lost = coordinator.get_next_work(A).await.unwrap();
        coordinator.disconnect(A);
        coordinator.disconnect(A);

        let retry = coordinator.get_next_work(B).await.unwrap();
        assert_eq!(decode(&retry), decode(&lost));
    }

    #[tokio::test]
    async fn exhaustion_waits_for_outstanding_chunks() {
        let coordinator = coordinator(&[0], 1);
        coordinator.connect(A).unwrap();
        coordinator.connect(B).unwrap();

        let held = coordinator.get_next_work(A).await.unwrap();
        assert_eq!(held.items.len(), 1);

        // A still holds a chunk that could come back.
        let empty = coordinator.get_next_work(B).await.unwrap();
        assert!(empty.items.is_empty());
        assert!(!empty.exhausted);

        coordinator.submit_results(A, HashMap::new());
        let done = coordinator.get_next_work(B).await.unwrap();
        assert!(done.items.is_empty());
        assert!(done.exhausted);
    }

    #[tokio::test]
    async fn reclaim_during_an_empty_build_is_not_end_of_work() {
        let coordinator = coordinator(&[0], 1);
        coordinator.connect(A).unwrap();
        coordinator.connect(B).unwrap();
        let held = coordinator.get_next_work(A).await.unwrap();

        // B's build finds the stream closed, then A drops out before the
        // verdict is taken.
        let mut stream = coordinator.stream.lock().await;
        let batch = chunker::fill(&mut stream, &coordinator.grammar, 1)
            .await
            .unwrap();
        assert!(batch.items.is_empty());
        assert!(batch.exhausted);
        coordinator.disconnect(A);
        assert!(!coordinator.end_of_work(&stream));
        drop(stream);

        let retry = coordinator.get_next_work(B).await.unwrap();
        assert!(!retry.exhausted);
        assert_eq!(decode(&retry), decode(&held));

        coordinator.submit_results(B, HashMap::new());
        assert!(coordinator.get_next_work(B).await.unwrap().exhausted);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_stream_yields_an_empty_retryable_chunk() {
        let (_tx, rx) = mpsc::channel(1);
        let coordinator = Coordinator::new(
            settings(1),
            grammar(),
            ["h1"].into_iter().collect(),
            rx,
            CancellationToken::new(),
        );
        coordinator.connect(A).unwrap();
        let chunk = coordinator.get_next_work(A).await.unwrap();
        assert!(chunk.items.is_empty());
        assert!(!chunk.exhausted);
    }

    #[tokio::test]
    async fn run_ends_when_every_target_is_recovered() {
        let coordinator = coordinator(&[0, 1, 2, 3], 1);
        coordinator.connect(A).unwrap();
        coordinator.get_next_work(A).await.unwrap();

        assert!(!coordinator.submit_results(A, results(&[("h1", "pw1"), ("zz", "x")])));
        assert!(coordinator.submit_results(A, results(&[("h2", "pw2")])));
        assert!(coordinator.shutdown_token().is_cancelled());

        assert!(matches!(
            coordinator.get_next_work(A).await,
            Err(Error::ServiceShutdown)
        ));
        assert!(matches!(coordinator.connect(B), Err(Error::ServiceShutdown)));
        // Late reports still see the run as ended.
        assert!(coordinator.submit_results(B, HashMap::new()));

        assert_eq!(
            coordinator.completed(),
            [
                ("h1".to_string(), "pw1".to_string()),
                ("h2".to_string(), "pw2".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn expired_leases_are_reclaimed_and_late_results_kept() {
        let coordinator = coordinator(&[0, 1], 1);
        coordinator.connect(A).unwrap();
        coordinator.connect(B).unwrap();
        let lost = coordinator.get_next_work(A).await.unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(coordinator.reap_expired(Duration::from_millis(1)), 1);
        assert!(matches!(
            coordinator.get_next_work(A).await,
            Err(Error::UnknownWorker { .. })
        ));

        let retry = coordinator.get_next_work(B).await.unwrap();
        assert_eq!(decode(&retry), decode(&lost));

        coordinator.submit_results(A, results(&[("h1", "late")]));
        assert_eq!(coordinator.completed()[0].1, "late");
    }

    #[tokio::test]
    async fn asking_again_gives_the_previous_chunk_back() {
        let coordinator = coordinator(&[0, 1], 1);
        coordinator.connect(A).unwrap();
        let first = coordinator.get_next_work(A).await.unwrap();
        let again = coordinator.get_next_work(A).await.unwrap();
        assert_eq!(decode(&again), decode(&first));
        assert_ne!(again.id, first.id);
    }
}
