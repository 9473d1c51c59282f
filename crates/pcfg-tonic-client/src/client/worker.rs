//! One worker session against a coordinator.
//!
//! The coordinator identifies workers by connection, so the whole session
//! runs over a single channel: connect, then fetch, process and submit
//! chunks until the run ends, then disconnect.

use super::{
    config::{Mode, WorkerConfig},
    engine::Hashcat,
    local::StdoutSink,
};
use anyhow::Context;
use core::time::Duration;
use pcfg::{Grammar, TreeItem};
use pcfg_tonic_core::proto::{CrackingResults, Empty, WorkChunk, pcfg_client::PcfgClient};
use std::{collections::HashMap, sync::Arc, time::Instant};
use tokio_util::sync::CancellationToken;
use tonic::{
    Code, Request,
    codec::CompressionEncoding,
    transport::{Channel, Endpoint},
};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Why a session ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stop {
    /// Every target was recovered.
    RunEnded,
    /// The coordinator has no structures left.
    Exhausted,
    /// Ctrl+C.
    Interrupted,
}

/// What to do with a chunk once it arrives.
#[derive(Debug)]
enum Processor {
    GenerateOnly { threads: usize },
    Hashcat(Hashcat),
}

impl Processor {
    async fn process(
        &self,
        grammar: &Arc<Grammar>,
        items: Vec<TreeItem>,
    ) -> anyhow::Result<HashMap<String, String>> {
        let grammar = Arc::clone(grammar);
        match self {
            Self::GenerateOnly { threads } => {
                let threads = *threads;
                tokio::task::spawn_blocking(move || {
                    pcfg::expand_all(&grammar, items, threads, |_| StdoutSink::default())
                })
                .await??;
                Ok(HashMap::new())
            }
            Self::Hashcat(engine) => {
                let engine = engine.clone();
                let results =
                    tokio::task::spawn_blocking(move || engine.crack(&grammar, &items)).await??;
                Ok(results)
            }
        }
    }
}

type Client = PcfgClient<Channel>;

/// How the loop reacts to a failed work request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Recovery {
    /// The coordinator has stopped serving.
    RunEnded,
    /// The coordinator dropped this worker, e.g. after its lease expired.
    Reconnect,
    Fail,
}

impl From<Code> for Recovery {
    fn from(code: Code) -> Self {
        match code {
            Code::Unavailable => Self::RunEnded,
            Code::NotFound => Self::Reconnect,
            _ => Self::Fail,
        }
    }
}

fn request(timeout: Duration) -> Request<Empty> {
    let mut req = Request::new(Empty {});
    req.set_timeout(timeout);
    req
}

/// Runs one session. Returns once the run ends, the coordinator runs out of
/// work or the user interrupts; transport and engine failures are errors.
/// The coordinator is told about the disconnect in every case it can still
/// be reached.
pub async fn run(config: WorkerConfig) -> anyhow::Result<Stop> {
    let channel = Endpoint::from_shared(config.server_uri.clone())?
        .connect_timeout(CONNECT_TIMEOUT)
        .connect()
        .await
        .with_context(|| format!("connecting to {}", config.server_uri))?;
    let mut client = PcfgClient::new(channel)
        .send_compressed(CompressionEncoding::Zstd)
        .accept_compressed(CompressionEncoding::Zstd)
        .accept_compressed(CompressionEncoding::Gzip)
        .max_decoding_message_size(usize::MAX);

    let session = client
        .connect(request(CONNECT_TIMEOUT))
        .await
        .context("registering with the coordinator")?
        .into_inner();
    let grammar = Arc::new(Grammar::try_from(
        session
            .grammar
            .context("coordinator sent no grammar")?,
    )?);
    tracing::info!(
        rule_name = grammar.rule_name(),
        targets = session.hash_list.len(),
        mode = %session.hashcat_mode,
        "Connected"
    );

    // Removed with everything in it when the session ends.
    let workdir = tempfile::Builder::new().prefix("pcfg-").tempdir()?;
    let hash_file = workdir.path().join("targets.hash");
    std::fs::write(&hash_file, session.hash_list.join("\n"))?;

    let processor = match config.mode.clone() {
        Mode::GenerateOnly { threads } => Processor::GenerateOnly { threads },
        Mode::Hashcat { binary } => Processor::Hashcat(Hashcat::new(
            binary,
            session.hashcat_mode,
            hash_file,
            workdir.path().join("results.txt"),
        )),
    };

    let stop = CancellationToken::new();
    let interrupt = tokio::spawn({
        let stop = stop.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Received Ctrl+C, finishing the current chunk");
                stop.cancel();
            }
        }
    });

    let outcome = work_loop(&mut client, &grammar, &processor, &config, &stop).await;
    interrupt.abort();

    if let Err(status) = client.disconnect(request(DISCONNECT_TIMEOUT)).await {
        tracing::warn!(code = ?status.code(), "Disconnect failed: {}", status.message());
    }
    outcome
}

async fn work_loop(
    client: &mut Client,
    grammar: &Arc<Grammar>,
    processor: &Processor,
    config: &WorkerConfig,
    stop: &CancellationToken,
) -> anyhow::Result<Stop> {
    loop {
        let chunk = tokio::select! {
            () = stop.cancelled() => return Ok(Stop::Interrupted),
            reply = client.get_next_work(request(config.request_timeout)) => match reply {
                Ok(reply) => reply.into_inner(),
                Err(status) => match Recovery::from(status.code()) {
                    Recovery::RunEnded => return Ok(Stop::RunEnded),
                    Recovery::Reconnect => {
                        tracing::warn!("Coordinator dropped this worker, reconnecting");
                        client
                            .connect(request(CONNECT_TIMEOUT))
                            .await
                            .context("re-registering with the coordinator")?;
                        continue;
                    }
                    Recovery::Fail => return Err(status).context("requesting work"),
                },
            },
        };

        if chunk.items.is_empty() {
            if chunk.exhausted {
                tracing::info!("Coordinator has no more work");
                return Ok(Stop::Exhausted);
            }
            tracing::debug!("No work available yet");
            tokio::select! {
                () = stop.cancelled() => return Ok(Stop::Interrupted),
                () = tokio::time::sleep(config.idle_backoff) => continue,
            }
        }

        let (id, terminals) = (chunk.id, chunk.terminals);
        let items = decode(grammar, chunk)?;
        let started = Instant::now();
        let hashes = processor
            .process(grammar, items)
            .await
            .with_context(|| format!("processing chunk {id}"))?;
        tracing::info!(
            chunk = id,
            terminals,
            cracked = hashes.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Chunk done"
        );

        let ack = client
            .submit_results(CrackingResults { hashes })
            .await
            .context("submitting results")?
            .into_inner();
        if ack.run_ended {
            tracing::info!("All targets recovered");
            return Ok(Stop::RunEnded);
        }
        if stop.is_cancelled() {
            return Ok(Stop::Interrupted);
        }
    }
}

/// Converts a chunk's structures and checks each one against the grammar
/// before anything is expanded.
fn decode(grammar: &Grammar, chunk: WorkChunk) -> anyhow::Result<Vec<TreeItem>> {
    chunk
        .items
        .into_iter()
        .map(|item| {
            let tree = TreeItem::try_from(item)?;
            grammar.validate_tree(&tree)?;
            Ok(tree)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pcfg::{Function, Mapping, Replacement, Section};
    use pcfg_tonic_core::proto;

    fn grammar() -> Grammar {
        let start = Section::new(
            "START",
            "Grammar",
            vec![Replacement::terminal(1.0, Function::Copy, ["only"])],
        );
        Grammar::from_parts("r", vec![start], Mapping::default()).unwrap()
    }

    fn chunk(items: Vec<TreeItem>) -> WorkChunk {
        WorkChunk {
            id: 1,
            items: items.iter().map(proto::TreeItem::from).collect(),
            terminals: items.len() as u64,
            exhausted: false,
        }
    }

    #[test]
    fn decode_keeps_valid_structures() {
        let trees = decode(&grammar(), chunk(vec![TreeItem::leaf(0)])).unwrap();
        assert_eq!(trees, [TreeItem::leaf(0)]);
    }

    #[test]
    fn decode_rejects_structures_outside_the_grammar() {
        assert!(decode(&grammar(), chunk(vec![TreeItem::new(0, 4, Vec::new())])).is_err());
        assert!(decode(&grammar(), chunk(vec![TreeItem::leaf(2)])).is_err());
    }

    #[test]
    fn dropped_workers_reconnect_and_shutdown_ends_the_session() {
        assert_eq!(Recovery::from(Code::NotFound), Recovery::Reconnect);
        assert_eq!(Recovery::from(Code::Unavailable), Recovery::RunEnded);
        assert_eq!(Recovery::from(Code::InvalidArgument), Recovery::Fail);
        assert_eq!(Recovery::from(Code::DeadlineExceeded), Recovery::Fail);
    }

    #[tokio::test]
    async fn generate_only_reports_no_results() {
        let processor = Processor::GenerateOnly { threads: 2 };
        let results = processor
            .process(&Arc::new(grammar()), vec![TreeItem::leaf(0)])
            .await
            .unwrap();
        assert!(results.is_empty());
    }
}
