use anyhow::bail;
use clap::Parser;
use core::time::Duration;
use std::path::PathBuf;

/// Runtime configuration for the `pcfg-tonic-server` coordinator.
///
/// Every value can come from a CLI flag or the matching environment variable
/// (a `.env` file is loaded first). Chunk sizes are in guesses, not
/// structures: a chunk is filled until the guesses its structures expand
/// into reach the target.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "pcfg-tonic-server",
    version,
    about = "Coordinates workers cracking a target list with probability-ordered PCFG guesses"
)]
pub struct CliArgs {
    /// Address to listen on.
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:50051"))]
    pub server_addr: String,

    /// Directory holding one sub-directory per rule set.
    ///
    /// Environment variable: `RULES_DIR`
    #[arg(long, env = "RULES_DIR", default_value = "Rules")]
    pub rules_dir: PathBuf,

    /// Rule set to load from `rules_dir`.
    ///
    /// Environment variable: `RULE_NAME`
    #[arg(long, env = "RULE_NAME", default_value_t = String::from("Default"))]
    pub rule_name: String,

    /// File with one target hash per line.
    ///
    /// Environment variable: `HASH_FILE`
    #[arg(long, env = "HASH_FILE")]
    pub hash_file: PathBuf,

    /// Cracking mode identifier forwarded to workers (hashcat `-m`).
    ///
    /// Environment variable: `HASHCAT_MODE`
    #[arg(long, env = "HASHCAT_MODE", default_value_t = String::from("0"))]
    pub hashcat_mode: String,

    /// Stop producing structures after this many guesses; 0 is unlimited.
    ///
    /// Environment variable: `MAX_GUESSES`
    #[arg(long, env = "MAX_GUESSES", default_value_t = 0)]
    pub max_guesses: u64,

    /// Wall time a worker should spend on one chunk. Chunk sizes adapt to
    /// each worker's observed rate to hit this target.
    ///
    /// Environment variable: `CHUNK_DURATION_SECS`
    #[arg(long, env = "CHUNK_DURATION_SECS", default_value_t = 30)]
    pub chunk_duration_secs: u64,

    /// Guesses in a worker's first chunk, before its rate is known.
    ///
    /// Environment variable: `CHUNK_START_SIZE`
    #[arg(long, env = "CHUNK_START_SIZE", default_value_t = 10_000)]
    pub chunk_start_size: u64,

    /// How long building a chunk waits on an idle structure stream before
    /// returning what it has.
    ///
    /// Environment variable: `PULL_TIMEOUT_MS`
    #[arg(long, env = "PULL_TIMEOUT_MS", default_value_t = 2_000)]
    pub pull_timeout_ms: u64,

    /// Structures buffered between the enumeration thread and the
    /// coordinator.
    ///
    /// Environment variable: `STREAM_BUFFER_SIZE`
    #[arg(long, env = "STREAM_BUFFER_SIZE", default_value_t = 100)]
    pub stream_buffer_size: usize,

    /// Reclaim a chunk whose worker has not reported back within this many
    /// seconds; 0 disables lease reaping.
    ///
    /// Environment variable: `LEASE_TIMEOUT_SECS`
    #[arg(long, env = "LEASE_TIMEOUT_SECS", default_value_t = 0)]
    pub lease_timeout_secs: u64,

    /// Seconds to let in-flight requests drain once shutdown starts.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT`
    #[arg(long, env = "SHUTDOWN_TIMEOUT", default_value_t = 3)]
    pub shutdown_timeout: u64,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub server_addr: String,
    pub rules_dir: PathBuf,
    pub rule_name: String,
    pub hash_file: PathBuf,
    pub hashcat_mode: String,
    pub max_guesses: u64,
    pub chunk: ChunkPolicy,
    pub stream_buffer_size: usize,
    pub lease_timeout: Option<Duration>,
    pub shutdown_timeout: Duration,
}

/// How large a chunk to hand out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPolicy {
    pub duration: Duration,
    pub start_size: u64,
    pub pull_timeout: Duration,
}

impl ChunkPolicy {
    /// Target guesses for a worker that finished `previous` guesses in
    /// `elapsed`, scaled to `self.duration`. Without a usable measurement the
    /// start size is used.
    pub fn target(&self, previous: Option<(u64, Duration)>) -> u64 {
        match previous {
            Some((terminals, elapsed)) if terminals > 0 && !elapsed.is_zero() => {
                let rate = terminals as f64 / elapsed.as_secs_f64();
                ((rate * self.duration.as_secs_f64()) as u64).max(1)
            }
            _ => self.start_size,
        }
    }
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.chunk_duration_secs == 0 {
            bail!("CHUNK_DURATION_SECS must be greater than 0");
        }
        if args.chunk_start_size == 0 {
            bail!("CHUNK_START_SIZE must be greater than 0");
        }
        if args.pull_timeout_ms == 0 {
            bail!("PULL_TIMEOUT_MS must be greater than 0");
        }
        if args.stream_buffer_size == 0 {
            bail!("STREAM_BUFFER_SIZE must be greater than 0");
        }
        if args.rule_name.trim().is_empty() {
            bail!("RULE_NAME must not be empty");
        }

        Ok(Self {
            server_addr: args.server_addr,
            rules_dir: args.rules_dir,
            rule_name: args.rule_name,
            hash_file: args.hash_file,
            hashcat_mode: args.hashcat_mode,
            max_guesses: args.max_guesses,
            chunk: ChunkPolicy {
                duration: Duration::from_secs(args.chunk_duration_secs),
                start_size: args.chunk_start_size,
                pull_timeout: Duration::from_millis(args.pull_timeout_ms),
            },
            stream_buffer_size: args.stream_buffer_size,
            lease_timeout: (args.lease_timeout_secs > 0)
                .then(|| Duration::from_secs(args.lease_timeout_secs)),
            shutdown_timeout: Duration::from_secs(args.shutdown_timeout),
        })
    }
}
