use anyhow::bail;
use clap::{Args, Parser, Subcommand};
use core::time::Duration;
use std::path::PathBuf;

/// Worker and local generator for probability-ordered PCFG guesses.
///
/// Every flag can also come from the matching environment variable; a
/// `.env` file is loaded first.
#[derive(Parser, Debug)]
#[command(name = "pcfg-tonic-client", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Join a coordinator and crack the chunks it hands out.
    Work(WorkArgs),
    /// Generate guesses from a local rule set to stdout.
    Local(LocalArgs),
}

#[derive(Args, Debug, Clone)]
pub struct WorkArgs {
    /// Coordinator URI.
    ///
    /// Environment variable: `SERVER_URI`
    #[arg(long, env = "SERVER_URI", default_value_t = String::from("http://127.0.0.1:50051"))]
    pub server_uri: String,

    /// Path to the hashcat binary.
    ///
    /// Environment variable: `HASHCAT`
    #[arg(long, env = "HASHCAT", required_unless_present = "generate_only")]
    pub hashcat: Option<PathBuf>,

    /// Print guesses to stdout instead of cracking.
    ///
    /// Environment variable: `GENERATE_ONLY`
    #[arg(long, env = "GENERATE_ONLY", default_value_t = false)]
    pub generate_only: bool,

    /// Deadline for one `GetNextWork` call, which may wait on the
    /// coordinator's structure stream.
    ///
    /// Environment variable: `REQUEST_TIMEOUT_SECS`
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = 300)]
    pub request_timeout_secs: u64,

    /// Expansion threads used in generate-only mode.
    ///
    /// Environment variable: `THREADS`
    #[arg(long, env = "THREADS", default_value_t = 4)]
    pub threads: usize,

    /// Pause before asking again after an empty chunk.
    ///
    /// Environment variable: `IDLE_BACKOFF_MS`
    #[arg(long, env = "IDLE_BACKOFF_MS", default_value_t = 500)]
    pub idle_backoff_ms: u64,
}

#[derive(Args, Debug, Clone)]
pub struct LocalArgs {
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

    /// Expansion threads.
    ///
    /// Environment variable: `THREADS`
    #[arg(long, env = "THREADS", default_value_t = 4)]
    pub threads: usize,

    /// Stop after this many guesses; 0 is unlimited.
    ///
    /// Environment variable: `MAX_GUESSES`
    #[arg(long, env = "MAX_GUESSES", default_value_t = 0)]
    pub max_guesses: u64,
}

/// How a worker processes its chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    GenerateOnly { threads: usize },
    Hashcat { binary: PathBuf },
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub server_uri: String,
    pub mode: Mode,
    pub request_timeout: Duration,
    pub idle_backoff: Duration,
}

#[derive(Debug, Clone)]
pub struct LocalConfig {
    pub rules_dir: PathBuf,
    pub rule_name: String,
    pub threads: usize,
    pub max_guesses: u64,
}

impl TryFrom<WorkArgs> for WorkerConfig {
    type Error = anyhow::Error;

    fn try_from(args: WorkArgs) -> Result<Self, Self::Error> {
        if args.request_timeout_secs == 0 {
            bail!("REQUEST_TIMEOUT_SECS must be greater than 0");
        }
        let mode = if args.generate_only {
            if args.threads == 0 {
                bail!("THREADS must be greater than 0");
            }
            Mode::GenerateOnly {
                threads: args.threads,
            }
        } else {
            match args.hashcat {
                Some(binary) => Mode::Hashcat { binary },
                None => bail!("HASHCAT is required unless GENERATE_ONLY is set"),
            }
        };

        Ok(Self {
            server_uri: args.server_uri,
            mode,
            request_timeout: Duration::from_secs(args.request_timeout_secs),
            idle_backoff: Duration::from_millis(args.idle_backoff_ms),
        })
    }
}

impl TryFrom<LocalArgs> for LocalConfig {
    type Error = anyhow::Error;

    fn try_from(args: LocalArgs) -> Result<Self, Self::Error> {
        if args.threads == 0 {
            bail!("THREADS must be greater than 0");
        }
        if args.rule_name.trim().is_empty() {
            bail!("RULE_NAME must not be empty");
        }
        Ok(Self {
            rules_dir: args.rules_dir,
            rule_name: args.rule_name,
            threads: args.threads,
            max_guesses: args.max_guesses,
        })
    }
}
