#![doc = include_str!("../README.md")]

mod client;

use clap::Parser;
use client::config::{Cli, Command, LocalConfig, WorkerConfig};
use client::telemetry::init_logging;
use client::worker::Stop;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_logging();

    match cli.command {
        Command::Work(args) => {
            let config = WorkerConfig::try_from(args)?;
            tracing::info!("Starting worker against {}", config.server_uri);
            match client::worker::run(config).await? {
                Stop::RunEnded => tracing::info!("Run ended"),
                Stop::Exhausted => tracing::info!("Search space exhausted"),
                Stop::Interrupted => tracing::info!("Interrupted"),
            }
            Ok(())
        }
        Command::Local(args) => {
            let config = LocalConfig::try_from(args)?;
            tokio::task::spawn_blocking(move || client::local::run(config)).await?
        }
    }
}
