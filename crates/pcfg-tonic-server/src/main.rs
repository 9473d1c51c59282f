#![doc = include_str!("../README.md")]

mod server;

use anyhow::Context;
use clap::Parser;
use pcfg::{Generator, Grammar, RuleDirectory};
use pcfg_tonic_core::proto::{FILE_DESCRIPTOR_SET, pcfg_server::PcfgServer};
use server::config::{CliArgs, ServerConfig};
use server::pool::targets::TargetSet;
use server::service::coordinator::{Coordinator, RunSettings, reap_leases};
use server::service::handler::PcfgService;
use server::telemetry::init_telemetry;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::{codec::CompressionEncoding, transport::Server};
use tonic_health::server::HealthReporter;
use tonic_reflection::server::Builder;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = ServerConfig::try_from(args)?;

    let providers = init_telemetry()?;

    let rules = RuleDirectory::open(&config.rules_dir, &config.rule_name)
        .with_context(|| format!("opening rule set {:?}", config.rule_name))?;
    let grammar = Arc::new(Grammar::load(&rules).context("loading grammar")?);
    let targets = TargetSet::load(&config.hash_file)
        .with_context(|| format!("reading {}", config.hash_file.display()))?;
    if targets.is_done() {
        anyhow::bail!("{} holds no target hashes", config.hash_file.display());
    }

    let generator = Generator::new(Arc::clone(&grammar))?;
    let structures = generator.spawn_stream(config.max_guesses, config.stream_buffer_size);

    let shutdown = CancellationToken::new();
    let coordinator = Arc::new(Coordinator::new(
        RunSettings {
            hashcat_mode: config.hashcat_mode.clone(),
            chunk: config.chunk,
        },
        grammar,
        targets,
        structures,
        shutdown.clone(),
    ));
    if let Some(lease) = config.lease_timeout {
        tokio::spawn(reap_leases(Arc::clone(&coordinator), lease));
    }

    let listener = TcpListener::bind(&config.server_addr)
        .await
        .with_context(|| format!("binding {}", config.server_addr))?;
    log_startup_info(&config);

    let (health_reporter, health_service) = tonic_health::server::health_reporter();
    health_reporter
        .set_serving::<PcfgServer<PcfgService>>()
        .await;

    let reflection = Builder::configure()
        .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
        .build_v1()?;

    let server = Server::builder()
        .http2_adaptive_window(Some(true))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_grpc()))
        .add_service(health_service)
        .add_service(reflection)
        .add_service(build_pcfg_service(PcfgService::new(Arc::clone(&coordinator))))
        .serve_with_incoming_shutdown(
            TcpListenerStream::new(listener),
            shutdown_signal(shutdown.clone(), health_reporter),
        );
    tokio::pin!(server);

    // Workers still long-polling must not hold the process open forever.
    let drain_deadline = async {
        shutdown.cancelled().await;
        tokio::time::sleep(config.shutdown_timeout).await;
    };
    tokio::select! {
        res = &mut server => res?,
        () = drain_deadline => tracing::warn!("In-flight requests did not drain in time"),
    }

    report(&coordinator);
    tracing::info!("Service shut down successfully");
    providers.shutdown();
    Ok(())
}

fn log_startup_info(config: &ServerConfig) {
    if cfg!(debug_assertions) {
        tracing::info!(
            "Starting PCFG coordinator on {} with full config: {:#?}",
            config.server_addr,
            config
        );
    } else {
        tracing::info!(
            "Starting PCFG coordinator on {} with rule set {}",
            config.server_addr,
            config.rule_name
        );
    }
}

fn build_pcfg_service(service: PcfgService) -> PcfgServer<PcfgService> {
    PcfgServer::new(service)
        .send_compressed(CompressionEncoding::Zstd)
        .send_compressed(CompressionEncoding::Gzip)
        .accept_compressed(CompressionEncoding::Zstd)
        .accept_compressed(CompressionEncoding::Gzip)
}

/// Prints every recovered `target plaintext` pair and the run time.
fn report(coordinator: &Coordinator) {
    let completed = coordinator.completed();
    for (target, plaintext) in &completed {
        println!("{target} {plaintext}");
    }
    tracing::info!(
        recovered = completed.len(),
        elapsed_secs = coordinator.elapsed().as_secs_f64(),
        "Run finished"
    );
}

/// Resolves on Ctrl+C, SIGTERM, or once the run ends on its own.
async fn shutdown_signal(shutdown: CancellationToken, health_reporter: HealthReporter) {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C signal"),
        () = terminate => tracing::info!("Received SIGTERM signal"),
        () = shutdown.cancelled() => tracing::info!("Run ended"),
    }

    tracing::info!("Shutdown signal received, terminating gracefully...");
    shutdown.cancel();

    health_reporter
        .set_not_serving::<PcfgServer<PcfgService>>()
        .await;
}
