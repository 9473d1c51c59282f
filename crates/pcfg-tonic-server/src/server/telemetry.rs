//! # Telemetry Features
//!
//! Console logging through `tracing-subscriber` is always on and filtered by
//! `RUST_LOG` (default `info`). OpenTelemetry export is opt-in.
//!
//! ## Feature matrix
//!
//! - `otel-tracing`: export spans through `tracing-opentelemetry`.
//! - `otel-metrics`: export coordinator metrics (workers, chunks, guesses,
//!   reclaims, cracked hashes, chunk build time).
//! - `otlp`: OTLP/gRPC exporter. The endpoint comes from the standard
//!   `OTEL_EXPORTER_OTLP_ENDPOINT` variable.
//! - `stdout`: stdout exporter, for local inspection.
//!
//! ## Feature constraints
//!
//! - Exporters require at least one of `otel-tracing` or `otel-metrics`.
//! - `otlp` and `stdout` can be enabled together.
//!
//! ```bash
//! cargo run -p pcfg-tonic-server --features otel-tracing,otel-metrics,otlp -- --hash-file hashes.txt
//! ```

#[cfg(all(
    feature = "otlp",
    not(any(feature = "otel-tracing", feature = "otel-metrics"))
))]
compile_error!(
    "The 'otlp' feature requires at least one of 'otel-tracing' or 'otel-metrics' to be enabled."
);

#[cfg(all(
    feature = "stdout",
    not(any(feature = "otel-tracing", feature = "otel-metrics"))
))]
compile_error!(
    "The 'stdout' feature requires at least one of 'otel-tracing' or 'otel-metrics' to be enabled."
);

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[cfg(feature = "otlp")]
use opentelemetry_otlp::{Protocol, WithExportConfig};

#[cfg(feature = "otel-metrics")]
use opentelemetry::metrics::{Counter, Histogram, Meter, UpDownCounter};
#[cfg(feature = "otel-metrics")]
use opentelemetry_sdk::metrics as sdkmetrics;
#[cfg(feature = "otel-metrics")]
use std::sync::OnceLock;

#[cfg(any(feature = "otel-metrics", feature = "otel-tracing"))]
use opentelemetry::{InstrumentationScope, KeyValue};
#[cfg(any(feature = "otel-metrics", feature = "otel-tracing"))]
use opentelemetry_sdk::Resource;
#[cfg(any(feature = "otel-metrics", feature = "otel-tracing"))]
use opentelemetry_semantic_conventions as semvcns;

#[cfg(feature = "otel-tracing")]
use opentelemetry::trace::TracerProvider;
#[cfg(feature = "otel-tracing")]
use opentelemetry_sdk::propagation::TraceContextPropagator;
#[cfg(feature = "otel-tracing")]
use opentelemetry_sdk::trace as sdktrace;

pub struct TelemetryProviders {
    #[cfg(feature = "otel-tracing")]
    pub tracer_provider: sdktrace::SdkTracerProvider,
    #[cfg(feature = "otel-metrics")]
    pub meter_provider: sdkmetrics::SdkMeterProvider,
}

impl TelemetryProviders {
    /// Flushes and shuts down the exporters; errors go to stderr because
    /// the subscriber may already be gone.
    pub fn shutdown(self) {
        #[cfg(feature = "otel-tracing")]
        {
            if let Err(err) = self.tracer_provider.force_flush() {
                eprintln!("Error flushing traces: {err:#?}");
            }
            if let Err(err) = self.tracer_provider.shutdown() {
                eprintln!("Error shutting down tracer: {err:#?}");
            }
        }

        #[cfg(feature = "otel-metrics")]
        {
            if let Err(err) = self.meter_provider.force_flush() {
                eprintln!("Error flushing metrics: {err:#?}");
            }
            if let Err(err) = self.meter_provider.shutdown() {
                eprintln!("Error shutting down meter: {err:#?}");
            }
        }
    }
}

pub fn init_telemetry() -> anyhow::Result<TelemetryProviders> {
    #[cfg(feature = "otel-tracing")]
    opentelemetry::global::set_text_map_propagator(TraceContextPropagator::new());

    #[cfg(feature = "otel-tracing")]
    let tracer_provider = init_tracer()?;

    #[cfg(feature = "otel-metrics")]
    let meter_provider = init_metrics()?;

    #[cfg(any(feature = "otel-metrics", feature = "otel-tracing"))]
    let scope = InstrumentationScope::builder("pcfg")
        .with_version(env!("CARGO_PKG_VERSION"))
        .with_schema_url(semvcns::SCHEMA_URL)
        .build();

    // Human-readable console output; unrelated to the stdout exporter.
    let registry = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_thread_ids(true)
                .with_line_number(true)
                .with_target(false)
                .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339()),
        );

    #[cfg(feature = "otel-tracing")]
    let registry = {
        opentelemetry::global::set_tracer_provider(tracer_provider.clone());
        registry.with(
            tracing_opentelemetry::layer()
                .with_tracer(tracer_provider.tracer_with_scope(scope.clone()))
                .with_error_records_to_exceptions(true),
        )
    };

    #[cfg(feature = "otel-metrics")]
    let registry = {
        opentelemetry::global::set_meter_provider(meter_provider.clone());
        let meter = opentelemetry::global::meter_with_scope(scope);
        init_metric_handles(meter);

        registry.with(tracing_opentelemetry::MetricsLayer::new(
            meter_provider.clone(),
        ))
    };

    registry.init();

    Ok(TelemetryProviders {
        #[cfg(feature = "otel-tracing")]
        tracer_provider,
        #[cfg(feature = "otel-metrics")]
        meter_provider,
    })
}

#[cfg(any(feature = "otel-metrics", feature = "otel-tracing"))]
fn resource() -> Resource {
    Resource::builder()
        .with_service_name("pcfg-tonic-server")
        .with_schema_url(
            [KeyValue::new(
                semvcns::resource::SERVICE_VERSION,
                env!("CARGO_PKG_VERSION"),
            )],
            semvcns::SCHEMA_URL,
        )
        .build()
}

#[cfg(feature = "otel-metrics")]
fn init_metrics() -> anyhow::Result<sdkmetrics::SdkMeterProvider> {
    let builder = sdkmetrics::SdkMeterProvider::builder().with_resource(resource());

    #[cfg(feature = "stdout")]
    let builder = {
        let exporter = opentelemetry_stdout::MetricExporter::default();
        let reader = sdkmetrics::PeriodicReader::builder(exporter)
            .with_interval(std::time::Duration::from_secs(5))
            .build();
        builder.with_reader(reader)
    };

    #[cfg(feature = "otlp")]
    let builder = {
        use anyhow::Context;

        let exporter = opentelemetry_otlp::MetricExporter::builder()
            .with_tonic()
            .with_protocol(Protocol::Grpc)
            .with_timeout(std::time::Duration::from_secs(10))
            .build()
            .context("failed to build metrics exporter")?;
        builder.with_periodic_exporter(exporter)
    };

    Ok(builder.build())
}

#[cfg(feature = "otel-tracing")]
fn init_tracer() -> anyhow::Result<sdktrace::SdkTracerProvider> {
    let builder = sdktrace::SdkTracerProvider::builder().with_resource(resource());

    #[cfg(feature = "stdout")]
    let builder = {
        let exporter = opentelemetry_stdout::SpanExporter::default();
        let batch = sdktrace::BatchSpanProcessor::builder(exporter)
            .with_batch_config(
                sdktrace::BatchConfigBuilder::default()
                    .with_scheduled_delay(std::time::Duration::from_secs(5))
                    .with_max_queue_size(2048)
                    .build(),
            )
            .build();
        builder.with_span_processor(batch)
    };

    #[cfg(feature = "otlp")]
    let builder = {
        use anyhow::Context;

        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_protocol(Protocol::Grpc)
            .with_timeout(std::time::Duration::from_secs(10))
            .build()
            .context("failed to build tracer exporter")?;
        let batch = sdktrace::BatchSpanProcessor::builder(exporter)
            .with_batch_config(
                sdktrace::BatchConfigBuilder::default()
                    .with_scheduled_delay(std::time::Duration::from_secs(5))
                    .with_max_queue_size(2048)
                    .build(),
            )
            .build();
        builder.with_span_processor(batch)
    };

    Ok(builder.build())
}

#[cfg(feature = "otel-metrics")]
static WORKERS_CONNECTED: OnceLock<UpDownCounter<i64>> = OnceLock::new();
#[cfg(feature = "otel-metrics")]
static CHUNKS_ISSUED: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "otel-metrics")]
static PRETERMINALS_ISSUED: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "otel-metrics")]
static GUESSES_ISSUED: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "otel-metrics")]
static RECLAIMED: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "otel-metrics")]
static HASHES_CRACKED: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "otel-metrics")]
static CHUNK_BUILD_MS: OnceLock<Histogram<f64>> = OnceLock::new();

#[cfg(feature = "otel-metrics")]
fn init_metric_handles(meter: Meter) {
    let _ = WORKERS_CONNECTED.set(
        meter
            .i64_up_down_counter("workers_connected")
            .with_description("Currently connected workers")
            .build(),
    );
    let _ = CHUNKS_ISSUED.set(
        meter
            .u64_counter("chunks_issued")
            .with_description("Non-empty chunks handed to workers")
            .build(),
    );
    let _ = PRETERMINALS_ISSUED.set(
        meter
            .u64_counter("preterminals_issued")
            .with_description("Pre-terminal structures handed to workers")
            .build(),
    );
    let _ = GUESSES_ISSUED.set(
        meter
            .u64_counter("guesses_issued")
            .with_description("Guesses the issued structures expand into")
            .build(),
    );
    let _ = RECLAIMED.set(
        meter
            .u64_counter("structures_reclaimed")
            .with_description("Structures re-queued from disconnected or expired workers")
            .build(),
    );
    let _ = HASHES_CRACKED.set(
        meter
            .u64_counter("hashes_cracked")
            .with_description("Targets recovered")
            .build(),
    );
    let _ = CHUNK_BUILD_MS.set(
        meter
            .f64_histogram("chunk_build_duration")
            .with_unit("ms")
            .with_description("Time spent filling a chunk from the structure stream")
            .build(),
    );
}

// Convenience functions that compile to no-ops when metrics are disabled
#[cfg(feature = "otel-metrics")]
pub fn worker_connected() {
    if let Some(counter) = WORKERS_CONNECTED.get() {
        counter.add(1, &[]);
    }
}

#[cfg(not(feature = "otel-metrics"))]
pub fn worker_connected() {}

#[cfg(feature = "otel-metrics")]
pub fn worker_disconnected() {
    if let Some(counter) = WORKERS_CONNECTED.get() {
        counter.add(-1, &[]);
    }
}

#[cfg(not(feature = "otel-metrics"))]
pub fn worker_disconnected() {}

#[cfg(feature = "otel-metrics")]
pub fn record_chunk_issued(structures: u64, guesses: u64) {
    if let Some(counter) = CHUNKS_ISSUED.get() {
        counter.add(1, &[]);
    }
    if let Some(counter) = PRETERMINALS_ISSUED.get() {
        counter.add(structures, &[]);
    }
    if let Some(counter) = GUESSES_ISSUED.get() {
        counter.add(guesses, &[]);
    }
}

#[cfg(not(feature = "otel-metrics"))]
pub fn record_chunk_issued(_structures: u64, _guesses: u64) {}

#[cfg(feature = "otel-metrics")]
pub fn increment_reclaimed(count: u64) {
    if let Some(counter) = RECLAIMED.get() {
        counter.add(count, &[]);
    }
}

#[cfg(not(feature = "otel-metrics"))]
pub fn increment_reclaimed(_count: u64) {}

#[cfg(feature = "otel-metrics")]
pub fn increment_hashes_cracked(count: u64) {
    if let Some(counter) = HASHES_CRACKED.get() {
        counter.add(count, &[]);
    }
}

#[cfg(not(feature = "otel-metrics"))]
pub fn increment_hashes_cracked(_count: u64) {}

#[cfg(feature = "otel-metrics")]
pub fn record_chunk_build(duration_ms: f64) {
    if let Some(histogram) = CHUNK_BUILD_MS.get() {
        histogram.record(duration_ms, &[]);
    }
}

#[cfg(not(feature = "otel-metrics"))]
pub fn record_chunk_build(_duration_ms: f64) {}
