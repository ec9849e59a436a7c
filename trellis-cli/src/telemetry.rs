use std::convert::Infallible;
use std::fs::{self, OpenOptions};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::OnceLock;

use anyhow::{Context, Result};
use hyper::body::Body;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Request, Response, StatusCode};
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use trellis_session::PipelineReport;

static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Install the global tracing subscriber with optional JSON file logging.
pub fn init_tracing(filter: &str, log_path: Option<&Path>) -> Result<()> {
    if let Some(path) = log_path {
        let stdout_layer = fmt::layer()
            .with_target(false)
            .with_filter(EnvFilter::new(filter));
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create log directory {dir:?}"))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open log file {}", path.display()))?;
        let (writer, guard) = tracing_appender::non_blocking(file);
        let _ = FILE_GUARD.set(guard);
        let file_layer = fmt::layer()
            .json()
            .with_ansi(false)
            .with_target(true)
            .with_writer(writer)
            .with_filter(EnvFilter::new(filter));
        tracing_subscriber::registry()
            .with(stdout_layer)
            .with(file_layer)
            .try_init()?;
    } else {
        let stdout_layer = fmt::layer()
            .with_target(false)
            .with_filter(EnvFilter::new(filter));
        tracing_subscriber::registry()
            .with(stdout_layer)
            .try_init()?;
    }

    Ok(())
}

/// Prometheus metrics collected over a session run.
pub struct SessionMetrics {
    registry: Registry,
    events_routed: IntCounter,
    events_dropped: IntCounter,
    events_consumed: IntCounter,
    consumer_failures: IntCounter,
    universe_symbols: IntGauge,
    shard_count: IntGauge,
}

impl SessionMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();
        let events_routed =
            IntCounter::new("trellis_events_routed_total", "Events routed to shard queues")
                .unwrap();
        let events_dropped = IntCounter::new(
            "trellis_events_dropped_total",
            "Events dropped as unroutable or over full queues",
        )
        .unwrap();
        let events_consumed = IntCounter::new(
            "trellis_events_consumed_total",
            "Events handled successfully by consumers",
        )
        .unwrap();
        let consumer_failures = IntCounter::new(
            "trellis_consumer_failures_total",
            "Consumer handler errors absorbed by the pipeline",
        )
        .unwrap();
        let universe_symbols = IntGauge::new(
            "trellis_universe_symbols",
            "Symbols in the final trading universe",
        )
        .unwrap();
        let shard_count =
            IntGauge::new("trellis_shard_count", "Shards in the current session plan").unwrap();

        registry.register(Box::new(events_routed.clone())).unwrap();
        registry.register(Box::new(events_dropped.clone())).unwrap();
        registry
            .register(Box::new(events_consumed.clone()))
            .unwrap();
        registry
            .register(Box::new(consumer_failures.clone()))
            .unwrap();
        registry
            .register(Box::new(universe_symbols.clone()))
            .unwrap();
        registry.register(Box::new(shard_count.clone())).unwrap();

        Self {
            registry,
            events_routed,
            events_dropped,
            events_consumed,
            consumer_failures,
            universe_symbols,
            shard_count,
        }
    }

    pub fn registry(&self) -> Registry {
        self.registry.clone()
    }

    /// Fold a finished run's report into the exported counters and gauges.
    pub fn record_report(&self, report: &PipelineReport) {
        self.events_routed.inc_by(report.events_routed);
        self.events_dropped.inc_by(report.events_dropped);
        self.events_consumed.inc_by(report.events_consumed);
        self.consumer_failures.inc_by(report.consumer_failures);
        self.shard_count.set(report.shard_count as i64);
        self.universe_symbols.set(report.universe_symbols as i64);
    }
}

impl Default for SessionMetrics {
    fn default() -> Self {
        Self::new()
    }
}


/// Launch a lightweight HTTP server that exposes Prometheus metrics.
pub fn spawn_metrics_server(registry: Registry, addr: SocketAddr) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let make_svc = make_service_fn(move |_| {
            let registry = registry.clone();
            async move {
                Ok::<_, Infallible>(service_fn(move |_req: Request<Body>| {
                    let registry = registry.clone();
                    async move {
                        let encoder = TextEncoder::new();
                        let metric_families = registry.gather();
                        let mut buffer = Vec::new();
                        if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
                            error!(error = %err, "failed to encode Prometheus metrics");
                            return Ok::<_, Infallible>(
                                Response::builder()
                                    .status(StatusCode::INTERNAL_SERVER_ERROR)
                                    .body(Body::from("failed to encode metrics"))
                                    .unwrap(),
                            );
                        }
                        Ok::<_, Infallible>(
                            Response::builder()
                                .status(StatusCode::OK)
                                .header("Content-Type", encoder.format_type())
                                .body(Body::from(buffer))
                                .unwrap(),
                        )
                    }
                }))
            }
        });

        if let Err(err) = hyper::Server::bind(&addr).serve(make_svc).await {
            error!(error = %err, %addr, "metrics server terminated");
        } else {
            info!(%addr, "metrics server shutdown");
        }
    })
}
