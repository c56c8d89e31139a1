use std::convert::Infallible;
use std::fs::{self, OpenOptions};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::OnceLock;

use anyhow::{Context, Result};
use hyper::body::Body;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Request, Response, StatusCode};
use prometheus::{Encoder, Gauge, IntCounter, Registry, TextEncoder};
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Install the global tracing subscriber with optional JSON file logging.
///
/// The full-screen dashboard owns the terminal, so it sets `quiet_stdout`
/// to drop the stdout layer and keep only the file sink.
pub fn init_tracing(filter: &str, log_path: Option<&Path>, quiet_stdout: bool) -> Result<()> {
    let stdout_layer = if quiet_stdout {
        None
    } else {
        Some(
            fmt::layer()
                .with_target(false)
                .with_filter(EnvFilter::new(filter)),
        )
    };

    let file_layer = match log_path {
        Some(path) => {
            if let Some(dir) = path.parent() {
                if !dir.as_os_str().is_empty() {
                    fs::create_dir_all(dir)
                        .with_context(|| format!("failed to create log directory {dir:?}"))?;
                }
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            let _ = FILE_GUARD.set(guard);
            Some(
                fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_target(true)
                    .with_writer(writer)
                    .with_filter(EnvFilter::new(filter)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(stdout_layer)
        .with(file_layer)
        .try_init()?;

    Ok(())
}

/// Prometheus metrics collected while the monitor is attached to the bot.
pub struct DashboardMetrics {
    registry: Registry,
    stream_connected: Gauge,
    snapshots_total: IntCounter,
    discarded_payloads: IntCounter,
    stream_reconnects: IntCounter,
    open_positions: Gauge,
    last_snapshot_timestamp: Gauge,
}

impl DashboardMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();
        let stream_connected = Gauge::new(
            "gantry_stream_connected",
            "Bot push-stream connectivity (1=connected, 0=down)",
        )
        .unwrap();
        let snapshots_total = IntCounter::new(
            "gantry_snapshots_total",
            "Push snapshots applied to the dashboard state",
        )
        .unwrap();
        let discarded_payloads = IntCounter::new(
            "gantry_discarded_payloads_total",
            "Malformed stream payloads dropped without touching state",
        )
        .unwrap();
        let stream_reconnects = IntCounter::new(
            "gantry_stream_reconnects_total",
            "Times the push stream came back after a drop",
        )
        .unwrap();
        let open_positions = Gauge::new(
            "gantry_open_positions",
            "Open positions in the latest snapshot",
        )
        .unwrap();
        let last_snapshot_timestamp = Gauge::new(
            "gantry_last_snapshot_timestamp_seconds",
            "Unix timestamp of the last accepted snapshot",
        )
        .unwrap();

        registry.register(Box::new(stream_connected.clone())).unwrap();
        registry.register(Box::new(snapshots_total.clone())).unwrap();
        registry
            .register(Box::new(discarded_payloads.clone()))
            .unwrap();
        registry
            .register(Box::new(stream_reconnects.clone()))
            .unwrap();
        registry.register(Box::new(open_positions.clone())).unwrap();
        registry
            .register(Box::new(last_snapshot_timestamp.clone()))
            .unwrap();

        Self {
            registry,
            stream_connected,
            snapshots_total,
            discarded_payloads,
            stream_reconnects,
            open_positions,
            last_snapshot_timestamp,
        }
    }

    pub fn registry(&self) -> Registry {
        self.registry.clone()
    }

    pub fn update_stream_status(&self, connected: bool) {
        let value = if connected { 1.0 } else { 0.0 };
        self.stream_connected.set(value);
    }

    pub fn inc_snapshots(&self, count: u64) {
        self.snapshots_total.inc_by(count);
    }

    pub fn inc_discarded(&self, count: u64) {
        self.discarded_payloads.inc_by(count);
    }

    pub fn inc_stream_reconnect(&self) {
        self.stream_reconnects.inc();
    }

    pub fn update_open_positions(&self, count: usize) {
        self.open_positions.set(count as f64);
    }

    pub fn update_last_snapshot_timestamp(&self, timestamp_secs: f64) {
        self.last_snapshot_timestamp.set(timestamp_secs);
    }
}

impl Default for DashboardMetrics {
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
