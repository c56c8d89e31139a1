//! Wires the sync manager, bootstrap fetch, and metrics exporter into one
//! monitor session that both the dashboard and the headless mode drive.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use gantry_client::{
    seed_store, BotApi, BotApiConfig, StateStore, SyncHandle, SyncManager, SyncSettings,
};
use gantry_config::AppConfig;

use crate::telemetry::{spawn_metrics_server, DashboardMetrics};

const DEFAULT_TICK_RATE: Duration = Duration::from_millis(250);

/// Ctrl+C aware shutdown flag shared across tasks.
#[derive(Clone)]
pub struct ShutdownSignal {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let flag = Arc::new(AtomicBool::new(false));
        let notify = Arc::new(Notify::new());
        let flag_clone = flag.clone();
        let notify_clone = notify.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                flag_clone.store(true, Ordering::SeqCst);
                notify_clone.notify_waiters();
            }
        });
        Self { flag, notify }
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub async fn wait(&self) {
        while !self.triggered() {
            let notified = self.notify.notified();
            if self.triggered() {
                return;
            }
            notified.await;
        }
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything the monitor needs to reach the bot and report on itself.
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub rest_url: String,
    pub ws_url: String,
    pub reconnect_delay: Duration,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub metrics_addr: Option<SocketAddr>,
    pub tick_rate: Duration,
}

impl MonitorSettings {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let metrics_addr = match &config.telemetry.metrics_addr {
            Some(addr) => Some(
                addr.parse()
                    .with_context(|| format!("invalid metrics address '{addr}'"))?,
            ),
            None => None,
        };
        Ok(Self {
            rest_url: config.bot.base_url.clone(),
            ws_url: config.bot.ws_url(),
            reconnect_delay: config.sync.reconnect_delay(),
            connect_timeout: config.sync.connect_timeout(),
            request_timeout: config.sync.request_timeout(),
            metrics_addr,
            tick_rate: DEFAULT_TICK_RATE,
        })
    }
}

/// A running monitor: state store, push-stream sync, and metrics tasks.
pub struct MonitorSession {
    settings: MonitorSettings,
    api: BotApi,
    store: StateStore,
    metrics: Arc<DashboardMetrics>,
    sync: SyncHandle,
    pump: JoinHandle<()>,
    exporter: Option<JoinHandle<()>>,
}

impl MonitorSession {
    /// Connects the push stream, seeds the store over REST, and starts the
    /// metrics exporter when one is configured.
    pub async fn start(settings: MonitorSettings) -> Self {
        info!(bot = %settings.rest_url, stream = %settings.ws_url, "monitor session starting");
        let store = StateStore::new();
        let api = BotApi::new(BotApiConfig {
            base_url: settings.rest_url.clone(),
            connect_timeout: settings.connect_timeout,
            request_timeout: settings.request_timeout,
        });

        let mut stream_settings = SyncSettings::new(settings.ws_url.clone());
        stream_settings.reconnect_delay = settings.reconnect_delay;
        stream_settings.connect_timeout = settings.connect_timeout;
        let sync = SyncManager::spawn(store.clone(), stream_settings);

        seed_store(&api, &store).await;

        let metrics = Arc::new(DashboardMetrics::new());
        let pump = spawn_metrics_pump(store.clone(), metrics.clone());
        let exporter = settings.metrics_addr.map(|addr| {
            info!(%addr, "metrics exporter listening");
            spawn_metrics_server(metrics.registry(), addr)
        });

        Self {
            settings,
            api,
            store,
            metrics,
            sync,
            pump,
            exporter,
        }
    }

    pub fn api(&self) -> &BotApi {
        &self.api
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn metrics(&self) -> &DashboardMetrics {
        &self.metrics
    }

    pub fn rest_url(&self) -> &str {
        &self.settings.rest_url
    }

    pub fn tick_rate(&self) -> Duration {
        self.settings.tick_rate
    }

    /// Ask the sync manager to connect now; a no-op while a connection is
    /// already up or being attempted.
    pub fn connect(&self) {
        self.sync.connect();
    }

    /// Forward a visibility change to the sync manager. Hiding pauses
    /// reconnect scheduling; becoming visible again reconnects at once.
    pub fn set_visibility(&self, visible: bool) {
        self.sync.set_visibility(visible);
    }

    /// Tear down the stream, the metrics pump, and the exporter.
    pub async fn shutdown(self) {
        self.sync.shutdown().await;
        self.pump.abort();
        if let Some(exporter) = self.exporter {
            exporter.abort();
        }
    }
}

/// Mirror store activity into Prometheus.
///
/// The store's watch channel coalesces updates, so counters are advanced by
/// the delta of the store's own totals rather than per wakeup. A slow tick
/// keeps the discard counter fresh even though discards never wake the watch.
fn spawn_metrics_pump(store: StateStore, metrics: Arc<DashboardMetrics>) -> JoinHandle<()> {
    let mut reader = store.subscribe();
    tokio::spawn(async move {
        let mut seen_pushes = 0u64;
        let mut seen_discards = 0u64;
        let mut was_connected = false;
        let mut ever_connected = false;
        let mut seen_snapshot = false;
        loop {
            let state = reader.current();

            let connected = state.connectivity.connected;
            if connected && !was_connected {
                if ever_connected {
                    metrics.inc_stream_reconnect();
                }
                ever_connected = true;
            }
            was_connected = connected;
            metrics.update_stream_status(connected);

            let pushes = store.pushes_applied();
            if pushes > seen_pushes {
                metrics.inc_snapshots(pushes - seen_pushes);
                seen_pushes = pushes;
                metrics.update_last_snapshot_timestamp(Utc::now().timestamp() as f64);
            }
            let discards = store.discarded_payloads();
            if discards > seen_discards {
                metrics.inc_discarded(discards - seen_discards);
                seen_discards = discards;
            }

            if let Some(snapshot) = &state.snapshot {
                metrics.update_open_positions(snapshot.open_positions().count());
                if !seen_snapshot {
                    seen_snapshot = true;
                    metrics.update_last_snapshot_timestamp(Utc::now().timestamp() as f64);
                }
            }

            tokio::select! {
                changed = reader.changed() => {
                    if !changed {
                        break;
                    }
                }
                _ = tokio::time::sleep(Duration::from_secs(1)) => {}
            }
        }
    })
}

/// Run the monitor without a terminal UI, logging state transitions until
/// shutdown fires. Useful under a supervisor next to a Prometheus scraper.
pub async fn run_monitor_headless(settings: MonitorSettings, shutdown: ShutdownSignal) -> Result<()> {
    let session = MonitorSession::start(settings).await;
    let mut reader = session.store().subscribe();
    let mut was_connected = reader.connected();
    info!(bot = %session.rest_url(), "monitor running; Ctrl+C stops");

    loop {
        tokio::select! {
            _ = shutdown.wait() => break,
            changed = reader.changed() => {
                if !changed {
                    break;
                }
                let state = reader.current();
                if state.connectivity.connected != was_connected {
                    was_connected = state.connectivity.connected;
                    if was_connected {
                        info!("bot stream online");
                    } else {
                        warn!("bot stream offline; reconnect pending");
                    }
                }
                if let Some(snapshot) = &state.snapshot {
                    debug!(
                        positions = snapshot.positions.len(),
                        trades_today = snapshot.total_trades_today,
                        running = snapshot.is_running,
                        "snapshot updated"
                    );
                }
            }
        }
    }

    info!("monitor stopping");
    session.shutdown().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_pick_up_endpoints() {
        let mut config = AppConfig::default();
        config.bot.base_url = "http://10.0.0.5:9000".to_string();
        let settings = MonitorSettings::from_config(&config).unwrap();
        assert_eq!(settings.rest_url, "http://10.0.0.5:9000");
        assert_eq!(settings.ws_url, "ws://10.0.0.5:9000/ws");
        assert_eq!(settings.metrics_addr, None);
    }

    #[test]
    fn settings_reject_bad_metrics_addr() {
        let mut config = AppConfig::default();
        config.telemetry.metrics_addr = Some("not-an-addr".to_string());
        assert!(MonitorSettings::from_config(&config).is_err());
    }

    #[tokio::test]
    async fn shutdown_wait_returns_after_trigger() {
        let shutdown = ShutdownSignal::new();
        let waiter = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move { shutdown.wait().await })
        };
        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("wait should return once triggered")
            .expect("waiter task should not panic");
        assert!(shutdown.triggered());
    }
}
