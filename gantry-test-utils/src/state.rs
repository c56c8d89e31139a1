use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};

use gantry_core::{BotConfig, PositionStatus, Snapshot};

const PUSH_CAPACITY: usize = 64;

/// Control-plane request the mock bot received, recorded for assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand {
    ClosePosition(String),
    KillSwitch,
    Resume,
    Restart,
    SaveConfig,
}

/// Why a close request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseRejection {
    UnknownSymbol,
    AlreadyClosed,
}

/// Shared state for the in-memory mock bot.
#[derive(Clone)]
pub struct MockBotState {
    inner: Arc<Mutex<Inner>>,
    pushes: broadcast::Sender<String>,
    stream_accepts: Arc<AtomicUsize>,
    stream_active: Arc<AtomicUsize>,
}

struct Inner {
    snapshot: Snapshot,
    config: BotConfig,
    commands: Vec<BotCommand>,
    data_failures: usize,
}

impl MockBotState {
    pub fn new(snapshot: Snapshot) -> Self {
        let (pushes, _) = broadcast::channel(PUSH_CAPACITY);
        let inner = Inner {
            snapshot,
            config: BotConfig::default(),
            commands: Vec::new(),
            data_failures: 0,
        };
        Self {
            inner: Arc::new(Mutex::new(inner)),
            pushes,
            stream_accepts: Arc::new(AtomicUsize::new(0)),
            stream_active: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub async fn snapshot(&self) -> Snapshot {
        self.inner.lock().await.snapshot.clone()
    }

    /// Replace the state served by `/data` without pushing it.
    pub async fn set_snapshot(&self, snapshot: Snapshot) {
        self.inner.lock().await.snapshot = snapshot;
    }

    /// Replace the state and push it to every connected stream client.
    pub async fn publish_snapshot(&self, snapshot: Snapshot) {
        let payload = {
            let mut guard = self.inner.lock().await;
            guard.snapshot = snapshot;
            serde_json::to_string(&guard.snapshot).unwrap()
        };
        let _ = self.pushes.send(payload);
    }

    /// Push an arbitrary frame to stream clients, bypassing serialization.
    pub fn publish_raw(&self, payload: impl Into<String>) {
        let _ = self.pushes.send(payload.into());
    }

    pub async fn config(&self) -> BotConfig {
        self.inner.lock().await.config.clone()
    }

    pub async fn set_config(&self, config: BotConfig) {
        self.inner.lock().await.config = config;
    }

    /// Make the next `count` requests to `/data` answer with a 500.
    pub async fn fail_data_requests(&self, count: usize) {
        self.inner.lock().await.data_failures = count;
    }

    pub async fn commands(&self) -> Vec<BotCommand> {
        self.inner.lock().await.commands.clone()
    }

    pub(crate) async fn take_data_failure(&self) -> bool {
        let mut guard = self.inner.lock().await;
        if guard.data_failures > 0 {
            guard.data_failures -= 1;
            true
        } else {
            false
        }
    }

    pub(crate) async fn record_command(&self, command: BotCommand) {
        self.inner.lock().await.commands.push(command);
    }

    pub(crate) async fn set_trading_allowed(&self, allowed: bool) -> bool {
        let mut guard = self.inner.lock().await;
        guard.snapshot.is_trading_allowed = allowed;
        guard.snapshot.is_trading_allowed
    }

    pub(crate) async fn close_position(&self, symbol: &str) -> Result<(), CloseRejection> {
        let mut guard = self.inner.lock().await;
        let position = guard
            .snapshot
            .positions
            .get_mut(symbol)
            .ok_or(CloseRejection::UnknownSymbol)?;
        if position.status != PositionStatus::Open {
            return Err(CloseRejection::AlreadyClosed);
        }
        position.status = PositionStatus::Closed;
        position.exit_reason = Some("MANUAL_CLOSE".to_string());
        Ok(())
    }

    pub(crate) fn subscribe_pushes(&self) -> broadcast::Receiver<String> {
        self.pushes.subscribe()
    }

    pub(crate) fn note_stream_accept(&self) {
        self.stream_accepts.fetch_add(1, Ordering::SeqCst);
        self.stream_active.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn note_stream_closed(&self) {
        self.stream_active.fetch_sub(1, Ordering::SeqCst);
    }

    /// Stream connections accepted since startup, including closed ones.
    #[must_use]
    pub fn stream_accepts(&self) -> usize {
        self.stream_accepts.load(Ordering::SeqCst)
    }

    /// Stream connections currently open.
    #[must_use]
    pub fn stream_active(&self) -> usize {
        self.stream_active.load(Ordering::SeqCst)
    }
}
