//! The live-stream connection manager.
//!
//! Owns at most one WebSocket connection to the bot and moves through four
//! phases: connecting, open, pending-retry, idle. Every drop funnels into
//! one close path that either arms a single fixed-delay retry (console
//! visible) or suspends (console hidden). `connect()` is idempotent, so
//! startup and visibility-regain may both fire it without ever producing a
//! second socket or a second timer.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::{
    connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, warn};

use gantry_core::Snapshot;

use crate::store::StateStore;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Tuning for the connection manager.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub ws_url: String,
    /// Fixed wait between a drop and the next attempt. Retries are
    /// unbounded and the delay never grows.
    pub reconnect_delay: Duration,
    pub connect_timeout: Duration,
}

impl SyncSettings {
    pub fn new(ws_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
            reconnect_delay: Duration::from_millis(3_000),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

enum SyncCommand {
    Connect,
    SetVisibility(bool),
    Shutdown,
}

enum Phase {
    Connecting,
    Open(Box<WsStream>),
    /// Dropped while visible; exactly one retry armed for the deadline.
    PendingRetry(Instant),
    /// No connection and nothing scheduled.
    Idle,
    Terminated,
}

/// Control handle for a spawned [`SyncManager`].
///
/// Dropping the handle tears the manager down.
pub struct SyncHandle {
    commands: mpsc::UnboundedSender<SyncCommand>,
    task: Option<JoinHandle<()>>,
}

impl SyncHandle {
    /// Ask the manager to connect. A no-op while a connection is open or
    /// already being established, so concurrent triggers are safe.
    pub fn connect(&self) {
        let _ = self.commands.send(SyncCommand::Connect);
    }

    /// Report console visibility. Hidden suspends reconnect scheduling
    /// without touching an open connection; becoming visible reconnects
    /// promptly instead of waiting out a stale timer.
    pub fn set_visibility(&self, visible: bool) {
        let _ = self.commands.send(SyncCommand::SetVisibility(visible));
    }

    /// Tear the manager down: the pending retry (if any) is cancelled, the
    /// open connection is closed, and nothing further is scheduled.
    pub async fn shutdown(mut self) {
        let _ = self.commands.send(SyncCommand::Shutdown);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        let _ = self.commands.send(SyncCommand::Shutdown);
    }
}

/// The connection manager worker. Created through [`SyncManager::spawn`],
/// which hands back the control handle; the worker itself lives on the
/// runtime until shut down.
pub struct SyncManager {
    store: StateStore,
    settings: SyncSettings,
    commands: mpsc::UnboundedReceiver<SyncCommand>,
    visible: bool,
}

impl SyncManager {
    /// Spawn the manager; it starts connecting immediately.
    pub fn spawn(store: StateStore, settings: SyncSettings) -> SyncHandle {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let manager = Self {
            store,
            settings,
            commands: command_rx,
            visible: true,
        };
        let task = tokio::spawn(manager.run());
        SyncHandle {
            commands: command_tx,
            task: Some(task),
        }
    }

    async fn run(mut self) {
        let mut phase = Phase::Connecting;
        loop {
            phase = match phase {
                Phase::Connecting => self.establish().await,
                Phase::Open(stream) => self.drain(*stream).await,
                Phase::PendingRetry(deadline) => self.await_retry(deadline).await,
                Phase::Idle => self.await_command().await,
                Phase::Terminated => break,
            };
        }
        self.store.set_connected(false);
        debug!("connection manager stopped");
    }

    async fn establish(&mut self) -> Phase {
        info!(url = %self.settings.ws_url, "connecting to bot stream");
        let deadline = Instant::now() + self.settings.connect_timeout;
        let attempt = connect_async(self.settings.ws_url.clone());
        tokio::pin!(attempt);
        loop {
            tokio::select! {
                biased;
                cmd = self.commands.recv() => match cmd {
                    None | Some(SyncCommand::Shutdown) => return Phase::Terminated,
                    // Already connecting; connect() is a no-op here.
                    Some(SyncCommand::Connect) => {}
                    Some(SyncCommand::SetVisibility(visible)) => self.visible = visible,
                },
                result = tokio::time::timeout_at(deadline, &mut attempt) => {
                    return match result {
                        Ok(Ok((stream, _response))) => {
                            self.store.set_connected(true);
                            info!("bot stream connected");
                            Phase::Open(Box::new(stream))
                        }
                        Ok(Err(err)) => {
                            warn!(error = %err, "bot stream connect failed");
                            self.after_close()
                        }
                        Err(_) => {
                            warn!("bot stream connect timed out");
                            self.after_close()
                        }
                    };
                }
            }
        }
    }

    async fn drain(&mut self, mut stream: WsStream) -> Phase {
        loop {
            tokio::select! {
                biased;
                cmd = self.commands.recv() => match cmd {
                    None | Some(SyncCommand::Shutdown) => {
                        let _ = stream.close(None).await;
                        return Phase::Terminated;
                    }
                    Some(SyncCommand::Connect) => {
                        debug!("connect ignored; stream already open");
                    }
                    // Hidden never closes a live stream; it only suspends
                    // future reconnects.
                    Some(SyncCommand::SetVisibility(visible)) => self.visible = visible,
                },
                message = stream.next() => match message {
                    Some(Ok(Message::Text(text))) => self.apply_payload(&text),
                    Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                        Ok(text) => self.apply_payload(&text),
                        Err(_) => {
                            self.store.note_discarded_payload();
                            warn!("discarding non UTF-8 binary payload from bot stream");
                        }
                    },
                    Some(Ok(Message::Ping(payload))) => {
                        if let Err(err) = stream.send(Message::Pong(payload)).await {
                            warn!(error = %err, "failed to answer ping; forcing close");
                            let _ = stream.close(None).await;
                            return self.after_close();
                        }
                    }
                    Some(Ok(Message::Pong(_) | Message::Frame(_))) => {}
                    Some(Ok(Message::Close(frame))) => {
                        debug!(?frame, "bot stream closed by peer");
                        return self.after_close();
                    }
                    Some(Err(err)) => {
                        warn!(error = %err, "bot stream transport error; forcing close");
                        let _ = stream.close(None).await;
                        return self.after_close();
                    }
                    None => {
                        debug!("bot stream ended");
                        return self.after_close();
                    }
                },
            }
        }
    }

    async fn await_retry(&mut self, deadline: Instant) -> Phase {
        loop {
            tokio::select! {
                biased;
                cmd = self.commands.recv() => match cmd {
                    None | Some(SyncCommand::Shutdown) => return Phase::Terminated,
                    // Explicit connect supersedes the armed timer; leaving
                    // this phase drops it, so timers never double.
                    Some(SyncCommand::Connect) => return Phase::Connecting,
                    Some(SyncCommand::SetVisibility(visible)) => {
                        let was_visible = self.visible;
                        self.visible = visible;
                        if !visible {
                            debug!("console hidden; pending reconnect cancelled");
                            return Phase::Idle;
                        }
                        if !was_visible {
                            info!("console visible again; reconnecting");
                            return Phase::Connecting;
                        }
                    }
                },
                _ = tokio::time::sleep_until(deadline) => return Phase::Connecting,
            }
        }
    }

    async fn await_command(&mut self) -> Phase {
        loop {
            match self.commands.recv().await {
                None | Some(SyncCommand::Shutdown) => return Phase::Terminated,
                Some(SyncCommand::Connect) => return Phase::Connecting,
                Some(SyncCommand::SetVisibility(visible)) => {
                    let regained = visible && !self.visible;
                    self.visible = visible;
                    if regained {
                        info!("console visible again; reconnecting");
                        return Phase::Connecting;
                    }
                }
            }
        }
    }

    /// The single close path. Connectivity drops, and either one retry is
    /// armed (visible) or the manager goes idle (hidden).
    fn after_close(&self) -> Phase {
        self.store.set_connected(false);
        if self.visible {
            debug!(
                delay_ms = self.settings.reconnect_delay.as_millis() as u64,
                "scheduling reconnect"
            );
            Phase::PendingRetry(Instant::now() + self.settings.reconnect_delay)
        } else {
            debug!("console hidden; reconnect suspended");
            Phase::Idle
        }
    }

    fn apply_payload(&self, text: &str) {
        match serde_json::from_str::<Snapshot>(text) {
            Ok(snapshot) => self.store.apply_push(snapshot),
            Err(err) => {
                self.store.note_discarded_payload();
                warn!(error = %err, payload = text, "discarding malformed bot payload");
            }
        }
    }
}
