use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use anyhow::Result;
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, Notify};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tracing::warn;

use crate::state::MockBotState;

/// Mock push-stream server. Supports being killed and later restarted on
/// the same address, so tests can exercise reconnect behavior.
pub struct MockStreamServer {
    addr: SocketAddr,
    state: MockBotState,
    shutdown_tx: broadcast::Sender<()>,
    generation: Arc<AtomicUsize>,
    ready: Arc<Notify>,
}

impl MockStreamServer {
    pub async fn spawn(state: MockBotState) -> Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
        let addr = listener.local_addr()?;
        let (shutdown_tx, _) = broadcast::channel(4);
        let server = Self {
            addr,
            state,
            shutdown_tx,
            generation: Arc::new(AtomicUsize::new(0)),
            ready: Arc::new(Notify::new()),
        };
        server.spawn_with_listener(listener);
        server.wait_for_generation(1).await;
        Ok(server)
    }

    fn spawn_with_listener(&self, listener: TcpListener) {
        let state = self.state.clone();
        let shutdown_tx = self.shutdown_tx.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let generation = self.generation.clone();
        let ready = self.ready.clone();
        tokio::spawn(async move {
            generation.fetch_add(1, Ordering::SeqCst);
            ready.notify_waiters();
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    accept_result = listener.accept() => match accept_result {
                        Ok((stream, _peer)) => {
                            let state = state.clone();
                            let shutdown = shutdown_tx.subscribe();
                            tokio::spawn(async move {
                                if let Err(err) = handle_socket(state, stream, shutdown).await {
                                    warn!(error = %err, "stream connection ended with error");
                                }
                            });
                        }
                        Err(err) => {
                            tracing::error!(error = %err, "failed to accept stream connection");
                            break;
                        }
                    },
                }
            }
        });
    }

    async fn wait_for_generation(&self, target: usize) {
        loop {
            if self.generation.load(Ordering::SeqCst) >= target {
                break;
            }
            self.ready.notified().await;
        }
    }

    #[must_use]
    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    /// Drop the listener and every open connection.
    pub async fn kill(&self) {
        let _ = self.shutdown_tx.send(());
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }

    /// Bring the server back on the address it was first bound to.
    pub async fn restart(&self) -> Result<()> {
        let listener = TcpListener::bind(self.addr).await?;
        let target = self.generation.load(Ordering::SeqCst) + 1;
        self.spawn_with_listener(listener);
        self.wait_for_generation(target).await;
        Ok(())
    }

    pub async fn shutdown(&mut self) {
        let _ = self.shutdown_tx.send(());
    }
}

impl Drop for MockStreamServer {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(());
    }
}

async fn handle_socket(
    state: MockBotState,
    stream: TcpStream,
    shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let captured_path = Arc::new(StdMutex::new(String::new()));
    let path_clone = captured_path.clone();
    let ws_stream = accept_hdr_async(stream, move |req: &Request, resp: Response| {
        if let Ok(mut path) = path_clone.lock() {
            *path = req.uri().path().to_string();
        }
        Ok(resp)
    })
    .await?;
    let path = captured_path
        .lock()
        .map(|guard| guard.clone())
        .unwrap_or_else(|_| "/".to_string());
    if path != "/ws" {
        warn!(path = %path, "received stream connection for unknown path");
        return Ok(());
    }
    state.note_stream_accept();
    let result = serve_pushes(&state, ws_stream, shutdown).await;
    state.note_stream_closed();
    result
}

async fn serve_pushes(
    state: &MockBotState,
    stream: tokio_tungstenite::WebSocketStream<TcpStream>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let (mut sink, mut source) = stream.split();
    let mut pushes = state.subscribe_pushes();
    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                let _ = sink.close().await;
                break;
            }
            push = pushes.recv() => match push {
                Ok(payload) => {
                    if sink.send(Message::Text(payload)).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "stream client lagged behind pushes");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            message = source.next() => match message {
                Some(Ok(Message::Ping(payload))) => {
                    let _ = sink.send(Message::Pong(payload)).await;
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(_)) => break,
            },
        }
    }
    Ok(())
}
