use std::convert::Infallible;
use std::net::SocketAddr;

use anyhow::Result;
use hyper::body::to_bytes;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use gantry_core::BotConfig;

use crate::state::{BotCommand, CloseRejection, MockBotState};

pub struct MockRestApi {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl MockRestApi {
    pub async fn spawn(state: MockBotState) -> Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
        let addr = listener.local_addr()?;
        let std_listener = listener.into_std()?;
        std_listener.set_nonblocking(true)?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let make_svc = make_service_fn(move |_| {
            let state = state.clone();
            async move {
                Ok::<_, Infallible>(service_fn(move |req| {
                    let state = state.clone();
                    async move { Ok::<_, Infallible>(route(req, state).await) }
                }))
            }
        });
        let server = Server::from_tcp(std_listener)?.serve(make_svc);
        let handle = tokio::spawn(async move {
            if let Err(err) = server
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
            {
                tracing::error!(error = %err, "mock REST server exited with error");
            }
        });
        Ok(Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
            handle,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub async fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.handle.abort();
    }
}

impl Drop for MockRestApi {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.handle.abort();
    }
}

async fn route(req: Request<Body>, state: MockBotState) -> Response<Body> {
    let (parts, body) = req.into_parts();
    let method = parts.method.clone();
    let path = parts.uri.path().to_string();
    let body_bytes = match to_bytes(body).await {
        Ok(bytes) => bytes,
        Err(err) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                format!("failed to read request body: {err}"),
            )
        }
    };

    match (method, path.as_str()) {
        (Method::GET, "/") => handle_health(),
        (Method::GET, "/data") => handle_data(state).await,
        (Method::GET, "/config") => handle_config_get(state).await,
        (Method::POST, "/config") => handle_config_post(state, &body_bytes).await,
        (Method::POST, "/bot/kill-switch") => handle_trading_flag(state, false).await,
        (Method::POST, "/bot/resume") => handle_trading_flag(state, true).await,
        (Method::POST, "/restart") => handle_restart(state).await,
        (Method::POST, path) => match path.strip_prefix("/trade/close/") {
            Some(symbol) if !symbol.is_empty() => handle_close(state, symbol).await,
            _ => not_found(),
        },
        _ => not_found(),
    }
}

fn handle_health() -> Response<Body> {
    json_response(
        StatusCode::OK,
        json!({"status": "Device Online", "service": "Gantry Mock Bot"}),
    )
}

async fn handle_data(state: MockBotState) -> Response<Body> {
    if state.take_data_failure().await {
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "injected bootstrap failure",
        );
    }
    let snapshot = state.snapshot().await;
    match serde_json::to_value(&snapshot) {
        Ok(body) => json_response(StatusCode::OK, body),
        Err(err) => error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

async fn handle_config_get(state: MockBotState) -> Response<Body> {
    let config = state.config().await;
    match serde_json::to_value(&config) {
        Ok(body) => json_response(StatusCode::OK, body),
        Err(err) => error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

async fn handle_config_post(state: MockBotState, body: &[u8]) -> Response<Body> {
    let config: BotConfig = match serde_json::from_slice(body) {
        Ok(config) => config,
        Err(err) => {
            return error_response(
                StatusCode::UNPROCESSABLE_ENTITY,
                format!("invalid config payload: {err}"),
            )
        }
    };
    state.set_config(config).await;
    state.record_command(BotCommand::SaveConfig).await;
    json_response(
        StatusCode::OK,
        json!({"status": "success", "message": "Config updated"}),
    )
}

async fn handle_trading_flag(state: MockBotState, allowed: bool) -> Response<Body> {
    let now_allowed = state.set_trading_allowed(allowed).await;
    let command = if allowed {
        BotCommand::Resume
    } else {
        BotCommand::KillSwitch
    };
    state.record_command(command).await;
    json_response(
        StatusCode::OK,
        json!({"status": "success", "is_trading_allowed": now_allowed}),
    )
}

async fn handle_restart(state: MockBotState) -> Response<Body> {
    state.record_command(BotCommand::Restart).await;
    json_response(
        StatusCode::OK,
        json!({"status": "success", "message": "Server restarting in 1s..."}),
    )
}

async fn handle_close(state: MockBotState, symbol: &str) -> Response<Body> {
    match state.close_position(symbol).await {
        Ok(()) => {
            state
                .record_command(BotCommand::ClosePosition(symbol.to_string()))
                .await;
            json_response(
                StatusCode::OK,
                json!({"status": "success", "message": format!("Closed {symbol}")}),
            )
        }
        Err(CloseRejection::UnknownSymbol) => {
            error_response(StatusCode::NOT_FOUND, "Position not found")
        }
        Err(CloseRejection::AlreadyClosed) => {
            error_response(StatusCode::BAD_REQUEST, "Position already closed")
        }
    }
}

fn not_found() -> Response<Body> {
    error_response(StatusCode::NOT_FOUND, "Not Found")
}

fn error_response(status: StatusCode, detail: impl Into<String>) -> Response<Body> {
    json_response(status, json!({"detail": detail.into()}))
}

fn json_response(status: StatusCode, body: Value) -> Response<Body> {
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}
