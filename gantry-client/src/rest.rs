//! HTTP side of the bot contract: the bootstrap fetch, the configuration
//! round-trip, and fire-and-forget control commands.
//!
//! Commands are acknowledged, not reflected: a success response means the
//! bot accepted the request, and the resulting state change arrives (if at
//! all) through the next pushed snapshot. Nothing here writes to the state
//! store.

use std::time::Duration;

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use gantry_core::{BotConfig, Snapshot};

use crate::{ClientError, ClientResult};

/// Connection settings for [`BotApi`].
#[derive(Debug, Clone)]
pub struct BotApiConfig {
    pub base_url: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for BotApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".into(),
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// A thin typed wrapper over the bot's HTTP API.
#[derive(Clone)]
pub struct BotApi {
    http: Client,
    config: BotApiConfig,
}

/// Acknowledgement body the bot returns for control posts.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandAck {
    pub status: String,
    #[serde(default)]
    pub message: String,
}

/// Liveness payload from `GET /`.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthStatus {
    pub status: String,
}

impl BotApi {
    pub fn new(config: BotApiConfig) -> Self {
        let http = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .expect("failed to create reqwest client");
        Self { http, config }
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// One-shot fetch of the full bot state, used to seed the store and as
    /// a polling fallback.
    pub async fn fetch_snapshot(&self) -> ClientResult<Snapshot> {
        self.get_json("/data").await
    }

    pub async fn fetch_config(&self) -> ClientResult<BotConfig> {
        self.get_json("/config").await
    }

    /// Write the settings document; the bot applies it on its next decision
    /// cycle.
    pub async fn save_config(&self, config: &BotConfig) -> ClientResult<CommandAck> {
        let response = self
            .http
            .post(self.url("/config"))
            .json(config)
            .send()
            .await
            .map_err(|err| ClientError::Transport(err.to_string()))?;
        Self::decode(response).await
    }

    /// Ask the bot to close one open position at market.
    pub async fn close_position(&self, symbol: &str) -> ClientResult<CommandAck> {
        self.post(&format!("/trade/close/{symbol}")).await
    }

    /// Halt new entries; open positions are left untouched.
    pub async fn kill_switch(&self) -> ClientResult<CommandAck> {
        self.post("/bot/kill-switch").await
    }

    /// Allow entries again after a kill switch.
    pub async fn resume(&self) -> ClientResult<CommandAck> {
        self.post("/bot/resume").await
    }

    pub async fn restart(&self) -> ClientResult<CommandAck> {
        self.post("/restart").await
    }

    pub async fn health(&self) -> ClientResult<HealthStatus> {
        self.get_json("/").await
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    async fn get_json<T>(&self, path: &str) -> ClientResult<T>
    where
        T: DeserializeOwned,
    {
        let response = self
            .http
            .get(self.url(path))
            .send()
            .await
            .map_err(|err| ClientError::Transport(err.to_string()))?;
        Self::decode(response).await
    }

    async fn post(&self, path: &str) -> ClientResult<CommandAck> {
        let response = self
            .http
            .post(self.url(path))
            .send()
            .await
            .map_err(|err| ClientError::Transport(err.to_string()))?;
        Self::decode(response).await
    }

    async fn decode<T>(response: Response) -> ClientResult<T>
    where
        T: DeserializeOwned,
    {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Bot {
                status: status.as_u16(),
                message: extract_detail(&body),
            });
        }
        response
            .json::<T>()
            .await
            .map_err(|err| ClientError::Serialization(err.to_string()))
    }
}

/// Pull the human-readable message out of an error body, which the bot
/// frames as `{"detail": "..."}`.
fn extract_detail(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("detail")
                .and_then(|detail| detail.as_str())
                .map(String::from)
        })
        .unwrap_or_else(|| body.trim().to_string())
}
