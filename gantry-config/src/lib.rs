//! Layered configuration loading utilities.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Root application configuration deserialized from layered sources.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub bot: BotEndpointConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            bot: BotEndpointConfig::default(),
            sync: SyncConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

/// Where the bot lives on the network.
#[derive(Debug, Clone, Deserialize)]
pub struct BotEndpointConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Explicit stream URL; derived from `base_url` when absent.
    #[serde(default)]
    pub ws_url: Option<String>,
}

impl Default for BotEndpointConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            ws_url: None,
        }
    }
}

impl BotEndpointConfig {
    /// Effective stream URL: the explicit override, or `base_url` with the
    /// scheme switched to ws(s) and the `/ws` path appended.
    #[must_use]
    pub fn ws_url(&self) -> String {
        if let Some(url) = &self.ws_url {
            return url.clone();
        }
        let base = self.base_url.trim_end_matches('/');
        let stream = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.to_string()
        };
        format!("{stream}/ws")
    }
}

/// Timing knobs for the synchronization core.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_ms: default_reconnect_delay_ms(),
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl SyncConfig {
    #[must_use]
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TelemetryConfig {
    /// JSON log file; stdout only when unset.
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    /// Prometheus exporter listen address; disabled when unset.
    #[serde(default)]
    pub metrics_addr: Option<String>,
}

fn default_log_level() -> String {
    "info".into()
}

fn default_base_url() -> String {
    "http://127.0.0.1:8000".into()
}

fn default_reconnect_delay_ms() -> u64 {
    3_000
}

fn default_connect_timeout_secs() -> u64 {
    5
}

fn default_request_timeout_secs() -> u64 {
    10
}

/// Loads configuration by merging files and environment variables.
///
/// Sources (lowest to highest precedence):
/// 1. `config/default.toml`
/// 2. `config/{environment}.toml` (if `environment` is Some)
/// 3. `config/local.toml` (optional, ignored in git)
/// 4. Environment variables prefixed with `GANTRY_`
pub fn load_config(env: Option<&str>) -> Result<AppConfig> {
    let base_path = Path::new("config");

    let mut builder =
        Config::builder().add_source(File::from(base_path.join("default.toml")).required(true));
    if let Some(env_name) = env {
        builder = builder
            .add_source(File::from(base_path.join(format!("{env_name}.toml"))).required(false));
    }

    builder = builder.add_source(File::from(base_path.join("local.toml")).required(false));

    builder = builder.add_source(
        Environment::with_prefix("GANTRY")
            .separator("__")
            .ignore_empty(true),
    );

    let config = builder.build()?;
    config
        .try_deserialize()
        .map_err(|err: ConfigError| err.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ws_url_derives_from_base_url() {
        let endpoint = BotEndpointConfig {
            base_url: "http://127.0.0.1:8000/".into(),
            ws_url: None,
        };
        assert_eq!(endpoint.ws_url(), "ws://127.0.0.1:8000/ws");

        let secure = BotEndpointConfig {
            base_url: "https://bot.example.com".into(),
            ws_url: None,
        };
        assert_eq!(secure.ws_url(), "wss://bot.example.com/ws");
    }

    #[test]
    fn explicit_ws_url_wins() {
        let endpoint = BotEndpointConfig {
            base_url: "http://127.0.0.1:8000".into(),
            ws_url: Some("ws://10.0.0.5:9000/stream".into()),
        };
        assert_eq!(endpoint.ws_url(), "ws://10.0.0.5:9000/stream");
    }

    #[test]
    fn sync_defaults_match_the_fixed_retry_contract() {
        let sync = SyncConfig::default();
        assert_eq!(sync.reconnect_delay(), Duration::from_millis(3_000));
    }
}
