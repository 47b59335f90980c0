use crate::application::history_repository::HistorySource;
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:5000";
pub const BACKEND_URL_ENV: &str = "BACKEND_URL";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DashboardConfig {
    #[serde(default)]
    pub backend: BackendSettings,
    #[serde(default)]
    pub socket: SocketSettings,
    #[serde(default)]
    pub history: HistorySettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackendSettings {
    pub url: String,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_BACKEND_URL.to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Polling,
    WebSocket,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    Exponential,
    Fixed,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SocketSettings {
    pub transports: Vec<TransportKind>,
    pub reconnection: bool,
    /// Omit for unbounded retries.
    pub reconnection_attempts: Option<u32>,
    pub reconnection_delay_ms: u64,
    pub reconnection_delay_max_ms: u64,
    pub backoff: BackoffStrategy,
    pub timeout_ms: u64,
}

impl Default for SocketSettings {
    fn default() -> Self {
        Self {
            transports: vec![TransportKind::Polling, TransportKind::WebSocket],
            reconnection: true,
            reconnection_attempts: None,
            reconnection_delay_ms: 1000,
            reconnection_delay_max_ms: 5000,
            backoff: BackoffStrategy::Exponential,
            timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HistoryMode {
    Combined,
    Split,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HistorySettings {
    pub mode: HistoryMode,
    pub combined_path: String,
    pub history_path: String,
    pub trends_path: String,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            mode: HistoryMode::Combined,
            combined_path: "/api/charts/24h".to_string(),
            history_path: "/api/history".to_string(),
            trends_path: "/api/trends".to_string(),
        }
    }
}

impl HistorySettings {
    pub fn source(&self) -> HistorySource {
        match self.mode {
            HistoryMode::Combined => HistorySource::Combined {
                path: self.combined_path.clone(),
            },
            HistoryMode::Split => HistorySource::Split {
                history_path: self.history_path.clone(),
                trends_path: self.trends_path.clone(),
            },
        }
    }
}

/// Everything the connection manager needs to reach one push endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointConfig {
    pub url: String,
    pub transports: Vec<TransportKind>,
    pub reconnection: bool,
    pub reconnection_attempts: Option<u32>,
    pub reconnection_delay: Duration,
    pub reconnection_delay_max: Duration,
    pub backoff: BackoffStrategy,
    pub timeout: Duration,
}

impl EndpointConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self::from_settings(url, &SocketSettings::default())
    }

    pub fn from_settings(url: impl Into<String>, socket: &SocketSettings) -> Self {
        Self {
            url: url.into().trim_end_matches('/').to_string(),
            transports: socket.transports.clone(),
            reconnection: socket.reconnection,
            reconnection_attempts: socket.reconnection_attempts,
            reconnection_delay: Duration::from_millis(socket.reconnection_delay_ms),
            reconnection_delay_max: Duration::from_millis(socket.reconnection_delay_max_ms),
            backoff: socket.backoff,
            timeout: Duration::from_millis(socket.timeout_ms),
        }
    }

    /// Delay before reconnection attempt `attempt` (1-based).
    pub fn reconnect_delay(&self, attempt: u32) -> Duration {
        match self.backoff {
            BackoffStrategy::Fixed => self.reconnection_delay,
            BackoffStrategy::Exponential => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                self.reconnection_delay
                    .saturating_mul(factor)
                    .min(self.reconnection_delay_max)
            }
        }
    }

    /// Whether another reconnection attempt is allowed after `attempts`
    /// have already been made.
    pub fn may_reconnect(&self, attempts: u32) -> bool {
        self.reconnection
            && self
                .reconnection_attempts
                .map_or(true, |cap| attempts < cap)
    }
}

impl DashboardConfig {
    pub fn endpoint_config(&self) -> EndpointConfig {
        EndpointConfig::from_settings(self.backend.url.clone(), &self.socket)
    }
}

/// Load `config/dashboard` (any format the config crate understands) on top
/// of built-in defaults. Only the backend address may come from the
/// environment.
pub fn load_dashboard_config() -> anyhow::Result<DashboardConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/dashboard").required(false))
        .set_override_option("backend.url", std::env::var(BACKEND_URL_ENV).ok())?
        .build()?;

    Ok(settings.try_deserialize()?)
}

/// Join a base URL and an API path without doubling slashes
pub fn endpoint_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
