//! Client configuration.
//!
//! Loaded by the binary through the `config` crate (defaults, TOML file,
//! `NEWSBOT__*` environment variables) and handed to the library by value.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default backend when nothing is configured.
pub const DEFAULT_BACKEND_HOST: &str = "http://localhost:5000";

/// REST API path prefix.
pub const API_PREFIX: &str = "/api/v1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Scheme + host (+ port) of the news backend. Selects both the REST base
    /// URL and the realtime endpoint.
    pub backend_host: String,
    pub reconnect: ReconnectConfig,
    pub chat: ChatConfig,
    pub http: HttpConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            backend_host: DEFAULT_BACKEND_HOST.to_string(),
            reconnect: ReconnectConfig::default(),
            chat: ChatConfig::default(),
            http: HttpConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Base URL for REST calls, e.g. `http://localhost:5000/api/v1`.
    pub fn api_base_url(&self) -> String {
        format!("{}{}", self.backend_host.trim_end_matches('/'), API_PREFIX)
    }

    /// URL handed to the realtime transport.
    pub fn socket_url(&self) -> String {
        self.backend_host.trim_end_matches('/').to_string()
    }
}

/// Automatic reconnection policy of the realtime transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Consecutive failed attempts before giving up.
    pub max_attempts: u32,
    /// Fixed pause between attempts.
    pub delay_ms: u64,
    /// Upper bound for a single connect + handshake.
    pub connect_timeout_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay_ms: 1000,
            connect_timeout_ms: 20_000,
        }
    }
}

impl ReconnectConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Reconciliation controller tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Two messages with equal content and sender whose timestamps are at
    /// most this far apart are treated as the same message.
    pub duplicate_window_ms: i64,
    /// Messages requested per history fetch.
    pub history_limit: u32,
    /// Sessions requested per sidebar refresh.
    pub session_page_size: u32,
    /// Idle time after the last keystroke before `typing{false}` is sent.
    pub typing_debounce_ms: u64,
    /// Ask the search endpoint to generate an answer.
    pub generate_answer: bool,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            duplicate_window_ms: 5000,
            history_limit: 50,
            session_page_size: 50,
            typing_debounce_ms: 1000,
            generate_answer: true,
        }
    }
}

impl ChatConfig {
    pub fn typing_debounce(&self) -> Duration {
        Duration::from_millis(self.typing_debounce_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Per-request timeout for REST calls.
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}
