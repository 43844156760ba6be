//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::lifecycle::keep_alive::{SettingsSource, DEFAULT_KEEP_ALIVE_TIMEOUT, KEEP_ALIVE_TIMEOUT_KEY};

/// Root configuration for the server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener configuration (bind address, accept limit).
    pub listener: ListenerConfig,

    /// Connection worker limits.
    pub worker: WorkerConfig,

    /// HTTP connection handling.
    pub http: HttpConfig,

    /// Session lookup for protocol upgrades.
    pub session: SessionConfig,

    /// Graceful shutdown settings.
    pub shutdown: ShutdownConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl SettingsSource for ServerConfig {
    fn setting(&self, key: &str) -> Option<String> {
        match key {
            KEEP_ALIVE_TIMEOUT_KEY => Some(self.http.keep_alive_timeout.to_string()),
            _ => None,
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum concurrent connections accepted (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_connections: 10_000,
        }
    }
}

/// Connection worker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Live worker count at which connections stop being kept alive.
    /// 0 disables the check.
    pub max_workers: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { max_workers: 1_000 }
    }
}

/// Keep-alive timeout as written in the config file: a number or a string.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum KeepAliveSetting {
    Seconds(i64),
    Text(String),
}

impl Default for KeepAliveSetting {
    fn default() -> Self {
        KeepAliveSetting::Text(DEFAULT_KEEP_ALIVE_TIMEOUT.to_string())
    }
}

impl std::fmt::Display for KeepAliveSetting {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeepAliveSetting::Seconds(secs) => write!(f, "{}", secs),
            KeepAliveSetting::Text(text) => write!(f, "{}", text),
        }
    }
}

/// HTTP connection handling.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Idle seconds before a kept-alive connection is closed; 0 disables keep-alive.
    pub keep_alive_timeout: KeepAliveSetting,

    /// Maximum request and response body size, in bytes.
    pub body_limit: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            keep_alive_timeout: KeepAliveSetting::default(),
            body_limit: 8 * 1024 * 1024,
        }
    }
}

/// Session configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Cookie carrying the session identifier.
    pub cookie_name: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "session_id".to_string(),
        }
    }
}

/// Shutdown configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// How long to wait for live workers after the accept loop stops.
    pub drain_timeout_ms: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self { drain_timeout_ms: 15_000 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
