//! Keep-alive timeout policy.
//!
//! The timeout is read from configuration the first time a worker asks for
//! it and cached for the life of the process. `0` disables keep-alive.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

/// Settings key for the keep-alive timeout, in seconds.
pub const KEEP_ALIVE_TIMEOUT_KEY: &str = "http.keep_alive_timeout";

/// Value used when the setting is absent.
pub const DEFAULT_KEEP_ALIVE_TIMEOUT: &str = "10";

/// Read-only access to string-valued settings.
pub trait SettingsSource: Send + Sync {
    fn setting(&self, key: &str) -> Option<String>;
}

impl SettingsSource for HashMap<String, String> {
    fn setting(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// Memoized keep-alive timeout.
pub struct KeepAlivePolicy {
    source: Arc<dyn SettingsSource>,
    resolved: OnceLock<u64>,
}

impl KeepAlivePolicy {
    pub fn new(source: Arc<dyn SettingsSource>) -> Self {
        Self {
            source,
            resolved: OnceLock::new(),
        }
    }

    /// A policy that is already resolved to `secs`.
    pub fn fixed(secs: u64) -> Self {
        let policy = Self::new(Arc::new(HashMap::<String, String>::new()));
        let _ = policy.resolved.set(secs);
        policy
    }

    /// Timeout in whole seconds, resolving it on first use.
    ///
    /// Concurrent first callers converge on one value.
    pub fn resolve(&self) -> u64 {
        *self.resolved.get_or_init(|| {
            let raw = self
                .source
                .setting(KEEP_ALIVE_TIMEOUT_KEY)
                .unwrap_or_else(|| DEFAULT_KEEP_ALIVE_TIMEOUT.to_string());
            let secs = parse_timeout(&raw);
            tracing::debug!(keep_alive_timeout_secs = secs, "Keep-alive timeout resolved");
            secs
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.resolve())
    }

    /// Whether responses may advertise a persistent connection.
    pub fn is_enabled(&self) -> bool {
        self.resolve() > 0
    }
}

impl std::fmt::Debug for KeepAlivePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeepAlivePolicy")
            .field("resolved", &self.resolved.get())
            .finish()
    }
}

/// Negative values clamp to 0; unparsable text counts as 0.
fn parse_timeout(raw: &str) -> u64 {
    match raw.trim().parse::<i64>() {
        Ok(secs) => secs.max(0) as u64,
        Err(_) => {
            tracing::warn!(value = %raw, "Invalid keep-alive timeout, keep-alive disabled");
            0
        }
    }
}
