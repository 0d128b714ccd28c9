//! Client configuration

use std::path::PathBuf;
use std::time::Duration;

/// Tunables for the socket manager.
///
/// The durations exist so tests can shrink them; production code uses
/// the defaults from [`ClientConfig::new`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// REST base, e.g. `https://api.washport.io/api`
    pub api_base_url: String,
    /// Path of the durable session blob
    pub store_path: PathBuf,

    /// Notifications fetched per refetch page
    pub page_size: u32,

    // Reconnect policy (transport-level, capped exponential backoff)
    pub reconnect_max_attempts: u32,
    pub reconnect_base_delay: Duration,
    pub reconnect_max_delay: Duration,

    /// Delay before the full-reload fallback after a failed resync
    pub resync_fallback_delay: Duration,
    /// Safety net clearing a stuck resync in-flight flag
    pub resync_guard_timeout: Duration,
    /// Window for suppressing duplicate permission-update broadcasts
    pub duplicate_window: Duration,
}

impl ClientConfig {
    pub fn new(api_base_url: impl Into<String>, store_path: impl Into<PathBuf>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            store_path: store_path.into(),
            page_size: 50,
            reconnect_max_attempts: 8,
            reconnect_base_delay: Duration::from_secs(1),
            reconnect_max_delay: Duration::from_secs(30),
            resync_fallback_delay: Duration::from_secs(3),
            resync_guard_timeout: Duration::from_secs(10),
            duplicate_window: Duration::from_secs(5),
        }
    }

    /// Realtime endpoint, derived from the API base by stripping the
    /// `/api` (or `/api/vN`) suffix and swapping to the ws scheme.
    ///
    /// The query declares both acceptable transports; the server picks.
    pub fn socket_url(&self) -> String {
        let base = strip_api_suffix(self.api_base_url.trim_end_matches('/'));
        let base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.to_string()
        };
        format!("{base}/ws?transports=websocket,polling")
    }

    /// Build a REST URL under the API base
    pub fn rest_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.api_base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

fn strip_api_suffix(base: &str) -> &str {
    // Accept bases like ".../api" and versioned ".../api/v1"
    if let Some(idx) = base.rfind("/api") {
        let tail = &base[idx + 4..];
        if tail.is_empty() || is_version_segment(tail) {
            return &base[..idx];
        }
    }
    base
}

fn is_version_segment(tail: &str) -> bool {
    let Some(rest) = tail.strip_prefix("/v") else {
        return false;
    };
    !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit())
}
