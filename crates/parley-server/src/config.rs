//! Server configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use parley_core::protocol::IDLE_TIMEOUT;

/// Configuration for the Parley server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Per-connection outbound queue depth.
    pub send_queue_size: usize,
    /// Seconds of inbound silence before a socket is closed.
    pub idle_timeout_secs: u64,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Dropped-frame count after which an observer is evicted.
    pub observer_drop_threshold: u64,
}

impl ServerConfig {
    /// Idle timeout as a [`Duration`].
    #[must_use]
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            send_queue_size: 256,
            idle_timeout_secs: IDLE_TIMEOUT.as_secs(),
            max_message_size: 64 * 1024,
            observer_drop_threshold: 64,
        }
    }
}
