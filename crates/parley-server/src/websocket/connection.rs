//! WebSocket client connection state.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::warn;

use parley_core::protocol::ServerMessage;
use parley_runtime::FrameSink;

/// Represents a connected WebSocket client (participant or observer).
pub struct ClientConnection {
    /// Unique connection ID.
    pub id: String,
    /// Send channel to the connection's WebSocket write task.
    tx: mpsc::Sender<Arc<String>>,
    /// When this connection was established.
    pub connected_at: Instant,
    /// Count of frames dropped due to a full channel.
    dropped_messages: AtomicU64,
}

impl ClientConnection {
    /// Create a new connection.
    pub fn new(id: String, tx: mpsc::Sender<Arc<String>>) -> Self {
        Self {
            id,
            tx,
            connected_at: Instant::now(),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Enqueue a serialized frame for the write task.
    ///
    /// Returns `false` if the channel is full or closed, and increments
    /// the dropped frame counter.
    pub fn send(&self, frame: Arc<String>) -> bool {
        if self.tx.try_send(frame).is_ok() {
            true
        } else {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Total frames dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

/// [`FrameSink`] adapter that serializes frames onto one connection.
pub struct ConnectionSink {
    connection: Arc<ClientConnection>,
}

impl ConnectionSink {
    /// Wrap a connection as a frame sink.
    pub fn new(connection: Arc<ClientConnection>) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl FrameSink for ConnectionSink {
    async fn send(&self, message: ServerMessage) {
        if !self.connection.send(Arc::new(message.to_json())) {
            warn!(conn_id = %self.connection.id, "failed to enqueue frame");
        }
    }
}
