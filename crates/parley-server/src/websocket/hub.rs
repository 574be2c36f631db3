//! Observer fan-out, keyed by session.
//!
//! Every conversation-visible frame a participant connection produces is
//! mirrored to the observers subscribed to that session. Broadcasting never
//! blocks on a slow observer: frames are enqueued with `try_send` and an
//! observer that keeps dropping frames past a threshold is evicted.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use parley_core::protocol::ServerMessage;
use parley_runtime::FrameSink;

use super::connection::ClientConnection;

/// Registry of observer connections, grouped by session.
pub struct ObserverHub {
    sessions: RwLock<HashMap<String, HashMap<String, Arc<ClientConnection>>>>,
    /// Dropped-frame count after which an observer is evicted.
    drop_threshold: u64,
}

impl ObserverHub {
    /// Create a hub with the given eviction threshold.
    pub fn new(drop_threshold: u64) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            drop_threshold,
        }
    }

    /// Subscribe a connection to a session's frames.
    pub async fn subscribe(&self, session_id: &str, connection: Arc<ClientConnection>) {
        let mut sessions = self.sessions.write().await;
        let _ = sessions
            .entry(session_id.to_owned())
            .or_default()
            .insert(connection.id.clone(), connection);
    }

    /// Remove a connection from a session. Empty sessions are dropped.
    pub async fn unsubscribe(&self, session_id: &str, connection_id: &str) {
        let mut sessions = self.sessions.write().await;
        if let Some(observers) = sessions.get_mut(session_id) {
            let _ = observers.remove(connection_id);
            if observers.is_empty() {
                let _ = sessions.remove(session_id);
            }
        }
    }

    /// Broadcast a frame to every observer of the given session.
    ///
    /// The frame is serialized once and shared. Observers whose queues have
    /// dropped more than the threshold are evicted after the send pass.
    pub async fn broadcast(&self, session_id: &str, message: &ServerMessage) {
        let json = Arc::new(message.to_json());

        let mut evict = Vec::new();
        {
            let sessions = self.sessions.read().await;
            let Some(observers) = sessions.get(session_id) else {
                return;
            };
            debug!(session_id, recipients = observers.len(), "broadcast frame");
            for conn in observers.values() {
                let _ = conn.send(Arc::clone(&json));
                if conn.drop_count() > self.drop_threshold {
                    evict.push(conn.id.clone());
                }
            }
        }

        for conn_id in evict {
            warn!(session_id, %conn_id, "evicting slow observer");
            self.unsubscribe(session_id, &conn_id).await;
        }
    }

    /// Number of observers subscribed to a session.
    pub async fn observer_count(&self, session_id: &str) -> usize {
        self.sessions
            .read()
            .await
            .get(session_id)
            .map_or(0, HashMap::len)
    }

    /// Number of sessions with at least one observer.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Total observer connections across all sessions.
    pub async fn connection_count(&self) -> usize {
        self.sessions.read().await.values().map(HashMap::len).sum()
    }
}

/// [`FrameSink`] adapter that broadcasts to one session's observers.
pub struct HubSink {
    hub: Arc<ObserverHub>,
    session_id: String,
}

impl HubSink {
    /// Bind a hub to a session id.
    pub fn new(hub: Arc<ObserverHub>, session_id: impl Into<String>) -> Self {
        Self {
            hub,
            session_id: session_id.into(),
        }
    }
}

#[async_trait]
impl FrameSink for HubSink {
    async fn send(&self, message: ServerMessage) {
        self.hub.broadcast(&self.session_id, &message).await;
    }
}
