//! `ParleyServer` — Axum HTTP + WebSocket server.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::{Json, Response};
use axum::routing::get;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use uuid::Uuid;

use parley_core::errors::ErrorCode;
use parley_core::protocol::ServerMessage;
use parley_core::session::SessionRecord;
use parley_llm::provider::ProviderFactory;
use parley_runtime::{FrameSink, Orchestrator, OrchestratorConfig};
use parley_store::{ConversationStore, StoreError};

use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::connection::{ClientConnection, ConnectionSink};
use crate::websocket::hub::{HubSink, ObserverHub};
use crate::websocket::session::{run_observer_session, run_participant_session};

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Conversation persistence.
    pub store: Arc<dyn ConversationStore>,
    /// Provider factory for orchestrator calls.
    pub providers: Arc<dyn ProviderFactory>,
    /// Observer fan-out registry.
    pub hub: Arc<ObserverHub>,
    /// Server configuration.
    pub config: ServerConfig,
    /// Orchestrator tunables.
    pub orchestrator: OrchestratorConfig,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
}

/// The main Parley server.
pub struct ParleyServer {
    config: ServerConfig,
    store: Arc<dyn ConversationStore>,
    providers: Arc<dyn ProviderFactory>,
    orchestrator: OrchestratorConfig,
    hub: Arc<ObserverHub>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
}

impl ParleyServer {
    /// Create a new server.
    pub fn new(
        config: ServerConfig,
        store: Arc<dyn ConversationStore>,
        providers: Arc<dyn ProviderFactory>,
        orchestrator: OrchestratorConfig,
    ) -> Self {
        let hub = Arc::new(ObserverHub::new(config.observer_drop_threshold));
        Self {
            config,
            store,
            providers,
            orchestrator,
            hub,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            store: Arc::clone(&self.store),
            providers: Arc::clone(&self.providers),
            hub: Arc::clone(&self.hub),
            config: self.config.clone(),
            orchestrator: self.orchestrator.clone(),
            shutdown: Arc::clone(&self.shutdown),
            start_time: self.start_time,
        };

        Router::new()
            .route("/health", get(health_handler))
            .route("/ws/session/{session_id}", get(participant_handler))
            .route("/ws/observe/{session_id}", get(observer_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Bind and serve; returns the bound address and the serving task.
    ///
    /// The task runs until the shutdown coordinator fires.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener =
            tokio::net::TcpListener::bind((self.config.host.as_str(), self.config.port)).await?;
        let addr = listener.local_addr()?;
        let app = self.router();
        let token = self.shutdown.token();

        let handle = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(token.cancelled_owned());
            if let Err(e) = serve.await {
                error!(error = %e, "server task failed");
            }
        });

        info!(%addr, "listening");
        Ok((addr, handle))
    }

    /// Get the observer hub.
    pub fn hub(&self) -> &Arc<ObserverHub> {
        &self.hub
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let observers = state.hub.connection_count().await;
    let sessions = state.hub.session_count().await;
    Json(health::health_check(state.start_time, observers, sessions))
}

/// GET /ws/session/{session_id} — participant socket upgrade.
///
/// Requires a `user` query parameter matching the session owner; the
/// mismatch is reported over the socket so clients get a typed frame
/// rather than a bare close.
async fn participant_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    let user = params.get("user").cloned();
    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| participant_socket(state, session_id, user, socket))
}

async fn participant_socket(
    state: AppState,
    session_id: String,
    user: Option<String>,
    socket: WebSocket,
) {
    let Some((session, mut socket)) = load_or_reject(&state, &session_id, socket).await else {
        return;
    };

    if user.as_deref() != Some(session.user_id.as_str()) {
        warn!(session_id = %session.id, "participant auth failed");
        send_and_close(
            &mut socket,
            ServerMessage::error(ErrorCode::Unauthorized, "session belongs to another user"),
        )
        .await;
        return;
    }

    let (tx, rx) = mpsc::channel(state.config.send_queue_size);
    let connection = Arc::new(ClientConnection::new(format!("conn_{}", Uuid::now_v7()), tx));
    let client_sink: Arc<dyn FrameSink> = Arc::new(ConnectionSink::new(Arc::clone(&connection)));
    let hub_sink: Arc<dyn FrameSink> =
        Arc::new(HubSink::new(Arc::clone(&state.hub), session.id.clone()));

    let orchestrator = Arc::new(Orchestrator::new(
        session,
        Arc::clone(&state.store),
        Arc::clone(&state.providers),
        Arc::clone(&client_sink),
        hub_sink,
        state.orchestrator.clone(),
    ));

    run_participant_session(
        socket,
        orchestrator,
        client_sink,
        connection,
        rx,
        state.config.idle_timeout(),
    )
    .await;
}

/// GET /ws/observe/{session_id} — read-only observer socket upgrade.
async fn observer_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| observer_socket(state, session_id, socket))
}

async fn observer_socket(state: AppState, session_id: String, socket: WebSocket) {
    let Some((session, socket)) = load_or_reject(&state, &session_id, socket).await else {
        return;
    };

    let handshake = vec![
        ServerMessage::Connected {
            session_id: session.id.clone(),
            scenario: session.prompts.summary(),
        },
        ServerMessage::History {
            messages: session.messages,
        },
    ];

    let (tx, rx) = mpsc::channel(state.config.send_queue_size);
    let connection = Arc::new(ClientConnection::new(format!("obs_{}", Uuid::now_v7()), tx));

    run_observer_session(
        socket,
        session.id,
        handshake,
        Arc::clone(&state.hub),
        connection,
        rx,
        state.config.idle_timeout(),
    )
    .await;
}

/// Load the session, or report the failure over the socket and close.
async fn load_or_reject(
    state: &AppState,
    session_id: &str,
    mut socket: WebSocket,
) -> Option<(SessionRecord, WebSocket)> {
    match state.store.load_session(session_id).await {
        Ok(session) => Some((session, socket)),
        Err(StoreError::SessionNotFound { .. }) => {
            send_and_close(
                &mut socket,
                ServerMessage::error(ErrorCode::SessionNotFound, "unknown session"),
            )
            .await;
            None
        }
        Err(e) => {
            warn!(session_id, error = %e, "session load failed");
            send_and_close(
                &mut socket,
                ServerMessage::error(ErrorCode::Internal, "failed to load session"),
            )
            .await;
            None
        }
    }
}

async fn send_and_close(socket: &mut WebSocket, message: ServerMessage) {
    let _ = socket.send(Message::Text(message.to_json().into())).await;
    let _ = socket.send(Message::Close(None)).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use parley_llm::provider::{Provider, ProviderError, ProviderResult};
    use parley_store::MemoryStore;

    struct NoProviderFactory;

    #[async_trait]
    impl ProviderFactory for NoProviderFactory {
        async fn create_for_model(&self, _model: &str) -> ProviderResult<Arc<dyn Provider>> {
            Err(ProviderError::Auth {
                message: "no providers in this test".into(),
            })
        }
    }

    fn make_server() -> ParleyServer {
        ParleyServer::new(
            ServerConfig::default(),
            Arc::new(MemoryStore::new()),
            Arc::new(NoProviderFactory),
            OrchestratorConfig::default(),
        )
    }

    #[tokio::test]
    async fn server_with_default_config() {
        let server = make_server();
        assert_eq!(server.config().host, "127.0.0.1");
        assert_eq!(server.config().port, 0);
    }

    #[test]
    fn shutdown_coordinator_accessible() {
        let server = make_server();
        assert!(!server.shutdown().is_shutting_down());
        server.shutdown().shutdown();
        assert!(server.shutdown().is_shutting_down());
    }

    #[tokio::test]
    async fn hub_starts_empty() {
        let server = make_server();
        assert_eq!(server.hub().session_count().await, 0);
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let app = make_server().router();
        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["observers"], 0);
        assert_eq!(parsed["observed_sessions"], 0);
        assert!(parsed["uptime_secs"].is_number());
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let app = make_server().router();
        let req = Request::builder()
            .uri("/nonexistent")
            .body(Body::empty())
            .unwrap();

        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn ws_route_requires_upgrade() {
        let app = make_server().router();
        // Plain GET without upgrade headers is rejected before any session
        // lookup happens.
        let req = Request::builder()
            .uri("/ws/session/sess_1")
            .body(Body::empty())
            .unwrap();

        let resp = app.oneshot(req).await.unwrap();
        assert_ne!(resp.status(), StatusCode::OK);
    }
}
