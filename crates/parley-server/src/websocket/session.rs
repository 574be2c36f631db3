//! WebSocket session lifecycle — participant and observer sockets, from
//! upgrade through disconnect.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use parley_core::protocol::ServerMessage;
use parley_runtime::{FrameSink, Orchestrator};

use super::connection::ClientConnection;
use super::hub::ObserverHub;
use super::router::dispatch_frame;

/// Interval between server-initiated Ping frames.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Run a participant session over a connected socket.
///
/// 1. Spawns the outbound forwarder (frames + periodic pings)
/// 2. Sends the `connected` / `history` handshake
/// 3. Dispatches inbound frames until close, error, or idle timeout
/// 4. Cleans up the outbound task on exit
#[instrument(skip_all, fields(session_id = %orchestrator.session_id(), conn_id = %connection.id))]
pub async fn run_participant_session(
    ws: WebSocket,
    orchestrator: Arc<Orchestrator>,
    client_sink: Arc<dyn FrameSink>,
    connection: Arc<ClientConnection>,
    send_rx: mpsc::Receiver<Arc<String>>,
    idle_timeout: Duration,
) {
    let (ws_tx, mut ws_rx) = ws.split();

    info!("participant connected");
    counter!("ws_connections_total", "role" => "participant").increment(1);
    gauge!("ws_connections_active").increment(1.0);

    let outbound = spawn_outbound(ws_tx, send_rx);
    orchestrator.initialize().await;

    loop {
        let inbound = tokio::time::timeout(idle_timeout, ws_rx.next()).await;
        let msg = match inbound {
            Err(_) => {
                info!(timeout_secs = idle_timeout.as_secs(), "idle timeout, closing");
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(e))) => {
                debug!(error = %e, "socket read error");
                break;
            }
            Ok(Some(Ok(msg))) => msg,
        };

        let text = match msg {
            Message::Text(ref t) => Some(t.to_string()),
            Message::Binary(ref data) => match std::str::from_utf8(data) {
                Ok(s) => Some(s.to_owned()),
                Err(_) => {
                    debug!(len = data.len(), "non-UTF8 binary frame, ignoring");
                    None
                }
            },
            Message::Close(_) => {
                info!("client sent close frame");
                break;
            }
            // Any frame resets the idle window; pings need nothing more.
            Message::Ping(_) | Message::Pong(_) => None,
        };

        if let Some(text) = text {
            dispatch_frame(&text, &orchestrator, &client_sink).await;
        }
    }

    info!("participant disconnected");
    counter!("ws_disconnections_total", "role" => "participant").increment(1);
    gauge!("ws_connections_active").decrement(1.0);
    histogram!("ws_connection_duration_seconds").record(connection.age().as_secs_f64());
    outbound.abort();
}

/// Run an observer session: snapshot handshake, then a read-only relay.
///
/// The handshake frames are enqueued before the hub subscription, so an
/// observer never sees a live frame ahead of its history snapshot. Inbound
/// text is ignored; the socket closes on close frame, error, or idle
/// timeout.
#[instrument(skip_all, fields(session_id = %session_id, conn_id = %connection.id))]
pub async fn run_observer_session(
    ws: WebSocket,
    session_id: String,
    handshake: Vec<ServerMessage>,
    hub: Arc<ObserverHub>,
    connection: Arc<ClientConnection>,
    send_rx: mpsc::Receiver<Arc<String>>,
    idle_timeout: Duration,
) {
    let (ws_tx, mut ws_rx) = ws.split();

    info!("observer connected");
    counter!("ws_connections_total", "role" => "observer").increment(1);
    gauge!("ws_observers_active").increment(1.0);

    let outbound = spawn_outbound(ws_tx, send_rx);

    for frame in handshake {
        let _ = connection.send(Arc::new(frame.to_json()));
    }
    hub.subscribe(&session_id, Arc::clone(&connection)).await;

    loop {
        let inbound = tokio::time::timeout(idle_timeout, ws_rx.next()).await;
        match inbound {
            Err(_) => {
                info!("observer idle timeout, closing");
                break;
            }
            Ok(None) | Ok(Some(Err(_))) | Ok(Some(Ok(Message::Close(_)))) => break,
            Ok(Some(Ok(Message::Text(_) | Message::Binary(_)))) => {
                // Observers are read-only.
                debug!("ignoring inbound frame from observer");
            }
            Ok(Some(Ok(Message::Ping(_) | Message::Pong(_)))) => {}
        }
    }

    info!("observer disconnected");
    counter!("ws_disconnections_total", "role" => "observer").increment(1);
    gauge!("ws_observers_active").decrement(1.0);
    hub.unsubscribe(&session_id, &connection.id).await;
    outbound.abort();
}

/// Forward queued frames to the socket, interleaving periodic pings.
fn spawn_outbound(
    mut ws_tx: futures::stream::SplitSink<WebSocket, Message>,
    mut send_rx: mpsc::Receiver<Arc<String>>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(PING_INTERVAL);
        // Skip the immediate first tick
        let _ = ping_interval.tick().await;

        loop {
            tokio::select! {
                msg = send_rx.recv() => {
                    match msg {
                        Some(frame) => {
                            if ws_tx.send(Message::Text(frame.as_str().into())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = ping_interval.tick() => {
                    if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                        warn!("ping failed, outbound closing");
                        break;
                    }
                }
            }
        }
    })
}
