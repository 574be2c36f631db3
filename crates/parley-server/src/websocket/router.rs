//! Inbound frame dispatch for participant sockets.
//!
//! Protocol-level checks (frame shape, length limits) happen here, before
//! the orchestrator is involved. Turn-starting frames are spawned so the
//! read loop stays responsive; in particular `aside:cancel` must be able to
//! land while an aside stream is in flight.

use std::sync::Arc;

use metrics::counter;
use tracing::debug;

use parley_core::errors::ErrorCode;
use parley_core::protocol::{
    decode_client_frame, ClientMessage, ServerMessage, ASIDE_MESSAGE_MAX_CHARS,
    MAIN_MESSAGE_MAX_CHARS,
};
use parley_runtime::{FrameSink, Orchestrator};

/// Route one inbound text frame.
pub async fn dispatch_frame(
    raw: &str,
    orchestrator: &Arc<Orchestrator>,
    client: &Arc<dyn FrameSink>,
) {
    let Some(frame) = decode_client_frame(raw) else {
        counter!("ws_invalid_frames_total").increment(1);
        client
            .send(ServerMessage::error(
                ErrorCode::InvalidMessage,
                "unrecognized frame",
            ))
            .await;
        return;
    };

    match frame {
        ClientMessage::Message { content } => {
            if content.chars().count() > MAIN_MESSAGE_MAX_CHARS {
                client
                    .send(ServerMessage::error(
                        ErrorCode::MessageTooLong,
                        format!("message exceeds {MAIN_MESSAGE_MAX_CHARS} characters"),
                    ))
                    .await;
                return;
            }
            let orchestrator = Arc::clone(orchestrator);
            drop(tokio::spawn(async move {
                orchestrator.handle_user_message(content).await;
            }));
        }
        ClientMessage::Ping => {
            // Idle reset happens in the read loop for any frame.
            debug!("ping");
        }
        ClientMessage::Resume { after_message_id } => {
            orchestrator.handle_resume(after_message_id).await;
        }
        ClientMessage::AsideStart { thread_id, content } => {
            if content.chars().count() > ASIDE_MESSAGE_MAX_CHARS {
                client
                    .send(ServerMessage::AsideError {
                        thread_id,
                        code: ErrorCode::MessageTooLong,
                        message: format!("question exceeds {ASIDE_MESSAGE_MAX_CHARS} characters"),
                    })
                    .await;
                return;
            }
            let orchestrator = Arc::clone(orchestrator);
            drop(tokio::spawn(async move {
                orchestrator.handle_aside_start(thread_id, content).await;
            }));
        }
        ClientMessage::AsideCancel { thread_id } => {
            orchestrator.handle_aside_cancel(thread_id).await;
        }
    }
}
