//! WebSocket wire protocol.
//!
//! Defines the message vocabulary exchanged over a session socket and the
//! tolerant decoder for inbound frames. Server→client messages use a `type`
//! discriminator with namespaced kinds (`partner:delta`, `aside:done`, …);
//! client→server frames use the same shape.
//!
//! Decode contract: a frame that does not parse, or parses without a
//! recognized `type`, yields `None` — never an error and never a panic. The
//! caller decides whether to answer with a protocol-level error frame.

use serde::{Deserialize, Serialize};
use tracing::error;

use crate::errors::ErrorCode;
use crate::message::{MessageId, StoredMessage};
use crate::session::ScenarioSummary;
use crate::usage::TokenUsage;

/// Maximum length of a main-thread user message, in characters.
pub const MAIN_MESSAGE_MAX_CHARS: usize = 10_000;

/// Maximum length of an aside question, in characters.
pub const ASIDE_MESSAGE_MAX_CHARS: usize = 2_000;

/// Idle window after which the transport closes a silent connection.
pub const IDLE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30 * 60);

// ─────────────────────────────────────────────────────────────────────────────
// Server → client
// ─────────────────────────────────────────────────────────────────────────────

/// Messages sent from the server to a participant or observer socket.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Connection established and session bound.
    #[serde(rename = "connected", rename_all = "camelCase")]
    Connected {
        /// Bound session id.
        session_id: String,
        /// Scenario summary for the client header.
        scenario: ScenarioSummary,
    },

    /// Ordered batch of messages — initial replay, resume replay, and
    /// incremental broadcast all use this frame.
    #[serde(rename = "history")]
    History {
        /// Messages in ascending id order.
        messages: Vec<StoredMessage>,
    },

    /// Incremental partner text.
    #[serde(rename = "partner:delta")]
    PartnerDelta {
        /// Text fragment.
        delta: String,
    },

    /// Partner response complete and persisted.
    #[serde(rename = "partner:done", rename_all = "camelCase")]
    PartnerDone {
        /// Persisted message id.
        message_id: MessageId,
        /// Token usage for the call.
        usage: TokenUsage,
    },

    /// Incremental coach text.
    #[serde(rename = "coach:delta")]
    CoachDelta {
        /// Text fragment.
        delta: String,
    },

    /// Coach response complete and persisted.
    #[serde(rename = "coach:done", rename_all = "camelCase")]
    CoachDone {
        /// Persisted message id.
        message_id: MessageId,
        /// Token usage for the call.
        usage: TokenUsage,
    },

    /// Incremental aside text, scoped by thread.
    #[serde(rename = "aside:delta", rename_all = "camelCase")]
    AsideDelta {
        /// Aside thread id.
        thread_id: String,
        /// Text fragment.
        delta: String,
    },

    /// Aside answer complete and persisted.
    #[serde(rename = "aside:done", rename_all = "camelCase")]
    AsideDone {
        /// Aside thread id.
        thread_id: String,
        /// Persisted message id.
        message_id: MessageId,
        /// Token usage for the call.
        usage: TokenUsage,
    },

    /// Aside rejected or failed.
    #[serde(rename = "aside:error", rename_all = "camelCase")]
    AsideError {
        /// Aside thread id.
        thread_id: String,
        /// Failure code.
        code: ErrorCode,
        /// Human-readable description.
        message: String,
    },

    /// Typed failure signal.
    #[serde(rename = "error")]
    Error {
        /// Failure code.
        code: ErrorCode,
        /// Human-readable description.
        message: String,
        /// Whether the connection stays open.
        recoverable: bool,
    },

    /// Remaining quota dropped under the warning threshold.
    #[serde(rename = "quota:warning")]
    QuotaWarning {
        /// Tokens left.
        remaining: u64,
        /// Total tokens granted.
        total: u64,
    },

    /// Quota fully consumed.
    #[serde(rename = "quota:exhausted")]
    QuotaExhausted,
}

impl ServerMessage {
    /// Build an error frame from a code, deriving `recoverable`.
    #[must_use]
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error {
            code,
            message: message.into(),
            recoverable: code.recoverable(),
        }
    }

    /// Serialize for the wire.
    ///
    /// Serialization of this vocabulary cannot fail in practice; if it ever
    /// does, an empty object is sent and the failure is logged rather than
    /// crashing the connection.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            error!(error = %e, "failed to serialize server message");
            "{}".to_owned()
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Client → server
// ─────────────────────────────────────────────────────────────────────────────

/// Messages sent from a participant socket to the server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Main-thread user turn.
    #[serde(rename = "message")]
    Message {
        /// Message text.
        content: String,
    },

    /// Liveness / idle-reset only.
    #[serde(rename = "ping")]
    Ping,

    /// Request replay of messages after a given id (all, if omitted).
    #[serde(rename = "resume", rename_all = "camelCase")]
    Resume {
        /// Replay messages with id greater than this.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        after_message_id: Option<MessageId>,
    },

    /// Start an aside thread.
    #[serde(rename = "aside:start", rename_all = "camelCase")]
    AsideStart {
        /// Client-chosen thread id.
        thread_id: String,
        /// Question text.
        content: String,
    },

    /// Cancel the active aside thread.
    #[serde(rename = "aside:cancel", rename_all = "camelCase")]
    AsideCancel {
        /// Thread id to cancel.
        thread_id: String,
    },
}

/// Decode an inbound frame.
///
/// Returns `None` for anything that is not a recognized client message —
/// malformed JSON, a missing or unknown `type`, or mismatched fields.
#[must_use]
pub fn decode_client_frame(raw: &str) -> Option<ClientMessage> {
    serde_json::from_str(raw).ok()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
