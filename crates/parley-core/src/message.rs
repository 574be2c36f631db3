//! Persisted conversation messages.
//!
//! A message records one turn of a session: who spoke (`user`, `partner`,
//! `coach`), which thread it belongs to (`main` or `aside`), and the text.
//! Messages are append-only — the orchestrator creates them and never
//! mutates or deletes them. Sequence ids are assigned by the store at
//! persistence time and are strictly monotonic within a session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Monotonic message sequence id, assigned by the store at insert.
pub type MessageId = u64;

/// Who produced a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// The human participant.
    User,
    /// The role-playing conversation partner.
    Partner,
    /// The coaching commentator.
    Coach,
}

/// Thread classification.
///
/// Main-thread messages form the user→partner→coach turn cycle. Aside
/// messages belong to a secondary coach-only Q&A thread and never appear
/// in main-thread provider context.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Thread {
    /// Primary user↔partner↔coach exchange.
    Main,
    /// Secondary coach-only question/answer exchange.
    Aside,
}

/// Metadata attached to a message at creation.
///
/// Only present on provider responses that ended abnormally: `incomplete`
/// marks partial content persisted after a failed or cancelled stream, and
/// `error` carries the failure description.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageMetadata {
    /// The stream ended before the provider finished.
    #[serde(default)]
    pub incomplete: bool,
    /// Error marker for failed streams.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MessageMetadata {
    /// Metadata for partial content persisted after a stream failure.
    #[must_use]
    pub fn incomplete(error: impl Into<String>) -> Self {
        Self {
            incomplete: true,
            error: Some(error.into()),
        }
    }
}

/// A persisted message row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    /// Monotonic sequence id.
    pub id: MessageId,
    /// Owning session.
    pub session_id: String,
    /// Speaker role.
    pub role: MessageRole,
    /// Message text.
    pub content: String,
    /// Thread classification.
    pub thread: Thread,
    /// Correlates an aside question with its answer. `None` on main thread.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    /// Abnormal-completion markers, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MessageMetadata>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl StoredMessage {
    /// Whether this message participates in the main thread.
    #[must_use]
    pub fn is_main(&self) -> bool {
        self.thread == Thread::Main
    }
}

/// A message to be persisted.
#[derive(Clone, Debug, PartialEq)]
pub struct NewMessage {
    /// Owning session.
    pub session_id: String,
    /// Speaker role.
    pub role: MessageRole,
    /// Message text.
    pub content: String,
    /// Thread classification.
    pub thread: Thread,
    /// Aside thread correlation id.
    pub thread_id: Option<String>,
    /// Abnormal-completion markers.
    pub metadata: Option<MessageMetadata>,
}

impl NewMessage {
    /// A main-thread message.
    #[must_use]
    pub fn main(session_id: impl Into<String>, role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            role,
            content: content.into(),
            thread: Thread::Main,
            thread_id: None,
            metadata: None,
        }
    }

    /// An aside-thread message correlated by `thread_id`.
    #[must_use]
    pub fn aside(
        session_id: impl Into<String>,
        role: MessageRole,
        content: impl Into<String>,
        thread_id: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            role,
            content: content.into(),
            thread: Thread::Aside,
            thread_id: Some(thread_id.into()),
            metadata: None,
        }
    }

    /// Attach abnormal-completion metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: MessageMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
