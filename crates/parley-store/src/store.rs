//! The `ConversationStore` trait — the orchestrator's persistence seam.

use async_trait::async_trait;

use parley_core::message::{MessageId, NewMessage, StoredMessage};
use parley_core::quota::{QuotaDefinition, QuotaStatus};
use parley_core::session::SessionRecord;
use parley_core::usage::{NewUsageRecord, UsageRecord};

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced by a store backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Session id did not resolve.
    #[error("session not found: {session_id}")]
    SessionNotFound {
        /// The unresolved id.
        session_id: String,
    },

    /// Backend failure (connection, constraint, serialization).
    #[error("storage error: {message}")]
    Backend {
        /// Error description.
        message: String,
    },
}

impl StoreError {
    /// Backend failure from any displayable error.
    #[must_use]
    pub fn backend(err: impl std::fmt::Display) -> Self {
        Self::Backend {
            message: err.to_string(),
        }
    }
}

/// Persistence operations the orchestrator depends on.
///
/// Each method is an independently-committed step: the main turn cycle is a
/// sequence of single-statement writes, not one spanning transaction, and
/// partial completion (partner persisted, coach never ran) is an accepted
/// recoverable end state.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Load a session with its prompt config, invitation link, and history.
    async fn load_session(&self, session_id: &str) -> StoreResult<SessionRecord>;

    /// Persist a message, assigning the next monotonic id.
    async fn create_message(&self, message: NewMessage) -> StoreResult<StoredMessage>;

    /// Messages with id greater than `after` (all, if `None`), ascending.
    async fn messages_after(
        &self,
        session_id: &str,
        after: Option<MessageId>,
    ) -> StoreResult<Vec<StoredMessage>>;

    /// Persist one usage row.
    async fn log_usage(&self, record: NewUsageRecord) -> StoreResult<UsageRecord>;

    /// Total tokens consumed against an invitation.
    async fn usage_total(&self, invitation_id: &str) -> StoreResult<u64>;

    /// Derived quota status for an invitation.
    ///
    /// Default implementation sums usage and applies the definition.
    async fn quota_status(
        &self,
        invitation_id: &str,
        definition: QuotaDefinition,
    ) -> StoreResult<QuotaStatus> {
        let consumed = self.usage_total(invitation_id).await?;
        Ok(QuotaStatus::from_consumed(definition, consumed))
    }
}
