//! Error codes and the core error hierarchy.
//!
//! [`ErrorCode`] is the wire-format taxonomy: every failure a client can
//! observe maps to one code, with a `recoverable` flag deciding whether the
//! connection survives. [`CoreError`] is the internal counterpart used by
//! the orchestrator before a failure is lowered onto the wire.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Wire-format error codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Frame did not decode or carried an unknown type.
    InvalidMessage,
    /// Content exceeded the per-kind length limit.
    MessageTooLong,
    /// A main-thread turn is already in flight.
    RateLimited,
    /// Another aside is active, or main processing blocks asides.
    AsideBusy,
    /// Provider call failed after retries/fallback.
    ProviderError,
    /// Session id did not resolve to a session.
    SessionNotFound,
    /// Session is not owned by the connecting user.
    Unauthorized,
    /// Unexpected internal failure.
    Internal,
}

impl ErrorCode {
    /// Whether the connection stays open after this error.
    ///
    /// Session/authorization failures make the connection meaningless and
    /// are fatal; everything else is a recoverable notice.
    #[must_use]
    pub fn recoverable(self) -> bool {
        !matches!(self, Self::SessionNotFound | Self::Unauthorized)
    }

    /// Wire string for this code.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidMessage => "INVALID_MESSAGE",
            Self::MessageTooLong => "MESSAGE_TOO_LONG",
            Self::RateLimited => "RATE_LIMITED",
            Self::AsideBusy => "ASIDE_BUSY",
            Self::ProviderError => "PROVIDER_ERROR",
            Self::SessionNotFound => "SESSION_NOT_FOUND",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Internal => "INTERNAL",
        }
    }
}

/// Internal error type for orchestrator and transport failures.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Session id did not resolve.
    #[error("session not found: {session_id}")]
    SessionNotFound {
        /// The unresolved id.
        session_id: String,
    },

    /// Session owned by a different user.
    #[error("session {session_id} is not owned by the caller")]
    Unauthorized {
        /// The session id.
        session_id: String,
    },

    /// Unexpected internal failure.
    #[error("{0}")]
    Internal(String),
}

impl CoreError {
    /// The wire code this error lowers to.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::SessionNotFound { .. } => ErrorCode::SessionNotFound,
            Self::Unauthorized { .. } => ErrorCode::Unauthorized,
            Self::Internal(_) => ErrorCode::Internal,
        }
    }
}
