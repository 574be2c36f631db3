//! # Provider Trait
//!
//! Core abstraction over LLM backends. Every provider adapter implements
//! [`Provider`] to expose a uniform streaming interface: a request goes in,
//! a lazy sequence of incremental events comes out.
//!
//! The trait returns a boxed [`Stream`] of [`StreamEvent`]s so the runtime
//! can relay tokens incrementally regardless of the underlying API format.
//! A stream that ends without [`StreamEvent::Done`] must be treated by the
//! consumer as a failure, never as silent success.

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;
use tokio_util::sync::CancellationToken;

use parley_core::usage::TokenUsage;

/// Result type alias for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Boxed stream of [`StreamEvent`]s returned by [`Provider::stream`].
pub type CompletionStream =
    Pin<Box<dyn Stream<Item = Result<StreamEvent, ProviderError>> + Send>>;

/// Incremental events produced by a provider stream.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamEvent {
    /// Incremental generated text.
    Delta {
        /// Text fragment.
        text: String,
    },
    /// Stream completed; final token usage.
    Done {
        /// Usage for the whole call.
        usage: TokenUsage,
    },
}

/// Generic role for provider context messages.
///
/// Domain roles (partner, coach) are mapped onto this pair before a call;
/// the provider never sees Parley's role vocabulary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatRole {
    /// Maps to the provider's user role.
    User,
    /// Maps to the provider's assistant role.
    Assistant,
}

/// One message of provider context.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatMessage {
    /// Generic role.
    pub role: ChatRole,
    /// Message text.
    pub content: String,
}

impl ChatMessage {
    /// A user-role context message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    /// An assistant-role context message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// A single completion call.
#[derive(Clone, Debug, Default)]
pub struct CompletionRequest {
    /// Model identifier.
    pub model: String,
    /// System prompt.
    pub system_prompt: String,
    /// Ordered role-tagged context.
    pub messages: Vec<ChatMessage>,
    /// Token cap for the response.
    pub max_tokens: Option<u32>,
    /// Enable supplementary web grounding (search-capable models only).
    pub web_search: bool,
    /// Cooperative cancellation signal.
    pub cancel: Option<CancellationToken>,
}

/// Errors that can occur during provider operations.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Authentication failed (expired token, invalid key, etc.).
    #[error("Auth error: {message}")]
    Auth {
        /// Error description.
        message: String,
    },

    /// Rate limited by the provider.
    #[error("Rate limited: {message}")]
    RateLimited {
        /// Suggested retry delay in milliseconds, if advertised.
        retry_after_ms: Option<u64>,
        /// Error description.
        message: String,
    },

    /// Provider returned an API error.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error description.
        message: String,
        /// Provider-specific error code.
        code: Option<String>,
        /// Whether this error can be retried.
        retryable: bool,
    },

    /// Stream was cancelled.
    #[error("Stream cancelled")]
    Cancelled,

    /// Stream ended without a completion event (connection drop).
    #[error("Stream ended without completion")]
    Incomplete,

    /// Provider-specific error.
    #[error("{message}")]
    Other {
        /// Error description.
        message: String,
    },
}

/// Error codes providers use for exhausted billing quotas.
const QUOTA_ERROR_CODES: &[&str] = &["quota_exceeded", "insufficient_quota", "resource_exhausted"];

impl ProviderError {
    /// Whether this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().is_some_and(|s| {
                        s == reqwest::StatusCode::TOO_MANY_REQUESTS || s.is_server_error()
                    })
            }
            Self::RateLimited { .. } | Self::Incomplete => true,
            Self::Api { retryable, .. } => *retryable,
            Self::Auth { .. } | Self::Cancelled | Self::Json(_) | Self::Other { .. } => false,
        }
    }

    /// Whether this is a quota/rate-limit class failure, eligible for the
    /// one-shot fallback substitution on search-capable models.
    pub fn is_quota_class(&self) -> bool {
        match self {
            Self::RateLimited { .. } => true,
            Self::Http(e) => e
                .status()
                .is_some_and(|s| s == reqwest::StatusCode::TOO_MANY_REQUESTS),
            Self::Api { status, code, .. } => {
                *status == 429
                    || code
                        .as_deref()
                        .is_some_and(|c| QUOTA_ERROR_CODES.contains(&c))
            }
            _ => false,
        }
    }

    /// Suggested retry delay in milliseconds, if the provider advertised one.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_ms, .. } => *retry_after_ms,
            _ => None,
        }
    }

    /// Error category string for logging and metrics.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Http(_) => "network",
            Self::Json(_) => "parse",
            Self::Auth { .. } => "auth",
            Self::RateLimited { .. } => "rate_limit",
            Self::Api { .. } => "api",
            Self::Cancelled => "cancelled",
            Self::Incomplete => "incomplete",
            Self::Other { .. } => "unknown",
        }
    }
}

/// Core LLM provider trait.
///
/// Implementors must be `Send + Sync` for use across async tasks. The
/// [`stream`](Provider::stream) method returns a single-consumption stream
/// of [`StreamEvent`]s; the caller consumes events until
/// [`StreamEvent::Done`] or an error item.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Current model ID.
    fn model(&self) -> &str;

    /// Stream a completion.
    async fn stream(&self, request: &CompletionRequest) -> ProviderResult<CompletionStream>;
}

impl std::fmt::Debug for dyn Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider").field("model", &self.model()).finish()
    }
}

/// Factory for creating providers on demand.
///
/// Called once per provider call so model substitutions (fallback) take
/// effect immediately and credentials are always current.
#[async_trait]
pub trait ProviderFactory: Send + Sync {
    /// Create a provider for the given model ID.
    ///
    /// Returns [`ProviderError::Auth`] if no credentials are available for
    /// the model's backend.
    async fn create_for_model(&self, model: &str) -> ProviderResult<Arc<dyn Provider>>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
