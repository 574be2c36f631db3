//! Token usage accounting.
//!
//! One [`UsageRecord`] is written per provider call. Records are write-only
//! from the orchestrator's perspective; quota enforcement reads them back in
//! aggregate (summed per invitation) rather than decrementing a counter in
//! place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which stream a usage record accounts for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    /// Partner response on the main thread.
    Partner,
    /// Coach response on the main thread.
    Coach,
    /// Coach response on an aside thread.
    Aside,
}

/// Token usage reported by a completed provider stream.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    /// Prompt tokens consumed.
    pub input_tokens: u64,
    /// Tokens generated.
    pub output_tokens: u64,
}

impl TokenUsage {
    /// Total tokens attributed to the call.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// A usage row to be persisted.
#[derive(Clone, Debug, PartialEq)]
pub struct NewUsageRecord {
    /// Owning session.
    pub session_id: String,
    /// Owning user.
    pub user_id: String,
    /// Invitation the tokens count against, if any.
    pub invitation_id: Option<String>,
    /// Which stream produced this usage.
    pub stream: StreamKind,
    /// Reported usage.
    pub usage: TokenUsage,
}

/// A persisted usage row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    /// Row id.
    pub id: u64,
    /// Owning session.
    pub session_id: String,
    /// Owning user.
    pub user_id: String,
    /// Invitation link, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invitation_id: Option<String>,
    /// Which stream produced this usage.
    pub stream: StreamKind,
    /// Reported usage.
    pub usage: TokenUsage,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}
