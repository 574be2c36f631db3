//! Invitation token quotas.
//!
//! A quota is a fixed token budget attached to an invitation. Consumption is
//! derived by summing usage rows for that invitation — the budget itself is
//! never decremented. The orchestrator checks the derived status before
//! every main-thread turn (hard gate) and again after usage is logged
//! (warning / exhaustion signal).

use serde::{Deserialize, Serialize};

/// Remaining-ratio threshold below which `quota:warning` is emitted.
pub const QUOTA_WARNING_RATIO: f64 = 0.2;

/// The token budget attached to an invitation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaDefinition {
    /// Total tokens granted.
    pub total_tokens: u64,
}

/// Derived quota state for one invitation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaStatus {
    /// Whether another main-thread turn may start.
    pub allowed: bool,
    /// Tokens left.
    pub remaining: u64,
    /// Total tokens granted.
    pub total: u64,
}

impl QuotaStatus {
    /// Derive status from a budget and the summed consumption.
    #[must_use]
    pub fn from_consumed(definition: QuotaDefinition, consumed: u64) -> Self {
        let remaining = definition.total_tokens.saturating_sub(consumed);
        Self {
            allowed: remaining > 0,
            remaining,
            total: definition.total_tokens,
        }
    }

    /// Whether remaining budget has dropped under [`QUOTA_WARNING_RATIO`].
    #[must_use]
    pub fn is_warning(&self) -> bool {
        if self.total == 0 {
            return false;
        }
        self.remaining > 0 && (self.remaining as f64) < (self.total as f64) * QUOTA_WARNING_RATIO
    }

    /// Whether the budget is fully consumed.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }
}
