//! Retry plan for provider calls.
//!
//! Portable, sync-only building blocks: the plan (attempt budget, base
//! delay) and the delay math. The async retry execution lives in
//! `parley-llm`, which has access to tokio.
//!
//! Backoff is linear — attempt number × base delay — matching the pacing
//! the provider endpoints expect for transient errors.

use serde::{Deserialize, Serialize};

/// Default retry budget per provider call.
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Default base delay between retries, in milliseconds.
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;

/// Retry parameters for one provider call.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPlan {
    /// Maximum retry attempts after the initial call.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base delay multiplied by the attempt number.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}
fn default_base_delay_ms() -> u64 {
    DEFAULT_BASE_DELAY_MS
}

impl Default for RetryPlan {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
        }
    }
}

impl RetryPlan {
    /// Linear backoff delay for a 1-based attempt number.
    #[must_use]
    pub fn delay_ms(&self, attempt: u32) -> u64 {
        u64::from(attempt).saturating_mul(self.base_delay_ms)
    }
}
