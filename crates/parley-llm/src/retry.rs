//! # Stream Retry and Fallback
//!
//! Wraps a provider stream factory with the per-call retry budget and the
//! one-shot fallback substitution.
//!
//! **Key constraint**: restarts are only possible while no event has been
//! yielded yet. Once the first [`StreamEvent`] reaches the caller, the
//! caller has acted on it (deltas were relayed to sockets), so a later
//! error is passed through instead of restarting the stream.
//!
//! The wrapper:
//! 1. Calls the stream factory with the current model
//! 2. On a quota-class failure of a web-search-capable model, substitutes
//!    the catalog's fallback model (search disabled) exactly once and
//!    restarts the attempt loop
//! 3. On other retryable failures, waits with linear backoff and retries,
//!    up to the plan's budget
//! 4. Treats a stream that ends without [`StreamEvent::Done`] as a failure
//! 5. Respects cancellation via `CancellationToken`

use std::future::Future;
use std::pin::Pin;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use parley_core::retry::RetryPlan;

use crate::models::ModelCatalog;
use crate::provider::{CompletionStream, ProviderError, ProviderResult, StreamEvent};

/// Type alias for the stream factory function.
///
/// Called on each attempt with the active model and web-search flag.
pub type StreamFactory = Box<
    dyn Fn(String, bool) -> Pin<Box<dyn Future<Output = ProviderResult<CompletionStream>> + Send>>
        + Send,
>;

/// Configuration for one wrapped provider call.
#[derive(Clone, Debug)]
pub struct FailoverConfig {
    /// Preferred model for the call.
    pub model: String,
    /// Whether web grounding is requested (honored only while the active
    /// model supports it).
    pub web_search: bool,
    /// Retry budget and backoff pacing.
    pub retry: RetryPlan,
    /// Capability catalog deciding fallback eligibility.
    pub catalog: ModelCatalog,
    /// Cancellation token for aborting waits.
    pub cancel: Option<CancellationToken>,
}

/// Wrap a stream factory with retry and fallback logic.
///
/// Returns a stream that transparently restarts failed calls per the rules
/// above. Errors that survive the policy are yielded as the final item.
pub fn stream_with_failover(factory: StreamFactory, config: FailoverConfig) -> CompletionStream {
    type Item = Result<StreamEvent, ProviderError>;

    Box::pin(async_stream::stream! {
        let mut model = config.model.clone();
        let mut web_search = config.web_search && config.catalog.supports_web_search(&model);
        let mut attempt = 0u32;
        let mut fell_back = false;
        let mut has_yielded = false;

        loop {
            let attempt_error: ProviderError;

            match factory(model.clone(), web_search).await {
                Ok(inner) => {
                    let mut inner = std::pin::pin!(inner);
                    let mut failure: Option<ProviderError> = None;
                    let mut done_seen = false;
                    while let Some(item) = inner.next().await {
                        match item {
                            Ok(event) => {
                                done_seen = matches!(event, StreamEvent::Done { .. });
                                has_yielded = true;
                                let v: Item = Ok(event);
                                yield v;
                                if done_seen {
                                    break;
                                }
                            }
                            Err(e) => {
                                failure = Some(e);
                                break;
                            }
                        }
                    }
                    if done_seen {
                        break;
                    }
                    // Ended without Done — a dropped connection, not success
                    attempt_error = failure.unwrap_or(ProviderError::Incomplete);
                }
                Err(e) => attempt_error = e,
            }

            // Once data has flowed the caller acted on it — no restart.
            if has_yielded {
                let v: Item = Err(attempt_error);
                yield v;
                break;
            }

            // One-shot substitution: search-capable model, quota-class error.
            if !fell_back
                && attempt_error.is_quota_class()
                && config.catalog.supports_web_search(&model)
            {
                warn!(
                    from = %model,
                    to = %config.catalog.fallback_model(),
                    "quota-class failure on search-capable model, substituting fallback"
                );
                metrics::counter!("provider_fallbacks_total").increment(1);
                model = config.catalog.fallback_model().to_owned();
                web_search = false;
                fell_back = true;
                attempt = 0;
                continue;
            }

            if !attempt_error.is_retryable() || attempt >= config.retry.max_retries {
                let v: Item = Err(attempt_error);
                yield v;
                break;
            }

            if let Some(ref token) = config.cancel {
                if token.is_cancelled() {
                    let v: Item = Err(ProviderError::Cancelled);
                    yield v;
                    break;
                }
            }

            attempt += 1;
            let backoff_ms = config.retry.delay_ms(attempt);
            // Respect Retry-After if advertised (use the larger value)
            let delay_ms = attempt_error
                .retry_after_ms()
                .map_or(backoff_ms, |ra| backoff_ms.max(ra));

            metrics::counter!("provider_retries_total", "category" => attempt_error.category())
                .increment(1);
            debug!(
                attempt,
                max_retries = config.retry.max_retries,
                delay_ms,
                category = attempt_error.category(),
                "retrying provider call"
            );

            if let Some(ref token) = config.cancel {
                tokio::select! {
                    () = tokio::time::sleep(std::time::Duration::from_millis(delay_ms)) => {}
                    () = token.cancelled() => {
                        let v: Item = Err(ProviderError::Cancelled);
                        yield v;
                        break;
                    }
                }
            } else {
                tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
            }
        }
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
