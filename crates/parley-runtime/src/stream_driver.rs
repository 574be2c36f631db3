//! Provider stream consumption.
//!
//! Pulls events off a [`CompletionStream`], hands each text fragment to a
//! relay callback in arrival order, and accumulates the full text for
//! persistence. The accumulated text is returned on every exit path so the
//! caller can persist partial content after a failure or cancellation.
//!
//! Cancellation wins ties: when a token is supplied, a fired token takes
//! priority over a ready stream item, and it unblocks the driver even if
//! the underlying stream never produces another event.

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use parley_core::usage::TokenUsage;
use parley_llm::provider::{CompletionStream, ProviderError, StreamEvent};

/// How a driven stream ended.
#[derive(Debug)]
pub enum StreamEnd {
    /// Provider signalled completion.
    Completed {
        /// Usage reported for the call.
        usage: TokenUsage,
    },
    /// Cancellation token fired mid-stream.
    Cancelled,
    /// Stream failed, or ended without a completion event.
    Failed(ProviderError),
}

/// Result of driving a stream to its end.
#[derive(Debug)]
pub struct StreamOutcome {
    /// Concatenation of every relayed fragment, in arrival order.
    pub text: String,
    /// Terminal condition.
    pub end: StreamEnd,
}

impl StreamOutcome {
    /// Whether any content arrived before the stream ended.
    #[must_use]
    pub fn has_text(&self) -> bool {
        !self.text.is_empty()
    }
}

/// Consume a stream, relaying each delta through `on_delta`.
///
/// The callback is awaited per fragment, so relay order matches arrival
/// order and backpressure from a slow sink pauses consumption.
pub async fn drive<F, Fut>(
    mut stream: CompletionStream,
    cancel: Option<CancellationToken>,
    mut on_delta: F,
) -> StreamOutcome
where
    F: FnMut(String) -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    let mut text = String::new();

    loop {
        let item = if let Some(ref token) = cancel {
            tokio::select! {
                biased;
                () = token.cancelled() => {
                    return StreamOutcome { text, end: StreamEnd::Cancelled };
                }
                item = stream.next() => item,
            }
        } else {
            stream.next().await
        };

        match item {
            Some(Ok(StreamEvent::Delta { text: delta })) => {
                text.push_str(&delta);
                on_delta(delta).await;
            }
            Some(Ok(StreamEvent::Done { usage })) => {
                return StreamOutcome {
                    text,
                    end: StreamEnd::Completed { usage },
                };
            }
            Some(Err(ProviderError::Cancelled)) => {
                return StreamOutcome { text, end: StreamEnd::Cancelled };
            }
            Some(Err(e)) => {
                return StreamOutcome { text, end: StreamEnd::Failed(e) };
            }
            // Ended without Done — a dropped connection, not success
            None => {
                return StreamOutcome {
                    text,
                    end: StreamEnd::Failed(ProviderError::Incomplete),
                };
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
