//! Outbound frame seam.
//!
//! The orchestrator never touches a socket. It emits [`ServerMessage`]s
//! through a [`FrameSink`]: one sink for the owning participant connection
//! and one for the session's observer fan-out. Delivery is best-effort —
//! a closed socket or an empty observer set is the sink's problem, not the
//! orchestrator's.

use async_trait::async_trait;

use parley_core::protocol::ServerMessage;

/// Destination for server→client frames.
#[async_trait]
pub trait FrameSink: Send + Sync {
    /// Deliver one frame. Completes once the frame has been handed to the
    /// transport (queued or broadcast), preserving emission order.
    async fn send(&self, message: ServerMessage);
}

/// Sink that discards everything. Stands in for the observer fan-out when
/// a session has no hub attached.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

#[async_trait]
impl FrameSink for NullSink {
    async fn send(&self, _message: ServerMessage) {}
}
