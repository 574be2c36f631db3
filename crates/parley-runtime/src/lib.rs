//! # parley-runtime
//!
//! The conversation engine: per-connection orchestration of the dual-stream
//! turn cycle (partner roleplay + coach commentary), aside threads, quota
//! enforcement, and resume replay.
//!
//! Transport and persistence are seams: frames leave through
//! [`FrameSink`]s, rows land through `parley-store`'s `ConversationStore`.
//! The server crate wires both to real sockets and a real backend.

#![deny(unsafe_code)]

pub mod context;
pub mod orchestrator;
pub mod sink;
pub mod state;
pub mod stream_driver;

pub use orchestrator::{Orchestrator, OrchestratorConfig};
pub use sink::{FrameSink, NullSink};
pub use state::{TurnSlot, TurnState};
pub use stream_driver::{drive, StreamEnd, StreamOutcome};
