//! # parley-core
//!
//! Foundation types for the Parley conversation orchestrator.
//!
//! This crate provides the shared vocabulary the other Parley crates depend on:
//!
//! - **Protocol**: the WebSocket wire vocabulary (`ServerMessage`, `ClientMessage`)
//!   and the tolerant frame decoder
//! - **Messages**: persisted conversation turns with role and thread classification
//! - **Sessions**: the loaded session record with scenario or custom prompt config
//! - **Quotas**: invitation-bound token budgets and their derived status
//! - **Errors**: wire-format error codes and the core error hierarchy
//! - **Retry**: the linear-backoff retry plan used for provider calls

#![deny(unsafe_code)]

pub mod errors;
pub mod message;
pub mod protocol;
pub mod quota;
pub mod retry;
pub mod session;
pub mod usage;

pub use errors::{CoreError, ErrorCode};
pub use message::{MessageId, MessageMetadata, MessageRole, NewMessage, StoredMessage, Thread};
pub use protocol::{ClientMessage, ServerMessage, decode_client_frame};
pub use quota::{QuotaDefinition, QuotaStatus};
pub use session::{PromptConfig, RolePrompt, Scenario, ScenarioSummary, SessionRecord};
pub use usage::{NewUsageRecord, StreamKind, TokenUsage, UsageRecord};
