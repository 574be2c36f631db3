//! # parley-store
//!
//! Persistence contracts consumed by the orchestrator. The real backend
//! (the application's relational database) lives outside this repository;
//! [`ConversationStore`] is the seam it implements. [`MemoryStore`] is the
//! in-process implementation used by tests and local development.
//!
//! Contract notes:
//!
//! - Message ids are assigned at insert and strictly monotonic per session.
//! - Messages and usage rows are append-only; nothing here mutates or
//!   deletes them.
//! - Quota status is derived by summing usage rows per invitation, never by
//!   decrementing a stored counter.

#![deny(unsafe_code)]

pub mod memory;
pub mod store;

pub use memory::MemoryStore;
pub use store::{ConversationStore, StoreError, StoreResult};
