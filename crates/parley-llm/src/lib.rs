//! # parley-llm
//!
//! Provider streaming abstraction for the Parley orchestrator.
//!
//! The [`Provider`] trait defines the contract: a request goes in, a lazy
//! single-consumption event stream comes out (`delta` → `done`, or an
//! error). [`retry::stream_with_failover`] wraps any provider call with the
//! retry budget and the one-shot web-search fallback substitution, and
//! [`openai::OpenAiProvider`] is the concrete adapter for OpenAI-compatible
//! streaming chat completions endpoints.

#![deny(unsafe_code)]

pub mod models;
pub mod openai;
pub mod provider;
pub mod retry;
pub mod sse;

pub use models::ModelCatalog;
pub use openai::{OpenAiCompatibleFactory, OpenAiConfig, OpenAiProvider};
pub use provider::{
    ChatMessage, ChatRole, CompletionRequest, CompletionStream, Provider, ProviderError,
    ProviderFactory, ProviderResult, StreamEvent,
};
pub use retry::{FailoverConfig, StreamFactory, stream_with_failover};
