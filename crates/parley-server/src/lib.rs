//! # parley-server
//!
//! Axum WebSocket server for Parley sessions. Each participant socket gets
//! its own [`Orchestrator`](parley_runtime::Orchestrator) wired to the
//! shared store and provider factory; observers of the same session receive
//! every conversation-visible frame through the [`ObserverHub`].
//!
//! [`ObserverHub`]: websocket::hub::ObserverHub

#![deny(unsafe_code)]

pub mod config;
pub mod health;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use server::{AppState, ParleyServer};
pub use shutdown::ShutdownCoordinator;
pub use websocket::hub::ObserverHub;
