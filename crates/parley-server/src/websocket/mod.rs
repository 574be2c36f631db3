//! WebSocket transport: connections, observer fan-out, frame routing, and
//! session lifecycles.

pub mod connection;
pub mod hub;
pub mod router;
pub mod session;
