//! `/health` endpoint.

use std::time::Instant;

use serde::Serialize;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Current observer connection count.
    pub observers: usize,
    /// Number of sessions with at least one observer.
    pub observed_sessions: usize,
}

/// Build a health response from live counters.
pub fn health_check(start_time: Instant, observers: usize, observed_sessions: usize) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        observers,
        observed_sessions,
    }
}
