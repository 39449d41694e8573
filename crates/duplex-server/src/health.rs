//! `/health` endpoint: uptime plus a snapshot of the session hub.

use std::time::Instant;

use duplex_ws::{ConnectionState, Hub};
use serde::Serialize;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Sessions currently registered in the hub.
    pub connections: usize,
    /// Registered sessions whose close handshake has started.
    pub closing: usize,
    /// IDs of the registered sessions, sorted.
    pub sessions: Vec<String>,
}

/// Snapshot `hub` into a health response.
pub fn health_check(start_time: Instant, hub: &Hub) -> HealthResponse {
    let conns = hub.connections();
    let closing = conns
        .iter()
        .filter(|c| c.state() != ConnectionState::Open)
        .count();
    let mut sessions: Vec<String> = conns.iter().map(|c| c.id().to_string()).collect();
    sessions.sort_unstable();

    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections: conns.len(),
        closing,
        sessions,
    }
}
