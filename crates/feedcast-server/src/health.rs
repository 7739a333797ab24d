//! `/health` endpoint body.

use std::time::Instant;

use serde::Serialize;

use crate::websocket::hub::{HubState, HubStats};

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// `"ok"` while accepting sessions, otherwise the hub state.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Registered WebSocket sessions.
    pub connections: usize,
    /// Hub lifecycle state.
    pub state: HubState,
}

impl HealthResponse {
    /// Whether the server should be considered healthy.
    pub fn is_healthy(&self) -> bool {
        self.state.is_accepting()
    }
}

/// Build a health response from hub counters.
pub fn health_check(start_time: Instant, stats: &HubStats) -> HealthResponse {
    let status = if stats.state.is_accepting() {
        "ok".to_owned()
    } else {
        stats.state.to_string()
    };
    HealthResponse {
        status,
        uptime_secs: start_time.elapsed().as_secs(),
        connections: stats.connections,
        state: stats.state,
    }
}
