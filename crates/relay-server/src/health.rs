//! `/health` endpoint body.

use std::time::Instant;

use serde::Serialize;

/// Health check response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// `"ok"` while the server runs.
    pub status: &'static str,
    /// Seconds since start.
    pub uptime_secs: u64,
    /// Open WebSocket connections.
    pub connections: usize,
    /// Non-empty rooms, personal channels included.
    pub rooms: usize,
    /// Devices with at least one joined mission.
    pub tracked_devices: usize,
}

/// Build a health response from live counters.
pub fn health_check(
    start_time: Instant,
    connections: usize,
    rooms: usize,
    tracked_devices: usize,
) -> HealthResponse {
    HealthResponse {
        status: "ok",
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
        rooms,
        tracked_devices,
    }
}
