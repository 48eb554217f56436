//! `/health` endpoint.

use std::time::Instant;

use pulse_analysis::PipelineStatsSnapshot;
use serde::Serialize;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Connections held by the hub.
    pub connections: usize,
    /// Sessions in the store.
    pub sessions: usize,
    /// Sessions active within the inactivity timeout.
    pub active_sessions: usize,
    /// Whether the analysis pipeline is draining requests.
    pub analysis_running: bool,
    /// Analysis pipeline counters.
    pub pipeline: PipelineStatsSnapshot,
}

/// Live counters gathered by the handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct HealthInputs {
    /// Connections held by the hub.
    pub connections: usize,
    /// Sessions in the store.
    pub sessions: usize,
    /// Active sessions.
    pub active_sessions: usize,
    /// Pipeline running flag.
    pub analysis_running: bool,
    /// Pipeline counters.
    pub pipeline: PipelineStatsSnapshot,
}

/// Build a health response from live counters.
pub fn health_check(start_time: Instant, inputs: HealthInputs) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections: inputs.connections,
        sessions: inputs.sessions,
        active_sessions: inputs.active_sessions,
        analysis_running: inputs.analysis_running,
        pipeline: inputs.pipeline,
    }
}
