//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub topology: memo_core::ContentTopology,
    pub orphans: u64,
    pub importance_scoring: bool,
}

/// Liveness only; backends are not contacted.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        topology: state.memories.topology(),
        orphans: state.memories.orphan_count(),
        importance_scoring: state.config.memory.score_importance,
    })
}
