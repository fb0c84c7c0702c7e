//! Controller status.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/status", get(get_status))
}

/// GET /api/status: current generation, job counts and timing policy.
async fn get_status(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let status = state.controller.status();
    let runtime = state.controller.scheduler().config();
    let active: Vec<String> = state
        .controller
        .active_jobs()
        .iter()
        .map(|key| key.to_string())
        .collect();

    Json(serde_json::json!({
        "generation": status.generation,
        "requestId": status.request_id,
        "version": status.version,
        "settled": status.settled,
        "activeJobs": status.active_jobs,
        "active": active,
        "inFlight": status.in_flight,
        "maxInFlight": status.max_in_flight,
        "pollIntervalMs": runtime.poll_interval.as_millis() as u64,
        "jobTimeoutSecs": runtime.job_timeout.as_secs(),
        "port": state.config.port,
    }))
}
