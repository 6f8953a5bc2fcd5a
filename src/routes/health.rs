//! The liveness/health endpoint (ambient, §4.8).
//!
//! Never gated behind the domain error taxonomy of §7: this handler cannot
//! fail.

use axum::{Json, extract::State};

use chrono::Utc;

use serde::Serialize;

use pcg_arena_model::PROTOCOL_VERSION;

use crate::app::AppState;

/// `GET /health` response body. Deliberately not wrapped in the standard
/// envelope: this is an operator-facing liveness probe, not a client
/// operation.
#[derive(Clone, Debug, Serialize)]
pub struct HealthResponse {
    pub protocol_version: &'static str,
    pub server_time_utc: chrono::DateTime<Utc>,
    pub uptime_seconds: i64,
    pub requests_total: u64,
    pub battles_served: u64,
    pub votes_received: u64,
}

/// `GET /health`.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let now = Utc::now();
    let uptime_seconds = (now - state.metrics.started_at()).num_seconds().max(0);

    Json(HealthResponse {
        protocol_version: PROTOCOL_VERSION,
        server_time_utc: now,
        uptime_seconds,
        requests_total: state.metrics.requests_total(),
        battles_served: state.metrics.battles_served(),
        votes_received: state.metrics.votes_received(),
    })
}
