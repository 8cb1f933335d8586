use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::error::AppResult;
use crate::worker::StatsSnapshot;

use super::AppState;

#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    pub status: &'static str,
    pub checks: Vec<&'static str>,
}

/// Liveness; answers as long as the process runs
pub async fn health_check() -> StatusCode {
    StatusCode::OK
}

/// Readiness: every backend probe must answer
pub async fn readiness(State(state): State<AppState>) -> AppResult<Json<ReadyResponse>> {
    let mut checks = Vec::with_capacity(state.probes.len());

    for probe in &state.probes {
        if let Err(e) = probe.ping().await {
            tracing::warn!(probe = probe.name(), error = %e, "Readiness probe failed");
            return Err(e);
        }
        checks.push(probe.name());
    }

    Ok(Json(ReadyResponse {
        status: "ready",
        checks,
    }))
}

/// Worker counters since process start
pub async fn stats(State(state): State<AppState>) -> Json<StatsSnapshot> {
    Json(state.stats.snapshot())
}
