//! Health, liveness, and readiness endpoint handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use super::AppState;
use crate::network::HealthState;

/// Body of `GET /health`.
#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub state: &'static str,
    /// `"up"` when the store answered a ping, otherwise `"down"`.
    pub storage: &'static str,
    pub in_flight: u64,
    pub uptime_secs: u64,
}

/// Returns detailed health information as JSON.
///
/// Always returns 200; `state` and `storage` in the body tell whether the
/// server can actually serve traffic.
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthReport> {
    let storage = if state.store.ping().await.is_ok() {
        "up"
    } else {
        "down"
    };

    Json(HealthReport {
        state: state.shutdown.health_state().as_str(),
        storage,
        in_flight: state.shutdown.in_flight_count(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// Liveness check: 200 while the process answers at all.
pub async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

/// Readiness check: 200 when `Ready` and the store answers a ping, else 503.
pub async fn readiness_handler(State(state): State<AppState>) -> StatusCode {
    if state.shutdown.health_state() != HealthState::Ready {
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    match state.store.ping().await {
        Ok(()) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}
