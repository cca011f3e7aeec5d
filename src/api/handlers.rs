//! Request handlers for the API endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;

use super::AppState;
use super::types::{ErrorResponse, StatusResponse};

/// Returns roster counters over active appliances.
///
/// `GET /api/simulation-stats` → 200 + `{users, appliances, by_type}`
/// On a store failure → 500 + `ErrorResponse`
pub async fn get_stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let simulator = Arc::clone(&state.simulator);
    let result = tokio::task::spawn_blocking(move || simulator.user_stats()).await;

    match result {
        Ok(Ok(stats)) => Ok(Json(stats)),
        Ok(Err(e)) => Err(internal(e.to_string())),
        Err(e) => Err(internal(e.to_string())),
    }
}

/// Returns the lifecycle state and lock ownership.
///
/// `GET /api/simulation-status` → 200 + `StatusResponse`
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        state: state.simulator.state(),
        lock_held: state.simulator.lock_held(),
    })
}

fn internal(error: String) -> (StatusCode, Json<ErrorResponse>) {
    (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorResponse { error }))
}
