//! Health and readiness endpoints
//!
//! Both report the database probe; neither ever returns an error
//! response body beyond the JSON payload, and nothing here retries.
//! `/ready` additionally gates on the lifecycle state so a draining
//! server stops admitting traffic before its last requests finish.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::server::Lifecycle;
use crate::state::AppState;

/// Liveness response body
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: &'static str,
}

/// Readiness response body
#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    pub ready: bool,
}

/// GET /health
async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    if state.pool().ping().await {
        (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok",
                database: "connected",
            }),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: "error",
                database: "disconnected",
            }),
        )
    }
}

/// GET /ready
async fn ready(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    let admitting = state.lifecycle() == Lifecycle::Listening;
    let ready = admitting && state.pool().ping().await;
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(ReadyResponse { ready }))
}

/// Probe routes
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
}
