//! Liveness probe.

use axum::{Json, Router, routing::get};
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// Crate version of the running server.
    pub version: &'static str,
}

/// Answers as long as the process is serving; no dependencies are checked.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `/health`, mounted outside the versioned API.
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health))
}
