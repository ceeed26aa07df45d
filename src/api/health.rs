//! Health and version endpoints

use axum::extract::State;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use deckhand_core::RunState;
use serde::Serialize;

use super::response::{ok, ApiResult};
use crate::server::AppState;

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    /// Connected event stream clients
    pub subscribers: usize,
    pub run_state: RunState,
}

#[derive(Debug, Serialize)]
pub struct VersionPayload {
    pub version: &'static str,
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        subscribers: state.event_bus.subscriber_count(),
        run_state: state.orchestrator.session().await.state,
    })
}

/// GET /app_version
pub async fn app_version() -> ApiResult<VersionPayload> {
    ok(VersionPayload {
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/app_version", get(app_version))
}
