//! Run control endpoints

use axum::extract::State;
use axum::routing::get;
use axum::Router;
use deckhand_core::{RunSession, Severity};

use super::response::{ok, ApiResult};
use crate::server::AppState;

/// GET|POST /run
pub async fn start_run(State(state): State<AppState>) -> ApiResult<RunSession> {
    let protocol = state
        .workspace
        .read()
        .await
        .runnable_protocol()
        .map_err(|e| state.fail(e))?;
    let session = state
        .orchestrator
        .start_run(protocol)
        .await
        .map_err(|e| state.fail(e))?;
    ok(session)
}

/// GET|POST /pause
pub async fn pause_run(State(state): State<AppState>) -> ApiResult<RunSession> {
    let session = state.orchestrator.pause().await.map_err(|e| state.fail(e))?;
    state.event_bus.notify("Protocol paused", Severity::Info);
    ok(session)
}

/// GET|POST /resume
pub async fn resume_run(State(state): State<AppState>) -> ApiResult<RunSession> {
    let session = state.orchestrator.resume().await.map_err(|e| state.fail(e))?;
    state.event_bus.notify("Protocol resumed", Severity::Info);
    ok(session)
}

/// GET|POST /cancel
pub async fn cancel_run(State(state): State<AppState>) -> ApiResult<RunSession> {
    let session = state.orchestrator.cancel().await.map_err(|e| state.fail(e))?;
    state.event_bus.notify("Protocol stopped", Severity::Info);
    ok(session)
}

/// GET /run/status
pub async fn run_status(State(state): State<AppState>) -> ApiResult<RunSession> {
    ok(state.orchestrator.session().await)
}

pub fn run_routes() -> Router<AppState> {
    Router::new()
        .route("/run", get(start_run).post(start_run))
        .route("/run/status", get(run_status))
        .route("/pause", get(pause_run).post(pause_run))
        .route("/resume", get(resume_run).post(resume_run))
        .route("/cancel", get(cancel_run).post(cancel_run))
}
