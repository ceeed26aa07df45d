//! Control surface for deckhand
//!
//! Provides REST endpoints for:
//! - Protocol upload and calibration steps
//! - Run control (start, pause, resume, cancel)
//! - Robot connection and manual movement
//! - Calibration records
//! - Health and version

pub mod calibration;
pub mod extract;
pub mod health;
pub mod protocol;
pub mod response;
pub mod robot;
pub mod run;

use axum::Router;

pub use calibration::calibration_routes;
pub use health::health_routes;
pub use protocol::protocol_routes;
pub use robot::robot_routes;
pub use run::run_routes;

use crate::server::AppState;

/// Create the API router with all endpoints
pub fn api_router() -> Router<AppState> {
    Router::new()
        .merge(protocol_routes())
        .merge(run_routes())
        .merge(robot_routes())
        .merge(calibration_routes())
        .merge(health_routes())
}
