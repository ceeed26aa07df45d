//! WebSocket module for deckhand
//!
//! Provides the real-time event stream at /ws/events.

pub mod events;

pub use events::events_handler;

use axum::{routing::get, Router};

use crate::server::AppState;

/// Create the WebSocket router
pub fn websocket_router() -> Router<AppState> {
    Router::new().route("/ws/events", get(events_handler))
}
