//! EventBus - broadcast-based event system for real-time server events.
//!
//! The run orchestrator and the control surface publish here so that every
//! connected WebSocket client sees warnings, errors, progress and completion,
//! whether or not it made the request that caused them.

/// Core event bus implementation (broadcast channel).
pub mod bus;
/// Event type definitions.
pub mod types;

pub use bus::EventBus;
pub use types::{ServerEvent, Severity};
