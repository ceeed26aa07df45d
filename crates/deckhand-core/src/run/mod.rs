//! Run orchestration
//!
//! At most one protocol run is in flight. It executes on a background task
//! and reports its outcome through the event bus: warnings, then errors, then
//! the elapsed-time summary, then a single `run-finished` event.

mod orchestrator;
mod session;

pub use orchestrator::RunOrchestrator;
pub use session::{format_elapsed, RunProgress, RunSession, RunState};

#[cfg(test)]
mod tests;
