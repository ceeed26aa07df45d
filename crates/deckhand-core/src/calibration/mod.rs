//! Calibration step tracking
//!
//! Derives the calibration actions a protocol needs before it can run and
//! flips them complete as the operator records calibrations.

mod tracker;
mod types;

pub use tracker::{compute_steps, CalibrationTracker};
pub use types::{CalibrationStep, CalibrationTarget, RecordDetail, TargetRef};
