use std::collections::HashSet;

use tracing::{debug, warn};

use super::types::{CalibrationStep, CalibrationTarget, RecordDetail, TargetRef};
use crate::error::{Error, Result};
use crate::protocol::Protocol;

/// Derive the ordered calibration steps for a protocol.
///
/// One plunger step per distinct instrument axis, then one placeable step per
/// distinct `(label, slot)`, each in declaration order. Entries with
/// `calibrate = false` are skipped.
#[must_use]
pub fn compute_steps(protocol: &Protocol) -> Vec<CalibrationStep> {
    let mut steps = Vec::new();

    let mut axes = HashSet::new();
    for instrument in protocol.deck.instruments.iter().filter(|i| i.calibrate) {
        let axis = instrument.axis.to_lowercase();
        if axes.insert(axis.clone()) {
            steps.push(CalibrationStep::new(CalibrationTarget::Plunger { axis }));
        }
    }

    let mut placed = HashSet::new();
    for labware in protocol.deck.labware.iter().filter(|l| l.calibrate) {
        if placed.insert((labware.label.as_str(), labware.slot.as_str())) {
            steps.push(CalibrationStep::new(CalibrationTarget::Placeable {
                label: labware.label.clone(),
                slot: labware.slot.clone(),
            }));
        }
    }

    steps
}

/// Tracks which calibration steps of the current protocol are complete.
#[derive(Debug, Clone, Default)]
pub struct CalibrationTracker {
    steps: Vec<CalibrationStep>,
}

impl CalibrationTracker {
    /// Start tracking a freshly derived step list for `protocol`
    #[must_use]
    pub fn for_protocol(protocol: &Protocol) -> Self {
        Self {
            steps: compute_steps(protocol),
        }
    }

    /// All steps, completed or not
    #[must_use]
    pub fn steps(&self) -> &[CalibrationStep] {
        &self.steps
    }

    /// Number of steps not yet calibrated
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.steps.iter().filter(|s| !s.calibrated).count()
    }

    /// Whether every step is calibrated
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.outstanding() == 0
    }

    /// Whether a step for `target` exists
    #[must_use]
    pub fn contains(&self, target: &TargetRef<'_>) -> bool {
        self.steps.iter().any(|s| target.matches(&s.target))
    }

    /// The step a record for `target` would land on.
    ///
    /// A label without a slot can match several placeable steps; the first
    /// uncalibrated one wins, then the first match.
    #[must_use]
    pub fn find(&self, target: &TargetRef<'_>) -> Option<&CalibrationStep> {
        self.position(target).map(|i| &self.steps[i])
    }

    fn position(&self, target: &TargetRef<'_>) -> Option<usize> {
        let mut matching = self
            .steps
            .iter()
            .enumerate()
            .filter(|(_, s)| target.matches(&s.target));
        let first = matching.clone().next().map(|(i, _)| i);
        matching.find(|(_, s)| !s.calibrated).map(|(i, _)| i).or(first)
    }

    /// Mark the step for `target` complete.
    ///
    /// Recording an already calibrated target only updates the detail.
    /// Fails with [`Error::NotFound`] when no step matches.
    pub fn record(&mut self, target: &TargetRef<'_>, detail: RecordDetail<'_>) -> Result<&CalibrationStep> {
        let Some(step) = self.position(target).map(|i| &mut self.steps[i]) else {
            warn!(target = %target, "Calibration recorded for a target with no step");
            return Err(Error::not_found(format!(
                "No calibration step for the {}",
                target
            )));
        };

        if !step.calibrated {
            debug!(target = %step.target, "Calibration step completed");
        }
        step.calibrated = true;
        match detail {
            RecordDetail::PlungerPosition(position) => {
                step.positions.insert(position.to_string());
            }
            RecordDetail::CalibratedWith(axis) => {
                step.calibrated_with = Some(axis.to_lowercase());
            }
            RecordDetail::None => {}
        }
        Ok(step)
    }
}
