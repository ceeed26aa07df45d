use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// What a calibration step aligns.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CalibrationTarget {
    /// Plunger positions of the instrument on an axis
    Plunger {
        /// Instrument axis
        axis: String,
    },
    /// Position of a piece of labware
    Placeable {
        /// Labware label
        label: String,
        /// Deck slot
        slot: String,
    },
}

impl fmt::Display for CalibrationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plunger { axis } => write!(f, "plunger on the {} axis", axis),
            Self::Placeable { label, slot } => write!(f, "{} in slot {}", label, slot),
        }
    }
}

/// How a calibration record names its target.
///
/// The UI refers to labware by label only, so a placeable slot is optional.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetRef<'a> {
    /// Plunger on an axis
    Plunger {
        /// Instrument axis
        axis: &'a str,
    },
    /// Labware by label, optionally pinned to a slot
    Placeable {
        /// Labware label
        label: &'a str,
        /// Deck slot
        slot: Option<&'a str>,
    },
}

impl TargetRef<'_> {
    pub(crate) fn matches(&self, target: &CalibrationTarget) -> bool {
        match (self, target) {
            (Self::Plunger { axis }, CalibrationTarget::Plunger { axis: a }) => {
                a.eq_ignore_ascii_case(axis)
            }
            (
                Self::Placeable { label, slot },
                CalibrationTarget::Placeable { label: l, slot: s },
            ) => l == label && slot.is_none_or(|slot| s.eq_ignore_ascii_case(slot)),
            _ => false,
        }
    }
}

impl fmt::Display for TargetRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plunger { axis } => write!(f, "plunger on the {} axis", axis),
            Self::Placeable {
                label,
                slot: Some(slot),
            } => write!(f, "{} in slot {}", label, slot),
            Self::Placeable { label, slot: None } => write!(f, "{}", label),
        }
    }
}

/// One outstanding (or completed) calibration unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalibrationStep {
    /// What this step aligns
    #[serde(flatten)]
    pub target: CalibrationTarget,
    /// Whether a calibration has been recorded for the target
    pub calibrated: bool,
    /// Plunger positions saved so far (plunger steps only)
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub positions: BTreeSet<String>,
    /// Axis that calibrated this placeable (placeable steps only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calibrated_with: Option<String>,
}

impl CalibrationStep {
    /// A fresh, uncalibrated step
    #[must_use]
    pub fn new(target: CalibrationTarget) -> Self {
        Self {
            target,
            calibrated: false,
            positions: BTreeSet::new(),
            calibrated_with: None,
        }
    }
}

/// Extra detail kept alongside a calibration record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordDetail<'a> {
    /// A plunger position was saved
    PlungerPosition(&'a str),
    /// A placeable was calibrated with the instrument on this axis
    CalibratedWith(&'a str),
    /// Nothing beyond the completion flag
    None,
}
