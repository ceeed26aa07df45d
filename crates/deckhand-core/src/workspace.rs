//! Protocol workspace
//!
//! Holds the currently uploaded protocol together with its calibration
//! tracker. An upload replaces both wholesale.

use std::sync::Arc;

use tracing::info;

use crate::calibration::{
    CalibrationStep, CalibrationTarget, CalibrationTracker, RecordDetail, TargetRef,
};
use crate::error::{Error, Result};
use crate::protocol::Protocol;

/// Current protocol and calibration state
#[derive(Debug, Default)]
pub struct ProtocolWorkspace {
    protocol: Option<Arc<Protocol>>,
    tracker: CalibrationTracker,
}

impl ProtocolWorkspace {
    /// Empty workspace with no protocol
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the protocol and derive a fresh step list.
    ///
    /// Calibration records for the previous protocol are discarded. A
    /// protocol with errors is stored (so its filename is reported) but gets
    /// no calibration steps.
    pub fn replace(&mut self, protocol: impl Into<Arc<Protocol>>) -> Arc<Protocol> {
        let protocol = protocol.into();
        self.tracker = if protocol.has_errors() {
            CalibrationTracker::default()
        } else {
            CalibrationTracker::for_protocol(&protocol)
        };
        info!(
            filename = %protocol.filename,
            steps = self.tracker.steps().len(),
            "Protocol replaced"
        );
        self.protocol = Some(protocol.clone());
        protocol
    }

    /// The current protocol, if any
    #[must_use]
    pub fn protocol(&self) -> Option<&Arc<Protocol>> {
        self.protocol.as_ref()
    }

    /// A protocol that can be run: present and free of load errors
    pub fn runnable_protocol(&self) -> Result<Arc<Protocol>> {
        let protocol = self
            .protocol
            .as_ref()
            .ok_or_else(|| Error::validation("No protocol has been uploaded"))?;
        if protocol.has_errors() {
            return Err(Error::validation(format!(
                "{} has errors and cannot be run",
                protocol.filename
            )));
        }
        Ok(protocol.clone())
    }

    /// Calibration steps of the current protocol
    #[must_use]
    pub fn steps(&self) -> &[CalibrationStep] {
        self.tracker.steps()
    }

    /// Calibration tracker of the current protocol
    #[must_use]
    pub fn tracker(&self) -> &CalibrationTracker {
        &self.tracker
    }

    /// The step target a record for `target` would complete.
    ///
    /// Fails with NotFound when the current protocol has no such step.
    pub fn ensure_target(&self, target: &TargetRef<'_>) -> Result<&CalibrationTarget> {
        self.tracker
            .find(target)
            .map(|step| &step.target)
            .ok_or_else(|| Error::not_found(format!("No calibration step for the {}", target)))
    }

    /// Slot of the placeable step a calibration of `label` would complete
    pub fn placeable_slot(&self, label: &str, slot: Option<&str>) -> Result<String> {
        match self.ensure_target(&TargetRef::Placeable { label, slot })? {
            CalibrationTarget::Placeable { slot, .. } => Ok(slot.clone()),
            CalibrationTarget::Plunger { axis } => Err(Error::not_found(format!(
                "{label} names the plunger on the {axis} axis"
            ))),
        }
    }

    /// Record a calibration against the current protocol
    pub fn record(&mut self, target: &TargetRef<'_>, detail: RecordDetail<'_>) -> Result<()> {
        self.tracker.record(target, detail).map(|_| ())
    }

    /// Filename of the current protocol
    #[must_use]
    pub fn filename(&self) -> Option<&str> {
        self.protocol.as_deref().map(|p| p.filename.as_str())
    }

    /// Last-modified stamp of the current protocol
    #[must_use]
    pub fn last_modified(&self) -> Option<&str> {
        self.protocol
            .as_deref()
            .and_then(|p| p.last_modified.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::protocol::{DeckGraph, Instrument, Labware};

    fn protocol(filename: &str, axes: &[&str], labels: &[(&str, &str)]) -> Protocol {
        Protocol {
            filename: filename.to_string(),
            last_modified: Some("42".to_string()),
            deck: DeckGraph {
                instruments: axes
                    .iter()
                    .map(|axis| Instrument {
                        axis: axis.to_string(),
                        name: String::new(),
                        channels: 1,
                        max_volume: None,
                        calibrate: true,
                    })
                    .collect(),
                labware: labels
                    .iter()
                    .map(|(label, slot)| Labware {
                        label: label.to_string(),
                        slot: slot.to_string(),
                        kind: String::new(),
                        calibrate: true,
                    })
                    .collect(),
            },
            ..Protocol::default()
        }
    }

    #[test]
    fn test_upload_replaces_state() {
        let mut workspace = ProtocolWorkspace::new();
        workspace.replace(protocol("a.json", &["a"], &[("plate", "A1")]));
        workspace
            .record(&TargetRef::Plunger { axis: "a" }, RecordDetail::None)
            .unwrap();
        assert_eq!(workspace.tracker().outstanding(), 1);

        workspace.replace(protocol("b.json", &["a", "b"], &[("rack", "C2")]));

        assert_eq!(workspace.filename(), Some("b.json"));
        assert_eq!(workspace.steps().len(), 3);
        assert_eq!(workspace.tracker().outstanding(), 3);
        assert!(workspace
            .ensure_target(&TargetRef::Placeable {
                label: "plate",
                slot: None
            })
            .is_err());
    }

    #[test]
    fn test_runnable_protocol() {
        let mut workspace = ProtocolWorkspace::new();
        assert_eq!(
            workspace.runnable_protocol().unwrap_err().kind(),
            ErrorKind::Validation
        );

        let mut broken = protocol("broken.json", &[], &[]);
        broken.errors.push("Invalid protocol JSON".to_string());
        workspace.replace(broken);
        assert!(workspace.steps().is_empty());
        assert_eq!(
            workspace.runnable_protocol().unwrap_err().kind(),
            ErrorKind::Validation
        );

        workspace.replace(protocol("ok.json", &["a"], &[]));
        assert_eq!(workspace.runnable_protocol().unwrap().filename, "ok.json");
        assert_eq!(workspace.last_modified(), Some("42"));
    }

    #[test]
    fn test_ensure_target() {
        let mut workspace = ProtocolWorkspace::new();
        workspace.replace(protocol("a.json", &["a"], &[]));

        assert!(workspace.ensure_target(&TargetRef::Plunger { axis: "A" }).is_ok());
        let err = workspace
            .ensure_target(&TargetRef::Plunger { axis: "left" })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_placeable_slot_walks_duplicate_labels() {
        let mut workspace = ProtocolWorkspace::new();
        workspace.replace(protocol("a.json", &["a"], &[("tiprack", "A1"), ("tiprack", "B1")]));

        assert_eq!(workspace.placeable_slot("tiprack", None).unwrap(), "A1");
        workspace
            .record(
                &TargetRef::Placeable {
                    label: "tiprack",
                    slot: Some("A1"),
                },
                RecordDetail::None,
            )
            .unwrap();
        assert_eq!(workspace.placeable_slot("tiprack", None).unwrap(), "B1");
        assert_eq!(workspace.placeable_slot("tiprack", Some("a1")).unwrap(), "A1");

        let err = workspace.placeable_slot("tiprack", Some("C3")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
