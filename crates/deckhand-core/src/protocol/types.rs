use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

fn default_channels() -> u32 {
    1
}

/// A pipette mounted on one plunger axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    /// Plunger axis the pipette is mounted on (normalized to lowercase)
    pub axis: String,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Number of channels
    #[serde(default = "default_channels")]
    pub channels: u32,
    /// Maximum volume in microliters
    #[serde(default)]
    pub max_volume: Option<u32>,
    /// Whether the plunger needs calibrating before a run
    #[serde(default = "default_true")]
    pub calibrate: bool,
}

/// A piece of labware placed in a deck slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Labware {
    /// Label used by the operator to refer to it
    pub label: String,
    /// Deck slot, e.g. `"A1"`
    pub slot: String,
    /// Container type, e.g. `"96-flat"`
    #[serde(default, rename = "type")]
    pub kind: String,
    /// Whether its position needs calibrating before a run
    #[serde(default = "default_true")]
    pub calibrate: bool,
}

/// One pipetting instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    /// Command name, e.g. `"aspirate"`
    pub command: String,
    /// Axis of the instrument that performs it, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub axis: Option<String>,
    /// Command-specific arguments
    #[serde(default)]
    pub args: serde_json::Map<String, serde_json::Value>,
    /// Human-readable description shown while running
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Instruction {
    /// Create an instruction without arguments
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            axis: None,
            args: serde_json::Map::new(),
            description: None,
        }
    }

    /// Set the axis
    #[must_use]
    pub fn with_axis(mut self, axis: impl Into<String>) -> Self {
        self.axis = Some(axis.into());
        self
    }

    /// Add an argument
    #[must_use]
    pub fn with_arg(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.args.insert(key.into(), value);
        self
    }

    /// Text shown to the operator for this instruction
    #[must_use]
    pub fn describe(&self) -> String {
        if let Some(description) = &self.description {
            return description.clone();
        }
        match &self.axis {
            Some(axis) => format!("{} ({} axis)", self.command, axis),
            None => self.command.clone(),
        }
    }
}

/// The instruments and labware a protocol uses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeckGraph {
    /// Pipettes, in declaration order
    #[serde(default)]
    pub instruments: Vec<Instrument>,
    /// Labware, in declaration order
    #[serde(default)]
    pub labware: Vec<Labware>,
}

impl DeckGraph {
    /// Look up the instrument on an axis
    #[must_use]
    pub fn instrument(&self, axis: &str) -> Option<&Instrument> {
        self.instruments
            .iter()
            .find(|i| i.axis.eq_ignore_ascii_case(axis))
    }

    /// Look up labware by label, optionally restricted to a slot
    #[must_use]
    pub fn labware(&self, label: &str, slot: Option<&str>) -> Option<&Labware> {
        self.labware
            .iter()
            .find(|l| l.label == label && slot.is_none_or(|s| l.slot.eq_ignore_ascii_case(s)))
    }
}

/// An uploaded, parsed protocol.
///
/// Replaced wholesale by each upload and shared read-only with a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Protocol {
    /// Source filename
    pub filename: String,
    /// Last-modified timestamp as sent by the client
    pub last_modified: Option<String>,
    /// Instructions, in execution order
    pub instructions: Vec<Instruction>,
    /// Instruments and labware
    pub deck: DeckGraph,
    /// Problems that prevent running the protocol
    pub errors: Vec<String>,
    /// Problems that do not prevent running it
    pub warnings: Vec<String>,
}

impl Protocol {
    /// Whether the loader reported errors
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}
