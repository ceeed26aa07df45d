use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use super::types::{DeckGraph, Instruction, Protocol};
use crate::error::{Error, Result};

/// Raw upload handed to a loader.
#[derive(Debug, Clone)]
pub struct ProtocolSource<'a> {
    /// Original filename
    pub filename: &'a str,
    /// Last-modified timestamp as sent by the client
    pub last_modified: Option<&'a str>,
    /// File contents
    pub bytes: &'a [u8],
}

/// Turns an uploaded file into a [`Protocol`].
///
/// Problems with the file's contents belong in `Protocol::errors` and
/// `Protocol::warnings`; an `Err` means the loader itself could not run.
pub trait ProtocolLoader: Send + Sync {
    /// Parse the source
    fn load(&self, source: &ProtocolSource<'_>) -> Result<Protocol>;
}

#[derive(Debug, Deserialize)]
struct ProtocolDocument {
    #[serde(flatten)]
    deck: DeckGraph,
    #[serde(default)]
    instructions: Vec<Instruction>,
}

/// Loads protocols serialized as JSON documents carrying the deck graph and
/// instruction list directly.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonProtocolLoader;

impl ProtocolLoader for JsonProtocolLoader {
    fn load(&self, source: &ProtocolSource<'_>) -> Result<Protocol> {
        let mut protocol = Protocol {
            filename: source.filename.to_string(),
            last_modified: source.last_modified.map(str::to_string),
            ..Protocol::default()
        };

        let document: ProtocolDocument = match serde_json::from_slice(source.bytes) {
            Ok(doc) => doc,
            Err(e) => {
                protocol.errors.push(format!("Invalid protocol JSON: {}", e));
                return Ok(protocol);
            }
        };

        protocol.deck = document.deck;
        protocol.instructions = document.instructions;
        normalize(&mut protocol);
        check_structure(&mut protocol);

        debug!(
            filename = %protocol.filename,
            instruments = protocol.deck.instruments.len(),
            labware = protocol.deck.labware.len(),
            instructions = protocol.instructions.len(),
            errors = protocol.errors.len(),
            "Loaded JSON protocol"
        );
        Ok(protocol)
    }
}

fn normalize(protocol: &mut Protocol) {
    for instrument in &mut protocol.deck.instruments {
        instrument.axis = instrument.axis.trim().to_lowercase();
    }
    for instruction in &mut protocol.instructions {
        if let Some(axis) = &mut instruction.axis {
            *axis = axis.trim().to_lowercase();
        }
    }
}

fn check_structure(protocol: &mut Protocol) {
    let mut axes = HashSet::new();
    for instrument in &protocol.deck.instruments {
        if instrument.axis.is_empty() {
            protocol
                .errors
                .push(format!("Instrument '{}' has no axis", instrument.name));
        } else if !axes.insert(instrument.axis.clone()) {
            protocol.errors.push(format!(
                "More than one instrument is mounted on the {} axis",
                instrument.axis
            ));
        }
    }

    let mut placed = HashSet::new();
    for labware in &protocol.deck.labware {
        if !placed.insert((labware.label.as_str(), labware.slot.as_str())) {
            protocol.warnings.push(format!(
                "{} in slot {} is declared more than once",
                labware.label, labware.slot
            ));
        }
    }

    for (index, instruction) in protocol.instructions.iter().enumerate() {
        if let Some(axis) = &instruction.axis {
            if !axes.contains(axis) {
                protocol.errors.push(format!(
                    "Instruction {} ({}) uses the {} axis, which has no instrument",
                    index + 1,
                    instruction.command,
                    axis
                ));
            }
        }
    }

    if protocol.instructions.is_empty() {
        protocol
            .warnings
            .push("Protocol has no instructions".to_string());
    }
}

/// Chooses a loader by file extension.
#[derive(Clone)]
pub struct LoaderRegistry {
    allowed: Vec<String>,
    loaders: BTreeMap<String, Arc<dyn ProtocolLoader>>,
}

impl std::fmt::Debug for LoaderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoaderRegistry")
            .field("allowed", &self.allowed)
            .field("loaders", &self.loaders.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl LoaderRegistry {
    /// Create a registry accepting the given extensions (without the dot)
    pub fn new<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            allowed: allowed
                .into_iter()
                .map(|ext| ext.as_ref().trim_start_matches('.').to_lowercase())
                .collect(),
            loaders: BTreeMap::new(),
        }
    }

    /// Register a loader for an extension
    #[must_use]
    pub fn with_loader(mut self, extension: &str, loader: Arc<dyn ProtocolLoader>) -> Self {
        self.loaders
            .insert(extension.trim_start_matches('.').to_lowercase(), loader);
        self
    }

    /// Allowed extensions
    #[must_use]
    pub fn allowed_extensions(&self) -> &[String] {
        &self.allowed
    }

    /// Validate the extension and run the matching loader
    pub fn load(&self, source: &ProtocolSource<'_>) -> Result<Protocol> {
        let extension = source
            .filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_lowercase())
            .unwrap_or_default();

        if !self.allowed.contains(&extension) {
            let expected = self
                .allowed
                .iter()
                .map(|ext| format!(".{}", ext))
                .collect::<Vec<_>>()
                .join(" or ");
            return Err(Error::validation(format!(
                "{} is not a valid extension. Expected {}",
                extension, expected
            )));
        }

        let loader = self.loaders.get(&extension).ok_or_else(|| {
            Error::validation(format!(
                "No loader is registered for .{} protocols",
                extension
            ))
        })?;
        loader.load(source)
    }
}

impl Default for LoaderRegistry {
    fn default() -> Self {
        Self::new(["json", "py"]).with_loader("json", Arc::new(JsonProtocolLoader))
    }
}
