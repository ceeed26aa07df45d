//! Protocol model and loaders
//!
//! A protocol is the instruction list plus the instruments and labware it
//! references. Parsing rules live behind [`ProtocolLoader`]; the
//! [`LoaderRegistry`] picks a loader by file extension.

mod loader;
mod types;

pub use loader::{JsonProtocolLoader, LoaderRegistry, ProtocolLoader, ProtocolSource};
pub use types::{DeckGraph, Instruction, Instrument, Labware, Protocol};
