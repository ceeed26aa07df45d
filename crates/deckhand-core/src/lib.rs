//! Deckhand Core - Run Orchestration Engine
//!
//! This crate provides the core of the deckhand liquid-handling robot server,
//! including:
//! - Event bus: fan-out of operator notifications and run progress
//! - Protocol: the uploaded protocol model and its loaders
//! - Calibration: the calibration steps a protocol needs before a run
//! - Driver: the robot driver contract and a simulated robot
//! - Run: the single background protocol run and its controls
//! - Shutdown: graceful shutdown of the server and the active run

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod calibration;
pub mod driver;
pub mod error;
pub mod event_bus;
pub mod protocol;
pub mod run;
pub mod shutdown;
pub mod workspace;

pub use calibration::{CalibrationStep, CalibrationTarget, CalibrationTracker, RecordDetail, TargetRef};
pub use driver::{
    ConnectOptions, Coordinates, Driver, DriverError, DriverResult, JogDelta, SimulatedConfig,
    SimulatedDriver,
};
pub use error::{Error, ErrorKind, Result};
pub use event_bus::{EventBus, ServerEvent, Severity};
pub use protocol::{
    DeckGraph, Instruction, Instrument, JsonProtocolLoader, Labware, LoaderRegistry, Protocol,
    ProtocolLoader, ProtocolSource,
};
pub use run::{RunOrchestrator, RunProgress, RunSession, RunState};
pub use shutdown::{wait_for_shutdown_signal, ShutdownController, ShutdownPhase};
pub use workspace::ProtocolWorkspace;
