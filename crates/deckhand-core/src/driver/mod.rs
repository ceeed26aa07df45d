//! Robot driver contract
//!
//! The driver commands the robot hardware: connection management, motion,
//! homing and per-instruction execution. Every call can fail with a
//! [`DriverError`] carrying the driver's own message.
//!
//! [`SimulatedDriver`] is an in-memory virtual robot used when no hardware
//! driver is configured, and by tests.

mod simulated;

pub use simulated::{SimulatedConfig, SimulatedDriver};

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocol::{Instruction, Protocol};

const NOT_CONNECTED: &str = "Robot is not connected";
const STOPPED: &str = "Received a STOP signal and exited from movements";

/// Failure raised by the driver
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct DriverError {
    message: String,
}

impl DriverError {
    /// Create an error with the driver's message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The robot is not connected
    #[must_use]
    pub fn not_connected() -> Self {
        Self::new(NOT_CONNECTED)
    }

    /// Motion was interrupted by a stop
    #[must_use]
    pub fn stopped() -> Self {
        Self::new(STOPPED)
    }

    /// The driver's message
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether this reports a missing connection
    #[must_use]
    pub fn is_disconnected(&self) -> bool {
        self.message == NOT_CONNECTED
    }

    /// Whether this reports a firmware/API version mismatch
    #[must_use]
    pub fn is_version_mismatch(&self) -> bool {
        self.message.contains("versions are incompatible")
    }
}

/// Result type for driver calls
pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// Options passed when connecting
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectOptions {
    /// Whether limit switches are enabled
    #[serde(default)]
    pub limit_switches: bool,
}

/// Head and plunger coordinates
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    /// Head x
    pub x: f64,
    /// Head y
    pub y: f64,
    /// Head z
    pub z: f64,
    /// Plunger a
    pub a: f64,
    /// Plunger b
    pub b: f64,
}

/// Relative move, one optional delta per axis
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct JogDelta {
    /// Head x delta
    #[serde(default)]
    pub x: Option<f64>,
    /// Head y delta
    #[serde(default)]
    pub y: Option<f64>,
    /// Head z delta
    #[serde(default)]
    pub z: Option<f64>,
    /// Plunger a delta
    #[serde(default)]
    pub a: Option<f64>,
    /// Plunger b delta
    #[serde(default)]
    pub b: Option<f64>,
}

impl JogDelta {
    /// Whether the move targets a plunger rather than the head.
    ///
    /// Zero deltas do not count.
    #[must_use]
    pub fn moves_plunger(&self) -> bool {
        [self.a, self.b].iter().flatten().any(|d| *d != 0.0)
    }
}

/// Contract of the external robot driver
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Driver: Send + Sync {
    /// Connect to the robot on `port` (driver default when `None`)
    async fn connect(&self, port: Option<String>, options: ConnectOptions) -> DriverResult<()>;

    /// Disconnect from the robot
    async fn disconnect(&self) -> DriverResult<()>;

    /// Whether a connection is open
    async fn is_connected(&self) -> bool;

    /// Port of the open connection
    async fn connected_port(&self) -> Option<String>;

    /// Serial ports a robot might be attached to
    async fn serial_ports(&self) -> DriverResult<Vec<String>>;

    /// Current head and plunger coordinates
    async fn position(&self) -> DriverResult<Coordinates>;

    /// Driver diagnostics
    async fn diagnostics(&self) -> DriverResult<serde_json::Value>;

    /// Firmware and driver versions
    async fn versions(&self) -> DriverResult<serde_json::Value>;

    /// Make the instruments and labware of `protocol` known to the driver
    async fn load_protocol(&self, protocol: Arc<Protocol>) -> DriverResult<()>;

    /// Home the given axes, or every axis when `None`
    async fn home(&self, axes: Option<String>) -> DriverResult<String>;

    /// Relative head move
    async fn move_head(&self, delta: JogDelta) -> DriverResult<String>;

    /// Relative plunger move
    async fn move_plunger(&self, delta: JogDelta) -> DriverResult<String>;

    /// Move the head over a deck slot
    async fn move_to_slot(&self, slot: &str) -> DriverResult<()>;

    /// Move the instrument on `axis` to the first well of a container
    async fn move_to_container(&self, axis: &str, slot: &str, label: &str) -> DriverResult<()>;

    /// Pick up a tip with the instrument on `axis`
    async fn pick_up_tip(&self, axis: &str) -> DriverResult<()>;

    /// Return the tip held by the instrument on `axis`
    async fn drop_tip(&self, axis: &str) -> DriverResult<()>;

    /// Move a plunger to one of its named positions
    async fn move_to_plunger_position(&self, axis: &str, position: &str) -> DriverResult<()>;

    /// Aspirate at the current position
    async fn aspirate(&self, axis: &str) -> DriverResult<()>;

    /// Dispense at the current position
    async fn dispense(&self, axis: &str) -> DriverResult<()>;

    /// Set the maximum volume of the instrument on `axis`
    async fn set_max_volume(&self, axis: &str, volume: u32) -> DriverResult<()>;

    /// Save the current head position as the position of `label` in `slot`
    async fn calibrate_placeable(&self, axis: &str, slot: &str, label: &str) -> DriverResult<()>;

    /// Save the current plunger coordinate as a named position
    async fn calibrate_plunger(&self, axis: &str, position: &str) -> DriverResult<()>;

    /// Execute one protocol instruction
    async fn execute(&self, instruction: &Instruction) -> DriverResult<()>;

    /// Pause motion
    async fn pause(&self) -> DriverResult<()>;

    /// Resume motion, clearing a pause or stop
    async fn resume(&self) -> DriverResult<()>;

    /// Stop motion; an in-flight instruction fails
    async fn stop(&self) -> DriverResult<()>;

    /// Drain the warnings collected since the last call
    async fn take_warnings(&self) -> Vec<String>;
}
