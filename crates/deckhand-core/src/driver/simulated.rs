//! In-memory virtual robot

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{ConnectOptions, Coordinates, Driver, DriverError, DriverResult, JogDelta};
use crate::protocol::{Instruction, Protocol};

const HOME_AXES: &str = "xyzab";
const SAFE_Z: f64 = 120.0;
const SLOT_PITCH_X: f64 = 96.0;
const SLOT_PITCH_Y: f64 = 133.0;

/// Settings of the virtual robot
#[derive(Debug, Clone)]
pub struct SimulatedConfig {
    /// Port name reported for the virtual connection
    pub port: String,
    /// Whether the robot starts out connected
    pub connect_on_start: bool,
    /// Time spent on each instruction
    pub step_delay: Duration,
    /// Firmware version reported by `versions`
    pub firmware_version: String,
}

impl Default for SimulatedConfig {
    fn default() -> Self {
        Self {
            port: "Virtual Smoothie".to_string(),
            connect_on_start: true,
            step_delay: Duration::ZERO,
            firmware_version: "v1.0.5".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
struct Pipette {
    max_volume: Option<u32>,
    has_tip: bool,
    plunger: BTreeMap<String, f64>,
}

impl Pipette {
    fn new(max_volume: Option<u32>) -> Self {
        let plunger = [("top", 0.0), ("bottom", 10.0), ("blow_out", 12.0), ("drop_tip", 14.0)]
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect();
        Self {
            max_volume,
            has_tip: false,
            plunger,
        }
    }
}

#[derive(Debug, Default)]
struct SimState {
    port: Option<String>,
    position: Coordinates,
    protocol: Option<Arc<Protocol>>,
    pipettes: BTreeMap<String, Pipette>,
    /// Calibrated labware positions keyed by `(slot, label)`
    placeables: BTreeMap<(String, String), Coordinates>,
    paused: bool,
    executed: usize,
    warnings: Vec<String>,
    fail_at: Option<(usize, String)>,
    connect_failure: Option<String>,
    load_failure: Option<String>,
    stop: CancellationToken,
}

impl SimState {
    fn require_connected(&self) -> DriverResult<()> {
        if self.port.is_some() {
            Ok(())
        } else {
            Err(DriverError::not_connected())
        }
    }

    fn pipette(&mut self, axis: &str) -> DriverResult<&mut Pipette> {
        self.pipettes
            .get_mut(&axis.to_lowercase())
            .ok_or_else(|| DriverError::new(format!("No instrument is mounted on the {axis} axis")))
    }

    fn plunger_mut(&mut self, axis: &str) -> DriverResult<&mut f64> {
        match axis.to_lowercase().as_str() {
            "a" => Ok(&mut self.position.a),
            "b" => Ok(&mut self.position.b),
            _ => Err(DriverError::new(format!("Unknown plunger axis '{axis}'"))),
        }
    }

    fn set_plunger(&mut self, axis: &str, position: &str) -> DriverResult<()> {
        let value = *self
            .pipette(axis)?
            .plunger
            .get(position)
            .ok_or_else(|| DriverError::new(format!("Unknown plunger position '{position}'")))?;
        // Only the a and b motors have tracked coordinates
        if let Ok(plunger) = self.plunger_mut(axis) {
            *plunger = value;
        }
        Ok(())
    }

    fn labware_known(&self, label: &str, slot: Option<&str>) -> bool {
        self.protocol
            .as_ref()
            .is_some_and(|p| p.deck.labware(label, slot).is_some())
    }
}

/// Virtual robot that tracks position, tips and calibrations in memory.
///
/// Instructions take [`SimulatedConfig::step_delay`] each and fail with the
/// stop message when [`Driver::stop`] is called while they are in flight.
pub struct SimulatedDriver {
    config: SimulatedConfig,
    state: Mutex<SimState>,
}

impl SimulatedDriver {
    /// Create a virtual robot
    #[must_use]
    pub fn new(config: SimulatedConfig) -> Self {
        let state = SimState {
            port: config.connect_on_start.then(|| config.port.clone()),
            ..SimState::default()
        };
        Self {
            config,
            state: Mutex::new(state),
        }
    }

    /// Fail with `message` the instruction at `index` (zero-based), counted
    /// from the next instruction executed after this call
    pub fn fail_on_instruction(&self, index: usize, message: impl Into<String>) {
        let mut state = self.state();
        let at = state.executed + index;
        state.fail_at = Some((at, message.into()));
    }

    /// Fail the next connect attempt with `message`
    pub fn fail_next_connect(&self, message: impl Into<String>) {
        self.state().connect_failure = Some(message.into());
    }

    /// Fail the next protocol load with `message`
    pub fn fail_next_load(&self, message: impl Into<String>) {
        self.state().load_failure = Some(message.into());
    }

    /// Queue a warning to be reported at the end of the next run
    pub fn push_warning(&self, warning: impl Into<String>) {
        self.state().warnings.push(warning.into());
    }

    /// Number of instructions executed so far
    #[must_use]
    pub fn executed(&self) -> usize {
        self.state().executed
    }

    /// Whether the robot is paused
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.state().paused
    }

    /// Whether the instrument on `axis` holds a tip
    #[must_use]
    pub fn has_tip(&self, axis: &str) -> bool {
        self.state()
            .pipettes
            .get(&axis.to_lowercase())
            .is_some_and(|p| p.has_tip)
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn step(&self) -> DriverResult<()> {
        let stop = self.state().stop.clone();
        if stop.is_cancelled() {
            return Err(DriverError::stopped());
        }
        if self.config.step_delay.is_zero() {
            return Ok(());
        }
        tokio::select! {
            _ = tokio::time::sleep(self.config.step_delay) => Ok(()),
            _ = stop.cancelled() => Err(DriverError::stopped()),
        }
    }

    fn apply(state: &mut SimState, instruction: &Instruction) -> DriverResult<()> {
        let Some(axis) = instruction.axis.as_deref() else {
            return Ok(());
        };
        match instruction.command.as_str() {
            "pick_up_tip" => state.pipette(axis)?.has_tip = true,
            "drop_tip" => state.pipette(axis)?.has_tip = false,
            "aspirate" => {
                let volume = instruction.args.get("volume").and_then(|v| v.as_f64());
                let pipette = state.pipette(axis)?;
                let warning = match (volume, pipette.max_volume) {
                    (Some(volume), Some(max)) if volume > f64::from(max) => Some(format!(
                        "Aspirating {volume}uL exceeds the {max}uL maximum of the {axis} pipette"
                    )),
                    _ if !pipette.has_tip => {
                        Some(format!("The {axis} pipette aspirated without a tip"))
                    }
                    _ => None,
                };
                state.warnings.extend(warning);
                state.set_plunger(axis, "bottom")?;
            }
            "dispense" => state.set_plunger(axis, "blow_out")?,
            _ => {}
        }
        Ok(())
    }

    fn slot_coordinates(slot: &str) -> DriverResult<(f64, f64)> {
        let mut chars = slot.chars();
        let column = chars.next().map(|c| c.to_ascii_uppercase());
        let row = chars.as_str().parse::<u8>().ok();
        match (column, row) {
            (Some(column @ 'A'..='E'), Some(row @ 1..=3)) => Ok((
                f64::from(column as u8 - b'A') * SLOT_PITCH_X,
                f64::from(row - 1) * SLOT_PITCH_Y,
            )),
            _ => Err(DriverError::new(format!("Unknown deck slot '{slot}'"))),
        }
    }
}

impl Default for SimulatedDriver {
    fn default() -> Self {
        Self::new(SimulatedConfig::default())
    }
}

#[async_trait]
impl Driver for SimulatedDriver {
    async fn connect(&self, port: Option<String>, options: ConnectOptions) -> DriverResult<()> {
        let mut state = self.state();
        if let Some(message) = state.connect_failure.take() {
            return Err(DriverError::new(message));
        }
        let port = port.unwrap_or_else(|| self.config.port.clone());
        info!(port = %port, limit_switches = options.limit_switches, "Virtual robot connected");
        state.port = Some(port);
        Ok(())
    }

    async fn disconnect(&self) -> DriverResult<()> {
        self.state().port = None;
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.state().port.is_some()
    }

    async fn connected_port(&self) -> Option<String> {
        self.state().port.clone()
    }

    async fn serial_ports(&self) -> DriverResult<Vec<String>> {
        Ok(vec![self.config.port.clone()])
    }

    async fn position(&self) -> DriverResult<Coordinates> {
        let state = self.state();
        state.require_connected()?;
        Ok(state.position)
    }

    async fn diagnostics(&self) -> DriverResult<serde_json::Value> {
        let state = self.state();
        state.require_connected()?;
        Ok(json!({
            "port": state.port,
            "paused": state.paused,
            "stopped": state.stop.is_cancelled(),
            "executed_instructions": state.executed,
        }))
    }

    async fn versions(&self) -> DriverResult<serde_json::Value> {
        self.state().require_connected()?;
        Ok(json!({
            "firmware": self.config.firmware_version,
            "config": "simulated",
            "driver": env!("CARGO_PKG_VERSION"),
        }))
    }

    async fn load_protocol(&self, protocol: Arc<Protocol>) -> DriverResult<()> {
        let mut state = self.state();
        if let Some(message) = state.load_failure.take() {
            return Err(DriverError::new(message));
        }
        state.pipettes = protocol
            .deck
            .instruments
            .iter()
            .map(|i| (i.axis.to_lowercase(), Pipette::new(i.max_volume)))
            .collect();
        state.placeables.clear();
        state.protocol = Some(protocol);
        Ok(())
    }

    async fn home(&self, axes: Option<String>) -> DriverResult<String> {
        let mut state = self.state();
        state.require_connected()?;
        let axes = axes.unwrap_or_else(|| HOME_AXES.to_string()).to_lowercase();
        if let Some(bad) = axes.chars().find(|c| !HOME_AXES.contains(*c)) {
            return Err(DriverError::new(format!("Unknown axis '{bad}'")));
        }
        for axis in axes.chars() {
            match axis {
                'x' => state.position.x = 0.0,
                'y' => state.position.y = 0.0,
                'z' => state.position.z = 0.0,
                'a' => state.position.a = 0.0,
                _ => state.position.b = 0.0,
            }
        }
        debug!(axes = %axes, "Homed");
        Ok(format!("Homed {}", axes.to_uppercase()))
    }

    async fn move_head(&self, delta: JogDelta) -> DriverResult<String> {
        let mut state = self.state();
        state.require_connected()?;
        state.position.x += delta.x.unwrap_or_default();
        state.position.y += delta.y.unwrap_or_default();
        state.position.z += delta.z.unwrap_or_default();
        Ok("Head moved".to_string())
    }

    async fn move_plunger(&self, delta: JogDelta) -> DriverResult<String> {
        let mut state = self.state();
        state.require_connected()?;
        state.position.a += delta.a.unwrap_or_default();
        state.position.b += delta.b.unwrap_or_default();
        Ok("Plunger moved".to_string())
    }

    async fn move_to_slot(&self, slot: &str) -> DriverResult<()> {
        let (x, y) = Self::slot_coordinates(slot)?;
        let mut state = self.state();
        state.require_connected()?;
        state.position.z = SAFE_Z;
        state.position.x = x;
        state.position.y = y;
        Ok(())
    }

    async fn move_to_container(&self, axis: &str, slot: &str, label: &str) -> DriverResult<()> {
        let (x, y) = Self::slot_coordinates(slot)?;
        let mut state = self.state();
        state.require_connected()?;
        state.pipette(axis)?;
        if !state.labware_known(label, Some(slot)) {
            return Err(DriverError::new(format!(
                "No labware named '{label}' in slot {slot}"
            )));
        }
        let key = (slot.to_uppercase(), label.to_string());
        let target = state.placeables.get(&key).copied().unwrap_or(Coordinates {
            x,
            y,
            z: 0.0,
            ..state.position
        });
        state.position.x = target.x;
        state.position.y = target.y;
        state.position.z = target.z;
        Ok(())
    }

    async fn pick_up_tip(&self, axis: &str) -> DriverResult<()> {
        let mut state = self.state();
        state.require_connected()?;
        state.pipette(axis)?.has_tip = true;
        Ok(())
    }

    async fn drop_tip(&self, axis: &str) -> DriverResult<()> {
        let mut state = self.state();
        state.require_connected()?;
        state.pipette(axis)?.has_tip = false;
        state.set_plunger(axis, "drop_tip")?;
        state.set_plunger(axis, "top")
    }

    async fn move_to_plunger_position(&self, axis: &str, position: &str) -> DriverResult<()> {
        let mut state = self.state();
        state.require_connected()?;
        state.set_plunger(axis, position)
    }

    async fn aspirate(&self, axis: &str) -> DriverResult<()> {
        let mut state = self.state();
        state.require_connected()?;
        state.position.z += 20.0;
        state.set_plunger(axis, "blow_out")?;
        state.set_plunger(axis, "bottom")?;
        state.position.z -= 20.0;
        state.set_plunger(axis, "top")
    }

    async fn dispense(&self, axis: &str) -> DriverResult<()> {
        let mut state = self.state();
        state.require_connected()?;
        state.set_plunger(axis, "blow_out")
    }

    async fn set_max_volume(&self, axis: &str, volume: u32) -> DriverResult<()> {
        if volume == 0 {
            return Err(DriverError::new("Max volume must be greater than zero"));
        }
        self.state().pipette(axis)?.max_volume = Some(volume);
        Ok(())
    }

    async fn calibrate_placeable(&self, axis: &str, slot: &str, label: &str) -> DriverResult<()> {
        let mut state = self.state();
        state.require_connected()?;
        state.pipette(axis)?;
        if !state.labware_known(label, Some(slot)) {
            return Err(DriverError::new(format!(
                "No labware named '{label}' in slot {slot}"
            )));
        }
        let position = state.position;
        state
            .placeables
            .insert((slot.to_uppercase(), label.to_string()), position);
        Ok(())
    }

    async fn calibrate_plunger(&self, axis: &str, position: &str) -> DriverResult<()> {
        let mut state = self.state();
        state.require_connected()?;
        let value = *state.plunger_mut(axis)?;
        let pipette = state.pipette(axis)?;
        let slot = pipette
            .plunger
            .get_mut(position)
            .ok_or_else(|| DriverError::new(format!("Unknown plunger position '{position}'")))?;
        *slot = value;
        Ok(())
    }

    async fn execute(&self, instruction: &Instruction) -> DriverResult<()> {
        self.state().require_connected()?;
        self.step().await?;

        let mut state = self.state();
        let index = state.executed;
        state.executed += 1;
        if let Some((_, message)) = state.fail_at.take_if(|(at, _)| *at == index) {
            return Err(DriverError::new(message));
        }
        Self::apply(&mut state, instruction)
    }

    async fn pause(&self) -> DriverResult<()> {
        self.state().paused = true;
        Ok(())
    }

    async fn resume(&self) -> DriverResult<()> {
        let mut state = self.state();
        state.paused = false;
        if state.stop.is_cancelled() {
            state.stop = CancellationToken::new();
        }
        Ok(())
    }

    async fn stop(&self) -> DriverResult<()> {
        let mut state = self.state();
        state.paused = false;
        state.stop.cancel();
        Ok(())
    }

    async fn take_warnings(&self) -> Vec<String> {
        std::mem::take(&mut self.state().warnings)
    }
}
