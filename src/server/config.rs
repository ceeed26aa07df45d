//! Server configuration types
//!
//! Contains all configuration structures for the deckhand server.

use std::time::Duration;

use anyhow::{bail, Result};
use deckhand_core::{ConnectOptions, SimulatedConfig};
use serde::{Deserialize, Serialize};

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub events: EventsConfig,
    #[serde(default)]
    pub driver: DriverConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub shutdown: ShutdownConfig,
}

impl AppConfig {
    /// Reject settings the server cannot start with
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            bail!("server.port must be between 1 and 65535");
        }
        if self.events.capacity == 0 {
            bail!("events.capacity must be greater than zero");
        }
        if self.driver.mode != DriverMode::Simulated {
            bail!("driver.mode '{}' is not supported", self.driver.mode);
        }
        if self.upload.allowed_extensions.is_empty() {
            bail!("upload.allowed_extensions must list at least one extension");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 31950,
        }
    }
}

/// Event bus settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Events buffered per subscriber before it starts skipping
    #[serde(default = "default_event_capacity")]
    pub capacity: usize,
}

fn default_event_capacity() -> usize {
    256
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            capacity: default_event_capacity(),
        }
    }
}

/// Which driver backs the server
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverMode {
    #[default]
    Simulated,
    Serial,
}

impl std::fmt::Display for DriverMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Simulated => write!(f, "simulated"),
            Self::Serial => write!(f, "serial"),
        }
    }
}

/// Robot driver settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    #[serde(default)]
    pub mode: DriverMode,
    /// Port reported by (and used to connect) the robot
    #[serde(default = "default_driver_port")]
    pub port: String,
    #[serde(default = "default_true")]
    pub limit_switches: bool,
    /// Simulated time per instruction
    #[serde(default)]
    pub step_delay_ms: u64,
}

fn default_driver_port() -> String {
    "Virtual Smoothie".to_string()
}

fn default_true() -> bool {
    true
}

impl DriverConfig {
    /// Settings for the simulated robot; it starts disconnected and is
    /// connected during server init
    pub fn simulated(&self) -> SimulatedConfig {
        SimulatedConfig {
            port: self.port.clone(),
            connect_on_start: false,
            step_delay: Duration::from_millis(self.step_delay_ms),
            ..SimulatedConfig::default()
        }
    }

    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            limit_switches: self.limit_switches,
        }
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            mode: DriverMode::Simulated,
            port: default_driver_port(),
            limit_switches: true,
            step_delay_ms: 0,
        }
    }
}

/// Protocol upload settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Accepted file extensions, without the dot
    #[serde(default = "default_extensions")]
    pub allowed_extensions: Vec<String>,
}

fn default_extensions() -> Vec<String> {
    vec!["json".to_string(), "py".to_string()]
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            allowed_extensions: default_extensions(),
        }
    }
}

/// Web UI settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    /// Directory of the built web UI; skipped when missing
    #[serde(default = "default_static_dir")]
    pub static_dir: String,
}

fn default_static_dir() -> String {
    "web/dist".to_string()
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            static_dir: default_static_dir(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
}

/// Graceful shutdown settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownConfig {
    /// Time allowed for an active run to unwind
    #[serde(default = "default_shutdown_timeout")]
    pub timeout_secs: u64,
}

fn default_shutdown_timeout() -> u64 {
    deckhand_core::shutdown::DEFAULT_SHUTDOWN_TIMEOUT_SECS
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_shutdown_timeout(),
        }
    }
}
