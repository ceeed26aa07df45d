use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// No run has been started
    #[default]
    Idle,
    /// Executing instructions
    Running,
    /// Paused between instructions
    Paused,
    /// Stopped by the operator
    Cancelled,
    /// Every instruction executed
    Completed,
    /// Aborted by a driver failure
    Failed,
}

impl RunState {
    /// Running or paused
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, Self::Running | Self::Paused)
    }

    /// Cancelled, completed or failed
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Cancelled | Self::Completed | Self::Failed)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Cancelled => "cancelled",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Instruction progress of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunProgress {
    /// Instructions executed so far
    pub completed: usize,
    /// Instructions in the protocol
    pub total: usize,
}

/// The in-flight or most recently finished run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSession {
    /// Run identifier, absent while idle
    pub id: Option<Uuid>,
    /// Current state
    pub state: RunState,
    /// When the run started
    pub started_at: Option<DateTime<Utc>>,
    /// When the run finished
    pub ended_at: Option<DateTime<Utc>>,
    /// Warnings reported at the end of the run
    pub warnings: Vec<String>,
    /// Errors reported at the end of the run
    pub errors: Vec<String>,
    /// Instruction progress
    pub progress: RunProgress,
}

impl RunSession {
    pub(crate) fn begin(total: usize) -> Self {
        Self {
            id: Some(Uuid::new_v4()),
            state: RunState::Running,
            started_at: Some(Utc::now()),
            progress: RunProgress {
                completed: 0,
                total,
            },
            ..Self::default()
        }
    }

    /// Wall time between start and end, or until now while still active
    #[must_use]
    pub fn elapsed(&self) -> Option<chrono::Duration> {
        let started = self.started_at?;
        Some(self.ended_at.unwrap_or_else(Utc::now) - started)
    }
}

/// Format a duration as `H:MM:SS`
#[must_use]
pub fn format_elapsed(elapsed: chrono::Duration) -> String {
    let secs = elapsed.num_seconds().max(0);
    format!("{}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}
