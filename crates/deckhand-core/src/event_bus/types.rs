use serde::{Deserialize, Serialize};

/// Severity of an operator notification, rendered as the UI alert style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Operation succeeded
    Success,
    /// Something failed
    Danger,
    /// Non-fatal problem
    Warning,
    /// Informational
    Info,
}

/// Events broadcast to every connected client.
///
/// Serialized with the variant name in `name`, which is the shape the
/// browser UI listens for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// Human-readable notification
    Notification {
        /// Message text
        text: String,
        /// Alert style
        #[serde(rename = "type")]
        severity: Severity,
    },
    /// An instruction of the running protocol is about to execute
    CommandRun {
        /// Who started the run
        caller: String,
        /// Zero-based index of the instruction
        command_index: usize,
        /// Number of instructions in the protocol
        commands_total: usize,
        /// Description of the instruction
        command_description: String,
    },
    /// Terminal event, published exactly once when a run ends
    RunFinished,
}

impl ServerEvent {
    /// Build a notification event
    pub fn notification(text: impl Into<String>, severity: Severity) -> Self {
        Self::Notification {
            text: text.into(),
            severity,
        }
    }

    /// Notification text and severity, if this is a notification
    #[must_use]
    pub fn as_notification(&self) -> Option<(&str, Severity)> {
        match self {
            Self::Notification { text, severity } => Some((text.as_str(), *severity)),
            _ => None,
        }
    }
}
