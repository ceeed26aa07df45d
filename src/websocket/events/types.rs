use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Message sent by a client over the event stream
#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Sent by the UI once its socket is open
    Connected,
    /// Keepalive
    Ping,
}

/// Session-level message sent to one client, next to the broadcast events
#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(tag = "name", rename_all = "kebab-case")]
pub enum SessionMessage {
    /// Connection established
    Connected { session_id: Uuid },
    /// Pong response
    Pong,
    /// Error notification
    Error {
        message: String,
        code: Option<String>,
    },
}
