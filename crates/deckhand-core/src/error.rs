//! Error types for deckhand-core
//!
//! Every operation reachable from the control surface returns one of four
//! kinds of failure: validation, conflict, not-found, or a driver failure.

use thiserror::Error;

use crate::driver::DriverError;

/// Core error type
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or unsupported input, rejected before touching the driver
    #[error("{0}")]
    Validation(String),

    /// Operation incompatible with the current run state
    #[error("{0}")]
    Conflict(String),

    /// Referenced calibration target, instrument or labware does not exist
    #[error("{0}")]
    NotFound(String),

    /// The robot driver failed during the operation
    #[error(transparent)]
    Driver(#[from] DriverError),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// See [`Error::Validation`]
    Validation,
    /// See [`Error::Conflict`]
    Conflict,
    /// See [`Error::NotFound`]
    NotFound,
    /// See [`Error::Driver`]
    Driver,
}

impl Error {
    /// Build a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Build a conflict error
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Build a not-found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Classify this error
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Driver(_) => ErrorKind::Driver,
        }
    }

    /// Human-readable message, including a hint when one applies.
    ///
    /// This is the text that goes into both the error envelope and the
    /// `danger` notification.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self.suggestion() {
            Some(hint) => format!("{}. {}", self.to_string().trim_end_matches('.'), hint),
            None => self.to_string(),
        }
    }

    /// Get a suggestion for how to fix the error
    #[must_use]
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::Driver(e) if e.is_version_mismatch() => {
                Some("To upgrade, update the robot firmware and reconnect")
            }
            Self::Driver(e) if e.is_disconnected() => Some("Connect to the robot first"),
            _ => None,
        }
    }
}
