//! Response envelope and error conversion
//!
//! Every operation answers `{status, data}`. Failures carry the error text in
//! `data` and are also broadcast as a `danger` notification.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use deckhand_core::{Error, ErrorKind, Severity};
use serde::Serialize;
use tracing::{error, warn};

use crate::server::AppState;

/// Envelope status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiStatus {
    Success,
    Error,
}

/// API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub status: ApiStatus,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            status: ApiStatus::Success,
            data,
        }
    }

    pub fn error(data: T) -> Self {
        Self {
            status: ApiStatus::Error,
            data,
        }
    }
}

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

/// Wrap `data` in a success envelope
pub fn ok<T>(data: T) -> ApiResult<T> {
    Ok(Json(ApiResponse::success(data)))
}

/// Failure returned by a handler
#[derive(Debug)]
pub struct ApiError {
    kind: ErrorKind,
    message: String,
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn status_code(&self) -> StatusCode {
        match self.kind {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Driver => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self {
            kind: err.kind(),
            message: err.user_message(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(ApiResponse::error(self.message))).into_response()
    }
}

impl AppState {
    /// Log `err`, broadcast it as a `danger` notification and turn it into
    /// the error envelope
    pub fn fail(&self, err: impl Into<Error>) -> ApiError {
        let api_error = ApiError::from(err.into());
        match api_error.kind() {
            ErrorKind::Driver => error!(error = %api_error.message(), "Robot operation failed"),
            kind => warn!(error = %api_error.message(), ?kind, "Request rejected"),
        }
        self.event_bus
            .notify(api_error.message(), Severity::Danger);
        api_error
    }
}
