//! Protocol upload and calibration step listing

use std::sync::Arc;

use axum::extract::multipart::{Multipart, MultipartRejection};
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use deckhand_core::{CalibrationStep, Error, ProtocolSource, Severity};
use serde::Serialize;
use tracing::info;

use super::response::{ok, ApiResponse, ApiResult};
use crate::server::AppState;

/// Upload answer, in the shape the UI reads
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadPayload {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub calibrations: Vec<CalibrationStep>,
    pub file_name: String,
    pub last_modified: Option<String>,
}

/// Current step list and the protocol it belongs to
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepsPayload {
    pub calibrations: Vec<CalibrationStep>,
    pub file_name: Option<String>,
    pub last_modified: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PlaceablesPayload {
    pub calibrations: Vec<CalibrationStep>,
}

/// Fields of the multipart upload form
#[derive(Debug, Default)]
pub struct UploadForm {
    pub filename: Option<String>,
    pub last_modified: Option<String>,
    pub bytes: Vec<u8>,
}

impl UploadForm {
    async fn read(mut multipart: Multipart) -> Result<Self, Error> {
        let mut form = Self::default();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| Error::validation(e.body_text()))?
        {
            match field.name() {
                Some("file") => {
                    form.filename = field.file_name().map(str::to_string);
                    form.bytes = field
                        .bytes()
                        .await
                        .map_err(|e| Error::validation(e.body_text()))?
                        .to_vec();
                }
                Some("lastModified") => {
                    form.last_modified = Some(
                        field
                            .text()
                            .await
                            .map_err(|e| Error::validation(e.body_text()))?,
                    );
                }
                _ => {}
            }
        }
        Ok(form)
    }
}

/// POST /upload
pub async fn upload(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<UploadPayload> {
    let multipart = multipart.map_err(|e| state.fail(Error::validation(e.body_text())))?;
    let form = UploadForm::read(multipart).await.map_err(|e| state.fail(e))?;
    accept_upload(&state, form).await
}

/// Load an uploaded file and make it the current protocol.
///
/// A file the loader reports errors for still replaces the current protocol,
/// but answers with an `error` status and no calibration steps.
pub async fn accept_upload(state: &AppState, form: UploadForm) -> ApiResult<UploadPayload> {
    let filename = match form.filename.as_deref() {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => return Err(state.fail(Error::validation("File expected"))),
    };

    if state.orchestrator.session().await.state.is_active() {
        return Err(state.fail(Error::conflict(
            "Cannot upload a protocol while one is running",
        )));
    }

    let protocol = state
        .loaders
        .load(&ProtocolSource {
            filename: &filename,
            last_modified: form.last_modified.as_deref(),
            bytes: &form.bytes,
        })
        .map_err(|e| state.fail(e))?;

    // The driver must accept the protocol before the workspace commits to it
    let protocol = Arc::new(protocol);
    let mut workspace = state.workspace.write().await;
    if !protocol.has_errors() {
        state
            .driver
            .load_protocol(protocol.clone())
            .await
            .map_err(|e| state.fail(e))?;
    }
    workspace.replace(protocol.clone());
    let calibrations = workspace.steps().to_vec();
    drop(workspace);

    let payload = UploadPayload {
        errors: protocol.errors.clone(),
        warnings: protocol.warnings.clone(),
        calibrations,
        file_name: protocol.filename.clone(),
        last_modified: protocol.last_modified.clone(),
    };

    if protocol.has_errors() {
        info!(
            filename = %filename,
            errors = protocol.errors.len(),
            "Uploaded protocol has errors"
        );
        state
            .event_bus
            .notify_all(protocol.errors.iter().cloned(), Severity::Danger);
        return Ok(Json(ApiResponse::error(payload)));
    }

    info!(filename = %filename, steps = payload.calibrations.len(), "Protocol uploaded");
    state
        .event_bus
        .notify(format!("Successfully uploaded {}", filename), Severity::Success);
    ok(payload)
}

/// GET /load
pub async fn reload_steps(State(state): State<AppState>) -> ApiResult<StepsPayload> {
    let workspace = state.workspace.read().await;
    ok(StepsPayload {
        calibrations: workspace.steps().to_vec(),
        file_name: workspace.filename().map(str::to_string),
        last_modified: workspace.last_modified().map(str::to_string),
    })
}

/// GET /instruments/placeables
pub async fn placeables(State(state): State<AppState>) -> ApiResult<PlaceablesPayload> {
    let workspace = state.workspace.read().await;
    ok(PlaceablesPayload {
        calibrations: workspace.steps().to_vec(),
    })
}

pub fn protocol_routes() -> Router<AppState> {
    Router::new()
        .route("/upload", post(upload))
        .route("/load", get(reload_steps))
        .route("/instruments/placeables", get(placeables))
}

