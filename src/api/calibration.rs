//! Calibration endpoints
//!
//! Each call checks that the current protocol has a step for the target, asks
//! the driver to save the calibration and then marks the step complete.

use axum::extract::State;
use axum::routing::post;
use axum::Router;
use deckhand_core::{CalibrationStep, RecordDetail, Severity, TargetRef};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::extract::Payload;
use super::response::{ok, ApiResult};
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct PlaceableRequest {
    pub label: String,
    pub axis: String,
    /// Needed only when the label appears in more than one slot
    #[serde(default)]
    pub slot: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PlungerRequest {
    pub position: String,
    pub axis: String,
}

#[derive(Debug, Serialize)]
pub struct PlaceableCalibrated {
    pub name: String,
    pub slot: String,
    pub axis: String,
    pub calibrations: Vec<CalibrationStep>,
}

#[derive(Debug, Serialize)]
pub struct PlungerCalibrated {
    pub position: String,
    pub axis: String,
    pub calibrations: Vec<CalibrationStep>,
}

/// POST /calibrate_placeable
pub async fn calibrate_placeable(
    State(state): State<AppState>,
    Payload(request): Payload<PlaceableRequest>,
) -> ApiResult<PlaceableCalibrated> {
    // Held across the driver call so an upload cannot swap the steps out
    let mut workspace = state.workspace.write().await;
    let slot = workspace
        .placeable_slot(&request.label, request.slot.as_deref())
        .map_err(|e| state.fail(e))?;
    state
        .driver
        .calibrate_placeable(&request.axis, &slot, &request.label)
        .await
        .map_err(|e| state.fail(e))?;
    let target = TargetRef::Placeable {
        label: &request.label,
        slot: Some(&slot),
    };
    workspace
        .record(&target, RecordDetail::CalibratedWith(&request.axis))
        .map_err(|e| state.fail(e))?;
    let calibrations = workspace.steps().to_vec();
    drop(workspace);

    info!(label = %request.label, slot = %slot, axis = %request.axis, "Placeable calibrated");
    state.event_bus.notify(
        format!("Saved {} for the {} axis", request.label, request.axis),
        Severity::Success,
    );
    ok(PlaceableCalibrated {
        name: request.label,
        slot,
        axis: request.axis,
        calibrations,
    })
}

/// POST /calibrate_plunger
pub async fn calibrate_plunger(
    State(state): State<AppState>,
    Payload(request): Payload<PlungerRequest>,
) -> ApiResult<PlungerCalibrated> {
    let target = TargetRef::Plunger {
        axis: &request.axis,
    };

    let mut workspace = state.workspace.write().await;
    workspace.ensure_target(&target).map_err(|e| state.fail(e))?;
    state
        .driver
        .calibrate_plunger(&request.axis, &request.position)
        .await
        .map_err(|e| state.fail(e))?;
    workspace
        .record(&target, RecordDetail::PlungerPosition(&request.position))
        .map_err(|e| state.fail(e))?;
    let calibrations = workspace.steps().to_vec();
    drop(workspace);

    info!(position = %request.position, axis = %request.axis, "Plunger calibrated");
    state.event_bus.notify(
        format!("Saved {} on the {} pipette", request.position, request.axis),
        Severity::Success,
    );
    ok(PlungerCalibrated {
        position: request.position,
        axis: request.axis,
        calibrations,
    })
}

pub fn calibration_routes() -> Router<AppState> {
    Router::new()
        .route("/calibrate_placeable", post(calibrate_placeable))
        .route("/calibrate_plunger", post(calibrate_plunger))
}
