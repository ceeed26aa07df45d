//! Robot connection and manual movement endpoints

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Router;
use deckhand_core::{ConnectOptions, Coordinates, Error, JogDelta, Severity};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::extract::Payload;
use super::response::{ok, ApiResult};
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct ConnectRequest {
    #[serde(default)]
    pub port: Option<String>,
    #[serde(default)]
    pub options: Option<ConnectOptions>,
}

#[derive(Debug, Deserialize)]
pub struct SlotRequest {
    pub slot: String,
}

#[derive(Debug, Deserialize)]
pub struct ContainerRequest {
    pub slot: String,
    pub label: String,
    pub axis: String,
}

#[derive(Debug, Deserialize)]
pub struct AxisRequest {
    pub axis: String,
}

#[derive(Debug, Deserialize)]
pub struct PlungerPositionRequest {
    pub position: String,
    pub axis: String,
}

#[derive(Debug, Deserialize)]
pub struct MaxVolumeRequest {
    pub axis: String,
    pub volume: i64,
}

#[derive(Debug, Serialize)]
pub struct PortsPayload {
    pub ports: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ConnectionPayload {
    pub is_connected: bool,
    pub port: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CoordinatesPayload {
    pub coords: Coordinates,
}

#[derive(Debug, Serialize)]
pub struct DiagnosticsPayload {
    pub diagnostics: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct VersionsPayload {
    pub versions: serde_json::Value,
}

/// POST /robot/serial/connect
///
/// A failed connection leaves the driver disconnected.
pub async fn connect(
    State(state): State<AppState>,
    Payload(request): Payload<ConnectRequest>,
) -> ApiResult<()> {
    let options = request
        .options
        .unwrap_or_else(|| state.config.driver.connect_options());

    if let Err(e) = state.driver.connect(request.port.clone(), options).await {
        if let Err(cleanup) = state.driver.disconnect().await {
            warn!(error = %cleanup, "Disconnect after failed connect also failed");
        }
        return Err(state.fail(e));
    }

    info!(port = ?request.port, "Robot connected");
    ok(())
}

/// GET /robot/serial/disconnect
pub async fn disconnect(State(state): State<AppState>) -> ApiResult<()> {
    state.driver.disconnect().await.map_err(|e| state.fail(e))?;
    info!("Robot disconnected");
    state
        .event_bus
        .notify("Successfully disconnected", Severity::Info);
    ok(())
}

/// GET /robot/serial/list
pub async fn serial_ports(State(state): State<AppState>) -> ApiResult<PortsPayload> {
    let ports = state.driver.serial_ports().await.map_err(|e| state.fail(e))?;
    ok(PortsPayload { ports })
}

/// GET /robot/serial/is_connected
pub async fn is_connected(State(state): State<AppState>) -> ApiResult<ConnectionPayload> {
    ok(ConnectionPayload {
        is_connected: state.driver.is_connected().await,
        port: state.driver.connected_port().await,
    })
}

/// GET /robot/get_coordinates
pub async fn coordinates(State(state): State<AppState>) -> ApiResult<CoordinatesPayload> {
    let coords = state.driver.position().await.map_err(|e| state.fail(e))?;
    ok(CoordinatesPayload { coords })
}

/// GET /robot/diagnostics
pub async fn diagnostics(State(state): State<AppState>) -> ApiResult<DiagnosticsPayload> {
    let diagnostics = state.driver.diagnostics().await.map_err(|e| state.fail(e))?;
    ok(DiagnosticsPayload { diagnostics })
}

/// GET /robot/versions
pub async fn versions(State(state): State<AppState>) -> ApiResult<VersionsPayload> {
    let versions = state.driver.versions().await.map_err(|e| state.fail(e))?;
    ok(VersionsPayload { versions })
}

/// Axis selection for homing; `None` homes every axis
fn home_axes(axis: Option<&str>) -> Option<String> {
    match axis.map(str::trim) {
        None | Some("") => None,
        Some(axis) if axis.eq_ignore_ascii_case("all") || axis == "undefined" => None,
        Some(axis) => Some(axis.to_string()),
    }
}

async fn home_with(state: &AppState, axis: Option<&str>) -> ApiResult<String> {
    let result = state
        .driver
        .home(home_axes(axis))
        .await
        .map_err(|e| state.fail(e))?;
    state.event_bus.notify("Successfully homed", Severity::Info);
    ok(result)
}

/// GET /home
pub async fn home_all(State(state): State<AppState>) -> ApiResult<String> {
    home_with(&state, None).await
}

/// GET /home/{axis}
pub async fn home(State(state): State<AppState>, Path(axis): Path<String>) -> ApiResult<String> {
    home_with(&state, Some(&axis)).await
}

/// POST /jog
pub async fn jog(
    State(state): State<AppState>,
    Payload(delta): Payload<JogDelta>,
) -> ApiResult<String> {
    let result = if delta.moves_plunger() {
        state.driver.move_plunger(delta).await
    } else {
        state.driver.move_head(delta).await
    };
    ok(result.map_err(|e| state.fail(e))?)
}

/// POST /move_to_slot
pub async fn move_to_slot(
    State(state): State<AppState>,
    Payload(request): Payload<SlotRequest>,
) -> ApiResult<()> {
    state
        .driver
        .move_to_slot(&request.slot)
        .await
        .map_err(|e| state.fail(e))?;
    ok(())
}

/// POST /move_to_container
pub async fn move_to_container(
    State(state): State<AppState>,
    Payload(request): Payload<ContainerRequest>,
) -> ApiResult<()> {
    state
        .driver
        .move_to_container(&request.axis, &request.slot, &request.label)
        .await
        .map_err(|e| state.fail(e))?;
    ok(())
}

/// POST /pick_up_tip
pub async fn pick_up_tip(
    State(state): State<AppState>,
    Payload(request): Payload<AxisRequest>,
) -> ApiResult<()> {
    state
        .driver
        .pick_up_tip(&request.axis)
        .await
        .map_err(|e| state.fail(e))?;
    ok(())
}

/// POST /drop_tip
pub async fn drop_tip(
    State(state): State<AppState>,
    Payload(request): Payload<AxisRequest>,
) -> ApiResult<()> {
    state
        .driver
        .drop_tip(&request.axis)
        .await
        .map_err(|e| state.fail(e))?;
    ok(())
}

/// POST /move_to_plunger_position
pub async fn move_to_plunger_position(
    State(state): State<AppState>,
    Payload(request): Payload<PlungerPositionRequest>,
) -> ApiResult<()> {
    state
        .driver
        .move_to_plunger_position(&request.axis, &request.position)
        .await
        .map_err(|e| state.fail(e))?;
    ok(())
}

/// POST /aspirate
pub async fn aspirate(
    State(state): State<AppState>,
    Payload(request): Payload<AxisRequest>,
) -> ApiResult<()> {
    state
        .driver
        .aspirate(&request.axis)
        .await
        .map_err(|e| state.fail(e))?;
    ok(())
}

/// POST /dispense
pub async fn dispense(
    State(state): State<AppState>,
    Payload(request): Payload<AxisRequest>,
) -> ApiResult<()> {
    state
        .driver
        .dispense(&request.axis)
        .await
        .map_err(|e| state.fail(e))?;
    ok(())
}

/// POST /set_max_volume
pub async fn set_max_volume(
    State(state): State<AppState>,
    Payload(request): Payload<MaxVolumeRequest>,
) -> ApiResult<()> {
    let volume = u32::try_from(request.volume)
        .ok()
        .filter(|v| *v > 0)
        .ok_or_else(|| state.fail(Error::validation("Max volume must be a positive number")))?;

    state
        .driver
        .set_max_volume(&request.axis, volume)
        .await
        .map_err(|e| state.fail(e))?;
    state.event_bus.notify(
        format!("Max volume set to {}ul on the {} axis", volume, request.axis),
        Severity::Success,
    );
    ok(())
}

pub fn robot_routes() -> Router<AppState> {
    Router::new()
        .route("/robot/serial/connect", post(connect))
        .route("/robot/serial/disconnect", get(disconnect))
        .route("/robot/serial/list", get(serial_ports))
        .route("/robot/serial/is_connected", get(is_connected))
        .route("/robot/get_coordinates", get(coordinates))
        .route("/robot/diagnostics", get(diagnostics))
        .route("/robot/versions", get(versions))
        .route("/home", get(home_all))
        .route("/home/:axis", get(home))
        .route("/jog", post(jog))
        .route("/move_to_slot", post(move_to_slot))
        .route("/move_to_container", post(move_to_container))
        .route("/pick_up_tip", post(pick_up_tip))
        .route("/drop_tip", post(drop_tip))
        .route("/move_to_plunger_position", post(move_to_plunger_position))
        .route("/aspirate", post(aspirate))
        .route("/dispense", post(dispense))
        .route("/set_max_volume", post(set_max_volume))
}
