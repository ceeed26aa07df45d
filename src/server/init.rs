//! Server initialization and main run loop
//!
//! Contains the main `run()` function that starts all server components.

use super::config::AppConfig;
use super::loader::load_config;
use super::state::AppState;
use anyhow::{Context, Result};
use axum::{routing::get, Router};
use deckhand_core::{wait_for_shutdown_signal, Driver, ShutdownController, SimulatedDriver};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing::{info, warn};

/// Run the server
pub async fn run() -> Result<()> {
    info!("Starting Deckhand v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config().context("Failed to load configuration")?;
    info!("Configuration loaded");

    let driver = Arc::new(SimulatedDriver::new(config.driver.simulated()));
    match driver
        .connect(Some(config.driver.port.clone()), config.driver.connect_options())
        .await
    {
        Ok(()) => info!(port = %config.driver.port, "Robot connected"),
        Err(e) => warn!("Robot not connected at startup: {}", e),
    }

    let shutdown_controller =
        ShutdownController::new(Duration::from_secs(config.shutdown.timeout_secs));
    info!(
        "Shutdown controller initialized (timeout: {}s)",
        config.shutdown.timeout_secs
    );

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;

    let state = AppState::new(config, driver);
    info!(
        "EventBus initialized (capacity: {})",
        state.config.events.capacity
    );
    let orchestrator = state.orchestrator.clone();
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("HTTP server listening on http://{}", addr);

    // Signal handling drains the active run before the listener closes
    let signal_controller = shutdown_controller.clone();
    let signal_orchestrator = orchestrator.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        signal_controller.shutdown(&signal_orchestrator).await;
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_controller.token().cancelled_owned())
        .await
        .context("HTTP server error")?;

    shutdown_controller.shutdown(&orchestrator).await;
    info!("Deckhand shutdown complete");
    Ok(())
}

/// Build the application router around `state`
pub fn build_router(state: AppState) -> Router {
    let app = Router::new()
        .merge(crate::api::api_router())
        .merge(crate::websocket::websocket_router());

    // Add Web UI static file serving (SPA fallback) or simple text response
    let app = match web_ui_dir(&state.config) {
        Some(dir) => {
            info!("Web UI enabled: serving from {}", dir.display());
            let serve_dir = ServeDir::new(dir)
                .append_index_html_on_directories(true)
                .fallback(tower_http::services::ServeFile::new(dir.join("index.html")));
            app.fallback_service(serve_dir)
        }
        None => app.route("/", get(|| async { "Deckhand" })),
    };

    app.layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn web_ui_dir(config: &AppConfig) -> Option<&Path> {
    let dir = Path::new(&config.web.static_dir);
    dir.exists().then_some(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn app() -> Router {
        let mut config = AppConfig::default();
        config.web.static_dir = "does/not/exist".to_string();
        build_router(AppState::new(config, Arc::new(SimulatedDriver::default())))
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_route() {
        let response = app()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["run_state"], "idle");
    }

    #[tokio::test]
    async fn test_conflict_over_http() {
        let response = app()
            .oneshot(Request::post("/pause").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let body = json_body(response).await;
        assert_eq!(body["status"], "error");
        assert_eq!(body["data"], "No protocol is running");
    }

    #[tokio::test]
    async fn test_home_route_with_axis() {
        let response = app()
            .oneshot(Request::get("/home/all").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["status"], "success");
        assert_eq!(body["data"], "Homed XYZAB");
    }

    #[tokio::test]
    async fn test_malformed_json_uses_envelope() {
        let request = Request::post("/set_max_volume")
            .header("content-type", "application/json")
            .body(Body::from("{\"axis\": \"a\"}"))
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = json_body(response).await;
        assert_eq!(body["status"], "error");
        assert!(body["data"].as_str().unwrap().contains("volume"));
    }

    #[tokio::test]
    async fn test_root_without_web_ui() {
        let response = app()
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
