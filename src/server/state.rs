//! Shared server state
//!
//! One aggregate handed to every handler through axum `State`.

use std::sync::Arc;

use deckhand_core::{
    Driver, EventBus, JsonProtocolLoader, LoaderRegistry, ProtocolWorkspace, RunOrchestrator,
};
use tokio::sync::RwLock;

use super::config::AppConfig;

#[derive(Clone)]
pub struct AppState {
    pub event_bus: Arc<EventBus>,
    pub driver: Arc<dyn Driver>,
    pub orchestrator: Arc<RunOrchestrator>,
    pub workspace: Arc<RwLock<ProtocolWorkspace>>,
    pub loaders: Arc<LoaderRegistry>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    /// Wire the components around `driver`
    pub fn new(config: AppConfig, driver: Arc<dyn Driver>) -> Self {
        let event_bus = Arc::new(EventBus::new(config.events.capacity));
        let orchestrator = Arc::new(RunOrchestrator::new(driver.clone(), event_bus.clone()));
        let loaders = Arc::new(
            LoaderRegistry::new(&config.upload.allowed_extensions)
                .with_loader("json", Arc::new(JsonProtocolLoader)),
        );

        Self {
            event_bus,
            driver,
            orchestrator,
            workspace: Arc::new(RwLock::new(ProtocolWorkspace::new())),
            loaders,
            config: Arc::new(config),
        }
    }
}
