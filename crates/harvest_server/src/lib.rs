//! Harvest server library: HTTP control surface over the block harvester

pub mod api;
pub mod config;
pub mod models;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use harvest_store::{
    BatchStore, ExplorerClient, Harvester, ProgressStore, ScanService, StoreError,
};

pub use crate::api::*;
pub use crate::config::*;
pub use crate::models::*;

// Application state shared by all handlers
#[derive(Clone)]
pub struct AppState {
    pub scanner: ScanService,
    pub config: Arc<AppConfig>,
}

impl AppState {
    /// Open the data directory and wire the harvester to the configured explorer
    pub fn from_config(config: AppConfig) -> Result<Self, StoreError> {
        let batches = Arc::new(BatchStore::open(
            &config.scanner.data_dir,
            config.scanner.unit.clone(),
        )?);
        let explorer = Arc::new(ExplorerClient::new(config.explorer.clone()));
        let harvester = Harvester::new(
            batches,
            ProgressStore::new(&config.scanner.data_dir),
            explorer.clone(),
            explorer,
            config.scan_settings(),
        );

        Ok(Self {
            scanner: ScanService::new(Arc::new(harvester)),
            config: Arc::new(config),
        })
    }
}

/// All control routes
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/stats", get(get_stats))
        .route("/scan/start", post(start_scan))
        .route("/scan/stop", post(stop_scan))
        .route("/batches", get(list_batches))
        // Static segment before the parameterized one
        .route("/batches/current/claim", post(claim_current_batch))
        .route("/batches/cleanup", post(cleanup_batches))
        .route("/batches/{index}", get(get_batch).delete(delete_batch))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
