//! Application state.

use std::sync::Arc;

use beatsync_storage::{ArtifactStore, LocalArtifactStore, StorageResult};

use crate::config::ApiConfig;
use crate::services::JobService;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ApiConfig>,
    pub store: Arc<dyn ArtifactStore>,
    pub jobs: JobService,
}

impl AppState {
    /// Create application state backed by the local filesystem store.
    pub fn new(config: ApiConfig) -> StorageResult<Self> {
        let store = LocalArtifactStore::new(&config.storage)?;
        Ok(Self::with_store(config, Arc::new(store)))
    }

    /// Create application state around an existing store.
    pub fn with_store(config: ApiConfig, store: Arc<dyn ArtifactStore>) -> Self {
        let jobs = JobService::new(
            Arc::clone(&store),
            config.upload.clone(),
            config.processor.clone(),
            config.probe.clone(),
        );

        Self {
            config: Arc::new(config),
            store,
            jobs,
        }
    }
}
