use std::sync::Arc;

use crate::config::Config;
use crate::llm_client::LlmClient;
use crate::session::archive::{MemorySnapshotArchive, SnapshotArchive};
use crate::session::hot_store::{HotStore, MemoryHotStore};

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Live session records (Redis, or memory under LOCAL_DEV).
    pub hot: Arc<dyn HotStore>,
    /// Append-only snapshot archive (S3, or memory under LOCAL_DEV).
    pub archive: Arc<dyn SnapshotArchive>,
    pub llm: LlmClient,
    pub config: Config,
}

impl AppState {
    pub fn in_memory(llm: LlmClient, config: Config) -> Self {
        Self {
            hot: Arc::new(MemoryHotStore::default()),
            archive: Arc::new(MemorySnapshotArchive::default()),
            llm,
            config,
        }
    }
}
