//! Shared application state passed to every handler via Axum's `State` extractor.

use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::db::Db;
use crate::storage::BlobStore;

/// Shared application state for the kbserve server.
#[derive(Clone)]
pub struct AppState {
    /// Immutable configuration loaded at startup.
    pub config: Arc<Config>,
    /// Monotonic instant when the server started (for uptime calculation).
    pub start_time: Instant,
    /// Pooled SQLite handle.
    pub db: Db,
    /// Where bulletin file contents live.
    pub storage: Arc<dyn BlobStore>,
}

impl AppState {
    pub fn new(config: Config, db: Db, storage: Arc<dyn BlobStore>) -> Self {
        Self {
            config: Arc::new(config),
            start_time: Instant::now(),
            db,
            storage,
        }
    }
}
