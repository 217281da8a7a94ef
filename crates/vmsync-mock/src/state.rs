//! Application state shared by the mock's handlers.
//!
//! [`AppState`] wraps the [`Backend`] in `Arc<tokio::sync::Mutex<>>` so
//! handlers await the lock without blocking the runtime. The idle sweeper is
//! started on construction and aborted when the last clone of the state is
//! dropped.

use std::sync::Arc;

use crate::backend::Backend;
use crate::config::MockConfig;
use crate::sweeper::{IdleSweeper, SharedBackend};

#[derive(Clone)]
pub struct AppState {
    pub backend: SharedBackend,
    pub sweeper: Arc<IdleSweeper>,
    pub config: MockConfig,
}

impl AppState {
    /// Creates empty state and starts the idle sweeper. Must be called from
    /// within a tokio runtime.
    pub fn new(config: MockConfig) -> Self {
        let backend: SharedBackend = Arc::new(tokio::sync::Mutex::new(Backend::new()));
        let sweeper = Arc::new(IdleSweeper::new(
            Arc::clone(&backend),
            config.idle_timeout,
            config.sweep_interval,
        ));
        sweeper.start();
        AppState {
            backend,
            sweeper,
            config,
        }
    }

    /// Default configuration (for testing).
    pub fn in_memory() -> Self {
        Self::new(MockConfig::default())
    }
}
