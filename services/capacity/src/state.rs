//! Application state shared across request handlers.

use std::sync::Arc;
use std::time::Duration;

use crate::capacity::CapacityChecker;
use crate::store::Storage;

/// Shared application state.
///
/// This is passed to all request handlers via Axum's state extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    storage: Arc<dyn Storage>,
    checker: Arc<CapacityChecker>,
    job_timeout: Duration,
}

impl AppState {
    /// Create a new application state.
    pub fn new(storage: Arc<dyn Storage>, checker: Arc<CapacityChecker>, job_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                storage,
                checker,
                job_timeout,
            }),
        }
    }

    /// Get a reference to the storage backend.
    pub fn storage(&self) -> &dyn Storage {
        self.inner.storage.as_ref()
    }

    /// Get the capacity checker.
    pub fn checker(&self) -> &CapacityChecker {
        &self.inner.checker
    }

    /// Upper bound on one triggered run.
    pub fn job_timeout(&self) -> Duration {
        self.inner.job_timeout
    }
}
