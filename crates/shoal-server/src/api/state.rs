//! Application State
//!
//! Shared state passed to all API handlers.

use std::sync::Arc;

use crate::lock::LockManager;
use crate::observability::MetricsState;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<LockManager>,
    pub metrics_state: Option<MetricsState>,
}

impl AppState {
    pub fn new(manager: Arc<LockManager>, metrics_state: Option<MetricsState>) -> Self {
        Self {
            manager,
            metrics_state,
        }
    }
}
