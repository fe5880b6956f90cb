//! HTTP API Module
//!
//! REST + SSE surface of the coordinator.
//!
//! This module contains:
//! - `state`: Shared application state
//! - `lock`: POST /lock and POST /unlock
//! - `subscribe`: GET /lock/subscribe (Server-Sent Events)
//! - `health`: Liveness probe
//! - `metrics`: Prometheus metrics endpoint

mod health;
mod lock;
mod metrics;
mod state;
mod subscribe;

pub use state::AppState;

use axum::{
    routing::{get, post},
    Router,
};

/// Create the API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/lock", post(lock::lock))
        .route("/unlock", post(lock::unlock))
        .route("/lock/subscribe", get(subscribe::subscribe))
        .route("/health", get(health::health_check))
        .route("/metrics", get(metrics::get_metrics))
        .with_state(state)
}
