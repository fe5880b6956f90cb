//! Prometheus Metrics Endpoint
//!
//! Renders the coordinator's lock-traffic and subscriber-fabric metrics at
//! GET /metrics in Prometheus exposition format.

use axum::{extract::State, http::StatusCode, response::IntoResponse};

use super::AppState;

/// GET /metrics - Prometheus exposition endpoint
///
/// Answers 503 when the recorder was not installed at startup.
#[tracing::instrument(skip(state))]
pub async fn get_metrics(State(state): State<AppState>) -> impl IntoResponse {
    let Some(metrics) = &state.metrics_state else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            [("content-type", "text/plain; charset=utf-8")],
            "metrics recorder not installed".to_string(),
        );
    };
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        metrics.prometheus_handle.render(),
    )
}
