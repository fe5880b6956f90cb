//! Prometheus Metrics
//!
//! Defines and initializes all Prometheus metrics for the coordinator.
//!
//! Metrics tracked:
//! - `shoal_lock_acquired_total` - locks granted immediately, by operation type
//! - `shoal_lock_refreshed_total` - same-node re-requests answered as held
//! - `shoal_lock_queued_total` - requests appended to a wait queue
//! - `shoal_lock_refused_total` - requests refused (multi-node mode off)
//! - `shoal_lock_released_total` - unlocks accepted, by outcome
//! - `shoal_lock_promotions_total` - queue heads promoted after a failed release
//! - `shoal_events_delivered_total` - events pushed to subscribers
//! - `shoal_subscribers_evicted_total` - subscribers dropped on send failure
//! - `shoal_subscribers` - gauge of live subscriptions

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// State containing the Prometheus handle for metrics export
#[derive(Clone)]
pub struct MetricsState {
    pub prometheus_handle: PrometheusHandle,
}

/// Install the Prometheus recorder and register metric descriptions.
pub fn init_metrics() -> Result<MetricsState, Box<dyn std::error::Error + Send + Sync>> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metric_descriptions();
    Ok(MetricsState {
        prometheus_handle: handle,
    })
}

fn register_metric_descriptions() {
    describe_counter!(
        "shoal_lock_acquired_total",
        "Lock requests granted immediately"
    );
    describe_counter!(
        "shoal_lock_refreshed_total",
        "Lock requests answered as already held by the caller"
    );
    describe_counter!("shoal_lock_queued_total", "Lock requests queued behind a holder");
    describe_counter!("shoal_lock_refused_total", "Lock requests refused outright");
    describe_counter!("shoal_lock_released_total", "Unlock requests accepted");
    describe_counter!(
        "shoal_lock_promotions_total",
        "Queue heads promoted to holder after a failed release"
    );
    describe_counter!(
        "shoal_events_delivered_total",
        "Operation events delivered to subscribers"
    );
    describe_counter!(
        "shoal_subscribers_evicted_total",
        "Subscribers evicted after a failed send"
    );
    describe_gauge!("shoal_subscribers", "Live event subscriptions");
}

pub fn record_lock_acquired(op_type: &str) {
    counter!("shoal_lock_acquired_total", "op_type" => op_type.to_string()).increment(1);
}

pub fn record_lock_refreshed(op_type: &str) {
    counter!("shoal_lock_refreshed_total", "op_type" => op_type.to_string()).increment(1);
}

pub fn record_lock_queued(op_type: &str) {
    counter!("shoal_lock_queued_total", "op_type" => op_type.to_string()).increment(1);
}

pub fn record_lock_refused(op_type: &str) {
    counter!("shoal_lock_refused_total", "op_type" => op_type.to_string()).increment(1);
}

pub fn record_lock_released(op_type: &str, success: bool) {
    let outcome = if success { "success" } else { "failure" };
    counter!(
        "shoal_lock_released_total",
        "op_type" => op_type.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_promotion(op_type: &str) {
    counter!("shoal_lock_promotions_total", "op_type" => op_type.to_string()).increment(1);
}

pub fn record_events_broadcast(delivered: usize, evicted: usize) {
    if delivered > 0 {
        counter!("shoal_events_delivered_total").increment(delivered as u64);
    }
    if evicted > 0 {
        counter!("shoal_subscribers_evicted_total").increment(evicted as u64);
        gauge!("shoal_subscribers").decrement(evicted as f64);
    }
}

pub fn adjust_subscribers(delta: i64) {
    gauge!("shoal_subscribers").increment(delta as f64);
}
