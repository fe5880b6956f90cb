//! Observability Module
//!
//! Logging, tracing, and metrics for the coordinator:
//! - `metrics`: Prometheus metrics for lock traffic and the subscriber fabric
//! - `tracing`: subscriber setup with text/JSON output and optional OTLP export

pub mod metrics;
pub mod tracing;

pub use metrics::{init_metrics, MetricsState};
pub use tracing::{init_tracing, shutdown_tracing, TracingConfig};
