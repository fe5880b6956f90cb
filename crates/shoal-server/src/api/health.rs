//! Health Check Endpoint
//!
//! Liveness probe. The coordinator holds all state in memory and has no
//! downstream dependency to check.

pub async fn health_check() -> &'static str {
    "OK"
}
