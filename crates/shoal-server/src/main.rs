//! Shoal Server - Cluster Content-Pull Coordinator

use std::sync::Arc;

use shoal_server::api::{self, AppState};
use shoal_server::config::ServerConfig;
use shoal_server::lock::LockManager;
use shoal_server::observability::{init_metrics, init_tracing, shutdown_tracing, TracingConfig};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing(TracingConfig::from_env()).map_err(|e| anyhow::anyhow!(e))?;

    let config = ServerConfig::from_env();
    info!(
        addr = %config.listen_addr(),
        shards = config.shard_count,
        multi_node = config.allow_multi_node_download,
        "starting shoal coordinator"
    );
    if !config.allow_multi_node_download {
        info!("multi-node mode off: requests for held locks are refused instead of queued");
    }

    let metrics_state = match init_metrics() {
        Ok(state) => Some(state),
        Err(e) => {
            warn!(error = %e, "metrics recorder unavailable, /metrics disabled");
            None
        }
    };

    let manager = Arc::new(LockManager::new(config.manager_options()));
    let state = AppState::new(manager, metrics_state);
    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(config.listen_addr()).await?;
    info!(addr = %config.listen_addr(), "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    shutdown_tracing();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to install ctrl-c handler");
    }
}
