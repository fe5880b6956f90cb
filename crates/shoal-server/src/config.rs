//! Server Configuration
//!
//! All runtime settings with environment variable overrides. Bad values log
//! a warning and fall back to the default instead of failing startup.

use tracing::warn;

use crate::lock::ManagerOptions;

const DEFAULT_PORT: u16 = 8086;
const DEFAULT_SHARD_COUNT: usize = 32;

/// Server configuration with sensible defaults
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address (env: BIND_ADDR)
    pub bind_addr: String,

    /// HTTP listen port (env: PORT)
    pub port: u16,

    /// Whether a request for a held key queues the waiter, or is refused
    /// outright (env: ALLOW_MULTI_NODE_DOWNLOAD)
    pub allow_multi_node_download: bool,

    /// Lock table shard count; must be a power of two
    /// (env: SHOAL_SHARD_COUNT)
    pub shard_count: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            allow_multi_node_download: true,
            shard_count: DEFAULT_SHARD_COUNT,
        }
    }
}

impl ServerConfig {
    /// Create configuration from environment variables with defaults
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("BIND_ADDR") {
            config.bind_addr = addr;
        }

        if let Ok(port) = std::env::var("PORT") {
            match port.parse::<u16>() {
                Ok(parsed) => config.port = parsed,
                Err(_) => warn!(value = %port, "unparseable PORT, using default"),
            }
        }

        if let Ok(value) = std::env::var("ALLOW_MULTI_NODE_DOWNLOAD") {
            match parse_bool(&value) {
                Some(parsed) => config.allow_multi_node_download = parsed,
                None => warn!(
                    value = %value,
                    "unparseable ALLOW_MULTI_NODE_DOWNLOAD, using default true"
                ),
            }
        }

        if let Ok(value) = std::env::var("SHOAL_SHARD_COUNT") {
            match value.parse::<usize>() {
                Ok(parsed) if parsed.is_power_of_two() => config.shard_count = parsed,
                _ => warn!(
                    value = %value,
                    "SHOAL_SHARD_COUNT must be a power of two, using default"
                ),
            }
        }

        config
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }

    pub fn manager_options(&self) -> ManagerOptions {
        ManagerOptions {
            shard_count: self.shard_count,
            multi_node: self.allow_multi_node_download,
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "t" | "true" => Some(true),
        "0" | "f" | "false" => Some(false),
        _ => None,
    }
}
