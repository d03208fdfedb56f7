use clap::{Parser, ValueEnum};
use std::net::SocketAddr;

/// Smallest accepted inbound message limit.
const MIN_MESSAGE_SIZE: usize = 1024;
/// Largest accepted inbound message limit.
const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Log output format.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// CLI arguments for the relay server.
#[derive(Parser, Debug, Clone)]
#[command(name = "pairs")]
#[command(about = "PAIR signaling relay server")]
#[command(version)]
pub struct Args {
    /// Socket address to listen on.
    #[arg(long, default_value = "127.0.0.1:6503", env = "PAIRS_LISTEN")]
    pub listen: SocketAddr,
    /// Request path WebSocket upgrades are accepted on; `/` accepts any path.
    #[arg(long, default_value = "/", env = "PAIRS_PATH")]
    pub path: String,
    /// Socket address for the metrics endpoint.
    #[arg(long, default_value = "127.0.0.1:9090", env = "PAIRS_METRICS")]
    pub metrics_addr: SocketAddr,
    /// Maximum total concurrent connections.
    #[arg(long, default_value = "10000", env = "PAIRS_MAX_CONNS")]
    pub max_conns: usize,
    /// Maximum inbound WebSocket message size in bytes.
    #[arg(long, default_value = "1048576", env = "PAIRS_MAX_MESSAGE_SIZE")]
    pub max_message_size: usize,
    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text, env = "PAIRS_LOG_FORMAT")]
    pub log_format: LogFormat,
}

/// Runtime configuration derived from [`Args`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address to listen on.
    pub listen: SocketAddr,
    /// Request path WebSocket upgrades are accepted on.
    pub path: String,
    /// Socket address for the metrics endpoint.
    pub metrics_addr: SocketAddr,
    /// Maximum total concurrent connections.
    pub max_conns: usize,
    /// Maximum inbound WebSocket message size in bytes.
    pub max_message_size: usize,
}

impl ServerConfig {
    /// Validates the configuration values are within acceptable bounds.
    /// Returns Ok(()) if valid, Err with description otherwise.
    pub fn validate(&self) -> Result<(), String> {
        if !self.path.starts_with('/') {
            return Err(format!("path must start with '/', got {:?}", self.path));
        }
        if self.path.contains('?') || self.path.contains('#') {
            return Err("path must not contain a query or fragment".to_string());
        }

        if self.max_conns == 0 {
            return Err("max_conns must be greater than 0".to_string());
        }
        if self.max_conns > 1_000_000 {
            return Err("max_conns exceeds reasonable limit (1,000,000)".to_string());
        }

        if self.max_message_size < MIN_MESSAGE_SIZE {
            return Err(format!(
                "max_message_size must be at least {} bytes",
                MIN_MESSAGE_SIZE
            ));
        }
        if self.max_message_size > MAX_MESSAGE_SIZE {
            return Err(format!(
                "max_message_size exceeds maximum allowed ({} bytes)",
                MAX_MESSAGE_SIZE
            ));
        }

        if self.listen == self.metrics_addr {
            return Err("listen and metrics_addr must differ".to_string());
        }
        Ok(())
    }
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        Self {
            listen: args.listen,
            path: args.path,
            metrics_addr: args.metrics_addr,
            max_conns: args.max_conns,
            max_message_size: args.max_message_size,
        }
    }
}
