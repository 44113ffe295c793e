//! Tayori presence and message delivery server.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin tayori-server -- --user alice:token-a:Alice --user bob:token-b
//! cargo run --bin tayori-server -- --host 0.0.0.0 --port 3000 --heartbeat-timeout-secs 30
//! ```

use std::time::Duration;

use clap::Parser;
use tayori_server::{
    config::{SeedUser, ServerConfig},
    ui::Server,
};
use tayori_shared::logger::setup_logger;

#[derive(Parser, Debug)]
#[command(name = "tayori-server")]
#[command(about = "Presence and message delivery server over WebSocket", long_about = None)]
struct Args {
    /// Host address to bind the server to
    #[arg(short = 'H', long, env = "TAYORI_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port number to bind the server to
    #[arg(short = 'p', long, env = "TAYORI_PORT", default_value = "8080")]
    port: u16,

    /// Seconds of silence before a connection is dropped
    #[arg(long, env = "TAYORI_HEARTBEAT_TIMEOUT_SECS", default_value = "60")]
    heartbeat_timeout_secs: u64,

    /// Seconds between heartbeat sweeps
    #[arg(long, env = "TAYORI_SWEEP_INTERVAL_SECS", default_value = "10")]
    sweep_interval_secs: u64,

    /// Seconds a client has to send its hello frame
    #[arg(long, env = "TAYORI_HANDSHAKE_TIMEOUT_SECS", default_value = "10")]
    handshake_timeout_secs: u64,

    /// Milliseconds to wait on the message store
    #[arg(long, env = "TAYORI_PERSIST_TIMEOUT_MS", default_value = "5000")]
    persist_timeout_ms: u64,

    /// Seconds a delivery result stays in the dedup cache
    #[arg(long, env = "TAYORI_DEDUP_RETENTION_SECS", default_value = "600")]
    dedup_retention_secs: u64,

    /// Maximum number of entries in the dedup cache
    #[arg(long, env = "TAYORI_DEDUP_CAPACITY", default_value = "100000")]
    dedup_capacity: usize,

    /// Number of connection registry shards
    #[arg(long, env = "TAYORI_SHARD_COUNT", default_value = "16")]
    shard_count: usize,

    /// Registered user as `user_id:token[:display_name]` (repeatable)
    #[arg(short = 'u', long = "user", value_name = "USER")]
    users: Vec<SeedUser>,
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        let heartbeat_timeout = Duration::from_secs(args.heartbeat_timeout_secs);
        Self {
            heartbeat_timeout,
            heartbeat_interval: heartbeat_timeout / 3,
            sweep_interval: Duration::from_secs(args.sweep_interval_secs),
            handshake_timeout: Duration::from_secs(args.handshake_timeout_secs),
            persist_timeout: Duration::from_millis(args.persist_timeout_ms),
            dedup_retention: Duration::from_secs(args.dedup_retention_secs),
            dedup_capacity: args.dedup_capacity,
            shard_count: args.shard_count,
            users: args.users,
        }
    }
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), "debug");

    let args = Args::parse();
    let (host, port) = (args.host.clone(), args.port);

    let config = ServerConfig::from(args);
    if config.users.is_empty() {
        tracing::warn!("No users registered; every hello will be rejected (use --user)");
    }

    let server = match Server::new(config) {
        Ok(server) => server,
        Err(e) => {
            tracing::error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = server.run(host, port).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
