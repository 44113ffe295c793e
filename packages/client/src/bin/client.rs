//! Tayori CLI client with automatic reconnection.
//!
//! Authenticates with a bearer token, shows who is online, and sends direct
//! messages to the selected user. Drops are recovered with bounded exponential
//! backoff; unacknowledged messages are resent after reconnecting.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin tayori-client -- --token token-a --user-id alice --peer bob
//! cargo run --bin tayori-client -- -t token-b -i bob --max-retries 10
//! ```

use std::time::Duration;

use clap::Parser;
use tayori_client::{ClientConfig, ReconnectPolicy, run_client};
use tayori_shared::logger::setup_logger;

#[derive(Parser, Debug)]
#[command(name = "tayori-client")]
#[command(about = "Tayori chat client with presence and reconnection", long_about = None)]
struct Args {
    /// Bearer token presented in the hello frame
    #[arg(short = 't', long, env = "TAYORI_TOKEN")]
    token: String,

    /// Your user id, shown in the prompt
    #[arg(short = 'i', long, env = "TAYORI_USER_ID")]
    user_id: String,

    /// User to talk to first (switch later with /to)
    #[arg(short = 'p', long)]
    peer: Option<String>,

    /// WebSocket server URL
    #[arg(short = 'u', long, env = "TAYORI_URL", default_value = "ws://127.0.0.1:8080/ws")]
    url: String,

    /// Reconnection attempts before giving up
    #[arg(long, default_value = "5")]
    max_retries: u32,

    /// First reconnection delay in milliseconds (doubles on every attempt)
    #[arg(long, default_value = "500")]
    initial_backoff_ms: u64,

    /// Upper bound for the reconnection delay in milliseconds
    #[arg(long, default_value = "10000")]
    max_backoff_ms: u64,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), "info");

    let args = Args::parse();
    let config = ClientConfig {
        policy: ReconnectPolicy {
            initial_delay: Duration::from_millis(args.initial_backoff_ms),
            max_delay: Duration::from_millis(args.max_backoff_ms),
            max_retries: args.max_retries,
            ..ReconnectPolicy::default()
        },
        ..ClientConfig::default()
    };

    // Run the client
    if let Err(e) = run_client(args.url, args.token, args.user_id, args.peer, config).await {
        tracing::error!("Client error: {}", e);
        std::process::exit(1);
    }
}
