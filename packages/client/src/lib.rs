//! Tayori client: one logical connection that survives transport drops.
//!
//! - `ClientHandle`: listeners plus connect / disconnect / rooms / send / history
//! - `domain`: connection state machine and reconnect backoff policy
//! - `transport`: the `Connector` seam and its WebSocket implementation
//! - `runner`: interactive CLI session used by the `tayori-client` binary

mod controller;
pub mod domain;
pub mod error;
pub mod formatter;
mod handle;
mod listener;
pub mod outbox;
pub mod roster;
mod runner;
pub mod transport;
pub mod ui;

pub use domain::{ConnectionState, ReconnectPolicy};
pub use error::ClientError;
pub use handle::{ClientConfig, ClientHandle, DEFAULT_HANDSHAKE_TIMEOUT};
pub use runner::run_client;
pub use transport::{Connector, FrameSink, FrameStream, WebSocketConnector};
