//! Transport abstraction used by the reconnection controller.
//!
//! A `Connector` opens one session at a time and hands back its two halves.
//! The controller writes through the `FrameSink` while it waits on the
//! `FrameStream`, so the halves are separate objects.

#[cfg(test)]
pub(crate) mod fake;
mod websocket;

use async_trait::async_trait;
use tayori_shared::protocol::{ClientFrame, ServerFrame};

use crate::error::ClientError;

pub use websocket::WebSocketConnector;

#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a fresh transport session
    async fn connect(&self) -> Result<(Box<dyn FrameSink>, Box<dyn FrameStream>), ClientError>;
}

#[async_trait]
pub trait FrameSink: Send {
    async fn send(&mut self, frame: &ClientFrame) -> Result<(), ClientError>;

    /// Close the session. Errors are ignored; the session is over either way.
    async fn close(&mut self);
}

#[async_trait]
pub trait FrameStream: Send {
    /// Next frame from the server.
    ///
    /// `None` means the server closed the session. Must be cancel safe: the
    /// controller polls it inside `tokio::select!`.
    async fn next_frame(&mut self) -> Option<Result<ServerFrame, ClientError>>;
}
