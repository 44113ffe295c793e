//! Error types for the Tayori client.

use std::time::Duration;

use tayori_shared::protocol::SendFailureReason;
use thiserror::Error;

/// Client-specific errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// The transport could not be opened
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// The server rejected the credential (terminal, never retried)
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    /// An established transport dropped or was closed by the server
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// Nothing arrived from the server for twice the heartbeat interval
    #[error("No frame from server within {0:?}")]
    HeartbeatTimeout(Duration),

    #[error("Gave up after {0} reconnection attempts")]
    RetriesExhausted(u32),

    #[error("Send of '{client_message_id}' failed: {reason:?}")]
    SendFailed {
        client_message_id: String,
        reason: SendFailureReason,
    },

    #[error("Server error {code}: {message}")]
    Server { code: String, message: String },

    #[error("Unexpected frame: {0}")]
    Protocol(String),

    #[error("Client is already connected")]
    AlreadyConnected,

    /// The client was closed before the request completed
    #[error("Client is closed")]
    Closed,
}
