//! WebSocket frames exchanged between the Tayori server and its clients.
//!
//! Every frame is a JSON object tagged by `type`. The client must open with a
//! `hello` frame carrying its bearer token; everything else is rejected until
//! the server answers with `welcome`.

use serde::{Deserialize, Serialize};

/// Message body: text, an image reference, or both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct MessageContentDto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl MessageContentDto {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            image: None,
        }
    }
}

/// A message as submitted by a client, before the server assigns ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundEnvelope {
    /// Client-generated idempotency key, reused on every retry
    pub client_message_id: String,
    pub receiver_id: String,
    pub content: MessageContentDto,
}

/// A message pushed to live connections after it was persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveredMessage {
    pub delivery_id: String,
    pub client_message_id: String,
    pub record_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub content: MessageContentDto,
    /// Unix timestamp (milliseconds, UTC) assigned by storage
    pub created_at: i64,
}

/// A persisted message returned by history retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessageDto {
    pub record_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub content: MessageContentDto,
    pub created_at: i64,
}

/// User-level presence entry.
///
/// `version` grows by one on every online/offline flip of the user, so a
/// delta whose version is not newer than a snapshot entry is stale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub user_id: String,
    pub online: bool,
    pub version: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeliveryStatus {
    /// Pushed to at least one live connection of the receiver
    Delivered,
    /// Persisted; the receiver has no live connection and will read history
    StoredOffline,
    /// The idempotency key was already processed; nothing was redone
    DuplicateSuppressed,
}

/// Outcome of a successful send, as acknowledged to the sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    pub client_message_id: String,
    pub delivery_id: String,
    pub record_id: String,
    pub created_at: i64,
    pub status: DeliveryStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SendFailureReason {
    PersistenceFailed,
    PersistenceTimeout,
    InvalidEnvelope,
}

/// Frames sent from a client to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientFrame {
    Hello { token: String },
    Heartbeat,
    RequestRoster,
    JoinRoom { room_id: String },
    LeaveRoom { room_id: String },
    SendMessage { envelope: OutboundEnvelope },
    FetchHistory { peer_id: String },
    Typing { room_id: String },
}

/// Frames sent from the server to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerFrame {
    Welcome {
        connection_id: String,
        user_id: String,
        heartbeat_interval_ms: u64,
    },
    AuthFailed {
        reason: String,
    },
    RosterSnapshot {
        entries: Vec<RosterEntry>,
    },
    RosterDelta {
        entry: RosterEntry,
    },
    RoomJoined {
        room_id: String,
    },
    RoomLeft {
        room_id: String,
    },
    MessageNew {
        message: DeliveredMessage,
    },
    SendAck {
        receipt: DeliveryReceipt,
    },
    SendFailed {
        client_message_id: String,
        reason: SendFailureReason,
    },
    History {
        peer_id: String,
        messages: Vec<StoredMessageDto>,
    },
    Typing {
        room_id: String,
        user_id: String,
    },
    HeartbeatAck,
    Error {
        code: String,
        message: String,
    },
}

impl ServerFrame {
    /// Serialize to the JSON text carried by a WebSocket text frame.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl ClientFrame {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Room id of the one-to-one conversation between `a` and `b`.
///
/// Order independent, so both participants derive the same id:
/// `direct_room_id("bob", "alice") == "dm:alice:bob"`.
pub fn direct_room_id(a: &str, b: &str) -> String {
    let (low, high) = if a <= b { (a, b) } else { (b, a) };
    format!("dm:{}:{}", low, high)
}
