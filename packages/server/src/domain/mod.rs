//! ドメイン層
//!
//! Value Object・Entity・純粋な状態表（Registry シャード、ルーム表）と、
//! 外部コラボレーターへのインターフェース（trait）を定義します。

pub mod entity;
pub mod error;
pub mod pusher;
pub mod registry;
pub mod repository;
pub mod room;
pub mod validator;
pub mod value_object;

pub use entity::{
    Connection, ConnectionState, DeliveryResult, DeliveryStatus, Envelope, PersistedRecord,
    PresenceChange, PresenceEntry, StoredMessage, UserProfile,
};
pub use error::{
    AuthError, MessagePushError, PersistenceError, RegistryError, RoomError, ValueObjectError,
};
pub use pusher::{MessagePusher, Outbound, PusherChannel};
pub use registry::RegistryShard;
pub use repository::{
    ConnectionRegistry, IdempotencyStore, MessageRepository, RoomRouter, UserDirectory,
};
pub use room::RoomTable;
pub use validator::TokenValidator;
pub use value_object::{
    ClientMessageId, ConnectionId, ConnectionIdFactory, DeliveryId, MessageContent, RecordId,
    RoomId, Timestamp, UserId,
};
