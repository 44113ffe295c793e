//! Infrastructure 層
//!
//! ドメイン層の trait に対する具体的な実装を提供します。

pub mod dedup;
pub mod dto;
pub mod message_pusher;
pub mod registry;
pub mod repository;
pub mod router;
pub mod validator;

pub use dedup::DedupCache;
pub use message_pusher::WebSocketMessagePusher;
pub use registry::{DEFAULT_SHARD_COUNT, PresenceFeed, ShardedConnectionRegistry};
pub use repository::{InMemoryMessageRepository, InMemoryUserDirectory};
pub use router::InMemoryRoomRouter;
pub use validator::StaticTokenValidator;
