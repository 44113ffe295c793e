//! UseCase 層
//!
//! ドメイン層の trait を組み合わせてアプリケーションの操作を実装します。
//! UI 層（WebSocket / HTTP ハンドラ）はここだけを呼び出します。

pub mod authenticate;
pub mod connect_participant;
pub mod disconnect_participant;
pub mod error;
pub mod heartbeat;
pub mod history;
pub mod list_users;
pub mod presence;
pub mod room;
pub mod send_message;

pub use authenticate::{AuthenticateUseCase, DEFAULT_HANDSHAKE_TIMEOUT};
pub use connect_participant::ConnectParticipantUseCase;
pub use disconnect_participant::DisconnectParticipantUseCase;
pub use error::{ConnectError, FetchHistoryError, SendMessageError};
pub use heartbeat::{DEFAULT_HEARTBEAT_TIMEOUT, DEFAULT_SWEEP_INTERVAL, HeartbeatUseCase};
pub use history::FetchHistoryUseCase;
pub use list_users::ListUsersUseCase;
pub use presence::PresenceBroadcaster;
pub use room::RoomUseCase;
pub use send_message::{DEFAULT_PERSIST_TIMEOUT, SendMessageUseCase};
