//! ドメイン層のエラー定義

use thiserror::Error;

use super::value_object::ConnectionId;

/// Value Object の生成に失敗した
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueObjectError {
    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("{field} must be at most {max} characters")]
    TooLong { field: &'static str, max: usize },

    #[error("{field} has an invalid format: '{value}'")]
    InvalidFormat { field: &'static str, value: String },

    #[error("message must carry text or an image")]
    EmptyContent,
}

/// 認証に失敗した（その接続にとって致命的、プロセスにとっては致命的ではない）
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("credential was not provided")]
    MissingCredential,

    #[error("credential is invalid or expired")]
    InvalidCredential,

    #[error("credential validation timed out")]
    Timeout,

    #[error("auth collaborator unavailable: {0}")]
    Unavailable(String),
}

/// Connection Registry の操作エラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("connection '{0}' is not registered")]
    NotFound(ConnectionId),
}

/// Room Router の操作エラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoomError {
    #[error("connection '{0}' is not connected")]
    NotConnected(ConnectionId),
}

/// 永続化デリゲートの失敗
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PersistenceError {
    #[error("persistence failed: {0}")]
    Failed(String),
}

/// メッセージ送信（通知）のエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessagePushError {
    #[error("connection '{0}' has no registered channel")]
    ConnectionNotFound(ConnectionId),

    #[error("failed to push to connection: {0}")]
    PushFailed(String),
}
