//! UseCase 層のエラー定義

use std::time::Duration;

use thiserror::Error;

use crate::domain::{AuthError, ValueObjectError};

/// 接続（認証＋登録）のエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectError {
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),
}

/// メッセージ送信のエラー
///
/// どの場合も永続化は成立しておらず、ファンアウトも冪等キーの記録も行われていない。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendMessageError {
    #[error("invalid envelope: {0}")]
    InvalidEnvelope(#[from] ValueObjectError),

    #[error("persistence failed: {0}")]
    PersistenceFailed(String),

    #[error("persistence did not complete within {0:?}")]
    PersistenceTimeout(Duration),
}

/// 履歴取得のエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchHistoryError {
    #[error("invalid peer id: {0}")]
    InvalidPeer(#[from] ValueObjectError),

    #[error("history unavailable: {0}")]
    Unavailable(String),
}
