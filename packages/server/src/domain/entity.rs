//! Entity 定義
//!
//! - `Connection`: 1 つのトランスポートセッション（Registry が所有する）
//! - `PresenceChange`: ユーザー単位のオンライン／オフライン遷移
//! - `Envelope`: 配送中のメッセージ（永続化レコードとは別物）

use std::time::Instant;

use serde::Serialize;

use super::value_object::{
    ClientMessageId, ConnectionId, DeliveryId, MessageContent, RecordId, Timestamp, UserId,
};

/// 接続の状態
///
/// `Connecting → Authenticated → Active → Closing → Closed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectionState {
    Connecting,
    Authenticated,
    Active,
    Closing,
    Closed,
}

impl ConnectionState {
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Connecting, Authenticated)
                | (Connecting, Closed)
                | (Authenticated, Active)
                | (Authenticated, Closing)
                | (Active, Closing)
                | (Closing, Closed)
        )
    }
}

/// 接続エンティティ
#[derive(Debug, Clone)]
pub struct Connection {
    pub id: ConnectionId,
    /// 認証成功後にのみ設定される
    pub user_id: Option<UserId>,
    pub state: ConnectionState,
    pub connected_at: Timestamp,
    pub last_heartbeat_at: Instant,
}

impl Connection {
    /// ハンドシェイク直後（未認証）の接続を作成
    pub fn connecting(id: ConnectionId, connected_at: Timestamp, now: Instant) -> Self {
        Self {
            id,
            user_id: None,
            state: ConnectionState::Connecting,
            connected_at,
            last_heartbeat_at: now,
        }
    }

    /// 認証済みとしてユーザーを紐づける
    pub fn authenticate(&mut self, user_id: UserId) {
        self.transition_to(ConnectionState::Authenticated);
        self.user_id = Some(user_id);
    }

    /// 状態遷移
    ///
    /// # Panics
    ///
    /// 許可されていない遷移はプログラムのバグなので panic する。
    pub fn transition_to(&mut self, next: ConnectionState) {
        assert!(
            self.state.can_transition_to(next),
            "illegal connection state transition {:?} -> {:?} for {}",
            self.state,
            next,
            self.id
        );
        self.state = next;
    }

    pub fn is_active(&self) -> bool {
        self.state == ConnectionState::Active
    }

    /// 認証済みユーザー
    ///
    /// # Panics
    ///
    /// 未認証（CONNECTING）の接続で呼んだ場合。Registry に登録済みの接続では起きない。
    pub fn owner(&self) -> &UserId {
        self.user_id
            .as_ref()
            .expect("registered connection always has an owner")
    }
}

/// ユーザー単位のプレゼンス遷移
///
/// `version` はユーザーごとに遷移のたびに 1 ずつ増える。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresenceChange {
    pub user_id: UserId,
    pub online: bool,
    pub version: u64,
}

/// ロスターの 1 エントリ（スナップショット用）
pub type PresenceEntry = PresenceChange;

/// 配送中のメッセージ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub client_message_id: ClientMessageId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub content: MessageContent,
}

/// 永続化デリゲートが返すレコード情報
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedRecord {
    pub record_id: RecordId,
    pub created_at: Timestamp,
}

/// 永続化済みメッセージ（履歴取得用）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredMessage {
    pub record_id: RecordId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub content: MessageContent,
    pub created_at: Timestamp,
}

/// 配送結果の種別
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    /// 受信者の接続に 1 つ以上 push した
    Delivered,
    /// 受信者がオフライン（保存済み、次回接続時に履歴で取得される）
    StoredOffline,
    /// 冪等キーが処理済みだった（情報として返すだけで、エラーではない）
    DuplicateSuppressed,
}

/// `send` の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryResult {
    pub client_message_id: ClientMessageId,
    pub delivery_id: DeliveryId,
    pub record_id: RecordId,
    pub created_at: Timestamp,
    pub status: DeliveryStatus,
}

/// ユーザーディレクトリのプロフィール
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserProfile {
    pub user_id: UserId,
    pub display_name: String,
    pub avatar_ref: Option<String>,
}
