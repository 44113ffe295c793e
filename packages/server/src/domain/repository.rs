//! Repository trait 定義
//!
//! ドメイン層が必要とする状態ストアと外部コラボレーターのインターフェースを定義します。
//! 具体的な実装は Infrastructure 層が提供します（依存性の逆転）。

use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::{
    ClientMessageId, Connection, ConnectionId, DeliveryResult, MessageContent, PersistedRecord,
    PersistenceError, PresenceChange, PresenceEntry, RegistryError, RoomError, RoomId,
    StoredMessage, UserId, UserProfile,
};

/// Connection Registry
///
/// connectionId → Connection と userId → connectionId 集合の正本。
/// オンライン／オフラインが反転する登録・削除は、ちょうど 1 つの `PresenceChange` を生む。
#[async_trait]
pub trait ConnectionRegistry: Send + Sync {
    /// 認証済みの接続をコミットする（ユーザーの最初の接続ならオンライン遷移を返す）
    async fn commit(&self, connection: Connection) -> Option<PresenceChange>;

    /// AUTHENTICATED → ACTIVE
    async fn activate(&self, id: &ConnectionId) -> Result<(), RegistryError>;

    /// 最終ハートビート時刻を更新
    async fn heartbeat(&self, id: &ConnectionId, now: Instant) -> Result<(), RegistryError>;

    /// 接続を削除（最後の接続ならオフライン遷移を返す）。未登録の ID は None
    async fn deregister(&self, id: &ConnectionId) -> Option<PresenceChange>;

    async fn is_live(&self, id: &ConnectionId) -> bool;

    async fn user_of(&self, id: &ConnectionId) -> Option<UserId>;

    async fn connections_of(&self, user_id: &UserId) -> Vec<ConnectionId>;

    /// ACTIVE 状態の全接続
    async fn active_connections(&self) -> Vec<ConnectionId>;

    /// `timeout` より長く沈黙している接続
    async fn expired(&self, now: Instant, timeout: Duration) -> Vec<ConnectionId>;

    /// 全ユーザーのプレゼンス（user_id 順）
    async fn snapshot(&self) -> Vec<PresenceEntry>;
}

/// Room Router
///
/// ルームは接続 ID の参照だけを持つ（所有しない）。
#[async_trait]
pub trait RoomRouter: Send + Sync {
    async fn join(&self, connection_id: ConnectionId, room_id: RoomId) -> Result<(), RoomError>;

    /// 冪等。参加していないルームからの退出も成功する
    async fn leave(&self, connection_id: &ConnectionId, room_id: &RoomId);

    async fn members_of(&self, room_id: &RoomId) -> Vec<ConnectionId>;

    /// 切断時に全ルームから外す。外したルームを返す
    async fn remove_connection(&self, connection_id: &ConnectionId) -> Vec<RoomId>;
}

/// 永続化デリゲート（外部コラボレーター）
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// メッセージを保存し、レコード ID と作成時刻を払い出す
    async fn persist(
        &self,
        sender_id: &UserId,
        receiver_id: &UserId,
        content: &MessageContent,
    ) -> Result<PersistedRecord, PersistenceError>;

    /// 2 人の間のメッセージを保存順に返す
    async fn history(
        &self,
        user_a: &UserId,
        user_b: &UserId,
    ) -> Result<Vec<StoredMessage>, PersistenceError>;
}

/// ユーザーディレクトリ（外部コラボレーター、初期表示用）
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn list_other_users(&self, excluding: &UserId) -> Vec<UserProfile>;
}

/// 冪等キー `(送信者, clientMessageId)` と配送結果の対応を、保持期間つきで覚えておくストア
///
/// 同期 API。送信パイプラインは永続化の完了後、待機を挟まずに記録する。
pub trait IdempotencyStore: Send + Sync {
    fn lookup(
        &self,
        sender_id: &UserId,
        client_message_id: &ClientMessageId,
        now: Instant,
    ) -> Option<DeliveryResult>;

    fn record(&self, sender_id: &UserId, result: &DeliveryResult, now: Instant);
}
