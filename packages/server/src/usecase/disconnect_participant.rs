//! UseCase: 接続の切断処理
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - DisconnectParticipantUseCase::execute() メソッド
//! - Registry からの削除、ルームからの除去、Pusher の登録解除
//!
//! ### なぜこのテストが必要か
//! - 切断後にルームのメンバーシップが残るとメッセージが宛先のない接続へ流れる
//! - ハートビートの掃除とソケットの終了処理の両方から呼ばれるため、冪等でなければならない
//!
//! ### どのような状況を想定しているか
//! - 正常系：最後の接続の切断（オフライン遷移）、複数タブのうち 1 つの切断
//! - エッジケース：同じ接続を 2 回切断

use std::sync::Arc;

use crate::domain::{ConnectionId, ConnectionRegistry, MessagePusher, PresenceChange, RoomRouter};

/// 接続切断のユースケース
pub struct DisconnectParticipantUseCase {
    registry: Arc<dyn ConnectionRegistry>,
    router: Arc<dyn RoomRouter>,
    message_pusher: Arc<dyn MessagePusher>,
}

impl DisconnectParticipantUseCase {
    pub fn new(
        registry: Arc<dyn ConnectionRegistry>,
        router: Arc<dyn RoomRouter>,
        message_pusher: Arc<dyn MessagePusher>,
    ) -> Self {
        Self {
            registry,
            router,
            message_pusher,
        }
    }

    /// 切断を実行
    ///
    /// Registry から先に削除するので、この後に届く join は NotConnected になる。
    /// オフライン遷移は Registry が presence feed に積むため、ここでは配信しない。
    ///
    /// # Returns
    ///
    /// ユーザーの最後の接続だった場合はオフライン遷移
    pub async fn execute(&self, connection_id: &ConnectionId) -> Option<PresenceChange> {
        let change = self.registry.deregister(connection_id).await;
        let rooms = self.router.remove_connection(connection_id).await;
        self.message_pusher.unregister_client(connection_id).await;

        if !rooms.is_empty() {
            tracing::debug!(
                "Connection {} removed from {} room(s)",
                connection_id,
                rooms.len()
            );
        }
        if let Some(change) = &change {
            tracing::info!("User '{}' went offline", change.user_id);
        }
        change
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;
    use crate::{
        domain::{Connection, ConnectionIdFactory, RoomId, Timestamp, UserId},
        infrastructure::{InMemoryRoomRouter, ShardedConnectionRegistry, WebSocketMessagePusher},
    };
    use tokio::sync::mpsc;

    struct Fixture {
        usecase: DisconnectParticipantUseCase,
        registry: Arc<ShardedConnectionRegistry>,
        router: Arc<InMemoryRoomRouter>,
        pusher: Arc<WebSocketMessagePusher>,
    }

    fn setup() -> Fixture {
        let (tx, _feed) = mpsc::unbounded_channel();
        let registry = Arc::new(ShardedConnectionRegistry::new(4, tx));
        let router = Arc::new(InMemoryRoomRouter::new(registry.clone()));
        let pusher = Arc::new(WebSocketMessagePusher::default());
        let usecase =
            DisconnectParticipantUseCase::new(registry.clone(), router.clone(), pusher.clone());
        Fixture {
            usecase,
            registry,
            router,
            pusher,
        }
    }

    async fn connect(fixture: &Fixture, user: &str) -> ConnectionId {
        let id = ConnectionIdFactory::generate();
        let mut connection = Connection::connecting(id, Timestamp::new(0), Instant::now());
        connection.authenticate(UserId::new(user.to_string()).unwrap());
        let (tx, _rx) = mpsc::unbounded_channel();
        fixture.pusher.register_client(id, tx).await;
        fixture.registry.commit(connection).await;
        id
    }

    #[tokio::test]
    async fn test_execute_removes_connection_everywhere() {
        // テスト項目: 切断で Registry・ルーム・Pusher のすべてから接続が消える
        // given (前提条件):
        let fixture = setup();
        let id = connect(&fixture, "alice").await;
        let room = RoomId::new("dm:alice:bob".to_string()).unwrap();
        fixture.router.join(id, room.clone()).await.unwrap();

        // when (操作):
        let change = fixture.usecase.execute(&id).await;

        // then (期待する結果):
        let change = change.expect("last connection should flip presence");
        assert!(!change.online);
        assert!(!fixture.registry.is_live(&id).await);
        assert!(fixture.router.members_of(&room).await.is_empty());
        assert_eq!(fixture.router.room_count().await, 0);
        assert_eq!(fixture.pusher.client_count().await, 0);
    }

    #[tokio::test]
    async fn test_execute_keeps_user_online_with_other_tab() {
        // テスト項目: 他のタブが残っていればオフライン遷移は発生しない
        // given (前提条件):
        let fixture = setup();
        let first = connect(&fixture, "alice").await;
        let _second = connect(&fixture, "alice").await;

        // when (操作):
        let change = fixture.usecase.execute(&first).await;

        // then (期待する結果):
        assert_eq!(change, None);
        let alice = UserId::new("alice".to_string()).unwrap();
        assert_eq!(fixture.registry.connections_of(&alice).await.len(), 1);
    }

    #[tokio::test]
    async fn test_execute_twice_is_idempotent() {
        // テスト項目: 同じ接続を 2 回切断しても 2 回目は何も起きない
        // given (前提条件):
        let fixture = setup();
        let id = connect(&fixture, "alice").await;
        fixture.usecase.execute(&id).await;

        // when (操作):
        let second = fixture.usecase.execute(&id).await;

        // then (期待する結果):
        assert_eq!(second, None);
    }
}
