//! UseCase: ルームへの参加・退出と、ルーム単位の中継（入力中表示）
//!
//! メッセージ配送はルームのメンバーシップに依存しない（Registry から宛先を引く）。
//! ルームは入力中表示のような、その会話を開いている接続だけに届けたい通知に使う。

use std::sync::Arc;

use tayori_shared::protocol::ServerFrame;

use crate::domain::{
    ConnectionId, ConnectionRegistry, MessagePusher, RoomError, RoomId, RoomRouter,
};

pub struct RoomUseCase {
    router: Arc<dyn RoomRouter>,
    registry: Arc<dyn ConnectionRegistry>,
    message_pusher: Arc<dyn MessagePusher>,
}

impl RoomUseCase {
    pub fn new(
        router: Arc<dyn RoomRouter>,
        registry: Arc<dyn ConnectionRegistry>,
        message_pusher: Arc<dyn MessagePusher>,
    ) -> Self {
        Self {
            router,
            registry,
            message_pusher,
        }
    }

    pub async fn join(
        &self,
        connection_id: ConnectionId,
        room_id: RoomId,
    ) -> Result<(), RoomError> {
        self.router.join(connection_id, room_id).await
    }

    /// 何度呼んでもよい
    pub async fn leave(&self, connection_id: &ConnectionId, room_id: &RoomId) {
        self.router.leave(connection_id, room_id).await;
    }

    pub async fn members_of(&self, room_id: &RoomId) -> Vec<ConnectionId> {
        self.router.members_of(room_id).await
    }

    /// 入力中表示をルームの他のメンバーへ中継し、届いた接続数を返す
    ///
    /// 送信元がルームのメンバーでなければ何もしない。
    pub async fn relay_typing(&self, connection_id: &ConnectionId, room_id: &RoomId) -> usize {
        let members = self.router.members_of(room_id).await;
        if !members.contains(connection_id) {
            tracing::debug!(
                "Connection {} is not in room '{}', typing ignored",
                connection_id,
                room_id
            );
            return 0;
        }
        let Some(user_id) = self.registry.user_of(connection_id).await else {
            return 0;
        };

        let targets: Vec<ConnectionId> = members
            .into_iter()
            .filter(|member| member != connection_id)
            .collect();
        let frame = ServerFrame::Typing {
            room_id: room_id.as_str().to_string(),
            user_id: user_id.into_string(),
        };
        self.message_pusher.broadcast(&targets, &frame).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;
    use crate::{
        domain::{Connection, ConnectionIdFactory, Outbound, Timestamp, UserId},
        infrastructure::{InMemoryRoomRouter, ShardedConnectionRegistry, WebSocketMessagePusher},
    };
    use tokio::sync::mpsc;

    struct Fixture {
        usecase: RoomUseCase,
        registry: Arc<ShardedConnectionRegistry>,
        pusher: Arc<WebSocketMessagePusher>,
    }

    fn setup() -> Fixture {
        let (tx, _feed) = mpsc::unbounded_channel();
        let registry = Arc::new(ShardedConnectionRegistry::new(4, tx));
        let router = Arc::new(InMemoryRoomRouter::new(registry.clone()));
        let pusher = Arc::new(WebSocketMessagePusher::default());
        let usecase = RoomUseCase::new(router, registry.clone(), pusher.clone());
        Fixture {
            usecase,
            registry,
            pusher,
        }
    }

    async fn connect(
        fixture: &Fixture,
        user: &str,
    ) -> (ConnectionId, mpsc::UnboundedReceiver<Outbound>) {
        let id = ConnectionIdFactory::generate();
        let mut connection = Connection::connecting(id, Timestamp::new(0), Instant::now());
        connection.authenticate(UserId::new(user.to_string()).unwrap());
        let (tx, rx) = mpsc::unbounded_channel();
        fixture.pusher.register_client(id, tx).await;
        fixture.registry.commit(connection).await;
        (id, rx)
    }

    fn dm_room() -> RoomId {
        RoomId::new("dm:alice:bob".to_string()).unwrap()
    }

    #[tokio::test]
    async fn test_join_with_dead_connection_is_not_connected() {
        // テスト項目: 登録されていない接続の join は NotConnected
        // given (前提条件):
        let fixture = setup();
        let id = ConnectionIdFactory::generate();

        // when (操作):
        let result = fixture.usecase.join(id, dm_room()).await;

        // then (期待する結果):
        assert_eq!(result, Err(RoomError::NotConnected(id)));
    }

    #[tokio::test]
    async fn test_leave_twice_is_idempotent() {
        // テスト項目: 2 回 leave しても状態は 1 回目と同じ
        // given (前提条件):
        let fixture = setup();
        let (id, _rx) = connect(&fixture, "alice").await;
        fixture.usecase.join(id, dm_room()).await.unwrap();

        // when (操作):
        fixture.usecase.leave(&id, &dm_room()).await;
        fixture.usecase.leave(&id, &dm_room()).await;

        // then (期待する結果):
        assert!(fixture.usecase.members_of(&dm_room()).await.is_empty());
    }

    #[tokio::test]
    async fn test_relay_typing_reaches_other_members_only() {
        // テスト項目: 入力中表示は送信元以外のメンバーにだけ届く
        // given (前提条件):
        let fixture = setup();
        let (alice, mut alice_rx) = connect(&fixture, "alice").await;
        let (bob, mut bob_rx) = connect(&fixture, "bob").await;
        let (_carol, mut carol_rx) = connect(&fixture, "carol").await;
        fixture.usecase.join(alice, dm_room()).await.unwrap();
        fixture.usecase.join(bob, dm_room()).await.unwrap();

        // when (操作):
        let delivered = fixture.usecase.relay_typing(&alice, &dm_room()).await;

        // then (期待する結果):
        assert_eq!(delivered, 1);
        assert_eq!(
            bob_rx.try_recv().unwrap(),
            Outbound::Frame(ServerFrame::Typing {
                room_id: "dm:alice:bob".to_string(),
                user_id: "alice".to_string(),
            })
        );
        assert!(alice_rx.try_recv().is_err());
        assert!(carol_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_relay_typing_from_non_member_is_ignored() {
        // テスト項目: ルームに参加していない接続からの入力中表示は中継されない
        // given (前提条件):
        let fixture = setup();
        let (alice, _alice_rx) = connect(&fixture, "alice").await;
        let (bob, mut bob_rx) = connect(&fixture, "bob").await;
        fixture.usecase.join(bob, dm_room()).await.unwrap();

        // when (操作):
        let delivered = fixture.usecase.relay_typing(&alice, &dm_room()).await;

        // then (期待する結果):
        assert_eq!(delivered, 0);
        assert!(bob_rx.try_recv().is_err());
    }
}
