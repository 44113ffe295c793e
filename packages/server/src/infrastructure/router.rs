//! インメモリ Room Router 実装
//!
//! ルーム表全体を 1 つの `Mutex` で保護する。小規模向けのスケーラビリティ上限で、
//! ルーム操作はこのロックで直列化される。
//!
//! join は Router のロックを保持したまま接続の生存を確認する。切断側は
//! Registry から削除した後にこのロックを取って `remove_connection` するので、
//! 切断と競合した join がメンバーシップを取り残すことはない。

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{ConnectionId, ConnectionRegistry, RoomError, RoomId, RoomRouter, RoomTable};

pub struct InMemoryRoomRouter {
    table: Mutex<RoomTable>,
    registry: Arc<dyn ConnectionRegistry>,
}

impl InMemoryRoomRouter {
    pub fn new(registry: Arc<dyn ConnectionRegistry>) -> Self {
        Self {
            table: Mutex::new(RoomTable::new()),
            registry,
        }
    }

    pub async fn room_count(&self) -> usize {
        self.table.lock().await.room_count()
    }
}

#[async_trait]
impl RoomRouter for InMemoryRoomRouter {
    async fn join(&self, connection_id: ConnectionId, room_id: RoomId) -> Result<(), RoomError> {
        let mut table = self.table.lock().await;
        if !self.registry.is_live(&connection_id).await {
            return Err(RoomError::NotConnected(connection_id));
        }
        if table.join(connection_id, room_id.clone()) {
            tracing::debug!("Connection {} joined room '{}'", connection_id, room_id);
        }
        Ok(())
    }

    async fn leave(&self, connection_id: &ConnectionId, room_id: &RoomId) {
        let mut table = self.table.lock().await;
        if table.leave(connection_id, room_id) {
            tracing::debug!("Connection {} left room '{}'", connection_id, room_id);
        }
    }

    async fn members_of(&self, room_id: &RoomId) -> Vec<ConnectionId> {
        self.table
            .lock()
            .await
            .members_of(room_id)
            .into_iter()
            .collect()
    }

    async fn remove_connection(&self, connection_id: &ConnectionId) -> Vec<RoomId> {
        self.table.lock().await.remove_connection(connection_id)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use tokio::sync::mpsc;

    use super::*;
    use crate::{
        domain::{Connection, ConnectionIdFactory, Timestamp, UserId},
        infrastructure::registry::ShardedConnectionRegistry,
    };

    async fn setup() -> (InMemoryRoomRouter, Arc<ShardedConnectionRegistry>, ConnectionId) {
        let (tx, _rx) = mpsc::unbounded_channel();
        let registry = Arc::new(ShardedConnectionRegistry::new(2, tx));
        let mut connection = Connection::connecting(
            ConnectionIdFactory::generate(),
            Timestamp::new(1000),
            Instant::now(),
        );
        connection.authenticate(UserId::new("alice".to_string()).unwrap());
        let id = connection.id;
        registry.commit(connection).await;
        (InMemoryRoomRouter::new(registry.clone()), registry, id)
    }

    fn room(id: &str) -> RoomId {
        RoomId::new(id.to_string()).unwrap()
    }

    #[tokio::test]
    async fn test_join_with_dead_connection_fails() {
        // テスト項目: 生存していない接続での join は NotConnected になる
        // given (前提条件):
        let (router, _registry, _id) = setup().await;
        let dead = ConnectionIdFactory::generate();

        // when (操作):
        let result = router.join(dead, room("r1")).await;

        // then (期待する結果):
        assert_eq!(result, Err(RoomError::NotConnected(dead)));
        assert_eq!(router.room_count().await, 0);
    }

    #[tokio::test]
    async fn test_leave_twice_is_idempotent() {
        // テスト項目: 2 回の leave がどちらも成功し、空のルームは削除される
        // given (前提条件):
        let (router, _registry, id) = setup().await;
        router.join(id, room("r1")).await.unwrap();

        // when (操作):
        router.leave(&id, &room("r1")).await;
        router.leave(&id, &room("r1")).await;

        // then (期待する結果):
        assert!(router.members_of(&room("r1")).await.is_empty());
        assert_eq!(router.room_count().await, 0);
    }

    #[tokio::test]
    async fn test_join_after_deregistration_is_rejected() {
        // テスト項目: Registry から削除された接続は join できず、メンバーシップが残らない
        // given (前提条件):
        let (router, registry, id) = setup().await;
        router.join(id, room("r1")).await.unwrap();
        registry.deregister(&id).await;
        router.remove_connection(&id).await;

        // when (操作):
        let result = router.join(id, room("r2")).await;

        // then (期待する結果):
        assert_eq!(result, Err(RoomError::NotConnected(id)));
        assert!(router.members_of(&room("r1")).await.is_empty());
        assert_eq!(router.room_count().await, 0);
    }
}
