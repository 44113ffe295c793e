//! シャード化された Connection Registry
//!
//! ユーザー ID のハッシュでシャードを選び、シャードごとに `Mutex` で保護します。
//! 接続 ID からユーザーを引く索引は `DashMap` で持ちます。
//!
//! プレゼンス遷移はシャードのロックを保持したまま presence feed に積むため、
//! 同じユーザーの遷移は Registry で起きた順に feed に並びます。

use std::{
    hash::{DefaultHasher, Hash, Hasher},
    time::{Duration, Instant},
};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{Mutex, mpsc};

use crate::domain::{
    Connection, ConnectionId, ConnectionRegistry, PresenceChange, PresenceEntry, RegistryError,
    RegistryShard, UserId,
};

pub const DEFAULT_SHARD_COUNT: usize = 16;

/// プレゼンス遷移を順序どおりに Presence Broadcaster へ渡すチャンネル
pub type PresenceFeed = mpsc::UnboundedSender<PresenceChange>;

pub struct ShardedConnectionRegistry {
    shards: Vec<Mutex<RegistryShard>>,
    index: DashMap<ConnectionId, UserId>,
    presence_feed: PresenceFeed,
}

impl ShardedConnectionRegistry {
    /// # Panics
    ///
    /// `shard_count` が 0 の場合
    pub fn new(shard_count: usize, presence_feed: PresenceFeed) -> Self {
        assert!(shard_count > 0, "registry needs at least one shard");
        Self {
            shards: (0..shard_count)
                .map(|_| Mutex::new(RegistryShard::new()))
                .collect(),
            index: DashMap::new(),
            presence_feed,
        }
    }

    fn shard_for(&self, user_id: &UserId) -> &Mutex<RegistryShard> {
        let mut hasher = DefaultHasher::new();
        user_id.hash(&mut hasher);
        let slot = (hasher.finish() % self.shards.len() as u64) as usize;
        &self.shards[slot]
    }

    fn owner_of(&self, id: &ConnectionId) -> Option<UserId> {
        self.index.get(id).map(|entry| entry.value().clone())
    }

    fn publish(&self, change: &PresenceChange) {
        if self.presence_feed.send(change.clone()).is_err() {
            tracing::debug!(
                "Presence feed closed, dropping change for '{}'",
                change.user_id
            );
        }
    }
}

#[async_trait]
impl ConnectionRegistry for ShardedConnectionRegistry {
    async fn commit(&self, connection: Connection) -> Option<PresenceChange> {
        let id = connection.id;
        let user_id = connection.owner().clone();

        let mut shard = self.shard_for(&user_id).lock().await;
        let change = shard.insert(connection);
        self.index.insert(id, user_id.clone());
        if let Some(change) = &change {
            self.publish(change);
        }
        drop(shard);

        tracing::debug!("Connection {} committed for user '{}'", id, user_id);
        change
    }

    async fn activate(&self, id: &ConnectionId) -> Result<(), RegistryError> {
        let user_id = self.owner_of(id).ok_or(RegistryError::NotFound(*id))?;
        let mut shard = self.shard_for(&user_id).lock().await;
        if shard.activate(id) {
            Ok(())
        } else {
            Err(RegistryError::NotFound(*id))
        }
    }

    async fn heartbeat(&self, id: &ConnectionId, now: Instant) -> Result<(), RegistryError> {
        let user_id = self.owner_of(id).ok_or(RegistryError::NotFound(*id))?;
        let mut shard = self.shard_for(&user_id).lock().await;
        if shard.touch(id, now) {
            Ok(())
        } else {
            Err(RegistryError::NotFound(*id))
        }
    }

    async fn deregister(&self, id: &ConnectionId) -> Option<PresenceChange> {
        let user_id = self.owner_of(id)?;

        let mut shard = self.shard_for(&user_id).lock().await;
        let (connection, change) = shard.remove(id)?;
        self.index.remove(id);
        if let Some(change) = &change {
            self.publish(change);
        }
        drop(shard);

        tracing::debug!(
            "Connection {} of user '{}' is now {:?}",
            id,
            user_id,
            connection.state
        );
        change
    }

    async fn is_live(&self, id: &ConnectionId) -> bool {
        match self.owner_of(id) {
            Some(user_id) => self.shard_for(&user_id).lock().await.contains(id),
            None => false,
        }
    }

    async fn user_of(&self, id: &ConnectionId) -> Option<UserId> {
        self.owner_of(id)
    }

    async fn connections_of(&self, user_id: &UserId) -> Vec<ConnectionId> {
        self.shard_for(user_id).lock().await.connections_of(user_id)
    }

    async fn active_connections(&self) -> Vec<ConnectionId> {
        let mut active = Vec::new();
        for shard in &self.shards {
            active.extend(shard.lock().await.active_ids());
        }
        active
    }

    async fn expired(&self, now: Instant, timeout: Duration) -> Vec<ConnectionId> {
        let mut expired = Vec::new();
        for shard in &self.shards {
            expired.extend(shard.lock().await.expired(now, timeout));
        }
        expired
    }

    async fn snapshot(&self) -> Vec<PresenceEntry> {
        let mut roster = Vec::new();
        for shard in &self.shards {
            roster.extend(shard.lock().await.roster());
        }
        roster.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        roster
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::domain::{ConnectionIdFactory, Timestamp};

    // ========================================
    // テスト作業記録
    // ========================================
    // 【何をテストするか】
    // - コミット・削除とプレゼンス遷移の対応
    // - 同一ユーザーへの並行登録でも遷移が 1 回だけ発生すること
    // - presence feed に積まれる順序
    // ========================================

    fn create_registry() -> (
        Arc<ShardedConnectionRegistry>,
        mpsc::UnboundedReceiver<PresenceChange>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(ShardedConnectionRegistry::new(4, tx)), rx)
    }

    fn authenticated(user: &str) -> Connection {
        let mut connection = Connection::connecting(
            ConnectionIdFactory::generate(),
            Timestamp::new(1000),
            Instant::now(),
        );
        connection.authenticate(UserId::new(user.to_string()).unwrap());
        connection
    }

    #[tokio::test]
    async fn test_commit_and_deregister_publish_presence() {
        // テスト項目: 登録と削除でオンライン／オフライン遷移が feed に順番どおり積まれる
        // given (前提条件):
        let (registry, mut feed) = create_registry();
        let connection = authenticated("alice");
        let id = connection.id;

        // when (操作):
        let online = registry.commit(connection).await;
        let offline = registry.deregister(&id).await;

        // then (期待する結果):
        assert!(online.unwrap().online);
        assert!(!offline.unwrap().online);
        assert_eq!(feed.recv().await.unwrap().version, 1);
        assert_eq!(feed.recv().await.unwrap().version, 2);
        assert!(!registry.is_live(&id).await);
    }

    #[tokio::test]
    async fn test_concurrent_commits_for_same_user_emit_single_change() {
        // テスト項目: 同一ユーザーの接続を並行登録してもオンライン遷移は 1 回だけ
        // given (前提条件):
        let (registry, mut feed) = create_registry();

        // when (操作):
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.commit(authenticated("alice")).await })
            })
            .collect();
        let mut changes = 0;
        for handle in handles {
            if handle.await.unwrap().is_some() {
                changes += 1;
            }
        }
        drop(registry);

        // then (期待する結果):
        assert_eq!(changes, 1);
        assert!(feed.recv().await.unwrap().online);
        assert!(feed.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_deregister_unknown_connection_is_noop() {
        // テスト項目: 未登録の接続を削除しても遷移は発生しない
        // given (前提条件):
        let (registry, mut feed) = create_registry();

        // when (操作):
        let change = registry.deregister(&ConnectionIdFactory::generate()).await;

        // then (期待する結果):
        assert!(change.is_none());
        assert!(feed.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_heartbeat_unknown_connection_is_not_found() {
        // テスト項目: 未登録の接続へのハートビートは NotFound
        // given (前提条件):
        let (registry, _feed) = create_registry();
        let id = ConnectionIdFactory::generate();

        // when (操作):
        let result = registry.heartbeat(&id, Instant::now()).await;

        // then (期待する結果):
        assert_eq!(result, Err(RegistryError::NotFound(id)));
    }

    #[tokio::test]
    async fn test_snapshot_spans_all_shards_sorted_by_user() {
        // テスト項目: スナップショットが全シャードのユーザーを user_id 順に含む
        // given (前提条件):
        let (registry, _feed) = create_registry();
        for user in ["dave", "alice", "carol", "bob"] {
            registry.commit(authenticated(user)).await;
        }

        // when (操作):
        let snapshot = registry.snapshot().await;

        // then (期待する結果):
        let users: Vec<&str> = snapshot.iter().map(|e| e.user_id.as_str()).collect();
        assert_eq!(users, vec!["alice", "bob", "carol", "dave"]);
        assert!(snapshot.iter().all(|e| e.online));
    }

    #[tokio::test]
    async fn test_only_activated_connections_are_active() {
        // テスト項目: activate した接続だけが ACTIVE 一覧に含まれる
        // given (前提条件):
        let (registry, _feed) = create_registry();
        let a = authenticated("alice");
        let b = authenticated("bob");
        let a_id = a.id;
        registry.commit(a).await;
        registry.commit(b).await;

        // when (操作):
        registry.activate(&a_id).await.unwrap();

        // then (期待する結果):
        assert_eq!(registry.active_connections().await, vec![a_id]);
    }
}
