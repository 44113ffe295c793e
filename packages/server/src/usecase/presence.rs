//! UseCase: プレゼンス配信
//!
//! Registry が presence feed に積んだ遷移を 1 つのタスクで順に取り出し、
//! ACTIVE な全接続へ `roster-delta` として配ります。
//! 取り出し手が 1 つなので、同じユーザーの遷移は Registry で起きた順に届きます。

use std::sync::Arc;

use tayori_shared::protocol::ServerFrame;
use tokio::{sync::mpsc, task::JoinHandle};

use crate::domain::{
    ConnectionId, ConnectionRegistry, MessagePushError, MessagePusher, PresenceChange,
    PresenceEntry,
};

pub struct PresenceBroadcaster {
    registry: Arc<dyn ConnectionRegistry>,
    message_pusher: Arc<dyn MessagePusher>,
}

impl PresenceBroadcaster {
    pub fn new(
        registry: Arc<dyn ConnectionRegistry>,
        message_pusher: Arc<dyn MessagePusher>,
    ) -> Self {
        Self {
            registry,
            message_pusher,
        }
    }

    /// 現在のロスター（一度でも接続したユーザーの online / version）
    pub async fn snapshot(&self) -> Vec<PresenceEntry> {
        self.registry.snapshot().await
    }

    pub async fn active_connection_count(&self) -> usize {
        self.registry.active_connections().await.len()
    }

    /// 1 つの接続へロスターのスナップショットを送る
    pub async fn push_snapshot(
        &self,
        connection_id: &ConnectionId,
    ) -> Result<(), MessagePushError> {
        let entries = self.snapshot().await;
        let frame = ServerFrame::RosterSnapshot {
            entries: entries.into_iter().map(Into::into).collect(),
        };
        self.message_pusher.push_to(connection_id, &frame).await
    }

    /// 遷移を ACTIVE な全接続へ配り、届いた接続数を返す
    pub async fn on_presence_change(&self, change: PresenceChange) -> usize {
        let targets = self.registry.active_connections().await;
        let user_id = change.user_id.clone();
        let online = change.online;
        let frame = ServerFrame::RosterDelta {
            entry: change.into(),
        };
        let delivered = self.message_pusher.broadcast(&targets, &frame).await;

        tracing::info!(
            "Presence of '{}' -> {} announced to {}/{} connections",
            user_id,
            if online { "online" } else { "offline" },
            delivered,
            targets.len()
        );
        delivered
    }

    /// presence feed を最後まで取り出し続けるタスクを起動する
    ///
    /// feed の送信側（Registry）がすべて drop されるとタスクは終了する。
    pub fn spawn(
        self: Arc<Self>,
        mut feed: mpsc::UnboundedReceiver<PresenceChange>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(change) = feed.recv().await {
                self.on_presence_change(change).await;
            }
            tracing::debug!("Presence feed closed, broadcaster stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;
    use crate::{
        domain::{Connection, ConnectionIdFactory, Outbound, Timestamp, UserId},
        infrastructure::{ShardedConnectionRegistry, WebSocketMessagePusher},
    };
    use tayori_shared::protocol::RosterEntry;

    // ========================================
    // テスト作業記録
    // ========================================
    // 【何をテストするか】
    // - feed に積まれた遷移が ACTIVE な接続にだけ順番どおり届くこと
    // - スナップショットが version 付きで送られること
    //
    // 【なぜテストが必要か】
    // - ロスターの正しさはイベントの順序に依存する
    // - 認証直後（AUTHENTICATED）の接続にはまだ差分を送ってはいけない

    struct Fixture {
        registry: Arc<ShardedConnectionRegistry>,
        pusher: Arc<WebSocketMessagePusher>,
        broadcaster: Arc<PresenceBroadcaster>,
        feed: mpsc::UnboundedReceiver<PresenceChange>,
    }

    fn setup() -> Fixture {
        let (tx, feed) = mpsc::unbounded_channel();
        let registry = Arc::new(ShardedConnectionRegistry::new(4, tx));
        let pusher = Arc::new(WebSocketMessagePusher::default());
        let broadcaster = Arc::new(PresenceBroadcaster::new(registry.clone(), pusher.clone()));
        Fixture {
            registry,
            pusher,
            broadcaster,
            feed,
        }
    }

    async fn connect(
        registry: &ShardedConnectionRegistry,
        pusher: &WebSocketMessagePusher,
        user: &str,
        activate: bool,
    ) -> (ConnectionId, mpsc::UnboundedReceiver<Outbound>) {
        let id = ConnectionIdFactory::generate();
        let mut connection = Connection::connecting(id, Timestamp::new(0), Instant::now());
        connection.authenticate(UserId::new(user.to_string()).unwrap());
        let (tx, rx) = mpsc::unbounded_channel();
        pusher.register_client(id, tx).await;
        registry.commit(connection).await;
        if activate {
            registry.activate(&id).await.unwrap();
        }
        (id, rx)
    }

    fn delta(outbound: Outbound) -> RosterEntry {
        match outbound {
            Outbound::Frame(ServerFrame::RosterDelta { entry }) => entry,
            other => panic!("expected roster-delta, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_on_presence_change_reaches_only_active_connections() {
        // テスト項目: 差分は ACTIVE な接続にだけ届く
        // given (前提条件):
        let mut fixture = setup();
        let (_active, mut active_rx) =
            connect(&fixture.registry, &fixture.pusher, "alice", true).await;
        let (_pending, mut pending_rx) =
            connect(&fixture.registry, &fixture.pusher, "bob", false).await;
        // alice と bob のオンライン遷移
        let first = fixture.feed.recv().await.unwrap();
        let second = fixture.feed.recv().await.unwrap();

        // when (操作):
        let delivered_first = fixture.broadcaster.on_presence_change(first).await;
        let delivered_second = fixture.broadcaster.on_presence_change(second).await;

        // then (期待する結果):
        assert_eq!(delivered_first, 1);
        assert_eq!(delivered_second, 1);
        assert_eq!(delta(active_rx.try_recv().unwrap()).user_id, "alice");
        assert_eq!(delta(active_rx.try_recv().unwrap()).user_id, "bob");
        assert!(pending_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_spawned_broadcaster_preserves_per_user_order() {
        // テスト項目: feed の順序どおりに online → offline → online が届く
        // given (前提条件):
        let Fixture {
            registry,
            pusher,
            broadcaster,
            feed,
        } = setup();
        let (_observer, mut observer_rx) = connect(&registry, &pusher, "observer", true).await;
        let handle = broadcaster.spawn(feed);

        // when (操作):
        let (first, _rx1) = connect(&registry, &pusher, "bob", false).await;
        registry.deregister(&first).await;
        let (_second, _rx2) = connect(&registry, &pusher, "bob", false).await;

        // then (期待する結果):
        let mut bob_entries = Vec::new();
        while bob_entries.len() < 3 {
            let entry = delta(observer_rx.recv().await.unwrap());
            if entry.user_id == "bob" {
                bob_entries.push((entry.online, entry.version));
            }
        }
        assert_eq!(bob_entries, vec![(true, 1), (false, 2), (true, 3)]);
        handle.abort();
    }

    #[tokio::test]
    async fn test_push_snapshot_sends_versioned_roster() {
        // テスト項目: スナップショットにオンラインのユーザーが version 付きで含まれる
        // given (前提条件):
        let fixture = setup();
        let (id, mut rx) = connect(&fixture.registry, &fixture.pusher, "alice", true).await;

        // when (操作):
        fixture.broadcaster.push_snapshot(&id).await.unwrap();

        // then (期待する結果):
        match rx.try_recv().unwrap() {
            Outbound::Frame(ServerFrame::RosterSnapshot { entries }) => {
                assert_eq!(
                    entries,
                    vec![RosterEntry {
                        user_id: "alice".to_string(),
                        online: true,
                        version: 1,
                    }]
                );
            }
            other => panic!("expected roster-snapshot, got {:?}", other),
        }
    }
}
