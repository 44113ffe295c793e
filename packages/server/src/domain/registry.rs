//! Connection Registry のシャード（純粋なデータ構造）
//!
//! 1 つのシャードは、そこにハッシュされたユーザーの接続をすべて保持します。
//! 並行制御は Infrastructure 層（`ShardedConnectionRegistry`）が担当し、
//! このモジュールはロックを持たない純粋なロジックだけを扱います。
//!
//! ユーザーごとのプレゼンス version は削除しないため、シャードの大きさは
//! これまでに接続したユーザー数で決まります。

use std::{
    collections::{HashMap, HashSet},
    time::{Duration, Instant},
};

use super::{
    entity::{Connection, ConnectionState, PresenceChange, PresenceEntry},
    value_object::{ConnectionId, UserId},
};

#[derive(Debug, Default)]
pub struct RegistryShard {
    connections: HashMap<ConnectionId, Connection>,
    by_user: HashMap<UserId, HashSet<ConnectionId>>,
    /// オフラインになった後も保持し、version の単調増加を保証する
    ///
    /// 一度でも接続したユーザーはプロセスが終わるまで消えず、`roster()` にも
    /// 載り続ける。メモリ使用量は既知ユーザー数に比例し、それが上限となる。
    versions: HashMap<UserId, u64>,
}

impl RegistryShard {
    pub fn new() -> Self {
        Self::default()
    }

    /// 認証済みの接続を登録する
    ///
    /// ユーザーの最初の接続であればオンライン遷移を返す。
    ///
    /// # Panics
    ///
    /// 同じ ID の接続が既に登録されている場合、または未認証の接続を渡した場合。
    pub fn insert(&mut self, connection: Connection) -> Option<PresenceChange> {
        assert!(
            !self.connections.contains_key(&connection.id),
            "connection {} is already registered",
            connection.id
        );
        assert_eq!(
            connection.state,
            ConnectionState::Authenticated,
            "only authenticated connections can be registered"
        );

        let user_id = connection.owner().clone();
        let user_connections = self.by_user.entry(user_id.clone()).or_default();
        let was_offline = user_connections.is_empty();
        user_connections.insert(connection.id);
        self.connections.insert(connection.id, connection);

        was_offline.then(|| self.flip(user_id, true))
    }

    /// 接続を削除する
    ///
    /// 削除した接続（CLOSED 状態）と、最後の接続だった場合はオフライン遷移を返す。
    pub fn remove(&mut self, id: &ConnectionId) -> Option<(Connection, Option<PresenceChange>)> {
        let mut connection = self.connections.remove(id)?;
        connection.transition_to(ConnectionState::Closing);

        let user_id = connection.owner().clone();
        let went_offline = match self.by_user.get_mut(&user_id) {
            Some(user_connections) => {
                user_connections.remove(id);
                user_connections.is_empty()
            }
            None => false,
        };
        if went_offline {
            self.by_user.remove(&user_id);
        }

        connection.transition_to(ConnectionState::Closed);
        let change = went_offline.then(|| self.flip(user_id, false));
        Some((connection, change))
    }

    fn flip(&mut self, user_id: UserId, online: bool) -> PresenceChange {
        let version = self.versions.entry(user_id.clone()).or_insert(0);
        *version += 1;
        PresenceChange {
            user_id,
            online,
            version: *version,
        }
    }

    /// AUTHENTICATED → ACTIVE
    pub fn activate(&mut self, id: &ConnectionId) -> bool {
        match self.connections.get_mut(id) {
            Some(connection) if connection.state == ConnectionState::Authenticated => {
                connection.transition_to(ConnectionState::Active);
                true
            }
            Some(connection) => connection.is_active(),
            None => false,
        }
    }

    /// 最終ハートビート時刻を更新する
    pub fn touch(&mut self, id: &ConnectionId, now: Instant) -> bool {
        match self.connections.get_mut(id) {
            Some(connection) => {
                connection.last_heartbeat_at = now;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: &ConnectionId) -> Option<&Connection> {
        self.connections.get(id)
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.connections.contains_key(id)
    }

    pub fn connections_of(&self, user_id: &UserId) -> Vec<ConnectionId> {
        self.by_user
            .get(user_id)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn active_ids(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.connections
            .values()
            .filter(|c| c.is_active())
            .map(|c| c.id)
    }

    /// `timeout` より長くハートビートがない接続
    pub fn expired(&self, now: Instant, timeout: Duration) -> Vec<ConnectionId> {
        self.connections
            .values()
            .filter(|c| now.saturating_duration_since(c.last_heartbeat_at) > timeout)
            .map(|c| c.id)
            .collect()
    }

    /// このシャードが知っている全ユーザーのプレゼンス
    pub fn roster(&self) -> impl Iterator<Item = PresenceEntry> + '_ {
        self.versions.iter().map(|(user_id, version)| PresenceEntry {
            user_id: user_id.clone(),
            online: self.by_user.contains_key(user_id),
            version: *version,
        })
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ConnectionIdFactory, Timestamp};

    fn authenticated(user: &str, now: Instant) -> Connection {
        let mut connection =
            Connection::connecting(ConnectionIdFactory::generate(), Timestamp::new(1000), now);
        connection.authenticate(UserId::new(user.to_string()).unwrap());
        connection
    }

    #[test]
    fn test_first_connection_flips_user_online() {
        // テスト項目: ユーザーの最初の接続でオンライン遷移が 1 回だけ発生する
        // given (前提条件):
        let mut shard = RegistryShard::new();
        let now = Instant::now();

        // when (操作):
        let first = shard.insert(authenticated("alice", now));
        let second = shard.insert(authenticated("alice", now));

        // then (期待する結果):
        let first = first.expect("first connection must flip presence");
        assert!(first.online);
        assert_eq!(first.version, 1);
        assert_eq!(second, None);
        assert_eq!(shard.len(), 2);
    }

    #[test]
    fn test_last_connection_removal_flips_user_offline() {
        // テスト項目: 最後の接続の削除でのみオフライン遷移が発生する（マルチタブ）
        // given (前提条件):
        let mut shard = RegistryShard::new();
        let now = Instant::now();
        let tab1 = authenticated("alice", now);
        let tab2 = authenticated("alice", now);
        let (id1, id2) = (tab1.id, tab2.id);
        shard.insert(tab1);
        shard.insert(tab2);

        // when (操作):
        let (_, after_first) = shard.remove(&id1).unwrap();
        let (removed, after_last) = shard.remove(&id2).unwrap();

        // then (期待する結果):
        assert_eq!(after_first, None);
        let change = after_last.expect("last connection must flip presence");
        assert!(!change.online);
        assert_eq!(change.version, 2);
        assert_eq!(removed.state, ConnectionState::Closed);
        assert!(shard.is_empty());
    }

    #[test]
    fn test_presence_events_equal_number_of_flips() {
        // テスト項目: register/deregister の任意の列で、イベント数がオンライン／オフラインの反転回数と一致する
        // given (前提条件):
        let mut shard = RegistryShard::new();
        let now = Instant::now();
        // true = register, false = deregister (the oldest live connection)
        let ops = [true, true, false, true, false, false, true, false, true, true];
        let mut live: Vec<ConnectionId> = Vec::new();
        let mut events = 0;
        let mut flips = 0;
        let mut online = false;

        // when (操作):
        for register in ops {
            let change = if register {
                let connection = authenticated("alice", now);
                live.push(connection.id);
                shard.insert(connection)
            } else {
                let id = live.remove(0);
                shard.remove(&id).and_then(|(_, change)| change)
            };
            if change.is_some() {
                events += 1;
            }
            let now_online = !live.is_empty();
            if now_online != online {
                flips += 1;
                online = now_online;
            }
        }

        // then (期待する結果):
        assert_eq!(events, flips);
    }

    #[test]
    fn test_remove_unknown_connection_returns_none() {
        // テスト項目: 存在しない接続の削除は何も起こさない
        // given (前提条件):
        let mut shard = RegistryShard::new();

        // when (操作):
        let result = shard.remove(&ConnectionIdFactory::generate());

        // then (期待する結果):
        assert!(result.is_none());
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn test_duplicate_connection_id_panics() {
        // テスト項目: 同じ接続 ID の二重登録はプログラムのバグとして panic する
        // given (前提条件):
        let mut shard = RegistryShard::new();
        let connection = authenticated("alice", Instant::now());

        // when (操作):
        shard.insert(connection.clone());
        shard.insert(connection);

        // then (期待する結果): panic
    }

    #[test]
    fn test_expired_returns_silent_connections() {
        // テスト項目: タイムアウトを超えてハートビートがない接続だけが期限切れとなる
        // given (前提条件):
        let mut shard = RegistryShard::new();
        let start = Instant::now();
        let silent = authenticated("alice", start);
        let chatty = authenticated("bob", start);
        let (silent_id, chatty_id) = (silent.id, chatty.id);
        shard.insert(silent);
        shard.insert(chatty);
        shard.touch(&chatty_id, start + Duration::from_secs(50));

        // when (操作):
        let expired = shard.expired(start + Duration::from_secs(61), Duration::from_secs(60));

        // then (期待する結果):
        assert_eq!(expired, vec![silent_id]);
    }

    #[test]
    fn test_roster_keeps_offline_users_with_versions() {
        // テスト項目: オフラインになったユーザーも version 付きでロスターに残る
        // given (前提条件):
        let mut shard = RegistryShard::new();
        let connection = authenticated("alice", Instant::now());
        let id = connection.id;
        shard.insert(connection);
        shard.remove(&id);

        // when (操作):
        let roster: Vec<PresenceEntry> = shard.roster().collect();

        // then (期待する結果):
        assert_eq!(roster.len(), 1);
        assert!(!roster[0].online);
        assert_eq!(roster[0].version, 2);
    }

    #[test]
    fn test_activate_only_from_authenticated() {
        // テスト項目: AUTHENTICATED の接続のみ ACTIVE にでき、ACTIVE 接続が一覧に出る
        // given (前提条件):
        let mut shard = RegistryShard::new();
        let connection = authenticated("alice", Instant::now());
        let id = connection.id;
        shard.insert(connection);
        assert_eq!(shard.active_ids().count(), 0);

        // when (操作):
        let activated = shard.activate(&id);
        let unknown = shard.activate(&ConnectionIdFactory::generate());

        // then (期待する結果):
        assert!(activated);
        assert!(!unknown);
        assert_eq!(shard.active_ids().collect::<Vec<_>>(), vec![id]);
    }
}
