//! ルーム表（純粋なデータ構造）
//!
//! ルームは配送範囲を絞るための一時的なグループで、永続化しない。
//! 最初の join で作成し、メンバーが空になった時点で削除する。

use std::collections::{HashMap, HashSet};

use super::value_object::{ConnectionId, RoomId};

#[derive(Debug, Default)]
pub struct RoomTable {
    rooms: HashMap<RoomId, HashSet<ConnectionId>>,
    /// 接続ごとの参加ルーム（切断時の一括削除用）
    memberships: HashMap<ConnectionId, HashSet<RoomId>>,
}

impl RoomTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 参加する。既に参加済みなら false を返す
    pub fn join(&mut self, connection_id: ConnectionId, room_id: RoomId) -> bool {
        let inserted = self
            .rooms
            .entry(room_id.clone())
            .or_default()
            .insert(connection_id);
        self.memberships
            .entry(connection_id)
            .or_default()
            .insert(room_id);
        inserted
    }

    /// 退出する。参加していなければ何もしない（冪等）
    pub fn leave(&mut self, connection_id: &ConnectionId, room_id: &RoomId) -> bool {
        let removed = match self.rooms.get_mut(room_id) {
            Some(members) => {
                let removed = members.remove(connection_id);
                if members.is_empty() {
                    self.rooms.remove(room_id);
                }
                removed
            }
            None => false,
        };

        if let Some(rooms) = self.memberships.get_mut(connection_id) {
            rooms.remove(room_id);
            if rooms.is_empty() {
                self.memberships.remove(connection_id);
            }
        }

        removed
    }

    /// 接続を全ルームから外す。外したルームを返す
    pub fn remove_connection(&mut self, connection_id: &ConnectionId) -> Vec<RoomId> {
        let Some(rooms) = self.memberships.remove(connection_id) else {
            return Vec::new();
        };

        for room_id in &rooms {
            if let Some(members) = self.rooms.get_mut(room_id) {
                members.remove(connection_id);
                if members.is_empty() {
                    self.rooms.remove(room_id);
                }
            }
        }

        rooms.into_iter().collect()
    }

    pub fn members_of(&self, room_id: &RoomId) -> HashSet<ConnectionId> {
        self.rooms.get(room_id).cloned().unwrap_or_default()
    }

    pub fn rooms_of(&self, connection_id: &ConnectionId) -> Vec<RoomId> {
        self.memberships
            .get(connection_id)
            .map(|rooms| rooms.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn room_exists(&self, room_id: &RoomId) -> bool {
        self.rooms.contains_key(room_id)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
