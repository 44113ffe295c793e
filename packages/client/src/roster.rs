//! Client-side view of who is online.
//!
//! Each session starts with a snapshot from the server. Deltas carry a per-user
//! version; anything not newer than what is already held is stale and dropped.
//! Deltas that overtake the snapshot of their session are parked and replayed
//! on top of it.

use std::collections::HashMap;

use tayori_shared::protocol::RosterEntry;

#[derive(Debug, Default)]
pub struct Roster {
    entries: HashMap<String, RosterEntry>,
    /// Deltas received after `welcome` but before the session's snapshot
    parked: Vec<RosterEntry>,
    awaiting_snapshot: bool,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// A new session was authenticated; its snapshot replaces the current view.
    pub fn begin_session(&mut self) {
        self.parked.clear();
        self.awaiting_snapshot = true;
    }

    /// Apply a snapshot.
    ///
    /// The first snapshot of a session replaces the view, then parked deltas
    /// newer than it are replayed. Later snapshots (explicit roster requests)
    /// are merged entry by entry, so a delta queued ahead of them is kept.
    pub fn apply_snapshot(&mut self, snapshot: Vec<RosterEntry>) {
        if !self.awaiting_snapshot {
            for entry in snapshot {
                self.merge(entry);
            }
            return;
        }

        self.entries = snapshot
            .into_iter()
            .map(|entry| (entry.user_id.clone(), entry))
            .collect();
        self.awaiting_snapshot = false;

        for entry in std::mem::take(&mut self.parked) {
            self.merge(entry);
        }
    }

    /// Apply a delta.
    ///
    /// # Returns
    ///
    /// `true` if the view changed and listeners should be told
    pub fn apply_delta(&mut self, entry: RosterEntry) -> bool {
        if self.awaiting_snapshot {
            self.parked.push(entry);
            return false;
        }
        self.merge(entry)
    }

    fn merge(&mut self, entry: RosterEntry) -> bool {
        match self.entries.get(&entry.user_id) {
            Some(current) if current.version >= entry.version => false,
            _ => {
                self.entries.insert(entry.user_id.clone(), entry);
                true
            }
        }
    }

    pub fn get(&self, user_id: &str) -> Option<&RosterEntry> {
        self.entries.get(user_id)
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.get(user_id).is_some_and(|entry| entry.online)
    }

    /// Entries sorted by user id
    pub fn entries(&self) -> Vec<RosterEntry> {
        let mut entries: Vec<RosterEntry> = self.entries.values().cloned().collect();
        entries.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(user_id: &str, online: bool, version: u64) -> RosterEntry {
        RosterEntry {
            user_id: user_id.to_string(),
            online,
            version,
        }
    }

    #[test]
    fn test_stale_delta_is_ignored() {
        // テスト項目: スナップショット以前の version の差分は無視される
        // given (前提条件):
        let mut roster = Roster::new();
        roster.begin_session();
        roster.apply_snapshot(vec![entry("bob", true, 3)]);

        // when (操作):
        let changed = roster.apply_delta(entry("bob", false, 2));

        // then (期待する結果):
        assert!(!changed);
        assert!(roster.is_online("bob"));
    }

    #[test]
    fn test_newer_delta_updates_entry() {
        // テスト項目: より新しい version の差分で状態が更新される
        // given (前提条件):
        let mut roster = Roster::new();
        roster.begin_session();
        roster.apply_snapshot(vec![entry("bob", true, 3)]);

        // when (操作):
        let changed = roster.apply_delta(entry("bob", false, 4));
        let unknown = roster.apply_delta(entry("carol", true, 1));

        // then (期待する結果):
        assert!(changed);
        assert!(unknown);
        assert!(!roster.is_online("bob"));
        assert_eq!(roster.get("carol").unwrap().version, 1);
    }

    #[test]
    fn test_delta_before_snapshot_is_replayed_only_if_newer() {
        // テスト項目: スナップショットより先に届いた差分は、より新しい場合だけ反映される
        // given (前提条件):
        let mut roster = Roster::new();
        roster.begin_session();

        // when (操作):
        let early_old = roster.apply_delta(entry("bob", true, 1));
        let early_new = roster.apply_delta(entry("carol", false, 6));
        roster.apply_snapshot(vec![entry("bob", false, 2), entry("carol", true, 5)]);

        // then (期待する結果):
        assert!(!early_old);
        assert!(!early_new);
        assert!(!roster.is_online("bob"));
        assert!(!roster.is_online("carol"));
        assert_eq!(roster.get("carol").unwrap().version, 6);
    }

    #[test]
    fn test_new_session_snapshot_replaces_previous_view() {
        // テスト項目: 再接続後のスナップショットが前のセッションの状態を置き換える
        // given (前提条件):
        let mut roster = Roster::new();
        roster.begin_session();
        roster.apply_snapshot(vec![entry("alice", true, 1), entry("bob", true, 1)]);

        // when (操作):
        roster.begin_session();
        roster.apply_snapshot(vec![entry("alice", true, 3), entry("bob", false, 2)]);

        // then (期待する結果):
        assert_eq!(
            roster.entries(),
            vec![entry("alice", true, 3), entry("bob", false, 2)]
        );
    }

    #[test]
    fn test_later_snapshot_does_not_roll_back_newer_delta() {
        // テスト項目: 同じセッション内で後から届いた古いスナップショットが、新しい差分を巻き戻さない
        // given (前提条件):
        let mut roster = Roster::new();
        roster.begin_session();
        roster.apply_snapshot(vec![entry("bob", true, 1)]);
        roster.apply_delta(entry("bob", false, 2));

        // when (操作):
        roster.apply_snapshot(vec![entry("bob", true, 1), entry("carol", true, 1)]);

        // then (期待する結果):
        let bob = roster.get("bob").unwrap();
        assert_eq!(bob.version, 2);
        assert!(!bob.online);
        assert!(roster.is_online("carol"));
    }
}
