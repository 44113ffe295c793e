//! Callbacks registered by the application.
//!
//! Listeners run on the controller task, so they must return quickly and must
//! not register further listeners from inside a callback.

use tayori_shared::protocol::{DeliveredMessage, RosterEntry};

use crate::domain::ConnectionState;

pub type RosterSnapshotListener = Box<dyn Fn(&[RosterEntry]) + Send + Sync>;
pub type RosterDeltaListener = Box<dyn Fn(&RosterEntry) + Send + Sync>;
pub type MessageListener = Box<dyn Fn(&DeliveredMessage) + Send + Sync>;
pub type StateChangeListener = Box<dyn Fn(ConnectionState) + Send + Sync>;
/// `(room_id, user_id)` of someone typing
pub type TypingListener = Box<dyn Fn(&str, &str) + Send + Sync>;

#[derive(Default)]
pub struct Listeners {
    pub(crate) roster_snapshot: Vec<RosterSnapshotListener>,
    pub(crate) roster_delta: Vec<RosterDeltaListener>,
    pub(crate) message: Vec<MessageListener>,
    pub(crate) state_change: Vec<StateChangeListener>,
    pub(crate) typing: Vec<TypingListener>,
}

impl Listeners {
    pub(crate) fn roster_snapshot(&self, entries: &[RosterEntry]) {
        for listener in &self.roster_snapshot {
            listener(entries);
        }
    }

    pub(crate) fn roster_delta(&self, entry: &RosterEntry) {
        for listener in &self.roster_delta {
            listener(entry);
        }
    }

    pub(crate) fn message(&self, message: &DeliveredMessage) {
        for listener in &self.message {
            listener(message);
        }
    }

    pub(crate) fn state_change(&self, state: ConnectionState) {
        for listener in &self.state_change {
            listener(state);
        }
    }

    pub(crate) fn typing(&self, room_id: &str, user_id: &str) {
        for listener in &self.typing {
            listener(room_id, user_id);
        }
    }
}
