//! Message formatting utilities for client display.

use tayori_shared::{
    protocol::{DeliveredMessage, DeliveryReceipt, DeliveryStatus, RosterEntry, StoredMessageDto},
    time::format_millis_utc,
};

use crate::domain::ConnectionState;

const RULE: &str = "------------------------------------------------------------";

/// Message formatter for client display
pub struct MessageFormatter;

impl MessageFormatter {
    /// Format the roster snapshot showing every known user
    ///
    /// # Arguments
    ///
    /// * `entries` - Roster entries, already sorted
    /// * `me` - The current user's ID (to mark as "me")
    pub fn format_roster(entries: &[RosterEntry], me: &str) -> String {
        let mut output = String::new();
        output.push_str("\n\n============================================================\n");
        output.push_str("Users:\n");

        if entries.is_empty() {
            output.push_str("(No users)\n");
        } else {
            for entry in entries {
                let me_suffix = if entry.user_id == me { " (me)" } else { "" };
                let status = if entry.online { "online" } else { "offline" };
                output.push_str(&format!("{}{} - {}\n", entry.user_id, me_suffix, status));
            }
        }

        output.push_str("============================================================\n");
        output
    }

    /// Format a presence change
    pub fn format_presence(entry: &RosterEntry) -> String {
        if entry.online {
            format!("\n+ {} is online\n", entry.user_id)
        } else {
            format!("\n- {} went offline\n", entry.user_id)
        }
    }

    /// Format an incoming (or other-tab) message
    pub fn format_message(message: &DeliveredMessage) -> String {
        format!(
            "\n\n{}\n@{} -> @{}: {}\nsent at {}\n{}\n",
            RULE,
            message.sender_id,
            message.receiver_id,
            Self::body(&message.content.text, &message.content.image),
            format_millis_utc(message.created_at),
            RULE
        )
    }

    /// Format the acknowledgment of one of our sends
    pub fn format_receipt(receipt: &DeliveryReceipt) -> String {
        let status = match receipt.status {
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::StoredOffline => "stored (recipient offline)",
            DeliveryStatus::DuplicateSuppressed => "already sent",
        };
        format!("{} at {}\n", status, format_millis_utc(receipt.created_at))
    }

    /// Format the history with `peer_id`, oldest first
    pub fn format_history(peer_id: &str, messages: &[StoredMessageDto]) -> String {
        let mut output = format!("\n\n{}\nHistory with {}:\n", RULE, peer_id);
        if messages.is_empty() {
            output.push_str("(No messages)\n");
        }
        for message in messages {
            output.push_str(&format!(
                "[{}] @{}: {}\n",
                format_millis_utc(message.created_at),
                message.sender_id,
                Self::body(&message.content.text, &message.content.image)
            ));
        }
        output.push_str(RULE);
        output.push('\n');
        output
    }

    pub fn format_state(state: ConnectionState) -> String {
        format!("\n[{}]\n", state)
    }

    pub fn format_typing(room_id: &str, user_id: &str) -> String {
        format!("\n{} is typing in {}...\n", user_id, room_id)
    }

    fn body(text: &Option<String>, image: &Option<String>) -> String {
        match (text, image) {
            (Some(text), Some(image)) => format!("{} [image: {}]", text, image),
            (Some(text), None) => text.clone(),
            (None, Some(image)) => format!("[image: {}]", image),
            (None, None) => String::new(),
        }
    }
}
