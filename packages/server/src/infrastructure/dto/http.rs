//! HTTP API のレスポンス DTO

use serde::{Deserialize, Serialize};
use tayori_shared::protocol::{RosterEntry, StoredMessageDto};

use crate::domain::UserProfile;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthDto {
    pub status: String,
    pub active_connections: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterDto {
    pub entries: Vec<RosterEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDto {
    pub user_id: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_ref: Option<String>,
}

impl From<UserProfile> for UserDto {
    fn from(model: UserProfile) -> Self {
        Self {
            user_id: model.user_id.into_string(),
            display_name: model.display_name,
            avatar_ref: model.avatar_ref,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryDto {
    pub peer_id: String,
    pub messages: Vec<StoredMessageDto>,
}
