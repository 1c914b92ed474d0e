use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A platform member as seen by the room core
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Member {
    pub id: String,   // Platform handle used for tag grants
    pub name: String, // Display name recorded in the roster
}

impl Member {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Request payload for creating a new room from a chat command
#[derive(Debug, Clone, Deserialize)]
pub struct RoomCreateRequest {
    pub activity: String,
    pub realm_id: String,
    pub host_name: String,
    /// Raw command arguments. The first token is reserved, the rest form the description.
    #[serde(default)]
    pub args: Vec<String>,
    /// Group tag already provisioned for this room, if any
    #[serde(default)]
    pub tag_id: Option<String>,
}

impl RoomCreateRequest {
    pub fn description(&self) -> String {
        self.args
            .iter()
            .skip(1)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Display-ready fields for a room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSummary {
    pub room_id: String,
    pub title: String,
    pub description: Option<String>,
    pub player_count: usize,
    pub players: String,
    pub created_at: DateTime<Utc>,
    pub remaining_seconds: i64,
    pub expired: bool,
    pub target_size: i32,
    pub host_name: String,
}

/// Response for join and leave
#[derive(Debug, Serialize, Deserialize)]
pub struct MembershipResponse {
    /// False when the call was a no-op
    pub changed: bool,
    pub room: RoomSummary,
}

/// Optional body of DELETE /rooms/:room_id
///
/// Members listed here lose the room's tag before the record is deleted.
#[derive(Debug, Deserialize)]
pub struct DisbandRequest {
    #[serde(default)]
    pub members: Vec<Member>,
}
