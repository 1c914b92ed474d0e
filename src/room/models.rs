use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::types::RoomSummary;
use crate::shared::AppError;

/// Seconds a fresh room stays open before it reads as expired
pub const DEFAULT_TIMEOUT_SECONDS: i64 = 60 * 60;

/// Players a fresh room is waiting for
pub const DEFAULT_TARGET_SIZE: i32 = 2;

/// Separator used in the stored roster column. Member names may not contain it.
pub const ROSTER_DELIMITER: &str = "\\";

/// A room groups members around one activity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub room_id: String, // Also the id of the group tag granted to members
    pub realm_id: String,
    pub activity: String,
    pub description: String, // Empty means no description
    pub created_at: DateTime<Utc>,
    pub timeout_seconds: i64,
    pub roster: Vec<String>, // Member names in join order
    pub host_name: String,
    pub target_size: i32,
}

/// Database model for rooms table
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct RoomRecord {
    pub room_id: String,
    pub realm_id: String,
    pub activity: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub timeout_seconds: i64,
    pub roster_encoded: String,
    pub host_name: String,
    pub target_size: i32,
}

/// Partial update merged into an existing record. `None` fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomPatch {
    pub roster_encoded: Option<String>,
    pub target_size: Option<i32>,
}

impl RoomPatch {
    pub fn roster(roster: &[String]) -> Self {
        Self {
            roster_encoded: Some(encode_roster(roster)),
            ..Self::default()
        }
    }

    pub fn target_size(target_size: i32) -> Self {
        Self {
            target_size: Some(target_size),
            ..Self::default()
        }
    }

    /// Applies the patch to a record in place
    pub fn apply_to(&self, record: &mut RoomRecord) {
        if let Some(roster_encoded) = &self.roster_encoded {
            record.roster_encoded = roster_encoded.clone();
        }
        if let Some(target_size) = self.target_size {
            record.target_size = target_size;
        }
    }
}

impl Room {
    /// Creates a fresh room with an empty roster and default timeout and target
    pub fn new(
        room_id: String,
        realm_id: String,
        activity: String,
        host_name: String,
        description: String,
    ) -> Self {
        Self {
            room_id,
            realm_id,
            activity,
            description,
            created_at: Utc::now(),
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            roster: vec![],
            host_name,
            target_size: DEFAULT_TARGET_SIZE,
        }
    }

    pub fn player_count(&self) -> usize {
        self.roster.len()
    }

    pub fn has_member(&self, name: &str) -> bool {
        self.roster.iter().any(|member| member == name)
    }

    /// Moment the room reads as expired. Saturates instead of overflowing.
    pub fn expires_at(&self) -> DateTime<Utc> {
        Duration::try_seconds(self.timeout_seconds)
            .and_then(|timeout| self.created_at.checked_add_signed(timeout))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Whole seconds left before expiry, never negative
    pub fn remaining_seconds_at(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at() - now).num_seconds().max(0)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at()
    }

    /// Display fields for this room as seen at `now`
    pub fn summary_at(&self, now: DateTime<Utc>) -> RoomSummary {
        RoomSummary {
            room_id: self.room_id.clone(),
            title: self.activity.clone(),
            description: (!self.description.is_empty()).then(|| self.description.clone()),
            player_count: self.player_count(),
            players: self.roster.join(", "),
            created_at: self.created_at,
            remaining_seconds: self.remaining_seconds_at(now),
            expired: self.is_expired_at(now),
            target_size: self.target_size,
            host_name: self.host_name.clone(),
        }
    }

    pub fn to_record(&self) -> RoomRecord {
        RoomRecord {
            room_id: self.room_id.clone(),
            realm_id: self.realm_id.clone(),
            activity: self.activity.clone(),
            description: self.description.clone(),
            created_at: self.created_at,
            timeout_seconds: self.timeout_seconds,
            roster_encoded: encode_roster(&self.roster),
            host_name: self.host_name.clone(),
            target_size: self.target_size,
        }
    }
}

impl TryFrom<RoomRecord> for Room {
    type Error = AppError;

    fn try_from(record: RoomRecord) -> Result<Self, Self::Error> {
        if record.room_id.is_empty() {
            return Err(AppError::MalformedRecord("room_id is empty".to_string()));
        }
        if record.timeout_seconds < 0 {
            return Err(AppError::MalformedRecord(format!(
                "room {} has negative timeout {}",
                record.room_id, record.timeout_seconds
            )));
        }
        if record.target_size < 0 {
            return Err(AppError::MalformedRecord(format!(
                "room {} has negative target size {}",
                record.room_id, record.target_size
            )));
        }
        let roster = decode_roster(&record.roster_encoded)?;

        Ok(Self {
            room_id: record.room_id,
            realm_id: record.realm_id,
            activity: record.activity,
            description: record.description,
            created_at: record.created_at,
            timeout_seconds: record.timeout_seconds,
            roster,
            host_name: record.host_name,
            target_size: record.target_size,
        })
    }
}

pub fn encode_roster(roster: &[String]) -> String {
    roster.join(ROSTER_DELIMITER)
}

/// Splits a stored roster. The empty string is the empty roster.
pub fn decode_roster(encoded: &str) -> Result<Vec<String>, AppError> {
    if encoded.is_empty() {
        return Ok(Vec::new());
    }

    let mut roster: Vec<String> = Vec::new();
    for name in encoded.split(ROSTER_DELIMITER) {
        if name.is_empty() {
            return Err(AppError::MalformedRecord(format!(
                "roster {encoded:?} contains an empty name"
            )));
        }
        if roster.iter().any(|existing| existing == name) {
            return Err(AppError::MalformedRecord(format!(
                "roster {encoded:?} lists {name:?} twice"
            )));
        }
        roster.push(name.to_string());
    }
    Ok(roster)
}

/// Rejects names the roster encoding cannot carry
pub fn validate_member_name(name: &str) -> Result<(), AppError> {
    if name.is_empty() {
        return Err(AppError::InvalidInput("member name is empty".to_string()));
    }
    if name.contains(ROSTER_DELIMITER) {
        return Err(AppError::InvalidInput(format!(
            "member name {name:?} contains the reserved character {ROSTER_DELIMITER:?}"
        )));
    }
    Ok(())
}
