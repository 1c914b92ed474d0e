use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, instrument, warn};

use super::models::{RoomPatch, RoomRecord};
use crate::shared::AppError;

/// Keyed durable storage for room records
#[async_trait]
pub trait RoomStore {
    /// Inserts the record or replaces the one with the same room id
    async fn upsert(&self, record: &RoomRecord) -> Result<(), AppError>;

    /// Merges a patch into an existing record. Returns false when no record exists.
    async fn update(&self, room_id: &str, patch: &RoomPatch) -> Result<bool, AppError>;

    async fn get(&self, room_id: &str) -> Result<Option<RoomRecord>, AppError>;

    /// Records of one realm, oldest first
    async fn list_by_realm(&self, realm_id: &str) -> Result<Vec<RoomRecord>, AppError>;

    /// Removes the record. Absent records are not an error.
    async fn delete(&self, room_id: &str) -> Result<(), AppError>;
}

/// In-memory implementation of RoomStore for development and testing
pub struct InMemoryRoomStore {
    records: Mutex<HashMap<String, RoomRecord>>,
}

impl Default for InMemoryRoomStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRoomStore {
    /// Creates a new empty in-memory store
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the current number of stored records
    pub fn record_count(&self) -> usize {
        self.records.lock().map(|records| records.len()).unwrap_or(0)
    }

    /// Checks if a record exists by room id
    pub fn has_record(&self, room_id: &str) -> bool {
        self.records
            .lock()
            .map(|records| records.contains_key(room_id))
            .unwrap_or(false)
    }

    fn records(&self) -> Result<MutexGuard<'_, HashMap<String, RoomRecord>>, AppError> {
        self.records
            .lock()
            .map_err(|_| AppError::StoreUnavailable("in-memory room store poisoned".to_string()))
    }
}

#[async_trait]
impl RoomStore for InMemoryRoomStore {
    #[instrument(skip(self, record), fields(room_id = %record.room_id))]
    async fn upsert(&self, record: &RoomRecord) -> Result<(), AppError> {
        let mut records = self.records()?;
        let replaced = records
            .insert(record.room_id.clone(), record.clone())
            .is_some();

        debug!(replaced, "Room record upserted in memory");
        Ok(())
    }

    #[instrument(skip(self, patch))]
    async fn update(&self, room_id: &str, patch: &RoomPatch) -> Result<bool, AppError> {
        let mut records = self.records()?;

        match records.get_mut(room_id) {
            Some(record) => {
                patch.apply_to(record);
                debug!("Room record updated in memory");
                Ok(true)
            }
            None => {
                warn!("Room record not found for update in memory");
                Ok(false)
            }
        }
    }

    #[instrument(skip(self))]
    async fn get(&self, room_id: &str) -> Result<Option<RoomRecord>, AppError> {
        let records = self.records()?;
        let record = records.get(room_id).cloned();

        debug!(found = record.is_some(), "Fetched room record from memory");
        Ok(record)
    }

    #[instrument(skip(self))]
    async fn list_by_realm(&self, realm_id: &str) -> Result<Vec<RoomRecord>, AppError> {
        let records = self.records()?;
        let mut list: Vec<RoomRecord> = records
            .values()
            .filter(|record| record.realm_id == realm_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.room_id.cmp(&b.room_id))
        });

        debug!(count = list.len(), "Listed room records in memory");
        Ok(list)
    }

    #[instrument(skip(self))]
    async fn delete(&self, room_id: &str) -> Result<(), AppError> {
        let mut records = self.records()?;

        if records.remove(room_id).is_some() {
            debug!("Room record deleted from memory");
        } else {
            debug!("Room record already absent from memory");
        }
        Ok(())
    }
}

const CREATE_ROOMS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS rooms (
    room_id         TEXT PRIMARY KEY,
    realm_id        TEXT NOT NULL,
    activity        TEXT NOT NULL,
    description     TEXT NOT NULL DEFAULT '',
    created_at      TIMESTAMPTZ NOT NULL,
    timeout_seconds BIGINT NOT NULL,
    roster_encoded  TEXT NOT NULL DEFAULT '',
    host_name       TEXT NOT NULL,
    target_size     INTEGER NOT NULL
)
"#;

const CREATE_REALM_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS rooms_realm_created_idx ON rooms (realm_id, created_at, room_id)";

const ROOM_COLUMNS: &str = "room_id, realm_id, activity, description, created_at, \
                            timeout_seconds, roster_encoded, host_name, target_size";

/// PostgreSQL implementation of RoomStore
pub struct PostgresRoomStore {
    pool: PgPool,
}

impl PostgresRoomStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the rooms table if it does not exist yet
    #[instrument(skip(self))]
    pub async fn ensure_schema(&self) -> Result<(), AppError> {
        for statement in [CREATE_ROOMS_TABLE, CREATE_REALM_INDEX] {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    warn!(error = %e, "Failed to create rooms schema");
                    store_error(e)
                })?;
        }

        debug!("Rooms table ready");
        Ok(())
    }
}

/// Rows that do not fit the record schema are malformed; everything else is the store failing
fn store_error(error: sqlx::Error) -> AppError {
    match &error {
        sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::Decode(_) => AppError::MalformedRecord(error.to_string()),
        _ => AppError::StoreUnavailable(error.to_string()),
    }
}

#[async_trait]
impl RoomStore for PostgresRoomStore {
    #[instrument(skip(self, record), fields(room_id = %record.room_id))]
    async fn upsert(&self, record: &RoomRecord) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO rooms (room_id, realm_id, activity, description, created_at, \
             timeout_seconds, roster_encoded, host_name, target_size) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (room_id) DO UPDATE SET \
             realm_id = EXCLUDED.realm_id, activity = EXCLUDED.activity, \
             description = EXCLUDED.description, created_at = EXCLUDED.created_at, \
             timeout_seconds = EXCLUDED.timeout_seconds, roster_encoded = EXCLUDED.roster_encoded, \
             host_name = EXCLUDED.host_name, target_size = EXCLUDED.target_size",
        )
        .bind(&record.room_id)
        .bind(&record.realm_id)
        .bind(&record.activity)
        .bind(&record.description)
        .bind(record.created_at)
        .bind(record.timeout_seconds)
        .bind(&record.roster_encoded)
        .bind(&record.host_name)
        .bind(record.target_size)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to upsert room record");
            store_error(e)
        })?;

        debug!("Room record upserted in database");
        Ok(())
    }

    #[instrument(skip(self, patch))]
    async fn update(&self, room_id: &str, patch: &RoomPatch) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE rooms SET roster_encoded = COALESCE($2, roster_encoded), \
             target_size = COALESCE($3, target_size) WHERE room_id = $1",
        )
        .bind(room_id)
        .bind(patch.roster_encoded.as_deref())
        .bind(patch.target_size)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to update room record");
            store_error(e)
        })?;

        let updated = result.rows_affected() > 0;
        if !updated {
            warn!("Room record not found for update");
        }
        Ok(updated)
    }

    #[instrument(skip(self))]
    async fn get(&self, room_id: &str) -> Result<Option<RoomRecord>, AppError> {
        let sql = format!("SELECT {ROOM_COLUMNS} FROM rooms WHERE room_id = $1");
        let record = sqlx::query_as::<_, RoomRecord>(&sql)
            .bind(room_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                warn!(error = %e, "Failed to fetch room record");
                store_error(e)
            })?;

        debug!(found = record.is_some(), "Fetched room record from database");
        Ok(record)
    }

    #[instrument(skip(self))]
    async fn list_by_realm(&self, realm_id: &str) -> Result<Vec<RoomRecord>, AppError> {
        let sql = format!(
            "SELECT {ROOM_COLUMNS} FROM rooms WHERE realm_id = $1 ORDER BY created_at, room_id"
        );
        let records = sqlx::query_as::<_, RoomRecord>(&sql)
            .bind(realm_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                warn!(error = %e, "Failed to list room records");
                store_error(e)
            })?;

        debug!(count = records.len(), "Listed room records from database");
        Ok(records)
    }

    #[instrument(skip(self))]
    async fn delete(&self, room_id: &str) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM rooms WHERE room_id = $1")
            .bind(room_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                warn!(error = %e, "Failed to delete room record");
                store_error(e)
            })?;

        if result.rows_affected() == 0 {
            debug!("Room record already absent from database");
        } else {
            debug!("Room record deleted from database");
        }
        Ok(())
    }
}
