use chrono::Utc;
use futures::future::try_join_all;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::{
    locks::RoomLocks,
    membership::MembershipService,
    models::{decode_roster, validate_member_name, Room, RoomPatch, RoomRecord},
    repository::RoomStore,
    types::{Member, RoomCreateRequest, RoomSummary},
};
use crate::shared::AppError;

/// Configuration for room operations
#[derive(Debug, Clone)]
pub struct RoomServiceConfig {
    /// Upper bound for each remote step, lock waits included
    pub operation_timeout: Duration,
    /// Revoke the room tag from known members when a room is disbanded
    pub revoke_tags_on_disband: bool,
}

impl Default for RoomServiceConfig {
    fn default() -> Self {
        Self {
            operation_timeout: Duration::from_secs(10),
            revoke_tags_on_disband: true,
        }
    }
}

/// Service for the room lifecycle
///
/// Join and leave keep three things in step: the caller's `Room`, the group
/// tag held by the member, and the stored roster. A failed store write is
/// compensated by undoing the tag change, so either all three move or none do.
pub struct RoomService {
    store: Arc<dyn RoomStore + Send + Sync>,
    membership: Arc<dyn MembershipService>,
    locks: RoomLocks,
    config: RoomServiceConfig,
}

impl RoomService {
    pub fn new(
        store: Arc<dyn RoomStore + Send + Sync>,
        membership: Arc<dyn MembershipService>,
        config: RoomServiceConfig,
    ) -> Self {
        Self {
            store,
            membership,
            locks: RoomLocks::new(),
            config,
        }
    }

    /// Builds a fresh room and stores it
    #[instrument(skip(self, description))]
    pub async fn construct_fresh(
        &self,
        room_id: String,
        activity: String,
        realm_id: String,
        host_name: String,
        description: String,
    ) -> Result<Room, AppError> {
        if room_id.is_empty() {
            return Err(AppError::InvalidInput("room id is empty".to_string()));
        }

        let room = Room::new(room_id, realm_id, activity, host_name, description);
        self.bounded("upsert room", &room.room_id, self.store.upsert(&room.to_record()))
            .await?;

        info!(
            room_id = %room.room_id,
            activity = %room.activity,
            host_name = %room.host_name,
            "Room created"
        );
        Ok(room)
    }

    /// Creates a room from a chat command
    #[instrument(skip(self, request), fields(activity = %request.activity))]
    pub async fn create_room(&self, request: RoomCreateRequest) -> Result<Room, AppError> {
        let description = request.description();
        let room_id = request
            .tag_id
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        debug!(room_id = %room_id, "Resolved room id");

        self.construct_fresh(
            room_id,
            request.activity,
            request.realm_id,
            request.host_name,
            description,
        )
        .await
    }

    /// Rebuilds a room from its stored record without touching the store
    pub fn rehydrate(&self, record: RoomRecord) -> Result<Room, AppError> {
        let room_id = record.room_id.clone();
        Room::try_from(record).inspect_err(|e| {
            warn!(room_id = %room_id, error = %e, "Stored room record is malformed");
        })
    }

    /// Fetches and rehydrates a room by id
    #[instrument(skip(self))]
    pub async fn load_room(&self, room_id: &str) -> Result<Option<Room>, AppError> {
        let record = self
            .bounded("load room", room_id, self.store.get(room_id))
            .await?;
        record.map(|record| self.rehydrate(record)).transpose()
    }

    /// Rooms of one realm, oldest first. Malformed records are logged and skipped.
    #[instrument(skip(self))]
    pub async fn rooms_in_realm(&self, realm_id: &str) -> Result<Vec<Room>, AppError> {
        let records = self
            .bounded("list rooms", realm_id, self.store.list_by_realm(realm_id))
            .await?;

        let rooms: Vec<Room> = records
            .into_iter()
            .filter_map(|record| self.rehydrate(record).ok())
            .collect();

        debug!(room_count = rooms.len(), "Rooms listed for realm");
        Ok(rooms)
    }

    /// Display fields for a room as of now
    pub fn summary(&self, room: &Room) -> RoomSummary {
        room.summary_at(Utc::now())
    }

    /// Adds a member to the room. Returns false if they were already in it.
    #[instrument(skip(self, room, member), fields(room_id = %room.room_id, member = %member.name))]
    pub async fn join(&self, room: &mut Room, member: &Member) -> Result<bool, AppError> {
        validate_member_name(&member.name)?;
        let _guard = self.lock(&room.room_id).await?;

        let mut roster = self.current_roster(&room.room_id).await?;
        if roster.contains(&member.name) {
            debug!("Member already in room");
            room.roster = roster;
            return Ok(false);
        }

        if let Err(e) = self
            .bounded(
                "grant tag",
                &room.room_id,
                self.membership.grant(member, &room.room_id),
            )
            .await
        {
            warn!(error = %e, "Failed to grant room tag");
            // A timed out grant may still land remotely
            if matches!(e, AppError::Timeout(_)) {
                self.compensate(
                    "revoke tag",
                    &room.room_id,
                    self.membership.revoke(member, &room.room_id),
                )
                .await;
            }
            return Err(e);
        }

        roster.push(member.name.clone());
        if let Err(e) = self.store_roster(&room.room_id, &roster).await {
            warn!(error = %e, "Failed to store roster after grant");
            match self.reread_roster(&room.room_id).await {
                Ok(Some(stored)) if stored.contains(&member.name) => {
                    info!("Roster write landed despite the error, keeping tag");
                    room.roster = stored;
                    return Ok(true);
                }
                Ok(_) => {
                    self.compensate(
                        "revoke tag",
                        &room.room_id,
                        self.membership.revoke(member, &room.room_id),
                    )
                    .await;
                }
                Err(read_error) => {
                    error!(
                        error = %read_error,
                        "Roster write outcome unknown, keeping tag so a retried join repairs it"
                    );
                }
            }
            return Err(e);
        }

        room.roster = roster;
        info!(roster_size = room.roster.len(), "Member joined room");
        Ok(true)
    }

    /// Removes a member from the room. Returns false if they were not in it.
    #[instrument(skip(self, room, member), fields(room_id = %room.room_id, member = %member.name))]
    pub async fn leave(&self, room: &mut Room, member: &Member) -> Result<bool, AppError> {
        let _guard = self.lock(&room.room_id).await?;

        let mut roster = self.current_roster(&room.room_id).await?;
        let Some(position) = roster.iter().position(|name| name == &member.name) else {
            debug!("Member not in room");
            room.roster = roster;
            return Ok(false);
        };

        if let Err(e) = self
            .bounded(
                "revoke tag",
                &room.room_id,
                self.membership.revoke(member, &room.room_id),
            )
            .await
        {
            warn!(error = %e, "Failed to revoke room tag");
            // A timed out revoke may still land remotely
            if matches!(e, AppError::Timeout(_)) {
                self.compensate(
                    "grant tag",
                    &room.room_id,
                    self.membership.grant(member, &room.room_id),
                )
                .await;
            }
            return Err(e);
        }

        roster.remove(position);
        if let Err(e) = self.store_roster(&room.room_id, &roster).await {
            warn!(error = %e, "Failed to store roster after revoke");
            match self.reread_roster(&room.room_id).await {
                Ok(Some(stored)) if !stored.contains(&member.name) => {
                    info!("Roster write landed despite the error");
                    room.roster = stored;
                    return Ok(true);
                }
                Ok(Some(_)) => {
                    self.compensate(
                        "grant tag",
                        &room.room_id,
                        self.membership.grant(member, &room.room_id),
                    )
                    .await;
                }
                // Room is gone and the tag is already revoked
                Ok(None) => {}
                Err(read_error) => {
                    error!(
                        error = %read_error,
                        "Roster write outcome unknown, leaving tag revoked so a retried leave repairs it"
                    );
                }
            }
            return Err(e);
        }

        room.roster = roster;
        info!(roster_size = room.roster.len(), "Member left room");
        Ok(true)
    }

    /// Changes how many players the room is waiting for
    #[instrument(skip(self, room), fields(room_id = %room.room_id))]
    pub async fn set_target_size(&self, room: &mut Room, target_size: i32) -> Result<(), AppError> {
        if target_size < 0 {
            return Err(AppError::InvalidInput(format!(
                "target size {target_size} is negative"
            )));
        }
        let _guard = self.lock(&room.room_id).await?;

        let updated = self
            .bounded(
                "update target size",
                &room.room_id,
                self.store
                    .update(&room.room_id, &RoomPatch::target_size(target_size)),
            )
            .await?;
        if !updated {
            return Err(room_not_found(&room.room_id));
        }

        room.target_size = target_size;
        info!(target_size, "Room target size changed");
        Ok(())
    }

    /// Deletes the stored room. Disbanding a room that is already gone succeeds.
    #[instrument(skip(self, room), fields(room_id = %room.room_id))]
    pub async fn disband(&self, room: &Room) -> Result<(), AppError> {
        self.disband_by_id(&room.room_id, &[]).await
    }

    /// Disbands the room after revoking its tag from the given members
    #[instrument(skip(self, room, members), fields(room_id = %room.room_id))]
    pub async fn disband_with_members(
        &self,
        room: &Room,
        members: &[Member],
    ) -> Result<(), AppError> {
        self.disband_by_id(&room.room_id, members).await
    }

    /// Disbands by id alone, so a record that no longer rehydrates can still be removed
    ///
    /// A failed revoke aborts before the record is deleted, so the whole call
    /// can be retried.
    #[instrument(skip(self, members))]
    pub async fn disband_by_id(&self, room_id: &str, members: &[Member]) -> Result<(), AppError> {
        let _guard = self.lock(room_id).await?;

        if self.config.revoke_tags_on_disband && !members.is_empty() {
            let revokes = members
                .iter()
                .map(|member| self.membership.revoke(member, room_id));
            self.bounded("revoke tags", room_id, try_join_all(revokes))
                .await
                .inspect_err(|e| warn!(error = %e, "Failed to revoke tags while disbanding"))?;
            debug!(revoked = members.len(), "Revoked room tag from members");
        }

        self.bounded("delete room", room_id, self.store.delete(room_id))
            .await?;

        info!("Room disbanded");
        Ok(())
    }

    async fn lock(&self, room_id: &str) -> Result<OwnedMutexGuard<()>, AppError> {
        timeout(self.config.operation_timeout, self.locks.acquire(room_id))
            .await
            .map_err(|_| {
                warn!(room_id = %room_id, "Timed out waiting for room lock");
                AppError::Timeout(format!("waiting for lock on room {room_id}"))
            })
    }

    /// Reads the stored roster, which is authoritative over any in-memory copy
    async fn current_roster(&self, room_id: &str) -> Result<Vec<String>, AppError> {
        let record = self
            .bounded("load room", room_id, self.store.get(room_id))
            .await?
            .ok_or_else(|| room_not_found(room_id))?;
        decode_roster(&record.roster_encoded)
    }

    /// Rereads the roster after a failed write. `None` means the record is gone.
    async fn reread_roster(&self, room_id: &str) -> Result<Option<Vec<String>>, AppError> {
        self.bounded("reload room", room_id, self.store.get(room_id))
            .await?
            .map(|record| decode_roster(&record.roster_encoded))
            .transpose()
    }

    async fn store_roster(&self, room_id: &str, roster: &[String]) -> Result<(), AppError> {
        let updated = self
            .bounded(
                "update roster",
                room_id,
                self.store.update(room_id, &RoomPatch::roster(roster)),
            )
            .await?;
        if updated {
            Ok(())
        } else {
            Err(room_not_found(room_id))
        }
    }

    /// Runs one remote step under the operation timeout
    async fn bounded<T, E, F>(&self, step: &str, room_id: &str, operation: F) -> Result<T, AppError>
    where
        F: Future<Output = Result<T, E>>,
        AppError: From<E>,
    {
        match timeout(self.config.operation_timeout, operation).await {
            Ok(result) => result.map_err(AppError::from),
            Err(_) => {
                warn!(step = %step, room_id = %room_id, "Remote step timed out");
                Err(AppError::Timeout(format!(
                    "{step} for room {room_id} exceeded {:?}",
                    self.config.operation_timeout
                )))
            }
        }
    }

    /// Undo step after a failed store write. Failure here leaves the tag out of step.
    async fn compensate<F, E>(&self, step: &str, room_id: &str, operation: F)
    where
        F: Future<Output = Result<(), E>>,
        AppError: From<E>,
    {
        if let Err(e) = self.bounded(step, room_id, operation).await {
            error!(
                step = %step,
                room_id = %room_id,
                error = %e,
                "Compensation failed, group tag and roster disagree"
            );
        }
    }
}

fn room_not_found(room_id: &str) -> AppError {
    AppError::NotFound(format!("Room {room_id} not found"))
}
