use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use huddle::{
    AppError, InMemoryMembershipService, InMemoryRoomStore, Member, MembershipError,
    MembershipService, RoomPatch, RoomRecord, RoomStore,
};

// ============================================================================
// Mock Infrastructure
// ============================================================================

/// How long a stalled call hangs after doing its work
pub const STALL: Duration = Duration::from_millis(200);

/// Room store that yields on every call and can be told to fail writes
pub struct FlakyRoomStore {
    inner: InMemoryRoomStore,
    fail_updates: AtomicBool,
    stall_after_update: AtomicBool,
}

impl FlakyRoomStore {
    pub fn new() -> Self {
        Self {
            inner: InMemoryRoomStore::new(),
            fail_updates: AtomicBool::new(false),
            stall_after_update: AtomicBool::new(false),
        }
    }

    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    /// Updates commit, then hang past any short operation timeout
    pub fn stall_after_update(&self, stall: bool) {
        self.stall_after_update.store(stall, Ordering::SeqCst);
    }

    pub async fn roster_encoded(&self, room_id: &str) -> Option<String> {
        self.inner
            .get(room_id)
            .await
            .unwrap()
            .map(|record| record.roster_encoded)
    }

    pub fn has_record(&self, room_id: &str) -> bool {
        self.inner.has_record(room_id)
    }
}

#[async_trait]
impl RoomStore for FlakyRoomStore {
    async fn upsert(&self, record: &RoomRecord) -> Result<(), AppError> {
        tokio::task::yield_now().await;
        self.inner.upsert(record).await
    }

    async fn update(&self, room_id: &str, patch: &RoomPatch) -> Result<bool, AppError> {
        tokio::task::yield_now().await;
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(AppError::StoreUnavailable("connection reset".to_string()));
        }
        let updated = self.inner.update(room_id, patch).await?;
        if self.stall_after_update.load(Ordering::SeqCst) {
            tokio::time::sleep(STALL).await;
        }
        Ok(updated)
    }

    async fn get(&self, room_id: &str) -> Result<Option<RoomRecord>, AppError> {
        tokio::task::yield_now().await;
        self.inner.get(room_id).await
    }

    async fn list_by_realm(&self, realm_id: &str) -> Result<Vec<RoomRecord>, AppError> {
        self.inner.list_by_realm(realm_id).await
    }

    async fn delete(&self, room_id: &str) -> Result<(), AppError> {
        tokio::task::yield_now().await;
        self.inner.delete(room_id).await
    }
}

/// Membership service that logs every call and can be told to reject them
#[derive(Clone)]
pub struct MockMembershipService {
    inner: Arc<InMemoryMembershipService>,
    calls: Arc<RwLock<Vec<String>>>,
    fail_grants: Arc<AtomicBool>,
    fail_revokes: Arc<AtomicBool>,
    stall_after_change: Arc<AtomicBool>,
}

impl MockMembershipService {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(InMemoryMembershipService::new()),
            calls: Arc::new(RwLock::new(Vec::new())),
            fail_grants: Arc::new(AtomicBool::new(false)),
            fail_revokes: Arc::new(AtomicBool::new(false)),
            stall_after_change: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Grants and revokes land, then hang past any short operation timeout
    pub fn stall_after_change(&self, stall: bool) {
        self.stall_after_change.store(stall, Ordering::SeqCst);
    }

    /// Stalls only the first call after being armed, so compensation can run
    async fn maybe_stall(&self) {
        if self.stall_after_change.swap(false, Ordering::SeqCst) {
            tokio::time::sleep(STALL).await;
        }
    }

    pub fn fail_grants(&self, fail: bool) {
        self.fail_grants.store(fail, Ordering::SeqCst);
    }

    pub fn fail_revokes(&self, fail: bool) {
        self.fail_revokes.store(fail, Ordering::SeqCst);
    }

    pub async fn calls(&self) -> Vec<String> {
        self.calls.read().await.clone()
    }

    pub async fn has_tag(&self, member_id: &str, tag_id: &str) -> bool {
        self.inner.has_tag(member_id, tag_id).await
    }

    pub async fn holders_of(&self, tag_id: &str) -> Vec<String> {
        self.inner.holders_of(tag_id).await
    }

    fn rejection(member: &Member, tag_id: &str) -> MembershipError {
        MembershipError::Rejected {
            member: member.name.clone(),
            tag_id: tag_id.to_string(),
            reason: "missing permissions".to_string(),
        }
    }
}

#[async_trait]
impl MembershipService for MockMembershipService {
    async fn grant(&self, member: &Member, tag_id: &str) -> Result<(), MembershipError> {
        self.calls
            .write()
            .await
            .push(format!("grant {} {}", member.name, tag_id));
        if self.fail_grants.load(Ordering::SeqCst) {
            return Err(Self::rejection(member, tag_id));
        }
        self.inner.grant(member, tag_id).await?;
        self.maybe_stall().await;
        Ok(())
    }

    async fn revoke(&self, member: &Member, tag_id: &str) -> Result<(), MembershipError> {
        self.calls
            .write()
            .await
            .push(format!("revoke {} {}", member.name, tag_id));
        if self.fail_revokes.load(Ordering::SeqCst) {
            return Err(Self::rejection(member, tag_id));
        }
        self.inner.revoke(member, tag_id).await?;
        self.maybe_stall().await;
        Ok(())
    }
}
