use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Per-room critical sections
///
/// Operations on the same room id queue behind one async mutex; different
/// rooms never contend. Entries nobody holds or waits on are pruned on the
/// next acquire.
#[derive(Default)]
pub struct RoomLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl RoomLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to a room
    pub async fn acquire(&self, room_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            // The map holds no invariant a panicking holder could break
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(room_id.to_string()).or_default())
        };
        lock.lock_owned().await
    }

    /// Number of rooms with a live lock entry
    pub fn tracked(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
