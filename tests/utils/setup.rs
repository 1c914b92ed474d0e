use std::sync::Arc;

use huddle::{Room, RoomService, RoomServiceConfig};

use super::mocks::{FlakyRoomStore, MockMembershipService};

// ============================================================================
// Test Setup Infrastructure
// ============================================================================

pub struct TestSetup {
    pub store: Arc<FlakyRoomStore>,
    pub membership: MockMembershipService,
    pub service: Arc<RoomService>,
}

impl TestSetup {
    pub fn new() -> Self {
        Self::with_config(RoomServiceConfig::default())
    }

    pub fn with_config(config: RoomServiceConfig) -> Self {
        let store = Arc::new(FlakyRoomStore::new());
        let membership = MockMembershipService::new();
        let service = Arc::new(RoomService::new(
            store.clone(),
            Arc::new(membership.clone()),
            config,
        ));

        Self {
            store,
            membership,
            service,
        }
    }

    /// Trivia room hosted by alice, no description, tag "tag-trivia"
    pub async fn trivia_room(&self) -> Room {
        self.service
            .construct_fresh(
                "tag-trivia".to_string(),
                "Trivia".to_string(),
                "realm-1".to_string(),
                "alice".to_string(),
                String::new(),
            )
            .await
            .unwrap()
    }
}
