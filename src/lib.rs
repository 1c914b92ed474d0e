// Library crate for the huddle room core
// This file exposes the public API for integration tests

pub mod config;
pub mod room;
pub mod shared;

// Re-export commonly used types for easier access in tests
pub use config::AppConfig;
pub use room::{
    membership::{InMemoryMembershipService, MembershipError, MembershipService},
    models::{Room, RoomPatch, RoomRecord},
    repository::{InMemoryRoomStore, PostgresRoomStore, RoomStore},
    service::{RoomService, RoomServiceConfig},
    types::{DisbandRequest, Member, RoomCreateRequest, RoomSummary},
};
pub use shared::{AppError, AppState};
