// Public API - what other modules can use
pub use handlers::{create_room, disband_room, get_room, join_room, leave_room, list_realm_rooms};

use axum::{
    routing::{get, post},
    Router,
};

use crate::shared::AppState;

// Internal modules
mod handlers;
mod locks;
pub mod membership;
pub mod models;
pub mod repository;
pub mod service;
pub mod types;

/// Room endpoints for the chat-command layer
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/rooms", post(create_room))
        .route("/rooms/:room_id", get(get_room).delete(disband_room))
        .route("/rooms/:room_id/join", post(join_room))
        .route("/rooms/:room_id/leave", post(leave_room))
        .route("/realms/:realm_id/rooms", get(list_realm_rooms))
}
