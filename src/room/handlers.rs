use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tracing::{info, instrument};

use super::{
    models::Room,
    service::RoomService,
    types::{DisbandRequest, Member, MembershipResponse, RoomCreateRequest, RoomSummary},
};
use crate::shared::{AppError, AppState};

/// HTTP handler for creating a new room
///
/// POST /rooms
#[instrument(name = "create_room", skip(state))]
pub async fn create_room(
    State(state): State<AppState>,
    Json(request): Json<RoomCreateRequest>,
) -> Result<Json<RoomSummary>, AppError> {
    let service = &state.room_service;
    let room = service.create_room(request).await?;

    Ok(Json(service.summary(&room)))
}

/// HTTP handler for a single room's summary
///
/// GET /rooms/:room_id
#[instrument(name = "get_room", skip(state))]
pub async fn get_room(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<Json<RoomSummary>, AppError> {
    let service = &state.room_service;
    let room = require_room(service, &room_id).await?;

    Ok(Json(service.summary(&room)))
}

/// HTTP handler for listing the rooms of a realm
///
/// GET /realms/:realm_id/rooms
#[instrument(name = "list_realm_rooms", skip(state))]
pub async fn list_realm_rooms(
    State(state): State<AppState>,
    Path(realm_id): Path<String>,
) -> Result<Json<Vec<RoomSummary>>, AppError> {
    let service = &state.room_service;
    let rooms = service.rooms_in_realm(&realm_id).await?;

    info!(room_count = rooms.len(), "Rooms listed for realm");
    Ok(Json(rooms.iter().map(|room| service.summary(room)).collect()))
}

/// POST /rooms/:room_id/join
#[instrument(name = "join_room", skip(state))]
pub async fn join_room(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Json(member): Json<Member>,
) -> Result<Json<MembershipResponse>, AppError> {
    let service = &state.room_service;
    let mut room = require_room(service, &room_id).await?;
    let changed = service.join(&mut room, &member).await?;

    Ok(Json(MembershipResponse {
        changed,
        room: service.summary(&room),
    }))
}

/// POST /rooms/:room_id/leave
#[instrument(name = "leave_room", skip(state))]
pub async fn leave_room(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Json(member): Json<Member>,
) -> Result<Json<MembershipResponse>, AppError> {
    let service = &state.room_service;
    let mut room = require_room(service, &room_id).await?;
    let changed = service.leave(&mut room, &member).await?;

    Ok(Json(MembershipResponse {
        changed,
        room: service.summary(&room),
    }))
}

/// HTTP handler for disbanding a room
///
/// DELETE /rooms/:room_id
/// Works from the id alone, so a record that no longer loads can still be removed.
/// Returns 204 whether or not the room still existed.
#[instrument(name = "disband_room", skip(state, body))]
pub async fn disband_room(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    body: Option<Json<DisbandRequest>>,
) -> Result<StatusCode, AppError> {
    let members = body
        .map(|Json(request)| request.members)
        .unwrap_or_default();
    state.room_service.disband_by_id(&room_id, &members).await?;

    Ok(StatusCode::NO_CONTENT)
}

async fn require_room(service: &RoomService, room_id: &str) -> Result<Room, AppError> {
    service
        .load_room(room_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Room {room_id} not found")))
}
