use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

use crate::room::membership::MembershipError;
use crate::room::service::RoomService;

/// Shared application state containing all dependencies
#[derive(Clone)]
pub struct AppState {
    pub room_service: Arc<RoomService>,
}

impl AppState {
    pub fn new(room_service: Arc<RoomService>) -> Self {
        Self { room_service }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Membership service error: {0}")]
    MembershipServiceError(#[from] MembershipError),

    #[error("Malformed room record: {0}")]
    MalformedRecord(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Timed out: {0}")]
    Timeout(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::MembershipServiceError(_) => StatusCode::BAD_GATEWAY,
            AppError::MalformedRecord(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}
