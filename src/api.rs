//! HTTP API endpoints.
//!
//! Small management surface next to the WebSocket route: user registration (so
//! `new_message` has authors to resolve) and a view of live rooms.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::protocol::ErrorBody;
use crate::state::AppState;
use crate::store::StoreError;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoomInfo {
    pub room: String,
    pub members: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoomsResponse {
    pub rooms: Vec<RoomInfo>,
}

/// GET /health
pub async fn health() -> &'static str {
    "ok"
}

/// Register a user.
///
/// POST /api/users
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateUserRequest>,
) -> Response {
    match state.store.create_user(&request.username).await {
        Ok(user) => {
            tracing::info!("Created user {}", user.username);
            (StatusCode::CREATED, Json(user)).into_response()
        }
        Err(e) => {
            let (status, code) = match &e {
                StoreError::DuplicateUser(_) => (StatusCode::CONFLICT, "DUPLICATE_USER"),
                StoreError::EmptyUsername => (StatusCode::BAD_REQUEST, "INVALID_USERNAME"),
            };
            tracing::warn!("Failed to create user: {}", e);
            let body = ErrorBody {
                code: code.to_string(),
                msg: e.to_string(),
            };
            (status, Json(body)).into_response()
        }
    }
}

/// List rooms that currently have members.
///
/// GET /api/rooms
pub async fn list_rooms(State(state): State<Arc<AppState>>) -> Json<RoomsResponse> {
    let rooms = state
        .registry
        .groups()
        .await
        .into_iter()
        .filter_map(|(key, members)| {
            key.room().map(|room| RoomInfo {
                room: room.to_string(),
                members,
            })
        })
        .collect();

    Json(RoomsResponse { rooms })
}
