// Public API for integration tests and potential library usage

pub mod api;
pub mod broadcast;
pub mod config;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod state;
pub mod store;
pub mod types;
pub mod ws;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use state::AppState;

/// Build the HTTP router with all routes mounted
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws/chat/{room_name}", get(ws::ws_handler))
        .route("/api/users", post(api::create_user))
        .route("/api/rooms", get(api::list_rooms))
        .route("/health", get(api::health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
