//! Axum WebSocket upgrade handler and hub router.

use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::response::IntoResponse;
use axum::routing::get;

use super::connection::run_connection;
use crate::app_state::AppState;

/// `GET /ws` — Upgrade HTTP connection to WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let hub = Arc::clone(&state.hub);
    let options = state.connection.clone();

    ws.max_message_size(state.max_message_bytes)
        .on_upgrade(move |socket| run_connection(socket, hub, options))
}

/// Builds the hub router with the `/ws` endpoint.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .with_state(state)
}
