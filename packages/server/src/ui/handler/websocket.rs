//! WebSocket connection handlers.

use std::sync::Arc;

use axum::{
    extract::{
        Query, State,
        ws::{WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use crate::{
    domain::UserId,
    infrastructure::transport,
    realtime::{Hub, serve_connection},
    ui::state::AppState,
};

/// Query parameters for WebSocket connection
///
/// `user_id` is the already-authenticated principal.
#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    pub user_id: Option<String>,
}

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConnectQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    let Some(user_id_str) = query.user_id else {
        tracing::warn!("Connection attempt without user_id");
        return Err(StatusCode::BAD_REQUEST);
    };

    // Convert String -> UserId (Domain Model)
    let user_id = match user_id_str.parse::<UserId>() {
        Ok(id) => id,
        Err(e) => {
            tracing::warn!("Rejecting connection: {}", e);
            return Err(StatusCode::BAD_REQUEST);
        }
    };

    if !state.hub.is_accepting() {
        tracing::warn!(user_id = %user_id, "Hub is not accepting connections");
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }

    let config = state.hub.config();
    let ws = ws
        .read_buffer_size(config.read_buffer_size)
        .write_buffer_size(config.write_buffer_size)
        .max_message_size(config.max_message_size);

    let hub = state.hub.clone();
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, hub, user_id)))
}

async fn handle_socket(socket: WebSocket, hub: Hub, user_id: UserId) {
    let (connection, outbound) = hub.connect(user_id);
    tracing::info!(
        connection_id = %connection.id(),
        user_id = %user_id,
        "WebSocket upgraded"
    );

    let (reader, writer) = transport::split(socket);
    serve_connection(hub, connection, outbound, reader, writer).await;
}
