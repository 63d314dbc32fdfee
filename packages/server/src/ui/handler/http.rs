//! HTTP API endpoint handlers.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

use crate::{
    domain::{RoomId, UserId},
    infrastructure::dto::http::{HubStatsDto, PresenceDto, PresenceQuery, RoomPresenceDto},
    ui::state::AppState,
};

/// Debug endpoint exposing the hub's state and counters
pub async fn debug_hub_state(State(state): State<Arc<AppState>>) -> Json<HubStatsDto> {
    Json(state.hub.stats().into())
}

/// Health check endpoint
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Presence of the users listed in `user_ids`, in request order
pub async fn get_presence(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PresenceQuery>,
) -> Result<Json<Vec<PresenceDto>>, StatusCode> {
    let user_ids = query
        .user_ids
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse::<UserId>)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| {
            tracing::debug!("Invalid presence query: {}", e);
            StatusCode::BAD_REQUEST
        })?;

    // Read model から DTO への変換
    let presence = state
        .presence
        .get_room_presence(&user_ids)
        .into_iter()
        .map(PresenceDto::from)
        .collect();
    Ok(Json(presence))
}

/// Users currently online in one room
pub async fn get_room_presence(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
) -> Result<Json<RoomPresenceDto>, StatusCode> {
    let room_id = room_id.parse::<RoomId>().map_err(|e| {
        tracing::debug!("Invalid room id: {}", e);
        StatusCode::BAD_REQUEST
    })?;

    let online = state.presence.online_in_room(&room_id);
    Ok(Json(RoomPresenceDto::new(room_id, &online)))
}
