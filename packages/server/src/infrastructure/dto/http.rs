//! HTTP API DTOs.

use serde::{Deserialize, Serialize};

/// Query for `GET /api/presence`
#[derive(Debug, Deserialize)]
pub struct PresenceQuery {
    /// Comma-separated user ids
    pub user_ids: String,
}

/// Presence of one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceDto {
    pub user_id: String,
    pub is_online: bool,
}

/// Users currently online in a room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomPresenceDto {
    pub chat_id: String,
    pub online_user_ids: Vec<String>,
}

/// Hub state and counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubStatsDto {
    pub state: String,
    pub connections: usize,
    pub users: usize,
    pub rooms: usize,
    pub dropped_frames: u64,
}
