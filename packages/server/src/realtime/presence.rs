//! Presence read model over the hub's user index.
//!
//! Online/offline transitions are pushed to rooms by the hub itself; this
//! service only answers "is this user attached right now".

use serde::Serialize;

use crate::{
    domain::{RoomId, UserId},
    realtime::hub::Hub,
};

/// Presence of one user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UserPresence {
    pub user_id: UserId,
    pub is_online: bool,
}

#[derive(Clone)]
pub struct PresenceService {
    hub: Hub,
}

impl PresenceService {
    pub fn new(hub: Hub) -> Self {
        Self { hub }
    }

    /// Presence of each requested user, in request order
    pub fn get_room_presence(&self, members: &[UserId]) -> Vec<UserPresence> {
        let online = self.hub.room_presence(members);
        members
            .iter()
            .map(|user_id| UserPresence {
                user_id: *user_id,
                is_online: online.get(user_id).copied().unwrap_or(false),
            })
            .collect()
    }

    /// Users with at least one connection subscribed to `room_id`
    pub fn online_in_room(&self, room_id: &RoomId) -> Vec<UserId> {
        self.hub.online_users_in_room(room_id)
    }
}
