//! The hub's indexes.
//!
//! Only the coordinator mutates a `HubIndex`, one command at a time, under the
//! hub's write lock. Between two mutations:
//!
//! - every id in `by_user` and `by_room` is present in `connections`
//! - `by_room[r]` contains `c` iff `r` is in `c`'s room set
//! - no entry of `by_user`, `by_room` or `announced` is an empty set
//! - `announced[u]` is exactly the set of rooms holding a connection of `u`

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use crate::{
    domain::{ConnectionId, RoomId, UserId},
    realtime::connection::Connection,
};

/// An online/offline edge for one user in one room
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PresenceChange {
    pub room_id: RoomId,
    pub user_id: UserId,
    pub is_online: bool,
}

/// Result of removing a connection
#[derive(Debug)]
pub(crate) struct Removal {
    pub connection: Arc<Connection>,
    pub changes: Vec<PresenceChange>,
}

#[derive(Debug, Default)]
pub(crate) struct HubIndex {
    connections: HashMap<ConnectionId, Arc<Connection>>,
    by_user: HashMap<UserId, HashSet<ConnectionId>>,
    by_room: HashMap<RoomId, HashSet<ConnectionId>>,
    /// Rooms each online user has been announced in; withdrawn silently once
    /// none of the user's connections remain in the room
    announced: HashMap<UserId, HashSet<RoomId>>,
}

impl HubIndex {
    /// Index a connection together with any rooms it already holds.
    ///
    /// Returns `None` when the connection is already registered.
    pub fn insert(&mut self, connection: Arc<Connection>) -> Option<Vec<PresenceChange>> {
        let id = connection.id();
        if self.connections.contains_key(&id) {
            return None;
        }

        let user_id = connection.user_id();
        let rooms = connection.rooms();
        self.connections.insert(id, connection);
        self.by_user.entry(user_id).or_default().insert(id);

        let mut changes = Vec::new();
        for room_id in rooms {
            self.by_room.entry(room_id).or_default().insert(id);
            changes.extend(self.announce(user_id, room_id));
        }
        Some(changes)
    }

    /// Remove a connection from every index.
    ///
    /// Returns `None` when the connection is not registered.
    pub fn remove(&mut self, id: &ConnectionId) -> Option<Removal> {
        let connection = self.connections.remove(id)?;
        let user_id = connection.user_id();

        for room_id in connection.rooms() {
            remove_member(&mut self.by_room, &room_id, id);
        }

        let last_for_user = remove_member(&mut self.by_user, &user_id, id);
        let changes = if last_for_user {
            let mut rooms: Vec<RoomId> = self
                .announced
                .remove(&user_id)
                .map(|rooms| rooms.into_iter().collect())
                .unwrap_or_default();
            rooms.sort();
            rooms
                .into_iter()
                .map(|room_id| PresenceChange {
                    room_id,
                    user_id,
                    is_online: false,
                })
                .collect()
        } else {
            for room_id in connection.rooms() {
                self.withdraw(user_id, &room_id);
            }
            Vec::new()
        };

        Some(Removal {
            connection,
            changes,
        })
    }

    /// Subscribe a registered connection to a room.
    ///
    /// Returns `None` when the connection is not registered.
    pub fn join(&mut self, id: &ConnectionId, room_id: RoomId) -> Option<Vec<PresenceChange>> {
        let connection = self.connections.get(id)?;
        let user_id = connection.user_id();
        connection.add_room(room_id);
        self.by_room.entry(room_id).or_default().insert(*id);
        Some(self.announce(user_id, room_id).into_iter().collect())
    }

    /// Unsubscribe a connection from a room; `false` if it was not joined.
    ///
    /// Leaving emits nothing, but once the user has no connection left in the
    /// room its announcement is withdrawn so a later join announces again.
    pub fn leave(&mut self, id: &ConnectionId, room_id: &RoomId) -> bool {
        let Some(connection) = self.connections.get(id) else {
            return false;
        };
        let user_id = connection.user_id();
        if !connection.remove_room(room_id) {
            return false;
        }
        remove_member(&mut self.by_room, room_id, id);
        self.withdraw(user_id, room_id);
        true
    }

    /// Drain every connection and reset all indexes
    pub fn clear(&mut self) -> Vec<Arc<Connection>> {
        self.by_user.clear();
        self.by_room.clear();
        self.announced.clear();
        self.connections.drain().map(|(_, c)| c).collect()
    }

    pub fn room_members(&self, room_id: &RoomId) -> Vec<Arc<Connection>> {
        self.resolve(self.by_room.get(room_id))
    }

    pub fn user_connections(&self, user_id: &UserId) -> Vec<Arc<Connection>> {
        self.resolve(self.by_user.get(user_id))
    }

    pub fn all_connections(&self) -> Vec<Arc<Connection>> {
        self.connections.values().cloned().collect()
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.connections.contains_key(id)
    }

    pub fn is_online(&self, user_id: &UserId) -> bool {
        self.by_user.contains_key(user_id)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn user_count(&self) -> usize {
        self.by_user.len()
    }

    pub fn room_count(&self) -> usize {
        self.by_room.len()
    }

    fn announce(&mut self, user_id: UserId, room_id: RoomId) -> Option<PresenceChange> {
        self.announced
            .entry(user_id)
            .or_default()
            .insert(room_id)
            .then_some(PresenceChange {
                room_id,
                user_id,
                is_online: true,
            })
    }

    fn withdraw(&mut self, user_id: UserId, room_id: &RoomId) {
        if self.user_in_room(&user_id, room_id) {
            return;
        }
        if let Some(rooms) = self.announced.get_mut(&user_id) {
            rooms.remove(room_id);
            if rooms.is_empty() {
                self.announced.remove(&user_id);
            }
        }
    }

    fn user_in_room(&self, user_id: &UserId, room_id: &RoomId) -> bool {
        self.by_room.get(room_id).is_some_and(|ids| {
            ids.iter().any(|id| {
                self.connections
                    .get(id)
                    .is_some_and(|c| c.user_id() == *user_id)
            })
        })
    }

    fn resolve(&self, ids: Option<&HashSet<ConnectionId>>) -> Vec<Arc<Connection>> {
        ids.map(|ids| {
            ids.iter()
                .filter_map(|id| self.connections.get(id).cloned())
                .collect()
        })
        .unwrap_or_default()
    }

    /// Verify the cross-index invariants
    #[cfg(test)]
    pub fn check_invariants(&self) -> Result<(), String> {
        for (user_id, ids) in &self.by_user {
            if ids.is_empty() {
                return Err(format!("empty user entry {}", user_id));
            }
            for id in ids {
                let connection = self
                    .connections
                    .get(id)
                    .ok_or_else(|| format!("by_user references unknown connection {}", id))?;
                if connection.user_id() != *user_id {
                    return Err(format!("connection {} filed under wrong user", id));
                }
            }
        }
        for (room_id, ids) in &self.by_room {
            if ids.is_empty() {
                return Err(format!("empty room entry {}", room_id));
            }
            for id in ids {
                let connection = self
                    .connections
                    .get(id)
                    .ok_or_else(|| format!("by_room references unknown connection {}", id))?;
                if !connection.is_in_room(room_id) {
                    return Err(format!("{} in by_room[{}] but not in its room set", id, room_id));
                }
            }
        }
        for (id, connection) in &self.connections {
            if !self
                .by_user
                .get(&connection.user_id())
                .is_some_and(|ids| ids.contains(id))
            {
                return Err(format!("connection {} missing from by_user", id));
            }
            for room_id in connection.rooms() {
                if !self
                    .by_room
                    .get(&room_id)
                    .is_some_and(|ids| ids.contains(id))
                {
                    return Err(format!("{} holds room {} but is not in by_room", id, room_id));
                }
            }
        }
        for (user_id, rooms) in &self.announced {
            if rooms.is_empty() {
                return Err(format!("empty announcement entry {}", user_id));
            }
            if !self.by_user.contains_key(user_id) {
                return Err(format!("offline user {} still announced", user_id));
            }
            for room_id in rooms {
                if !self.user_in_room(user_id, room_id) {
                    return Err(format!("{} announced in {} without a connection there", user_id, room_id));
                }
            }
        }
        for (room_id, ids) in &self.by_room {
            for id in ids {
                if let Some(connection) = self.connections.get(id) {
                    let user_id = connection.user_id();
                    if !self.announced.get(&user_id).is_some_and(|rooms| rooms.contains(room_id)) {
                        return Err(format!("{} in {} but not announced", user_id, room_id));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Remove `id` from `map[key]`, dropping the entry once empty.
///
/// Returns `true` when the entry was dropped.
fn remove_member<K: std::hash::Hash + Eq>(
    map: &mut HashMap<K, HashSet<ConnectionId>>,
    key: &K,
    id: &ConnectionId,
) -> bool {
    let Some(ids) = map.get_mut(key) else {
        return false;
    };
    ids.remove(id);
    if ids.is_empty() {
        map.remove(key);
        return true;
    }
    false
}
