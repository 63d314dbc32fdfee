//! Conversion logic between read models and HTTP DTOs.

use crate::{
    domain::{RoomId, UserId},
    infrastructure::dto::http as dto,
    realtime::{HubStats, UserPresence},
};

// ========================================
// Read model → DTO
// ========================================

impl From<UserPresence> for dto::PresenceDto {
    fn from(model: UserPresence) -> Self {
        Self {
            user_id: model.user_id.to_string(),
            is_online: model.is_online,
        }
    }
}

impl From<HubStats> for dto::HubStatsDto {
    fn from(model: HubStats) -> Self {
        Self {
            state: model.state.to_string(),
            connections: model.connections,
            users: model.users,
            rooms: model.rooms,
            dropped_frames: model.dropped_frames,
        }
    }
}

impl dto::RoomPresenceDto {
    pub fn new(room_id: RoomId, online: &[UserId]) -> Self {
        Self {
            chat_id: room_id.to_string(),
            online_user_ids: online.iter().map(UserId::to_string).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::HubState;

    #[test]
    fn test_hub_stats_to_dto() {
        // テスト項目: HubStats から HubStatsDto への変換
        // given (前提条件):
        let stats = HubStats {
            state: HubState::Running,
            connections: 3,
            users: 2,
            rooms: 1,
            dropped_frames: 7,
        };

        // when (操作):
        let dto = dto::HubStatsDto::from(stats);

        // then (期待する結果):
        assert_eq!(dto.state, "running");
        assert_eq!((dto.connections, dto.users, dto.rooms), (3, 2, 1));
        assert_eq!(dto.dropped_frames, 7);
    }

    #[test]
    fn test_room_presence_dto_renders_ids() {
        // テスト項目: RoomPresenceDto は ID を文字列で保持する
        // given (前提条件):
        let room = RoomId::generate();
        let user = UserId::generate();

        // when (操作):
        let dto = dto::RoomPresenceDto::new(room, &[user]);

        // then (期待する結果):
        assert_eq!(dto.chat_id, room.to_string());
        assert_eq!(dto.online_user_ids, vec![user.to_string()]);
    }
}
