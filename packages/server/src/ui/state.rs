//! Shared application state.

use crate::realtime::{Hub, PresenceService};

/// Shared application state
pub struct AppState {
    /// Hub（接続・ルーム・配信のコーディネータ）
    pub hub: Hub,
    /// PresenceService（オンライン状態の読み取りモデル）
    pub presence: PresenceService,
}
