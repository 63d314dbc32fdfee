//! Request handlers.

mod http;
mod websocket;

pub use http::{debug_hub_state, get_presence, get_room_presence, health_check};
pub use websocket::websocket_handler;
