//! Data Transfer Objects (DTOs) for the real-time hub.
//!
//! DTOs are organized by protocol:
//! - `websocket`: client and server envelopes carried over WebSocket
//! - `http`: HTTP API response DTOs
//! - `conversion`: read models → HTTP DTOs

pub mod conversion;
pub mod http;
pub mod websocket;
