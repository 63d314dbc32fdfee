//! Real-time fan-out hub library.
//!
//! This library provides the connection lifecycle, room membership, presence
//! and domain-event broadcasting for Flowra's WebSocket clients.

// layers
pub mod domain;
pub mod infrastructure;
pub mod realtime;
pub mod ui;

pub mod config;
