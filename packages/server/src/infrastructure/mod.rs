//! Infrastructure layer: wire formats and adapters.

pub mod dto;
pub mod event_bus;
pub mod transport;
