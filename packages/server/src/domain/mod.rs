//! Domain layer for the real-time hub.
//!
//! Identifiers, domain events, and the contracts the hub consumes (event bus
//! and transport). Nothing here depends on axum or on the hub itself.

pub mod error;
pub mod event;
pub mod transport;
pub mod value_object;

pub use error::{EventBusError, EventHandlerError, TransportError, ValueObjectError};
pub use event::{DomainEvent, EventBus, EventHandler, EventMetadata};
pub use transport::{InboundFrame, TransportReader, TransportWriter};
pub use value_object::{ConnectionId, RoomId, UserId};
