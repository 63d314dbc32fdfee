//! Domain errors.

use thiserror::Error;

/// Errors raised when constructing value objects
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueObjectError {
    /// The nil identifier is reserved for "unset"
    #[error("{kind} must not be the nil identifier")]
    NilId { kind: &'static str },

    /// The value is not a canonical UUID string
    #[error("invalid {kind}: '{value}'")]
    InvalidId { kind: &'static str, value: String },
}

/// Errors reported by a transport half
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The peer or the local side already closed the transport
    #[error("transport closed")]
    Closed,

    /// A read or write deadline fired
    #[error("{0} deadline exceeded")]
    Deadline(&'static str),

    /// Underlying I/O or protocol failure
    #[error("transport I/O error: {0}")]
    Io(String),
}

/// Errors reported by a domain-event bus
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventBusError {
    /// The bus no longer accepts subscriptions
    #[error("event bus is shut down")]
    ShutDown,

    /// Subscription rejected by the bus implementation
    #[error("failed to subscribe to '{event_type}': {reason}")]
    SubscribeFailed { event_type: String, reason: String },
}

/// Errors returned by a domain-event handler
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventHandlerError {
    /// The handler gave up because its cancellation signal fired
    #[error("event handling cancelled")]
    Cancelled,

    /// The event could not be turned into an outbound frame
    #[error("failed to encode outbound frame: {0}")]
    Encode(String),
}
