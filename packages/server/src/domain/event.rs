//! Domain events and the event-bus contract.
//!
//! ## 責務
//!
//! - Describe the event object produced elsewhere in the system (chats,
//!   messages, tasks, notifications) as the hub sees it
//! - Define the single operation the hub needs from a bus: register a handler
//!   for a named event kind
//!
//! The bus itself lives outside the hub. `infrastructure::event_bus` carries
//! an in-memory implementation for single-process deployments.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{
    error::{EventBusError, EventHandlerError},
    value_object::UserId,
};

/// Metadata attached to every domain event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventMetadata {
    /// User the event concerns (for notifications: the recipient)
    pub user_id: Option<UserId>,
    pub correlation_id: Option<String>,
    pub causation_id: Option<String>,
}

/// A domain event as published on the bus
#[derive(Debug, Clone, PartialEq)]
pub struct DomainEvent {
    /// Event kind, e.g. `message.sent`
    pub event_type: String,
    pub aggregate_id: Uuid,
    /// Aggregate kind, e.g. `chat`, `message`, `task`
    pub aggregate_type: String,
    pub occurred_at: DateTime<Utc>,
    pub version: i64,
    pub metadata: EventMetadata,
    /// Raw JSON payload, when the producer attached one
    pub payload: Option<Vec<u8>>,
}

impl DomainEvent {
    /// Create an event stamped with the current time and version 1
    pub fn new(
        event_type: impl Into<String>,
        aggregate_id: Uuid,
        aggregate_type: impl Into<String>,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            occurred_at: flowra_shared::time::now_utc(),
            version: 1,
            metadata: EventMetadata::default(),
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    pub fn with_user(mut self, user_id: UserId) -> Self {
        self.metadata.user_id = Some(user_id);
        self
    }

    pub fn with_version(mut self, version: i64) -> Self {
        self.version = version;
        self
    }

    /// Look up the first string field of the payload object among `keys`.
    ///
    /// Returns `None` when there is no payload, the payload is not a JSON
    /// object, or none of the keys holds a string.
    pub fn payload_str(&self, keys: &[&str]) -> Option<String> {
        let payload = self.payload.as_deref()?;
        let value: serde_json::Value = serde_json::from_slice(payload).ok()?;
        let object = value.as_object()?;
        keys.iter()
            .find_map(|key| object.get(*key).and_then(|v| v.as_str()))
            .map(str::to_string)
    }
}

/// A handler registered for one event kind
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle one event. `cancel` is the per-event signal propagated from the
    /// bus; handlers must not outlive it.
    async fn handle(
        &self,
        cancel: CancellationToken,
        event: &DomainEvent,
    ) -> Result<(), EventHandlerError>;
}

/// The domain-event bus contract consumed by the broadcaster
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Register `handler` for events of kind `event_type`
    async fn subscribe(
        &self,
        event_type: &str,
        handler: Arc<dyn EventHandler>,
    ) -> Result<(), EventBusError>;
}
