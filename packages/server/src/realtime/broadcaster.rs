//! Domain events → hub routing.
//!
//! ## 責務
//!
//! - Subscribe to the configured domain-event kinds on the bus (once)
//! - Map each kind to the outbound `type` clients receive and to a route
//! - Resolve the target room or user and hand the serialized frame to the hub
//!
//! Events whose target cannot be resolved are dropped with a debug log.

use std::{collections::HashSet, sync::Arc};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::value::RawValue;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    domain::{
        DomainEvent, EventBus, EventBusError, EventHandler, EventHandlerError, RoomId, UserId,
    },
    infrastructure::dto::websocket::EventMessage,
    realtime::hub::Hub,
};

/// How the target of an event is resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventRoute {
    /// The aggregate id is the room
    Room,
    /// The aggregate id when the aggregate is a chat or message, otherwise the
    /// payload's `chat_id` / `ChatID`
    TaskRoom,
    /// Metadata `user_id`, falling back to the payload's `user_id`
    User,
}

/// Outbound type and route for one domain-event kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventMapping {
    pub outbound_type: &'static str,
    pub route: EventRoute,
}

impl EventMapping {
    /// Mapping for `event_type`; `None` for kinds the hub does not forward
    pub fn for_event(event_type: &str) -> Option<Self> {
        let (outbound_type, route) = match event_type {
            "message.sent" => ("message.new", EventRoute::Room),
            "message.created" => ("chat.message.posted", EventRoute::Room),
            "message.updated" => ("message.updated", EventRoute::Room),
            "message.deleted" => ("message.deleted", EventRoute::Room),
            "chat.created" => ("chat.created", EventRoute::Room),
            "chat.updated" => ("chat.updated", EventRoute::Room),
            "chat.deleted" => ("chat.deleted", EventRoute::Room),
            "chat.member_added" => ("chat.member_added", EventRoute::Room),
            "chat.member_removed" => ("chat.member_removed", EventRoute::Room),
            "task.created" => ("task.created", EventRoute::TaskRoom),
            "task.updated" | "task.status_changed" | "task.assigned" => {
                ("task.updated", EventRoute::TaskRoom)
            }
            "notification.created" => ("notification.new", EventRoute::User),
            _ => return None,
        };
        Some(Self {
            outbound_type,
            route,
        })
    }
}

pub struct Broadcaster {
    hub: Hub,
    bus: Arc<dyn EventBus>,
    event_types: Vec<String>,
    /// Kinds already subscribed; makes `start` idempotent
    subscribed: tokio::sync::Mutex<HashSet<String>>,
}

impl Broadcaster {
    pub fn new(hub: Hub, bus: Arc<dyn EventBus>, event_types: Vec<String>) -> Self {
        Self {
            hub,
            bus,
            event_types,
            subscribed: tokio::sync::Mutex::new(HashSet::new()),
        }
    }

    /// Subscribe a routing handler for every configured kind.
    ///
    /// Calling `start` again subscribes nothing new for kinds that are already
    /// subscribed.
    pub async fn start(&self) -> Result<(), EventBusError> {
        let mut subscribed = self.subscribed.lock().await;

        for event_type in &self.event_types {
            if subscribed.contains(event_type) {
                continue;
            }
            let Some(mapping) = EventMapping::for_event(event_type) else {
                tracing::warn!("No mapping for event type '{}', skipping", event_type);
                continue;
            };

            let handler = Arc::new(EventRouter {
                hub: self.hub.clone(),
                mapping,
            });
            self.bus.subscribe(event_type, handler).await?;
            subscribed.insert(event_type.clone());
            tracing::debug!(
                "Subscribed to '{}' (outbound type '{}')",
                event_type,
                mapping.outbound_type
            );
        }

        tracing::info!("Broadcaster subscribed to {} event types", subscribed.len());
        Ok(())
    }
}

/// Handler registered on the bus for one event kind
struct EventRouter {
    hub: Hub,
    mapping: EventMapping,
}

#[async_trait]
impl EventHandler for EventRouter {
    async fn handle(
        &self,
        cancel: CancellationToken,
        event: &DomainEvent,
    ) -> Result<(), EventHandlerError> {
        if cancel.is_cancelled() {
            return Err(EventHandlerError::Cancelled);
        }

        tracing::debug!(
            event_type = %event.event_type,
            aggregate_id = %event.aggregate_id,
            correlation_id = ?event.metadata.correlation_id,
            "Routing domain event as '{}'",
            self.mapping.outbound_type
        );
        let data = event_data(event)?;
        match self.mapping.route {
            EventRoute::Room | EventRoute::TaskRoom => {
                let Some(room_id) = self.resolve_room(event) else {
                    tracing::debug!(
                        event_type = %event.event_type,
                        aggregate_id = %event.aggregate_id,
                        "Could not resolve room, dropping event"
                    );
                    return Ok(());
                };
                let frame = EventMessage {
                    r#type: self.mapping.outbound_type,
                    chat_id: Some(room_id),
                    data: &data,
                }
                .to_frame()
                .map_err(|e| EventHandlerError::Encode(e.to_string()))?;
                self.hub.broadcast_to_room(room_id, frame);
            }
            EventRoute::User => {
                let Some(user_id) = resolve_user(event) else {
                    tracing::debug!(
                        event_type = %event.event_type,
                        aggregate_id = %event.aggregate_id,
                        "Could not resolve user, dropping event"
                    );
                    return Ok(());
                };
                let frame = EventMessage {
                    r#type: self.mapping.outbound_type,
                    chat_id: None,
                    data: &data,
                }
                .to_frame()
                .map_err(|e| EventHandlerError::Encode(e.to_string()))?;
                self.hub.send_to_user(user_id, frame);
            }
        }
        Ok(())
    }
}

impl EventRouter {
    fn resolve_room(&self, event: &DomainEvent) -> Option<RoomId> {
        let aggregate_is_room = match self.mapping.route {
            EventRoute::Room => true,
            EventRoute::TaskRoom => matches!(event.aggregate_type.as_str(), "chat" | "message"),
            EventRoute::User => false,
        };
        if aggregate_is_room {
            return RoomId::new(event.aggregate_id).ok();
        }
        event.payload_str(&["chat_id", "ChatID"])?.parse().ok()
    }
}

fn resolve_user(event: &DomainEvent) -> Option<UserId> {
    event
        .metadata
        .user_id
        .or_else(|| event.payload_str(&["user_id"])?.parse().ok())
}

/// Fields sent when an event carries no usable payload
#[derive(Serialize)]
struct EventSummary<'a> {
    aggregate_id: Uuid,
    aggregate_type: &'a str,
    occurred_at: String,
    version: i64,
}

/// The event's raw JSON payload, or a summary of the event
fn event_data(event: &DomainEvent) -> Result<Box<RawValue>, EventHandlerError> {
    if let Some(payload) = event.payload.as_deref() {
        match serde_json::from_slice::<Box<RawValue>>(payload) {
            Ok(raw) => return Ok(raw),
            Err(e) => tracing::debug!(
                event_type = %event.event_type,
                "Payload is not JSON, sending summary instead: {}",
                e
            ),
        }
    }

    let summary = EventSummary {
        aggregate_id: event.aggregate_id,
        aggregate_type: &event.aggregate_type,
        occurred_at: flowra_shared::time::to_rfc3339(&event.occurred_at),
        version: event.version,
    };
    serde_json::value::to_raw_value(&summary).map_err(|e| EventHandlerError::Encode(e.to_string()))
}
