//! インメモリのドメインイベントバス
//!
//! ## 責務
//!
//! - イベント種別ごとのハンドラ登録（`EventBus::subscribe`）
//! - イベントの発行（`publish`）：登録順にハンドラを await する
//! - 停止（`shutdown`）：実行中ハンドラのキャンセルと、以降の発行・登録の拒否
//!
//! ## 設計ノート
//!
//! ハンドラのエラーはログに記録するだけで、発行側には伝播しません。
//! 各ハンドラにはバスのトークンから派生した子トークンが渡されます。

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use crate::domain::{DomainEvent, EventBus, EventBusError, EventHandler};

#[derive(Default)]
pub struct InMemoryEventBus {
    /// Key: event type, Value: handlers in subscription order
    handlers: RwLock<HashMap<String, Vec<Arc<dyn EventHandler>>>>,
    shutdown: CancellationToken,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatch `event` to every handler of its kind.
    ///
    /// Returns the number of handlers that completed without error.
    pub async fn publish(&self, event: &DomainEvent) -> Result<usize, EventBusError> {
        if self.shutdown.is_cancelled() {
            return Err(EventBusError::ShutDown);
        }

        let handlers = self
            .handlers
            .read()
            .get(&event.event_type)
            .cloned()
            .unwrap_or_default();
        if handlers.is_empty() {
            tracing::debug!(event_type = %event.event_type, "No handlers for event");
            return Ok(0);
        }

        let mut handled = 0;
        for handler in handlers {
            match handler.handle(self.shutdown.child_token(), event).await {
                Ok(()) => handled += 1,
                Err(e) => tracing::warn!(
                    event_type = %event.event_type,
                    aggregate_id = %event.aggregate_id,
                    "Event handler failed: {}",
                    e
                ),
            }
        }
        Ok(handled)
    }

    /// Cancel outstanding handlers and refuse further publishes
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        tracing::info!("Event bus shut down");
    }

    pub fn handler_count(&self, event_type: &str) -> usize {
        self.handlers.read().get(event_type).map_or(0, Vec::len)
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn subscribe(
        &self,
        event_type: &str,
        handler: Arc<dyn EventHandler>,
    ) -> Result<(), EventBusError> {
        if self.shutdown.is_cancelled() {
            return Err(EventBusError::ShutDown);
        }
        self.handlers
            .write()
            .entry(event_type.to_string())
            .or_default()
            .push(handler);
        tracing::debug!("Handler subscribed to '{}'", event_type);
        Ok(())
    }
}
