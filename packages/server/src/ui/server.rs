//! Server execution logic.

use std::{future::Future, sync::Arc};

use axum::{Router, routing::get};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::{
    config::ConfigError,
    domain::EventBusError,
    realtime::{Broadcaster, Hub, PresenceService},
};

use super::{
    handler::{debug_hub_state, get_presence, get_room_presence, health_check, websocket_handler},
    signal::shutdown_signal,
    state::AppState,
};

/// Errors that stop the server
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to start broadcaster: {0}")]
    EventBus(#[from] EventBusError),
}

/// Real-time hub server
///
/// Owns the hub's lifecycle: the coordinator is started before the listener
/// accepts connections and stopped (closing every connection) once the
/// shutdown signal fires.
///
/// # Example
///
/// ```ignore
/// let hub = Hub::new(config);
/// let broadcaster = Arc::new(Broadcaster::new(hub.clone(), bus, event_types));
/// let presence = PresenceService::new(hub.clone());
/// Server::new(hub, broadcaster, presence).run("127.0.0.1".to_string(), 8080).await?;
/// ```
pub struct Server {
    /// Hub（接続・ルーム・配信のコーディネータ）
    hub: Hub,
    /// Broadcaster（ドメインイベント → ハブの橋渡し）
    broadcaster: Arc<Broadcaster>,
    /// PresenceService（オンライン状態の読み取りモデル）
    presence: PresenceService,
}

impl Server {
    pub fn new(hub: Hub, broadcaster: Arc<Broadcaster>, presence: PresenceService) -> Self {
        Self {
            hub,
            broadcaster,
            presence,
        }
    }

    /// Build the router with every endpoint
    pub fn router(&self) -> Router {
        let app_state = Arc::new(AppState {
            hub: self.hub.clone(),
            presence: self.presence.clone(),
        });

        Router::new()
            // WebSocket エンドポイント
            .route("/ws", get(websocket_handler))
            // HTTP エンドポイント
            .route("/debug/hub", get(debug_hub_state))
            .route("/api/health", get(health_check))
            .route("/api/presence", get(get_presence))
            .route("/api/rooms/{room_id}/presence", get(get_room_presence))
            .layer(TraceLayer::new_for_http())
            .with_state(app_state)
    }

    /// Run the server on `host:port` until Ctrl+C or SIGTERM
    pub async fn run(self, host: String, port: u16) -> Result<(), ServerError> {
        self.hub.config().validate()?;

        // Bind the server to the host and port
        let bind_addr = format!("{}:{}", host, port);
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: bind_addr.clone(),
                source,
            })?;

        tracing::info!("Real-time hub listening on {}", listener.local_addr()?);
        tracing::info!("Connect to: ws://{}/ws?user_id=<uuid>", bind_addr);
        tracing::info!("Press Ctrl+C to shutdown gracefully");

        self.serve(listener, shutdown_signal()).await
    }

    /// Serve on an already-bound listener until `shutdown` resolves
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), ServerError> {
        let cancel = CancellationToken::new();
        let hub_task = tokio::spawn({
            let hub = self.hub.clone();
            let cancel = cancel.clone();
            async move { hub.run(cancel).await }
        });

        if let Err(e) = self.broadcaster.start().await {
            cancel.cancel();
            let _ = hub_task.await;
            return Err(e.into());
        }

        let app = self.router();
        let hub = self.hub.clone();
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown.await;
                // close every connection before the listener drains
                hub.stop().await;
            })
            .await;

        cancel.cancel();
        if let Err(e) = hub_task.await {
            tracing::error!("Hub task failed: {}", e);
        }
        result?;

        tracing::info!("Server shutdown complete");
        Ok(())
    }
}
