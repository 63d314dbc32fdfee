//! Real-time fan-out hub server.
//!
//! Accepts WebSocket clients on `/ws?user_id=<uuid>`, tracks their room
//! subscriptions and presence, and forwards domain events to them.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin flowra-realtime
//! cargo run --bin flowra-realtime -- --host 0.0.0.0 --port 3000 --send-buffer 512
//! ```

use std::{sync::Arc, time::Duration};

use clap::Parser;
use flowra_realtime::{
    config::{DEFAULT_EVENT_TYPES, HubConfig},
    infrastructure::event_bus::InMemoryEventBus,
    realtime::{Broadcaster, Hub, PresenceService},
    ui::Server,
};
use flowra_shared::logger::setup_logger;

#[derive(Parser, Debug)]
#[command(name = "flowra-realtime")]
#[command(about = "Real-time fan-out hub for WebSocket clients", long_about = None)]
struct Args {
    /// Host address to bind the server to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port number to bind the server to
    #[arg(short = 'p', long, default_value = "8080")]
    port: u16,

    /// WebSocket read buffer size in bytes
    #[arg(long, default_value = "1024")]
    read_buffer_size: usize,

    /// WebSocket write buffer size in bytes
    #[arg(long, default_value = "1024")]
    write_buffer_size: usize,

    /// Seconds between liveness pings
    #[arg(long, default_value = "30")]
    ping_interval_secs: u64,

    /// Seconds a peer may stay silent before it is disconnected
    #[arg(long, default_value = "60")]
    pong_wait_secs: u64,

    /// Seconds allowed for a single write
    #[arg(long, default_value = "10")]
    write_wait_secs: u64,

    /// Largest inbound message in bytes
    #[arg(long, default_value = "65536")]
    max_message_size: usize,

    /// Per-connection outbound queue capacity in frames
    #[arg(long, default_value = "256")]
    send_buffer: usize,

    /// Hub broadcast channel capacity in frames
    #[arg(long, default_value = "256")]
    broadcast_buffer: usize,

    /// Seconds allowed for draining pending commands on shutdown
    #[arg(long, default_value = "5")]
    shutdown_timeout_secs: u64,

    /// Domain event kinds to forward (comma separated)
    #[arg(long, value_delimiter = ',')]
    event_types: Option<Vec<String>>,
}

impl Args {
    fn hub_config(&self) -> HubConfig {
        HubConfig {
            read_buffer_size: self.read_buffer_size,
            write_buffer_size: self.write_buffer_size,
            ping_interval: Duration::from_secs(self.ping_interval_secs),
            pong_wait: Duration::from_secs(self.pong_wait_secs),
            write_wait: Duration::from_secs(self.write_wait_secs),
            max_message_size: self.max_message_size,
            send_buffer: self.send_buffer,
            broadcast_buffer: self.broadcast_buffer,
            event_types: self.event_types.clone().unwrap_or_else(|| {
                DEFAULT_EVENT_TYPES.iter().map(|s| s.to_string()).collect()
            }),
            shutdown_timeout: Duration::from_secs(self.shutdown_timeout_secs),
        }
    }
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), "info");

    let args = Args::parse();
    let config = args.hub_config();
    if let Err(e) = config.validate() {
        tracing::error!("Invalid configuration: {}", e);
        std::process::exit(1);
    }

    // Initialize dependencies in order:
    // 1. Event bus
    // 2. Hub
    // 3. Broadcaster / PresenceService
    // 4. Server

    // 1. Create the event bus (in-process)
    let bus = Arc::new(InMemoryEventBus::new());

    // 2. Create the hub
    let event_types = config.event_types.clone();
    let hub = Hub::new(config);

    // 3. Create the broadcaster and presence service
    let broadcaster = Arc::new(Broadcaster::new(hub.clone(), bus.clone(), event_types));
    let presence = PresenceService::new(hub.clone());

    // 4. Create and run the server
    let server = Server::new(hub, broadcaster, presence);
    let result = server.run(args.host, args.port).await;
    bus.shutdown();

    if let Err(e) = result {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
