//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use flowra_realtime::{
    config::HubConfig,
    domain::{InboundFrame, TransportError, TransportReader, TransportWriter, UserId},
    realtime::{Connection, Hub, OutboundReceiver, serve_connection},
};
use serde_json::Value;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;

pub const RECV_TIMEOUT: Duration = Duration::from_secs(2);
pub const QUIET_PERIOD: Duration = Duration::from_millis(150);

/// What the server wrote to a channel transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Written {
    Text(String),
    Ping,
    Close,
}

pub struct ChannelReader {
    rx: mpsc::UnboundedReceiver<InboundFrame>,
}

pub struct ChannelWriter {
    tx: mpsc::UnboundedSender<Written>,
}

#[async_trait]
impl TransportReader for ChannelReader {
    async fn read_frame(&mut self) -> Result<Option<InboundFrame>, TransportError> {
        Ok(self.rx.recv().await)
    }
}

#[async_trait]
impl TransportWriter for ChannelWriter {
    async fn write_text(&mut self, text: &str) -> Result<(), TransportError> {
        self.tx
            .send(Written::Text(text.to_string()))
            .map_err(|_| TransportError::Closed)
    }

    async fn write_ping(&mut self) -> Result<(), TransportError> {
        self.tx.send(Written::Ping).map_err(|_| TransportError::Closed)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.tx.send(Written::Close).map_err(|_| TransportError::Closed)
    }
}

/// A writer whose peer never drains the socket: every write hangs
pub struct StalledWriter;

#[async_trait]
impl TransportWriter for StalledWriter {
    async fn write_text(&mut self, _text: &str) -> Result<(), TransportError> {
        std::future::pending().await
    }

    async fn write_ping(&mut self) -> Result<(), TransportError> {
        std::future::pending().await
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        std::future::pending().await
    }
}

/// The client side of a channel transport
pub struct Peer {
    pub to_server: mpsc::UnboundedSender<InboundFrame>,
    pub from_server: mpsc::UnboundedReceiver<Written>,
}

impl Peer {
    pub fn send_text(&self, text: &str) {
        self.to_server
            .send(InboundFrame::Text(text.to_string()))
            .unwrap();
    }

    pub fn send_json(&self, value: Value) {
        self.send_text(&value.to_string());
    }

    pub fn send(&self, frame: InboundFrame) {
        self.to_server.send(frame).unwrap();
    }

    /// Next text frame as JSON, skipping pings
    pub async fn next_json(&mut self) -> Value {
        loop {
            let written = tokio::time::timeout(RECV_TIMEOUT, self.from_server.recv())
                .await
                .expect("timed out waiting for a frame")
                .expect("transport dropped");
            match written {
                Written::Text(text) => return serde_json::from_str(&text).unwrap(),
                Written::Ping => continue,
                Written::Close => panic!("transport closed while waiting for a frame"),
            }
        }
    }

    /// Wait for the close frame, skipping anything written before it
    pub async fn expect_close(&mut self) {
        loop {
            let written = tokio::time::timeout(RECV_TIMEOUT, self.from_server.recv())
                .await
                .expect("timed out waiting for close");
            match written {
                Some(Written::Close) | None => return,
                Some(_) => continue,
            }
        }
    }

    /// Assert no text frame arrives within the quiet period
    pub async fn expect_silence(&mut self) {
        let deadline = tokio::time::Instant::now() + QUIET_PERIOD;
        loop {
            match tokio::time::timeout_at(deadline, self.from_server.recv()).await {
                Err(_) => return,
                Ok(Some(Written::Ping)) => continue,
                Ok(other) => panic!("unexpected frame: {:?}", other),
            }
        }
    }
}

pub fn channel_transport() -> (ChannelReader, ChannelWriter, Peer) {
    let (to_server, rx) = mpsc::unbounded_channel();
    let (tx, from_server) = mpsc::unbounded_channel();
    (
        ChannelReader { rx },
        ChannelWriter { tx },
        Peer {
            to_server,
            from_server,
        },
    )
}

/// Start a hub's coordinator on its own task
pub fn start_hub(config: HubConfig) -> (Hub, CancellationToken, JoinHandle<()>) {
    let hub = Hub::new(config);
    let cancel = CancellationToken::new();
    let runner = hub.clone();
    let token = cancel.clone();
    let handle = tokio::spawn(async move { runner.run(token).await });
    (hub, cancel, handle)
}

/// Attach a connection for `user_id` through the pumps and wait until it is registered
pub async fn attach(hub: &Hub, user_id: UserId) -> (Arc<Connection>, Peer, JoinHandle<()>) {
    let (connection, outbound) = hub.connect(user_id);
    let (reader, writer, peer) = channel_transport();
    let handle = tokio::spawn(serve_connection(
        hub.clone(),
        connection.clone(),
        outbound,
        reader,
        writer,
    ));

    wait_until(|| hub.is_registered(&connection.id())).await;
    (connection, peer, handle)
}

/// Register a bare connection (no pumps); the test reads its queue directly
pub async fn register(hub: &Hub, user_id: UserId) -> (Arc<Connection>, OutboundReceiver) {
    let (connection, outbound) = hub.connect(user_id);
    assert!(hub.register(connection.clone()).await);
    (connection, outbound)
}

/// Next frame from a bare queue as JSON
pub async fn next_frame(outbound: &mut OutboundReceiver) -> Value {
    let frame = tokio::time::timeout(RECV_TIMEOUT, outbound.recv())
        .await
        .expect("timed out waiting for a frame")
        .expect("queue closed");
    serde_json::from_str(&frame).unwrap()
}

/// Next frame from a bare queue that is not a presence notification
pub async fn next_payload(outbound: &mut OutboundReceiver) -> Value {
    loop {
        let frame = next_frame(outbound).await;
        if frame["type"] != "presence.changed" {
            return frame;
        }
    }
}

/// Assert no non-presence frame arrives on a bare queue within the quiet period
pub async fn expect_no_payload(outbound: &mut OutboundReceiver) {
    let deadline = tokio::time::Instant::now() + QUIET_PERIOD;
    loop {
        match tokio::time::timeout_at(deadline, outbound.recv()).await {
            Err(_) | Ok(None) => return,
            Ok(Some(frame)) => {
                let value: Value = serde_json::from_str(&frame).unwrap();
                assert_eq!(value["type"], "presence.changed", "unexpected frame {}", value);
            }
        }
    }
}

/// Drain every frame currently queued
pub fn drain(outbound: &mut OutboundReceiver) -> Vec<Value> {
    let mut frames = Vec::new();
    while let Ok(frame) = outbound.try_recv() {
        frames.push(serde_json::from_str(&frame).unwrap());
    }
    frames
}

pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(RECV_TIMEOUT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not met in time");
}
