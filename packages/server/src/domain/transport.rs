//! Transport contract for one attached session.
//!
//! A transport is split into a reader half (owned by the read pump) and a
//! writer half (owned by the write pump). Deadlines are not part of the
//! contract: the pumps wrap every read and write in a tokio timer, which is
//! how read/write deadlines are enforced for any implementation.

use async_trait::async_trait;

use super::error::TransportError;

/// A frame received from the peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    Text(String),
    Binary(Vec<u8>),
    /// Liveness ping from the peer
    Ping,
    /// Answer to one of our pings
    Pong,
    /// Orderly close requested by the peer
    Close,
}

/// Reader half of a transport
#[async_trait]
pub trait TransportReader: Send {
    /// Read the next frame; `Ok(None)` means the stream ended
    async fn read_frame(&mut self) -> Result<Option<InboundFrame>, TransportError>;
}

/// Writer half of a transport
#[async_trait]
pub trait TransportWriter: Send {
    /// Write one text frame
    async fn write_text(&mut self, text: &str) -> Result<(), TransportError>;

    /// Write a liveness ping
    async fn write_ping(&mut self) -> Result<(), TransportError>;

    /// Send a close frame and close the transport
    async fn close(&mut self) -> Result<(), TransportError>;
}
