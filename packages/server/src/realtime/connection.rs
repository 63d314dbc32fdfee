//! One attached transport session for one authenticated user.
//!
//! ## 責務
//!
//! - Own the bounded FIFO outbound queue (capacity `send_buffer`)
//! - Own the set of rooms this connection has joined
//! - Close exactly once: the first `close()` drops the queue's sender and
//!   fires the shutdown signal observed by both pumps
//!
//! The room set is only mutated by the hub's command loop, under the
//! per-connection lock.

use std::{collections::HashSet, sync::Arc};

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use crate::domain::{ConnectionId, RoomId, UserId};

/// A pre-serialized outbound frame; cloned cheaply across a fan-out
pub type Frame = Arc<str>;

/// Consumer end of a connection's outbound queue
pub type OutboundReceiver = mpsc::Receiver<Frame>;

/// Why a frame could not be enqueued
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EnqueueError {
    #[error("outbound queue is full")]
    Full,

    #[error("connection is closed")]
    Closed,
}

struct ConnectionState {
    rooms: HashSet<RoomId>,
    /// `None` once the connection is closed; never becomes `Some` again
    outbound: Option<mpsc::Sender<Frame>>,
}

pub struct Connection {
    id: ConnectionId,
    user_id: UserId,
    state: Mutex<ConnectionState>,
    shutdown: CancellationToken,
}

impl Connection {
    /// Create a connection with an empty room set.
    ///
    /// Returns the connection and the consumer end of its outbound queue.
    pub fn new(user_id: UserId, send_buffer: usize) -> (Arc<Self>, OutboundReceiver) {
        Self::with_rooms(user_id, [], send_buffer)
    }

    /// Create a connection that already holds `rooms`.
    ///
    /// The hub indexes these rooms when the connection is registered.
    pub fn with_rooms(
        user_id: UserId,
        rooms: impl IntoIterator<Item = RoomId>,
        send_buffer: usize,
    ) -> (Arc<Self>, OutboundReceiver) {
        let (tx, rx) = mpsc::channel(send_buffer.max(1));
        let connection = Arc::new(Self {
            id: ConnectionId::generate(),
            user_id,
            state: Mutex::new(ConnectionState {
                rooms: rooms.into_iter().collect(),
                outbound: Some(tx),
            }),
            shutdown: CancellationToken::new(),
        });
        (connection, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Snapshot of the joined rooms
    pub fn rooms(&self) -> Vec<RoomId> {
        self.state.lock().rooms.iter().copied().collect()
    }

    pub fn is_in_room(&self, room_id: &RoomId) -> bool {
        self.state.lock().rooms.contains(room_id)
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().outbound.is_none()
    }

    /// Non-blocking enqueue onto the outbound queue
    pub fn try_enqueue(&self, frame: Frame) -> Result<(), EnqueueError> {
        let state = self.state.lock();
        let Some(outbound) = state.outbound.as_ref() else {
            return Err(EnqueueError::Closed);
        };
        outbound.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => EnqueueError::Full,
            mpsc::error::TrySendError::Closed(_) => EnqueueError::Closed,
        })
    }

    /// Close the connection.
    ///
    /// Returns `true` for the call that actually closed it; every later call
    /// returns `false` without side effects.
    pub fn close(&self) -> bool {
        let outbound = {
            let mut state = self.state.lock();
            match state.outbound.take() {
                Some(outbound) => outbound,
                None => return false,
            }
        };
        drop(outbound);
        self.shutdown.cancel();
        tracing::debug!(
            connection_id = %self.id,
            user_id = %self.user_id,
            "Connection closed"
        );
        true
    }

    /// Resolves once the connection has been closed
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.shutdown.cancelled()
    }

    pub(crate) fn add_room(&self, room_id: RoomId) -> bool {
        self.state.lock().rooms.insert(room_id)
    }

    pub(crate) fn remove_room(&self, room_id: &RoomId) -> bool {
        self.state.lock().rooms.remove(room_id)
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("closed", &self.is_closed())
            .finish()
    }
}
