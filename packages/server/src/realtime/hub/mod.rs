//! The hub: process-wide coordinator of connections, rooms and fan-out.
//!
//! ## 設計ノート
//!
//! A single coordinator task (`Hub::run`) owns every mutation of the indexes.
//! Mutations arrive on an unbounded control channel and are applied one at a
//! time, which gives a total order over register/unregister/join/leave.
//! Fan-out requests arrive on a bounded broadcast channel (`broadcast_buffer`);
//! when it is full the request is dropped, the producer never blocks.
//! Cancellation and stop are checked first; between the two channels the
//! coordinator picks at random so neither can starve the other.
//!
//! The indexes sit behind a read-write lock. The coordinator is the only
//! writer; read-only queries (presence, counts) take the read lock and never
//! observe a half-applied command.
//!
//! Per-connection delivery is a non-blocking enqueue. A full queue drops the
//! frame for that connection only, logs a warning and bumps
//! `HubStats::dropped_frames`; the connection stays open.
//!
//! Lifecycle: `Created → Running → Stopping → Stopped`. A panic while applying
//! a command is caught and logged, and the hub moves to `Stopping`: the
//! indexes may be half-mutated, so every connection is closed.

mod command;
mod index;

use std::{
    collections::HashMap,
    panic::AssertUnwindSafe,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use parking_lot::{Mutex, RwLock};
use tokio::{
    sync::{mpsc, oneshot, watch},
    time::Instant,
};
use tokio_util::sync::CancellationToken;

use crate::{
    config::HubConfig,
    domain::{ConnectionId, RoomId, UserId},
    infrastructure::dto::websocket::ServerMessage,
    realtime::connection::{Connection, EnqueueError, Frame, OutboundReceiver},
};

use self::{
    command::{Command, Outbound, Step},
    index::{HubIndex, PresenceChange},
};

pub use self::command::Target;

/// Coordinator state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubState {
    Created,
    Running,
    Stopping,
    Stopped,
}

impl HubState {
    pub fn as_str(&self) -> &'static str {
        match self {
            HubState::Created => "created",
            HubState::Running => "running",
            HubState::Stopping => "stopping",
            HubState::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for HubState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of the hub's counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubStats {
    pub state: HubState,
    pub connections: usize,
    pub users: usize,
    pub rooms: usize,
    /// Frames dropped because a queue or the broadcast channel was full
    pub dropped_frames: u64,
}

struct Receivers {
    control: mpsc::UnboundedReceiver<Command>,
    broadcast: mpsc::Receiver<Outbound>,
}

impl Receivers {
    /// Next command or fan-out request; `None` once both channels are closed
    async fn next(&mut self) -> Option<Step> {
        tokio::select! {
            Some(command) = self.control.recv() => Some(Step::Command(command)),
            Some(outbound) = self.broadcast.recv() => Some(Step::Outbound(outbound)),
            else => None,
        }
    }
}

struct Inner {
    config: Arc<HubConfig>,
    control_tx: mpsc::UnboundedSender<Command>,
    broadcast_tx: mpsc::Sender<Outbound>,
    /// Taken by the first `run` (or by `stop` on a hub that never ran)
    receivers: Mutex<Option<Receivers>>,
    index: RwLock<HubIndex>,
    state: watch::Sender<HubState>,
    shutdown: CancellationToken,
    dropped_frames: AtomicU64,
}

/// Cheaply cloneable handle to the hub
#[derive(Clone)]
pub struct Hub {
    inner: Arc<Inner>,
}

impl Hub {
    pub fn new(config: HubConfig) -> Self {
        let (control_tx, control) = mpsc::unbounded_channel();
        let (broadcast_tx, broadcast) = mpsc::channel(config.broadcast_buffer.max(1));
        let (state, _) = watch::channel(HubState::Created);

        Self {
            inner: Arc::new(Inner {
                config: Arc::new(config),
                control_tx,
                broadcast_tx,
                receivers: Mutex::new(Some(Receivers { control, broadcast })),
                index: RwLock::new(HubIndex::default()),
                state,
                shutdown: CancellationToken::new(),
                dropped_frames: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.inner.config
    }

    pub fn state(&self) -> HubState {
        *self.inner.state.borrow()
    }

    /// Whether public operations are currently accepted
    pub fn is_accepting(&self) -> bool {
        matches!(self.state(), HubState::Created | HubState::Running)
    }

    /// Build a connection for `user_id` with the configured send buffer
    pub fn connect(&self, user_id: UserId) -> (Arc<Connection>, OutboundReceiver) {
        Connection::new(user_id, self.inner.config.send_buffer)
    }

    /// Run the coordinator until `cancel` fires or `stop` is called.
    ///
    /// Calling `run` on a hub that is already running (or has stopped)
    /// returns immediately.
    pub async fn run(&self, cancel: CancellationToken) {
        let Some(mut receivers) = self.inner.receivers.lock().take() else {
            tracing::debug!("Hub is already running or stopped; ignoring run");
            return;
        };

        let started = self.inner.state.send_if_modified(|state| {
            if *state == HubState::Created {
                *state = HubState::Running;
                true
            } else {
                false
            }
        });
        if !started {
            return;
        }
        tracing::info!("Hub running");

        loop {
            let step = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    tracing::info!("Hub cancelled");
                    break;
                }
                () = self.inner.shutdown.cancelled() => {
                    tracing::info!("Hub stop requested");
                    break;
                }
                step = receivers.next() => match step {
                    Some(step) => step,
                    None => break,
                },
            };

            if !self.process(step) {
                break;
            }
        }

        self.shut_down(receivers);
    }

    /// Stop the hub and wait until every connection has been closed
    pub async fn stop(&self) {
        self.inner.shutdown.cancel();

        let never_ran = self.inner.receivers.lock().take();
        if never_ran.is_some() {
            self.inner.state.send_replace(HubState::Stopped);
            tracing::info!("Hub stopped before it ever ran");
            return;
        }

        let mut state = self.inner.state.subscribe();
        let _ = state.wait_for(|state| *state == HubState::Stopped).await;
    }

    /// Register a connection.
    ///
    /// Returns `false` when the hub is stopping or stopped; the connection is
    /// closed in that case.
    pub async fn register(&self, connection: Arc<Connection>) -> bool {
        let registered = self
            .request(|reply| Command::Register {
                connection: connection.clone(),
                reply,
            })
            .await
            .unwrap_or(false);

        if !registered {
            tracing::debug!(
                connection_id = %connection.id(),
                "Registration ignored; hub is not accepting connections"
            );
            connection.close();
        }
        registered
    }

    /// Unregister a connection and close it. A second call is a no-op.
    pub async fn unregister(&self, connection: &Arc<Connection>) {
        self.request(|reply| Command::Unregister {
            connection: connection.clone(),
            reply,
        })
        .await;
    }

    /// Subscribe a registered connection to a room.
    ///
    /// Returns `false` when the connection is not registered or the hub is
    /// not running.
    pub async fn join_room(&self, connection: &Arc<Connection>, room_id: RoomId) -> bool {
        self.request(|reply| Command::Join {
            connection: connection.clone(),
            room_id,
            reply,
        })
        .await
        .unwrap_or(false)
    }

    /// Unsubscribe a connection from a room
    pub async fn leave_room(&self, connection: &Arc<Connection>, room_id: RoomId) {
        self.request(|reply| Command::Leave {
            connection: connection.clone(),
            room_id,
            reply,
        })
        .await;
    }

    /// Deliver `payload` to every connection currently in `room_id`
    pub fn broadcast_to_room(&self, room_id: RoomId, payload: impl Into<Frame>) {
        self.submit(Target::Room(room_id), payload.into());
    }

    /// Deliver `payload` to every connection of `user_id`
    pub fn send_to_user(&self, user_id: UserId, payload: impl Into<Frame>) {
        self.submit(Target::User(user_id), payload.into());
    }

    /// Deliver `payload` to every registered connection
    pub fn broadcast(&self, payload: impl Into<Frame>) {
        self.submit(Target::Broadcast, payload.into());
    }

    /// Tell everyone in `room_id` that `user_id` is typing
    pub fn broadcast_typing(&self, room_id: RoomId, user_id: UserId) {
        match (ServerMessage::Typing {
            chat_id: room_id,
            user_id,
        })
        .to_frame()
        {
            Ok(frame) => self.broadcast_to_room(room_id, frame),
            Err(e) => tracing::error!("Failed to serialize typing envelope: {}", e),
        }
    }

    /// For each requested user, whether they have at least one connection
    pub fn room_presence(&self, user_ids: &[UserId]) -> HashMap<UserId, bool> {
        let index = self.inner.index.read();
        user_ids
            .iter()
            .map(|user_id| (*user_id, index.is_online(user_id)))
            .collect()
    }

    /// Connections currently subscribed to `room_id`
    pub fn room_members(&self, room_id: &RoomId) -> Vec<ConnectionId> {
        let mut members: Vec<ConnectionId> = self
            .inner
            .index
            .read()
            .room_members(room_id)
            .iter()
            .map(|c| c.id())
            .collect();
        members.sort();
        members
    }

    /// Distinct users with at least one connection in `room_id`, sorted
    pub fn online_users_in_room(&self, room_id: &RoomId) -> Vec<UserId> {
        let mut users: Vec<UserId> = self
            .inner
            .index
            .read()
            .room_members(room_id)
            .iter()
            .map(|c| c.user_id())
            .collect();
        users.sort();
        users.dedup();
        users
    }

    pub fn is_registered(&self, connection_id: &ConnectionId) -> bool {
        self.inner.index.read().contains(connection_id)
    }

    pub fn stats(&self) -> HubStats {
        let index = self.inner.index.read();
        HubStats {
            state: self.state(),
            connections: index.connection_count(),
            users: index.user_count(),
            rooms: index.room_count(),
            dropped_frames: self.inner.dropped_frames.load(Ordering::Relaxed),
        }
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> Option<T> {
        if !self.is_accepting() {
            return None;
        }
        let (reply, response) = oneshot::channel();
        let command = build(reply);
        tracing::trace!("Submitting hub command {}", command);
        if self.inner.control_tx.send(command).is_err() {
            return None;
        }
        response.await.ok()
    }

    fn submit(&self, target: Target, payload: Frame) {
        if !self.is_accepting() {
            tracing::trace!(target = %target, "Hub is not accepting; dropping frame");
            return;
        }
        match self.inner.broadcast_tx.try_send(Outbound { target, payload }) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(outbound)) => {
                self.inner.dropped_frames.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    target = %outbound.target,
                    "Hub broadcast channel full, dropping frame"
                );
            }
            Err(mpsc::error::TrySendError::Closed(outbound)) => {
                tracing::debug!(
                    target = %outbound.target,
                    "Hub broadcast channel closed, dropping frame"
                );
            }
        }
    }

    /// Apply one step; `false` if the coordinator must stop
    fn process(&self, step: Step) -> bool {
        match std::panic::catch_unwind(AssertUnwindSafe(|| self.apply(step))) {
            Ok(()) => true,
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::error!("Hub coordinator panicked: {}; stopping", reason);
                false
            }
        }
    }

    fn apply(&self, step: Step) {
        match step {
            Step::Command(Command::Register { connection, reply }) => {
                let registered = self.handle_register(connection);
                let _ = reply.send(registered);
            }
            Step::Command(Command::Unregister { connection, reply }) => {
                self.handle_unregister(&connection);
                let _ = reply.send(());
            }
            Step::Command(Command::Join {
                connection,
                room_id,
                reply,
            }) => {
                let joined = self.handle_join(&connection, room_id);
                let _ = reply.send(joined);
            }
            Step::Command(Command::Leave {
                connection,
                room_id,
                reply,
            }) => {
                self.handle_leave(&connection, room_id);
                let _ = reply.send(());
            }
            #[cfg(test)]
            Step::Command(Command::Crash) => panic!("injected coordinator failure"),
            Step::Outbound(Outbound { target, payload }) => {
                self.fan_out(&target, &payload);
            }
        }
    }

    fn handle_register(&self, connection: Arc<Connection>) -> bool {
        if self.state() != HubState::Running || connection.is_closed() {
            return false;
        }

        let changes = {
            let mut index = self.inner.index.write();
            match index.insert(connection.clone()) {
                Some(changes) => changes,
                None => return true,
            }
        };

        tracing::info!(
            connection_id = %connection.id(),
            user_id = %connection.user_id(),
            "Connection registered"
        );
        self.emit_presence(&changes);
        true
    }

    fn handle_unregister(&self, connection: &Arc<Connection>) {
        let removal = self.inner.index.write().remove(&connection.id());
        let Some(removal) = removal else {
            tracing::debug!(
                connection_id = %connection.id(),
                "Connection already unregistered"
            );
            return;
        };

        removal.connection.close();
        tracing::info!(
            connection_id = %connection.id(),
            user_id = %connection.user_id(),
            "Connection unregistered"
        );
        self.emit_presence(&removal.changes);
    }

    fn handle_join(&self, connection: &Arc<Connection>, room_id: RoomId) -> bool {
        if self.state() != HubState::Running {
            return false;
        }
        let changes = self.inner.index.write().join(&connection.id(), room_id);
        match changes {
            Some(changes) => {
                tracing::debug!(
                    connection_id = %connection.id(),
                    room_id = %room_id,
                    "Joined room"
                );
                self.emit_presence(&changes);
                true
            }
            None => {
                tracing::debug!(
                    connection_id = %connection.id(),
                    room_id = %room_id,
                    "Join ignored; connection is not registered"
                );
                false
            }
        }
    }

    fn handle_leave(&self, connection: &Arc<Connection>, room_id: RoomId) {
        if self.inner.index.write().leave(&connection.id(), &room_id) {
            tracing::debug!(
                connection_id = %connection.id(),
                room_id = %room_id,
                "Left room"
            );
        }
    }

    fn emit_presence(&self, changes: &[PresenceChange]) {
        for change in changes {
            let message = ServerMessage::PresenceChanged {
                user_id: change.user_id,
                is_online: change.is_online,
            };
            match message.to_frame() {
                Ok(frame) => {
                    self.fan_out(&Target::Room(change.room_id), &frame);
                }
                Err(e) => tracing::error!("Failed to serialize presence envelope: {}", e),
            }
        }
    }

    /// Enqueue `payload` on every connection behind `target`.
    ///
    /// Recipients are collected under the read lock; the enqueues happen after
    /// it is released.
    fn fan_out(&self, target: &Target, payload: &Frame) -> usize {
        let recipients = {
            let index = self.inner.index.read();
            match target {
                Target::Room(room_id) => index.room_members(room_id),
                Target::User(user_id) => index.user_connections(user_id),
                Target::Broadcast => index.all_connections(),
            }
        };

        let mut delivered = 0;
        for connection in &recipients {
            match connection.try_enqueue(payload.clone()) {
                Ok(()) => delivered += 1,
                Err(EnqueueError::Full) => {
                    self.inner.dropped_frames.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        connection_id = %connection.id(),
                        user_id = %connection.user_id(),
                        target = %target,
                        "Outbound queue full, dropping frame"
                    );
                }
                Err(EnqueueError::Closed) => tracing::debug!(
                    connection_id = %connection.id(),
                    target = %target,
                    "Connection closed, skipping frame"
                ),
            }
        }
        tracing::trace!(
            target = %target,
            "Fanned out frame to {}/{} connections",
            delivered,
            recipients.len()
        );
        delivered
    }

    fn shut_down(&self, mut receivers: Receivers) {
        self.inner.state.send_replace(HubState::Stopping);
        self.inner.shutdown.cancel();

        let deadline = Instant::now() + self.inner.config.shutdown_timeout;
        let mut drained = 0usize;
        while Instant::now() < deadline {
            let step = if let Ok(command) = receivers.control.try_recv() {
                Step::Command(command)
            } else if let Ok(outbound) = receivers.broadcast.try_recv() {
                Step::Outbound(outbound)
            } else {
                break;
            };
            drained += 1;
            if !self.process(step) {
                break;
            }
        }
        receivers.control.close();
        receivers.broadcast.close();
        drop(receivers);

        let connections = self.inner.index.write().clear();
        for connection in &connections {
            connection.close();
        }

        self.inner.state.send_replace(HubState::Stopped);
        tracing::info!(
            "Hub stopped: drained {} pending commands, closed {} connections",
            drained,
            connections.len()
        );
    }
}
