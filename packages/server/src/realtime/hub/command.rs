//! Commands processed by the hub's coordinator.

use std::{fmt, sync::Arc};

use tokio::sync::oneshot;

use crate::{
    domain::{RoomId, UserId},
    realtime::connection::{Connection, Frame},
};

/// Routing target of an outbound frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    Room(RoomId),
    User(UserId),
    Broadcast,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Room(room_id) => write!(f, "room:{}", room_id),
            Target::User(user_id) => write!(f, "user:{}", user_id),
            Target::Broadcast => f.write_str("broadcast"),
        }
    }
}

/// A routing envelope; the hub never inspects `payload`
#[derive(Debug)]
pub(crate) struct Outbound {
    pub target: Target,
    pub payload: Frame,
}

/// Index mutations, submitted on the unbounded control channel
pub(crate) enum Command {
    Register {
        connection: Arc<Connection>,
        /// `true` when the connection is registered after this command
        reply: oneshot::Sender<bool>,
    },
    Unregister {
        connection: Arc<Connection>,
        reply: oneshot::Sender<()>,
    },
    Join {
        connection: Arc<Connection>,
        room_id: RoomId,
        /// `true` when the connection is in the room after this command
        reply: oneshot::Sender<bool>,
    },
    Leave {
        connection: Arc<Connection>,
        room_id: RoomId,
        reply: oneshot::Sender<()>,
    },
    #[cfg(test)]
    Crash,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Register { connection, .. } => write!(f, "Register({})", connection.id()),
            Command::Unregister { connection, .. } => {
                write!(f, "Unregister({})", connection.id())
            }
            Command::Join {
                connection,
                room_id,
                ..
            } => write!(f, "Join({}, {})", connection.id(), room_id),
            Command::Leave {
                connection,
                room_id,
                ..
            } => write!(f, "Leave({}, {})", connection.id(), room_id),
            #[cfg(test)]
            Command::Crash => f.write_str("Crash"),
        }
    }
}

/// One unit of coordinator work
pub(crate) enum Step {
    Command(Command),
    Outbound(Outbound),
}
