//! Real-time fan-out core.
//!
//! - `connection`: one attached session, its outbound queue and room set
//! - `pump`: read/write loops pumping frames between a transport and a connection
//! - `hub`: the single coordinator owning every index
//! - `broadcaster`: domain events → hub routing
//! - `presence`: read model over the hub's user index

pub mod broadcaster;
pub mod connection;
pub mod hub;
pub mod presence;
pub mod pump;

pub use broadcaster::{Broadcaster, EventMapping, EventRoute};
pub use connection::{Connection, EnqueueError, Frame, OutboundReceiver};
pub use hub::{Hub, HubState, HubStats, Target};
pub use presence::{PresenceService, UserPresence};
pub use pump::serve_connection;
