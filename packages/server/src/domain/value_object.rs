//! Identifier value objects.
//!
//! `UserId`, `RoomId` and `ConnectionId` are opaque 128-bit values rendered as
//! canonical hyphenated UUID strings on the wire. The nil UUID is reserved to
//! mean "unset" and is rejected everywhere an identifier is required.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::ValueObjectError;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "Uuid", into = "Uuid")]
        pub struct $name(Uuid);

        impl $name {
            /// Wrap a UUID, rejecting the nil value
            pub fn new(value: Uuid) -> Result<Self, ValueObjectError> {
                if value.is_nil() {
                    return Err(ValueObjectError::NilId { kind: $kind });
                }
                Ok(Self(value))
            }

            /// Generate a fresh random identifier
            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl TryFrom<Uuid> for $name {
            type Error = ValueObjectError;

            fn try_from(value: Uuid) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl FromStr for $name {
            type Err = ValueObjectError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let value = Uuid::parse_str(s.trim()).map_err(|_| ValueObjectError::InvalidId {
                    kind: $kind,
                    value: s.to_string(),
                })?;
                Self::new(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0.hyphenated(), f)
            }
        }
    };
}

define_id!(
    /// The authenticated principal behind a connection
    UserId,
    "user_id"
);

define_id!(
    /// A fan-out group; always corresponds to a chat id
    RoomId,
    "chat_id"
);

define_id!(
    /// Process-unique identifier of one attached transport session
    ConnectionId,
    "connection_id"
);
