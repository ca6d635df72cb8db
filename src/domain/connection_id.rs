//! Identity of one WebSocket client connection.
//!
//! Every event carries the [`ConnectionId`] of the connection that emitted
//! it. The dispatcher filters subscribers by it and the stream adapter
//! uses it to find the endpoint a connection is attached to.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Random (v4) identifier assigned when a `Connection` is created.
///
/// It survives reconnects: all sessions of one connection report the
/// same id, so an attached endpoint keeps receiving after a redial.
/// Serialized as the bare UUID string in status output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(uuid::Uuid);

impl ConnectionId {
    /// Draws a fresh id.
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// The underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<uuid::Uuid> for ConnectionId {
    fn from(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }
}
