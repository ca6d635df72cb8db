//! Connection lifecycle states and the status snapshot.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::ConnectionId;

/// Lifecycle state of a [`super::Connection`].
///
/// `Disconnected → Connecting → Connected`, with `Connecting` re-entered
/// after an unexpected drop until the caller closes the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Not started, or closed.
    Disconnected,
    /// Dialing, or waiting to retry.
    Connecting,
    /// Handshake completed; frames may be sent.
    Connected,
}

impl ConnectionState {
    /// Returns the state as a static string slice.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of a connection, rendered by the `status` command.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStatus {
    /// Connection identifier.
    pub id: ConnectionId,
    /// Server URI.
    pub uri: String,
    /// Current state.
    pub state: ConnectionState,
    /// When the current session was established.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connected_since: Option<DateTime<Utc>>,
    /// Sessions lost and retried since start.
    pub reconnects: u64,
    /// Outbound frames waiting for the network thread.
    pub queued_frames: usize,
}
