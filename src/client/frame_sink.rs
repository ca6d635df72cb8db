//! What the stream adapter needs from a connection.

use std::fmt;
use std::time::Duration;

use crate::domain::{ConnectionId, EventDispatcher, Opcode};
use crate::error::BridgeError;

/// Outbound half of a connection plus the dispatcher its events go to.
///
/// [`super::Connection`] is the production implementation.
pub trait FrameSink: fmt::Debug + Send + Sync {
    /// Identity used to route inbound events to the bound endpoint.
    fn connection_id(&self) -> ConnectionId;

    /// Returns `true` while frames may be sent.
    fn is_connected(&self) -> bool;

    /// Queues one frame, blocking up to `timeout`.
    ///
    /// # Errors
    ///
    /// [`BridgeError::NotConnected`] outside `Connected`,
    /// [`BridgeError::Timeout`] if the frame cannot be accepted in time.
    fn send_frame(&self, payload: &[u8], opcode: Opcode, timeout: Duration)
    -> Result<(), BridgeError>;

    /// Dispatcher that receives this connection's events.
    fn dispatcher(&self) -> &EventDispatcher;
}
