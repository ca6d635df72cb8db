//! Client layer: the WebSocket connection state machine.
//!
//! [`Connection`] dials the server on its own network thread, emits
//! lifecycle and data events, and accepts outbound frames from any
//! thread through a bounded [`outbox::Outbox`].

pub mod connection;
pub mod frame_sink;
pub mod outbox;
pub mod state;

pub use connection::Connection;
pub use frame_sink::FrameSink;
pub use outbox::OutboundFrame;
pub use state::{ConnectionState, ConnectionStatus};
