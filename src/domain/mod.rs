//! Domain layer: connection identity, event types, and event dispatch.
//!
//! This module contains the typed events a connection emits, the
//! identifier used to route them, and the synchronous dispatcher that
//! fans them out to the stream adapter and to application logging.

pub mod connection_id;
pub mod event_dispatcher;
pub mod ws_event;

pub use connection_id::ConnectionId;
pub use event_dispatcher::{EventCallback, EventDispatcher, EventFilter, SubscriptionId};
pub use ws_event::{DataFrame, EventKind, EventPayload, Opcode, WsEvent, log_event};
