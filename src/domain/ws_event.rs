//! Connection lifecycle and data events.
//!
//! Every state transition of a [`crate::client::Connection`] and every
//! inbound frame produces a [`WsEvent`], delivered synchronously through
//! the [`super::EventDispatcher`]. Events are transient: subscribers copy
//! what they need before the callback returns.

use std::fmt;

use chrono::{DateTime, Utc};

use super::ConnectionId;

/// WebSocket frame opcode as carried by data events and outbound frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// Continuation of a fragmented message.
    Continuation,
    /// UTF-8 text payload.
    Text,
    /// Binary payload.
    Binary,
    /// Close control frame (payload: big-endian code, then reason).
    Close,
    /// Ping control frame.
    Ping,
    /// Pong control frame.
    Pong,
}

impl Opcode {
    /// Returns the wire value of the opcode.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Continuation => 0x0,
            Self::Text => 0x1,
            Self::Binary => 0x2,
            Self::Close => 0x8,
            Self::Ping => 0x9,
            Self::Pong => 0xA,
        }
    }

    /// Parses a wire opcode, returning `None` for reserved values.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x0 => Some(Self::Continuation),
            0x1 => Some(Self::Text),
            0x2 => Some(Self::Binary),
            0x8 => Some(Self::Close),
            0x9 => Some(Self::Ping),
            0xA => Some(Self::Pong),
            _ => None,
        }
    }

    /// Returns `true` for opcodes whose payload belongs to the byte stream.
    #[must_use]
    pub const fn is_stream_payload(self) -> bool {
        matches!(self, Self::Continuation | Self::Text | Self::Binary)
    }
}

/// One delivery of inbound payload bytes.
///
/// A logical message may arrive as several frames, each of which may be
/// split into several deliveries. `offset`/`total_len` locate this
/// delivery inside its frame; `is_final` is set on the delivery that ends
/// the message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFrame {
    /// Frame opcode.
    pub opcode: Opcode,
    /// Payload bytes of this delivery.
    pub payload: Vec<u8>,
    /// No more fragments of this message follow.
    pub is_final: bool,
    /// Byte offset of `payload` within the frame.
    pub offset: usize,
    /// Total payload length of the frame.
    pub total_len: usize,
}

impl DataFrame {
    /// Builds an unfragmented delivery.
    #[must_use]
    pub fn whole(opcode: Opcode, payload: Vec<u8>) -> Self {
        let total_len = payload.len();
        Self {
            opcode,
            payload,
            is_final: true,
            offset: 0,
            total_len,
        }
    }

    /// Returns `true` once this delivery reaches the end of its frame.
    #[must_use]
    pub fn ends_frame(&self) -> bool {
        self.offset.saturating_add(self.payload.len()) >= self.total_len
    }

    /// Decodes the close code of a close-opcode payload.
    ///
    /// Returns `None` for other opcodes or payloads shorter than two bytes.
    #[must_use]
    pub fn close_code(&self) -> Option<u16> {
        if self.opcode != Opcode::Close {
            return None;
        }
        match self.payload.as_slice() {
            [hi, lo, ..] => Some(u16::from_be_bytes([*hi, *lo])),
            _ => None,
        }
    }
}

/// Discriminant of [`EventPayload`], used for subscription filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Connection attempt is starting.
    BeforeConnect,
    /// Handshake completed.
    Connected,
    /// Connection was lost or closed.
    Disconnected,
    /// Payload bytes arrived.
    DataReceived,
    /// Transport or connect failure.
    Error,
    /// Peer sent a close frame.
    ClosedWithCode,
}

impl EventKind {
    /// Returns the kind as a static string slice.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BeforeConnect => "before_connect",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::DataReceived => "data_received",
            Self::Error => "error",
            Self::ClosedWithCode => "closed_with_code",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Variant-specific event content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventPayload {
    /// Emitted on entering `Connecting`.
    BeforeConnect,
    /// Emitted on entering `Connected`.
    Connected,
    /// Emitted on leaving `Connected`, or on `close` from `Connecting`.
    Disconnected,
    /// Inbound frame data.
    DataReceived(DataFrame),
    /// Failure description.
    Error {
        /// Human-readable failure message.
        message: String,
    },
    /// Close code and reason received from the peer.
    ClosedWithCode {
        /// Close status code.
        code: u16,
        /// Close reason text.
        reason: String,
    },
}

/// Event emitted by a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WsEvent {
    /// Connection that produced the event.
    pub connection_id: ConnectionId,
    /// When the event was produced.
    pub timestamp: DateTime<Utc>,
    /// Event content.
    pub payload: EventPayload,
}

impl WsEvent {
    /// Creates an event stamped with the current time.
    #[must_use]
    pub fn new(connection_id: ConnectionId, payload: EventPayload) -> Self {
        Self {
            connection_id,
            timestamp: Utc::now(),
            payload,
        }
    }

    /// Returns the event kind.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self.payload {
            EventPayload::BeforeConnect => EventKind::BeforeConnect,
            EventPayload::Connected => EventKind::Connected,
            EventPayload::Disconnected => EventKind::Disconnected,
            EventPayload::DataReceived(_) => EventKind::DataReceived,
            EventPayload::Error { .. } => EventKind::Error,
            EventPayload::ClosedWithCode { .. } => EventKind::ClosedWithCode,
        }
    }
}

/// Application-level logging of connection events.
///
/// Registered on the dispatcher for every event kind by the binary.
pub fn log_event(event: &WsEvent) {
    let connection_id = event.connection_id;
    match &event.payload {
        EventPayload::BeforeConnect => tracing::debug!(%connection_id, "websocket connecting"),
        EventPayload::Connected => tracing::info!(%connection_id, "websocket connected"),
        EventPayload::Disconnected => tracing::info!(%connection_id, "websocket disconnected"),
        EventPayload::DataReceived(frame) => {
            if frame.payload.len() == 2
                && let Some(code) = frame.close_code()
            {
                tracing::info!(%connection_id, code, "received close frame");
            }
        }
        EventPayload::Error { message } => {
            tracing::warn!(%connection_id, error = %message, "websocket error");
        }
        EventPayload::ClosedWithCode { code, reason } => {
            tracing::info!(%connection_id, code, reason = %reason, "websocket closed by peer");
        }
    }
}
