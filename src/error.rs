//! Bridge error types with stable numeric codes.
//!
//! [`BridgeError`] is the central error type for the connection, the
//! stream adapter and the configuration layer. [`CommandError`] is local
//! to one console dispatch cycle and never reaches the connection.

use std::io;

use crate::client::ConnectionState;
use crate::domain::ConnectionId;

/// Transport, stream and configuration errors.
///
/// # Error Code Ranges
///
/// | Range     | Category              |
/// |-----------|-----------------------|
/// | 1000–1999 | Usage / validation    |
/// | 2000–2999 | State                 |
/// | 3000–3999 | Transport / internal  |
///
/// A full inbound buffer is not an error of its own: the delivering side
/// waits for space and reports [`BridgeError::Timeout`] if none frees up.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Operation requires the connection to be in `Connected` state.
    #[error("websocket is not connected")]
    NotConnected,

    /// A blocking buffer wait exceeded its configured duration.
    #[error("operation timed out")]
    Timeout,

    /// The process-wide stream adapter is already installed.
    #[error("stream adapter already registered")]
    AlreadyRegistered,

    /// No process-wide stream adapter is installed.
    #[error("stream adapter not registered")]
    NotRegistered,

    /// A payload fragment arrived at an unexpected offset.
    #[error("fragment out of order: expected offset {expected}, got {actual}")]
    FragmentOrder {
        /// Offset the reassembler was waiting for.
        expected: usize,
        /// Offset carried by the fragment.
        actual: usize,
    },

    /// Connection operation attempted from the wrong lifecycle state.
    #[error("invalid connection state: expected {expected}, found {actual}")]
    InvalidState {
        /// State the operation requires.
        expected: ConnectionState,
        /// State the connection was in.
        actual: ConnectionState,
    },

    /// Stream path does not name `<base>/<slot>`.
    #[error("invalid stream path: {0}")]
    InvalidPath(String),

    /// Slot index beyond the configured slot count.
    #[error("slot {slot} out of range (max {max})")]
    InvalidSlot {
        /// Requested slot.
        slot: usize,
        /// Number of configured slots.
        max: usize,
    },

    /// An endpoint is already bound to the slot.
    #[error("slot {0} already has an attached endpoint")]
    SlotOccupied(usize),

    /// The connection is already bound to another slot.
    #[error("connection {0} is already attached")]
    ConnectionAlreadyAttached(ConnectionId),

    /// No endpoint is bound to the slot.
    #[error("no endpoint attached to slot {0}")]
    EndpointNotFound(usize),

    /// Opcode cannot be used for an outbound frame.
    #[error("invalid opcode for send: 0x{0:x}")]
    InvalidOpcode(u8),

    /// Configuration value rejected.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Failure reported by the WebSocket transport.
    #[error("transport error: {0}")]
    Transport(String),

    /// I/O failure on a sink or runtime setup.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl BridgeError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidPath(_) => 1001,
            Self::InvalidSlot { .. } => 1002,
            Self::InvalidOpcode(_) => 1003,
            Self::InvalidConfig(_) => 1004,
            Self::NotConnected => 2001,
            Self::AlreadyRegistered => 2002,
            Self::NotRegistered => 2003,
            Self::SlotOccupied(_) => 2004,
            Self::ConnectionAlreadyAttached(_) => 2005,
            Self::EndpointNotFound(_) => 2006,
            Self::InvalidState { .. } => 2007,
            Self::Timeout => 3001,
            Self::FragmentOrder { .. } => 3002,
            Self::Transport(_) => 3003,
            Self::Io(_) => 3000,
        }
    }

    /// Returns `true` for errors the console should report and retry past.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::NotConnected | Self::Timeout)
    }
}

impl From<BridgeError> for io::Error {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::Io(inner) => inner,
            BridgeError::Timeout => io::Error::new(io::ErrorKind::TimedOut, err),
            BridgeError::NotConnected => io::Error::new(io::ErrorKind::NotConnected, err),
            BridgeError::InvalidPath(_) | BridgeError::InvalidSlot { .. } => {
                io::Error::new(io::ErrorKind::InvalidInput, err)
            }
            BridgeError::EndpointNotFound(_) => io::Error::new(io::ErrorKind::NotFound, err),
            other => io::Error::other(other),
        }
    }
}

/// Outcome of a failed console command dispatch.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum CommandError {
    /// No command with this name is registered.
    #[error("Unrecognized command")]
    NotFound(String),

    /// The command exists but its arguments could not be parsed.
    #[error("{}", prefixed(.command, .message))]
    InvalidArguments {
        /// Command name, or empty when the line itself failed to split.
        command: String,
        /// Parser message.
        message: String,
    },

    /// The command ran and returned a non-zero status.
    #[error("Command returned non-zero error code: 0x{code:x} ({name})")]
    Failed {
        /// Status returned by the handler.
        code: i32,
        /// Human-readable status name.
        name: &'static str,
    },
}

impl CommandError {
    /// Builds [`CommandError::Failed`] with the printable name of `code`.
    #[must_use]
    pub const fn failed(code: i32) -> Self {
        Self::Failed {
            code,
            name: crate::console::status::name(code),
        }
    }
}

fn prefixed(command: &str, message: &str) -> String {
    if command.is_empty() {
        message.to_string()
    } else {
        format!("{command}: {message}")
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_grouped_by_category() {
        assert_eq!(BridgeError::InvalidPath("x".into()).error_code() / 1000, 1);
        assert_eq!(BridgeError::NotConnected.error_code() / 1000, 2);
        assert_eq!(BridgeError::Timeout.error_code() / 1000, 3);
    }

    #[test]
    fn timeout_maps_to_timed_out_io_error() {
        let err: io::Error = BridgeError::Timeout.into();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
        let err: io::Error = BridgeError::NotConnected.into();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
    }

    #[test]
    fn argument_errors_omit_empty_command_prefix() {
        let line_error = CommandError::InvalidArguments {
            command: String::new(),
            message: "unterminated quote".into(),
        };
        assert_eq!(line_error.to_string(), "unterminated quote");
        let command_error = CommandError::InvalidArguments {
            command: "help".into(),
            message: "unexpected argument 'x'".into(),
        };
        assert_eq!(command_error.to_string(), "help: unexpected argument 'x'");
    }

    #[test]
    fn transient_errors() {
        assert!(BridgeError::Timeout.is_transient());
        assert!(BridgeError::NotConnected.is_transient());
        assert!(!BridgeError::AlreadyRegistered.is_transient());
    }

    #[test]
    fn failed_command_message_includes_hex_code_and_name() {
        let err = CommandError::Failed {
            code: 0x103,
            name: "INVALID_STATE",
        };
        assert_eq!(
            err.to_string(),
            "Command returned non-zero error code: 0x103 (INVALID_STATE)"
        );
        assert_eq!(
            CommandError::NotFound("x".into()).to_string(),
            "Unrecognized command"
        );
    }
}
