//! Per-endpoint reassembly of fragmented payloads.
//!
//! A message may arrive as several frames (opcode continuation after the
//! first), and each frame as several deliveries located by
//! `offset`/`total_len`. Deliveries must arrive in order; anything else
//! discards the partial message.

use crate::domain::{DataFrame, Opcode};
use crate::error::BridgeError;

/// Accumulates deliveries until a message is complete.
#[derive(Debug, Default)]
pub struct FragmentAssembler {
    /// Bytes of the message so far.
    pending: Vec<u8>,
    /// Bytes received of the frame in progress.
    frame_received: usize,
    /// A message is in progress.
    active: bool,
}

impl FragmentAssembler {
    /// Creates an idle assembler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` while a partial message is held.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.active
    }

    /// Drops any partial message.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.frame_received = 0;
        self.active = false;
    }

    /// Feeds one delivery.
    ///
    /// Returns the whole message once its final delivery arrives,
    /// `Ok(None)` while more are expected.
    ///
    /// # Errors
    ///
    /// [`BridgeError::FragmentOrder`] if the delivery does not continue
    /// the message in progress. The partial message and the offending
    /// delivery are discarded.
    pub fn accept(&mut self, frame: &DataFrame) -> Result<Option<Vec<u8>>, BridgeError> {
        let starts_frame = self.frame_received == 0;
        if starts_frame {
            let continuation = frame.opcode == Opcode::Continuation;
            if continuation != self.active {
                let expected = self.frame_received;
                self.reset();
                return Err(BridgeError::FragmentOrder {
                    expected,
                    actual: frame.offset,
                });
            }
        }
        if frame.offset != self.frame_received {
            let expected = self.frame_received;
            self.reset();
            return Err(BridgeError::FragmentOrder {
                expected,
                actual: frame.offset,
            });
        }

        if !self.active && frame.is_final && frame.ends_frame() {
            return Ok(Some(frame.payload.clone()));
        }

        self.active = true;
        self.pending.extend_from_slice(&frame.payload);
        self.frame_received += frame.payload.len();

        if frame.ends_frame() {
            self.frame_received = 0;
            if frame.is_final {
                self.active = false;
                return Ok(Some(std::mem::take(&mut self.pending)));
            }
        }
        Ok(None)
    }
}
