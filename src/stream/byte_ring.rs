//! Bounded byte buffer with timeout-aware blocking on both ends.
//!
//! One producer and one consumer per buffer. The producer blocks while
//! the buffer is full (backpressure), the consumer while it is empty.
//! Closing the buffer lets the consumer drain what is left and then see
//! end-of-stream.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::BridgeError;

#[derive(Debug)]
struct RingState {
    bytes: VecDeque<u8>,
    /// Closed for reading: no new bytes accepted, readers see EOF once
    /// drained.
    closed: bool,
}

/// Fixed-capacity FIFO of bytes.
#[derive(Debug)]
pub struct ByteRing {
    state: Mutex<RingState>,
    readable: Condvar,
    writable: Condvar,
    capacity: usize,
}

impl ByteRing {
    /// Creates a buffer holding at most `capacity` bytes.
    ///
    /// The buffer starts closed when `open` is false.
    #[must_use]
    pub fn new(capacity: usize, open: bool) -> Self {
        Self {
            state: Mutex::new(RingState {
                bytes: VecDeque::with_capacity(capacity),
                closed: !open,
            }),
            readable: Condvar::new(),
            writable: Condvar::new(),
            capacity: capacity.max(1),
        }
    }

    /// Returns the configured capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of buffered bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().bytes.len()
    }

    /// Returns `true` if nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` once the buffer is closed for reading.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Appends `data`, waiting up to `timeout` for room.
    ///
    /// A payload that fits in the buffer is appended in one step once
    /// enough room is free, so a reader never sees part of it ahead of
    /// the rest. Larger payloads are appended as room frees up.
    ///
    /// Returns the number of bytes appended: `data.len()`, or 0 if the
    /// buffer is closed.
    ///
    /// # Errors
    ///
    /// [`BridgeError::Timeout`] if room does not free up in time. Bytes
    /// of an oversized payload appended before the timeout stay buffered.
    pub fn push(&self, data: &[u8], timeout: Duration) -> Result<usize, BridgeError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        let mut rest = data;
        while !rest.is_empty() {
            if state.closed {
                return Ok(0);
            }
            let free = self.capacity - state.bytes.len();
            let wanted = rest.len().min(self.capacity);
            if free >= wanted {
                let (now, later) = rest.split_at(wanted);
                state.bytes.extend(now);
                rest = later;
                self.readable.notify_one();
                continue;
            }
            if self.writable.wait_until(&mut state, deadline).timed_out()
                && self.capacity - state.bytes.len() < wanted
                && !state.closed
            {
                return Err(BridgeError::Timeout);
            }
        }
        Ok(data.len())
    }

    /// Copies up to `buf.len()` bytes out, waiting up to `timeout` for at
    /// least one.
    ///
    /// Returns 0 at end-of-stream: closed and drained, or `buf` empty.
    ///
    /// # Errors
    ///
    /// [`BridgeError::Timeout`] if the buffer stays empty and open. A
    /// timed-out read leaves the buffer untouched.
    pub fn read(&self, buf: &mut [u8], timeout: Duration) -> Result<usize, BridgeError> {
        if buf.is_empty() {
            return Ok(0);
        }
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.bytes.is_empty() {
            if state.closed {
                return Ok(0);
            }
            if self.readable.wait_until(&mut state, deadline).timed_out()
                && state.bytes.is_empty()
                && !state.closed
            {
                return Err(BridgeError::Timeout);
            }
        }
        let n = buf.len().min(state.bytes.len());
        for (slot, byte) in buf.iter_mut().zip(state.bytes.drain(..n)) {
            *slot = byte;
        }
        drop(state);
        self.writable.notify_all();
        Ok(n)
    }

    /// Stops accepting bytes; readers drain then see end-of-stream.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.readable.notify_all();
        self.writable.notify_all();
    }

    /// Accepts bytes again after [`ByteRing::close`].
    pub fn reopen(&self) {
        self.state.lock().closed = false;
        self.readable.notify_all();
    }

    /// Blocks until the buffer has bytes or is open, up to `timeout`.
    ///
    /// Returns `true` if a read would not immediately report
    /// end-of-stream.
    pub fn wait_readable(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.closed && state.bytes.is_empty() {
            if self.readable.wait_until(&mut state, deadline).timed_out() {
                return !state.closed || !state.bytes.is_empty();
            }
        }
        true
    }
}
