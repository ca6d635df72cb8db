//! Byte-stream handle over an attached endpoint.

use std::io::{self, Read, Write};
use std::sync::Arc;
use std::time::Duration;

use super::adapter::StreamAdapter;

/// Blocking stream opened with [`StreamAdapter::open`].
///
/// Reads return inbound message bytes in arrival order; `Ok(0)` means
/// the connection is down and everything received has been read.
/// Writes are line-buffered and go out as text frames.
#[derive(Debug, Clone)]
pub struct EndpointStream {
    adapter: Arc<StreamAdapter>,
    slot: usize,
    path: String,
}

impl EndpointStream {
    pub(crate) const fn new(adapter: Arc<StreamAdapter>, slot: usize, path: String) -> Self {
        Self {
            adapter,
            slot,
            path,
        }
    }

    /// Slot the stream reads from and writes to.
    #[must_use]
    pub const fn slot(&self) -> usize {
        self.slot
    }

    /// Path the stream was opened with.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Writes a notice line to the adapter's fallback sink.
    pub fn report(&self, message: &str) {
        self.adapter.report(message);
    }

    /// Waits up to `timeout` until a read may return data.
    ///
    /// Returns `false` if the stream is still at end-of-stream.
    pub fn wait_readable(&self, timeout: Duration) -> bool {
        self.adapter.wait_readable(self.slot, timeout)
    }
}

impl Read for EndpointStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.adapter.read(self.slot, buf)?)
    }
}

impl Write for EndpointStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(self.adapter.write(self.slot, buf)?)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(self.adapter.flush(self.slot)?)
    }
}
