//! Byte stream the console is bound to.

use std::io::{Read, Write};
use std::time::Duration;

use crate::stream::EndpointStream;

/// Bidirectional console stream.
///
/// `read` returning `Ok(0)` is end-of-stream; the console then waits in
/// [`ConsoleIo::wait_readable`] until the stream may carry data again.
pub trait ConsoleIo: Read + Write + Send {
    /// Waits up to `timeout` for the stream to leave end-of-stream.
    fn wait_readable(&self, timeout: Duration) -> bool;

    /// Shows `message` to the user outside the stream, e.g. while the
    /// stream cannot be written.
    fn report(&self, _message: &str) {}
}

impl ConsoleIo for EndpointStream {
    fn wait_readable(&self, timeout: Duration) -> bool {
        Self::wait_readable(self, timeout)
    }

    fn report(&self, message: &str) {
        Self::report(self, message);
    }
}
