//! The console loop and its worker thread.
//!
//! The loop is bound to one stream: it prints a prompt, reads a line,
//! dispatches it through the [`CommandRegistry`] and writes the outcome
//! back to the same stream. End-of-stream parks the loop until the
//! stream carries data again.

use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;

use super::io::ConsoleIo;
use super::line_editor::{LineEditor, LineRead};
use super::registry::CommandRegistry;
use crate::config::ConsoleConfig;
use crate::error::{BridgeError, CommandError};
use crate::stream::StreamAdapter;

/// Interval at which a parked loop re-checks for shutdown.
const PARK_POLL: Duration = Duration::from_millis(200);

const BANNER: &str = "\n\
Type 'help' to get the list of commands.\n\
Press TAB when typing a command name to auto-complete.\n";

/// Where the console loop is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleState {
    /// Between lines.
    Idle,
    /// Waiting for a complete line.
    ReadingLine,
    /// Running a command.
    Dispatching,
    /// The stream could not be opened; the worker has exited.
    Stopped,
}

/// Result of dispatching one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The line was blank; nothing ran.
    Skipped,
    /// The command ran and returned 0.
    Completed,
    /// The command was not run or failed; the error has been reported.
    Rejected(CommandError),
}

/// Result of one [`ConsoleLoop::step`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// A line was read and dispatched.
    Dispatched(DispatchOutcome),
    /// The stream is at end-of-stream.
    EndOfStream,
    /// No complete line arrived within the read timeout.
    Pending,
}

/// Read-dispatch-report loop over one stream.
pub struct ConsoleLoop<E> {
    registry: Arc<CommandRegistry>,
    editor: E,
    config: ConsoleConfig,
    state: Arc<Mutex<ConsoleState>>,
    banner_pending: bool,
}

impl<E: LineEditor> ConsoleLoop<E> {
    /// Creates an idle loop.
    #[must_use]
    pub fn new(registry: Arc<CommandRegistry>, editor: E, config: ConsoleConfig) -> Self {
        let banner_pending = config.banner;
        Self {
            registry,
            editor,
            config,
            state: Arc::new(Mutex::new(ConsoleState::Idle)),
            banner_pending,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ConsoleState {
        *self.state.lock()
    }

    fn set_state(&self, state: ConsoleState) {
        *self.state.lock() = state;
    }

    /// The line editor.
    #[must_use]
    pub const fn editor(&self) -> &E {
        &self.editor
    }

    /// Dispatches `line` and reports errors to `out`.
    ///
    /// Returns the outcome; none of them ends the loop.
    pub fn dispatch_line(&mut self, line: &str, out: &mut dyn Write) -> DispatchOutcome {
        if line.trim().is_empty() {
            return DispatchOutcome::Skipped;
        }
        self.set_state(ConsoleState::Dispatching);
        self.editor.history_add(line);
        let outcome = match self.registry.dispatch(line, out) {
            Ok(()) => DispatchOutcome::Completed,
            Err(err) => {
                tracing::debug!(line, error = %err, "console command rejected");
                if let Err(io_err) = writeln!(out, "{err}") {
                    tracing::warn!(error = %io_err, "failed to report command error");
                }
                DispatchOutcome::Rejected(err)
            }
        };
        if let Err(io_err) = out.flush() {
            tracing::warn!(error = %io_err, "failed to flush console output");
        }
        self.set_state(ConsoleState::Idle);
        outcome
    }

    /// Reads and dispatches at most one line.
    ///
    /// # Errors
    ///
    /// Stream errors other than a read timeout, e.g. a prompt that
    /// cannot be sent because the connection is down.
    pub fn step(&mut self, io: &mut dyn ConsoleIo) -> io::Result<Step> {
        if self.banner_pending {
            io.write_all(BANNER.as_bytes())?;
            io.flush()?;
            self.banner_pending = false;
        }
        self.set_state(ConsoleState::ReadingLine);
        let read = self.editor.read_line(io, &self.config.prompt);
        self.set_state(ConsoleState::Idle);
        match read {
            Ok(LineRead::Line(line)) => {
                let mut out = &mut *io;
                Ok(Step::Dispatched(self.dispatch_line(&line, &mut out)))
            }
            Ok(LineRead::EndOfStream) => Ok(Step::EndOfStream),
            Err(err) if err.kind() == io::ErrorKind::TimedOut => Ok(Step::Pending),
            Err(err) => Err(err),
        }
    }

    /// Runs until `shutdown` is set.
    pub fn run(&mut self, io: &mut dyn ConsoleIo, shutdown: &AtomicBool) {
        while !shutdown.load(Ordering::Acquire) {
            match self.step(io) {
                Ok(Step::Dispatched(_) | Step::Pending) => {}
                Ok(Step::EndOfStream) => {
                    tracing::debug!("console stream at end-of-stream, parking");
                    park(&*io, shutdown);
                }
                Err(err) => {
                    if is_transient(&err) {
                        tracing::warn!(error = %err, "console stream unavailable, parking");
                        io.report(&format!("console: {err}, waiting for the connection"));
                    } else {
                        tracing::debug!(error = %err, "console stream failed, parking");
                    }
                    std::thread::sleep(PARK_POLL);
                    park(&*io, shutdown);
                }
            }
        }
    }
}

/// Returns `true` for stream errors that clear once the connection is
/// back.
fn is_transient(err: &io::Error) -> bool {
    err.get_ref()
        .and_then(|inner| inner.downcast_ref::<BridgeError>())
        .is_some_and(BridgeError::is_transient)
}

fn park(io: &dyn ConsoleIo, shutdown: &AtomicBool) {
    while !shutdown.load(Ordering::Acquire) {
        if io.wait_readable(PARK_POLL) {
            tracing::debug!("console stream readable again");
            return;
        }
    }
}

impl<E: fmt::Debug> fmt::Debug for ConsoleLoop<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsoleLoop")
            .field("registry", &self.registry)
            .field("editor", &self.editor)
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}

/// Owned handle to a console loop running on its own thread.
#[derive(Debug)]
pub struct ConsoleWorker {
    shutdown: Arc<AtomicBool>,
    state: Arc<Mutex<ConsoleState>>,
    handle: Option<JoinHandle<Result<(), BridgeError>>>,
}

impl ConsoleWorker {
    /// Opens `path` on `adapter` and runs the loop on a new thread.
    ///
    /// If the stream cannot be opened the thread logs the error and
    /// exits; [`ConsoleWorker::join`] returns it.
    ///
    /// # Errors
    ///
    /// [`BridgeError::Io`] if the thread cannot be spawned.
    pub fn spawn<E>(
        adapter: Arc<StreamAdapter>,
        path: String,
        registry: Arc<CommandRegistry>,
        editor: E,
        config: ConsoleConfig,
    ) -> Result<Self, BridgeError>
    where
        E: LineEditor + 'static,
    {
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);
        let mut console = ConsoleLoop::new(registry, editor, config);
        let state = Arc::clone(&console.state);
        let handle = std::thread::Builder::new()
            .name("console".to_string())
            .spawn(move || {
                let mut stream = match adapter.open(&path) {
                    Ok(stream) => stream,
                    Err(err) => {
                        console.set_state(ConsoleState::Stopped);
                        tracing::error!(path = %path, error = %err, "failed to open console stream");
                        return Err(err);
                    }
                };
                tracing::info!(path = %path, "console started");
                console.run(&mut stream, &flag);
                tracing::info!(path = %path, "console stopped");
                Ok(())
            })?;
        Ok(Self {
            shutdown,
            state,
            handle: Some(handle),
        })
    }

    /// State of the loop; [`ConsoleState::Stopped`] if the stream could
    /// not be opened.
    #[must_use]
    pub fn state(&self) -> ConsoleState {
        *self.state.lock()
    }

    /// Returns `true` once the worker thread has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Asks the loop to stop after its current read.
    ///
    /// Detaching the endpoint makes a blocked read return at once.
    pub fn request_stop(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    /// Stops the loop and waits for the thread.
    ///
    /// # Errors
    ///
    /// The error the worker exited with, e.g. the stream could not be
    /// opened.
    pub fn join(mut self) -> Result<(), BridgeError> {
        self.request_stop();
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .unwrap_or_else(|_| Err(BridgeError::Transport("console thread panicked".into()))),
            None => Ok(()),
        }
    }
}

impl Drop for ConsoleWorker {
    fn drop(&mut self) {
        self.request_stop();
    }
}
