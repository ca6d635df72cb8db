//! WebSocket client connection state machine.
//!
//! A [`Connection`] owns one network thread running a current-thread
//! tokio runtime. That thread dials, reads frames, drains the outbox,
//! sends keepalive pings and reconnects after failures. Every state
//! transition and every inbound frame is emitted synchronously through
//! the [`EventDispatcher`] on that thread, so a slow subscriber stalls
//! the network side instead of dropping data.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use parking_lot::{Condvar, Mutex};
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use super::frame_sink::FrameSink;
use super::outbox::{OutboundFrame, Outbox};
use super::state::{ConnectionState, ConnectionStatus};
use crate::config::ConnectionConfig;
use crate::domain::{ConnectionId, DataFrame, EventDispatcher, EventPayload, Opcode, WsEvent};
use crate::error::BridgeError;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Extra time `close` waits for the network thread beyond the handshake.
const CLOSE_GRACE: Duration = Duration::from_millis(250);

/// Control block for one `start`..`close` run of the network thread.
#[derive(Debug)]
struct RunControl {
    id: u64,
    closing: AtomicBool,
    shutdown: Notify,
    close_timeout: Mutex<Duration>,
}

impl RunControl {
    fn new(id: u64, close_timeout: Duration) -> Self {
        Self {
            id,
            closing: AtomicBool::new(false),
            shutdown: Notify::new(),
            close_timeout: Mutex::new(close_timeout),
        }
    }

    fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
struct StateCell {
    state: ConnectionState,
    connected_since: Option<DateTime<Utc>>,
    reconnects: u64,
    /// Runs started so far.
    runs: u64,
    /// Run allowed to change state; `None` once forced disconnected.
    active_run: Option<u64>,
}

/// State shared between the owning handle and the network thread.
#[derive(Debug)]
struct Shared {
    id: ConnectionId,
    config: ConnectionConfig,
    dispatcher: EventDispatcher,
    cell: Mutex<StateCell>,
    state_changed: Condvar,
    outbox: Outbox,
}

/// How a connected session ended.
enum SessionEnd {
    /// `close` was requested.
    Shutdown,
    /// The link failed or the peer closed it.
    Lost(Option<String>),
}

#[derive(Debug)]
struct Worker {
    run: Arc<RunControl>,
    handle: JoinHandle<()>,
}

/// Handle to one WebSocket client connection.
///
/// Exactly one network thread exists between [`Connection::start`] and
/// [`Connection::close`]. Dropping the handle closes the connection.
#[derive(Debug)]
pub struct Connection {
    shared: Arc<Shared>,
    worker: Mutex<Option<Worker>>,
}

impl Connection {
    /// Creates a disconnected connection whose events go to `dispatcher`.
    #[must_use]
    pub fn new(config: ConnectionConfig, dispatcher: EventDispatcher) -> Self {
        let outbox = Outbox::new(config.outbox_capacity);
        Self {
            shared: Arc::new(Shared {
                id: ConnectionId::new(),
                config,
                dispatcher,
                cell: Mutex::new(StateCell {
                    state: ConnectionState::Disconnected,
                    connected_since: None,
                    reconnects: 0,
                    runs: 0,
                    active_run: None,
                }),
                state_changed: Condvar::new(),
                outbox,
            }),
            worker: Mutex::new(None),
        }
    }

    /// Returns the connection identifier.
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.shared.id
    }

    /// Returns the configured server URI.
    #[must_use]
    pub fn uri(&self) -> &str {
        &self.shared.config.uri
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.shared.cell.lock().state
    }

    /// Returns a serializable status snapshot.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        let cell = self.shared.cell.lock();
        ConnectionStatus {
            id: self.shared.id,
            uri: self.shared.config.uri.clone(),
            state: cell.state,
            connected_since: cell.connected_since,
            reconnects: cell.reconnects,
            queued_frames: self.shared.outbox.len(),
        }
    }

    /// Begins connecting in the background.
    ///
    /// Emits `BeforeConnect` before returning. Failed attempts are retried
    /// every reconnect interval until [`Connection::close`].
    ///
    /// # Errors
    ///
    /// [`BridgeError::InvalidState`] unless the connection is
    /// `Disconnected`; [`BridgeError::Io`] if the network thread cannot be
    /// spawned.
    pub fn start(&self) -> Result<(), BridgeError> {
        let mut worker = self.worker.lock();
        let actual = self.state();
        if worker.is_some() || actual != ConnectionState::Disconnected {
            return Err(BridgeError::InvalidState {
                expected: ConnectionState::Disconnected,
                actual,
            });
        }

        let run = self.shared.begin_run(self.shared.config.network_timeout);
        self.shared
            .transition(&run, ConnectionState::Connecting, EventPayload::BeforeConnect);
        tracing::info!(uri = %self.shared.config.uri, "connecting");

        let shared = Arc::clone(&self.shared);
        let thread_run = Arc::clone(&run);
        let spawned = std::thread::Builder::new()
            .name("ws-network".to_string())
            .spawn(move || shared.run_network(&thread_run));
        match spawned {
            Ok(handle) => {
                *worker = Some(Worker { run, handle });
                Ok(())
            }
            Err(err) => {
                self.shared.force_disconnected();
                Err(BridgeError::Io(err))
            }
        }
    }

    /// Queues a frame using the network timeout as the queueing bound.
    ///
    /// # Errors
    ///
    /// See [`Connection::send_timeout`].
    pub fn send(&self, payload: &[u8], opcode: Opcode) -> Result<(), BridgeError> {
        self.send_timeout(payload, opcode, self.shared.config.network_timeout)
    }

    /// Queues a frame for the network thread, blocking up to `timeout`.
    ///
    /// # Errors
    ///
    /// [`BridgeError::InvalidOpcode`] for continuation and close opcodes,
    /// [`BridgeError::NotConnected`] outside `Connected`,
    /// [`BridgeError::Timeout`] if the outbox stays full.
    pub fn send_timeout(
        &self,
        payload: &[u8],
        opcode: Opcode,
        timeout: Duration,
    ) -> Result<(), BridgeError> {
        if !matches!(
            opcode,
            Opcode::Text | Opcode::Binary | Opcode::Ping | Opcode::Pong
        ) {
            return Err(BridgeError::InvalidOpcode(opcode.as_u8()));
        }
        if self.state() != ConnectionState::Connected {
            return Err(BridgeError::NotConnected);
        }
        self.shared.outbox.push(
            OutboundFrame {
                opcode,
                payload: payload.to_vec(),
            },
            timeout,
        )
    }

    /// Closes the connection, waiting up to `timeout` for the close
    /// handshake.
    ///
    /// Always leaves the connection `Disconnected`. Closing a connection
    /// that is already disconnected does nothing.
    ///
    /// # Errors
    ///
    /// Currently infallible; the `Result` mirrors the other lifecycle
    /// operations.
    pub fn close(&self, timeout: Duration) -> Result<(), BridgeError> {
        let Some(worker) = self.worker.lock().take() else {
            return Ok(());
        };

        *worker.run.close_timeout.lock() = timeout;
        worker.run.closing.store(true, Ordering::SeqCst);
        worker.run.shutdown.notify_one();
        self.shared.outbox.close();

        let deadline = Instant::now() + timeout + CLOSE_GRACE;
        if self
            .shared
            .wait_for_state(ConnectionState::Disconnected, deadline)
        {
            if worker.handle.join().is_err() {
                tracing::error!("network thread panicked");
            }
        } else {
            tracing::warn!(?timeout, "network thread did not stop in time, forcing disconnect");
            self.shared.force_disconnected();
        }
        tracing::info!(uri = %self.shared.config.uri, "websocket stopped");
        Ok(())
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        let _ = self.close(self.shared.config.network_timeout);
    }
}

impl FrameSink for Connection {
    fn connection_id(&self) -> ConnectionId {
        self.id()
    }

    fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    fn send_frame(
        &self,
        payload: &[u8],
        opcode: Opcode,
        timeout: Duration,
    ) -> Result<(), BridgeError> {
        self.send_timeout(payload, opcode, timeout)
    }

    fn dispatcher(&self) -> &EventDispatcher {
        &self.shared.dispatcher
    }
}

impl Shared {
    fn emit(&self, payload: EventPayload) {
        self.dispatcher.dispatch(&WsEvent::new(self.id, payload));
    }

    /// Starts a run; from now on only its network thread changes state.
    fn begin_run(&self, close_timeout: Duration) -> Arc<RunControl> {
        let mut cell = self.cell.lock();
        cell.runs = cell.runs.wrapping_add(1);
        cell.active_run = Some(cell.runs);
        Arc::new(RunControl::new(cell.runs, close_timeout))
    }

    fn is_active(&self, run: &RunControl) -> bool {
        self.cell.lock().active_run == Some(run.id)
    }

    /// Emits `payload` unless `run` has been superseded.
    fn emit_in(&self, run: &RunControl, payload: EventPayload) {
        if self.is_active(run) {
            self.emit(payload);
        }
    }

    /// Moves to `to` and emits `payload` once, unless `run` is no longer
    /// active, the state is already `to`, or the run is closing and `to`
    /// is not `Disconnected`.
    fn transition(&self, run: &RunControl, to: ConnectionState, payload: EventPayload) -> bool {
        {
            let mut cell = self.cell.lock();
            if cell.active_run != Some(run.id)
                || cell.state == to
                || (run.is_closing() && to != ConnectionState::Disconnected)
            {
                return false;
            }
            if cell.state == ConnectionState::Connected && to == ConnectionState::Connecting {
                cell.reconnects = cell.reconnects.saturating_add(1);
            }
            cell.connected_since = (to == ConnectionState::Connected).then(Utc::now);
            cell.state = to;
        }
        self.state_changed.notify_all();
        tracing::debug!(connection_id = %self.id, state = %to, "state transition");
        self.emit(payload);
        true
    }

    fn force_disconnected(&self) {
        self.outbox.close();
        let changed = {
            let mut cell = self.cell.lock();
            let changed = cell.state != ConnectionState::Disconnected;
            cell.active_run = None;
            cell.state = ConnectionState::Disconnected;
            cell.connected_since = None;
            changed
        };
        self.state_changed.notify_all();
        if changed {
            self.emit(EventPayload::Disconnected);
        }
    }

    fn wait_for_state(&self, target: ConnectionState, deadline: Instant) -> bool {
        let mut cell = self.cell.lock();
        while cell.state != target {
            if self.state_changed.wait_until(&mut cell, deadline).timed_out() {
                return cell.state == target;
            }
        }
        true
    }

    /// Network thread body.
    fn run_network(&self, run: &RunControl) {
        match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime.block_on(self.drive(run)),
            Err(err) => self.emit_in(run, EventPayload::Error {
                message: format!("failed to build network runtime: {err}"),
            }),
        }
        self.outbox.close();
        self.transition(run, ConnectionState::Disconnected, EventPayload::Disconnected);
    }

    /// Connect / session / retry loop. Returns once the run is closing.
    async fn drive(&self, run: &RunControl) {
        let uri = self.config.uri.as_str();
        loop {
            if run.is_closing() {
                return;
            }

            let attempt = tokio::select! {
                () = run.shutdown.notified() => return,
                result = tokio::time::timeout(self.config.network_timeout, connect_async(uri)) => result,
            };

            match attempt {
                Ok(Ok((socket, _response))) => {
                    self.outbox.open();
                    if !self.transition(run, ConnectionState::Connected, EventPayload::Connected) {
                        return;
                    }
                    match self.session(run, socket).await {
                        SessionEnd::Shutdown => return,
                        SessionEnd::Lost(reason) => {
                            self.outbox.close();
                            self.transition(
                                run,
                                ConnectionState::Connecting,
                                EventPayload::Disconnected,
                            );
                            if let Some(message) = reason {
                                tracing::warn!(uri, error = %message, "websocket session lost");
                                self.emit_in(run, EventPayload::Error { message });
                            }
                        }
                    }
                }
                Ok(Err(err)) => {
                    tracing::debug!(uri, error = %err, "connect attempt failed");
                    self.emit_in(run, EventPayload::Error {
                        message: err.to_string(),
                    });
                }
                Err(_) => {
                    self.emit_in(run, EventPayload::Error {
                        message: format!("connect timed out after {:?}", self.config.network_timeout),
                    });
                }
            }

            tokio::select! {
                () = run.shutdown.notified() => return,
                () = tokio::time::sleep(self.config.reconnect_interval) => {}
            }
        }
    }

    /// Runs one connected session until shutdown, failure or peer close.
    async fn session(&self, run: &RunControl, socket: Socket) -> SessionEnd {
        let (mut sink, mut stream) = socket.split();
        let timeout = self.config.network_timeout;
        let mut idle_deadline = tokio::time::Instant::now() + timeout;
        let mut ping = tokio::time::interval_at(
            tokio::time::Instant::now() + self.config.ping_interval,
            self.config.ping_interval,
        );

        loop {
            tokio::select! {
                () = run.shutdown.notified() => {
                    let close_timeout = *run.close_timeout.lock();
                    let frame = CloseFrame { code: CloseCode::Normal, reason: "".into() };
                    if sink.send(Message::Close(Some(frame))).await.is_ok() {
                        let handshake = async {
                            while let Some(Ok(message)) = stream.next().await {
                                if message.is_close() {
                                    self.deliver(message);
                                    break;
                                }
                            }
                        };
                        if tokio::time::timeout(close_timeout, handshake).await.is_err() {
                            tracing::debug!("peer did not acknowledge close in time");
                        }
                    }
                    return SessionEnd::Shutdown;
                }
                () = self.outbox.ready() => {
                    for frame in self.outbox.drain() {
                        if let Err(err) = sink.send(frame.into_message()).await {
                            return SessionEnd::Lost(Some(err.to_string()));
                        }
                    }
                }
                _ = ping.tick() => {
                    if let Err(err) = sink.send(Message::Ping(Vec::new().into())).await {
                        return SessionEnd::Lost(Some(err.to_string()));
                    }
                }
                () = tokio::time::sleep_until(idle_deadline) => {
                    return SessionEnd::Lost(Some(format!("no traffic for {timeout:?}")));
                }
                message = stream.next() => {
                    idle_deadline = tokio::time::Instant::now() + timeout;
                    match message {
                        None => return SessionEnd::Lost(Some("connection reset by peer".to_string())),
                        Some(Err(err)) => return SessionEnd::Lost(Some(err.to_string())),
                        Some(Ok(message)) => {
                            let closed = message.is_close();
                            let needs_flush = closed || message.is_ping();
                            self.deliver(message);
                            if needs_flush {
                                // Queued pong / close reply goes out on flush.
                                let _ = sink.flush().await;
                            }
                            if closed {
                                return SessionEnd::Lost(None);
                            }
                        }
                    }
                }
            }
        }
    }

    /// Emits the events for one inbound message.
    fn deliver(&self, message: Message) {
        match message {
            Message::Text(text) => self.emit_chunks(Opcode::Text, text.as_bytes()),
            Message::Binary(bytes) => self.emit_chunks(Opcode::Binary, &bytes),
            Message::Ping(bytes) => self.emit(EventPayload::DataReceived(DataFrame::whole(
                Opcode::Ping,
                bytes.to_vec(),
            ))),
            Message::Pong(bytes) => self.emit(EventPayload::DataReceived(DataFrame::whole(
                Opcode::Pong,
                bytes.to_vec(),
            ))),
            Message::Close(frame) => {
                let Some(frame) = frame else {
                    self.emit(EventPayload::DataReceived(DataFrame::whole(
                        Opcode::Close,
                        Vec::new(),
                    )));
                    return;
                };
                let code = u16::from(frame.code);
                let reason = frame.reason.as_str().to_owned();
                let mut payload = code.to_be_bytes().to_vec();
                payload.extend_from_slice(reason.as_bytes());
                self.emit(EventPayload::DataReceived(DataFrame::whole(
                    Opcode::Close,
                    payload,
                )));
                self.emit(EventPayload::ClosedWithCode { code, reason });
            }
            Message::Frame(_) => {}
        }
    }

    /// Emits a payload as one or more data events of at most
    /// `rx_chunk_size` bytes.
    fn emit_chunks(&self, opcode: Opcode, bytes: &[u8]) {
        let total_len = bytes.len();
        if total_len == 0 {
            self.emit(EventPayload::DataReceived(DataFrame::whole(opcode, Vec::new())));
            return;
        }
        let mut offset = 0;
        for piece in bytes.chunks(self.config.rx_chunk_size.max(1)) {
            let end = offset + piece.len();
            self.emit(EventPayload::DataReceived(DataFrame {
                opcode,
                payload: piece.to_vec(),
                is_final: end == total_len,
                offset,
                total_len,
            }));
            offset = end;
        }
    }
}
