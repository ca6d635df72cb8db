//! Process-wide registry of stream endpoints.
//!
//! [`StreamAdapter`] owns the endpoint slots under one base path, feeds
//! inbound events into them and serves blocking reads and writes for the
//! streams opened at `<base>/<slot>`. A single instance may be installed
//! process-wide with [`StreamAdapter::register`]; it stays installed
//! until [`StreamAdapter::unregister`].

use std::fmt;
use std::io::Write;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};

use super::endpoint::{Delivery, Endpoint};
use super::handle::EndpointStream;
use crate::client::FrameSink;
use crate::config::AdapterConfig;
use crate::domain::{EventFilter, WsEvent};
use crate::error::BridgeError;

/// Sink that receives writes for slots with no attached endpoint.
pub type FallbackSink = Box<dyn Write + Send>;

static REGISTERED: Mutex<Option<Arc<StreamAdapter>>> = parking_lot::const_mutex(None);

/// Endpoint slots under one base path.
pub struct StreamAdapter {
    config: AdapterConfig,
    slots: RwLock<Vec<Option<Arc<Endpoint>>>>,
    fallback: Mutex<FallbackSink>,
}

impl StreamAdapter {
    /// Creates a standalone adapter with every slot free.
    #[must_use]
    pub fn new(config: AdapterConfig, fallback: FallbackSink) -> Arc<Self> {
        let slots = vec![None; config.max_slots];
        Arc::new(Self {
            config,
            slots: RwLock::new(slots),
            fallback: Mutex::new(fallback),
        })
    }

    /// Creates and installs the process-wide adapter.
    ///
    /// # Errors
    ///
    /// [`BridgeError::AlreadyRegistered`] if one is installed and has not
    /// been torn down with [`StreamAdapter::unregister`].
    pub fn register(config: AdapterConfig, fallback: FallbackSink) -> Result<Arc<Self>, BridgeError> {
        let mut registered = REGISTERED.lock();
        if registered.is_some() {
            return Err(BridgeError::AlreadyRegistered);
        }
        let adapter = Self::new(config, fallback);
        tracing::info!(base_path = %adapter.config.base_path, "stream adapter registered");
        *registered = Some(Arc::clone(&adapter));
        Ok(adapter)
    }

    /// Returns the process-wide adapter.
    ///
    /// # Errors
    ///
    /// [`BridgeError::NotRegistered`] if none is installed.
    pub fn global() -> Result<Arc<Self>, BridgeError> {
        REGISTERED
            .lock()
            .as_ref()
            .map(Arc::clone)
            .ok_or(BridgeError::NotRegistered)
    }

    /// Removes the process-wide adapter and detaches all its endpoints.
    ///
    /// # Errors
    ///
    /// [`BridgeError::NotRegistered`] if none is installed.
    pub fn unregister() -> Result<(), BridgeError> {
        let adapter = REGISTERED.lock().take().ok_or(BridgeError::NotRegistered)?;
        adapter.detach_all();
        tracing::info!(base_path = %adapter.config.base_path, "stream adapter unregistered");
        Ok(())
    }

    /// Adapter settings.
    #[must_use]
    pub const fn config(&self) -> &AdapterConfig {
        &self.config
    }

    /// Path under which `slot` is opened.
    #[must_use]
    pub fn path_for(&self, slot: usize) -> String {
        format!("{}/{slot}", self.config.base_path.trim_end_matches('/'))
    }

    /// Binds `sink` to `slot` and subscribes the endpoint to its events.
    ///
    /// Returns the path to pass to [`StreamAdapter::open`].
    ///
    /// # Errors
    ///
    /// [`BridgeError::InvalidSlot`], [`BridgeError::SlotOccupied`], or
    /// [`BridgeError::ConnectionAlreadyAttached`] if the connection is
    /// bound to another slot.
    pub fn attach(self: &Arc<Self>, sink: Arc<dyn FrameSink>, slot: usize) -> Result<String, BridgeError> {
        let mut slots = self.slots.write();
        let max = slots.len();
        let Some(entry) = slots.get(slot) else {
            return Err(BridgeError::InvalidSlot { slot, max });
        };
        if entry.is_some() {
            return Err(BridgeError::SlotOccupied(slot));
        }
        let connection_id = sink.connection_id();
        if slots
            .iter()
            .flatten()
            .any(|e| e.sink().connection_id() == connection_id)
        {
            return Err(BridgeError::ConnectionAlreadyAttached(connection_id));
        }

        let weak: Weak<Self> = Arc::downgrade(self);
        let subscription =
            sink.dispatcher()
                .subscribe(Some(connection_id), EventFilter::Any, move |event| {
                    let Some(adapter) = weak.upgrade() else {
                        return;
                    };
                    if let Err(err) = adapter.on_event(event) {
                        tracing::error!(
                            slot,
                            kind = %event.kind(),
                            error = %err,
                            "stream endpoint failed to ingest event"
                        );
                    }
                });

        let endpoint = Endpoint::new(
            slot,
            sink,
            subscription,
            self.config.recv_buffer_capacity,
            self.config.send_buffer_capacity,
        );
        if let Some(entry) = slots.get_mut(slot) {
            *entry = Some(Arc::new(endpoint));
        }
        let path = self.path_for(slot);
        tracing::info!(slot, %connection_id, path = %path, "endpoint attached");
        Ok(path)
    }

    /// Unbinds `slot`; readers see end-of-stream once drained.
    ///
    /// # Errors
    ///
    /// [`BridgeError::EndpointNotFound`] if nothing is attached there.
    pub fn detach(&self, slot: usize) -> Result<(), BridgeError> {
        let endpoint = self
            .slots
            .write()
            .get_mut(slot)
            .and_then(Option::take)
            .ok_or(BridgeError::EndpointNotFound(slot))?;
        endpoint.sink().dispatcher().unsubscribe(endpoint.subscription());
        endpoint.shut();
        tracing::info!(slot, "endpoint detached");
        Ok(())
    }

    /// Unbinds every slot.
    pub fn detach_all(&self) {
        let attached: Vec<usize> = self
            .slots
            .read()
            .iter()
            .enumerate()
            .filter_map(|(slot, e)| e.as_ref().map(|_| slot))
            .collect();
        for slot in attached {
            let _ = self.detach(slot);
        }
    }

    /// Opens the stream at `path` (`<base>/<slot>`).
    ///
    /// # Errors
    ///
    /// [`BridgeError::InvalidPath`] for a foreign base or non-numeric
    /// slot, [`BridgeError::InvalidSlot`] for an out-of-range slot,
    /// [`BridgeError::EndpointNotFound`] if the slot is not attached.
    pub fn open(self: &Arc<Self>, path: &str) -> Result<EndpointStream, BridgeError> {
        let slot = self.parse_path(path)?;
        if self.endpoint(slot).is_none() {
            return Err(BridgeError::EndpointNotFound(slot));
        }
        Ok(EndpointStream::new(Arc::clone(self), slot, path.to_string()))
    }

    fn parse_path(&self, path: &str) -> Result<usize, BridgeError> {
        let base = self.config.base_path.trim_end_matches('/');
        let slot = path
            .strip_prefix(base)
            .and_then(|rest| rest.strip_prefix('/'))
            .and_then(|rest| rest.parse::<usize>().ok())
            .ok_or_else(|| BridgeError::InvalidPath(path.to_string()))?;
        let max = self.config.max_slots;
        if slot >= max {
            return Err(BridgeError::InvalidSlot { slot, max });
        }
        Ok(slot)
    }

    fn endpoint(&self, slot: usize) -> Option<Arc<Endpoint>> {
        self.slots.read().get(slot).and_then(Option::as_ref).map(Arc::clone)
    }

    /// Routes an event to the endpoint bound to its connection.
    ///
    /// This is the dispatcher callback; it may block up to the receive
    /// timeout when the inbound buffer is full.
    ///
    /// # Errors
    ///
    /// See [`Endpoint::ingest`].
    pub fn on_event(&self, event: &WsEvent) -> Result<Delivery, BridgeError> {
        let endpoint = self
            .slots
            .read()
            .iter()
            .flatten()
            .find(|e| e.sink().connection_id() == event.connection_id)
            .map(Arc::clone);
        match endpoint {
            Some(endpoint) => endpoint.ingest(event, self.config.recv_timeout),
            None => Ok(Delivery::Ignored),
        }
    }

    /// Blocking read from `slot`; 0 bytes means end-of-stream.
    ///
    /// # Errors
    ///
    /// [`BridgeError::Timeout`] if nothing arrives within the receive
    /// timeout.
    pub fn read(&self, slot: usize, buf: &mut [u8]) -> Result<usize, BridgeError> {
        match self.endpoint(slot) {
            Some(endpoint) => endpoint.read(buf, self.config.recv_timeout),
            None => Ok(0),
        }
    }

    /// Blocking write to `slot`, or to the fallback sink if nothing is
    /// attached there.
    ///
    /// # Errors
    ///
    /// [`BridgeError::NotConnected`], [`BridgeError::Timeout`], or
    /// [`BridgeError::Io`] from the fallback sink.
    pub fn write(&self, slot: usize, data: &[u8]) -> Result<usize, BridgeError> {
        match self.endpoint(slot) {
            Some(endpoint) => endpoint.write(data, self.config.send_timeout),
            None => {
                self.fallback.lock().write_all(data)?;
                Ok(data.len())
            }
        }
    }

    /// Flushes buffered output of `slot`.
    ///
    /// # Errors
    ///
    /// See [`StreamAdapter::write`].
    pub fn flush(&self, slot: usize) -> Result<(), BridgeError> {
        match self.endpoint(slot) {
            Some(endpoint) => endpoint.flush(self.config.send_timeout),
            None => Ok(self.fallback.lock().flush()?),
        }
    }

    /// Writes `message` as one line to the fallback sink.
    ///
    /// Used for notices that cannot go through an endpoint, e.g. while
    /// its connection is down.
    pub fn report(&self, message: &str) {
        let mut fallback = self.fallback.lock();
        if let Err(err) = writeln!(fallback, "{message}").and_then(|()| fallback.flush()) {
            tracing::warn!(error = %err, "failed to write to fallback sink");
        }
    }

    /// Waits up to `timeout` until a read on `slot` may return data.
    pub fn wait_readable(&self, slot: usize, timeout: Duration) -> bool {
        match self.endpoint(slot) {
            Some(endpoint) => endpoint.inbound().wait_readable(timeout),
            None => {
                std::thread::sleep(timeout);
                self.endpoint(slot).is_some()
            }
        }
    }

    /// Returns `true` if an endpoint is bound to `slot`.
    #[must_use]
    pub fn is_attached(&self, slot: usize) -> bool {
        self.endpoint(slot).is_some()
    }
}

impl fmt::Debug for StreamAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let attached = self.slots.read().iter().flatten().count();
        f.debug_struct("StreamAdapter")
            .field("config", &self.config)
            .field("attached", &attached)
            .finish_non_exhaustive()
    }
}
