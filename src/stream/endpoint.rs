//! One connection bound to one stream slot.
//!
//! The inbound [`ByteRing`] is filled by the dispatcher callback on the
//! network thread and drained by the console thread. The outbound line
//! buffer is filled by the console thread and flushed as text frames
//! into the connection's outbox.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::byte_ring::ByteRing;
use super::reassembly::FragmentAssembler;
use crate::client::FrameSink;
use crate::domain::{EventPayload, Opcode, SubscriptionId, WsEvent};
use crate::error::BridgeError;

/// What an endpoint did with one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// A complete message was appended to the inbound buffer.
    Buffered(usize),
    /// A fragment was held for reassembly.
    Partial,
    /// A close frame was seen; nothing was buffered.
    CloseObserved {
        /// Close status code.
        code: u16,
    },
    /// The inbound buffer was reopened.
    Opened,
    /// The inbound buffer was closed for reading.
    Closed,
    /// Payload arrived while closed for reading and was discarded.
    Dropped,
    /// The event carries nothing for the stream.
    Ignored,
}

/// Bridge-side binding of one connection to one slot.
#[derive(Debug)]
pub struct Endpoint {
    slot: usize,
    sink: Arc<dyn FrameSink>,
    subscription: SubscriptionId,
    inbound: ByteRing,
    outbound: Mutex<Vec<u8>>,
    send_capacity: usize,
    assembler: Mutex<FragmentAssembler>,
}

impl Endpoint {
    /// Creates an endpoint; its inbound side starts open only if the
    /// connection is already connected.
    #[must_use]
    pub fn new(
        slot: usize,
        sink: Arc<dyn FrameSink>,
        subscription: SubscriptionId,
        recv_capacity: usize,
        send_capacity: usize,
    ) -> Self {
        let open = sink.is_connected();
        Self {
            slot,
            sink,
            subscription,
            inbound: ByteRing::new(recv_capacity, open),
            outbound: Mutex::new(Vec::with_capacity(send_capacity)),
            send_capacity: send_capacity.max(1),
            assembler: Mutex::new(FragmentAssembler::new()),
        }
    }

    /// Slot this endpoint is bound to.
    #[must_use]
    pub const fn slot(&self) -> usize {
        self.slot
    }

    /// Connection this endpoint is bound to.
    #[must_use]
    pub fn sink(&self) -> &Arc<dyn FrameSink> {
        &self.sink
    }

    /// Dispatcher subscription feeding this endpoint.
    #[must_use]
    pub const fn subscription(&self) -> SubscriptionId {
        self.subscription
    }

    /// Inbound buffer.
    #[must_use]
    pub const fn inbound(&self) -> &ByteRing {
        &self.inbound
    }

    /// Applies one connection event to the endpoint.
    ///
    /// Stream payload is reassembled and appended to the inbound buffer,
    /// waiting up to `recv_timeout` for room. Close frames are only
    /// logged.
    ///
    /// # Errors
    ///
    /// [`BridgeError::FragmentOrder`] for out-of-order fragments,
    /// [`BridgeError::Timeout`] if the reader does not free room in time.
    pub fn ingest(&self, event: &WsEvent, recv_timeout: Duration) -> Result<Delivery, BridgeError> {
        match &event.payload {
            EventPayload::Connected => {
                self.assembler.lock().reset();
                self.inbound.reopen();
                Ok(Delivery::Opened)
            }
            EventPayload::Disconnected | EventPayload::Error { .. } => {
                self.assembler.lock().reset();
                self.inbound.close();
                Ok(Delivery::Closed)
            }
            EventPayload::BeforeConnect | EventPayload::ClosedWithCode { .. } => {
                Ok(Delivery::Ignored)
            }
            EventPayload::DataReceived(frame) => match frame.opcode {
                Opcode::Close => match frame.close_code() {
                    Some(code) => {
                        tracing::info!(slot = self.slot, code, "received close frame");
                        Ok(Delivery::CloseObserved { code })
                    }
                    None => Ok(Delivery::Ignored),
                },
                opcode if !opcode.is_stream_payload() => Ok(Delivery::Ignored),
                _ => {
                    if self.inbound.is_closed() {
                        tracing::debug!(
                            slot = self.slot,
                            len = frame.payload.len(),
                            "dropping payload received while closed"
                        );
                        return Ok(Delivery::Dropped);
                    }
                    let Some(message) = self.assembler.lock().accept(frame)? else {
                        return Ok(Delivery::Partial);
                    };
                    let appended = self.inbound.push(&message, recv_timeout)?;
                    Ok(Delivery::Buffered(appended))
                }
            },
        }
    }

    /// Reads buffered inbound bytes, waiting up to `timeout`.
    ///
    /// # Errors
    ///
    /// [`BridgeError::Timeout`] if nothing arrives in time.
    pub fn read(&self, buf: &mut [u8], timeout: Duration) -> Result<usize, BridgeError> {
        self.inbound.read(buf, timeout)
    }

    /// Appends to the outbound line buffer, flushing it as one text frame
    /// on newline or when full.
    ///
    /// Returns the number of bytes accepted, which may be short when the
    /// buffer fills.
    ///
    /// # Errors
    ///
    /// [`BridgeError::NotConnected`] outside `Connected`,
    /// [`BridgeError::Timeout`] if the connection cannot take the frame in
    /// time. On error the bytes of this call are not kept.
    pub fn write(&self, data: &[u8], timeout: Duration) -> Result<usize, BridgeError> {
        if !self.sink.is_connected() {
            return Err(BridgeError::NotConnected);
        }
        let mut out = self.outbound.lock();
        if out.len() >= self.send_capacity {
            self.flush_locked(&mut out, timeout)?;
        }
        let before = out.len();
        let take = data.len().min(self.send_capacity - before);
        let accepted = data.get(..take).unwrap_or_default();
        out.extend_from_slice(accepted);
        if out.len() >= self.send_capacity || accepted.contains(&b'\n') {
            if let Err(err) = self.flush_locked(&mut out, timeout) {
                out.truncate(before);
                return Err(err);
            }
        }
        Ok(take)
    }

    /// Sends whatever is in the outbound line buffer.
    ///
    /// # Errors
    ///
    /// See [`Endpoint::write`].
    pub fn flush(&self, timeout: Duration) -> Result<(), BridgeError> {
        let mut out = self.outbound.lock();
        self.flush_locked(&mut out, timeout)
    }

    fn flush_locked(&self, out: &mut Vec<u8>, timeout: Duration) -> Result<(), BridgeError> {
        if out.is_empty() {
            return Ok(());
        }
        self.sink.send_frame(out.as_slice(), Opcode::Text, timeout)?;
        out.clear();
        Ok(())
    }

    /// Closes the inbound side for good; used on detach.
    pub fn shut(&self) {
        self.assembler.lock().reset();
        self.inbound.close();
        self.outbound.lock().clear();
    }
}
