//! Bounded queue of outbound frames.
//!
//! Producers are blocking callers of [`super::Connection::send`]; the
//! consumer is the network thread, woken through a [`Notify`] so it can
//! wait on the queue inside its `select!` loop.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tokio::sync::Notify;
use tokio_tungstenite::tungstenite::Message;

use crate::domain::Opcode;
use crate::error::BridgeError;

/// A frame waiting to be written to the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundFrame {
    /// Frame opcode: text, binary, ping or pong.
    pub opcode: Opcode,
    /// Frame payload.
    pub payload: Vec<u8>,
}

impl OutboundFrame {
    /// Converts the frame into a transport message.
    ///
    /// Text payloads that are not valid UTF-8 go out as binary.
    #[must_use]
    pub fn into_message(self) -> Message {
        match self.opcode {
            Opcode::Text => match String::from_utf8(self.payload) {
                Ok(text) => Message::text(text),
                Err(err) => Message::binary(err.into_bytes()),
            },
            Opcode::Ping => Message::Ping(self.payload.into()),
            Opcode::Pong => Message::Pong(self.payload.into()),
            _ => Message::binary(self.payload),
        }
    }
}

#[derive(Debug, Default)]
struct Queue {
    frames: VecDeque<OutboundFrame>,
    open: bool,
}

/// Frame queue shared between senders and the network thread.
#[derive(Debug)]
pub struct Outbox {
    queue: Mutex<Queue>,
    not_full: Condvar,
    ready: Notify,
    capacity: usize,
}

impl Outbox {
    /// Creates a closed outbox holding at most `capacity` frames.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(Queue::default()),
            not_full: Condvar::new(),
            ready: Notify::new(),
            capacity: capacity.max(1),
        }
    }

    /// Enqueues a frame, waiting up to `timeout` for room.
    ///
    /// # Errors
    ///
    /// [`BridgeError::NotConnected`] if the outbox is closed before or
    /// while waiting, [`BridgeError::Timeout`] if no room frees up.
    pub fn push(&self, frame: OutboundFrame, timeout: Duration) -> Result<(), BridgeError> {
        let deadline = Instant::now() + timeout;
        let mut queue = self.queue.lock();
        loop {
            if !queue.open {
                return Err(BridgeError::NotConnected);
            }
            if queue.frames.len() < self.capacity {
                break;
            }
            if self.not_full.wait_until(&mut queue, deadline).timed_out()
                && queue.frames.len() >= self.capacity
            {
                return Err(if queue.open {
                    BridgeError::Timeout
                } else {
                    BridgeError::NotConnected
                });
            }
        }
        queue.frames.push_back(frame);
        drop(queue);
        self.ready.notify_one();
        Ok(())
    }

    /// Takes every queued frame.
    pub fn drain(&self) -> Vec<OutboundFrame> {
        let frames: Vec<OutboundFrame> = self.queue.lock().frames.drain(..).collect();
        self.not_full.notify_all();
        frames
    }

    /// Waits until frames may be available.
    pub async fn ready(&self) {
        self.ready.notified().await;
    }

    /// Discards stale frames and starts accepting new ones.
    pub fn open(&self) {
        let mut queue = self.queue.lock();
        queue.frames.clear();
        queue.open = true;
    }

    /// Stops accepting frames and wakes blocked senders.
    pub fn close(&self) {
        let mut queue = self.queue.lock();
        queue.open = false;
        queue.frames.clear();
        drop(queue);
        self.not_full.notify_all();
    }

    /// Returns the number of queued frames.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.lock().frames.len()
    }

    /// Returns `true` if no frames are queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn frame(text: &str) -> OutboundFrame {
        OutboundFrame {
            opcode: Opcode::Text,
            payload: text.as_bytes().to_vec(),
        }
    }

    #[test]
    fn closed_outbox_rejects_frames() {
        let outbox = Outbox::new(2);
        let result = outbox.push(frame("a"), Duration::from_millis(10));
        assert!(matches!(result, Err(BridgeError::NotConnected)));
    }

    #[test]
    fn full_outbox_times_out() {
        let outbox = Outbox::new(1);
        outbox.open();
        assert!(outbox.push(frame("a"), Duration::from_millis(10)).is_ok());
        let result = outbox.push(frame("b"), Duration::from_millis(20));
        assert!(matches!(result, Err(BridgeError::Timeout)));
        assert_eq!(outbox.len(), 1);
    }

    #[test]
    fn drain_unblocks_waiting_sender() {
        let outbox = Arc::new(Outbox::new(1));
        outbox.open();
        assert!(outbox.push(frame("a"), Duration::from_millis(10)).is_ok());

        let producer = Arc::clone(&outbox);
        let waiter =
            std::thread::spawn(move || producer.push(frame("b"), Duration::from_secs(5)));
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(outbox.drain(), vec![frame("a")]);

        let Ok(result) = waiter.join() else {
            panic!("producer thread panicked");
        };
        assert!(result.is_ok());
        assert_eq!(outbox.drain(), vec![frame("b")]);
    }

    #[test]
    fn close_wakes_waiting_sender_with_not_connected() {
        let outbox = Arc::new(Outbox::new(1));
        outbox.open();
        assert!(outbox.push(frame("a"), Duration::from_millis(10)).is_ok());

        let producer = Arc::clone(&outbox);
        let waiter =
            std::thread::spawn(move || producer.push(frame("b"), Duration::from_secs(5)));
        std::thread::sleep(Duration::from_millis(50));
        outbox.close();

        let Ok(result) = waiter.join() else {
            panic!("producer thread panicked");
        };
        assert!(matches!(result, Err(BridgeError::NotConnected)));
        assert!(outbox.is_empty());
    }

    #[test]
    fn invalid_utf8_text_goes_out_as_binary() {
        let message = OutboundFrame {
            opcode: Opcode::Text,
            payload: vec![0xff, 0xfe],
        }
        .into_message();
        assert!(message.is_binary());
        assert!(frame("ok").into_message().is_text());
    }
}
