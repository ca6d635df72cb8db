//! Synchronous fan-out of connection events.
//!
//! [`EventDispatcher`] keeps an ordered subscriber list keyed by
//! connection and event kind. [`EventDispatcher::dispatch`] invokes every
//! matching callback in registration order on the calling thread. There
//! is no queue: a subscriber that blocks stalls the ones after it and the
//! network thread that emitted the event.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use super::{ConnectionId, EventKind, WsEvent};

/// Callback invoked for each matching event.
pub type EventCallback = Arc<dyn Fn(&WsEvent) + Send + Sync>;

/// Handle returned by [`EventDispatcher::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Which event kinds a subscriber wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFilter {
    /// Every event kind.
    Any,
    /// A single event kind.
    Only(EventKind),
}

impl EventFilter {
    /// Returns `true` if the filter accepts `kind`.
    #[must_use]
    pub fn accepts(self, kind: EventKind) -> bool {
        match self {
            Self::Any => true,
            Self::Only(wanted) => wanted == kind,
        }
    }
}

struct Subscriber {
    id: SubscriptionId,
    /// `None` subscribes to every connection.
    connection: Option<ConnectionId>,
    filter: EventFilter,
    callback: EventCallback,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    subscribers: Vec<Subscriber>,
}

/// Process-wide event subscriber registry.
///
/// Cheap to clone; clones share the same subscriber list.
#[derive(Clone, Default)]
pub struct EventDispatcher {
    registry: Arc<RwLock<Registry>>,
}

impl EventDispatcher {
    /// Creates an empty dispatcher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback` for events matching `connection` and `filter`.
    ///
    /// Subscribers are invoked in the order they were registered.
    pub fn subscribe<F>(
        &self,
        connection: Option<ConnectionId>,
        filter: EventFilter,
        callback: F,
    ) -> SubscriptionId
    where
        F: Fn(&WsEvent) + Send + Sync + 'static,
    {
        let mut registry = self.registry.write();
        let id = SubscriptionId(registry.next_id);
        registry.next_id = registry.next_id.wrapping_add(1);
        registry.subscribers.push(Subscriber {
            id,
            connection,
            filter,
            callback: Arc::new(callback),
        });
        id
    }

    /// Removes a subscriber. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut registry = self.registry.write();
        let before = registry.subscribers.len();
        registry.subscribers.retain(|s| s.id != id);
        registry.subscribers.len() != before
    }

    /// Delivers `event` to every matching subscriber, in order.
    ///
    /// The subscriber list is snapshotted first, so callbacks may
    /// subscribe or unsubscribe without deadlocking. Returns the number of
    /// callbacks invoked.
    pub fn dispatch(&self, event: &WsEvent) -> usize {
        let kind = event.kind();
        let targets: Vec<EventCallback> = {
            let registry = self.registry.read();
            registry
                .subscribers
                .iter()
                .filter(|s| s.connection.is_none_or(|c| c == event.connection_id))
                .filter(|s| s.filter.accepts(kind))
                .map(|s| Arc::clone(&s.callback))
                .collect()
        };
        for callback in &targets {
            callback(event);
        }
        targets.len()
    }

    /// Returns the number of registered subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.registry.read().subscribers.len()
    }
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::EventPayload;
    use parking_lot::Mutex;

    fn connected(id: ConnectionId) -> WsEvent {
        WsEvent::new(id, EventPayload::Connected)
    }

    #[test]
    fn dispatch_without_subscribers_returns_zero() {
        let dispatcher = EventDispatcher::new();
        assert_eq!(dispatcher.dispatch(&connected(ConnectionId::new())), 0);
    }

    #[test]
    fn subscribers_run_in_registration_order() {
        let dispatcher = EventDispatcher::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for n in 0..3 {
            let seen = Arc::clone(&seen);
            dispatcher.subscribe(None, EventFilter::Any, move |_| seen.lock().push(n));
        }
        assert_eq!(dispatcher.dispatch(&connected(ConnectionId::new())), 3);
        assert_eq!(*seen.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn filters_by_connection_and_kind() {
        let dispatcher = EventDispatcher::new();
        let mine = ConnectionId::new();
        let hits = Arc::new(Mutex::new(0_u32));

        let counter = Arc::clone(&hits);
        dispatcher.subscribe(
            Some(mine),
            EventFilter::Only(EventKind::Connected),
            move |_| *counter.lock() += 1,
        );

        dispatcher.dispatch(&connected(ConnectionId::new()));
        dispatcher.dispatch(&WsEvent::new(mine, EventPayload::Disconnected));
        dispatcher.dispatch(&connected(mine));
        assert_eq!(*hits.lock(), 1);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let dispatcher = EventDispatcher::new();
        let id = dispatcher.subscribe(None, EventFilter::Any, |_| {});
        assert_eq!(dispatcher.subscriber_count(), 1);
        assert!(dispatcher.unsubscribe(id));
        assert!(!dispatcher.unsubscribe(id));
        assert_eq!(dispatcher.dispatch(&connected(ConnectionId::new())), 0);
    }

    #[test]
    fn callback_may_subscribe_during_dispatch() {
        let dispatcher = EventDispatcher::new();
        let inner = dispatcher.clone();
        dispatcher.subscribe(None, EventFilter::Any, move |_| {
            inner.subscribe(None, EventFilter::Any, |_| {});
        });
        dispatcher.dispatch(&connected(ConnectionId::new()));
        assert_eq!(dispatcher.subscriber_count(), 2);
    }
}
