//! Event hub
//!
//! A typed event dispatcher composed by the connection and overlay types.
//! Listeners fire synchronously, in registration order; a duplicate
//! registration fires twice. A listener that panics is not caught and
//! propagates to the emitter.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc;

type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Handle returned by [`EventHub::subscribe`], used to remove a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Ordered, synchronous event dispatch for a single event type.
pub struct EventHub<E> {
    listeners: Mutex<Vec<(ListenerId, Listener<E>)>>,
    next_id: AtomicU64,
}

impl<E> Default for EventHub<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> EventHub<E> {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a listener; it is appended after all existing listeners.
    pub fn subscribe(&self, listener: impl Fn(&E) + Send + Sync + 'static) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, Arc::new(listener)));
        id
    }

    /// Remove a previously registered listener.
    ///
    /// Returns `false` if the id was already removed or never existed.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() < before
    }

    /// Invoke every listener with the event, in registration order.
    ///
    /// No-op when nothing is registered. The listener list is snapshotted
    /// first, so a listener may subscribe or unsubscribe without deadlock;
    /// such changes take effect from the next emit.
    pub fn emit(&self, event: &E) {
        let snapshot: Vec<Listener<E>> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in snapshot {
            listener(event);
        }
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }
}

impl<E: Clone + Send + 'static> EventHub<E> {
    /// Register a listener that forwards cloned events into a channel.
    ///
    /// Lets an async task consume events FIFO while emission itself stays
    /// synchronous. Events emitted after the receiver is dropped are
    /// discarded.
    pub fn subscribe_channel(&self) -> mpsc::UnboundedReceiver<E> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribe(move |event: &E| {
            let _ = tx.send(event.clone());
        });
        rx
    }
}

impl<E> std::fmt::Debug for EventHub<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHub")
            .field("listeners", &self.listener_count())
            .finish()
    }
}
