//! Change-notification bus between a text host and its listeners.
//!
//! Hosts publish a `ChangeEvent` after every buffer mutation, including the
//! ones the sync engine makes itself. Emission is synchronous and may happen
//! re-entrantly from inside a callback (an engine applying an edit while it
//! handles an event).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, Weak};

use crate::host::ChangeEvent;

type Callback = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

/// Subscription handle that unsubscribes automatically when dropped.
///
/// Follows the disposer pattern: hold this value to keep receiving events,
/// drop it (or let it go out of scope) to unsubscribe.
pub struct Subscription {
    bus: Weak<ChangeBus>,
    id: usize,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.unsubscribe(self.id);
        }
    }
}

/// Bus for publishing buffer changes to subscribers.
///
/// Wrap in `Arc` to enable subscriptions.
pub struct ChangeBus {
    callbacks: RwLock<Vec<(usize, Callback)>>,
    next_id: AtomicUsize,
}

impl Default for ChangeBus {
    fn default() -> Self {
        Self {
            callbacks: RwLock::new(Vec::new()),
            next_id: AtomicUsize::new(0),
        }
    }
}

impl ChangeBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to changes. Returns `Subscription` that unsubscribes on drop.
    pub fn subscribe(
        self: &Arc<Self>,
        callback: impl Fn(&ChangeEvent) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.callbacks
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, Arc::new(callback)));
        Subscription {
            bus: Arc::downgrade(self),
            id,
        }
    }

    fn unsubscribe(&self, id: usize) {
        // try_write: Drop may run during unwinding while emit holds a read lock.
        if let Ok(mut guard) = self.callbacks.try_write() {
            guard.retain(|(i, _)| *i != id);
        }
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.callbacks
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Deliver an event to all subscribers.
    pub fn emit(&self, event: &ChangeEvent) {
        // Snapshot the list so a callback may emit or subscribe.
        let callbacks: Vec<Callback> = self
            .callbacks
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();

        for callback in callbacks {
            callback(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{ContentChange, DocumentId, Position, Range};
    use std::sync::atomic::AtomicUsize;

    fn event(path: &str) -> ChangeEvent {
        ChangeEvent {
            document: DocumentId::from(path),
            changes: vec![ContentChange {
                range: Range::point(Position::new(0, 0)),
                text: "x".into(),
            }],
        }
    }

    #[test]
    fn test_subscribe_and_emit() {
        let bus = Arc::new(ChangeBus::new());
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);

        let _sub = bus.subscribe(move |_event| {
            count_clone.fetch_add(1, Ordering::Relaxed);
        });

        bus.emit(&event("a.rs"));
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_subscription_unsubscribes_on_drop() {
        let bus = Arc::new(ChangeBus::new());
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);

        {
            let _sub = bus.subscribe(move |_event| {
                count_clone.fetch_add(1, Ordering::Relaxed);
            });
            bus.emit(&event("a.rs"));
            assert_eq!(bus.subscriber_count(), 1);
        }

        bus.emit(&event("b.rs"));
        assert_eq!(count.load(Ordering::Relaxed), 1);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_reentrant_emit() {
        let bus = Arc::new(ChangeBus::new());
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);
        let weak = Arc::downgrade(&bus);

        let _sub = bus.subscribe(move |ev| {
            let n = count_clone.fetch_add(1, Ordering::Relaxed);
            // Echo once from inside the callback.
            if n == 0 {
                if let Some(bus) = weak.upgrade() {
                    bus.emit(ev);
                }
            }
        });

        bus.emit(&event("a.rs"));
        assert_eq!(count.load(Ordering::Relaxed), 2);
    }
}
