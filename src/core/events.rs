//! Change notification for the presentation layer
//!
//! Observers are plain callbacks. They are invoked after a mutation has been
//! fully applied and after every lock has been released, so a callback may
//! read the store (or even mutate it) without deadlocking.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use super::BlockId;

/// Something observable happened to a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelEvent {
    /// A block was appended
    BlockAdded(BlockId),
    /// A block was patched
    BlockUpdated(BlockId),
    /// A block was removed
    BlockRemoved(BlockId),
    /// The document title changed
    TitleChanged,
    /// A run result was recorded for a block
    RunRecorded(BlockId),
    /// A block's run results were discarded
    RunDiscarded(BlockId),
}

impl ModelEvent {
    /// Block the event concerns, if any
    pub fn block_id(&self) -> Option<BlockId> {
        match self {
            ModelEvent::BlockAdded(id)
            | ModelEvent::BlockUpdated(id)
            | ModelEvent::BlockRemoved(id)
            | ModelEvent::RunRecorded(id)
            | ModelEvent::RunDiscarded(id) => Some(*id),
            ModelEvent::TitleChanged => None,
        }
    }
}

type Callback = Arc<dyn Fn(&ModelEvent) + Send + Sync>;

struct ObserverList {
    next_id: AtomicU64,
    callbacks: Mutex<Vec<(u64, Callback)>>,
}

/// Registered observers of one document
#[derive(Clone)]
pub struct Observers {
    inner: Arc<ObserverList>,
}

impl Observers {
    /// Create an empty observer list
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ObserverList {
                next_id: AtomicU64::new(0),
                callbacks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Register a callback; it stays registered until the returned
    /// [`Subscription`] is dropped or unsubscribed.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ModelEvent) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.callbacks.lock().push((id, Arc::new(callback)));
        Subscription {
            id,
            observers: Arc::downgrade(&self.inner),
        }
    }

    /// Deliver an event to every current observer
    pub fn notify(&self, event: &ModelEvent) {
        let callbacks: Vec<Callback> = self
            .inner
            .callbacks
            .lock()
            .iter()
            .map(|(_, cb)| cb.clone())
            .collect();
        for cb in callbacks {
            cb(event);
        }
    }

    /// Number of registered observers
    pub fn len(&self) -> usize {
        self.inner.callbacks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Observers {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle returned by `subscribe`; dropping it detaches the callback
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    observers: Weak<ObserverList>,
}

impl Subscription {
    /// Detach the callback now
    pub fn unsubscribe(self) {
        // Drop does the work.
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(list) = self.observers.upgrade() {
            list.callbacks.lock().retain(|(id, _)| *id != self.id);
        }
    }
}
