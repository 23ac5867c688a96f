//! Snapshot subscribers.

use crate::engine::snapshot::Snapshot;
use std::sync::{Arc, Mutex, PoisonError, Weak};

type Listener<D> = Arc<dyn Fn(&Snapshot<D>) + Send + Sync>;

struct Registry<D> {
    next_id: u64,
    listeners: Vec<(u64, Listener<D>)>,
}

/// The subscriber list of one machine.
pub(crate) struct Subscribers<D> {
    registry: Arc<Mutex<Registry<D>>>,
}

impl<D: 'static> Subscribers<D> {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                next_id: 0,
                listeners: Vec::new(),
            })),
        }
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Snapshot<D>) + Send + Sync + 'static,
    {
        let id = {
            let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
            let id = registry.next_id;
            registry.next_id += 1;
            registry.listeners.push((id, Arc::new(callback)));
            id
        };

        let registry: Weak<Mutex<Registry<D>>> = Arc::downgrade(&self.registry);
        Subscription {
            cancel: Some(Box::new(move || {
                if let Some(registry) = registry.upgrade() {
                    registry
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .listeners
                        .retain(|(listener, _)| *listener != id);
                }
            })),
        }
    }

    /// Call every listener in registration order.
    ///
    /// Listeners are copied out first, so a callback may subscribe or cancel
    /// without deadlocking; such changes apply from the next snapshot.
    pub fn notify(&self, snapshot: &Snapshot<D>) {
        let listeners: Vec<Listener<D>> = self
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .listeners
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(snapshot);
        }
    }

    pub fn len(&self) -> usize {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .listeners
            .len()
    }
}

/// Handle to a registered update callback.
///
/// Dropping the handle unregisters the callback. Call [`Subscription::detach`]
/// to keep it registered for the lifetime of the machine instead.
#[must_use = "dropping a Subscription immediately unregisters its callback"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Unregister the callback. It will not be called again.
    pub fn cancel(mut self) {
        self.release();
    }

    /// Keep the callback registered without holding the handle.
    pub fn detach(mut self) {
        self.cancel = None;
    }

    fn release(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}
