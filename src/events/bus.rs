//! Listener registry for relay events.
//!
//! [`EventBus`] keys ordered listener lists by [`EventName`]. Dispatch is
//! synchronous, in registration order, and isolated: a panicking listener is
//! logged and the remaining listeners still fire.

use std::collections::HashMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, PoisonError};

use super::types::{EventName, RelayEvent};
use crate::error::RelayError;

/// A registered event callback.
///
/// Identity is the `Arc` allocation: registering two clones of the same
/// `Arc` is a duplicate, and removal requires a clone of the originally
/// registered `Arc`.
pub type Listener = Arc<dyn Fn(&RelayEvent) + Send + Sync>;

/// Ordered, identity-deduplicated publish/subscribe registry.
///
/// Cheap to clone; clones share the same registry.
#[derive(Clone, Default)]
pub struct EventBus {
    listeners: Arc<Mutex<HashMap<EventName, Vec<Listener>>>>,
}

impl EventBus {
    /// Creates an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `listener` to the list for `event`, preserving insertion
    /// order.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::DuplicateListener`] if the same `Arc` is
    /// already registered for `event`.
    pub fn subscribe(&self, event: EventName, listener: Listener) -> Result<(), RelayError> {
        let mut map = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let list = map.entry(event).or_default();
        if list.iter().any(|l| Arc::ptr_eq(l, &listener)) {
            return Err(RelayError::DuplicateListener(event));
        }
        list.push(listener);
        Ok(())
    }

    /// Removes `listener` from the list for `event`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::ListenerNotFound`] if that `Arc` is not
    /// currently registered for `event`.
    pub fn unsubscribe(&self, event: EventName, listener: &Listener) -> Result<(), RelayError> {
        let mut map = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let list = map.entry(event).or_default();
        let Some(position) = list.iter().position(|l| Arc::ptr_eq(l, listener)) else {
            return Err(RelayError::ListenerNotFound(event));
        };
        list.remove(position);
        Ok(())
    }

    /// Invokes every listener registered for the event's name, in
    /// registration order. Publishing with zero listeners is a no-op.
    ///
    /// Each invocation is isolated: a panic in one listener is caught and
    /// logged, and subsequent listeners still fire.
    ///
    /// Returns the number of listeners invoked.
    pub fn publish(&self, event: &RelayEvent) -> usize {
        // Snapshot under the lock so listeners may subscribe/unsubscribe
        // from within their own callback without deadlocking.
        let snapshot: Vec<Listener> = {
            let map = self
                .listeners
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            map.get(&event.name()).cloned().unwrap_or_default()
        };

        for listener in &snapshot {
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                tracing::warn!(event = %event.name(), "listener panicked during dispatch");
            }
        }
        snapshot.len()
    }

    /// Returns the number of listeners currently registered for `event`.
    #[must_use]
    pub fn listener_count(&self, event: EventName) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&event)
            .map_or(0, Vec::len)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let map = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut s = f.debug_struct("EventBus");
        for name in EventName::ALL {
            s.field(name.as_str(), &map.get(&name).map_or(0, Vec::len));
        }
        s.finish()
    }
}
