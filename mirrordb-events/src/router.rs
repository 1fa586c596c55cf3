//! Per-store publish/subscribe bus.
//!
//! An [`EventRouter`] is an ordinary value owned by whoever wires a store
//! together and injected into it; there is no process-wide bus. Handlers are
//! keyed by [`EventKey`], one handler per key.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use mirrordb_core::Completion;

use crate::{EventKey, LifecycleEvent};

/// A subscribed handler. It applies the event and returns a completion for
/// the durable writes it issued.
pub type Handler = Arc<dyn Fn(LifecycleEvent) -> Completion + Send + Sync>;

/// Publish/subscribe router keyed by `(namespace, event name)`.
#[derive(Default)]
pub struct EventRouter {
    handlers: RwLock<HashMap<EventKey, Handler>>,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `key`, replacing any previous handler.
    ///
    /// Returns `&self` so registrations can be chained.
    pub fn subscribe<F>(&self, key: EventKey, handler: F) -> &Self
    where
        F: Fn(LifecycleEvent) -> Completion + Send + Sync + 'static,
    {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        if handlers.insert(key.clone(), Arc::new(handler)).is_some() {
            tracing::warn!(key = %key, "replaced existing event handler");
        } else {
            tracing::trace!(key = %key, "subscribed event handler");
        }
        self
    }

    /// Remove the handler for `key`. Returns whether one was registered.
    pub fn unsubscribe(&self, key: &EventKey) -> bool {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .is_some()
    }

    pub fn is_subscribed(&self, key: &EventKey) -> bool {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dispatch `event` to the handler registered under `namespace`.
    ///
    /// Returns `None` when nothing is subscribed; publishing to an unknown key
    /// is a no-op. The handler runs on the caller's thread, so its mirror
    /// mutations are visible as soon as this returns; the durable writes are
    /// tracked by the returned completion.
    pub fn publish(&self, namespace: &str, event: LifecycleEvent) -> Option<Completion> {
        let key = EventKey::new(namespace, event.kind());
        // Release the lock before running the handler.
        let handler = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned();

        match handler {
            Some(handler) => {
                tracing::debug!(key = %key, table = ?event.table(), "dispatching lifecycle event");
                Some(handler(event))
            }
            None => {
                tracing::trace!(key = %key, "no handler subscribed");
                None
            }
        }
    }
}

impl fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        let mut keys: Vec<&str> = handlers.keys().map(EventKey::as_str).collect();
        keys.sort_unstable();
        f.debug_struct("EventRouter").field("keys", &keys).finish()
    }
}
