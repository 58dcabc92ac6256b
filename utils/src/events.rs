//! Synchronous fan-out event bus.
//!
//! Components publish events only after the state change they describe has
//! been committed. Listeners are invoked inline on the emitting thread; keep
//! handlers fast.

use std::sync::{PoisonError, RwLock};

type Listener<E> = Box<dyn Fn(&E) + Send + Sync>;

pub struct EventBus<E> {
    listeners: RwLock<Vec<Listener<E>>>,
}

impl<E> EventBus<E> {
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn subscribe(&self, listener: impl Fn(&E) + Send + Sync + 'static) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::new(listener));
    }

    pub fn emit(&self, event: &E) {
        let listeners = self.listeners.read().unwrap_or_else(PoisonError::into_inner);
        for listener in listeners.iter() {
            listener(event);
        }
    }

    pub fn emit_all(&self, events: &[E]) {
        for event in events {
            self.emit(event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}
