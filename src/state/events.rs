//! Event emitter for node contexts.
//!
//! Handlers are registered per event name and removed through the returned
//! [`Listener`] token. Handlers run in registration order.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use crate::types::Value;

/// Event handler. Receives the event payload.
pub type EventHandler = Rc<dyn Fn(&Value)>;

#[derive(Default)]
struct HandlerRegistry {
    handlers: HashMap<String, Vec<(usize, EventHandler)>>,
    next_id: usize,
}

impl HandlerRegistry {
    fn next_id(&mut self) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

#[derive(Clone, Default)]
pub struct EventEmitter {
    registry: Rc<RefCell<HandlerRegistry>>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to `event`. Dropping the returned token does not unsubscribe;
    /// call [`Listener::off`].
    pub fn on(&self, event: &str, handler: impl Fn(&Value) + 'static) -> Listener {
        let id = {
            let mut reg = self.registry.borrow_mut();
            let id = reg.next_id();
            reg.handlers
                .entry(event.to_string())
                .or_default()
                .push((id, Rc::new(handler)));
            id
        };
        Listener {
            registry: Rc::downgrade(&self.registry),
            event: event.to_string(),
            id,
        }
    }

    /// Call every handler registered for `event`.
    ///
    /// Handlers may subscribe or unsubscribe while being called; those
    /// changes take effect from the next emit.
    pub fn emit(&self, event: &str, payload: &Value) {
        let handlers: Vec<EventHandler> = self
            .registry
            .borrow()
            .handlers
            .get(event)
            .map(|handlers| handlers.iter().map(|(_, h)| h.clone()).collect())
            .unwrap_or_default();

        for handler in handlers {
            handler(payload);
        }
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.registry
            .borrow()
            .handlers
            .get(event)
            .map_or(0, Vec::len)
    }
}

/// Unsubscribe token returned by [`EventEmitter::on`].
#[must_use = "keep the listener to be able to unsubscribe"]
pub struct Listener {
    registry: Weak<RefCell<HandlerRegistry>>,
    event: String,
    id: usize,
}

impl Listener {
    pub fn off(self) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        let mut reg = registry.borrow_mut();
        if let Some(handlers) = reg.handlers.get_mut(&self.event) {
            handlers.retain(|(handler_id, _)| *handler_id != self.id);
            if handlers.is_empty() {
                reg.handlers.remove(&self.event);
            }
        }
    }
}
