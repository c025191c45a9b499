//! Named events and the synchronous dispatcher.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// An application event: a name plus a JSON payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    /// The event name, e.g. `user.registered`.
    pub name: String,
    /// Event data as JSON.
    pub payload: Value,
}

impl Event {
    /// Create an event.
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }
}

/// A named listener attached to one event name.
#[derive(Clone)]
pub struct Listener {
    name: String,
    event: String,
    handler: Arc<dyn Fn(&Event) + Send + Sync>,
}

impl Listener {
    /// Create a listener with a handler.
    pub fn new<F>(name: impl Into<String>, event: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            event: event.into(),
            handler: Arc::new(handler),
        }
    }

    /// Create a listener that does nothing when invoked. Useful when only
    /// the attachment itself matters (config-registered listeners).
    pub fn named(name: impl Into<String>, event: impl Into<String>) -> Self {
        Self::new(name, event, |_| {})
    }

    /// The listener name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The event name this listener is attached to.
    pub fn event(&self) -> &str {
        &self.event
    }
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("name", &self.name)
            .field("event", &self.event)
            .finish_non_exhaustive()
    }
}

/// The event dispatch capability.
pub trait EventDispatcher: Send + Sync {
    /// Dispatch an event to every listener attached to its name, returning
    /// the event for further use.
    fn dispatch(&self, event: Event) -> Event;

    /// Attach a listener.
    fn listen(&self, listener: Listener);

    /// Names of the listeners attached to an event name.
    fn listeners_for(&self, event_name: &str) -> Vec<String>;
}

/// Shared dispatcher handle flowing through the capability chain.
pub type SharedDispatcher = Arc<dyn EventDispatcher>;

/// The in-process dispatcher.
pub struct Events {
    listeners: RwLock<Vec<Listener>>,
}

impl Events {
    /// Create a dispatcher with no listeners.
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
        }
    }
}

impl Default for Events {
    fn default() -> Self {
        Self::new()
    }
}

impl EventDispatcher for Events {
    fn dispatch(&self, event: Event) -> Event {
        let listeners = self.listeners.read();
        let handlers: Vec<_> = listeners
            .iter()
            .filter(|l| l.event == event.name)
            .cloned()
            .collect();
        drop(listeners);

        tracing::debug!(event = %event.name, listeners = handlers.len(), "dispatching event");
        for listener in &handlers {
            (listener.handler)(&event);
        }
        event
    }

    fn listen(&self, listener: Listener) {
        self.listeners.write().push(listener);
    }

    fn listeners_for(&self, event_name: &str) -> Vec<String> {
        self.listeners
            .read()
            .iter()
            .filter(|l| l.event == event_name)
            .map(|l| l.name.clone())
            .collect()
    }
}
