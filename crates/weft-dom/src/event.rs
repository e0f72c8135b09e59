#![forbid(unsafe_code)]

//! Event payloads dispatched through the host tree.
//!
//! A [`DomEvent`] is a shared handle: handlers and the dispatcher see the
//! same flag cells, so `prevent_default` and `stop_propagation` set inside a
//! handler are visible to whoever inspects the event afterwards.

use std::cell::Cell;
use std::rc::Rc;

use weft_reactive::Value;

/// Handle returned by listener registration, used for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(pub(crate) u64);

struct EventInner {
    name: String,
    payload: Value,
    default_prevented: Cell<bool>,
    propagation_stopped: Cell<bool>,
}

/// One dispatched event.
#[derive(Clone)]
pub struct DomEvent {
    inner: Rc<EventInner>,
}

impl DomEvent {
    pub(crate) fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            inner: Rc::new(EventInner {
                name: name.into(),
                payload,
                default_prevented: Cell::new(false),
                propagation_stopped: Cell::new(false),
            }),
        }
    }

    /// The event name (`click`, `input`, ...).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The payload attached at dispatch time.
    #[must_use]
    pub fn payload(&self) -> &Value {
        &self.inner.payload
    }

    /// Mark the host's default action as suppressed.
    pub fn prevent_default(&self) {
        self.inner.default_prevented.set(true);
    }

    #[must_use]
    pub fn default_prevented(&self) -> bool {
        self.inner.default_prevented.get()
    }

    /// Stop remaining listeners on this node from running.
    pub fn stop_propagation(&self) {
        self.inner.propagation_stopped.set(true);
    }

    #[must_use]
    pub fn propagation_stopped(&self) -> bool {
        self.inner.propagation_stopped.get()
    }
}

impl std::fmt::Debug for DomEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DomEvent")
            .field("name", &self.inner.name)
            .field("default_prevented", &self.default_prevented())
            .field("propagation_stopped", &self.propagation_stopped())
            .finish()
    }
}
