#![forbid(unsafe_code)]

//! Reactive properties: one observable accessor pair per map key.
//!
//! A [`ReactiveProperty`] wraps one key of one [`ReactiveMap`]. Reads emit
//! `BeforeGet`/`AfterGet` on the bus (which is what makes dependency capture
//! work); writes emit `BeforeSet`/`AfterSet` and then synchronously invoke
//! the property's watches in registration order.
//!
//! # Write semantics
//!
//! - Writing a value equal to the current one is a no-op.
//! - Map over map **merges** key-by-key into the existing map, preserving
//!   watches on nested properties; list over list **splices and refills**
//!   the existing list in place, preserving the list handle's identity.
//! - Changing container-ness (map over scalar, scalar over map, and the
//!   list analogues) is a reported error: logged, assignment aborted, prior
//!   value retained. `Null` on either side always permits replacement.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Shape mismatch | map/list assigned over scalar or vice versa | logged, write aborted |
//! | Watch callback panic | bug in host callback | propagates (panics are bugs, not control flow) |

use std::cell::RefCell;
use std::rc::Rc;

use crate::bus::{self, Channel, ReactiveEvent, next_id};
use crate::value::Value;
use crate::watch::{Watch, WatchOptions, WatchOwner};

type WatchCallback = Rc<dyn Fn(&Value, &Value)>;

struct PropWatch {
    watch: Watch,
    callback: WatchCallback,
}

pub(crate) struct PropInner {
    id: u64,
    key: String,
    value: RefCell<Value>,
    watches: RefCell<Vec<PropWatch>>,
}

pub(crate) fn remove_watch(inner: &Rc<PropInner>, watch_id: u64) {
    inner
        .watches
        .borrow_mut()
        .retain(|entry| entry.watch.id() != watch_id);
}

/// Shared handle to one reactive property.
#[derive(Clone)]
pub struct ReactiveProperty {
    inner: Rc<PropInner>,
}

impl ReactiveProperty {
    pub(crate) fn new(key: impl Into<String>, value: Value) -> Self {
        Self {
            inner: Rc::new(PropInner {
                id: next_id(),
                key: key.into(),
                value: RefCell::new(value),
                watches: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Unique property id.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// The property name within its owning map.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.inner.key
    }

    /// Identity comparison.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Tracked read: emits `BeforeGet`/`AfterGet` (feeding any open capture
    /// session) and returns a clone of the current value.
    #[must_use]
    pub fn get(&self) -> Value {
        let event = ReactiveEvent::Get {
            property: self.clone(),
        };
        bus::emit(Channel::BeforeGet, &event);
        let value = self.inner.value.borrow().clone();
        bus::emit(Channel::AfterGet, &event);
        value
    }

    /// Untracked read: no events, no capture.
    #[must_use]
    pub fn peek(&self) -> Value {
        self.inner.value.borrow().clone()
    }

    /// Write a value. See the module docs for merge/splice/shape semantics.
    /// Watches fire synchronously with `(new, old)` before this returns.
    pub fn set(&self, incoming: Value) {
        let old = self.inner.value.borrow().clone();
        if old == incoming {
            return;
        }

        let event = ReactiveEvent::Set {
            property: self.clone(),
            old: old.clone(),
            new: incoming.clone(),
        };
        bus::emit(Channel::BeforeSet, &event);

        match (&old, &incoming) {
            (Value::Map(current), Value::Map(next)) => {
                current.merge_from(next);
            }
            (Value::List(current), Value::List(next)) => {
                current.splice(0, current.len(), next.snapshot());
            }
            (Value::Map(_), other) if !other.is_null() => {
                tracing::error!(
                    key = %self.inner.key,
                    incoming = other.type_name(),
                    "cannot assign non-map over map property; write aborted"
                );
                return;
            }
            (other, Value::Map(_)) if !other.is_null() => {
                tracing::error!(
                    key = %self.inner.key,
                    current = other.type_name(),
                    "cannot assign map over non-map property; write aborted"
                );
                return;
            }
            (Value::List(_), other) if !other.is_null() => {
                tracing::error!(
                    key = %self.inner.key,
                    incoming = other.type_name(),
                    "cannot assign non-list over list property; write aborted"
                );
                return;
            }
            (other, Value::List(_)) if !other.is_null() => {
                tracing::error!(
                    key = %self.inner.key,
                    current = other.type_name(),
                    "cannot assign list over non-list property; write aborted"
                );
                return;
            }
            _ => {
                *self.inner.value.borrow_mut() = incoming.clone();
            }
        }

        let new = self.inner.value.borrow().clone();
        let event = ReactiveEvent::Set {
            property: self.clone(),
            old: old.clone(),
            new: new.clone(),
        };
        bus::emit(Channel::AfterSet, &event);
        self.notify(&new, &old);
    }

    fn notify(&self, new: &Value, old: &Value) {
        // Snapshot so callbacks may add or destroy watches re-entrantly.
        let snapshot: Vec<(Watch, WatchCallback)> = self
            .inner
            .watches
            .borrow()
            .iter()
            .map(|entry| (entry.watch.clone(), Rc::clone(&entry.callback)))
            .collect();
        for (watch, callback) in snapshot {
            if !watch.is_destroyed() {
                callback(new, old);
            }
        }
    }

    /// Subscribe to writes. The callback receives `(new, old)`.
    pub fn watch(&self, callback: impl Fn(&Value, &Value) + 'static) -> Watch {
        self.watch_with(callback, WatchOptions::default())
    }

    /// Subscribe with liveness probe and/or destroy-hook.
    pub fn watch_with(
        &self,
        callback: impl Fn(&Value, &Value) + 'static,
        options: WatchOptions,
    ) -> Watch {
        let watch = Watch::new(WatchOwner::Property(Rc::downgrade(&self.inner)), options);
        self.inner.watches.borrow_mut().push(PropWatch {
            watch: watch.clone(),
            callback: Rc::new(callback),
        });
        watch
    }

    /// Number of registered watches.
    #[must_use]
    pub fn watch_count(&self) -> usize {
        self.inner.watches.borrow().len()
    }
}

impl std::fmt::Debug for ReactiveProperty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactiveProperty")
            .field("id", &self.inner.id)
            .field("key", &self.inner.key)
            .field("value", &self.peek())
            .field("watch_count", &self.watch_count())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
