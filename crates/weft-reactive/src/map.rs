#![forbid(unsafe_code)]

//! Reactive maps: ordered keyed objects whose values are [`ReactiveProperty`]s.
//!
//! Key order is insertion order and is observable: merging an incoming map
//! fires nested watches in the incoming map's key-iteration order, and
//! serialization walks keys in order. Hence `IndexMap` rather than a hashed
//! map.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::bus::next_id;
use crate::property::ReactiveProperty;
use crate::value::Value;

struct MapInner {
    id: u64,
    props: RefCell<IndexMap<String, ReactiveProperty>>,
}

/// Shared handle to a reactive keyed object.
#[derive(Clone)]
pub struct ReactiveMap {
    inner: Rc<MapInner>,
}

impl ReactiveMap {
    /// Create an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::from_entries([])
    }

    /// Create a map from `(key, value)` entries, preserving order.
    pub fn from_entries(entries: impl IntoIterator<Item = (String, Value)>) -> Self {
        let props = entries
            .into_iter()
            .map(|(key, value)| {
                let prop = ReactiveProperty::new(key.clone(), value);
                (key, prop)
            })
            .collect();
        Self {
            inner: Rc::new(MapInner {
                id: next_id(),
                props: RefCell::new(props),
            }),
        }
    }

    /// Unique map id.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Identity comparison.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// The property wrapper for `key`, if present.
    #[must_use]
    pub fn property(&self, key: &str) -> Option<ReactiveProperty> {
        self.inner.props.borrow().get(key).cloned()
    }

    /// Tracked read of `key` (goes through the property accessor, so the
    /// read is captured and emits bus events). `None` when absent.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.property(key).map(|prop| prop.get())
    }

    /// Insert a new property, or write through the existing one (full set
    /// semantics: merge, no-op guard, watch notification). Returns the
    /// property wrapper for `key`.
    pub fn insert(&self, key: impl Into<String>, value: Value) -> ReactiveProperty {
        let key = key.into();
        let existing = self.property(&key);
        match existing {
            Some(prop) => {
                prop.set(value);
                prop
            }
            None => {
                let prop = ReactiveProperty::new(key.clone(), value);
                self.inner.props.borrow_mut().insert(key, prop.clone());
                prop
            }
        }
    }

    /// Whether `key` is present.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.props.borrow().contains_key(key)
    }

    /// Keys in insertion order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.inner.props.borrow().keys().cloned().collect()
    }

    /// Number of properties.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.props.borrow().len()
    }

    /// Whether the map has no properties.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.props.borrow().is_empty()
    }

    /// Merge `incoming` into this map key-by-key, in `incoming`'s key order:
    /// existing properties are written through (preserving their watches),
    /// new keys are inserted. Reads of `incoming` are untracked.
    pub(crate) fn merge_from(&self, incoming: &ReactiveMap) {
        if self.ptr_eq(incoming) {
            return;
        }
        let entries: Vec<(String, Value)> = incoming
            .inner
            .props
            .borrow()
            .iter()
            .map(|(key, prop)| (key.clone(), prop.peek()))
            .collect();
        for (key, value) in entries {
            self.insert(key, value);
        }
    }
}

impl Default for ReactiveMap {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ReactiveMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactiveMap")
            .field("id", &self.inner.id)
            .field("keys", &self.keys())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
