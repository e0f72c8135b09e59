#![forbid(unsafe_code)]

//! Reactive lists: a sequence facade whose mutators are observable.
//!
//! Instead of swapping method-resolution chains (the original design's
//! prototype trick), [`ReactiveList`] is an explicit facade over a vector:
//! the five structural mutators — `push`, `pop`, `shift`, `unshift`,
//! `splice` — emit `BeforeArrayChange`/`AfterArrayChange` on the bus and
//! then invoke the list's watches with a [`ListChange`] record. Non-mutating
//! access is untouched.
//!
//! **Explicit boundary**: plain index assignment ([`set`](ReactiveList::set))
//! does not notify. Loops re-render on structural mutation, not on in-place
//! element overwrites — matching the original engine, where only the
//! intercepted methods were observable.

use std::cell::RefCell;
use std::rc::Rc;

use crate::bus::{self, Channel, ReactiveEvent, next_id};
use crate::value::Value;
use crate::watch::{Watch, WatchOptions, WatchOwner};

/// Which structural mutator ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListOp {
    Push,
    Pop,
    Shift,
    Unshift,
    Splice,
}

/// Delivered to list watches after a structural mutation.
#[derive(Clone)]
pub struct ListChange {
    /// The mutated list.
    pub list: ReactiveList,
    /// The mutator that ran.
    pub op: ListOp,
    /// Shallow snapshot of the contents before the mutation.
    pub before: Vec<Value>,
}

type ListWatchCallback = Rc<dyn Fn(&ListChange)>;

struct ListWatch {
    watch: Watch,
    callback: ListWatchCallback,
}

pub(crate) struct ListInner {
    id: u64,
    items: RefCell<Vec<Value>>,
    watches: RefCell<Vec<ListWatch>>,
}

pub(crate) fn remove_watch(inner: &Rc<ListInner>, watch_id: u64) {
    inner
        .watches
        .borrow_mut()
        .retain(|entry| entry.watch.id() != watch_id);
}

/// Shared handle to a reactive sequence.
#[derive(Clone)]
pub struct ReactiveList {
    inner: Rc<ListInner>,
}

impl ReactiveList {
    /// Create an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::from_values([])
    }

    /// Create a list from values.
    pub fn from_values(values: impl IntoIterator<Item = Value>) -> Self {
        Self {
            inner: Rc::new(ListInner {
                id: next_id(),
                items: RefCell::new(values.into_iter().collect()),
                watches: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Unique list id.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Identity comparison.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.items.borrow().len()
    }

    /// Whether the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.items.borrow().is_empty()
    }

    /// Clone of the element at `index`, if in bounds.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<Value> {
        self.inner.items.borrow().get(index).cloned()
    }

    /// Plain index assignment. **Not observable**: no events, no watch
    /// callbacks (see module docs). Returns `false` when out of bounds.
    pub fn set(&self, index: usize, value: Value) -> bool {
        let mut items = self.inner.items.borrow_mut();
        match items.get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Shallow copy of the current contents.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Value> {
        self.inner.items.borrow().clone()
    }

    /// Append to the end.
    pub fn push(&self, value: Value) {
        self.mutate(ListOp::Push, |items| items.push(value));
    }

    /// Remove and return the last element.
    pub fn pop(&self) -> Option<Value> {
        self.mutate(ListOp::Pop, |items| items.pop())
    }

    /// Remove and return the first element.
    pub fn shift(&self) -> Option<Value> {
        self.mutate(ListOp::Shift, |items| {
            if items.is_empty() {
                None
            } else {
                Some(items.remove(0))
            }
        })
    }

    /// Prepend to the front.
    pub fn unshift(&self, value: Value) {
        self.mutate(ListOp::Unshift, |items| items.insert(0, value));
    }

    /// Remove `delete_count` elements starting at `start` (both clamped to
    /// the list bounds), insert `replacement` in their place, and return the
    /// removed elements.
    pub fn splice(
        &self,
        start: usize,
        delete_count: usize,
        replacement: Vec<Value>,
    ) -> Vec<Value> {
        self.mutate(ListOp::Splice, |items| {
            let start = start.min(items.len());
            let end = start.saturating_add(delete_count).min(items.len());
            items.splice(start..end, replacement).collect()
        })
    }

    fn mutate<R>(&self, op: ListOp, apply: impl FnOnce(&mut Vec<Value>) -> R) -> R {
        let before = self.snapshot();
        let event = ReactiveEvent::ArrayChange {
            list: self.clone(),
            op,
            before: before.clone(),
        };
        bus::emit(Channel::BeforeArrayChange, &event);
        let result = apply(&mut self.inner.items.borrow_mut());
        bus::emit(Channel::AfterArrayChange, &event);
        self.notify(ListChange {
            list: self.clone(),
            op,
            before,
        });
        result
    }

    fn notify(&self, change: ListChange) {
        let snapshot: Vec<(Watch, ListWatchCallback)> = self
            .inner
            .watches
            .borrow()
            .iter()
            .map(|entry| (entry.watch.clone(), Rc::clone(&entry.callback)))
            .collect();
        for (watch, callback) in snapshot {
            if !watch.is_destroyed() {
                callback(&change);
            }
        }
    }

    /// Subscribe to structural mutations.
    pub fn watch(&self, callback: impl Fn(&ListChange) + 'static) -> Watch {
        self.watch_with(callback, WatchOptions::default())
    }

    /// Subscribe with liveness probe and/or destroy-hook.
    pub fn watch_with(
        &self,
        callback: impl Fn(&ListChange) + 'static,
        options: WatchOptions,
    ) -> Watch {
        let watch = Watch::new(WatchOwner::List(Rc::downgrade(&self.inner)), options);
        self.inner.watches.borrow_mut().push(ListWatch {
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

impl Default for ReactiveList {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ReactiveList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactiveList")
            .field("id", &self.inner.id)
            .field("len", &self.len())
            .field("watch_count", &self.watch_count())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
