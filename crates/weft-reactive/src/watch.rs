#![forbid(unsafe_code)]

//! Watches: individual subscriptions on reactive properties and lists.
//!
//! A [`Watch`] pairs one reactive owner with one callback. Template-created
//! watches carry a *liveness probe* — a closure the host-tree layer supplies
//! that answers "is the bound node still attached?" — and register with a
//! [`WatchRegistry`] so a periodic host-driven [`sweep`](WatchRegistry::sweep)
//! can evict them once their node leaves the tree. Watches without a probe
//! are always-live (programmatic `watch`/`react` use) and are never swept.
//!
//! # Invariants
//!
//! 1. A watch belongs to exactly one owner's watch list at a time.
//! 2. `destroy()` removes it from that list and runs the destroy-hook
//!    exactly once; destroying again is a no-op.
//! 3. Callbacks for one owner fire in registration order.
//! 4. After one sweep, no watch whose probe reported dead remains in its
//!    owner's list.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::bus::next_id;
use crate::list;
use crate::property;

/// Optional attachments for a watch.
#[derive(Default)]
pub struct WatchOptions {
    /// Liveness probe; `false` means the watch is dead and the next sweep
    /// destroys it. Absent means always-live.
    pub liveness: Option<Rc<dyn Fn() -> bool>>,
    /// Runs exactly once when the watch is destroyed.
    pub on_destroy: Option<Box<dyn FnOnce()>>,
}

impl WatchOptions {
    /// Options with a liveness probe.
    pub fn live_while(probe: impl Fn() -> bool + 'static) -> Self {
        Self {
            liveness: Some(Rc::new(probe)),
            on_destroy: None,
        }
    }

    /// Add a destroy-hook.
    #[must_use]
    pub fn on_destroy(mut self, hook: impl FnOnce() + 'static) -> Self {
        self.on_destroy = Some(Box::new(hook));
        self
    }
}

pub(crate) enum WatchOwner {
    Property(Weak<property::PropInner>),
    List(Weak<list::ListInner>),
}

pub(crate) struct WatchInner {
    pub(crate) id: u64,
    owner: WatchOwner,
    liveness: Option<Rc<dyn Fn() -> bool>>,
    on_destroy: RefCell<Option<Box<dyn FnOnce()>>>,
    destroyed: Cell<bool>,
}

/// One live subscription. Cloning shares the subscription; [`destroy`]
/// (Watch::destroy) tears it down from any clone.
#[derive(Clone)]
pub struct Watch {
    inner: Rc<WatchInner>,
}

impl Watch {
    pub(crate) fn new(owner: WatchOwner, options: WatchOptions) -> Self {
        Self {
            inner: Rc::new(WatchInner {
                id: next_id(),
                owner,
                liveness: options.liveness,
                on_destroy: RefCell::new(options.on_destroy),
                destroyed: Cell::new(false),
            }),
        }
    }

    /// Unique watch id.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Whether `destroy` has run.
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.get()
    }

    /// Probe liveness: `true` when no probe was attached or the probe says
    /// the associated node is still in the tree.
    #[must_use]
    pub fn is_live(&self) -> bool {
        !self.inner.destroyed.get() && self.inner.liveness.as_ref().is_none_or(|probe| probe())
    }

    /// Whether this watch is auto-swept (has a liveness probe).
    #[must_use]
    pub fn is_node_gated(&self) -> bool {
        self.inner.liveness.is_some()
    }

    /// Remove this watch from its owner's list and run the destroy-hook.
    /// Exactly-once: repeat calls are no-ops.
    pub fn destroy(&self) {
        if self.inner.destroyed.replace(true) {
            return;
        }
        match &self.inner.owner {
            WatchOwner::Property(weak) => {
                if let Some(prop) = weak.upgrade() {
                    property::remove_watch(&prop, self.inner.id);
                }
            }
            WatchOwner::List(weak) => {
                if let Some(list) = weak.upgrade() {
                    list::remove_watch(&list, self.inner.id);
                }
            }
        }
        if let Some(hook) = self.inner.on_destroy.borrow_mut().take() {
            hook();
        }
    }
}

impl std::fmt::Debug for Watch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watch")
            .field("id", &self.inner.id)
            .field("destroyed", &self.inner.destroyed.get())
            .field("node_gated", &self.is_node_gated())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// WatchRegistry — sweep-based eviction
// ---------------------------------------------------------------------------

/// Tracks node-gated watches for periodic eviction.
///
/// The host schedules [`sweep`](WatchRegistry::sweep) at its own cadence
/// (a fixed low-frequency tick in the original design); the registry holds
/// no timer of its own.
#[derive(Default)]
pub struct WatchRegistry {
    watches: RefCell<Vec<Watch>>,
}

impl WatchRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a watch for sweeping. Watches without a liveness probe are
    /// accepted but never evicted by the sweep.
    pub fn track(&self, watch: Watch) {
        self.watches.borrow_mut().push(watch);
    }

    /// Destroy every tracked watch whose liveness probe reports dead, and
    /// forget watches already destroyed elsewhere. Returns the number of
    /// watches destroyed by this sweep.
    pub fn sweep(&self) -> usize {
        let snapshot: Vec<Watch> = self.watches.borrow().clone();
        let mut evicted = 0;
        let mut keep = Vec::with_capacity(snapshot.len());
        for watch in snapshot {
            if watch.is_destroyed() {
                continue;
            }
            if watch.is_node_gated() && !watch.is_live() {
                watch.destroy();
                evicted += 1;
                continue;
            }
            keep.push(watch);
        }
        *self.watches.borrow_mut() = keep;
        evicted
    }

    /// Number of tracked (not yet swept) watches.
    #[must_use]
    pub fn len(&self) -> usize {
        self.watches.borrow().len()
    }

    /// Whether nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.watches.borrow().is_empty()
    }
}

impl std::fmt::Debug for WatchRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchRegistry")
            .field("tracked", &self.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::ReactiveMap;
    use crate::value::Value;

    #[test]
    fn destroy_removes_from_owner() {
        let map = ReactiveMap::new();
        let prop = map.insert("a", Value::Num(0.0));
        let fired = Rc::new(Cell::new(0));
        let f = Rc::clone(&fired);
        let watch = prop.watch(move |_, _| f.set(f.get() + 1));
        assert_eq!(prop.watch_count(), 1);

        prop.set(Value::Num(1.0));
        assert_eq!(fired.get(), 1);

        watch.destroy();
        assert_eq!(prop.watch_count(), 0);
        prop.set(Value::Num(2.0));
        assert_eq!(fired.get(), 1, "destroyed watch must not fire");
    }

    #[test]
    fn destroy_hook_runs_exactly_once() {
        let map = ReactiveMap::new();
        let prop = map.insert("a", Value::Num(0.0));
        let hooked = Rc::new(Cell::new(0));
        let h = Rc::clone(&hooked);
        let watch = prop.watch_with(
            |_, _| {},
            WatchOptions::default().on_destroy(move || h.set(h.get() + 1)),
        );
        watch.destroy();
        watch.destroy();
        assert_eq!(hooked.get(), 1);
    }

    #[test]
    fn sweep_evicts_dead_watches() {
        let map = ReactiveMap::new();
        let prop = map.insert("a", Value::Num(0.0));
        let alive = Rc::new(Cell::new(true));

        let registry = WatchRegistry::new();
        let probe = Rc::clone(&alive);
        let watch = prop.watch_with(|_, _| {}, WatchOptions::live_while(move || probe.get()));
        registry.track(watch.clone());

        assert_eq!(registry.sweep(), 0);
        assert_eq!(prop.watch_count(), 1);

        alive.set(false);
        assert_eq!(registry.sweep(), 1);
        assert_eq!(prop.watch_count(), 0, "swept watch left the owner's list");
        assert!(watch.is_destroyed());
    }

    #[test]
    fn sweep_skips_probeless_watches() {
        let map = ReactiveMap::new();
        let prop = map.insert("a", Value::Num(0.0));
        let registry = WatchRegistry::new();
        registry.track(prop.watch(|_, _| {}));
        assert_eq!(registry.sweep(), 0);
        assert_eq!(registry.len(), 1, "always-live watch stays tracked");
    }

    #[test]
    fn registry_forgets_externally_destroyed() {
        let map = ReactiveMap::new();
        let prop = map.insert("a", Value::Num(0.0));
        let registry = WatchRegistry::new();
        let watch = prop.watch(|_, _| {});
        registry.track(watch.clone());
        watch.destroy();
        assert_eq!(registry.sweep(), 0, "already destroyed, not re-counted");
        assert!(registry.is_empty());
    }
}
