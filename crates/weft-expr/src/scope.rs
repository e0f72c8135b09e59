#![forbid(unsafe_code)]

//! Scope assembly: local data + ambient globals + extra locals.
//!
//! Resolution order is locals (innermost first), then the data root, then
//! globals — local data shadows ambient globals, and evaluation-time extras
//! (loop variables, event payloads) shadow both.
//!
//! Scopes are cheap handles: cloning shares the underlying maps, and child
//! scopes layer on top without copying parent layers.

use std::rc::Rc;

use indexmap::IndexMap;

use weft_reactive::{ReactiveMap, ReactiveProperty, Value};

/// One evaluation scope.
#[derive(Clone)]
pub struct Scope {
    data: ReactiveMap,
    globals: ReactiveMap,
    locals: Vec<Rc<IndexMap<String, Value>>>,
}

impl Scope {
    /// Scope over `data` with no globals.
    #[must_use]
    pub fn new(data: ReactiveMap) -> Self {
        Self {
            data,
            globals: ReactiveMap::new(),
            locals: Vec::new(),
        }
    }

    /// Scope over `data` with ambient `globals`.
    #[must_use]
    pub fn with_globals(data: ReactiveMap, globals: ReactiveMap) -> Self {
        Self {
            data,
            globals,
            locals: Vec::new(),
        }
    }

    /// The data root.
    #[must_use]
    pub fn data(&self) -> &ReactiveMap {
        &self.data
    }

    /// The ambient globals.
    #[must_use]
    pub fn globals(&self) -> &ReactiveMap {
        &self.globals
    }

    /// Child scope rooted at a different data map (the `data` directive).
    /// Globals and locals carry over.
    #[must_use]
    pub fn rebased(&self, data: ReactiveMap) -> Self {
        Self {
            data,
            globals: self.globals.clone(),
            locals: self.locals.clone(),
        }
    }

    /// Child scope with one more layer of locals (loop variables, event
    /// payloads). The layer shadows everything beneath it.
    #[must_use]
    pub fn layered(&self, locals: IndexMap<String, Value>) -> Self {
        let mut child = self.clone();
        child.locals.push(Rc::new(locals));
        child
    }

    /// Whether `name` is bound by a locals layer (and therefore not
    /// assignable as a root).
    #[must_use]
    pub fn is_local(&self, name: &str) -> bool {
        self.locals.iter().rev().any(|layer| layer.contains_key(name))
    }

    /// Resolve a bare name. Reads of data/global properties are tracked
    /// (they go through the property accessor); locals are plain values.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<Value> {
        for layer in self.locals.iter().rev() {
            if let Some(value) = layer.get(name) {
                return Some(value.clone());
            }
        }
        if let Some(prop) = self.data.property(name) {
            return Some(prop.get());
        }
        self.globals.property(name).map(|prop| prop.get())
    }

    /// Resolve a bare name to its reactive property, if it is backed by one
    /// (locals are not). Used by assignment.
    #[must_use]
    pub fn resolve_property(&self, name: &str) -> Option<ReactiveProperty> {
        if self.is_local(name) {
            return None;
        }
        self.data
            .property(name)
            .or_else(|| self.globals.property(name))
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("data", &self.data.id())
            .field("locals_layers", &self.locals.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(&str, f64)]) -> ReactiveMap {
        ReactiveMap::from_entries(
            entries
                .iter()
                .map(|(k, v)| ((*k).to_string(), Value::Num(*v))),
        )
    }

    #[test]
    fn data_shadows_globals() {
        let scope = Scope::with_globals(map(&[("x", 1.0)]), map(&[("x", 99.0), ("g", 7.0)]));
        assert_eq!(scope.lookup("x"), Some(Value::Num(1.0)));
        assert_eq!(scope.lookup("g"), Some(Value::Num(7.0)));
        assert_eq!(scope.lookup("missing"), None);
    }

    #[test]
    fn locals_shadow_data() {
        let scope = Scope::new(map(&[("x", 1.0)]));
        let mut layer = IndexMap::new();
        layer.insert("x".to_string(), Value::Num(5.0));
        let child = scope.layered(layer);
        assert_eq!(child.lookup("x"), Some(Value::Num(5.0)));
        assert_eq!(scope.lookup("x"), Some(Value::Num(1.0)), "parent untouched");
    }

    #[test]
    fn inner_layer_shadows_outer() {
        let scope = Scope::new(map(&[]));
        let mut a = IndexMap::new();
        a.insert("i".to_string(), Value::Num(1.0));
        let mut b = IndexMap::new();
        b.insert("i".to_string(), Value::Num(2.0));
        let child = scope.layered(a).layered(b);
        assert_eq!(child.lookup("i"), Some(Value::Num(2.0)));
        assert!(child.is_local("i"));
    }

    #[test]
    fn rebased_keeps_globals() {
        let scope = Scope::with_globals(map(&[("x", 1.0)]), map(&[("g", 7.0)]));
        let rebased = scope.rebased(map(&[("y", 2.0)]));
        assert_eq!(rebased.lookup("y"), Some(Value::Num(2.0)));
        assert_eq!(rebased.lookup("g"), Some(Value::Num(7.0)));
        assert_eq!(rebased.lookup("x"), None, "old data root gone");
    }

    #[test]
    fn resolve_property_skips_locals() {
        let scope = Scope::new(map(&[("x", 1.0)]));
        assert!(scope.resolve_property("x").is_some());
        let mut layer = IndexMap::new();
        layer.insert("x".to_string(), Value::Num(5.0));
        let child = scope.layered(layer);
        assert!(child.resolve_property("x").is_none(), "locals are not assignable roots");
    }
}
