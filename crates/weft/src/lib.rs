#![forbid(unsafe_code)]

//! Weft: a reactive, directive-driven UI templating engine.
//!
//! A [`Weft`] instance binds a dynamically-typed data graph to a host node
//! tree. Template text carries `{{ }}` interpolation fields and `e-*` /
//! `on:*` directive attributes; compiling installs fine-grained bindings
//! that re-render exactly the parts a data change affects. There is no
//! virtual-tree diffing pass.
//!
//! ```
//! use weft::prelude::*;
//!
//! let doc = NodeRef::document();
//! let root = NodeRef::element("main");
//! doc.append_child(&root);
//! for child in weft::parse_fragment("<p>Hi {{ name }}</p>").unwrap().children() {
//!     root.append_child(&child);
//! }
//!
//! let app = Weft::builder(root.clone())
//!     .data_json(serde_json::json!({ "name": "ada" }))
//!     .build();
//! app.render();
//! assert_eq!(root.text_content(), "Hi ada");
//!
//! app.data().insert("name", Value::str("grace"));
//! assert_eq!(root.text_content(), "Hi grace");
//! ```

use std::rc::Rc;

use weft_compile::{Binder, Compiler, DelimiterHandler, TemplateLoader};
use weft_dom::NodeRef;
use weft_expr::{Evaluator, Scope};
use weft_reactive::{ReactiveMap, Value, Watch, WatchRegistry};

pub use weft_compile::{InMemoryLoader, LoadError};
pub use weft_dom::{DomEvent, MarkupError, NodeType, inner_html, outer_html, parse_fragment};
pub use weft_expr::{EvalError, Expr, ParseError};
pub use weft_reactive::{
    CaptureSession, ListChange, ListOp, ReactiveList, ReactiveProperty, open_capture,
};

/// Common imports for template-driven applications.
pub mod prelude {
    pub use crate::{Weft, WeftBuilder};
    pub use weft_dom::NodeRef;
    pub use weft_reactive::{ReactiveList, ReactiveMap, Value};
}

/// Configures and builds a [`Weft`] instance.
pub struct WeftBuilder {
    root: NodeRef,
    data: ReactiveMap,
    globals: ReactiveMap,
    loader: Option<Rc<dyn TemplateLoader>>,
}

impl WeftBuilder {
    /// Root data map for the instance.
    #[must_use]
    pub fn data(mut self, data: ReactiveMap) -> Self {
        self.data = data;
        self
    }

    /// Root data from a JSON object. Non-object values are rejected with a
    /// log and leave the previous data in place.
    #[must_use]
    pub fn data_json(self, json: serde_json::Value) -> Self {
        match Value::from_json(json) {
            Value::Map(map) => self.data(map),
            other => {
                tracing::error!(got = other.type_name(), "instance data must be an object");
                self
            }
        }
    }

    /// Ambient globals, shadowed by instance data.
    #[must_use]
    pub fn globals(mut self, globals: ReactiveMap) -> Self {
        self.globals = globals;
        self
    }

    /// Loader consulted by `e-req` and unregistered `e-include` names.
    #[must_use]
    pub fn loader(mut self, loader: Rc<dyn TemplateLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    #[must_use]
    pub fn build(self) -> Weft {
        let evaluator = Rc::new(Evaluator::new());
        let registry = Rc::new(WatchRegistry::new());
        let delimiters = DelimiterHandler::new();
        let binder = Binder::new(Rc::clone(&evaluator), Rc::clone(&registry), delimiters);
        let compiler = Compiler::new(
            Rc::clone(&evaluator),
            binder,
            delimiters,
            Rc::clone(&registry),
            self.loader,
        );
        Weft {
            root: self.root,
            scope: Scope::with_globals(self.data, self.globals),
            evaluator,
            registry,
            compiler,
        }
    }
}

/// One templating instance: a root node, its data scope, and the compiler
/// wiring. Handles are `Rc`-based; the instance is single-threaded.
pub struct Weft {
    root: NodeRef,
    scope: Scope,
    evaluator: Rc<Evaluator>,
    registry: Rc<WatchRegistry>,
    compiler: Compiler,
}

impl Weft {
    /// Start building an instance over `root`.
    #[must_use]
    pub fn builder(root: NodeRef) -> WeftBuilder {
        WeftBuilder {
            root,
            data: ReactiveMap::new(),
            globals: ReactiveMap::new(),
            loader: None,
        }
    }

    /// Compile the root subtree. Call once after construction; afterwards
    /// the installed bindings keep the tree current.
    pub fn render(&self) {
        self.compiler.compile(&self.root, &self.scope);
    }

    /// The root node this instance owns.
    #[must_use]
    pub fn root(&self) -> &NodeRef {
        &self.root
    }

    /// The instance's data root.
    #[must_use]
    pub fn data(&self) -> &ReactiveMap {
        self.scope.data()
    }

    /// The ambient globals map.
    #[must_use]
    pub fn globals(&self) -> &ReactiveMap {
        self.scope.globals()
    }

    /// Register markup under a name for `e-include`.
    pub fn register_template(&self, name: impl Into<String>, content: impl Into<String>) {
        self.compiler.register_template(name, content);
    }

    /// Evaluate an expression against the instance scope.
    #[must_use]
    pub fn eval(&self, src: &str) -> Value {
        self.evaluator.exec(&self.scope, src)
    }

    /// Write a value through a path expression (`user.name`). Returns
    /// whether the write landed.
    pub fn assign(&self, path: &str, value: Value) -> bool {
        self.evaluator.assign(&self.scope, path, value)
    }

    /// Watch one root data property. The watch is always-live (never swept);
    /// destroy it explicitly when done.
    pub fn watch(
        &self,
        key: &str,
        callback: impl Fn(&Value, &Value) + 'static,
    ) -> Option<Watch> {
        match self.scope.data().property(key) {
            Some(prop) => Some(prop.watch(callback)),
            None => {
                tracing::warn!(key, "watch target is not a data property");
                None
            }
        }
    }

    /// Evict bindings whose nodes have left the tree. The host calls this
    /// at its own cadence; returns the eviction count.
    pub fn sweep(&self) -> usize {
        self.registry.sweep()
    }

    /// Number of registry-tracked (node-gated) watches.
    #[must_use]
    pub fn tracked_watches(&self) -> usize {
        self.registry.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prelude::*;

    fn app(markup: &str, data: serde_json::Value) -> (Weft, NodeRef, NodeRef) {
        let doc = NodeRef::document();
        let root = NodeRef::element("main");
        doc.append_child(&root);
        for child in parse_fragment(markup).unwrap().children() {
            root.append_child(&child);
        }
        let app = Weft::builder(root.clone()).data_json(data).build();
        app.render();
        (app, root, doc)
    }

    #[test]
    fn end_to_end_interpolation() {
        let (app, root, _doc) = app("<p>{{ greeting }}, {{ who }}</p>", serde_json::json!({
            "greeting": "hello",
            "who": "world",
        }));
        assert_eq!(root.text_content(), "hello, world");

        app.data().insert("who", Value::str("weft"));
        assert_eq!(root.text_content(), "hello, weft");
    }

    #[test]
    fn globals_are_shadowed_by_data() {
        let doc = NodeRef::document();
        let root = NodeRef::element("main");
        doc.append_child(&root);
        for child in parse_fragment("<p>{{ x }}{{ g }}</p>").unwrap().children() {
            root.append_child(&child);
        }
        let globals = ReactiveMap::from_entries([
            ("x".to_string(), Value::str("shadowed")),
            ("g".to_string(), Value::str("!")),
        ]);
        let app = Weft::builder(root.clone())
            .data_json(serde_json::json!({ "x": "data" }))
            .globals(globals)
            .build();
        app.render();
        assert_eq!(root.text_content(), "data!");
    }

    #[test]
    fn watch_and_assign() {
        let (app, _root, _doc) = app("<p>{{ n }}</p>", serde_json::json!({ "n": 1 }));
        let seen = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let sink = std::rc::Rc::clone(&seen);
        let watch = app
            .watch("n", move |new, old| {
                sink.borrow_mut().push((new.clone(), old.clone()));
            })
            .unwrap();

        assert!(app.assign("n", Value::Num(2.0)));
        assert_eq!(
            seen.borrow().as_slice(),
            [(Value::Num(2.0), Value::Num(1.0))]
        );
        watch.destroy();
    }

    #[test]
    fn eval_reads_scope() {
        let (app, _root, _doc) = app("<p></p>", serde_json::json!({ "a": 2, "b": 3 }));
        assert_eq!(app.eval("a * b"), Value::Num(6.0));
    }
}
