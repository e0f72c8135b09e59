#![forbid(unsafe_code)]

//! The directive compiler: walks a host subtree, consumes directive marker
//! attributes, and installs bindings.
//!
//! Collaborators (evaluator, binder, delimiter handler, watch registry,
//! optional template loader) arrive by constructor injection. Per element
//! the dispatch table is a fixed, ordered list; structural directives
//! (`e-if` chains, `e-for`) take over their subtree, everything else falls
//! through to attribute/text binding and child recursion.
//!
//! # Invariants
//!
//! 1. A handled marker attribute is removed before its handler can fail, so
//!    a broken directive is never re-processed.
//! 2. Directive failures are logged; sibling and child processing always
//!    continues.
//! 3. Structural directives replace their elements with one shared comment
//!    placeholder and destroy their previous watches before re-capturing on
//!    each re-run, so the watch set tracks the branches actually evaluated.
//!
//! # Failure Modes
//!
//! | Failure | Behavior |
//! |---------|----------|
//! | Empty expression on a directive that needs one | logged, marker removed, handler skipped |
//! | Delimiters where a programmatic expression is required | logged, marker removed, handler skipped |
//! | `data` result is not a map | logged, children compiled with the outer scope |
//! | Orphan `e-else-if`/`e-else` | warned, marker removed, element processed normally |
//! | Loader failure on `e-req`/`e-include` | logged, element children left as authored |

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use indexmap::IndexMap;

use weft_dom::{NodeRef, NodeType, markup};
use weft_expr::{Evaluator, Scope};
use weft_reactive::{Value, Watch, WatchOptions, WatchRegistry, open_capture};

use crate::binder::{Binder, RecompileFn};
use crate::delimiter::DelimiterHandler;
use crate::directives::{self, LoopSpec, OrderDir};
use crate::loader::TemplateLoader;

const MARKER_SKIP: &str = "e-skip";
const MARKER_DATA: &str = "data";
const MARKER_IF: &str = "e-if";
const MARKER_ELSE_IF: &str = "e-else-if";
const MARKER_ELSE: &str = "e-else";
const MARKER_FOR: &str = "e-for";
const MARKER_SHOW: &str = "e-show";
const MARKER_REQ: &str = "e-req";
const MARKER_INCLUDE: &str = "e-include";
const MARKER_BIND: &str = "e-bind";

struct CompilerInner {
    evaluator: Rc<Evaluator>,
    binder: Binder,
    delimiters: DelimiterHandler,
    registry: Rc<WatchRegistry>,
    loader: Option<Rc<dyn TemplateLoader>>,
    templates: RefCell<ahash::HashMap<String, String>>,
}

/// Cheap-clone handle to the compiler and its collaborators.
#[derive(Clone)]
pub struct Compiler {
    inner: Rc<CompilerInner>,
}

impl Compiler {
    #[must_use]
    pub fn new(
        evaluator: Rc<Evaluator>,
        binder: Binder,
        delimiters: DelimiterHandler,
        registry: Rc<WatchRegistry>,
        loader: Option<Rc<dyn TemplateLoader>>,
    ) -> Self {
        Self {
            inner: Rc::new(CompilerInner {
                evaluator,
                binder,
                delimiters,
                registry,
                loader,
                templates: RefCell::new(ahash::HashMap::default()),
            }),
        }
    }

    /// Register markup under a name for `e-include`.
    pub fn register_template(&self, name: impl Into<String>, content: impl Into<String>) {
        self.inner
            .templates
            .borrow_mut()
            .insert(name.into(), content.into());
    }

    #[must_use]
    pub fn evaluator(&self) -> &Rc<Evaluator> {
        &self.inner.evaluator
    }

    #[must_use]
    pub fn registry(&self) -> &Rc<WatchRegistry> {
        &self.inner.registry
    }

    fn recompile_hook(&self) -> RecompileFn {
        let compiler = self.clone();
        Rc::new(move |node, scope| compiler.compile(node, scope))
    }

    /// Compile one node (and its subtree) against a scope.
    pub fn compile(&self, node: &NodeRef, scope: &Scope) {
        match node.node_type() {
            NodeType::Document => {
                self.compile_children(node, scope);
            }
            NodeType::Text => {
                self.inner
                    .binder
                    .bind_text(scope, node, &self.recompile_hook());
            }
            NodeType::Comment => {}
            NodeType::Element => self.compile_element(node, scope),
        }
    }

    // -- dispatch -----------------------------------------------------------

    fn compile_element(&self, node: &NodeRef, outer_scope: &Scope) {
        // 1. skip
        if node.has_attr(MARKER_SKIP) {
            return;
        }

        // 2. data injection rebases the scope for everything below.
        let mut scope = outer_scope.clone();
        if node.has_attr(MARKER_DATA) {
            if let Some(rebased) = self.handle_data(node, &scope) {
                scope = rebased;
            }
        }

        // 3. conditional chain
        if node.has_attr(MARKER_IF) {
            self.compile_if(node, &scope);
            return;
        }

        // 4. orphan chain continuations
        for marker in [MARKER_ELSE_IF, MARKER_ELSE] {
            if node.has_attr(marker) {
                tracing::warn!(marker, "chain continuation without a preceding e-if");
                node.remove_attr(marker);
            }
        }

        // 5. loop
        if node.has_attr(MARKER_FOR) {
            self.compile_for(node, &scope);
            return;
        }

        // 6. visibility
        if node.has_attr(MARKER_SHOW) {
            self.handle_show(node, &scope);
        }

        // 7./8. markup materialization; the result compiles in recursion
        if node.has_attr(MARKER_REQ) {
            self.handle_req(node, &scope);
        }
        if node.has_attr(MARKER_INCLUDE) {
            self.handle_include(node);
        }

        // 9./10./11. attribute directives (names collected first; handlers
        // remove their markers)
        for name in node.attr_names() {
            if name == MARKER_BIND || name.starts_with("e-bind:") {
                let src = node.attr(&name).unwrap_or_default();
                node.remove_attr(&name);
                let prop = name.strip_prefix("e-bind:").filter(|p| !p.is_empty());
                self.inner.binder.bind_two_way(&scope, node, prop, &src);
            } else if let Some(spec) = directives::parse_event_marker(&name) {
                let src = node.attr(&name).unwrap_or_default();
                node.remove_attr(&name);
                self.handle_event(node, &scope, spec, &src);
            } else if let Some(target) = name.strip_prefix("e-").filter(|t| !t.is_empty()) {
                self.handle_property_bind(node, &scope, &name, target);
            }
        }

        // 12. fall-through: delimiter bindings and child recursion
        for name in node.attr_names() {
            let value = node.attr(&name).unwrap_or_default();
            if self.inner.delimiters.has_delimiters(&value) {
                self.inner.binder.bind_attr(&scope, node, &name);
            }
        }
        self.compile_children(node, &scope);
    }

    /// Recurse into children over a snapshot, skipping any child a
    /// structural directive detached mid-pass (chain arms and loop
    /// templates leave the tree while their former siblings compile).
    fn compile_children(&self, node: &NodeRef, scope: &Scope) {
        for child in node.children() {
            let still_attached = child.parent().is_some_and(|p| p.ptr_eq(node));
            if still_attached {
                self.compile(&child, scope);
            }
        }
    }

    /// Pull a directive's expression, removing the marker attribute. Logs
    /// and yields `None` on an empty expression or, when `programmatic`,
    /// delimiter syntax.
    fn take_expr(&self, node: &NodeRef, marker: &str, programmatic: bool) -> Option<String> {
        let src = node.attr(marker).unwrap_or_default();
        node.remove_attr(marker);
        let src = src.trim().to_string();
        if src.is_empty() {
            tracing::error!(marker, "directive requires an expression");
            return None;
        }
        if programmatic && self.inner.delimiters.has_delimiters(&src) {
            tracing::error!(marker, src, "directive takes an expression, not delimiter text");
            return None;
        }
        Some(src)
    }

    // -- data ---------------------------------------------------------------

    fn handle_data(&self, node: &NodeRef, scope: &Scope) -> Option<Scope> {
        let src = self.take_expr(node, MARKER_DATA, true)?;
        match self.inner.evaluator.exec(scope, &src) {
            Value::Map(map) => Some(scope.rebased(map)),
            other => {
                tracing::error!(
                    src,
                    got = other.type_name(),
                    "data directive must evaluate to a map"
                );
                None
            }
        }
    }

    // -- conditional chain --------------------------------------------------

    fn compile_if(&self, node: &NodeRef, scope: &Scope) {
        let Some(parent) = node.parent() else {
            tracing::warn!("e-if on a detached element; skipped");
            node.remove_attr(MARKER_IF);
            return;
        };

        // An arm whose expression fails take_expr stays in the chain as
        // never-matching, so its element still leaves the tree.
        let arm_of = |cond: Option<String>, element: &NodeRef| Arm {
            kind: match cond {
                Some(_) => ArmKind::Cond,
                None => ArmKind::Broken,
            },
            cond,
            template: element.clone(),
        };

        let mut arms: Vec<Arm> = Vec::new();
        arms.push(arm_of(self.take_expr(node, MARKER_IF, true), node));

        let mut cursor = node.clone();
        while let Some(next) = cursor.next_element_sibling() {
            if next.has_attr(MARKER_ELSE_IF) {
                arms.push(arm_of(self.take_expr(&next, MARKER_ELSE_IF, true), &next));
                cursor = next;
            } else if next.has_attr(MARKER_ELSE) {
                next.remove_attr(MARKER_ELSE);
                arms.push(Arm {
                    kind: ArmKind::Else,
                    cond: None,
                    template: next.clone(),
                });
                break;
            } else {
                break;
            }
        }

        let placeholder = NodeRef::comment("if");
        parent.insert_before(&placeholder, &arms[0].template);
        for arm in &arms {
            arm.template.detach();
        }

        let chain = Rc::new(Chain {
            compiler: self.clone(),
            scope: scope.clone(),
            placeholder,
            arms,
            rendered: RefCell::new(None),
            active: Cell::new(None),
            watches: RefCell::new(Vec::new()),
        });
        Chain::render(&chain);
    }

    // -- loop ---------------------------------------------------------------

    fn compile_for(&self, node: &NodeRef, scope: &Scope) {
        let Some(parent) = node.parent() else {
            tracing::warn!("e-for on a detached element; skipped");
            node.remove_attr(MARKER_FOR);
            return;
        };
        let Some(src) = self.take_expr(node, MARKER_FOR, true) else {
            return;
        };
        let spec = match directives::parse_loop(&src) {
            Ok(spec) => spec,
            Err(error) => {
                tracing::error!(src, %error, "bad loop expression");
                return;
            }
        };

        let placeholder = NodeRef::comment("for");
        parent.insert_before(&placeholder, node);
        node.detach();

        let looped = Rc::new(Loop {
            compiler: self.clone(),
            scope: scope.clone(),
            placeholder,
            template: node.clone(),
            spec,
            rendered: RefCell::new(Vec::new()),
            watches: RefCell::new(Vec::new()),
        });
        Loop::render(&looped);
    }

    // -- visibility ---------------------------------------------------------

    fn handle_show(&self, node: &NodeRef, scope: &Scope) {
        let Some(src) = self.take_expr(node, MARKER_SHOW, true) else {
            return;
        };
        let evaluator = Rc::clone(&self.inner.evaluator);
        let scope = scope.clone();
        let target = node.clone();
        let render: Rc<dyn Fn()> = Rc::new(move || {
            let visible = evaluator.exec(&scope, &src).is_truthy();
            target.set_display(visible);
        });
        self.inner.binder.effect(node, &render);
    }

    // -- loader-backed markup -----------------------------------------------

    fn handle_req(&self, node: &NodeRef, scope: &Scope) {
        let Some(src) = self.take_expr(node, MARKER_REQ, true) else {
            return;
        };
        let Some(loader) = &self.inner.loader else {
            tracing::error!(src, "e-req without a configured loader");
            return;
        };
        let path = self.inner.evaluator.exec(scope, &src).to_string();
        match loader.request(&path) {
            Ok(content) => self.materialize_children(node, &content),
            Err(error) => tracing::error!(path, %error, "template request failed"),
        }
    }

    fn handle_include(&self, node: &NodeRef) {
        let name = node.attr(MARKER_INCLUDE).unwrap_or_default();
        node.remove_attr(MARKER_INCLUDE);
        let name = name.trim();
        if name.is_empty() {
            tracing::error!("e-include requires a template name");
            return;
        }
        let registered = self.inner.templates.borrow().get(name).cloned();
        let content = match registered {
            Some(content) => content,
            None => match &self.inner.loader {
                Some(loader) => match loader.request(name) {
                    Ok(content) => content,
                    Err(error) => {
                        tracing::error!(name, %error, "no template to include");
                        return;
                    }
                },
                None => {
                    tracing::error!(name, "no template registered under this name");
                    return;
                }
            },
        };
        self.materialize_children(node, &content);
    }

    /// Replace `node`'s children with parsed `content`. The new children
    /// compile in the ordinary recursion step afterwards.
    fn materialize_children(&self, node: &NodeRef, content: &str) {
        let fragment = match markup::parse_fragment(content) {
            Ok(fragment) => fragment,
            Err(error) => {
                tracing::error!(%error, "loaded template failed to parse");
                return;
            }
        };
        for child in node.children() {
            child.detach();
        }
        for child in fragment.children() {
            node.append_child(&child);
        }
    }

    // -- events -------------------------------------------------------------

    fn handle_event(
        &self,
        node: &NodeRef,
        scope: &Scope,
        spec: directives::EventSpec,
        src: &str,
    ) {
        let src = src.trim().to_string();
        if src.is_empty() {
            tracing::error!(event = %spec.event, "event marker requires a handler expression");
            return;
        }
        let evaluator = Rc::clone(&self.inner.evaluator);
        let scope = scope.clone();
        let control = node.clone();
        let listener_id: Rc<Cell<Option<weft_dom::ListenerId>>> = Rc::new(Cell::new(None));
        let registered = Rc::clone(&listener_id);
        let id = node.add_listener(spec.event.clone(), move |event| {
            if spec.prevent_default {
                event.prevent_default();
            }
            if spec.stop_propagation {
                event.stop_propagation();
            }
            let mut locals = IndexMap::new();
            locals.insert("event".to_string(), event.payload().clone());
            let handler_scope = scope.layered(locals);
            if let Some((target, value_src)) = directives::split_assignment(&src) {
                let value = evaluator.exec(&handler_scope, value_src);
                if !evaluator.assign(&handler_scope, target, value) {
                    tracing::error!(path = target, "event handler assignment failed");
                }
            } else if let Value::Func(callable) = evaluator.exec(&handler_scope, &src) {
                callable(&[event.payload().clone()]);
            }
            if spec.once
                && let Some(id) = registered.get()
            {
                control.remove_listener(id);
            }
        });
        listener_id.set(Some(id));
    }

    // -- generic property bind ----------------------------------------------

    /// `e-NAME="..."` creates a one-way binding that writes attribute NAME.
    fn handle_property_bind(&self, node: &NodeRef, scope: &Scope, marker: &str, target: &str) {
        let src = node.attr(marker).unwrap_or_default();
        node.remove_attr(marker);
        if src.trim().is_empty() {
            tracing::error!(marker, "property binding requires an expression");
            return;
        }
        if self.inner.delimiters.has_delimiters(&src) {
            // Delimiter form: the value is a template for the target
            // attribute.
            node.set_attr(target, src);
            self.inner.binder.bind_attr(scope, node, target);
        } else {
            let evaluator = Rc::clone(&self.inner.evaluator);
            let scope = scope.clone();
            let element = node.clone();
            let target = target.to_string();
            let render: Rc<dyn Fn()> = Rc::new(move || {
                let value = evaluator.exec(&scope, &src);
                element.set_attr(target.clone(), value.to_string());
            });
            self.inner.binder.effect(node, &render);
        }
    }
}

// ---------------------------------------------------------------------------
// Conditional chain state
// ---------------------------------------------------------------------------

#[derive(PartialEq, Eq, Clone, Copy)]
enum ArmKind {
    Cond,
    Else,
    /// Expression failed at compile time; never matches.
    Broken,
}

struct Arm {
    kind: ArmKind,
    cond: Option<String>,
    template: NodeRef,
}

struct Chain {
    compiler: Compiler,
    scope: Scope,
    placeholder: NodeRef,
    arms: Vec<Arm>,
    rendered: RefCell<Option<NodeRef>>,
    active: Cell<Option<usize>>,
    watches: RefCell<Vec<Watch>>,
}

impl Chain {
    /// Evaluate the chain and show at most one arm. Each run destroys the
    /// previous condition watches and re-captures, so the watch set tracks
    /// the conditions actually evaluated (first match wins, later arms stay
    /// unevaluated).
    fn render(self: &Rc<Self>) {
        for watch in self.watches.borrow_mut().drain(..) {
            watch.destroy();
        }

        let session = open_capture();
        let mut matched = None;
        for (index, arm) in self.arms.iter().enumerate() {
            match arm.kind {
                ArmKind::Broken => {}
                ArmKind::Else => {
                    matched = Some(index);
                    break;
                }
                ArmKind::Cond => {
                    let src = arm.cond.as_deref().unwrap_or_default();
                    if self
                        .compiler
                        .inner
                        .evaluator
                        .exec(&self.scope, src)
                        .is_truthy()
                    {
                        matched = Some(index);
                        break;
                    }
                }
            }
        }
        let props = session.close();

        for prop in props {
            let chain = Rc::clone(self);
            let placeholder = self.placeholder.clone();
            let watch = prop.watch_with(
                move |_, _| Chain::render(&chain),
                WatchOptions::live_while(move || placeholder.is_attached()),
            );
            self.compiler.inner.registry.track(watch.clone());
            self.watches.borrow_mut().push(watch);
        }

        if matched == self.active.get() {
            return;
        }
        if let Some(old) = self.rendered.borrow_mut().take() {
            old.detach();
        }
        self.active.set(matched);
        let Some(index) = matched else { return };
        let Some(parent) = self.placeholder.parent() else {
            return;
        };
        let shown = self.arms[index].template.clone_subtree();
        parent.insert_before(&shown, &self.placeholder);
        self.compiler.compile(&shown, &self.scope);
        *self.rendered.borrow_mut() = Some(shown);
    }
}

// ---------------------------------------------------------------------------
// Loop state
// ---------------------------------------------------------------------------

struct Loop {
    compiler: Compiler,
    scope: Scope,
    placeholder: NodeRef,
    template: NodeRef,
    spec: LoopSpec,
    rendered: RefCell<Vec<NodeRef>>,
    watches: RefCell<Vec<Watch>>,
}

impl Loop {
    /// Re-run the whole pipeline: destroy previous watches, re-capture the
    /// iterable and filter-value reads, apply filter and order, then
    /// recompile every item fresh before the shared placeholder. There is
    /// no keyed reconciliation.
    fn render(self: &Rc<Self>) {
        for watch in self.watches.borrow_mut().drain(..) {
            watch.destroy();
        }

        let evaluator = &self.compiler.inner.evaluator;
        let session = open_capture();
        let iterable = evaluator.exec(&self.scope, &self.spec.iterable_src);
        let filter_value = self
            .spec
            .filter
            .as_ref()
            .map(|filter| evaluator.exec(&self.scope, &filter.value_src));
        let props = session.close();

        let rerun = |this: &Rc<Self>| {
            let chain = Rc::clone(this);
            move || Loop::render(&chain)
        };
        for prop in props {
            let run = rerun(self);
            let placeholder = self.placeholder.clone();
            let watch = prop.watch_with(
                move |_, _| run(),
                WatchOptions::live_while(move || placeholder.is_attached()),
            );
            self.compiler.inner.registry.track(watch.clone());
            self.watches.borrow_mut().push(watch);
        }
        if let Value::List(list) = &iterable {
            let run = rerun(self);
            let placeholder = self.placeholder.clone();
            let watch = list.watch_with(
                move |_| run(),
                WatchOptions::live_while(move || placeholder.is_attached()),
            );
            self.compiler.inner.registry.track(watch.clone());
            self.watches.borrow_mut().push(watch);
        }

        let mut items = materialize_items(&iterable);
        if let Some(filter) = &self.spec.filter {
            items = apply_filter(items, filter, filter_value.as_ref().unwrap_or(&Value::Null));
        }
        if let Some(order) = &self.spec.order {
            apply_order(&mut items, order);
        }

        for old in self.rendered.borrow_mut().drain(..) {
            old.detach();
        }
        let Some(parent) = self.placeholder.parent() else {
            return;
        };
        for (index_value, item) in items {
            let clone = self.template.clone_subtree();
            parent.insert_before(&clone, &self.placeholder);
            let mut locals = IndexMap::new();
            locals.insert(self.spec.item.clone(), item);
            if let Some(index_var) = &self.spec.index {
                locals.insert(index_var.clone(), index_value);
            }
            let item_scope = self.scope.layered(locals);
            self.compiler.compile(&clone, &item_scope);
            self.rendered.borrow_mut().push(clone);
        }
    }
}

fn materialize_items(iterable: &Value) -> Vec<(Value, Value)> {
    match iterable {
        Value::List(list) => list
            .snapshot()
            .into_iter()
            .enumerate()
            .map(|(i, item)| (Value::Num(i as f64), item))
            .collect(),
        Value::Map(map) => map
            .keys()
            .into_iter()
            .map(|key| {
                let value = map.get(&key).unwrap_or(Value::Null);
                (Value::Str(key), value)
            })
            .collect(),
        Value::Null => Vec::new(),
        other => {
            tracing::error!(got = other.type_name(), "loop iterable is not iterable");
            Vec::new()
        }
    }
}

/// Resolve a dotted sub-path against an item. Returns `None` when a
/// segment is missing or the item is not a map at that depth.
fn resolve_item_path(item: &Value, path: &str) -> Option<Value> {
    let mut current = item.clone();
    for segment in path.split('.') {
        current = match current {
            Value::Map(map) => map.get(segment)?,
            _ => return None,
        };
    }
    Some(current)
}

fn apply_filter(
    items: Vec<(Value, Value)>,
    filter: &directives::FilterSpec,
    filter_value: &Value,
) -> Vec<(Value, Value)> {
    // Function-typed filter values take over the whole pipeline step.
    if let Value::Func(callable) = filter_value {
        let input = Value::List(weft_reactive::ReactiveList::from_values(
            items.into_iter().map(|(_, item)| item),
        ));
        let output = callable(&[input]);
        return materialize_items(&output);
    }

    let needle = filter_value.to_string().to_lowercase();
    if needle.is_empty() {
        return items;
    }
    items
        .into_iter()
        .filter(|(_, item)| {
            if filter.keys.is_empty() {
                return item.to_string().to_lowercase().contains(&needle);
            }
            // Keys that do not resolve on an item (scalars included) fall
            // back to the item's own display form.
            filter.keys.iter().any(|key| {
                resolve_item_path(item, key)
                    .unwrap_or_else(|| item.clone())
                    .to_string()
                    .to_lowercase()
                    .contains(&needle)
            })
        })
        .collect()
}

fn apply_order(items: &mut [(Value, Value)], order: &directives::OrderSpec) {
    let sort_key = |item: &Value| match &order.prop {
        Some(prop) => resolve_item_path(item, prop).unwrap_or(Value::Null),
        None => item.clone(),
    };
    items.sort_by(|(_, a), (_, b)| {
        let (a, b) = (sort_key(a), sort_key(b));
        let ordering = compare_values(&a, &b);
        match order.dir {
            OrderDir::Asc => ordering,
            OrderDir::Desc => ordering.reverse(),
        }
    });
}

/// Null compares equal to everything; numbers numerically (NaN equal);
/// everything else by display text.
fn compare_values(a: &Value, b: &Value) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (a, b) {
        (Value::Null, _) | (_, Value::Null) => Ordering::Equal,
        (Value::Num(x), Value::Num(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use weft_reactive::{ReactiveList, ReactiveMap};

    fn compiler() -> Compiler {
        let evaluator = Rc::new(Evaluator::new());
        let registry = Rc::new(WatchRegistry::new());
        let delimiters = DelimiterHandler::new();
        let binder = Binder::new(Rc::clone(&evaluator), Rc::clone(&registry), delimiters);
        Compiler::new(evaluator, binder, delimiters, registry, None)
    }

    fn mount(markup_text: &str) -> (NodeRef, NodeRef) {
        let doc = NodeRef::document();
        let root = NodeRef::element("main");
        doc.append_child(&root);
        let fragment = markup::parse_fragment(markup_text).unwrap();
        for child in fragment.children() {
            root.append_child(&child);
        }
        (doc, root)
    }

    fn scope_from_json(json: serde_json::Value) -> Scope {
        match Value::from_json(json) {
            Value::Map(map) => Scope::new(map),
            _ => panic!("fixture must be an object"),
        }
    }

    #[test]
    fn skip_short_circuits_subtree() {
        let (_doc, root) = mount("<div e-skip><p>{{ missing }}</p></div>");
        let scope = scope_from_json(serde_json::json!({}));
        compiler().compile(&root, &scope);
        let p = &root.children()[0].children()[0];
        assert_eq!(p.text_content(), "{{ missing }}");
    }

    #[test]
    fn data_rebases_child_scope() {
        let (_doc, root) = mount("<section data=\"panel\"><p>{{ title }}</p></section>");
        let scope = scope_from_json(serde_json::json!({
            "title": "outer",
            "panel": { "title": "inner" },
        }));
        compiler().compile(&root, &scope);
        assert_eq!(root.text_content(), "inner");
    }

    #[test]
    fn data_non_map_keeps_outer_scope() {
        let (_doc, root) = mount("<section data=\"title\"><p>{{ title }}</p></section>");
        let scope = scope_from_json(serde_json::json!({ "title": "outer" }));
        compiler().compile(&root, &scope);
        assert_eq!(root.text_content(), "outer");
    }

    #[test]
    fn conditional_chain_shows_one_arm() {
        let (_doc, root) = mount(
            "<p e-if=\"n > 0\">pos</p><p e-else-if=\"n < 0\">neg</p><p e-else>zero</p>",
        );
        let scope = scope_from_json(serde_json::json!({ "n": 1 }));
        compiler().compile(&root, &scope);
        assert_eq!(root.text_content(), "pos");

        scope.data().insert("n", Value::Num(-3.0));
        assert_eq!(root.text_content(), "neg");

        scope.data().insert("n", Value::Num(0.0));
        assert_eq!(root.text_content(), "zero");
    }

    #[test]
    fn chain_members_leave_the_tree() {
        let (_doc, root) = mount("<p e-if=\"flag\">yes</p><p e-else>no</p>");
        let scope = scope_from_json(serde_json::json!({ "flag": false }));
        compiler().compile(&root, &scope);
        // one placeholder comment plus the active arm
        let elements: Vec<_> = root.children().iter().filter(|c| c.is_element()).cloned().collect();
        assert_eq!(elements.len(), 1);
        assert_eq!(root.text_content(), "no");
    }

    #[test]
    fn chain_arm_templates_keep_their_bindings() {
        let (_doc, root) = mount("<p e-if=\"flag\">on</p><p e-else>{{ msg }}</p>");
        let scope = scope_from_json(serde_json::json!({ "flag": true, "msg": "later" }));
        compiler().compile(&root, &scope);
        assert_eq!(root.text_content(), "on");

        // the detached else template must not have been consumed as a
        // plain sibling during the first pass
        scope.data().insert("flag", Value::Bool(false));
        assert_eq!(root.text_content(), "later");
        scope.data().insert("msg", Value::str("updated"));
        assert_eq!(root.text_content(), "updated");
    }

    #[test]
    fn loop_renders_and_tracks_mutation() {
        let (_doc, root) = mount("<li e-for=\"t of todos\">{{ t }};</li>");
        let list = ReactiveList::from_values([Value::str("a"), Value::str("b")]);
        let scope = Scope::new(ReactiveMap::from_entries([(
            "todos".to_string(),
            Value::List(list.clone()),
        )]));
        compiler().compile(&root, &scope);
        assert_eq!(root.text_content(), "a;b;");

        list.push(Value::str("c"));
        assert_eq!(root.text_content(), "a;b;c;");

        // plain index assignment is the documented silent boundary
        list.set(0, Value::str("z"));
        assert_eq!(root.text_content(), "a;b;c;");
    }

    #[test]
    fn loop_with_index_variable() {
        let (_doc, root) = mount("<li e-for=\"t, i of todos\">{{ i }}:{{ t }} </li>");
        let scope = scope_from_json(serde_json::json!({ "todos": ["x", "y"] }));
        compiler().compile(&root, &scope);
        assert_eq!(root.text_content(), "0:x 1:y ");
    }

    #[test]
    fn loop_filter_and_order() {
        let (_doc, root) =
            mount("<li e-for=\"w of words | filter:'re' | order:asc\">{{ w }};</li>");
        let scope = scope_from_json(serde_json::json!({
            "words": ["eat", "code", "repeat", "retreat"],
        }));
        compiler().compile(&root, &scope);
        assert_eq!(root.text_content(), "repeat;retreat;");
    }

    #[test]
    fn keyed_filter_matches_map_key_or_item_itself() {
        let (_doc, root) =
            mount("<li e-for=\"u of users | filter:q:name\">{{ u.name }};</li>");
        let scope = scope_from_json(serde_json::json!({
            "users": [{ "name": "ada" }, { "name": "bob" }],
            "q": "ad",
        }));
        compiler().compile(&root, &scope);
        assert_eq!(root.text_content(), "ada;");

        // unresolvable key on a scalar item falls back to the item itself
        let (_doc, root) =
            mount("<li e-for=\"w of words | filter:q:name\">{{ w }};</li>");
        let scope = scope_from_json(serde_json::json!({
            "words": ["eat", "code", "repeat", "retreat"],
            "q": "re",
        }));
        compiler().compile(&root, &scope);
        assert_eq!(root.text_content(), "repeat;retreat;");
    }

    #[test]
    fn loop_over_map_entries() {
        let (_doc, root) = mount("<li e-for=\"v, k of scores\">{{ k }}={{ v }};</li>");
        let scope = scope_from_json(serde_json::json!({ "scores": { "ada": 3, "bob": 1 } }));
        compiler().compile(&root, &scope);
        assert_eq!(root.text_content(), "ada=3;bob=1;");
    }

    #[test]
    fn show_toggles_display() {
        let (_doc, root) = mount("<div e-show=\"open\">body</div>");
        let scope = scope_from_json(serde_json::json!({ "open": false }));
        compiler().compile(&root, &scope);
        let div = &root.children()[0];
        assert_eq!(div.attr("style").as_deref(), Some("display: none"));

        scope.data().insert("open", Value::Bool(true));
        assert_eq!(div.attr("style"), None);
    }

    #[test]
    fn event_marker_runs_handler() {
        let (_doc, root) = mount("<button on:click=\"hits = hits + 1\">go</button>");
        let scope = scope_from_json(serde_json::json!({ "hits": 0 }));
        compiler().compile(&root, &scope);
        let button = &root.children()[0];
        assert!(!button.has_attr("on:click"));

        button.dispatch("click", Value::Null);
        button.dispatch("click", Value::Null);
        assert_eq!(scope.data().get("hits"), Some(Value::Num(2.0)));
    }

    #[test]
    fn once_modifier_deregisters() {
        let (_doc, root) = mount("<button on:click.once=\"hits = hits + 1\">go</button>");
        let scope = scope_from_json(serde_json::json!({ "hits": 0 }));
        compiler().compile(&root, &scope);
        let button = &root.children()[0];

        button.dispatch("click", Value::Null);
        button.dispatch("click", Value::Null);
        assert_eq!(scope.data().get("hits"), Some(Value::Num(1.0)));
    }

    #[test]
    fn callable_handler_receives_payload() {
        let (_doc, root) = mount("<button on:click=\"handler\">go</button>");
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let map = ReactiveMap::new();
        map.insert(
            "handler",
            Value::func(move |args| {
                sink.borrow_mut().extend(args.iter().cloned());
                Value::Null
            }),
        );
        let scope = Scope::new(map);
        compiler().compile(&root, &scope);

        root.children()[0].dispatch("click", Value::str("payload"));
        assert_eq!(seen.borrow().as_slice(), [Value::str("payload")]);
    }

    #[test]
    fn generic_property_bind() {
        let (_doc, root) = mount("<a e-href=\"url\">link</a>");
        let scope = scope_from_json(serde_json::json!({ "url": "/home" }));
        compiler().compile(&root, &scope);
        let a = &root.children()[0];
        assert!(!a.has_attr("e-href"));
        assert_eq!(a.attr("href").as_deref(), Some("/home"));

        scope.data().insert("url", Value::str("/away"));
        assert_eq!(a.attr("href").as_deref(), Some("/away"));
    }

    #[test]
    fn include_materializes_registered_template() {
        let (_doc, root) = mount("<div e-include=\"card\">old</div>");
        let scope = scope_from_json(serde_json::json!({ "name": "ada" }));
        let c = compiler();
        c.register_template("card", "<b>{{ name }}</b>");
        c.compile(&root, &scope);
        let div = &root.children()[0];
        assert_eq!(div.text_content(), "ada");
        assert!(!div.has_attr("e-include"));
    }

    #[test]
    fn req_pulls_from_loader() {
        let loader = Rc::new(crate::loader::InMemoryLoader::new());
        loader.insert("views/hello", "<i>{{ who }}</i>");
        let evaluator = Rc::new(Evaluator::new());
        let registry = Rc::new(WatchRegistry::new());
        let delimiters = DelimiterHandler::new();
        let binder = Binder::new(Rc::clone(&evaluator), Rc::clone(&registry), delimiters);
        let c = Compiler::new(evaluator, binder, delimiters, registry, Some(loader));

        let (_doc, root) = mount("<div e-req=\"'views/hello'\"></div>");
        let scope = scope_from_json(serde_json::json!({ "who": "world" }));
        c.compile(&root, &scope);
        assert_eq!(root.text_content(), "world");
    }

    #[test]
    fn orphan_else_falls_through() {
        let (_doc, root) = mount("<p e-else>{{ msg }}</p>");
        let scope = scope_from_json(serde_json::json!({ "msg": "still bound" }));
        compiler().compile(&root, &scope);
        let p = &root.children()[0];
        assert!(!p.has_attr("e-else"));
        assert_eq!(p.text_content(), "still bound");
    }

    #[test]
    fn broken_sibling_does_not_stop_compilation() {
        let (_doc, root) = mount("<p e-show=\"{{ bad }}\">a</p><p>{{ msg }}</p>");
        let scope = scope_from_json(serde_json::json!({ "msg": "ok" }));
        compiler().compile(&root, &scope);
        assert_eq!(root.children()[1].text_content(), "ok");
        assert!(!root.children()[0].has_attr("e-show"), "marker removed");
    }
}
