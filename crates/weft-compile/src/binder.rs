#![forbid(unsafe_code)]

//! The binder: connects template text and control state to the reactive
//! graph.
//!
//! One-way bindings evaluate every expression field of one template text
//! inside a single capture window on the defining pass, then watch the
//! captured properties; later runs re-evaluate and write without
//! re-capturing. Two-way bindings pair a data→control watch with a
//! control→data listener; equal-value writes are no-ops on both sides, so
//! the pair cannot ping-pong.
//!
//! # Invariants
//!
//! 1. Every binder-created watch carries a liveness probe over the bound
//!    node and is tracked by the shared registry for sweeping.
//! 2. A binding failure is logged and skipped; it never unwinds into
//!    sibling bindings.
//!
//! # Failure Modes
//!
//! | Failure | Behavior |
//! |---------|----------|
//! | Delimiters inside a two-way path | logged, binding skipped |
//! | List-valued bind, no model, not a multi-select | logged, binding skipped |
//! | Multi-select bind without the `multiple` attribute | logged, binding skipped |
//! | `{{:html }}` result fails markup parsing | logged, render pass skipped |

use std::cell::RefCell;
use std::rc::Rc;

use weft_dom::{NodeRef, markup};
use weft_expr::{Evaluator, Scope};
use weft_reactive::{Value, WatchOptions, WatchRegistry, open_capture};

use crate::delimiter::{DelimiterHandler, Field};
use crate::directives::split_pipeline;

/// Hook the compiler supplies so `{{:html }}` insertions get compiled.
pub type RecompileFn = Rc<dyn Fn(&NodeRef, &Scope)>;

/// Which control property a two-way binding targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ControlTarget {
    Value,
    NumericValue,
    Checked,
}

/// Creates and registers bindings.
#[derive(Clone)]
pub struct Binder {
    evaluator: Rc<Evaluator>,
    registry: Rc<WatchRegistry>,
    delimiters: DelimiterHandler,
}

impl Binder {
    #[must_use]
    pub fn new(
        evaluator: Rc<Evaluator>,
        registry: Rc<WatchRegistry>,
        delimiters: DelimiterHandler,
    ) -> Self {
        Self {
            evaluator,
            registry,
            delimiters,
        }
    }

    /// Run `render` once inside a capture window, then watch every captured
    /// property with a re-run callback gated on `liveness` staying attached.
    /// This is the defining pass of every one-way binding; directive
    /// handlers with bind-like behavior (`e-show`) reuse it directly.
    pub fn effect(&self, liveness: &NodeRef, render: &Rc<dyn Fn()>) {
        let session = open_capture();
        render();
        let props = session.close();
        for prop in props {
            let render = Rc::clone(render);
            let node = liveness.clone();
            let watch = prop.watch_with(
                move |_, _| render(),
                WatchOptions::live_while(move || node.is_attached()),
            );
            self.registry.track(watch);
        }
    }

    fn render_fields(&self, scope: &Scope, fields: &[Field]) -> String {
        let mut out = String::new();
        for field in fields {
            match field {
                Field::Literal(text) => out.push_str(text),
                Field::Expr { src, .. } => {
                    out.push_str(&self.evaluator.exec(scope, src).to_string());
                }
            }
        }
        out
    }

    // -- one-way ------------------------------------------------------------

    /// Bind a text node whose content contains delimiters. `{{:html }}`
    /// fields switch the binding to markup insertion: the text node is
    /// replaced by a comment placeholder and each render parses the
    /// rendered string and compiles the resulting nodes via `recompile`.
    pub fn bind_text(&self, scope: &Scope, text_node: &NodeRef, recompile: &RecompileFn) {
        let template = text_node.text().unwrap_or_default();
        let fields = self.delimiters.parse_fields(&template);
        if !fields.iter().any(|f| matches!(f, Field::Expr { .. })) {
            return;
        }
        let is_html = fields
            .iter()
            .any(|f| matches!(f, Field::Expr { html: true, .. }));

        if is_html {
            self.bind_html(scope, text_node, fields, recompile);
            return;
        }

        let binder = self.clone();
        let scope = scope.clone();
        let node = text_node.clone();
        let render: Rc<dyn Fn()> = Rc::new(move || {
            node.set_text(binder.render_fields(&scope, &fields));
        });
        self.effect(text_node, &render);
    }

    fn bind_html(
        &self,
        scope: &Scope,
        text_node: &NodeRef,
        fields: Vec<Field>,
        recompile: &RecompileFn,
    ) {
        let Some(parent) = text_node.parent() else {
            tracing::warn!("markup insertion on a detached text node; skipped");
            return;
        };
        let placeholder = NodeRef::comment("html");
        parent.insert_before(&placeholder, text_node);
        text_node.detach();

        let binder = self.clone();
        let scope = scope.clone();
        let anchor = placeholder.clone();
        let recompile = Rc::clone(recompile);
        let rendered: Rc<RefCell<Vec<NodeRef>>> = Rc::new(RefCell::new(Vec::new()));
        let render: Rc<dyn Fn()> = Rc::new(move || {
            let text = binder.render_fields(&scope, &fields);
            let fragment = match markup::parse_fragment(&text) {
                Ok(fragment) => fragment,
                Err(error) => {
                    tracing::error!(%error, "markup insertion produced unparsable text");
                    return;
                }
            };
            let Some(parent) = anchor.parent() else { return };
            for old in rendered.borrow_mut().drain(..) {
                old.detach();
            }
            for child in fragment.children() {
                parent.insert_before(&child, &anchor);
                recompile(&child, &scope);
                rendered.borrow_mut().push(child);
            }
        });
        self.effect(&placeholder, &render);
    }

    /// Bind an attribute whose value contains delimiters. The attribute is
    /// rewritten in place on every render.
    pub fn bind_attr(&self, scope: &Scope, node: &NodeRef, name: &str) {
        let template = node.attr(name).unwrap_or_default();
        let fields = self.delimiters.parse_fields(&template);
        if !fields.iter().any(|f| matches!(f, Field::Expr { .. })) {
            return;
        }
        let binder = self.clone();
        let scope = scope.clone();
        let target = node.clone();
        let name = name.to_string();
        let render: Rc<dyn Fn()> = Rc::new(move || {
            target.set_attr(name.clone(), binder.render_fields(&scope, &fields));
        });
        self.effect(node, &render);
    }

    // -- two-way ------------------------------------------------------------

    /// Create a two-way binding between a control and a data path. The
    /// attribute value grammar is `PATH [| MODEL]`, where the model suffix
    /// marks array membership (checkbox groups).
    pub fn bind_two_way(
        &self,
        scope: &Scope,
        node: &NodeRef,
        explicit_prop: Option<&str>,
        src: &str,
    ) {
        if self.delimiters.has_delimiters(src) {
            tracing::error!(src, "two-way binding takes a path, not delimiter text");
            return;
        }
        let parts = split_pipeline(src);
        let Some(path) = parts.first().map(|p| p.trim().to_string()) else {
            tracing::error!("empty two-way binding expression");
            return;
        };
        if path.is_empty() {
            tracing::error!("empty two-way binding expression");
            return;
        }
        let model_src = parts.get(1).map(|p| p.trim().to_string());

        let session = open_capture();
        let current = self.evaluator.exec(scope, &path);
        let model_value = model_src
            .as_ref()
            .map(|model| self.evaluator.exec(scope, model));
        let props = session.close();

        if let Value::List(list) = &current {
            // Membership bindings follow the list handle captured here; a
            // later reassignment refills that same handle in place.
            self.bind_membership(node, &path, list, model_value);
            return;
        }

        let target = self.resolve_target(node, explicit_prop);

        // data -> control
        let evaluator = Rc::clone(&self.evaluator);
        let control = node.clone();
        let watch_scope = scope.clone();
        let watch_path = path.clone();
        for prop in props {
            let evaluator = Rc::clone(&evaluator);
            let control = control.clone();
            let watch_scope = watch_scope.clone();
            let watch_path = watch_path.clone();
            let liveness = node.clone();
            let watch = prop.watch_with(
                move |_, _| {
                    let value = evaluator.exec(&watch_scope, &watch_path);
                    write_control(&control, target, &value);
                },
                WatchOptions::live_while(move || liveness.is_attached()),
            );
            self.registry.track(watch);
        }
        write_control(node, target, &current);

        // control -> data
        let evaluator = Rc::clone(&self.evaluator);
        let control = node.clone();
        let listen_scope = scope.clone();
        let event = match target {
            ControlTarget::Checked => "change",
            _ => "input",
        };
        node.add_listener(event, move |_| {
            let value = read_control(&control, target);
            if !evaluator.assign(&listen_scope, &path, value) {
                tracing::error!(path = %path, "two-way write-back failed");
            }
        });
    }

    fn resolve_target(&self, node: &NodeRef, explicit_prop: Option<&str>) -> ControlTarget {
        if let Some(prop) = explicit_prop {
            return match prop {
                "value" => ControlTarget::Value,
                "checked" => ControlTarget::Checked,
                other => {
                    tracing::warn!(prop = other, "unknown bind target; using value");
                    ControlTarget::Value
                }
            };
        }
        match node.control_type().as_str() {
            "checkbox" | "radio" => ControlTarget::Checked,
            "number" | "range" => ControlTarget::NumericValue,
            _ => ControlTarget::Value,
        }
    }

    /// List-valued binding: checkbox-group membership or multi-select.
    fn bind_membership(
        &self,
        node: &NodeRef,
        path: &str,
        list: &weft_reactive::ReactiveList,
        model_value: Option<Value>,
    ) {
        let is_select = node.tag().as_deref() == Some("select");
        if is_select {
            if !node.has_attr("multiple") {
                tracing::error!(
                    path,
                    "list-valued select binding requires the multiple attribute"
                );
                return;
            }
            self.bind_multi_select(node, list);
            return;
        }
        let Some(model) = model_value else {
            tracing::error!(
                path,
                "list-valued binding on a control requires a model (PATH | MODEL)"
            );
            return;
        };
        if node.control_type() != "checkbox" {
            tracing::error!(path, "membership binding requires a checkbox control");
            return;
        }

        // data -> control
        let sync = {
            let control = node.clone();
            let list = list.clone();
            let model = model.clone();
            move || {
                let member = list.snapshot().iter().any(|v| *v == model);
                if control.checked() != member {
                    control.set_checked(member);
                }
            }
        };
        sync();
        let liveness = node.clone();
        let watch = list.watch_with(
            move |_| sync(),
            WatchOptions::live_while(move || liveness.is_attached()),
        );
        self.registry.track(watch);

        // control -> data
        let control = node.clone();
        let list = list.clone();
        node.add_listener("change", move |_| {
            let position = list.snapshot().iter().position(|v| *v == model);
            match (control.checked(), position) {
                (true, None) => list.push(model.clone()),
                (false, Some(index)) => {
                    list.splice(index, 1, Vec::new());
                }
                _ => {}
            }
        });
    }

    fn bind_multi_select(&self, node: &NodeRef, list: &weft_reactive::ReactiveList) {
        let option_value = |option: &NodeRef| {
            option
                .attr("value")
                .unwrap_or_else(|| option.text_content().trim().to_string())
        };

        // data -> control
        let sync = {
            let select = node.clone();
            let list = list.clone();
            move || {
                let members: Vec<String> =
                    list.snapshot().iter().map(ToString::to_string).collect();
                for option in select.children() {
                    if option.tag().as_deref() != Some("option") {
                        continue;
                    }
                    if members.contains(&option_value(&option)) {
                        option.set_attr("selected", "");
                    } else {
                        option.remove_attr("selected");
                    }
                }
            }
        };
        sync();
        let liveness = node.clone();
        let watch = list.watch_with(
            move |_| sync(),
            WatchOptions::live_while(move || liveness.is_attached()),
        );
        self.registry.track(watch);

        // control -> data
        let select = node.clone();
        let list = list.clone();
        node.add_listener("change", move |_| {
            let selected: Vec<Value> = select
                .children()
                .iter()
                .filter(|option| {
                    option.tag().as_deref() == Some("option") && option.has_attr("selected")
                })
                .map(|option| Value::Str(option_value(option)))
                .collect();
            let current = list.snapshot();
            if current != selected {
                let len = list.len();
                list.splice(0, len, selected);
            }
        });
    }
}

fn write_control(node: &NodeRef, target: ControlTarget, value: &Value) {
    match target {
        ControlTarget::Checked => {
            let checked = value.is_truthy();
            if node.checked() != checked {
                node.set_checked(checked);
            }
        }
        ControlTarget::Value | ControlTarget::NumericValue => {
            let text = value.to_string();
            if node.value() != text {
                node.set_value(text);
            }
        }
    }
}

fn read_control(node: &NodeRef, target: ControlTarget) -> Value {
    match target {
        ControlTarget::Checked => Value::Bool(node.checked()),
        ControlTarget::Value => Value::Str(node.value()),
        ControlTarget::NumericValue => {
            let number = node.value_as_number();
            if number.is_nan() {
                Value::Str(node.value())
            } else {
                Value::Num(number)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use weft_reactive::ReactiveMap;

    fn binder() -> Binder {
        Binder::new(
            Rc::new(Evaluator::new()),
            Rc::new(WatchRegistry::new()),
            DelimiterHandler::new(),
        )
    }

    fn noop_recompile() -> RecompileFn {
        Rc::new(|_, _| {})
    }

    fn scope_with(entries: &[(&str, Value)]) -> Scope {
        Scope::new(ReactiveMap::from_entries(
            entries.iter().map(|(k, v)| ((*k).to_string(), v.clone())),
        ))
    }

    #[test]
    fn text_binding_renders_and_updates() {
        let scope = scope_with(&[("name", Value::str("ada"))]);
        let doc = weft_dom::NodeRef::document();
        let p = weft_dom::NodeRef::element("p");
        let text = weft_dom::NodeRef::text_node("Hi {{ name }}!");
        p.append_child(&text);
        doc.append_child(&p);

        binder().bind_text(&scope, &text, &noop_recompile());
        assert_eq!(text.text().as_deref(), Some("Hi ada!"));

        scope.data().insert("name", Value::str("grace"));
        assert_eq!(text.text().as_deref(), Some("Hi grace!"));
    }

    #[test]
    fn attr_binding_rewrites_in_place() {
        let scope = scope_with(&[("theme", Value::str("dark"))]);
        let doc = weft_dom::NodeRef::document();
        let div = weft_dom::NodeRef::element("div");
        div.set_attr("class", "panel {{ theme }}");
        doc.append_child(&div);

        binder().bind_attr(&scope, &div, "class");
        assert_eq!(div.attr("class").as_deref(), Some("panel dark"));

        scope.data().insert("theme", Value::str("light"));
        assert_eq!(div.attr("class").as_deref(), Some("panel light"));
    }

    #[test]
    fn html_binding_inserts_parsed_nodes() {
        let scope = scope_with(&[("body", Value::str("<b>bold</b>"))]);
        let doc = weft_dom::NodeRef::document();
        let div = weft_dom::NodeRef::element("div");
        let text = weft_dom::NodeRef::text_node("{{:html body }}");
        div.append_child(&text);
        doc.append_child(&div);

        binder().bind_text(&scope, &text, &noop_recompile());
        assert_eq!(weft_dom::inner_html(&div), "<b>bold</b><!--html-->");

        scope.data().insert("body", Value::str("<i>italic</i>"));
        assert_eq!(weft_dom::inner_html(&div), "<i>italic</i><!--html-->");
    }

    #[test]
    fn two_way_text_input_round_trip() {
        let scope = scope_with(&[("query", Value::str("init"))]);
        let doc = weft_dom::NodeRef::document();
        let input = weft_dom::NodeRef::element("input");
        input.set_attr("type", "text");
        doc.append_child(&input);

        binder().bind_two_way(&scope, &input, None, "query");
        assert_eq!(input.value(), "init");

        // data -> control
        scope.data().insert("query", Value::str("from data"));
        assert_eq!(input.value(), "from data");

        // control -> data
        input.set_value("typed");
        input.dispatch("input", Value::Null);
        assert_eq!(scope.data().get("query"), Some(Value::str("typed")));
    }

    #[test]
    fn two_way_checkbox_targets_checked() {
        let scope = scope_with(&[("agreed", Value::Bool(false))]);
        let doc = weft_dom::NodeRef::document();
        let input = weft_dom::NodeRef::element("input");
        input.set_attr("type", "checkbox");
        doc.append_child(&input);

        binder().bind_two_way(&scope, &input, None, "agreed");
        assert!(!input.checked());

        input.set_checked(true);
        input.dispatch("change", Value::Null);
        assert_eq!(scope.data().get("agreed"), Some(Value::Bool(true)));
    }

    #[test]
    fn checkbox_group_membership() {
        let list = weft_reactive::ReactiveList::from_values([Value::str("red")]);
        let scope = scope_with(&[("colors", Value::List(list.clone()))]);
        let doc = weft_dom::NodeRef::document();
        let input = weft_dom::NodeRef::element("input");
        input.set_attr("type", "checkbox");
        doc.append_child(&input);

        binder().bind_two_way(&scope, &input, None, "colors | 'blue'");
        assert!(!input.checked());

        input.set_checked(true);
        input.dispatch("change", Value::Null);
        let members: Vec<String> = list.snapshot().iter().map(ToString::to_string).collect();
        assert_eq!(members, ["red", "blue"]);

        // structural mutation flows back into the control
        list.splice(1, 1, Vec::new());
        assert!(!input.checked());
    }

    #[test]
    fn list_bind_without_model_is_skipped() {
        let list = weft_reactive::ReactiveList::new();
        let scope = scope_with(&[("picks", Value::List(list))]);
        let doc = weft_dom::NodeRef::document();
        let input = weft_dom::NodeRef::element("input");
        input.set_attr("type", "text");
        doc.append_child(&input);

        binder().bind_two_way(&scope, &input, None, "picks");
        input.set_value("junk");
        input.dispatch("input", Value::Null);
        // binding was skipped; nothing written back
        assert!(matches!(scope.data().get("picks"), Some(Value::List(_))));
    }

    #[test]
    fn no_ping_pong_on_equal_writes() {
        let scope = scope_with(&[("n", Value::Num(1.0))]);
        let doc = weft_dom::NodeRef::document();
        let input = weft_dom::NodeRef::element("input");
        input.set_attr("type", "number");
        doc.append_child(&input);

        let b = binder();
        b.bind_two_way(&scope, &input, None, "n");

        let fired = Rc::new(std::cell::Cell::new(0u32));
        let f = Rc::clone(&fired);
        let _watch = scope
            .data()
            .property("n")
            .unwrap()
            .watch(move |_, _| f.set(f.get() + 1));

        input.set_value("1");
        input.dispatch("input", Value::Null);
        assert_eq!(fired.get(), 0, "equal write-back is a no-op");

        input.set_value("2");
        input.dispatch("input", Value::Null);
        assert_eq!(fired.get(), 1);
        assert_eq!(input.value(), "2", "reflected write did not loop");
    }
}
