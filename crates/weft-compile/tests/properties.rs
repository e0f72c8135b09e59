#![forbid(unsafe_code)]

//! End-to-end behavior of the compile pipeline against a live data graph.

use std::rc::Rc;

use weft_compile::{Binder, Compiler, DelimiterHandler};
use weft_dom::{NodeRef, markup};
use weft_expr::{Evaluator, Scope};
use weft_reactive::{ReactiveList, Value, WatchRegistry};

struct Fixture {
    registry: Rc<WatchRegistry>,
    doc: NodeRef,
    root: NodeRef,
    scope: Scope,
}

fn fixture(markup_text: &str, data: serde_json::Value) -> Fixture {
    let evaluator = Rc::new(Evaluator::new());
    let registry = Rc::new(WatchRegistry::new());
    let delimiters = DelimiterHandler::new();
    let binder = Binder::new(Rc::clone(&evaluator), Rc::clone(&registry), delimiters);
    let compiler = Compiler::new(
        evaluator,
        binder,
        delimiters,
        Rc::clone(&registry),
        None,
    );

    let doc = NodeRef::document();
    let root = NodeRef::element("main");
    doc.append_child(&root);
    for child in markup::parse_fragment(markup_text).unwrap().children() {
        root.append_child(&child);
    }
    let Value::Map(map) = Value::from_json(data) else {
        panic!("fixture data must be an object");
    };
    let scope = Scope::new(map);
    compiler.compile(&root, &scope);
    Fixture {
        registry,
        doc,
        root,
        scope,
    }
}

// Re-assigning the same container is the identity: no watch fires, no
// re-render, handles keep their identity.
#[test]
fn reassigning_same_container_is_identity() {
    let f = fixture("<li e-for=\"t of todos\">{{ t }};</li>", serde_json::json!({
        "todos": ["a", "b"],
    }));
    assert_eq!(f.root.text_content(), "a;b;");

    let todos = f.scope.data().get("todos").unwrap();
    let Value::List(before) = &todos else { panic!() };
    let before = before.clone();

    let fired = Rc::new(std::cell::Cell::new(0u32));
    let sink = Rc::clone(&fired);
    let _watch = f
        .scope
        .data()
        .property("todos")
        .unwrap()
        .watch(move |_, _| sink.set(sink.get() + 1));

    f.scope.data().insert("todos", todos.clone());
    assert_eq!(fired.get(), 0, "same-handle write is a no-op");

    let Value::List(after) = f.scope.data().get("todos").unwrap() else {
        panic!()
    };
    assert!(after.ptr_eq(&before), "handle identity preserved");
    assert_eq!(f.root.text_content(), "a;b;");
}

// `a ? b : c` must depend on the condition and the taken branch only.
#[test]
fn ternary_tracks_only_taken_branch() {
    let f = fixture("<p>{{ flag ? x : y }}</p>", serde_json::json!({
        "flag": true,
        "x": "taken",
        "y": "skipped",
    }));
    assert_eq!(f.root.text_content(), "taken");

    let y = f.scope.data().property("y").unwrap();
    assert_eq!(y.watch_count(), 0, "untaken branch has no watch");
    assert!(f.scope.data().property("x").unwrap().watch_count() > 0);

    // flipping the condition re-renders through the condition watch
    f.scope.data().insert("flag", Value::Bool(false));
    assert_eq!(f.root.text_content(), "skipped");
}

// Structural list mutation re-renders; plain index assignment stays silent.
#[test]
fn structural_mutation_vs_index_write() {
    let f = fixture("<li e-for=\"t of todos\">{{ t }};</li>", serde_json::json!({
        "todos": ["eat"],
    }));
    let Value::List(todos) = f.scope.data().get("todos").unwrap() else {
        panic!()
    };

    todos.push(Value::str("sleep"));
    assert_eq!(f.root.text_content(), "eat;sleep;");

    todos.unshift(Value::str("wake"));
    assert_eq!(f.root.text_content(), "wake;eat;sleep;");

    todos.set(1, Value::str("overwritten"));
    assert_eq!(f.root.text_content(), "wake;eat;sleep;", "index write is silent");

    todos.splice(0, 2, vec![Value::str("all")]);
    assert_eq!(f.root.text_content(), "all;sleep;");
}

// At most one chain arm is materialized, and swaps retain no state.
#[test]
fn conditional_chain_exclusivity() {
    let f = fixture(
        "<p e-if=\"n > 0\">pos</p><p e-else-if=\"n < 0\">neg</p><p e-else>zero</p>",
        serde_json::json!({ "n": 5 }),
    );
    let arm_count = |root: &NodeRef| {
        root.children()
            .iter()
            .filter(|c| c.is_element())
            .count()
    };
    assert_eq!(arm_count(&f.root), 1);
    assert_eq!(f.root.text_content(), "pos");

    for (value, expected) in [(-1.0, "neg"), (0.0, "zero"), (9.0, "pos")] {
        f.scope.data().insert("n", Value::Num(value));
        assert_eq!(arm_count(&f.root), 1);
        assert_eq!(f.root.text_content(), expected);
    }
}

// filter + order compose, and the filter input is itself reactive.
#[test]
fn filter_and_order_composition() {
    let f = fixture(
        "<li e-for=\"w of words | filter:search | order:desc\">{{ w }};</li>",
        serde_json::json!({
            "words": ["eat", "code", "repeat", "retreat"],
            "search": "re",
        }),
    );
    assert_eq!(f.root.text_content(), "retreat;repeat;");

    f.scope.data().insert("search", Value::str("ea"));
    assert_eq!(f.root.text_content(), "retreat;repeat;eat;");

    f.scope.data().insert("search", Value::str(""));
    assert_eq!(f.root.text_content(), "retreat;repeat;eat;code;");
}

// The keyed filter form keeps working over scalar items: a key that does
// not resolve matches against the item's own display form, in source order.
#[test]
fn keyed_filter_falls_back_to_item_text() {
    let f = fixture(
        "<li e-for=\"todo of todos | filter:search:name\">{{ todo }};</li>",
        serde_json::json!({
            "todos": ["eat", "code", "repeat", "retreat"],
            "search": "re",
        }),
    );
    assert_eq!(f.root.text_content(), "repeat;retreat;");

    f.scope.data().insert("search", Value::str("ea"));
    assert_eq!(f.root.text_content(), "eat;repeat;retreat;");
}

// Two-way binding settles without ping-pong in either direction.
#[test]
fn two_way_binding_symmetry() {
    let f = fixture(
        "<input type=\"text\" e-bind=\"query\"><p>{{ query }}</p>",
        serde_json::json!({ "query": "start" }),
    );
    let input = &f.root.children()[0];
    assert_eq!(input.value(), "start");
    assert!(!input.has_attr("e-bind"));

    f.scope.data().insert("query", Value::str("pushed"));
    assert_eq!(input.value(), "pushed");

    input.set_value("typed");
    input.dispatch("input", Value::Null);
    assert_eq!(f.scope.data().get("query"), Some(Value::str("typed")));
    assert_eq!(f.root.children()[1].text_content(), "typed");

    // equal round-trip write must not echo
    let fired = Rc::new(std::cell::Cell::new(0u32));
    let sink = Rc::clone(&fired);
    let _watch = f
        .scope
        .data()
        .property("query")
        .unwrap()
        .watch(move |_, _| sink.set(sink.get() + 1));
    input.dispatch("input", Value::Null);
    assert_eq!(fired.get(), 0);
}

// Detached subtrees lose their bindings on the next sweep.
#[test]
fn sweep_evicts_detached_bindings() {
    let f = fixture("<p>{{ msg }}</p>", serde_json::json!({ "msg": "live" }));
    assert!(f.registry.len() > 0);
    assert_eq!(f.registry.sweep(), 0, "attached bindings survive");

    f.root.detach();
    let evicted = f.registry.sweep();
    assert!(evicted > 0);
    assert_eq!(f.registry.len(), 0);

    let msg = f.scope.data().property("msg").unwrap();
    assert_eq!(msg.watch_count(), 0, "property side is clean too");
    drop(f.doc);
}

// A broken binding is contained: siblings keep working.
#[test]
fn error_containment_across_siblings() {
    let f = fixture(
        "<p e-if=\"\">broken</p><p>{{ a }}</p><span e-nonsense-target=\"b\">x</span><p>{{ b }}</p>",
        serde_json::json!({ "a": "first", "b": "second" }),
    );
    // the e-if arm never renders (empty condition is an error, not false)
    assert!(!f.root.text_content().contains("broken"));
    assert!(f.root.text_content().contains("first"));
    assert!(f.root.text_content().contains("second"));

    // bindings stay live after the earlier failures
    f.scope.data().insert("b", Value::str("updated"));
    assert!(f.root.text_content().contains("updated"));
}

// Loop over a freshly assigned list follows the new handle.
#[test]
fn loop_follows_reassigned_list() {
    let f = fixture("<li e-for=\"t of todos\">{{ t }};</li>", serde_json::json!({
        "todos": ["old"],
    }));
    assert_eq!(f.root.text_content(), "old;");

    // replacing the list refills the existing handle in place
    let replacement = ReactiveList::from_values([Value::str("new"), Value::str("er")]);
    f.scope.data().insert("todos", Value::List(replacement));
    assert_eq!(f.root.text_content(), "new;er;");
}

// Nested loop/conditional scopes see loop locals shadow data.
#[test]
fn loop_locals_shadow_data() {
    let f = fixture(
        "<li e-for=\"name of names\"><b e-if=\"name == 'b'\">[{{ name }}]</b></li>",
        serde_json::json!({ "names": ["a", "b"], "name": "outer" }),
    );
    assert_eq!(f.root.text_content(), "[b]");
}

// data directive rebases descendant scope without touching siblings.
#[test]
fn data_directive_scoping() {
    let f = fixture(
        "<section data=\"inner\"><p>{{ label }}</p></section><p>{{ label }}</p>",
        serde_json::json!({
            "label": "outer",
            "inner": { "label": "nested" },
        }),
    );
    assert_eq!(f.root.children()[0].text_content(), "nested");
    assert_eq!(f.root.children()[1].text_content(), "outer");

    let Value::Map(inner) = f.scope.data().get("inner").unwrap() else {
        panic!()
    };
    inner.insert("label", Value::str("renested"));
    assert_eq!(f.root.children()[0].text_content(), "renested");
}
