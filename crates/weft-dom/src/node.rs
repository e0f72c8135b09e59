#![forbid(unsafe_code)]

//! The host tree: shared node handles with parent/child links.
//!
//! [`NodeRef`] is an `Rc`-backed handle; cloning shares the node. Identity
//! is pointer identity ([`NodeRef::ptr_eq`]). The tree is single-threaded,
//! mutated in place by the compiler and by structural directives.
//!
//! Elements additionally carry *control state* — `value` and `checked`
//! properties distinct from attributes, the way form controls behave in a
//! browser — and event listeners.
//!
//! # Invariants
//!
//! 1. A node has at most one parent; `append_child`/`insert_before` detach
//!    the node from any previous parent first.
//! 2. [`is_attached`](NodeRef::is_attached) is true iff walking parents
//!    reaches a `Document` node — the explicit liveness capability the
//!    watch sweep consumes.
//! 3. `clone_subtree` copies structure, attributes, and text; listeners and
//!    control state are not cloned (structural directives recompile clones
//!    from scratch).

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use crate::event::{DomEvent, ListenerId};
use weft_reactive::Value;

/// What a node is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    Document,
    Element,
    Text,
    Comment,
}

struct ListenerEntry {
    id: u64,
    event: String,
    callback: Rc<dyn Fn(&DomEvent)>,
}

#[derive(Default)]
struct ElementData {
    tag: String,
    attrs: IndexMap<String, String>,
    value: String,
    checked: bool,
    listeners: Vec<ListenerEntry>,
    next_listener_id: u64,
}

enum NodeKind {
    Document,
    Element(ElementData),
    Text(String),
    Comment(String),
}

struct NodeData {
    kind: NodeKind,
    parent: Weak<RefCell<NodeData>>,
    children: Vec<NodeRef>,
}

/// Shared handle to one tree node.
#[derive(Clone)]
pub struct NodeRef {
    inner: Rc<RefCell<NodeData>>,
}

impl NodeRef {
    fn from_kind(kind: NodeKind) -> Self {
        Self {
            inner: Rc::new(RefCell::new(NodeData {
                kind,
                parent: Weak::new(),
                children: Vec::new(),
            })),
        }
    }

    /// Create a document root.
    #[must_use]
    pub fn document() -> Self {
        Self::from_kind(NodeKind::Document)
    }

    /// Create an element.
    pub fn element(tag: impl Into<String>) -> Self {
        Self::from_kind(NodeKind::Element(ElementData {
            tag: tag.into().to_ascii_lowercase(),
            ..ElementData::default()
        }))
    }

    /// Create a text node.
    pub fn text_node(content: impl Into<String>) -> Self {
        Self::from_kind(NodeKind::Text(content.into()))
    }

    /// Create a comment node.
    pub fn comment(content: impl Into<String>) -> Self {
        Self::from_kind(NodeKind::Comment(content.into()))
    }

    /// Identity comparison.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// The node's type.
    #[must_use]
    pub fn node_type(&self) -> NodeType {
        match &self.inner.borrow().kind {
            NodeKind::Document => NodeType::Document,
            NodeKind::Element(_) => NodeType::Element,
            NodeKind::Text(_) => NodeType::Text,
            NodeKind::Comment(_) => NodeType::Comment,
        }
    }

    /// Whether this is an element.
    #[must_use]
    pub fn is_element(&self) -> bool {
        self.node_type() == NodeType::Element
    }

    /// The element tag (lowercase), if this is an element.
    #[must_use]
    pub fn tag(&self) -> Option<String> {
        match &self.inner.borrow().kind {
            NodeKind::Element(el) => Some(el.tag.clone()),
            _ => None,
        }
    }

    // -- attributes ---------------------------------------------------------

    /// Attribute value, if present.
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<String> {
        match &self.inner.borrow().kind {
            NodeKind::Element(el) => el.attrs.get(name).cloned(),
            _ => None,
        }
    }

    /// Whether the attribute is present (even when empty).
    #[must_use]
    pub fn has_attr(&self, name: &str) -> bool {
        match &self.inner.borrow().kind {
            NodeKind::Element(el) => el.attrs.contains_key(name),
            _ => false,
        }
    }

    /// Set an attribute (inserted in order, or overwritten in place).
    pub fn set_attr(&self, name: impl Into<String>, value: impl Into<String>) {
        if let NodeKind::Element(el) = &mut self.inner.borrow_mut().kind {
            el.attrs.insert(name.into(), value.into());
        }
    }

    /// Remove an attribute, returning its previous value.
    pub fn remove_attr(&self, name: &str) -> Option<String> {
        match &mut self.inner.borrow_mut().kind {
            NodeKind::Element(el) => el.attrs.shift_remove(name),
            _ => None,
        }
    }

    /// Attribute names in document order.
    #[must_use]
    pub fn attr_names(&self) -> Vec<String> {
        match &self.inner.borrow().kind {
            NodeKind::Element(el) => el.attrs.keys().cloned().collect(),
            _ => Vec::new(),
        }
    }

    // -- text ---------------------------------------------------------------

    /// Content of a text or comment node.
    #[must_use]
    pub fn text(&self) -> Option<String> {
        match &self.inner.borrow().kind {
            NodeKind::Text(s) | NodeKind::Comment(s) => Some(s.clone()),
            _ => None,
        }
    }

    /// Overwrite the content of a text node (no-op on other kinds).
    pub fn set_text(&self, content: impl Into<String>) {
        if let NodeKind::Text(s) = &mut self.inner.borrow_mut().kind {
            *s = content.into();
        }
    }

    /// Concatenated text content of this subtree.
    #[must_use]
    pub fn text_content(&self) -> String {
        match &self.inner.borrow().kind {
            NodeKind::Text(s) => s.clone(),
            NodeKind::Comment(_) => String::new(),
            _ => self
                .children()
                .iter()
                .map(NodeRef::text_content)
                .collect::<Vec<_>>()
                .concat(),
        }
    }

    // -- structure ----------------------------------------------------------

    /// The parent node, if any.
    #[must_use]
    pub fn parent(&self) -> Option<NodeRef> {
        self.inner
            .borrow()
            .parent
            .upgrade()
            .map(|inner| NodeRef { inner })
    }

    /// Snapshot of the child list.
    #[must_use]
    pub fn children(&self) -> Vec<NodeRef> {
        self.inner.borrow().children.clone()
    }

    /// Append `child` as the last child (detaching it from any previous
    /// parent first).
    pub fn append_child(&self, child: &NodeRef) {
        child.detach();
        child.inner.borrow_mut().parent = Rc::downgrade(&self.inner);
        self.inner.borrow_mut().children.push(child.clone());
    }

    /// Insert `new` immediately before `anchor` among this node's children.
    /// Falls back to append (with a warning) when `anchor` is not a child.
    pub fn insert_before(&self, new: &NodeRef, anchor: &NodeRef) {
        new.detach();
        let index = self
            .inner
            .borrow()
            .children
            .iter()
            .position(|c| c.ptr_eq(anchor));
        new.inner.borrow_mut().parent = Rc::downgrade(&self.inner);
        match index {
            Some(index) => self.inner.borrow_mut().children.insert(index, new.clone()),
            None => {
                tracing::warn!("insert_before anchor is not a child; appending");
                self.inner.borrow_mut().children.push(new.clone());
            }
        }
    }

    /// Remove this node from its parent's child list.
    pub fn detach(&self) {
        let Some(parent) = self.parent() else { return };
        parent
            .inner
            .borrow_mut()
            .children
            .retain(|c| !c.ptr_eq(self));
        self.inner.borrow_mut().parent = Weak::new();
    }

    /// The next sibling that is an element.
    #[must_use]
    pub fn next_element_sibling(&self) -> Option<NodeRef> {
        let parent = self.parent()?;
        let siblings = parent.children();
        let index = siblings.iter().position(|c| c.ptr_eq(self))?;
        siblings
            .into_iter()
            .skip(index + 1)
            .find(NodeRef::is_element)
    }

    /// Whether walking parents reaches a `Document` root. This is the
    /// liveness capability the watch sweep consumes.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        let mut current = self.clone();
        loop {
            if current.node_type() == NodeType::Document {
                return true;
            }
            match current.parent() {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    /// Deep copy of this subtree. Listeners and control state are not
    /// cloned; attributes and text are.
    #[must_use]
    pub fn clone_subtree(&self) -> NodeRef {
        let copy = match &self.inner.borrow().kind {
            NodeKind::Document => NodeRef::document(),
            NodeKind::Text(s) => NodeRef::text_node(s.clone()),
            NodeKind::Comment(s) => NodeRef::comment(s.clone()),
            NodeKind::Element(el) => {
                let node = NodeRef::element(el.tag.clone());
                for (name, value) in &el.attrs {
                    node.set_attr(name.clone(), value.clone());
                }
                node
            }
        };
        for child in self.children() {
            copy.append_child(&child.clone_subtree());
        }
        copy
    }

    // -- form-control state -------------------------------------------------

    /// The control's `value` property (not the attribute).
    #[must_use]
    pub fn value(&self) -> String {
        match &self.inner.borrow().kind {
            NodeKind::Element(el) => el.value.clone(),
            _ => String::new(),
        }
    }

    /// Set the control's `value` property.
    pub fn set_value(&self, value: impl Into<String>) {
        if let NodeKind::Element(el) = &mut self.inner.borrow_mut().kind {
            el.value = value.into();
        }
    }

    /// The control's `value` parsed as a number (NaN when unparsable).
    #[must_use]
    pub fn value_as_number(&self) -> f64 {
        self.value().trim().parse().unwrap_or(f64::NAN)
    }

    /// The control's `checked` property.
    #[must_use]
    pub fn checked(&self) -> bool {
        match &self.inner.borrow().kind {
            NodeKind::Element(el) => el.checked,
            _ => false,
        }
    }

    /// Set the control's `checked` property.
    pub fn set_checked(&self, checked: bool) {
        if let NodeKind::Element(el) = &mut self.inner.borrow_mut().kind {
            el.checked = checked;
        }
    }

    /// The control type: the `type` attribute lowercased, or the empty
    /// string.
    #[must_use]
    pub fn control_type(&self) -> String {
        self.attr("type").unwrap_or_default().to_ascii_lowercase()
    }

    /// Toggle `display: none` in the `style` attribute.
    pub fn set_display(&self, visible: bool) {
        let style = self.attr("style").unwrap_or_default();
        let mut decls: Vec<String> = style
            .split(';')
            .map(str::trim)
            .filter(|d| !d.is_empty() && !d.to_ascii_lowercase().starts_with("display"))
            .map(str::to_string)
            .collect();
        if !visible {
            decls.push("display: none".to_string());
        }
        if decls.is_empty() {
            self.remove_attr("style");
        } else {
            self.set_attr("style", decls.join("; "));
        }
    }

    // -- events -------------------------------------------------------------

    /// Register an event listener; returns an id for removal.
    pub fn add_listener(
        &self,
        event: impl Into<String>,
        callback: impl Fn(&DomEvent) + 'static,
    ) -> ListenerId {
        let mut data = self.inner.borrow_mut();
        if let NodeKind::Element(el) = &mut data.kind {
            el.next_listener_id += 1;
            let id = el.next_listener_id;
            el.listeners.push(ListenerEntry {
                id,
                event: event.into(),
                callback: Rc::new(callback),
            });
            ListenerId(id)
        } else {
            tracing::warn!("listener on a non-element node is ignored");
            ListenerId(0)
        }
    }

    /// Remove a listener by id.
    pub fn remove_listener(&self, id: ListenerId) {
        if let NodeKind::Element(el) = &mut self.inner.borrow_mut().kind {
            el.listeners.retain(|entry| entry.id != id.0);
        }
    }

    /// Dispatch an event on this node: every listener registered for
    /// `event` runs in registration order (against a snapshot, so handlers
    /// may deregister themselves), stopping early if one stops propagation.
    /// Returns the event payload for flag inspection.
    pub fn dispatch(&self, event: &str, payload: Value) -> DomEvent {
        let dom_event = DomEvent::new(event, payload);
        let snapshot: Vec<Rc<dyn Fn(&DomEvent)>> = match &self.inner.borrow().kind {
            NodeKind::Element(el) => el
                .listeners
                .iter()
                .filter(|entry| entry.event == event)
                .map(|entry| Rc::clone(&entry.callback))
                .collect(),
            _ => Vec::new(),
        };
        for callback in snapshot {
            if dom_event.propagation_stopped() {
                break;
            }
            callback(&dom_event);
        }
        dom_event
    }
}

impl std::fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.node_type() {
            NodeType::Document => write!(f, "Document({} children)", self.children().len()),
            NodeType::Element => write!(
                f,
                "<{} ({} children)>",
                self.tag().unwrap_or_default(),
                self.children().len()
            ),
            NodeType::Text => write!(f, "Text({:?})", self.text().unwrap_or_default()),
            NodeType::Comment => write!(f, "Comment({:?})", self.text().unwrap_or_default()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
