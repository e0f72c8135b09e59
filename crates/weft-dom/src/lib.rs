#![forbid(unsafe_code)]

//! Host document tree for Weft.
//!
//! The compiler walks and rewrites a mutable node tree. This crate provides
//! that tree: [`NodeRef`] handles with parent/child links, element
//! attributes and form-control state, event dispatch, and a markup
//! parser/serializer for turning template text into subtrees and back.
//!
//! The tree is deliberately host-shaped rather than browser-shaped: just
//! enough surface for directives to query attributes, splice children
//! around comment placeholders, toggle visibility, and wire listeners.
//!
//! # Invariants
//!
//! 1. [`NodeRef`] identity is pointer identity; clones alias one node.
//! 2. A node has at most one parent at a time.
//! 3. [`NodeRef::is_attached`] is the single liveness signal consumed by
//!    watch sweeping: true iff the node's ancestor chain ends at a
//!    `Document`.

pub mod event;
pub mod markup;
pub mod node;

pub use event::{DomEvent, ListenerId};
pub use markup::{MarkupError, inner_html, outer_html, parse_fragment};
pub use node::{NodeRef, NodeType};
