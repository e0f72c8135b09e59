#![forbid(unsafe_code)]

//! Template compilation for Weft: turning directive-annotated markup into
//! live bindings against the reactive graph.
//!
//! Pipeline per element, in fixed priority order: skip marker, data
//! injection, conditional chain, loop, visibility toggle, loader-backed
//! markup, two-way binds, event markers, generic property binds, then
//! delimiter fall-through and child recursion. Structural directives manage
//! their own subtrees around shared comment placeholders.
//!
//! Collaborators are injected through [`Compiler::new`]; the
//! [`loader::TemplateLoader`] trait is the boundary to whatever supplies
//! external markup.

pub mod binder;
pub mod compiler;
pub mod delimiter;
pub mod directives;
pub mod loader;

pub use binder::{Binder, RecompileFn};
pub use compiler::Compiler;
pub use delimiter::{DelimiterHandler, Field};
pub use directives::{
    EventSpec, FilterSpec, LoopParseError, LoopSpec, OrderDir, OrderSpec, parse_event_marker,
    parse_loop,
};
pub use loader::{InMemoryLoader, LoadError, TemplateLoader};
