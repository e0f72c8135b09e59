#![forbid(unsafe_code)]

//! Reactive data graph for Weft.
//!
//! This crate provides the change-tracking primitives the templating engine
//! is built on:
//!
//! - [`Value`]: the dynamic value model (scalars, reactive containers,
//!   callables).
//! - [`ReactiveMap`] / [`ReactiveProperty`]: an ordered map whose every key
//!   is an observable accessor pair with its own watch list.
//! - [`ReactiveList`]: a sequence facade whose mutating operations emit
//!   before/after change events.
//! - The change bus ([`bus`]): six process-wide channels plus stacked
//!   [`CaptureSession`]s for implicit dependency discovery.
//! - [`Watch`] / [`WatchRegistry`]: individual subscriptions with optional
//!   liveness-probe gating and a host-driven eviction sweep.
//!
//! # Architecture
//!
//! Everything is single-threaded and `Rc`-shared. Reads and writes run
//! synchronously in whichever call stack triggered them; a mutation's watch
//! callbacks complete before the mutating call returns. The bus and the
//! capture stack live in `thread_local!` storage, shared by every engine
//! instance on the thread.
//!
//! # Invariants
//!
//! 1. Containers are reactive by construction; re-wrapping is the identity.
//! 2. Setting a value equal to the current value is a no-op (no events, no
//!    watch callbacks).
//! 3. Watch callbacks for one property fire in registration order.
//! 4. `Watch::destroy()` removes the watch from its owner's list and runs
//!    the destroy-hook exactly once.
//! 5. An open [`CaptureSession`] records exactly the properties read while
//!    it was the innermost session.

pub mod bus;
pub mod list;
pub mod map;
pub mod property;
pub mod value;
pub mod watch;

pub use bus::{CaptureSession, Channel, ListenerHandle, ReactiveEvent, emit, off, on, open_capture};
pub use list::{ListChange, ListOp, ReactiveList};
pub use map::ReactiveMap;
pub use property::ReactiveProperty;
pub use value::Value;
pub use watch::{Watch, WatchOptions, WatchRegistry};
