#![forbid(unsafe_code)]

//! The change bus: six process-wide channels plus stacked capture sessions.
//!
//! Every reactive read and write announces itself here. The bus is how the
//! binder discovers dependencies without an explicit subscription API: it
//! opens a [`CaptureSession`], evaluates one expression, closes the session,
//! and receives exactly the set of properties that were read in between.
//!
//! The bus is shared by every engine instance on the thread (`thread_local!`
//! storage; the engine is single-threaded by design). Correctness of
//! dependency attribution depends on capture windows being opened and closed
//! tightly around a single evaluation — the session type makes that
//! discipline ownership-checked: only the innermost session records, and
//! closing consumes the session.
//!
//! # Invariants
//!
//! 1. `emit` calls every listener registered at emit time, on a snapshot of
//!    the listener list; listeners may register/unregister re-entrantly.
//! 2. `AfterGet` records the read property into the innermost open capture
//!    session only, de-duplicated by property identity.
//! 3. Sessions close in LIFO order (enforced by ownership; a leaked session
//!    is evicted with a logged warning when an outer session closes).

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::list::{ListOp, ReactiveList};
use crate::property::ReactiveProperty;
use crate::value::Value;

/// Counter behind every engine-internal identity (properties, lists,
/// watches, listeners, capture frames).
static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate a fresh engine-wide id.
pub(crate) fn next_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// The six bus channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    BeforeGet,
    AfterGet,
    BeforeSet,
    AfterSet,
    BeforeArrayChange,
    AfterArrayChange,
}

impl Channel {
    fn index(self) -> usize {
        match self {
            Channel::BeforeGet => 0,
            Channel::AfterGet => 1,
            Channel::BeforeSet => 2,
            Channel::AfterSet => 3,
            Channel::BeforeArrayChange => 4,
            Channel::AfterArrayChange => 5,
        }
    }
}

/// Payload delivered to bus listeners.
#[derive(Clone)]
pub enum ReactiveEvent {
    /// A property was (or is about to be) read.
    Get { property: ReactiveProperty },
    /// A property was (or is about to be) written.
    Set {
        property: ReactiveProperty,
        old: Value,
        new: Value,
    },
    /// A list mutator ran (or is about to run). `before` is a shallow
    /// snapshot of the pre-mutation contents.
    ArrayChange {
        list: ReactiveList,
        op: ListOp,
        before: Vec<Value>,
    },
}

/// Identifies one registered listener; pass back to [`off`] to remove it.
#[derive(Debug)]
pub struct ListenerHandle {
    channel: Channel,
    id: u64,
}

type Listener = Rc<dyn Fn(&ReactiveEvent)>;

struct CaptureFrame {
    id: u64,
    seen: ahash::HashSet<u64>,
    properties: Vec<ReactiveProperty>,
}

#[derive(Default)]
struct Bus {
    listeners: [Vec<(u64, Listener)>; 6],
}

thread_local! {
    static BUS: RefCell<Bus> = RefCell::new(Bus::default());
    static CAPTURE: RefCell<Vec<CaptureFrame>> = const { RefCell::new(Vec::new()) };
}

/// Register a listener on `channel`; returns a handle for [`off`].
pub fn on(channel: Channel, listener: impl Fn(&ReactiveEvent) + 'static) -> ListenerHandle {
    let id = next_id();
    BUS.with(|bus| {
        bus.borrow_mut().listeners[channel.index()].push((id, Rc::new(listener)));
    });
    ListenerHandle { channel, id }
}

/// Remove a listener by handle identity. Removing twice is impossible (the
/// handle is consumed); removing a handle whose listener already vanished is
/// a no-op.
pub fn off(handle: ListenerHandle) {
    BUS.with(|bus| {
        bus.borrow_mut().listeners[handle.channel.index()].retain(|(id, _)| *id != handle.id);
    });
}

/// Emit an event on `channel`. Listeners run synchronously, in registration
/// order, against a snapshot of the listener list. An `AfterGet` emission
/// additionally records the property into the innermost capture session.
pub fn emit(channel: Channel, event: &ReactiveEvent) {
    if channel == Channel::AfterGet
        && let ReactiveEvent::Get { property } = event
    {
        record_capture(property);
    }

    let snapshot: Vec<Listener> = BUS.with(|bus| {
        bus.borrow().listeners[channel.index()]
            .iter()
            .map(|(_, l)| Rc::clone(l))
            .collect()
    });
    for listener in snapshot {
        listener(event);
    }
}

fn record_capture(property: &ReactiveProperty) {
    CAPTURE.with(|stack| {
        let mut stack = stack.borrow_mut();
        if let Some(frame) = stack.last_mut()
            && frame.seen.insert(property.id())
        {
            frame.properties.push(property.clone());
        }
    });
}

// ---------------------------------------------------------------------------
// Capture sessions
// ---------------------------------------------------------------------------

/// An open dependency-capture window.
///
/// While this session is the innermost one, every `AfterGet` emission
/// records its property here. [`close`](CaptureSession::close) pops the
/// window and returns the recorded properties in first-read order. Dropping
/// a session without closing discards its recordings.
#[must_use = "a capture session records nothing useful unless closed"]
pub struct CaptureSession {
    frame_id: u64,
    closed: bool,
}

/// Open a capture session. Sessions nest: reads are attributed to the
/// innermost open session only, so a nested compile pass does not leak its
/// dependencies into the outer window.
pub fn open_capture() -> CaptureSession {
    let frame_id = next_id();
    CAPTURE.with(|stack| {
        stack.borrow_mut().push(CaptureFrame {
            id: frame_id,
            seen: ahash::HashSet::default(),
            properties: Vec::new(),
        });
    });
    CaptureSession {
        frame_id,
        closed: false,
    }
}

impl CaptureSession {
    /// Close the window and return the properties read while it was
    /// innermost, de-duplicated, in first-read order.
    pub fn close(mut self) -> Vec<ReactiveProperty> {
        self.closed = true;
        self.pop().map(|f| f.properties).unwrap_or_default()
    }

    fn pop(&self) -> Option<CaptureFrame> {
        CAPTURE.with(|stack| {
            let mut stack = stack.borrow_mut();
            // Leaked inner sessions (forgotten without close) are evicted
            // here so the stack cannot wedge.
            while let Some(top) = stack.pop() {
                if top.id == self.frame_id {
                    return Some(top);
                }
                tracing::warn!(frame = top.id, "evicting unclosed capture session");
            }
            tracing::warn!(frame = self.frame_id, "capture session already gone");
            None
        })
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        if !self.closed {
            let _ = self.pop();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
