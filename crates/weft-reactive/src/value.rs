#![forbid(unsafe_code)]

//! The dynamic value model.
//!
//! [`Value`] is what flows through scopes, bindings, and directives. Scalars
//! are plain; containers ([`ReactiveList`], [`ReactiveMap`]) are shared
//! handles that are reactive by construction — there is no plain container
//! form, so "making a value reactive" is the identity on anything already
//! built, and the recursive transform of the original design lives in
//! [`Value::from_json`].
//!
//! # Invariants
//!
//! 1. Scalar equality is structural; container and function equality is
//!    identity (pointer) equality.
//! 2. `Null` displays as the empty string (a broken binding renders as
//!    nothing, not as a placeholder token).
//! 3. `to_json` is total: functions snapshot to JSON null.

use std::fmt;
use std::rc::Rc;

use crate::list::ReactiveList;
use crate::map::ReactiveMap;

/// A host-language function value, callable from expressions and event
/// handlers.
pub type NativeFn = Rc<dyn Fn(&[Value]) -> Value>;

/// A dynamically-typed value.
#[derive(Clone)]
pub enum Value {
    /// Absent / undefined.
    Null,
    /// Boolean.
    Bool(bool),
    /// Number (IEEE double, like the host language the templates came from).
    Num(f64),
    /// String.
    Str(String),
    /// Reactive sequence (shared handle).
    List(ReactiveList),
    /// Reactive keyed object (shared handle).
    Map(ReactiveMap),
    /// Callable.
    Func(NativeFn),
}

impl Value {
    /// Construct a string value.
    pub fn str(s: impl Into<String>) -> Self {
        Value::Str(s.into())
    }

    /// Construct a number value.
    #[must_use]
    pub fn num(n: f64) -> Self {
        Value::Num(n)
    }

    /// Construct a function value.
    pub fn func(f: impl Fn(&[Value]) -> Value + 'static) -> Self {
        Value::Func(Rc::new(f))
    }

    /// Whether this value is `Null`.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Host-language truthiness: `Null`, `false`, `0`/NaN, and `""` are
    /// falsy; everything else is truthy.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Num(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
            Value::List(_) | Value::Map(_) | Value::Func(_) => true,
        }
    }

    /// Borrow the string content, if this is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric content, if this is a number.
    #[must_use]
    pub fn as_num(&self) -> Option<f64> {
        match self {
            Value::Num(n) => Some(*n),
            _ => None,
        }
    }

    /// The list handle, if this is a list.
    #[must_use]
    pub fn as_list(&self) -> Option<&ReactiveList> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    /// The map handle, if this is a map.
    #[must_use]
    pub fn as_map(&self) -> Option<&ReactiveMap> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// The callable, if this is a function.
    #[must_use]
    pub fn as_func(&self) -> Option<&NativeFn> {
        match self {
            Value::Func(f) => Some(f),
            _ => None,
        }
    }

    /// Build a value graph from JSON. Objects become [`ReactiveMap`]s and
    /// arrays become [`ReactiveList`]s, recursively — this is the
    /// reactive-ify transform: everything it returns is observable.
    #[must_use]
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Num(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(items) => {
                Value::List(ReactiveList::from_values(items.into_iter().map(Value::from_json)))
            }
            serde_json::Value::Object(entries) => Value::Map(ReactiveMap::from_entries(
                entries.into_iter().map(|(k, v)| (k, Value::from_json(v))),
            )),
        }
    }

    /// Snapshot this value graph as JSON. Functions are not serializable and
    /// snapshot to null. Reads are untracked (no capture, no events).
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null | Value::Func(_) => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Num(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Str(s) => serde_json::Value::String(s.clone()),
            Value::List(l) => {
                serde_json::Value::Array(l.snapshot().iter().map(Value::to_json).collect())
            }
            Value::Map(m) => {
                let mut obj = serde_json::Map::new();
                for key in m.keys() {
                    if let Some(prop) = m.property(&key) {
                        obj.insert(key, prop.peek().to_json());
                    }
                }
                serde_json::Value::Object(obj)
            }
        }
    }

    /// Short type tag used in diagnostics.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Num(_) => "number",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Func(_) => "function",
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Num(a), Value::Num(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a.ptr_eq(b),
            (Value::Map(a), Value::Map(b)) => a.ptr_eq(b),
            (Value::Func(a), Value::Func(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Num(n) => {
                // Integer-valued doubles render without the trailing ".0".
                if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{n}")
                }
            }
            Value::Str(s) => write!(f, "{s}"),
            Value::List(l) => {
                write!(f, "[")?;
                for (i, item) in l.snapshot().iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    match item {
                        Value::Str(s) => write!(f, "\"{s}\"")?,
                        other => write!(f, "{other}")?,
                    }
                }
                write!(f, "]")
            }
            Value::Map(m) => {
                write!(f, "{{")?;
                for (i, key) in m.keys().iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    let value = m.property(key).map(|p| p.peek()).unwrap_or(Value::Null);
                    match value {
                        Value::Str(s) => write!(f, "\"{key}\":\"{s}\"")?,
                        other => write!(f, "\"{key}\":{other}")?,
                    }
                }
                write!(f, "}}")
            }
            Value::Func(_) => write!(f, "[function]"),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Num(n) => write!(f, "Num({n})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::List(l) => write!(f, "List(#{})", l.id()),
            Value::Map(m) => write!(f, "Map(#{})", m.id()),
            Value::Func(_) => write!(f, "Func"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Num(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Num(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<ReactiveList> for Value {
    fn from(l: ReactiveList) -> Self {
        Value::List(l)
    }
}

impl From<ReactiveMap> for Value {
    fn from(m: ReactiveMap) -> Self {
        Value::Map(m)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
