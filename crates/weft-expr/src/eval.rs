#![forbid(unsafe_code)]

//! The expression evaluator.
//!
//! [`Evaluator::exec`] is the boundary the binder and directives consume: it
//! never fails outward. Parse or evaluation failure is logged and yields
//! [`Value::Null`], so one broken expression cannot stop the rest of a
//! template from rendering.
//!
//! Reads of data-scope properties go through the reactive accessors, which
//! is what feeds dependency capture: evaluating `a ? b : c` inside a capture
//! window records exactly the properties the taken branch touched.
//!
//! Parsed ASTs are cached per source string; templates re-evaluate the same
//! small expressions constantly.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use weft_reactive::Value;

use crate::ast::{BinaryOp, Expr, UnaryOp};
use crate::parser::{self, ParseError};
use crate::scope::Scope;

/// Evaluation failures. These are internal: `exec` logs them and returns
/// `Null`; `eval` exposes them for callers that need to distinguish.
#[derive(Debug, Clone, PartialEq)]
pub enum EvalError {
    /// The source did not parse.
    Parse(ParseError),
    /// Call of a non-function value.
    NotCallable { found: &'static str },
    /// Operator applied to operand types it does not support.
    TypeMismatch {
        op: BinaryOp,
        left: &'static str,
        right: &'static str,
    },
    /// Unary negation of a non-number.
    NotANumber { found: &'static str },
    /// Member or index access on `null`.
    NullAccess { member: String },
    /// Assignment target is not an identifier/member/index path.
    NotAssignable,
    /// Assignment through a value that is not a container.
    BadAssignTarget { found: &'static str },
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(err) => write!(f, "{err}"),
            Self::NotCallable { found } => write!(f, "cannot call a {found}"),
            Self::TypeMismatch { op, left, right } => {
                write!(f, "operator `{op}` not defined for {left} and {right}")
            }
            Self::NotANumber { found } => write!(f, "cannot negate a {found}"),
            Self::NullAccess { member } => {
                write!(f, "cannot read `{member}` of null")
            }
            Self::NotAssignable => write!(f, "target is not an assignable path"),
            Self::BadAssignTarget { found } => {
                write!(f, "cannot assign through a {found}")
            }
        }
    }
}

impl std::error::Error for EvalError {}

impl From<ParseError> for EvalError {
    fn from(err: ParseError) -> Self {
        Self::Parse(err)
    }
}

/// Expression evaluator with an AST cache. Stateless apart from the cache;
/// share one per engine via `Rc`.
#[derive(Default)]
pub struct Evaluator {
    cache: RefCell<ahash::HashMap<String, Rc<Expr>>>,
}

impl Evaluator {
    /// Create an evaluator with an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `src`, consulting the cache.
    pub fn parse(&self, src: &str) -> Result<Rc<Expr>, ParseError> {
        if let Some(cached) = self.cache.borrow().get(src) {
            return Ok(Rc::clone(cached));
        }
        let parsed = Rc::new(parser::parse(src)?);
        self.cache
            .borrow_mut()
            .insert(src.to_string(), Rc::clone(&parsed));
        Ok(parsed)
    }

    /// Evaluate `src` against `scope`. Never fails outward: errors are
    /// logged and yield `Null`.
    #[must_use]
    pub fn exec(&self, scope: &Scope, src: &str) -> Value {
        match self.parse(src) {
            Ok(expr) => self.exec_parsed(scope, &expr, src),
            Err(err) => {
                tracing::error!(expression = src, error = %err, "expression did not parse");
                Value::Null
            }
        }
    }

    /// Evaluate a pre-parsed expression; log-and-Null on failure. `src` is
    /// only used for diagnostics.
    #[must_use]
    pub fn exec_parsed(&self, scope: &Scope, expr: &Expr, src: &str) -> Value {
        match self.eval(scope, expr) {
            Ok(value) => value,
            Err(err) => {
                tracing::error!(expression = src, error = %err, "expression evaluation failed");
                Value::Null
            }
        }
    }

    /// Evaluate with failure detail, for callers that must distinguish.
    pub fn eval(&self, scope: &Scope, expr: &Expr) -> Result<Value, EvalError> {
        match expr {
            Expr::Null => Ok(Value::Null),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Num(n) => Ok(Value::Num(*n)),
            Expr::Str(s) => Ok(Value::Str(s.clone())),
            Expr::Ident(name) => Ok(scope.lookup(name).unwrap_or(Value::Null)),
            Expr::Member(obj, name) => {
                let target = self.eval(scope, obj)?;
                self.member(&target, name)
            }
            Expr::Index(obj, index) => {
                let target = self.eval(scope, obj)?;
                let index = self.eval(scope, index)?;
                self.index(&target, &index)
            }
            Expr::Call(callee, args) => {
                let callee = self.eval(scope, callee)?;
                let Some(func) = callee.as_func() else {
                    return Err(EvalError::NotCallable {
                        found: callee.type_name(),
                    });
                };
                let mut evaluated = Vec::with_capacity(args.len());
                for arg in args {
                    evaluated.push(self.eval(scope, arg)?);
                }
                Ok(func(&evaluated))
            }
            Expr::Unary(op, operand) => {
                let value = self.eval(scope, operand)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!value.is_truthy())),
                    UnaryOp::Neg => match value.as_num() {
                        Some(n) => Ok(Value::Num(-n)),
                        None => Err(EvalError::NotANumber {
                            found: value.type_name(),
                        }),
                    },
                }
            }
            Expr::Binary(op, left, right) => self.binary(scope, *op, left, right),
            Expr::Ternary(cond, then, otherwise) => {
                if self.eval(scope, cond)?.is_truthy() {
                    self.eval(scope, then)
                } else {
                    self.eval(scope, otherwise)
                }
            }
        }
    }

    fn member(&self, target: &Value, name: &str) -> Result<Value, EvalError> {
        match target {
            Value::Map(map) => Ok(map.get(name).unwrap_or(Value::Null)),
            Value::List(list) if name == "length" => Ok(Value::Num(list.len() as f64)),
            Value::Str(s) if name == "length" => Ok(Value::Num(s.chars().count() as f64)),
            Value::Null => Err(EvalError::NullAccess {
                member: name.to_string(),
            }),
            _ => Ok(Value::Null),
        }
    }

    fn index(&self, target: &Value, index: &Value) -> Result<Value, EvalError> {
        match (target, index) {
            (Value::List(list), Value::Num(n)) => {
                if *n < 0.0 || n.fract() != 0.0 {
                    return Ok(Value::Null);
                }
                Ok(list.get(*n as usize).unwrap_or(Value::Null))
            }
            (Value::Map(map), Value::Str(key)) => Ok(map.get(key).unwrap_or(Value::Null)),
            (Value::Null, _) => Err(EvalError::NullAccess {
                member: index.to_string(),
            }),
            _ => Ok(Value::Null),
        }
    }

    fn binary(
        &self,
        scope: &Scope,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
    ) -> Result<Value, EvalError> {
        // Short-circuit forms keep operand-value semantics: `a || b` yields
        // the first truthy operand, `a && b` the first falsy one.
        if op == BinaryOp::Or {
            let lhs = self.eval(scope, left)?;
            return if lhs.is_truthy() {
                Ok(lhs)
            } else {
                self.eval(scope, right)
            };
        }
        if op == BinaryOp::And {
            let lhs = self.eval(scope, left)?;
            return if lhs.is_truthy() {
                self.eval(scope, right)
            } else {
                Ok(lhs)
            };
        }

        let lhs = self.eval(scope, left)?;
        let rhs = self.eval(scope, right)?;
        let mismatch = || EvalError::TypeMismatch {
            op,
            left: lhs.type_name(),
            right: rhs.type_name(),
        };

        match op {
            BinaryOp::Eq => Ok(Value::Bool(lhs == rhs)),
            BinaryOp::Ne => Ok(Value::Bool(lhs != rhs)),
            BinaryOp::Add => match (&lhs, &rhs) {
                (Value::Str(_), _) | (_, Value::Str(_)) => {
                    Ok(Value::Str(format!("{lhs}{rhs}")))
                }
                (Value::Num(a), Value::Num(b)) => Ok(Value::Num(a + b)),
                _ => Err(mismatch()),
            },
            BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
                match (lhs.as_num(), rhs.as_num()) {
                    (Some(a), Some(b)) => Ok(Value::Num(match op {
                        BinaryOp::Sub => a - b,
                        BinaryOp::Mul => a * b,
                        BinaryOp::Div => a / b,
                        _ => a % b,
                    })),
                    _ => Err(mismatch()),
                }
            }
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                let ordering = match (&lhs, &rhs) {
                    (Value::Num(a), Value::Num(b)) => a.partial_cmp(b),
                    (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
                    _ => return Err(mismatch()),
                };
                let Some(ordering) = ordering else {
                    return Ok(Value::Bool(false)); // NaN compares false
                };
                Ok(Value::Bool(match op {
                    BinaryOp::Lt => ordering.is_lt(),
                    BinaryOp::Le => ordering.is_le(),
                    BinaryOp::Gt => ordering.is_gt(),
                    _ => ordering.is_ge(),
                }))
            }
            BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
        }
    }

    /// Write `value` through the path expression `path_src` (identifier,
    /// member, or index chain). Returns `false` (after logging) when the
    /// path does not parse, is not a path, or does not reach a writable
    /// slot. Writes go through the reactive setters, so watches fire.
    pub fn assign(&self, scope: &Scope, path_src: &str, value: Value) -> bool {
        let expr = match self.parse(path_src) {
            Ok(expr) => expr,
            Err(err) => {
                tracing::error!(path = path_src, error = %err, "assignment path did not parse");
                return false;
            }
        };
        match self.assign_expr(scope, &expr, value) {
            Ok(()) => true,
            Err(err) => {
                tracing::error!(path = path_src, error = %err, "assignment failed");
                false
            }
        }
    }

    fn assign_expr(&self, scope: &Scope, expr: &Expr, value: Value) -> Result<(), EvalError> {
        match expr {
            Expr::Ident(name) => {
                if scope.is_local(name) {
                    // Loop variables and event payloads are snapshots, not
                    // writable slots.
                    return Err(EvalError::NotAssignable);
                }
                scope.data().insert(name.clone(), value);
                Ok(())
            }
            Expr::Member(obj, name) => {
                let target = self.eval(scope, obj)?;
                match target {
                    Value::Map(map) => {
                        map.insert(name.clone(), value);
                        Ok(())
                    }
                    other => Err(EvalError::BadAssignTarget {
                        found: other.type_name(),
                    }),
                }
            }
            Expr::Index(obj, index) => {
                let target = self.eval(scope, obj)?;
                let index = self.eval(scope, index)?;
                match (&target, &index) {
                    (Value::List(list), Value::Num(n)) if *n >= 0.0 && n.fract() == 0.0 => {
                        // Index writes follow the list's silent-assignment
                        // boundary: no structural notification.
                        if list.set(*n as usize, value) {
                            Ok(())
                        } else {
                            Err(EvalError::BadAssignTarget { found: "list" })
                        }
                    }
                    (Value::Map(map), Value::Str(key)) => {
                        map.insert(key.clone(), value);
                        Ok(())
                    }
                    _ => Err(EvalError::BadAssignTarget {
                        found: target.type_name(),
                    }),
                }
            }
            _ => Err(EvalError::NotAssignable),
        }
    }
}

impl fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Evaluator")
            .field("cached_expressions", &self.cache.borrow().len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use weft_reactive::{ReactiveMap, open_capture};

    fn scope(data: serde_json::Value) -> Scope {
        let map = Value::from_json(data).as_map().cloned().expect("map fixture");
        Scope::new(map)
    }

    fn exec(scope: &Scope, src: &str) -> Value {
        Evaluator::new().exec(scope, src)
    }

    #[test]
    fn arithmetic_and_precedence() {
        let s = scope(json!({}));
        assert_eq!(exec(&s, "1 + 2 * 3"), Value::Num(7.0));
        assert_eq!(exec(&s, "(1 + 2) * 3"), Value::Num(9.0));
        assert_eq!(exec(&s, "10 % 3"), Value::Num(1.0));
        assert_eq!(exec(&s, "-4 + 1"), Value::Num(-3.0));
    }

    #[test]
    fn string_concat() {
        let s = scope(json!({"name": "ada"}));
        assert_eq!(exec(&s, "'hi ' + name"), Value::str("hi ada"));
        assert_eq!(exec(&s, "name + 1"), Value::str("ada1"));
    }

    #[test]
    fn comparisons_and_logic() {
        let s = scope(json!({"a": 2, "b": 3}));
        assert_eq!(exec(&s, "a < b"), Value::Bool(true));
        assert_eq!(exec(&s, "a >= b"), Value::Bool(false));
        assert_eq!(exec(&s, "a == 2 && b == 3"), Value::Bool(true));
        assert_eq!(exec(&s, "'x' == 'x'"), Value::Bool(true));
        // Operand-value semantics.
        assert_eq!(exec(&s, "0 || 'fallback'"), Value::str("fallback"));
        assert_eq!(exec(&s, "a && b"), Value::Num(3.0));
    }

    #[test]
    fn member_and_index() {
        let s = scope(json!({"user": {"name": "ada", "tags": ["x", "y"]}}));
        assert_eq!(exec(&s, "user.name"), Value::str("ada"));
        assert_eq!(exec(&s, "user.tags[1]"), Value::str("y"));
        assert_eq!(exec(&s, "user.tags.length"), Value::Num(2.0));
        assert_eq!(exec(&s, "user.name.length"), Value::Num(3.0));
        assert_eq!(exec(&s, "user.tags[9]"), Value::Null, "out of bounds reads null");
        assert_eq!(exec(&s, "user.missing"), Value::Null);
    }

    #[test]
    fn missing_root_is_null_but_null_access_logs_null() {
        let s = scope(json!({}));
        assert_eq!(exec(&s, "ghost"), Value::Null);
        // `ghost.field` fails (null access) and collapses to Null at exec.
        assert_eq!(exec(&s, "ghost.field"), Value::Null);
    }

    #[test]
    fn call_function_values() {
        let s = scope(json!({}));
        s.data().insert(
            "double",
            Value::func(|args| match args.first().and_then(Value::as_num) {
                Some(n) => Value::Num(n * 2.0),
                None => Value::Null,
            }),
        );
        assert_eq!(exec(&s, "double(21)"), Value::Num(42.0));
        assert_eq!(exec(&s, "double(double(10))"), Value::Num(40.0));
    }

    #[test]
    fn calling_non_function_is_contained() {
        let s = scope(json!({"n": 1}));
        assert_eq!(exec(&s, "n(2)"), Value::Null);
    }

    #[test]
    fn ternary_reads_only_taken_branch() {
        let s = scope(json!({"cond": true, "yes": "a", "no": "b"}));
        let session = open_capture();
        assert_eq!(exec(&s, "cond ? yes : no"), Value::str("a"));
        let captured = session.close();
        let keys: Vec<&str> = captured.iter().map(|p| p.key()).collect();
        assert!(keys.contains(&"cond"));
        assert!(keys.contains(&"yes"));
        assert!(!keys.contains(&"no"), "untaken branch must not be captured");
    }

    #[test]
    fn exec_never_panics_on_garbage() {
        let s = scope(json!({}));
        assert_eq!(exec(&s, ""), Value::Null);
        assert_eq!(exec(&s, "?? % ]"), Value::Null);
        assert_eq!(exec(&s, "1 +"), Value::Null);
        assert_eq!(exec(&s, "'hi' - 1"), Value::Null);
    }

    #[test]
    fn assign_root_and_member() {
        let s = scope(json!({"user": {"name": "ada"}}));
        let evaluator = Evaluator::new();

        assert!(evaluator.assign(&s, "user.name", Value::str("grace")));
        assert_eq!(evaluator.exec(&s, "user.name"), Value::str("grace"));

        assert!(evaluator.assign(&s, "fresh", Value::Num(1.0)));
        assert_eq!(evaluator.exec(&s, "fresh"), Value::Num(1.0));
    }

    #[test]
    fn assign_through_watches_fire() {
        let s = scope(json!({"user": {"name": "ada"}}));
        let evaluator = Evaluator::new();
        let name = s
            .data()
            .get("user")
            .unwrap()
            .as_map()
            .unwrap()
            .property("name")
            .unwrap();
        let fired = std::rc::Rc::new(std::cell::Cell::new(0));
        let f = std::rc::Rc::clone(&fired);
        let _w = name.watch(move |_, _| f.set(f.get() + 1));

        evaluator.assign(&s, "user.name", Value::str("grace"));
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn assign_rejects_non_paths_and_locals() {
        let s = scope(json!({"a": 1}));
        let evaluator = Evaluator::new();
        assert!(!evaluator.assign(&s, "a + 1", Value::Num(2.0)));

        let mut layer = indexmap::IndexMap::new();
        layer.insert("item".to_string(), Value::Num(5.0));
        let child = s.layered(layer);
        assert!(!evaluator.assign(&child, "item", Value::Num(6.0)));
    }

    #[test]
    fn ast_cache_reuses_parses() {
        let evaluator = Evaluator::new();
        let s = scope(json!({"a": 1}));
        let _ = evaluator.exec(&s, "a + 1");
        let _ = evaluator.exec(&s, "a + 1");
        assert_eq!(format!("{evaluator:?}"), "Evaluator { cached_expressions: 1 }");
    }
}
