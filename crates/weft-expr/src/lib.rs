#![forbid(unsafe_code)]

//! Directive expression language for Weft.
//!
//! Template directives carry small expressions (`user.name`, `count > 0`,
//! `todo of todos`). This crate lexes, parses, and evaluates them against a
//! [`Scope`] assembled from local data, ambient globals, and evaluation-time
//! locals.
//!
//! The language is a deliberately scoped-down subset of a general-purpose
//! host language: property paths, indexing, calls, arithmetic, comparisons,
//! logical operators, and the ternary. Directive text never executes
//! statements.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Parse error | malformed directive text | logged, `exec` yields `Null` |
//! | Null access | member/index on a null value | logged, `exec` yields `Null` |
//! | Type mismatch | e.g. `'a' - 1` | logged, `exec` yields `Null` |
//! | Bad assignment | non-path or non-container target | logged, `assign` returns `false` |

pub mod ast;
pub mod eval;
pub mod lexer;
pub mod parser;
pub mod scope;

pub use ast::{BinaryOp, Expr, UnaryOp};
pub use eval::{EvalError, Evaluator};
pub use parser::{ParseError, parse};
pub use scope::Scope;
