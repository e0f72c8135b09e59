#![forbid(unsafe_code)]

//! Delimiter scanning: splits template text into literal and expression
//! fields.
//!
//! The vocabulary is `{{ expr }}` for interpolation and `{{:html expr }}`
//! for markup insertion. An opening delimiter with no closing pair is left
//! in the literal text untouched.

/// One segment of a template text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
    /// Verbatim text between expression fields.
    Literal(String),
    /// An expression field.
    Expr {
        /// Trimmed expression source.
        src: String,
        /// Whether this was the `{{:html }}` variant.
        html: bool,
    },
}

const OPEN: &str = "{{";
const CLOSE: &str = "}}";
const HTML_TAG: &str = ":html";

/// Splits template text at `{{ }}` boundaries.
#[derive(Debug, Clone, Copy, Default)]
pub struct DelimiterHandler;

impl DelimiterHandler {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Whether `text` contains at least one complete expression field. This
    /// is the probe used by directives that forbid delimiter syntax.
    #[must_use]
    pub fn has_delimiters(&self, text: &str) -> bool {
        match text.find(OPEN) {
            Some(open) => text[open + OPEN.len()..].contains(CLOSE),
            None => false,
        }
    }

    /// Split `text` into literal and expression fields, in order. Adjacent
    /// literals never occur; empty literals are dropped.
    #[must_use]
    pub fn parse_fields(&self, text: &str) -> Vec<Field> {
        let mut fields = Vec::new();
        let mut rest = text;
        loop {
            let Some(open) = rest.find(OPEN) else { break };
            let after_open = &rest[open + OPEN.len()..];
            let Some(close) = after_open.find(CLOSE) else { break };

            if open > 0 {
                fields.push(Field::Literal(rest[..open].to_string()));
            }
            let body = &after_open[..close];
            let (body, html) = match body.strip_prefix(HTML_TAG) {
                Some(stripped) => (stripped, true),
                None => (body, false),
            };
            fields.push(Field::Expr {
                src: body.trim().to_string(),
                html,
            });
            rest = &after_open[close + CLOSE.len()..];
        }
        if !rest.is_empty() {
            fields.push(Field::Literal(rest.to_string()));
        }
        fields
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
