#![forbid(unsafe_code)]

//! Directive attribute grammars: the loop expression and the event marker.
//!
//! Parsing lives here; rendering lives in the compiler. These grammars are
//! preserved bit-exact for template compatibility:
//!
//! - loop: `ITEM[, INDEX] (of|in) ITERABLE [| filter:VALUE[:KEYS]]
//!   [| order:DIR[:PROP]]`
//! - event: `on:EVENT.mod.mod`

/// Split on `|`, ignoring `||` (which belongs to the expression language).
#[must_use]
pub(crate) fn split_pipeline(src: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = src.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '|' {
            if chars.peek() == Some(&'|') {
                chars.next();
                current.push_str("||");
            } else {
                parts.push(std::mem::take(&mut current));
            }
        } else {
            current.push(ch);
        }
    }
    parts.push(current);
    parts
}

/// Sort direction for the loop's `order:` clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDir {
    Asc,
    Desc,
}

/// Parsed `filter:` clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterSpec {
    /// Expression source for the filter value.
    pub value_src: String,
    /// Key paths probed for containment; empty means the whole item.
    pub keys: Vec<String>,
}

/// Parsed `order:` clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderSpec {
    pub dir: OrderDir,
    /// Sub-property to sort by; absent means direct comparison.
    pub prop: Option<String>,
}

/// Parsed loop expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopSpec {
    /// Item variable name.
    pub item: String,
    /// Optional index variable name.
    pub index: Option<String>,
    /// Expression source for the iterable.
    pub iterable_src: String,
    pub filter: Option<FilterSpec>,
    pub order: Option<OrderSpec>,
}

/// Why a loop expression failed to parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopParseError {
    /// No ` of ` / ` in ` connective.
    MissingConnective,
    /// Empty item variable or iterable.
    EmptyClause,
    /// A pipeline clause that is neither `filter:` nor `order:`.
    UnknownClause(String),
    /// `order:` direction is not `asc` or `desc`.
    BadOrderDir(String),
}

impl std::fmt::Display for LoopParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingConnective => write!(f, "expected ITEM of ITERABLE"),
            Self::EmptyClause => write!(f, "empty item or iterable clause"),
            Self::UnknownClause(clause) => write!(f, "unknown loop clause: {clause}"),
            Self::BadOrderDir(dir) => write!(f, "order direction must be asc or desc, got {dir}"),
        }
    }
}

impl std::error::Error for LoopParseError {}

/// Parse a loop expression.
pub fn parse_loop(src: &str) -> Result<LoopSpec, LoopParseError> {
    let parts = split_pipeline(src);
    let head = parts[0].trim();

    let (vars, iterable) = head
        .split_once(" of ")
        .or_else(|| head.split_once(" in "))
        .ok_or(LoopParseError::MissingConnective)?;
    let iterable = iterable.trim();
    let (item, index) = match vars.split_once(',') {
        Some((item, index)) => (item.trim(), Some(index.trim())),
        None => (vars.trim(), None),
    };
    if item.is_empty() || iterable.is_empty() || index.is_some_and(str::is_empty) {
        return Err(LoopParseError::EmptyClause);
    }

    let mut filter = None;
    let mut order = None;
    for clause in &parts[1..] {
        let clause = clause.trim();
        if let Some(rest) = clause.strip_prefix("filter:") {
            let (value_src, keys) = match rest.split_once(':') {
                Some((value, keys)) => (
                    value.trim().to_string(),
                    keys.split(',')
                        .map(str::trim)
                        .filter(|k| !k.is_empty())
                        .map(str::to_string)
                        .collect(),
                ),
                None => (rest.trim().to_string(), Vec::new()),
            };
            filter = Some(FilterSpec { value_src, keys });
        } else if let Some(rest) = clause.strip_prefix("order:") {
            let (dir, prop) = match rest.split_once(':') {
                Some((dir, prop)) => (dir.trim(), Some(prop.trim().to_string())),
                None => (rest.trim(), None),
            };
            let dir = match dir {
                "asc" => OrderDir::Asc,
                "desc" => OrderDir::Desc,
                other => return Err(LoopParseError::BadOrderDir(other.to_string())),
            };
            order = Some(OrderSpec { dir, prop });
        } else {
            return Err(LoopParseError::UnknownClause(clause.to_string()));
        }
    }

    Ok(LoopSpec {
        item: item.to_string(),
        index: index.map(str::to_string),
        iterable_src: iterable.to_string(),
        filter,
        order,
    })
}

/// Split a handler body of the form `TARGET = EXPR` at its top-level `=`.
/// Comparison operators (`==`, `!=`, `<=`, `>=`) and quoted strings do not
/// count. Returns `None` for plain expressions.
#[must_use]
pub(crate) fn split_assignment(src: &str) -> Option<(&str, &str)> {
    let bytes = src.as_bytes();
    let mut quote: Option<u8> = None;
    for (i, &b) in bytes.iter().enumerate() {
        match quote {
            Some(q) => {
                if b == q {
                    quote = None;
                }
            }
            None => match b {
                b'\'' | b'"' => quote = Some(b),
                b'=' => {
                    let next_eq = bytes.get(i + 1) == Some(&b'=');
                    let prev_op = i > 0 && matches!(bytes[i - 1], b'=' | b'!' | b'<' | b'>');
                    if !next_eq && !prev_op {
                        let (target, value) = (src[..i].trim(), src[i + 1..].trim());
                        if target.is_empty() || value.is_empty() {
                            return None;
                        }
                        return Some((target, value));
                    }
                }
                _ => {}
            },
        }
    }
    None
}

/// Parsed `on:EVENT.mods` marker name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSpec {
    pub event: String,
    pub once: bool,
    pub prevent_default: bool,
    pub stop_propagation: bool,
}

/// Parse the attribute *name* of an event marker (`on:click.once`).
/// Returns `None` when the name is not an event marker.
#[must_use]
pub fn parse_event_marker(attr_name: &str) -> Option<EventSpec> {
    let rest = attr_name.strip_prefix("on:")?;
    let mut segments = rest.split('.');
    let event = segments.next()?.to_string();
    if event.is_empty() {
        return None;
    }
    let mut spec = EventSpec {
        event,
        once: false,
        prevent_default: false,
        stop_propagation: false,
    };
    for modifier in segments {
        match modifier {
            "once" => spec.once = true,
            "prevent-default" => spec.prevent_default = true,
            "stop-propagation" => spec.stop_propagation = true,
            other => tracing::warn!(modifier = other, "unknown event modifier ignored"),
        }
    }
    Some(spec)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_split_ignores_logical_or() {
        assert_eq!(split_pipeline("a | b"), ["a ", " b"]);
        assert_eq!(split_pipeline("a || b"), ["a || b"]);
        assert_eq!(
            split_pipeline("x of xs | filter:a || b | order:asc"),
            ["x of xs ", " filter:a || b ", " order:asc"]
        );
    }

    #[test]
    fn minimal_loop() {
        let spec = parse_loop("todo of todos").unwrap();
        assert_eq!(spec.item, "todo");
        assert_eq!(spec.index, None);
        assert_eq!(spec.iterable_src, "todos");
        assert!(spec.filter.is_none() && spec.order.is_none());
    }

    #[test]
    fn loop_with_index_and_in() {
        let spec = parse_loop("user, i in team.members").unwrap();
        assert_eq!(spec.item, "user");
        assert_eq!(spec.index.as_deref(), Some("i"));
        assert_eq!(spec.iterable_src, "team.members");
    }

    #[test]
    fn full_pipeline() {
        let spec = parse_loop("p of people | filter:search:name,email | order:desc:age").unwrap();
        let filter = spec.filter.unwrap();
        assert_eq!(filter.value_src, "search");
        assert_eq!(filter.keys, ["name", "email"]);
        let order = spec.order.unwrap();
        assert_eq!(order.dir, OrderDir::Desc);
        assert_eq!(order.prop.as_deref(), Some("age"));
    }

    #[test]
    fn filter_without_keys() {
        let spec = parse_loop("w of words | filter:'re'").unwrap();
        let filter = spec.filter.unwrap();
        assert_eq!(filter.value_src, "'re'");
        assert!(filter.keys.is_empty());
    }

    #[test]
    fn loop_errors() {
        assert_eq!(parse_loop("todos"), Err(LoopParseError::MissingConnective));
        assert_eq!(parse_loop(" of todos"), Err(LoopParseError::EmptyClause));
        assert_eq!(
            parse_loop("t of ts | shuffle"),
            Err(LoopParseError::UnknownClause("shuffle".to_string()))
        );
        assert_eq!(
            parse_loop("t of ts | order:up"),
            Err(LoopParseError::BadOrderDir("up".to_string()))
        );
    }

    #[test]
    fn assignment_split() {
        assert_eq!(split_assignment("hits = hits + 1"), Some(("hits", "hits + 1")));
        assert_eq!(split_assignment("a.b = c == d"), Some(("a.b", "c == d")));
        assert_eq!(split_assignment("a == b"), None);
        assert_eq!(split_assignment("a != b"), None);
        assert_eq!(split_assignment("a <= b"), None);
        assert_eq!(split_assignment("'x=y'"), None);
        assert_eq!(split_assignment("= b"), None);
    }

    #[test]
    fn event_marker_parsing() {
        let spec = parse_event_marker("on:click.once.prevent-default").unwrap();
        assert_eq!(spec.event, "click");
        assert!(spec.once && spec.prevent_default && !spec.stop_propagation);

        assert!(parse_event_marker("onclick").is_none());
        assert!(parse_event_marker("on:").is_none());
        assert_eq!(parse_event_marker("on:submit").unwrap().event, "submit");
    }
}
