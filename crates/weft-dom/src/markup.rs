#![forbid(unsafe_code)]

//! Markup parsing and serialization for the host tree.
//!
//! [`parse_fragment`] turns template text into a detached subtree rooted at
//! a synthetic `Element` wrapper; [`outer_html`] renders a node back to
//! text. The grammar is the pragmatic template subset: elements, attributes
//! (quoted either way or bare), text, comments, and void elements. It is not
//! a conforming HTML parser and does not try to be; templates authored for
//! this engine are well-formed.
//!
//! # Invariants
//!
//! 1. Tag and attribute names are lowercased on parse.
//! 2. Void elements (`br`, `img`, `input`, ...) never take children and
//!    tolerate a trailing `/`.
//! 3. A close tag with no matching open tag on the stack is ignored with a
//!    warning; unclosed tags are implicitly closed at end of input.
//! 4. The named entities `&amp;` `&lt;` `&gt;` `&quot;` `&#39;` round-trip
//!    through parse and serialize; text serialization escapes `&` `<` `>`,
//!    attribute serialization additionally escapes `"`.

use crate::node::NodeRef;

/// Parse failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkupError {
    /// Input ended inside a tag.
    UnterminatedTag { at: usize },
    /// Input ended inside a comment.
    UnterminatedComment { at: usize },
    /// An attribute value's quote was never closed.
    UnterminatedAttribute { at: usize },
}

impl std::fmt::Display for MarkupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnterminatedTag { at } => write!(f, "unterminated tag at byte {at}"),
            Self::UnterminatedComment { at } => write!(f, "unterminated comment at byte {at}"),
            Self::UnterminatedAttribute { at } => {
                write!(f, "unterminated attribute value at byte {at}")
            }
        }
    }
}

impl std::error::Error for MarkupError {}

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

fn is_void(tag: &str) -> bool {
    VOID_ELEMENTS.contains(&tag)
}

/// Parse template text into a detached subtree. The returned node is a
/// synthetic `template` element whose children are the parsed fragment.
pub fn parse_fragment(input: &str) -> Result<NodeRef, MarkupError> {
    let root = NodeRef::element("template");
    let mut stack: Vec<NodeRef> = vec![root.clone()];
    let bytes = input.as_bytes();
    let mut pos = 0;
    let mut text_start = 0;

    while pos < bytes.len() {
        if bytes[pos] != b'<' {
            pos += 1;
            continue;
        }
        // Flush pending text before the tag.
        if pos > text_start {
            let text = decode_entities(&input[text_start..pos]);
            append_text(&stack, &text);
        }

        if input[pos..].starts_with("<!--") {
            let end = input[pos + 4..]
                .find("-->")
                .ok_or(MarkupError::UnterminatedComment { at: pos })?;
            let content = &input[pos + 4..pos + 4 + end];
            stack
                .last()
                .expect("stack never empties below the root")
                .append_child(&NodeRef::comment(content));
            pos += 4 + end + 3;
            text_start = pos;
            continue;
        }

        if input[pos..].starts_with("</") {
            let end = input[pos..]
                .find('>')
                .ok_or(MarkupError::UnterminatedTag { at: pos })?;
            let name = input[pos + 2..pos + end].trim().to_ascii_lowercase();
            close_tag(&mut stack, &name);
            pos += end + 1;
            text_start = pos;
            continue;
        }

        // Open tag.
        let (node, self_closing, consumed) = parse_open_tag(&input[pos..], pos)?;
        let tag = node.tag().unwrap_or_default();
        stack
            .last()
            .expect("stack never empties below the root")
            .append_child(&node);
        if !self_closing && !is_void(&tag) {
            stack.push(node);
        }
        pos += consumed;
        text_start = pos;
    }

    if pos > text_start {
        let text = decode_entities(&input[text_start..pos]);
        append_text(&stack, &text);
    }
    Ok(root)
}

fn append_text(stack: &[NodeRef], text: &str) {
    if text.is_empty() {
        return;
    }
    stack
        .last()
        .expect("stack never empties below the root")
        .append_child(&NodeRef::text_node(text));
}

fn close_tag(stack: &mut Vec<NodeRef>, name: &str) {
    let found = stack
        .iter()
        .skip(1)
        .rposition(|node| node.tag().as_deref() == Some(name));
    match found {
        // rposition skipped the root, so the stack index is found + 1.
        Some(index) => stack.truncate(index + 1),
        None => tracing::warn!(tag = name, "close tag without matching open tag; ignored"),
    }
}

/// Parse one open tag starting at `input[0] == '<'`. Returns the element,
/// whether it was explicitly self-closed, and the bytes consumed.
fn parse_open_tag(input: &str, offset: usize) -> Result<(NodeRef, bool, usize), MarkupError> {
    let bytes = input.as_bytes();
    let mut pos = 1;

    let name_start = pos;
    while pos < bytes.len() && !bytes[pos].is_ascii_whitespace() && bytes[pos] != b'>' && bytes[pos] != b'/' {
        pos += 1;
    }
    let node = NodeRef::element(&input[name_start..pos]);

    let mut self_closing = false;
    loop {
        while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
            pos += 1;
        }
        if pos >= bytes.len() {
            return Err(MarkupError::UnterminatedTag { at: offset });
        }
        match bytes[pos] {
            b'>' => {
                pos += 1;
                break;
            }
            b'/' => {
                self_closing = true;
                pos += 1;
            }
            _ => {
                let attr_start = pos;
                while pos < bytes.len()
                    && !bytes[pos].is_ascii_whitespace()
                    && bytes[pos] != b'='
                    && bytes[pos] != b'>'
                    && bytes[pos] != b'/'
                {
                    pos += 1;
                }
                let name = input[attr_start..pos].to_ascii_lowercase();
                while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
                    pos += 1;
                }
                let value = if pos < bytes.len() && bytes[pos] == b'=' {
                    pos += 1;
                    while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
                        pos += 1;
                    }
                    if pos >= bytes.len() {
                        return Err(MarkupError::UnterminatedTag { at: offset });
                    }
                    if bytes[pos] == b'"' || bytes[pos] == b'\'' {
                        let quote = bytes[pos];
                        pos += 1;
                        let value_start = pos;
                        while pos < bytes.len() && bytes[pos] != quote {
                            pos += 1;
                        }
                        if pos >= bytes.len() {
                            return Err(MarkupError::UnterminatedAttribute {
                                at: offset + value_start,
                            });
                        }
                        let value = decode_entities(&input[value_start..pos]);
                        pos += 1;
                        value
                    } else {
                        let value_start = pos;
                        while pos < bytes.len()
                            && !bytes[pos].is_ascii_whitespace()
                            && bytes[pos] != b'>'
                        {
                            pos += 1;
                        }
                        decode_entities(&input[value_start..pos])
                    }
                } else {
                    String::new()
                };
                if !name.is_empty() {
                    node.set_attr(name, value);
                }
            }
        }
    }
    Ok((node, self_closing, pos))
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

fn decode_entities(input: &str) -> String {
    if !input.contains('&') {
        return input.to_string();
    }
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let replaced = [
            ("&amp;", '&'),
            ("&lt;", '<'),
            ("&gt;", '>'),
            ("&quot;", '"'),
            ("&#39;", '\''),
        ]
        .iter()
        .find(|(entity, _)| rest.starts_with(entity));
        match replaced {
            Some((entity, ch)) => {
                out.push(*ch);
                rest = &rest[entity.len()..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn escape_text(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_attr(input: &str) -> String {
    escape_text(input).replace('"', "&quot;")
}

// ---------------------------------------------------------------------------
// Serialization
// ---------------------------------------------------------------------------

/// Render a node (and its subtree) back to markup text. The synthetic
/// `template` wrapper from [`parse_fragment`] serializes as its children
/// only when passed to [`inner_html`].
#[must_use]
pub fn outer_html(node: &NodeRef) -> String {
    let mut out = String::new();
    write_node(node, &mut out);
    out
}

/// Render a node's children only.
#[must_use]
pub fn inner_html(node: &NodeRef) -> String {
    let mut out = String::new();
    for child in node.children() {
        write_node(&child, &mut out);
    }
    out
}

fn write_node(node: &NodeRef, out: &mut String) {
    match node.node_type() {
        crate::node::NodeType::Document => {
            for child in node.children() {
                write_node(&child, out);
            }
        }
        crate::node::NodeType::Text => {
            out.push_str(&escape_text(&node.text().unwrap_or_default()));
        }
        crate::node::NodeType::Comment => {
            out.push_str("<!--");
            out.push_str(&node.text().unwrap_or_default());
            out.push_str("-->");
        }
        crate::node::NodeType::Element => {
            let tag = node.tag().unwrap_or_default();
            out.push('<');
            out.push_str(&tag);
            for name in node.attr_names() {
                let value = node.attr(&name).unwrap_or_default();
                out.push(' ');
                out.push_str(&name);
                if !value.is_empty() {
                    out.push_str("=\"");
                    out.push_str(&escape_attr(&value));
                    out.push('"');
                }
            }
            out.push('>');
            if is_void(&tag) {
                return;
            }
            for child in node.children() {
                write_node(&child, out);
            }
            out.push_str("</");
            out.push_str(&tag);
            out.push('>');
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
