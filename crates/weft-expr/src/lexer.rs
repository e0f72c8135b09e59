#![forbid(unsafe_code)]

//! Tokenizer for the directive expression language.
//!
//! The language is a deliberately small, safe subset: literals, identifier
//! paths, indexing, calls, arithmetic, comparisons, logical operators, and
//! the ternary. No statements, no loops, no assignment operators — directive
//! text is data, not a script.

use std::fmt;

/// One token with its byte offset in the source.
#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub pos: usize,
}

/// Token kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Num(f64),
    Str(String),
    Ident(String),
    True,
    False,
    Null,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    Lt,
    Le,
    Gt,
    Ge,
    EqEq,
    NotEq,
    AndAnd,
    OrOr,
    Question,
    Colon,
    Dot,
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Num(n) => write!(f, "{n}"),
            Token::Str(s) => write!(f, "{s:?}"),
            Token::Ident(name) => write!(f, "{name}"),
            Token::True => write!(f, "true"),
            Token::False => write!(f, "false"),
            Token::Null => write!(f, "null"),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::Percent => write!(f, "%"),
            Token::Bang => write!(f, "!"),
            Token::Lt => write!(f, "<"),
            Token::Le => write!(f, "<="),
            Token::Gt => write!(f, ">"),
            Token::Ge => write!(f, ">="),
            Token::EqEq => write!(f, "=="),
            Token::NotEq => write!(f, "!="),
            Token::AndAnd => write!(f, "&&"),
            Token::OrOr => write!(f, "||"),
            Token::Question => write!(f, "?"),
            Token::Colon => write!(f, ":"),
            Token::Dot => write!(f, "."),
            Token::Comma => write!(f, ","),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
        }
    }
}

/// Lexing failures.
#[derive(Debug, Clone, PartialEq)]
pub enum LexError {
    /// A character the language does not use.
    UnexpectedChar { pos: usize, ch: char },
    /// A string literal without a closing quote.
    UnterminatedString { pos: usize },
    /// A numeric literal that does not parse.
    BadNumber { pos: usize, text: String },
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedChar { pos, ch } => {
                write!(f, "unexpected character {ch:?} at offset {pos}")
            }
            Self::UnterminatedString { pos } => {
                write!(f, "unterminated string starting at offset {pos}")
            }
            Self::BadNumber { pos, text } => {
                write!(f, "malformed number {text:?} at offset {pos}")
            }
        }
    }
}

impl std::error::Error for LexError {}

/// Tokenize `src`.
pub fn tokenize(src: &str) -> Result<Vec<SpannedToken>, LexError> {
    let mut tokens = Vec::new();
    let bytes: Vec<char> = src.chars().collect();
    let mut i = 0;

    while i < bytes.len() {
        let ch = bytes[i];
        let pos = i;
        match ch {
            c if c.is_whitespace() => {
                i += 1;
            }
            '\'' | '"' => {
                let quote = ch;
                let mut text = String::new();
                let mut j = i + 1;
                let mut closed = false;
                while j < bytes.len() {
                    let c = bytes[j];
                    if c == '\\' && j + 1 < bytes.len() {
                        let escaped = bytes[j + 1];
                        text.push(match escaped {
                            'n' => '\n',
                            't' => '\t',
                            other => other,
                        });
                        j += 2;
                        continue;
                    }
                    if c == quote {
                        closed = true;
                        break;
                    }
                    text.push(c);
                    j += 1;
                }
                if !closed {
                    return Err(LexError::UnterminatedString { pos });
                }
                tokens.push(SpannedToken {
                    token: Token::Str(text),
                    pos,
                });
                i = j + 1;
            }
            c if c.is_ascii_digit() => {
                let mut j = i;
                let mut seen_dot = false;
                while j < bytes.len() {
                    let c = bytes[j];
                    if c.is_ascii_digit() {
                        j += 1;
                    } else if c == '.'
                        && !seen_dot
                        && bytes.get(j + 1).is_some_and(char::is_ascii_digit)
                    {
                        seen_dot = true;
                        j += 1;
                    } else {
                        break;
                    }
                }
                let text: String = bytes[i..j].iter().collect();
                let n = text.parse::<f64>().map_err(|_| LexError::BadNumber {
                    pos,
                    text: text.clone(),
                })?;
                tokens.push(SpannedToken {
                    token: Token::Num(n),
                    pos,
                });
                i = j;
            }
            c if c.is_alphabetic() || c == '_' || c == '$' => {
                let mut j = i;
                while j < bytes.len()
                    && (bytes[j].is_alphanumeric() || bytes[j] == '_' || bytes[j] == '$')
                {
                    j += 1;
                }
                let word: String = bytes[i..j].iter().collect();
                let token = match word.as_str() {
                    "true" => Token::True,
                    "false" => Token::False,
                    "null" => Token::Null,
                    _ => Token::Ident(word),
                };
                tokens.push(SpannedToken { token, pos });
                i = j;
            }
            _ => {
                let two: Option<(char, char)> = bytes.get(i + 1).map(|next| (ch, *next));
                let (token, width) = match two {
                    Some(('=', '=')) => (Token::EqEq, 2),
                    Some(('!', '=')) => (Token::NotEq, 2),
                    Some(('<', '=')) => (Token::Le, 2),
                    Some(('>', '=')) => (Token::Ge, 2),
                    Some(('&', '&')) => (Token::AndAnd, 2),
                    Some(('|', '|')) => (Token::OrOr, 2),
                    _ => {
                        let single = match ch {
                            '+' => Token::Plus,
                            '-' => Token::Minus,
                            '*' => Token::Star,
                            '/' => Token::Slash,
                            '%' => Token::Percent,
                            '!' => Token::Bang,
                            '<' => Token::Lt,
                            '>' => Token::Gt,
                            '?' => Token::Question,
                            ':' => Token::Colon,
                            '.' => Token::Dot,
                            ',' => Token::Comma,
                            '(' => Token::LParen,
                            ')' => Token::RParen,
                            '[' => Token::LBracket,
                            ']' => Token::RBracket,
                            other => return Err(LexError::UnexpectedChar { pos, ch: other }),
                        };
                        (single, 1)
                    }
                };
                tokens.push(SpannedToken { token, pos });
                i += width;
            }
        }
    }

    Ok(tokens)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
