#![forbid(unsafe_code)]

//! Recursive-descent parser for the directive expression language.
//!
//! Precedence, loosest to tightest: ternary, `||`, `&&`, equality,
//! comparison, additive, multiplicative, unary, postfix (member / index /
//! call), primary.

use std::fmt;

use crate::ast::{BinaryOp, Expr, UnaryOp};
use crate::lexer::{LexError, SpannedToken, Token, tokenize};

/// Parse failures.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    /// The tokenizer rejected the source.
    Lex(LexError),
    /// A token that cannot start or continue the construct being parsed.
    UnexpectedToken { pos: usize, found: String },
    /// Source ended mid-expression.
    UnexpectedEnd,
    /// Tokens remained after a complete expression.
    TrailingInput { pos: usize, found: String },
    /// Empty source where an expression was required.
    Empty,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lex(err) => write!(f, "{err}"),
            Self::UnexpectedToken { pos, found } => {
                write!(f, "unexpected token `{found}` at offset {pos}")
            }
            Self::UnexpectedEnd => write!(f, "unexpected end of expression"),
            Self::TrailingInput { pos, found } => {
                write!(f, "trailing input `{found}` at offset {pos}")
            }
            Self::Empty => write!(f, "empty expression"),
        }
    }
}

impl std::error::Error for ParseError {}

impl From<LexError> for ParseError {
    fn from(err: LexError) -> Self {
        Self::Lex(err)
    }
}

/// Parse `src` into an expression.
pub fn parse(src: &str) -> Result<Expr, ParseError> {
    let tokens = tokenize(src)?;
    if tokens.is_empty() {
        return Err(ParseError::Empty);
    }
    let mut parser = Parser { tokens, at: 0 };
    let expr = parser.ternary()?;
    if let Some(tok) = parser.peek() {
        return Err(ParseError::TrailingInput {
            pos: tok.pos,
            found: tok.token.to_string(),
        });
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<SpannedToken>,
    at: usize,
}

impl Parser {
    fn peek(&self) -> Option<&SpannedToken> {
        self.tokens.get(self.at)
    }

    fn advance(&mut self) -> Option<SpannedToken> {
        let tok = self.tokens.get(self.at).cloned();
        if tok.is_some() {
            self.at += 1;
        }
        tok
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek().is_some_and(|t| t.token == *expected) {
            self.at += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token) -> Result<(), ParseError> {
        match self.advance() {
            Some(tok) if tok.token == *expected => Ok(()),
            Some(tok) => Err(ParseError::UnexpectedToken {
                pos: tok.pos,
                found: tok.token.to_string(),
            }),
            None => Err(ParseError::UnexpectedEnd),
        }
    }

    fn ternary(&mut self) -> Result<Expr, ParseError> {
        let cond = self.logical_or()?;
        if self.eat(&Token::Question) {
            let then = self.ternary()?;
            self.expect(&Token::Colon)?;
            let otherwise = self.ternary()?;
            return Ok(Expr::Ternary(
                Box::new(cond),
                Box::new(then),
                Box::new(otherwise),
            ));
        }
        Ok(cond)
    }

    fn logical_or(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.logical_and()?;
        while self.eat(&Token::OrOr) {
            let right = self.logical_and()?;
            left = Expr::Binary(BinaryOp::Or, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn logical_and(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.equality()?;
        while self.eat(&Token::AndAnd) {
            let right = self.equality()?;
            left = Expr::Binary(BinaryOp::And, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn equality(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.comparison()?;
        loop {
            let op = match self.peek().map(|t| &t.token) {
                Some(Token::EqEq) => BinaryOp::Eq,
                Some(Token::NotEq) => BinaryOp::Ne,
                _ => break,
            };
            self.at += 1;
            let right = self.comparison()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn comparison(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.additive()?;
        loop {
            let op = match self.peek().map(|t| &t.token) {
                Some(Token::Lt) => BinaryOp::Lt,
                Some(Token::Le) => BinaryOp::Le,
                Some(Token::Gt) => BinaryOp::Gt,
                Some(Token::Ge) => BinaryOp::Ge,
                _ => break,
            };
            self.at += 1;
            let right = self.additive()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn additive(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.peek().map(|t| &t.token) {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.at += 1;
            let right = self.multiplicative()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek().map(|t| &t.token) {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                Some(Token::Percent) => BinaryOp::Rem,
                _ => break,
            };
            self.at += 1;
            let right = self.unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        if self.eat(&Token::Bang) {
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(self.unary()?)));
        }
        if self.eat(&Token::Minus) {
            return Ok(Expr::Unary(UnaryOp::Neg, Box::new(self.unary()?)));
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.primary()?;
        loop {
            if self.eat(&Token::Dot) {
                match self.advance() {
                    Some(SpannedToken {
                        token: Token::Ident(name),
                        ..
                    }) => {
                        expr = Expr::Member(Box::new(expr), name);
                    }
                    Some(tok) => {
                        return Err(ParseError::UnexpectedToken {
                            pos: tok.pos,
                            found: tok.token.to_string(),
                        });
                    }
                    None => return Err(ParseError::UnexpectedEnd),
                }
            } else if self.eat(&Token::LBracket) {
                let index = self.ternary()?;
                self.expect(&Token::RBracket)?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else if self.eat(&Token::LParen) {
                let mut args = Vec::new();
                if !self.eat(&Token::RParen) {
                    loop {
                        args.push(self.ternary()?);
                        if self.eat(&Token::Comma) {
                            continue;
                        }
                        self.expect(&Token::RParen)?;
                        break;
                    }
                }
                expr = Expr::Call(Box::new(expr), args);
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        match self.advance() {
            Some(tok) => match tok.token {
                Token::Num(n) => Ok(Expr::Num(n)),
                Token::Str(s) => Ok(Expr::Str(s)),
                Token::True => Ok(Expr::Bool(true)),
                Token::False => Ok(Expr::Bool(false)),
                Token::Null => Ok(Expr::Null),
                Token::Ident(name) => Ok(Expr::Ident(name)),
                Token::LParen => {
                    let inner = self.ternary()?;
                    self.expect(&Token::RParen)?;
                    Ok(inner)
                }
                other => Err(ParseError::UnexpectedToken {
                    pos: tok.pos,
                    found: other.to_string(),
                }),
            },
            None => Err(ParseError::UnexpectedEnd),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn precedence_mul_over_add() {
        let expr = parse("1 + 2 * 3").unwrap();
        assert_eq!(
            expr,
            Expr::Binary(
                BinaryOp::Add,
                Box::new(Expr::Num(1.0)),
                Box::new(Expr::Binary(
                    BinaryOp::Mul,
                    Box::new(Expr::Num(2.0)),
                    Box::new(Expr::Num(3.0))
                ))
            )
        );
    }

    #[test]
    fn parens_override_precedence() {
        let expr = parse("(1 + 2) * 3").unwrap();
        assert!(matches!(expr, Expr::Binary(BinaryOp::Mul, _, _)));
    }

    #[test]
    fn member_and_index_chain() {
        let expr = parse("user.tags[0]").unwrap();
        assert_eq!(
            expr,
            Expr::Index(
                Box::new(Expr::Member(
                    Box::new(Expr::Ident("user".into())),
                    "tags".into()
                )),
                Box::new(Expr::Num(0.0))
            )
        );
    }

    #[test]
    fn call_with_args() {
        let expr = parse("format(x, 2)").unwrap();
        assert_eq!(
            expr,
            Expr::Call(
                Box::new(Expr::Ident("format".into())),
                vec![Expr::Ident("x".into()), Expr::Num(2.0)]
            )
        );
    }

    #[test]
    fn ternary_nests_right() {
        let expr = parse("a ? b : c ? d : e").unwrap();
        match expr {
            Expr::Ternary(_, _, otherwise) => {
                assert!(matches!(*otherwise, Expr::Ternary(_, _, _)));
            }
            other => panic!("expected ternary, got {other:?}"),
        }
    }

    #[test]
    fn logical_precedence() {
        // `a || b && c` parses as `a || (b && c)`.
        let expr = parse("a || b && c").unwrap();
        match expr {
            Expr::Binary(BinaryOp::Or, _, right) => {
                assert!(matches!(*right, Expr::Binary(BinaryOp::And, _, _)));
            }
            other => panic!("expected ||, got {other:?}"),
        }
    }

    #[test]
    fn path_detection() {
        assert!(parse("a.b[0].c").unwrap().is_path());
        assert!(parse("name").unwrap().is_path());
        assert!(!parse("a + b").unwrap().is_path());
        assert!(!parse("f(x)").unwrap().is_path());
    }

    #[test]
    fn empty_is_an_error() {
        assert_eq!(parse(""), Err(ParseError::Empty));
        assert_eq!(parse("   "), Err(ParseError::Empty));
    }

    #[test]
    fn trailing_input_is_an_error() {
        assert!(matches!(parse("a b"), Err(ParseError::TrailingInput { .. })));
    }

    #[test]
    fn unclosed_paren_is_an_error() {
        assert!(matches!(parse("(a + b"), Err(ParseError::UnexpectedEnd)));
    }

    proptest! {
        #[test]
        fn numeric_literals_round_trip(n in 0u32..1_000_000u32) {
            let expr = parse(&n.to_string()).unwrap();
            prop_assert_eq!(expr, Expr::Num(f64::from(n)));
        }

        #[test]
        fn identifier_like_strings_parse(name in "[a-zA-Z_][a-zA-Z0-9_]{0,12}") {
            match parse(&name).unwrap() {
                Expr::Ident(parsed) => prop_assert_eq!(parsed, name),
                Expr::Bool(_) | Expr::Null => {
                    // keywords lex as literals
                    prop_assert!(["true", "false", "null"].contains(&name.as_str()));
                }
                other => prop_assert!(false, "unexpected parse: {:?}", other),
            }
        }
    }
}
