//! Recursive descent parser.
//!
//! Precedence, loosest first:
//!
//! | Level          | Forms                   |
//! |----------------|-------------------------|
//! | additive       | `a + b`, `a - b`        |
//! | multiplicative | `a * b`, `a / b`        |
//! | unary          | `-a`, `!a`              |
//! | postfix        | `a.b`, `a(args)`        |
//! | primary        | names, literals, `(a)`  |
//!
//! A minus directly before a number literal is folded into the literal.

use crate::ast::{BinaryOp, ExprArena, ExprId, ExprKind, Literal, Span, UnaryOp};
use crate::errors::ParseError;
use crate::lexer::{tokenize, Token, TokenKind};
use crate::stack::ensure_sufficient_stack;
use crate::Program;

/// Parse `source` into a [`Program`].
pub fn parse(source: &str) -> Result<Program, ParseError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens: &tokens,
        pos: 0,
        arena: ExprArena::new(),
    };
    let root = parser.parse_expr()?;
    parser.expect_eof()?;
    Ok(Program {
        arena: parser.arena,
        root,
        source: source.to_string(),
    })
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    arena: ExprArena,
}

impl Parser<'_> {
    // Cursor

    fn current(&self) -> &Token {
        // The token list always ends with Eof, and `advance` never moves past it.
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.current().kind
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek_kind() == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        let token = self.current();
        ParseError::new(
            format!("expected {expected}, found {}", token.kind.describe()),
            token.span,
        )
    }

    fn expect(&mut self, kind: &TokenKind, expected: &str) -> Result<Token, ParseError> {
        if self.peek_kind() == kind {
            Ok(self.advance())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn expect_eof(&self) -> Result<(), ParseError> {
        if *self.peek_kind() == TokenKind::Eof {
            Ok(())
        } else {
            Err(self.unexpected("end of input"))
        }
    }

    fn span_of(&self, id: ExprId) -> Span {
        self.arena.get(id).span
    }

    // Grammar

    fn parse_expr(&mut self) -> Result<ExprId, ParseError> {
        ensure_sufficient_stack(|| self.parse_additive())
    }

    fn parse_additive(&mut self) -> Result<ExprId, ParseError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = self.binary(op, left, right);
        }
    }

    fn parse_multiplicative(&mut self) -> Result<ExprId, ParseError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_unary()?;
            left = self.binary(op, left, right);
        }
    }

    fn binary(&mut self, op: BinaryOp, left: ExprId, right: ExprId) -> ExprId {
        let span = self.span_of(left).to(self.span_of(right));
        self.arena.alloc(ExprKind::Binary { op, left, right }, span)
    }

    fn parse_unary(&mut self) -> Result<ExprId, ParseError> {
        let op = match self.peek_kind() {
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Bang => UnaryOp::Not,
            _ => return self.parse_postfix(),
        };
        let op_token = self.advance();

        if op == UnaryOp::Neg {
            let folded = match self.peek_kind() {
                TokenKind::Int(n) => n.checked_neg().map(Literal::Int),
                TokenKind::Float(x) => Some(Literal::Float(-x)),
                _ => None,
            };
            if let Some(literal) = folded {
                let number = self.advance();
                let span = op_token.span.to(number.span);
                let id = self.arena.alloc(ExprKind::Literal(literal), span);
                return self.parse_postfix_from(id);
            }
        }

        let operand = ensure_sufficient_stack(|| self.parse_unary())?;
        let span = op_token.span.to(self.span_of(operand));
        Ok(self.arena.alloc(ExprKind::Unary { op, operand }, span))
    }

    fn parse_postfix(&mut self) -> Result<ExprId, ParseError> {
        let primary = self.parse_primary()?;
        self.parse_postfix_from(primary)
    }

    fn parse_postfix_from(&mut self, mut expr: ExprId) -> Result<ExprId, ParseError> {
        loop {
            match self.peek_kind() {
                TokenKind::Dot => {
                    self.advance();
                    let name = match self.peek_kind() {
                        TokenKind::Ident(name) => name.clone(),
                        _ => return Err(self.unexpected("property or method name")),
                    };
                    let name_token = self.advance();
                    let span = self.span_of(expr).to(name_token.span);
                    expr = self.arena.alloc(ExprKind::Member { object: expr, name }, span);
                }
                TokenKind::LParen => {
                    self.advance();
                    let args = self.parse_args()?;
                    let close = self.expect(&TokenKind::RParen, "`)`")?;
                    let span = self.span_of(expr).to(close.span);
                    expr = self.arena.alloc(ExprKind::Call { callee: expr, args }, span);
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_args(&mut self) -> Result<Vec<ExprId>, ParseError> {
        let mut args = Vec::new();
        if *self.peek_kind() == TokenKind::RParen {
            return Ok(args);
        }
        loop {
            args.push(self.parse_expr()?);
            if !self.eat(&TokenKind::Comma) {
                return Ok(args);
            }
        }
    }

    fn parse_primary(&mut self) -> Result<ExprId, ParseError> {
        let kind = match self.peek_kind() {
            TokenKind::Ident(name) => ExprKind::Ident(name.clone()),
            TokenKind::Int(n) => ExprKind::Literal(Literal::Int(*n)),
            TokenKind::Float(x) => ExprKind::Literal(Literal::Float(*x)),
            TokenKind::Str(s) => ExprKind::Literal(Literal::Str(s.clone())),
            TokenKind::True => ExprKind::Literal(Literal::Bool(true)),
            TokenKind::False => ExprKind::Literal(Literal::Bool(false)),
            TokenKind::Nil => ExprKind::Literal(Literal::Nil),
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(&TokenKind::RParen, "`)`")?;
                return Ok(inner);
            }
            _ => return Err(self.unexpected("an expression")),
        };
        let token = self.advance();
        Ok(self.arena.alloc(kind, token.span))
    }
}
