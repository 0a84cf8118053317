//! Expression tree.
//!
//! Nodes live in an [`ExprArena`] and refer to each other by [`ExprId`], so
//! a compiled [`Program`](crate::Program) is one flat allocation that can be
//! evaluated any number of times.

use std::fmt;

use sugar_handle::Variant;

/// Byte range in the expression source.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    #[inline]
    pub const fn new(start: usize, end: usize) -> Self {
        Span { start, end }
    }

    /// Smallest span covering both.
    #[inline]
    #[must_use]
    pub fn to(self, other: Span) -> Span {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Index of an expression in its [`ExprArena`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ExprId(u32);

impl ExprId {
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Nil,
}

impl Literal {
    pub fn to_variant(&self) -> Variant {
        match self {
            Literal::Int(n) => Variant::Int(*n),
            Literal::Float(x) => Variant::Float(*x),
            Literal::Str(s) => Variant::Str(s.clone()),
            Literal::Bool(b) => Variant::Bool(*b),
            Literal::Nil => Variant::Empty,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    pub fn as_symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_symbol())
    }
}

/// Prefix operators. Parsed, but not evaluated.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ExprKind {
    Literal(Literal),
    /// Bare name, resolved against the environment.
    Ident(String),
    /// `object.name`
    Member { object: ExprId, name: String },
    /// `callee(args...)`
    Call { callee: ExprId, args: Vec<ExprId> },
    Binary {
        op: BinaryOp,
        left: ExprId,
        right: ExprId,
    },
    Unary { op: UnaryOp, operand: ExprId },
}

impl ExprKind {
    /// Node name for diagnostics.
    pub fn describe(&self) -> &'static str {
        match self {
            ExprKind::Literal(_) => "literal",
            ExprKind::Ident(_) => "identifier",
            ExprKind::Member { .. } => "member access",
            ExprKind::Call { .. } => "call",
            ExprKind::Binary { .. } => "binary operator",
            ExprKind::Unary { op: UnaryOp::Neg, .. } => "unary minus",
            ExprKind::Unary { op: UnaryOp::Not, .. } => "unary not",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

/// Flat storage for one program's expressions.
#[derive(Clone, Debug, Default)]
pub struct ExprArena {
    exprs: Vec<Expr>,
}

impl ExprArena {
    pub fn new() -> Self {
        ExprArena::default()
    }

    #[allow(
        clippy::cast_possible_truncation,
        reason = "expression sources are far below u32::MAX nodes"
    )]
    pub fn alloc(&mut self, kind: ExprKind, span: Span) -> ExprId {
        let id = ExprId(self.exprs.len() as u32);
        self.exprs.push(Expr { kind, span });
        id
    }

    /// # Panics
    /// Panics if `id` was not allocated by this arena.
    #[inline]
    pub fn get(&self, id: ExprId) -> &Expr {
        &self.exprs[id.index()]
    }

    pub fn len(&self) -> usize {
        self.exprs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exprs.is_empty()
    }
}
