//! Compile and evaluation errors.

use std::fmt;

use crate::ast::{BinaryOp, Span};

/// Malformed expression text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseError {
    pub message: String,
    pub span: Span,
}

impl ParseError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        ParseError {
            message: message.into(),
            span,
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.message, self.span)
    }
}

impl std::error::Error for ParseError {}

/// Typed evaluation failure.
#[derive(Clone, Debug, PartialEq)]
pub enum EvalErrorKind {
    Parse(ParseError),
    /// Accepted by the grammar, but there is no evaluation rule for it.
    UnsupportedNode { node: &'static str },
    /// Member access or method call on something that is not an object.
    NotAnObject { found: &'static str },
    /// `put` target is not a plain member access.
    InvalidPutExpression { found: &'static str },
    UndefinedVariable { name: String },
    NotCallable { name: String },
    /// A function name used where a value is expected.
    ValueExpected { name: String },
    TypeMismatch {
        op: BinaryOp,
        left: &'static str,
        right: &'static str,
    },
    DivisionByZero,
    IntegerOverflow { op: BinaryOp },
    /// A chain operation failed (foreign call, non-scalar result, ...).
    Chain(sugar::Error),
    Custom { message: String },
}

impl fmt::Display for EvalErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(e) => write!(f, "{e}"),
            Self::UnsupportedNode { node } => write!(f, "unsupported expression: {node}"),
            Self::NotAnObject { found } => {
                write!(f, "cannot access a member of a non-object value ({found})")
            }
            Self::InvalidPutExpression { found } => write!(
                f,
                "invalid put target: expected a property access like `A.B`, found {found}"
            ),
            Self::UndefinedVariable { name } => write!(f, "undefined variable `{name}`"),
            Self::NotCallable { name } => write!(f, "`{name}` is not callable"),
            Self::ValueExpected { name } => write!(f, "`{name}` is a function, not a value"),
            Self::TypeMismatch { op, left, right } => {
                write!(f, "cannot apply `{op}` to {left} and {right}")
            }
            Self::DivisionByZero => write!(f, "division by zero"),
            Self::IntegerOverflow { op } => write!(f, "integer overflow in `{op}`"),
            Self::Chain(e) => write!(f, "{e}"),
            Self::Custom { message } => write!(f, "{message}"),
        }
    }
}

/// Error from running an expression.
#[derive(Clone, Debug, PartialEq)]
pub struct EvalError {
    pub kind: EvalErrorKind,
}

impl EvalError {
    /// A caller-defined failure, e.g. from a function in the variables map.
    pub fn new(message: impl Into<String>) -> Self {
        EvalError {
            kind: EvalErrorKind::Custom {
                message: message.into(),
            },
        }
    }

    /// The underlying chain error, if this is one.
    pub fn chain_error(&self) -> Option<&sugar::Error> {
        match &self.kind {
            EvalErrorKind::Chain(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)
    }
}

impl std::error::Error for EvalError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            EvalErrorKind::Parse(e) => Some(e),
            EvalErrorKind::Chain(e) => Some(e),
            _ => None,
        }
    }
}

impl From<EvalErrorKind> for EvalError {
    fn from(kind: EvalErrorKind) -> Self {
        EvalError { kind }
    }
}

impl From<ParseError> for EvalError {
    #[cold]
    fn from(e: ParseError) -> Self {
        EvalErrorKind::Parse(e).into()
    }
}

impl From<sugar::Error> for EvalError {
    #[cold]
    fn from(e: sugar::Error) -> Self {
        EvalErrorKind::Chain(e).into()
    }
}

#[cold]
pub(crate) fn unsupported_node(node: &'static str) -> EvalError {
    EvalErrorKind::UnsupportedNode { node }.into()
}

#[cold]
pub(crate) fn not_an_object(found: &'static str) -> EvalError {
    EvalErrorKind::NotAnObject { found }.into()
}

#[cold]
pub(crate) fn invalid_put_expression(found: &'static str) -> EvalError {
    EvalErrorKind::InvalidPutExpression { found }.into()
}

#[cold]
pub(crate) fn undefined_variable(name: &str) -> EvalError {
    EvalErrorKind::UndefinedVariable {
        name: name.to_string(),
    }
    .into()
}

#[cold]
pub(crate) fn not_callable(name: &str) -> EvalError {
    EvalErrorKind::NotCallable {
        name: name.to_string(),
    }
    .into()
}

#[cold]
pub(crate) fn value_expected(name: &str) -> EvalError {
    EvalErrorKind::ValueExpected {
        name: name.to_string(),
    }
    .into()
}

#[cold]
pub(crate) fn type_mismatch(op: BinaryOp, left: &'static str, right: &'static str) -> EvalError {
    EvalErrorKind::TypeMismatch { op, left, right }.into()
}

#[cold]
pub(crate) fn division_by_zero() -> EvalError {
    EvalErrorKind::DivisionByZero.into()
}

#[cold]
pub(crate) fn integer_overflow(op: BinaryOp) -> EvalError {
    EvalErrorKind::IntegerOverflow { op }.into()
}
