//! Sugar Expr - dotted path expressions over foreign object graphs.
//!
//! Addresses a nested object path as a single operation:
//!
//! ```ignore
//! let count = sugar_expr::get(&app, "Workbooks.Item(1).Sheets.Count")?;
//! sugar_expr::put(&app, "ActiveSheet.Range('A1').Value", "hello")?;
//! let book = sugar_expr::store(&app, "Workbooks.Add()")?;
//! ```
//!
//! # Grammar
//!
//! Identifiers, member access (`a.b`), calls (`a.b(x, y)`), string, int,
//! float, bool and `nil` literals, and the binary operators `+ - * /`
//! (`+` concatenates when either side is a string; `/` always yields a
//! float). Unary operators parse but are rejected at evaluation.
//!
//! # Lifetimes
//!
//! Every intermediate object an expression touches is released before the
//! call returns. [`run`] hands back object results as detached chains the
//! caller owns; [`store`] hands back a counted handle.

mod ast;
mod errors;
mod eval;
mod lexer;
mod parser;
mod stack;
#[cfg(test)]
mod test_support;

use sugar::Chain;
use sugar_handle::{Handle, Variant};
use tracing::trace;

pub use ast::{BinaryOp, Expr, ExprArena, ExprId, ExprKind, Literal, Span, UnaryOp};
pub use errors::{EvalError, EvalErrorKind, ParseError};
pub use eval::{Env, Function, Value, Variables};
pub use lexer::{tokenize, Token, TokenKind};

use errors::{invalid_put_expression, not_an_object};
use eval::Evaluator;

/// A parsed expression, reusable across evaluations.
#[derive(Clone, Debug)]
pub struct Program {
    pub(crate) arena: ExprArena,
    pub(crate) root: ExprId,
    pub(crate) source: String,
}

impl Program {
    pub fn root(&self) -> ExprId {
        self.root
    }

    pub fn root_expr(&self) -> &Expr {
        self.arena.get(self.root)
    }

    pub fn arena(&self) -> &ExprArena {
        &self.arena
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

/// Parse `source`.
pub fn compile(source: &str) -> Result<Program, ParseError> {
    parser::parse(source)
}

/// Evaluate `expr` of `program` against `env`, then hand the value to
/// `finish` while intermediates are still live.
fn evaluate<T>(
    program: &Program,
    env: &Env,
    expr: ExprId,
    finish: impl FnOnce(Value) -> Result<T, EvalError>,
) -> Result<T, EvalError> {
    if let Env::Root(root) = env {
        if let Some(err) = root.error() {
            return Err(err.into());
        }
    }
    trace!(source = program.source(), "evaluating");
    let evaluator = Evaluator::new(program, env);
    let result = evaluator.eval(expr).and_then(finish);
    evaluator.finish(result)
}

/// Evaluate `program` against `env`.
///
/// Object results are returned as detached chains: owned by the caller,
/// registered with no arena.
pub fn run(program: &Program, env: &Env) -> Result<Value, EvalError> {
    evaluate(program, env, program.root(), |value| match value {
        Value::Chain(chain) => {
            let detached = chain.detach();
            match detached.error() {
                Some(err) => Err(err.into()),
                None => Ok(Value::Chain(detached)),
            }
        }
        other => Ok(other),
    })
}

/// Evaluate `source` against `root` and return its scalar result.
///
/// Fails with `HandleNotScalar` when the result is an object.
pub fn get(root: &Chain, source: &str) -> Result<Variant, EvalError> {
    let program = compile(source)?;
    evaluate(&program, &Env::Root(root.clone()), program.root(), |value| {
        match value {
            Value::Scalar(v) => Ok(v),
            Value::Chain(chain) => Ok(chain.value()?),
            Value::Function(_) => Err(not_an_object("function")),
        }
    })
}

/// Assign `value` to the property named by `source`, which must be a
/// member access (`A.B.C`). Everything left of the last `.` is evaluated
/// to find the object to write to.
pub fn put(root: &Chain, source: &str, value: impl Into<Variant>) -> Result<(), EvalError> {
    let program = compile(source)?;
    let ExprKind::Member { object, name } = &program.root_expr().kind else {
        return Err(invalid_put_expression(program.root_expr().kind.describe()));
    };
    let value = value.into();
    evaluate(&program, &Env::Root(root.clone()), *object, |parent| match parent {
        Value::Chain(chain) => match chain.put(name, &[value]).error() {
            Some(err) => Err(err.into()),
            None => Ok(()),
        },
        other => Err(not_an_object(other.type_name())),
    })
}

/// Evaluate `source` against `root` and return a counted handle to its
/// object result. The caller must release it (e.g. via `Chain::adopt`).
pub fn store(root: &Chain, source: &str) -> Result<Handle, EvalError> {
    let program = compile(source)?;
    evaluate(&program, &Env::Root(root.clone()), program.root(), |value| {
        match value {
            Value::Chain(chain) => Ok(chain.store()?),
            other => Err(not_an_object(other.type_name())),
        }
    })
}
