//! Tree-walking evaluator over chains.
//!
//! # Intermediate Handles
//!
//! Every object the evaluator reaches (the root object, chain variables,
//! and each object-valued member or call result) is tracked by a scratch
//! [`Context`] owned by the evaluation. The scratch arena is released, most
//! recent first, before the result is handed back, so nothing an expression
//! acquired along the way outlives it. Results that must survive are
//! duplicated first (`detach`/`store`).

use std::cell::OnceCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use sugar::{Chain, Context};
use sugar_handle::Variant;

use crate::ast::{BinaryOp, ExprId, ExprKind};
use crate::errors::{
    division_by_zero, integer_overflow, not_an_object, not_callable, type_mismatch,
    undefined_variable, unsupported_node, value_expected, EvalError,
};
use crate::stack::ensure_sufficient_stack;
use crate::Program;

/// Host function callable from an expression, e.g. `Upper("x")`.
pub type Function = Rc<dyn Fn(&[Variant]) -> Result<Variant, EvalError>>;

/// A value bound in [`Variables`] or produced by evaluation.
#[derive(Clone)]
pub enum Value {
    Scalar(Variant),
    /// An object reference.
    Chain(Chain),
    Function(Function),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Scalar(v) => v.type_name(),
            Value::Chain(_) => "object",
            Value::Function(_) => "function",
        }
    }

    pub fn as_scalar(&self) -> Option<&Variant> {
        match self {
            Value::Scalar(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_chain(&self) -> Option<&Chain> {
        match self {
            Value::Chain(c) => Some(c),
            _ => None,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Scalar(v) => f.debug_tuple("Scalar").field(v).finish(),
            Value::Chain(c) => f.debug_tuple("Chain").field(c).finish(),
            Value::Function(_) => f.write_str("Function"),
        }
    }
}

impl From<Variant> for Value {
    fn from(v: Variant) -> Self {
        Value::Scalar(v)
    }
}

impl From<Chain> for Value {
    fn from(c: Chain) -> Self {
        Value::Chain(c)
    }
}

/// Name-to-value bindings for [`Env::Vars`].
#[derive(Clone, Default)]
pub struct Variables {
    vars: FxHashMap<String, Value>,
}

impl Variables {
    pub fn new() -> Self {
        Variables::default()
    }

    /// Bind `name`, replacing any previous binding.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.vars.insert(name.into(), value.into());
    }

    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Bind a host function.
    #[must_use]
    pub fn function<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&[Variant]) -> Result<Variant, EvalError> + 'static,
    {
        self.vars.insert(name.into(), Value::Function(Rc::new(f)));
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

impl fmt::Debug for Variables {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.vars.iter()).finish()
    }
}

/// What bare identifiers resolve against.
#[derive(Clone, Debug)]
pub enum Env {
    /// `Name` reads property `Name` of this object; `Name(...)` calls it.
    Root(Chain),
    /// `Name` is looked up in the map.
    Vars(Variables),
}

impl From<Chain> for Env {
    fn from(c: Chain) -> Self {
        Env::Root(c)
    }
}

impl From<Variables> for Env {
    fn from(v: Variables) -> Self {
        Env::Vars(v)
    }
}

/// Arguments rarely exceed four.
type Args = SmallVec<[Variant; 4]>;

/// Turn a traversal result into a value: object results stay chains,
/// scalar results are unwrapped, errors are surfaced.
fn traversed(chain: &Chain) -> Result<Value, EvalError> {
    if let Some(err) = chain.error() {
        return Err(err.into());
    }
    Ok(match chain.scalar() {
        Some(v) => Value::Scalar(v),
        None => Value::Chain(chain.clone()),
    })
}

pub(crate) struct Evaluator<'a> {
    program: &'a Program,
    env: &'a Env,
    scratch: OnceCell<Context>,
    root: OnceCell<Chain>,
}

impl<'a> Evaluator<'a> {
    pub(crate) fn new(program: &'a Program, env: &'a Env) -> Self {
        Evaluator {
            program,
            env,
            scratch: OnceCell::new(),
            root: OnceCell::new(),
        }
    }

    /// Release everything the evaluation acquired. A release failure only
    /// surfaces when `result` is `Ok`.
    pub(crate) fn finish<T>(self, result: Result<T, EvalError>) -> Result<T, EvalError> {
        let released = self.scratch.into_inner().map_or(Ok(()), |ctx| ctx.release());
        match (result, released) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e.into()),
            (Err(e), _) => Err(e),
        }
    }

    /// A non-owning chain over `chain`'s object, tracked by the scratch
    /// arena so every object derived from it is too.
    fn view(&self, chain: &Chain) -> Result<Chain, EvalError> {
        let handle = chain.handle()?;
        let runtime = chain.runtime();
        let scratch = self.scratch.get_or_init(|| Context::new(Arc::clone(runtime)));
        Ok(scratch.track(Chain::wrap(Arc::clone(runtime), handle)))
    }

    fn root(&self, chain: &Chain) -> Result<Chain, EvalError> {
        if let Some(root) = self.root.get() {
            return Ok(root.clone());
        }
        let root = self.view(chain)?;
        Ok(self.root.get_or_init(|| root).clone())
    }

    pub(crate) fn eval(&self, id: ExprId) -> Result<Value, EvalError> {
        ensure_sufficient_stack(|| self.eval_expr(id))
    }

    fn eval_expr(&self, id: ExprId) -> Result<Value, EvalError> {
        let expr = self.program.arena().get(id);
        match &expr.kind {
            ExprKind::Literal(lit) => Ok(Value::Scalar(lit.to_variant())),
            ExprKind::Ident(name) => self.ident(name),
            ExprKind::Member { object, name } => {
                let receiver = self.receiver(*object)?;
                traversed(&receiver.get(name, &[]))
            }
            ExprKind::Call { callee, args } => self.call(*callee, args),
            ExprKind::Binary { op, left, right } => {
                let left = self.scalar(*left)?;
                let right = self.scalar(*right)?;
                binary(*op, &left, &right).map(Value::Scalar)
            }
            ExprKind::Unary { .. } => Err(unsupported_node(expr.kind.describe())),
        }
    }

    fn ident(&self, name: &str) -> Result<Value, EvalError> {
        match self.env {
            Env::Root(chain) => traversed(&self.root(chain)?.get(name, &[])),
            Env::Vars(vars) => match vars.get(name) {
                Some(Value::Scalar(v)) => Ok(Value::Scalar(v.clone())),
                Some(Value::Chain(chain)) => match traversed(chain)? {
                    Value::Chain(object) => Ok(Value::Chain(self.view(&object)?)),
                    scalar => Ok(scalar),
                },
                Some(Value::Function(_)) => Err(value_expected(name)),
                None => Err(undefined_variable(name)),
            },
        }
    }

    fn call(&self, callee: ExprId, args: &[ExprId]) -> Result<Value, EvalError> {
        let callee_expr = self.program.arena().get(callee);
        match &callee_expr.kind {
            ExprKind::Member { object, name } => {
                let receiver = self.receiver(*object)?;
                let args = self.args(args)?;
                traversed(&receiver.call(name, &args))
            }
            ExprKind::Ident(name) => match self.env {
                Env::Root(chain) => {
                    let root = self.root(chain)?;
                    let args = self.args(args)?;
                    traversed(&root.call(name, &args))
                }
                Env::Vars(vars) => match vars.get(name) {
                    Some(Value::Function(f)) => {
                        let args = self.args(args)?;
                        f(args.as_slice()).map(Value::Scalar)
                    }
                    Some(_) => Err(not_callable(name)),
                    None => Err(undefined_variable(name)),
                },
            },
            _ => Err(unsupported_node("call of a computed value")),
        }
    }

    /// Evaluate `id`, requiring an object.
    fn receiver(&self, id: ExprId) -> Result<Chain, EvalError> {
        match self.eval(id)? {
            Value::Chain(chain) => Ok(chain),
            other => Err(not_an_object(other.type_name())),
        }
    }

    /// Evaluate `id`, collapsing an object result to its scalar value
    /// (which fails with `HandleNotScalar`).
    fn scalar(&self, id: ExprId) -> Result<Variant, EvalError> {
        match self.eval(id)? {
            Value::Scalar(v) => Ok(v),
            Value::Chain(chain) => Ok(chain.value()?),
            Value::Function(_) => Err(unsupported_node("function value")),
        }
    }

    fn args(&self, ids: &[ExprId]) -> Result<Args, EvalError> {
        ids.iter().map(|&id| self.scalar(id)).collect()
    }
}

// Arithmetic

fn binary(op: BinaryOp, left: &Variant, right: &Variant) -> Result<Variant, EvalError> {
    if op == BinaryOp::Add && (matches!(left, Variant::Str(_)) || matches!(right, Variant::Str(_)))
    {
        return Ok(Variant::Str(format!("{left}{right}")));
    }
    match (left, right) {
        (Variant::Int(l), Variant::Int(r)) => int_op(op, *l, *r),
        _ => match (as_f64(left), as_f64(right)) {
            (Some(l), Some(r)) => float_op(op, l, r),
            _ => Err(type_mismatch(op, left.type_name(), right.type_name())),
        },
    }
}

#[allow(
    clippy::cast_precision_loss,
    reason = "mixed int/float arithmetic is carried out in f64"
)]
fn as_f64(v: &Variant) -> Option<f64> {
    match v {
        Variant::Int(n) => Some(*n as f64),
        Variant::Float(x) => Some(*x),
        _ => None,
    }
}

#[allow(
    clippy::cast_precision_loss,
    reason = "division always yields a float"
)]
fn int_op(op: BinaryOp, l: i64, r: i64) -> Result<Variant, EvalError> {
    let result = match op {
        BinaryOp::Add => l.checked_add(r),
        BinaryOp::Sub => l.checked_sub(r),
        BinaryOp::Mul => l.checked_mul(r),
        BinaryOp::Div => return float_op(op, l as f64, r as f64),
    };
    result.map(Variant::Int).ok_or_else(|| integer_overflow(op))
}

fn float_op(op: BinaryOp, l: f64, r: f64) -> Result<Variant, EvalError> {
    let result = match op {
        BinaryOp::Add => l + r,
        BinaryOp::Sub => l - r,
        BinaryOp::Mul => l * r,
        BinaryOp::Div => {
            if r == 0.0 {
                return Err(division_by_zero());
            }
            l / r
        }
    };
    Ok(Variant::Float(result))
}
