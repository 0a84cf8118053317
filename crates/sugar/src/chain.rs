//! Immutable fluent cursor over one foreign object.
//!
//! A [`Chain`] pairs a foreign handle with the outcome of the last operation
//! performed through it. Every traversal (`get`, `call`, `put`, `for_each`,
//! `fork`) returns a *new* chain; the receiver is never changed. The only
//! state that moves after construction is the release guard (and, with it,
//! the cached scalar and recorded error, which release clears).
//!
//! # Ownership
//!
//! Each chain records whether it owns its handle:
//!
//! - `Owned`: the chain holds one foreign reference and releases it exactly
//!   once (explicitly, through its arena, or on drop as a last resort).
//! - `External`: wraps a caller-owned handle; never released here.
//! - `Borrowed`: a scalar or side-effect result that keeps resolving through
//!   the chain it came from. The borrower holds that chain alive but never
//!   releases its handle.
//!
//! # Release Policy
//!
//! `value()` and `err()` are terminal: they release the chain before
//! returning. `error()`, `is_ok()` and `is_object()` only observe.
//!
//! # Arena Registration
//!
//! A chain linked to an arena passes the link to every chain it produces.
//! Children that own a new reference (object results, forks, enumerated
//! items) are also registered with that arena, so they are released in
//! reverse acquisition order when the arena is.

use std::cell::{Cell, OnceCell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use sugar_handle::{Handle, Runtime, Variant};
use tracing::{debug, trace, warn};

use crate::context::Arena;
use crate::errors::{
    chain_released, foreign_call_failed, handle_not_scalar, iteration_failed, iteration_stopped,
    nil_handle, Error, ForeignOp,
};

/// What a `for_each` callback asks for next.
#[derive(Clone, Debug, PartialEq)]
pub enum Flow {
    /// Visit the next element.
    Continue,
    /// Stop without recording an error.
    Break,
    /// Stop and record `IterationStopped` carrying the value.
    BreakWith(Variant),
}

enum Cursor {
    Owned(Handle),
    External(Handle),
    Borrowed(Chain),
    /// No object (failed construction or traversal).
    Detached,
}

#[derive(Clone, Debug, PartialEq)]
enum Outcome {
    /// Nothing cached (after `put`, `for_each`, or release).
    Nothing,
    /// The chain's cursor is itself the result.
    Object,
    Scalar(Variant),
}

#[derive(Clone, Copy)]
enum Access {
    Get,
    Call,
}

struct Node {
    runtime: Arc<dyn Runtime>,
    cursor: Cursor,
    outcome: RefCell<Outcome>,
    error: RefCell<Option<Error>>,
    released: Cell<bool>,
    arena: OnceCell<Weak<Arena>>,
}

/// Fluent cursor over a foreign object.
///
/// Cloning a `Chain` clones the cursor, not the foreign reference: clones
/// share one release guard. `Chain` is neither `Send` nor `Sync`; foreign
/// handles stay on the thread that obtained them.
#[derive(Clone)]
pub struct Chain(Rc<Node>);

impl Chain {
    fn from_parts(
        runtime: Arc<dyn Runtime>,
        cursor: Cursor,
        outcome: Outcome,
        error: Option<Error>,
    ) -> Chain {
        Chain(Rc::new(Node {
            runtime,
            cursor,
            outcome: RefCell::new(outcome),
            error: RefCell::new(error),
            released: Cell::new(false),
            arena: OnceCell::new(),
        }))
    }

    fn failed(runtime: Arc<dyn Runtime>, error: Error) -> Chain {
        Chain::from_parts(runtime, Cursor::Detached, Outcome::Nothing, Some(error))
    }

    // Entry points

    /// Instantiate a new foreign object. The chain owns the reference.
    pub fn create(runtime: Arc<dyn Runtime>, name: &str) -> Chain {
        match runtime.create(name) {
            Ok(handle) => {
                debug!(%handle, name, "created");
                Chain::from_parts(runtime, Cursor::Owned(handle), Outcome::Object, None)
            }
            Err(e) => Chain::failed(runtime, foreign_call_failed(ForeignOp::Create, name, e)),
        }
    }

    /// Attach to a running foreign object. The chain owns the reference.
    pub fn attach_active(runtime: Arc<dyn Runtime>, name: &str) -> Chain {
        match runtime.attach_active(name) {
            Ok(handle) => {
                debug!(%handle, name, "attached");
                Chain::from_parts(runtime, Cursor::Owned(handle), Outcome::Object, None)
            }
            Err(e) => Chain::failed(runtime, foreign_call_failed(ForeignOp::AttachActive, name, e)),
        }
    }

    /// Start from a caller-owned handle. The chain never releases it.
    pub fn wrap(runtime: Arc<dyn Runtime>, handle: Handle) -> Chain {
        Chain::from_parts(runtime, Cursor::External(handle), Outcome::Object, None)
    }

    /// Take over one already-counted reference (e.g. from [`Chain::store`]).
    pub fn adopt(runtime: Arc<dyn Runtime>, handle: Handle) -> Chain {
        Chain::from_parts(runtime, Cursor::Owned(handle), Outcome::Object, None)
    }

    // Children

    fn arena(&self) -> Option<Rc<Arena>> {
        self.0.arena.get().and_then(Weak::upgrade)
    }

    pub(crate) fn link(&self, arena: &Rc<Arena>) {
        let _ = self.0.arena.set(Rc::downgrade(arena));
    }

    fn inherit_link(&self, child: &Chain) {
        if let Some(arena) = self.0.arena.get() {
            let _ = child.0.arena.set(arena.clone());
        }
    }

    fn owned_child(&self, handle: Handle) -> Chain {
        let child = Chain::from_parts(
            Arc::clone(&self.0.runtime),
            Cursor::Owned(handle),
            Outcome::Object,
            None,
        );
        if let Some(arena) = self.arena() {
            arena.track(&child);
        }
        child
    }

    fn borrowed_child(&self, outcome: Outcome) -> Chain {
        let child = Chain::from_parts(
            Arc::clone(&self.0.runtime),
            Cursor::Borrowed(self.clone()),
            outcome,
            None,
        );
        self.inherit_link(&child);
        child
    }

    fn failed_child(&self, error: Error) -> Chain {
        let child = Chain::failed(Arc::clone(&self.0.runtime), error);
        self.inherit_link(&child);
        child
    }

    /// The handle traversal should use, or the reason there is none.
    fn ready(&self) -> Result<Handle, Error> {
        if let Some(err) = self.error() {
            return Err(err);
        }
        self.resolve()
    }

    fn resolve(&self) -> Result<Handle, Error> {
        if self.0.released.get() {
            return Err(chain_released());
        }
        match &self.0.cursor {
            Cursor::Owned(h) | Cursor::External(h) if !h.is_null() => Ok(*h),
            Cursor::Borrowed(owner) => owner.resolve(),
            _ => Err(nil_handle()),
        }
    }

    fn add_ref(&self) -> Result<Handle, Error> {
        let handle = self.ready()?;
        self.0
            .runtime
            .add_ref(handle)
            .map_err(|e| foreign_call_failed(ForeignOp::AddRef, "", e))?;
        Ok(handle)
    }

    // Traversal

    fn access(&self, access: Access, name: &str, args: &[Variant]) -> Chain {
        let handle = match self.ready() {
            Ok(h) => h,
            Err(e) => return self.failed_child(e),
        };
        let runtime = &self.0.runtime;
        let (op, result) = match access {
            Access::Get => (ForeignOp::GetProperty, runtime.get_property(handle, name, args)),
            Access::Call => (ForeignOp::CallMethod, runtime.call_method(handle, name, args)),
        };
        trace!(%handle, op = op.as_str(), name, args = args.len(), "foreign access");
        match result {
            Ok(Variant::Object(child)) => self.owned_child(child),
            Ok(scalar) => self.borrowed_child(Outcome::Scalar(scalar)),
            Err(e) => self.failed_child(foreign_call_failed(op, name, e)),
        }
    }

    /// Read a (possibly indexed) property.
    ///
    /// An object result yields an owning chain over the new reference; a
    /// scalar result yields a chain that caches the scalar and keeps
    /// resolving through `self`.
    pub fn get(&self, name: &str, args: &[Variant]) -> Chain {
        self.access(Access::Get, name, args)
    }

    /// Invoke a method. Same result rules as [`Chain::get`].
    pub fn call(&self, name: &str, args: &[Variant]) -> Chain {
        self.access(Access::Call, name, args)
    }

    /// Write a property; the value is the last argument.
    ///
    /// Returns a chain over the same object with no cached result.
    pub fn put(&self, name: &str, args: &[Variant]) -> Chain {
        let handle = match self.ready() {
            Ok(h) => h,
            Err(e) => return self.failed_child(e),
        };
        trace!(%handle, name, "put");
        match self.0.runtime.put_property(handle, name, args) {
            Ok(()) => self.borrowed_child(Outcome::Nothing),
            Err(e) => self.failed_child(foreign_call_failed(ForeignOp::PutProperty, name, e)),
        }
    }

    /// Visit each element of an enumerable object, in native order.
    ///
    /// Each element is an owning chain. Linked to an arena, elements are
    /// registered there; otherwise each is released right after its callback.
    /// A callback error stops iteration and is recorded unchanged on the
    /// returned chain.
    pub fn for_each<F>(&self, mut f: F) -> Chain
    where
        F: FnMut(&Chain) -> Result<Flow, Error>,
    {
        let handle = match self.ready() {
            Ok(h) => h,
            Err(e) => return self.failed_child(e),
        };
        let elements = match self.0.runtime.enumerate(handle) {
            Ok(elements) => elements,
            Err(e) => return self.failed_child(foreign_call_failed(ForeignOp::Enumerate, "", e)),
        };
        let in_arena = self.arena().is_some();
        let mut stop = None;
        let mut visited = 0_usize;

        for element in elements {
            let item = match element {
                Ok(h) => self.owned_child(h),
                Err(e) => {
                    stop = Some(iteration_failed(e));
                    break;
                }
            };
            visited += 1;
            let flow = f(&item);
            if !in_arena {
                if let Err(e) = item.release() {
                    stop.get_or_insert(e);
                }
            }
            match flow {
                Ok(Flow::Continue) => {}
                Ok(Flow::Break) => break,
                Ok(Flow::BreakWith(value)) => {
                    stop = Some(iteration_stopped(value));
                    break;
                }
                Err(e) => {
                    stop = Some(e);
                    break;
                }
            }
            if stop.is_some() {
                break;
            }
        }
        trace!(%handle, visited, "enumerated");

        match stop {
            Some(e) => self.failed_child(e),
            None => self.borrowed_child(Outcome::Nothing),
        }
    }

    /// An independently owned reference to the same object, registered with
    /// the same arena as `self`.
    pub fn fork(&self) -> Chain {
        match self.add_ref() {
            Ok(handle) => self.owned_child(handle),
            Err(e) => self.failed_child(e),
        }
    }

    /// Like [`Chain::fork`], but the new chain belongs to no arena; the
    /// caller must release it (or let it drop).
    pub fn detach(&self) -> Chain {
        let runtime = Arc::clone(&self.0.runtime);
        match self.add_ref() {
            Ok(handle) => Chain::adopt(runtime, handle),
            Err(e) => Chain::failed(runtime, e),
        }
    }

    /// Hand a freshly referenced handle to the caller, who must release it.
    ///
    /// `self` keeps its own release obligation.
    pub fn store(&self) -> Result<Handle, Error> {
        let handle = self.add_ref()?;
        debug!(%handle, "stored");
        Ok(handle)
    }

    // Terminals

    /// Release this chain. Idempotent.
    ///
    /// Drops the owned reference (if any) exactly once, clears the cached
    /// scalar, and returns (clearing) the recorded error. A second call
    /// returns `Ok(())`.
    pub fn release(&self) -> Result<(), Error> {
        if self.0.released.replace(true) {
            return Ok(());
        }
        *self.0.outcome.borrow_mut() = Outcome::Nothing;
        let recorded = self.0.error.borrow_mut().take();
        let freed = match self.0.cursor {
            Cursor::Owned(handle) if !handle.is_null() => {
                debug!(%handle, "released");
                self.0
                    .runtime
                    .release(handle)
                    .map_err(|e| foreign_call_failed(ForeignOp::Release, "", e))
            }
            _ => Ok(()),
        };
        match recorded {
            Some(err) => Err(err),
            None => freed,
        }
    }

    /// The cached scalar of the last `get`/`call`. Terminal.
    ///
    /// Fails with `HandleNotScalar` when the result is an object (use
    /// `fork`/`store` for those). Yields `Variant::Empty` when nothing is
    /// cached.
    pub fn value(&self) -> Result<Variant, Error> {
        if self.is_released() {
            return Err(chain_released());
        }
        let outcome = self.0.outcome.borrow().clone();
        self.release()?;
        match outcome {
            Outcome::Scalar(v) => Ok(v),
            Outcome::Object => Err(handle_not_scalar()),
            Outcome::Nothing => Ok(Variant::Empty),
        }
    }

    /// The first recorded error. Terminal.
    pub fn err(&self) -> Option<Error> {
        self.release().err()
    }

    // Observers

    /// The recorded error, without releasing.
    pub fn error(&self) -> Option<Error> {
        self.0.error.borrow().clone()
    }

    /// The cached scalar, without releasing.
    pub fn scalar(&self) -> Option<Variant> {
        match &*self.0.outcome.borrow() {
            Outcome::Scalar(v) => Some(v.clone()),
            _ => None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.0.error.borrow().is_none()
    }

    /// Whether the last result is an object reference.
    pub fn is_object(&self) -> bool {
        !self.is_released() && *self.0.outcome.borrow() == Outcome::Object
    }

    pub fn is_released(&self) -> bool {
        self.0.released.get()
    }

    /// Whether new owning children of this chain are registered with a live arena.
    pub fn in_arena(&self) -> bool {
        self.arena().is_some()
    }

    /// The handle this chain resolves to, without adding a reference.
    pub fn handle(&self) -> Result<Handle, Error> {
        self.ready()
    }

    pub fn runtime(&self) -> &Arc<dyn Runtime> {
        &self.0.runtime
    }

    /// Whether both chains are the same cursor (clones of one another).
    pub fn ptr_eq(&self, other: &Chain) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        if self.released.get() {
            return;
        }
        if let Cursor::Owned(handle) = self.cursor {
            if handle.is_null() {
                return;
            }
            debug!(%handle, "released on drop");
            if let Err(e) = self.runtime.release(handle) {
                warn!(%handle, error = %e, "release on drop failed");
            }
        }
    }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cursor = match &self.0.cursor {
            Cursor::Owned(h) => format!("owned {h}"),
            Cursor::External(h) => format!("external {h}"),
            Cursor::Borrowed(_) => "borrowed".to_string(),
            Cursor::Detached => "detached".to_string(),
        };
        f.debug_struct("Chain")
            .field("cursor", &cursor)
            .field("outcome", &*self.0.outcome.borrow())
            .field("error", &*self.0.error.borrow())
            .field("released", &self.0.released.get())
            .finish()
    }
}

#[cfg(test)]
mod tests;
