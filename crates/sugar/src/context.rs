//! Arenas and the context handed to scoped work.
//!
//! A [`Context`] owns one arena: the ordered list of chains acquired inside
//! its scope. Releasing the context releases them in reverse order, exactly
//! once each, continuing past failures and reporting the first.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;
use std::thread::JoinHandle;

use sugar_handle::{Handle, Runtime};
use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::chain::Chain;
use crate::errors::{cancelled, Error};
use crate::runner::{Runner, Scope};

/// Ordered set of chains released together.
pub(crate) struct Arena {
    chains: RefCell<Vec<Chain>>,
}

impl Arena {
    fn new() -> Rc<Arena> {
        Rc::new(Arena {
            chains: RefCell::new(Vec::new()),
        })
    }

    /// Link `chain` to this arena and append it to the release order.
    pub(crate) fn track(self: &Rc<Self>, chain: &Chain) {
        chain.link(self);
        self.chains.borrow_mut().push(chain.clone());
    }

    fn len(&self) -> usize {
        self.chains.borrow().len()
    }

    /// Release every tracked chain, most recent first.
    fn release(&self) -> Result<(), Error> {
        let chains = std::mem::take(&mut *self.chains.borrow_mut());
        let mut first = None;
        for chain in chains.iter().rev() {
            if let Err(e) = chain.release() {
                debug!(error = %e, "release failed, continuing");
                first.get_or_insert(e);
            }
        }
        first.map_or(Ok(()), Err)
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!(error = %e, "arena dropped with an unreported error");
        }
    }
}

/// The arena and scope a unit of scoped work runs in.
///
/// Chains started through a context (and every owning chain derived from
/// them) are released when the context is.
pub struct Context {
    arena: Rc<Arena>,
    scope: Scope,
}

impl Context {
    /// A standalone context with a background scope.
    ///
    /// No runtime initialization is performed; use a [`Runner`] for that.
    pub fn new(runtime: Arc<dyn Runtime>) -> Self {
        Context::scoped(Scope::background(runtime))
    }

    pub(crate) fn scoped(scope: Scope) -> Self {
        Context {
            arena: Arena::new(),
            scope,
        }
    }

    /// Register `chain` so it is released with this context.
    pub fn track(&self, chain: Chain) -> Chain {
        self.arena.track(&chain);
        chain
    }

    pub fn create(&self, name: &str) -> Chain {
        self.track(Chain::create(Arc::clone(self.runtime()), name))
    }

    pub fn attach_active(&self, name: &str) -> Chain {
        self.track(Chain::attach_active(Arc::clone(self.runtime()), name))
    }

    /// Start from a caller-owned handle; the handle itself is never released.
    pub fn wrap(&self, handle: Handle) -> Chain {
        self.track(Chain::wrap(Arc::clone(self.runtime()), handle))
    }

    /// Take over one counted reference; it is released with this context.
    pub fn adopt(&self, handle: Handle) -> Chain {
        self.track(Chain::adopt(Arc::clone(self.runtime()), handle))
    }

    /// Release every tracked chain in reverse acquisition order.
    ///
    /// Idempotent; chains tracked afterwards are released by the next call.
    #[tracing::instrument(level = "debug", skip_all, fields(tracked = self.arena.len()))]
    pub fn release(&self) -> Result<(), Error> {
        self.arena.release()
    }

    /// Number of chains awaiting release.
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn runtime(&self) -> &Arc<dyn Runtime> {
        self.scope.runtime()
    }

    pub fn cancel_token(&self) -> &CancelToken {
        self.scope.cancel_token()
    }

    pub fn is_cancelled(&self) -> bool {
        self.scope.cancel_token().is_cancelled()
    }

    /// Cancel this scope and everything nested in it.
    pub fn cancel(&self) {
        self.scope.cancel_token().cancel();
    }

    /// `Err(Cancelled)` once this scope has been cancelled.
    pub fn checkpoint(&self) -> Result<(), Error> {
        if self.is_cancelled() {
            return Err(cancelled());
        }
        Ok(())
    }

    /// Run `f` in a nested scope on the current thread.
    ///
    /// The nested scope has its own arena and a child cancellation token.
    /// When this scope is already active on the current thread, the runtime
    /// is not initialized again.
    pub fn do_nested<T, F>(&self, f: F) -> Result<T, Error>
    where
        F: FnOnce(&Context) -> Result<T, Error>,
    {
        self.runner().run(f)
    }

    /// Run `f` in a nested scope on a new thread with its own initialization.
    pub fn go<T, F>(&self, f: F) -> Result<JoinHandle<Result<T, Error>>, Error>
    where
        T: Send + 'static,
        F: FnOnce(&Context) -> Result<T, Error> + Send + 'static,
    {
        self.runner().go(f)
    }

    /// A runner whose scopes nest inside this one.
    pub fn runner(&self) -> Runner {
        Runner::with(&self.scope)
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("tracked", &self.arena.len())
            .field("scope", &self.scope)
            .finish()
    }
}
