//! Scoped execution.
//!
//! A [`Runner`] runs a closure against a fresh [`Context`], initializing the
//! foreign runtime for the calling thread when the scope is outermost and
//! releasing the context's arena afterwards, on success, error or panic.
//!
//! Nesting is detected per thread: a runner built from a scope that is
//! active on the calling thread reuses that thread's initialization. A
//! branch onto a new thread ([`Runner::go`]) always initializes again, since
//! initialization is thread-bound.

use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

use sugar_handle::Runtime;
use tracing::debug;

use crate::cancel::CancelToken;
use crate::context::Context;
use crate::errors::{init_failed, spawn_failed, Error};

/// The ambient state a scope inherits: runtime, cancellation and the
/// thread it is active on.
///
/// `Scope` is `Send`; it carries no foreign handles.
#[derive(Clone)]
pub struct Scope {
    runtime: Arc<dyn Runtime>,
    cancel: CancelToken,
    active_on: Option<ThreadId>,
}

impl Scope {
    /// A root scope, active on no thread.
    pub fn background(runtime: Arc<dyn Runtime>) -> Self {
        Scope {
            runtime,
            cancel: CancelToken::new(),
            active_on: None,
        }
    }

    pub fn runtime(&self) -> &Arc<dyn Runtime> {
        &self.runtime
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Whether the runtime is already initialized for this scope on the
    /// calling thread.
    pub fn is_active_here(&self) -> bool {
        self.active_on == Some(thread::current().id())
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("cancel", &self.cancel)
            .field("active_on", &self.active_on)
            .finish_non_exhaustive()
    }
}

/// Paired `initialize`/`uninitialize` for the current thread.
struct InitGuard {
    runtime: Arc<dyn Runtime>,
}

impl InitGuard {
    fn acquire(runtime: &Arc<dyn Runtime>) -> Result<Self, Error> {
        runtime.initialize().map_err(init_failed)?;
        debug!("runtime initialized");
        Ok(InitGuard {
            runtime: Arc::clone(runtime),
        })
    }
}

impl Drop for InitGuard {
    fn drop(&mut self) {
        self.runtime.uninitialize();
        debug!("runtime uninitialized");
    }
}

/// Builder for scoped work.
///
/// ```ignore
/// let count = Runner::new(runtime).run(|ctx| {
///     let books = ctx.create("Excel.Application").get("Workbooks", &[]);
///     books.call("Add", &[]);
///     books.get("Count", &[]).value()
/// })?;
/// ```
#[derive(Debug)]
pub struct Runner {
    parent: Scope,
    force_init: bool,
    thread_name: Option<String>,
}

impl Runner {
    /// A runner for an outermost scope.
    pub fn new(runtime: Arc<dyn Runtime>) -> Self {
        Runner::with(&Scope::background(runtime))
    }

    /// A runner whose scopes are children of `parent`.
    pub fn with(parent: &Scope) -> Self {
        Runner {
            parent: parent.clone(),
            force_init: false,
            thread_name: None,
        }
    }

    /// Derive the scope's cancellation from `token` instead of the parent's.
    #[must_use]
    pub fn cancel_on(mut self, token: &CancelToken) -> Self {
        self.parent.cancel = token.clone();
        self
    }

    /// Initialize the runtime even when nested on an active thread.
    #[must_use]
    pub fn force_init(mut self) -> Self {
        self.force_init = true;
        self
    }

    /// Name for threads started by [`Runner::go`].
    #[must_use]
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = Some(name.into());
        self
    }

    /// Whether `run` would reuse the calling thread's initialization.
    pub fn is_nested(&self) -> bool {
        !self.force_init && self.parent.is_active_here()
    }

    /// Run `f` in a new scope on the current thread.
    ///
    /// The scope's arena is released after `f` returns. A release failure
    /// replaces a successful result; an error from `f` takes precedence.
    pub fn run<T, F>(&self, f: F) -> Result<T, Error>
    where
        F: FnOnce(&Context) -> Result<T, Error>,
    {
        let nested = self.is_nested();
        let _init = if nested {
            None
        } else {
            Some(InitGuard::acquire(&self.parent.runtime)?)
        };
        let span = tracing::debug_span!("scope", nested);
        let _entered = span.enter();

        let ctx = Context::scoped(Scope {
            runtime: Arc::clone(&self.parent.runtime),
            cancel: self.parent.cancel.child(),
            active_on: Some(thread::current().id()),
        });
        let result = f(&ctx);
        let released = ctx.release();
        match (result, released) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) | (Err(e), _) => Err(e),
        }
    }

    /// Run `f` in a new scope on a new thread.
    ///
    /// The thread initializes the runtime for itself. The scope's
    /// cancellation is a child of this runner's.
    pub fn go<T, F>(&self, f: F) -> Result<JoinHandle<Result<T, Error>>, Error>
    where
        T: Send + 'static,
        F: FnOnce(&Context) -> Result<T, Error> + Send + 'static,
    {
        let runner = Runner {
            parent: self.parent.clone(),
            force_init: true,
            thread_name: None,
        };
        let mut builder = thread::Builder::new();
        if let Some(name) = &self.thread_name {
            builder = builder.name(name.clone());
        }
        builder
            .spawn(move || runner.run(f))
            .map_err(|e| spawn_failed(e.to_string()))
    }
}
