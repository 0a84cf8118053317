//! Sugar Handle - the foreign handle capability.
//!
//! This crate defines the narrow interface the sugar core needs from a
//! native-interop layer (an automation/COM binding, a scripting host, a
//! test double):
//!
//! - [`Handle`]: an opaque reference to an externally reference-counted object
//! - [`Variant`]: the scalar-or-handle values exchanged with the runtime
//! - [`Runtime`]: string-keyed create/get/put/call/enumerate plus reference
//!   counting and per-thread initialization
//! - [`ForeignError`]: the opaque failure every runtime operation may report
//!
//! # Reference Contract
//!
//! Every handle a runtime hands out (from `create`, `attach_active`, an
//! object-valued `get_property`/`call_method`, or an enumerated element)
//! carries exactly one reference counted for the receiver. The receiver
//! balances it with one `release`. `add_ref` produces additional references.
//!
//! # Features
//!
//! - `mock`: enables [`mock::MockRuntime`], an in-memory runtime with
//!   reference accounting and an event log, used by the sugar test suites.

mod variant;

#[cfg(feature = "mock")]
pub mod mock;

use std::fmt;

pub use variant::Variant;

/// Opaque reference to an object owned by the foreign runtime.
///
/// The value is whatever the native layer uses to identify the object
/// (typically the interface pointer). `Handle` carries no ownership on its
/// own; ownership is tracked by whoever holds it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(usize);

impl Handle {
    /// The null handle (no object).
    pub const NULL: Handle = Handle(0);

    /// Wrap a raw native identifier.
    #[inline]
    pub const fn from_raw(raw: usize) -> Self {
        Handle(raw)
    }

    /// The raw native identifier.
    #[inline]
    pub const fn raw(self) -> usize {
        self.0
    }

    /// Returns `true` for [`Handle::NULL`].
    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:x}", self.0)
    }
}

/// Failure reported by the foreign runtime.
///
/// The core never interprets `code`; it is carried through so callers can
/// match on native status codes (e.g. `HRESULT`s).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForeignError {
    pub code: i32,
    pub message: String,
}

impl ForeignError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        ForeignError {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for ForeignError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.code == 0 {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{} (code {:#x})", self.message, self.code)
        }
    }
}

impl std::error::Error for ForeignError {}

/// Iterator over the elements of an enumerable foreign object.
///
/// Each yielded handle carries one reference for the receiver.
pub type Elements<'a> = Box<dyn Iterator<Item = Result<Handle, ForeignError>> + 'a>;

/// The operations the sugar core consumes from a foreign object runtime.
///
/// Implementations must be shareable across threads because a runner may
/// branch onto a new thread; the handles themselves are still only valid on
/// the thread that obtained them (see `initialize`).
pub trait Runtime: Send + Sync {
    /// Prepare the calling thread for foreign calls.
    ///
    /// Called once per outermost scope on each thread, paired with
    /// `uninitialize` on the same thread.
    fn initialize(&self) -> Result<(), ForeignError> {
        Ok(())
    }

    /// Undo one `initialize` on the calling thread.
    fn uninitialize(&self) {}

    /// Instantiate a new object by class name.
    fn create(&self, name: &str) -> Result<Handle, ForeignError>;

    /// Attach to an already-running object registered under `name`.
    fn attach_active(&self, name: &str) -> Result<Handle, ForeignError>;

    /// Add one reference to `handle`.
    fn add_ref(&self, handle: Handle) -> Result<(), ForeignError>;

    /// Drop one reference to `handle`.
    fn release(&self, handle: Handle) -> Result<(), ForeignError>;

    /// Read a (possibly indexed) property.
    fn get_property(
        &self,
        handle: Handle,
        name: &str,
        args: &[Variant],
    ) -> Result<Variant, ForeignError>;

    /// Write a (possibly indexed) property. The value is the last argument.
    fn put_property(&self, handle: Handle, name: &str, args: &[Variant])
        -> Result<(), ForeignError>;

    /// Invoke a method.
    fn call_method(
        &self,
        handle: Handle,
        name: &str,
        args: &[Variant],
    ) -> Result<Variant, ForeignError>;

    /// Enumerate the elements of a collection object, in native order.
    fn enumerate(&self, handle: Handle) -> Result<Elements<'_>, ForeignError>;
}

#[cfg(test)]
mod tests;
