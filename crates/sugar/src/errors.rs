//! Error types for chains, arenas and runners.
//!
//! Errors are ordinary values: traversal never panics on a foreign failure,
//! it records an `Error` on the chain it returns and every later traversal
//! short-circuits with that same error.
//!
//! # Structured Error Categories
//!
//! `ErrorKind` carries the structured data; factory functions (e.g.
//! `nil_handle()`) populate both `kind` and `message`.

use std::fmt;

use sugar_handle::{ForeignError, Variant};

/// The foreign operation that failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ForeignOp {
    Create,
    AttachActive,
    AddRef,
    Release,
    GetProperty,
    PutProperty,
    CallMethod,
    Enumerate,
}

impl ForeignOp {
    pub fn as_str(self) -> &'static str {
        match self {
            ForeignOp::Create => "create",
            ForeignOp::AttachActive => "attach_active",
            ForeignOp::AddRef => "add_ref",
            ForeignOp::Release => "release",
            ForeignOp::GetProperty => "get",
            ForeignOp::PutProperty => "put",
            ForeignOp::CallMethod => "call",
            ForeignOp::Enumerate => "enumerate",
        }
    }
}

impl fmt::Display for ForeignOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed error category.
#[derive(Clone, Debug, PartialEq)]
pub enum ErrorKind {
    /// The foreign runtime reported a failure.
    ForeignCallFailed {
        op: ForeignOp,
        name: String,
        source: ForeignError,
    },
    /// Traversal attempted on a chain with no live handle.
    NilHandle,
    /// A scalar was requested but the result is an object reference.
    HandleNotScalar,
    /// Operation attempted on a released chain.
    ChainReleased,
    /// `for_each` was stopped deliberately, carrying the callback's value.
    IterationStopped { value: Variant },
    /// The enumerator failed while producing an element.
    IterationFailed { source: ForeignError },
    /// Runtime initialization for a scope failed.
    InitFailed { source: ForeignError },
    /// The scope's cancellation token was triggered.
    Cancelled,
    /// A worker thread could not be started.
    SpawnFailed { message: String },
    Custom { message: String },
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ForeignCallFailed { op, name, source } => {
                if name.is_empty() {
                    write!(f, "{op} failed: {source}")
                } else {
                    write!(f, "{op} {name} failed: {source}")
                }
            }
            Self::NilHandle => write!(f, "chain holds no object"),
            Self::HandleNotScalar => write!(f, "result is an object reference, use store or fork"),
            Self::ChainReleased => write!(f, "chain already released"),
            Self::IterationStopped { value } => {
                if value.is_empty() {
                    write!(f, "iteration stopped")
                } else {
                    write!(f, "iteration stopped: {value}")
                }
            }
            Self::IterationFailed { source } => write!(f, "enumeration failed: {source}"),
            Self::InitFailed { source } => write!(f, "runtime initialization failed: {source}"),
            Self::Cancelled => write!(f, "scope cancelled"),
            Self::SpawnFailed { message } => write!(f, "failed to start worker thread: {message}"),
            Self::Custom { message } => write!(f, "{message}"),
        }
    }
}

/// Error recorded on a chain or returned by a scope.
#[derive(Clone, Debug, PartialEq)]
pub struct Error {
    pub kind: ErrorKind,
    /// Human-readable message; equals `kind.to_string()` for factory errors.
    pub message: String,
}

impl Error {
    /// Create a `Custom` error (callback failures, caller-defined errors).
    pub fn new(message: impl Into<String>) -> Self {
        let message = message.into();
        Error {
            kind: ErrorKind::Custom {
                message: message.clone(),
            },
            message,
        }
    }

    fn from_kind(kind: ErrorKind) -> Self {
        let message = kind.to_string();
        Error { kind, message }
    }

    /// The value carried by a deliberate `for_each` stop.
    pub fn stopped_value(&self) -> Option<&Variant> {
        match &self.kind {
            ErrorKind::IterationStopped { value } => Some(value),
            _ => None,
        }
    }

    #[inline]
    pub fn is_iteration_stopped(&self) -> bool {
        matches!(self.kind, ErrorKind::IterationStopped { .. })
    }

    /// The foreign failure underneath, if any.
    pub fn foreign(&self) -> Option<&ForeignError> {
        match &self.kind {
            ErrorKind::ForeignCallFailed { source, .. }
            | ErrorKind::IterationFailed { source }
            | ErrorKind::InitFailed { source } => Some(source),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.foreign().map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// The foreign runtime failed during `op` on `name`.
#[cold]
pub fn foreign_call_failed(op: ForeignOp, name: &str, source: ForeignError) -> Error {
    Error::from_kind(ErrorKind::ForeignCallFailed {
        op,
        name: name.to_string(),
        source,
    })
}

#[cold]
pub fn nil_handle() -> Error {
    Error::from_kind(ErrorKind::NilHandle)
}

#[cold]
pub fn handle_not_scalar() -> Error {
    Error::from_kind(ErrorKind::HandleNotScalar)
}

#[cold]
pub fn chain_released() -> Error {
    Error::from_kind(ErrorKind::ChainReleased)
}

#[cold]
pub fn iteration_stopped(value: Variant) -> Error {
    Error::from_kind(ErrorKind::IterationStopped { value })
}

#[cold]
pub fn iteration_failed(source: ForeignError) -> Error {
    Error::from_kind(ErrorKind::IterationFailed { source })
}

#[cold]
pub fn init_failed(source: ForeignError) -> Error {
    Error::from_kind(ErrorKind::InitFailed { source })
}

#[cold]
pub fn cancelled() -> Error {
    Error::from_kind(ErrorKind::Cancelled)
}

#[cold]
pub fn spawn_failed(message: impl Into<String>) -> Error {
    Error::from_kind(ErrorKind::SpawnFailed {
        message: message.into(),
    })
}
