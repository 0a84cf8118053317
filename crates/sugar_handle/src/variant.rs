//! Values exchanged with the foreign runtime.

use std::fmt;

use crate::Handle;

/// A scalar or object-reference value, as passed to and returned from
/// foreign property and method calls.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Variant {
    /// No value (nil / `VT_EMPTY`).
    #[default]
    Empty,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// Reference to a foreign object.
    Object(Handle),
}

impl Variant {
    /// Short name of the variant's type, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Variant::Empty => "nil",
            Variant::Bool(_) => "bool",
            Variant::Int(_) => "int",
            Variant::Float(_) => "float",
            Variant::Str(_) => "string",
            Variant::Object(_) => "object",
        }
    }

    #[inline]
    pub fn is_object(&self) -> bool {
        matches!(self, Variant::Object(_))
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, Variant::Empty)
    }

    /// The object handle, if this is an object reference.
    pub fn as_object(&self) -> Option<Handle> {
        match self {
            Variant::Object(h) => Some(*h),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Variant::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Variant::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Empty => write!(f, "nil"),
            Variant::Bool(b) => write!(f, "{b}"),
            Variant::Int(n) => write!(f, "{n}"),
            Variant::Float(x) => write!(f, "{x}"),
            Variant::Str(s) => write!(f, "{s}"),
            Variant::Object(h) => write!(f, "<object {h}>"),
        }
    }
}

impl From<bool> for Variant {
    fn from(b: bool) -> Self {
        Variant::Bool(b)
    }
}

impl From<i64> for Variant {
    fn from(n: i64) -> Self {
        Variant::Int(n)
    }
}

impl From<i32> for Variant {
    fn from(n: i32) -> Self {
        Variant::Int(i64::from(n))
    }
}

impl From<f64> for Variant {
    fn from(x: f64) -> Self {
        Variant::Float(x)
    }
}

impl From<&str> for Variant {
    fn from(s: &str) -> Self {
        Variant::Str(s.to_string())
    }
}

impl From<String> for Variant {
    fn from(s: String) -> Self {
        Variant::Str(s)
    }
}

impl From<Handle> for Variant {
    fn from(h: Handle) -> Self {
        Variant::Object(h)
    }
}

impl<T: Into<Variant>> From<Option<T>> for Variant {
    fn from(v: Option<T>) -> Self {
        v.map_or(Variant::Empty, Into::into)
    }
}
