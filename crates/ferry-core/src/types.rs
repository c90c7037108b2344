//! Type identities and marshaling tags.

use std::fmt;
use std::sync::Arc;

/// Stable identity of a user-defined type, e.g. an assembly-qualified name.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeKey(Arc<str>);

impl TypeKey {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self(name.into())
    }

    /// Key derived from the Rust type name of `T`
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self(Arc::from(std::any::type_name::<T>()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeKey({})", self.0)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TypeKey {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for TypeKey {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

/// How a single parameter or result crosses the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Void,
    Int32,
    Float64,
    /// Always copied
    String,
    /// Eligible for the intern-table reference fast path
    InternedString,
    /// Inferred from the runtime value at the call boundary
    Auto,
    Custom(TypeKey),
}

impl TypeTag {
    /// Parse a one-letter signature tag
    pub fn from_letter(letter: char) -> Option<Self> {
        match letter {
            'i' => Some(Self::Int32),
            'd' => Some(Self::Float64),
            's' => Some(Self::String),
            'S' => Some(Self::InternedString),
            'a' => Some(Self::Auto),
            _ => None,
        }
    }

    /// Signature letter, if the tag has a textual form
    pub fn letter(&self) -> Option<char> {
        match self {
            Self::Int32 => Some('i'),
            Self::Float64 => Some('d'),
            Self::String => Some('s'),
            Self::InternedString => Some('S'),
            Self::Auto => Some('a'),
            Self::Void | Self::Custom(_) => None,
        }
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Self::String | Self::InternedString)
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Void => f.write_str("void"),
            Self::Int32 => f.write_str("int32"),
            Self::Float64 => f.write_str("float64"),
            Self::String => f.write_str("string"),
            Self::InternedString => f.write_str("internedString"),
            Self::Auto => f.write_str("auto"),
            Self::Custom(key) => write!(f, "customType({})", key),
        }
    }
}
