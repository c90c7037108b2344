//! Values on both sides of the boundary.
//!
//! [`Value`] is what managed targets see. [`RawValue`] is what travels to and
//! from the foreign engine.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::error::{BridgeError, BridgeResult};
use crate::intern::{InternId, InternedString};
use crate::types::{TypeKey, TypeTag};

/// An instance of a user-defined type, tagged with its type key.
#[derive(Clone)]
pub struct CustomValue {
    key: TypeKey,
    inner: Arc<dyn Any + Send + Sync>,
}

impl CustomValue {
    pub fn new<T: Any + Send + Sync>(key: TypeKey, value: T) -> Self {
        Self {
            key,
            inner: Arc::new(value),
        }
    }

    /// Wrap `value` keyed by its Rust type name
    pub fn of<T: Any + Send + Sync>(value: T) -> Self {
        Self::new(TypeKey::of::<T>(), value)
    }

    pub fn type_key(&self) -> &TypeKey {
        &self.key
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }
}

impl fmt::Debug for CustomValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CustomValue({})", self.key)
    }
}

/// Managed-side value.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Void,
    Int32(i32),
    Float64(f64),
    String(String),
    Interned(InternedString),
    Custom(CustomValue),
}

impl Value {
    /// Tag matching the runtime variant; used for `Auto` inference
    pub fn runtime_tag(&self) -> TypeTag {
        match self {
            Self::Void => TypeTag::Void,
            Self::Int32(_) => TypeTag::Int32,
            Self::Float64(_) => TypeTag::Float64,
            Self::String(_) => TypeTag::String,
            Self::Interned(_) => TypeTag::InternedString,
            Self::Custom(custom) => TypeTag::Custom(custom.type_key().clone()),
        }
    }

    pub fn type_name(&self) -> String {
        self.runtime_tag().to_string()
    }

    /// String content of either string variant
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            Self::Interned(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_custom(&self) -> Option<&CustomValue> {
        match self {
            Self::Custom(custom) => Some(custom),
            _ => None,
        }
    }

    pub fn expect_i32(&self) -> BridgeResult<i32> {
        match self {
            Self::Int32(n) => Ok(*n),
            other => Err(BridgeError::mismatch(TypeTag::Int32, other.type_name())),
        }
    }

    pub fn expect_f64(&self) -> BridgeResult<f64> {
        match self {
            Self::Float64(n) => Ok(*n),
            Self::Int32(n) => Ok(f64::from(*n)),
            other => Err(BridgeError::mismatch(TypeTag::Float64, other.type_name())),
        }
    }

    pub fn expect_str(&self) -> BridgeResult<&str> {
        self.as_str()
            .ok_or_else(|| BridgeError::mismatch(TypeTag::String, self.type_name()))
    }

    /// Downcast a custom value, failing with a mismatch on any other variant
    pub fn expect_custom<T: Any>(&self, key: &TypeKey) -> BridgeResult<&T> {
        self.as_custom()
            .filter(|custom| custom.type_key() == key)
            .and_then(CustomValue::downcast_ref::<T>)
            .ok_or_else(|| BridgeError::mismatch(TypeTag::Custom(key.clone()), self.type_name()))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Void, Self::Void) => true,
            (Self::Int32(a), Self::Int32(b)) => a == b,
            (Self::Float64(a), Self::Float64(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Interned(a), Self::Interned(b)) => a == b,
            (Self::Custom(a), Self::Custom(b)) => CustomValue::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Int32(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Float64(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<InternedString> for Value {
    fn from(s: InternedString) -> Self {
        Self::Interned(s)
    }
}

impl From<CustomValue> for Value {
    fn from(custom: CustomValue) -> Self {
        Self::Custom(custom)
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Self::Void
    }
}

/// Boundary representation exchanged with the foreign engine.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RawValue {
    #[default]
    Undefined,
    Int32(i32),
    Float64(f64),
    String(String),
    /// Full copy that also registers the entry on the foreign side
    InternedCopy { id: InternId, content: String },
    /// Entry already held by both sides; no content travels
    InternedRef(InternId),
}

impl RawValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Int32(_) => "int32",
            Self::Float64(_) => "float64",
            Self::String(_) => "string",
            Self::InternedCopy { .. } => "internedString",
            Self::InternedRef(_) => "internedRef",
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    /// Numeric view of either number variant
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int32(n) => Some(f64::from(*n)),
            Self::Float64(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => f.write_str("undefined"),
            Self::Int32(n) => write!(f, "{}", n),
            Self::Float64(n) => write!(f, "{}", n),
            Self::String(s) | Self::InternedCopy { content: s, .. } => f.write_str(s),
            Self::InternedRef(id) => write!(f, "<interned {}>", id),
        }
    }
}

impl From<i32> for RawValue {
    fn from(n: i32) -> Self {
        Self::Int32(n)
    }
}

impl From<f64> for RawValue {
    fn from(n: f64) -> Self {
        Self::Float64(n)
    }
}

impl From<&str> for RawValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for RawValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Point {
        x: i32,
    }

    #[test]
    fn test_runtime_tags() {
        assert_eq!(Value::from(3).runtime_tag(), TypeTag::Int32);
        assert_eq!(Value::from(0.5).runtime_tag(), TypeTag::Float64);
        assert_eq!(Value::from("s").runtime_tag(), TypeTag::String);
        assert_eq!(Value::Void.runtime_tag(), TypeTag::Void);

        let custom = Value::from(CustomValue::of(Point { x: 1 }));
        assert_eq!(
            custom.runtime_tag(),
            TypeTag::Custom(TypeKey::of::<Point>())
        );
    }

    #[test]
    fn test_expect_helpers() {
        assert_eq!(Value::Int32(4).expect_f64().unwrap(), 4.0);
        assert!(Value::Float64(4.5).expect_i32().is_err());
        assert_eq!(Value::from("abc").expect_str().unwrap(), "abc");

        let key = TypeKey::of::<Point>();
        let value = Value::from(CustomValue::of(Point { x: 7 }));
        assert_eq!(value.expect_custom::<Point>(&key).unwrap().x, 7);
        assert!(value.expect_custom::<Point>(&TypeKey::from("Other")).is_err());
    }

    #[test]
    fn test_raw_numeric_view() {
        assert_eq!(RawValue::Int32(2).as_f64(), Some(2.0));
        assert_eq!(RawValue::from("2").as_f64(), None);
        assert!(RawValue::default().is_undefined());
    }

    #[test]
    fn test_raw_display() {
        assert_eq!(RawValue::Int32(3).to_string(), "3");
        assert_eq!(RawValue::Float64(2.5).to_string(), "2.5");
        assert_eq!(RawValue::Undefined.to_string(), "undefined");
    }
}
