//! Custom marshaler registry
//!
//! Maps a user type's [`TypeKey`] to the converters that move it across the
//! boundary, plus optional foreign-side filters.
//!
//! Filters are JavaScript function bodies over a parameter named `value`,
//! e.g. `"return (value + 0.1)"`. The pre-filter runs on the raw foreign value
//! before `from_foreign`; the post-filter runs on the raw value produced by
//! `to_foreign` before it crosses back.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::error::{BridgeError, BridgeResult};
use crate::types::TypeKey;
use crate::value::{CustomValue, RawValue};

pub type FromForeignFn = Arc<dyn Fn(RawValue) -> BridgeResult<CustomValue> + Send + Sync>;
pub type ToForeignFn = Arc<dyn Fn(&CustomValue) -> BridgeResult<RawValue> + Send + Sync>;

/// Converters and filters for one custom type.
#[derive(Clone)]
pub struct MarshalerDescriptor {
    marshaler: TypeKey,
    from_foreign: FromForeignFn,
    to_foreign: ToForeignFn,
    pre_filter: Option<String>,
    post_filter: Option<String>,
}

impl MarshalerDescriptor {
    /// `marshaler` identifies who supplied the converters; registering a
    /// descriptor from the same marshaler twice is a no-op.
    pub fn new<F, T>(marshaler: impl Into<TypeKey>, from_foreign: F, to_foreign: T) -> Self
    where
        F: Fn(RawValue) -> BridgeResult<CustomValue> + Send + Sync + 'static,
        T: Fn(&CustomValue) -> BridgeResult<RawValue> + Send + Sync + 'static,
    {
        Self {
            marshaler: marshaler.into(),
            from_foreign: Arc::new(from_foreign),
            to_foreign: Arc::new(to_foreign),
            pre_filter: None,
            post_filter: None,
        }
    }

    pub fn with_pre_filter(mut self, expr: impl Into<String>) -> Self {
        self.pre_filter = Some(expr.into());
        self
    }

    pub fn with_post_filter(mut self, expr: impl Into<String>) -> Self {
        self.post_filter = Some(expr.into());
        self
    }

    pub fn marshaler(&self) -> &TypeKey {
        &self.marshaler
    }

    pub fn pre_filter(&self) -> Option<&str> {
        self.pre_filter.as_deref()
    }

    pub fn post_filter(&self) -> Option<&str> {
        self.post_filter.as_deref()
    }

    pub fn from_foreign(&self, raw: RawValue) -> BridgeResult<CustomValue> {
        (self.from_foreign)(raw)
    }

    pub fn to_foreign(&self, value: &CustomValue) -> BridgeResult<RawValue> {
        (self.to_foreign)(value)
    }

    /// Same marshaler and same filters
    pub fn same_as(&self, other: &Self) -> bool {
        self.marshaler == other.marshaler
            && self.pre_filter == other.pre_filter
            && self.post_filter == other.post_filter
    }
}

impl fmt::Debug for MarshalerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarshalerDescriptor")
            .field("marshaler", &self.marshaler)
            .field("pre_filter", &self.pre_filter)
            .field("post_filter", &self.post_filter)
            .finish_non_exhaustive()
    }
}

/// A type that knows how to marshal `Target` across the boundary.
///
/// ```
/// use ferry_core::{BridgeResult, CustomMarshaler, RawValue};
///
/// struct Meters(f64);
/// struct MetersMarshaler;
///
/// impl CustomMarshaler for MetersMarshaler {
///     type Target = Meters;
///
///     fn from_foreign(raw: RawValue) -> BridgeResult<Meters> {
///         Ok(Meters(raw.as_f64().unwrap_or_default()))
///     }
///
///     fn to_foreign(value: &Meters) -> BridgeResult<RawValue> {
///         Ok(RawValue::Float64(value.0))
///     }
///
///     fn pre_filter() -> Option<&'static str> {
///         Some("return Math.abs(value)")
///     }
/// }
/// ```
pub trait CustomMarshaler: 'static {
    type Target: Send + Sync + 'static;

    fn from_foreign(raw: RawValue) -> BridgeResult<Self::Target>;

    fn to_foreign(value: &Self::Target) -> BridgeResult<RawValue>;

    fn pre_filter() -> Option<&'static str> {
        None
    }

    fn post_filter() -> Option<&'static str> {
        None
    }

    /// Key of the marshaled type
    fn type_key() -> TypeKey {
        TypeKey::of::<Self::Target>()
    }

    fn descriptor() -> MarshalerDescriptor {
        let key = Self::type_key();
        let from_key = key.clone();
        let mut descriptor = MarshalerDescriptor::new(
            TypeKey::of::<Self>(),
            move |raw| Ok(CustomValue::new(from_key.clone(), Self::from_foreign(raw)?)),
            move |value| {
                let target = value
                    .downcast_ref::<Self::Target>()
                    .ok_or_else(|| BridgeError::mismatch(&key, value.type_key()))?;
                Self::to_foreign(target)
            },
        );
        if let Some(expr) = Self::pre_filter() {
            descriptor = descriptor.with_pre_filter(expr);
        }
        if let Some(expr) = Self::post_filter() {
            descriptor = descriptor.with_post_filter(expr);
        }
        descriptor
    }
}

#[derive(Default)]
pub struct CustomMarshalerRegistry {
    descriptors: RwLock<FxHashMap<TypeKey, Arc<MarshalerDescriptor>>>,
}

impl CustomMarshalerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, key: TypeKey, descriptor: MarshalerDescriptor) -> BridgeResult<()> {
        let mut descriptors = self.descriptors.write();
        if let Some(existing) = descriptors.get(&key) {
            if existing.same_as(&descriptor) {
                return Ok(());
            }
            return Err(BridgeError::DuplicateMarshaler(key.to_string()));
        }

        debug!(
            type_key = %key,
            marshaler = %descriptor.marshaler,
            pre_filter = descriptor.pre_filter.is_some(),
            post_filter = descriptor.post_filter.is_some(),
            "Registered custom marshaler"
        );
        descriptors.insert(key, Arc::new(descriptor));
        Ok(())
    }

    /// Register `M` for `M::Target`
    pub fn register_marshaler<M: CustomMarshaler>(&self) -> BridgeResult<()> {
        self.register(M::type_key(), M::descriptor())
    }

    pub fn resolve(&self, key: &TypeKey) -> BridgeResult<Arc<MarshalerDescriptor>> {
        self.descriptors
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| BridgeError::UnknownType(key.to_string()))
    }

    pub fn unregister(&self, key: &TypeKey) -> bool {
        self.descriptors.write().remove(key).is_some()
    }

    pub fn contains(&self, key: &TypeKey) -> bool {
        self.descriptors.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.descriptors.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Celsius(f64);
    struct CelsiusMarshaler;

    impl CustomMarshaler for CelsiusMarshaler {
        type Target = Celsius;

        fn from_foreign(raw: RawValue) -> BridgeResult<Celsius> {
            raw.as_f64()
                .map(Celsius)
                .ok_or_else(|| BridgeError::mismatch("float64", raw.type_name()))
        }

        fn to_foreign(value: &Celsius) -> BridgeResult<RawValue> {
            Ok(RawValue::Float64(value.0))
        }

        fn post_filter() -> Option<&'static str> {
            Some("return Math.round(value)")
        }
    }

    struct OtherCelsiusMarshaler;

    impl CustomMarshaler for OtherCelsiusMarshaler {
        type Target = Celsius;

        fn from_foreign(_raw: RawValue) -> BridgeResult<Celsius> {
            Ok(Celsius(0.0))
        }

        fn to_foreign(_value: &Celsius) -> BridgeResult<RawValue> {
            Ok(RawValue::Float64(0.0))
        }
    }

    #[test]
    fn test_register_is_idempotent() {
        let registry = CustomMarshalerRegistry::new();
        registry.register_marshaler::<CelsiusMarshaler>().unwrap();
        registry.register_marshaler::<CelsiusMarshaler>().unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_conflicting_registration_fails() {
        let registry = CustomMarshalerRegistry::new();
        registry.register_marshaler::<CelsiusMarshaler>().unwrap();
        let err = registry
            .register_marshaler::<OtherCelsiusMarshaler>()
            .unwrap_err();
        assert!(matches!(err, BridgeError::DuplicateMarshaler(_)));

        // The first registration is untouched
        let descriptor = registry.resolve(&TypeKey::of::<Celsius>()).unwrap();
        assert_eq!(descriptor.post_filter(), Some("return Math.round(value)"));
    }

    #[test]
    fn test_same_marshaler_different_filter_conflicts() {
        let registry = CustomMarshalerRegistry::new();
        let key = TypeKey::from("BP.Point");
        let make = || {
            MarshalerDescriptor::new(
                "BP.PointMarshaler",
                |raw| Ok(CustomValue::new(TypeKey::from("BP.Point"), raw.as_f64())),
                |_| Ok(RawValue::Undefined),
            )
        };

        registry.register(key.clone(), make()).unwrap();
        registry.register(key.clone(), make()).unwrap();
        let err = registry
            .register(key, make().with_pre_filter("return value"))
            .unwrap_err();
        assert!(matches!(err, BridgeError::DuplicateMarshaler(_)));
    }

    #[test]
    fn test_resolve_unknown() {
        let registry = CustomMarshalerRegistry::new();
        let err = registry.resolve(&TypeKey::from("Missing")).unwrap_err();
        assert!(matches!(err, BridgeError::UnknownType(ref name) if name == "Missing"));
    }

    #[test]
    fn test_descriptor_round_trip() {
        let descriptor = CelsiusMarshaler::descriptor();
        let value = descriptor.from_foreign(RawValue::Float64(21.5)).unwrap();
        assert_eq!(value.type_key(), &TypeKey::of::<Celsius>());
        assert_eq!(value.downcast_ref::<Celsius>().unwrap().0, 21.5);
        assert_eq!(
            descriptor.to_foreign(&value).unwrap(),
            RawValue::Float64(21.5)
        );
    }

    #[test]
    fn test_to_foreign_rejects_foreign_type() {
        let descriptor = CelsiusMarshaler::descriptor();
        let wrong = CustomValue::of(5_u8);
        assert!(descriptor.to_foreign(&wrong).is_err());
    }

    #[test]
    fn test_unregister() {
        let registry = CustomMarshalerRegistry::new();
        registry.register_marshaler::<CelsiusMarshaler>().unwrap();
        assert!(registry.unregister(&TypeKey::of::<Celsius>()));
        assert!(!registry.contains(&TypeKey::of::<Celsius>()));
        registry.register_marshaler::<OtherCelsiusMarshaler>().unwrap();
    }
}
