//! The foreign (JavaScript) side of the bridge, as seen from the core.

use crate::error::ForeignError;
use crate::intern::InternId;
use crate::value::RawValue;

/// A JavaScript engine the bridge can drive.
///
/// Every method reports a thrown exception as a [`ForeignError`]; nothing may
/// unwind out of an implementation.
pub trait ForeignEngine {
    /// Evaluate `source` as a script. `None` means the completion value was
    /// `undefined` or `null`; anything else is stringified.
    fn evaluate(&mut self, source: &str) -> Result<Option<String>, ForeignError>;

    /// Call the global function named by `name` with already-marshaled
    /// arguments. `name` arrives on the interned-string path, so it may be an
    /// [`RawValue::InternedRef`].
    fn call_function(
        &mut self,
        name: &RawValue,
        args: Vec<RawValue>,
    ) -> Result<RawValue, ForeignError>;

    /// Apply a filter body (a function of `value`) to `value`.
    fn apply_filter(&mut self, body: &str, value: RawValue) -> Result<RawValue, ForeignError>;

    /// Whether this engine recorded the interned entry `id` from an earlier
    /// copy. The managed side sends [`RawValue::InternedRef`] only for ids an
    /// engine holds; the default holds nothing, so every crossing is a copy.
    fn holds_interned(&self, _id: InternId) -> bool {
        false
    }
}

impl<E: ForeignEngine + ?Sized> ForeignEngine for &mut E {
    fn evaluate(&mut self, source: &str) -> Result<Option<String>, ForeignError> {
        (**self).evaluate(source)
    }

    fn call_function(
        &mut self,
        name: &RawValue,
        args: Vec<RawValue>,
    ) -> Result<RawValue, ForeignError> {
        (**self).call_function(name, args)
    }

    fn apply_filter(&mut self, body: &str, value: RawValue) -> Result<RawValue, ForeignError> {
        (**self).apply_filter(body, value)
    }

    fn holds_interned(&self, id: InternId) -> bool {
        (**self).holds_interned(id)
    }
}
