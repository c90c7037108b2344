//! Single-value conversion across the boundary
//!
//! [`MarshalingEngine`] turns one [`Value`] into one [`RawValue`] (and back)
//! under a [`TypeTag`]. Strings tagged `InternedString` take the intern-table
//! fast path: once a foreign engine holds an entry, later transmissions to
//! that engine carry only its id.
//!
//! ## Interned string protocol
//!
//! ```text
//! managed -> foreign   engine holds id?  yes -> InternedRef(id)
//!                                        no  -> InternedCopy { id, content }
//! foreign -> managed   InternedRef(id)            -> resident entry for id
//!                      InternedCopy { id, .. }    -> entry for id
//!                      String(content)            -> intern
//! ```
//!
//! Which ids an engine holds is recorded on the engine itself, see
//! [`ForeignEngine::holds_interned`]. Engines sharing one intern table never
//! see each other's references, and a miss anywhere falls back to a copy.

use std::sync::Arc;
use tracing::trace;

use crate::error::{BridgeError, BridgeResult};
use crate::foreign::ForeignEngine;
use crate::intern::{InternId, InternedString, StringInternTable};
use crate::registry::CustomMarshalerRegistry;
use crate::stats::BridgeStats;
use crate::types::{TypeKey, TypeTag};
use crate::value::{RawValue, Value};

pub struct MarshalingEngine {
    interns: Arc<StringInternTable>,
    marshalers: Arc<CustomMarshalerRegistry>,
    stats: Arc<BridgeStats>,
    intern_fast_path: bool,
}

impl MarshalingEngine {
    pub fn new(
        interns: Arc<StringInternTable>,
        marshalers: Arc<CustomMarshalerRegistry>,
        stats: Arc<BridgeStats>,
    ) -> Self {
        Self {
            interns,
            marshalers,
            stats,
            intern_fast_path: true,
        }
    }

    pub fn with_intern_fast_path(mut self, enabled: bool) -> Self {
        self.intern_fast_path = enabled;
        self
    }

    pub fn interns(&self) -> &Arc<StringInternTable> {
        &self.interns
    }

    pub fn marshalers(&self) -> &Arc<CustomMarshalerRegistry> {
        &self.marshalers
    }

    /// Convert a managed value for the foreign side
    pub fn to_foreign(
        &self,
        value: &Value,
        tag: &TypeTag,
        engine: &mut dyn ForeignEngine,
    ) -> BridgeResult<RawValue> {
        BridgeStats::bump(&self.stats.marshal_calls);
        self.value_to_raw(value, tag, engine)
    }

    /// Convert a raw foreign value for managed code
    pub fn from_foreign(
        &self,
        raw: RawValue,
        tag: &TypeTag,
        engine: &mut dyn ForeignEngine,
    ) -> BridgeResult<Value> {
        BridgeStats::bump(&self.stats.marshal_calls);
        self.raw_to_value(raw, tag, engine)
    }

    fn value_to_raw(
        &self,
        value: &Value,
        tag: &TypeTag,
        engine: &mut dyn ForeignEngine,
    ) -> BridgeResult<RawValue> {
        match tag {
            TypeTag::Void => Ok(RawValue::Undefined),
            TypeTag::Int32 => match value {
                Value::Int32(n) => Ok(RawValue::Int32(*n)),
                other => Err(BridgeError::mismatch(tag, other.type_name())),
            },
            TypeTag::Float64 => match value {
                Value::Float64(n) => Ok(RawValue::Float64(*n)),
                Value::Int32(n) => Ok(RawValue::Float64(f64::from(*n))),
                other => Err(BridgeError::mismatch(tag, other.type_name())),
            },
            TypeTag::String => value
                .as_str()
                .map(|s| RawValue::String(s.to_string()))
                .ok_or_else(|| BridgeError::mismatch(tag, value.type_name())),
            TypeTag::InternedString => match value {
                Value::Interned(entry) if self.intern_fast_path => {
                    Ok(self.send_interned(entry.clone(), engine))
                }
                Value::String(content) if self.intern_fast_path => {
                    Ok(self.send_interned(self.interns.intern(content), engine))
                }
                other => other
                    .as_str()
                    .map(|s| RawValue::String(s.to_string()))
                    .ok_or_else(|| BridgeError::mismatch(tag, other.type_name())),
            },
            TypeTag::Custom(key) => self.custom_to_raw(value, key, engine),
            TypeTag::Auto => self.value_to_raw(value, &value.runtime_tag(), engine),
        }
    }

    fn send_interned(&self, entry: InternedString, engine: &dyn ForeignEngine) -> RawValue {
        // A retired handle is replaced by the resident entry for its content
        let entry = if self.interns.is_resident(&entry) {
            entry
        } else {
            self.interns.intern(entry.as_str())
        };

        if engine.holds_interned(entry.id()) {
            BridgeStats::bump(&self.stats.interned_refs);
            trace!(id = %entry.id(), "Interned string sent by reference");
            return RawValue::InternedRef(entry.id());
        }

        BridgeStats::bump(&self.stats.interned_copies);
        RawValue::InternedCopy {
            id: entry.id(),
            content: entry.as_str().to_string(),
        }
    }

    fn custom_to_raw(
        &self,
        value: &Value,
        key: &TypeKey,
        engine: &mut dyn ForeignEngine,
    ) -> BridgeResult<RawValue> {
        let custom = value
            .as_custom()
            .filter(|custom| custom.type_key() == key)
            .ok_or_else(|| BridgeError::mismatch(TypeTag::Custom(key.clone()), value.type_name()))?;

        let descriptor = self.marshalers.resolve(key)?;
        let raw = descriptor.to_foreign(custom)?;
        match descriptor.post_filter() {
            Some(filter) => Ok(engine.apply_filter(filter, raw)?),
            None => Ok(raw),
        }
    }

    fn raw_to_value(
        &self,
        raw: RawValue,
        tag: &TypeTag,
        engine: &mut dyn ForeignEngine,
    ) -> BridgeResult<Value> {
        match tag {
            TypeTag::Void => Ok(Value::Void),
            TypeTag::Int32 => match raw {
                RawValue::Int32(n) => Ok(Value::Int32(n)),
                RawValue::Float64(n) => float_to_i32(n)
                    .map(Value::Int32)
                    .ok_or_else(|| BridgeError::mismatch(tag, "non-integral float64")),
                other => Err(BridgeError::mismatch(tag, other.type_name())),
            },
            TypeTag::Float64 => raw
                .as_f64()
                .map(Value::Float64)
                .ok_or_else(|| BridgeError::mismatch(tag, raw.type_name())),
            TypeTag::String => match raw {
                RawValue::String(content) | RawValue::InternedCopy { content, .. } => {
                    Ok(Value::String(content))
                }
                RawValue::InternedRef(id) => Ok(Value::String(
                    self.resolve_ref(id)?.as_str().to_string(),
                )),
                other => Err(BridgeError::mismatch(tag, other.type_name())),
            },
            TypeTag::InternedString => self.receive_interned(raw).map(Value::Interned),
            TypeTag::Custom(key) => {
                let descriptor = self.marshalers.resolve(key)?;
                let raw = match descriptor.pre_filter() {
                    Some(filter) => engine.apply_filter(filter, raw)?,
                    None => raw,
                };
                Ok(Value::Custom(descriptor.from_foreign(raw)?))
            }
            TypeTag::Auto => {
                let inferred = infer_tag(&raw);
                self.raw_to_value(raw, &inferred, engine)
            }
        }
    }

    fn receive_interned(&self, raw: RawValue) -> BridgeResult<InternedString> {
        match raw {
            RawValue::InternedRef(id) => {
                let entry = self.resolve_ref(id)?;
                BridgeStats::bump(&self.stats.interned_refs);
                trace!(id = %id, "Interned string received by reference");
                Ok(entry)
            }
            RawValue::InternedCopy { id, content } => {
                let entry = match self.interns.get(id) {
                    Some(entry) if entry.as_str() == content => entry,
                    _ => self.interns.intern(&content),
                };
                BridgeStats::bump(&self.stats.interned_copies);
                Ok(entry)
            }
            RawValue::String(content) => {
                BridgeStats::bump(&self.stats.interned_copies);
                Ok(self.interns.intern(&content))
            }
            other => Err(BridgeError::mismatch(
                TypeTag::InternedString,
                other.type_name(),
            )),
        }
    }

    fn resolve_ref(&self, id: InternId) -> BridgeResult<InternedString> {
        self.interns
            .get(id)
            .ok_or(BridgeError::InvalidInternedString(id.get()))
    }
}

/// Tag inferred from a raw foreign value
pub fn infer_tag(raw: &RawValue) -> TypeTag {
    match raw {
        RawValue::Undefined => TypeTag::Void,
        RawValue::Int32(_) => TypeTag::Int32,
        RawValue::Float64(_) => TypeTag::Float64,
        RawValue::String(_) => TypeTag::String,
        RawValue::InternedCopy { .. } | RawValue::InternedRef(_) => TypeTag::InternedString,
    }
}

/// Exact conversion of an integral, in-range float
pub(crate) fn float_to_i32(n: f64) -> Option<i32> {
    if n.fract() == 0.0 && n >= f64::from(i32::MIN) && n <= f64::from(i32::MAX) {
        Some(n as i32)
    } else {
        None
    }
}
