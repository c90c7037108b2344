//! Conversion between Boa values and bridge raw values
//!
//! Numbers that are integral and fit in 32 bits cross as `Int32`, everything
//! else numeric as `Float64`. Strings for `S` parameters use the interned
//! protocol: the first crossing is a full copy, later crossings send only the
//! id while the managed side still holds the entry.
//!
//! Strings cross as Rust `String`s, so a JavaScript string holding a lone
//! UTF-16 surrogate cannot be converted and fails as a type mismatch.

use std::cell::RefCell;
use std::rc::Rc;

use boa_engine::error::JsNativeErrorKind;
use boa_engine::{Context, JsError, JsNativeError, JsResult, JsString, JsValue};
use ferry_core::{
    BridgeError, Fault, ForeignError, InternId, RawValue, StringInternTable, TypeTag,
};
use rustc_hash::FxHashMap;
use tracing::trace;

/// Interned strings this engine has received or sent.
#[derive(Debug, Default)]
pub struct ForeignStrings {
    by_id: FxHashMap<InternId, JsString>,
    by_content: FxHashMap<String, InternId>,
}

/// Foreign string map shared between the engine and its native functions
pub type SharedStrings = Rc<RefCell<ForeignStrings>>;

impl ForeignStrings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an entry the managed side copied over
    pub fn remember(&mut self, id: InternId, content: &str) -> JsString {
        let js = JsString::from(content);
        self.by_id.insert(id, js.clone());
        self.by_content.insert(content.to_string(), id);
        js
    }

    /// String for an id this engine recorded
    pub fn resolve(&self, id: InternId) -> Option<JsString> {
        self.by_id.get(&id).cloned()
    }

    /// Raw form of `content` travelling to the managed side
    pub fn outgoing(&mut self, content: &str, interns: &StringInternTable) -> RawValue {
        if let Some(&id) = self.by_content.get(content)
            && interns.get(id).is_some_and(|entry| entry.as_str() == content)
        {
            trace!(%id, "Sending interned reference");
            return RawValue::InternedRef(id);
        }

        let entry = interns.intern(content);
        self.remember(entry.id(), content);
        RawValue::InternedCopy {
            id: entry.id(),
            content: content.to_string(),
        }
    }

    pub fn contains(&self, id: InternId) -> bool {
        self.by_id.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn clear(&mut self) {
        self.by_id.clear();
        self.by_content.clear();
    }
}

/// Number as it crosses the boundary
pub fn number_to_raw(n: f64) -> RawValue {
    let integral = n.fract() == 0.0 && !(n == 0.0 && n.is_sign_negative());
    if integral && n >= f64::from(i32::MIN) && n <= f64::from(i32::MAX) {
        RawValue::Int32(n as i32)
    } else {
        RawValue::Float64(n)
    }
}

/// Convert a Boa value headed for a parameter tagged `tag`.
///
/// Objects are converted with JavaScript `ToString`, which may run script, so
/// the string map is only borrowed for the interned branch.
pub fn from_js(
    value: &JsValue,
    tag: &TypeTag,
    strings: &RefCell<ForeignStrings>,
    interns: &StringInternTable,
    context: &mut Context,
) -> JsResult<RawValue> {
    if value.is_undefined() || value.is_null() {
        return Ok(RawValue::Undefined);
    }
    if let Some(n) = value.as_number() {
        return Ok(number_to_raw(n));
    }
    if let Some(b) = value.as_boolean() {
        return Ok(RawValue::Int32(i32::from(b)));
    }
    if let Some(s) = value.as_string() {
        let content = utf8(&s, tag)?;
        if matches!(tag, TypeTag::InternedString) {
            return Ok(strings.borrow_mut().outgoing(&content, interns));
        }
        return Ok(RawValue::String(content));
    }

    let text = value.to_string(context)?;
    Ok(RawValue::String(utf8(&text, tag)?))
}

fn utf8(s: &JsString, tag: &TypeTag) -> JsResult<String> {
    s.to_std_string().map_err(|_| {
        let err = BridgeError::mismatch(tag, "string with unpaired UTF-16 surrogate");
        JsNativeError::typ()
            .with_message(Fault::from(&err).to_string())
            .into()
    })
}

/// Convert a raw value arriving from the managed side
pub fn to_js(raw: RawValue, strings: &RefCell<ForeignStrings>) -> Result<JsValue, ForeignError> {
    let value = match raw {
        RawValue::Undefined => JsValue::undefined(),
        RawValue::Int32(n) => JsValue::new(n),
        RawValue::Float64(n) => JsValue::new(n),
        RawValue::String(s) => JsValue::new(JsString::from(s.as_str())),
        RawValue::InternedCopy { id, content } => {
            JsValue::new(strings.borrow_mut().remember(id, &content))
        }
        RawValue::InternedRef(id) => {
            let js = strings.borrow().resolve(id).ok_or_else(|| {
                ForeignError::new("ReferenceError", format!("unknown interned string {id}"))
            })?;
            JsValue::new(js)
        }
    };
    Ok(value)
}

/// Flatten a Boa error into the bridge's foreign error
pub fn foreign_error(err: JsError, context: &mut Context) -> ForeignError {
    if let Ok(native) = err.try_native(context) {
        return ForeignError::new(native_kind_name(&native.kind), native.message());
    }
    match err.as_opaque() {
        Some(value) => ForeignError::thrown(
            value
                .as_string()
                .map(|s| s.to_std_string_escaped())
                .unwrap_or_else(|| value.display().to_string()),
        ),
        None => ForeignError::thrown(err.to_string()),
    }
}

fn native_kind_name(kind: &JsNativeErrorKind) -> &'static str {
    match kind {
        JsNativeErrorKind::Type => "TypeError",
        JsNativeErrorKind::Range => "RangeError",
        JsNativeErrorKind::Reference => "ReferenceError",
        JsNativeErrorKind::Syntax => "SyntaxError",
        JsNativeErrorKind::Eval => "EvalError",
        JsNativeErrorKind::Uri => "URIError",
        _ => "Error",
    }
}
