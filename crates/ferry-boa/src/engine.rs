//! Boa as the bridge's foreign engine

use std::cell::{Ref, RefCell};
use std::rc::Rc;

use boa_engine::object::JsObject;
use boa_engine::property::Attribute;
use boa_engine::{Context, JsResult, JsString, JsValue, Source};
use ferry_core::{
    Bridge, CallResult, ForeignEngine, ForeignError, InternId, RawValue, Signature,
    StringInternTable, TypeTag, Value,
};
use tracing::debug;

use crate::api;
use crate::convert::{ForeignStrings, SharedStrings, foreign_error, from_js, to_js};

/// Hidden global holding compiled filter functions, keyed by body text
const FILTER_CACHE: &str = "__ferryFilters";

/// A Boa context wired to a [`Bridge`].
///
/// Installs the global `Ferry` object on creation. The engine is `!Send`:
/// Boa contexts belong to the thread that created them.
pub struct BoaEngine {
    context: Context,
    bridge: Bridge,
    strings: SharedStrings,
}

impl BoaEngine {
    pub fn new(bridge: Bridge) -> Result<Self, ForeignError> {
        let mut context = Context::default();
        let strings: SharedStrings = Rc::new(RefCell::new(ForeignStrings::new()));

        if let Err(err) = install_globals(&mut context, &bridge, &strings) {
            return Err(foreign_error(err, &mut context));
        }

        debug!("Boa engine ready");
        Ok(Self {
            context,
            bridge,
            strings,
        })
    }

    pub fn bridge(&self) -> &Bridge {
        &self.bridge
    }

    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.context
    }

    /// Interned strings this engine holds
    pub fn strings(&self) -> Ref<'_, ForeignStrings> {
        self.strings.borrow()
    }

    /// Evaluate `source` through the bridge's exception-signaling protocol
    pub fn eval(&mut self, source: &str) -> CallResult<String> {
        let bridge = self.bridge.clone();
        bridge.evaluate(self, source)
    }

    /// Call the global function `function` with managed arguments
    pub fn invoke_foreign(
        &mut self,
        function: &str,
        signature: &Signature,
        args: &[Value],
    ) -> CallResult<Value> {
        let bridge = self.bridge.clone();
        bridge.invoke_foreign(self, function, signature, args)
    }

    fn scope(&mut self) -> ContextEngine<'_> {
        ContextEngine {
            context: &mut self.context,
            strings: &self.strings,
            interns: self.bridge.interns(),
        }
    }
}

impl ForeignEngine for BoaEngine {
    fn evaluate(&mut self, source: &str) -> Result<Option<String>, ForeignError> {
        self.scope().evaluate(source)
    }

    fn call_function(
        &mut self,
        name: &RawValue,
        args: Vec<RawValue>,
    ) -> Result<RawValue, ForeignError> {
        self.scope().call_function(name, args)
    }

    fn apply_filter(&mut self, body: &str, value: RawValue) -> Result<RawValue, ForeignError> {
        self.scope().apply_filter(body, value)
    }

    fn holds_interned(&self, id: InternId) -> bool {
        self.strings.borrow().contains(id)
    }
}

fn install_globals(
    context: &mut Context,
    bridge: &Bridge,
    strings: &SharedStrings,
) -> JsResult<()> {
    context.register_global_property(
        JsString::from(FILTER_CACHE),
        JsObject::with_null_proto(),
        Attribute::empty(),
    )?;
    api::install(context, bridge, strings)
}

/// Borrowed view of a Boa context used while a call is in flight, including
/// from inside native functions that only hold `&mut Context`.
pub(crate) struct ContextEngine<'a> {
    pub(crate) context: &'a mut Context,
    pub(crate) strings: &'a RefCell<ForeignStrings>,
    pub(crate) interns: &'a StringInternTable,
}

impl ContextEngine<'_> {
    fn function_name(&self, name: &RawValue) -> Result<JsString, ForeignError> {
        match name {
            RawValue::String(s) => Ok(JsString::from(s.as_str())),
            RawValue::InternedCopy { .. } | RawValue::InternedRef(_) => {
                let value = to_js(name.clone(), self.strings)?;
                value
                    .as_string()
                    .map(|s| s.clone())
                    .ok_or_else(|| ForeignError::type_error("function name is not a string"))
            }
            other => Err(ForeignError::type_error(format!(
                "{} is not a function name",
                other.type_name()
            ))),
        }
    }

    fn filter_function(&mut self, body: &str) -> Result<JsObject, ForeignError> {
        let global = self.context.global_object();
        let cache = global
            .get(JsString::from(FILTER_CACHE), self.context)
            .map_err(|e| foreign_error(e, self.context))?;
        let cache = cache
            .as_object()
            .map(|o| o.clone())
            .ok_or_else(|| ForeignError::type_error(format!("{FILTER_CACHE} is missing")))?;

        let key = JsString::from(body);
        let cached = cache
            .get(key.clone(), self.context)
            .map_err(|e| foreign_error(e, self.context))?;
        if let Some(function) = cached.as_object().filter(|o| o.is_callable()) {
            return Ok(function.clone());
        }

        let source = format!("(function (value) {{ {body} }})");
        let compiled = self
            .context
            .eval(Source::from_bytes(&source))
            .map_err(|e| foreign_error(e, self.context))?;
        let function = compiled
            .as_object()
            .filter(|o| o.is_callable())
            .map(|o| o.clone())
            .ok_or_else(|| ForeignError::type_error(format!("filter is not a function: {body}")))?;

        cache
            .set(key, function.clone(), false, self.context)
            .map_err(|e| foreign_error(e, self.context))?;
        debug!(body, "Compiled marshaling filter");
        Ok(function)
    }

    fn to_raw(&mut self, value: &JsValue) -> Result<RawValue, ForeignError> {
        from_js(value, &TypeTag::Auto, self.strings, self.interns, self.context)
            .map_err(|e| foreign_error(e, self.context))
    }
}

impl ForeignEngine for ContextEngine<'_> {
    fn evaluate(&mut self, source: &str) -> Result<Option<String>, ForeignError> {
        let value = self
            .context
            .eval(Source::from_bytes(source))
            .map_err(|e| foreign_error(e, self.context))?;
        if value.is_undefined() || value.is_null() {
            return Ok(None);
        }
        let text = value
            .to_string(self.context)
            .map_err(|e| foreign_error(e, self.context))?;
        Ok(Some(text.to_std_string_escaped()))
    }

    fn call_function(
        &mut self,
        name: &RawValue,
        args: Vec<RawValue>,
    ) -> Result<RawValue, ForeignError> {
        let name = self.function_name(name)?;
        let global = self.context.global_object();
        let value = global
            .get(name.clone(), self.context)
            .map_err(|e| foreign_error(e, self.context))?;
        let function = value
            .as_object()
            .filter(|o| o.is_callable())
            .map(|o| o.clone())
            .ok_or_else(|| {
                ForeignError::type_error(format!(
                    "{} is not a function",
                    name.to_std_string_escaped()
                ))
            })?;

        let args = args
            .into_iter()
            .map(|raw| to_js(raw, self.strings))
            .collect::<Result<Vec<_>, _>>()?;
        let result = function
            .call(&JsValue::undefined(), &args, self.context)
            .map_err(|e| foreign_error(e, self.context))?;
        self.to_raw(&result)
    }

    fn apply_filter(&mut self, body: &str, value: RawValue) -> Result<RawValue, ForeignError> {
        let function = self.filter_function(body)?;
        let arg = to_js(value, self.strings)?;
        let result = function
            .call(&JsValue::undefined(), &[arg], self.context)
            .map_err(|e| foreign_error(e, self.context))?;
        self.to_raw(&result)
    }

    fn holds_interned(&self, id: InternId) -> bool {
        self.strings.borrow().contains(id)
    }
}
