//! The global `Ferry` object scripts use to reach managed exports.
//!
//! - `Ferry.callStaticMethod(name, args, signature)` binds (cached) and calls
//! - `Ferry.bindStaticMethod(name, signature)` returns a function for repeated calls
//!
//! A faulted call is rethrown as an `Error` whose message carries the
//! diagnostic and the exception code. Arity is checked against the bound
//! signature before any argument is converted, so a rejected call never runs
//! `toString` on its arguments or touches the intern table.

use std::sync::Arc;

use boa_engine::native_function::NativeFunction;
use boa_engine::object::builtins::JsArray;
use boa_engine::object::{FunctionObjectBuilder, JsObject};
use boa_engine::property::Attribute;
use boa_engine::{Context, JsError, JsNativeError, JsResult, JsString, JsValue, js_string};
use ferry_core::{BoundMethod, Bridge, CallResult, Fault, RawValue};
use tracing::debug;

use crate::convert::{SharedStrings, from_js, to_js};
use crate::engine::ContextEngine;

pub const GLOBAL_NAME: &str = "Ferry";

pub(crate) fn install(
    context: &mut Context,
    bridge: &Bridge,
    strings: &SharedStrings,
) -> JsResult<()> {
    let ferry = JsObject::with_object_proto(context.intrinsics());

    let call = call_static_method(context, bridge.clone(), strings.clone());
    ferry.set(js_string!("callStaticMethod"), call, false, context)?;

    let bind = bind_static_method(context, bridge.clone(), strings.clone());
    ferry.set(js_string!("bindStaticMethod"), bind, false, context)?;

    context.register_global_property(JsString::from(GLOBAL_NAME), ferry, Attribute::all())?;
    debug!("Installed {} global", GLOBAL_NAME);
    Ok(())
}

fn call_static_method(context: &mut Context, bridge: Bridge, strings: SharedStrings) -> JsValue {
    // SAFETY: the closure captures a `Bridge` (plain `Arc`s) and the foreign
    // string map, whose `JsString`s are reference counted outside the GC heap.
    // Neither holds a traced GC pointer.
    let native = unsafe {
        NativeFunction::from_closure(move |_this, args, context| {
            let name = string_arg(args, 0, "method name")?;
            let signature_text = optional_string_arg(args, 2, "signature")?;
            let values = array_arg(args.get(1), context)?;

            let bound = bridge
                .bind(&name, &signature_text)
                .and_then(|bound| bound.check_arity(values.len()).map(|()| bound))
                .map_err(|err| throw(bridge.reject(&name, &err)))?;
            dispatch(&bound, &values, &bridge, &strings, context)
        })
    };

    FunctionObjectBuilder::new(context.realm(), native)
        .name(js_string!("callStaticMethod"))
        .length(3)
        .build()
        .into()
}

fn bind_static_method(context: &mut Context, bridge: Bridge, strings: SharedStrings) -> JsValue {
    // SAFETY: as for `callStaticMethod`, the captures hold no GC pointers.
    let native = unsafe {
        NativeFunction::from_closure(move |_this, args, context| {
            let name = string_arg(args, 0, "method name")?;
            let signature_text = optional_string_arg(args, 1, "signature")?;
            let bound = bridge
                .bind(&name, &signature_text)
                .map_err(|err| throw(Fault::from(&err)))?;
            Ok(bound_function(context, bound, bridge.clone(), strings.clone()))
        })
    };

    FunctionObjectBuilder::new(context.realm(), native)
        .name(js_string!("bindStaticMethod"))
        .length(2)
        .build()
        .into()
}

fn bound_function(
    context: &mut Context,
    bound: Arc<BoundMethod>,
    bridge: Bridge,
    strings: SharedStrings,
) -> JsValue {
    let name = JsString::from(bound.name());
    let arity = bound.signature().arity();

    // SAFETY: the bound method is an `Arc` of managed data; see
    // `callStaticMethod` for the other captures.
    let native = unsafe {
        NativeFunction::from_closure(move |_this, args, context| {
            bound
                .check_arity(args.len())
                .map_err(|err| throw(bridge.reject(bound.name(), &err)))?;
            dispatch(&bound, args, &bridge, &strings, context)
        })
    };

    FunctionObjectBuilder::new(context.realm(), native)
        .name(name)
        .length(arity)
        .build()
        .into()
}

/// Convert `values` by the bound signature and invoke. Arity is already
/// checked.
fn dispatch(
    bound: &BoundMethod,
    values: &[JsValue],
    bridge: &Bridge,
    strings: &SharedStrings,
    context: &mut Context,
) -> JsResult<JsValue> {
    let signature = bound.signature();
    let raws = values
        .iter()
        .enumerate()
        .map(|(index, value)| {
            from_js(value, signature.param(index), strings, bridge.interns(), context)
        })
        .collect::<JsResult<Vec<_>>>()?;

    let mut engine = ContextEngine {
        context,
        strings,
        interns: bridge.interns(),
    };
    let result = bridge.invoke(&mut engine, bound, raws);
    complete(result, strings)
}

fn complete(result: CallResult<RawValue>, strings: &SharedStrings) -> JsResult<JsValue> {
    match result.into_result() {
        Ok(raw) => to_js(raw, strings)
            .map_err(|err| JsError::from(JsNativeError::typ().with_message(err.to_string()))),
        Err(fault) => Err(throw(fault).into()),
    }
}

fn throw(fault: Fault) -> JsNativeError {
    JsNativeError::error().with_message(fault.to_string())
}

fn string_arg(args: &[JsValue], index: usize, what: &str) -> JsResult<String> {
    args.get(index)
        .and_then(|v| v.as_string().and_then(|s| s.to_std_string().ok()))
        .ok_or_else(|| {
            JsNativeError::typ()
                .with_message(format!("{what} must be a string"))
                .into()
        })
}

/// String argument where `undefined` means empty
fn optional_string_arg(args: &[JsValue], index: usize, what: &str) -> JsResult<String> {
    match args.get(index) {
        None => Ok(String::new()),
        Some(value) if value.is_undefined() => Ok(String::new()),
        Some(_) => string_arg(args, index, what),
    }
}

fn array_arg(value: Option<&JsValue>, context: &mut Context) -> JsResult<Vec<JsValue>> {
    let Some(value) = value.filter(|v| !v.is_undefined() && !v.is_null()) else {
        return Ok(Vec::new());
    };
    let object = value.as_object().map(|o| o.clone()).ok_or_else(|| {
        JsNativeError::typ().with_message("arguments must be an array")
    })?;
    let array = JsArray::from_object(object)?;
    let length = usize::try_from(array.length(context)?)
        .map_err(|_| JsNativeError::range().with_message("arguments array is too long"))?;

    let mut values = Vec::with_capacity(length);
    for index in 0..length {
        values.push(array.get(index, context)?);
    }
    Ok(values)
}
