//! Demo exports reachable from `ferry call` and from scripts via `Ferry`.

use ferry_core::{
    Bridge, BridgeError, BridgeResult, CustomMarshaler, RawValue, Signature, TypeKey, TypeTag,
    Value,
};

/// Assembly and type every demo export lives under
pub const EXPORT_TYPE: &str = "[MicroBenchmarks] BP.BenchmarkExports";

pub fn qualified(method: &str) -> String {
    format!("{EXPORT_TYPE}:{method}")
}

pub struct BenchmarkTestStruct {
    pub i: i32,
}

pub struct BenchmarkTestStructMarshaler;

impl CustomMarshaler for BenchmarkTestStructMarshaler {
    type Target = BenchmarkTestStruct;

    fn from_foreign(raw: RawValue) -> BridgeResult<BenchmarkTestStruct> {
        match raw {
            RawValue::Int32(i) => Ok(BenchmarkTestStruct { i }),
            other => Err(BridgeError::mismatch(TypeTag::Int32, other.type_name())),
        }
    }

    fn to_foreign(value: &BenchmarkTestStruct) -> BridgeResult<RawValue> {
        Ok(RawValue::Int32(value.i))
    }
}

/// Carries a double that is nudged on the way in and truncated on the way out
pub struct BenchmarkTestStructWithFilter {
    pub d: f64,
}

pub struct BenchmarkTestStructWithFilterMarshaler;

impl CustomMarshaler for BenchmarkTestStructWithFilterMarshaler {
    type Target = BenchmarkTestStructWithFilter;

    fn from_foreign(raw: RawValue) -> BridgeResult<BenchmarkTestStructWithFilter> {
        raw.as_f64()
            .map(|d| BenchmarkTestStructWithFilter { d })
            .ok_or_else(|| BridgeError::mismatch(TypeTag::Float64, raw.type_name()))
    }

    fn to_foreign(value: &BenchmarkTestStructWithFilter) -> BridgeResult<RawValue> {
        Ok(RawValue::Float64(value.d))
    }

    fn pre_filter() -> Option<&'static str> {
        Some("return (value + 0.1)")
    }

    fn post_filter() -> Option<&'static str> {
        Some("return (value | 0)")
    }
}

/// Reference-type counterpart of [`BenchmarkTestStructWithFilter`]. An
/// export that returns its argument hands back the same shared instance.
pub struct BenchmarkTestClassWithFilter {
    pub d: f64,
}

pub struct BenchmarkTestClassWithFilterMarshaler;

impl CustomMarshaler for BenchmarkTestClassWithFilterMarshaler {
    type Target = BenchmarkTestClassWithFilter;

    fn from_foreign(raw: RawValue) -> BridgeResult<BenchmarkTestClassWithFilter> {
        raw.as_f64()
            .map(|d| BenchmarkTestClassWithFilter { d })
            .ok_or_else(|| BridgeError::mismatch(TypeTag::Float64, raw.type_name()))
    }

    fn to_foreign(value: &BenchmarkTestClassWithFilter) -> BridgeResult<RawValue> {
        Ok(RawValue::Float64(value.d))
    }

    fn pre_filter() -> Option<&'static str> {
        Some("return (value + 0.1)")
    }

    fn post_filter() -> Option<&'static str> {
        Some("return (value | 0)")
    }
}

fn custom<T: 'static>() -> TypeTag {
    TypeTag::Custom(TypeKey::of::<T>())
}

fn signature(text: &str, result: TypeTag) -> BridgeResult<Signature> {
    Ok(Signature::parse(text)?.with_result(result))
}

/// Register the demo marshalers and exports on `bridge`
pub fn install(bridge: &Bridge) -> BridgeResult<()> {
    let exports = bridge
        .exports()
        .ok_or_else(|| BridgeError::managed("bridge has no export table"))?;

    bridge.register_marshaler::<BenchmarkTestStructMarshaler>()?;
    bridge.register_marshaler::<BenchmarkTestStructWithFilterMarshaler>()?;
    bridge.register_marshaler::<BenchmarkTestClassWithFilterMarshaler>()?;

    exports.export(&qualified("VoidAction"), Signature::empty(), |_| Ok(Value::Void))?;
    exports.export(
        &qualified("Sum"),
        signature("ii", TypeTag::Int32)?,
        |args| {
            let sum = args[0].expect_i32()?.wrapping_add(args[1].expect_i32()?);
            Ok(Value::Int32(sum))
        },
    )?;
    exports.export(
        &qualified("ConcatString"),
        signature("ss", TypeTag::String)?,
        |args| Ok(Value::String(format!("{}{}", args[0].expect_str()?, args[1].expect_str()?))),
    )?;
    exports.export(
        &qualified("ReturnString"),
        signature("s", TypeTag::String)?,
        |args| Ok(args[0].clone()),
    )?;
    exports.export(
        &qualified("ReturnDouble"),
        signature("d", TypeTag::Float64)?,
        |args| Ok(Value::Float64(args[0].expect_f64()?)),
    )?;

    let plain = custom::<BenchmarkTestStruct>();
    let filtered = custom::<BenchmarkTestStructWithFilter>();
    let plain_key = TypeKey::of::<BenchmarkTestStruct>();
    let filtered_key = TypeKey::of::<BenchmarkTestStructWithFilter>();

    exports.export(
        &qualified("AcceptCustomStruct"),
        Signature::new(vec![plain.clone()], TypeTag::Void),
        move |args| {
            args[0].expect_custom::<BenchmarkTestStruct>(&plain_key)?;
            Ok(Value::Void)
        },
    )?;
    exports.export(
        &qualified("AcceptCustomStructWithFilter"),
        Signature::new(vec![filtered.clone()], TypeTag::Void),
        move |args| {
            args[0].expect_custom::<BenchmarkTestStructWithFilter>(&filtered_key)?;
            Ok(Value::Void)
        },
    )?;
    exports.export(
        &qualified("ReturnCustomStruct"),
        Signature::new(vec![plain.clone()], plain),
        |args| Ok(args[0].clone()),
    )?;
    exports.export(
        &qualified("ReturnCustomStructWithFilter"),
        Signature::new(vec![filtered.clone()], filtered),
        |args| Ok(args[0].clone()),
    )?;

    let class = custom::<BenchmarkTestClassWithFilter>();
    exports.export(
        &qualified("ReturnCustomClassWithFilter"),
        Signature::new(vec![class.clone()], class),
        |args| Ok(args[0].clone()),
    )?;

    Ok(())
}
