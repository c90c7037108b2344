//! Integration tests for the Bridge API against a scripted foreign engine

use ferry_core::{
    Bridge, BridgeConfig, BridgeError, BridgeResult, CustomMarshaler, ExportTable,
    ForeignEngine, ForeignError, InternId, MethodHandle, MethodTable, RawValue, Signature,
    StringInternTable, TypeKey, TypeTag, Value,
};
use serial_test::serial;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

const SUM: &str = "[MicroBenchmarks] BP.BenchmarkExports:Sum";
const RETURN_STRING: &str = "[MicroBenchmarks] BP.BenchmarkExports:ReturnString";

/// Foreign engine with a handful of canned behaviors
#[derive(Default)]
struct ScriptedEngine {
    /// Interned entries the foreign side has received
    known: HashMap<InternId, String>,
    calls: Vec<(String, Vec<RawValue>)>,
    filters: Vec<String>,
}

impl ScriptedEngine {
    fn resolve_name(&mut self, name: &RawValue) -> Result<String, ForeignError> {
        match name {
            RawValue::String(name) => Ok(name.clone()),
            RawValue::InternedCopy { id, content } => {
                self.known.insert(*id, content.clone());
                Ok(content.clone())
            }
            RawValue::InternedRef(id) => self
                .known
                .get(id)
                .cloned()
                .ok_or_else(|| ForeignError::new("ReferenceError", format!("unknown id {id}"))),
            other => Err(ForeignError::type_error(format!(
                "{} is not a function name",
                other.type_name()
            ))),
        }
    }
}

impl ForeignEngine for ScriptedEngine {
    fn evaluate(&mut self, source: &str) -> Result<Option<String>, ForeignError> {
        match source {
            "1 + 2" => Ok(Some("3".to_string())),
            "undefined" | "null" => Ok(None),
            s if s.contains("throw") => Err(ForeignError::thrown("what")),
            s => Ok(Some(s.to_string())),
        }
    }

    fn call_function(
        &mut self,
        name: &RawValue,
        args: Vec<RawValue>,
    ) -> Result<RawValue, ForeignError> {
        let name = self.resolve_name(name)?;
        self.calls.push((name.clone(), args.clone()));
        match name.as_str() {
            "perftest1arg" => Ok(RawValue::Undefined),
            "echo" => Ok(args.into_iter().next().unwrap_or_default()),
            other => Err(ForeignError::type_error(format!("{other} is not a function"))),
        }
    }

    fn apply_filter(&mut self, body: &str, value: RawValue) -> Result<RawValue, ForeignError> {
        self.filters.push(body.to_string());
        let n = value
            .as_f64()
            .ok_or_else(|| ForeignError::type_error("filter expects a number"))?;
        match body {
            "return (value + 0.1)" => Ok(RawValue::Float64(n + 0.1)),
            "return (value | 0)" => Ok(RawValue::Int32(n as i32)),
            other => Err(ForeignError::new("SyntaxError", other)),
        }
    }

    fn holds_interned(&self, id: InternId) -> bool {
        self.known.contains_key(&id)
    }
}

struct BenchmarkTestStruct {
    i: i32,
}

struct BenchmarkTestStructMarshaler;

impl CustomMarshaler for BenchmarkTestStructMarshaler {
    type Target = BenchmarkTestStruct;

    fn from_foreign(raw: RawValue) -> BridgeResult<BenchmarkTestStruct> {
        match raw {
            RawValue::Int32(i) => Ok(BenchmarkTestStruct { i }),
            other => Err(BridgeError::mismatch("int32", other.type_name())),
        }
    }

    fn to_foreign(value: &BenchmarkTestStruct) -> BridgeResult<RawValue> {
        Ok(RawValue::Int32(value.i))
    }
}

struct BenchmarkTestStructWithFilter {
    d: f64,
}

struct BenchmarkTestStructWithFilterMarshaler;

impl CustomMarshaler for BenchmarkTestStructWithFilterMarshaler {
    type Target = BenchmarkTestStructWithFilter;

    fn from_foreign(raw: RawValue) -> BridgeResult<BenchmarkTestStructWithFilter> {
        raw.as_f64()
            .map(|d| BenchmarkTestStructWithFilter { d })
            .ok_or_else(|| BridgeError::mismatch("float64", raw.type_name()))
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

fn custom(key: &TypeKey) -> TypeTag {
    TypeTag::Custom(key.clone())
}

fn bridge_with_exports(config: BridgeConfig) -> Bridge {
    let bridge = Bridge::builder().config(config).build();
    let exports = bridge.exports().unwrap();

    exports
        .export(
            SUM,
            Signature::parse("ii").unwrap().with_result(TypeTag::Int32),
            |args| Ok(Value::Int32(args[0].expect_i32()? + args[1].expect_i32()?)),
        )
        .unwrap();
    exports
        .export(
            RETURN_STRING,
            Signature::parse("s").unwrap().with_result(TypeTag::String),
            |args| Ok(args[0].clone()),
        )
        .unwrap();
    exports
        .export(
            "[MicroBenchmarks] BP.BenchmarkExports:Explode",
            Signature::empty(),
            |_| panic!("kaboom"),
        )
        .unwrap();

    let plain = TypeKey::of::<BenchmarkTestStruct>();
    let filtered = TypeKey::of::<BenchmarkTestStructWithFilter>();
    exports
        .export(
            "[MicroBenchmarks] BP.BenchmarkExports:AcceptCustomStruct",
            Signature::new(vec![custom(&plain)], TypeTag::Void),
            |_| Ok(Value::Void),
        )
        .unwrap();
    exports
        .export(
            "[MicroBenchmarks] BP.BenchmarkExports:ReturnCustomStruct",
            Signature::new(vec![custom(&plain)], custom(&plain)),
            |args| Ok(args[0].clone()),
        )
        .unwrap();
    exports
        .export(
            "[MicroBenchmarks] BP.BenchmarkExports:ReturnCustomStructWithFilter",
            Signature::new(vec![custom(&filtered)], custom(&filtered)),
            |args| Ok(args[0].clone()),
        )
        .unwrap();

    bridge
        .register_marshaler::<BenchmarkTestStructMarshaler>()
        .unwrap();
    bridge
        .register_marshaler::<BenchmarkTestStructWithFilterMarshaler>()
        .unwrap();
    bridge
}

#[test]
fn test_evaluate_numeric_result() {
    let bridge = Bridge::new();
    let mut engine = ScriptedEngine::default();

    let (text, code) = bridge.evaluate(&mut engine, "1 + 2").into_parts();
    assert_eq!(text, "3");
    assert_eq!(code, 0);
}

#[test]
fn test_evaluate_undefined_is_empty() {
    let bridge = Bridge::new();
    let mut engine = ScriptedEngine::default();

    let (text, code) = bridge.evaluate(&mut engine, "undefined").into_parts();
    assert_eq!(text, "");
    assert_eq!(code, 0);
}

#[test]
fn test_evaluate_throwing_expression() {
    let bridge = Bridge::new();
    let mut engine = ScriptedEngine::default();

    let result = bridge.evaluate(
        &mut engine,
        "if (globalThis['nonexistent'] === undefined) throw new Error('what')",
    );
    let (text, code) = result.into_parts();
    assert_ne!(code, 0);
    assert!(!text.is_empty());
    assert!(text.contains("what"));
    assert_eq!(bridge.stats().faults, 1);
}

#[test]
fn test_call_sum() {
    let bridge = bridge_with_exports(BridgeConfig::default());
    let mut engine = ScriptedEngine::default();

    let result = bridge.call(
        &mut engine,
        SUM,
        "ii",
        vec![RawValue::Int32(1), RawValue::Int32(2)],
    );
    assert_eq!(result.code(), 0);
    assert_eq!(result.value(), Some(&RawValue::Int32(3)));
}

#[test]
fn test_sum_accepts_integral_floats() {
    let bridge = bridge_with_exports(BridgeConfig::default());
    let mut engine = ScriptedEngine::default();
    let bound = bridge.bind(SUM, "ii").unwrap();

    let result = bridge.invoke(
        &mut engine,
        &bound,
        vec![RawValue::Float64(1.0), RawValue::Float64(2.0)],
    );
    assert_eq!(result.into_result().unwrap(), RawValue::Int32(3));
}

#[test]
fn test_arity_mismatch_marshals_nothing() {
    let bridge = bridge_with_exports(BridgeConfig::default());
    let mut engine = ScriptedEngine::default();
    let bound = bridge.bind(SUM, "ii").unwrap();

    let result = bridge.invoke(
        &mut engine,
        &bound,
        vec![RawValue::Int32(1), RawValue::Int32(2), RawValue::Int32(3)],
    );
    assert_eq!(result.code(), 5);
    assert!(result.diagnostic().unwrap().contains("expected 2 arguments, got 3"));
    assert_eq!(bridge.stats().marshal_calls, 0);
}

#[test]
fn test_type_mismatch_is_reported() {
    let bridge = bridge_with_exports(BridgeConfig::default());
    let mut engine = ScriptedEngine::default();

    let result = bridge.call(
        &mut engine,
        SUM,
        "ii",
        vec![RawValue::from("1"), RawValue::Int32(2)],
    );
    assert_eq!(result.code(), 6);
}

#[test]
fn test_method_not_found_then_exported() {
    let bridge = bridge_with_exports(BridgeConfig::default());
    let mut engine = ScriptedEngine::default();
    let name = "[MicroBenchmarks] BP.BenchmarkExports:VoidAction";

    let result = bridge.call(&mut engine, name, "", Vec::new());
    assert_eq!(result.code(), 4);

    bridge
        .exports()
        .unwrap()
        .export(name, Signature::empty(), |_| Ok(Value::Void))
        .unwrap();
    let result = bridge.call(&mut engine, name, "", Vec::new());
    assert_eq!(result.into_result().unwrap(), RawValue::Undefined);
}

#[test]
fn test_panicking_target_is_contained() {
    let bridge = bridge_with_exports(BridgeConfig::default());
    let mut engine = ScriptedEngine::default();

    let result = bridge.call(
        &mut engine,
        "[MicroBenchmarks] BP.BenchmarkExports:Explode",
        "",
        Vec::new(),
    );
    assert_eq!(result.code(), 2);
    assert!(result.diagnostic().unwrap().contains("kaboom"));
}

/// Method table that counts resolutions
struct CountingTable {
    inner: ExportTable,
    resolutions: AtomicUsize,
}

impl MethodTable for CountingTable {
    fn resolve(&self, name: &str) -> Option<MethodHandle> {
        self.resolutions.fetch_add(1, Ordering::SeqCst);
        self.inner.resolve(name)
    }
}

#[test]
fn test_binding_is_cached() {
    let table = Arc::new(CountingTable {
        inner: ExportTable::new(),
        resolutions: AtomicUsize::new(0),
    });
    table
        .inner
        .export(
            "Sum",
            Signature::parse("ii").unwrap().with_result(TypeTag::Int32),
            |args| Ok(Value::Int32(args[0].expect_i32()? + args[1].expect_i32()?)),
        )
        .unwrap();
    let bridge = Bridge::builder().method_table(table.clone()).build();
    assert!(bridge.exports().is_none());

    let first = bridge.bind("Sum", "ii").unwrap();
    let second = bridge.bind("Sum", "ii").unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(table.resolutions.load(Ordering::SeqCst), 1);

    let mut engine = ScriptedEngine::default();
    for _ in 0..3 {
        let result = bridge.call(
            &mut engine,
            "Sum",
            "ii",
            vec![RawValue::Int32(1), RawValue::Int32(2)],
        );
        assert_eq!(result.code(), 0);
    }
    assert_eq!(table.resolutions.load(Ordering::SeqCst), 1);

    bridge.binder().invalidate("Sum");
    bridge.bind("Sum", "ii").unwrap();
    assert_eq!(table.resolutions.load(Ordering::SeqCst), 2);
}

#[test]
fn test_interned_argument_reference_path() {
    let bridge = bridge_with_exports(BridgeConfig::default());
    let mut engine = ScriptedEngine::default();
    let literal = "string literal with embedded null \0\0 yey";

    // The foreign side interns the literal once and sends references afterwards
    let entry = bridge.interns().intern(literal);
    let first = bridge.call(
        &mut engine,
        RETURN_STRING,
        "S",
        vec![RawValue::InternedCopy {
            id: entry.id(),
            content: literal.to_string(),
        }],
    );
    assert_eq!(first.value(), Some(&RawValue::from(literal)));
    assert_eq!(bridge.stats().interned_refs, 0);

    let second = bridge.call(
        &mut engine,
        RETURN_STRING,
        "S",
        vec![RawValue::InternedRef(entry.id())],
    );
    assert_eq!(second.value(), Some(&RawValue::from(literal)));
    assert_eq!(bridge.stats().interned_refs, 1);

    for content in ["different \0\0 hmm", "different \0\0 wow"] {
        let result = bridge.call(
            &mut engine,
            RETURN_STRING,
            "S",
            vec![RawValue::from(content)],
        );
        assert_eq!(result.code(), 0);
    }
    assert_eq!(bridge.stats().interned_refs, 1);
}

#[test]
fn test_stale_interned_reference_faults() {
    let bridge = bridge_with_exports(BridgeConfig::default());
    let mut engine = ScriptedEngine::default();

    let result = bridge.call(
        &mut engine,
        RETURN_STRING,
        "S",
        vec![RawValue::InternedRef(InternId::new(9999))],
    );
    assert_eq!(result.code(), 9);
}

#[test]
fn test_invoke_foreign_interns_function_name() {
    let bridge = Bridge::new();
    let mut engine = ScriptedEngine::default();
    let signature = Signature::parse("i").unwrap();

    for _ in 0..2 {
        let result =
            bridge.invoke_foreign(&mut engine, "perftest1arg", &signature, &[Value::Int32(7)]);
        assert_eq!(result.code(), 0);
    }

    assert!(matches!(engine.calls[0].1[0], RawValue::Int32(7)));
    let stats = bridge.stats();
    assert_eq!(stats.interned_copies, 1);
    assert_eq!(stats.interned_refs, 1);
}

#[test]
fn test_engines_on_one_bridge_get_their_own_copies() {
    let bridge = Bridge::new();
    let signature = Signature::parse("i").unwrap();
    let mut first = ScriptedEngine::default();
    let mut second = ScriptedEngine::default();

    for _ in 0..2 {
        for engine in [&mut first, &mut second] {
            let result =
                bridge.invoke_foreign(engine, "perftest1arg", &signature, &[Value::Int32(7)]);
            assert_eq!(result.code(), 0, "{:?}", result.diagnostic());
        }
    }

    assert_eq!(first.calls.len(), 2);
    assert_eq!(second.calls.len(), 2);
    let stats = bridge.stats();
    assert_eq!(stats.interned_copies, 2);
    assert_eq!(stats.interned_refs, 2);
}

#[test]
#[serial]
fn test_engines_on_global_table_get_their_own_copies() {
    let global = StringInternTable::global();
    global.clear();

    let signature = Signature::parse("i").unwrap();
    let first_bridge = Bridge::builder().interns(global.clone()).build();
    let second_bridge = Bridge::builder().interns(global.clone()).build();
    let mut first = ScriptedEngine::default();
    let mut second = ScriptedEngine::default();

    let result =
        first_bridge.invoke_foreign(&mut first, "perftest1arg", &signature, &[Value::Int32(1)]);
    assert_eq!(result.code(), 0);
    let result =
        second_bridge.invoke_foreign(&mut second, "perftest1arg", &signature, &[Value::Int32(2)]);
    assert_eq!(result.code(), 0, "{:?}", result.diagnostic());
    assert_eq!(second_bridge.stats().interned_refs, 0);

    global.clear();
}

#[test]
fn test_invoke_foreign_reports_foreign_errors() {
    let bridge = Bridge::new();
    let mut engine = ScriptedEngine::default();

    let result = bridge.invoke_foreign(&mut engine, "missing", &Signature::empty(), &[]);
    assert_eq!(result.code(), 1);
    assert_eq!(
        result.diagnostic(),
        Some("TypeError: missing is not a function")
    );
}

#[test]
fn test_invoke_foreign_result_tag() {
    let bridge = Bridge::new();
    let mut engine = ScriptedEngine::default();
    let signature = Signature::parse("d").unwrap().with_result(TypeTag::Float64);

    let result = bridge.invoke_foreign(&mut engine, "echo", &signature, &[Value::Int32(4)]);
    assert_eq!(result.into_result().unwrap(), Value::Float64(4.0));
}

#[test]
fn test_custom_struct_without_filter() {
    let bridge = bridge_with_exports(BridgeConfig::default());
    let mut engine = ScriptedEngine::default();

    let accepted = bridge.call(
        &mut engine,
        "[MicroBenchmarks] BP.BenchmarkExports:AcceptCustomStruct",
        "a",
        vec![RawValue::Int32(1234)],
    );
    assert_eq!(accepted.into_result().unwrap(), RawValue::Undefined);

    let returned = bridge.call(
        &mut engine,
        "[MicroBenchmarks] BP.BenchmarkExports:ReturnCustomStruct",
        "a",
        vec![RawValue::Int32(1234)],
    );
    assert_eq!(returned.into_result().unwrap(), RawValue::Int32(1234));
    assert!(engine.filters.is_empty());
}

#[test]
fn test_custom_struct_with_filters() {
    let bridge = bridge_with_exports(BridgeConfig::default());
    let mut engine = ScriptedEngine::default();

    let result = bridge.call(
        &mut engine,
        "[MicroBenchmarks] BP.BenchmarkExports:ReturnCustomStructWithFilter",
        "a",
        vec![RawValue::Float64(2345.678)],
    );
    // (2345.678 + 0.1) | 0
    assert_eq!(result.into_result().unwrap(), RawValue::Int32(2345));
    assert_eq!(
        engine.filters,
        vec!["return (value + 0.1)", "return (value | 0)"]
    );
}

#[test]
fn test_unstabilized_auto_infers_from_arguments() {
    let bridge = bridge_with_exports(BridgeConfig::conservative());
    let mut engine = ScriptedEngine::default();

    let result = bridge.call(
        &mut engine,
        "[MicroBenchmarks] BP.BenchmarkExports:ReturnString",
        "a",
        vec![RawValue::from("zow")],
    );
    assert_eq!(result.into_result().unwrap(), RawValue::from("zow"));
    assert_eq!(bridge.stats().interned_refs, 0);
}

#[test]
#[serial]
fn test_global_intern_table_is_shared() {
    let global = StringInternTable::global();
    global.clear();

    let first = Bridge::builder().interns(global.clone()).build();
    let second = Bridge::builder().interns(StringInternTable::global()).build();

    let entry = first.interns().intern("perftest1arg2");
    let found = second.interns().lookup("perftest1arg2").unwrap();
    assert_eq!(entry, found);

    global.clear();
    assert!(second.interns().is_empty());
}

#[test]
#[serial]
fn test_global_intern_table_survives_bridge_drop() {
    let global = StringInternTable::global();
    global.clear();

    {
        let bridge = Bridge::builder().interns(global.clone()).build();
        bridge.interns().intern("kept");
    }
    assert!(global.lookup("kept").is_some());

    global.clear();
}
