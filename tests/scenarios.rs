//! End-to-end behavior of the `Jexl` façade: pragmas, scoping, safe
//! navigation, antish names, and the other container/option interactions
//! a host actually exercises through `create_script`/`create_expression`
//! rather than the interpreter's own unit-level tests.

use jexl::context::{Context, MapContext};
use jexl::options::JexlOptions;
use jexl::uberspect::{CustomResolver, DefaultUberspect};
use jexl::value::Value;
use jexl::{Jexl, JexlBuilder};
use serial_test::serial;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

fn run_expr(source: &str) -> Value {
    let engine = Jexl::new();
    let ctx = MapContext::new();
    engine.create_expression("t", source).unwrap().execute(ctx).unwrap()
}

/// A host class configured through `jexl.namespace.<prefix>`, exposed as a
/// `Foreign` value whose methods a `CustomResolver` knows how to invoke.
#[derive(Debug)]
struct Sleeper;

impl jexl::value::Foreign for Sleeper {
    fn type_name(&self) -> &'static str {
        "Sleeper"
    }
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

struct SleeperResolver;

impl CustomResolver for SleeperResolver {
    fn get_property(&self, _target: &Value, _name: &str) -> Option<Value> {
        None
    }
    fn set_property(&self, _target: &Value, _name: &str, _value: Value) -> bool {
        false
    }
    fn invoke_method(&self, target: &Value, name: &str, _args: &[Value]) -> Option<Value> {
        match (target, name) {
            (Value::Foreign(f), "sleep") if f.type_name() == "Sleeper" => Some(Value::Null),
            _ => None,
        }
    }
    fn construct(&self, _class_name: &str, _args: &[Value]) -> Option<Value> {
        None
    }
}

/// A context that resolves the `sleeper` namespace pragma to the configured
/// `Sleeper` host object, delegating everything else to a `MapContext`.
struct NamespaceContext {
    inner: Rc<dyn Context>,
}

impl Context for NamespaceContext {
    fn get(&self, name: &str) -> Option<Value> {
        self.inner.get(name)
    }
    fn set(&self, name: &str, value: Value) {
        self.inner.set(name, value)
    }
    fn resolve_namespace(&self, prefix: &str) -> Option<Value> {
        (prefix == "sleeper").then(|| Value::Foreign(Rc::new(Sleeper)))
    }
}

#[test]
fn namespace_prefixed_call_dispatches_through_the_configured_host_class() {
    let engine = JexlBuilder::new()
        .uberspect(DefaultUberspect { custom: vec![Box::new(SleeperResolver)], ..DefaultUberspect::default() })
        .build();
    let ctx: Rc<dyn Context> = Rc::new(NamespaceContext { inner: MapContext::new() });
    let v = engine
        .create_script("t", "#pragma jexl.namespace.sleeper com.host.Sleeper\nsleeper:sleep(100);42", &[])
        .unwrap()
        .execute(ctx, &[])
        .unwrap();
    assert!(matches!(v, Value::Int(42)));
}

#[test]
fn for_loop_accumulates_over_a_range() {
    let v = run_script("var total = 0; for (var i = 0; i < 5; i = i + 1) { total = total + i; } total");
    assert!(matches!(v, Value::Int(10)));
}

fn run_script(source: &str) -> Value {
    let engine = Jexl::new();
    let ctx = MapContext::new();
    engine.create_script("t", source, &[]).unwrap().execute(ctx, &[]).unwrap()
}

#[test]
fn while_and_lambda_compose() {
    let v = run_script("let square = x -> { x * x }; var i = 0; var sum = 0; while (i < 4) { sum = sum + square(i); i = i + 1; } sum");
    // 0 + 1 + 4 + 9 = 14
    assert!(matches!(v, Value::Int(14)));
}

#[test]
fn ternary_and_elvis_chain() {
    assert!(matches!(run_expr("(2 > 1) ? 'yes' : 'no'"), Value::Str(s) if &*s == "yes"));
    assert!(matches!(run_expr("null ?: 'default'"), Value::Str(s) if &*s == "default"));
}

#[test]
fn const_reassignment_is_rejected() {
    let engine = Jexl::new();
    let ctx = MapContext::new();
    let err = engine
        .create_script("t", "const x = 1; x = 2; x", &[])
        .unwrap()
        .execute(ctx, &[])
        .unwrap_err();
    assert!(err.to_string().contains("const"));
}

#[test]
fn strict_pragma_downgrades_undefined_variable_to_null() {
    let engine = Jexl::new();
    let ctx = MapContext::new();
    let result = engine
        .create_script("t", "#pragma jexl.strict false\nundeclaredThing", &[])
        .unwrap()
        .execute(ctx, &[])
        .unwrap();
    assert!(matches!(result, Value::Null));
}

#[test]
fn strict_default_rejects_undefined_variable() {
    let engine = Jexl::new();
    let ctx = MapContext::new();
    assert!(engine
        .create_script("t", "undeclaredThing", &[])
        .unwrap()
        .execute(ctx, &[])
        .is_err());
}

#[test]
fn safe_navigation_short_circuits_through_a_chain() {
    let v = run_expr("null?.b?.c");
    assert!(matches!(v, Value::Null));
}

#[test]
fn null_is_a_usable_map_key() {
    let v = run_script("var m = {}; m[null] = 42; m[null]");
    assert!(matches!(v, Value::Int(42)));
}

#[test]
fn antish_dotted_name_round_trips_through_the_context() {
    let ctx = MapContext::new();
    ctx.set("request.user.name", Value::str("ada"));
    let engine = Jexl::new();
    let v = engine.create_expression("t", "request.user.name").unwrap().execute(ctx).unwrap();
    assert!(matches!(v, Value::Str(s) if &*s == "ada"));
}

#[test]
fn multi_assign_destructures_an_array_positionally() {
    let engine = Jexl::new();
    let ctx = MapContext::new();
    ctx.set("x", Value::Int(10));
    ctx.set("y", Value::Int(20));
    engine
        .create_script("t", "(x, y) = [40, 2, 6]", &[])
        .unwrap()
        .execute(ctx.clone(), &[])
        .unwrap();
    assert!(matches!(ctx.get("x"), Some(Value::Int(40))));
    assert!(matches!(ctx.get("y"), Some(Value::Int(2))));
}

#[test]
fn multi_assign_overflow_ignores_extra_elements_and_returns_the_last_target() {
    let engine = Jexl::new();
    let ctx = MapContext::new();
    let v = engine
        .create_script("t", "(x, y) = [40, 2, 1]", &[])
        .unwrap()
        .execute(ctx, &[])
        .unwrap();
    assert!(matches!(v, Value::Int(2)));
}

#[test]
fn multi_assign_underflow_leaves_missing_targets_null() {
    let engine = Jexl::new();
    let ctx = MapContext::new();
    engine
        .create_script("t", "(x, y, z) = [40, 2]", &[])
        .unwrap()
        .execute(ctx.clone(), &[])
        .unwrap();
    assert!(matches!(ctx.get("z"), Some(Value::Null)));
}

#[test]
fn compare_is_consistent_across_mixed_numeric_types() {
    assert!(matches!(run_expr("1 == 1.0"), Value::Bool(true)));
    assert!(matches!(run_expr("1 < 1.5"), Value::Bool(true)));
}

#[test]
fn matches_operator_works_across_container_shapes() {
    assert!(matches!(run_expr("'abc' =~ '^a'"), Value::Bool(true)));
    assert!(matches!(run_expr("3 =~ [1, 2, 3]"), Value::Bool(true)));
    assert!(matches!(run_expr("'b' =~ {'a': 1, 'b': 2}"), Value::Bool(true)));
}

/// Records warnings through the `log` facade, per the composed-options
/// silent mode: an annotation with no processor installed logs a warning
/// instead of erroring.
struct RecordingLogger {
    warnings: Arc<Mutex<usize>>,
}

impl log::Log for RecordingLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        if record.level() == log::Level::Warn {
            *self.warnings.lock().unwrap() += 1;
        }
    }

    fn flush(&self) {}
}

#[test]
#[serial]
fn silent_annotation_without_a_processor_logs_a_warning_instead_of_erroring() {
    let warnings = Arc::new(Mutex::new(0));
    let logger = RecordingLogger { warnings: Arc::clone(&warnings) };
    // `set_boxed_logger` only succeeds once per process; `serial` keeps this
    // test from racing any other test that wants to install a logger.
    let _ = log::set_boxed_logger(Box::new(logger)).map(|()| log::set_max_level(log::LevelFilter::Warn));

    let options = JexlOptions { silent: true, ..JexlOptions::default() };
    let engine = JexlBuilder::new().options(options).build();
    let ctx = MapContext::new();
    let v = engine
        .create_script("t", "@nosuchprocessor { 1 + 1 }", &[])
        .unwrap()
        .execute(ctx, &[])
        .unwrap();
    assert!(matches!(v, Value::Int(2)));
    assert!(*warnings.lock().unwrap() >= 1);
}
