//! Numeric-tower and operator behavior exercised end-to-end through the
//! façade rather than by calling `Arithmetic::binary` directly.

use jexl::context::MapContext;
use jexl::value::Value;
use jexl::Jexl;

fn eval(source: &str) -> Value {
    let engine = Jexl::new();
    let ctx = MapContext::new();
    engine.create_expression("t", source).unwrap().execute(ctx).unwrap()
}

#[test]
fn int_addition_stays_int() {
    assert!(matches!(eval("2 + 3"), Value::Int(5)));
}

#[test]
fn int_overflow_widens_to_long() {
    let source = format!("{} + 1", i32::MAX);
    assert!(matches!(eval(&source), Value::Long(n) if n == i32::MAX as i64 + 1));
}

#[test]
fn string_concatenation() {
    assert!(matches!(eval("'foo' + 'bar'"), Value::Str(s) if &*s == "foobar"));
}

#[test]
fn mixed_int_and_double_compare_consistently() {
    assert!(matches!(eval("1 == 1.0"), Value::Bool(true)));
    assert!(matches!(eval("2 > 1.5"), Value::Bool(true)));
    assert!(matches!(eval("1 < 2"), Value::Bool(true)));
}

#[test]
fn truthiness_of_empty_and_nonempty_values() {
    assert!(matches!(eval("!0"), Value::Bool(true)));
    assert!(matches!(eval("!1"), Value::Bool(false)));
    assert!(matches!(eval("!''"), Value::Bool(true)));
    assert!(matches!(eval("!'x'"), Value::Bool(false)));
    assert!(matches!(eval("![]"), Value::Bool(true)));
    assert!(matches!(eval("![1]"), Value::Bool(false)));
    assert!(matches!(eval("!null"), Value::Bool(true)));
}

#[test]
fn shift_binds_looser_than_additive() {
    // `1 + 2 << 3` reads as `(1 + 2) << 3`, not `1 + (2 << 3)`.
    assert!(matches!(eval("1 + 2 << 3"), Value::Int(24)));
}

#[test]
fn unary_negate_preserves_the_numeric_tier() {
    assert!(matches!(eval("-5"), Value::Int(-5)));
    assert!(matches!(eval("-5.0"), Value::F64(n) if n == -5.0));
}

#[test]
fn bitwise_not_on_int() {
    assert!(matches!(eval("~0"), Value::Int(-1)));
}
