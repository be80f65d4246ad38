//! Template engine integration tests through the public `Jexl::create_jxlt_engine`
//! surface, distinct from `jxlt`'s own module-internal unit tests which drive
//! `JxltEngine`/`Template` directly.

use jexl::context::{Context, MapContext};
use jexl::options::JexlOptions;
use jexl::value::Value;
use jexl::Jexl;

#[test]
fn literal_template_passes_through_untouched() {
    let engine = Jexl::new();
    let jxlt = engine.create_jxlt_engine();
    let template = jxlt.create_template("t", "hello, world").unwrap();
    let ctx = MapContext::new();
    assert_eq!(template.evaluate(ctx, JexlOptions::default()).unwrap(), "hello, world");
}

#[test]
fn immediate_interpolation_reads_from_the_context() {
    let engine = Jexl::new();
    let jxlt = engine.create_jxlt_engine();
    let ctx = MapContext::new();
    ctx.set("name", Value::str("Ada"));
    let template = jxlt.create_template("t", "Hello, ${name}!").unwrap();
    assert_eq!(template.evaluate(ctx, JexlOptions::default()).unwrap(), "Hello, Ada!");
}

#[test]
fn deferred_interpolation_evaluates_the_stored_expression_text() {
    let engine = Jexl::new();
    let jxlt = engine.create_jxlt_engine();
    let ctx = MapContext::new();
    ctx.set("formula", Value::str("2 * 21"));
    let template = jxlt.create_template("t", "answer: #{formula}").unwrap();
    assert_eq!(template.evaluate(ctx, JexlOptions::default()).unwrap(), "answer: 42");
}

#[test]
fn multi_line_control_block_repeats_its_output_line() {
    let engine = Jexl::new();
    let jxlt = engine.create_jxlt_engine();
    let ctx = MapContext::new();
    let source = "$$ for (var i = 0; i < 3; i++) {\nrow ${i}\n$$ }";
    let template = jxlt.create_template("t", source).unwrap();
    assert_eq!(template.evaluate(ctx, JexlOptions::default()).unwrap(), "row 0\nrow 1\nrow 2\n");
}

#[test]
fn a_custom_control_prefix_is_honored() {
    let engine = Jexl::new();
    let jxlt = engine.create_jxlt_engine().with_prefix("%%");
    let ctx = MapContext::new();
    ctx.set("flag", Value::Bool(true));
    let source = "before\n%% if (flag) {\nshown\n%% }\nafter";
    let template = jxlt.create_template("t", source).unwrap();
    assert_eq!(template.evaluate(ctx, JexlOptions::default()).unwrap(), "before\nshown\nafter");
}

#[test]
fn a_malformed_control_line_reports_the_templates_own_line_number() {
    let engine = Jexl::new();
    let jxlt = engine.create_jxlt_engine();
    // Line 2 is the malformed control line, passed through verbatim into
    // the generated script; since one template line becomes exactly one
    // generated line, the reported origin must say line 2, matching the
    // template, not wherever that statement would otherwise land inside
    // a rewritten script.
    let source = "line one\n$$ if (\nline three";
    let err = jxlt.create_template("t", source).unwrap_err();
    assert_eq!(err.origin().line, 2);
}
