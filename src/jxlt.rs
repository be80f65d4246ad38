//! Template engine (C9), layered on top of the expression engine rather than
//! duplicating any of its evaluation logic. A template is first rewritten,
//! one physical line at a time, into a single ordinary script: a line
//! beginning with the prefix (`$$` by default) is kept as script source
//! verbatim; every other line becomes a statement that writes an
//! interpolated backtick string to an internal sink. That generated script
//! is then parsed and run by the same `Interpreter`/`Cache` as any other
//! script — the only template-specific pieces here are the rewrite and the
//! sink wiring (`TemplateContext`/`TemplateUberspect`), both pure
//! compositions over the existing `Context`/`Uberspect` trait objects.
//!
//! Rewriting line-for-line (no lines inserted or removed) keeps the
//! generated source's line numbers identical to the template's, so a parse
//! error's `Origin` already reports the *template* line without any
//! remapping.

use crate::ast::{Literal, Root};
use crate::arithmetic::Arithmetic;
use crate::cache::Cache;
use crate::context::Context;
use crate::error::JexlResult;
use crate::features::FeatureSet;
use crate::interpreter::Interpreter;
use crate::options::JexlOptions;
use crate::origin::Origin;
use crate::uberspect::{JexlIterator, Permissions, Uberspect};
use crate::value::{Foreign, Value};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// The variable name the generated script writes through. Namespaced with
/// leading/trailing underscores since it lives in the same variable
/// namespace as the template author's own names.
const SINK_VAR: &str = "__jxlt_sink__";

pub struct JxltEngine<'a> {
    arithmetic: &'a dyn Arithmetic,
    uberspect: &'a dyn Uberspect,
    cache: &'a Cache,
    prefix: String,
    features: FeatureSet,
}

impl<'a> JxltEngine<'a> {
    pub fn new(arithmetic: &'a dyn Arithmetic, uberspect: &'a dyn Uberspect, cache: &'a Cache) -> Self {
        JxltEngine {
            arithmetic,
            uberspect,
            cache,
            prefix: "$$".to_string(),
            features: FeatureSet::all(),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_features(mut self, features: FeatureSet) -> Self {
        self.features = features;
        self
    }

    pub fn create_template(&self, source_name: &str, source: &str) -> JexlResult<Template<'a>> {
        let generated = synthesize(source, &self.prefix);
        let features = self.features.clone();
        let source_name_owned = source_name.to_string();
        let root = self.cache.get_or_parse(source_name, &generated, || {
            crate::parser::parse(&generated, &source_name_owned, features)
        })?;
        Ok(Template {
            root,
            arithmetic: self.arithmetic,
            uberspect: self.uberspect,
        })
    }
}

pub struct Template<'a> {
    root: Arc<Root>,
    arithmetic: &'a dyn Arithmetic,
    uberspect: &'a dyn Uberspect,
}

impl<'a> Template<'a> {
    /// Runs the generated script against `context`, returning everything
    /// written to the sink. `context` is wrapped, never mutated directly —
    /// the wrapper only adds the sink variable and otherwise delegates.
    pub fn evaluate(&self, context: Rc<dyn Context>, options: JexlOptions) -> JexlResult<String> {
        let sink = Rc::new(PrintSink(RefCell::new(String::new())));
        let wrapped_context: Rc<dyn Context> = Rc::new(TemplateContext {
            inner: context,
            sink: Value::Foreign(Rc::clone(&sink) as Rc<dyn Foreign>),
        });
        let wrapped_uberspect = TemplateUberspect { inner: self.uberspect };
        let interpreter = Interpreter::new(wrapped_context, self.arithmetic, &wrapped_uberspect, options);
        interpreter.run(&self.root)?;
        Ok(sink.0.borrow().clone())
    }
}

/// Rewrites `template` into a script, one physical line in, one physical
/// line out. Control lines (after trimming leading whitespace and the
/// prefix) pass through untouched; every other line becomes a single
/// `sink.write(`...`, hasMoreLines)` statement, where the backtick body is
/// the line's raw text (so its own `${...}`/`#{...}` interpolations are
/// parsed exactly like any other template string) and `hasMoreLines`
/// records whether this was the template's final line, so the sink knows
/// whether to append the newline this split() consumed.
fn synthesize(template: &str, prefix: &str) -> String {
    let lines: Vec<&str> = template.split('\n').collect();
    let last = lines.len().saturating_sub(1);
    let mut out = String::with_capacity(template.len() + template.len() / 4);
    for (i, line) in lines.iter().enumerate() {
        let trimmed = line.trim_start();
        if let Some(rest) = trimmed.strip_prefix(prefix) {
            out.push_str(rest);
        } else {
            out.push_str(SINK_VAR);
            out.push_str(".write(`");
            out.push_str(&escape_template_body(line));
            out.push_str(if i == last { "`, false);" } else { "`, true);" });
        }
        out.push('\n');
    }
    out
}

fn escape_template_body(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        if ch == '\\' || ch == '`' {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

#[derive(Debug)]
struct PrintSink(RefCell<String>);

impl Foreign for PrintSink {
    fn type_name(&self) -> &'static str {
        "jxlt.sink"
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// Adds the sink variable on top of the host's own context; everything else
/// is a pass-through.
struct TemplateContext {
    inner: Rc<dyn Context>,
    sink: Value,
}

impl Context for TemplateContext {
    fn get(&self, name: &str) -> Option<Value> {
        if name == SINK_VAR {
            Some(self.sink.clone())
        } else {
            self.inner.get(name)
        }
    }

    fn has(&self, name: &str) -> bool {
        name == SINK_VAR || self.inner.has(name)
    }

    fn set(&self, name: &str, value: Value) {
        self.inner.set(name, value)
    }

    fn resolve_namespace(&self, prefix: &str) -> Option<Value> {
        self.inner.resolve_namespace(prefix)
    }

    fn process_pragma(&self, options: &mut JexlOptions, key: &str, value: &Literal) {
        self.inner.process_pragma(options, key, value)
    }

    fn process_annotation(
        &self,
        name: &str,
        args: &[Value],
        continuation: &mut dyn FnMut() -> JexlResult<Value>,
    ) -> Option<JexlResult<Value>> {
        self.inner.process_annotation(name, args, continuation)
    }

    fn cancellation_flag(&self) -> Option<Arc<AtomicBool>> {
        self.inner.cancellation_flag()
    }

    fn resolve_class_name(&self, short: &str) -> Option<String> {
        self.inner.resolve_class_name(short)
    }
}

/// Recognizes method calls on the sink value; everything else delegates to
/// the engine's real `Uberspect` untouched.
struct TemplateUberspect<'a> {
    inner: &'a dyn Uberspect,
}

impl<'a> Uberspect for TemplateUberspect<'a> {
    fn get_property(&self, origin: &Origin, target: &Value, name: &str) -> JexlResult<Option<Value>> {
        self.inner.get_property(origin, target, name)
    }

    fn set_property(&self, origin: &Origin, target: &Value, name: &str, value: Value) -> JexlResult<bool> {
        self.inner.set_property(origin, target, name, value)
    }

    fn get_index(&self, origin: &Origin, target: &Value, index: &Value) -> JexlResult<Option<Value>> {
        self.inner.get_index(origin, target, index)
    }

    fn set_index(&self, origin: &Origin, target: &Value, index: &Value, value: Value) -> JexlResult<bool> {
        self.inner.set_index(origin, target, index, value)
    }

    fn invoke_method(&self, origin: &Origin, target: &Value, name: &str, args: &[Value]) -> JexlResult<Option<Value>> {
        if let Value::Foreign(f) = target {
            if f.as_any().downcast_ref::<PrintSink>().is_some() && name == "write" {
                if let Value::Foreign(f) = target {
                    let sink = f.as_any().downcast_ref::<PrintSink>().expect("checked above");
                    let text = args.first().map(|v| v.to_string()).unwrap_or_default();
                    let more_lines = matches!(args.get(1), Some(Value::Bool(true)));
                    let mut buf = sink.0.borrow_mut();
                    buf.push_str(&text);
                    if more_lines {
                        buf.push('\n');
                    }
                    return Ok(Some(Value::Null));
                }
            }
        }
        self.inner.invoke_method(origin, target, name, args)
    }

    fn iterate(&self, origin: &Origin, target: &Value) -> JexlResult<Option<Box<dyn JexlIterator>>> {
        self.inner.iterate(origin, target)
    }

    fn construct(&self, origin: &Origin, class_name: &str, args: &[Value]) -> JexlResult<Option<Value>> {
        self.inner.construct(origin, class_name, args)
    }

    fn permissions(&self) -> &Permissions {
        self.inner.permissions()
    }
}

impl fmt::Debug for TemplateUberspect<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateUberspect").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arithmetic::DefaultArithmetic;
    use crate::context::MapContext;
    use crate::uberspect::DefaultUberspect;

    fn render(source: &str, ctx: Rc<dyn Context>) -> String {
        let arith = DefaultArithmetic::default();
        let uber = DefaultUberspect::default();
        let cache = Cache::new(8);
        let jxlt = JxltEngine::new(&arith, &uber, &cache);
        let template = jxlt.create_template("t", source).unwrap();
        template.evaluate(ctx, JexlOptions::default()).unwrap()
    }

    #[test]
    fn immediate_interpolation() {
        let ctx = MapContext::new();
        ctx.set("name", Value::str("World"));
        assert_eq!(render("Hello, ${name}!", ctx), "Hello, World!");
    }

    #[test]
    fn literal_only_line_passes_through() {
        let ctx = MapContext::new();
        assert_eq!(render("plain text", ctx), "plain text");
    }

    #[test]
    fn control_loop_repeats_output_line() {
        let ctx = MapContext::new();
        let src = "$$ for (var i = 0; i < 3; i++) {\nitem ${i}\n$$ }";
        assert_eq!(render(src, ctx), "item 0\nitem 1\nitem 2\n");
    }

    #[test]
    fn control_if_suppresses_line() {
        let ctx = MapContext::new();
        ctx.set("shout", Value::Bool(false));
        let src = "before\n$$ if (shout) {\nLOUD\n$$ }\nafter";
        assert_eq!(render(src, ctx), "before\nafter");
    }

    #[test]
    fn deferred_interpolation_reevaluates_expression_text() {
        let ctx = MapContext::new();
        ctx.set("expr", Value::str("1 + 1"));
        assert_eq!(render("value: #{expr}", ctx), "value: 2");
    }

    #[test]
    fn backtick_in_literal_text_is_escaped() {
        let ctx = MapContext::new();
        assert_eq!(render("price: `10`", ctx), "price: `10`");
    }
}
