//! Engine façade (the "External interfaces" surface): the handle a host
//! actually constructs, builds scripts/expressions/templates from, and
//! keeps around across many evaluations. Everything downstream of this
//! module (`Interpreter`, `Cache`, `Uberspect`) is already host-agnostic;
//! this is where defaults get picked and a `source` string turns into a
//! reusable, cached tree.

use crate::arithmetic::{Arithmetic, DefaultArithmetic};
use crate::ast::{Literal, Pragma, Root};
use crate::cache::Cache;
use crate::context::Context;
use crate::error::{JexlError, JexlResult};
use crate::features::FeatureSet;
use crate::interpreter::Interpreter;
use crate::jxlt::{JxltEngine, Template};
use crate::options::JexlOptions;
use crate::origin::Origin;
use crate::uberspect::{DefaultUberspect, Uberspect};
use crate::value::Value;
use std::rc::Rc;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Builder for a `Jexl` engine. Mirrors the teacher's piecewise-overridden
/// `Default`-impl config structs: start from sane defaults, override only
/// what the host cares about, then `build()`.
pub struct JexlBuilder {
    cache_capacity: usize,
    options: JexlOptions,
    arithmetic: Box<dyn Arithmetic>,
    uberspect: Box<dyn Uberspect>,
    features: FeatureSet,
}

impl Default for JexlBuilder {
    fn default() -> Self {
        JexlBuilder {
            cache_capacity: 512,
            options: JexlOptions::default(),
            arithmetic: Box::new(DefaultArithmetic::default()),
            uberspect: Box::new(DefaultUberspect::default()),
            features: FeatureSet::all(),
        }
    }
}

impl JexlBuilder {
    pub fn new() -> Self {
        JexlBuilder::default()
    }

    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    pub fn options(mut self, options: JexlOptions) -> Self {
        self.options = options;
        self
    }

    pub fn arithmetic(mut self, arithmetic: impl Arithmetic + 'static) -> Self {
        self.arithmetic = Box::new(arithmetic);
        self
    }

    pub fn uberspect(mut self, uberspect: impl Uberspect + 'static) -> Self {
        self.uberspect = Box::new(uberspect);
        self
    }

    pub fn features(mut self, features: FeatureSet) -> Self {
        self.features = features;
        self
    }

    pub fn build(self) -> Jexl {
        Jexl {
            cache: Cache::new(self.cache_capacity),
            options: self.options,
            arithmetic: self.arithmetic,
            uberspect: self.uberspect,
            features: self.features,
        }
    }
}

/// The engine handle. Cheap to hold onto and reuse: `create_script`/
/// `create_expression` only take `&self`, so one `Jexl` backs a whole
/// host's lifetime, with the cache doing the work of not reparsing
/// repeated sources.
pub struct Jexl {
    cache: Cache,
    options: JexlOptions,
    arithmetic: Box<dyn Arithmetic>,
    uberspect: Box<dyn Uberspect>,
    features: FeatureSet,
}

impl Default for Jexl {
    fn default() -> Self {
        JexlBuilder::default().build()
    }
}

impl Jexl {
    pub fn new() -> Self {
        Jexl::default()
    }

    pub fn uberspect(&self) -> &dyn Uberspect {
        self.uberspect.as_ref()
    }

    pub fn arithmetic(&self) -> &dyn Arithmetic {
        self.arithmetic.as_ref()
    }

    pub fn options(&self) -> &JexlOptions {
        &self.options
    }

    /// `source_name` identifies the source for `Origin`s and is also half of
    /// the cache key — two scripts with the same text but different names
    /// never collide. `params` names the positional arguments `execute`
    /// binds into the context.
    pub fn create_script(&self, source_name: &str, source: &str, params: &[&str]) -> JexlResult<Script<'_>> {
        let root = self.parse_cached(source_name, source)?;
        Ok(Script {
            root,
            source: source.to_string(),
            source_name: source_name.to_string(),
            params: params.iter().map(|s| s.to_string()).collect(),
            base_options: self.options.clone(),
            arithmetic: self.arithmetic.as_ref(),
            uberspect: self.uberspect.as_ref(),
        })
    }

    pub fn create_expression(&self, source_name: &str, source: &str) -> JexlResult<Expression<'_>> {
        let root = self.parse_cached(source_name, source)?;
        Ok(Expression {
            root,
            source: source.to_string(),
            base_options: self.options.clone(),
            arithmetic: self.arithmetic.as_ref(),
            uberspect: self.uberspect.as_ref(),
        })
    }

    pub fn create_jxlt_engine(&self) -> JxltEngine<'_> {
        JxltEngine::new(self.arithmetic.as_ref(), self.uberspect.as_ref(), &self.cache)
    }

    pub fn invoke_method(&self, target: &Value, name: &str, args: &[Value]) -> JexlResult<Value> {
        let origin = Origin::unknown("<invokeMethod>");
        match self.uberspect.invoke_method(&origin, target, name, args)? {
            Some(v) => Ok(v),
            None => Err(JexlError::method(origin, name, "no such method")),
        }
    }

    pub fn new_instance(&self, class_name: &str, args: &[Value]) -> JexlResult<Value> {
        let origin = Origin::unknown("<newInstance>");
        match self.uberspect.construct(&origin, class_name, args)? {
            Some(v) => Ok(v),
            None => Err(JexlError::method(origin, class_name, "no such constructor")),
        }
    }

    fn parse_cached(&self, source_name: &str, source: &str) -> JexlResult<Arc<Root>> {
        let features = self.features.clone();
        let source_owned = source.to_string();
        let source_name_owned = source_name.to_string();
        self.cache.get_or_parse(source_name, source, move || {
            crate::parser::parse(&source_owned, &source_name_owned, features)
        })
    }
}

fn pragmas_of(root: &Root) -> &[Pragma] {
    match root {
        Root::Script { pragmas, .. } => pragmas,
        Root::Expression(_) => &[],
    }
}

/// Composes engine defaults with a parsed tree's own pragmas and the
/// context's pragma processor, per the `options` layering order: engine
/// defaults → parse-time pragmas → context processor. Annotations are a
/// further, transient layer the interpreter applies itself per-statement.
fn compose_options(base: &JexlOptions, root: &Root, context: &Rc<dyn Context>) -> JexlOptions {
    let mut options = base.clone();
    for pragma in pragmas_of(root) {
        let raw = pragma_raw_value(&pragma.value);
        if !options.apply_builtin_pragma(&pragma.key, &raw) {
            context.process_pragma(&mut options, &pragma.key, &pragma.value);
        }
    }
    options
}

fn pragma_raw_value(value: &Literal) -> String {
    match value {
        Literal::Str(s) => s.clone(),
        Literal::Bool(b) => b.to_string(),
        Literal::Int(n) => n.to_string(),
        Literal::Long(n) => n.to_string(),
        Literal::Double(n) => n.to_string(),
        Literal::BigInt(s) | Literal::BigDecimal(s) => s.clone(),
        Literal::Regex(s) => s.clone(),
        Literal::Null => "null".to_string(),
    }
}

pub struct Script<'a> {
    root: Arc<Root>,
    source: String,
    source_name: String,
    params: Vec<String>,
    base_options: JexlOptions,
    arithmetic: &'a dyn Arithmetic,
    uberspect: &'a dyn Uberspect,
}

impl<'a> Script<'a> {
    fn bind_params(&self, context: &Rc<dyn Context>, args: &[Value]) {
        for (name, value) in self.params.iter().zip(args.iter()) {
            context.set(name, value.clone());
        }
    }

    pub fn execute(&self, context: Rc<dyn Context>, args: &[Value]) -> JexlResult<Value> {
        self.bind_params(&context, args);
        let options = compose_options(&self.base_options, &self.root, &context);
        let interpreter = Interpreter::new(context, self.arithmetic, self.uberspect, options);
        interpreter.run(&self.root)
    }

    /// Binds `args` and returns a handle that can be cancelled from another
    /// thread before or during `call()`, provided `context` exposes a
    /// cancellation flag and the composed options have `cancellable` set —
    /// `is_cancellable()` reports whether both are true.
    pub fn callable(&'a self, context: Rc<dyn Context>, args: &[Value]) -> Callable<'a> {
        self.bind_params(&context, args);
        let options = compose_options(&self.base_options, &self.root, &context);
        Callable {
            root: Arc::clone(&self.root),
            source_name: self.source_name.clone(),
            arithmetic: self.arithmetic,
            uberspect: self.uberspect,
            context,
            options,
        }
    }

    pub fn get_pragmas(&self) -> &[Pragma] {
        pragmas_of(&self.root)
    }

    pub fn get_parsed_text(&self) -> String {
        crate::printer::print_root(&self.root)
    }

    pub fn get_source_text(&self) -> &str {
        &self.source
    }
}

pub struct Expression<'a> {
    root: Arc<Root>,
    source: String,
    base_options: JexlOptions,
    arithmetic: &'a dyn Arithmetic,
    uberspect: &'a dyn Uberspect,
}

impl<'a> Expression<'a> {
    pub fn execute(&self, context: Rc<dyn Context>) -> JexlResult<Value> {
        let options = compose_options(&self.base_options, &self.root, &context);
        let interpreter = Interpreter::new(context, self.arithmetic, self.uberspect, options);
        interpreter.run(&self.root)
    }

    pub fn get_parsed_text(&self) -> String {
        crate::printer::print_root(&self.root)
    }

    pub fn get_source_text(&self) -> &str {
        &self.source
    }
}

/// A bound, deferred call. `cancel()`/`is_cancelled()` work through the
/// context's `Arc<AtomicBool>` cancellation flag, the one piece of this
/// crate that is genuinely meant to cross threads (§5): a host spawns the
/// call on one thread and trips cancellation from another.
pub struct Callable<'a> {
    root: Arc<Root>,
    source_name: String,
    arithmetic: &'a dyn Arithmetic,
    uberspect: &'a dyn Uberspect,
    context: Rc<dyn Context>,
    options: JexlOptions,
}

impl<'a> Callable<'a> {
    pub fn call(&self) -> JexlResult<Value> {
        if self.is_cancelled() {
            return Err(JexlError::cancel(Origin::unknown(self.source_name.clone())));
        }
        let interpreter = Interpreter::new(
            Rc::clone(&self.context),
            self.arithmetic,
            self.uberspect,
            self.options.clone(),
        );
        interpreter.run(&self.root)
    }

    /// Returns `true` if a flag was found and tripped, `false` if this
    /// context exposes no cancellation flag to trip.
    pub fn cancel(&self) -> bool {
        match self.context.cancellation_flag() {
            Some(flag) => {
                flag.store(true, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.options.cancellable
            && self
                .context
                .cancellation_flag()
                .map(|f| f.load(Ordering::SeqCst))
                .unwrap_or(false)
    }

    pub fn is_cancellable(&self) -> bool {
        self.options.cancellable && self.context.cancellation_flag().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::MapContext;

    #[test]
    fn execute_script_with_named_params() {
        let engine = Jexl::new();
        let script = engine.create_script("t", "a + b", &["a", "b"]).unwrap();
        let ctx = MapContext::new();
        let result = script.execute(ctx, &[Value::Int(1), Value::Int(2)]).unwrap();
        assert!(matches!(result, Value::Int(3)));
    }

    #[test]
    fn execute_expression() {
        let engine = Jexl::new();
        let expr = engine.create_expression("t", "1 + 2 * 3").unwrap();
        let ctx = MapContext::new();
        assert!(matches!(expr.execute(ctx).unwrap(), Value::Int(7)));
    }

    #[test]
    fn strict_pragma_overrides_builder_default() {
        let options = JexlOptions { strict: true, ..JexlOptions::default() };
        let engine = JexlBuilder::new().options(options).build();
        let script = engine.create_script("t", "#pragma jexl.strict false\nx", &[]).unwrap();
        let ctx = MapContext::new();
        // `x` is undefined but jexl.strict=false downgrades it to null instead of erroring.
        assert!(matches!(script.execute(ctx, &[]).unwrap(), Value::Null));
    }

    #[test]
    fn get_parsed_text_reparses_to_an_equivalent_tree() {
        let engine = Jexl::new();
        let script = engine.create_script("t", "1 + 2", &[]).unwrap();
        let printed = script.get_parsed_text();
        let reparsed = engine.create_script("t2", &printed, &[]).unwrap();
        let ctx = MapContext::new();
        assert!(matches!(reparsed.execute(ctx, &[]).unwrap(), Value::Int(3)));
    }

    #[test]
    fn callable_can_be_cancelled_before_call() {
        use std::sync::atomic::AtomicBool;

        struct CancellableContext {
            inner: Rc<dyn Context>,
            flag: Arc<AtomicBool>,
        }

        impl Context for CancellableContext {
            fn get(&self, name: &str) -> Option<Value> {
                self.inner.get(name)
            }
            fn set(&self, name: &str, value: Value) {
                self.inner.set(name, value)
            }
            fn cancellation_flag(&self) -> Option<Arc<AtomicBool>> {
                Some(Arc::clone(&self.flag))
            }
        }

        let options = JexlOptions { cancellable: true, ..JexlOptions::default() };
        let engine = JexlBuilder::new().options(options).build();
        let script = engine.create_script("t", "1 + 1", &[]).unwrap();
        let ctx: Rc<dyn Context> = Rc::new(CancellableContext {
            inner: MapContext::new(),
            flag: Arc::new(AtomicBool::new(false)),
        });
        let callable = script.callable(ctx, &[]);
        assert!(callable.is_cancellable());
        assert!(callable.cancel());
        assert!(callable.is_cancelled());
        assert!(callable.call().is_err());
    }
}
