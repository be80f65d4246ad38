//! The host-supplied symbol table (C4) and its optional capability
//! sub-interfaces, modeled as default methods rather than separate marker
//! traits — a host implements only what it needs; unimplemented
//! capabilities are `None`/no-ops, which the interpreter treats as "not
//! supported" per §4.6's annotation-processor fallback rule and friends.
//!
//! `Context` is held by the interpreter as `Rc<dyn Context>`, not
//! `&mut dyn Context`: a host annotation processor may need to invoke a
//! continuation that itself evaluates against the same context, which is a
//! self-referential mutable borrow `&mut` cannot express. Interior
//! mutability (the `set` implementation commonly wraps a `RefCell`) is the
//! host's responsibility, exactly as §5 states ("User contexts are not
//! inherently thread-safe; `@synchronized` exists precisely so scripts can
//! wrap critical sections").

use crate::ast::Literal;
use crate::error::JexlResult;
use crate::options::JexlOptions;
use crate::value::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

pub trait Context {
    fn get(&self, name: &str) -> Option<Value>;

    fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    fn set(&self, name: &str, value: Value);

    /// Namespace resolver: `prefix` → namespace object, consulted for
    /// `prefix:method(args)` calls after a `jexl.namespace.<prefix>`
    /// pragma or an engine-level namespace registration.
    fn resolve_namespace(&self, _prefix: &str) -> Option<Value> {
        None
    }

    /// Pragma processor: called once per pragma that isn't one of the
    /// reserved built-in keys `JexlOptions::apply_builtin_pragma` already
    /// handled.
    fn process_pragma(&self, _options: &mut JexlOptions, _key: &str, _value: &Literal) {}

    /// Annotation processor: `None` means "this context does not implement
    /// annotation processing", which the interpreter turns into executing
    /// the statement unannotated plus an `Annotation` error (or, under
    /// `silent`, a logged warning). `Some(result)` is the processor's
    /// outcome, which may or may not have invoked `continuation`.
    fn process_annotation(
        &self,
        _name: &str,
        _args: &[Value],
        _continuation: &mut dyn FnMut() -> JexlResult<Value>,
    ) -> Option<JexlResult<Value>> {
        None
    }

    /// A process-atomic flag the host can trip to request cancellation.
    fn cancellation_flag(&self) -> Option<Arc<AtomicBool>> {
        None
    }

    /// Short class name → fully-qualified name, consulted for `new` and
    /// antish calls against imported packages.
    fn resolve_class_name(&self, _short: &str) -> Option<String> {
        None
    }
}

/// A minimal `HashMap`-backed context, the common starting point for a host
/// embedding this crate and for this crate's own tests — analogous to the
/// teacher's `Environment` symbol table, generalized to the `Context`
/// capability interface instead of a parent-chained scope (lexical scoping
/// here is the interpreter's job, not the context's).
#[derive(Debug, Default)]
pub struct MapContext {
    vars: RefCell<HashMap<String, Value>>,
}

impl MapContext {
    pub fn new() -> Rc<Self> {
        Rc::new(MapContext::default())
    }

    pub fn with(vars: HashMap<String, Value>) -> Rc<Self> {
        Rc::new(MapContext {
            vars: RefCell::new(vars),
        })
    }
}

impl Context for MapContext {
    fn get(&self, name: &str) -> Option<Value> {
        self.vars.borrow().get(name).cloned()
    }

    fn has(&self, name: &str) -> bool {
        self.vars.borrow().contains_key(name)
    }

    fn set(&self, name: &str, value: Value) {
        self.vars.borrow_mut().insert(name.to_string(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_set_roundtrip() {
        let ctx = MapContext::new();
        assert!(!ctx.has("x"));
        ctx.set("x", Value::Int(1));
        assert!(ctx.has("x"));
        assert!(matches!(ctx.get("x"), Some(Value::Int(1))));
    }

    #[test]
    fn default_capabilities_are_absent() {
        let ctx = MapContext::new();
        assert!(ctx.resolve_namespace("ns").is_none());
        assert!(ctx.cancellation_flag().is_none());
        assert!(ctx.resolve_class_name("Foo").is_none());
    }
}
