//! Tree-walking evaluator (C7). Holds no state of its own beyond the host
//! wiring (context, arithmetic, uberspect, options) — everything mutable
//! during one run lives in the `Scope` chain built for that run, so the
//! same `Interpreter` can be reused across calls (the engine's cache and
//! `Script`/`Expression` wrappers both depend on this).

use crate::arithmetic::Arithmetic;
use crate::ast::*;
use crate::context::Context;
use crate::error::{JexlError, JexlResult};
use crate::options::JexlOptions;
use crate::origin::Origin;
use crate::scope::{Lookup, Scope};
use crate::uberspect::{JexlIterator, Uberspect};
use crate::value::{LambdaValue, Value};
use std::rc::Rc;
use std::sync::atomic::Ordering;

/// Statement-level control flow. Errors travel through `JexlResult`/`?`
/// rather than a variant here, matching every other module's idiom.
#[derive(Debug)]
enum Flow {
    Normal(Value),
    Break,
    Continue,
    Return(Value),
    /// `remove` inside a `for (var x in xs)` body; caught by the enclosing
    /// `ForEach` to call the iterator's `remove_current`.
    Remove,
}

pub struct Interpreter<'a> {
    context: Rc<dyn Context>,
    arithmetic: &'a dyn Arithmetic,
    uberspect: &'a dyn Uberspect,
    options: JexlOptions,
}

impl<'a> Interpreter<'a> {
    pub fn new(
        context: Rc<dyn Context>,
        arithmetic: &'a dyn Arithmetic,
        uberspect: &'a dyn Uberspect,
        options: JexlOptions,
    ) -> Self {
        Interpreter {
            context,
            arithmetic,
            uberspect,
            options,
        }
    }

    pub fn run(&self, root: &Root) -> JexlResult<Value> {
        let scope = Scope::root(self.options.lexical, self.options.lexical_shade);
        match root {
            Root::Expression(e) => self.eval_expr(e, &scope),
            Root::Script { body, .. } => match self.exec_block(body, &scope)? {
                Flow::Normal(v) | Flow::Return(v) => Ok(v),
                Flow::Break | Flow::Continue => {
                    Err(JexlError::internal_bug(Origin::unknown("<script>"), "break/continue at top level"))
                }
                Flow::Remove => Err(JexlError::internal_bug(Origin::unknown("<script>"), "remove at top level")),
            },
        }
    }

    fn poll_cancellation(&self, origin: &Origin) -> JexlResult<()> {
        if !self.options.cancellable {
            return Ok(());
        }
        if let Some(flag) = self.context.cancellation_flag() {
            if flag.load(Ordering::Relaxed) {
                log::debug!("{origin}: cancellation flag tripped, aborting walk");
                return Err(JexlError::cancel(origin.clone()));
            }
        }
        Ok(())
    }

    // ---- statements ----------------------------------------------------

    fn exec_block(&self, stmts: &[Stmt], parent: &Rc<Scope>) -> JexlResult<Flow> {
        let scope = Scope::child_block(parent);
        scope.predeclare(collect_block_declarations(stmts));
        let mut last = Value::Null;
        for stmt in stmts {
            self.poll_cancellation(stmt.origin())?;
            match self.exec_stmt(stmt, &scope)? {
                Flow::Normal(v) => last = v,
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal(last))
    }

    fn exec_stmt(&self, stmt: &Stmt, scope: &Rc<Scope>) -> JexlResult<Flow> {
        match stmt {
            Stmt::Expr(e) => Ok(Flow::Normal(self.eval_expr(e, scope)?)),
            Stmt::Block(stmts) => self.exec_block(stmts, scope),
            Stmt::If { cond, then_branch, else_branch, .. } => {
                if self.arithmetic.truthy(&self.eval_expr(cond, scope)?) {
                    self.exec_stmt(then_branch, scope)
                } else if let Some(e) = else_branch {
                    self.exec_stmt(e, scope)
                } else {
                    Ok(Flow::Normal(Value::Null))
                }
            }
            Stmt::While { cond, body, origin } => {
                loop {
                    self.poll_cancellation(origin)?;
                    if !self.arithmetic.truthy(&self.eval_expr(cond, scope)?) {
                        break;
                    }
                    match self.exec_stmt(body, scope)? {
                        Flow::Break => break,
                        Flow::Continue | Flow::Normal(_) => {}
                        other @ (Flow::Return(_) | Flow::Remove) => return Ok(other),
                    }
                }
                Ok(Flow::Normal(Value::Null))
            }
            Stmt::DoWhile { body, cond, origin } => {
                loop {
                    self.poll_cancellation(origin)?;
                    match self.exec_stmt(body, scope)? {
                        Flow::Break => break,
                        Flow::Continue | Flow::Normal(_) => {}
                        other @ (Flow::Return(_) | Flow::Remove) => return Ok(other),
                    }
                    if !self.arithmetic.truthy(&self.eval_expr(cond, scope)?) {
                        break;
                    }
                }
                Ok(Flow::Normal(Value::Null))
            }
            Stmt::ForC { init, cond, step, body, origin } => {
                let loop_scope = Scope::child_block(scope);
                if let Some(init) = init {
                    self.exec_stmt(init, &loop_scope)?;
                }
                loop {
                    self.poll_cancellation(origin)?;
                    if let Some(cond) = cond {
                        if !self.arithmetic.truthy(&self.eval_expr(cond, &loop_scope)?) {
                            break;
                        }
                    }
                    match self.exec_stmt(body, &loop_scope)? {
                        Flow::Break => break,
                        Flow::Continue | Flow::Normal(_) => {}
                        other @ (Flow::Return(_) | Flow::Remove) => return Ok(other),
                    }
                    if let Some(step) = step {
                        self.exec_stmt(step, &loop_scope)?;
                    }
                }
                Ok(Flow::Normal(Value::Null))
            }
            Stmt::ForEach { kind, var, iterable, body, origin } => {
                let iterable_value = self.eval_expr(iterable, scope)?;
                let mut iter = self
                    .uberspect
                    .iterate(origin, &iterable_value)?
                    .ok_or_else(|| JexlError::operator(origin.clone(), "for", format!("{} is not iterable", iterable_value.type_name())))?;
                loop {
                    self.poll_cancellation(origin)?;
                    let Some(item) = iter.next_value() else { break };
                    let iter_scope = Scope::child_block(scope);
                    iter_scope
                        .declare_local(var, item, *kind == DeclKind::Const)
                        .map_err(|e| JexlError::parsing(origin.clone(), e))?;
                    match self.exec_stmt(body, &iter_scope)? {
                        Flow::Break => break,
                        Flow::Continue | Flow::Normal(_) => {}
                        Flow::Remove => iter.remove_current()?,
                        other @ Flow::Return(_) => return Ok(other),
                    }
                }
                Ok(Flow::Normal(Value::Null))
            }
            Stmt::Break(_) => Ok(Flow::Break),
            Stmt::Continue(_) => Ok(Flow::Continue),
            Stmt::Remove(_) => Ok(Flow::Remove),
            Stmt::Return(expr, _) => {
                let v = match expr {
                    Some(e) => self.eval_expr(e, scope)?,
                    None => Value::Null,
                };
                Ok(Flow::Return(v))
            }
            Stmt::Annotated { name, args, body, origin } => self.exec_annotated(name, args, body, origin, scope),
            Stmt::Pragma(_) => Ok(Flow::Normal(Value::Null)),
        }
    }

    /// Runs `body` through the context's annotation processor, per §4.6: no
    /// processor means execute unannotated, plus an error (or, under
    /// `silent`, a logged warning in its place).
    fn exec_annotated(
        &self,
        name: &str,
        args: &[ArrayElement],
        body: &Stmt,
        origin: &Origin,
        scope: &Rc<Scope>,
    ) -> JexlResult<Flow> {
        let arg_values = self.eval_array_elements(args, scope, origin)?;
        let flow_cell = std::cell::RefCell::new(None);
        let mut continuation = || -> JexlResult<Value> {
            let flow = self.exec_stmt(body, scope)?;
            let v = match &flow {
                Flow::Normal(v) | Flow::Return(v) => v.clone(),
                Flow::Break | Flow::Continue | Flow::Remove => Value::Null,
            };
            *flow_cell.borrow_mut() = Some(flow);
            Ok(v)
        };
        match self.context.process_annotation(name, &arg_values, &mut continuation) {
            Some(result) => {
                let v = result?;
                Ok(match flow_cell.into_inner() {
                    Some(Flow::Normal(_)) | None => Flow::Normal(v),
                    Some(Flow::Return(_)) => Flow::Return(v),
                    Some(other) => other,
                })
            }
            None => {
                let flow = self.exec_stmt(body, scope)?;
                if self.options.silent {
                    log::warn!("{origin}: no annotation processor installed for '@{name}'");
                    Ok(flow)
                } else {
                    Err(JexlError::annotation(origin.clone(), name, "no annotation processor installed"))
                }
            }
        }
    }

    // ---- expressions -----------------------------------------------------

    fn eval_expr(&self, expr: &Expr, scope: &Rc<Scope>) -> JexlResult<Value> {
        match expr {
            Expr::Literal(lit, origin) => self.eval_literal(lit, origin),
            Expr::Identifier { segments, origin } => self.eval_identifier(segments, origin, scope),
            Expr::Member { receiver, name, safe, origin } => {
                let recv = self.eval_expr(receiver, scope)?;
                self.member_get(recv, name, *safe, origin)
            }
            Expr::Index { receiver, index, safe, origin } => {
                let recv = self.eval_expr(receiver, scope)?;
                let idx = self.eval_expr(index, scope)?;
                self.index_get(recv, &idx, *safe, origin)
            }
            Expr::TemplateMember { receiver, name_template, safe, origin } => {
                let recv = self.eval_expr(receiver, scope)?;
                let name = self.eval_expr(name_template, scope)?.to_string();
                self.member_get(recv, &name, *safe, origin)
            }
            Expr::Unary { op, operand, origin } => self.eval_unary(*op, operand, origin, scope),
            Expr::Postfix { op, operand, origin } => {
                let old = self.eval_expr(operand, scope)?;
                let delta = if *op == PostfixOp::PostIncr { BinaryOp::Add } else { BinaryOp::Sub };
                let new = self.arithmetic.binary(origin, delta, &old, &Value::Int(1))?;
                self.assign_to(operand, scope, new, origin)?;
                Ok(old)
            }
            Expr::Binary { op, lhs, rhs, origin } => self.eval_binary(*op, lhs, rhs, origin, scope),
            Expr::Ternary { cond, then_branch, else_branch, .. } => {
                if self.arithmetic.truthy(&self.eval_expr(cond, scope)?) {
                    self.eval_expr(then_branch, scope)
                } else {
                    self.eval_expr(else_branch, scope)
                }
            }
            Expr::Elvis { cond, else_branch, .. } => {
                let c = self.eval_expr(cond, scope)?;
                if self.arithmetic.truthy(&c) {
                    Ok(c)
                } else {
                    self.eval_expr(else_branch, scope)
                }
            }
            Expr::Coalesce { lhs, rhs, .. } => {
                let l = self.eval_expr(lhs, scope)?;
                if l.is_null() {
                    self.eval_expr(rhs, scope)
                } else {
                    Ok(l)
                }
            }
            Expr::Assign { target, value, origin } => {
                let v = self.eval_expr(value, scope)?;
                self.assign_to(target, scope, v, origin)
            }
            Expr::CompoundAssign { op, target, value, origin } => {
                let cur = self.eval_expr(target, scope)?;
                let rhs = self.eval_expr(value, scope)?;
                let new = self.arithmetic.self_operator(origin, op.self_operator_name(), &cur, &rhs)?;
                self.assign_to(target, scope, new, origin)
            }
            Expr::MultiAssign { targets, value, origin } => {
                let v = self.eval_expr(value, scope)?;
                let mut last = Value::Null;
                match &v {
                    // Positional destructuring: extra source elements are
                    // dropped, missing ones assign null. The expression's
                    // value is whatever the last target received.
                    Value::Array(cell) | Value::List(cell) | Value::Set(cell) => {
                        let items = cell.borrow();
                        for (i, t) in targets.iter().enumerate() {
                            let item = items.get(i).cloned().unwrap_or(Value::Null);
                            self.assign_to(t, scope, item.clone(), origin)?;
                            last = item;
                        }
                    }
                    _ => {
                        for t in targets {
                            self.assign_to(t, scope, v.clone(), origin)?;
                            last = v.clone();
                        }
                    }
                }
                Ok(last)
            }
            Expr::Declare { kind, name, init, origin } => {
                let v = match init {
                    Some(e) => self.eval_expr(e, scope)?,
                    None => Value::Null,
                };
                match kind {
                    DeclKind::Var => scope.declare_var(name, v.clone()),
                    DeclKind::Let => scope.declare_local(name, v.clone(), false),
                    DeclKind::Const => scope.declare_local(name, v.clone(), true),
                }
                .map_err(|e| JexlError::parsing(origin.clone(), e))?;
                Ok(v)
            }
            Expr::ArrayLiteral { elements, origin } => {
                Ok(Value::array(self.eval_array_elements(elements, scope, origin)?))
            }
            Expr::SetLiteral { elements, origin } => Ok(Value::set(self.eval_array_elements(elements, scope, origin)?)),
            Expr::MapLiteral { entries, origin } => Ok(Value::map(self.eval_map_entries(entries, scope, origin)?)),
            Expr::Lambda { params, body, .. } => Ok(Value::Lambda(Rc::new(LambdaValue {
                params: params.clone(),
                body: Rc::clone(body),
                closure: Rc::clone(scope),
            }))),
            Expr::Call { callee, args, origin } => self.eval_call(callee, args, origin, scope),
            Expr::MethodCall { receiver, name, args, safe, origin } => {
                self.eval_method_call(receiver, name, args, *safe, origin, scope)
            }
            Expr::New { class_name, args, origin } => self.eval_new(class_name, args, origin, scope),
            Expr::Interpolation { parts, origin } => self.eval_interpolation(parts, origin, scope),
            Expr::Annotated { name, args, body, origin } => {
                match self.exec_annotated(name, args, body, origin, scope)? {
                    Flow::Normal(v) | Flow::Return(v) => Ok(v),
                    _ => Ok(Value::Null),
                }
            }
        }
    }

    fn eval_literal(&self, lit: &Literal, origin: &Origin) -> JexlResult<Value> {
        Ok(match lit {
            Literal::Int(n) => match i32::try_from(*n) {
                Ok(i) => Value::Int(i),
                Err(_) => Value::Long(*n),
            },
            Literal::Long(n) => Value::Long(*n),
            Literal::BigInt(s) => Value::BigInt(
                s.parse()
                    .map_err(|_| JexlError::parsing(origin.clone(), format!("invalid big integer literal '{s}'")))?,
            ),
            Literal::Double(n) => Value::F64(*n),
            Literal::BigDecimal(s) => Value::BigDec(parse_bigdecimal(s, origin)?),
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Null => Value::Null,
            Literal::Str(s) => Value::str(s.clone()),
            Literal::Regex(pattern) => Value::Regex(Rc::new(
                regex::Regex::new(pattern).map_err(|e| JexlError::parsing(origin.clone(), e.to_string()))?,
            )),
        })
    }

    /// Resolves a (possibly dotted) identifier. Per the AST's documented
    /// design, a multi-segment `Identifier` is ambiguous until now: try it
    /// as one flattened antish name against the context first, then fall
    /// back to walking it as a member chain rooted at `segments[0]`.
    fn eval_identifier(&self, segments: &[String], origin: &Origin, scope: &Rc<Scope>) -> JexlResult<Value> {
        if segments.len() == 1 {
            return self.resolve_name(&segments[0], origin, scope);
        }
        if self.options.antish {
            let joined = segments.join(".");
            if let Some(v) = self.context.get(&joined) {
                return Ok(v);
            }
        }
        let mut value = self.resolve_name(&segments[0], origin, scope)?;
        for seg in &segments[1..] {
            value = self.member_get(value, seg, false, origin)?;
        }
        Ok(value)
    }

    fn resolve_name(&self, name: &str, origin: &Origin, scope: &Rc<Scope>) -> JexlResult<Value> {
        match scope.lookup(name) {
            Lookup::Found(v) => Ok(v),
            Lookup::Uninitialized => Err(JexlError::variable(
                origin.clone(),
                name,
                "read before its declaration (temporal dead zone)",
            )),
            Lookup::NotFound => {
                if let Some(v) = self.context.get(name) {
                    Ok(v)
                } else if self.options.strict {
                    Err(JexlError::variable_undefined(origin.clone(), name))
                } else {
                    Ok(Value::Null)
                }
            }
        }
    }

    fn member_get(&self, receiver: Value, name: &str, safe: bool, origin: &Origin) -> JexlResult<Value> {
        if receiver.is_null() {
            return if safe || !self.options.strict {
                Ok(Value::Null)
            } else {
                Err(JexlError::property(origin.clone(), name, "cannot read a property of null"))
            };
        }
        match self.uberspect.get_property(origin, &receiver, name)? {
            Some(v) => Ok(v),
            None if safe || !self.options.strict => Ok(Value::Null),
            None => Err(JexlError::property(origin.clone(), name, format!("no such property on {}", receiver.type_name()))),
        }
    }

    fn index_get(&self, receiver: Value, index: &Value, safe: bool, origin: &Origin) -> JexlResult<Value> {
        if receiver.is_null() {
            return if safe || !self.options.strict {
                Ok(Value::Null)
            } else {
                Err(JexlError::property(origin.clone(), "[]", "cannot index into null"))
            };
        }
        match self.uberspect.get_index(origin, &receiver, index)? {
            Some(v) => Ok(v),
            None if safe || !self.options.strict => Ok(Value::Null),
            None => Err(JexlError::property(origin.clone(), "[]", format!("no such index on {}", receiver.type_name()))),
        }
    }

    fn eval_unary(&self, op: UnaryOp, operand: &Expr, origin: &Origin, scope: &Rc<Scope>) -> JexlResult<Value> {
        match op {
            UnaryOp::Not => {
                let v = self.eval_expr(operand, scope)?;
                Ok(Value::Bool(!self.arithmetic.truthy(&v)))
            }
            UnaryOp::PreIncr | UnaryOp::PreDecr => {
                let cur = self.eval_expr(operand, scope)?;
                let delta = if op == UnaryOp::PreIncr { BinaryOp::Add } else { BinaryOp::Sub };
                let new = self.arithmetic.binary(origin, delta, &cur, &Value::Int(1))?;
                self.assign_to(operand, scope, new.clone(), origin)?;
                Ok(new)
            }
            UnaryOp::Neg | UnaryOp::Pos | UnaryOp::BitNot => {
                let v = self.eval_expr(operand, scope)?;
                self.arithmetic.unary(origin, op, &v)
            }
        }
    }

    fn eval_binary(&self, op: BinaryOp, lhs: &Expr, rhs: &Expr, origin: &Origin, scope: &Rc<Scope>) -> JexlResult<Value> {
        match op {
            // `&&`/`||` short-circuit and yield an operand, not a coerced
            // bool — `default_binary` treats these as `unreachable!()`
            // precisely because this is the interpreter's job (§4.5).
            BinaryOp::And => {
                let l = self.eval_expr(lhs, scope)?;
                if !self.arithmetic.truthy(&l) {
                    Ok(l)
                } else {
                    self.eval_expr(rhs, scope)
                }
            }
            BinaryOp::Or => {
                let l = self.eval_expr(lhs, scope)?;
                if self.arithmetic.truthy(&l) {
                    Ok(l)
                } else {
                    self.eval_expr(rhs, scope)
                }
            }
            _ => {
                let l = self.eval_expr(lhs, scope)?;
                let r = self.eval_expr(rhs, scope)?;
                self.arithmetic.binary(origin, op, &l, &r)
            }
        }
    }

    fn assign_to(&self, target: &Expr, scope: &Rc<Scope>, value: Value, origin: &Origin) -> JexlResult<Value> {
        match target {
            Expr::Identifier { segments, .. } if segments.len() == 1 => {
                let name = &segments[0];
                match scope.assign(name, value.clone()) {
                    Ok(true) => Ok(value),
                    Ok(false) => {
                        self.context.set(name, value.clone());
                        Ok(value)
                    }
                    Err(_) => Err(crate::scope::const_assign_error(origin.clone(), name)),
                }
            }
            Expr::Identifier { segments, .. } => {
                let mut recv = self.resolve_name(&segments[0], origin, scope)?;
                for seg in &segments[1..segments.len() - 1] {
                    recv = self.member_get(recv, seg, false, origin)?;
                }
                let last = &segments[segments.len() - 1];
                self.uberspect.set_property(origin, &recv, last, value.clone())?;
                Ok(value)
            }
            Expr::Member { receiver, name, .. } => {
                let recv = self.eval_expr(receiver, scope)?;
                self.uberspect.set_property(origin, &recv, name, value.clone())?;
                Ok(value)
            }
            Expr::Index { receiver, index, .. } => {
                let recv = self.eval_expr(receiver, scope)?;
                let idx = self.eval_expr(index, scope)?;
                self.uberspect.set_index(origin, &recv, &idx, value.clone())?;
                Ok(value)
            }
            _ => Err(JexlError::assignment(origin.clone(), "<expr>", "not an assignable expression")),
        }
    }

    fn eval_array_elements(&self, elements: &[ArrayElement], scope: &Rc<Scope>, origin: &Origin) -> JexlResult<Vec<Value>> {
        let mut out = Vec::with_capacity(elements.len());
        for el in elements {
            match el {
                ArrayElement::Value(e) => out.push(self.eval_expr(e, scope)?),
                ArrayElement::Spread(e) => {
                    let v = self.eval_expr(e, scope)?;
                    if v.is_null() {
                        continue;
                    }
                    match self.uberspect.iterate(origin, &v)? {
                        Some(mut it) => {
                            while let Some(item) = it.next_value() {
                                out.push(item);
                            }
                        }
                        None => {
                            return Err(JexlError::operator(origin.clone(), "...", format!("{} is not spreadable", v.type_name())))
                        }
                    }
                }
            }
        }
        Ok(out)
    }

    fn eval_map_entries(&self, entries: &[MapEntry], scope: &Rc<Scope>, origin: &Origin) -> JexlResult<Vec<(Value, Value)>> {
        let mut out = Vec::with_capacity(entries.len());
        for entry in entries {
            match entry {
                MapEntry::Pair { key, value } => {
                    out.push((self.eval_expr(key, scope)?, self.eval_expr(value, scope)?));
                }
                MapEntry::Spread(e) => {
                    let v = self.eval_expr(e, scope)?;
                    match v {
                        Value::Null => {}
                        Value::Map(pairs) => out.extend(pairs.borrow().iter().cloned()),
                        other => {
                            return Err(JexlError::operator(origin.clone(), "*:", format!("{} is not map-spreadable", other.type_name())))
                        }
                    }
                }
            }
        }
        Ok(out)
    }

    fn eval_call(&self, callee: &Expr, args: &[ArrayElement], origin: &Origin, scope: &Rc<Scope>) -> JexlResult<Value> {
        if let Expr::Identifier { segments, .. } = callee {
            if segments.len() == 2 {
                if let Some(ns) = self.resolve_namespace(&segments[0]) {
                    let argv = self.eval_array_elements(args, scope, origin)?;
                    return self
                        .uberspect
                        .invoke_method(origin, &ns, &segments[1], &argv)?
                        .ok_or_else(|| JexlError::method(origin.clone(), segments[1].as_str(), "namespace function not found"));
                }
            }
        }
        let callee_value = self.eval_expr(callee, scope)?;
        let argv = self.eval_array_elements(args, scope, origin)?;
        match callee_value {
            Value::Lambda(l) => self.call_lambda(&l, argv, origin),
            other => Err(JexlError::method(origin.clone(), "<call>", format!("{} is not callable", other.type_name()))),
        }
    }

    fn resolve_namespace(&self, prefix: &str) -> Option<Value> {
        self.context.resolve_namespace(prefix)
    }

    fn eval_method_call(
        &self,
        receiver: &Expr,
        name: &str,
        args: &[ArrayElement],
        safe: bool,
        origin: &Origin,
        scope: &Rc<Scope>,
    ) -> JexlResult<Value> {
        let recv = self.eval_expr(receiver, scope)?;
        if recv.is_null() {
            return if safe || !self.options.strict {
                Ok(Value::Null)
            } else {
                Err(JexlError::method(origin.clone(), name, "cannot call a method on null"))
            };
        }
        let argv = self.eval_array_elements(args, scope, origin)?;
        if let Some(v) = self.uberspect.invoke_method(origin, &recv, name, &argv)? {
            return Ok(v);
        }
        // A property holding a lambda is callable too (a map entry storing a
        // closure, e.g. `obj.greet()` where `greet` is a lambda value).
        if let Some(Value::Lambda(l)) = self.uberspect.get_property(origin, &recv, name)? {
            return self.call_lambda(&l, argv, origin);
        }
        if safe || !self.options.strict {
            Ok(Value::Null)
        } else {
            Err(JexlError::method(origin.clone(), name, format!("no such method on {}", recv.type_name())))
        }
    }

    fn eval_new(&self, class_name: &Expr, args: &[ArrayElement], origin: &Origin, scope: &Rc<Scope>) -> JexlResult<Value> {
        let name = expr_as_dotted_name(class_name)
            .ok_or_else(|| JexlError::operator(origin.clone(), "new", "class name must be a plain identifier"))?;
        let resolved = self.context.resolve_class_name(&name).unwrap_or(name);
        let argv = self.eval_array_elements(args, scope, origin)?;
        self.uberspect
            .construct(origin, &resolved, &argv)?
            .ok_or_else(|| JexlError::method(origin.clone(), resolved.as_str(), "no constructor available"))
    }

    /// `${...}` substitutes once per evaluation; `#{...}` evaluates to a
    /// *string*, which is itself reparsed and evaluated fresh on every
    /// outer evaluation (§4.7's immediate/deferred distinction).
    fn eval_interpolation(&self, parts: &[InterpolationPart], origin: &Origin, scope: &Rc<Scope>) -> JexlResult<Value> {
        let mut out = String::new();
        for part in parts {
            match part {
                InterpolationPart::Literal(s) => out.push_str(s),
                InterpolationPart::Immediate(e) => out.push_str(&self.eval_expr(e, scope)?.to_string()),
                InterpolationPart::Deferred(e) => {
                    let source = self.eval_expr(e, scope)?.to_string();
                    let root = crate::parser::parse(&source, &origin.source_name, crate::features::FeatureSet::all())?;
                    out.push_str(&self.eval_expr(root_as_expr(&root), scope)?.to_string());
                }
            }
        }
        Ok(Value::str(out))
    }

    fn call_lambda(&self, lambda: &LambdaValue, args: Vec<Value>, origin: &Origin) -> JexlResult<Value> {
        let fn_scope = Scope::child_function(&lambda.closure);
        for (i, param) in lambda.params.iter().enumerate() {
            let v = args.get(i).cloned().unwrap_or(Value::Null);
            fn_scope
                .declare_var(param, v)
                .map_err(|e| JexlError::internal_bug(origin.clone(), e))?;
        }
        match self.exec_block(&lambda.body, &fn_scope)? {
            Flow::Normal(v) | Flow::Return(v) => Ok(v),
            Flow::Break | Flow::Continue => Err(JexlError::internal_bug(origin.clone(), "break/continue outside a loop")),
            Flow::Remove => Err(JexlError::internal_bug(origin.clone(), "remove outside a for-in body")),
        }
    }
}

fn root_as_expr(root: &Root) -> &Expr {
    match root {
        Root::Expression(e) => e,
        Root::Script { body, .. } => match body.first() {
            Some(Stmt::Expr(e)) => e,
            _ => unreachable!("a deferred interpolation's body is always one bare expression"),
        },
    }
}

fn expr_as_dotted_name(e: &Expr) -> Option<String> {
    match e {
        Expr::Identifier { segments, .. } => Some(segments.join(".")),
        _ => None,
    }
}

fn parse_bigdecimal(s: &str, origin: &Origin) -> JexlResult<crate::value::BigDecimal> {
    use num_bigint::BigInt;
    let bad = || JexlError::parsing(origin.clone(), format!("invalid big decimal literal '{s}'"));
    match s.split_once('.') {
        Some((int_part, frac_part)) => {
            let digits = format!("{int_part}{frac_part}");
            let mantissa: BigInt = digits.parse().map_err(|_| bad())?;
            Ok(crate::value::BigDecimal::new(mantissa, frac_part.len() as i64))
        }
        None => {
            let mantissa: BigInt = s.parse().map_err(|_| bad())?;
            Ok(crate::value::BigDecimal::new(mantissa, 0))
        }
    }
}

/// Declared `let`/`const` names directly in `stmts` (not descending into
/// nested blocks, loops, or lambdas), predeclared so a reference preceding
/// the declaration sees `Lookup::Uninitialized` rather than an outer scope
/// or the context (§3 invariant 3).
fn collect_block_declarations(stmts: &[Stmt]) -> Vec<String> {
    let mut names = Vec::new();
    for stmt in stmts {
        if let Stmt::Expr(Expr::Declare { kind, name, .. }) = stmt {
            if matches!(kind, DeclKind::Let | DeclKind::Const) {
                names.push(name.clone());
            }
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arithmetic::DefaultArithmetic;
    use crate::context::MapContext;
    use crate::features::FeatureSet;
    use crate::parser::parse;
    use crate::uberspect::DefaultUberspect;

    fn eval(src: &str) -> JexlResult<Value> {
        eval_with(src, MapContext::new())
    }

    fn eval_with(src: &str, ctx: Rc<dyn Context>) -> JexlResult<Value> {
        let root = parse(src, "t", FeatureSet::all())?;
        let arith = DefaultArithmetic::default();
        let uber = DefaultUberspect::default();
        let interp = Interpreter::new(ctx, &arith, &uber, JexlOptions::default());
        interp.run(&root)
    }

    #[test]
    fn arithmetic_and_precedence() {
        assert!(matches!(eval("1 + 2 * 3").unwrap(), Value::Int(7)));
    }

    #[test]
    fn variable_from_context() {
        let ctx = MapContext::new();
        ctx.set("x", Value::Int(10));
        assert!(matches!(eval_with("x + 1", ctx).unwrap(), Value::Int(11)));
    }

    #[test]
    fn let_and_reassignment() {
        let v = eval("let x = 1; x = x + 1; x").unwrap();
        assert!(matches!(v, Value::Int(2)));
    }

    #[test]
    fn const_reassignment_errors() {
        assert!(eval("const x = 1; x = 2; x").is_err());
    }

    #[test]
    fn if_else_branches() {
        assert!(matches!(eval("if (1 > 0) { 'yes' } else { 'no' }").unwrap(), Value::Str(s) if &*s == "yes"));
    }

    #[test]
    fn while_loop_accumulates() {
        let v = eval("var i = 0; var sum = 0; while (i < 5) { sum = sum + i; i = i + 1; } sum").unwrap();
        assert!(matches!(v, Value::Int(10)));
    }

    #[test]
    fn for_each_over_array_sums() {
        let v = eval("var sum = 0; for (var x in [1, 2, 3]) { sum = sum + x; } sum").unwrap();
        assert!(matches!(v, Value::Int(6)));
    }

    #[test]
    fn break_and_continue() {
        let v = eval("var sum = 0; for (var x in [1, 2, 3, 4, 5]) { if (x == 3) { break; } sum = sum + x; } sum").unwrap();
        assert!(matches!(v, Value::Int(3)));
    }

    #[test]
    fn lambda_call_roundtrip() {
        let v = eval("let double = x -> { x * 2 }; double(21)").unwrap();
        assert!(matches!(v, Value::Int(42)));
    }

    #[test]
    fn safe_navigation_short_circuits_on_null() {
        assert!(matches!(eval("null?.foo").unwrap(), Value::Null));
    }

    #[test]
    fn ternary_and_elvis() {
        assert!(matches!(eval("(1 > 2) ? 'a' : 'b'").unwrap(), Value::Str(s) if &*s == "b"));
        assert!(matches!(eval("null ?: 'fallback'").unwrap(), Value::Str(s) if &*s == "fallback"));
    }

    #[test]
    fn map_and_member_access() {
        assert!(matches!(eval("{a: 1, b: 2}.b").unwrap(), Value::Int(2)));
    }

    #[test]
    fn undefined_variable_is_strict_error() {
        assert!(eval("nope + 1").is_err());
    }

    #[test]
    fn cancellation_flag_aborts_loop() {
        let ctx = MapContext::new();
        let flag = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(true));
        struct CancellingContext {
            inner: Rc<MapContext>,
            flag: std::sync::Arc<std::sync::atomic::AtomicBool>,
        }
        impl Context for CancellingContext {
            fn get(&self, name: &str) -> Option<Value> {
                self.inner.get(name)
            }
            fn set(&self, name: &str, value: Value) {
                self.inner.set(name, value)
            }
            fn cancellation_flag(&self) -> Option<std::sync::Arc<std::sync::atomic::AtomicBool>> {
                Some(std::sync::Arc::clone(&self.flag))
            }
        }
        let cancelling: Rc<dyn Context> = Rc::new(CancellingContext { inner: ctx, flag: std::sync::Arc::clone(&flag) });
        let root = parse("while (true) { 1 }", "t", FeatureSet::all()).unwrap();
        let arith = DefaultArithmetic::default();
        let uber = DefaultUberspect::default();
        let mut options = JexlOptions::default();
        options.cancellable = true;
        let interp = Interpreter::new(cancelling, &arith, &uber, options);
        assert!(interp.run(&root).is_err());
    }
}
