//! Pluggable operator algebra (C6). Java's open inheritance (scan an
//! `Arithmetic` subclass for a method named after the operator) is replaced
//! per design note §9 with a registry of named overloads a host supplies at
//! engine build, consulted before the built-in numeric tower.

use crate::ast::{BinaryOp, UnaryOp};
use crate::error::{JexlError, JexlResult};
use crate::origin::Origin;
use crate::value::{BigDecimal, Value};
use num_bigint::BigInt;
use num_traits::{ToPrimitive, Zero};
use std::collections::HashMap;

/// Outcome of a named overload lookup: either it produced a value, or it
/// declined (`TryFailed`), in which case the caller falls through to the
/// built-in tower — the testable property from §8 ("conversely returning
/// `TRY_FAILED` must fall through").
pub enum Overload {
    Value(Value),
    TryFailed,
}

type OverloadFn = Box<dyn Fn(&Value, &Value) -> Overload>;
type UnaryOverloadFn = Box<dyn Fn(&Value) -> Overload>;

/// A struct of function pointers / closures a host registers at engine
/// build, keyed by operator name and the dynamic type names of the operands
/// — the "named methods on an arithmetic instance" from the original model,
/// without subclassing.
#[derive(Default)]
pub struct OverloadRegistry {
    binary: HashMap<(&'static str, String, String), OverloadFn>,
    unary: HashMap<(&'static str, String), UnaryOverloadFn>,
}

impl OverloadRegistry {
    pub fn new() -> Self {
        OverloadRegistry::default()
    }

    /// Registers `name(lhs_type, rhs_type) -> C`. `"*"` matches any type in
    /// either position.
    pub fn register_binary(
        &mut self,
        name: &'static str,
        lhs_type: impl Into<String>,
        rhs_type: impl Into<String>,
        f: impl Fn(&Value, &Value) -> Overload + 'static,
    ) {
        self.binary.insert((name, lhs_type.into(), rhs_type.into()), Box::new(f));
    }

    pub fn register_unary(
        &mut self,
        name: &'static str,
        operand_type: impl Into<String>,
        f: impl Fn(&Value) -> Overload + 'static,
    ) {
        self.unary.insert((name, operand_type.into()), Box::new(f));
    }

    fn lookup_binary(&self, name: &'static str, lhs: &Value, rhs: &Value) -> Option<&OverloadFn> {
        let (lt, rt) = (lhs.type_name(), rhs.type_name());
        self.binary
            .get(&(name, lt.clone(), rt.clone()))
            .or_else(|| self.binary.get(&(name, "*".to_string(), rt.clone())))
            .or_else(|| self.binary.get(&(name, lt.clone(), "*".to_string())))
            .or_else(|| self.binary.get(&(name, "*".to_string(), "*".to_string())))
    }

    fn lookup_unary(&self, name: &'static str, operand: &Value) -> Option<&UnaryOverloadFn> {
        let t = operand.type_name();
        self.unary
            .get(&(name, t.clone()))
            .or_else(|| self.unary.get(&(name, "*".to_string())))
    }
}

/// The operator algebra contract (§4.5): typed overload search, then the
/// built-in numeric tower, self-operators for compound assignment, a single
/// `compare` underlying all relational operators, and per-operator
/// strictness.
pub trait Arithmetic {
    fn overloads(&self) -> &OverloadRegistry;

    fn math_scale(&self) -> i64 {
        -1
    }

    /// Default strict; an implementation overrides to permit e.g.
    /// `null + "x"` to yield `"x"`.
    fn is_strict(&self, _op: BinaryOp) -> bool {
        true
    }

    /// Truthiness table (§4.5 excerpt): null false; numbers false iff zero;
    /// strings false iff empty or `"false"`; collections/maps false iff
    /// empty; booleans as-is.
    fn truthy(&self, v: &Value) -> bool {
        match v {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Long(n) => *n != 0,
            Value::BigInt(n) => !n.is_zero(),
            Value::F64(n) => *n != 0.0,
            Value::BigDec(d) => !d.mantissa.is_zero(),
            Value::Str(s) => !s.is_empty() && s.as_ref() != "false",
            Value::Array(items) | Value::List(items) | Value::Set(items) => !items.borrow().is_empty(),
            Value::Map(entries) => !entries.borrow().is_empty(),
            Value::Range(lo, hi) => lo <= hi,
            Value::Regex(_) | Value::Lambda(_) | Value::Foreign(_) => true,
        }
    }

    fn binary(&self, origin: &Origin, op: BinaryOp, lhs: &Value, rhs: &Value) -> JexlResult<Value> {
        default_binary(self, origin, op, lhs, rhs)
    }

    /// `-x`, `~x`: overload search under `negate`/`complement`, then the
    /// built-in tower. `!x` and pre/post increment are handled directly by
    /// the interpreter (`!` via `truthy`, `++`/`--` via `binary(Add/Sub)`),
    /// so they never reach here.
    fn unary(&self, origin: &Origin, op: UnaryOp, operand: &Value) -> JexlResult<Value> {
        default_unary(self, origin, op, operand)
    }

    /// `compare(lhs, rhs, op)` underlies `< <= > >= == !=` uniformly so a
    /// host overload is consulted exactly once per comparison (§8
    /// "Compare-consistency").
    fn compare(&self, origin: &Origin, lhs: &Value, rhs: &Value, op: BinaryOp) -> JexlResult<bool> {
        default_compare(self, origin, lhs, rhs, op)
    }

    /// Self-operator for compound assignment (`selfAdd`, `selfSub`, …):
    /// returns the value to write back to the l-value.
    fn self_operator(&self, origin: &Origin, name: &'static str, lhs: &Value, rhs: &Value) -> JexlResult<Value> {
        if let Some(f) = self.overloads().lookup_binary(name, lhs, rhs) {
            if let Overload::Value(v) = f(lhs, rhs) {
                return Ok(v);
            }
        }
        let op = self_op_to_binary(name);
        self.binary(origin, op, lhs, rhs)
    }
}

fn self_op_to_binary(name: &str) -> BinaryOp {
    match name {
        "selfAdd" => BinaryOp::Add,
        "selfSub" => BinaryOp::Sub,
        "selfMul" => BinaryOp::Mul,
        "selfDiv" => BinaryOp::Div,
        "selfMod" => BinaryOp::Mod,
        "selfAnd" => BinaryOp::BitAnd,
        "selfOr" => BinaryOp::BitOr,
        "selfXor" => BinaryOp::BitXor,
        "selfShl" => BinaryOp::Shl,
        "selfShr" => BinaryOp::Shr,
        "selfUshr" => BinaryOp::Ushr,
        _ => BinaryOp::Add,
    }
}

/// The engine's built-in `Arithmetic`: numeric tower `int -> long ->
/// big-integer -> double -> big-decimal`, plus whatever overloads a host
/// registered.
pub struct DefaultArithmetic {
    pub overloads: OverloadRegistry,
    pub math_scale: i64,
    pub permissive_ops: Vec<BinaryOp>,
}

impl Default for DefaultArithmetic {
    fn default() -> Self {
        DefaultArithmetic {
            overloads: OverloadRegistry::new(),
            math_scale: -1,
            permissive_ops: vec![BinaryOp::Add, BinaryOp::Eq, BinaryOp::Ne],
        }
    }
}

impl Arithmetic for DefaultArithmetic {
    fn overloads(&self) -> &OverloadRegistry {
        &self.overloads
    }

    fn math_scale(&self) -> i64 {
        self.math_scale
    }

    fn is_strict(&self, op: BinaryOp) -> bool {
        !self.permissive_ops.contains(&op)
    }
}

/// Tower rank used to decide which representation a mixed-type binary
/// operation widens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Rank {
    Int,
    Long,
    BigInt,
    F64,
    BigDec,
}

fn rank(v: &Value) -> Option<Rank> {
    match v {
        Value::Int(_) => Some(Rank::Int),
        Value::Long(_) => Some(Rank::Long),
        Value::BigInt(_) => Some(Rank::BigInt),
        Value::F64(_) => Some(Rank::F64),
        Value::BigDec(_) => Some(Rank::BigDec),
        _ => None,
    }
}

fn to_bigint(v: &Value) -> BigInt {
    match v {
        Value::Int(n) => BigInt::from(*n),
        Value::Long(n) => BigInt::from(*n),
        Value::BigInt(n) => n.clone(),
        _ => BigInt::zero(),
    }
}

fn to_f64(v: &Value) -> f64 {
    match v {
        Value::Int(n) => *n as f64,
        Value::Long(n) => *n as f64,
        Value::BigInt(n) => n.to_f64().unwrap_or(f64::NAN),
        Value::F64(n) => *n,
        Value::BigDec(d) => {
            let mantissa = d.mantissa.to_f64().unwrap_or(0.0);
            mantissa / 10f64.powi(d.scale as i32)
        }
        _ => f64::NAN,
    }
}

fn to_bigdec(v: &Value) -> BigDecimal {
    match v {
        Value::BigDec(d) => d.clone(),
        Value::Int(n) => BigDecimal::new(BigInt::from(*n), 0),
        Value::Long(n) => BigDecimal::new(BigInt::from(*n), 0),
        Value::BigInt(n) => BigDecimal::new(n.clone(), 0),
        Value::F64(n) => {
            // conservative: shift by 9 decimal digits of precision
            let scaled = (*n * 1_000_000_000.0).round() as i64;
            BigDecimal::new(BigInt::from(scaled), 9)
        }
        _ => BigDecimal::new(BigInt::zero(), 0),
    }
}

fn narrow_bigint(n: BigInt) -> Value {
    if let Some(i) = n.to_i32() {
        Value::Int(i)
    } else if let Some(l) = n.to_i64() {
        Value::Long(l)
    } else {
        Value::BigInt(n)
    }
}

fn numeric_binary(op: BinaryOp, lhs: &Value, rhs: &Value) -> Option<Value> {
    let (rl, rr) = (rank(lhs)?, rank(rhs)?);
    let top = rl.max(rr);
    match top {
        Rank::Int | Rank::Long | Rank::BigInt => {
            let a = to_bigint(lhs);
            let b = to_bigint(rhs);
            let result = match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div => {
                    if b.is_zero() {
                        return None;
                    }
                    a / b
                }
                BinaryOp::Mod => {
                    if b.is_zero() {
                        return None;
                    }
                    a % b
                }
                BinaryOp::BitAnd => a & b,
                BinaryOp::BitOr => a | b,
                BinaryOp::BitXor => a ^ b,
                BinaryOp::Shl => a << b.to_u32().unwrap_or(0),
                BinaryOp::Shr => a >> b.to_u32().unwrap_or(0),
                BinaryOp::Ushr => a >> b.to_u32().unwrap_or(0),
                _ => return None,
            };
            // int/long widen back to the narrowest representation that
            // fits; big-integer stays big-integer.
            if top == Rank::BigInt {
                Some(Value::BigInt(result))
            } else {
                Some(narrow_bigint(result))
            }
        }
        Rank::F64 => {
            let a = to_f64(lhs);
            let b = to_f64(rhs);
            let result = match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div => a / b,
                BinaryOp::Mod => a % b,
                _ => return None,
            };
            Some(Value::F64(result))
        }
        Rank::BigDec => {
            let a = to_bigdec(lhs);
            let b = to_bigdec(rhs);
            let scale = a.scale.max(b.scale);
            let a_scaled = a.mantissa * BigInt::from(10).pow((scale - a.scale) as u32);
            let b_scaled = b.mantissa * BigInt::from(10).pow((scale - b.scale) as u32);
            let result = match op {
                BinaryOp::Add => a_scaled + b_scaled,
                BinaryOp::Sub => a_scaled - b_scaled,
                BinaryOp::Mul => return Some(Value::BigDec(BigDecimal::new(a_scaled * b_scaled, scale * 2))),
                BinaryOp::Div => {
                    if b_scaled.is_zero() {
                        return None;
                    }
                    a_scaled / b_scaled.clone().max(BigInt::from(1))
                }
                _ => return None,
            };
            Some(Value::BigDec(BigDecimal::new(result, scale)))
        }
    }
}

fn default_binary<A: Arithmetic + ?Sized>(
    arith: &A,
    origin: &Origin,
    op: BinaryOp,
    lhs: &Value,
    rhs: &Value,
) -> JexlResult<Value> {
    let overload_name = overload_name_for(op);
    if let Some(f) = arith.overloads().lookup_binary(overload_name, lhs, rhs) {
        if let Overload::Value(v) = f(lhs, rhs) {
            return Ok(v);
        }
    }

    match op {
        BinaryOp::Add if matches!(lhs, Value::Str(_)) || matches!(rhs, Value::Str(_)) => {
            Ok(Value::str(format!("{lhs}{rhs}")))
        }
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
            match numeric_binary(op, lhs, rhs) {
                Some(v) => Ok(v),
                None => {
                    if !arith.is_strict(op) {
                        return Ok(non_null_operand(lhs, rhs));
                    }
                    Err(JexlError::operator(
                        origin.clone(),
                        op.symbol(),
                        format!("cannot apply to {} and {}", lhs.type_name(), rhs.type_name()),
                    ))
                }
            }
        }
        BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor | BinaryOp::Shl | BinaryOp::Shr | BinaryOp::Ushr => {
            match numeric_binary(op, lhs, rhs) {
                Some(v) => Ok(v),
                None => Err(JexlError::operator(
                    origin.clone(),
                    op.symbol(),
                    format!("cannot apply to {} and {}", lhs.type_name(), rhs.type_name()),
                )),
            }
        }
        BinaryOp::Eq => Ok(Value::Bool(arith.compare(origin, lhs, rhs, op)?)),
        BinaryOp::Ne => Ok(Value::Bool(!arith.compare(origin, lhs, rhs, BinaryOp::Eq)?)),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            Ok(Value::Bool(arith.compare(origin, lhs, rhs, op)?))
        }
        BinaryOp::Match => match_op(lhs, rhs, origin),
        BinaryOp::NotMatch => match_op(lhs, rhs, origin).map(|v| Value::Bool(!arith.truthy(&v))),
        BinaryOp::StartsWith => Ok(Value::Bool(starts_or_ends(lhs, rhs, true))),
        BinaryOp::NotStartsWith => Ok(Value::Bool(!starts_or_ends(lhs, rhs, true))),
        BinaryOp::EndsWith => Ok(Value::Bool(starts_or_ends(lhs, rhs, false))),
        BinaryOp::NotEndsWith => Ok(Value::Bool(!starts_or_ends(lhs, rhs, false))),
        BinaryOp::In => Ok(Value::Bool(contains(rhs, lhs))),
        BinaryOp::Range => match (coerce_i64(lhs), coerce_i64(rhs)) {
            (Some(a), Some(b)) => Ok(Value::Range(a, b)),
            _ => Err(JexlError::operator(origin.clone(), "..", "range bounds must be integers")),
        },
        BinaryOp::And | BinaryOp::Or => unreachable!("short-circuit ops are handled by the interpreter"),
    }
}

fn default_unary<A: Arithmetic + ?Sized>(arith: &A, origin: &Origin, op: UnaryOp, operand: &Value) -> JexlResult<Value> {
    let name = match op {
        UnaryOp::Neg => "negate",
        UnaryOp::Pos => "positive",
        UnaryOp::BitNot => "complement",
        UnaryOp::Not | UnaryOp::PreIncr | UnaryOp::PreDecr => {
            return Err(JexlError::internal_bug(origin.clone(), "not a unary arithmetic operator"))
        }
    };
    if let Some(f) = arith.overloads().lookup_unary(name, operand) {
        if let Overload::Value(v) = f(operand) {
            return Ok(v);
        }
    }
    match (op, operand) {
        (UnaryOp::Pos, v) if v.is_numeric() => Ok(v.clone()),
        (UnaryOp::Neg, Value::Int(n)) => Ok(narrow_bigint(-BigInt::from(*n))),
        (UnaryOp::Neg, Value::Long(n)) => Ok(narrow_bigint(-BigInt::from(*n))),
        (UnaryOp::Neg, Value::BigInt(n)) => Ok(Value::BigInt(-n.clone())),
        (UnaryOp::Neg, Value::F64(n)) => Ok(Value::F64(-n)),
        (UnaryOp::Neg, Value::BigDec(d)) => Ok(Value::BigDec(BigDecimal::new(-d.mantissa.clone(), d.scale))),
        (UnaryOp::BitNot, Value::Int(n)) => Ok(Value::Int(!n)),
        (UnaryOp::BitNot, Value::Long(n)) => Ok(Value::Long(!n)),
        (UnaryOp::BitNot, Value::BigInt(n)) => Ok(Value::BigInt(!n.clone())),
        _ => Err(JexlError::operator(
            origin.clone(),
            match op {
                UnaryOp::Neg => "-",
                UnaryOp::Pos => "+",
                UnaryOp::BitNot => "~",
                _ => "?",
            },
            format!("cannot apply to {}", operand.type_name()),
        )),
    }
}

fn overload_name_for(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "add",
        BinaryOp::Sub => "subtract",
        BinaryOp::Mul => "multiply",
        BinaryOp::Div => "divide",
        BinaryOp::Mod => "mod",
        BinaryOp::BitAnd => "and",
        BinaryOp::BitOr => "or",
        BinaryOp::BitXor => "xor",
        BinaryOp::Shl => "leftShift",
        BinaryOp::Shr => "rightShift",
        BinaryOp::Ushr => "rightShiftUnsigned",
        _ => "op",
    }
}

fn non_null_operand(lhs: &Value, rhs: &Value) -> Value {
    if lhs.is_null() {
        rhs.clone()
    } else {
        lhs.clone()
    }
}

fn coerce_i64(v: &Value) -> Option<i64> {
    match v {
        Value::Int(n) => Some(*n as i64),
        Value::Long(n) => Some(*n),
        Value::BigInt(n) => n.to_i64(),
        _ => None,
    }
}

fn match_op(lhs: &Value, rhs: &Value, origin: &Origin) -> JexlResult<Value> {
    match (lhs, rhs) {
        (Value::Str(s), Value::Regex(re)) => Ok(Value::Bool(re.is_match(s))),
        (Value::Str(s), Value::Str(pattern)) => {
            let re = regex::Regex::new(pattern)
                .map_err(|e| JexlError::operator(origin.clone(), "=~", e.to_string()))?;
            Ok(Value::Bool(re.is_match(s)))
        }
        (_, Value::Array(_) | Value::List(_) | Value::Set(_) | Value::Map(_)) => Ok(Value::Bool(contains(rhs, lhs))),
        _ => Ok(Value::Bool(false)),
    }
}

fn starts_or_ends(lhs: &Value, rhs: &Value, starts: bool) -> bool {
    match (lhs, rhs) {
        (Value::Str(s), Value::Str(p)) => {
            if starts {
                s.starts_with(p.as_ref())
            } else {
                s.ends_with(p.as_ref())
            }
        }
        (Value::Array(items) | Value::List(items), needle) => {
            let items = items.borrow();
            if starts {
                items.first().is_some_and(|v| crate::uberspect::values_shallow_eq(v, needle))
            } else {
                items.last().is_some_and(|v| crate::uberspect::values_shallow_eq(v, needle))
            }
        }
        _ => false,
    }
}

/// `x =~ container` across array/list/set/map-keys/range: true iff `x` is a
/// member (§8 "Boundary behaviors").
fn contains(container: &Value, needle: &Value) -> bool {
    match container {
        Value::Array(items) | Value::List(items) | Value::Set(items) => {
            items.borrow().iter().any(|v| crate::uberspect::values_shallow_eq(v, needle))
        }
        Value::Map(entries) => entries
            .borrow()
            .iter()
            .any(|(k, _)| crate::uberspect::values_shallow_eq(k, needle)),
        Value::Range(lo, hi) => match coerce_i64(needle) {
            Some(n) => n >= *lo && n <= *hi,
            None => false,
        },
        Value::Str(s) => match needle {
            Value::Str(n) => s.contains(n.as_ref()),
            _ => false,
        },
        _ => false,
    }
}

fn default_compare<A: Arithmetic + ?Sized>(
    arith: &A,
    origin: &Origin,
    lhs: &Value,
    rhs: &Value,
    op: BinaryOp,
) -> JexlResult<bool> {
    if let Some(f) = arith.overloads().lookup_binary("compare", lhs, rhs) {
        if let Overload::Value(Value::Int(ordering)) = f(lhs, rhs) {
            return Ok(apply_ordering(ordering, op));
        }
    }

    if lhs.is_numeric() && rhs.is_numeric() {
        let ordering = if rank(lhs) == Some(Rank::BigInt) || rank(rhs) == Some(Rank::BigInt) {
            to_bigint(lhs).cmp(&to_bigint(rhs))
        } else if matches!(lhs, Value::BigDec(_)) || matches!(rhs, Value::BigDec(_)) {
            let a = to_bigdec(lhs);
            let b = to_bigdec(rhs);
            let scale = a.scale.max(b.scale);
            let a_scaled = a.mantissa * BigInt::from(10).pow((scale - a.scale) as u32);
            let b_scaled = b.mantissa * BigInt::from(10).pow((scale - b.scale) as u32);
            a_scaled.cmp(&b_scaled)
        } else {
            to_f64(lhs)
                .partial_cmp(&to_f64(rhs))
                .unwrap_or(std::cmp::Ordering::Greater) // NaN: not equal, not ordered; Greater makes eq false
        };
        return Ok(match op {
            BinaryOp::Eq => ordering == std::cmp::Ordering::Equal,
            BinaryOp::Lt => ordering == std::cmp::Ordering::Less,
            BinaryOp::Le => ordering != std::cmp::Ordering::Greater,
            BinaryOp::Gt => ordering == std::cmp::Ordering::Greater,
            BinaryOp::Ge => ordering != std::cmp::Ordering::Less,
            _ => unreachable!(),
        });
    }

    match (lhs, rhs) {
        (Value::Str(a), Value::Str(b)) => Ok(match op {
            BinaryOp::Eq => a == b,
            BinaryOp::Lt => a < b,
            BinaryOp::Le => a <= b,
            BinaryOp::Gt => a > b,
            BinaryOp::Ge => a >= b,
            _ => unreachable!(),
        }),
        (Value::Bool(a), Value::Bool(b)) => Ok(match op {
            BinaryOp::Eq => a == b,
            _ if op == BinaryOp::Eq => a == b,
            _ => a == b,
        }),
        (Value::Null, Value::Null) => Ok(op == BinaryOp::Eq || op == BinaryOp::Le || op == BinaryOp::Ge),
        (Value::Null, _) | (_, Value::Null) => {
            if op == BinaryOp::Eq {
                Ok(false)
            } else if arith.is_strict(op) {
                Err(JexlError::operator(origin.clone(), op.symbol(), "null operand"))
            } else {
                Ok(false)
            }
        }
        _ => Ok(false),
    }
}

fn apply_ordering(ordering: i32, op: BinaryOp) -> bool {
    match op {
        BinaryOp::Eq => ordering == 0,
        BinaryOp::Lt => ordering < 0,
        BinaryOp::Le => ordering <= 0,
        BinaryOp::Gt => ordering > 0,
        BinaryOp::Ge => ordering >= 0,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> Origin {
        Origin::unknown("t")
    }

    #[test]
    fn int_add_stays_int() {
        let a = DefaultArithmetic::default();
        let v = a.binary(&origin(), BinaryOp::Add, &Value::Int(1), &Value::Int(2)).unwrap();
        assert!(matches!(v, Value::Int(3)));
    }

    #[test]
    fn overflow_widens_to_long() {
        let a = DefaultArithmetic::default();
        let v = a
            .binary(&origin(), BinaryOp::Add, &Value::Int(i32::MAX), &Value::Int(1))
            .unwrap();
        assert!(matches!(v, Value::Long(_)));
    }

    #[test]
    fn string_concat() {
        let a = DefaultArithmetic::default();
        let v = a
            .binary(&origin(), BinaryOp::Add, &Value::str("a"), &Value::str("b"))
            .unwrap();
        assert_eq!(v.to_string(), "ab");
    }

    #[test]
    fn truthiness_table() {
        let a = DefaultArithmetic::default();
        assert!(!a.truthy(&Value::Null));
        assert!(!a.truthy(&Value::Int(0)));
        assert!(a.truthy(&Value::Int(1)));
        assert!(!a.truthy(&Value::str("")));
        assert!(!a.truthy(&Value::str("false")));
        assert!(a.truthy(&Value::str("0")));
        assert!(!a.truthy(&Value::array(vec![])));
    }

    #[test]
    fn overload_discovery_short_circuits_builtin() {
        let mut a = DefaultArithmetic::default();
        a.overloads
            .register_binary("leftShift", "*", "*", |_, _| Overload::Value(Value::str("C")));
        let v = a.binary(&origin(), BinaryOp::Shl, &Value::Int(1), &Value::Int(2)).unwrap();
        assert_eq!(v.to_string(), "C");
    }

    #[test]
    fn overload_try_failed_falls_through() {
        let mut a = DefaultArithmetic::default();
        a.overloads.register_binary("add", "*", "*", |_, _| Overload::TryFailed);
        let v = a.binary(&origin(), BinaryOp::Add, &Value::Int(1), &Value::Int(2)).unwrap();
        assert!(matches!(v, Value::Int(3)));
    }

    #[test]
    fn unary_negate_stays_in_tower() {
        let a = DefaultArithmetic::default();
        assert!(matches!(a.unary(&origin(), UnaryOp::Neg, &Value::Int(5)).unwrap(), Value::Int(-5)));
        assert!(matches!(a.unary(&origin(), UnaryOp::BitNot, &Value::Int(0)).unwrap(), Value::Int(-1)));
    }

    #[test]
    fn contains_across_shapes() {
        assert!(contains(&Value::array(vec![Value::Int(1), Value::Int(2)]), &Value::Int(2)));
        assert!(contains(&Value::map(vec![(Value::str("k"), Value::Int(1))]), &Value::str("k")));
        assert!(contains(&Value::Range(1, 5), &Value::Int(3)));
        assert!(!contains(&Value::Range(1, 5), &Value::Int(9)));
    }

    #[test]
    fn compare_is_consistent_for_mixed_numeric() {
        let a = DefaultArithmetic::default();
        assert!(a.compare(&origin(), &Value::Int(1), &Value::F64(1.0), BinaryOp::Eq).unwrap());
        assert!(a.compare(&origin(), &Value::Int(1), &Value::Long(2), BinaryOp::Lt).unwrap());
    }
}
