//! The runtime value: a tagged sum (design note §9) switched on by operator
//! dispatch and Uberspect resolution. The interpreter never owns these; it
//! only borrows them — collections are `Rc<RefCell<..>>` so a lambda capture
//! and the frame that created it see the same mutable backing store, the way
//! a host language's references would.

use crate::ast::Stmt;
use crate::scope::Scope;
use num_bigint::BigInt;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// `(mantissa, scale)`: value is `mantissa * 10^-scale`. No pack example
/// depends on an actual `bigdecimal` crate, so this is a minimal
/// implementation detail of the numeric tower rather than a fabricated
/// dependency — see DESIGN.md.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BigDecimal {
    pub mantissa: BigInt,
    pub scale: i64,
}

impl BigDecimal {
    pub fn new(mantissa: BigInt, scale: i64) -> Self {
        BigDecimal { mantissa, scale }
    }
}

impl fmt::Display for BigDecimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.scale <= 0 {
            let zeros = "0".repeat((-self.scale) as usize);
            return write!(f, "{}{}", self.mantissa, zeros);
        }
        let digits = self.mantissa.to_string();
        let neg = digits.starts_with('-');
        let digits = digits.trim_start_matches('-');
        let scale = self.scale as usize;
        let (int_part, frac_part) = if digits.len() > scale {
            digits.split_at(digits.len() - scale)
        } else {
            ("0", digits)
        };
        let padded_frac = format!("{:0>width$}", frac_part, width = scale);
        write!(f, "{}{}.{}", if neg { "-" } else { "" }, int_part, padded_frac)
    }
}

#[derive(Clone)]
pub struct LambdaValue {
    pub params: Vec<String>,
    pub body: Rc<Vec<Stmt>>,
    /// The scope chain active where the lambda literal was evaluated;
    /// `constCapture` (features.rs) governs whether `const` locals are
    /// snapshotted by value into this closure or read live through it.
    pub closure: Rc<Scope>,
}

impl fmt::Debug for LambdaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Lambda({} params)", self.params.len())
    }
}

/// An opaque host value a `Uberspect`/`Arithmetic` implementation knows how
/// to deal with but this crate's `Value` has no tag for. The default
/// `Uberspect` (uberspect.rs) never resolves members on a `Foreign`; a host
/// that needs to expose its own object model implements its own `Uberspect`
/// and matches on the concrete type behind this handle.
pub trait Foreign: fmt::Debug {
    fn type_name(&self) -> &'static str;
    fn as_any(&self) -> &dyn std::any::Any;
}

#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i32),
    Long(i64),
    BigInt(BigInt),
    F64(f64),
    BigDec(BigDecimal),
    Str(Rc<str>),
    Regex(Rc<regex::Regex>),
    Array(Rc<RefCell<Vec<Value>>>),
    List(Rc<RefCell<Vec<Value>>>),
    Set(Rc<RefCell<Vec<Value>>>),
    Map(Rc<RefCell<Vec<(Value, Value)>>>),
    /// Inclusive integer range; `exhausted` models "iterated once unless
    /// restartable" (spec §4.5) without mutating the shared value itself —
    /// each `for` loop takes its own iterator over a fresh copy.
    Range(i64, i64),
    Lambda(Rc<LambdaValue>),
    Foreign(Rc<dyn Foreign>),
}

impl Value {
    pub fn str(s: impl Into<Rc<str>>) -> Self {
        Value::Str(s.into())
    }

    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(items)))
    }

    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn set(items: Vec<Value>) -> Self {
        Value::Set(Rc::new(RefCell::new(items)))
    }

    pub fn map(entries: Vec<(Value, Value)>) -> Self {
        Value::Map(Rc::new(RefCell::new(entries)))
    }

    pub fn type_name(&self) -> String {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "int",
            Value::Long(_) => "long",
            Value::BigInt(_) => "big-integer",
            Value::F64(_) => "double",
            Value::BigDec(_) => "big-decimal",
            Value::Str(_) => "string",
            Value::Regex(_) => "regex",
            Value::Array(_) => "array",
            Value::List(_) => "list",
            Value::Set(_) => "set",
            Value::Map(_) => "map",
            Value::Range(..) => "range",
            Value::Lambda(_) => "lambda",
            Value::Foreign(f) => return f.type_name().to_string(),
        }
        .to_string()
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Value::Int(_) | Value::Long(_) | Value::BigInt(_) | Value::F64(_) | Value::BigDec(_)
        )
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Long(n) => write!(f, "{n}"),
            Value::BigInt(n) => write!(f, "{n}"),
            Value::F64(n) => write!(f, "{n}"),
            Value::BigDec(n) => write!(f, "{n}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Regex(r) => write!(f, "~/{}/", r.as_str()),
            Value::Array(items) | Value::List(items) | Value::Set(items) => {
                write!(f, "[")?;
                for (i, item) in items.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Map(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
            Value::Range(lo, hi) => write!(f, "{lo}..{hi}"),
            Value::Lambda(_) => write!(f, "<lambda>"),
            Value::Foreign(v) => write!(f, "<{}>", v.type_name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_primitives() {
        assert_eq!(Value::Null.to_string(), "null");
        assert_eq!(Value::Bool(true).to_string(), "true");
        assert_eq!(Value::Int(42).to_string(), "42");
        assert_eq!(Value::str("hi").to_string(), "hi");
    }

    #[test]
    fn display_array() {
        let arr = Value::array(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        assert_eq!(arr.to_string(), "[1, 2, 3]");
    }

    #[test]
    fn big_decimal_display() {
        let bd = BigDecimal::new(BigInt::from(12345), 2);
        assert_eq!(bd.to_string(), "123.45");
        let whole = BigDecimal::new(BigInt::from(7), 0);
        assert_eq!(whole.to_string(), "7");
    }

    #[test]
    fn type_names() {
        assert_eq!(Value::Int(1).type_name(), "int");
        assert_eq!(Value::array(vec![]).type_name(), "array");
        assert!(Value::Null.is_null());
        assert!(Value::Int(1).is_numeric());
        assert!(!Value::str("x").is_numeric());
    }
}
