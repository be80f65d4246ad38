//! Tagged AST (C3). Every node carries an `Origin`; the tree is immutable
//! after parse — any per-evaluation state (current iterator, current
//! cancellation) lives in the interpreter, never here.

use crate::origin::Origin;
use std::rc::Rc;

/// The root of a parsed unit: either a single expression (no statements) or
/// a script (a block of statements, optionally parameterized).
#[derive(Debug, Clone)]
pub enum Root {
    Expression(Expr),
    Script {
        params: Vec<String>,
        body: Vec<Stmt>,
        pragmas: Vec<Pragma>,
    },
}

#[derive(Debug, Clone)]
pub struct Pragma {
    pub key: String,
    pub value: Literal,
    pub origin: Origin,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Long(i64),
    BigInt(String),
    Double(f64),
    BigDecimal(String),
    Bool(bool),
    Null,
    Str(String),
    Regex(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Pos,
    Not,
    BitNot,
    PreIncr,
    PreDecr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostfixOp {
    PostIncr,
    PostDecr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    Ushr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Match,    // =~
    NotMatch, // !~
    StartsWith,
    NotStartsWith,
    EndsWith,
    NotEndsWith,
    In,
    Range, // ..
    And,
    Or,
}

impl BinaryOp {
    /// The symbol carried in an `Operator` error.
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::Ushr => ">>>",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Match => "=~",
            BinaryOp::NotMatch => "!~",
            BinaryOp::StartsWith => "=^",
            BinaryOp::NotStartsWith => "!^",
            BinaryOp::EndsWith => "=$",
            BinaryOp::NotEndsWith => "!$",
            BinaryOp::In => "in",
            BinaryOp::Range => "..",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompoundOp {
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
    ModAssign,
    AndAssign,
    OrAssign,
    XorAssign,
    ShlAssign,
    ShrAssign,
    UshrAssign,
}

impl CompoundOp {
    pub fn self_operator_name(&self) -> &'static str {
        match self {
            CompoundOp::AddAssign => "selfAdd",
            CompoundOp::SubAssign => "selfSub",
            CompoundOp::MulAssign => "selfMul",
            CompoundOp::DivAssign => "selfDiv",
            CompoundOp::ModAssign => "selfMod",
            CompoundOp::AndAssign => "selfAnd",
            CompoundOp::OrAssign => "selfOr",
            CompoundOp::XorAssign => "selfXor",
            CompoundOp::ShlAssign => "selfShl",
            CompoundOp::ShrAssign => "selfShr",
            CompoundOp::UshrAssign => "selfUshr",
        }
    }

    pub fn as_binary(&self) -> BinaryOp {
        match self {
            CompoundOp::AddAssign => BinaryOp::Add,
            CompoundOp::SubAssign => BinaryOp::Sub,
            CompoundOp::MulAssign => BinaryOp::Mul,
            CompoundOp::DivAssign => BinaryOp::Div,
            CompoundOp::ModAssign => BinaryOp::Mod,
            CompoundOp::AndAssign => BinaryOp::BitAnd,
            CompoundOp::OrAssign => BinaryOp::BitOr,
            CompoundOp::XorAssign => BinaryOp::BitXor,
            CompoundOp::ShlAssign => BinaryOp::Shl,
            CompoundOp::ShrAssign => BinaryOp::Shr,
            CompoundOp::UshrAssign => BinaryOp::Ushr,
        }
    }
}

/// Declaration kind for a variable binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    Var,
    Let,
    Const,
}

#[derive(Debug, Clone)]
pub enum Expr {
    Literal(Literal, Origin),

    /// Simple name, or a dotted "ant-ish" candidate (`a.b.c`) — the parser
    /// does not disambiguate; `Identifier` always carries the full dotted
    /// text it read and the interpreter decides at evaluation time whether
    /// it is one antish name or a member chain rooted at `segments[0]`.
    Identifier { segments: Vec<String>, origin: Origin },

    /// `a.b`, `a[b]`, and their safe variants, threaded onto a receiver.
    Member {
        receiver: Box<Expr>,
        name: String,
        safe: bool,
        origin: Origin,
    },
    Index {
        receiver: Box<Expr>,
        index: Box<Expr>,
        safe: bool,
        origin: Origin,
    },
    /// `` x.`c${a}ss` `` — a member name computed from a template string.
    TemplateMember {
        receiver: Box<Expr>,
        name_template: Box<Expr>,
        safe: bool,
        origin: Origin,
    },

    Unary { op: UnaryOp, operand: Box<Expr>, origin: Origin },
    Postfix { op: PostfixOp, operand: Box<Expr>, origin: Origin },
    Binary { op: BinaryOp, lhs: Box<Expr>, rhs: Box<Expr>, origin: Origin },

    Ternary { cond: Box<Expr>, then_branch: Box<Expr>, else_branch: Box<Expr>, origin: Origin },
    /// Elvis `?:`: `cond ?: else_branch` evaluates `cond` once.
    Elvis { cond: Box<Expr>, else_branch: Box<Expr>, origin: Origin },
    /// `??`: null-coalescing.
    Coalesce { lhs: Box<Expr>, rhs: Box<Expr>, origin: Origin },

    Assign { target: Box<Expr>, value: Box<Expr>, origin: Origin },
    CompoundAssign { op: CompoundOp, target: Box<Expr>, value: Box<Expr>, origin: Origin },
    /// `(x, y) = expr`
    MultiAssign { targets: Vec<Expr>, value: Box<Expr>, origin: Origin },

    Declare {
        kind: DeclKind,
        name: String,
        init: Option<Box<Expr>>,
        origin: Origin,
    },

    ArrayLiteral { elements: Vec<ArrayElement>, origin: Origin },
    SetLiteral { elements: Vec<ArrayElement>, origin: Origin },
    MapLiteral { entries: Vec<MapEntry>, origin: Origin },

    Lambda {
        params: Vec<String>,
        body: Rc<Vec<Stmt>>,
        origin: Origin,
    },

    Call { callee: Box<Expr>, args: Vec<ArrayElement>, origin: Origin },
    MethodCall {
        receiver: Box<Expr>,
        name: String,
        args: Vec<ArrayElement>,
        safe: bool,
        origin: Origin,
    },
    New { class_name: Box<Expr>, args: Vec<ArrayElement>, origin: Origin },

    /// An interpolated template string: `` `a${b}c` ``.
    Interpolation { parts: Vec<InterpolationPart>, origin: Origin },

    /// `@name(args) expr` wrapping a sub-expression (annotations attach to
    /// statements per the grammar, but a bare expression-script is itself a
    /// one-statement script, so the node shape is shared).
    Annotated {
        name: String,
        args: Vec<ArrayElement>,
        body: Box<Stmt>,
        origin: Origin,
    },
}

#[derive(Debug, Clone)]
pub enum ArrayElement {
    Value(Expr),
    /// `...x` — spreads an iterable; null spreads as empty.
    Spread(Expr),
}

#[derive(Debug, Clone)]
pub enum MapEntry {
    Pair { key: Expr, value: Expr },
    /// `{*: ...x}` — map-spread form.
    Spread(Expr),
}

#[derive(Debug, Clone)]
pub enum InterpolationPart {
    Literal(String),
    /// `${expr}` — immediate.
    Immediate(Expr),
    /// `#{expr}` — deferred: evaluates to another expression, re-evaluated
    /// per outer evaluation.
    Deferred(Expr),
}

impl Expr {
    pub fn origin(&self) -> &Origin {
        match self {
            Expr::Literal(_, o)
            | Expr::Identifier { origin: o, .. }
            | Expr::Member { origin: o, .. }
            | Expr::Index { origin: o, .. }
            | Expr::TemplateMember { origin: o, .. }
            | Expr::Unary { origin: o, .. }
            | Expr::Postfix { origin: o, .. }
            | Expr::Binary { origin: o, .. }
            | Expr::Ternary { origin: o, .. }
            | Expr::Elvis { origin: o, .. }
            | Expr::Coalesce { origin: o, .. }
            | Expr::Assign { origin: o, .. }
            | Expr::CompoundAssign { origin: o, .. }
            | Expr::MultiAssign { origin: o, .. }
            | Expr::Declare { origin: o, .. }
            | Expr::ArrayLiteral { origin: o, .. }
            | Expr::SetLiteral { origin: o, .. }
            | Expr::MapLiteral { origin: o, .. }
            | Expr::Lambda { origin: o, .. }
            | Expr::Call { origin: o, .. }
            | Expr::MethodCall { origin: o, .. }
            | Expr::New { origin: o, .. }
            | Expr::Interpolation { origin: o, .. }
            | Expr::Annotated { origin: o, .. } => o,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Expr(Expr),
    Block(Vec<Stmt>),
    If {
        cond: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
        origin: Origin,
    },
    While { cond: Expr, body: Box<Stmt>, origin: Origin },
    DoWhile { body: Box<Stmt>, cond: Expr, origin: Origin },
    ForC {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        step: Option<Box<Stmt>>,
        body: Box<Stmt>,
        origin: Origin,
    },
    ForEach {
        kind: DeclKind,
        var: String,
        iterable: Expr,
        body: Box<Stmt>,
        origin: Origin,
    },
    Break(Origin),
    Continue(Origin),
    Remove(Origin),
    Return(Option<Expr>, Origin),
    Annotated {
        name: String,
        args: Vec<ArrayElement>,
        body: Box<Stmt>,
        origin: Origin,
    },
    Pragma(Pragma),
}

impl Stmt {
    pub fn origin(&self) -> &Origin {
        match self {
            Stmt::Expr(e) => e.origin(),
            Stmt::Block(stmts) => stmts.first().map(|s| s.origin()).unwrap_or(&UNKNOWN_ORIGIN),
            Stmt::If { origin, .. }
            | Stmt::While { origin, .. }
            | Stmt::DoWhile { origin, .. }
            | Stmt::ForC { origin, .. }
            | Stmt::ForEach { origin, .. }
            | Stmt::Break(origin)
            | Stmt::Continue(origin)
            | Stmt::Remove(origin)
            | Stmt::Return(_, origin)
            | Stmt::Annotated { origin, .. } => origin,
            Stmt::Pragma(p) => &p.origin,
        }
    }
}

// An empty block has nowhere to borrow an origin from; this synthetic
// placeholder keeps `Stmt::origin` infallible without allocating per call.
// Never shown to a user as a real source location.
static UNKNOWN_ORIGIN: once_cell::sync::Lazy<Origin> =
    once_cell::sync::Lazy::new(|| Origin::unknown("<empty>"));
