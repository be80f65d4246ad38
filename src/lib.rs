//! An embeddable, Java-JEXL-flavored expression and scripting language:
//! feature-gated parser, tree-walking interpreter, pluggable arithmetic and
//! member resolution, lexical scoping, cancellation, a parse cache, and a
//! line-oriented template engine (JXLT) built on top of it all.
//!
//! `engine::Jexl` is the entry point a host actually constructs; the other
//! modules are the pieces it wires together and are public so a host can
//! swap any one of them out (a custom `Uberspect`, a custom `Arithmetic`,
//! or driving `parser`/`interpreter` directly without the façade).

pub mod arithmetic;
pub mod ast;
pub mod cache;
pub mod context;
pub mod engine;
pub mod error;
pub mod features;
pub mod interpreter;
pub mod jxlt;
pub mod lexer;
pub mod options;
pub mod origin;
pub mod parser;
pub mod printer;
pub mod scope;
pub mod uberspect;
pub mod value;

pub use engine::{Callable, Expression, Jexl, JexlBuilder, Script};
pub use error::{JexlError, JexlResult};
pub use options::JexlOptions;
pub use value::Value;
