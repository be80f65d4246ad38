//! Debug printer: reconstructs source text from the AST, round-trippable to
//! within whitespace. Backs `Script::get_parsed_text()` — reparsing printer
//! output must reproduce an equivalent tree (§8's "print-then-reparse"
//! invariant).

use crate::ast::*;

pub fn print_root(root: &Root) -> String {
    match root {
        Root::Expression(e) => print_expr(e),
        Root::Script { body, pragmas, .. } => {
            let mut out = String::new();
            for p in pragmas {
                out.push_str(&format!("#pragma {} {}\n", p.key, print_literal(&p.value)));
            }
            for (i, stmt) in body.iter().enumerate() {
                if i > 0 {
                    out.push('\n');
                }
                out.push_str(&print_stmt(stmt));
            }
            out
        }
    }
}

pub fn print_stmt(stmt: &Stmt) -> String {
    match stmt {
        Stmt::Expr(e) => print_expr(e),
        Stmt::Block(stmts) => {
            let mut out = String::from("{ ");
            for (i, s) in stmts.iter().enumerate() {
                if i > 0 {
                    out.push_str("; ");
                }
                out.push_str(&print_stmt(s));
            }
            out.push_str(" }");
            out
        }
        Stmt::If { cond, then_branch, else_branch, .. } => {
            let mut out = format!("if ({}) {}", print_expr(cond), print_stmt(then_branch));
            if let Some(e) = else_branch {
                out.push_str(&format!(" else {}", print_stmt(e)));
            }
            out
        }
        Stmt::While { cond, body, .. } => format!("while ({}) {}", print_expr(cond), print_stmt(body)),
        Stmt::DoWhile { body, cond, .. } => format!("do {} while ({})", print_stmt(body), print_expr(cond)),
        Stmt::ForC { init, cond, step, body, .. } => format!(
            "for ({}; {}; {}) {}",
            init.as_deref().map(print_stmt).unwrap_or_default(),
            cond.as_ref().map(print_expr).unwrap_or_default(),
            step.as_deref().map(print_stmt).unwrap_or_default(),
            print_stmt(body)
        ),
        Stmt::ForEach { kind, var, iterable, body, .. } => {
            format!("for ({} {} in {}) {}", print_decl_kind(*kind), var, print_expr(iterable), print_stmt(body))
        }
        Stmt::Break(_) => "break".to_string(),
        Stmt::Continue(_) => "continue".to_string(),
        Stmt::Remove(_) => "remove".to_string(),
        Stmt::Return(Some(e), _) => format!("return {}", print_expr(e)),
        Stmt::Return(None, _) => "return".to_string(),
        Stmt::Annotated { name, args, body, .. } => format!("@{}{} {}", name, print_args(args), print_stmt(body)),
        Stmt::Pragma(p) => format!("#pragma {} {}", p.key, print_literal(&p.value)),
    }
}

fn print_decl_kind(k: DeclKind) -> &'static str {
    match k {
        DeclKind::Var => "var",
        DeclKind::Let => "let",
        DeclKind::Const => "const",
    }
}

pub fn print_expr(expr: &Expr) -> String {
    match expr {
        Expr::Literal(lit, _) => print_literal(lit),
        Expr::Identifier { segments, .. } => segments.join("."),
        Expr::Member { receiver, name, safe, .. } => {
            format!("{}{}{}", print_expr(receiver), if *safe { "?." } else { "." }, name)
        }
        Expr::Index { receiver, index, safe, .. } => {
            format!("{}{}[{}]", print_expr(receiver), if *safe { "?" } else { "" }, print_expr(index))
        }
        Expr::TemplateMember { receiver, name_template, safe, .. } => {
            format!("{}{}{}", print_expr(receiver), if *safe { "?." } else { "." }, print_expr(name_template))
        }
        Expr::Unary { op, operand, .. } => format!("{}{}", print_unary_op(*op), print_expr(operand)),
        Expr::Postfix { op, operand, .. } => {
            format!("{}{}", print_expr(operand), if *op == PostfixOp::PostIncr { "++" } else { "--" })
        }
        Expr::Binary { op, lhs, rhs, .. } => {
            format!("({} {} {})", print_expr(lhs), op.symbol(), print_expr(rhs))
        }
        Expr::Ternary { cond, then_branch, else_branch, .. } => {
            format!("({} ? {} : {})", print_expr(cond), print_expr(then_branch), print_expr(else_branch))
        }
        Expr::Elvis { cond, else_branch, .. } => format!("({} ?: {})", print_expr(cond), print_expr(else_branch)),
        Expr::Coalesce { lhs, rhs, .. } => format!("({} ?? {})", print_expr(lhs), print_expr(rhs)),
        Expr::Assign { target, value, .. } => format!("{} = {}", print_expr(target), print_expr(value)),
        Expr::CompoundAssign { op, target, value, .. } => {
            format!("{} {} {}", print_expr(target), compound_symbol(*op), print_expr(value))
        }
        Expr::MultiAssign { targets, value, .. } => {
            let t = targets.iter().map(print_expr).collect::<Vec<_>>().join(", ");
            format!("({}) = {}", t, print_expr(value))
        }
        Expr::Declare { kind, name, init, .. } => match init {
            Some(v) => format!("{} {} = {}", print_decl_kind(*kind), name, print_expr(v)),
            None => format!("{} {}", print_decl_kind(*kind), name),
        },
        Expr::ArrayLiteral { elements, .. } => format!("[{}]", print_elements(elements)),
        Expr::SetLiteral { elements, .. } => format!("{{{}}}", print_elements(elements)),
        Expr::MapLiteral { entries, .. } => {
            let body = entries
                .iter()
                .map(|e| match e {
                    MapEntry::Pair { key, value } => format!("{}: {}", print_expr(key), print_expr(value)),
                    MapEntry::Spread(e) => format!("*: {}", print_expr(e)),
                })
                .collect::<Vec<_>>()
                .join(", ");
            format!("{{{body}}}")
        }
        Expr::Lambda { params, body, .. } => {
            let p = if params.len() == 1 { params[0].clone() } else { format!("({})", params.join(", ")) };
            let b = body.iter().map(print_stmt).collect::<Vec<_>>().join("; ");
            format!("{p} -> {{ {b} }}")
        }
        Expr::Call { callee, args, .. } => match &**callee {
            // A two-segment identifier callee only ever comes from a tight
            // `prefix:method` lex (see `Token::NamespaceIdent`); printing it
            // with the antish `.` join would reparse as a plain method call
            // instead of a namespace dispatch, so print the colon back.
            Expr::Identifier { segments, .. } if segments.len() == 2 => {
                format!("{}:{}{}", segments[0], segments[1], print_args(args))
            }
            _ => format!("{}{}", print_expr(callee), print_args(args)),
        },
        Expr::MethodCall { receiver, name, args, safe, .. } => {
            format!("{}{}{}{}", print_expr(receiver), if *safe { "?." } else { "." }, name, print_args(args))
        }
        Expr::New { class_name, args, .. } => format!("new {}{}", print_expr(class_name), print_args(args)),
        Expr::Interpolation { parts, .. } => {
            let mut out = String::from("`");
            for p in parts {
                match p {
                    InterpolationPart::Literal(s) => out.push_str(s),
                    InterpolationPart::Immediate(e) => out.push_str(&format!("${{{}}}", print_expr(e))),
                    InterpolationPart::Deferred(e) => out.push_str(&format!("#{{{}}}", print_expr(e))),
                }
            }
            out.push('`');
            out
        }
        Expr::Annotated { name, args, body, .. } => format!("@{}{} {}", name, print_args(args), print_stmt(body)),
    }
}

fn print_elements(elements: &[ArrayElement]) -> String {
    elements
        .iter()
        .map(|e| match e {
            ArrayElement::Value(e) => print_expr(e),
            ArrayElement::Spread(e) => format!("...{}", print_expr(e)),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn print_args(args: &[ArrayElement]) -> String {
    format!("({})", print_elements(args))
}

fn print_unary_op(op: UnaryOp) -> &'static str {
    match op {
        UnaryOp::Neg => "-",
        UnaryOp::Pos => "+",
        UnaryOp::Not => "!",
        UnaryOp::BitNot => "~",
        UnaryOp::PreIncr => "++",
        UnaryOp::PreDecr => "--",
    }
}

fn compound_symbol(op: CompoundOp) -> &'static str {
    match op {
        CompoundOp::AddAssign => "+=",
        CompoundOp::SubAssign => "-=",
        CompoundOp::MulAssign => "*=",
        CompoundOp::DivAssign => "/=",
        CompoundOp::ModAssign => "%=",
        CompoundOp::AndAssign => "&=",
        CompoundOp::OrAssign => "|=",
        CompoundOp::XorAssign => "^=",
        CompoundOp::ShlAssign => "<<=",
        CompoundOp::ShrAssign => ">>=",
        CompoundOp::UshrAssign => ">>>=",
    }
}

fn print_literal(lit: &Literal) -> String {
    match lit {
        Literal::Int(n) => n.to_string(),
        Literal::Long(n) => format!("{n}L"),
        Literal::BigInt(s) => format!("{s}H"),
        Literal::Double(n) => n.to_string(),
        Literal::BigDecimal(s) => format!("{s}B"),
        Literal::Bool(b) => b.to_string(),
        Literal::Null => "null".to_string(),
        Literal::Str(s) => format!("'{}'", s.replace('\'', "\\'")),
        Literal::Regex(pattern) => format!("~/{pattern}/"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureSet;
    use crate::parser::parse;

    fn roundtrip(src: &str) -> String {
        let root = parse(src, "t", FeatureSet::all()).unwrap();
        print_root(&root)
    }

    #[test]
    fn arithmetic_expression_reparses_equivalently() {
        let printed = roundtrip("1 + 2 * 3");
        let reparsed = parse(&printed, "t", FeatureSet::all()).unwrap();
        match reparsed {
            Root::Expression(Expr::Binary { op: BinaryOp::Add, .. }) => {}
            other => panic!("unexpected reprint/reparse result: {other:?}"),
        }
    }

    #[test]
    fn member_chain_prints_dotted() {
        assert_eq!(print_expr(&match parse("a.b.c", "t", FeatureSet::all()).unwrap() {
            Root::Expression(e) => e,
            _ => unreachable!(),
        }), "a.b.c");
    }

    #[test]
    fn if_else_prints_both_branches() {
        let printed = roundtrip("if (x > 0) { y = 1 } else { y = 2 }");
        assert!(printed.contains("if (") && printed.contains("else"));
    }
}
