//! Recursive-descent, precedence-climbing parser (C2, second half) turning
//! a token stream into the tagged AST (C3). One token of lookahead, with a
//! `mark`/`reset` checkpoint pair used for the handful of genuinely
//! ambiguous prefixes (`(` starting a grouped expression, a lambda
//! parameter list, or a multi-assignment target) rather than a general
//! backtracking engine.
//!
//! Precedence, loosest to tightest: assignment; ternary/elvis/coalesce; `||`;
//! `&&`; `|`; `^`; `&`; equality (`== != =~ !~ =^ !^ =$ !$`); relational
//! (`< <= > >= in`); shift (`<< >> >>>`); range (`..`); additive; multiplicative;
//! unary; postfix (member/index/call chains). Shift sits below additive by
//! design so `1 + 2 << 3` means `(1 + 2) << 3`, matching how most C-family
//! languages read it even though Java itself ranks them the other way.

use crate::ast::*;
use crate::error::{JexlError, JexlResult};
use crate::features::FeatureSet;
use crate::lexer::{Lexer, SpannedToken, Token};
use crate::origin::{Origin, SourceMap};
use std::rc::Rc;

pub struct Parser<'a> {
    source: &'a str,
    source_name: String,
    lexer: Lexer<'a>,
    source_map: SourceMap,
    current: Option<SpannedToken<'a>>,
    features: FeatureSet,
}

pub fn parse(source: &str, source_name: &str, features: FeatureSet) -> JexlResult<Root> {
    Parser::new(source, source_name, features)?.parse_root()
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str, source_name: &str, features: FeatureSet) -> JexlResult<Self> {
        let mut parser = Parser {
            source,
            source_name: source_name.to_string(),
            lexer: Lexer::new(source, source_name),
            source_map: SourceMap::new(source),
            current: None,
            features,
        };
        parser.advance()?;
        Ok(parser)
    }

    fn advance(&mut self) -> JexlResult<()> {
        self.current = self.lexer.next_token().transpose()?;
        Ok(())
    }

    fn peek(&self) -> Option<&Token> {
        self.current.as_ref().map(|t| &t.token)
    }

    fn at(&self, tok: &Token) -> bool {
        self.peek() == Some(tok)
    }

    fn text(&self) -> &'a str {
        self.current.as_ref().map(|t| t.text).unwrap_or("")
    }

    fn origin_here(&self) -> Origin {
        match &self.current {
            Some(t) => self.source_map.origin(&self.source_name, t.span),
            None => self
                .source_map
                .origin(&self.source_name, crate::origin::Span::new(self.source.len(), self.source.len())),
        }
    }

    fn mark(&self) -> usize {
        self.current.as_ref().map(|t| t.span.start).unwrap_or(self.source.len())
    }

    fn reset(&mut self, mark: usize) -> JexlResult<()> {
        self.lexer.resume_at(mark);
        self.advance()
    }

    fn bump(&mut self) -> JexlResult<SpannedToken<'a>> {
        let tok = self.current.take().ok_or_else(|| self.eof_error())?;
        self.advance()?;
        Ok(tok)
    }

    fn eof_error(&self) -> JexlError {
        JexlError::parsing(self.origin_here(), "unexpected end of input")
    }

    fn expect(&mut self, tok: Token, what: &str) -> JexlResult<()> {
        if self.at(&tok) {
            self.bump()?;
            Ok(())
        } else {
            Err(JexlError::parsing(self.origin_here(), format!("expected {what}, found '{}'", self.text())))
        }
    }

    // ---- top level ----

    pub fn parse_root(&mut self) -> JexlResult<Root> {
        let mut pragmas = Vec::new();
        while self.at(&Token::Hash) {
            pragmas.push(self.parse_pragma()?);
        }
        let mut stmts = Vec::new();
        while self.current.is_some() {
            stmts.push(self.parse_stmt()?);
            while self.at(&Token::Semicolon) {
                self.bump()?;
            }
        }
        if pragmas.is_empty() && stmts.len() == 1 {
            if let Stmt::Expr(e) = &stmts[0] {
                return Ok(Root::Expression(e.clone()));
            }
        }
        if !self.features.script() {
            return Err(JexlError::feature(self.origin_here(), "script"));
        }
        Ok(Root::Script {
            params: Vec::new(),
            body: stmts,
            pragmas,
        })
    }

    fn parse_pragma(&mut self) -> JexlResult<Pragma> {
        let origin = self.origin_here();
        if !self.features.pragma() {
            return Err(JexlError::feature(origin, "pragma"));
        }
        self.expect(Token::Hash, "'#'")?;
        self.expect_ident("pragma")?;
        let key = self.expect_dotted_ident()?;
        if key == "jexl.import" && !self.features.import_pragma() {
            return Err(JexlError::feature(origin, "import_pragma"));
        }
        if key.starts_with("jexl.namespace.") && !self.features.namespace_pragma() {
            return Err(JexlError::feature(origin, "namespace_pragma"));
        }
        let value = self.parse_literal_value()?;
        Ok(Pragma { key, value, origin })
    }

    fn expect_ident(&mut self, expected: &str) -> JexlResult<()> {
        if self.at(&Token::Identifier) && self.text() == expected {
            self.bump()?;
            Ok(())
        } else {
            Err(JexlError::parsing(self.origin_here(), format!("expected '{expected}'")))
        }
    }

    fn expect_dotted_ident(&mut self) -> JexlResult<String> {
        let mut out = self.expect_identifier_text()?;
        while self.at(&Token::Dot) {
            self.bump()?;
            out.push('.');
            out.push_str(&self.expect_identifier_text()?);
        }
        Ok(out)
    }

    fn expect_identifier_text(&mut self) -> JexlResult<String> {
        if self.at(&Token::Identifier) {
            let t = self.bump()?;
            Ok(t.text.to_string())
        } else {
            Err(JexlError::parsing(self.origin_here(), "expected identifier"))
        }
    }

    fn parse_literal_value(&mut self) -> JexlResult<Literal> {
        let origin = self.origin_here();
        let expr = self.parse_primary()?;
        match expr {
            Expr::Literal(lit, _) => Ok(lit),
            Expr::Identifier { segments, .. } => Ok(Literal::Str(segments.join("."))),
            _ => Err(JexlError::parsing(origin, "pragma value must be a literal")),
        }
    }

    // ---- statements ----

    fn parse_stmt(&mut self) -> JexlResult<Stmt> {
        match self.peek() {
            Some(Token::LBrace) => self.parse_block(),
            Some(Token::KwIf) => self.parse_if(),
            Some(Token::KwWhile) => self.parse_while(),
            Some(Token::KwDo) => self.parse_do_while(),
            Some(Token::KwFor) => self.parse_for(),
            Some(Token::KwBreak) => {
                let origin = self.origin_here();
                self.bump()?;
                Ok(Stmt::Break(origin))
            }
            Some(Token::KwContinue) => {
                let origin = self.origin_here();
                self.bump()?;
                Ok(Stmt::Continue(origin))
            }
            Some(Token::KwRemove) => {
                let origin = self.origin_here();
                self.bump()?;
                Ok(Stmt::Remove(origin))
            }
            Some(Token::KwReturn) => {
                let origin = self.origin_here();
                self.bump()?;
                if self.stmt_ends_here() {
                    Ok(Stmt::Return(None, origin))
                } else {
                    Ok(Stmt::Return(Some(self.parse_expr()?), origin))
                }
            }
            Some(Token::At) => self.parse_annotated_stmt(),
            Some(Token::Hash) => {
                if !self.features.pragma_anywhere() {
                    return Err(JexlError::feature(self.origin_here(), "pragma_anywhere"));
                }
                Ok(Stmt::Pragma(self.parse_pragma()?))
            }
            _ => Ok(Stmt::Expr(self.parse_expr()?)),
        }
    }

    fn stmt_ends_here(&self) -> bool {
        matches!(self.peek(), None | Some(Token::Semicolon) | Some(Token::RBrace))
    }

    fn parse_block(&mut self) -> JexlResult<Stmt> {
        self.expect(Token::LBrace, "'{'")?;
        let mut stmts = Vec::new();
        while !self.at(&Token::RBrace) {
            stmts.push(self.parse_stmt()?);
            while self.at(&Token::Semicolon) {
                self.bump()?;
            }
        }
        self.expect(Token::RBrace, "'}'")?;
        Ok(Stmt::Block(stmts))
    }

    fn parse_if(&mut self) -> JexlResult<Stmt> {
        let origin = self.origin_here();
        self.bump()?;
        self.expect(Token::LParen, "'('")?;
        let cond = self.parse_expr()?;
        self.expect(Token::RParen, "')'")?;
        let then_branch = Box::new(self.parse_stmt()?);
        let else_branch = if self.at(&Token::KwElse) {
            self.bump()?;
            Some(Box::new(self.parse_stmt()?))
        } else {
            None
        };
        Ok(Stmt::If { cond, then_branch, else_branch, origin })
    }

    fn parse_while(&mut self) -> JexlResult<Stmt> {
        let origin = self.origin_here();
        if !self.features.loops() {
            return Err(JexlError::feature(origin, "loops"));
        }
        self.bump()?;
        self.expect(Token::LParen, "'('")?;
        let cond = self.parse_expr()?;
        self.expect(Token::RParen, "')'")?;
        let body = Box::new(self.parse_stmt()?);
        Ok(Stmt::While { cond, body, origin })
    }

    fn parse_do_while(&mut self) -> JexlResult<Stmt> {
        let origin = self.origin_here();
        if !self.features.loops() {
            return Err(JexlError::feature(origin, "loops"));
        }
        self.bump()?;
        let body = Box::new(self.parse_stmt()?);
        self.expect(Token::KwWhile, "'while'")?;
        self.expect(Token::LParen, "'('")?;
        let cond = self.parse_expr()?;
        self.expect(Token::RParen, "')'")?;
        Ok(Stmt::DoWhile { body, cond, origin })
    }

    fn parse_for(&mut self) -> JexlResult<Stmt> {
        let origin = self.origin_here();
        if !self.features.loops() {
            return Err(JexlError::feature(origin, "loops"));
        }
        self.bump()?;
        self.expect(Token::LParen, "'('")?;

        let decl_kind = match self.peek() {
            Some(Token::KwVar) => Some(DeclKind::Var),
            Some(Token::KwLet) => Some(DeclKind::Let),
            Some(Token::KwConst) => Some(DeclKind::Const),
            _ => None,
        };
        if let Some(kind) = decl_kind {
            let save = self.mark();
            self.bump()?;
            if self.at(&Token::Identifier) {
                let var = self.expect_identifier_text()?;
                if self.at(&Token::KwIn) {
                    self.bump()?;
                    let iterable = self.parse_expr()?;
                    self.expect(Token::RParen, "')'")?;
                    let body = Box::new(self.parse_stmt()?);
                    return Ok(Stmt::ForEach { kind, var, iterable, body, origin });
                }
            }
            self.reset(save)?;
        }

        let init = if self.at(&Token::Semicolon) { None } else { Some(Box::new(self.parse_stmt()?)) };
        self.expect(Token::Semicolon, "';'")?;
        let cond = if self.at(&Token::Semicolon) { None } else { Some(self.parse_expr()?) };
        self.expect(Token::Semicolon, "';'")?;
        let step = if self.at(&Token::RParen) { None } else { Some(Box::new(Stmt::Expr(self.parse_expr()?))) };
        self.expect(Token::RParen, "')'")?;
        let body = Box::new(self.parse_stmt()?);
        Ok(Stmt::ForC { init, cond, step, body, origin })
    }

    fn parse_annotated_stmt(&mut self) -> JexlResult<Stmt> {
        let origin = self.origin_here();
        if !self.features.annotation() {
            return Err(JexlError::feature(origin, "annotation"));
        }
        self.bump()?;
        let name = self.expect_identifier_text()?;
        let args = if self.at(&Token::LParen) { self.parse_arg_list()? } else { Vec::new() };
        let body = Box::new(self.parse_stmt()?);
        Ok(Stmt::Annotated { name, args, body, origin })
    }

    fn parse_arg_list(&mut self) -> JexlResult<Vec<ArrayElement>> {
        self.expect(Token::LParen, "'('")?;
        let mut args = Vec::new();
        while !self.at(&Token::RParen) {
            args.push(self.parse_spreadable_element()?);
            if self.at(&Token::Comma) {
                self.bump()?;
            } else {
                break;
            }
        }
        self.expect(Token::RParen, "')'")?;
        Ok(args)
    }

    // ---- expressions ----

    fn parse_expr(&mut self) -> JexlResult<Expr> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> JexlResult<Expr> {
        if self.at(&Token::KwVar) || self.at(&Token::KwLet) || self.at(&Token::KwConst) {
            return self.parse_declare();
        }
        if self.at(&Token::LParen) {
            if let Some(multi) = self.try_parse_multi_assign()? {
                return Ok(multi);
            }
        }

        let target = self.parse_ternary()?;

        if self.at(&Token::Eq) {
            let origin = self.origin_here();
            if !self.features.side_effect() {
                return Err(JexlError::feature(origin, "side_effect"));
            }
            self.bump()?;
            let value = Box::new(self.parse_assignment()?);
            return Ok(Expr::Assign { target: Box::new(target), value, origin });
        }
        if let Some(op) = self.peek_compound_op() {
            let origin = self.origin_here();
            if !self.features.side_effect() {
                return Err(JexlError::feature(origin, "side_effect"));
            }
            self.bump()?;
            let value = Box::new(self.parse_assignment()?);
            return Ok(Expr::CompoundAssign { op, target: Box::new(target), value, origin });
        }
        Ok(target)
    }

    fn peek_compound_op(&self) -> Option<CompoundOp> {
        match self.peek()? {
            Token::PlusEq => Some(CompoundOp::AddAssign),
            Token::MinusEq => Some(CompoundOp::SubAssign),
            Token::StarEq => Some(CompoundOp::MulAssign),
            Token::SlashEq => Some(CompoundOp::DivAssign),
            Token::PercentEq => Some(CompoundOp::ModAssign),
            Token::AmpEq => Some(CompoundOp::AndAssign),
            Token::PipeEq => Some(CompoundOp::OrAssign),
            Token::CaretEq => Some(CompoundOp::XorAssign),
            Token::ShlEq => Some(CompoundOp::ShlAssign),
            Token::ShrEq => Some(CompoundOp::ShrAssign),
            Token::UshrEq => Some(CompoundOp::UshrAssign),
            _ => None,
        }
    }

    fn parse_declare(&mut self) -> JexlResult<Expr> {
        let origin = self.origin_here();
        if !self.features.local_var() {
            return Err(JexlError::feature(origin, "local_var"));
        }
        let kind = match self.bump()?.token {
            Token::KwVar => DeclKind::Var,
            Token::KwLet => DeclKind::Let,
            Token::KwConst => DeclKind::Const,
            _ => unreachable!(),
        };
        let name = self.expect_identifier_text()?;
        let init = if self.at(&Token::Eq) {
            self.bump()?;
            Some(Box::new(self.parse_assignment()?))
        } else {
            if kind == DeclKind::Const {
                return Err(JexlError::parsing(origin, "const declaration requires an initializer"));
            }
            None
        };
        Ok(Expr::Declare { kind, name, init, origin })
    }

    /// Speculatively parses `(a, b, c) = value`; restores on any mismatch so
    /// the caller can fall back to a grouped expression or lambda.
    fn try_parse_multi_assign(&mut self) -> JexlResult<Option<Expr>> {
        let save = self.mark();
        let origin = self.origin_here();
        self.bump()?; // '('
        let mut targets = Vec::new();
        let mut ok = true;
        while !self.at(&Token::RParen) {
            match self.parse_postfix() {
                Ok(e) => targets.push(e),
                Err(_) => {
                    ok = false;
                    break;
                }
            }
            if self.at(&Token::Comma) {
                self.bump()?;
            } else {
                break;
            }
        }
        if ok && targets.len() > 1 && self.at(&Token::RParen) {
            self.bump()?;
            if self.at(&Token::Eq) {
                if !self.features.side_effect() {
                    return Err(JexlError::feature(origin, "side_effect"));
                }
                self.bump()?;
                let value = Box::new(self.parse_assignment()?);
                return Ok(Some(Expr::MultiAssign { targets, value, origin }));
            }
        }
        self.reset(save)?;
        Ok(None)
    }

    fn parse_ternary(&mut self) -> JexlResult<Expr> {
        let cond = self.parse_or()?;
        if self.at(&Token::Elvis) {
            let origin = self.origin_here();
            self.bump()?;
            let else_branch = Box::new(self.parse_assignment()?);
            return Ok(Expr::Elvis { cond: Box::new(cond), else_branch, origin });
        }
        if self.at(&Token::Coalesce) {
            let origin = self.origin_here();
            self.bump()?;
            let rhs = Box::new(self.parse_assignment()?);
            return Ok(Expr::Coalesce { lhs: Box::new(cond), rhs, origin });
        }
        if self.at(&Token::Question) {
            let origin = self.origin_here();
            self.bump()?;
            let then_branch = Box::new(self.parse_assignment()?);
            self.expect(Token::Colon, "':'")?;
            let else_branch = Box::new(self.parse_assignment()?);
            return Ok(Expr::Ternary { cond: Box::new(cond), then_branch, else_branch, origin });
        }
        Ok(cond)
    }

    fn parse_or(&mut self) -> JexlResult<Expr> {
        let mut lhs = self.parse_and()?;
        while self.at(&Token::OrOr) {
            let origin = self.origin_here();
            self.bump()?;
            let rhs = self.parse_and()?;
            lhs = Expr::Binary { op: BinaryOp::Or, lhs: Box::new(lhs), rhs: Box::new(rhs), origin };
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> JexlResult<Expr> {
        let mut lhs = self.parse_bitor()?;
        while self.at(&Token::AndAnd) {
            let origin = self.origin_here();
            self.bump()?;
            let rhs = self.parse_bitor()?;
            lhs = Expr::Binary { op: BinaryOp::And, lhs: Box::new(lhs), rhs: Box::new(rhs), origin };
        }
        Ok(lhs)
    }

    fn parse_bitor(&mut self) -> JexlResult<Expr> {
        let mut lhs = self.parse_bitxor()?;
        while self.at(&Token::Pipe) {
            let origin = self.origin_here();
            self.bump()?;
            let rhs = self.parse_bitxor()?;
            lhs = Expr::Binary { op: BinaryOp::BitOr, lhs: Box::new(lhs), rhs: Box::new(rhs), origin };
        }
        Ok(lhs)
    }

    fn parse_bitxor(&mut self) -> JexlResult<Expr> {
        let mut lhs = self.parse_bitand()?;
        while self.at(&Token::Caret) {
            let origin = self.origin_here();
            self.bump()?;
            let rhs = self.parse_bitand()?;
            lhs = Expr::Binary { op: BinaryOp::BitXor, lhs: Box::new(lhs), rhs: Box::new(rhs), origin };
        }
        Ok(lhs)
    }

    fn parse_bitand(&mut self) -> JexlResult<Expr> {
        let mut lhs = self.parse_equality()?;
        while self.at(&Token::Amp) {
            let origin = self.origin_here();
            self.bump()?;
            let rhs = self.parse_equality()?;
            lhs = Expr::Binary { op: BinaryOp::BitAnd, lhs: Box::new(lhs), rhs: Box::new(rhs), origin };
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> JexlResult<Expr> {
        let mut lhs = self.parse_relational()?;
        loop {
            let op = match self.peek() {
                Some(Token::EqEq) => BinaryOp::Eq,
                Some(Token::NotEq) => BinaryOp::Ne,
                Some(Token::Match) => BinaryOp::Match,
                Some(Token::NotMatch) => BinaryOp::NotMatch,
                Some(Token::StartsWith) => BinaryOp::StartsWith,
                Some(Token::NotStartsWith) => BinaryOp::NotStartsWith,
                Some(Token::EndsWith) => BinaryOp::EndsWith,
                Some(Token::NotEndsWith) => BinaryOp::NotEndsWith,
                Some(Token::KwEq) => self.word_comparator(BinaryOp::Eq)?,
                Some(Token::KwNe) => self.word_comparator(BinaryOp::Ne)?,
                _ => break,
            };
            let origin = self.origin_here();
            self.bump()?;
            let rhs = self.parse_relational()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs), origin };
        }
        Ok(lhs)
    }

    /// Word-form comparators (`eq`/`ne`/`lt`/`le`/`gt`/`ge`) lex as hard
    /// keywords but only parse as operators when the feature is on.
    fn word_comparator(&self, op: BinaryOp) -> JexlResult<BinaryOp> {
        if !self.features.comparator_names() {
            return Err(JexlError::feature(self.origin_here(), "comparator_names"));
        }
        Ok(op)
    }

    fn parse_relational(&mut self) -> JexlResult<Expr> {
        let mut lhs = self.parse_shift()?;
        loop {
            let op = match self.peek() {
                Some(Token::Lt) => BinaryOp::Lt,
                Some(Token::Le) => BinaryOp::Le,
                Some(Token::Gt) => BinaryOp::Gt,
                Some(Token::Ge) => BinaryOp::Ge,
                Some(Token::KwLt) => self.word_comparator(BinaryOp::Lt)?,
                Some(Token::KwLe) => self.word_comparator(BinaryOp::Le)?,
                Some(Token::KwGt) => self.word_comparator(BinaryOp::Gt)?,
                Some(Token::KwGe) => self.word_comparator(BinaryOp::Ge)?,
                Some(Token::KwIn) => BinaryOp::In,
                _ => break,
            };
            let origin = self.origin_here();
            self.bump()?;
            let rhs = self.parse_shift()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs), origin };
        }
        Ok(lhs)
    }

    fn parse_shift(&mut self) -> JexlResult<Expr> {
        let mut lhs = self.parse_range()?;
        loop {
            let op = match self.peek() {
                Some(Token::Shl) => BinaryOp::Shl,
                Some(Token::Shr) => BinaryOp::Shr,
                Some(Token::Ushr) => BinaryOp::Ushr,
                _ => break,
            };
            let origin = self.origin_here();
            self.bump()?;
            let rhs = self.parse_range()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs), origin };
        }
        Ok(lhs)
    }

    fn parse_range(&mut self) -> JexlResult<Expr> {
        let lhs = self.parse_additive()?;
        if self.at(&Token::DotDot) {
            let origin = self.origin_here();
            self.bump()?;
            let rhs = self.parse_additive()?;
            return Ok(Expr::Binary { op: BinaryOp::Range, lhs: Box::new(lhs), rhs: Box::new(rhs), origin });
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> JexlResult<Expr> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => break,
            };
            let origin = self.origin_here();
            self.bump()?;
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs), origin };
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> JexlResult<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                Some(Token::Percent) => BinaryOp::Mod,
                _ => break,
            };
            let origin = self.origin_here();
            self.bump()?;
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs), origin };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> JexlResult<Expr> {
        let op = match self.peek() {
            Some(Token::Bang) => Some(UnaryOp::Not),
            Some(Token::Minus) => Some(UnaryOp::Neg),
            Some(Token::Plus) => Some(UnaryOp::Pos),
            Some(Token::Tilde) => Some(UnaryOp::BitNot),
            Some(Token::PlusPlus) => Some(UnaryOp::PreIncr),
            Some(Token::MinusMinus) => Some(UnaryOp::PreDecr),
            _ => None,
        };
        if let Some(op) = op {
            let origin = self.origin_here();
            if matches!(op, UnaryOp::PreIncr | UnaryOp::PreDecr) && !self.features.side_effect() {
                return Err(JexlError::feature(origin, "side_effect"));
            }
            self.bump()?;
            let operand = Box::new(self.parse_unary()?);
            return Ok(Expr::Unary { op, operand, origin });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> JexlResult<Expr> {
        let mut expr = self.parse_call_chain()?;
        loop {
            let op = match self.peek() {
                Some(Token::PlusPlus) => Some(PostfixOp::PostIncr),
                Some(Token::MinusMinus) => Some(PostfixOp::PostDecr),
                _ => None,
            };
            if let Some(op) = op {
                let origin = self.origin_here();
                if !self.features.side_effect() {
                    return Err(JexlError::feature(origin, "side_effect"));
                }
                self.bump()?;
                expr = Expr::Postfix { op, operand: Box::new(expr), origin };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_call_chain(&mut self) -> JexlResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek() {
                Some(Token::Dot) | Some(Token::SafeDot) => {
                    let safe = matches!(self.peek(), Some(Token::SafeDot));
                    let origin = self.origin_here();
                    self.bump()?;
                    if self.at(&Token::Backtick) {
                        let name_template = Box::new(self.parse_template_string()?);
                        expr = Expr::TemplateMember { receiver: Box::new(expr), name_template, safe, origin };
                        continue;
                    }
                    let name = self.expect_identifier_text()?;
                    if self.at(&Token::LParen) {
                        if !self.features.method_call() {
                            return Err(JexlError::feature(origin, "method_call"));
                        }
                        let args = self.parse_arg_list()?;
                        expr = Expr::MethodCall { receiver: Box::new(expr), name, args, safe, origin };
                    } else {
                        expr = Expr::Member { receiver: Box::new(expr), name, safe, origin };
                    }
                }
                Some(Token::LBracket) => {
                    let origin = self.origin_here();
                    if !self.features.array_reference_expr() {
                        return Err(JexlError::feature(origin, "array_reference_expr"));
                    }
                    self.bump()?;
                    let index = Box::new(self.parse_expr()?);
                    self.expect(Token::RBracket, "']'")?;
                    expr = Expr::Index { receiver: Box::new(expr), index, safe: false, origin };
                }
                Some(Token::LParen) => {
                    let origin = self.origin_here();
                    let args = self.parse_arg_list()?;
                    expr = Expr::Call { callee: Box::new(expr), args, origin };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> JexlResult<Expr> {
        let origin = self.origin_here();
        match self.peek() {
            Some(Token::KwTrue) => {
                self.bump()?;
                Ok(Expr::Literal(Literal::Bool(true), origin))
            }
            Some(Token::KwFalse) => {
                self.bump()?;
                Ok(Expr::Literal(Literal::Bool(false), origin))
            }
            Some(Token::KwNull) => {
                self.bump()?;
                Ok(Expr::Literal(Literal::Null, origin))
            }
            Some(Token::IntLiteral) => self.parse_int_literal(origin),
            Some(Token::HexLiteral) => self.parse_hex_literal(origin),
            Some(Token::BigIntLiteral) => self.parse_bigint_literal(origin),
            Some(Token::DoubleLiteral) => self.parse_double_literal(origin),
            Some(Token::BigDecimalLiteral) => self.parse_bigdecimal_literal(origin),
            Some(Token::DoubleQuoted) | Some(Token::SingleQuoted) => self.parse_quoted_string(origin),
            Some(Token::Backtick) => self.parse_template_string(),
            Some(Token::RegexStart) => self.parse_regex_literal(origin),
            Some(Token::LBracket) => self.parse_array_literal(origin),
            Some(Token::LBrace) => self.parse_map_literal(origin),
            Some(Token::KwNew) => self.parse_new(origin),
            Some(Token::At) => self.parse_annotated_expr(origin),
            Some(Token::LParen) => self.parse_paren_or_lambda(origin),
            Some(Token::Identifier) => self.parse_identifier_or_lambda(origin),
            Some(Token::NamespaceIdent) => self.parse_namespace_call_name(origin),
            _ => Err(JexlError::parsing(origin, format!("unexpected token '{}'", self.text()))),
        }
    }

    fn parse_int_literal(&mut self, origin: Origin) -> JexlResult<Expr> {
        let text = self.bump()?.text;
        if let Some(stripped) = text.strip_suffix(['L', 'l']) {
            let n: i64 = stripped.parse().map_err(|_| JexlError::parsing(origin.clone(), "malformed long literal"))?;
            Ok(Expr::Literal(Literal::Long(n), origin))
        } else {
            match text.parse::<i64>() {
                Ok(n) => Ok(Expr::Literal(Literal::Int(n), origin)),
                Err(_) => Ok(Expr::Literal(Literal::BigInt(text.to_string()), origin)),
            }
        }
    }

    fn parse_hex_literal(&mut self, origin: Origin) -> JexlResult<Expr> {
        let text = self.bump()?.text;
        let (digits, is_long) = match text.strip_suffix(['L', 'l']) {
            Some(d) => (d, true),
            None => (text, false),
        };
        let without_prefix = &digits[2..];
        let n = i64::from_str_radix(without_prefix, 16).map_err(|_| JexlError::parsing(origin.clone(), "malformed hex literal"))?;
        Ok(Expr::Literal(if is_long { Literal::Long(n) } else { Literal::Int(n) }, origin))
    }

    fn parse_bigint_literal(&mut self, origin: Origin) -> JexlResult<Expr> {
        let text = self.bump()?.text;
        let digits = &text[..text.len() - 1];
        Ok(Expr::Literal(Literal::BigInt(digits.to_string()), origin))
    }

    fn parse_double_literal(&mut self, origin: Origin) -> JexlResult<Expr> {
        let text = self.bump()?.text;
        let trimmed = text.trim_end_matches(['F', 'f', 'D', 'd']);
        let n: f64 = trimmed.parse().map_err(|_| JexlError::parsing(origin.clone(), "malformed double literal"))?;
        Ok(Expr::Literal(Literal::Double(n), origin))
    }

    fn parse_bigdecimal_literal(&mut self, origin: Origin) -> JexlResult<Expr> {
        let text = self.bump()?.text;
        let digits = &text[..text.len() - 1];
        Ok(Expr::Literal(Literal::BigDecimal(digits.to_string()), origin))
    }

    fn parse_quoted_string(&mut self, origin: Origin) -> JexlResult<Expr> {
        let text = self.bump()?.text;
        let inner = &text[1..text.len() - 1];
        Ok(Expr::Literal(Literal::Str(unescape(inner)), origin))
    }

    fn parse_regex_literal(&mut self, origin: Origin) -> JexlResult<Expr> {
        let start = self.mark() + 2; // past '~/'
        let end = self.lexer.scan_until(start, b'/')?;
        let pattern = self.source[start..end].to_string();
        self.reset(end + 1)?;
        Ok(Expr::Literal(Literal::Regex(pattern), origin))
    }

    fn parse_array_literal(&mut self, origin: Origin) -> JexlResult<Expr> {
        if !self.features.structured_literal() {
            return Err(JexlError::feature(origin, "structured_literal"));
        }
        self.bump()?; // '['
        let mut elements = Vec::new();
        while !self.at(&Token::RBracket) {
            elements.push(self.parse_spreadable_element()?);
            if self.at(&Token::Comma) {
                self.bump()?;
            } else {
                break;
            }
        }
        self.expect(Token::RBracket, "']'")?;
        Ok(Expr::ArrayLiteral { elements, origin })
    }

    fn parse_spreadable_element(&mut self) -> JexlResult<ArrayElement> {
        if self.at(&Token::DotDot) {
            let save = self.mark();
            self.bump()?;
            if self.at(&Token::Dot) {
                self.bump()?;
                let expr = self.parse_ternary()?;
                return Ok(ArrayElement::Spread(expr));
            }
            self.reset(save)?;
        }
        Ok(ArrayElement::Value(self.parse_ternary()?))
    }

    /// `{...}` is a map when entries are `k: v` pairs and a set otherwise
    /// (`{1,2,3}`); the two share an opening brace so the first entry has to
    /// be read before we know which one we're building.
    fn parse_map_literal(&mut self, origin: Origin) -> JexlResult<Expr> {
        if !self.features.structured_literal() {
            return Err(JexlError::feature(origin, "structured_literal"));
        }
        self.bump()?; // '{'
        if self.at(&Token::RBrace) {
            self.bump()?;
            return Ok(Expr::MapLiteral { entries: Vec::new(), origin });
        }
        if self.at(&Token::Star) {
            let mut entries = Vec::new();
            self.parse_map_spread_or_pair(&mut entries)?;
            self.parse_remaining_map_entries(&mut entries)?;
            return self.finish_map_literal(entries, origin);
        }
        let first = self.parse_spreadable_element()?;
        if self.at(&Token::Colon) {
            self.bump()?;
            let key = match first {
                ArrayElement::Value(e) => e,
                ArrayElement::Spread(_) => {
                    return Err(JexlError::parsing(self.origin_here(), "spread cannot be used as a map key"))
                }
            };
            let value = self.parse_ternary()?;
            let mut entries = vec![MapEntry::Pair { key, value }];
            self.parse_remaining_map_entries(&mut entries)?;
            self.finish_map_literal(entries, origin)
        } else {
            let mut elements = vec![first];
            if self.at(&Token::Comma) {
                self.bump()?;
                while !self.at(&Token::RBrace) {
                    elements.push(self.parse_spreadable_element()?);
                    if self.at(&Token::Comma) {
                        self.bump()?;
                    } else {
                        break;
                    }
                }
            }
            self.expect(Token::RBrace, "'}'")?;
            Ok(Expr::SetLiteral { elements, origin })
        }
    }

    fn parse_remaining_map_entries(&mut self, entries: &mut Vec<MapEntry>) -> JexlResult<()> {
        if self.at(&Token::Comma) {
            self.bump()?;
            while !self.at(&Token::RBrace) {
                self.parse_map_spread_or_pair(entries)?;
                if self.at(&Token::Comma) {
                    self.bump()?;
                } else {
                    break;
                }
            }
        }
        Ok(())
    }

    fn parse_map_spread_or_pair(&mut self, entries: &mut Vec<MapEntry>) -> JexlResult<()> {
        if self.at(&Token::Star) {
            self.bump()?;
            self.expect(Token::Colon, "':'")?;
            let spread = self.parse_ternary()?;
            entries.push(MapEntry::Spread(spread));
        } else {
            let key = self.parse_ternary()?;
            self.expect(Token::Colon, "':'")?;
            let value = self.parse_ternary()?;
            entries.push(MapEntry::Pair { key, value });
        }
        Ok(())
    }

    fn finish_map_literal(&mut self, entries: Vec<MapEntry>, origin: Origin) -> JexlResult<Expr> {
        self.expect(Token::RBrace, "'}'")?;
        Ok(Expr::MapLiteral { entries, origin })
    }

    fn parse_new(&mut self, origin: Origin) -> JexlResult<Expr> {
        if !self.features.new_instance() {
            return Err(JexlError::feature(origin, "new_instance"));
        }
        self.bump()?;
        let name_origin = self.origin_here();
        let name = self.expect_dotted_ident()?;
        let class_name = Box::new(Expr::Identifier {
            segments: name.split('.').map(String::from).collect(),
            origin: name_origin,
        });
        let args = self.parse_arg_list()?;
        Ok(Expr::New { class_name, args, origin })
    }

    fn parse_annotated_expr(&mut self, origin: Origin) -> JexlResult<Expr> {
        if !self.features.annotation() {
            return Err(JexlError::feature(origin, "annotation"));
        }
        self.bump()?;
        let name = self.expect_identifier_text()?;
        let args = if self.at(&Token::LParen) { self.parse_arg_list()? } else { Vec::new() };
        let body = Box::new(Stmt::Expr(self.parse_assignment()?));
        Ok(Expr::Annotated { name, args, body, origin })
    }

    fn parse_paren_or_lambda(&mut self, origin: Origin) -> JexlResult<Expr> {
        let save = self.mark();
        if let Some(lambda) = self.try_parse_lambda(origin.clone())? {
            return Ok(lambda);
        }
        self.reset(save)?;
        self.bump()?; // '('
        let inner = self.parse_expr()?;
        self.expect(Token::RParen, "')'")?;
        Ok(inner)
    }

    fn try_parse_lambda(&mut self, origin: Origin) -> JexlResult<Option<Expr>> {
        let save = self.mark();
        self.bump()?; // '('
        let mut params = Vec::new();
        let mut ok = true;
        while !self.at(&Token::RParen) {
            if self.at(&Token::Identifier) {
                params.push(self.expect_identifier_text()?);
            } else {
                ok = false;
                break;
            }
            if self.at(&Token::Comma) {
                self.bump()?;
            } else {
                break;
            }
        }
        if ok && self.at(&Token::RParen) {
            self.bump()?;
            if self.at(&Token::Arrow) {
                if !self.features.lambda() {
                    return Err(JexlError::feature(origin, "lambda"));
                }
                self.bump()?;
                let body = self.parse_lambda_body()?;
                return Ok(Some(Expr::Lambda { params, body: Rc::new(body), origin }));
            }
        }
        self.reset(save)?;
        Ok(None)
    }

    fn parse_lambda_body(&mut self) -> JexlResult<Vec<Stmt>> {
        if self.at(&Token::LBrace) {
            match self.parse_block()? {
                Stmt::Block(stmts) => Ok(stmts),
                other => Ok(vec![other]),
            }
        } else {
            let origin = self.origin_here();
            Ok(vec![Stmt::Return(Some(self.parse_assignment()?), origin)])
        }
    }

    fn parse_identifier_or_lambda(&mut self, origin: Origin) -> JexlResult<Expr> {
        let name = self.expect_identifier_text()?;
        if self.at(&Token::Arrow) {
            if !self.features.lambda() {
                return Err(JexlError::feature(origin, "lambda"));
            }
            self.bump()?;
            let body = self.parse_lambda_body()?;
            return Ok(Expr::Lambda { params: vec![name], body: Rc::new(body), origin });
        }
        if !self.features.antish() {
            return Ok(Expr::Identifier { segments: vec![name], origin });
        }
        let mut segments = vec![name];
        while self.at(&Token::Dot) {
            let checkpoint = self.mark();
            self.bump()?;
            if !self.at(&Token::Identifier) {
                self.reset(checkpoint)?;
                break;
            }
            let seg = self.expect_identifier_text()?;
            // a following '(' or '[' means this dotted run is actually a
            // member/method-call chain, which the postfix layer owns; only
            // consume it into the antish run when nothing follows.
            if matches!(self.peek(), Some(Token::LParen) | Some(Token::LBracket)) {
                self.reset(checkpoint)?;
                break;
            }
            segments.push(seg);
        }
        Ok(Expr::Identifier { segments, origin })
    }

    /// `prefix:method`, lexed as one tight token (see `Token::NamespaceIdent`)
    /// so only a colon with no surrounding space ever reaches here. Produces
    /// the same two-segment `Identifier` shape `eval_call` already knows how
    /// to route through `Context::resolve_namespace` when it's a callee;
    /// used bare (no following `(`) it's just an ordinary antish read.
    fn parse_namespace_call_name(&mut self, origin: Origin) -> JexlResult<Expr> {
        let text = self.bump()?.text;
        let (prefix, method) = text.split_once(':').expect("NamespaceIdent token always contains ':'");
        Ok(Expr::Identifier { segments: vec![prefix.to_string(), method.to_string()], origin })
    }

    fn parse_template_string(&mut self) -> JexlResult<Expr> {
        let origin = self.origin_here();
        let start = self.mark() + 1; // past opening backtick
        let end = self.lexer.scan_template_body(start)?;
        let raw = self.source[start..end].to_string();
        let parts = parse_interpolation_parts(&raw, &self.features, &origin)?;
        self.reset(end + 1)?;
        Ok(Expr::Interpolation { parts, origin })
    }
}

/// Splits a template's raw body into literal runs and `${...}`/`#{...}`
/// interpolations by brace-depth scanning (not full re-lexing, so a brace
/// inside a nested string literal would confuse it — acceptable for the
/// common case this crate targets).
fn parse_interpolation_parts(raw: &str, features: &FeatureSet, origin: &Origin) -> JexlResult<Vec<InterpolationPart>> {
    let mut parts = Vec::new();
    let mut literal = String::new();
    let bytes = raw.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 1 < bytes.len() {
            literal.push(bytes[i + 1] as char);
            i += 2;
            continue;
        }
        let deferred = bytes[i] == b'#' && i + 1 < bytes.len() && bytes[i + 1] == b'{';
        let immediate = bytes[i] == b'$' && i + 1 < bytes.len() && bytes[i + 1] == b'{';
        if deferred || immediate {
            if !literal.is_empty() {
                parts.push(InterpolationPart::Literal(std::mem::take(&mut literal)));
            }
            let expr_start = i + 2;
            let mut depth = 1usize;
            let mut j = expr_start;
            while j < bytes.len() && depth > 0 {
                match bytes[j] {
                    b'{' => depth += 1,
                    b'}' => depth -= 1,
                    _ => {}
                }
                if depth > 0 {
                    j += 1;
                }
            }
            if depth != 0 {
                return Err(JexlError::parsing(origin.clone(), "unterminated interpolation"));
            }
            let expr_src = &raw[expr_start..j];
            let parsed = Parser::new(expr_src, &origin.source_name, features.clone())?.parse_expr()?;
            parts.push(if deferred {
                InterpolationPart::Deferred(parsed)
            } else {
                InterpolationPart::Immediate(parsed)
            });
            i = j + 1;
        } else {
            literal.push(bytes[i] as char);
            i += 1;
        }
    }
    if !literal.is_empty() {
        parts.push(InterpolationPart::Literal(literal));
    }
    Ok(parts)
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('r') => out.push('\r'),
                Some(other) => out.push(other),
                None => {}
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_expr_only(src: &str) -> Expr {
        match parse(src, "t", FeatureSet::all()).unwrap() {
            Root::Expression(e) => e,
            Root::Script { body, .. } => match body.into_iter().next().unwrap() {
                Stmt::Expr(e) => e,
                other => panic!("expected expression statement, got {other:?}"),
            },
        }
    }

    #[test]
    fn precedence_mul_before_add() {
        let e = parse_expr_only("1 + 2 * 3");
        match e {
            Expr::Binary { op: BinaryOp::Add, rhs, .. } => {
                assert!(matches!(*rhs, Expr::Binary { op: BinaryOp::Mul, .. }));
            }
            _ => panic!("expected addition at top"),
        }
    }

    #[test]
    fn shift_binds_below_additive() {
        let e = parse_expr_only("1 + 2 << 3");
        match e {
            Expr::Binary { op: BinaryOp::Shl, lhs, .. } => {
                assert!(matches!(*lhs, Expr::Binary { op: BinaryOp::Add, .. }));
            }
            _ => panic!("expected shift at top, got {e:?}"),
        }
    }

    #[test]
    fn ternary_and_elvis() {
        let e = parse_expr_only("a ? b : c");
        assert!(matches!(e, Expr::Ternary { .. }));
        let e = parse_expr_only("a ?: b");
        assert!(matches!(e, Expr::Elvis { .. }));
    }

    #[test]
    fn member_and_index_chain() {
        let e = parse_expr_only("a.b[0].c()");
        assert!(matches!(e, Expr::MethodCall { .. }));
    }

    #[test]
    fn antish_identifier_collects_segments() {
        let e = parse_expr_only("a.b.c");
        match e {
            Expr::Identifier { segments, .. } => assert_eq!(segments, vec!["a", "b", "c"]),
            _ => panic!("expected antish identifier"),
        }
    }

    #[test]
    fn array_and_map_literals() {
        let e = parse_expr_only("[1, 2, 3]");
        assert!(matches!(e, Expr::ArrayLiteral { .. }));
        let e = parse_expr_only("{'a': 1, 'b': 2}");
        assert!(matches!(e, Expr::MapLiteral { .. }));
    }

    #[test]
    fn lambda_single_and_multi_param() {
        let e = parse_expr_only("x -> x + 1");
        assert!(matches!(e, Expr::Lambda { .. }));
        let e = parse_expr_only("(x, y) -> x + y");
        assert!(matches!(e, Expr::Lambda { .. }));
    }

    #[test]
    fn multi_assign_target() {
        let root = parse("(a, b) = pair", "t", FeatureSet::all()).unwrap();
        let stmt = match root {
            Root::Expression(e) => Stmt::Expr(e),
            Root::Script { mut body, .. } => body.remove(0),
        };
        match stmt {
            Stmt::Expr(Expr::MultiAssign { targets, .. }) => assert_eq!(targets.len(), 2),
            other => panic!("expected multi-assign, got {other:?}"),
        }
    }

    #[test]
    fn if_while_for_statements() {
        let root = parse("if (x > 0) { y = 1 } else { y = 2 }", "t", FeatureSet::all()).unwrap();
        assert!(matches!(root, Root::Script { .. }));
        let root = parse("for (var i = 0; i < 10; i = i + 1) { total = total + i }", "t", FeatureSet::all()).unwrap();
        assert!(matches!(root, Root::Script { .. }));
        let root = parse("for (var x in items) { total = total + x }", "t", FeatureSet::all()).unwrap();
        assert!(matches!(root, Root::Script { .. }));
    }

    #[test]
    fn template_string_interpolation() {
        let e = parse_expr_only("`a${1 + 1}b`");
        match e {
            Expr::Interpolation { parts, .. } => {
                assert_eq!(parts.len(), 3);
                assert!(matches!(parts[1], InterpolationPart::Immediate(_)));
            }
            _ => panic!("expected interpolation"),
        }
    }

    #[test]
    fn regex_literal() {
        let e = parse_expr_only("~/ab+c/");
        assert!(matches!(e, Expr::Literal(Literal::Regex(_), _)));
    }
}
