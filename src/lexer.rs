//! Tokenizer (C2, first half). A `logos`-derived `Token` enum plus a thin
//! peekable wrapper, in the shape of the teacher pack's Julia lexer: logos
//! does the mechanical scanning, the wrapper handles the handful of token
//! kinds logos can't express context-free (backtick template strings,
//! `~/regex/` literals) by rescanning raw source past the point logos
//! stopped.

use crate::error::{JexlError, JexlResult};
use crate::origin::{SourceMap, Span};
use logos::Logos;

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
#[logos(skip r"//[^\n]*")]
#[logos(skip r"/\*([^*]|\*[^/])*\*/")]
pub enum Token {
    #[token("if")]
    KwIf,
    #[token("else")]
    KwElse,
    #[token("var")]
    KwVar,
    #[token("let")]
    KwLet,
    #[token("const")]
    KwConst,
    #[token("for")]
    KwFor,
    #[token("while")]
    KwWhile,
    #[token("do")]
    KwDo,
    #[token("return")]
    KwReturn,
    #[token("break")]
    KwBreak,
    #[token("continue")]
    KwContinue,
    #[token("remove")]
    KwRemove,
    #[token("new")]
    KwNew,
    #[token("in")]
    KwIn,
    #[token("true")]
    KwTrue,
    #[token("false")]
    KwFalse,
    #[token("null")]
    KwNull,

    /// Word-form comparators (`eq`/`ne`/`lt`/`le`/`gt`/`ge`), gated at parse
    /// time by `FeatureSet::comparator_names` rather than here, matching the
    /// other feature-gated keywords below.
    #[token("eq")]
    KwEq,
    #[token("ne")]
    KwNe,
    #[token("lt")]
    KwLt,
    #[token("le")]
    KwLe,
    #[token("gt")]
    KwGt,
    #[token("ge")]
    KwGe,

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*")]
    Identifier,

    /// A namespace-qualified call name, `prefix:method`, with no space on
    /// either side of the colon — the only shape `prefix:method(args)`
    /// namespace calls are recognized in, precisely so a spaced colon (a
    /// ternary separator or a map-literal `key: value`) never tokenizes as
    /// one of these instead of as `Identifier Colon Identifier`.
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*:[A-Za-z_][A-Za-z0-9_]*")]
    NamespaceIdent,

    #[regex(r"[0-9]+[Ll]?")]
    IntLiteral,
    #[regex(r"0[xX][0-9a-fA-F]+[Ll]?")]
    HexLiteral,
    #[regex(r"[0-9]+[Hh]")]
    BigIntLiteral,
    #[regex(r"[0-9]+\.[0-9]+([Ff]|[Dd])?")]
    DoubleLiteral,
    #[regex(r"[0-9]+\.[0-9]+[Bb]")]
    BigDecimalLiteral,

    /// Single- or double-quoted string; content between the delimiters is
    /// re-extracted by the parser from the source span, so escapes are not
    /// processed at the token level.
    #[regex(r#""([^"\\]|\\.)*""#)]
    DoubleQuoted,
    #[regex(r"'([^'\\]|\\.)*'")]
    SingleQuoted,

    /// Backtick template string start; the lexer wrapper rescans the raw
    /// bytes after seeing this to find the matching close-tick, since
    /// `${...}`/`#{...}` interpolations inside it may themselves contain
    /// backticks in nested string literals.
    #[token("`")]
    Backtick,

    #[token("~/")]
    RegexStart,

    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("&")]
    Amp,
    #[token("|")]
    Pipe,
    #[token("^")]
    Caret,
    #[token("~")]
    Tilde,
    #[token("<<")]
    Shl,
    #[token(">>>")]
    Ushr,
    #[token(">>")]
    Shr,
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("<=")]
    Le,
    #[token(">=")]
    Ge,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("=~")]
    Match,
    #[token("!~")]
    NotMatch,
    #[token("=^")]
    StartsWith,
    #[token("!^")]
    NotStartsWith,
    #[token("=$")]
    EndsWith,
    #[token("!$")]
    NotEndsWith,
    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,
    #[token("!")]
    Bang,
    #[token("?:")]
    Elvis,
    #[token("??")]
    Coalesce,
    #[token("?")]
    Question,
    #[token(":")]
    Colon,
    #[token("..")]
    DotDot,
    #[token(".")]
    Dot,
    #[token("?.")]
    SafeDot,
    #[token("++")]
    PlusPlus,
    #[token("--")]
    MinusMinus,
    #[token("=")]
    Eq,
    #[token("+=")]
    PlusEq,
    #[token("-=")]
    MinusEq,
    #[token("*=")]
    StarEq,
    #[token("/=")]
    SlashEq,
    #[token("%=")]
    PercentEq,
    #[token("&=")]
    AmpEq,
    #[token("|=")]
    PipeEq,
    #[token("^=")]
    CaretEq,
    #[token("<<=")]
    ShlEq,
    #[token(">>=")]
    ShrEq,
    #[token(">>>=")]
    UshrEq,
    #[token("->")]
    Arrow,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token(",")]
    Comma,
    #[token(";")]
    Semicolon,
    #[token("@")]
    At,
    #[token("#")]
    Hash,
}

#[derive(Debug, Clone)]
pub struct SpannedToken<'a> {
    pub token: Token,
    pub span: Span,
    pub text: &'a str,
}

pub struct Lexer<'a> {
    source: &'a str,
    source_name: String,
    inner: logos::Lexer<'a, Token>,
    source_map: SourceMap,
    peeked: Option<Option<JexlResult<SpannedToken<'a>>>>,
    restart_offset: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str, source_name: impl Into<String>) -> Self {
        Lexer {
            source,
            source_name: source_name.into(),
            inner: Token::lexer(source),
            source_map: SourceMap::new(source),
            peeked: None,
            restart_offset: 0,
        }
    }

    pub fn source_map(&self) -> &SourceMap {
        &self.source_map
    }

    pub fn peek(&mut self) -> Option<&JexlResult<SpannedToken<'a>>> {
        if self.peeked.is_none() {
            self.peeked = Some(self.advance());
        }
        self.peeked.as_ref().unwrap().as_ref()
    }

    pub fn next_token(&mut self) -> Option<JexlResult<SpannedToken<'a>>> {
        if let Some(p) = self.peeked.take() {
            return p;
        }
        self.advance()
    }

    fn advance(&mut self) -> Option<JexlResult<SpannedToken<'a>>> {
        let result = self.inner.next()?;
        let inner_span = self.inner.span();
        let start = self.restart_offset + inner_span.start;
        let end = self.restart_offset + inner_span.end;
        let text = &self.source[start..end];
        let span = Span::new(start, end);
        match result {
            Ok(token) => Some(Ok(SpannedToken { token, span, text })),
            Err(()) => {
                let origin = self.source_map.origin(&self.source_name, span);
                Some(Err(JexlError::parsing(origin, format!("unrecognized token '{text}'"))))
            }
        }
    }

    /// Scans raw source starting at `from` for the matching backtick,
    /// honoring `\` escapes, without going through the logos state machine
    /// (template bodies are not JEXL token grammar).
    pub fn scan_template_body(&self, from: usize) -> JexlResult<usize> {
        let bytes = self.source.as_bytes();
        let mut pos = from;
        while pos < bytes.len() {
            match bytes[pos] {
                b'\\' if pos + 1 < bytes.len() => pos += 2,
                b'`' => return Ok(pos),
                _ => pos += 1,
            }
        }
        let origin = self.source_map.origin(&self.source_name, Span::new(from, pos));
        Err(JexlError::parsing(origin, "unterminated template string"))
    }

    /// Scans raw source starting at `from` for the next unescaped `delim`
    /// byte, used for `~/regex/` literal bodies.
    pub fn scan_until(&self, from: usize, delim: u8) -> JexlResult<usize> {
        let bytes = self.source.as_bytes();
        let mut pos = from;
        while pos < bytes.len() {
            match bytes[pos] {
                b'\\' if pos + 1 < bytes.len() => pos += 2,
                b if b == delim => return Ok(pos),
                _ => pos += 1,
            }
        }
        let origin = self.source_map.origin(&self.source_name, Span::new(from, pos));
        Err(JexlError::parsing(origin, "unterminated literal"))
    }

    /// Restarts the logos state machine past a span the wrapper consumed by
    /// hand (template bodies, regex bodies).
    pub fn resume_at(&mut self, pos: usize) {
        self.peeked = None;
        self.inner = Token::lexer(&self.source[pos..]);
        // logos spans are then relative to `pos`; callers offset them back
        // using the returned byte positions, mirroring how the pack's Julia
        // lexer tracks an `offset` after restarting mid-stream.
        self.restart_offset = pos;
    }
}

impl<'a> Lexer<'a> {
    pub fn current_offset(&self) -> usize {
        self.restart_offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(src: &str) -> Vec<Token> {
        let mut lexer = Lexer::new(src, "t");
        let mut out = Vec::new();
        while let Some(tok) = lexer.next_token() {
            out.push(tok.unwrap().token);
        }
        out
    }

    #[test]
    fn basic_expression() {
        let toks = tokens("a + b * 2");
        assert_eq!(
            toks,
            vec![Token::Identifier, Token::Plus, Token::Identifier, Token::Star, Token::IntLiteral]
        );
    }

    #[test]
    fn keywords_vs_identifiers() {
        let toks = tokens("if x else y");
        assert_eq!(toks, vec![Token::KwIf, Token::Identifier, Token::KwElse, Token::Identifier]);
    }

    #[test]
    fn multi_char_operators_prefer_longest() {
        let toks = tokens("a >>> b");
        assert_eq!(toks, vec![Token::Identifier, Token::Ushr, Token::Identifier]);
        let toks = tokens("a <<= b");
        assert_eq!(toks, vec![Token::Identifier, Token::ShlEq, Token::Identifier]);
    }

    #[test]
    fn comments_are_skipped() {
        let toks = tokens("1 // trailing\n+ /* block */ 2");
        assert_eq!(toks, vec![Token::IntLiteral, Token::Plus, Token::IntLiteral]);
    }

    #[test]
    fn unrecognized_char_is_an_error() {
        let mut lexer = Lexer::new("$", "t");
        assert!(lexer.next_token().unwrap().is_err());
    }
}
