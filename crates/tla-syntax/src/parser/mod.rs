//! Grammar engine and module assembler.
//!
//! The parser works over a token vector produced by the lexer. Symbol runs
//! are matched against the operator table at the point of use and split in
//! place when only a prefix of the run is an operator.
//!
//! Bulleted lists are handled with *fences*: while an item of a list whose
//! bullets sit at column `c` is being parsed, any token at column `<= c`
//! reads as end of input, which terminates the item.

mod expr;
mod forms;
mod units;

use crate::ast::Ident;
use crate::builder::AstBuilder;
use crate::config::ParseConfig;
use crate::error::{ParseError, ParseResult};
use crate::optable::{OperatorSource, OperatorTable};
use crate::scope::{DeclKind, FrameKind, SymbolTable};
use crate::stdlib::{standard_interface, ModuleEnv, ModuleInterface};
use crate::token::{Keyword, Span, Token, TokenKind};
use std::collections::HashMap;
use std::sync::LazyLock;

static EOF_TOKEN: LazyLock<Token> =
    LazyLock::new(|| Token::new(TokenKind::Eof, "", Span::dummy()));

/// Symbol runs with a fixed syntactic role. They are never operators and
/// never split into operators.
const PUNCTUATION: &[&str] = &[
    "==", "|->", "->", "<-", "<<", ">>", "::", ":", "!", "@", ".",
];

/// Parser state for one source text.
pub(crate) struct Parser<'a> {
    tokens: Vec<Token>,
    position: usize,
    /// Bullet columns of the list items being parsed, innermost last.
    fences: Vec<u32>,
    ops: OperatorTable,
    builder: AstBuilder,
    env: &'a ModuleEnv,
    config: &'a ParseConfig,
    /// Interfaces of nested modules parsed so far.
    local_modules: HashMap<String, ModuleInterface>,
    /// Number of enclosing EXCEPT values, where `@` is legal.
    except_depth: usize,
    /// Set once the error limit is reached or recovery is disabled and a
    /// unit failed.
    halted: bool,
}

impl<'a> Parser<'a> {
    pub(crate) fn new(tokens: Vec<Token>, config: &'a ParseConfig, env: &'a ModuleEnv) -> Self {
        let mut parser = Self {
            tokens,
            position: 0,
            fences: Vec::new(),
            ops: OperatorTable::new(),
            builder: AstBuilder::new(),
            env,
            config,
            local_modules: HashMap::new(),
            except_depth: 0,
            halted: false,
        };
        for decl in &config.operators {
            let source = OperatorSource::User { span: Span::dummy() };
            if let Err(conflict) = parser.ops.declare(decl, source) {
                parser.builder.report(ParseError::OperatorConflict {
                    symbol: decl.symbol.clone(),
                    reason: conflict.to_string(),
                    span: Span::dummy(),
                });
            }
        }
        parser
    }

    /// Parse a standalone expression. Each name in `constants` is declared
    /// as a constant, and every pre-declared operator symbol is in scope.
    pub(crate) fn parse_standalone(
        mut self,
        constants: &[String],
    ) -> (Option<crate::ast::Expr>, SymbolTable, Vec<ParseError>) {
        self.builder.push_scope(FrameKind::Imports);
        self.builder.push_scope(FrameKind::Module);
        self.import_configured_operators();
        for name in constants {
            let ident = Ident::new(name.clone(), Span::dummy());
            self.builder.declare(&ident, DeclKind::Constant, 0, false);
        }

        let result = self.parse_expression().and_then(|expr| {
            if self.raw().is_eof() {
                Ok(expr)
            } else {
                Err(self.unexpected("end of expression"))
            }
        });
        let expr = match result {
            Ok(expr) => Some(expr),
            Err(err) => {
                self.builder.report(err);
                None
            }
        };
        let (symbols, diagnostics) = self.builder.finish();
        (expr, symbols, diagnostics)
    }

    // === Token access ===

    /// The token under the cursor, ignoring fences.
    fn raw(&self) -> &Token {
        self.tokens.get(self.position).unwrap_or(&EOF_TOKEN)
    }

    /// The token under the cursor as seen by the grammar: a token at or left
    /// of the innermost fence reads as end of input.
    fn current(&self) -> &Token {
        let token = self.raw();
        match self.fences.last() {
            Some(&fence) if !token.is_eof() && token.column() <= fence => &EOF_TOKEN,
            _ => token,
        }
    }

    fn peek_raw(&self, n: usize) -> &Token {
        self.tokens.get(self.position + n).unwrap_or(&EOF_TOKEN)
    }

    fn current_span(&self) -> Span {
        self.raw().span
    }

    fn previous_span(&self) -> Span {
        self.position
            .checked_sub(1)
            .and_then(|p| self.tokens.get(p))
            .map(|t| t.span)
            .unwrap_or_default()
    }

    fn span_from(&self, start: Span) -> Span {
        start.merge(self.previous_span())
    }

    fn advance(&mut self) -> Token {
        let token = self.raw().clone();
        if !token.is_eof() {
            self.position += 1;
        }
        token
    }

    fn at_end(&self) -> bool {
        self.current().is_eof()
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current().kind == kind
    }

    fn at_keyword(&self, kw: Keyword) -> bool {
        self.current().is_keyword(kw)
    }

    fn is_punctuation(text: &str) -> bool {
        PUNCTUATION.contains(&text)
    }

    /// True if `text` as a whole is punctuation or an operator spelling.
    fn is_whole_symbol(&self, text: &str) -> bool {
        Self::is_punctuation(text) || self.ops.is_known(text)
    }

    /// True if the cursor is at symbol `sym`, either exactly or as the head
    /// of a run that is not itself a symbol (`=-` in `x=-1`).
    fn at_sym(&self, sym: &str) -> bool {
        let token = self.current();
        token.kind == TokenKind::Symbol
            && (token.text == sym
                || (token.text.starts_with(sym) && !self.is_whole_symbol(&token.text)))
    }

    /// Split the run under the cursor so that its first `at` bytes become
    /// their own token.
    fn split_current(&mut self, at: usize) {
        let Some(token) = self.tokens.get(self.position) else {
            return;
        };
        if token.kind != TokenKind::Symbol || at == 0 || at >= token.text.len() {
            return;
        }
        let (head, tail) = token.split_symbol(at);
        self.tokens[self.position] = head;
        self.tokens.insert(self.position + 1, tail);
    }

    /// Consume symbol `sym`, splitting the run if needed.
    fn eat_symbol(&mut self, sym: &str) -> Option<Token> {
        if !self.at_sym(sym) {
            return None;
        }
        self.split_current(sym.len());
        Some(self.advance())
    }

    fn eat(&mut self, kind: TokenKind) -> Option<Token> {
        if self.check(kind) {
            Some(self.advance())
        } else {
            None
        }
    }

    fn eat_keyword(&mut self, kw: Keyword) -> Option<Token> {
        self.eat(TokenKind::Keyword(kw))
    }

    fn expect_symbol(&mut self, sym: &str) -> ParseResult<Span> {
        match self.eat_symbol(sym) {
            Some(token) => Ok(token.span),
            None => Err(self.unexpected(format!("`{sym}`"))),
        }
    }

    fn expect(&mut self, kind: TokenKind) -> ParseResult<Span> {
        match self.eat(kind) {
            Some(token) => Ok(token.span),
            None => Err(self.unexpected(format!("`{kind}`"))),
        }
    }

    fn expect_keyword(&mut self, kw: Keyword) -> ParseResult<Span> {
        self.expect(TokenKind::Keyword(kw))
    }

    fn expect_ident(&mut self) -> ParseResult<Ident> {
        if self.check(TokenKind::Ident) {
            let token = self.advance();
            Ok(Ident::new(token.text, token.span))
        } else {
            Err(self.unexpected("identifier"))
        }
    }

    /// An unexpected-token error at the cursor.
    fn unexpected(&self, expected: impl Into<String>) -> ParseError {
        let token = self.current();
        let found = if token.is_eof() {
            // A fenced token still reports its own text.
            let raw = self.raw();
            if raw.is_eof() {
                "end of input".to_string()
            } else {
                raw.text.clone()
            }
        } else {
            token.text.clone()
        };
        ParseError::UnexpectedToken {
            expected: expected.into(),
            found,
            span: self.current_span(),
        }
    }

    fn invalid(&self, message: impl Into<String>, span: Span) -> ParseError {
        ParseError::InvalidSyntax {
            message: message.into(),
            span,
        }
    }

    // === Scoped helpers ===

    /// Run `f` inside a fresh scope frame, closing the frame on every path.
    fn scoped<T>(
        &mut self,
        kind: FrameKind,
        f: impl FnOnce(&mut Self) -> ParseResult<T>,
    ) -> ParseResult<T> {
        self.builder.push_scope(kind);
        let result = f(self);
        self.builder.pop_scope();
        result
    }

    /// Run `f` with a fence at `column`.
    fn fenced<T>(
        &mut self,
        column: u32,
        f: impl FnOnce(&mut Self) -> ParseResult<T>,
    ) -> ParseResult<T> {
        self.fences.push(column);
        let result = f(self);
        self.fences.pop();
        result
    }

    /// Run `f` inside explicit delimiters, where enclosing fences do not apply.
    fn delimited<T>(&mut self, f: impl FnOnce(&mut Self) -> ParseResult<T>) -> ParseResult<T> {
        let saved = std::mem::take(&mut self.fences);
        let result = f(self);
        self.fences = saved;
        result
    }

    // === Module environment ===

    /// Find the interface of a module by name: nested modules of this
    /// source first, then the caller's environment, then the standard
    /// modules.
    fn module_interface(&self, name: &str) -> Option<ModuleInterface> {
        if let Some(iface) = self.local_modules.get(name) {
            return Some(iface.clone());
        }
        if let Some(iface) = self.env.get(name) {
            return Some(iface.clone());
        }
        if self.config.standard_modules {
            return standard_interface(name);
        }
        None
    }

    fn report(&mut self, err: ParseError) {
        self.builder.report(err);
        if self.config.limit_reached(self.builder.diagnostic_count()) {
            self.halted = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;

    fn parser_for<'a>(src: &str, config: &'a ParseConfig, env: &'a ModuleEnv) -> Parser<'a> {
        Parser::new(Lexer::new(src).tokenize().tokens, config, env)
    }

    #[test]
    fn test_split_symbol_run_at_use() {
        let config = ParseConfig::default();
        let env = ModuleEnv::new();
        let mut p = parser_for("=-1", &config, &env);
        assert!(p.at_sym("="));
        assert!(!p.at_sym("=="));
        assert_eq!(p.eat_symbol("=").map(|t| t.text), Some("=".to_string()));
        assert!(p.at_sym("-"));
    }

    #[test]
    fn test_known_run_is_not_split() {
        let config = ParseConfig::default();
        let env = ModuleEnv::new();
        let p = parser_for("|-> =<", &config, &env);
        assert!(!p.at_sym("|"));
        assert!(p.at_sym("|->"));
    }

    #[test]
    fn test_fence_hides_tokens_at_or_left_of_column() {
        let config = ParseConfig::default();
        let env = ModuleEnv::new();
        let mut p = parser_for("a\nb", &config, &env);
        p.advance();
        p.fences.push(1);
        assert!(p.at_end());
        assert_eq!(p.raw().text, "b");
        p.fences.pop();
        assert!(!p.at_end());
    }
}
