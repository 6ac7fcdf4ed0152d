//! TLA+ syntax: scanner, operator table, parser and scope-resolved AST.
//!
//! This crate provides:
//! - A lexer that keeps symbol runs whole and records token columns
//! - An operator table seeded with the standard operators and extended by
//!   user definitions while parsing
//! - A precedence-climbing expression parser with layout-sensitive
//!   bulleted lists
//! - An AST whose names are resolved to binders and declarations
//! - A module assembler that recovers at unit boundaries
//!
//! Each call to [`parse_module`] owns all of its state; independent parses
//! may run on different threads.

pub mod ast;
mod builder;
pub mod config;
pub mod error;
pub mod layout;
pub mod lexer;
pub mod optable;
mod parser;
pub mod scope;
pub mod stdlib;
pub mod token;

pub use ast::*;
pub use builder::AstBuilder;
pub use config::ParseConfig;
pub use error::{ErrorCategory, ParseError, ParseResult};
pub use lexer::Lexer;
pub use optable::{Assoc, Fixity, OperatorDecl, OperatorEntry, OperatorTable, Precedence};
pub use scope::SymbolTable;
pub use stdlib::{ModuleEnv, ModuleInterface};
pub use token::{Span, Token, TokenKind};

use parser::Parser;
use std::sync::Arc;
use tracing::debug;

/// Result of parsing one module.
#[derive(Debug)]
pub struct ParseOutcome {
    /// Name of the source, for diagnostics.
    pub origin: String,
    /// The module, possibly partial when there are diagnostics. `None` when
    /// no module header was found or a fatal lexical error cut it short.
    pub module: Option<Module>,
    /// Binders and declarations the AST's resolutions point into.
    pub symbols: SymbolTable,
    /// Every diagnostic, ordered by position.
    pub diagnostics: Vec<ParseError>,
}

impl ParseOutcome {
    /// True if a module was built without any diagnostic.
    pub fn is_ok(&self) -> bool {
        self.module.is_some() && self.diagnostics.is_empty()
    }

    /// Render every diagnostic against `source` for display.
    pub fn reports(&self, source: &str) -> Vec<miette::Report> {
        let source = Arc::new(source.to_string());
        self.diagnostics
            .iter()
            .map(|d| d.to_report(&self.origin, Arc::clone(&source)))
            .collect()
    }
}

/// Parse a module with the default configuration and the standard modules.
pub fn parse_module(source: &str, origin: &str) -> ParseOutcome {
    parse_module_with(source, origin, &ParseConfig::default(), &ModuleEnv::new())
}

/// Parse a module against `env`, the interfaces of modules it may extend
/// or instantiate.
pub fn parse_module_with(
    source: &str,
    origin: &str,
    config: &ParseConfig,
    env: &ModuleEnv,
) -> ParseOutcome {
    debug!(origin, len = source.len(), "parsing source");
    let scanned = Lexer::new(source).tokenize();
    let fatal_at = scanned.fatal().map(|f| f.span().start);
    let assembled = Parser::new(scanned.tokens, config, env).parse_source();

    let mut module = assembled.module;
    // Text after the module is prose; its lexical errors do not count.
    let module_end = module.as_ref().map(|m| m.span.end);
    let mut diagnostics: Vec<ParseError> = scanned
        .diagnostics
        .into_iter()
        .filter(|d| module_end.map_or(true, |end| d.span().start < end) || d.is_fatal())
        .collect();

    match (fatal_at, module_end) {
        (Some(fatal), Some(end)) if fatal >= end => {
            diagnostics.retain(|d| !d.is_fatal());
            diagnostics.extend(assembled.diagnostics);
        }
        (Some(fatal), _) => {
            // Everything the parser said at or past the fatal error is noise
            // from the truncated token stream.
            module = None;
            diagnostics.extend(
                assembled
                    .diagnostics
                    .into_iter()
                    .filter(|d| d.span().start < fatal),
            );
        }
        (None, _) => diagnostics.extend(assembled.diagnostics),
    }

    diagnostics.sort_by_key(|d| d.span().start);
    if config.max_errors != 0 {
        diagnostics.truncate(config.max_errors);
    }
    debug!(
        origin,
        module = module.as_ref().map(|m| m.name.name.as_str()),
        diagnostics = diagnostics.len(),
        "parsed source"
    );
    ParseOutcome {
        origin: origin.to_string(),
        module,
        symbols: assembled.symbols,
        diagnostics,
    }
}

/// Parses a standalone expression.
///
/// Names given to [`ExprParser::constants`] are declared as constants;
/// operators given to [`ExprParser::operator`] are declared into the table
/// and resolve as definitions.
#[derive(Debug, Clone)]
pub struct ExprParser<'s> {
    source: &'s str,
    constants: Vec<String>,
    operators: Vec<OperatorDecl>,
}

impl<'s> ExprParser<'s> {
    pub fn new(source: &'s str) -> Self {
        Self {
            source,
            constants: Vec::new(),
            operators: Vec::new(),
        }
    }

    pub fn constants<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.constants.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn operator(mut self, decl: OperatorDecl) -> Self {
        self.operators.push(decl);
        self
    }

    /// Parse the expression. Any diagnostic, including an unresolved name,
    /// makes this an error.
    pub fn parse(self) -> Result<Expr, Vec<ParseError>> {
        self.parse_with_symbols().map(|(expr, _)| expr)
    }

    /// Like [`ExprParser::parse`], also returning the symbol table the
    /// expression's resolutions refer to.
    pub fn parse_with_symbols(self) -> Result<(Expr, SymbolTable), Vec<ParseError>> {
        let config = ParseConfig {
            operators: self.operators,
            ..ParseConfig::default()
        };
        let env = ModuleEnv::new();
        let scanned = Lexer::new(self.source).tokenize();
        let mut diagnostics = scanned.diagnostics;
        if diagnostics.iter().any(ParseError::is_fatal) {
            return Err(diagnostics);
        }
        let (expr, symbols, parse_diagnostics) =
            Parser::new(scanned.tokens, &config, &env).parse_standalone(&self.constants);
        diagnostics.extend(parse_diagnostics);
        diagnostics.sort_by_key(|d| d.span().start);
        match expr {
            Some(expr) if diagnostics.is_empty() => Ok((expr, symbols)),
            _ => Err(diagnostics),
        }
    }
}
