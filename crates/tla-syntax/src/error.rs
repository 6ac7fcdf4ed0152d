//! Diagnostics produced while scanning, parsing and resolving a module.

use crate::token::Span;
use miette::{Diagnostic, NamedSource, SourceSpan};
use std::sync::Arc;
use thiserror::Error;

/// Broad class of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Lexical,
    Syntax,
    Declaration,
    Resolution,
}

/// A positioned diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum ParseError {
    // === Lexical ===
    #[error("unterminated {what} starting at {span}")]
    #[diagnostic(code(tla::lex::unterminated))]
    Unterminated { what: &'static str, span: Span },

    #[error("malformed {what} literal `{text}` at {span}")]
    #[diagnostic(code(tla::lex::malformed_literal))]
    MalformedLiteral {
        what: &'static str,
        text: String,
        span: Span,
    },

    #[error("unrecognized character `{ch}` at {span}")]
    #[diagnostic(code(tla::lex::unrecognized_char))]
    UnrecognizedChar { ch: char, span: Span },

    // === Syntax ===
    #[error("unexpected token at {span}: expected {expected}, found `{found}`")]
    #[diagnostic(code(tla::syntax::unexpected_token))]
    UnexpectedToken {
        expected: String,
        found: String,
        span: Span,
    },

    #[error("unresolved operator `{symbol}` at {span}")]
    #[diagnostic(code(tla::syntax::unresolved_operator))]
    UnresolvedOperator { symbol: String, span: Span },

    #[error("operators `{first}` and `{second}` at {span} need parentheses: {reason}")]
    #[diagnostic(code(tla::syntax::precedence))]
    AmbiguousOperators {
        first: String,
        second: String,
        reason: &'static str,
        span: Span,
    },

    #[error("invalid syntax at {span}: {message}")]
    #[diagnostic(code(tla::syntax::invalid))]
    InvalidSyntax { message: String, span: Span },

    // === Declaration ===
    #[error("`{name}` at {span} is already defined in this scope (previous definition at {previous})")]
    #[diagnostic(code(tla::decl::redefinition))]
    Redefinition {
        name: String,
        span: Span,
        previous: Span,
    },

    #[error("`{name}` is used at {span} before its declaration at {declared}")]
    #[diagnostic(code(tla::decl::use_before_declaration))]
    UseBeforeDeclaration {
        name: String,
        span: Span,
        declared: Span,
    },

    #[error("`{name}` refers to itself at {span}; declare it RECURSIVE first")]
    #[diagnostic(code(tla::decl::implicit_recursion))]
    ImplicitRecursion { name: String, span: Span },

    #[error("`{name}` is declared RECURSIVE at {span} but never defined")]
    #[diagnostic(code(tla::decl::undefined_recursive))]
    UndefinedRecursive { name: String, span: Span },

    #[error("operator `{symbol}` at {span} conflicts with an existing declaration: {reason}")]
    #[diagnostic(code(tla::decl::operator_conflict))]
    OperatorConflict {
        symbol: String,
        reason: String,
        span: Span,
    },

    // === Resolution ===
    #[error("unresolved name `{name}` at {span}")]
    #[diagnostic(code(tla::resolve::unresolved_name))]
    UnresolvedName { name: String, span: Span },

    #[error("unknown module `{name}` at {span}")]
    #[diagnostic(code(tla::resolve::unknown_module))]
    UnknownModule { name: String, span: Span },

    #[error("`{instance}!{name}` at {span}: module `{module}` has no such definition or parameter")]
    #[diagnostic(code(tla::resolve::unresolved_qualified))]
    UnresolvedQualified {
        instance: String,
        module: String,
        name: String,
        span: Span,
    },

    #[error("module `{module}` has no parameter `{name}` (substitution at {span})")]
    #[diagnostic(code(tla::resolve::unknown_parameter))]
    UnknownParameter {
        module: String,
        name: String,
        span: Span,
    },
}

/// Result type used throughout the parser.
pub type ParseResult<T> = Result<T, ParseError>;

impl ParseError {
    /// Get the source span where this error occurred.
    pub fn span(&self) -> Span {
        match self {
            ParseError::Unterminated { span, .. }
            | ParseError::MalformedLiteral { span, .. }
            | ParseError::UnrecognizedChar { span, .. }
            | ParseError::UnexpectedToken { span, .. }
            | ParseError::UnresolvedOperator { span, .. }
            | ParseError::AmbiguousOperators { span, .. }
            | ParseError::InvalidSyntax { span, .. }
            | ParseError::Redefinition { span, .. }
            | ParseError::UseBeforeDeclaration { span, .. }
            | ParseError::ImplicitRecursion { span, .. }
            | ParseError::UndefinedRecursive { span, .. }
            | ParseError::OperatorConflict { span, .. }
            | ParseError::UnresolvedName { span, .. }
            | ParseError::UnknownModule { span, .. }
            | ParseError::UnresolvedQualified { span, .. }
            | ParseError::UnknownParameter { span, .. } => *span,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            ParseError::Unterminated { .. }
            | ParseError::MalformedLiteral { .. }
            | ParseError::UnrecognizedChar { .. } => ErrorCategory::Lexical,
            ParseError::UnexpectedToken { .. }
            | ParseError::UnresolvedOperator { .. }
            | ParseError::AmbiguousOperators { .. }
            | ParseError::InvalidSyntax { .. } => ErrorCategory::Syntax,
            ParseError::Redefinition { .. }
            | ParseError::UseBeforeDeclaration { .. }
            | ParseError::ImplicitRecursion { .. }
            | ParseError::UndefinedRecursive { .. }
            | ParseError::OperatorConflict { .. } => ErrorCategory::Declaration,
            ParseError::UnresolvedName { .. }
            | ParseError::UnknownModule { .. }
            | ParseError::UnresolvedQualified { .. }
            | ParseError::UnknownParameter { .. } => ErrorCategory::Resolution,
        }
    }

    /// Fatal errors abort the whole module; everything else is recoverable.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ParseError::Unterminated { .. })
    }

    /// The offending source text, when the diagnostic names one.
    pub fn found(&self) -> Option<&str> {
        match self {
            ParseError::UnexpectedToken { found, .. } => Some(found),
            ParseError::MalformedLiteral { text, .. } => Some(text),
            ParseError::UnresolvedOperator { symbol, .. }
            | ParseError::OperatorConflict { symbol, .. } => Some(symbol),
            ParseError::UnresolvedName { name, .. }
            | ParseError::Redefinition { name, .. }
            | ParseError::UseBeforeDeclaration { name, .. }
            | ParseError::ImplicitRecursion { name, .. }
            | ParseError::UndefinedRecursive { name, .. }
            | ParseError::UnknownModule { name, .. }
            | ParseError::UnresolvedQualified { name, .. }
            | ParseError::UnknownParameter { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Attach source text so the diagnostic renders with a labelled snippet.
    pub fn to_report(&self, origin: &str, source: Arc<String>) -> miette::Report {
        let span = self.span();
        let len = source.len();
        let start = span.start.min(len);
        let end = span.end.clamp(start, len);
        miette::Report::new(SourceDiagnostic {
            message: self.to_string(),
            src: NamedSource::new(origin, source),
            span: (start, end - start).into(),
        })
    }
}

/// A diagnostic bundled with the source it points into.
#[derive(Debug, Error, Diagnostic)]
#[error("{message}")]
#[diagnostic(code(tla::parse_error))]
pub struct SourceDiagnostic {
    message: String,
    #[source_code]
    src: NamedSource<Arc<String>>,
    #[label("here")]
    span: SourceSpan,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories_and_fatality() {
        let span = Span::new(0, 1, 1, 1);
        let lex = ParseError::Unterminated {
            what: "string",
            span,
        };
        assert_eq!(lex.category(), ErrorCategory::Lexical);
        assert!(lex.is_fatal());

        let name = ParseError::UnresolvedName {
            name: "N".into(),
            span,
        };
        assert_eq!(name.category(), ErrorCategory::Resolution);
        assert!(!name.is_fatal());
        assert_eq!(name.found(), Some("N"));
    }

    #[test]
    fn test_message_carries_position() {
        let err = ParseError::UnexpectedToken {
            expected: "`THEN`".into(),
            found: "ELSE".into(),
            span: Span::new(10, 14, 2, 5),
        };
        assert_eq!(
            err.to_string(),
            "unexpected token at 2:5: expected `THEN`, found `ELSE`"
        );
    }

    #[test]
    fn test_report_clamps_span() {
        let err = ParseError::UnresolvedName {
            name: "x".into(),
            span: Span::new(3, 40, 1, 4),
        };
        let report = err.to_report("M.tla", Arc::new("a + x".to_string()));
        assert!(report.to_string().contains("unresolved name `x`"));
    }
}
