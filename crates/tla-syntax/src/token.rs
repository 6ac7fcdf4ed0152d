//! Tokens and source span tracking.

use std::fmt;

/// A span in the source code, tracking byte offsets and line/column.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    /// Start byte offset (inclusive).
    pub start: usize,
    /// End byte offset (exclusive).
    pub end: usize,
    /// Line number (1-indexed).
    pub line: u32,
    /// Column number (1-indexed, in characters not bytes).
    pub column: u32,
}

impl Span {
    /// Create a new span.
    pub fn new(start: usize, end: usize, line: u32, column: u32) -> Self {
        Self {
            start,
            end,
            line,
            column,
        }
    }

    /// Create a dummy span for synthesized nodes.
    pub fn dummy() -> Self {
        Self::default()
    }

    /// Merge two spans into one that covers both.
    pub fn merge(self, other: Self) -> Self {
        let (line, column) = if self.start <= other.start {
            (self.line, self.column)
        } else {
            (other.line, other.column)
        };
        Self {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
            line,
            column,
        }
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Check if span is empty.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

impl fmt::Debug for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A token with its kind, literal text and position.
///
/// Tokens are immutable once produced; the grammar engine may split a
/// symbol run into two fresh tokens but never edits one in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// The exact source text of the token.
    pub text: String,
    pub span: Span,
    /// True when no other token precedes this one on its line.
    pub first_on_line: bool,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, span: Span) -> Self {
        Self {
            kind,
            text: text.into(),
            span,
            first_on_line: false,
        }
    }

    pub fn line(&self) -> u32 {
        self.span.line
    }

    pub fn column(&self) -> u32 {
        self.span.column
    }

    pub fn is_eof(&self) -> bool {
        self.kind == TokenKind::Eof
    }

    /// True if this token is the symbol run `sym`.
    pub fn is_symbol(&self, sym: &str) -> bool {
        self.kind == TokenKind::Symbol && self.text == sym
    }

    pub fn is_keyword(&self, kw: Keyword) -> bool {
        self.kind == TokenKind::Keyword(kw)
    }

    /// Split a symbol run after `at` bytes, yielding the head and the tail.
    pub fn split_symbol(&self, at: usize) -> (Token, Token) {
        let head_text = &self.text[..at];
        let tail_text = &self.text[at..];
        let head_cols = head_text.chars().count() as u32;
        let head = Token {
            kind: TokenKind::Symbol,
            text: head_text.to_string(),
            span: Span::new(
                self.span.start,
                self.span.start + at,
                self.span.line,
                self.span.column,
            ),
            first_on_line: self.first_on_line,
        };
        let tail = Token {
            kind: TokenKind::Symbol,
            text: tail_text.to_string(),
            span: Span::new(
                self.span.start + at,
                self.span.end,
                self.span.line,
                self.span.column + head_cols,
            ),
            first_on_line: false,
        };
        (head, tail)
    }
}

/// The kind of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Identifier.
    Ident,
    /// Reserved word.
    Keyword(Keyword),
    /// Integer literal, already decoded from its numeral base.
    Int(i64),
    /// Decimal literal; the text holds the digits.
    Decimal,
    /// String literal; the text holds the unescaped contents.
    String,
    /// A maximal run of symbol characters (`/\`, `\in`, `|->`, `##`, ...).
    /// Matched against the operator table at the point of use.
    Symbol,
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `[`
    LBracket,
    /// `]`
    RBracket,
    /// `{`
    LBrace,
    /// `}`
    RBrace,
    /// `,`
    Comma,
    /// `'`
    Prime,
    /// `_` directly after `]` or `>>` (action subscript).
    Subscript,
    /// Layout marker: a run of four or more `-`.
    Dashes,
    /// Layout marker: a run of four or more `=`.
    ModuleEnd,
    /// End of input.
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Ident => write!(f, "identifier"),
            TokenKind::Keyword(kw) => write!(f, "{}", kw),
            TokenKind::Int(n) => write!(f, "{}", n),
            TokenKind::Decimal => write!(f, "decimal"),
            TokenKind::String => write!(f, "string"),
            TokenKind::Symbol => write!(f, "symbol"),
            TokenKind::LParen => write!(f, "("),
            TokenKind::RParen => write!(f, ")"),
            TokenKind::LBracket => write!(f, "["),
            TokenKind::RBracket => write!(f, "]"),
            TokenKind::LBrace => write!(f, "{{"),
            TokenKind::RBrace => write!(f, "}}"),
            TokenKind::Comma => write!(f, ","),
            TokenKind::Prime => write!(f, "'"),
            TokenKind::Subscript => write!(f, "_"),
            TokenKind::Dashes => write!(f, "----"),
            TokenKind::ModuleEnd => write!(f, "===="),
            TokenKind::Eof => write!(f, "end of input"),
        }
    }
}

macro_rules! keywords {
    ($($variant:ident => $text:literal,)*) => {
        /// Reserved words.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Keyword {
            $($variant,)*
        }

        impl Keyword {
            /// Look up a reserved word by its exact spelling.
            pub fn from_word(word: &str) -> Option<Keyword> {
                match word {
                    $($text => Some(Keyword::$variant),)*
                    _ => None,
                }
            }

            pub fn as_str(self) -> &'static str {
                match self {
                    $(Keyword::$variant => $text,)*
                }
            }
        }
    };
}

keywords! {
    Module => "MODULE",
    Extends => "EXTENDS",
    Constant => "CONSTANT",
    Constants => "CONSTANTS",
    Variable => "VARIABLE",
    Variables => "VARIABLES",
    Assume => "ASSUME",
    Assumption => "ASSUMPTION",
    Axiom => "AXIOM",
    Theorem => "THEOREM",
    Lemma => "LEMMA",
    Proposition => "PROPOSITION",
    Corollary => "COROLLARY",
    Prove => "PROVE",
    Proof => "PROOF",
    By => "BY",
    Def => "DEF",
    Defs => "DEFS",
    Obvious => "OBVIOUS",
    Omitted => "OMITTED",
    Local => "LOCAL",
    Instance => "INSTANCE",
    With => "WITH",
    Let => "LET",
    In => "IN",
    If => "IF",
    Then => "THEN",
    Else => "ELSE",
    Case => "CASE",
    Other => "OTHER",
    Choose => "CHOOSE",
    Enabled => "ENABLED",
    Unchanged => "UNCHANGED",
    Except => "EXCEPT",
    Subset => "SUBSET",
    Union => "UNION",
    Domain => "DOMAIN",
    Boolean => "BOOLEAN",
    String => "STRING",
    Recursive => "RECURSIVE",
    Lambda => "LAMBDA",
    New => "NEW",
    True => "TRUE",
    False => "FALSE",
    WeakFairness => "WF_",
    StrongFairness => "SF_",
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Keyword {
    /// Keywords that open a new module unit.
    pub fn starts_unit(self) -> bool {
        matches!(
            self,
            Keyword::Constant
                | Keyword::Constants
                | Keyword::Variable
                | Keyword::Variables
                | Keyword::Assume
                | Keyword::Assumption
                | Keyword::Axiom
                | Keyword::Theorem
                | Keyword::Lemma
                | Keyword::Proposition
                | Keyword::Corollary
                | Keyword::Local
                | Keyword::Instance
                | Keyword::Recursive
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_lookup() {
        assert_eq!(Keyword::from_word("LET"), Some(Keyword::Let));
        assert_eq!(Keyword::from_word("WF_"), Some(Keyword::WeakFairness));
        assert_eq!(Keyword::from_word("Let"), None);
        assert_eq!(Keyword::Unchanged.as_str(), "UNCHANGED");
    }

    #[test]
    fn test_split_symbol_columns() {
        let tok = Token::new(TokenKind::Symbol, "=-", Span::new(10, 12, 3, 7));
        let (head, tail) = tok.split_symbol(1);
        assert_eq!(head.text, "=");
        assert_eq!(tail.text, "-");
        assert_eq!(head.span, Span::new(10, 11, 3, 7));
        assert_eq!(tail.span, Span::new(11, 12, 3, 8));
    }

    #[test]
    fn test_merge_keeps_earliest_position() {
        let a = Span::new(5, 8, 2, 3);
        let b = Span::new(0, 2, 1, 1);
        let m = a.merge(b);
        assert_eq!((m.start, m.end, m.line, m.column), (0, 8, 1, 1));
    }
}
