//! Lexer: converts module source text into positioned tokens.
//!
//! Symbol characters are grouped into maximal runs without consulting any
//! operator list. Whether `=-` is one operator or two is decided by the
//! grammar engine against the operator table in force at that point.

use crate::error::ParseError;
use crate::token::{Keyword, Span, Token, TokenKind};
use std::collections::VecDeque;

const SYMBOL_CHARS: &str = "!#$%&*+-./:<=>?@\\^|~";

/// Parenthesised operator symbols that are scanned as a single run.
const PAREN_SYMBOLS: &[&str] = &["(+)", "(-)", "(.)", "(/)", "(\\X)"];

fn is_symbol_char(c: char) -> bool {
    SYMBOL_CHARS.contains(c)
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Output of a full scan.
#[derive(Debug)]
pub struct Scanned {
    /// Tokens, always terminated by an `Eof` token.
    pub tokens: Vec<Token>,
    /// Lexical diagnostics. A fatal one, if present, is always last.
    pub diagnostics: Vec<ParseError>,
}

impl Scanned {
    pub fn fatal(&self) -> Option<&ParseError> {
        self.diagnostics.iter().find(|d| d.is_fatal())
    }
}

/// Lexer for module source text.
pub struct Lexer<'a> {
    source: &'a str,
    /// Current byte position.
    pos: usize,
    /// Current line number (1-indexed).
    line: u32,
    /// Current column number (1-indexed).
    column: u32,
    /// Line of the most recently produced token.
    last_token_line: u32,
    /// End offset of the most recent token, and whether it was `]` or `>>`.
    prev: Option<(usize, bool)>,
    /// Tokens scanned ahead by `peek`.
    lookahead: VecDeque<Token>,
    /// Recoverable diagnostics.
    diagnostics: Vec<ParseError>,
    /// Set once a fatal error has been returned; further calls yield EOF.
    halted: bool,
}

impl<'a> Lexer<'a> {
    /// Create a new lexer for the given source.
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            pos: 0,
            line: 1,
            column: 1,
            last_token_line: 0,
            prev: None,
            lookahead: VecDeque::new(),
            diagnostics: Vec::new(),
            halted: false,
        }
    }

    /// Tokenize the entire source.
    ///
    /// Scanning stops at the first fatal error; the token list still ends
    /// with `Eof` so callers can inspect what was read.
    pub fn tokenize(mut self) -> Scanned {
        let mut tokens = Vec::new();
        loop {
            match self.next_token() {
                Ok(token) => {
                    let is_eof = token.is_eof();
                    tokens.push(token);
                    if is_eof {
                        break;
                    }
                }
                Err(fatal) => {
                    self.diagnostics.push(fatal);
                    let span = Span::new(self.pos, self.pos, self.line, self.column);
                    tokens.push(Token::new(TokenKind::Eof, "", span));
                    break;
                }
            }
        }
        Scanned {
            tokens,
            diagnostics: self.diagnostics,
        }
    }

    /// Recoverable diagnostics collected so far.
    pub fn diagnostics(&self) -> &[ParseError] {
        &self.diagnostics
    }

    /// Get the next token, consuming it.
    ///
    /// Returns `Err` only for fatal errors (unterminated string or comment).
    pub fn next_token(&mut self) -> Result<Token, ParseError> {
        if let Some(token) = self.lookahead.pop_front() {
            return Ok(token);
        }
        self.scan_token()
    }

    /// Inspect the token `k` positions ahead without consuming anything.
    pub fn peek(&mut self, k: usize) -> Result<&Token, ParseError> {
        while self.lookahead.len() <= k {
            let token = self.scan_token()?;
            let is_eof = token.is_eof();
            self.lookahead.push_back(token);
            if is_eof {
                break;
            }
        }
        let idx = k.min(self.lookahead.len() - 1);
        Ok(&self.lookahead[idx])
    }

    fn scan_token(&mut self) -> Result<Token, ParseError> {
        loop {
            if self.halted {
                return Ok(self.make_token(TokenKind::Eof, self.pos, self.line, self.column));
            }
            if let Err(fatal) = self.skip_whitespace_and_comments() {
                self.halted = true;
                return Err(fatal);
            }

            let start = self.pos;
            let (line, column) = (self.line, self.column);

            let Some(c) = self.peek_char() else {
                return Ok(self.make_token(TokenKind::Eof, start, line, column));
            };

            let kind = match c {
                '"' => {
                    return match self.lex_string(start, line, column) {
                        Ok(value) => {
                            Ok(self.finish_token(TokenKind::String, value, start, line, column))
                        }
                        Err(fatal) => {
                            self.halted = true;
                            Err(fatal)
                        }
                    };
                }
                '(' => self.lex_lparen(),
                ')' => self.single(TokenKind::RParen),
                '[' => self.lex_lbracket(),
                ']' => self.single(TokenKind::RBracket),
                '{' => self.single(TokenKind::LBrace),
                '}' => self.single(TokenKind::RBrace),
                ',' => self.single(TokenKind::Comma),
                '\'' => self.single(TokenKind::Prime),
                '_' if self.follows_subscript_opener(start) => self.single(TokenKind::Subscript),
                '\\' => self.lex_backslash(start, line, column),
                c if is_symbol_char(c) => self.lex_symbol_run(),
                c if is_word_char(c) => self.lex_word(start, line, column),
                other => {
                    self.advance();
                    self.diagnostics.push(ParseError::UnrecognizedChar {
                        ch: other,
                        span: Span::new(start, self.pos, line, column),
                    });
                    continue;
                }
            };

            return Ok(self.make_token(kind, start, line, column));
        }
    }

    fn make_token(&mut self, kind: TokenKind, start: usize, line: u32, column: u32) -> Token {
        let text = self.source[start..self.pos].to_string();
        self.finish_token(kind, text, start, line, column)
    }

    fn finish_token(
        &mut self,
        kind: TokenKind,
        text: String,
        start: usize,
        line: u32,
        column: u32,
    ) -> Token {
        let mut token = Token::new(kind, text, Span::new(start, self.pos, line, column));
        token.first_on_line = line != self.last_token_line;
        self.last_token_line = line;
        // A run such as `>>>>` closing nested tuples still ends in `>>`.
        let closes_bracket = kind == TokenKind::RBracket
            || (kind == TokenKind::Symbol && token.text.ends_with(">>"));
        self.prev = Some((self.pos, closes_bracket));
        token
    }

    // === Character access ===

    fn rest(&self) -> &'a str {
        &self.source[self.pos..]
    }

    fn peek_char(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_nth(&self, n: usize) -> Option<char> {
        self.rest().chars().nth(n)
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.advance();
        kind
    }

    fn follows_subscript_opener(&self, start: usize) -> bool {
        matches!(self.prev, Some((end, true)) if end == start)
    }

    // === Trivia ===

    fn skip_whitespace_and_comments(&mut self) -> Result<(), ParseError> {
        loop {
            match self.peek_char() {
                Some(c) if c.is_whitespace() => {
                    self.advance();
                }
                Some('\\') if self.peek_nth(1) == Some('*') => {
                    while let Some(c) = self.peek_char() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                Some('(') if self.peek_nth(1) == Some('*') => self.skip_block_comment()?,
                _ => return Ok(()),
            }
        }
    }

    /// Skip a `(* ... *)` comment. Block comments nest.
    fn skip_block_comment(&mut self) -> Result<(), ParseError> {
        let start = self.pos;
        let (line, column) = (self.line, self.column);
        self.advance();
        self.advance();
        let mut depth = 1usize;
        while depth > 0 {
            match self.advance() {
                Some('(') if self.peek_char() == Some('*') => {
                    self.advance();
                    depth += 1;
                }
                Some('*') if self.peek_char() == Some(')') => {
                    self.advance();
                    depth -= 1;
                }
                Some(_) => {}
                None => {
                    return Err(ParseError::Unterminated {
                        what: "comment",
                        span: Span::new(start, self.pos, line, column),
                    })
                }
            }
        }
        Ok(())
    }

    // === Token classes ===

    fn lex_lparen(&mut self) -> TokenKind {
        for sym in PAREN_SYMBOLS {
            if self.rest().starts_with(sym) {
                for _ in 0..sym.chars().count() {
                    self.advance();
                }
                return TokenKind::Symbol;
            }
        }
        self.single(TokenKind::LParen)
    }

    fn lex_lbracket(&mut self) -> TokenKind {
        self.advance();
        // [] with no space between is the box operator / CASE separator
        if self.peek_char() == Some(']') {
            self.advance();
            TokenKind::Symbol
        } else {
            TokenKind::LBracket
        }
    }

    fn lex_backslash(&mut self, start: usize, line: u32, column: u32) -> TokenKind {
        let next = self.peek_nth(1);
        let after = self.peek_nth(2);
        match (next, after) {
            (Some('b' | 'B'), Some(d)) if d.is_ascii_digit() => {
                self.lex_based_number(2, "binary", start, line, column)
            }
            (Some('o' | 'O'), Some(d)) if d.is_ascii_digit() => {
                self.lex_based_number(8, "octal", start, line, column)
            }
            (Some('h' | 'H'), Some(d)) if d.is_ascii_hexdigit() => {
                self.lex_based_number(16, "hexadecimal", start, line, column)
            }
            (Some(c), _) if c.is_ascii_alphabetic() => {
                self.advance();
                while self.peek_char().is_some_and(|c| c.is_ascii_alphabetic()) {
                    self.advance();
                }
                TokenKind::Symbol
            }
            _ => self.lex_symbol_run(),
        }
    }

    fn lex_symbol_run(&mut self) -> TokenKind {
        let start = self.pos;
        while let Some(c) = self.peek_char() {
            if !is_symbol_char(c) {
                break;
            }
            // A backslash word or a line comment starts a new token.
            if c == '\\'
                && self.pos > start
                && self
                    .peek_nth(1)
                    .is_some_and(|n| n.is_ascii_alphabetic() || n == '*')
            {
                break;
            }
            self.advance();
        }
        let text = &self.source[start..self.pos];
        if text.len() >= 4 && text.chars().all(|c| c == '-') {
            TokenKind::Dashes
        } else if text.len() >= 4 && text.chars().all(|c| c == '=') {
            TokenKind::ModuleEnd
        } else {
            TokenKind::Symbol
        }
    }

    fn lex_string(&mut self, start: usize, line: u32, column: u32) -> Result<String, ParseError> {
        self.advance(); // opening quote
        let mut value = String::new();
        let mut bad_escape = None;
        loop {
            match self.peek_char() {
                None | Some('\n') => {
                    return Err(ParseError::Unterminated {
                        what: "string",
                        span: Span::new(start, self.pos, line, column),
                    });
                }
                Some('"') => {
                    self.advance();
                    break;
                }
                Some('\\') => {
                    let esc_start = self.pos;
                    let esc_line = self.line;
                    let esc_column = self.column;
                    self.advance();
                    match self.advance() {
                        Some('n') => value.push('\n'),
                        Some('t') => value.push('\t'),
                        Some('r') => value.push('\r'),
                        Some('f') => value.push('\u{c}'),
                        Some('\\') => value.push('\\'),
                        Some('"') => value.push('"'),
                        Some('\n') | None => {
                            return Err(ParseError::Unterminated {
                                what: "string",
                                span: Span::new(start, self.pos, line, column),
                            });
                        }
                        Some(other) => {
                            bad_escape.get_or_insert(ParseError::MalformedLiteral {
                                what: "string",
                                text: format!("\\{}", other),
                                span: Span::new(esc_start, self.pos, esc_line, esc_column),
                            });
                        }
                    }
                }
                Some(c) => {
                    value.push(c);
                    self.advance();
                }
            }
        }
        if let Some(err) = bad_escape {
            self.diagnostics.push(err);
        }
        Ok(value)
    }

    fn lex_based_number(
        &mut self,
        radix: u32,
        what: &'static str,
        start: usize,
        line: u32,
        column: u32,
    ) -> TokenKind {
        self.advance(); // backslash
        self.advance(); // base letter
        let digits_start = self.pos;
        while self.peek_char().is_some_and(|c| c.is_ascii_alphanumeric()) {
            self.advance();
        }
        let digits = &self.source[digits_start..self.pos];
        match i64::from_str_radix(digits, radix) {
            Ok(n) => TokenKind::Int(n),
            Err(_) => {
                self.diagnostics.push(ParseError::MalformedLiteral {
                    what,
                    text: self.source[start..self.pos].to_string(),
                    span: Span::new(start, self.pos, line, column),
                });
                TokenKind::Int(0)
            }
        }
    }

    fn lex_word(&mut self, start: usize, line: u32, column: u32) -> TokenKind {
        for (prefix, kw) in [("WF_", Keyword::WeakFairness), ("SF_", Keyword::StrongFairness)] {
            if self.rest().starts_with(prefix) {
                for _ in 0..prefix.len() {
                    self.advance();
                }
                return TokenKind::Keyword(kw);
            }
        }

        while self.peek_char().is_some_and(is_word_char) {
            self.advance();
        }
        let word = &self.source[start..self.pos];

        if word.chars().all(|c| c.is_ascii_digit()) {
            // Decimal: digits '.' digits (but not the `..` range operator)
            if self.peek_char() == Some('.') && self.peek_nth(1).is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
                while self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
                    self.advance();
                }
                return TokenKind::Decimal;
            }
            return match word.parse::<i64>() {
                Ok(n) => TokenKind::Int(n),
                Err(_) => {
                    self.diagnostics.push(ParseError::MalformedLiteral {
                        what: "integer",
                        text: word.to_string(),
                        span: Span::new(start, self.pos, line, column),
                    });
                    TokenKind::Int(0)
                }
            };
        }

        match Keyword::from_word(word) {
            Some(kw) => TokenKind::Keyword(kw),
            None => TokenKind::Ident,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(input: &str) -> Scanned {
        Lexer::new(input).tokenize()
    }

    fn lex(input: &str) -> Vec<(TokenKind, String)> {
        scan(input)
            .tokens
            .into_iter()
            .filter(|t| !t.is_eof())
            .map(|t| (t.kind, t.text))
            .collect()
    }

    fn texts(input: &str) -> Vec<String> {
        lex(input).into_iter().map(|(_, t)| t).collect()
    }

    #[test]
    fn test_module_delimiters() {
        assert_eq!(
            lex("---- MODULE Foo ----"),
            vec![
                (TokenKind::Dashes, "----".into()),
                (TokenKind::Keyword(Keyword::Module), "MODULE".into()),
                (TokenKind::Ident, "Foo".into()),
                (TokenKind::Dashes, "----".into()),
            ]
        );
        assert_eq!(lex("====")[0].0, TokenKind::ModuleEnd);
        assert_eq!(lex("---")[0].0, TokenKind::Symbol);
    }

    #[test]
    fn test_symbol_runs_are_maximal() {
        assert_eq!(texts("a /\\ b"), vec!["a", "/\\", "b"]);
        assert_eq!(texts("x=-1"), vec!["x", "=-", "1"]);
        assert_eq!(texts("a ## b"), vec!["a", "##", "b"]);
        assert_eq!(texts("[x \\in S |-> 1]"), vec!["[", "x", "\\in", "S", "|->", "1", "]"]);
    }

    #[test]
    fn test_backslash_words() {
        assert_eq!(texts("\\A x \\in S"), vec!["\\A", "x", "\\in", "S"]);
        assert_eq!(texts("S \\cup T"), vec!["S", "\\cup", "T"]);
        assert_eq!(texts("a \\/ b"), vec!["a", "\\/", "b"]);
        assert_eq!(texts("S \\ T"), vec!["S", "\\", "T"]);
    }

    #[test]
    fn test_box_and_paren_symbols() {
        assert_eq!(texts("[][Next]_vars"), vec!["[]", "[", "Next", "]", "_", "vars"]);
        assert_eq!(lex("]_v")[1].0, TokenKind::Subscript);
        assert_eq!(texts("<<x>>>>_v"), vec!["<<", "x", ">>>>", "_", "v"]);
        assert_eq!(lex("<<x>>>>_v")[3].0, TokenKind::Subscript);
        assert_eq!(lex("x >>_v")[2].0, TokenKind::Subscript);
        assert_eq!(texts("a (+) b"), vec!["a", "(+)", "b"]);
        assert_eq!(lex("(a)")[0].0, TokenKind::LParen);
    }

    #[test]
    fn test_fairness_prefix_split() {
        assert_eq!(
            lex("WF_vars(A)")[..2],
            [
                (TokenKind::Keyword(Keyword::WeakFairness), "WF_".into()),
                (TokenKind::Ident, "vars".into()),
            ]
        );
    }

    #[test]
    fn test_numerals() {
        assert_eq!(lex("42")[0].0, TokenKind::Int(42));
        assert_eq!(lex("\\b1010")[0].0, TokenKind::Int(10));
        assert_eq!(lex("\\o17")[0].0, TokenKind::Int(15));
        assert_eq!(lex("\\hFF")[0].0, TokenKind::Int(255));
        assert_eq!(lex("3.25")[0], (TokenKind::Decimal, "3.25".into()));
        assert_eq!(texts("1..N"), vec!["1", "..", "N"]);
        assert_eq!(lex("2PC")[0].0, TokenKind::Ident);
    }

    #[test]
    fn test_malformed_numeral_is_recoverable() {
        let scanned = scan("x = \\b102 + 1");
        assert_eq!(scanned.diagnostics.len(), 1);
        assert!(matches!(
            &scanned.diagnostics[0],
            ParseError::MalformedLiteral { text, .. } if text == "\\b102"
        ));
        assert!(scanned.fatal().is_none());
        assert_eq!(scanned.tokens.len(), 6);
    }

    #[test]
    fn test_string_escapes() {
        let scanned = scan(r#""a\"b\n""#);
        assert_eq!(scanned.tokens[0].kind, TokenKind::String);
        assert_eq!(scanned.tokens[0].text, "a\"b\n");
        assert!(scanned.diagnostics.is_empty());
    }

    #[test]
    fn test_unterminated_string_is_fatal() {
        let scanned = scan("x == \"abc\ny == 1");
        let fatal = scanned.fatal().expect("fatal error");
        assert_eq!(fatal.span().line, 1);
        assert_eq!(fatal.span().column, 6);
        assert!(scanned.tokens.last().unwrap().is_eof());
    }

    #[test]
    fn test_unterminated_comment_is_fatal() {
        let scanned = scan("a (* open (* nested *) still open");
        assert!(matches!(
            scanned.fatal(),
            Some(ParseError::Unterminated { what: "comment", .. })
        ));
    }

    #[test]
    fn test_comments_skipped() {
        assert_eq!(texts("x \\* line\ny"), vec!["x", "y"]);
        assert_eq!(texts("x (* a (* b *) c *) y"), vec!["x", "y"]);
    }

    #[test]
    fn test_unrecognized_char_recovers() {
        let scanned = scan("a ` b");
        assert_eq!(scanned.tokens.len(), 3);
        assert!(matches!(
            scanned.diagnostics[0],
            ParseError::UnrecognizedChar { ch: '`', .. }
        ));
    }

    #[test]
    fn test_positions() {
        let tokens = scan("A ==\n  /\\ x\n  /\\ y").tokens;
        let bullets: Vec<_> = tokens.iter().filter(|t| t.is_symbol("/\\")).collect();
        assert_eq!(bullets.len(), 2);
        assert_eq!((bullets[0].line(), bullets[0].column()), (2, 3));
        assert_eq!((bullets[1].line(), bullets[1].column()), (3, 3));
        assert!(bullets[0].first_on_line);
        assert!(!tokens[1].first_on_line);
    }

    #[test]
    fn test_peek_does_not_consume() {
        let mut lexer = Lexer::new("a + b");
        assert_eq!(lexer.peek(2).unwrap().text, "b");
        assert_eq!(lexer.peek(0).unwrap().text, "a");
        assert_eq!(lexer.next_token().unwrap().text, "a");
        assert_eq!(lexer.next_token().unwrap().text, "+");
        assert!(lexer.peek(5).unwrap().is_eof());
    }
}
