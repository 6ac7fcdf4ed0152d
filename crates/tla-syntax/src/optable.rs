//! Operator table: symbol and fixity to precedence, associativity and arity.
//!
//! Built-in entries live in a fixed base layer that is never modified.
//! User declarations go into scoped layers on top of it, so shadowing a
//! built-in is always undone when the declaring scope closes.

use crate::token::Span;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tracing::debug;

/// Lowest and highest level of the precedence scale.
pub const MIN_LEVEL: u8 = 1;
pub const MAX_LEVEL: u8 = 15;

/// Where an operator is written relative to its operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fixity {
    Prefix,
    Infix,
    Postfix,
    /// Interleaved with keywords or brackets; parsed by a dedicated routine.
    Mixfix,
}

impl Fixity {
    /// Number of operands of a non-mixfix operator.
    pub fn arity(self) -> Arity {
        match self {
            Fixity::Prefix | Fixity::Postfix => Arity::Fixed(1),
            Fixity::Infix => Arity::Fixed(2),
            Fixity::Mixfix => Arity::Variadic,
        }
    }
}

impl fmt::Display for Fixity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Fixity::Prefix => "prefix",
            Fixity::Infix => "infix",
            Fixity::Postfix => "postfix",
            Fixity::Mixfix => "mixfix",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Assoc {
    Left,
    Right,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arity {
    Fixed(usize),
    Variadic,
}

/// A precedence range. Most operators occupy a single level.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Precedence {
    pub lo: u8,
    pub hi: u8,
}

impl Precedence {
    pub const fn new(lo: u8, hi: u8) -> Self {
        Self { lo, hi }
    }

    pub const fn point(level: u8) -> Self {
        Self { lo: level, hi: level }
    }

    pub fn overlaps(self, other: Precedence) -> bool {
        self.lo <= other.hi && other.lo <= self.hi
    }

    pub fn contains(self, level: u8) -> bool {
        self.lo <= level && level <= self.hi
    }

    fn in_scale(self) -> bool {
        MIN_LEVEL <= self.lo && self.lo <= self.hi && self.hi <= MAX_LEVEL
    }
}

impl fmt::Debug for Precedence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Precedence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.lo == self.hi {
            write!(f, "{}", self.lo)
        } else {
            write!(f, "{}-{}", self.lo, self.hi)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorSource {
    Builtin,
    User { span: Span },
}

/// A resolved operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorEntry {
    /// Spelling used to look the entry up.
    pub symbol: String,
    /// Canonical spelling shared by synonyms (`\land` and `/\`).
    pub canonical: String,
    pub fixity: Fixity,
    pub precedence: Precedence,
    pub arity: Arity,
    pub assoc: Assoc,
    pub source: OperatorSource,
}

impl OperatorEntry {
    pub fn is_builtin(&self) -> bool {
        self.source == OperatorSource::Builtin
    }
}

/// A user operator declaration, either from `ParseConfig` or an imported
/// module interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorDecl {
    pub symbol: String,
    pub fixity: Fixity,
    pub precedence: Precedence,
    pub assoc: Assoc,
}

impl OperatorDecl {
    pub fn infix(symbol: impl Into<String>, precedence: Precedence, assoc: Assoc) -> Self {
        Self {
            symbol: symbol.into(),
            fixity: Fixity::Infix,
            precedence,
            assoc,
        }
    }

    pub fn prefix(symbol: impl Into<String>, precedence: Precedence) -> Self {
        Self {
            symbol: symbol.into(),
            fixity: Fixity::Prefix,
            precedence,
            assoc: Assoc::None,
        }
    }

    pub fn postfix(symbol: impl Into<String>, precedence: Precedence) -> Self {
        Self {
            symbol: symbol.into(),
            fixity: Fixity::Postfix,
            precedence,
            assoc: Assoc::None,
        }
    }

    /// Number of operands the declared operator takes.
    pub fn operand_count(&self) -> usize {
        match self.fixity.arity() {
            Arity::Fixed(n) => n,
            Arity::Variadic => 0,
        }
    }
}

/// Reasons a declaration is refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Conflict {
    #[error("already declared with precedence {existing} in this scope")]
    Precedence { existing: Precedence },
    #[error("level {level} is reserved for {reserved} operators")]
    ReservedLevel { level: u8, reserved: Fixity },
    #[error("precedence {0} is outside the scale {MIN_LEVEL}-{MAX_LEVEL}")]
    OutOfScale(Precedence),
    #[error("mixfix forms cannot be declared")]
    Mixfix,
    #[error("`{0}` is not a definable operator symbol")]
    NotDefinable(String),
}

type Key = (String, Fixity);

/// Built-in operators: spelling, canonical spelling, fixity, lo, hi, associativity.
#[rustfmt::skip]
const BUILTINS: &[(&str, &str, Fixity, u8, u8, Assoc)] = &[
    // Logic
    ("=>", "=>", Fixity::Infix, 1, 1, Assoc::None),
    ("<=>", "<=>", Fixity::Infix, 2, 2, Assoc::None),
    ("\\equiv", "<=>", Fixity::Infix, 2, 2, Assoc::None),
    ("~>", "~>", Fixity::Infix, 2, 2, Assoc::None),
    ("-+->", "-+->", Fixity::Infix, 2, 2, Assoc::None),
    ("/\\", "/\\", Fixity::Infix, 3, 3, Assoc::Left),
    ("\\land", "/\\", Fixity::Infix, 3, 3, Assoc::Left),
    ("\\/", "\\/", Fixity::Infix, 3, 3, Assoc::Left),
    ("\\lor", "\\/", Fixity::Infix, 3, 3, Assoc::Left),
    // Relations
    ("=", "=", Fixity::Infix, 5, 5, Assoc::None),
    ("#", "#", Fixity::Infix, 5, 5, Assoc::None),
    ("/=", "#", Fixity::Infix, 5, 5, Assoc::None),
    ("<", "<", Fixity::Infix, 5, 5, Assoc::None),
    (">", ">", Fixity::Infix, 5, 5, Assoc::None),
    ("=<", "=<", Fixity::Infix, 5, 5, Assoc::None),
    ("<=", "=<", Fixity::Infix, 5, 5, Assoc::None),
    ("\\leq", "=<", Fixity::Infix, 5, 5, Assoc::None),
    (">=", ">=", Fixity::Infix, 5, 5, Assoc::None),
    ("\\geq", ">=", Fixity::Infix, 5, 5, Assoc::None),
    ("\\in", "\\in", Fixity::Infix, 5, 5, Assoc::None),
    ("\\notin", "\\notin", Fixity::Infix, 5, 5, Assoc::None),
    ("\\subseteq", "\\subseteq", Fixity::Infix, 5, 5, Assoc::None),
    ("\\subset", "\\subset", Fixity::Infix, 5, 5, Assoc::None),
    ("\\supseteq", "\\supseteq", Fixity::Infix, 5, 5, Assoc::None),
    ("\\supset", "\\supset", Fixity::Infix, 5, 5, Assoc::None),
    ("\\prec", "\\prec", Fixity::Infix, 5, 5, Assoc::None),
    ("\\preceq", "\\preceq", Fixity::Infix, 5, 5, Assoc::None),
    ("\\succ", "\\succ", Fixity::Infix, 5, 5, Assoc::None),
    ("\\succeq", "\\succeq", Fixity::Infix, 5, 5, Assoc::None),
    ("\\ll", "\\ll", Fixity::Infix, 5, 5, Assoc::None),
    ("\\gg", "\\gg", Fixity::Infix, 5, 5, Assoc::None),
    ("\\sim", "\\sim", Fixity::Infix, 5, 5, Assoc::None),
    ("\\simeq", "\\simeq", Fixity::Infix, 5, 5, Assoc::None),
    ("\\approx", "\\approx", Fixity::Infix, 5, 5, Assoc::None),
    ("\\asymp", "\\asymp", Fixity::Infix, 5, 5, Assoc::None),
    ("\\cong", "\\cong", Fixity::Infix, 5, 5, Assoc::None),
    ("\\doteq", "\\doteq", Fixity::Infix, 5, 5, Assoc::None),
    ("\\propto", "\\propto", Fixity::Infix, 5, 5, Assoc::None),
    ("\\sqsubset", "\\sqsubset", Fixity::Infix, 5, 5, Assoc::None),
    ("\\sqsubseteq", "\\sqsubseteq", Fixity::Infix, 5, 5, Assoc::None),
    ("\\sqsupset", "\\sqsupset", Fixity::Infix, 5, 5, Assoc::None),
    ("\\sqsupseteq", "\\sqsupseteq", Fixity::Infix, 5, 5, Assoc::None),
    // Functions and sets
    ("@@", "@@", Fixity::Infix, 6, 6, Assoc::Left),
    (":>", ":>", Fixity::Infix, 7, 7, Assoc::None),
    ("<:", "<:", Fixity::Infix, 7, 7, Assoc::None),
    ("\\cup", "\\cup", Fixity::Infix, 8, 8, Assoc::Left),
    ("\\union", "\\cup", Fixity::Infix, 8, 8, Assoc::Left),
    ("\\cap", "\\cap", Fixity::Infix, 8, 8, Assoc::Left),
    ("\\intersect", "\\cap", Fixity::Infix, 8, 8, Assoc::Left),
    ("\\", "\\", Fixity::Infix, 8, 8, Assoc::None),
    ("..", "..", Fixity::Infix, 9, 9, Assoc::None),
    // Arithmetic
    ("+", "+", Fixity::Infix, 10, 10, Assoc::Left),
    ("-", "-", Fixity::Infix, 11, 11, Assoc::Left),
    ("%", "%", Fixity::Infix, 10, 11, Assoc::None),
    ("\\X", "\\X", Fixity::Infix, 10, 13, Assoc::Left),
    ("\\times", "\\X", Fixity::Infix, 10, 13, Assoc::Left),
    ("*", "*", Fixity::Infix, 13, 13, Assoc::Left),
    ("/", "/", Fixity::Infix, 13, 13, Assoc::None),
    ("\\div", "\\div", Fixity::Infix, 13, 13, Assoc::None),
    ("\\o", "\\o", Fixity::Infix, 13, 13, Assoc::Left),
    ("\\circ", "\\o", Fixity::Infix, 13, 13, Assoc::Left),
    ("^", "^", Fixity::Infix, 14, 14, Assoc::None),
    // Prefix
    ("~", "~", Fixity::Prefix, 4, 4, Assoc::None),
    ("\\lnot", "~", Fixity::Prefix, 4, 4, Assoc::None),
    ("\\neg", "~", Fixity::Prefix, 4, 4, Assoc::None),
    ("[]", "[]", Fixity::Prefix, 4, 15, Assoc::None),
    ("<>", "<>", Fixity::Prefix, 4, 15, Assoc::None),
    ("ENABLED", "ENABLED", Fixity::Prefix, 4, 15, Assoc::None),
    ("UNCHANGED", "UNCHANGED", Fixity::Prefix, 4, 15, Assoc::None),
    ("SUBSET", "SUBSET", Fixity::Prefix, 8, 8, Assoc::None),
    ("UNION", "UNION", Fixity::Prefix, 8, 8, Assoc::None),
    ("DOMAIN", "DOMAIN", Fixity::Prefix, 9, 9, Assoc::None),
    ("-", "-", Fixity::Prefix, 12, 12, Assoc::None),
    // Postfix
    ("'", "'", Fixity::Postfix, 15, 15, Assoc::None),
    ("^+", "^+", Fixity::Postfix, 15, 15, Assoc::None),
    ("^*", "^*", Fixity::Postfix, 15, 15, Assoc::None),
    ("^#", "^#", Fixity::Postfix, 15, 15, Assoc::None),
];

/// Keyworded and bracketed forms dispatched to dedicated routines.
const MIXFIX: &[(&str, &str)] = &[
    ("IF", "IF"),
    ("CASE", "CASE"),
    ("LET", "LET"),
    ("CHOOSE", "CHOOSE"),
    ("LAMBDA", "LAMBDA"),
    ("WF_", "WF_"),
    ("SF_", "SF_"),
    ("\\A", "\\A"),
    ("\\forall", "\\A"),
    ("\\E", "\\E"),
    ("\\exists", "\\E"),
    ("\\AA", "\\AA"),
    ("\\EE", "\\EE"),
];

/// Symbols with a standard precedence but no built-in meaning. They enter
/// the table only when a module defines them.
#[rustfmt::skip]
const CATALOG: &[(&str, &str, u8, u8, Assoc)] = &[
    ("++", "++", 10, 10, Assoc::Left),
    ("--", "--", 11, 11, Assoc::Left),
    ("**", "**", 13, 13, Assoc::Left),
    ("//", "//", 13, 13, Assoc::None),
    ("##", "##", 9, 13, Assoc::Left),
    ("$", "$", 9, 13, Assoc::Left),
    ("$$", "$$", 9, 13, Assoc::Left),
    ("%%", "%%", 10, 11, Assoc::Left),
    ("&", "&", 13, 13, Assoc::Left),
    ("&&", "&&", 13, 13, Assoc::Left),
    ("|", "|", 10, 11, Assoc::Left),
    ("||", "||", 10, 11, Assoc::Left),
    ("??", "??", 9, 13, Assoc::Left),
    ("!!", "!!", 9, 13, Assoc::None),
    ("^^", "^^", 14, 14, Assoc::None),
    ("...", "...", 9, 9, Assoc::None),
    ("::=", "::=", 5, 5, Assoc::None),
    (":=", ":=", 5, 5, Assoc::None),
    ("|-", "|-", 5, 5, Assoc::None),
    ("|=", "|=", 5, 5, Assoc::None),
    ("-|", "-|", 5, 5, Assoc::None),
    ("=|", "=|", 5, 5, Assoc::None),
    ("(+)", "(+)", 10, 10, Assoc::Left),
    ("\\oplus", "(+)", 10, 10, Assoc::Left),
    ("(-)", "(-)", 11, 11, Assoc::Left),
    ("\\ominus", "(-)", 11, 11, Assoc::Left),
    ("(.)", "(.)", 13, 13, Assoc::Left),
    ("\\odot", "(.)", 13, 13, Assoc::Left),
    ("(/)", "(/)", 13, 13, Assoc::None),
    ("\\oslash", "(/)", 13, 13, Assoc::None),
    ("(\\X)", "(\\X)", 13, 13, Assoc::Left),
    ("\\otimes", "(\\X)", 13, 13, Assoc::Left),
    ("\\uplus", "\\uplus", 9, 13, Assoc::Left),
    ("\\sqcap", "\\sqcap", 9, 13, Assoc::Left),
    ("\\sqcup", "\\sqcup", 9, 13, Assoc::Left),
    ("\\star", "\\star", 13, 13, Assoc::Left),
    ("\\bullet", "\\bullet", 13, 13, Assoc::Left),
    ("\\bigcirc", "\\bigcirc", 13, 13, Assoc::Left),
    ("\\cdot", "\\cdot", 5, 14, Assoc::Left),
    ("\\wr", "\\wr", 9, 14, Assoc::None),
];

/// Look up the standard precedence of a symbol, built in or catalogued.
pub fn standard_entry(symbol: &str, fixity: Fixity) -> Option<(Precedence, Assoc)> {
    BUILTINS
        .iter()
        .find(|(s, _, f, ..)| *s == symbol && *f == fixity)
        .map(|&(_, _, _, lo, hi, assoc)| (Precedence::new(lo, hi), assoc))
        .or_else(|| {
            if fixity != Fixity::Infix {
                return None;
            }
            CATALOG
                .iter()
                .find(|(s, ..)| *s == symbol)
                .map(|&(_, _, lo, hi, assoc)| (Precedence::new(lo, hi), assoc))
        })
}

fn catalog_canonical(symbol: &str) -> Option<&'static str> {
    CATALOG
        .iter()
        .find(|(s, ..)| *s == symbol)
        .map(|(_, canonical, ..)| *canonical)
}

/// The canonical spelling of `symbol` used as its name in scope: `\oplus`
/// and `(+)` both become `(+)`. Unknown symbols are their own canonical form.
pub fn canonical_symbol(symbol: &str, fixity: Fixity) -> String {
    BUILTINS
        .iter()
        .find(|(s, _, f, ..)| *s == symbol && *f == fixity)
        .map(|(_, canonical, ..)| *canonical)
        .or_else(|| (fixity == Fixity::Infix).then(|| catalog_canonical(symbol)).flatten())
        .unwrap_or(symbol)
        .to_string()
}

/// The name an operator definition is declared under in scope: the
/// canonical spelling, with prefix minus written `-.`.
pub fn scope_symbol(symbol: &str, fixity: Fixity) -> String {
    if fixity == Fixity::Prefix && symbol == "-" {
        "-.".to_string()
    } else {
        canonical_symbol(symbol, fixity)
    }
}

/// Standard spellings of the given fixity whose canonical form is `canonical`.
fn synonyms(canonical: &str, fixity: Fixity) -> impl Iterator<Item = &'static str> + '_ {
    let builtin = BUILTINS
        .iter()
        .filter(move |(_, c, f, ..)| *c == canonical && *f == fixity)
        .map(|(s, ..)| *s);
    let catalog = CATALOG
        .iter()
        .filter(move |(_, c, ..)| fixity == Fixity::Infix && *c == canonical)
        .map(|(s, ..)| *s);
    builtin.chain(catalog)
}

/// Scoped operator registry for one parse.
#[derive(Debug, Clone)]
pub struct OperatorTable {
    builtins: HashMap<Key, OperatorEntry>,
    layers: Vec<HashMap<Key, OperatorEntry>>,
}

impl Default for OperatorTable {
    fn default() -> Self {
        Self::new()
    }
}

impl OperatorTable {
    /// A table seeded with the built-in operators and one open user scope.
    pub fn new() -> Self {
        let mut builtins = HashMap::new();
        for &(symbol, canonical, fixity, lo, hi, assoc) in BUILTINS {
            let arity = if canonical == "\\X" {
                Arity::Variadic
            } else {
                fixity.arity()
            };
            builtins.insert(
                (symbol.to_string(), fixity),
                OperatorEntry {
                    symbol: symbol.to_string(),
                    canonical: canonical.to_string(),
                    fixity,
                    precedence: Precedence::new(lo, hi),
                    arity,
                    assoc,
                    source: OperatorSource::Builtin,
                },
            );
        }
        for &(symbol, canonical) in MIXFIX {
            builtins.insert(
                (symbol.to_string(), Fixity::Mixfix),
                OperatorEntry {
                    symbol: symbol.to_string(),
                    canonical: canonical.to_string(),
                    fixity: Fixity::Mixfix,
                    // Mixfix forms are not climbed; their bodies extend as far as possible.
                    precedence: Precedence::point(0),
                    arity: Arity::Variadic,
                    assoc: Assoc::None,
                    source: OperatorSource::Builtin,
                },
            );
        }
        Self {
            builtins,
            layers: vec![HashMap::new()],
        }
    }

    /// Find the entry in force for `(symbol, fixity)`, innermost scope first.
    pub fn lookup(&self, symbol: &str, fixity: Fixity) -> Option<&OperatorEntry> {
        let key = (symbol.to_string(), fixity);
        self.layers
            .iter()
            .rev()
            .find_map(|layer| layer.get(&key))
            .or_else(|| self.builtins.get(&key))
    }

    /// True if the symbol has an entry of any fixity, or is a catalogued
    /// definable symbol.
    pub fn is_known(&self, symbol: &str) -> bool {
        [Fixity::Prefix, Fixity::Infix, Fixity::Postfix, Fixity::Mixfix]
            .iter()
            .any(|&f| self.lookup(symbol, f).is_some())
            || catalog_canonical(symbol).is_some()
    }

    /// Length of the longest proper prefix of `run` with an entry of the
    /// given fixity.
    pub fn longest_prefix(&self, run: &str, fixity: Fixity) -> Option<usize> {
        (1..run.len())
            .rev()
            .filter(|&idx| run.is_char_boundary(idx))
            .find(|&idx| self.lookup(&run[..idx], fixity).is_some())
    }

    /// Declare a user operator in the innermost scope. Every spelling that
    /// shares the symbol's canonical form gets the same entry.
    pub fn declare(
        &mut self,
        decl: &OperatorDecl,
        source: OperatorSource,
    ) -> Result<&OperatorEntry, Conflict> {
        let canonical = self.check(decl)?;
        let OperatorDecl {
            symbol,
            fixity,
            precedence,
            assoc,
        } = decl;
        let (symbol, fixity, precedence, assoc) = (symbol.as_str(), *fixity, *precedence, *assoc);

        let mut spellings = vec![symbol.to_string()];
        spellings.extend(
            synonyms(&canonical, fixity)
                .filter(|s| *s != symbol)
                .map(str::to_string),
        );

        let depth = self.layers.len();
        let layer = self
            .layers
            .last_mut()
            .ok_or(Conflict::NotDefinable(symbol.to_string()))?;
        debug!(symbol, %fixity, %precedence, depth, "declaring operator");
        for spelling in spellings {
            layer.insert(
                (spelling.clone(), fixity),
                OperatorEntry {
                    symbol: spelling,
                    canonical: canonical.clone(),
                    fixity,
                    precedence,
                    arity: fixity.arity(),
                    assoc,
                    source,
                },
            );
        }
        let key = (symbol.to_string(), fixity);
        Ok(&layer[&key])
    }

    /// Validate `decl` against the levels and the innermost scope, returning
    /// the canonical symbol it would be declared under.
    fn check(&self, decl: &OperatorDecl) -> Result<String, Conflict> {
        let OperatorDecl {
            symbol,
            fixity,
            precedence,
            ..
        } = decl;
        let (symbol, fixity, precedence) = (symbol.as_str(), *fixity, *precedence);

        if fixity == Fixity::Mixfix {
            return Err(Conflict::Mixfix);
        }
        if !precedence.in_scale() {
            return Err(Conflict::OutOfScale(precedence));
        }
        if fixity != Fixity::Infix && precedence.lo <= 3 {
            return Err(Conflict::ReservedLevel {
                level: precedence.lo,
                reserved: Fixity::Infix,
            });
        }
        if fixity != Fixity::Postfix && precedence.lo == MAX_LEVEL {
            return Err(Conflict::ReservedLevel {
                level: MAX_LEVEL,
                reserved: Fixity::Postfix,
            });
        }

        let canonical = self
            .lookup(symbol, fixity)
            .map(|e| e.canonical.clone())
            .unwrap_or_else(|| canonical_symbol(symbol, fixity));
        let layer = self
            .layers
            .last()
            .ok_or(Conflict::NotDefinable(symbol.to_string()))?;
        let existing = layer.get(&(symbol.to_string(), fixity)).or_else(|| {
            synonyms(&canonical, fixity).find_map(|s| layer.get(&(s.to_string(), fixity)))
        });
        if let Some(existing) = existing {
            if existing.precedence != precedence {
                return Err(Conflict::Precedence {
                    existing: existing.precedence,
                });
            }
        }
        Ok(canonical)
    }

    /// The declaration an in-source definition of `symbol` would make, with
    /// precedence and associativity taken from the entry already in force or
    /// from the catalog of definable symbols. Nothing is declared.
    pub fn definition_decl(&self, symbol: &str, fixity: Fixity) -> Result<OperatorDecl, Conflict> {
        let (precedence, assoc) = match self.lookup(symbol, fixity) {
            Some(entry) => (entry.precedence, entry.assoc),
            None => standard_entry(symbol, fixity)
                .ok_or_else(|| Conflict::NotDefinable(symbol.to_string()))?,
        };
        let decl = OperatorDecl {
            symbol: symbol.to_string(),
            fixity,
            precedence,
            assoc,
        };
        self.check(&decl)?;
        Ok(decl)
    }

    pub fn push_scope(&mut self) {
        self.layers.push(HashMap::new());
    }

    /// Close the innermost scope, discarding its declarations. The outermost
    /// user scope is never removed.
    pub fn pop_scope(&mut self) {
        if self.layers.len() > 1 {
            self.layers.pop();
        }
    }

    pub fn depth(&self) -> usize {
        self.layers.len()
    }
}
