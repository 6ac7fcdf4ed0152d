//! Abstract syntax tree.
//!
//! Every name occurrence carries its [`Resolution`], filled in while the
//! tree is built.

use crate::optable::{Fixity, OperatorDecl, Precedence};
use crate::scope::{BinderId, DeclId, QualifiedTarget};
use crate::token::Span;

/// A module.
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub name: Ident,
    /// Extended modules.
    pub extends: Vec<Ident>,
    /// Units in source order.
    pub units: Vec<Unit>,
    pub span: Span,
}

impl Module {
    /// Operator definitions at module top level.
    pub fn definitions(&self) -> impl Iterator<Item = &OperatorDef> {
        self.units.iter().filter_map(|u| match u {
            Unit::Operator(def) => Some(def),
            _ => None,
        })
    }

    pub fn definition(&self, name: &str) -> Option<&OperatorDef> {
        self.definitions().find(|d| d.name.name == name)
    }
}

/// An identifier with its source span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

impl Ident {
    pub fn new(name: impl Into<String>, span: Span) -> Self {
        Self {
            name: name.into(),
            span,
        }
    }
}

/// A top-level unit of a module.
#[derive(Debug, Clone, PartialEq)]
pub enum Unit {
    /// `CONSTANT N, F(_)`
    Constant { decls: Vec<OpDecl>, span: Span },
    /// `VARIABLE x, y`
    Variable { decls: Vec<OpDecl>, span: Span },
    /// `RECURSIVE F(_)`
    Recursive { decls: Vec<OpDecl>, span: Span },
    Operator(OperatorDef),
    Instance(Instance),
    /// `ASSUME`, `ASSUMPTION` or `AXIOM`.
    Assumption {
        name: Option<Ident>,
        decl: Option<DeclId>,
        expr: Expr,
        span: Span,
    },
    /// `THEOREM`, `LEMMA`, `PROPOSITION` or `COROLLARY`.
    Theorem(Theorem),
    /// A nested module.
    Module(Box<Module>),
}

impl Unit {
    pub fn span(&self) -> Span {
        match self {
            Unit::Constant { span, .. }
            | Unit::Variable { span, .. }
            | Unit::Recursive { span, .. }
            | Unit::Assumption { span, .. } => *span,
            Unit::Operator(def) => def.span,
            Unit::Instance(inst) => inst.span,
            Unit::Theorem(thm) => thm.span,
            Unit::Module(module) => module.span,
        }
    }
}

/// A declared name with its arity: `N`, `F(_, _)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpDecl {
    pub name: Ident,
    pub arity: usize,
    pub decl: DeclId,
}

/// How an operator definition is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefForm {
    /// `Op == e` or `Op(p, q) == e`
    Named,
    /// `-. a == e`
    Prefix,
    /// `a ## b == e`
    Infix,
    /// `a ^+ == e`
    Postfix,
    /// `f[x \in S] == e`; the body is a [`ExprKind::FunctionDef`].
    Function,
}

impl DefForm {
    /// Declared fixity of a symbolic definition.
    pub fn fixity(self) -> Option<Fixity> {
        match self {
            DefForm::Prefix => Some(Fixity::Prefix),
            DefForm::Infix => Some(Fixity::Infix),
            DefForm::Postfix => Some(Fixity::Postfix),
            DefForm::Named | DefForm::Function => None,
        }
    }
}

/// `Name(params) == body`
#[derive(Debug, Clone, PartialEq)]
pub struct OperatorDef {
    pub name: Ident,
    pub decl: DeclId,
    pub form: DefForm,
    /// The table entry a prefix, infix or postfix definition introduces.
    pub operator: Option<OperatorDecl>,
    pub params: Vec<Param>,
    pub body: Expr,
    pub local: bool,
    pub span: Span,
}

/// An operator, LAMBDA or instance parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: Ident,
    /// Number of `_` placeholders for a higher-order parameter.
    pub arity: usize,
    pub binder: BinderId,
}

/// `[I(p) ==] INSTANCE M [WITH x <- e, ...]`
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    /// Name of a named instance; `None` for an unnamed instance that imports
    /// the target's definitions.
    pub name: Option<Ident>,
    pub decl: Option<DeclId>,
    pub params: Vec<Param>,
    pub module: Ident,
    pub substitutions: Vec<Substitution>,
    pub local: bool,
    pub span: Span,
}

/// `formal <- actual`
#[derive(Debug, Clone, PartialEq)]
pub struct Substitution {
    pub formal: Ident,
    pub actual: Expr,
    /// True when the actual was taken from the same-named symbol in scope.
    pub implicit: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Theorem {
    pub name: Option<Ident>,
    pub decl: Option<DeclId>,
    pub body: TheoremBody,
    pub proof: Option<Proof>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TheoremBody {
    Expr(Expr),
    AssumeProve {
        assumptions: Vec<Assumption>,
        conclusion: Expr,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Assumption {
    Expr(Expr),
    /// `NEW x \in S`
    New {
        name: Ident,
        binder: BinderId,
        domain: Option<Expr>,
    },
}

/// A terminal proof.
#[derive(Debug, Clone, PartialEq)]
pub enum Proof {
    Obvious,
    Omitted,
    By { facts: Vec<Expr>, defs: Vec<Expr> },
}

/// An expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// Visit this expression and every sub-expression, parents first.
    pub fn walk<'a>(&'a self, f: &mut dyn FnMut(&'a Expr)) {
        f(self);
        self.for_each_child(|child| child.walk(&mut *f));
    }

    pub(crate) fn for_each_child<'a>(&'a self, mut f: impl FnMut(&'a Expr)) {
        let bindings = |bs: &'a [Binding], f: &mut dyn FnMut(&'a Expr)| {
            for b in bs {
                if let Some(d) = &b.domain {
                    f(d.as_ref());
                }
            }
        };
        match &self.kind {
            ExprKind::Bool(_)
            | ExprKind::Int(_)
            | ExprKind::Decimal(_)
            | ExprKind::String(_)
            | ExprKind::Name(_)
            | ExprKind::BuiltinSet(_)
            | ExprKind::ExceptAt => {}
            ExprKind::OpApp { args, .. } => args.iter().for_each(f),
            ExprKind::Qualified { path, args, .. } => {
                for seg in path {
                    seg.args.iter().for_each(&mut f);
                }
                args.iter().for_each(f);
            }
            ExprKind::Quantifier { bounds, body, .. } => {
                bindings(bounds, &mut f);
                f(body);
            }
            ExprKind::Choose { binding, body } => {
                bindings(std::slice::from_ref(binding), &mut f);
                f(body);
            }
            ExprKind::Let { defs, body } => {
                for d in defs {
                    f(&d.body);
                }
                f(body);
            }
            ExprKind::Case { arms, other } => {
                for arm in arms {
                    f(&arm.guard);
                    f(&arm.body);
                }
                if let Some(o) = other {
                    f(o);
                }
            }
            ExprKind::If { cond, then, els } => {
                f(cond);
                f(then);
                f(els);
            }
            ExprKind::SetEnum(items) | ExprKind::Tuple(items) => items.iter().for_each(f),
            ExprKind::SetFilter { binding, predicate } => {
                bindings(std::slice::from_ref(binding), &mut f);
                f(predicate);
            }
            ExprKind::SetMap { body, bindings: bs } => {
                f(body);
                bindings(bs, &mut f);
            }
            ExprKind::FunctionDef { bindings: bs, body } => {
                bindings(bs, &mut f);
                f(body);
            }
            ExprKind::FunctionApp { function, args } => {
                f(function);
                args.iter().for_each(f);
            }
            ExprKind::FunctionSet { domain, range } => {
                f(domain);
                f(range);
            }
            ExprKind::Except { base, updates } => {
                f(base);
                for u in updates {
                    for p in &u.path {
                        if let ExceptPath::Index(idx) = p {
                            idx.iter().for_each(&mut f);
                        }
                    }
                    f(&u.value);
                }
            }
            ExprKind::Record(fields) | ExprKind::RecordSet(fields) => {
                fields.iter().for_each(|(_, e)| f(e))
            }
            ExprKind::FieldAccess { record, .. } => f(record),
            ExprKind::BulletList(list) => list.items.iter().for_each(|i| f(&i.expr)),
            ExprKind::ActionBox { action, sub } | ExprKind::ActionAngle { action, sub } => {
                f(action);
                f(sub);
            }
            ExprKind::Fairness { vars, action, .. } => {
                f(vars);
                f(action);
            }
            ExprKind::Lambda { body, .. } => f(body),
            ExprKind::Label { body, .. } => f(body),
        }
    }
}

/// The kind of an expression.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    // === Literals ===
    Bool(bool),
    Int(i64),
    /// Decimal literal, kept as written.
    Decimal(String),
    String(String),
    /// `BOOLEAN` or `STRING`.
    BuiltinSet(BuiltinSet),

    // === References and applications ===
    /// Identifier reference.
    Name(NameRef),
    /// Operator application: built-in or user symbol, or named operator `P(x)`.
    OpApp { op: OpName, args: Vec<Expr> },
    /// `I!Op(args)` or `I(a)!Op`.
    Qualified {
        path: Vec<PathSegment>,
        name: Ident,
        args: Vec<Expr>,
        target: QualifiedTarget,
    },

    // === Binding forms ===
    Quantifier {
        kind: QuantKind,
        bounds: Vec<Binding>,
        body: Box<Expr>,
    },
    Choose {
        binding: Binding,
        body: Box<Expr>,
    },
    Let {
        defs: Vec<OperatorDef>,
        body: Box<Expr>,
    },
    Lambda {
        params: Vec<Param>,
        body: Box<Expr>,
    },

    // === Control ===
    Case {
        arms: Vec<CaseArm>,
        other: Option<Box<Expr>>,
    },
    If {
        cond: Box<Expr>,
        then: Box<Expr>,
        els: Box<Expr>,
    },

    // === Sets ===
    SetEnum(Vec<Expr>),
    /// `{x \in S : P}`
    SetFilter {
        binding: Binding,
        predicate: Box<Expr>,
    },
    /// `{e : x \in S, y \in T}`
    SetMap {
        body: Box<Expr>,
        bindings: Vec<Binding>,
    },

    // === Functions, tuples, records ===
    /// `[x \in S |-> e]`
    FunctionDef {
        bindings: Vec<Binding>,
        body: Box<Expr>,
    },
    /// `f[a, b]`
    FunctionApp {
        function: Box<Expr>,
        args: Vec<Expr>,
    },
    /// `[S -> T]`
    FunctionSet {
        domain: Box<Expr>,
        range: Box<Expr>,
    },
    /// `[f EXCEPT ![a] = e, !.x = e]`
    Except {
        base: Box<Expr>,
        updates: Vec<ExceptUpdate>,
    },
    /// `@` inside an EXCEPT value.
    ExceptAt,
    Tuple(Vec<Expr>),
    /// `[a |-> e]`
    Record(Vec<(Ident, Expr)>),
    /// `[a : S]`
    RecordSet(Vec<(Ident, Expr)>),
    /// `r.f`
    FieldAccess {
        record: Box<Expr>,
        field: Ident,
    },

    // === Layout ===
    BulletList(BulletList),

    // === Actions and temporal ===
    /// `[A]_v`
    ActionBox { action: Box<Expr>, sub: Box<Expr> },
    /// `<<A>>_v`
    ActionAngle { action: Box<Expr>, sub: Box<Expr> },
    /// `WF_v(A)` / `SF_v(A)`
    Fairness {
        kind: FairnessKind,
        vars: Box<Expr>,
        action: Box<Expr>,
    },

    /// `lbl :: e`
    Label { name: Ident, body: Box<Expr> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinSet {
    Boolean,
    String,
}

/// A reference to a name, with what it resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameRef {
    pub name: String,
    pub resolution: Resolution,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Binder(BinderId),
    Declaration(DeclId),
    /// A built-in operator symbol with no user definition in scope.
    Builtin,
    Unresolved,
}

impl Resolution {
    pub fn is_resolved(self) -> bool {
        self != Resolution::Unresolved
    }
}

/// The operator of an [`ExprKind::OpApp`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpName {
    /// Canonical symbol, or the operator name for named applications.
    pub symbol: String,
    /// `None` for a named application `P(x)`.
    pub fixity: Option<Fixity>,
    pub precedence: Option<Precedence>,
    pub resolution: Resolution,
    pub span: Span,
}

/// One hop of a qualified reference: `I` or `I(a, b)`.
#[derive(Debug, Clone, PartialEq)]
pub struct PathSegment {
    pub name: Ident,
    pub args: Vec<Expr>,
    pub resolution: Resolution,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantKind {
    Forall,
    Exists,
    /// `\AA`
    TemporalForall,
    /// `\EE`
    TemporalExists,
}

/// `x, y \in S`, `<<x, y>> \in S` or an unbounded `x`.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub vars: Vec<BoundVar>,
    /// Variables written as a tuple pattern.
    pub tuple: bool,
    pub domain: Option<Box<Expr>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundVar {
    pub name: Ident,
    pub binder: BinderId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaseArm {
    pub guard: Expr,
    pub body: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExceptUpdate {
    pub path: Vec<ExceptPath>,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExceptPath {
    /// `![a, b]`
    Index(Vec<Expr>),
    /// `!.f`
    Field(Ident),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Junction {
    Conjunction,
    Disjunction,
}

impl Junction {
    pub fn bullet(self) -> &'static str {
        match self {
            Junction::Conjunction => "/\\",
            Junction::Disjunction => "\\/",
        }
    }

    pub fn from_bullet(text: &str) -> Option<Junction> {
        match text {
            "/\\" => Some(Junction::Conjunction),
            "\\/" => Some(Junction::Disjunction),
            _ => None,
        }
    }
}

/// A bulleted conjunction or disjunction list.
#[derive(Debug, Clone, PartialEq)]
pub struct BulletList {
    pub kind: Junction,
    /// Column of the bullets.
    pub column: u32,
    pub items: Vec<BulletItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BulletItem {
    /// Line and column of this item's bullet.
    pub line: u32,
    pub column: u32,
    pub expr: Expr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FairnessKind {
    Weak,
    Strong,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(n: i64) -> Expr {
        Expr::new(ExprKind::Int(n), Span::dummy())
    }

    #[test]
    fn test_walk_visits_children_in_order() {
        let e = Expr::new(
            ExprKind::If {
                cond: Box::new(int(1)),
                then: Box::new(Expr::new(ExprKind::Tuple(vec![int(2), int(3)]), Span::dummy())),
                els: Box::new(int(4)),
            },
            Span::dummy(),
        );
        let mut seen = Vec::new();
        e.walk(&mut |x| {
            if let ExprKind::Int(n) = x.kind {
                seen.push(n);
            }
        });
        assert_eq!(seen, [1, 2, 3, 4]);
    }

    #[test]
    fn test_junction_bullets() {
        assert_eq!(Junction::from_bullet("/\\"), Some(Junction::Conjunction));
        assert_eq!(Junction::Disjunction.bullet(), "\\/");
        assert_eq!(Junction::from_bullet("~"), None);
    }
}
