//! Scopes, binders and module-level declarations.
//!
//! Lexically bound names (quantifier variables, operator parameters, set and
//! function binders) are *binders*. Names introduced by module units or LET
//! definitions are *declarations*. Both are numbered in a [`SymbolTable`]
//! that outlives the parse, so the AST refers to them by id.

use crate::ast::Expr;
use crate::stdlib::ModuleInterface;
use crate::token::Span;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::fmt;

/// Identifier of a lexical binder.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BinderId(pub u32);

/// Identifier of a module-level or LET-level declaration.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeclId(pub u32);

impl fmt::Debug for BinderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b{}", self.0)
    }
}

impl fmt::Debug for DeclId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "d{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinderKind {
    /// `\A`, `\E`, `\AA`, `\EE`.
    Quantified,
    Choose,
    /// Formal parameter of an operator, LAMBDA or parameterised instance.
    OperatorParam,
    /// Element variable of `{x \in S : P}` or `{e : x \in S}`.
    SetElement,
    /// Argument variable of `[x \in S |-> e]` or `f[x \in S] == e`.
    FunctionArg,
    /// `NEW x` in an `ASSUME ... PROVE` theorem body.
    Assumed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    Constant,
    Variable,
    Operator,
    /// `f[x \in S] == e`.
    Function,
    /// Named instance `I == INSTANCE M`.
    Instance,
    Theorem,
    Assumption,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binder {
    pub id: BinderId,
    pub name: String,
    pub kind: BinderKind,
    /// Number of arguments for higher-order parameters (`F(_, _)`), else 0.
    pub arity: usize,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub id: DeclId,
    pub name: String,
    pub kind: DeclKind,
    pub arity: usize,
    pub span: Span,
    pub local: bool,
    /// Declared with RECURSIVE.
    pub recursive: bool,
    /// False only for a RECURSIVE forward declaration still awaiting its body.
    pub defined: bool,
    /// Module the name was imported from, if any.
    pub origin: Option<String>,
}

/// What a name in scope refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entry {
    Binder(BinderId),
    Declaration(DeclId),
}

/// Every binder and declaration created during one parse.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolTable {
    binders: Vec<Binder>,
    decls: Vec<Declaration>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_binder(&mut self, name: &str, kind: BinderKind, arity: usize, span: Span) -> BinderId {
        let id = BinderId(self.binders.len() as u32);
        self.binders.push(Binder {
            id,
            name: name.to_string(),
            kind,
            arity,
            span,
        });
        id
    }

    pub fn add_decl(&mut self, decl: Declaration) -> DeclId {
        let id = DeclId(self.decls.len() as u32);
        self.decls.push(Declaration { id, ..decl });
        id
    }

    pub fn binder(&self, id: BinderId) -> Option<&Binder> {
        self.binders.get(id.0 as usize)
    }

    pub fn decl(&self, id: DeclId) -> Option<&Declaration> {
        self.decls.get(id.0 as usize)
    }

    pub(crate) fn decl_mut(&mut self, id: DeclId) -> Option<&mut Declaration> {
        self.decls.get_mut(id.0 as usize)
    }

    pub fn binders(&self) -> impl Iterator<Item = &Binder> {
        self.binders.iter()
    }

    pub fn declarations(&self) -> impl Iterator<Item = &Declaration> {
        self.decls.iter()
    }

    /// Name and span of whatever `entry` refers to.
    pub fn describe(&self, entry: Entry) -> Option<(&str, Span)> {
        match entry {
            Entry::Binder(id) => self.binder(id).map(|b| (b.name.as_str(), b.span)),
            Entry::Declaration(id) => self.decl(id).map(|d| (d.name.as_str(), d.span)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Names brought in by EXTENDS and unnamed INSTANCE.
    Imports,
    Module,
    Let,
    /// Operator, LAMBDA or instance parameters.
    Params,
    /// Quantifier, CHOOSE, set and function binders.
    Binding,
    /// `NEW` declarations of an `ASSUME ... PROVE` body.
    Assumptions,
}

#[derive(Debug, Clone)]
pub struct Frame {
    pub kind: FrameKind,
    names: IndexMap<String, Entry>,
}

impl Frame {
    fn new(kind: FrameKind) -> Self {
        Self {
            kind,
            names: IndexMap::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<Entry> {
        self.names.get(name).copied()
    }

    /// Names in the order they were bound.
    pub fn names(&self) -> impl Iterator<Item = (&str, Entry)> {
        self.names.iter().map(|(n, e)| (n.as_str(), *e))
    }
}

/// Stack of scope frames; lookups walk from innermost to outermost.
#[derive(Debug, Clone, Default)]
pub struct ScopeStack {
    frames: Vec<Frame>,
}

impl ScopeStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, kind: FrameKind) {
        self.frames.push(Frame::new(kind));
    }

    pub fn pop(&mut self) -> Option<Frame> {
        self.frames.pop()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn innermost(&self) -> Option<&Frame> {
        self.frames.last()
    }

    /// Bind `name` in the innermost frame. On a clash within that frame the
    /// existing entry is returned and nothing changes.
    pub fn bind(&mut self, name: &str, entry: Entry) -> Result<(), Entry> {
        let Some(frame) = self.frames.last_mut() else {
            return Ok(());
        };
        if let Some(existing) = frame.names.get(name) {
            return Err(*existing);
        }
        frame.names.insert(name.to_string(), entry);
        Ok(())
    }

    /// Bind in the nearest enclosing frame of the given kind.
    pub fn bind_in(&mut self, kind: FrameKind, name: &str, entry: Entry) -> Result<(), Entry> {
        let Some(frame) = self.frames.iter_mut().rev().find(|f| f.kind == kind) else {
            return Ok(());
        };
        if let Some(existing) = frame.names.get(name) {
            return Err(*existing);
        }
        frame.names.insert(name.to_string(), entry);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<Entry> {
        self.frames.iter().rev().find_map(|f| f.get(name))
    }
}

/// The result of resolving a qualified `I!name` reference.
#[derive(Debug, Clone, PartialEq)]
pub enum QualifiedTarget {
    /// A definition of the instantiated module.
    Definition { module: String, name: String },
    /// A formal parameter, replaced by the actual expression given at the
    /// instantiation site.
    Substituted(Box<Expr>),
    /// The instantiated module is unknown; the reference was not checked.
    Unchecked,
    Unresolved,
}

/// One named instantiation.
#[derive(Debug, Clone)]
pub struct InstanceBinding {
    pub module: String,
    /// `None` when the target module is unknown.
    pub interface: Option<ModuleInterface>,
    /// Formal parameter to actual expression, explicit and implicit.
    pub substitutions: IndexMap<String, Expr>,
}

/// Named instances visible in the current module, kept apart from the
/// lexical scope chain.
#[derive(Debug, Clone, Default)]
pub struct InstanceMap {
    instances: HashMap<String, InstanceBinding>,
}

impl InstanceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, binding: InstanceBinding) {
        self.instances.insert(name.to_string(), binding);
    }

    pub fn get(&self, name: &str) -> Option<&InstanceBinding> {
        self.instances.get(name)
    }

    /// Resolve `instance!name` through the instance's substitution map.
    /// Returns `None` when `instance` is not a known instance at all.
    pub fn resolve(&self, instance: &str, name: &str) -> Option<QualifiedTarget> {
        let binding = self.instances.get(instance)?;
        let Some(interface) = &binding.interface else {
            return Some(QualifiedTarget::Unchecked);
        };
        if let Some(actual) = binding.substitutions.get(name) {
            return Some(QualifiedTarget::Substituted(Box::new(actual.clone())));
        }
        if interface.defines(name) {
            return Some(QualifiedTarget::Definition {
                module: binding.module.clone(),
                name: name.to_string(),
            });
        }
        Some(QualifiedTarget::Unresolved)
    }
}
