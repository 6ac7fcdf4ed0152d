//! AST builder: scope stack, symbol table and name resolution.
//!
//! A reference that finds nothing in scope is not an error yet. It is kept
//! until each enclosing frame closes: if the closing frame turns out to
//! declare the name *later*, the reference violated declaration-before-use;
//! if no frame ever declares it, the name is unresolved.

use crate::ast::{Ident, Resolution};
use crate::error::ParseError;
use crate::scope::{
    BinderId, BinderKind, DeclId, DeclKind, Declaration, Entry, FrameKind, InstanceBinding,
    InstanceMap, QualifiedTarget, ScopeStack, SymbolTable,
};
use crate::token::Span;
use tracing::trace;

/// Origin recorded for operators declared through the parse configuration.
pub const CONFIG_ORIGIN: &str = "<config>";

#[derive(Debug, Clone)]
struct Deferred {
    name: String,
    span: Span,
    /// Number of frames open when the reference was made, lowered as frames
    /// close without declaring the name.
    depth: usize,
    /// The reference occurred inside the body of a definition of the same name.
    self_reference: bool,
}

/// Builds resolution information for the tree under construction.
#[derive(Debug, Default)]
pub struct AstBuilder {
    scopes: ScopeStack,
    symbols: SymbolTable,
    instances: InstanceMap,
    saved_instances: Vec<InstanceMap>,
    deferred: Vec<Deferred>,
    /// Names of the definitions whose bodies are being parsed.
    defining: Vec<String>,
    diagnostics: Vec<ParseError>,
}

impl AstBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn depth(&self) -> usize {
        self.scopes.depth()
    }

    pub fn report(&mut self, err: ParseError) {
        self.diagnostics.push(err);
    }

    pub fn diagnostic_count(&self) -> usize {
        self.diagnostics.len()
    }

    /// Hand over the symbol table and every recorded diagnostic.
    pub fn finish(mut self) -> (SymbolTable, Vec<ParseError>) {
        while self.scopes.depth() > 0 {
            self.pop_scope();
        }
        self.flush_unresolved();
        (self.symbols, self.diagnostics)
    }

    // === Scopes ===

    pub fn push_scope(&mut self, kind: FrameKind) {
        self.scopes.push(kind);
    }

    /// Close the innermost frame, settling references that were waiting on it.
    pub fn pop_scope(&mut self) {
        let index = self.scopes.depth().saturating_sub(1);
        let Some(frame) = self.scopes.pop() else {
            return;
        };

        let mut remaining = Vec::with_capacity(self.deferred.len());
        for mut d in std::mem::take(&mut self.deferred) {
            if d.depth > index {
                if let Some(entry) = frame.get(&d.name) {
                    let declared = self
                        .symbols
                        .describe(entry)
                        .map(|(_, span)| span)
                        .unwrap_or_default();
                    self.diagnostics.push(if d.self_reference {
                        ParseError::ImplicitRecursion {
                            name: d.name,
                            span: d.span,
                        }
                    } else {
                        ParseError::UseBeforeDeclaration {
                            name: d.name,
                            span: d.span,
                            declared,
                        }
                    });
                    continue;
                }
                d.depth = index;
            }
            remaining.push(d);
        }
        self.deferred = remaining;

        for (name, entry) in frame.names() {
            let Entry::Declaration(id) = entry else {
                continue;
            };
            if let Some(decl) = self.symbols.decl(id) {
                if decl.recursive && !decl.defined {
                    self.diagnostics.push(ParseError::UndefinedRecursive {
                        name: name.to_string(),
                        span: decl.span,
                    });
                }
            }
        }

        if self.scopes.depth() == 0 {
            self.flush_unresolved();
        }
    }

    fn flush_unresolved(&mut self) {
        for d in self.deferred.drain(..) {
            self.diagnostics.push(ParseError::UnresolvedName {
                name: d.name,
                span: d.span,
            });
        }
    }

    /// Enter a nested module: instances declared inside stay inside.
    pub fn enter_module(&mut self) {
        self.saved_instances.push(self.instances.clone());
        self.push_scope(FrameKind::Imports);
        self.push_scope(FrameKind::Module);
    }

    pub fn exit_module(&mut self) {
        self.pop_scope();
        self.pop_scope();
        if let Some(saved) = self.saved_instances.pop() {
            self.instances = saved;
        }
    }

    pub fn begin_definition(&mut self, name: &str) {
        self.defining.push(name.to_string());
    }

    pub fn end_definition(&mut self) {
        self.defining.pop();
    }

    // === Binding ===

    /// Bind a lexical name in the innermost frame.
    pub fn bind(&mut self, name: &Ident, kind: BinderKind, arity: usize) -> BinderId {
        let id = self.symbols.add_binder(&name.name, kind, arity, name.span);
        if let Err(existing) = self.scopes.bind(&name.name, Entry::Binder(id)) {
            self.redefinition(name, existing);
        }
        id
    }

    /// Declare a module-level or LET-level name in the innermost frame.
    ///
    /// Defining a name previously declared RECURSIVE in the same frame
    /// completes that declaration instead of clashing with it.
    pub fn declare(&mut self, name: &Ident, kind: DeclKind, arity: usize, local: bool) -> DeclId {
        if let Some(Entry::Declaration(existing)) =
            self.scopes.innermost().and_then(|f| f.get(&name.name))
        {
            if let Some(decl) = self.symbols.decl_mut(existing) {
                if decl.recursive && !decl.defined {
                    decl.defined = true;
                    decl.kind = kind;
                    return existing;
                }
            }
        }

        let id = self.symbols.add_decl(Declaration {
            id: DeclId(0),
            name: name.name.clone(),
            kind,
            arity,
            span: name.span,
            local,
            recursive: false,
            defined: true,
            origin: None,
        });
        if let Err(existing) = self.scopes.bind(&name.name, Entry::Declaration(id)) {
            self.redefinition(name, existing);
        }
        id
    }

    /// Declare a RECURSIVE forward reference.
    pub fn declare_recursive(&mut self, name: &Ident, arity: usize) -> DeclId {
        let id = self.symbols.add_decl(Declaration {
            id: DeclId(0),
            name: name.name.clone(),
            kind: DeclKind::Operator,
            arity,
            span: name.span,
            local: false,
            recursive: true,
            defined: false,
            origin: None,
        });
        if let Err(existing) = self.scopes.bind(&name.name, Entry::Declaration(id)) {
            self.redefinition(name, existing);
        }
        id
    }

    /// Make a name exported by another module visible in the imports frame.
    ///
    /// Importing a name again from the same module, or over an operator
    /// given in the configuration, keeps the first entry. Any other name
    /// already in scope is a redefinition reported at `site`.
    pub fn import(
        &mut self,
        module: &str,
        name: &str,
        kind: DeclKind,
        arity: usize,
        site: Span,
    ) -> DeclId {
        let existing = self.scopes.lookup(name);
        if let Some(id) = existing.and_then(|entry| self.same_import(entry, module)) {
            return id;
        }
        let id = self.symbols.add_decl(Declaration {
            id: DeclId(0),
            name: name.to_string(),
            kind,
            arity,
            span: site,
            local: false,
            recursive: false,
            defined: true,
            origin: Some(module.to_string()),
        });
        let clash = match existing {
            Some(entry) => Err(entry),
            None => self
                .scopes
                .bind_in(FrameKind::Imports, name, Entry::Declaration(id)),
        };
        if let Err(entry) = clash {
            self.redefinition(&Ident::new(name, site), entry);
        }
        id
    }

    fn same_import(&self, existing: Entry, module: &str) -> Option<DeclId> {
        let Entry::Declaration(id) = existing else {
            return None;
        };
        let origin = self.symbols.decl(id)?.origin.as_deref()?;
        (origin == module || origin == CONFIG_ORIGIN).then_some(id)
    }

    fn redefinition(&mut self, name: &Ident, existing: Entry) {
        let previous = self
            .symbols
            .describe(existing)
            .map(|(_, span)| span)
            .unwrap_or_default();
        self.diagnostics.push(ParseError::Redefinition {
            name: name.name.clone(),
            span: name.span,
            previous,
        });
    }

    // === Resolution ===

    pub fn lookup(&self, name: &str) -> Option<Entry> {
        self.scopes.lookup(name)
    }

    /// Resolve an identifier reference. A miss is deferred, not reported.
    pub fn resolve(&mut self, name: &str, span: Span) -> Resolution {
        match self.scopes.lookup(name) {
            Some(Entry::Binder(id)) => Resolution::Binder(id),
            Some(Entry::Declaration(id)) => Resolution::Declaration(id),
            None => {
                trace!(name, %span, "deferring unresolved reference");
                self.deferred.push(Deferred {
                    name: name.to_string(),
                    span,
                    depth: self.scopes.depth(),
                    self_reference: self.defining.iter().any(|d| d == name),
                });
                Resolution::Unresolved
            }
        }
    }

    /// Resolve an operator symbol: a user definition in scope if there is
    /// one, otherwise the built-in meaning.
    pub fn resolve_operator(&self, symbol: &str) -> Resolution {
        match self.scopes.lookup(symbol) {
            Some(Entry::Binder(id)) => Resolution::Binder(id),
            Some(Entry::Declaration(id)) => Resolution::Declaration(id),
            None => Resolution::Builtin,
        }
    }

    // === Instances ===

    pub fn add_instance(&mut self, name: &str, binding: InstanceBinding) {
        self.instances.insert(name, binding);
    }

    pub fn instance(&self, name: &str) -> Option<&InstanceBinding> {
        self.instances.get(name)
    }

    /// Resolve `instance!name` through the substitution map of a named
    /// instance. Returns `None` if `instance` names no instance.
    pub fn resolve_qualified(
        &mut self,
        instance: &str,
        name: &str,
        span: Span,
    ) -> Option<QualifiedTarget> {
        let target = self.instances.resolve(instance, name)?;
        if target == QualifiedTarget::Unresolved {
            let module = self
                .instances
                .get(instance)
                .map(|b| b.module.clone())
                .unwrap_or_default();
            self.diagnostics.push(ParseError::UnresolvedQualified {
                instance: instance.to_string(),
                module,
                name: name.to_string(),
                span,
            });
        }
        Some(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::QualifiedTarget;
    use crate::stdlib::ModuleInterface;
    use indexmap::IndexMap;

    fn ident(name: &str, offset: usize) -> Ident {
        Ident::new(name, Span::new(offset, offset + name.len(), 1, offset as u32 + 1))
    }

    fn module_builder() -> AstBuilder {
        let mut b = AstBuilder::new();
        b.push_scope(FrameKind::Imports);
        b.push_scope(FrameKind::Module);
        b
    }

    #[test]
    fn test_binder_not_visible_after_pop() {
        let mut b = module_builder();
        b.push_scope(FrameKind::Binding);
        let x = b.bind(&ident("x", 0), BinderKind::Quantified, 0);
        assert_eq!(b.resolve("x", Span::dummy()), Resolution::Binder(x));
        b.pop_scope();
        assert_eq!(b.resolve("x", Span::dummy()), Resolution::Unresolved);
        let (_, diags) = b.finish();
        assert_eq!(diags.len(), 1);
        assert!(matches!(&diags[0], ParseError::UnresolvedName { name, .. } if name == "x"));
    }

    #[test]
    fn test_forward_reference_is_use_before_declaration() {
        let mut b = module_builder();
        let use_site = Span::new(10, 11, 2, 5);
        assert_eq!(b.resolve("N", use_site), Resolution::Unresolved);
        b.declare(&ident("N", 30), DeclKind::Constant, 0, false);
        let (_, diags) = b.finish();
        assert_eq!(diags.len(), 1);
        match &diags[0] {
            ParseError::UseBeforeDeclaration { name, span, .. } => {
                assert_eq!(name, "N");
                assert_eq!(*span, use_site);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_self_reference_without_recursive() {
        let mut b = module_builder();
        b.begin_definition("F");
        b.resolve("F", Span::dummy());
        b.end_definition();
        b.declare(&ident("F", 0), DeclKind::Operator, 0, false);
        let (_, diags) = b.finish();
        assert!(matches!(&diags[..], [ParseError::ImplicitRecursion { .. }]));
    }

    #[test]
    fn test_recursive_declaration_completed_by_definition() {
        let mut b = module_builder();
        let fwd = b.declare_recursive(&ident("F", 0), 1);
        assert_eq!(b.resolve("F", Span::dummy()), Resolution::Declaration(fwd));
        let def = b.declare(&ident("F", 20), DeclKind::Operator, 1, false);
        assert_eq!(fwd, def);
        let (_, diags) = b.finish();
        assert!(diags.is_empty());
    }

    #[test]
    fn test_undefined_recursive_reported() {
        let mut b = module_builder();
        b.declare_recursive(&ident("G", 0), 0);
        let (_, diags) = b.finish();
        assert!(matches!(&diags[..], [ParseError::UndefinedRecursive { name, .. }] if name == "G"));
    }

    #[test]
    fn test_redefinition_in_same_frame() {
        let mut b = module_builder();
        b.declare(&ident("A", 0), DeclKind::Operator, 0, false);
        b.declare(&ident("A", 10), DeclKind::Operator, 0, false);
        let (_, diags) = b.finish();
        assert!(matches!(&diags[..], [ParseError::Redefinition { name, .. }] if name == "A"));
    }

    #[test]
    fn test_module_definition_may_shadow_import() {
        let mut b = module_builder();
        b.import("Sequences", "Len", DeclKind::Operator, 1, Span::dummy());
        let own = b.declare(&ident("Len", 0), DeclKind::Operator, 1, false);
        assert_eq!(b.resolve("Len", Span::dummy()), Resolution::Declaration(own));
        let (_, diags) = b.finish();
        assert!(diags.is_empty());
    }

    #[test]
    fn test_repeated_import_from_same_module_is_silent() {
        let mut b = module_builder();
        let first = b.import("Naturals", "Nat", DeclKind::Operator, 0, Span::dummy());
        let again = b.import("Naturals", "Nat", DeclKind::Operator, 0, Span::dummy());
        assert_eq!(first, again);
        let (_, diags) = b.finish();
        assert!(diags.is_empty());
    }

    #[test]
    fn test_import_clash_is_redefinition() {
        let mut b = module_builder();
        let first = b.import("Left", "Op", DeclKind::Operator, 0, Span::dummy());
        b.import("Right", "Op", DeclKind::Operator, 0, Span::new(40, 42, 3, 9));
        assert_eq!(b.resolve("Op", Span::dummy()), Resolution::Declaration(first));
        let own = b.declare(&ident("Mine", 0), DeclKind::Operator, 0, false);
        b.import("Right", "Mine", DeclKind::Operator, 0, Span::new(50, 52, 4, 1));
        assert_eq!(b.resolve("Mine", Span::dummy()), Resolution::Declaration(own));
        let (_, diags) = b.finish();
        assert_eq!(diags.len(), 2);
        assert!(diags
            .iter()
            .all(|d| matches!(d, ParseError::Redefinition { .. })));
        assert!(matches!(&diags[0], ParseError::Redefinition { name, span, .. }
            if name == "Op" && span.line == 3));
    }

    #[test]
    fn test_qualified_resolution_through_substitution() {
        let mut b = module_builder();
        let iface = ModuleInterface::new("Counter").with_definition("Next", 0);
        let mut substitutions = IndexMap::new();
        let actual = crate::ast::Expr::new(crate::ast::ExprKind::Int(3), Span::dummy());
        substitutions.insert("N".to_string(), actual.clone());
        b.add_instance(
            "C",
            InstanceBinding {
                module: "Counter".into(),
                interface: Some(iface),
                substitutions,
            },
        );
        assert_eq!(
            b.resolve_qualified("C", "N", Span::dummy()),
            Some(QualifiedTarget::Substituted(Box::new(actual)))
        );
        assert!(matches!(
            b.resolve_qualified("C", "Next", Span::dummy()),
            Some(QualifiedTarget::Definition { .. })
        ));
        assert_eq!(
            b.resolve_qualified("C", "Missing", Span::dummy()),
            Some(QualifiedTarget::Unresolved)
        );
        let (_, diags) = b.finish();
        assert!(matches!(&diags[..], [ParseError::UnresolvedQualified { .. }]));
    }
}
