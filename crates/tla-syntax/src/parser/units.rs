//! Module assembler.
//!
//! Units are parsed in source order. A unit that fails is recorded and the
//! parser skips to the next unit boundary: a unit keyword or a definition
//! header at the start of a line, a separator, or the end of the module.

use super::Parser;
use crate::ast::{
    Assumption, DefForm, Expr, ExprKind, Ident, Instance, Module, NameRef, OpDecl, OperatorDef,
    Param, Proof, Substitution, Theorem, TheoremBody, Unit,
};
use crate::builder::CONFIG_ORIGIN;
use crate::error::{ParseError, ParseResult};
use crate::optable::{scope_symbol, Conflict, OperatorDecl, OperatorSource};
use crate::scope::{BinderKind, DeclKind, FrameKind, InstanceBinding, SymbolTable};
use crate::stdlib::{ModuleInterface, ParameterKind};
use crate::token::{Keyword, Span, Token, TokenKind};
use indexmap::IndexMap;
use std::collections::HashSet;
use tracing::{debug, trace};

/// Everything one source text produced.
pub(crate) struct Assembled {
    pub module: Option<Module>,
    pub symbols: SymbolTable,
    pub diagnostics: Vec<ParseError>,
}

/// A formal parameter before it is bound: its name and `_` count.
type FormalParam = (Ident, usize);

/// The first module's interface with the exports of the rest merged in.
fn merged_interface(modules: &[ModuleInterface]) -> Option<ModuleInterface> {
    let (first, rest) = modules.split_first()?;
    let mut merged = first.clone();
    for inner in rest {
        merged.parameters.extend(inner.parameters.iter().cloned());
        merged.definitions.extend(inner.definitions.iter().cloned());
        merged.operators.extend(inner.operators.iter().cloned());
    }
    Some(merged)
}

impl Parser<'_> {
    /// Parse the first module in the source, ignoring prose around it.
    pub(crate) fn parse_source(mut self) -> Assembled {
        while !self.raw().is_eof()
            && !(self.raw().kind == TokenKind::Dashes
                && self.peek_raw(1).is_keyword(Keyword::Module))
        {
            self.advance();
        }

        self.builder.push_scope(FrameKind::Imports);
        self.builder.push_scope(FrameKind::Module);
        self.import_configured_operators();
        let module = match self.parse_module() {
            Ok(module) => Some(module),
            Err(err) => {
                self.report(err);
                None
            }
        };
        let (symbols, diagnostics) = self.builder.finish();
        Assembled {
            module,
            symbols,
            diagnostics,
        }
    }

    /// `---- MODULE Name ---- EXTENDS ... units ... ====`
    ///
    /// A module left open by the end of input or cut short by the error
    /// limit is still returned with the units read so far.
    fn parse_module(&mut self) -> ParseResult<Module> {
        let start = self.expect(TokenKind::Dashes)?;
        self.expect_keyword(Keyword::Module)?;
        let name = self.expect_ident()?;
        self.expect(TokenKind::Dashes)?;
        debug!(module = %name.name, "parsing module");

        let extends = if self.eat_keyword(Keyword::Extends).is_some() {
            self.parse_extends()?
        } else {
            Vec::new()
        };

        let mut units = Vec::new();
        while !self.halted {
            match self.raw().kind {
                TokenKind::ModuleEnd => break,
                TokenKind::Eof => {
                    let err = self.unexpected("`====`");
                    self.report(err);
                    break;
                }
                TokenKind::Dashes if self.peek_raw(1).is_keyword(Keyword::Module) => {
                    let unit_start = self.position;
                    match self.parse_nested_module() {
                        Ok(unit) => units.push(unit),
                        Err(err) => self.recover_from(err, unit_start),
                    }
                }
                TokenKind::Dashes => {
                    self.advance();
                }
                _ => {
                    let unit_start = self.position;
                    match self.parse_unit() {
                        Ok(unit) => {
                            trace!(module = %name.name, span = %unit.span(), "parsed unit");
                            units.push(unit);
                        }
                        Err(err) => self.recover_from(err, unit_start),
                    }
                }
            }
        }

        if self.raw().kind == TokenKind::ModuleEnd {
            self.advance();
        }
        let span = self.span_from(start);
        debug!(
            module = %name.name,
            units = units.len(),
            diagnostics = self.builder.diagnostic_count(),
            "parsed module"
        );
        Ok(Module {
            name,
            extends,
            units,
            span,
        })
    }

    fn parse_nested_module(&mut self) -> ParseResult<Unit> {
        self.builder.enter_module();
        self.ops.push_scope();
        let result = self.parse_module();
        self.ops.pop_scope();
        self.builder.exit_module();

        let module = result?;
        self.local_modules.insert(
            module.name.name.clone(),
            ModuleInterface::of_module(&module),
        );
        Ok(Unit::Module(Box::new(module)))
    }

    /// Record a unit error and move to the next unit boundary. A failed
    /// unit always gives up at least its first token.
    fn recover_from(&mut self, err: ParseError, unit_start: usize) {
        let span = err.span();
        self.report(err);
        if !self.config.recover {
            self.halted = true;
            return;
        }
        debug!(%span, "skipping to next unit");
        if self.position == unit_start {
            self.advance();
        }
        while !self.at_unit_boundary() {
            self.advance();
        }
    }

    fn at_unit_boundary(&self) -> bool {
        let token = self.raw();
        match token.kind {
            TokenKind::Eof | TokenKind::ModuleEnd | TokenKind::Dashes => true,
            TokenKind::Keyword(kw) => token.first_on_line && kw.starts_unit(),
            TokenKind::Ident | TokenKind::Symbol => {
                token.first_on_line && self.at_definition_header()
            }
            _ => false,
        }
    }

    /// True if the tokens under the cursor start an operator, function or
    /// instance definition.
    pub(super) fn at_definition_header(&self) -> bool {
        let is_def_eq = |t: &Token| t.kind == TokenKind::Symbol && t.text.starts_with("==");
        let first = self.peek_raw(0);
        let second = self.peek_raw(1);
        match first.kind {
            TokenKind::Symbol => second.kind == TokenKind::Ident && is_def_eq(self.peek_raw(2)),
            TokenKind::Ident => match second.kind {
                TokenKind::LParen | TokenKind::LBracket => self
                    .matching_close(self.position + 1)
                    .is_some_and(|close| {
                        self.tokens.get(close + 1).is_some_and(|t| is_def_eq(t))
                    }),
                TokenKind::Symbol if is_def_eq(second) => true,
                TokenKind::Symbol => {
                    is_def_eq(self.peek_raw(2))
                        || (self.peek_raw(2).kind == TokenKind::Ident
                            && is_def_eq(self.peek_raw(3)))
                }
                _ => false,
            },
            _ => false,
        }
    }

    /// `<1>` or `<2>3.` opening a step of a structured proof.
    pub(super) fn at_proof_step(&self) -> bool {
        self.raw().is_symbol("<")
            && matches!(self.peek_raw(1).kind, TokenKind::Int(_))
            && self.peek_raw(2).kind == TokenKind::Symbol
            && self.peek_raw(2).text.starts_with('>')
    }

    /// Index of the token closing the delimiter at `open`.
    fn matching_close(&self, open: usize) -> Option<usize> {
        let mut depth = 0usize;
        for (index, token) in self.tokens.iter().enumerate().skip(open) {
            match token.kind {
                TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => depth += 1,
                TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                    depth = depth.checked_sub(1)?;
                    if depth == 0 {
                        return Some(index);
                    }
                }
                TokenKind::Eof | TokenKind::ModuleEnd => return None,
                _ => {}
            }
        }
        None
    }

    // === Imports ===

    /// Operators from the configuration resolve like imported definitions.
    pub(super) fn import_configured_operators(&mut self) {
        for decl in &self.config.operators {
            let name = scope_symbol(&decl.symbol, decl.fixity);
            self.builder.import(
                CONFIG_ORIGIN,
                &name,
                DeclKind::Operator,
                decl.operand_count(),
                Span::dummy(),
            );
        }
    }

    fn parse_extends(&mut self) -> ParseResult<Vec<Ident>> {
        let names = self.parse_ident_list()?;
        for name in &names {
            match self.module_interface(&name.name) {
                Some(iface) => {
                    let modules = self.extended_interfaces(iface);
                    self.import_interface(&modules, true, name.span);
                }
                None => self.report(ParseError::UnknownModule {
                    name: name.name.clone(),
                    span: name.span,
                }),
            }
        }
        Ok(names)
    }

    /// `iface` followed by every module it extends, transitively.
    fn extended_interfaces(&self, iface: ModuleInterface) -> Vec<ModuleInterface> {
        let mut seen = HashSet::from([iface.name.clone()]);
        let mut pending = iface.extends.clone();
        let mut modules = vec![iface];
        while let Some(name) = pending.pop() {
            if !seen.insert(name.clone()) {
                continue;
            }
            if let Some(inner) = self.module_interface(&name) {
                pending.extend(inner.extends.iter().cloned());
                modules.push(inner);
            }
        }
        modules
    }

    /// Make the names of `modules` visible, each under its own module so a
    /// definition reached along two EXTENDS paths is imported once.
    /// Parameters come along only for EXTENDS; an instance substitutes them
    /// instead.
    fn import_interface(&mut self, modules: &[ModuleInterface], parameters: bool, site: Span) {
        for iface in modules {
            if parameters {
                for param in &iface.parameters {
                    let kind = match param.kind {
                        ParameterKind::Constant => DeclKind::Constant,
                        ParameterKind::Variable => DeclKind::Variable,
                    };
                    self.builder
                        .import(&iface.name, &param.name, kind, param.arity, site);
                }
            }
            for def in &iface.definitions {
                self.builder.import(
                    &iface.name,
                    &def.scope_name(),
                    DeclKind::Operator,
                    def.arity,
                    site,
                );
            }
            for decl in &iface.operators {
                let source = OperatorSource::User { span: site };
                if let Err(conflict) = self.ops.declare(decl, source) {
                    self.report(ParseError::OperatorConflict {
                        symbol: decl.symbol.clone(),
                        reason: conflict.to_string(),
                        span: site,
                    });
                }
            }
        }
    }

    // === Units ===

    fn parse_unit(&mut self) -> ParseResult<Unit> {
        let start = self.current_span();
        let local = self.eat_keyword(Keyword::Local).is_some();
        let kind = self.current().kind;
        match kind {
            TokenKind::Keyword(Keyword::Instance) => self.parse_instance(None, Vec::new(), local, start),
            TokenKind::Ident | TokenKind::Symbol => self.parse_definition(local),
            _ if local => Err(self.unexpected("definition or instance after LOCAL")),
            TokenKind::Keyword(Keyword::Constant | Keyword::Constants) => {
                self.parse_parameters(DeclKind::Constant)
            }
            TokenKind::Keyword(Keyword::Variable | Keyword::Variables) => {
                self.parse_parameters(DeclKind::Variable)
            }
            TokenKind::Keyword(Keyword::Assume | Keyword::Assumption | Keyword::Axiom) => {
                self.parse_assumption()
            }
            TokenKind::Keyword(
                Keyword::Theorem | Keyword::Lemma | Keyword::Proposition | Keyword::Corollary,
            ) => self.parse_theorem(),
            TokenKind::Keyword(Keyword::Recursive) => self.parse_recursive(),
            _ => Err(self.unexpected("declaration or definition")),
        }
    }

    /// `CONSTANTS N, F(_, _)` or `VARIABLES x, y`
    fn parse_parameters(&mut self, kind: DeclKind) -> ParseResult<Unit> {
        let start = self.advance().span;
        let mut decls = Vec::new();
        for (name, arity) in self.parse_op_decl_list()? {
            let decl = self.builder.declare(&name, kind, arity, false);
            decls.push(OpDecl { name, arity, decl });
        }
        let span = self.span_from(start);
        Ok(match kind {
            DeclKind::Variable => Unit::Variable { decls, span },
            _ => Unit::Constant { decls, span },
        })
    }

    /// `RECURSIVE F(_), G`
    pub(super) fn parse_recursive(&mut self) -> ParseResult<Unit> {
        let start = self.expect_keyword(Keyword::Recursive)?;
        let mut decls = Vec::new();
        for (name, arity) in self.parse_op_decl_list()? {
            let decl = self.builder.declare_recursive(&name, arity);
            decls.push(OpDecl { name, arity, decl });
        }
        Ok(Unit::Recursive {
            decls,
            span: self.span_from(start),
        })
    }

    fn parse_op_decl_list(&mut self) -> ParseResult<Vec<FormalParam>> {
        let mut list = Vec::new();
        loop {
            let name = self.expect_ident()?;
            let arity = self.parse_placeholders()?;
            list.push((name, arity));
            if self.eat(TokenKind::Comma).is_none() {
                return Ok(list);
            }
        }
    }

    /// The `(_, _)` of a higher-order formal; zero when absent.
    fn parse_placeholders(&mut self) -> ParseResult<usize> {
        if self.eat(TokenKind::LParen).is_none() {
            return Ok(0);
        }
        let mut arity = 0;
        loop {
            let placeholder = self.expect_ident()?;
            if placeholder.name != "_" {
                return Err(self.unexpected("`_`"));
            }
            arity += 1;
            if self.eat(TokenKind::Comma).is_none() {
                break;
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(arity)
    }

    /// `Name ==` before an assumption or theorem.
    fn parse_unit_label(&mut self) -> ParseResult<Option<Ident>> {
        if self.check(TokenKind::Ident) && self.peek_raw(1).is_symbol("==") {
            let name = self.expect_ident()?;
            self.expect_symbol("==")?;
            return Ok(Some(name));
        }
        Ok(None)
    }

    fn parse_assumption(&mut self) -> ParseResult<Unit> {
        let start = self.advance().span;
        let name = self.parse_unit_label()?;
        let expr = self.parse_expression()?;
        let decl = name
            .as_ref()
            .map(|n| self.builder.declare(n, DeclKind::Assumption, 0, false));
        Ok(Unit::Assumption {
            name,
            decl,
            expr,
            span: self.span_from(start),
        })
    }

    fn parse_theorem(&mut self) -> ParseResult<Unit> {
        let start = self.advance().span;
        let name = self.parse_unit_label()?;
        let body = if self.at_keyword(Keyword::Assume) {
            self.parse_assume_prove()?
        } else {
            TheoremBody::Expr(self.parse_expression()?)
        };
        let decl = name
            .as_ref()
            .map(|n| self.builder.declare(n, DeclKind::Theorem, 0, false));
        let proof = self.parse_proof()?;
        Ok(Unit::Theorem(Theorem {
            name,
            decl,
            body,
            proof,
            span: self.span_from(start),
        }))
    }

    /// `ASSUME NEW x \in S, P(x) PROVE Q(x)`. Names introduced by NEW are
    /// visible in later assumptions and in the conclusion.
    fn parse_assume_prove(&mut self) -> ParseResult<TheoremBody> {
        self.expect_keyword(Keyword::Assume)?;
        self.scoped(FrameKind::Assumptions, |p| {
            let mut assumptions = Vec::new();
            loop {
                if p.eat_keyword(Keyword::New).is_some() {
                    for level in [Keyword::Constant, Keyword::Variable] {
                        if p.eat_keyword(level).is_some() {
                            break;
                        }
                    }
                    let name = p.expect_ident()?;
                    let domain = if p.eat_symbol("\\in").is_some() {
                        Some(p.parse_expression()?)
                    } else {
                        None
                    };
                    let binder = p.builder.bind(&name, BinderKind::Assumed, 0);
                    assumptions.push(Assumption::New {
                        name,
                        binder,
                        domain,
                    });
                } else {
                    assumptions.push(Assumption::Expr(p.parse_expression()?));
                }
                if p.eat(TokenKind::Comma).is_none() {
                    break;
                }
            }
            p.expect_keyword(Keyword::Prove)?;
            let conclusion = p.parse_expression()?;
            Ok(TheoremBody::AssumeProve {
                assumptions,
                conclusion,
            })
        })
    }

    /// A terminal proof: `PROOF? OBVIOUS | OMITTED | BY facts [DEF names]`.
    fn parse_proof(&mut self) -> ParseResult<Option<Proof>> {
        let explicit = self.eat_keyword(Keyword::Proof).is_some();
        if self.eat_keyword(Keyword::Obvious).is_some() {
            return Ok(Some(Proof::Obvious));
        }
        if self.eat_keyword(Keyword::Omitted).is_some() {
            return Ok(Some(Proof::Omitted));
        }
        if self.eat_keyword(Keyword::By).is_some() {
            let facts = if self.at_keyword(Keyword::Def) || self.at_keyword(Keyword::Defs) {
                Vec::new()
            } else {
                self.parse_expr_list()?
            };
            let defs = if self.eat_keyword(Keyword::Def).is_some()
                || self.eat_keyword(Keyword::Defs).is_some()
            {
                self.parse_expr_list()?
            } else {
                Vec::new()
            };
            return Ok(Some(Proof::By { facts, defs }));
        }
        if self.at_proof_step() {
            return Err(self.invalid("structured proofs are not supported", self.current_span()));
        }
        if explicit {
            return Err(self.unexpected("OBVIOUS, OMITTED or BY"));
        }
        Ok(None)
    }

    // === Definitions ===

    /// An operator, function or named-instance definition.
    pub(super) fn parse_definition(&mut self, local: bool) -> ParseResult<Unit> {
        let start = self.current_span();
        if self.check(TokenKind::Symbol) {
            let op = self.advance();
            let operand = self.expect_ident()?;
            return self.parse_symbolic_definition(start, op, DefForm::Prefix, vec![operand], local);
        }

        let name = self.expect_ident()?;
        if self.check(TokenKind::LBracket) {
            return self.parse_function_definition(start, name, local);
        }
        if self.check(TokenKind::Symbol) && !self.at_sym("==") {
            let op = self.advance();
            if self.check(TokenKind::Ident) {
                let rhs = self.expect_ident()?;
                return self.parse_symbolic_definition(start, op, DefForm::Infix, vec![name, rhs], local);
            }
            return self.parse_symbolic_definition(start, op, DefForm::Postfix, vec![name], local);
        }

        let params = if self.eat(TokenKind::LParen).is_some() {
            self.parse_formal_params()?
        } else {
            Vec::new()
        };
        self.expect_symbol("==")?;
        if self.at_keyword(Keyword::Instance) {
            return self.parse_instance(Some(name), params, local, start);
        }
        self.finish_definition(start, name, DefForm::Named, None, params, local)
    }

    /// `(x, F(_, _), y)` after the opening parenthesis.
    fn parse_formal_params(&mut self) -> ParseResult<Vec<FormalParam>> {
        let mut params = Vec::new();
        loop {
            let name = self.expect_ident()?;
            let arity = self.parse_placeholders()?;
            params.push((name, arity));
            if self.eat(TokenKind::Comma).is_none() {
                break;
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(params)
    }

    /// `-. a == e`, `a ## b == e` or `a ^+ == e`. The symbol is checked
    /// before the body and enters the operator table once the definition is
    /// complete.
    fn parse_symbolic_definition(
        &mut self,
        start: Span,
        op: Token,
        form: DefForm,
        operands: Vec<Ident>,
        local: bool,
    ) -> ParseResult<Unit> {
        let Some(fixity) = form.fixity() else {
            return Err(self.invalid("not an operator form", op.span));
        };
        let symbol = match (form, op.text.as_str()) {
            (DefForm::Prefix, "-.") => "-",
            (_, text) => text,
        };
        let conflict = |reason: Conflict| ParseError::OperatorConflict {
            symbol: op.text.clone(),
            reason: reason.to_string(),
            span: op.span,
        };
        let decl = self.ops.definition_decl(symbol, fixity).map_err(conflict)?;
        self.expect_symbol("==")?;

        let params = operands.into_iter().map(|operand| (operand, 0)).collect();
        let name = Ident::new(op.text.clone(), op.span);
        let unit = self.finish_definition(start, name, form, Some(decl.clone()), params, local)?;
        self.ops
            .declare(&decl, OperatorSource::User { span: op.span })
            .map_err(conflict)?;
        Ok(unit)
    }

    /// Parse the body with the formals bound, then declare the definition
    /// under its name, or under the operator's scope symbol.
    fn finish_definition(
        &mut self,
        start: Span,
        name: Ident,
        form: DefForm,
        operator: Option<OperatorDecl>,
        params: Vec<FormalParam>,
        local: bool,
    ) -> ParseResult<Unit> {
        let key = match &operator {
            Some(op) => scope_symbol(&op.symbol, op.fixity),
            None => name.name.clone(),
        };
        self.builder.begin_definition(&key);
        let result = self.scoped(FrameKind::Params, |p| {
            let params: Vec<Param> = params
                .into_iter()
                .map(|(name, arity)| {
                    let binder = p.builder.bind(&name, BinderKind::OperatorParam, arity);
                    Param {
                        name,
                        arity,
                        binder,
                    }
                })
                .collect();
            Ok((params, p.parse_expression()?))
        });
        self.builder.end_definition();
        let (params, body) = result?;

        let decl = self.builder.declare(
            &Ident::new(key, name.span),
            DeclKind::Operator,
            params.len(),
            local,
        );
        Ok(Unit::Operator(OperatorDef {
            name,
            decl,
            form,
            operator,
            params,
            body,
            local,
            span: self.span_from(start),
        }))
    }

    /// `f[x \in S, y \in T] == e`, which may refer to `f` in `e`.
    fn parse_function_definition(&mut self, start: Span, name: Ident, local: bool) -> ParseResult<Unit> {
        let decl = self.builder.declare(&name, DeclKind::Function, 0, local);
        let open = self.expect(TokenKind::LBracket)?;
        let pending = self.delimited(|p| {
            let pending = p.parse_bindings(false)?;
            p.expect(TokenKind::RBracket)?;
            Ok(pending)
        })?;
        self.expect_symbol("==")?;
        let body = self.scoped(FrameKind::Binding, |p| {
            let bindings = p.bind_all(pending, BinderKind::FunctionArg);
            let body = p.parse_expression()?;
            let span = open.merge(body.span);
            Ok(Expr::new(
                ExprKind::FunctionDef {
                    bindings,
                    body: Box::new(body),
                },
                span,
            ))
        })?;
        Ok(Unit::Operator(OperatorDef {
            name,
            decl,
            form: DefForm::Function,
            operator: None,
            params: Vec::new(),
            body,
            local,
            span: self.span_from(start),
        }))
    }

    // === Instances ===

    /// `INSTANCE M WITH a <- e, ...`, named when `name` is given.
    ///
    /// Formals of `M` without an explicit substitution take the same-named
    /// symbol in scope at the instance site.
    fn parse_instance(
        &mut self,
        name: Option<Ident>,
        params: Vec<FormalParam>,
        local: bool,
        start: Span,
    ) -> ParseResult<Unit> {
        self.expect_keyword(Keyword::Instance)?;
        let module = self.expect_ident()?;
        let modules = match self.module_interface(&module.name) {
            Some(iface) => self.extended_interfaces(iface),
            None => {
                self.report(ParseError::UnknownModule {
                    name: module.name.clone(),
                    span: module.span,
                });
                Vec::new()
            }
        };
        let iface = merged_interface(&modules);

        let (params, substitutions) = self.scoped(FrameKind::Params, |p| {
            let params: Vec<Param> = params
                .into_iter()
                .map(|(name, arity)| {
                    let binder = p.builder.bind(&name, BinderKind::OperatorParam, arity);
                    Param {
                        name,
                        arity,
                        binder,
                    }
                })
                .collect();

            let mut substitutions: Vec<Substitution> = Vec::new();
            if p.eat_keyword(Keyword::With).is_some() {
                loop {
                    let formal = p.expect_ident()?;
                    p.expect_symbol("<-")?;
                    let actual = p.parse_expression()?;
                    if let Some(iface) = &iface {
                        if iface.parameter(&formal.name).is_none() {
                            p.report(ParseError::UnknownParameter {
                                module: module.name.clone(),
                                name: formal.name.clone(),
                                span: formal.span,
                            });
                        }
                    }
                    substitutions.push(Substitution {
                        formal,
                        actual,
                        implicit: false,
                    });
                    if p.eat(TokenKind::Comma).is_none() {
                        break;
                    }
                }
            }

            for param in iface.iter().flat_map(|i| &i.parameters) {
                if substitutions.iter().any(|s| s.formal.name == param.name) {
                    continue;
                }
                let resolution = p.builder.resolve(&param.name, module.span);
                let actual = Expr::new(
                    ExprKind::Name(NameRef {
                        name: param.name.clone(),
                        resolution,
                    }),
                    module.span,
                );
                substitutions.push(Substitution {
                    formal: Ident::new(param.name.clone(), module.span),
                    actual,
                    implicit: true,
                });
            }
            Ok((params, substitutions))
        })?;

        let decl = match &name {
            Some(name) => {
                let decl = self
                    .builder
                    .declare(name, DeclKind::Instance, params.len(), local);
                let map: IndexMap<String, Expr> = substitutions
                    .iter()
                    .map(|s| (s.formal.name.clone(), s.actual.clone()))
                    .collect();
                self.builder.add_instance(
                    &name.name,
                    InstanceBinding {
                        module: module.name.clone(),
                        interface: iface,
                        substitutions: map,
                    },
                );
                Some(decl)
            }
            None => {
                self.import_interface(&modules, false, module.span);
                None
            }
        };
        debug!(module = %module.name, named = name.is_some(), "instantiated module");

        Ok(Unit::Instance(Instance {
            name,
            decl,
            params,
            module,
            substitutions,
            local,
            span: self.span_from(start),
        }))
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::{DefForm, Module, Proof, TheoremBody, Unit};
    use crate::config::ParseConfig;
    use crate::error::ParseError;
    use crate::{parse_module, parse_module_with, ParseOutcome};
    use crate::stdlib::ModuleEnv;

    fn parse(src: &str) -> ParseOutcome {
        parse_module(src, "test.tla")
    }

    fn parse_ok(src: &str) -> Module {
        let outcome = parse(src);
        assert!(outcome.diagnostics.is_empty(), "{:?}", outcome.diagnostics);
        outcome.module.unwrap()
    }

    #[test]
    fn test_minimal_module() {
        let m = parse_ok("---- MODULE Test ----\n====");
        assert_eq!(m.name.name, "Test");
        assert!(m.units.is_empty());
    }

    #[test]
    fn test_prose_around_module_is_ignored() {
        let m = parse_ok("Some notes. 1 + \n---- MODULE Test ----\nA == 1\n====\ntrailing ) text");
        assert_eq!(m.units.len(), 1);
    }

    #[test]
    fn test_extends_makes_names_visible() {
        let m = parse_ok(
            "---- MODULE Test ----\nEXTENDS Naturals, Sequences\nA == Len(<<1>>) + 1\n====",
        );
        assert_eq!(m.extends.len(), 2);
    }

    #[test]
    fn test_unknown_extended_module() {
        let outcome = parse("---- MODULE Test ----\nEXTENDS Nope\n====");
        assert!(matches!(
            &outcome.diagnostics[0],
            ParseError::UnknownModule { name, .. } if name == "Nope"
        ));
        assert!(outcome.module.is_some());
    }

    #[test]
    fn test_constants_variables_and_higher_order() {
        let m = parse_ok(
            "---- MODULE Test ----\nCONSTANTS N, F(_, _)\nVARIABLE x\nInit == x = F(N, N)\n====",
        );
        let Unit::Constant { decls, .. } = &m.units[0] else {
            panic!("expected constants");
        };
        assert_eq!(decls[1].arity, 2);
    }

    #[test]
    fn test_definition_forms() {
        let m = parse_ok(
            "---- MODULE Test ----\n\
             a ## b == a + b\n\
             -. a == 0 - a\n\
             a ^+ == a\n\
             f[n \\in {1, 2}] == IF n = 1 THEN 1 ELSE f[n - 1]\n\
             Use == (1 ## 2) + f[2]\n\
             ====",
        );
        let forms: Vec<DefForm> = m
            .units
            .iter()
            .filter_map(|u| match u {
                Unit::Operator(def) => Some(def.form),
                _ => None,
            })
            .collect();
        assert_eq!(
            forms,
            vec![
                DefForm::Infix,
                DefForm::Prefix,
                DefForm::Postfix,
                DefForm::Function,
                DefForm::Named
            ]
        );
    }

    #[test]
    fn test_undefinable_symbol() {
        let outcome = parse("---- MODULE Test ----\na +-+ b == a\n====");
        assert!(matches!(outcome.diagnostics[0], ParseError::OperatorConflict { .. }));
    }

    #[test]
    fn test_use_before_declaration() {
        let outcome = parse("---- MODULE Test ----\nA == N + 1\nCONSTANT N\n====");
        assert_eq!(outcome.diagnostics.len(), 1);
        let ParseError::UseBeforeDeclaration { name, span, .. } = &outcome.diagnostics[0] else {
            panic!("expected use-before-declaration, got {:?}", outcome.diagnostics);
        };
        assert_eq!(name, "N");
        assert_eq!((span.line, span.column), (2, 6));
    }

    #[test]
    fn test_recursion_requires_declaration() {
        let outcome = parse("---- MODULE Test ----\nF(n) == F(n - 1)\n====");
        assert!(matches!(
            &outcome.diagnostics[0],
            ParseError::ImplicitRecursion { name, .. } if name == "F"
        ));

        parse_ok("---- MODULE Test ----\nRECURSIVE F(_)\nF(n) == IF n = 0 THEN 0 ELSE F(n - 1)\n====");

        let outcome = parse("---- MODULE Test ----\nRECURSIVE G(_)\n====");
        assert!(matches!(outcome.diagnostics[0], ParseError::UndefinedRecursive { .. }));
    }

    #[test]
    fn test_assumptions_and_theorems() {
        let m = parse_ok(
            "---- MODULE Test ----\n\
             EXTENDS Naturals\n\
             CONSTANT N\n\
             ASSUME Pos == N > 0\n\
             THEOREM T == ASSUME NEW x \\in Nat, x > 0 PROVE x + 1 > 1\n\
             PROOF OBVIOUS\n\
             LEMMA L == Pos BY Pos DEF Pos\n\
             ====",
        );
        let Unit::Theorem(t) = &m.units[2] else {
            panic!("expected theorem");
        };
        assert!(matches!(t.body, TheoremBody::AssumeProve { ref assumptions, .. } if assumptions.len() == 2));
        assert_eq!(t.proof, Some(Proof::Obvious));
        let Unit::Theorem(l) = &m.units[3] else {
            panic!("expected lemma");
        };
        assert!(matches!(l.proof, Some(Proof::By { ref facts, ref defs }) if facts.len() == 1 && defs.len() == 1));
    }

    #[test]
    fn test_structured_proof_is_rejected() {
        let outcome = parse("---- MODULE Test ----\nTHEOREM TRUE\n<1>1. TRUE\nA == 1\n====");
        assert!(matches!(outcome.diagnostics[0], ParseError::InvalidSyntax { .. }));
        let m = outcome.module.unwrap();
        assert!(m.definition("A").is_some());
    }

    #[test]
    fn test_recovery_continues_at_next_unit() {
        let outcome = parse(
            "---- MODULE Test ----\nA == 1 +\nB == IF TRUE THEN 1\nC == 3\n====",
        );
        assert_eq!(outcome.diagnostics.len(), 2, "{:?}", outcome.diagnostics);
        let m = outcome.module.unwrap();
        assert!(m.definition("C").is_some());
        assert!(m.definition("A").is_none());
    }

    #[test]
    fn test_recovery_disabled_stops_at_first_error() {
        let config = ParseConfig {
            recover: false,
            ..ParseConfig::default()
        };
        let outcome = parse_module_with(
            "---- MODULE Test ----\nA == 1 +\nB == )\nC == 3\n====",
            "test.tla",
            &config,
            &ModuleEnv::new(),
        );
        assert_eq!(outcome.diagnostics.len(), 1);
        assert!(outcome.module.unwrap().definition("C").is_none());
    }

    #[test]
    fn test_nested_module_and_instance() {
        let m = parse_ok(
            "---- MODULE Outer ----\n\
             CONSTANT N\n\
             ---- MODULE Inner ----\n\
             CONSTANT K\n\
             Double == K + K\n\
             ====\n\
             I == INSTANCE Inner WITH K <- N\n\
             K == 3\n\
             J == INSTANCE Inner\n\
             Use == I!Double + I!K\n\
             ====",
        );
        assert!(matches!(m.units[1], Unit::Module(_)));
        let Unit::Instance(i) = &m.units[2] else {
            panic!("expected instance");
        };
        assert_eq!(i.substitutions.len(), 1);
        assert!(!i.substitutions[0].implicit);
    }

    #[test]
    fn test_implicit_substitution_needs_symbol_in_scope() {
        let outcome = parse(
            "---- MODULE Outer ----\n\
             ---- MODULE Inner ----\n\
             CONSTANT K\n\
             ====\n\
             I == INSTANCE Inner\n\
             ====",
        );
        assert!(matches!(
            &outcome.diagnostics[0],
            ParseError::UnresolvedName { name, .. } if name == "K"
        ));
    }

    #[test]
    fn test_instance_errors() {
        let outcome = parse(
            "---- MODULE Outer ----\n\
             ---- MODULE Inner ----\n\
             CONSTANT K\n\
             A == K\n\
             ====\n\
             I == INSTANCE Inner WITH K <- 1, Q <- 2\n\
             Use == I!B\n\
             ====",
        );
        assert!(outcome
            .diagnostics
            .iter()
            .any(|d| matches!(d, ParseError::UnknownParameter { name, .. } if name == "Q")));
        assert!(outcome
            .diagnostics
            .iter()
            .any(|d| matches!(d, ParseError::UnresolvedQualified { name, .. } if name == "B")));
    }

    #[test]
    fn test_unnamed_instance_imports_definitions() {
        parse_ok(
            "---- MODULE Outer ----\n\
             ---- MODULE Inner ----\n\
             Helper(x) == x + 1\n\
             ====\n\
             INSTANCE Inner\n\
             Use == Helper(2)\n\
             ====",
        );
    }

    #[test]
    fn test_local_definitions() {
        let m = parse_ok("---- MODULE Test ----\nLOCAL Aux == 1\nA == Aux\n====");
        let Unit::Operator(aux) = &m.units[0] else {
            panic!("expected definition");
        };
        assert!(aux.local);
        let outcome = parse("---- MODULE Test ----\nLOCAL CONSTANT N\n====");
        assert!(matches!(outcome.diagnostics[0], ParseError::UnexpectedToken { .. }));
    }

    #[test]
    fn test_missing_module_end_keeps_partial_module() {
        let outcome = parse("---- MODULE Test ----\nA == 1\n");
        assert_eq!(outcome.diagnostics.len(), 1);
        assert!(outcome.module.unwrap().definition("A").is_some());
    }

    #[test]
    fn test_error_limit() {
        let config = ParseConfig {
            max_errors: 2,
            ..ParseConfig::default()
        };
        let outcome = parse_module_with(
            "---- MODULE Test ----\nA == )\nB == )\nC == )\nD == )\n====",
            "test.tla",
            &config,
            &ModuleEnv::new(),
        );
        assert_eq!(outcome.diagnostics.len(), 2);
    }
}
