//! Keyworded, bracketed and binding forms.

use super::Parser;
use crate::ast::{
    Binding, BoundVar, CaseArm, ExceptPath, ExceptUpdate, Expr, ExprKind, FairnessKind, Ident,
    NameRef, Param, QuantKind, Unit,
};
use crate::error::ParseResult;
use crate::scope::{BinderKind, FrameKind};
use crate::token::{Keyword, Span, TokenKind};

/// Bound names with their domain, before the names enter scope.
#[derive(Debug)]
pub(super) struct PendingBinding {
    names: Vec<Ident>,
    tuple: bool,
    domain: Option<Expr>,
}

/// Shape of a `{ ... }` form, decided before parsing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SetForm {
    Enumeration,
    /// `{x \in S : P}`
    Filter,
    /// `{e : x \in S}`; holds the token index of the `:`.
    Map(usize),
}

/// Shape of a `[ ... ]` form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BracketForm {
    Record,
    RecordSet,
    FunctionDef,
    FunctionSet,
    Except,
}

const BINDER_SYMBOLS: &[&str] = &["\\A", "\\forall", "\\E", "\\exists", "\\AA", "\\EE"];

impl Parser<'_> {
    pub(super) fn parse_mixfix(&mut self, canonical: &str) -> ParseResult<Expr> {
        match canonical {
            "IF" => self.parse_if(),
            "CASE" => self.parse_case(),
            "LET" => self.parse_let(),
            "CHOOSE" => self.parse_choose(),
            "LAMBDA" => self.parse_lambda(),
            "WF_" => self.parse_fairness(FairnessKind::Weak),
            "SF_" => self.parse_fairness(FairnessKind::Strong),
            "\\A" => self.parse_quantifier(QuantKind::Forall),
            "\\E" => self.parse_quantifier(QuantKind::Exists),
            "\\AA" => self.parse_quantifier(QuantKind::TemporalForall),
            "\\EE" => self.parse_quantifier(QuantKind::TemporalExists),
            _ => Err(self.unexpected("expression")),
        }
    }

    // === Binders ===

    /// `x, y \in S, <<a, b>> \in T` or, when `unbounded` is allowed, `x, y`.
    /// Domains are parsed before any of the names enter scope.
    pub(super) fn parse_bindings(&mut self, unbounded: bool) -> ParseResult<Vec<PendingBinding>> {
        let mut groups = Vec::new();
        loop {
            let (names, tuple) = if self.eat_symbol("<<").is_some() {
                let names = self.parse_ident_list()?;
                self.expect_symbol(">>")?;
                (names, true)
            } else {
                (self.parse_ident_list()?, false)
            };
            let domain = if tuple || !unbounded || self.at_sym("\\in") {
                self.expect_symbol("\\in")?;
                Some(self.parse_expression()?)
            } else {
                None
            };
            groups.push(PendingBinding {
                names,
                tuple,
                domain,
            });
            if self.eat(TokenKind::Comma).is_none() {
                return Ok(groups);
            }
        }
    }

    pub(super) fn parse_ident_list(&mut self) -> ParseResult<Vec<Ident>> {
        let mut names = vec![self.expect_ident()?];
        while self.check(TokenKind::Comma) && self.peek_raw(1).kind == TokenKind::Ident {
            self.advance();
            names.push(self.expect_ident()?);
        }
        Ok(names)
    }

    /// Bring pending names into the innermost frame.
    pub(super) fn bind_all(&mut self, pending: Vec<PendingBinding>, kind: BinderKind) -> Vec<Binding> {
        pending
            .into_iter()
            .map(|group| Binding {
                vars: group
                    .names
                    .into_iter()
                    .map(|name| {
                        let binder = self.builder.bind(&name, kind, 0);
                        BoundVar { name, binder }
                    })
                    .collect(),
                tuple: group.tuple,
                domain: group.domain.map(Box::new),
            })
            .collect()
    }

    fn parse_quantifier(&mut self, kind: QuantKind) -> ParseResult<Expr> {
        let start = self.advance().span;
        let pending = match kind {
            QuantKind::TemporalForall | QuantKind::TemporalExists => vec![PendingBinding {
                names: self.parse_ident_list()?,
                tuple: false,
                domain: None,
            }],
            QuantKind::Forall | QuantKind::Exists => self.parse_bindings(true)?,
        };
        self.expect_symbol(":")?;
        let (bounds, body) = self.scoped(FrameKind::Binding, |p| {
            let bounds = p.bind_all(pending, BinderKind::Quantified);
            Ok((bounds, p.parse_expression()?))
        })?;
        let span = start.merge(body.span);
        Ok(Expr::new(
            ExprKind::Quantifier {
                kind,
                bounds,
                body: Box::new(body),
            },
            span,
        ))
    }

    fn parse_choose(&mut self) -> ParseResult<Expr> {
        let start = self.advance().span;
        let pending = self.parse_bindings(true)?;
        if pending.len() != 1 || (!pending[0].tuple && pending[0].names.len() != 1) {
            return Err(self.invalid("CHOOSE binds exactly one name or tuple", start));
        }
        self.expect_symbol(":")?;
        let (binding, body) = self.scoped(FrameKind::Binding, |p| {
            let binding = p.bind_all(pending, BinderKind::Choose).remove(0);
            Ok((binding, p.parse_expression()?))
        })?;
        let span = start.merge(body.span);
        Ok(Expr::new(
            ExprKind::Choose {
                binding,
                body: Box::new(body),
            },
            span,
        ))
    }

    fn parse_lambda(&mut self) -> ParseResult<Expr> {
        let start = self.advance().span;
        let names = self.parse_ident_list()?;
        self.expect_symbol(":")?;
        let (params, body) = self.scoped(FrameKind::Params, |p| {
            let params: Vec<Param> = names
                .into_iter()
                .map(|name| {
                    let binder = p.builder.bind(&name, BinderKind::OperatorParam, 0);
                    Param {
                        name,
                        arity: 0,
                        binder,
                    }
                })
                .collect();
            Ok((params, p.parse_expression()?))
        })?;
        let span = start.merge(body.span);
        Ok(Expr::new(
            ExprKind::Lambda {
                params,
                body: Box::new(body),
            },
            span,
        ))
    }

    // === Control forms ===

    fn parse_if(&mut self) -> ParseResult<Expr> {
        let start = self.advance().span;
        let cond = self.parse_expression()?;
        self.expect_keyword(Keyword::Then)?;
        let then = self.parse_expression()?;
        self.expect_keyword(Keyword::Else)?;
        let els = self.parse_expression()?;
        let span = start.merge(els.span);
        Ok(Expr::new(
            ExprKind::If {
                cond: Box::new(cond),
                then: Box::new(then),
                els: Box::new(els),
            },
            span,
        ))
    }

    fn parse_case(&mut self) -> ParseResult<Expr> {
        let start = self.advance().span;
        let mut arms = Vec::new();
        let mut other = None;
        loop {
            if self.eat_keyword(Keyword::Other).is_some() {
                self.expect_symbol("->")?;
                other = Some(Box::new(self.parse_expression()?));
                break;
            }
            let guard = self.parse_expression()?;
            self.expect_symbol("->")?;
            let body = self.parse_expression()?;
            arms.push(CaseArm { guard, body });
            if self.eat_symbol("[]").is_none() {
                break;
            }
        }
        if arms.is_empty() {
            return Err(self.invalid("CASE needs at least one arm", start));
        }
        let span = self.span_from(start);
        Ok(Expr::new(ExprKind::Case { arms, other }, span))
    }

    fn parse_let(&mut self) -> ParseResult<Expr> {
        let start = self.advance().span;
        self.ops.push_scope();
        let result = self.scoped(FrameKind::Let, |p| {
            let mut defs = Vec::new();
            while !p.at_keyword(Keyword::In) {
                if p.at_end() {
                    return Err(p.unexpected("`IN`"));
                }
                if p.at_keyword(Keyword::Recursive) {
                    p.parse_recursive()?;
                    continue;
                }
                match p.parse_definition(false)? {
                    Unit::Operator(def) => defs.push(def),
                    other => {
                        return Err(p.invalid(
                            "only operator and function definitions may appear in LET",
                            other.span(),
                        ))
                    }
                }
            }
            p.expect_keyword(Keyword::In)?;
            Ok((defs, p.parse_expression()?))
        });
        self.ops.pop_scope();
        let (defs, body) = result?;
        let span = start.merge(body.span);
        Ok(Expr::new(
            ExprKind::Let {
                defs,
                body: Box::new(body),
            },
            span,
        ))
    }

    fn parse_fairness(&mut self, kind: FairnessKind) -> ParseResult<Expr> {
        let start = self.advance().span;
        let vars = self.parse_subscript()?;
        self.expect(TokenKind::LParen)?;
        let action = self.delimited(|p| {
            let action = p.parse_expression()?;
            p.expect(TokenKind::RParen)?;
            Ok(action)
        })?;
        let span = self.span_from(start);
        Ok(Expr::new(
            ExprKind::Fairness {
                kind,
                vars: Box::new(vars),
                action: Box::new(action),
            },
            span,
        ))
    }

    /// The `v` of `[A]_v`, `<<A>>_v` and `WF_v(A)`: a name, tuple or
    /// parenthesised expression. A name here is never applied.
    fn parse_subscript(&mut self) -> ParseResult<Expr> {
        if self.check(TokenKind::Ident) {
            let ident = self.expect_ident()?;
            let resolution = self.builder.resolve(&ident.name, ident.span);
            return Ok(Expr::new(
                ExprKind::Name(NameRef {
                    name: ident.name,
                    resolution,
                }),
                ident.span,
            ));
        }
        if self.at_sym("<<") {
            return self.parse_tuple();
        }
        if self.eat(TokenKind::LParen).is_some() {
            return self.delimited(|p| {
                let inner = p.parse_expression()?;
                p.expect(TokenKind::RParen)?;
                Ok(inner)
            });
        }
        Err(self.unexpected("subscript"))
    }

    // === Tuples and sets ===

    /// `<<a, b>>`, or `<<A>>_v` when a subscript follows.
    pub(super) fn parse_tuple(&mut self) -> ParseResult<Expr> {
        let start = self.expect_symbol("<<")?;
        let items = self.delimited(|p| {
            let items = if p.at_sym(">>") {
                Vec::new()
            } else {
                p.parse_expr_list()?
            };
            p.expect_symbol(">>")?;
            Ok(items)
        })?;

        if self.eat(TokenKind::Subscript).is_some() {
            let span = self.span_from(start);
            let [action]: [Expr; 1] = items
                .try_into()
                .map_err(|_| self.invalid("`<<A>>_v` takes exactly one action", span))?;
            let sub = self.parse_subscript()?;
            let span = self.span_from(start);
            return Ok(Expr::new(
                ExprKind::ActionAngle {
                    action: Box::new(action),
                    sub: Box::new(sub),
                },
                span,
            ));
        }
        let span = self.span_from(start);
        Ok(Expr::new(ExprKind::Tuple(items), span))
    }

    pub(super) fn parse_set(&mut self) -> ParseResult<Expr> {
        let start = self.expect(TokenKind::LBrace)?;
        let kind = self.delimited(|p| {
            if p.eat(TokenKind::RBrace).is_some() {
                return Ok(ExprKind::SetEnum(Vec::new()));
            }
            let kind = match p.scan_set_form() {
                SetForm::Enumeration => ExprKind::SetEnum(p.parse_expr_list()?),
                SetForm::Filter => p.parse_set_filter()?,
                SetForm::Map(colon) => p.parse_set_map(colon)?,
            };
            p.expect(TokenKind::RBrace)?;
            Ok(kind)
        })?;
        Ok(Expr::new(kind, self.span_from(start)))
    }

    fn parse_set_filter(&mut self) -> ParseResult<ExprKind> {
        let pending = self.parse_bindings(false)?;
        if pending.len() != 1 {
            return Err(self.invalid("a set filter binds one name or tuple", self.current_span()));
        }
        self.expect_symbol(":")?;
        self.scoped(FrameKind::Binding, |p| {
            let binding = p.bind_all(pending, BinderKind::SetElement).remove(0);
            let predicate = p.parse_expression()?;
            Ok(ExprKind::SetFilter {
                binding,
                predicate: Box::new(predicate),
            })
        })
    }

    /// `{e : x \in S}`. The binders follow the body in the source but must
    /// be in scope while it is parsed, so they are read first.
    fn parse_set_map(&mut self, colon: usize) -> ParseResult<ExprKind> {
        let body_start = self.position;
        self.position = colon;
        self.split_current(1);
        self.position = colon + 1;
        let pending = self.parse_bindings(false)?;
        // Splitting symbol runs inside the body shifts later indices, so
        // remember the resume point from the end.
        let resume_from_end = self.tokens.len() - self.position;

        self.scoped(FrameKind::Binding, |p| {
            let bindings = p.bind_all(pending, BinderKind::SetElement);
            p.position = body_start;
            let body = p.parse_expression()?;
            p.expect_symbol(":")?;
            p.position = p.tokens.len() - resume_from_end;
            Ok(ExprKind::SetMap {
                body: Box::new(body),
                bindings,
            })
        })
    }

    /// Decide the shape of the set form under the cursor by looking for a
    /// top-level `:` that no quantifier, CHOOSE or LAMBDA claims.
    fn scan_set_form(&self) -> SetForm {
        let mut depth = 0usize;
        let mut pending_binders = 0usize;
        let mut index = self.position;
        while let Some(token) = self.tokens.get(index) {
            match token.kind {
                TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => depth += 1,
                TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                    if depth == 0 {
                        break;
                    }
                    depth -= 1;
                }
                TokenKind::Eof | TokenKind::ModuleEnd => break,
                TokenKind::Keyword(Keyword::Choose | Keyword::Lambda) if depth == 0 => {
                    pending_binders += 1
                }
                TokenKind::Symbol if depth == 0 => {
                    if BINDER_SYMBOLS.contains(&token.text.as_str()) {
                        pending_binders += 1;
                    } else if self.is_colon(&token.text) {
                        if pending_binders == 0 {
                            return if self.starts_with_binder_pattern() {
                                SetForm::Filter
                            } else {
                                SetForm::Map(index)
                            };
                        }
                        pending_binders -= 1;
                    }
                }
                _ => {}
            }
            index += 1;
        }
        SetForm::Enumeration
    }

    fn is_colon(&self, text: &str) -> bool {
        text == ":" || (text.starts_with(':') && !text.starts_with("::") && !self.is_whole_symbol(text))
    }

    /// `x \in`, `x, y \in` or `<<x, y>> \in` at the cursor.
    fn starts_with_binder_pattern(&self) -> bool {
        let mut index = self.position;
        let at = |i: usize| self.tokens.get(i);
        let tuple = at(index).is_some_and(|t| t.is_symbol("<<"));
        if tuple {
            index += 1;
        }
        loop {
            if !at(index).is_some_and(|t| t.kind == TokenKind::Ident) {
                return false;
            }
            index += 1;
            if at(index).is_some_and(|t| t.kind == TokenKind::Comma) {
                index += 1;
                continue;
            }
            break;
        }
        if tuple {
            if !at(index).is_some_and(|t| t.is_symbol(">>")) {
                return false;
            }
            index += 1;
        }
        at(index).is_some_and(|t| t.is_symbol("\\in"))
    }

    // === Bracket forms ===

    pub(super) fn parse_bracket(&mut self) -> ParseResult<Expr> {
        let start = self.expect(TokenKind::LBracket)?;
        let Some(form) = self.scan_bracket_form() else {
            return self.parse_action_box(start);
        };
        let kind = self.delimited(|p| match form {
            BracketForm::Record => p.parse_record_fields("|->").map(ExprKind::Record),
            BracketForm::RecordSet => p.parse_record_fields(":").map(ExprKind::RecordSet),
            BracketForm::FunctionDef => p.parse_function_def(),
            BracketForm::FunctionSet => {
                let domain = p.parse_expression()?;
                p.expect_symbol("->")?;
                let range = p.parse_expression()?;
                p.expect(TokenKind::RBracket)?;
                Ok(ExprKind::FunctionSet {
                    domain: Box::new(domain),
                    range: Box::new(range),
                })
            }
            BracketForm::Except => p.parse_except(),
        })?;
        Ok(Expr::new(kind, self.span_from(start)))
    }

    /// `[A]_v`
    fn parse_action_box(&mut self, start: Span) -> ParseResult<Expr> {
        let action = self.delimited(|p| {
            let action = p.parse_expression()?;
            p.expect(TokenKind::RBracket)?;
            Ok(action)
        })?;
        self.expect(TokenKind::Subscript)?;
        let sub = self.parse_subscript()?;
        let span = self.span_from(start);
        Ok(Expr::new(
            ExprKind::ActionBox {
                action: Box::new(action),
                sub: Box::new(sub),
            },
            span,
        ))
    }

    /// `None` when nothing marks the brackets as a record, function or
    /// EXCEPT form, leaving `[A]_v`.
    fn scan_bracket_form(&self) -> Option<BracketForm> {
        let first = self.peek_raw(0);
        let second = self.peek_raw(1);
        if first.kind == TokenKind::Ident {
            if second.is_symbol("|->") {
                return Some(BracketForm::Record);
            }
            if second.is_symbol(":") {
                return Some(BracketForm::RecordSet);
            }
        }
        let mut depth = 0usize;
        // `->` after a CASE belongs to its arms.
        let mut in_case = false;
        let mut index = self.position;
        while let Some(token) = self.tokens.get(index) {
            match token.kind {
                TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => depth += 1,
                TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                    if depth == 0 {
                        break;
                    }
                    depth -= 1;
                }
                TokenKind::Eof | TokenKind::ModuleEnd => break,
                TokenKind::Keyword(Keyword::Case) if depth == 0 => in_case = true,
                TokenKind::Keyword(Keyword::Except) if depth == 0 => {
                    return Some(BracketForm::Except)
                }
                TokenKind::Symbol if depth == 0 && token.text == "|->" => {
                    return Some(BracketForm::FunctionDef)
                }
                TokenKind::Symbol if depth == 0 && !in_case && token.text == "->" => {
                    return Some(BracketForm::FunctionSet)
                }
                _ => {}
            }
            index += 1;
        }
        None
    }

    fn parse_record_fields(&mut self, separator: &str) -> ParseResult<Vec<(Ident, Expr)>> {
        let mut fields = Vec::new();
        loop {
            let name = self.expect_ident()?;
            self.expect_symbol(separator)?;
            fields.push((name, self.parse_expression()?));
            if self.eat(TokenKind::Comma).is_none() {
                break;
            }
        }
        self.expect(TokenKind::RBracket)?;
        Ok(fields)
    }

    fn parse_function_def(&mut self) -> ParseResult<ExprKind> {
        let pending = self.parse_bindings(false)?;
        self.expect_symbol("|->")?;
        self.scoped(FrameKind::Binding, |p| {
            let bindings = p.bind_all(pending, BinderKind::FunctionArg);
            let body = p.parse_expression()?;
            p.expect(TokenKind::RBracket)?;
            Ok(ExprKind::FunctionDef {
                bindings,
                body: Box::new(body),
            })
        })
    }

    /// `[f EXCEPT ![a] = e, !.x = e]`
    fn parse_except(&mut self) -> ParseResult<ExprKind> {
        let base = self.parse_expression()?;
        self.expect_keyword(Keyword::Except)?;
        let mut updates = Vec::new();
        loop {
            self.expect_symbol("!")?;
            let mut path = Vec::new();
            loop {
                if self.eat(TokenKind::LBracket).is_some() {
                    let index = self.parse_expr_list()?;
                    self.expect(TokenKind::RBracket)?;
                    path.push(ExceptPath::Index(index));
                } else if self.eat_symbol(".").is_some() {
                    path.push(ExceptPath::Field(self.expect_ident()?));
                } else {
                    break;
                }
            }
            if path.is_empty() {
                return Err(self.unexpected("`[` or `.`"));
            }
            self.expect_symbol("=")?;
            self.except_depth += 1;
            let value = self.parse_expression();
            self.except_depth -= 1;
            updates.push(ExceptUpdate {
                path,
                value: value?,
            });
            if self.eat(TokenKind::Comma).is_none() {
                break;
            }
        }
        self.expect(TokenKind::RBracket)?;
        Ok(ExprKind::Except {
            base: Box::new(base),
            updates,
        })
    }
}
