//! Expressions: precedence climbing over the operator table.

use super::{Parser, PUNCTUATION};
use crate::ast::{
    BulletItem, BulletList, BuiltinSet, Expr, ExprKind, Ident, Junction, NameRef, OpName,
    PathSegment, Resolution,
};
use crate::error::{ParseError, ParseResult};
use crate::optable::{scope_symbol, Assoc, Fixity, OperatorEntry};
use crate::scope::{DeclKind, QualifiedTarget};
use crate::token::{Keyword, Span, TokenKind};

/// Name under which a user definition of `entry` is declared in scope.
/// Prefix minus is written `-.` in definitions to tell it from infix `-`.
fn scope_name(entry: &OperatorEntry) -> String {
    scope_symbol(&entry.canonical, entry.fixity)
}

impl Parser<'_> {
    /// Parse an expression extending as far as possible.
    pub(crate) fn parse_expression(&mut self) -> ParseResult<Expr> {
        self.parse_binary(0, None)
    }

    /// Parse operands joined by infix and postfix operators whose lowest
    /// precedence level is at least `min`. `enclosing` is the operator whose
    /// right operand is being parsed, if any.
    fn parse_binary(&mut self, min: u8, enclosing: Option<&OperatorEntry>) -> ParseResult<Expr> {
        let mut left = self.parse_prefix()?;
        let mut last: Option<OperatorEntry> = None;
        // Set while `left` is a `\X` product built by this loop, so that
        // `A \X B \X C` becomes one three-argument application.
        let mut product = false;

        loop {
            let Some((entry, len)) = self.operator_at_cursor()? else {
                break;
            };
            if entry.precedence.lo < min {
                break;
            }
            let op_span = self.current_span();

            if entry.fixity == Fixity::Postfix {
                self.split_current(len);
                self.advance();
                let span = left.span.merge(op_span);
                left = self.apply(&entry, op_span, vec![left], span);
                product = false;
                continue;
            }

            for prev in enclosing.into_iter().chain(last.as_ref()) {
                check_mixing(prev, &entry, op_span)?;
            }
            self.split_current(len);
            self.advance();

            let right_min = match entry.assoc {
                Assoc::Right => entry.precedence.lo,
                Assoc::Left | Assoc::None => entry.precedence.lo + 1,
            };
            let right = self.parse_binary(right_min, Some(&entry))?;
            let span = left.span.merge(right.span);

            if entry.canonical == "\\X" && product {
                if let ExprKind::OpApp { args, .. } = &mut left.kind {
                    args.push(right);
                }
                left.span = span;
            } else {
                product = entry.canonical == "\\X";
                left = self.apply(&entry, op_span, vec![left, right], span);
            }
            last = Some(entry);
        }
        Ok(left)
    }

    /// The infix or postfix operator under the cursor, with the number of
    /// bytes of the symbol run it occupies.
    fn operator_at_cursor(&self) -> ParseResult<Option<(OperatorEntry, usize)>> {
        let token = self.current();
        if token.kind != TokenKind::Symbol {
            return Ok(None);
        }
        // The next unit or proof step starts here.
        if token.first_on_line && (self.at_definition_header() || self.at_proof_step()) {
            return Ok(None);
        }
        let text = token.text.as_str();
        for fixity in [Fixity::Infix, Fixity::Postfix] {
            if let Some(entry) = self.ops.lookup(text, fixity) {
                return Ok(Some((entry.clone(), text.len())));
            }
        }
        if PUNCTUATION.iter().any(|p| text.starts_with(p)) {
            return Ok(None);
        }
        // Prefix and mixfix symbols (`[]` between CASE arms, `\E`) end the operand.
        if self.ops.lookup(text, Fixity::Prefix).is_some()
            || self.ops.lookup(text, Fixity::Mixfix).is_some()
        {
            return Ok(None);
        }
        if !self.ops.is_known(text) {
            let best = [Fixity::Infix, Fixity::Postfix]
                .into_iter()
                .filter_map(|f| self.ops.longest_prefix(text, f).map(|len| (len, f)))
                .max_by_key(|&(len, _)| len);
            if let Some((len, fixity)) = best {
                if let Some(entry) = self.ops.lookup(&text[..len], fixity) {
                    return Ok(Some((entry.clone(), len)));
                }
            }
        }
        Err(ParseError::UnresolvedOperator {
            symbol: text.to_string(),
            span: token.span,
        })
    }

    /// The prefix operator under the cursor, with its length in the run.
    fn prefix_at_cursor(&self) -> Option<(OperatorEntry, usize)> {
        let token = self.current();
        let text = token.text.as_str();
        if let Some(entry) = self.ops.lookup(text, Fixity::Prefix) {
            return Some((entry.clone(), text.len()));
        }
        if token.kind != TokenKind::Symbol
            || PUNCTUATION.iter().any(|p| text.starts_with(p))
            || self.ops.is_known(text)
        {
            return None;
        }
        let len = self.ops.longest_prefix(text, Fixity::Prefix)?;
        self.ops
            .lookup(&text[..len], Fixity::Prefix)
            .map(|entry| (entry.clone(), len))
    }

    fn apply(&self, entry: &OperatorEntry, op_span: Span, args: Vec<Expr>, span: Span) -> Expr {
        let op = OpName {
            symbol: entry.canonical.clone(),
            fixity: Some(entry.fixity),
            precedence: Some(entry.precedence),
            resolution: self.builder.resolve_operator(&scope_name(entry)),
            span: op_span,
        };
        Expr::new(ExprKind::OpApp { op, args }, span)
    }

    /// Bulleted lists, mixfix forms, prefix operators, then postfix terms.
    fn parse_prefix(&mut self) -> ParseResult<Expr> {
        let token = self.current().clone();
        if token.first_on_line && self.at_definition_header() {
            return Err(self.unexpected("expression"));
        }
        match token.kind {
            TokenKind::Symbol => {
                for junction in [Junction::Conjunction, Junction::Disjunction] {
                    if self.at_sym(junction.bullet()) {
                        return self.parse_bullet_list(junction);
                    }
                }
                if let Some(entry) = self.ops.lookup(&token.text, Fixity::Mixfix) {
                    let canonical = entry.canonical.clone();
                    return self.parse_mixfix(&canonical);
                }
                if let Some((entry, len)) = self.prefix_at_cursor() {
                    return self.parse_prefix_application(entry, len);
                }
            }
            TokenKind::Keyword(
                kw @ (Keyword::If
                | Keyword::Case
                | Keyword::Let
                | Keyword::Choose
                | Keyword::Lambda
                | Keyword::WeakFairness
                | Keyword::StrongFairness),
            ) => return self.parse_mixfix(kw.as_str()),
            TokenKind::Keyword(
                kw @ (Keyword::Enabled
                | Keyword::Unchanged
                | Keyword::Subset
                | Keyword::Union
                | Keyword::Domain),
            ) => {
                if let Some(entry) = self.ops.lookup(kw.as_str(), Fixity::Prefix) {
                    let entry = entry.clone();
                    return self.parse_prefix_application(entry, 0);
                }
            }
            _ => {}
        }
        self.parse_postfix_term()
    }

    fn parse_prefix_application(&mut self, entry: OperatorEntry, len: usize) -> ParseResult<Expr> {
        let op_span = self.current_span();
        self.split_current(len);
        self.advance();
        let operand = self.parse_binary(entry.precedence.lo + 1, None)?;
        let span = op_span.merge(operand.span);
        Ok(self.apply(&entry, op_span, vec![operand], span))
    }

    /// A primary followed by any number of `[args]`, `'` and `.field`.
    fn parse_postfix_term(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.check(TokenKind::LBracket) {
                self.advance();
                let args = self.delimited(|p| {
                    let args = p.parse_expr_list()?;
                    p.expect(TokenKind::RBracket)?;
                    Ok(args)
                })?;
                let span = self.span_from(expr.span);
                expr = Expr::new(
                    ExprKind::FunctionApp {
                        function: Box::new(expr),
                        args,
                    },
                    span,
                );
            } else if self.check(TokenKind::Prime) {
                let prime = self.advance();
                let Some(entry) = self.ops.lookup("'", Fixity::Postfix).cloned() else {
                    return Err(ParseError::UnresolvedOperator {
                        symbol: "'".to_string(),
                        span: prime.span,
                    });
                };
                let span = expr.span.merge(prime.span);
                expr = self.apply(&entry, prime.span, vec![expr], span);
            } else if self.at_sym(".") && self.peek_raw(1).kind == TokenKind::Ident {
                self.eat_symbol(".");
                let field = self.expect_ident()?;
                let span = expr.span.merge(field.span);
                expr = Expr::new(
                    ExprKind::FieldAccess {
                        record: Box::new(expr),
                        field,
                    },
                    span,
                );
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        let token = self.current().clone();
        let literal = match token.kind {
            TokenKind::Int(n) => Some(ExprKind::Int(n)),
            TokenKind::Decimal => Some(ExprKind::Decimal(token.text.clone())),
            TokenKind::String => Some(ExprKind::String(token.text.clone())),
            TokenKind::Keyword(Keyword::True) => Some(ExprKind::Bool(true)),
            TokenKind::Keyword(Keyword::False) => Some(ExprKind::Bool(false)),
            TokenKind::Keyword(Keyword::Boolean) => Some(ExprKind::BuiltinSet(BuiltinSet::Boolean)),
            TokenKind::Keyword(Keyword::String) => Some(ExprKind::BuiltinSet(BuiltinSet::String)),
            _ => None,
        };
        if let Some(kind) = literal {
            self.advance();
            return Ok(Expr::new(kind, token.span));
        }

        match token.kind {
            TokenKind::Ident => self.parse_name(),
            TokenKind::LParen => {
                self.advance();
                self.delimited(|p| {
                    let inner = p.parse_expression()?;
                    p.expect(TokenKind::RParen)?;
                    Ok(inner)
                })
            }
            TokenKind::LBrace => self.parse_set(),
            TokenKind::LBracket => self.parse_bracket(),
            TokenKind::Symbol if self.at_sym("<<") => self.parse_tuple(),
            TokenKind::Symbol if self.at_sym("@") => {
                let at = self.eat_symbol("@").map(|t| t.span).unwrap_or(token.span);
                if self.except_depth == 0 {
                    return Err(self.invalid("`@` is only allowed inside an EXCEPT value", at));
                }
                Ok(Expr::new(ExprKind::ExceptAt, at))
            }
            _ => Err(self.unexpected("expression")),
        }
    }

    /// Identifier reference, operator application, label or qualified name.
    fn parse_name(&mut self) -> ParseResult<Expr> {
        let ident = self.expect_ident()?;

        if self.at_sym("::") {
            self.eat_symbol("::");
            let body = self.parse_expression()?;
            let span = ident.span.merge(body.span);
            return Ok(Expr::new(
                ExprKind::Label {
                    name: ident,
                    body: Box::new(body),
                },
                span,
            ));
        }

        let args = if self.check(TokenKind::LParen) {
            Some(self.parse_call_args()?)
        } else {
            None
        };

        if self.current().is_symbol("!") && self.peek_raw(1).kind == TokenKind::Ident {
            return self.parse_qualified(ident, args.unwrap_or_default());
        }

        let resolution = self.builder.resolve(&ident.name, ident.span);
        let span = self.span_from(ident.span);
        let kind = match args {
            None => ExprKind::Name(NameRef {
                name: ident.name,
                resolution,
            }),
            Some(args) => ExprKind::OpApp {
                op: OpName {
                    symbol: ident.name,
                    fixity: None,
                    precedence: None,
                    resolution,
                    span: ident.span,
                },
                args,
            },
        };
        Ok(Expr::new(kind, span))
    }

    fn parse_call_args(&mut self) -> ParseResult<Vec<Expr>> {
        self.expect(TokenKind::LParen)?;
        self.delimited(|p| {
            let args = p.parse_expr_list()?;
            p.expect(TokenKind::RParen)?;
            Ok(args)
        })
    }

    /// `I!Op`, `I(a)!Op(b)`, `A!B!C`.
    fn parse_qualified(&mut self, first: Ident, first_args: Vec<Expr>) -> ParseResult<Expr> {
        let start = first.span;
        let resolution = self.builder.resolve(&first.name, first.span);
        let mut path = vec![PathSegment {
            name: first,
            args: first_args,
            resolution,
        }];

        let (name, args) = loop {
            self.expect_symbol("!")?;
            let name = self.expect_ident()?;
            let args = if self.check(TokenKind::LParen) {
                self.parse_call_args()?
            } else {
                Vec::new()
            };
            if self.current().is_symbol("!") && self.peek_raw(1).kind == TokenKind::Ident {
                // Later hops name things inside the instantiated module.
                path.push(PathSegment {
                    name,
                    args,
                    resolution: Resolution::Unresolved,
                });
                continue;
            }
            break (name, args);
        };

        let span = self.span_from(start);
        let target = if path.len() == 1 {
            let instance = path[0].name.name.clone();
            match self.builder.resolve_qualified(&instance, &name.name, span) {
                Some(target) => target,
                None => self.non_instance_target(&path[0])?,
            }
        } else {
            QualifiedTarget::Unchecked
        };

        Ok(Expr::new(
            ExprKind::Qualified {
                path,
                name,
                args,
                target,
            },
            span,
        ))
    }

    /// Target of `X!name` when `X` is not an instance declared in this module.
    fn non_instance_target(&self, segment: &PathSegment) -> ParseResult<QualifiedTarget> {
        match segment.resolution {
            // Already recorded as an unresolved reference.
            Resolution::Unresolved => Ok(QualifiedTarget::Unresolved),
            Resolution::Declaration(id)
                if self
                    .builder
                    .symbols()
                    .decl(id)
                    .is_some_and(|d| d.kind == DeclKind::Instance || d.origin.is_some()) =>
            {
                // Imported names may be instances of the other module.
                Ok(QualifiedTarget::Unchecked)
            }
            _ => Err(self.invalid(
                format!("`{}` is not an instance", segment.name.name),
                segment.name.span,
            )),
        }
    }

    pub(super) fn parse_expr_list(&mut self) -> ParseResult<Vec<Expr>> {
        let mut items = vec![self.parse_expression()?];
        while self.eat(TokenKind::Comma).is_some() {
            items.push(self.parse_expression()?);
        }
        Ok(items)
    }

    /// Items of a bulleted list whose first bullet is under the cursor.
    fn parse_bullet_list(&mut self, kind: Junction) -> ParseResult<Expr> {
        let column = self.current().column();
        let start = self.current_span();
        let mut items = Vec::new();
        while self.current().column() == column {
            let Some(bullet) = self.eat_symbol(kind.bullet()) else {
                break;
            };
            let expr = self.fenced(column, |p| p.parse_expression())?;
            items.push(BulletItem {
                line: bullet.line(),
                column,
                expr,
            });
        }
        let span = self.span_from(start);
        Ok(Expr::new(
            ExprKind::BulletList(BulletList {
                kind,
                column,
                items,
            }),
            span,
        ))
    }
}

/// Reject `a /\ b \/ c` and `a = b = c` without parentheses.
fn check_mixing(prev: &OperatorEntry, next: &OperatorEntry, span: Span) -> ParseResult<()> {
    let reason = if prev.canonical == next.canonical {
        if prev.assoc != Assoc::None {
            return Ok(());
        }
        "the operator is not associative"
    } else if prev.precedence.overlaps(next.precedence) {
        "their precedence ranges overlap"
    } else {
        return Ok(());
    };
    Err(ParseError::AmbiguousOperators {
        first: prev.symbol.clone(),
        second: next.symbol.clone(),
        reason,
        span,
    })
}

#[cfg(test)]
mod tests {
    use crate::ast::{Expr, ExprKind, Junction};
    use crate::error::ParseError;
    use crate::optable::{Assoc, OperatorDecl, Precedence};
    use crate::ExprParser;

    fn parse(src: &str) -> Expr {
        ExprParser::new(src)
            .constants(["a", "b", "c", "d", "x", "y", "S", "T", "f", "r"])
            .parse()
            .unwrap()
    }

    fn parse_err(src: &str) -> Vec<ParseError> {
        ExprParser::new(src)
            .constants(["a", "b", "c", "d", "x", "y", "S", "T", "f", "r"])
            .parse()
            .unwrap_err()
    }

    /// Render an expression as a fully parenthesised string.
    fn show(e: &Expr) -> String {
        match &e.kind {
            ExprKind::Int(n) => n.to_string(),
            ExprKind::Bool(b) => b.to_string().to_uppercase(),
            ExprKind::Name(n) => n.name.clone(),
            ExprKind::OpApp { op, args } if op.fixity.is_some() => match args.as_slice() {
                [x] => format!("({} {})", op.symbol, show(x)),
                _ => format!(
                    "({})",
                    args.iter().map(show).collect::<Vec<_>>().join(&format!(" {} ", op.symbol))
                ),
            },
            ExprKind::OpApp { op, args } => format!(
                "{}({})",
                op.symbol,
                args.iter().map(show).collect::<Vec<_>>().join(", ")
            ),
            ExprKind::FunctionApp { function, args } => format!(
                "{}[{}]",
                show(function),
                args.iter().map(show).collect::<Vec<_>>().join(", ")
            ),
            ExprKind::FieldAccess { record, field } => format!("{}.{}", show(record), field.name),
            ExprKind::BulletList(list) => format!(
                "{}[{}]",
                list.kind.bullet(),
                list.items.iter().map(|i| show(&i.expr)).collect::<Vec<_>>().join("; ")
            ),
            other => format!("{other:?}"),
        }
    }

    #[test]
    fn test_multiplication_binds_tighter() {
        assert_eq!(show(&parse("a + b * c")), "(a + (b * c))");
    }

    #[test]
    fn test_left_associative_chain() {
        assert_eq!(show(&parse("a - b - c")), "((a - b) - c)");
        assert_eq!(show(&parse("a /\\ b /\\ c")), "((a /\\ b) /\\ c)");
    }

    #[test]
    fn test_prefix_operators() {
        assert_eq!(show(&parse("-a + b")), "((- a) + b)");
        assert_eq!(show(&parse("~a /\\ b")), "((~ a) /\\ b)");
        assert_eq!(show(&parse("-a ^ b")), "(- (a ^ b))");
    }

    #[test]
    fn test_synonyms_share_canonical_symbol() {
        assert_eq!(show(&parse("a \\land b")), "(a /\\ b)");
        assert_eq!(show(&parse("a /= b")), "(a # b)");
    }

    #[test]
    fn test_mixed_overlapping_operators_rejected() {
        let errs = parse_err("a /\\ b \\/ c");
        assert!(matches!(errs[0], ParseError::AmbiguousOperators { .. }));
        assert_eq!(show(&parse("(a /\\ b) \\/ c")), "((a /\\ b) \\/ c)");
    }

    #[test]
    fn test_non_associative_chain_rejected() {
        let errs = parse_err("a = b = c");
        assert!(matches!(
            &errs[0],
            ParseError::AmbiguousOperators { reason, .. } if reason.contains("associative")
        ));
    }

    #[test]
    fn test_cartesian_product_is_flat() {
        let e = parse("S \\X T \\X S");
        match &e.kind {
            ExprKind::OpApp { op, args } => {
                assert_eq!(op.symbol, "\\X");
                assert_eq!(args.len(), 3);
            }
            other => panic!("unexpected {other:?}"),
        }
        let nested = parse("(S \\X T) \\X S");
        let ExprKind::OpApp { args, .. } = &nested.kind else {
            panic!("expected application");
        };
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn test_symbol_run_split_at_use() {
        assert_eq!(show(&parse("x=-1")), "(x = (- 1))");
    }

    #[test]
    fn test_prime_and_application() {
        assert_eq!(show(&parse("f[x]' = f[y]")), "((' f[x]) = f[y])");
        assert_eq!(show(&parse("r.a + 1")), "(r.a + 1)");
    }

    #[test]
    fn test_undeclared_catalog_symbol_is_unresolved() {
        let errs = parse_err("a ## b");
        assert!(matches!(&errs[0], ParseError::UnresolvedOperator { symbol, .. } if symbol == "##"));
    }

    #[test]
    fn test_declared_associativity_changes_tree() {
        let left = ExprParser::new("a ## b ## c")
            .constants(["a", "b", "c"])
            .operator(OperatorDecl::infix("##", Precedence::new(9, 13), Assoc::Left))
            .parse()
            .unwrap();
        assert_eq!(show(&left), "((a ## b) ## c)");

        let right = ExprParser::new("a ## b ## c")
            .constants(["a", "b", "c"])
            .operator(OperatorDecl::infix("##", Precedence::new(9, 13), Assoc::Right))
            .parse()
            .unwrap();
        assert_eq!(show(&right), "(a ## (b ## c))");
    }

    #[test]
    fn test_bullet_list_items_by_column() {
        let src = "/\\ a\n/\\ \\/ b\n   \\/ c\n/\\ d";
        let e = parse(src);
        assert_eq!(show(&e), "/\\[a; \\/[b; c]; d]");
        let ExprKind::BulletList(list) = &e.kind else {
            panic!("expected list");
        };
        assert_eq!(list.kind, Junction::Conjunction);
        assert_eq!(list.column, 1);
        assert_eq!(list.items.iter().map(|i| i.line).collect::<Vec<_>>(), [1, 2, 4]);
    }

    #[test]
    fn test_bullet_item_spans_lines() {
        let src = "/\\ a +\n     b\n/\\ c";
        assert_eq!(show(&parse(src)), "/\\[(a + b); c]");
    }

    #[test]
    fn test_token_at_bullet_column_ends_item() {
        // `+` sits at the bullet column: it ends the item, and the whole
        // list becomes its left operand.
        assert_eq!(show(&parse("/\\ a\n+ b")), "(/\\[a] + b)");
        assert_eq!(show(&parse("/\\ a\n + b")), "/\\[(a + b)]");
    }

    #[test]
    fn test_unresolved_name_reported() {
        let errs = parse_err("a + zz");
        assert!(matches!(&errs[0], ParseError::UnresolvedName { name, .. } if name == "zz"));
    }
}
