//! Module-level tests: resolution, declaration order, user operators,
//! bulleted lists and recovery across whole modules.

use tla_syntax::layout::outline;
use tla_syntax::scope::{BinderKind, DeclKind};
use tla_syntax::{
    parse_module, parse_module_with, Assoc, ErrorCategory, Expr, ExprKind, Module, ModuleEnv,
    ModuleInterface, OperatorDecl, ParseConfig, ParseError, ParseOutcome, Precedence, Resolution,
    TheoremBody, Unit,
};

fn parse(src: &str) -> ParseOutcome {
    parse_module(src, "test.tla")
}

fn parse_ok(src: &str) -> (Module, ParseOutcome) {
    let outcome = parse(src);
    assert!(outcome.is_ok(), "unexpected diagnostics: {:?}", outcome.diagnostics);
    let module = outcome.module.clone().unwrap();
    (module, outcome)
}

fn body<'m>(module: &'m Module, name: &str) -> &'m Expr {
    &module
        .definition(name)
        .unwrap_or_else(|| panic!("no definition {name}"))
        .body
}

/// Every expression directly held by a unit.
fn unit_exprs(unit: &Unit) -> Vec<&Expr> {
    match unit {
        Unit::Operator(def) => vec![&def.body],
        Unit::Assumption { expr, .. } => vec![expr],
        Unit::Theorem(thm) => match &thm.body {
            TheoremBody::Expr(e) => vec![e],
            TheoremBody::AssumeProve { conclusion, .. } => vec![conclusion],
        },
        Unit::Instance(inst) => inst.substitutions.iter().map(|s| &s.actual).collect(),
        _ => Vec::new(),
    }
}

fn names(module: &Module) -> Vec<(String, Resolution)> {
    let mut out = Vec::new();
    for unit in &module.units {
        for expr in unit_exprs(unit) {
            expr.walk(&mut |e| {
                if let ExprKind::Name(n) = &e.kind {
                    out.push((n.name.clone(), n.resolution));
                }
            });
        }
    }
    out
}

#[test]
fn test_precedence_example() {
    let (m, _) = parse_ok("---- MODULE T ----\nCONSTANTS a, b, c\nE == a + b * c\n====");
    let ExprKind::OpApp { op, args } = &body(&m, "E").kind else {
        panic!("expected application");
    };
    assert_eq!(op.symbol, "+");
    assert!(matches!(&args[0].kind, ExprKind::Name(n) if n.name == "a"));
    let ExprKind::OpApp { op: inner, args: inner_args } = &args[1].kind else {
        panic!("expected nested application");
    };
    assert_eq!(inner.symbol, "*");
    assert_eq!(inner_args.len(), 2);
}

#[test]
fn test_quantifier_example() {
    let (m, outcome) = parse_ok(
        "---- MODULE T ----\nCONSTANTS S, P(_)\nE == \\A x \\in S : P(x)\n====",
    );
    let ExprKind::Quantifier { bounds, body: q, .. } = &body(&m, "E").kind else {
        panic!("expected quantifier");
    };
    let x = bounds[0].vars[0].binder;
    assert!(matches!(&bounds[0].domain, Some(d) if matches!(&d.kind, ExprKind::Name(n) if n.name == "S")));
    let binder = outcome.symbols.binder(x).unwrap();
    assert_eq!(binder.kind, BinderKind::Quantified);

    let ExprKind::OpApp { op, args } = &q.kind else {
        panic!("expected P(x)");
    };
    assert_eq!(op.symbol, "P");
    assert!(matches!(&args[0].kind, ExprKind::Name(n) if n.resolution == Resolution::Binder(x)));

    let outcome = parse("---- MODULE T ----\nCONSTANTS S, P(_)\nE == \\A x \\in S : P(x)\nF == x\n====");
    assert_eq!(outcome.diagnostics.len(), 1);
    assert!(matches!(&outcome.diagnostics[0], ParseError::UnresolvedName { name, .. } if name == "x"));
}

#[test]
fn test_constant_declared_before_use() {
    let (m, outcome) = parse_ok("---- MODULE T ----\nCONSTANT N\nE == N + 1\n====");
    let refs = names(&m);
    let Resolution::Declaration(id) = refs[0].1 else {
        panic!("N should resolve to its declaration");
    };
    assert_eq!(outcome.symbols.decl(id).unwrap().kind, DeclKind::Constant);

    let outcome = parse("---- MODULE T ----\nE == N + 1\nCONSTANT N\n====");
    let err = &outcome.diagnostics[0];
    assert_eq!(err.category(), ErrorCategory::Declaration);
    let ParseError::UseBeforeDeclaration { name, span, .. } = err else {
        panic!("expected a declaration-order error, got {err:?}");
    };
    assert_eq!(name, "N");
    assert_eq!((span.line, span.column), (2, 6));
}

fn hash_config(assoc: Assoc) -> ParseConfig {
    ParseConfig {
        operators: vec![OperatorDecl::infix("##", Precedence::point(9), assoc)],
        ..ParseConfig::default()
    }
}

fn shape(e: &Expr) -> String {
    match &e.kind {
        ExprKind::Name(n) => n.name.clone(),
        ExprKind::OpApp { op, args } => {
            let args: Vec<String> = args.iter().map(shape).collect();
            format!("({})", args.join(&format!(" {} ", op.symbol)))
        }
        other => format!("{other:?}"),
    }
}

#[test]
fn test_declared_operator_associativity() {
    let src = "---- MODULE T ----\nCONSTANTS a, b, c\nE == a ## b ## c\n====";
    let env = ModuleEnv::new();

    let left = parse_module_with(src, "t.tla", &hash_config(Assoc::Left), &env);
    assert!(left.is_ok(), "{:?}", left.diagnostics);
    let m = left.module.unwrap();
    assert_eq!(shape(body(&m, "E")), "((a ## b) ## c)");

    let right = parse_module_with(src, "t.tla", &hash_config(Assoc::Right), &env);
    let m = right.module.unwrap();
    assert_eq!(shape(body(&m, "E")), "(a ## (b ## c))");
}

#[test]
fn test_in_source_operator_definition() {
    let (m, outcome) = parse_ok(
        "---- MODULE T ----\n\
         CONSTANTS a, b, c\n\
         x ## y == x \\cup y\n\
         E == a ## b ## c\n\
         ====",
    );
    assert_eq!(shape(body(&m, "E")), "((a ## b) ## c)");
    let ExprKind::OpApp { op, .. } = &body(&m, "E").kind else {
        panic!("expected application");
    };
    let Resolution::Declaration(id) = op.resolution else {
        panic!("## should resolve to its definition");
    };
    assert_eq!(outcome.symbols.decl(id).unwrap().name, "##");
}

#[test]
fn test_operator_definition_is_module_scoped() {
    let outcome = parse(
        "---- MODULE T ----\n\
         ---- MODULE Inner ----\n\
         x ## y == x\n\
         ====\n\
         E == 1 ## 2\n\
         ====",
    );
    assert!(outcome
        .diagnostics
        .iter()
        .any(|d| matches!(d, ParseError::UnresolvedOperator { symbol, .. } if symbol == "##")));
}

/// The declaration each named definition's top-level application resolves to.
fn operator_target(module: &Module, name: &str) -> Resolution {
    let ExprKind::OpApp { op, .. } = &body(module, name).kind else {
        panic!("{name} is not an application");
    };
    op.resolution
}

#[test]
fn test_operator_spellings_share_a_definition() {
    let (m, outcome) = parse_ok(
        "---- MODULE T ----\n\
         a \\oplus b == a \\cup b\n\
         C == {1} (+) {2}\n\
         D == {1} \\oplus {2}\n\
         ====",
    );
    let Resolution::Declaration(id) = operator_target(&m, "C") else {
        panic!("(+) should resolve to the \\oplus definition");
    };
    assert_eq!(operator_target(&m, "D"), Resolution::Declaration(id));
    assert_eq!(outcome.symbols.decl(id).unwrap().name, "(+)");
}

#[test]
fn test_imported_symbolic_operator_resolves() {
    let source = "---- MODULE T ----\n\
         ---- MODULE Bits ----\n\
         a \\oplus b == a \\cup b\n\
         ====\n\
         INSTANCE Bits\n\
         C == {1} \\oplus {2}\n\
         D == {1} (+) {2}\n\
         ====";
    let (m, outcome) = parse_ok(source);
    let Resolution::Declaration(id) = operator_target(&m, "C") else {
        panic!("\\oplus should resolve to the instantiated definition");
    };
    assert_eq!(operator_target(&m, "D"), Resolution::Declaration(id));
    assert_eq!(outcome.symbols.decl(id).unwrap().origin.as_deref(), Some("Bits"));

    let (bits, _) = parse_ok("---- MODULE Bits ----\na \\oplus b == a \\cup b\n====");
    let mut env = ModuleEnv::new();
    env.insert(ModuleInterface::of_module(&bits));
    let outcome = parse_module_with(
        "---- MODULE Main ----\n\
         EXTENDS Bits\n\
         C == {1} \\oplus {2}\n\
         D == {1} (+) {2}\n\
         ====",
        "main.tla",
        &ParseConfig::default(),
        &env,
    );
    assert!(outcome.is_ok(), "{:?}", outcome.diagnostics);
    let m = outcome.module.unwrap();
    let Resolution::Declaration(id) = operator_target(&m, "C") else {
        panic!("\\oplus should resolve to the extended definition");
    };
    assert_eq!(operator_target(&m, "D"), Resolution::Declaration(id));
}

#[test]
fn test_configured_operator_survives_export() {
    let config = ParseConfig {
        operators: vec![OperatorDecl::infix("<*>", Precedence::point(10), Assoc::Left)],
        ..ParseConfig::default()
    };
    let lib = parse_module_with(
        "---- MODULE Lib ----\na <*> b == a \\cup b\n====",
        "lib.tla",
        &config,
        &ModuleEnv::new(),
    );
    assert!(lib.is_ok(), "{:?}", lib.diagnostics);
    let iface = ModuleInterface::of_module(&lib.module.unwrap());
    assert!(iface.defines("<*>"));
    assert!(iface.operators.iter().any(|o| o.symbol == "<*>"));

    let mut env = ModuleEnv::new();
    env.insert(iface);
    let outcome = parse_module_with(
        "---- MODULE Main ----\nEXTENDS Lib\nE == {1} <*> {2}\n====",
        "main.tla",
        &ParseConfig::default(),
        &env,
    );
    assert!(outcome.is_ok(), "{:?}", outcome.diagnostics);
    let m = outcome.module.unwrap();
    assert!(matches!(operator_target(&m, "E"), Resolution::Declaration(_)));
}

#[test]
fn test_failed_operator_definition_is_forgotten() {
    let outcome = parse(
        "---- MODULE T ----\n\
         a ## b == )\n\
         E == 1 ## 2\n\
         ====",
    );
    assert!(outcome
        .diagnostics
        .iter()
        .any(|d| matches!(d, ParseError::UnresolvedOperator { symbol, .. } if symbol == "##")));
    assert!(outcome.module.unwrap().definition("##").is_none());
}

#[test]
fn test_conflicting_imports_are_redefinitions() {
    let mut env = ModuleEnv::new();
    env.insert(ModuleInterface::new("Left").with_definition("Step", 0));
    env.insert(ModuleInterface::new("Right").with_definition("Step", 0));
    let outcome = parse_module_with(
        "---- MODULE T ----\nEXTENDS Left, Right\nE == Step\n====",
        "t.tla",
        &ParseConfig::default(),
        &env,
    );
    assert!(matches!(
        &outcome.diagnostics[..],
        [ParseError::Redefinition { name, .. }] if name == "Step"
    ));

    let outcome = parse(
        "---- MODULE T ----\n\
         ---- MODULE Inner ----\n\
         Helper == 1\n\
         ====\n\
         Helper == 2\n\
         INSTANCE Inner\n\
         ====",
    );
    assert!(matches!(
        &outcome.diagnostics[..],
        [ParseError::Redefinition { name, .. }] if name == "Helper"
    ));

    parse_ok("---- MODULE T ----\nEXTENDS Naturals, Integers, Reals\nE == 1 + 2 - 3\n====");
}

#[test]
fn test_every_reference_resolves() {
    let (m, outcome) = parse_ok(
        "---- MODULE Counter ----\n\
         EXTENDS Naturals, FiniteSets\n\
         CONSTANT Max\n\
         VARIABLES count, seen\n\
         vars == <<count, seen>>\n\
         Init == /\\ count = 0\n\
         \x20       /\\ seen = {}\n\
         Inc == /\\ count < Max\n\
         \x20      /\\ count' = count + 1\n\
         \x20      /\\ seen' = seen \\cup {count}\n\
         Reset == /\\ count = Max\n\
         \x20        /\\ count' = 0\n\
         \x20        /\\ UNCHANGED seen\n\
         Next == Inc \\/ Reset\n\
         Spec == Init /\\ [][Next]_vars /\\ WF_vars(Next)\n\
         Bounded == \\A n \\in seen : n <= Max\n\
         Size == Cardinality(seen)\n\
         THEOREM Spec => []Bounded\n\
         ====",
    );
    let refs = names(&m);
    assert!(!refs.is_empty());
    for (name, resolution) in refs {
        match resolution {
            Resolution::Binder(id) => assert!(outcome.symbols.binder(id).is_some(), "{name}"),
            Resolution::Declaration(id) => assert!(outcome.symbols.decl(id).is_some(), "{name}"),
            other => panic!("{name} resolved to {other:?}"),
        }
    }
}

#[test]
fn test_bulleted_definition_layout() {
    let (m, _) = parse_ok(
        "---- MODULE T ----\n\
         VARIABLES x, y\n\
         Next == /\\ x' = x + 1\n\
         \x20       /\\ \\/ y' = y\n\
         \x20          \\/ y' = y + 1\n\
         \x20       /\\ TRUE\n\
         ====",
    );
    let ExprKind::BulletList(list) = &body(&m, "Next").kind else {
        panic!("expected a bulleted list");
    };
    assert_eq!(list.column, 9);
    let o = outline(list);
    assert_eq!(o.shape(), "/\\[.,.\\/[.,.],.]");
    assert_eq!(o.items[1].children[0].column, 12);
}

#[test]
fn test_parse_is_deterministic() {
    let src = "---- MODULE T ----\n\
               EXTENDS Naturals\n\
               CONSTANT N\n\
               F[n \\in Nat] == IF n = 0 THEN 1 ELSE n * F[n - 1]\n\
               G == LET h(k) == k + N IN {h(i) : i \\in 1..N}\n\
               Bad == N +\n\
               ====";
    let first = parse(src);
    let second = parse(src);
    assert_eq!(first.module, second.module);
    assert_eq!(first.diagnostics, second.diagnostics);
    assert_eq!(first.diagnostics.len(), 1);
}

#[test]
fn test_diagnostics_are_ordered_and_complete() {
    let outcome = parse(
        "---- MODULE T ----\n\
         CONSTANTS a, b, c\n\
         A == Undefined1\n\
         B == 1 +\n\
         C == a /\\ b \\/ c\n\
         D == Undefined2\n\
         ====",
    );
    let categories: Vec<ErrorCategory> = outcome.diagnostics.iter().map(|d| d.category()).collect();
    assert_eq!(outcome.diagnostics.len(), 4, "{:?}", outcome.diagnostics);
    assert_eq!(categories[0], ErrorCategory::Resolution);
    assert_eq!(categories[1], ErrorCategory::Syntax);
    assert!(matches!(outcome.diagnostics[2], ParseError::AmbiguousOperators { .. }));
    assert_eq!(categories[3], ErrorCategory::Resolution);
    let starts: Vec<usize> = outcome.diagnostics.iter().map(|d| d.span().start).collect();
    let mut sorted = starts.clone();
    sorted.sort_unstable();
    assert_eq!(starts, sorted);

    let m = outcome.module.unwrap();
    assert!(m.definition("A").is_some());
    assert!(m.definition("D").is_some());
}

#[test]
fn test_external_module_environment() {
    let mut env = ModuleEnv::new();
    env.insert(
        ModuleInterface::new("Queues")
            .with_parameter("Capacity", tla_syntax::stdlib::ParameterKind::Constant)
            .with_definition("Enqueue", 2),
    );
    let config = ParseConfig::default();
    let outcome = parse_module_with(
        "---- MODULE T ----\n\
         EXTENDS Queues\n\
         E(q) == Enqueue(q, Capacity)\n\
         Q == INSTANCE Queues WITH Capacity <- 3\n\
         F == Q!Enqueue(<<>>, 1)\n\
         ====",
        "t.tla",
        &config,
        &env,
    );
    assert!(outcome.is_ok(), "{:?}", outcome.diagnostics);
}

#[test]
fn test_stitching_through_interfaces() {
    let (lib, _) = parse_ok(
        "---- MODULE Lib ----\n\
         CONSTANT Limit\n\
         Ok(v) == v <= Limit\n\
         LOCAL Hidden == 1\n\
         ====",
    );
    let iface = ModuleInterface::of_module(&lib);
    assert!(iface.defines("Ok"));
    assert!(!iface.defines("Hidden"));

    let mut env = ModuleEnv::new();
    env.insert(iface);
    let outcome = parse_module_with(
        "---- MODULE Main ----\n\
         L == INSTANCE Lib WITH Limit <- 10\n\
         Check == L!Ok(3) /\\ L!Limit = 10\n\
         Bad == L!Hidden\n\
         ====",
        "main.tla",
        &ParseConfig::default(),
        &env,
    );
    assert_eq!(outcome.diagnostics.len(), 1, "{:?}", outcome.diagnostics);
    assert!(matches!(
        &outcome.diagnostics[0],
        ParseError::UnresolvedQualified { name, .. } if name == "Hidden"
    ));
}

#[test]
fn test_standard_modules_can_be_disabled() {
    let config = ParseConfig {
        standard_modules: false,
        ..ParseConfig::default()
    };
    let outcome = parse_module_with(
        "---- MODULE T ----\nEXTENDS Naturals\n====",
        "t.tla",
        &config,
        &ModuleEnv::new(),
    );
    assert!(matches!(outcome.diagnostics[0], ParseError::UnknownModule { .. }));

    let outcome = parse_module_with(
        "---- MODULE T ----\nEXTENDS Naturals\n====",
        "t.tla",
        &config,
        &ModuleEnv::standard(),
    );
    assert!(outcome.is_ok());
}
