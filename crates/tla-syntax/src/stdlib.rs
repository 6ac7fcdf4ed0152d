//! Interfaces of modules a module may EXTEND or INSTANCE.
//!
//! An interface lists what another module exports: its formal parameters
//! (constants and variables), its non-local definitions with arities, and the
//! operator symbols it defines. The standard modules are described here as
//! static tables so their names resolve without parsing their source.

use crate::ast::{Module, Unit};
use crate::optable::{canonical_symbol, scope_symbol, standard_entry, Fixity, OperatorDecl};
use std::collections::HashMap;

/// Names of the standard modules known to [`ModuleEnv::standard`].
pub const STANDARD_MODULES: &[&str] = &[
    "Naturals",
    "Integers",
    "Reals",
    "Sequences",
    "FiniteSets",
    "Bags",
    "TLC",
    "TLAPS",
];

/// (name, arity)
type OpDef = (&'static str, usize);

const NATURALS_OPS: &[OpDef] = &[
    ("Nat", 0),
    ("+", 2),
    ("-", 2),
    ("*", 2),
    ("^", 2),
    ("<", 2),
    (">", 2),
    ("=<", 2),
    (">=", 2),
    ("%", 2),
    ("\\div", 2),
    ("..", 2),
];

const INTEGERS_OPS: &[OpDef] = &[("Int", 0), ("-.", 1)];

const REALS_OPS: &[OpDef] = &[("Real", 0), ("Infinity", 0), ("/", 2)];

const SEQUENCES_OPS: &[OpDef] = &[
    ("Seq", 1),
    ("Len", 1),
    ("\\o", 2),
    ("Append", 2),
    ("Head", 1),
    ("Tail", 1),
    ("SubSeq", 3),
    ("SelectSeq", 2),
];

const FINITESETS_OPS: &[OpDef] = &[("IsFiniteSet", 1), ("Cardinality", 1)];

const BAGS_OPS: &[OpDef] = &[
    ("IsABag", 1),
    ("BagToSet", 1),
    ("SetToBag", 1),
    ("BagIn", 2),
    ("EmptyBag", 0),
    ("CopiesIn", 2),
    ("(+)", 2),
    ("(-)", 2),
    ("BagUnion", 1),
    ("\\sqsubseteq", 2),
    ("SubBag", 1),
    ("BagOfAll", 2),
    ("BagCardinality", 1),
];

const TLC_OPS: &[OpDef] = &[
    ("Print", 2),
    ("PrintT", 1),
    ("Assert", 2),
    ("JavaTime", 0),
    ("TLCGet", 1),
    ("TLCSet", 2),
    (":>", 2),
    ("@@", 2),
    ("Permutations", 1),
    ("SortSeq", 2),
    ("RandomElement", 1),
    ("Any", 0),
    ("ToString", 1),
    ("TLCEval", 1),
];

const TLAPS_OPS: &[OpDef] = &[
    ("SMT", 0),
    ("Zenon", 0),
    ("Isa", 0),
    ("Auto", 0),
    ("Blast", 0),
    ("PTL", 0),
    ("SimpleArithmetic", 0),
    ("SMTT", 1),
    ("ZenonT", 1),
    ("IsaT", 1),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterKind {
    Constant,
    Variable,
}

/// A formal parameter of a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub name: String,
    pub arity: usize,
    pub kind: ParameterKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Definition {
    pub name: String,
    pub arity: usize,
}

impl Definition {
    /// The name the definition is imported under. Symbolic names take the
    /// canonical spelling an operator application resolves through, so
    /// `\oplus` and `(+)` import as the same name.
    pub fn scope_name(&self) -> String {
        let name = self.name.as_str();
        if name.starts_with(|c: char| c.is_alphanumeric() || c == '_') || name == "-." {
            return name.to_string();
        }
        match self.arity {
            2 => canonical_symbol(name, Fixity::Infix),
            1 => {
                let prefix = canonical_symbol(name, Fixity::Prefix);
                if prefix != name {
                    prefix
                } else {
                    canonical_symbol(name, Fixity::Postfix)
                }
            }
            _ => name.to_string(),
        }
    }
}

/// What a module exports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInterface {
    pub name: String,
    /// Modules whose exports this module re-exports.
    pub extends: Vec<String>,
    pub parameters: Vec<Parameter>,
    pub definitions: Vec<Definition>,
    /// Operator symbols this module defines, with their precedence.
    pub operators: Vec<OperatorDecl>,
}

impl ModuleInterface {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            extends: Vec::new(),
            parameters: Vec::new(),
            definitions: Vec::new(),
            operators: Vec::new(),
        }
    }

    pub fn with_definition(mut self, name: impl Into<String>, arity: usize) -> Self {
        self.definitions.push(Definition {
            name: name.into(),
            arity,
        });
        self
    }

    pub fn with_parameter(mut self, name: impl Into<String>, kind: ParameterKind) -> Self {
        self.parameters.push(Parameter {
            name: name.into(),
            arity: 0,
            kind,
        });
        self
    }

    /// True if `name` is a definition (not a parameter) of this module.
    pub fn defines(&self, name: &str) -> bool {
        self.definitions
            .iter()
            .any(|d| d.name == name || d.scope_name() == name)
    }

    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Build the interface of a parsed module.
    pub fn of_module(module: &Module) -> Self {
        let mut iface = ModuleInterface::new(module.name.name.clone());
        iface.extends = module.extends.iter().map(|e| e.name.clone()).collect();

        for unit in &module.units {
            match unit {
                Unit::Constant { decls, .. } | Unit::Variable { decls, .. } => {
                    let kind = if matches!(unit, Unit::Constant { .. }) {
                        ParameterKind::Constant
                    } else {
                        ParameterKind::Variable
                    };
                    for d in decls {
                        iface.parameters.push(Parameter {
                            name: d.name.name.clone(),
                            arity: d.arity,
                            kind,
                        });
                    }
                }
                Unit::Operator(def) if !def.local => {
                    let name = match &def.operator {
                        Some(op) => scope_symbol(&op.symbol, op.fixity),
                        None => def.name.name.clone(),
                    };
                    iface.definitions.push(Definition {
                        name,
                        arity: def.params.len(),
                    });
                    iface.operators.extend(def.operator.clone());
                }
                Unit::Instance(inst) if !inst.local => {
                    if let Some(name) = &inst.name {
                        iface.definitions.push(Definition {
                            name: name.name.clone(),
                            arity: inst.params.len(),
                        });
                    }
                }
                Unit::Theorem(thm) => {
                    if let Some(name) = &thm.name {
                        iface.definitions.push(Definition {
                            name: name.name.clone(),
                            arity: 0,
                        });
                    }
                }
                Unit::Assumption {
                    name: Some(name), ..
                } => {
                    iface.definitions.push(Definition {
                        name: name.name.clone(),
                        arity: 0,
                    });
                }
                _ => {}
            }
        }
        iface
    }
}

/// Get the interface of a standard module.
pub fn standard_interface(name: &str) -> Option<ModuleInterface> {
    let (ops, extends): (&[OpDef], &[&str]) = match name {
        "Naturals" => (NATURALS_OPS, &[]),
        "Integers" => (INTEGERS_OPS, &["Naturals"]),
        "Reals" => (REALS_OPS, &["Integers"]),
        "Sequences" => (SEQUENCES_OPS, &[]),
        "FiniteSets" => (FINITESETS_OPS, &[]),
        "Bags" => (BAGS_OPS, &[]),
        "TLC" => (TLC_OPS, &[]),
        "TLAPS" => (TLAPS_OPS, &[]),
        _ => return None,
    };
    let mut iface = ModuleInterface::new(name);
    iface.extends = extends.iter().map(|s| s.to_string()).collect();
    for &(op, arity) in ops {
        iface = iface.with_definition(op, arity);
        // Catalogued symbols need a table entry in the importing module.
        if op.starts_with('(') || op.starts_with("\\") {
            if let Some((precedence, assoc)) = standard_entry(op, Fixity::Infix) {
                iface
                    .operators
                    .push(OperatorDecl::infix(op, precedence, assoc));
            }
        }
    }
    Some(iface)
}

/// Interfaces available to EXTENDS and INSTANCE.
#[derive(Debug, Clone, Default)]
pub struct ModuleEnv {
    modules: HashMap<String, ModuleInterface>,
}

impl ModuleEnv {
    /// An empty environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// An environment holding the standard modules.
    pub fn standard() -> Self {
        let mut env = Self::new();
        for name in STANDARD_MODULES {
            if let Some(iface) = standard_interface(name) {
                env.insert(iface);
            }
        }
        env
    }

    pub fn insert(&mut self, iface: ModuleInterface) {
        self.modules.insert(iface.name.clone(), iface);
    }

    pub fn get(&self, name: &str) -> Option<&ModuleInterface> {
        self.modules.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}
