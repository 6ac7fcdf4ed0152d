//! Parse configuration.

use crate::optable::OperatorDecl;

/// Configuration for one module parse.
#[derive(Debug, Clone)]
pub struct ParseConfig {
    /// Stop collecting after this many diagnostics (0 = unlimited).
    /// The module built so far is still returned.
    pub max_errors: usize,
    /// Continue past a failed unit. When false the first unit-level error
    /// ends the parse.
    pub recover: bool,
    /// User operators declared into the table before parsing starts.
    pub operators: Vec<OperatorDecl>,
    /// Make the standard modules (Naturals, Sequences, ...) available to
    /// EXTENDS and INSTANCE.
    pub standard_modules: bool,
}

impl Default for ParseConfig {
    fn default() -> Self {
        Self {
            max_errors: 100,
            recover: true,
            operators: Vec::new(),
            standard_modules: true,
        }
    }
}

impl ParseConfig {
    /// Whether `count` diagnostics have reached the configured limit.
    pub fn limit_reached(&self, count: usize) -> bool {
        self.max_errors != 0 && count >= self.max_errors
    }
}
