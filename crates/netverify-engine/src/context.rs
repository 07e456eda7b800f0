//! The variable registry and assertion set shared by every slice of one
//! or more encoders.

use std::collections::HashSet;

use indexmap::IndexMap;
use netverify_smt::solver::SmtSolver;
use netverify_smt::sorts::SmtSort;
use netverify_smt::terms::SmtTerm;
use tracing::debug;

/// Owns all solver-visible state produced while encoding a query.
///
/// Constraint builders borrow it mutably; nothing else holds solver state.
/// A second encoder that must share the namespace of the first (for
/// equivalence checks) is built against the same context.
#[derive(Debug, Default)]
pub struct EncodingContext {
    variables: IndexMap<String, SmtSort>,
    assertions: Vec<SmtTerm>,
    assertion_keys: HashSet<SmtTerm>,
    assertion_candidates: usize,
    assertion_dedup_hits: usize,
    ssa_counter: usize,
}

impl EncodingContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a variable and return a reference to it. Declaring the
    /// same name twice is a no-op.
    pub fn declare(&mut self, name: impl Into<String>, sort: SmtSort) -> SmtTerm {
        let name = name.into();
        self.variables.entry(name.clone()).or_insert(sort);
        SmtTerm::Var(name)
    }

    pub fn declare_int(&mut self, name: impl Into<String>) -> SmtTerm {
        self.declare(name, SmtSort::Int)
    }

    pub fn declare_bool(&mut self, name: impl Into<String>) -> SmtTerm {
        self.declare(name, SmtSort::Bool)
    }

    /// Assert a constraint. Trivially true and already asserted terms are
    /// dropped.
    pub fn add(&mut self, term: SmtTerm) {
        self.assertion_candidates = self.assertion_candidates.saturating_add(1);
        let term = term.simplify();
        if term.is_true() {
            return;
        }
        if self.assertion_keys.insert(term.clone()) {
            self.assertions.push(term);
        } else {
            self.assertion_dedup_hits = self.assertion_dedup_hits.saturating_add(1);
        }
    }

    /// Bind `value` to a fresh `SSA_<field><n>` variable and return the
    /// variable.
    pub fn fresh_ssa(&mut self, field: &str, sort: SmtSort, value: SmtTerm) -> SmtTerm {
        let name = format!("SSA_{field}{}", self.ssa_counter);
        self.ssa_counter += 1;
        let var = self.declare(name, sort);
        self.add(var.clone().eq(value));
        var
    }

    pub fn variables(&self) -> &IndexMap<String, SmtSort> {
        &self.variables
    }

    pub fn sort_of(&self, name: &str) -> Option<SmtSort> {
        self.variables.get(name).copied()
    }

    pub fn assertions(&self) -> &[SmtTerm] {
        &self.assertions
    }

    pub fn assertion_candidates(&self) -> usize {
        self.assertion_candidates
    }

    pub fn assertion_dedup_hits(&self) -> usize {
        self.assertion_dedup_hits
    }

    /// Declare every variable and assert every constraint on `solver`.
    pub fn load_into<S: SmtSolver>(&self, solver: &mut S) -> Result<(), S::Error> {
        for (name, sort) in &self.variables {
            solver.declare_var(name, sort)?;
        }
        for term in &self.assertions {
            solver.assert(term)?;
        }
        debug!(
            variables = self.variables.len(),
            assertions = self.assertions.len(),
            dedup_hits = self.assertion_dedup_hits,
            "loaded encoding into solver"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redeclaring_keeps_one_entry() {
        let mut ctx = EncodingContext::new();
        let a = ctx.declare_int("x");
        let b = ctx.declare_int("x");
        assert_eq!(a, b);
        assert_eq!(ctx.variables().len(), 1);
    }

    #[test]
    fn duplicate_and_trivial_assertions_are_dropped() {
        let mut ctx = EncodingContext::new();
        let x = ctx.declare_int("x");
        ctx.add(x.clone().ge(SmtTerm::int(0)));
        ctx.add(x.clone().ge(SmtTerm::int(0)));
        ctx.add(SmtTerm::and(vec![SmtTerm::tt(), SmtTerm::tt()]));
        assert_eq!(ctx.assertions().len(), 1);
        assert_eq!(ctx.assertion_candidates(), 3);
        assert_eq!(ctx.assertion_dedup_hits(), 1);
    }

    #[test]
    fn ssa_variables_are_numbered_globally() {
        let mut ctx = EncodingContext::new();
        let a = ctx.fresh_ssa("METRIC", SmtSort::Int, SmtTerm::int(1));
        let b = ctx.fresh_ssa("METRIC", SmtSort::Int, SmtTerm::int(2));
        assert_eq!(a, SmtTerm::var("SSA_METRIC0"));
        assert_eq!(b, SmtTerm::var("SSA_METRIC1"));
        assert_eq!(ctx.sort_of("SSA_METRIC1"), Some(SmtSort::Int));
        assert_eq!(ctx.assertions().len(), 2);
    }
}
