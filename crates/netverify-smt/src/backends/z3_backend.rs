use std::collections::HashMap;

use thiserror::Error;
use z3::SatResult as Z3SatResult;

use crate::solver::{Model, ModelValue, SatResult, SmtSolver};
use crate::sorts::SmtSort;
use crate::terms::SmtTerm;

#[derive(Debug, Error)]
pub enum Z3Error {
    #[error("z3: {0}")]
    Internal(String),
    #[error("variable {0} was never declared")]
    UnknownVariable(String),
    #[error("sort mismatch: {0}")]
    SortMismatch(String),
}

/// Z3 behind the [`SmtSolver`] interface. Variables must be declared
/// before any term mentioning them is asserted.
pub struct Z3Solver {
    solver: z3::Solver,
    int_vars: HashMap<String, z3::ast::Int>,
    bool_vars: HashMap<String, z3::ast::Bool>,
    // Kept so a reset can reapply them.
    params: Option<z3::Params>,
}

impl Z3Solver {
    pub fn new() -> Self {
        Z3Solver {
            solver: z3::Solver::new(),
            int_vars: HashMap::new(),
            bool_vars: HashMap::new(),
            params: None,
        }
    }

    /// A solver whose checks give up after `timeout_secs` and report
    /// `SatResult::Unknown`. Zero disables the timeout.
    pub fn with_timeout_secs(timeout_secs: u64) -> Self {
        let mut backend = Self::new();
        if timeout_secs > 0 {
            let mut params = z3::Params::new();
            let millis = u32::try_from(timeout_secs.saturating_mul(1000)).unwrap_or(u32::MAX);
            params.set_u32("timeout", millis);
            backend.solver.set_params(&params);
            backend.params = Some(params);
        }
        backend
    }

    pub fn num_declared(&self) -> usize {
        self.int_vars.len() + self.bool_vars.len()
    }

    /// Lower an engine term to a Z3 AST, checking sorts on the way.
    fn lower(&self, term: &SmtTerm) -> Result<Lowered, Z3Error> {
        use z3::ast::{Bool, Int};
        let lowered = match term {
            SmtTerm::Var(name) => match (self.int_vars.get(name), self.bool_vars.get(name)) {
                (Some(i), _) => Lowered::Int(i.clone()),
                (None, Some(b)) => Lowered::Bool(b.clone()),
                (None, None) => return Err(Z3Error::UnknownVariable(name.clone())),
            },
            SmtTerm::IntLit(n) => Lowered::Int(Int::from_i64(*n)),
            SmtTerm::BoolLit(b) => Lowered::Bool(Bool::from_bool(*b)),
            SmtTerm::Add(l, r) => self.arith(l, r, |a, b| a + b)?,
            SmtTerm::Sub(l, r) => self.arith(l, r, |a, b| a - b)?,
            SmtTerm::Mul(l, r) => self.arith(l, r, |a, b| a * b)?,
            SmtTerm::Lt(l, r) => self.compare(l, r, |a, b| a.lt(b))?,
            SmtTerm::Le(l, r) => self.compare(l, r, |a, b| a.le(b))?,
            SmtTerm::Gt(l, r) => self.compare(l, r, |a, b| a.gt(b))?,
            SmtTerm::Ge(l, r) => self.compare(l, r, |a, b| a.ge(b))?,
            SmtTerm::Eq(l, r) => match (self.lower(l)?, self.lower(r)?) {
                (Lowered::Int(a), Lowered::Int(b)) => Lowered::Bool(a.eq(&b)),
                (Lowered::Bool(a), Lowered::Bool(b)) => Lowered::Bool(a.eq(&b)),
                _ => return Err(Z3Error::SortMismatch(format!("{l:?} = {r:?}"))),
            },
            SmtTerm::And(terms) => {
                let conjuncts = self.lower_all(terms)?;
                Lowered::Bool(Bool::and(&conjuncts.iter().collect::<Vec<_>>()))
            }
            SmtTerm::Or(terms) => {
                let disjuncts = self.lower_all(terms)?;
                Lowered::Bool(Bool::or(&disjuncts.iter().collect::<Vec<_>>()))
            }
            SmtTerm::Not(inner) => Lowered::Bool(self.lower(inner)?.bool()?.not()),
            SmtTerm::Implies(l, r) => {
                let premise = self.lower(l)?.bool()?;
                Lowered::Bool(premise.implies(&self.lower(r)?.bool()?))
            }
            SmtTerm::Ite(guard, then, els) => {
                let guard = self.lower(guard)?.bool()?;
                match (self.lower(then)?, self.lower(els)?) {
                    (Lowered::Int(a), Lowered::Int(b)) => Lowered::Int(guard.ite(&a, &b)),
                    (Lowered::Bool(a), Lowered::Bool(b)) => Lowered::Bool(guard.ite(&a, &b)),
                    _ => {
                        return Err(Z3Error::SortMismatch(format!(
                            "ite branches {then:?} / {els:?}"
                        )))
                    }
                }
            }
            SmtTerm::ForAll(..) | SmtTerm::Exists(..) => {
                return Err(Z3Error::Internal(
                    "quantified terms cannot appear in a network encoding".into(),
                ))
            }
        };
        Ok(lowered)
    }

    fn arith(
        &self,
        l: &SmtTerm,
        r: &SmtTerm,
        op: impl Fn(&z3::ast::Int, &z3::ast::Int) -> z3::ast::Int,
    ) -> Result<Lowered, Z3Error> {
        let (a, b) = (self.lower(l)?.int()?, self.lower(r)?.int()?);
        Ok(Lowered::Int(op(&a, &b)))
    }

    fn compare(
        &self,
        l: &SmtTerm,
        r: &SmtTerm,
        op: impl Fn(&z3::ast::Int, &z3::ast::Int) -> z3::ast::Bool,
    ) -> Result<Lowered, Z3Error> {
        let (a, b) = (self.lower(l)?.int()?, self.lower(r)?.int()?);
        Ok(Lowered::Bool(op(&a, &b)))
    }

    fn lower_all(&self, terms: &[SmtTerm]) -> Result<Vec<z3::ast::Bool>, Z3Error> {
        terms.iter().map(|t| self.lower(t)?.bool()).collect()
    }

    fn status(result: Z3SatResult) -> SatResult {
        match result {
            Z3SatResult::Sat => SatResult::Sat,
            Z3SatResult::Unsat => SatResult::Unsat,
            Z3SatResult::Unknown => {
                SatResult::Unknown("Z3 gave up (timeout or incomplete theory)".into())
            }
        }
    }

    fn read_value(&self, model: &z3::Model, name: &str, sort: &SmtSort) -> Result<Option<ModelValue>, Z3Error> {
        let missing = || Z3Error::UnknownVariable(name.to_string());
        Ok(match sort {
            SmtSort::Int => {
                let v = self.int_vars.get(name).ok_or_else(missing)?;
                model.eval(v, true).and_then(|n| n.as_i64()).map(ModelValue::Int)
            }
            SmtSort::Bool => {
                let v = self.bool_vars.get(name).ok_or_else(missing)?;
                model.eval(v, true).and_then(|b| b.as_bool()).map(ModelValue::Bool)
            }
        })
    }
}

/// A lowered term tagged with its sort.
enum Lowered {
    Int(z3::ast::Int),
    Bool(z3::ast::Bool),
}

impl Lowered {
    fn int(self) -> Result<z3::ast::Int, Z3Error> {
        match self {
            Lowered::Int(i) => Ok(i),
            Lowered::Bool(_) => Err(Z3Error::SortMismatch("boolean used as integer".into())),
        }
    }

    fn bool(self) -> Result<z3::ast::Bool, Z3Error> {
        match self {
            Lowered::Bool(b) => Ok(b),
            Lowered::Int(_) => Err(Z3Error::SortMismatch("integer used as boolean".into())),
        }
    }
}

impl Default for Z3Solver {
    fn default() -> Self {
        Self::new()
    }
}

impl SmtSolver for Z3Solver {
    type Error = Z3Error;

    fn declare_var(&mut self, name: &str, sort: &SmtSort) -> Result<(), Z3Error> {
        let clash = match sort {
            SmtSort::Int => self.bool_vars.contains_key(name),
            SmtSort::Bool => self.int_vars.contains_key(name),
        };
        if clash {
            return Err(Z3Error::SortMismatch(name.to_string()));
        }
        match sort {
            SmtSort::Int => {
                self.int_vars
                    .entry(name.to_string())
                    .or_insert_with(|| z3::ast::Int::new_const(name));
            }
            SmtSort::Bool => {
                self.bool_vars
                    .entry(name.to_string())
                    .or_insert_with(|| z3::ast::Bool::new_const(name));
            }
        }
        Ok(())
    }

    fn assert(&mut self, term: &SmtTerm) -> Result<(), Z3Error> {
        let lowered = self.lower(term)?.bool()?;
        self.solver.assert(&lowered);
        Ok(())
    }

    fn push(&mut self) -> Result<(), Z3Error> {
        self.solver.push();
        Ok(())
    }

    fn pop(&mut self) -> Result<(), Z3Error> {
        self.solver.pop(1);
        Ok(())
    }

    fn check_sat(&mut self) -> Result<SatResult, Z3Error> {
        Ok(Self::status(self.solver.check()))
    }

    fn check_sat_with_model(
        &mut self,
        var_names: &[(&str, &SmtSort)],
    ) -> Result<(SatResult, Option<Model>), Z3Error> {
        let status = self.solver.check();
        if status != Z3SatResult::Sat {
            return Ok((Self::status(status), None));
        }
        let z3_model = self
            .solver
            .get_model()
            .ok_or_else(|| Z3Error::Internal("satisfiable check produced no model".into()))?;
        let mut values = HashMap::with_capacity(var_names.len());
        for &(name, sort) in var_names {
            if let Some(v) = self.read_value(&z3_model, name, sort)? {
                values.insert(name.to_string(), v);
            }
        }
        Ok((SatResult::Sat, Some(Model { values })))
    }

    fn reset(&mut self) -> Result<(), Z3Error> {
        self.solver.reset();
        // Z3 drops per-solver parameters on reset.
        if let Some(params) = &self.params {
            self.solver.set_params(params);
        }
        self.int_vars.clear();
        self.bool_vars.clear();
        Ok(())
    }
}
