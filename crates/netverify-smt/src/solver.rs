use std::collections::HashMap;

use crate::sorts::SmtSort;
use crate::terms::SmtTerm;

/// Outcome of one check. `Unknown` carries the reason the solver gave.
#[derive(Debug, Clone, PartialEq)]
pub enum SatResult {
    Sat,
    Unsat,
    Unknown(String),
}

/// Variable assignments read back after a satisfiable check.
#[derive(Debug, Clone, Default)]
pub struct Model {
    pub values: HashMap<String, ModelValue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelValue {
    Int(i64),
    Bool(bool),
}

impl std::fmt::Display for ModelValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelValue::Int(n) => write!(f, "{n}"),
            ModelValue::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl Model {
    pub fn get_int(&self, name: &str) -> Option<i64> {
        match self.values.get(name) {
            Some(ModelValue::Int(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        match self.values.get(name) {
            Some(ModelValue::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    /// Evaluate a ground-after-substitution term against this model.
    ///
    /// Variables missing from the model evaluate to `None`, as do quantifiers.
    pub fn eval(&self, term: &SmtTerm) -> Option<ModelValue> {
        use ModelValue::{Bool, Int};
        let int = |t: &SmtTerm| match self.eval(t) {
            Some(Int(n)) => Some(n),
            _ => None,
        };
        let boolean = |t: &SmtTerm| match self.eval(t) {
            Some(Bool(b)) => Some(b),
            _ => None,
        };
        match term {
            SmtTerm::Var(name) => self.values.get(name).copied(),
            SmtTerm::IntLit(n) => Some(Int(*n)),
            SmtTerm::BoolLit(b) => Some(Bool(*b)),
            SmtTerm::Add(l, r) => Some(Int(int(l)?.checked_add(int(r)?)?)),
            SmtTerm::Sub(l, r) => Some(Int(int(l)?.checked_sub(int(r)?)?)),
            SmtTerm::Mul(l, r) => Some(Int(int(l)?.checked_mul(int(r)?)?)),
            SmtTerm::Eq(l, r) => Some(Bool(self.eval(l)? == self.eval(r)?)),
            SmtTerm::Lt(l, r) => Some(Bool(int(l)? < int(r)?)),
            SmtTerm::Le(l, r) => Some(Bool(int(l)? <= int(r)?)),
            SmtTerm::Gt(l, r) => Some(Bool(int(l)? > int(r)?)),
            SmtTerm::Ge(l, r) => Some(Bool(int(l)? >= int(r)?)),
            SmtTerm::And(ts) => {
                let mut acc = true;
                for t in ts {
                    acc &= boolean(t)?;
                }
                Some(Bool(acc))
            }
            SmtTerm::Or(ts) => {
                let mut acc = false;
                for t in ts {
                    acc |= boolean(t)?;
                }
                Some(Bool(acc))
            }
            SmtTerm::Not(t) => Some(Bool(!boolean(t)?)),
            SmtTerm::Implies(l, r) => Some(Bool(!boolean(l)? || boolean(r)?)),
            SmtTerm::Ite(c, t, e) => {
                if boolean(c)? {
                    self.eval(t)
                } else {
                    self.eval(e)
                }
            }
            SmtTerm::ForAll(_, _) | SmtTerm::Exists(_, _) => None,
        }
    }
}

/// The operations the encoder needs from a solver: declare, assert,
/// check, read a model. Scopes and reset are used by the minimization
/// loop and by tests.
pub trait SmtSolver {
    type Error: std::error::Error;

    fn declare_var(&mut self, name: &str, sort: &SmtSort) -> Result<(), Self::Error>;

    fn assert(&mut self, term: &SmtTerm) -> Result<(), Self::Error>;

    fn push(&mut self) -> Result<(), Self::Error>;

    fn pop(&mut self) -> Result<(), Self::Error>;

    fn check_sat(&mut self) -> Result<SatResult, Self::Error>;

    /// Like [`SmtSolver::check_sat`], and on `Sat` also read back the
    /// listed variables. Variables the solver left unconstrained get
    /// their completed value.
    fn check_sat_with_model(
        &mut self,
        var_names: &[(&str, &SmtSort)],
    ) -> Result<(SatResult, Option<Model>), Self::Error>;

    /// Drop every declaration and assertion.
    fn reset(&mut self) -> Result<(), Self::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io;

    /// Records assertions and answers every check with a fixed status.
    #[derive(Default)]
    struct Recorder {
        status: Option<SatResult>,
        log: Vec<SmtTerm>,
        depth: usize,
    }

    impl SmtSolver for Recorder {
        type Error = io::Error;

        fn declare_var(&mut self, _: &str, _: &SmtSort) -> io::Result<()> {
            Ok(())
        }

        fn assert(&mut self, term: &SmtTerm) -> io::Result<()> {
            self.log.push(term.clone());
            Ok(())
        }

        fn push(&mut self) -> io::Result<()> {
            self.depth += 1;
            Ok(())
        }

        fn pop(&mut self) -> io::Result<()> {
            self.depth = self
                .depth
                .checked_sub(1)
                .ok_or_else(|| io::Error::other("pop without push"))?;
            Ok(())
        }

        fn check_sat(&mut self) -> io::Result<SatResult> {
            self.status
                .clone()
                .ok_or_else(|| io::Error::other("no status configured"))
        }

        fn check_sat_with_model(&mut self, _: &[(&str, &SmtSort)]) -> io::Result<(SatResult, Option<Model>)> {
            Ok((self.check_sat()?, None))
        }

        fn reset(&mut self) -> io::Result<()> {
            self.log.clear();
            self.depth = 0;
            Ok(())
        }
    }

    #[test]
    fn model_getters_return_typed_values_only() {
        let mut values = HashMap::new();
        values.insert("x".to_string(), ModelValue::Int(42));
        values.insert("flag".to_string(), ModelValue::Bool(true));
        let model = Model { values };

        assert_eq!(model.get_int("x"), Some(42));
        assert_eq!(model.get_bool("flag"), Some(true));
        assert_eq!(model.get_int("flag"), None);
        assert_eq!(model.get_bool("x"), None);
        assert_eq!(model.get_int("missing"), None);
    }

    #[test]
    fn model_evaluates_compound_terms() {
        let mut values = HashMap::new();
        values.insert("x".to_string(), ModelValue::Int(7));
        values.insert("b".to_string(), ModelValue::Bool(false));
        let model = Model { values };

        let t = SmtTerm::ite(
            SmtTerm::var("b"),
            SmtTerm::int(0),
            SmtTerm::var("x").add(SmtTerm::int(1)),
        );
        assert_eq!(model.eval(&t), Some(ModelValue::Int(8)));
        let t = SmtTerm::and(vec![SmtTerm::var("b").not(), SmtTerm::var("x").ge(SmtTerm::int(7))]);
        assert_eq!(model.eval(&t), Some(ModelValue::Bool(true)));
        assert_eq!(model.eval(&SmtTerm::var("y")), None);
    }

    #[test]
    fn scoped_assertions_are_recorded() -> Result<(), Box<dyn std::error::Error>> {
        let mut solver = Recorder {
            status: Some(SatResult::Unknown("timeout".to_string())),
            ..Recorder::default()
        };
        solver.push()?;
        solver.assert(&SmtTerm::tt())?;
        assert_eq!(solver.log.len(), 1);
        assert_eq!(solver.check_sat()?, SatResult::Unknown("timeout".to_string()));
        solver.pop()?;
        assert!(solver.pop().is_err());
        solver.reset()?;
        assert!(solver.log.is_empty());
        Ok(())
    }
}
