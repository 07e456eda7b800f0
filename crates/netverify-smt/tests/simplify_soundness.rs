//! Randomized check that `SmtTerm::simplify` preserves meaning: the original
//! and simplified terms must evaluate identically under every assignment, and
//! Z3 must agree that they are equivalent.

use std::collections::HashMap;

use netverify_smt::backends::z3_backend::Z3Solver;
use netverify_smt::solver::{Model, ModelValue, SatResult, SmtSolver};
use netverify_smt::sorts::SmtSort;
use netverify_smt::terms::SmtTerm;
use proptest::prelude::*;

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn int_term() -> impl Strategy<Value = SmtTerm> {
    let leaf = prop_oneof![
        (-4i64..5).prop_map(SmtTerm::int),
        Just(SmtTerm::var("x")),
        Just(SmtTerm::var("y")),
    ];
    leaf.prop_recursive(3, 16, 2, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone()).prop_map(|(a, b)| a.add(b)),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| a.sub(b)),
        ]
    })
}

fn bool_term() -> impl Strategy<Value = SmtTerm> {
    let leaf = prop_oneof![
        any::<bool>().prop_map(SmtTerm::bool),
        Just(SmtTerm::var("p")),
        Just(SmtTerm::var("q")),
        (int_term(), int_term()).prop_map(|(a, b)| a.le(b)),
        (int_term(), int_term()).prop_map(|(a, b)| a.eq(b)),
    ];
    leaf.prop_recursive(4, 32, 3, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..3).prop_map(SmtTerm::and),
            prop::collection::vec(inner.clone(), 0..3).prop_map(SmtTerm::or),
            inner.clone().prop_map(SmtTerm::not),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| a.implies(b)),
            (inner.clone(), inner.clone(), inner.clone())
                .prop_map(|(c, t, e)| SmtTerm::ite(c, t, e)),
            (inner.clone(), inner).prop_map(|(a, b)| a.eq(b)),
        ]
    })
}

fn model(x: i64, y: i64, p: bool, q: bool) -> Model {
    let mut values = HashMap::new();
    values.insert("x".into(), ModelValue::Int(x));
    values.insert("y".into(), ModelValue::Int(y));
    values.insert("p".into(), ModelValue::Bool(p));
    values.insert("q".into(), ModelValue::Bool(q));
    Model { values }
}

proptest! {
    #[test]
    fn simplify_preserves_evaluation(
        t in bool_term(),
        x in -3i64..4,
        y in -3i64..4,
        p in any::<bool>(),
        q in any::<bool>(),
    ) {
        let m = model(x, y, p, q);
        prop_assert_eq!(m.eval(&t), m.eval(&t.clone().simplify()));
    }

    #[test]
    fn simplify_never_grows_terms(t in bool_term()) {
        prop_assert!(t.clone().simplify().size() <= t.size());
    }
}

#[test]
fn z3_agrees_simplified_ite_chain_is_equivalent() -> TestResult {
    let original = SmtTerm::ite(
        SmtTerm::var("p"),
        SmtTerm::tt(),
        SmtTerm::ite(SmtTerm::ff(), SmtTerm::var("q"), SmtTerm::var("p").not()),
    );
    let simplified = original.clone().simplify();

    let mut solver = Z3Solver::new();
    solver.declare_var("p", &SmtSort::Bool)?;
    solver.declare_var("q", &SmtSort::Bool)?;
    solver.assert(&original.eq(simplified).not())?;
    assert_eq!(solver.check_sat()?, SatResult::Unsat);
    Ok(())
}
