//! Read-only traversal of routing-policy ASTs.

use std::collections::BTreeSet;

use netverify_config::{BooleanExpr, Configuration, Statement};

/// Walks statements and expressions depth first, descending into `If`
/// branches and into policies reached through `CallExpr` and
/// `SetDefaultPolicy`. Each named policy is entered at most once per walk.
pub(crate) struct AstVisitor<'c> {
    conf: &'c Configuration,
    entered: BTreeSet<&'c str>,
}

impl<'c> AstVisitor<'c> {
    pub(crate) fn new(conf: &'c Configuration) -> Self {
        AstVisitor {
            conf,
            entered: BTreeSet::new(),
        }
    }

    pub(crate) fn visit(
        &mut self,
        statements: &'c [Statement],
        on_stmt: &mut dyn FnMut(&'c Statement),
        on_expr: &mut dyn FnMut(&'c BooleanExpr),
    ) {
        for stmt in statements {
            on_stmt(stmt);
            match stmt {
                Statement::If {
                    guard,
                    true_statements,
                    false_statements,
                } => {
                    self.visit_expr(guard, on_stmt, on_expr);
                    self.visit(true_statements, on_stmt, on_expr);
                    self.visit(false_statements, on_stmt, on_expr);
                }
                Statement::SetDefaultPolicy(name) => self.visit_policy(name, on_stmt, on_expr),
                _ => {}
            }
        }
    }

    fn visit_expr(
        &mut self,
        expr: &'c BooleanExpr,
        on_stmt: &mut dyn FnMut(&'c Statement),
        on_expr: &mut dyn FnMut(&'c BooleanExpr),
    ) {
        on_expr(expr);
        match expr {
            BooleanExpr::Conjunction(es)
            | BooleanExpr::Disjunction(es)
            | BooleanExpr::ConjunctionChain(es)
            | BooleanExpr::FirstMatchChain(es) => {
                for e in es {
                    self.visit_expr(e, on_stmt, on_expr);
                }
            }
            BooleanExpr::Not(e) | BooleanExpr::WithEnvironmentExpr(e) => {
                self.visit_expr(e, on_stmt, on_expr)
            }
            BooleanExpr::CallExpr(name) => self.visit_policy(name, on_stmt, on_expr),
            _ => {}
        }
    }

    fn visit_policy(
        &mut self,
        name: &'c str,
        on_stmt: &mut dyn FnMut(&'c Statement),
        on_expr: &mut dyn FnMut(&'c BooleanExpr),
    ) {
        if !self.entered.insert(name) {
            return;
        }
        if let Some(pol) = self.conf.routing_policies.get(name) {
            self.visit(&pol.statements, on_stmt, on_expr);
        }
    }
}

/// True when some statement reachable from `statements` satisfies `pred`.
pub(crate) fn any_statement<'c>(
    conf: &'c Configuration,
    statements: &'c [Statement],
    mut pred: impl FnMut(&Statement) -> bool,
) -> bool {
    let mut found = false;
    AstVisitor::new(conf).visit(statements, &mut |s| found |= pred(s), &mut |_| {});
    found
}

/// True when some policy of `conf` contains a statement satisfying `pred`.
pub(crate) fn any_policy_statement(
    conf: &Configuration,
    mut pred: impl FnMut(&Statement) -> bool,
) -> bool {
    conf.routing_policies
        .values()
        .any(|pol| any_statement(conf, &pol.statements, &mut pred))
}
