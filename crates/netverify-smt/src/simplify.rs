//! Local constant folding over `SmtTerm`.
//!
//! The rewrite is bottom-up and purely syntactic: it never consults a solver,
//! and every rule preserves the meaning of the term under all assignments.

use crate::terms::SmtTerm;

impl SmtTerm {
    /// Fold literal subterms and trivial identities.
    pub fn simplify(self) -> SmtTerm {
        match self {
            SmtTerm::Var(_) | SmtTerm::IntLit(_) | SmtTerm::BoolLit(_) => self,
            SmtTerm::Add(l, r) => fold_arith(l.simplify(), r.simplify(), ArithOp::Add),
            SmtTerm::Sub(l, r) => fold_arith(l.simplify(), r.simplify(), ArithOp::Sub),
            SmtTerm::Mul(l, r) => fold_arith(l.simplify(), r.simplify(), ArithOp::Mul),
            SmtTerm::Eq(l, r) => fold_eq(l.simplify(), r.simplify()),
            SmtTerm::Lt(l, r) => fold_cmp(l.simplify(), r.simplify(), CmpOp::Lt),
            SmtTerm::Le(l, r) => fold_cmp(l.simplify(), r.simplify(), CmpOp::Le),
            SmtTerm::Gt(l, r) => fold_cmp(l.simplify(), r.simplify(), CmpOp::Gt),
            SmtTerm::Ge(l, r) => fold_cmp(l.simplify(), r.simplify(), CmpOp::Ge),
            SmtTerm::And(ts) => fold_and(ts),
            SmtTerm::Or(ts) => fold_or(ts),
            SmtTerm::Not(t) => fold_not(t.simplify()),
            SmtTerm::Implies(l, r) => {
                let l = l.simplify();
                let r = r.simplify();
                match (l.as_bool_lit(), r.as_bool_lit()) {
                    (Some(false), _) | (_, Some(true)) => SmtTerm::tt(),
                    (Some(true), _) => r,
                    (_, Some(false)) => fold_not(l),
                    _ if l == r => SmtTerm::tt(),
                    _ => l.implies(r),
                }
            }
            SmtTerm::ForAll(bound, body) => SmtTerm::ForAll(bound, Box::new(body.simplify())),
            SmtTerm::Exists(bound, body) => SmtTerm::Exists(bound, Box::new(body.simplify())),
            SmtTerm::Ite(c, t, e) => fold_ite(c.simplify(), t.simplify(), e.simplify()),
        }
    }
}

#[derive(Clone, Copy)]
enum ArithOp {
    Add,
    Sub,
    Mul,
}

#[derive(Clone, Copy)]
enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
}

fn fold_arith(l: SmtTerm, r: SmtTerm, op: ArithOp) -> SmtTerm {
    if let (Some(a), Some(b)) = (l.as_int_lit(), r.as_int_lit()) {
        let folded = match op {
            ArithOp::Add => a.checked_add(b),
            ArithOp::Sub => a.checked_sub(b),
            ArithOp::Mul => a.checked_mul(b),
        };
        if let Some(n) = folded {
            return SmtTerm::int(n);
        }
    }
    match op {
        ArithOp::Add if r.as_int_lit() == Some(0) => l,
        ArithOp::Add if l.as_int_lit() == Some(0) => r,
        ArithOp::Sub if r.as_int_lit() == Some(0) => l,
        ArithOp::Mul if r.as_int_lit() == Some(1) => l,
        ArithOp::Mul if l.as_int_lit() == Some(1) => r,
        ArithOp::Add => l.add(r),
        ArithOp::Sub => l.sub(r),
        ArithOp::Mul => l.mul(r),
    }
}

fn fold_eq(l: SmtTerm, r: SmtTerm) -> SmtTerm {
    if l == r {
        return SmtTerm::tt();
    }
    match (&l, &r) {
        (SmtTerm::IntLit(a), SmtTerm::IntLit(b)) => SmtTerm::bool(a == b),
        (SmtTerm::BoolLit(a), SmtTerm::BoolLit(b)) => SmtTerm::bool(a == b),
        (SmtTerm::BoolLit(true), _) => r,
        (_, SmtTerm::BoolLit(true)) => l,
        (SmtTerm::BoolLit(false), _) => fold_not(r),
        (_, SmtTerm::BoolLit(false)) => fold_not(l),
        _ => l.eq(r),
    }
}

fn fold_cmp(l: SmtTerm, r: SmtTerm, op: CmpOp) -> SmtTerm {
    if let (Some(a), Some(b)) = (l.as_int_lit(), r.as_int_lit()) {
        return SmtTerm::bool(match op {
            CmpOp::Lt => a < b,
            CmpOp::Le => a <= b,
            CmpOp::Gt => a > b,
            CmpOp::Ge => a >= b,
        });
    }
    if l == r {
        return SmtTerm::bool(matches!(op, CmpOp::Le | CmpOp::Ge));
    }
    match op {
        CmpOp::Lt => l.lt(r),
        CmpOp::Le => l.le(r),
        CmpOp::Gt => l.gt(r),
        CmpOp::Ge => l.ge(r),
    }
}

fn fold_not(t: SmtTerm) -> SmtTerm {
    match t {
        SmtTerm::BoolLit(b) => SmtTerm::bool(!b),
        SmtTerm::Not(inner) => *inner,
        other => other.not(),
    }
}

fn fold_and(ts: Vec<SmtTerm>) -> SmtTerm {
    let mut out: Vec<SmtTerm> = Vec::with_capacity(ts.len());
    for t in ts {
        match t.simplify() {
            SmtTerm::BoolLit(true) => {}
            SmtTerm::BoolLit(false) => return SmtTerm::ff(),
            SmtTerm::And(inner) => {
                for i in inner {
                    if !out.contains(&i) {
                        out.push(i);
                    }
                }
            }
            other => {
                if !out.contains(&other) {
                    out.push(other);
                }
            }
        }
    }
    match out.len() {
        0 => SmtTerm::tt(),
        1 => out.pop().unwrap_or_else(SmtTerm::tt),
        _ => SmtTerm::And(out),
    }
}

fn fold_or(ts: Vec<SmtTerm>) -> SmtTerm {
    let mut out: Vec<SmtTerm> = Vec::with_capacity(ts.len());
    for t in ts {
        match t.simplify() {
            SmtTerm::BoolLit(false) => {}
            SmtTerm::BoolLit(true) => return SmtTerm::tt(),
            SmtTerm::Or(inner) => {
                for i in inner {
                    if !out.contains(&i) {
                        out.push(i);
                    }
                }
            }
            other => {
                if !out.contains(&other) {
                    out.push(other);
                }
            }
        }
    }
    match out.len() {
        0 => SmtTerm::ff(),
        1 => out.pop().unwrap_or_else(SmtTerm::ff),
        _ => SmtTerm::Or(out),
    }
}

fn fold_ite(c: SmtTerm, t: SmtTerm, e: SmtTerm) -> SmtTerm {
    match c.as_bool_lit() {
        Some(true) => return t,
        Some(false) => return e,
        None => {}
    }
    if t == e {
        return t;
    }
    match (t.as_bool_lit(), e.as_bool_lit()) {
        (Some(true), Some(false)) => c,
        (Some(false), Some(true)) => fold_not(c),
        (Some(true), None) => fold_or(vec![c, e]),
        (Some(false), None) => fold_and(vec![fold_not(c), e]),
        (None, Some(false)) => fold_and(vec![c, t]),
        (None, Some(true)) => fold_or(vec![fold_not(c), t]),
        _ => SmtTerm::ite(c, t, e),
    }
}
