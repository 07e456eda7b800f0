use crate::sorts::SmtSort;

/// A solver-independent term. Engine code builds these with the
/// constructor methods below and never touches a backend directly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SmtTerm {
    Var(String),
    IntLit(i64),
    BoolLit(bool),

    Add(Box<SmtTerm>, Box<SmtTerm>),
    Sub(Box<SmtTerm>, Box<SmtTerm>),
    Mul(Box<SmtTerm>, Box<SmtTerm>),

    Eq(Box<SmtTerm>, Box<SmtTerm>),
    Lt(Box<SmtTerm>, Box<SmtTerm>),
    Le(Box<SmtTerm>, Box<SmtTerm>),
    Gt(Box<SmtTerm>, Box<SmtTerm>),
    Ge(Box<SmtTerm>, Box<SmtTerm>),

    And(Vec<SmtTerm>),
    Or(Vec<SmtTerm>),
    Not(Box<SmtTerm>),
    Implies(Box<SmtTerm>, Box<SmtTerm>),

    /// Only printable; the Z3 backend rejects quantified terms.
    ForAll(Vec<(String, SmtSort)>, Box<SmtTerm>),
    Exists(Vec<(String, SmtSort)>, Box<SmtTerm>),

    Ite(Box<SmtTerm>, Box<SmtTerm>, Box<SmtTerm>),
}

macro_rules! binary_ops {
    ($($method:ident => $variant:ident),* $(,)?) => {
        $(
            pub fn $method(self, other: SmtTerm) -> Self {
                SmtTerm::$variant(Box::new(self), Box::new(other))
            }
        )*
    };
}

#[allow(clippy::should_implement_trait)]
impl SmtTerm {
    pub fn var(name: impl Into<String>) -> Self {
        SmtTerm::Var(name.into())
    }

    pub fn int(n: i64) -> Self {
        SmtTerm::IntLit(n)
    }

    pub fn bool(b: bool) -> Self {
        SmtTerm::BoolLit(b)
    }

    pub fn tt() -> Self {
        SmtTerm::BoolLit(true)
    }

    pub fn ff() -> Self {
        SmtTerm::BoolLit(false)
    }

    binary_ops! {
        add => Add,
        sub => Sub,
        mul => Mul,
        eq => Eq,
        lt => Lt,
        le => Le,
        gt => Gt,
        ge => Ge,
        implies => Implies,
    }

    pub fn and(terms: Vec<SmtTerm>) -> Self {
        SmtTerm::And(terms)
    }

    pub fn or(terms: Vec<SmtTerm>) -> Self {
        SmtTerm::Or(terms)
    }

    pub fn not(self) -> Self {
        SmtTerm::Not(Box::new(self))
    }

    pub fn ite(cond: SmtTerm, then: SmtTerm, els: SmtTerm) -> Self {
        SmtTerm::Ite(Box::new(cond), Box::new(then), Box::new(els))
    }

    /// `lo <= self < hi`.
    pub fn in_range(self, lo: i64, hi: i64) -> Self {
        SmtTerm::and(vec![
            self.clone().ge(SmtTerm::int(lo)),
            self.lt(SmtTerm::int(hi)),
        ])
    }

    /// Sum of a list of integer terms; the empty sum is 0.
    pub fn sum(terms: Vec<SmtTerm>) -> Self {
        let mut iter = terms.into_iter();
        match iter.next() {
            None => SmtTerm::int(0),
            Some(first) => iter.fold(first, |acc, t| acc.add(t)),
        }
    }

    pub fn as_bool_lit(&self) -> Option<bool> {
        match self {
            SmtTerm::BoolLit(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int_lit(&self) -> Option<i64> {
        match self {
            SmtTerm::IntLit(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_true(&self) -> bool {
        matches!(self, SmtTerm::BoolLit(true))
    }

    pub fn is_false(&self) -> bool {
        matches!(self, SmtTerm::BoolLit(false))
    }

    /// Number of nodes in the term tree.
    pub fn size(&self) -> usize {
        match self {
            SmtTerm::Var(_) | SmtTerm::IntLit(_) | SmtTerm::BoolLit(_) => 1,
            SmtTerm::Add(l, r)
            | SmtTerm::Sub(l, r)
            | SmtTerm::Mul(l, r)
            | SmtTerm::Eq(l, r)
            | SmtTerm::Lt(l, r)
            | SmtTerm::Le(l, r)
            | SmtTerm::Gt(l, r)
            | SmtTerm::Ge(l, r)
            | SmtTerm::Implies(l, r) => 1 + l.size() + r.size(),
            SmtTerm::And(ts) | SmtTerm::Or(ts) => 1 + ts.iter().map(SmtTerm::size).sum::<usize>(),
            SmtTerm::Not(t) => 1 + t.size(),
            SmtTerm::ForAll(_, body) | SmtTerm::Exists(_, body) => 1 + body.size(),
            SmtTerm::Ite(c, t, e) => 1 + c.size() + t.size() + e.size(),
        }
    }

    /// Collect the names of free variables, in first-occurrence order.
    pub fn free_vars(&self) -> Vec<String> {
        let mut out = Vec::new();
        let mut seen = std::collections::HashSet::new();
        self.collect_vars(&mut out, &mut seen);
        out
    }

    fn collect_vars(&self, out: &mut Vec<String>, seen: &mut std::collections::HashSet<String>) {
        match self {
            SmtTerm::Var(name) => {
                if seen.insert(name.clone()) {
                    out.push(name.clone());
                }
            }
            SmtTerm::IntLit(_) | SmtTerm::BoolLit(_) => {}
            SmtTerm::Add(l, r)
            | SmtTerm::Sub(l, r)
            | SmtTerm::Mul(l, r)
            | SmtTerm::Eq(l, r)
            | SmtTerm::Lt(l, r)
            | SmtTerm::Le(l, r)
            | SmtTerm::Gt(l, r)
            | SmtTerm::Ge(l, r)
            | SmtTerm::Implies(l, r) => {
                l.collect_vars(out, seen);
                r.collect_vars(out, seen);
            }
            SmtTerm::And(ts) | SmtTerm::Or(ts) => {
                for t in ts {
                    t.collect_vars(out, seen);
                }
            }
            SmtTerm::Not(t) => t.collect_vars(out, seen),
            SmtTerm::ForAll(bound, body) | SmtTerm::Exists(bound, body) => {
                let mut inner = Vec::new();
                let mut inner_seen = std::collections::HashSet::new();
                body.collect_vars(&mut inner, &mut inner_seen);
                for name in inner {
                    if bound.iter().all(|(b, _)| *b != name) && seen.insert(name.clone()) {
                        out.push(name);
                    }
                }
            }
            SmtTerm::Ite(c, t, e) => {
                c.collect_vars(out, seen);
                t.collect_vars(out, seen);
                e.collect_vars(out, seen);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sum_of_empty_list_is_zero() {
        assert_eq!(SmtTerm::sum(vec![]), SmtTerm::int(0));
        assert_eq!(
            SmtTerm::sum(vec![SmtTerm::var("a"), SmtTerm::var("b")]),
            SmtTerm::var("a").add(SmtTerm::var("b"))
        );
    }

    #[test]
    fn free_vars_skip_bound_names() {
        let t = SmtTerm::ForAll(
            vec![("y".into(), SmtSort::Int)],
            Box::new(SmtTerm::var("x").gt(SmtTerm::var("y"))),
        );
        assert_eq!(t.free_vars(), vec!["x".to_string()]);
    }

    #[test]
    fn size_counts_every_node() {
        let t = SmtTerm::ite(SmtTerm::var("c"), SmtTerm::int(1), SmtTerm::int(2));
        assert_eq!(t.size(), 4);
    }
}
