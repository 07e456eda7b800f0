use crate::sorts::SmtSort;
use crate::terms::SmtTerm;

/// Print an SmtTerm as SMT-LIB2 format.
pub fn to_smtlib(term: &SmtTerm) -> String {
    let mut out = String::new();
    write_term(term, &mut out);
    out
}

fn write_term(term: &SmtTerm, out: &mut String) {
    match term {
        SmtTerm::Var(name) => out.push_str(&quote_symbol(name)),
        SmtTerm::IntLit(n) => {
            if *n < 0 {
                out.push_str(&format!("(- {})", n.unsigned_abs()));
            } else {
                out.push_str(&n.to_string());
            }
        }
        SmtTerm::BoolLit(b) => out.push_str(if *b { "true" } else { "false" }),
        SmtTerm::Add(lhs, rhs) => write_app("+", &[lhs, rhs], out),
        SmtTerm::Sub(lhs, rhs) => write_app("-", &[lhs, rhs], out),
        SmtTerm::Mul(lhs, rhs) => write_app("*", &[lhs, rhs], out),
        SmtTerm::Eq(lhs, rhs) => write_app("=", &[lhs, rhs], out),
        SmtTerm::Lt(lhs, rhs) => write_app("<", &[lhs, rhs], out),
        SmtTerm::Le(lhs, rhs) => write_app("<=", &[lhs, rhs], out),
        SmtTerm::Gt(lhs, rhs) => write_app(">", &[lhs, rhs], out),
        SmtTerm::Ge(lhs, rhs) => write_app(">=", &[lhs, rhs], out),
        SmtTerm::And(terms) => write_nary("and", "true", terms, out),
        SmtTerm::Or(terms) => write_nary("or", "false", terms, out),
        SmtTerm::Not(inner) => write_app("not", &[inner], out),
        SmtTerm::Implies(lhs, rhs) => write_app("=>", &[lhs, rhs], out),
        SmtTerm::ForAll(bindings, body) => write_quantifier("forall", bindings, body, out),
        SmtTerm::Exists(bindings, body) => write_quantifier("exists", bindings, body, out),
        SmtTerm::Ite(cond, then, els) => write_app("ite", &[cond, then, els], out),
    }
}

fn write_app(op: &str, args: &[&SmtTerm], out: &mut String) {
    out.push('(');
    out.push_str(op);
    for arg in args {
        out.push(' ');
        write_term(arg, out);
    }
    out.push(')');
}

fn write_nary(op: &str, unit: &str, terms: &[SmtTerm], out: &mut String) {
    match terms {
        [] => out.push_str(unit),
        [single] => write_term(single, out),
        _ => {
            let refs: Vec<&SmtTerm> = terms.iter().collect();
            write_app(op, &refs, out);
        }
    }
}

fn write_quantifier(kw: &str, bindings: &[(String, SmtSort)], body: &SmtTerm, out: &mut String) {
    let vars: Vec<String> = bindings
        .iter()
        .map(|(n, s)| format!("({} {s})", quote_symbol(n)))
        .collect();
    out.push_str(&format!("({kw} ({}) ", vars.join(" ")));
    write_term(body, out);
    out.push(')');
}

/// Quote a symbol with `|...|` when it contains characters outside the
/// SMT-LIB2 simple-symbol alphabet.
pub fn quote_symbol(name: &str) -> String {
    let simple = !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "~!@$%^&*_-+=<>.?/".contains(c));
    if simple {
        name.to_string()
    } else {
        format!("|{}|", name.replace('|', "_"))
    }
}

/// Render a full script: declarations, assertions and `(check-sat)`.
pub fn to_smtlib_script<'a>(
    decls: impl IntoIterator<Item = (&'a str, SmtSort)>,
    assertions: impl IntoIterator<Item = &'a SmtTerm>,
) -> String {
    let mut out = String::new();
    for (name, sort) in decls {
        out.push_str(&format!(
            "(declare-const {} {})\n",
            quote_symbol(name),
            sort.smtlib_name()
        ));
    }
    for a in assertions {
        out.push_str("(assert ");
        write_term(a, &mut out);
        out.push_str(")\n");
    }
    out.push_str("(check-sat)\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn print_simple_term() {
        let term = SmtTerm::var("x").add(SmtTerm::int(1)).ge(SmtTerm::int(0));
        assert_eq!(to_smtlib(&term), "(>= (+ x 1) 0)");
    }

    #[test]
    fn print_and_term() {
        let term = SmtTerm::and(vec![
            SmtTerm::var("a").gt(SmtTerm::int(0)),
            SmtTerm::var("b").lt(SmtTerm::int(10)),
        ]);
        assert_eq!(to_smtlib(&term), "(and (> a 0) (< b 10))");
    }

    #[test]
    fn symbols_with_punctuation_are_quoted() {
        assert_eq!(quote_symbol("0_r1_BGP"), "|0_r1_BGP|");
        assert_eq!(quote_symbol("r1 Gi0"), "|r1 Gi0|");
        assert_eq!(quote_symbol("dst_ip"), "dst_ip");
    }

    #[test]
    fn script_declares_before_asserting() {
        let t = SmtTerm::var("p");
        let script = to_smtlib_script([("p", SmtSort::Bool)], [&t]);
        assert_eq!(script, "(declare-const p Bool)\n(assert p)\n(check-sat)\n");
    }
}
