use criterion::{black_box, criterion_group, criterion_main, Criterion};
use netverify_smt::backends::smtlib_printer::to_smtlib;
use netverify_smt::terms::SmtTerm;

/// A nested branch chain shaped like the output of a long route-map.
fn branch_chain(depth: usize) -> SmtTerm {
    (0..depth).fold(SmtTerm::var("metric"), |acc, i| {
        SmtTerm::ite(
            SmtTerm::var(format!("guard{i}")).and_also(SmtTerm::tt()),
            acc.clone().add(SmtTerm::int(1)),
            acc,
        )
    })
}

trait AndAlso {
    fn and_also(self, other: SmtTerm) -> SmtTerm;
}

impl AndAlso for SmtTerm {
    fn and_also(self, other: SmtTerm) -> SmtTerm {
        SmtTerm::and(vec![self, other])
    }
}

fn bench_simplify_branch_chain(c: &mut Criterion) {
    let term = branch_chain(12);
    c.bench_function("simplify_branch_chain_12", |b| {
        b.iter(|| black_box(term.clone()).simplify())
    });
}

fn bench_print_branch_chain(c: &mut Criterion) {
    let term = branch_chain(12);
    c.bench_function("to_smtlib_branch_chain_12", |b| {
        b.iter(|| to_smtlib(black_box(&term)))
    });
}

criterion_group!(benches, bench_simplify_branch_chain, bench_print_branch_chain);
criterion_main!(benches);
