//! Benchmarks for sparse factorization and solve.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use nodal_core::algebra::{ElementId, RhsId, SparseSolver};

/// A resistor ladder: every node tied to its neighbours and to ground.
struct Ladder {
    solver: SparseSolver<f64>,
    diagonal: Vec<ElementId>,
    off_diagonal: Vec<(ElementId, ElementId)>,
    source: RhsId,
}

impl Ladder {
    fn new(size: usize) -> Self {
        let mut solver = SparseSolver::new();
        let diagonal = (1..=size)
            .map(|i| solver.get_element(i, i).unwrap())
            .collect();
        let off_diagonal = (1..size)
            .map(|i| {
                (
                    solver.get_element(i, i + 1).unwrap(),
                    solver.get_element(i + 1, i).unwrap(),
                )
            })
            .collect();
        let source = solver.rhs_element(1).unwrap();
        Self {
            solver,
            diagonal,
            off_diagonal,
            source,
        }
    }

    fn load(&mut self) {
        self.solver.clear();
        for &d in &self.diagonal {
            self.solver.add(d, black_box(2.001));
        }
        for &(upper, lower) in &self.off_diagonal {
            self.solver.add(upper, -1.0);
            self.solver.add(lower, -1.0);
        }
        self.solver.add_rhs(self.source, 1.0);
    }
}

fn bench_factor_solve(c: &mut Criterion) {
    let mut group = c.benchmark_group("ladder");
    for size in [10, 100, 1000] {
        group.bench_with_input(BenchmarkId::new("factor_solve", size), &size, |b, &size| {
            let mut ladder = Ladder::new(size);
            let mut solution = vec![0.0; size + 1];
            b.iter(|| {
                ladder.load();
                ladder.solver.factor().unwrap();
                ladder.solver.solve(&mut solution).unwrap();
                black_box(solution[size]);
            });
        });
    }
    group.finish();
}

fn bench_reorder(c: &mut Criterion) {
    c.bench_function("ladder_reorder_100", |b| {
        let mut ladder = Ladder::new(100);
        b.iter(|| {
            ladder.load();
            ladder.solver.force_reorder();
            ladder.solver.factor().unwrap();
        });
    });
}

criterion_group!(benches, bench_factor_solve, bench_reorder);
criterion_main!(benches);
