use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use split_newton::{
    newton, split_newton, FnProblem, Jacobian, JacobianPattern, LinearSolverKind, SolverOptions,
    SparseJacobian,
};
use std::time::Duration;

const QUARTIC_DIM: usize = 200;

const STRATEGIES: [LinearSolverKind; 3] = [
    LinearSolverKind::DenseDirect,
    LinearSolverKind::SparseIterative,
    LinearSolverKind::SparseDirect,
];

fn solver_options(kind: LinearSolverKind) -> SolverOptions {
    SolverOptions {
        max_iters: Some(200),
        linear_solver: kind,
        ..SolverOptions::default()
    }
}

fn logspace(start: f64, stop: f64, count: usize) -> impl Iterator<Item = f64> {
    let step = if count > 1 {
        (stop - start) / (count - 1) as f64
    } else {
        0.0
    };
    (0..count).map(move |i| 10f64.powf(start + step * i as f64))
}

/// Stiff half followed by a soft half.
fn quartic_coefs(n: usize) -> Vec<f64> {
    let half = n / 2;
    logspace(4.0, 2.0, half)
        .chain(logspace(-1.0, -2.0, n - half))
        .collect()
}

fn quartic_seed(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| 21.0 + 10.0 * i as f64 / (n.max(2) - 1) as f64)
        .collect()
}

fn diagonal_pattern(n: usize) -> JacobianPattern {
    JacobianPattern::new(n, n, (0..=n).collect(), (0..n).collect()).unwrap()
}

fn bench_quartic(c: &mut Criterion) {
    let coefs = quartic_coefs(QUARTIC_DIM);
    let x0 = quartic_seed(QUARTIC_DIM);
    let pattern = diagonal_pattern(QUARTIC_DIM);
    let mut problem = FnProblem::new(
        |x: &[f64], out: &mut [f64]| {
            for ((o, xi), ci) in out.iter_mut().zip(x).zip(&coefs) {
                *o = ci * xi.powi(3);
            }
        },
        |x: &[f64]| {
            let diag: Vec<f64> = x
                .iter()
                .zip(&coefs)
                .map(|(xi, ci)| 3.0 * ci * xi * xi)
                .collect();
            Jacobian::Sparse(SparseJacobian::new(pattern.clone(), diag).unwrap())
        },
    );

    let mut group = c.benchmark_group("quartic");
    for kind in STRATEGIES {
        let options = solver_options(kind);
        group.bench_with_input(BenchmarkId::new("newton", format!("{kind:?}")), &options, |b, opts| {
            b.iter(|| {
                let result = newton(&mut problem, &x0, opts, None).unwrap();
                black_box(result.x);
            });
        });
        group.bench_with_input(BenchmarkId::new("split", format!("{kind:?}")), &options, |b, opts| {
            b.iter(|| {
                let result =
                    split_newton(&mut problem, &x0, &[QUARTIC_DIM / 2], opts, None).unwrap();
                black_box(result.x);
            });
        });
    }
    group.finish();
}

fn bench_rosenbrock(c: &mut Criterion) {
    let pattern = JacobianPattern::dense(2, 2);
    let mut problem = FnProblem::new(
        |x: &[f64], out: &mut [f64]| {
            out[0] = -400.0 * x[0] * (x[1] - x[0] * x[0]) - 2.0 * (1.0 - x[0]);
            out[1] = 200.0 * (x[1] - x[0] * x[0]);
        },
        |x: &[f64]| {
            // Column-major Hessian.
            let values = vec![
                1200.0 * x[0] * x[0] - 400.0 * x[1] + 2.0,
                -400.0 * x[0],
                -400.0 * x[0],
                200.0,
            ];
            Jacobian::Sparse(SparseJacobian::new(pattern.clone(), values).unwrap())
        },
    );
    let x0 = vec![0.1, 0.2];

    let mut group = c.benchmark_group("rosenbrock");
    for kind in STRATEGIES {
        let options = solver_options(kind);
        group.bench_with_input(BenchmarkId::new("newton", format!("{kind:?}")), &options, |b, opts| {
            b.iter(|| {
                let result = newton(&mut problem, &x0, opts, None).unwrap();
                black_box(result.x);
            });
        });
    }
    let globalized = SolverOptions {
        dt0: 0.1,
        armijo: true,
        ..solver_options(LinearSolverKind::DenseDirect)
    };
    group.bench_function("newton_ptc_armijo", |b| {
        b.iter(|| {
            let result = newton(&mut problem, &x0, &globalized, None).unwrap();
            black_box(result.x);
        });
    });
    group.finish();
}

criterion_group! {
    name = benches;
    config = Criterion::default()
        .sample_size(10)
        .warm_up_time(Duration::from_millis(500))
        .measurement_time(Duration::from_millis(1000));
    targets =
        bench_quartic,
        bench_rosenbrock
}
criterion_main!(benches);
