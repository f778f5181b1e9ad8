use std::cell::Cell;

use nalgebra::DMatrix;
use split_newton::{
    criterion, newton, Bounds, FnProblem, IterationReport, Jacobian, LinearSolveError,
    LinearSolverKind, Problem, Reporter, SolveError, SolveStatus, SolverOptions, SparseJacobian,
    DEFAULT_ABS_TOL, DEFAULT_REL_TOL,
};

fn rosen(x: &[f64]) -> f64 {
    100.0 * (x[1] - x[0] * x[0]).powi(2) + (1.0 - x[0]).powi(2)
}

fn rosen_der(x: &[f64], r: &mut [f64]) {
    r[0] = -400.0 * x[0] * (x[1] - x[0] * x[0]) - 2.0 * (1.0 - x[0]);
    r[1] = 200.0 * (x[1] - x[0] * x[0]);
}

fn rosen_hess(x: &[f64]) -> DMatrix<f64> {
    DMatrix::from_row_slice(
        2,
        2,
        &[
            1200.0 * x[0] * x[0] - 400.0 * x[1] + 2.0,
            -400.0 * x[0],
            -400.0 * x[0],
            200.0,
        ],
    )
}

fn rosen_hess_sparse(x: &[f64]) -> SparseJacobian {
    let h = rosen_hess(x);
    SparseJacobian::from_triplets(
        2,
        2,
        &[
            (0, 0, h[(0, 0)]),
            (1, 0, h[(1, 0)]),
            (0, 1, h[(0, 1)]),
            (1, 1, h[(1, 1)]),
        ],
    )
    .unwrap()
}

fn rosenbrock() -> impl Problem {
    FnProblem::new(rosen_der, |x: &[f64]| Jacobian::Dense(rosen_hess(x)))
}

fn sparse_rosenbrock() -> impl Problem {
    FnProblem::new(rosen_der, |x: &[f64]| {
        Jacobian::Sparse(rosen_hess_sparse(x))
    })
}

/// r(x) = x - 1 with an identity Jacobian.
fn unit_root() -> impl Problem {
    FnProblem::new(
        |x: &[f64], r: &mut [f64]| {
            for (ri, xi) in r.iter_mut().zip(x) {
                *ri = xi - 1.0;
            }
        },
        |x: &[f64]| Jacobian::Dense(DMatrix::identity(x.len(), x.len())),
    )
}

#[derive(Default)]
struct Collect {
    rows: Vec<IterationReport>,
    finished: usize,
}

impl Reporter for Collect {
    fn on_iteration(&mut self, report: &IterationReport) {
        self.rows.push(report.clone());
    }

    fn on_finish(&mut self) {
        self.finished += 1;
    }
}

#[test]
fn criterion_of_zero_step_is_zero() {
    let x = [0.3, -12.0, 4e6];
    let s = [0.0; 3];
    assert_eq!(criterion(&x, &s, DEFAULT_ABS_TOL, DEFAULT_REL_TOL), 0.0);
}

#[test]
fn rosenbrock_dense() {
    let mut problem = rosenbrock();
    let result = newton(&mut problem, &[0.1, 0.2], &SolverOptions::default(), None).unwrap();
    assert!(result.converged());
    assert!((result.x[0] - 1.0).abs() < 1e-5);
    assert!((result.x[1] - 1.0).abs() < 1e-5);
    assert!(rosen(&result.x) < 1e-10);
    assert!(result.criterion.unwrap() < 1.0);
}

#[test]
fn rosenbrock_sparse_strategies() {
    for kind in [LinearSolverKind::SparseIterative, LinearSolverKind::SparseDirect] {
        let mut problem = sparse_rosenbrock();
        let options = SolverOptions {
            linear_solver: kind,
            ..SolverOptions::default()
        };
        let result = newton(&mut problem, &[0.1, 0.2], &options, None).unwrap();
        assert!(result.converged(), "{kind:?}");
        assert!((result.x[0] - 1.0).abs() < 1e-5, "{kind:?}: {:?}", result.x);
        assert!((result.x[1] - 1.0).abs() < 1e-5, "{kind:?}: {:?}", result.x);
    }
}

#[test]
fn dense_jacobian_feeds_sparse_solvers() {
    let mut problem = rosenbrock();
    let options = SolverOptions {
        linear_solver: LinearSolverKind::SparseDirect,
        ..SolverOptions::default()
    };
    let result = newton(&mut problem, &[0.1, 0.2], &options, None).unwrap();
    assert!(result.converged());
    assert!((result.x[0] - 1.0).abs() < 1e-5);
}

#[test]
fn rosenbrock_with_bounds() {
    let mut problem = rosenbrock();
    let options = SolverOptions {
        bounds: Some(Bounds::new(vec![0.0, 0.0], vec![2.0, 2.0]).unwrap()),
        ..SolverOptions::default()
    };
    let mut collect = Collect::default();
    let result = newton(&mut problem, &[0.25, 0.2], &options, Some(&mut collect)).unwrap();
    assert!(result.converged());
    assert!((result.x[0] - 1.0).abs() < 1e-5);
    assert!((result.x[1] - 1.0).abs() < 1e-5);
    assert_eq!(collect.rows.len(), result.iterations);
    assert_eq!(collect.finished, 1);
    assert!(collect.rows.iter().all(|row| row.bound_scaling.is_some()));
}

#[test]
fn step_is_zero_when_pinned_by_bounds() {
    let mut problem = rosenbrock();
    let options = SolverOptions {
        max_iters: Some(1),
        bounds: Some(Bounds::new(vec![0.0, 0.0], vec![0.0, 0.0]).unwrap()),
        ..SolverOptions::default()
    };
    let result = newton(&mut problem, &[0.0, 0.0], &options, None).unwrap();
    let step = result.step.unwrap();
    assert!(step.iter().all(|&s| s == 0.0), "{step:?}");
    assert_eq!(result.x, vec![0.0, 0.0]);
}

#[test]
fn bounded_iterates_stay_inside() {
    let mut problem = unit_root();
    let bounds = Bounds::new(vec![-5.0, -5.0], vec![0.5, 0.5]).unwrap();
    let options = SolverOptions {
        max_iters: Some(20),
        bounds: Some(bounds.clone()),
        ..SolverOptions::default()
    };
    let result = newton(&mut problem, &[-4.0, 0.0], &options, None).unwrap();
    assert!(bounds.contains(&result.x));
    assert!(result.x.iter().all(|&v| v < 0.5));
}

#[test]
fn pseudo_transient_shrinks_first_step() {
    let mut problem = unit_root();
    let options = SolverOptions {
        max_iters: Some(1),
        linear_solver: LinearSolverKind::SparseIterative,
        dt0: 2.0,
        ..SolverOptions::default()
    };
    let result = newton(&mut problem, &[4.0, 4.0], &options, None).unwrap();
    let step = result.step.unwrap();
    assert!((step[0] + 2.0).abs() < 1e-5);
    assert!((step[1] + 2.0).abs() < 1e-5);
}

#[test]
fn pseudo_transient_with_armijo_still_converges() {
    let mut problem = rosenbrock();
    let options = SolverOptions {
        dt0: 0.1,
        dtmax: 1.0,
        armijo: true,
        ..SolverOptions::default()
    };
    let result = newton(&mut problem, &[0.1, 0.2], &options, None).unwrap();
    assert!(result.converged());
    assert!((result.x[0] - 1.0).abs() < 1e-3);
    assert!((result.x[1] - 1.0).abs() < 1e-3);
}

#[test]
fn armijo_damps_step() {
    let mut problem = unit_root();
    let options = SolverOptions {
        max_iters: Some(1),
        linear_solver: LinearSolverKind::SparseIterative,
        armijo: true,
        ..SolverOptions::default()
    };
    let mut collect = Collect::default();
    let result = newton(&mut problem, &[0.0], &options, Some(&mut collect)).unwrap();
    let step = result.step.unwrap();
    assert!(step[0].abs() < 1.0);
    assert_eq!(collect.rows[0].armijo_factor, Some(0.5));
}

#[test]
fn negative_timestep_is_rejected_before_evaluating() {
    let calls = Cell::new(0);
    let mut problem = FnProblem::new(
        |x: &[f64], r: &mut [f64]| {
            calls.set(calls.get() + 1);
            r.copy_from_slice(x);
        },
        |x: &[f64]| Jacobian::Dense(DMatrix::identity(x.len(), x.len())),
    );
    for (dt0, dtmax) in [(-1.0, 1.0), (0.1, -1.0)] {
        let options = SolverOptions {
            dt0,
            dtmax,
            ..SolverOptions::default()
        };
        let err = newton(&mut problem, &[1.0, 2.0], &options, None).unwrap_err();
        assert!(matches!(err, SolveError::InvalidTimestep { .. }));
        assert!(err.to_string().contains("must specify positive dt0 and dtmax"));
    }
    assert_eq!(calls.get(), 0);
}

#[test]
fn seed_outside_bounds_is_rejected() {
    let mut problem = rosenbrock();
    let options = SolverOptions {
        bounds: Some(Bounds::new(vec![0.0, 0.0], vec![1.0, 1.0]).unwrap()),
        ..SolverOptions::default()
    };
    let err = newton(&mut problem, &[2.0, 0.5], &options, None).unwrap_err();
    assert!(matches!(err, SolveError::SeedOutOfBounds { index: 0, .. }));
    assert!(err.to_string().contains("seed must be within the provided bounds"));
}

#[test]
fn bounds_must_match_state_length() {
    let mut problem = rosenbrock();
    let options = SolverOptions {
        bounds: Some(Bounds::new(vec![0.0; 3], vec![1.0; 3]).unwrap()),
        ..SolverOptions::default()
    };
    let err = newton(&mut problem, &[0.5, 0.5], &options, None).unwrap_err();
    assert!(matches!(
        err,
        SolveError::BoundsLength {
            expected: 2,
            actual: 3
        }
    ));
    assert!(matches!(
        Bounds::new(vec![0.0; 2], vec![1.0; 3]),
        Err(SolveError::BoundsShape { lower: 2, upper: 3 })
    ));
}

#[test]
fn stalled_gmres_still_terminates() {
    // Numerically singular: the second row is twice the first.
    let mut problem = FnProblem::new(
        |_x: &[f64], r: &mut [f64]| r.fill(1.0),
        |_x: &[f64]| {
            Jacobian::Sparse(
                SparseJacobian::from_triplets(
                    2,
                    2,
                    &[(0, 0, 1.0), (1, 0, 2.0), (0, 1, 2.0), (1, 1, 4.0 + 1e-16)],
                )
                .unwrap(),
            )
        },
    );
    let options = SolverOptions {
        linear_solver: LinearSolverKind::SparseIterative,
        bounds: Some(Bounds::new(vec![0.0, 0.0], vec![0.0, 0.0]).unwrap()),
        ..SolverOptions::default()
    };
    let mut collect = Collect::default();
    let result = newton(&mut problem, &[0.0, 0.0], &options, Some(&mut collect)).unwrap();
    assert!(!collect.rows[0].linear_converged);
    assert!(result.converged());
    assert_eq!(result.iterations, 1);
    assert_eq!(result.x, vec![0.0, 0.0]);
}

#[test]
fn singular_dense_jacobian_is_an_error() {
    let mut problem = FnProblem::new(
        |_x: &[f64], r: &mut [f64]| r.fill(1.0),
        |_x: &[f64]| Jacobian::Dense(DMatrix::zeros(2, 2)),
    );
    let err = newton(&mut problem, &[0.0, 0.0], &SolverOptions::default(), None).unwrap_err();
    assert!(matches!(err, SolveError::Linear(LinearSolveError::Singular)));
}

#[test]
fn zero_iteration_budget_takes_no_step() {
    let mut problem = rosenbrock();
    let options = SolverOptions {
        max_iters: Some(0),
        ..SolverOptions::default()
    };
    let result = newton(&mut problem, &[0.1, 0.2], &options, None).unwrap();
    assert_eq!(result.iterations, 0);
    assert!(result.step.is_none());
    assert!(result.criterion.is_none());
    assert_eq!(result.x, vec![0.1, 0.2]);
    assert_eq!(result.status, SolveStatus::MaxIterations);
}

#[test]
fn linear_residual_is_solved_by_first_step() {
    let mut problem = unit_root();
    let options = SolverOptions {
        max_iters: Some(1),
        ..SolverOptions::default()
    };
    let result = newton(&mut problem, &[4.0, -3.0, 7.0], &options, None).unwrap();
    assert_eq!(result.x, vec![1.0, 1.0, 1.0]);
    assert_eq!(result.status, SolveStatus::MaxIterations);

    // Unbounded, the second iteration confirms the root with a zero step.
    let result = newton(&mut problem, &[4.0, -3.0, 7.0], &SolverOptions::default(), None).unwrap();
    assert_eq!(result.iterations, 2);
    assert_eq!(result.x, vec![1.0, 1.0, 1.0]);
    assert_eq!(result.criterion, Some(0.0));
}

#[test]
fn root_where_criterion_scale_vanishes_is_converged() {
    // x * 1e-6 + 1e-5 is exactly zero at this root.
    let root = -10.000000000000002;
    let mut problem = FnProblem::new(
        move |x: &[f64], r: &mut [f64]| r[0] = x[0] - root,
        |_x: &[f64]| Jacobian::Dense(DMatrix::identity(1, 1)),
    );
    let result = newton(&mut problem, &[0.0], &SolverOptions::default(), None).unwrap();
    assert_eq!(result.status, SolveStatus::Converged);
    assert_eq!(result.iterations, 2);
    assert_eq!(result.x, vec![root]);
    assert_eq!(result.criterion, Some(0.0));
}

#[test]
fn verbose_run_prints_tables() {
    let mut problem = unit_root();
    let options = SolverOptions {
        verbose: true,
        dt0: 0.5,
        ..SolverOptions::default()
    };
    let result = newton(&mut problem, &[3.0, 2.0], &options, None).unwrap();
    assert!(result.converged());
}
