//! Globalized Newton iteration with hierarchical split-Newton relaxation.
//!
//! This crate finds a root of a residual `r(x)` (typically the gradient of an
//! objective) given its Jacobian `J(x)`. The Jacobian may be dense or sparse
//! (compressed sparse column, CSC).
//!
//! How it works (high level):
//! - Solve `J(x) raw = r(x)` and step by `s = -raw`.
//! - Optionally regularize `J` with pseudo-transient continuation
//!   (`J + I / dt`, timestep grown by the SER rule), damp `s` with an Armijo
//!   backtracking search, and damp `s` to stay inside box bounds.
//! - Stop when `|| s / (x * rel_tol + abs_tol) || < 1`.
//! - `split_newton` cuts the state at the given locations and relaxes the
//!   blocks against each other (block Gauss-Seidel), recursing on the
//!   suffix block.
//!
//! Calling it:
//! - Implement `Problem` (or wrap two closures in `FnProblem`).
//! - Call `newton` or `split_newton` and inspect the `IterationResult`.
//!
//! Example:
//! ```rust
//! use nalgebra::DMatrix;
//! use split_newton::{newton, FnProblem, Jacobian, SolverOptions};
//!
//! let mut problem = FnProblem::new(
//!     |x: &[f64], r: &mut [f64]| r[0] = x[0] * x[0] * x[0] - 1.0,
//!     |x: &[f64]| Jacobian::Dense(DMatrix::from_element(1, 1, 3.0 * x[0] * x[0])),
//! );
//! let result = newton(&mut problem, &[0.5], &SolverOptions::default(), None).unwrap();
//! assert!(result.converged());
//! assert!((result.x[0] - 1.0).abs() < 1e-8);
//! ```

mod bounds;
mod globalize;
mod jacobian;
mod linear;
mod pattern;
mod problem;
mod report;
mod solver;
mod split;

pub use bounds::Bounds;
pub use globalize::{
    criterion, PseudoTransient, ARMIJO_ALPHA, ARMIJO_HALVINGS, DEFAULT_ABS_TOL, DEFAULT_REL_TOL,
};
pub use jacobian::{Jacobian, SparseJacobian};
pub use linear::{
    DenseDirect, GmresOptions, LinearSolve, LinearSolveError, LinearSolver, LinearSolverKind,
    SparseDirect, SparseIterative,
};
pub use pattern::{JacobianPattern, PatternError};
pub use problem::{FnProblem, Problem, Restriction};
pub use report::{
    IterationReport, IterationResult, Reporter, SolveStatus, StdoutReporter, SweepReport,
};
pub use solver::{newton, SolveError, SolverOptions};
pub use split::split_newton;
