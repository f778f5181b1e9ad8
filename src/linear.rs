//! Linear solves for the Newton correction `J * raw = r`.
//!
//! Three strategies share the [`LinearSolver`] trait:
//! - [`DenseDirect`]: LU with partial pivoting on a dense copy (nalgebra).
//! - [`SparseIterative`]: restarted GMRES on the CSC matrix. Failure to reach
//!   the tolerance is reported, not raised.
//! - [`SparseDirect`]: sparse QR (faer) with the symbolic analysis reused
//!   while the sparsity pattern stays the same.

use core::fmt;

use dyn_stack::{GlobalPodBuffer, PodStack, ReborrowMut};
use faer_core::mat;
use faer_core::{Conj, Parallelism};
use faer_sparse::qr::{factorize_symbolic_qr, QrSymbolicParams, SymbolicQr};
use nalgebra::DVector;

use crate::jacobian::{Jacobian, SparseJacobian};
use crate::pattern::JacobianPattern;

/// Errors from a linear solve. All of them abort the Newton iteration.
#[derive(Debug)]
pub enum LinearSolveError {
    /// The matrix could not be inverted.
    Singular,
    /// Matrix and right-hand side sizes disagree.
    DimensionMismatch { expected: usize, actual: usize },
    /// faer reported an error during symbolic factorization.
    Faer(faer_sparse::FaerError),
    /// Workspace requirement overflowed.
    WorkspaceOverflow,
    /// Workspace allocation failed.
    WorkspaceAlloc,
}

impl fmt::Display for LinearSolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Singular => write!(f, "singular matrix"),
            Self::DimensionMismatch { expected, actual } => {
                write!(f, "right-hand side length {actual} does not match expected {expected}")
            }
            Self::Faer(err) => write!(f, "faer error: {err:?}"),
            Self::WorkspaceOverflow => write!(f, "workspace size overflow"),
            Self::WorkspaceAlloc => write!(f, "workspace allocation failed"),
        }
    }
}

impl std::error::Error for LinearSolveError {}

/// Outcome of a successful linear solve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearSolve {
    /// False when an iterative solver stopped short of its tolerance.
    pub converged: bool,
    /// Krylov iterations; zero for direct solvers.
    pub iterations: usize,
    /// ||b - A x|| for iterative solvers, zero for direct ones.
    pub residual_norm: f64,
}

impl LinearSolve {
    fn direct() -> Self {
        Self {
            converged: true,
            iterations: 0,
            residual_norm: 0.0,
        }
    }
}

/// Solves `jacobian * out = rhs`.
pub trait LinearSolver {
    fn solve(
        &mut self,
        jacobian: &Jacobian,
        rhs: &[f64],
        out: &mut [f64],
    ) -> Result<LinearSolve, LinearSolveError>;
}

/// Which [`LinearSolver`] a solve uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinearSolverKind {
    /// Dense LU.
    #[default]
    DenseDirect,
    /// Restarted GMRES on the sparse matrix.
    SparseIterative,
    /// Sparse QR factorization.
    SparseDirect,
}

impl LinearSolverKind {
    pub fn build(self, gmres: &GmresOptions) -> Box<dyn LinearSolver> {
        match self {
            Self::DenseDirect => Box::new(DenseDirect),
            Self::SparseIterative => Box::new(SparseIterative::new(gmres.clone())),
            Self::SparseDirect => Box::new(SparseDirect::new(Parallelism::None)),
        }
    }
}

fn check_dims(jacobian: &Jacobian, rhs: &[f64], out: &[f64]) -> Result<(), LinearSolveError> {
    let n = jacobian.ncols();
    if rhs.len() != jacobian.nrows() {
        return Err(LinearSolveError::DimensionMismatch {
            expected: jacobian.nrows(),
            actual: rhs.len(),
        });
    }
    if out.len() != n {
        return Err(LinearSolveError::DimensionMismatch {
            expected: n,
            actual: out.len(),
        });
    }
    Ok(())
}

/// Dense LU with partial pivoting.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenseDirect;

impl LinearSolver for DenseDirect {
    fn solve(
        &mut self,
        jacobian: &Jacobian,
        rhs: &[f64],
        out: &mut [f64],
    ) -> Result<LinearSolve, LinearSolveError> {
        check_dims(jacobian, rhs, out)?;
        let lu = jacobian.to_dense().into_owned().lu();
        let solution = lu
            .solve(&DVector::from_column_slice(rhs))
            .ok_or(LinearSolveError::Singular)?;
        if solution.iter().any(|v| !v.is_finite()) {
            return Err(LinearSolveError::Singular);
        }
        out.copy_from_slice(solution.as_slice());
        Ok(LinearSolve::direct())
    }
}

/// Options for restarted GMRES.
#[derive(Debug, Clone)]
pub struct GmresOptions {
    /// Krylov subspace dimension before a restart.
    pub restart: usize,
    /// Maximum number of restart cycles; `None` means 10 * n.
    pub max_restarts: Option<usize>,
    /// Converge when ||b - A x|| <= rtol * ||b||.
    pub rtol: f64,
    /// Converge when ||b - A x|| <= atol.
    pub atol: f64,
}

impl Default for GmresOptions {
    fn default() -> Self {
        Self {
            restart: 20,
            max_restarts: None,
            rtol: 1e-5,
            atol: 0.0,
        }
    }
}

/// Relative size below which an Arnoldi vector or a diagonal of the
/// Hessenberg factor counts as zero.
const BREAKDOWN_TOL: f64 = 1e-13;

/// Restarted GMRES with modified Gram-Schmidt and Givens rotations.
#[derive(Debug, Clone, Default)]
pub struct SparseIterative {
    options: GmresOptions,
}

impl SparseIterative {
    pub fn new(options: GmresOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &GmresOptions {
        &self.options
    }
}

impl LinearSolver for SparseIterative {
    fn solve(
        &mut self,
        jacobian: &Jacobian,
        rhs: &[f64],
        out: &mut [f64],
    ) -> Result<LinearSolve, LinearSolveError> {
        check_dims(jacobian, rhs, out)?;
        let a = jacobian.to_sparse();
        Ok(gmres(&a, rhs, out, &self.options))
    }
}

/// Solves `a * x = b` from a zero initial guess.
pub(crate) fn gmres(a: &SparseJacobian, b: &[f64], x: &mut [f64], options: &GmresOptions) -> LinearSolve {
    let n = b.len();
    x.fill(0.0);
    let b_norm = l2_norm(b);
    let tol = (options.rtol * b_norm).max(options.atol);
    if b_norm <= tol {
        return LinearSolve {
            converged: true,
            iterations: 0,
            residual_norm: b_norm,
        };
    }

    let m = options.restart.clamp(1, n.max(1));
    let max_restarts = options.max_restarts.unwrap_or(10 * n).max(1);

    let mut r = b.to_vec();
    let mut beta = b_norm;
    let mut w = vec![0.0; n];
    let mut basis: Vec<Vec<f64>> = Vec::with_capacity(m + 1);
    // Column j of the Hessenberg matrix holds j + 2 entries.
    let mut h: Vec<Vec<f64>> = Vec::with_capacity(m);
    let mut cs = vec![0.0; m];
    let mut sn = vec![0.0; m];
    let mut g = vec![0.0; m + 1];
    let mut y = vec![0.0; m];
    let mut iterations = 0;

    for _ in 0..max_restarts {
        basis.clear();
        h.clear();
        basis.push(r.iter().map(|v| v / beta).collect());
        g.fill(0.0);
        g[0] = beta;

        let mut k = 0;
        let mut breakdown = false;
        for j in 0..m {
            a.mul_vec(&basis[j], &mut w);
            let w_norm = l2_norm(&w);

            let mut col = vec![0.0; j + 2];
            for (i, v) in basis.iter().enumerate() {
                let hij = dot(&w, v);
                col[i] = hij;
                axpy(-hij, v, &mut w);
            }
            let h_next = l2_norm(&w);
            col[j + 1] = h_next;

            for i in 0..j {
                let temp = cs[i] * col[i] + sn[i] * col[i + 1];
                col[i + 1] = -sn[i] * col[i] + cs[i] * col[i + 1];
                col[i] = temp;
            }
            let denom = col[j].hypot(col[j + 1]);
            if denom == 0.0 {
                cs[j] = 1.0;
                sn[j] = 0.0;
            } else {
                cs[j] = col[j] / denom;
                sn[j] = col[j + 1] / denom;
            }
            col[j] = denom;
            col[j + 1] = 0.0;
            g[j + 1] = -sn[j] * g[j];
            g[j] *= cs[j];
            h.push(col);

            k = j + 1;
            iterations += 1;
            if g[j + 1].abs() <= tol {
                break;
            }
            if h_next <= BREAKDOWN_TOL * w_norm {
                breakdown = true;
                break;
            }
            basis.push(w.iter().map(|v| v / h_next).collect());
        }

        // Back substitution on the triangular factor; a vanishing pivot
        // drops its direction from the update.
        let h_max = (0..k).map(|i| h[i][i].abs()).fold(0.0, f64::max);
        for i in (0..k).rev() {
            let mut sum = g[i];
            for l in i + 1..k {
                sum -= h[l][i] * y[l];
            }
            let diag = h[i][i];
            y[i] = if diag.abs() <= BREAKDOWN_TOL * h_max {
                0.0
            } else {
                sum / diag
            };
        }
        for (i, &yi) in y.iter().enumerate().take(k) {
            axpy(yi, &basis[i], x);
        }

        a.mul_vec(x, &mut w);
        for i in 0..n {
            r[i] = b[i] - w[i];
        }
        beta = l2_norm(&r);
        if beta <= tol {
            return LinearSolve {
                converged: true,
                iterations,
                residual_norm: beta,
            };
        }
        if breakdown || !beta.is_finite() {
            break;
        }
    }

    LinearSolve {
        converged: false,
        iterations,
        residual_norm: beta,
    }
}

struct QrCache {
    pattern: JacobianPattern,
    symbolic_qr: SymbolicQr<usize>,
    qr_indices: Vec<usize>,
    qr_values: Vec<f64>,
    qr_stack: GlobalPodBuffer,
}

impl QrCache {
    fn new(pattern: &JacobianPattern, parallelism: Parallelism) -> Result<Self, LinearSolveError> {
        let symbolic_qr = factorize_symbolic_qr(pattern.as_symbolic(), QrSymbolicParams::default())
            .map_err(LinearSolveError::Faer)?;

        let factor_req = symbolic_qr
            .factorize_numeric_qr_req::<f64>(parallelism)
            .map_err(|_| LinearSolveError::WorkspaceOverflow)?;
        let solve_req = symbolic_qr
            .solve_in_place_req::<f64>(1, parallelism)
            .map_err(|_| LinearSolveError::WorkspaceOverflow)?;
        let req = factor_req
            .try_or(solve_req)
            .map_err(|_| LinearSolveError::WorkspaceOverflow)?;
        let qr_stack = GlobalPodBuffer::try_new(req).map_err(|_| LinearSolveError::WorkspaceAlloc)?;

        let qr_indices = vec![0usize; symbolic_qr.len_indices()];
        let qr_values = vec![0.0; symbolic_qr.len_values()];
        Ok(Self {
            pattern: pattern.clone(),
            symbolic_qr,
            qr_indices,
            qr_values,
            qr_stack,
        })
    }
}

/// Sparse QR factorization solve.
///
/// The symbolic factorization is kept until a Jacobian with a different
/// pattern arrives.
pub struct SparseDirect {
    parallelism: Parallelism,
    cache: Option<QrCache>,
    rhs: Vec<f64>,
}

impl SparseDirect {
    pub fn new(parallelism: Parallelism) -> Self {
        Self {
            parallelism,
            cache: None,
            rhs: Vec::new(),
        }
    }
}

impl Default for SparseDirect {
    fn default() -> Self {
        Self::new(Parallelism::None)
    }
}

impl LinearSolver for SparseDirect {
    fn solve(
        &mut self,
        jacobian: &Jacobian,
        rhs: &[f64],
        out: &mut [f64],
    ) -> Result<LinearSolve, LinearSolveError> {
        check_dims(jacobian, rhs, out)?;
        let a = jacobian.to_sparse();
        let m = a.nrows();
        let n = a.ncols();

        let stale = self
            .cache
            .as_ref()
            .map_or(true, |cache| cache.pattern != *a.pattern());
        if stale {
            self.cache = Some(QrCache::new(a.pattern(), self.parallelism)?);
        }
        let Some(cache) = self.cache.as_mut() else {
            return Err(LinearSolveError::WorkspaceAlloc);
        };

        self.rhs.clear();
        self.rhs.extend_from_slice(rhs);

        let mut stack = PodStack::new(&mut cache.qr_stack);
        let qr = cache.symbolic_qr.factorize_numeric_qr::<f64>(
            &mut cache.qr_indices,
            &mut cache.qr_values,
            a.as_faer(),
            self.parallelism,
            stack.rb_mut(),
        );

        let mut rhs_mat = mat::from_column_major_slice_mut::<f64>(&mut self.rhs, m, 1);
        let mut stack = PodStack::new(&mut cache.qr_stack);
        qr.solve_in_place_with_conj(
            Conj::No,
            rhs_mat.rb_mut(),
            self.parallelism,
            stack.rb_mut(),
        );

        // The solution is the first n entries of the solved system.
        let solution = &self.rhs[..n];
        if solution.iter().any(|v| !v.is_finite()) {
            return Err(LinearSolveError::Singular);
        }
        out.copy_from_slice(solution);
        Ok(LinearSolve::direct())
    }
}

pub(crate) fn dot(a: &[f64], b: &[f64]) -> f64 {
    let mut sum = 0.0;
    for (x, y) in a.iter().zip(b.iter()) {
        sum += x * y;
    }
    sum
}

pub(crate) fn l2_norm(x: &[f64]) -> f64 {
    dot(x, x).sqrt()
}

fn axpy(alpha: f64, x: &[f64], y: &mut [f64]) {
    for (yi, xi) in y.iter_mut().zip(x) {
        *yi += alpha * xi;
    }
}
