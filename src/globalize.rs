//! Stopping rule and globalization of the Newton step.

use crate::linear::l2_norm;
use crate::problem::Problem;

/// Default absolute scale of the convergence criterion.
pub const DEFAULT_ABS_TOL: f64 = 1e-5;
/// Default relative scale of the convergence criterion.
pub const DEFAULT_REL_TOL: f64 = 1e-6;

/// Scaled step norm `|| s / (x * rel_tol + abs_tol) ||_2`.
///
/// A step is converged when this is below one. Zero entries of the step
/// contribute nothing, even where the scale `x * rel_tol + abs_tol` is zero.
pub fn criterion(x: &[f64], step: &[f64], abs_tol: f64, rel_tol: f64) -> f64 {
    let mut sum = 0.0;
    for (xi, si) in x.iter().zip(step) {
        if *si == 0.0 {
            continue;
        }
        let scaled = si / (xi * rel_tol + abs_tol);
        sum += scaled * scaled;
    }
    sum.sqrt()
}

/// Pseudo-transient continuation with the switched evolution relaxation
/// (SER) timestep rule.
///
/// While `dt != 0` the Jacobian is shifted by `1 / dt` on the diagonal.
/// After every step `dt = min(dt0 * f0 / fn, dtmax)`, so the shift fades as
/// the residual norm `fn` falls below the initial one `f0`. `dt0 == 0`
/// disables the continuation for the whole solve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PseudoTransient {
    dt0: f64,
    dtmax: f64,
    f0: f64,
    dt: f64,
}

impl PseudoTransient {
    pub fn new(dt0: f64, dtmax: f64, f0: f64) -> Self {
        Self {
            dt0,
            dtmax,
            f0,
            dt: dt0,
        }
    }

    /// Current timestep.
    pub fn dt(&self) -> f64 {
        self.dt
    }

    /// Diagonal shift `1 / dt`, if the continuation is active.
    pub fn shift(&self) -> Option<f64> {
        (self.dt != 0.0).then(|| 1.0 / self.dt)
    }

    /// SER update from the residual norm of the iterate just stepped from.
    pub fn update(&mut self, residual_norm: f64) {
        self.dt = (self.dt0 * self.f0 / (residual_norm + f64::EPSILON)).min(self.dtmax);
    }
}

/// Sufficient-decrease constant of the Armijo test.
pub const ARMIJO_ALPHA: f64 = 1e-4;
/// Number of step halvings tried by the Armijo search.
pub const ARMIJO_HALVINGS: i32 = 9;

/// Backtracking Armijo search over `fac = 2^-1 .. 2^-9`.
///
/// Returns the first `fac` with `||r(x + fac * s)|| <= (1 - alpha * fac) * fn`,
/// or the last one tried. `trial` and `residuals` are scratch buffers of the
/// state length.
pub(crate) fn armijo_factor(
    problem: &mut dyn Problem,
    x: &[f64],
    step: &[f64],
    residual_norm: f64,
    trial: &mut [f64],
    residuals: &mut [f64],
) -> f64 {
    let mut fac = 1.0;
    for i in 1..=ARMIJO_HALVINGS {
        fac = 2f64.powi(-i);
        for ((t, xi), si) in trial.iter_mut().zip(x).zip(step) {
            *t = xi + fac * si;
        }
        problem.residuals(trial, residuals);
        let trial_norm = l2_norm(residuals);
        log::debug!("armijo: fac={fac:e} trial={trial_norm:.6e} fn={residual_norm:.6e}");
        if trial_norm <= (1.0 - ARMIJO_ALPHA * fac) * residual_norm {
            break;
        }
    }
    fac
}
