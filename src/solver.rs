use core::fmt;
use std::ops::Range;
use std::time::{Duration, Instant};

use crate::bounds::Bounds;
use crate::globalize::{armijo_factor, criterion, PseudoTransient, DEFAULT_ABS_TOL, DEFAULT_REL_TOL};
use crate::linear::{l2_norm, GmresOptions, LinearSolveError, LinearSolver, LinearSolverKind};
use crate::problem::Problem;
use crate::report::{
    emit_line, status_of, IterationReport, IterationResult, Reporter, StdoutReporter,
};

/// Errors raised by a solve.
///
/// Everything except `JacobianShape`, `BlockRange` and `Linear` is detected before the
/// first iteration.
#[derive(Debug)]
pub enum SolveError {
    /// dt0 or dtmax is negative or NaN.
    InvalidTimestep { dt0: f64, dtmax: f64 },
    /// bound_fac is outside (0, 1].
    InvalidBoundFactor { value: f64 },
    /// Lower and upper bound lists differ in length.
    BoundsShape { lower: usize, upper: usize },
    /// Bounds do not match the state length.
    BoundsLength { expected: usize, actual: usize },
    /// The seed lies outside the bounds.
    SeedOutOfBounds {
        index: usize,
        value: f64,
        lower: f64,
        upper: f64,
    },
    /// A split location is past the end of the state or decreasing.
    SplitLocation { loc: usize, len: usize },
    /// A block range does not fit inside the state.
    BlockRange { start: usize, end: usize, len: usize },
    /// The problem returned a Jacobian of the wrong shape.
    JacobianShape {
        expected: usize,
        nrows: usize,
        ncols: usize,
    },
    /// The linear solve failed.
    Linear(LinearSolveError),
}

impl fmt::Display for SolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidTimestep { dt0, dtmax } => {
                write!(f, "must specify positive dt0 and dtmax (got dt0={dt0}, dtmax={dtmax})")
            }
            Self::InvalidBoundFactor { value } => {
                write!(f, "bound_fac must lie in (0, 1] (got {value})")
            }
            Self::BoundsShape { lower, upper } => {
                write!(
                    f,
                    "bounds must be a lower and an upper list of equal length (got {lower} and {upper})"
                )
            }
            Self::BoundsLength { expected, actual } => {
                write!(
                    f,
                    "each bounds list must be as long as the solution vector ({actual} != {expected})"
                )
            }
            Self::SeedOutOfBounds {
                index,
                value,
                lower,
                upper,
            } => {
                write!(
                    f,
                    "seed must be within the provided bounds: x0[{index}] = {value} is outside [{lower}, {upper}]"
                )
            }
            Self::SplitLocation { loc, len } => {
                write!(f, "incorrect split location {loc} for a state of length {len}")
            }
            Self::BlockRange { start, end, len } => {
                write!(f, "block {start}..{end} does not fit a state of length {len}")
            }
            Self::JacobianShape {
                expected,
                nrows,
                ncols,
            } => {
                write!(f, "jacobian is {nrows}x{ncols}, expected {expected}x{expected}")
            }
            Self::Linear(err) => write!(f, "linear solve failed: {err}"),
        }
    }
}

impl std::error::Error for SolveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Linear(err) => Some(err),
            _ => None,
        }
    }
}

impl From<LinearSolveError> for SolveError {
    fn from(err: LinearSolveError) -> Self {
        Self::Linear(err)
    }
}

/// Options controlling a Newton or split-Newton solve.
#[derive(Debug, Clone)]
pub struct SolverOptions {
    /// Maximum number of iterations (outer sweeps for a split solve);
    /// `None` iterates until convergence.
    pub max_iters: Option<usize>,
    /// Linear solver used for the Newton correction.
    pub linear_solver: LinearSolverKind,
    /// Settings of the iterative linear solver.
    pub gmres: GmresOptions,
    /// Initial pseudo-timestep; zero disables pseudo-transient continuation.
    pub dt0: f64,
    /// Largest pseudo-timestep.
    pub dtmax: f64,
    /// Damp steps with the Armijo rule.
    pub armijo: bool,
    /// Box constraints; the seed must lie inside.
    pub bounds: Option<Bounds>,
    /// Fraction of the distance to a bound a step may cover.
    pub bound_fac: f64,
    /// Absolute scale of the convergence criterion.
    pub abs_tol: f64,
    /// Relative scale of the convergence criterion.
    pub rel_tol: f64,
    /// Emit per-iteration diagnostics to stdout by default.
    pub verbose: bool,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            max_iters: None,
            linear_solver: LinearSolverKind::DenseDirect,
            gmres: GmresOptions::default(),
            dt0: 0.0,
            dtmax: 1.0,
            armijo: false,
            bounds: None,
            bound_fac: 0.8,
            abs_tol: DEFAULT_ABS_TOL,
            rel_tol: DEFAULT_REL_TOL,
            verbose: false,
        }
    }
}

impl SolverOptions {
    /// Checks the options against a seed.
    pub fn validate(&self, x0: &[f64]) -> Result<(), SolveError> {
        if !(self.dt0 >= 0.0 && self.dtmax >= 0.0) {
            return Err(SolveError::InvalidTimestep {
                dt0: self.dt0,
                dtmax: self.dtmax,
            });
        }
        if !(self.bound_fac > 0.0 && self.bound_fac <= 1.0) {
            return Err(SolveError::InvalidBoundFactor {
                value: self.bound_fac,
            });
        }
        if let Some(bounds) = &self.bounds {
            bounds.validate_seed(x0)?;
        }
        Ok(())
    }

    /// Options for the block `range` of the state, with its own iteration cap.
    pub(crate) fn restricted(&self, range: Range<usize>, max_iters: Option<usize>) -> Self {
        Self {
            max_iters,
            bounds: self.bounds.as_ref().map(|b| b.slice(range)),
            verbose: false,
            ..self.clone()
        }
    }
}

pub(crate) enum ReporterSlot<'a> {
    External(&'a mut dyn Reporter),
    Local(StdoutReporter),
    None,
}

impl<'a> ReporterSlot<'a> {
    pub(crate) fn new(reporter: Option<&'a mut dyn Reporter>, verbose: bool) -> Self {
        match reporter {
            Some(r) => Self::External(r),
            None if verbose => Self::Local(StdoutReporter::new()),
            None => Self::None,
        }
    }

    pub(crate) fn as_mut(&mut self) -> Option<&mut dyn Reporter> {
        match self {
            Self::External(r) => Some(*r),
            Self::Local(r) => Some(r),
            Self::None => None,
        }
    }
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    if secs >= 1.0 {
        format!("{:.3} s", secs)
    } else if secs >= 1e-3 {
        format!("{:.3} ms", secs * 1e3)
    } else if secs >= 1e-6 {
        format!("{:.3} us", secs * 1e6)
    } else {
        format!("{:.0} ns", secs * 1e9)
    }
}

pub(crate) fn finish(
    result: IterationResult,
    start_time: Option<Instant>,
    reporter: &mut ReporterSlot<'_>,
) -> IterationResult {
    if let Some(reporter) = reporter.as_mut() {
        reporter.on_finish();
    }
    if let Some(start) = start_time {
        let elapsed = format_duration(start.elapsed());
        emit_line(&format!(
            "{:?} after {} iterations, time: {elapsed}",
            result.status, result.iterations
        ));
    }
    result
}

/// Solves `r(x) = 0` with a globalized Newton iteration.
///
/// Each iteration solves `J(x) raw = r(x)` and steps by `s = -raw`, with
/// optional pseudo-transient regularization of `J`, Armijo damping and
/// bound damping of `s`. Stops once the criterion of the last step is below
/// one or after `max_iters` iterations; running out of iterations is not an
/// error, check [`IterationResult::status`].
pub fn newton(
    problem: &mut impl Problem,
    x0: &[f64],
    options: &SolverOptions,
    reporter: Option<&mut dyn Reporter>,
) -> Result<IterationResult, SolveError> {
    options.validate(x0)?;
    let start_time = options.verbose.then(Instant::now);
    let mut reporter = ReporterSlot::new(reporter, options.verbose);
    let mut linear = options.linear_solver.build(&options.gmres);
    let result = newton_inner(problem, linear.as_mut(), x0, options, &mut reporter)?;
    Ok(finish(result, start_time, &mut reporter))
}

/// Newton iteration on an already validated problem.
pub(crate) fn newton_inner(
    problem: &mut dyn Problem,
    linear: &mut dyn LinearSolver,
    x0: &[f64],
    options: &SolverOptions,
    reporter: &mut ReporterSlot<'_>,
) -> Result<IterationResult, SolveError> {
    let n = x0.len();
    let mut x = x0.to_vec();
    if n == 0 {
        return Ok(IterationResult {
            x,
            step: None,
            iterations: 0,
            criterion: None,
            status: status_of(None, 0),
        });
    }

    let mut residuals = vec![0.0; n];
    problem.residuals(&x, &mut residuals);
    let f0 = l2_norm(&residuals);
    let mut ptc = PseudoTransient::new(options.dt0, options.dtmax, f0);

    let mut raw = vec![0.0; n];
    let mut trial = vec![0.0; n];
    let mut trial_residuals = vec![0.0; n];
    let mut step: Option<Vec<f64>> = None;
    let mut crit: Option<f64> = None;
    let mut iter = 0;

    while crit.map_or(true, |c| c >= 1.0) && options.max_iters.map_or(true, |max| iter < max) {
        // Jacobian and residual at the current iterate.
        let mut jacobian = problem.jacobian(&x);
        if jacobian.nrows() != n || jacobian.ncols() != n {
            return Err(SolveError::JacobianShape {
                expected: n,
                nrows: jacobian.nrows(),
                ncols: jacobian.ncols(),
            });
        }
        let dt = ptc.dt();
        if let Some(shift) = ptc.shift() {
            jacobian = jacobian.shifted(shift);
        }
        problem.residuals(&x, &mut residuals);
        let fnorm = l2_norm(&residuals);

        let outcome = linear.solve(&jacobian, &residuals, &mut raw)?;
        if !outcome.converged {
            log::warn!(
                "GMRES not converged: residual {:.3e} after {} iterations",
                outcome.residual_norm,
                outcome.iterations
            );
        }
        let mut s: Vec<f64> = raw.iter().map(|v| -v).collect();

        let armijo = if options.armijo {
            let fac = armijo_factor(problem, &x, &s, fnorm, &mut trial, &mut trial_residuals);
            scale(&mut s, fac);
            log::info!("armijo factor: {fac}");
            Some(fac)
        } else {
            None
        };

        let bound_scaling = options.bounds.as_ref().map(|bounds| {
            let factor = bounds.damping(&x, &s, options.bound_fac);
            scale(&mut s, factor);
            factor
        });

        let c = criterion(&x, &s, options.abs_tol, options.rel_tol);
        let step_norm = l2_norm(&s);
        log::info!("iteration {iter}: |r|={fnorm:.6e} |s|={step_norm:.6e} crit={c:.6e}");
        if dt != 0.0 {
            log::info!("timestep: {dt}");
        }

        for (xi, si) in x.iter_mut().zip(&s) {
            *xi += si;
        }
        ptc.update(fnorm);

        if let Some(reporter) = reporter.as_mut() {
            reporter.on_iteration(&IterationReport {
                iteration: iter,
                residual_norm: fnorm,
                criterion: c,
                step_norm,
                dt,
                armijo_factor: armijo,
                bound_scaling,
                linear_converged: outcome.converged,
                linear_iterations: outcome.iterations,
            });
        }

        iter += 1;
        step = Some(s);
        crit = Some(c);
    }

    Ok(IterationResult {
        x,
        step,
        iterations: iter,
        criterion: crit,
        status: status_of(crit, n),
    })
}

fn scale(x: &mut [f64], factor: f64) {
    for v in x {
        *v *= factor;
    }
}
