//! Hierarchical split-Newton.
//!
//! The state is cut at `locs[0]` into a prefix A and a suffix B. Every sweep
//! solves B to convergence with A frozen (recursing on the remaining cut
//! locations), then advances A by a single Newton step with the new B
//! frozen. This is a nonlinear block Gauss-Seidel iteration with B as the
//! fast inner system. Each block sees only its diagonal Jacobian block.

use std::time::Instant;

use crate::globalize::criterion;
use crate::linear::{l2_norm, LinearSolver};
use crate::problem::{Problem, Restriction};
use crate::report::{status_of, IterationResult, Reporter, SweepReport};
use crate::solver::{finish, newton_inner, ReporterSlot, SolveError, SolverOptions};

/// Solves `r(x) = 0` by recursive block relaxation over the split
/// locations `locs`.
///
/// Locations index into the full state, must not exceed its length and must
/// be non-decreasing. With no locations this is [`newton`](crate::newton).
/// `max_iters` caps the outer sweeps at every level; the iteration count
/// returned is the number of top-level sweeps.
pub fn split_newton(
    problem: &mut impl Problem,
    x0: &[f64],
    locs: &[usize],
    options: &SolverOptions,
    reporter: Option<&mut dyn Reporter>,
) -> Result<IterationResult, SolveError> {
    options.validate(x0)?;
    validate_locs(locs, x0.len())?;
    let start_time = options.verbose.then(Instant::now);
    let mut reporter = ReporterSlot::new(reporter, options.verbose);
    let mut linear = options.linear_solver.build(&options.gmres);
    let result = split_inner(problem, linear.as_mut(), x0, locs, options, &mut reporter)?;
    Ok(finish(result, start_time, &mut reporter))
}

fn validate_locs(locs: &[usize], len: usize) -> Result<(), SolveError> {
    let mut prev = 0;
    for &loc in locs {
        if loc > len || loc < prev {
            return Err(SolveError::SplitLocation { loc, len });
        }
        prev = loc;
    }
    Ok(())
}

fn split_inner(
    problem: &mut dyn Problem,
    linear: &mut dyn LinearSolver,
    x0: &[f64],
    locs: &[usize],
    options: &SolverOptions,
    reporter: &mut ReporterSlot<'_>,
) -> Result<IterationResult, SolveError> {
    let Some((&loc, rest)) = locs.split_first() else {
        return newton_inner(problem, linear, x0, options, reporter);
    };

    let n = x0.len();
    let prefix = 0..loc;
    let suffix = loc..n;
    let inner_locs: Vec<usize> = rest.iter().map(|&l| l - loc).collect();
    let prefix_options = options.restricted(prefix.clone(), Some(1));
    let suffix_options = options.restricted(suffix.clone(), options.max_iters);

    let mut x = x0.to_vec();
    let mut step: Option<Vec<f64>> = None;
    let mut crit: Option<f64> = None;
    let mut sweep = 0;

    while crit.map_or(true, |c| c >= 1.0) && options.max_iters.map_or(true, |max| sweep < max) {
        let mut x_new = x.clone();

        // B: solve to convergence with A frozen.
        let b = {
            let mut block = Restriction::new(problem, &x_new, suffix.clone())?;
            split_inner(
                &mut block,
                linear,
                &x_new[suffix.clone()],
                &inner_locs,
                &suffix_options,
                &mut ReporterSlot::None,
            )?
        };
        log::debug!("B block: {} iterations, {:?}", b.iterations, b.status);
        x_new[suffix.clone()].copy_from_slice(&b.x);

        // A: one Newton step with the updated B frozen.
        let a = {
            let mut block = Restriction::new(problem, &x_new, prefix.clone())?;
            newton_inner(
                &mut block,
                linear,
                &x_new[prefix.clone()],
                &prefix_options,
                &mut ReporterSlot::None,
            )?
        };
        log::debug!("A block: {} iterations, {:?}", a.iterations, a.status);
        x_new[prefix.clone()].copy_from_slice(&a.x);

        let s: Vec<f64> = x_new.iter().zip(&x).map(|(new, old)| new - old).collect();
        let c = criterion(&x, &s, options.abs_tol, options.rel_tol);
        let step_norm = l2_norm(&s);
        log::info!("sweep {sweep} (loc {loc}): |s|={step_norm:.6e} crit={c:.6e}");

        if let Some(reporter) = reporter.as_mut() {
            reporter.on_sweep(&SweepReport {
                sweep,
                loc,
                inner_iterations: b.iterations,
                criterion: c,
                step_norm,
            });
        }

        x = x_new;
        step = Some(s);
        crit = Some(c);
        sweep += 1;
    }

    Ok(IterationResult {
        x,
        step,
        iterations: sweep,
        criterion: crit,
        status: status_of(crit, n),
    })
}
