use std::ops::Range;

use crate::jacobian::Jacobian;
use crate::solver::SolveError;

/// Nonlinear system `r(x) = 0` with residuals r(x) and Jacobian J(x).
///
/// `r` is typically the gradient of an objective and `J` its Hessian.
pub trait Problem {
    /// Fill residuals r(x); `residuals.len() == x.len()`.
    fn residuals(&mut self, x: &[f64], residuals: &mut [f64]);
    /// Square Jacobian of the residuals at x.
    fn jacobian(&mut self, x: &[f64]) -> Jacobian;
}

impl<P: Problem + ?Sized> Problem for &mut P {
    fn residuals(&mut self, x: &[f64], residuals: &mut [f64]) {
        (**self).residuals(x, residuals);
    }

    fn jacobian(&mut self, x: &[f64]) -> Jacobian {
        (**self).jacobian(x)
    }
}

/// A [`Problem`] built from a residual closure and a Jacobian closure.
pub struct FnProblem<R, J> {
    pub residuals: R,
    pub jacobian: J,
}

impl<R, J> FnProblem<R, J>
where
    R: FnMut(&[f64], &mut [f64]),
    J: FnMut(&[f64]) -> Jacobian,
{
    pub fn new(residuals: R, jacobian: J) -> Self {
        Self {
            residuals,
            jacobian,
        }
    }
}

impl<R, J> Problem for FnProblem<R, J>
where
    R: FnMut(&[f64], &mut [f64]),
    J: FnMut(&[f64]) -> Jacobian,
{
    fn residuals(&mut self, x: &[f64], residuals: &mut [f64]) {
        (self.residuals)(x, residuals);
    }

    fn jacobian(&mut self, x: &[f64]) -> Jacobian {
        (self.jacobian)(x)
    }
}

/// One contiguous block of a larger problem, the rest of the state frozen.
///
/// The full state is copied at construction, so later updates to the
/// caller's vector never leak into evaluations of the block. Residuals are
/// the block's slice of the parent residuals; the Jacobian is the square
/// diagonal block, so coupling terms to the frozen part are dropped.
pub struct Restriction<'a> {
    problem: &'a mut dyn Problem,
    range: Range<usize>,
    state: Vec<f64>,
    residuals: Vec<f64>,
}

impl<'a> Restriction<'a> {
    /// Restricts `problem` to `range`, freezing the other entries of `state`.
    pub fn new(
        problem: &'a mut dyn Problem,
        state: &[f64],
        range: Range<usize>,
    ) -> Result<Self, SolveError> {
        if range.start > range.end || range.end > state.len() {
            return Err(SolveError::BlockRange {
                start: range.start,
                end: range.end,
                len: state.len(),
            });
        }
        Ok(Self {
            problem,
            range,
            state: state.to_vec(),
            residuals: vec![0.0; state.len()],
        })
    }

    /// Index range of the block inside the parent state.
    pub fn range(&self) -> Range<usize> {
        self.range.clone()
    }

    /// Parent state last handed to the wrapped problem: the frozen entries
    /// plus the block values of the most recent evaluation.
    pub fn frozen_state(&self) -> &[f64] {
        &self.state
    }

    fn load(&mut self, x: &[f64]) {
        self.state[self.range.clone()].copy_from_slice(x);
    }
}

impl Problem for Restriction<'_> {
    fn residuals(&mut self, x: &[f64], residuals: &mut [f64]) {
        self.load(x);
        self.problem.residuals(&self.state, &mut self.residuals);
        residuals.copy_from_slice(&self.residuals[self.range.clone()]);
    }

    fn jacobian(&mut self, x: &[f64]) -> Jacobian {
        self.load(x);
        self.problem.jacobian(&self.state).block(self.range.clone())
    }
}
