use std::ops::Range;

use crate::solver::SolveError;

/// Box constraints `lower <= x <= upper`.
///
/// `lower[i] <= upper[i]` is assumed, not checked.
#[derive(Debug, Clone, PartialEq)]
pub struct Bounds {
    lower: Vec<f64>,
    upper: Vec<f64>,
}

impl Bounds {
    pub fn new(lower: Vec<f64>, upper: Vec<f64>) -> Result<Self, SolveError> {
        if lower.len() != upper.len() {
            return Err(SolveError::BoundsShape {
                lower: lower.len(),
                upper: upper.len(),
            });
        }
        Ok(Self { lower, upper })
    }

    pub fn lower(&self) -> &[f64] {
        &self.lower
    }

    pub fn upper(&self) -> &[f64] {
        &self.upper
    }

    pub fn len(&self) -> usize {
        self.lower.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lower.is_empty()
    }

    /// Whether every entry of `x` lies inside the box.
    pub fn contains(&self, x: &[f64]) -> bool {
        self.first_violation(x).is_none()
    }

    fn first_violation(&self, x: &[f64]) -> Option<usize> {
        x.iter()
            .zip(self.lower.iter().zip(&self.upper))
            .position(|(&xi, (&lo, &hi))| !(lo <= xi && xi <= hi))
    }

    /// Checks the bounds against a seed before iterating.
    pub(crate) fn validate_seed(&self, x0: &[f64]) -> Result<(), SolveError> {
        if self.len() != x0.len() {
            return Err(SolveError::BoundsLength {
                expected: x0.len(),
                actual: self.len(),
            });
        }
        if let Some(index) = self.first_violation(x0) {
            return Err(SolveError::SeedOutOfBounds {
                index,
                value: x0[index],
                lower: self.lower[index],
                upper: self.upper[index],
            });
        }
        Ok(())
    }

    /// Bounds for the entries in `range`.
    pub fn slice(&self, range: Range<usize>) -> Self {
        Self {
            lower: self.lower[range.clone()].to_vec(),
            upper: self.upper[range].to_vec(),
        }
    }

    /// Largest factor in `[0, 1]` keeping `x + factor * step` a fraction
    /// `bound_fac` of the way to the nearest bound along each coordinate.
    pub fn damping(&self, x: &[f64], step: &[f64], bound_fac: f64) -> f64 {
        let mut best = 1.0_f64;
        for (i, &si) in step.iter().enumerate() {
            if si == 0.0 {
                continue;
            }
            let limit = if si < 0.0 { self.lower[i] } else { self.upper[i] };
            let legal_delta = bound_fac * (limit - x[i]);
            best = best.min(legal_delta / si);
        }
        best
    }
}
