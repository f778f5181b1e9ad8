use std::borrow::Cow;
use std::ops::Range;

use faer_core::sparse::SparseColMatRef;
use nalgebra::DMatrix;

use crate::pattern::{JacobianPattern, PatternError};

/// Sparse Jacobian values stored against a fixed CSC pattern.
#[derive(Debug, Clone)]
pub struct SparseJacobian {
    pattern: JacobianPattern,
    values: Vec<f64>,
}

impl SparseJacobian {
    /// Pairs a pattern with one value per stored entry.
    pub fn new(pattern: JacobianPattern, values: Vec<f64>) -> Result<Self, PatternError> {
        if values.len() != pattern.nnz() {
            return Err(PatternError::ValueCount {
                expected: pattern.nnz(),
                actual: values.len(),
            });
        }
        Ok(Self { pattern, values })
    }

    /// Builds a matrix from zero-based `(row, col, value)` entries.
    ///
    /// Duplicate entries are summed.
    pub fn from_triplets(
        nrows: usize,
        ncols: usize,
        entries: &[(usize, usize, f64)],
    ) -> Result<Self, PatternError> {
        let mut cols: Vec<Vec<(usize, f64)>> = vec![Vec::new(); ncols];
        for &(row, col, value) in entries {
            if col >= ncols {
                return Err(PatternError::ColIndexOutOfBounds { col, ncols });
            }
            if row >= nrows {
                return Err(PatternError::RowIndexOutOfBounds { col, row, nrows });
            }
            cols[col].push((row, value));
        }

        let mut col_ptrs = Vec::with_capacity(ncols + 1);
        let mut row_indices = Vec::with_capacity(entries.len());
        let mut values = Vec::with_capacity(entries.len());
        col_ptrs.push(0);
        for mut col_entries in cols {
            col_entries.sort_unstable_by_key(|&(row, _)| row);
            let col_start = row_indices.len();
            for (row, value) in col_entries {
                if row_indices.len() > col_start && row_indices.last() == Some(&row) {
                    if let Some(last) = values.last_mut() {
                        *last += value;
                    }
                    continue;
                }
                row_indices.push(row);
                values.push(value);
            }
            col_ptrs.push(row_indices.len());
        }

        let pattern = JacobianPattern::new(nrows, ncols, col_ptrs, row_indices)?;
        Self::new(pattern, values)
    }

    /// Copies the non-zero entries of a dense matrix.
    pub fn from_dense(matrix: &DMatrix<f64>) -> Self {
        let (nrows, ncols) = matrix.shape();
        let mut col_ptrs = Vec::with_capacity(ncols + 1);
        let mut row_indices = Vec::new();
        let mut values = Vec::new();
        col_ptrs.push(0);
        for col in 0..ncols {
            for row in 0..nrows {
                let value = matrix[(row, col)];
                if value != 0.0 {
                    row_indices.push(row);
                    values.push(value);
                }
            }
            col_ptrs.push(row_indices.len());
        }
        Self {
            pattern: JacobianPattern::from_raw_parts(nrows, ncols, col_ptrs, row_indices),
            values,
        }
    }

    /// Dense copy of this matrix.
    pub fn to_dense(&self) -> DMatrix<f64> {
        let mut dense = DMatrix::zeros(self.nrows(), self.ncols());
        for col in 0..self.ncols() {
            for idx in self.pattern.col_range(col) {
                dense[(self.pattern.row_indices()[idx], col)] += self.values[idx];
            }
        }
        dense
    }

    pub fn pattern(&self) -> &JacobianPattern {
        &self.pattern
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut [f64] {
        &mut self.values
    }

    pub fn nrows(&self) -> usize {
        self.pattern.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.pattern.ncols()
    }

    /// Values for the given column, aligned with `pattern().row_indices_of_col(col)`.
    pub fn values_of_col(&self, col: usize) -> &[f64] {
        &self.values[self.pattern.col_range(col)]
    }

    /// Computes `out = J * x`.
    pub fn mul_vec(&self, x: &[f64], out: &mut [f64]) {
        out.fill(0.0);
        let rows = self.pattern.row_indices();
        for (col, &xc) in x.iter().enumerate().take(self.ncols()) {
            if xc == 0.0 {
                continue;
            }
            for idx in self.pattern.col_range(col) {
                out[rows[idx]] += self.values[idx] * xc;
            }
        }
    }

    /// Square block `[range, range]`.
    pub fn block(&self, range: Range<usize>) -> Self {
        let (pattern, positions) = self.pattern.block(range);
        let values = positions.iter().map(|&idx| self.values[idx]).collect();
        Self { pattern, values }
    }

    /// `J + shift * I`, inserting diagonal entries that are not stored.
    pub fn shifted(&self, shift: f64) -> Self {
        let augmented = self.pattern.with_diagonal();
        let mut values = vec![0.0; augmented.pattern.nnz()];
        for (&pos, &value) in augmented.source_positions.iter().zip(&self.values) {
            values[pos] = value;
        }
        for &pos in &augmented.diag_positions {
            values[pos] += shift;
        }
        Self {
            pattern: augmented.pattern,
            values,
        }
    }

    pub(crate) fn as_faer(&self) -> SparseColMatRef<'_, usize, f64> {
        SparseColMatRef::<'_, usize, f64>::new(self.pattern.as_symbolic(), self.values.as_slice())
    }
}

/// Jacobian returned by a [`Problem`](crate::Problem), dense or sparse.
///
/// The representation does not have to match the linear solver; solvers
/// convert as needed.
#[derive(Debug, Clone)]
pub enum Jacobian {
    Dense(DMatrix<f64>),
    Sparse(SparseJacobian),
}

impl Jacobian {
    pub fn nrows(&self) -> usize {
        match self {
            Self::Dense(m) => m.nrows(),
            Self::Sparse(m) => m.nrows(),
        }
    }

    pub fn ncols(&self) -> usize {
        match self {
            Self::Dense(m) => m.ncols(),
            Self::Sparse(m) => m.ncols(),
        }
    }

    /// Square block `[range, range]`, keeping the representation.
    pub fn block(&self, range: Range<usize>) -> Self {
        match self {
            Self::Dense(m) => {
                let start = range.start;
                let len = range.len();
                Self::Dense(DMatrix::from_fn(len, len, |i, j| m[(start + i, start + j)]))
            }
            Self::Sparse(m) => Self::Sparse(m.block(range)),
        }
    }

    /// `J + shift * I`.
    pub fn shifted(self, shift: f64) -> Self {
        match self {
            Self::Dense(mut m) => {
                for i in 0..m.nrows().min(m.ncols()) {
                    m[(i, i)] += shift;
                }
                Self::Dense(m)
            }
            Self::Sparse(m) => Self::Sparse(m.shifted(shift)),
        }
    }

    pub fn to_dense(&self) -> Cow<'_, DMatrix<f64>> {
        match self {
            Self::Dense(m) => Cow::Borrowed(m),
            Self::Sparse(m) => Cow::Owned(m.to_dense()),
        }
    }

    pub fn to_sparse(&self) -> Cow<'_, SparseJacobian> {
        match self {
            Self::Dense(m) => Cow::Owned(SparseJacobian::from_dense(m)),
            Self::Sparse(m) => Cow::Borrowed(m),
        }
    }
}

impl From<DMatrix<f64>> for Jacobian {
    fn from(matrix: DMatrix<f64>) -> Self {
        Self::Dense(matrix)
    }
}

impl From<SparseJacobian> for Jacobian {
    fn from(matrix: SparseJacobian) -> Self {
        Self::Sparse(matrix)
    }
}
