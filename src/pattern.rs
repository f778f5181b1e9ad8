use core::fmt;
use core::ops::Range;

use faer_core::sparse::SymbolicSparseColMatRef;

/// Column-compressed sparsity pattern for a Jacobian J(x).
///
/// Indices are zero-based; each column's row indices must be sorted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JacobianPattern {
    nrows: usize,
    ncols: usize,
    col_ptrs: Vec<usize>,
    row_indices: Vec<usize>,
}

/// Why a pattern or its values were rejected.
#[derive(Debug, Clone)]
pub enum PatternError {
    /// col_ptrs does not hold ncols + 1 entries.
    ColPtrLen { expected: usize, actual: usize },
    /// col_ptrs[col] is out of place: the first pointer must be 0, the
    /// pointers non-decreasing, the last one equal to the number of entries.
    ColPtr { col: usize, value: usize },
    /// A row index is >= nrows.
    RowIndexOutOfBounds { col: usize, row: usize, nrows: usize },
    /// Row indices of a column are not strictly increasing.
    RowIndexNotSorted { col: usize, prev: usize, next: usize },
    /// A column index is >= ncols.
    ColIndexOutOfBounds { col: usize, ncols: usize },
    /// The number of values does not match the number of stored entries.
    ValueCount { expected: usize, actual: usize },
}

impl fmt::Display for PatternError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ColPtrLen { expected, actual } => {
                write!(f, "expected {expected} column pointers, got {actual}")
            }
            Self::ColPtr { col, value } => write!(f, "bad column pointer {value} at {col}"),
            Self::RowIndexOutOfBounds { col, row, nrows } => {
                write!(f, "row {row} of column {col} is outside 0..{nrows}")
            }
            Self::RowIndexNotSorted { col, prev, next } => {
                write!(f, "rows of column {col} are not increasing ({prev} then {next})")
            }
            Self::ColIndexOutOfBounds { col, ncols } => {
                write!(f, "column {col} is outside 0..{ncols}")
            }
            Self::ValueCount { expected, actual } => {
                write!(f, "got {actual} values for a pattern with {expected} entries")
            }
        }
    }
}

impl std::error::Error for PatternError {}

impl JacobianPattern {
    /// Validates zero-based CSC arrays.
    ///
    /// `col_ptrs` holds `ncols + 1` non-decreasing offsets from `0` to
    /// `row_indices.len()`; rows are strictly increasing within a column.
    pub fn new(
        nrows: usize,
        ncols: usize,
        col_ptrs: Vec<usize>,
        row_indices: Vec<usize>,
    ) -> Result<Self, PatternError> {
        if col_ptrs.len() != ncols + 1 {
            return Err(PatternError::ColPtrLen {
                expected: ncols + 1,
                actual: col_ptrs.len(),
            });
        }
        if col_ptrs[0] != 0 {
            return Err(PatternError::ColPtr { col: 0, value: col_ptrs[0] });
        }
        if let Some(col) = (0..ncols).find(|&c| col_ptrs[c] > col_ptrs[c + 1]) {
            return Err(PatternError::ColPtr { col: col + 1, value: col_ptrs[col + 1] });
        }
        if col_ptrs[ncols] != row_indices.len() {
            return Err(PatternError::ColPtr { col: ncols, value: col_ptrs[ncols] });
        }

        for col in 0..ncols {
            let rows = &row_indices[col_ptrs[col]..col_ptrs[col + 1]];
            if let Some(&row) = rows.iter().find(|&&row| row >= nrows) {
                return Err(PatternError::RowIndexOutOfBounds { col, row, nrows });
            }
            if let Some(pair) = rows.windows(2).find(|pair| pair[0] >= pair[1]) {
                return Err(PatternError::RowIndexNotSorted {
                    col,
                    prev: pair[0],
                    next: pair[1],
                });
            }
        }

        Ok(Self {
            nrows,
            ncols,
            col_ptrs,
            row_indices,
        })
    }

    /// Pattern from arrays already known to satisfy the CSC rules.
    pub(crate) fn from_raw_parts(
        nrows: usize,
        ncols: usize,
        col_ptrs: Vec<usize>,
        row_indices: Vec<usize>,
    ) -> Self {
        debug_assert_eq!(col_ptrs.len(), ncols + 1);
        Self {
            nrows,
            ncols,
            col_ptrs,
            row_indices,
        }
    }

    /// Fully populated pattern with every entry stored.
    pub fn dense(nrows: usize, ncols: usize) -> Self {
        let col_ptrs = (0..=ncols).map(|col| col * nrows).collect();
        let row_indices = (0..ncols).flat_map(|_| 0..nrows).collect();
        Self {
            nrows,
            ncols,
            col_ptrs,
            row_indices,
        }
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    /// Number of stored entries.
    pub fn nnz(&self) -> usize {
        self.row_indices.len()
    }

    pub fn col_ptrs(&self) -> &[usize] {
        &self.col_ptrs
    }

    pub fn row_indices(&self) -> &[usize] {
        &self.row_indices
    }

    /// Positions of column `col` in `row_indices` and in the value array.
    pub fn col_range(&self, col: usize) -> Range<usize> {
        self.col_ptrs[col]..self.col_ptrs[col + 1]
    }

    pub fn row_indices_of_col(&self, col: usize) -> &[usize] {
        &self.row_indices[self.col_range(col)]
    }

    /// Square block `[range, range]` of this pattern.
    ///
    /// Also returns, for every entry of the block, its position in this
    /// pattern so values can be gathered.
    pub(crate) fn block(&self, range: Range<usize>) -> (JacobianPattern, Vec<usize>) {
        let offset = range.start;
        let len = range.len();
        let mut col_ptrs = Vec::with_capacity(len + 1);
        let mut row_indices = Vec::new();
        let mut positions = Vec::new();
        col_ptrs.push(0);
        for col in range.clone() {
            for idx in self.col_range(col) {
                let row = self.row_indices[idx];
                if range.contains(&row) {
                    row_indices.push(row - offset);
                    positions.push(idx);
                }
            }
            col_ptrs.push(row_indices.len());
        }
        let pattern = Self {
            nrows: len,
            ncols: len,
            col_ptrs,
            row_indices,
        };
        (pattern, positions)
    }

    /// This pattern with every diagonal entry present.
    ///
    /// Only meaningful for square patterns.
    pub(crate) fn with_diagonal(&self) -> DiagonalPattern {
        debug_assert_eq!(self.nrows, self.ncols);
        let ncols = self.ncols;
        let mut col_ptrs = Vec::with_capacity(ncols + 1);
        let mut row_indices = Vec::with_capacity(self.nnz() + ncols);
        let mut source_positions = Vec::with_capacity(self.nnz());
        let mut diag_positions = Vec::with_capacity(ncols);
        col_ptrs.push(0);
        for col in 0..ncols {
            let mut diag_placed = false;
            for idx in self.col_range(col) {
                let row = self.row_indices[idx];
                if !diag_placed && row > col {
                    diag_positions.push(row_indices.len());
                    row_indices.push(col);
                    diag_placed = true;
                }
                if row == col {
                    diag_positions.push(row_indices.len());
                    diag_placed = true;
                }
                source_positions.push(row_indices.len());
                row_indices.push(row);
            }
            if !diag_placed {
                diag_positions.push(row_indices.len());
                row_indices.push(col);
            }
            col_ptrs.push(row_indices.len());
        }

        DiagonalPattern {
            pattern: Self {
                nrows: self.nrows,
                ncols,
                col_ptrs,
                row_indices,
            },
            source_positions,
            diag_positions,
        }
    }

    pub(crate) fn as_symbolic(&self) -> SymbolicSparseColMatRef<'_, usize> {
        unsafe {
            SymbolicSparseColMatRef::new_unchecked(
                self.nrows,
                self.ncols,
                &self.col_ptrs,
                None,
                &self.row_indices,
            )
        }
    }
}

/// A square pattern extended so that every diagonal entry is stored.
#[derive(Debug)]
pub(crate) struct DiagonalPattern {
    pub(crate) pattern: JacobianPattern,
    /// New position of each entry of the source pattern.
    pub(crate) source_positions: Vec<usize>,
    /// Position of the diagonal entry of each column.
    pub(crate) diag_positions: Vec<usize>,
}
