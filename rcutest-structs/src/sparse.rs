use ndarray::{Array1, Array2};

/// Sparse 1-by-n vector in coordinate form. Duplicate indices are kept
/// as-is; densification sums them.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseVec {
    pub indices: Vec<usize>,
    pub values: Vec<f64>,
    pub len: usize,
}

impl SparseVec {
    pub fn new(len: usize, indices: Vec<usize>, values: Vec<f64>) -> Self {
        debug_assert_eq!(indices.len(), values.len());
        Self {
            indices,
            values,
            len,
        }
    }

    pub fn nnz(&self) -> usize {
        self.indices.len()
    }

    pub fn to_dense(&self) -> Array1<f64> {
        let mut out = Array1::zeros(self.len);
        for (&i, &v) in self.indices.iter().zip(self.values.iter()) {
            out[i] += v;
        }
        out
    }
}

/// Sparse matrix in coordinate (triplet) form with a fixed logical shape.
/// Duplicate (row, col) pairs are kept as-is; densification sums them.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseTriplet {
    pub rows: Vec<usize>,
    pub cols: Vec<usize>,
    pub values: Vec<f64>,
    pub shape: (usize, usize),
}

impl SparseTriplet {
    pub fn new(shape: (usize, usize), rows: Vec<usize>, cols: Vec<usize>, values: Vec<f64>) -> Self {
        debug_assert_eq!(rows.len(), cols.len());
        debug_assert_eq!(rows.len(), values.len());
        Self {
            rows,
            cols,
            values,
            shape,
        }
    }

    pub fn nnz(&self) -> usize {
        self.rows.len()
    }

    pub fn to_dense(&self) -> Array2<f64> {
        let mut out = Array2::zeros(self.shape);
        for ((&r, &c), &v) in self.rows.iter().zip(self.cols.iter()).zip(self.values.iter()) {
            out[[r, c]] += v;
        }
        out
    }

    /// Build a full symmetric n-by-n triplet set from upper-triangle-plus-
    /// diagonal entries (0-based). Off-diagonal entries are mirrored;
    /// diagonal entries are not duplicated, so the result holds
    /// `2 * nnz - ndiag` entries.
    pub fn from_upper_triangle(
        n: usize,
        rows: Vec<usize>,
        cols: Vec<usize>,
        values: Vec<f64>,
    ) -> Self {
        debug_assert_eq!(rows.len(), cols.len());
        debug_assert_eq!(rows.len(), values.len());
        let ndiag = rows
            .iter()
            .zip(cols.iter())
            .filter(|(r, c)| r == c)
            .count();
        let nnz = 2 * rows.len() - ndiag;
        let mut out_rows = Vec::with_capacity(nnz);
        let mut out_cols = Vec::with_capacity(nnz);
        let mut out_values = Vec::with_capacity(nnz);
        for ((&r, &c), &v) in rows.iter().zip(cols.iter()).zip(values.iter()) {
            out_rows.push(r);
            out_cols.push(c);
            out_values.push(v);
            if r != c {
                out_rows.push(c);
                out_cols.push(r);
                out_values.push(v);
            }
        }
        Self {
            rows: out_rows,
            cols: out_cols,
            values: out_values,
            shape: (n, n),
        }
    }
}
