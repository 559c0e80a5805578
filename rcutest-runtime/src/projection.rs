use ndarray::{Array1, Array2};
use rcutest_structs::{Error, Result, SparseTriplet, SparseVec, FIXED_VAR_TOL};

/// Free/fixed index mapping over the full variable space. All shrink
/// operations are pure and total on correctly-shaped input; shape mismatch
/// is the only failure.
#[derive(Debug, Clone)]
pub struct IndexProjection {
    idx_free: Vec<usize>,
    idx_fixed: Vec<usize>,
    /// Full-length vector holding each fixed variable's bound value; free
    /// positions are zero.
    fill_values: Array1<f64>,
    /// Full index to free index, None for fixed positions.
    free_index: Vec<Option<usize>>,
}

impl IndexProjection {
    /// Derive the mapping from the bound vectors: a variable is fixed when
    /// its bounds coincide within tolerance.
    pub fn from_bounds(bl: &Array1<f64>, bu: &Array1<f64>) -> Result<Self> {
        if bl.len() != bu.len() {
            return Err(Error::Shape {
                what: "bu",
                expected: bl.len(),
                got: bu.len(),
            });
        }
        let n = bl.len();
        let mut idx_free = Vec::new();
        let mut idx_fixed = Vec::new();
        let mut fill_values = Array1::zeros(n);
        let mut free_index = vec![None; n];
        for i in 0..n {
            if bu[i] - bl[i] <= FIXED_VAR_TOL {
                idx_fixed.push(i);
                fill_values[i] = bl[i];
            } else {
                free_index[i] = Some(idx_free.len());
                idx_free.push(i);
            }
        }
        Ok(Self {
            idx_free,
            idx_fixed,
            fill_values,
            free_index,
        })
    }

    /// Mapping that treats every variable as free.
    pub fn identity(n: usize) -> Self {
        Self {
            idx_free: (0..n).collect(),
            idx_fixed: Vec::new(),
            fill_values: Array1::zeros(n),
            free_index: (0..n).map(Some).collect(),
        }
    }

    pub fn n_full(&self) -> usize {
        self.free_index.len()
    }

    pub fn n_free(&self) -> usize {
        self.idx_free.len()
    }

    pub fn n_fixed(&self) -> usize {
        self.idx_fixed.len()
    }

    pub fn idx_free(&self) -> &[usize] {
        &self.idx_free
    }

    pub fn idx_fixed(&self) -> &[usize] {
        &self.idx_fixed
    }

    pub fn is_identity(&self) -> bool {
        self.idx_fixed.is_empty()
    }

    /// Select the free entries of a full-length vector.
    pub fn shrink(&self, full: &Array1<f64>) -> Result<Array1<f64>> {
        self.check_full("full vector", full.len())?;
        Ok(self.idx_free.iter().map(|&i| full[i]).collect())
    }

    /// Scatter a free-length vector back to full length. Fixed positions
    /// receive the stored bound values when `use_fill`, zeros otherwise.
    pub fn expand(&self, free: &Array1<f64>, use_fill: bool) -> Result<Array1<f64>> {
        if free.len() != self.n_free() {
            return Err(Error::Shape {
                what: "free vector",
                expected: self.n_free(),
                got: free.len(),
            });
        }
        let mut full = if use_fill {
            self.fill_values.clone()
        } else {
            Array1::zeros(self.n_full())
        };
        for (free_pos, &full_pos) in self.idx_free.iter().enumerate() {
            full[full_pos] = free[free_pos];
        }
        Ok(full)
    }

    /// Drop fixed-variable columns of an (m, n_full) matrix.
    pub fn shrink_matrix_cols(&self, full: &Array2<f64>) -> Result<Array2<f64>> {
        self.check_full("matrix columns", full.ncols())?;
        let mut out = Array2::zeros((full.nrows(), self.n_free()));
        for (j, &col) in self.idx_free.iter().enumerate() {
            for i in 0..full.nrows() {
                out[[i, j]] = full[[i, col]];
            }
        }
        Ok(out)
    }

    /// Drop fixed-variable rows and columns of an (n_full, n_full) matrix.
    pub fn shrink_matrix_rows_and_cols(&self, full: &Array2<f64>) -> Result<Array2<f64>> {
        self.check_full("matrix rows", full.nrows())?;
        self.check_full("matrix columns", full.ncols())?;
        let mut out = Array2::zeros((self.n_free(), self.n_free()));
        for (i, &row) in self.idx_free.iter().enumerate() {
            for (j, &col) in self.idx_free.iter().enumerate() {
                out[[i, j]] = full[[row, col]];
            }
        }
        Ok(out)
    }

    /// Drop fixed entries of a sparse vector and renumber the survivors
    /// into the free index space. Duplicate entries are preserved.
    pub fn shrink_sparse_vec(&self, v: &SparseVec) -> Result<SparseVec> {
        self.check_full("sparse vector", v.len)?;
        let mut indices = Vec::new();
        let mut values = Vec::new();
        for (&i, &val) in v.indices.iter().zip(v.values.iter()) {
            if let Some(free) = self.free_index.get(i).copied().flatten() {
                indices.push(free);
                values.push(val);
            }
        }
        Ok(SparseVec::new(self.n_free(), indices, values))
    }

    /// Drop triplet entries in fixed columns and renumber the rest.
    pub fn shrink_triplet_cols(&self, t: &SparseTriplet) -> Result<SparseTriplet> {
        self.check_full("triplet columns", t.shape.1)?;
        let mut rows = Vec::new();
        let mut cols = Vec::new();
        let mut values = Vec::new();
        for ((&r, &c), &val) in t.rows.iter().zip(t.cols.iter()).zip(t.values.iter()) {
            if let Some(free_col) = self.free_index.get(c).copied().flatten() {
                rows.push(r);
                cols.push(free_col);
                values.push(val);
            }
        }
        Ok(SparseTriplet::new(
            (t.shape.0, self.n_free()),
            rows,
            cols,
            values,
        ))
    }

    /// Drop triplet entries in fixed rows or columns and renumber the rest.
    pub fn shrink_triplet_rows_and_cols(&self, t: &SparseTriplet) -> Result<SparseTriplet> {
        self.check_full("triplet rows", t.shape.0)?;
        self.check_full("triplet columns", t.shape.1)?;
        let mut rows = Vec::new();
        let mut cols = Vec::new();
        let mut values = Vec::new();
        for ((&r, &c), &val) in t.rows.iter().zip(t.cols.iter()).zip(t.values.iter()) {
            let free_row = self.free_index.get(r).copied().flatten();
            let free_col = self.free_index.get(c).copied().flatten();
            if let (Some(fr), Some(fc)) = (free_row, free_col) {
                rows.push(fr);
                cols.push(fc);
                values.push(val);
            }
        }
        Ok(SparseTriplet::new(
            (self.n_free(), self.n_free()),
            rows,
            cols,
            values,
        ))
    }

    fn check_full(&self, what: &'static str, got: usize) -> Result<()> {
        if got != self.n_full() {
            return Err(Error::Shape {
                what,
                expected: self.n_full(),
                got,
            });
        }
        Ok(())
    }
}
