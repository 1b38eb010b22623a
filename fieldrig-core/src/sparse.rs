//! Sparse matrix storage.
//!
//! Physics modules assemble into [`BlockCrsMatrix`] blocks: block-compressed
//! rows where every nonzero is a small dense `len_row × len_col` block.
//! Solvers work on the flattened scalar view, built through
//! [`TripletMatrix`] into a nalgebra-sparse CSR matrix.

use crate::error::{Error, Result};
use nalgebra_sparse::coo::CooMatrix;
use nalgebra_sparse::csr::CsrMatrix as NalgebraCsr;
use std::collections::BTreeSet;

/// Compressed Sparse Row matrix.
pub type CsrMatrix = NalgebraCsr<f64>;

/// Builder for assembling a sparse matrix from triplets (COO format).
///
/// Accumulates (row, col, value) triplets and converts to CSR when complete.
pub struct TripletMatrix {
    n_rows: usize,
    n_cols: usize,
    rows: Vec<usize>,
    cols: Vec<usize>,
    values: Vec<f64>,
}

impl TripletMatrix {
    /// Create a new triplet matrix builder.
    pub fn new(n_rows: usize, n_cols: usize) -> Self {
        Self::with_capacity(n_rows, n_cols, 0)
    }

    /// Create with estimated capacity.
    pub fn with_capacity(n_rows: usize, n_cols: usize, nnz_estimate: usize) -> Self {
        Self {
            n_rows,
            n_cols,
            rows: Vec::with_capacity(nnz_estimate),
            cols: Vec::with_capacity(nnz_estimate),
            values: Vec::with_capacity(nnz_estimate),
        }
    }

    /// Add a value at (row, col). Duplicates are summed during conversion.
    ///
    /// Explicit zeros are kept so the flattened pattern matches the block
    /// pattern, which the incomplete factorization relies on.
    pub fn add(&mut self, row: usize, col: usize, value: f64) {
        debug_assert!(row < self.n_rows, "Row index out of bounds");
        debug_assert!(col < self.n_cols, "Column index out of bounds");
        self.rows.push(row);
        self.cols.push(col);
        self.values.push(value);
    }

    /// Number of stored triplets.
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Convert to CSR format, summing duplicate entries.
    pub fn to_csr(self) -> Result<CsrMatrix> {
        let coo = CooMatrix::try_from_triplets(self.n_rows, self.n_cols, self.rows, self.cols, self.values)
            .map_err(|e| Error::Assembly(format!("invalid triplet data: {e}")))?;
        Ok(CsrMatrix::from(&coo))
    }
}

/// Block-level sparsity pattern under construction.
#[derive(Debug, Clone, Default)]
pub struct BlockPattern {
    rows: Vec<BTreeSet<usize>>,
}

impl BlockPattern {
    pub fn new(nblk_row: usize) -> Self {
        Self {
            rows: vec![BTreeSet::new(); nblk_row],
        }
    }

    pub fn insert(&mut self, iblk: usize, jblk: usize) {
        self.rows[iblk].insert(jblk);
    }

    /// Couple every row block with every column block of one element.
    pub fn add_element(&mut self, rows: &[usize], cols: &[usize]) {
        for &i in rows {
            self.rows[i].extend(cols.iter().copied());
        }
    }

    /// Add every diagonal block.
    pub fn add_diagonal(&mut self) {
        for (i, row) in self.rows.iter_mut().enumerate() {
            row.insert(i);
        }
    }

    pub fn nblk_row(&self) -> usize {
        self.rows.len()
    }
}

/// Block CRS matrix with dense `len_row × len_col` blocks.
#[derive(Debug, Clone)]
pub struct BlockCrsMatrix {
    nblk_row: usize,
    nblk_col: usize,
    len_row: usize,
    len_col: usize,
    row_ptr: Vec<usize>,
    col_idx: Vec<usize>,
    values: Vec<f64>,
}

impl BlockCrsMatrix {
    /// Empty matrix (no stored blocks).
    pub fn new(nblk_row: usize, nblk_col: usize, len_row: usize, len_col: usize) -> Self {
        Self {
            nblk_row,
            nblk_col,
            len_row,
            len_col,
            row_ptr: vec![0; nblk_row + 1],
            col_idx: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Union the stored pattern with `pattern`; all values are reset to zero.
    pub fn add_pattern(&mut self, pattern: &BlockPattern) -> Result<()> {
        if pattern.nblk_row() != self.nblk_row {
            return Err(Error::Assembly(format!(
                "pattern has {} block rows, matrix has {}",
                pattern.nblk_row(),
                self.nblk_row
            )));
        }
        let mut row_ptr = Vec::with_capacity(self.nblk_row + 1);
        let mut col_idx = Vec::new();
        row_ptr.push(0);
        for iblk in 0..self.nblk_row {
            let mut cols: BTreeSet<usize> = self.col_idx[self.row_ptr[iblk]..self.row_ptr[iblk + 1]]
                .iter()
                .copied()
                .collect();
            cols.extend(pattern.rows[iblk].iter().copied());
            if let Some(&last) = cols.iter().next_back() {
                if last >= self.nblk_col {
                    return Err(Error::Assembly(format!(
                        "pattern column {last} out of range ({} block columns)",
                        self.nblk_col
                    )));
                }
            }
            col_idx.extend(cols);
            row_ptr.push(col_idx.len());
        }
        self.values = vec![0.0; col_idx.len() * self.len_row * self.len_col];
        self.row_ptr = row_ptr;
        self.col_idx = col_idx;
        Ok(())
    }

    pub fn nblk_row(&self) -> usize {
        self.nblk_row
    }

    pub fn nblk_col(&self) -> usize {
        self.nblk_col
    }

    /// Block height.
    pub fn len_row(&self) -> usize {
        self.len_row
    }

    /// Block width.
    pub fn len_col(&self) -> usize {
        self.len_col
    }

    /// Number of stored blocks.
    pub fn nnz_blocks(&self) -> usize {
        self.col_idx.len()
    }

    /// Zero every stored block.
    pub fn set_zero(&mut self) {
        self.values.iter_mut().for_each(|v| *v = 0.0);
    }

    fn find(&self, iblk: usize, jblk: usize) -> Option<usize> {
        let start = self.row_ptr[iblk];
        let cols = &self.col_idx[start..self.row_ptr[iblk + 1]];
        cols.binary_search(&jblk).ok().map(|k| start + k)
    }

    fn block_size(&self) -> usize {
        self.len_row * self.len_col
    }

    /// Stored block (row-major), if (iblk, jblk) is in the pattern.
    pub fn block(&self, iblk: usize, jblk: usize) -> Option<&[f64]> {
        let bs = self.block_size();
        self.find(iblk, jblk).map(|k| &self.values[k * bs..(k + 1) * bs])
    }

    /// Value of a single scalar entry; zero outside the pattern.
    pub fn get(&self, iblk: usize, jblk: usize, idof: usize, jdof: usize) -> f64 {
        self.block(iblk, jblk)
            .map(|b| b[idof * self.len_col + jdof])
            .unwrap_or(0.0)
    }

    /// Accumulate an element matrix at the product of `rows × cols`.
    ///
    /// `emat` is laid out `[row node][col node][row dof][col dof]`.
    pub fn mearge(&mut self, rows: &[usize], cols: &[usize], emat: &[f64]) -> Result<()> {
        let bs = self.block_size();
        if emat.len() != rows.len() * cols.len() * bs {
            return Err(Error::Assembly(format!(
                "element matrix has {} entries, expected {}",
                emat.len(),
                rows.len() * cols.len() * bs
            )));
        }
        for (ir, &iblk) in rows.iter().enumerate() {
            for (jc, &jblk) in cols.iter().enumerate() {
                let k = self.find(iblk, jblk).ok_or_else(|| {
                    Error::Assembly(format!("block ({iblk}, {jblk}) is outside the sparsity pattern"))
                })?;
                let src = &emat[(ir * cols.len() + jc) * bs..(ir * cols.len() + jc + 1) * bs];
                for (dst, s) in self.values[k * bs..(k + 1) * bs].iter_mut().zip(src) {
                    *dst += *s;
                }
            }
        }
        Ok(())
    }

    /// y += alpha * A * x on flat block vectors.
    pub fn mat_vec(&self, alpha: f64, x: &[f64], y: &mut [f64]) {
        let (lr, lc) = (self.len_row, self.len_col);
        let bs = self.block_size();
        for iblk in 0..self.nblk_row {
            for k in self.row_ptr[iblk]..self.row_ptr[iblk + 1] {
                let jblk = self.col_idx[k];
                let blk = &self.values[k * bs..(k + 1) * bs];
                for idof in 0..lr {
                    let mut sum = 0.0;
                    for jdof in 0..lc {
                        sum += blk[idof * lc + jdof] * x[jblk * lc + jdof];
                    }
                    y[iblk * lr + idof] += alpha * sum;
                }
            }
        }
    }

    /// Zero one scalar row.
    pub fn zero_row(&mut self, iblk: usize, idof: usize) {
        let (lc, bs) = (self.len_col, self.block_size());
        for k in self.row_ptr[iblk]..self.row_ptr[iblk + 1] {
            for jdof in 0..lc {
                self.values[k * bs + idof * lc + jdof] = 0.0;
            }
        }
    }

    /// Zero one scalar column.
    pub fn zero_col(&mut self, jblk: usize, jdof: usize) {
        let (lr, lc, bs) = (self.len_row, self.len_col, self.block_size());
        for k in 0..self.col_idx.len() {
            if self.col_idx[k] == jblk {
                for idof in 0..lr {
                    self.values[k * bs + idof * lc + jdof] = 0.0;
                }
            }
        }
    }

    /// Put 1 on a scalar diagonal entry; no-op if the diagonal block is absent.
    pub fn set_unit_diag(&mut self, iblk: usize, idof: usize) {
        let (lc, bs) = (self.len_col, self.block_size());
        if let Some(k) = self.find(iblk, iblk) {
            self.values[k * bs + idof * lc + idof] = 1.0;
        }
    }

    /// Visit every stored scalar as (row, col, value) in block-local indices.
    pub fn for_each_entry(&self, mut f: impl FnMut(usize, usize, f64)) {
        let (lr, lc, bs) = (self.len_row, self.len_col, self.block_size());
        for iblk in 0..self.nblk_row {
            for k in self.row_ptr[iblk]..self.row_ptr[iblk + 1] {
                let jblk = self.col_idx[k];
                for idof in 0..lr {
                    for jdof in 0..lc {
                        f(iblk * lr + idof, jblk * lc + jdof, self.values[k * bs + idof * lc + jdof]);
                    }
                }
            }
        }
    }
}

/// Fixed (Dirichlet) degrees of freedom of one block vector.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BcFlags {
    nblk: usize,
    len: usize,
    flags: Vec<bool>,
}

impl BcFlags {
    pub fn new(nblk: usize, len: usize) -> Self {
        Self {
            nblk,
            len,
            flags: vec![false; nblk * len],
        }
    }

    pub fn nblk(&self) -> usize {
        self.nblk
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    /// Mark a dof as fixed.
    pub fn set(&mut self, iblk: usize, idof: usize) -> Result<()> {
        if iblk >= self.nblk || idof >= self.len {
            return Err(Error::Invariant(format!(
                "boundary flag ({iblk}, {idof}) outside {}x{}",
                self.nblk, self.len
            )));
        }
        self.flags[iblk * self.len + idof] = true;
        Ok(())
    }

    pub fn is_fixed(&self, iblk: usize, idof: usize) -> bool {
        self.flags[iblk * self.len + idof]
    }

    pub fn clear(&mut self) {
        self.flags.iter_mut().for_each(|f| *f = false);
    }

    /// Fixed dofs as (block, dof) pairs.
    pub fn fixed(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        let len = self.len;
        self.flags
            .iter()
            .enumerate()
            .filter(|(_, &f)| f)
            .map(move |(k, _)| (k / len, k % len))
    }
}
