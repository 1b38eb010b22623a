//! Incomplete LU preconditioning.
//!
//! [`IluPreconditioner`] factors the flattened system matrix on a pattern
//! extended by symbolic level-of-fill: an entry created by eliminating
//! through a pivot gets level `lev(i,k) + lev(k,j) + 1` and is kept if that
//! does not exceed the fill level. Level 0 is ILU(0) on the original
//! pattern.
//!
//! The pattern is computed once by [`IluPreconditioner::set_pattern`] and
//! reused by every [`IluPreconditioner::set_value`] until the matrix
//! structure changes.

use crate::error::{Error, Result};
use crate::linear_system::LinearSystem;
use crate::sparse::CsrMatrix;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Pivots smaller than this are replaced.
const PIVOT_FLOOR: f64 = 1e-30;

/// Approximate inverse of a system matrix.
pub trait Preconditioner {
    /// z = M⁻¹ r
    fn apply(&self, r: &[f64], z: &mut [f64]);
}

/// No preconditioning.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityPreconditioner;

impl Preconditioner for IdentityPreconditioner {
    fn apply(&self, r: &[f64], z: &mut [f64]) {
        z.copy_from_slice(r);
    }
}

/// Preconditioner settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreconditionerConfig {
    /// Level of fill of the incomplete factorization.
    pub fill_level: usize,
}

impl Default for PreconditionerConfig {
    fn default() -> Self {
        Self { fill_level: 1 }
    }
}

/// ILU(k) factorization in CSR storage, L and U sharing the pattern.
#[derive(Debug, Clone, Default)]
pub struct IluPreconditioner {
    fill_level: usize,
    n: usize,
    row_ptr: Vec<usize>,
    col_idx: Vec<usize>,
    diag_ptr: Vec<usize>,
    values: Vec<f64>,
    /// Nonzero count of the matrix the pattern was built from.
    source_nnz: usize,
}

impl IluPreconditioner {
    pub fn new(fill_level: usize) -> Self {
        Self {
            fill_level,
            ..Self::default()
        }
    }

    pub fn from_config(config: &PreconditionerConfig) -> Self {
        Self::new(config.fill_level)
    }

    pub fn fill_level(&self) -> usize {
        self.fill_level
    }

    /// Number of stored entries of the factor pattern.
    pub fn nnz(&self) -> usize {
        self.col_idx.len()
    }

    /// Build the fill pattern for the structure of a linear system.
    pub fn set_linear_system(&mut self, ls: &LinearSystem) -> Result<()> {
        self.set_pattern(&ls.to_csr()?)
    }

    /// Factor the current values of a linear system.
    pub fn set_value(&mut self, ls: &LinearSystem) -> Result<()> {
        self.factorize(&ls.to_csr()?)
    }

    /// Symbolic ILU(k) on the pattern of `matrix`.
    pub fn set_pattern(&mut self, matrix: &CsrMatrix) -> Result<()> {
        let n = matrix.nrows();
        if n != matrix.ncols() {
            return Err(Error::Solver("preconditioner needs a square matrix".into()));
        }
        let mut upper: Vec<Vec<(usize, usize)>> = Vec::with_capacity(n);
        let mut row_ptr = Vec::with_capacity(n + 1);
        let mut col_idx = Vec::new();
        let mut diag_ptr = Vec::with_capacity(n);
        row_ptr.push(0);

        for i in 0..n {
            let mut row: BTreeMap<usize, usize> = matrix.row(i).col_indices().iter().map(|&j| (j, 0)).collect();
            row.insert(i, 0);

            let mut next = row.range(..i).next().map(|(&k, _)| k);
            while let Some(k) = next {
                let lev_ik = row[&k];
                for &(j, lev_kj) in &upper[k] {
                    let lev = lev_ik + lev_kj + 1;
                    if lev <= self.fill_level {
                        row.entry(j).and_modify(|l| *l = (*l).min(lev)).or_insert(lev);
                    }
                }
                next = row.range(k + 1..i).next().map(|(&k, _)| k);
            }

            upper.push(row.range(i + 1..).map(|(&j, &l)| (j, l)).collect());
            for &j in row.keys() {
                if j == i {
                    diag_ptr.push(col_idx.len());
                }
                col_idx.push(j);
            }
            row_ptr.push(col_idx.len());
        }

        log::trace!(
            "ILU({}) pattern: {} rows, {} -> {} entries",
            self.fill_level,
            n,
            matrix.nnz(),
            col_idx.len()
        );
        self.n = n;
        self.values = vec![0.0; col_idx.len()];
        self.row_ptr = row_ptr;
        self.col_idx = col_idx;
        self.diag_ptr = diag_ptr;
        self.source_nnz = matrix.nnz();
        Ok(())
    }

    /// Numeric factorization; rebuilds the pattern if `matrix` changed shape.
    pub fn factorize(&mut self, matrix: &CsrMatrix) -> Result<()> {
        if matrix.nrows() != self.n || matrix.nnz() != self.source_nnz || self.row_ptr.is_empty() {
            self.set_pattern(matrix)?;
        }
        self.values.iter_mut().for_each(|v| *v = 0.0);
        for (i, row) in matrix.row_iter().enumerate() {
            for (&j, &v) in row.col_indices().iter().zip(row.values()) {
                let k = self
                    .position(i, j)
                    .ok_or_else(|| Error::Solver(format!("entry ({i}, {j}) outside the factor pattern")))?;
                self.values[k] += v;
            }
        }

        let mut pos = vec![usize::MAX; self.n];
        let mut n_fixed = 0;
        for i in 0..self.n {
            let (start, end) = (self.row_ptr[i], self.row_ptr[i + 1]);
            for kk in start..end {
                pos[self.col_idx[kk]] = kk;
            }
            for kk in start..self.diag_ptr[i] {
                let k = self.col_idx[kk];
                let lik = self.values[kk] / self.values[self.diag_ptr[k]];
                self.values[kk] = lik;
                for jj in self.diag_ptr[k] + 1..self.row_ptr[k + 1] {
                    let p = pos[self.col_idx[jj]];
                    if p != usize::MAX {
                        self.values[p] -= lik * self.values[jj];
                    }
                }
            }
            let d = &mut self.values[self.diag_ptr[i]];
            if d.abs() < PIVOT_FLOOR {
                *d = if *d < 0.0 { -PIVOT_FLOOR } else { PIVOT_FLOOR };
                n_fixed += 1;
            }
            for kk in start..end {
                pos[self.col_idx[kk]] = usize::MAX;
            }
        }
        if n_fixed > 0 {
            log::warn!("incomplete factorization replaced {n_fixed} near-zero pivots");
        }
        Ok(())
    }

    fn position(&self, i: usize, j: usize) -> Option<usize> {
        let start = self.row_ptr[i];
        self.col_idx[start..self.row_ptr[i + 1]]
            .binary_search(&j)
            .ok()
            .map(|k| start + k)
    }

    /// Apply (LU)⁻¹ in place.
    pub fn solve_precond(&self, vec: &mut [f64]) {
        for i in 0..self.n {
            let mut s = vec[i];
            for kk in self.row_ptr[i]..self.diag_ptr[i] {
                s -= self.values[kk] * vec[self.col_idx[kk]];
            }
            vec[i] = s;
        }
        for i in (0..self.n).rev() {
            let mut s = vec[i];
            for kk in self.diag_ptr[i] + 1..self.row_ptr[i + 1] {
                s -= self.values[kk] * vec[self.col_idx[kk]];
            }
            vec[i] = s / self.values[self.diag_ptr[i]];
        }
    }
}

impl Preconditioner for IluPreconditioner {
    fn apply(&self, r: &[f64], z: &mut [f64]) {
        z.copy_from_slice(r);
        self.solve_precond(z);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sparse::TripletMatrix;
    use approx::assert_relative_eq;

    fn dense_to_csr(a: &[&[f64]]) -> CsrMatrix {
        let n = a.len();
        let mut t = TripletMatrix::new(n, n);
        for (i, row) in a.iter().enumerate() {
            for (j, &v) in row.iter().enumerate() {
                if v != 0.0 {
                    t.add(i, j, v);
                }
            }
        }
        t.to_csr().unwrap()
    }

    #[test]
    fn test_tridiagonal_is_exact() {
        // no fill for a tridiagonal matrix, so ILU(0) is the exact LU
        let a = dense_to_csr(&[
            &[4.0, -1.0, 0.0, 0.0],
            &[-1.0, 4.0, -1.0, 0.0],
            &[0.0, -1.0, 4.0, -1.0],
            &[0.0, 0.0, -1.0, 4.0],
        ]);
        let mut ilu = IluPreconditioner::new(0);
        ilu.factorize(&a).unwrap();
        assert_eq!(ilu.nnz(), a.nnz());

        let x = [1.0, 2.0, 3.0, 4.0];
        let mut b = vec![0.0; 4];
        for (i, row) in a.row_iter().enumerate() {
            b[i] = row.col_indices().iter().zip(row.values()).map(|(&j, &v)| v * x[j]).sum();
        }
        let mut z = vec![0.0; 4];
        ilu.apply(&b, &mut z);
        for i in 0..4 {
            assert_relative_eq!(z[i], x[i], epsilon = 1e-12);
        }
    }

    #[test]
    fn test_fill_levels() {
        // arrow pattern: eliminating row 0 couples everything
        let a = dense_to_csr(&[
            &[4.0, 1.0, 1.0, 1.0],
            &[1.0, 4.0, 0.0, 0.0],
            &[1.0, 0.0, 4.0, 0.0],
            &[1.0, 0.0, 0.0, 4.0],
        ]);
        let mut ilu0 = IluPreconditioner::new(0);
        ilu0.set_pattern(&a).unwrap();
        assert_eq!(ilu0.nnz(), 10);

        let mut ilu1 = IluPreconditioner::new(1);
        ilu1.set_pattern(&a).unwrap();
        assert_eq!(ilu1.nnz(), 16);

        // full fill gives the exact inverse
        ilu1.factorize(&a).unwrap();
        let b = [7.0, 5.0, 5.0, 5.0];
        let mut z = [0.0; 4];
        ilu1.apply(&b, &mut z);
        for zi in z {
            assert_relative_eq!(zi, 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_missing_diagonal_is_added() {
        let a = dense_to_csr(&[&[0.0, 1.0], &[1.0, 0.0]]);
        let mut ilu = IluPreconditioner::new(0);
        ilu.factorize(&a).unwrap();
        assert_eq!(ilu.nnz(), 4);
        let mut z = [1.0, 1.0];
        ilu.solve_precond(&mut z);
        assert!(z.iter().all(|v| v.is_finite()));
    }
}
