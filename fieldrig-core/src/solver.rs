//! Linear system solvers.
//!
//! Solves the increment system assembled by [`LinearSystem`] at every
//! Newton iteration.
//!
//! # Solver Backends
//!
//! - [`solve_pbicgstab`]: preconditioned BiCGSTAB over any [`LinearOperator`].
//!   The default; runs directly on the block matrices with an
//!   [`IluPreconditioner`](crate::precond::IluPreconditioner).
//! - [`FaerLuSolver`]: sparse LU factorization using the faer library on the
//!   flattened CSR matrix. The coupled systems are unsymmetric and
//!   indefinite (multiplier rows), so LU rather than Cholesky.
//!
//! Iterative solves never fail on their iteration cap: the returned
//! [`SolveReport`] carries the status and the achieved residual ratio.

use crate::error::{Error, Result};
use crate::linear_system::LinearSystem;
use crate::precond::Preconditioner;
use crate::sparse::CsrMatrix;
use faer::prelude::*;
use faer::sparse::linalg::solvers::{Lu, SymbolicLu};
use faer::sparse::{SparseColMat, SymbolicSparseColMat};
use serde::{Deserialize, Serialize};

/// Direct linear solver interface.
pub trait Solver: Send + Sync {
    /// Solve the linear system Ax = b.
    ///
    /// # Arguments
    ///
    /// * `matrix` - System matrix
    /// * `rhs` - Right-hand side vector
    ///
    /// # Returns
    ///
    /// Solution vector
    fn solve(&self, matrix: &CsrMatrix, rhs: &[f64]) -> Result<Vec<f64>>;

    /// Solver name for diagnostics.
    fn name(&self) -> &str;
}

/// Operator y = A x for the iterative solver.
pub trait LinearOperator {
    fn dim(&self) -> usize;

    fn apply(&self, x: &[f64], y: &mut [f64]);
}

impl LinearOperator for CsrMatrix {
    fn dim(&self) -> usize {
        self.nrows()
    }

    fn apply(&self, x: &[f64], y: &mut [f64]) {
        for (i, row) in self.row_iter().enumerate() {
            y[i] = row.col_indices().iter().zip(row.values()).map(|(&j, &v)| v * x[j]).sum();
        }
    }
}

impl LinearOperator for LinearSystem {
    fn dim(&self) -> usize {
        self.n_dofs()
    }

    fn apply(&self, x: &[f64], y: &mut [f64]) {
        self.mat_vec(1.0, x, 0.0, y);
    }
}

/// Solver selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LinearSolverKind {
    /// PBiCGSTAB with the configured ILU preconditioner.
    #[default]
    Iterative,
    /// Sparse LU via faer.
    Direct,
}

/// Linear solver configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Solver type to use.
    pub kind: LinearSolverKind,
    /// Target ratio of final to initial residual for iterative solves.
    pub conv_ratio: f64,
    /// Maximum iterations for iterative solves.
    pub max_iter: usize,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            kind: LinearSolverKind::Iterative,
            conv_ratio: 1e-6,
            max_iter: 100,
        }
    }
}

/// How an iterative solve ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolveStatus {
    Converged,
    MaxIterationsReached,
    /// A BiCGSTAB scalar vanished.
    Breakdown,
}

/// Outcome of a linear solve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolveReport {
    pub status: SolveStatus,
    pub iterations: usize,
    /// Final residual norm over the right-hand side norm.
    pub ratio: f64,
}

impl SolveReport {
    pub fn is_converged(&self) -> bool {
        self.status == SolveStatus::Converged
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn norm2(a: &[f64]) -> f64 {
    dot(a, a).sqrt()
}

/// Scalars below this count as a breakdown.
const BREAKDOWN_TOL: f64 = 1e-300;

/// Preconditioned BiCGSTAB.
///
/// Improves `x` in place until ‖b - Ax‖ / ‖b‖ < `conv_ratio` or
/// `max_iter` iterations have run.
pub fn solve_pbicgstab<A, P>(a: &A, precond: &P, b: &[f64], x: &mut [f64], conv_ratio: f64, max_iter: usize) -> SolveReport
where
    A: LinearOperator + ?Sized,
    P: Preconditioner + ?Sized,
{
    let n = a.dim();
    let report = |status, iterations, ratio| SolveReport {
        status,
        iterations,
        ratio,
    };

    let norm_b = norm2(b);
    if norm_b == 0.0 {
        x.iter_mut().for_each(|v| *v = 0.0);
        return report(SolveStatus::Converged, 0, 0.0);
    }

    // r = b - A*x
    let mut r = vec![0.0; n];
    a.apply(x, &mut r);
    r.iter_mut().zip(b).for_each(|(ri, bi)| *ri = bi - *ri);
    let mut ratio = norm2(&r) / norm_b;
    if ratio < conv_ratio {
        return report(SolveStatus::Converged, 0, ratio);
    }

    let r0 = r.clone();
    let mut p = r.clone();
    let mut v = vec![0.0; n];
    let mut s = vec![0.0; n];
    let mut t = vec![0.0; n];
    let mut p_hat = vec![0.0; n];
    let mut s_hat = vec![0.0; n];
    let mut rho = dot(&r0, &r);

    for iter in 0..max_iter {
        precond.apply(&p, &mut p_hat);
        a.apply(&p_hat, &mut v);
        let r0v = dot(&r0, &v);
        if r0v.abs() < BREAKDOWN_TOL {
            log::warn!("PBiCGSTAB breakdown (r0·v = 0) at iteration {iter}");
            return report(SolveStatus::Breakdown, iter, ratio);
        }
        let alpha = rho / r0v;

        for i in 0..n {
            s[i] = r[i] - alpha * v[i];
        }

        precond.apply(&s, &mut s_hat);
        a.apply(&s_hat, &mut t);
        let tt = dot(&t, &t);
        let omega = if tt > BREAKDOWN_TOL { dot(&t, &s) / tt } else { 0.0 };

        for i in 0..n {
            x[i] += alpha * p_hat[i] + omega * s_hat[i];
            r[i] = s[i] - omega * t[i];
        }
        ratio = norm2(&r) / norm_b;
        if ratio < conv_ratio {
            return report(SolveStatus::Converged, iter + 1, ratio);
        }
        if omega.abs() < BREAKDOWN_TOL {
            log::warn!("PBiCGSTAB breakdown (omega = 0) at iteration {iter}");
            return report(SolveStatus::Breakdown, iter + 1, ratio);
        }

        let rho_new = dot(&r0, &r);
        if rho_new.abs() < BREAKDOWN_TOL {
            log::warn!("PBiCGSTAB breakdown (rho = 0) at iteration {iter}");
            return report(SolveStatus::Breakdown, iter + 1, ratio);
        }
        let beta = (rho_new / rho) * (alpha / omega);
        rho = rho_new;
        for i in 0..n {
            p[i] = r[i] + beta * (p[i] - omega * v[i]);
        }
    }

    log::warn!("PBiCGSTAB stopped after {max_iter} iterations (ratio {ratio:.3e})");
    report(SolveStatus::MaxIterationsReached, max_iter, ratio)
}

/// Convert nalgebra-sparse CSR matrix to faer SparseColMat (CSC format).
///
/// Entries are redistributed column by column; rows stay sorted within each
/// column because the CSR rows are visited in order.
fn csr_to_faer_csc(csr: &CsrMatrix) -> SparseColMat<usize, f64> {
    let nrows = csr.nrows();
    let ncols = csr.ncols();

    let row_offsets = csr.row_offsets();
    let col_indices = csr.col_indices();
    let values = csr.values();

    // Count entries per column
    let mut col_offsets = vec![0usize; ncols + 1];
    for &col in col_indices {
        col_offsets[col + 1] += 1;
    }
    for i in 0..ncols {
        col_offsets[i + 1] += col_offsets[i];
    }

    let nnz = values.len();
    let mut csc_row_indices = vec![0usize; nnz];
    let mut csc_values = vec![0.0f64; nnz];
    let mut col_positions = col_offsets[..ncols].to_vec();

    for row in 0..nrows {
        for idx in row_offsets[row]..row_offsets[row + 1] {
            let col = col_indices[idx];
            let pos = col_positions[col];
            csc_row_indices[pos] = row;
            csc_values[pos] = values[idx];
            col_positions[col] += 1;
        }
    }

    // SAFETY: offsets are monotone, row indices are in bounds and sorted per column
    unsafe {
        SparseColMat::new(
            SymbolicSparseColMat::new_unchecked(nrows, ncols, col_offsets, None, csc_row_indices),
            csc_values,
        )
    }
}

/// Sparse LU solver using the faer library.
///
/// # Example
///
/// ```ignore
/// let solver = FaerLuSolver::new();
/// let du = solver.solve(&ls.to_csr()?, &ls.residual_vector())?;
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct FaerLuSolver;

impl FaerLuSolver {
    pub fn new() -> Self {
        Self
    }
}

impl Solver for FaerLuSolver {
    fn solve(&self, matrix: &CsrMatrix, rhs: &[f64]) -> Result<Vec<f64>> {
        let n = matrix.nrows();
        if n == 0 {
            return Ok(vec![]);
        }

        if n != matrix.ncols() {
            return Err(Error::Solver("Matrix must be square".into()));
        }

        if n != rhs.len() {
            return Err(Error::Solver("RHS size mismatch".into()));
        }

        let csc = csr_to_faer_csc(matrix);
        let symbolic = SymbolicLu::try_new(csc.as_ref().symbolic())
            .map_err(|e| Error::Solver(format!("symbolic LU analysis failed: {e:?}")))?;
        let lu = Lu::try_new_with_symbolic(symbolic, csc.as_ref())
            .map_err(|e| Error::SingularMatrix(format!("sparse LU failed: {e:?}")))?;

        let mut x = faer::Mat::from_fn(n, 1, |i, _| rhs[i]);
        lu.solve_in_place(x.as_mut());

        let solution: Vec<f64> = (0..n).map(|i| x[(i, 0)]).collect();
        if solution.iter().any(|v| !v.is_finite()) {
            return Err(Error::SingularMatrix("LU solution is not finite".into()));
        }
        Ok(solution)
    }

    fn name(&self) -> &str {
        "faer Sparse LU"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::precond::{IdentityPreconditioner, IluPreconditioner};
    use crate::sparse::TripletMatrix;
    use approx::assert_relative_eq;

    /// 1D Laplacian plus an unsymmetric convection term.
    fn convection_diffusion(n: usize) -> CsrMatrix {
        let mut t = TripletMatrix::new(n, n);
        for i in 0..n {
            t.add(i, i, 2.5);
            if i > 0 {
                t.add(i, i - 1, -1.3);
            }
            if i + 1 < n {
                t.add(i, i + 1, -0.7);
            }
        }
        t.to_csr().unwrap()
    }

    fn residual(a: &CsrMatrix, x: &[f64], b: &[f64]) -> f64 {
        let mut ax = vec![0.0; b.len()];
        a.apply(x, &mut ax);
        ax.iter().zip(b).map(|(p, q)| (p - q).powi(2)).sum::<f64>().sqrt()
    }

    #[test]
    fn test_lu_simple() {
        // [2 1; 1 3] * [x; y] = [1; 2] gives x = 1/5, y = 3/5
        let mut triplet = TripletMatrix::new(2, 2);
        triplet.add(0, 0, 2.0);
        triplet.add(0, 1, 1.0);
        triplet.add(1, 0, 1.0);
        triplet.add(1, 1, 3.0);
        let matrix = triplet.to_csr().unwrap();

        let solution = FaerLuSolver::new().solve(&matrix, &[1.0, 2.0]).unwrap();
        assert_relative_eq!(solution[0], 0.2, epsilon = 1e-10);
        assert_relative_eq!(solution[1], 0.6, epsilon = 1e-10);
    }

    #[test]
    fn test_lu_unsymmetric_indefinite() {
        // saddle point: [1 1; 1 0]
        let mut triplet = TripletMatrix::new(2, 2);
        triplet.add(0, 0, 1.0);
        triplet.add(0, 1, 1.0);
        triplet.add(1, 0, 1.0);
        let matrix = triplet.to_csr().unwrap();
        let solution = FaerLuSolver::new().solve(&matrix, &[3.0, 1.0]).unwrap();
        assert_relative_eq!(solution[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(solution[1], 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_empty_system() {
        let matrix = TripletMatrix::new(0, 0).to_csr().unwrap();
        assert!(FaerLuSolver::new().solve(&matrix, &[]).unwrap().is_empty());
    }

    #[test]
    fn test_size_mismatch() {
        let matrix = convection_diffusion(3);
        assert!(matches!(
            FaerLuSolver::new().solve(&matrix, &[1.0]),
            Err(Error::Solver(_))
        ));
    }

    #[test]
    fn test_pbicgstab_converges() {
        let a = convection_diffusion(50);
        let b: Vec<f64> = (0..50).map(|i| (i as f64 * 0.3).sin()).collect();
        let mut x = vec![0.0; 50];
        let report = solve_pbicgstab(&a, &IdentityPreconditioner, &b, &mut x, 1e-10, 200);
        assert!(report.is_converged());
        assert!(residual(&a, &x, &b) < 1e-9);
    }

    #[test]
    fn test_ilu_reduces_iterations() {
        let a = convection_diffusion(80);
        let b = vec![1.0; 80];
        let mut x0 = vec![0.0; 80];
        let plain = solve_pbicgstab(&a, &IdentityPreconditioner, &b, &mut x0, 1e-10, 500);

        let mut ilu = IluPreconditioner::new(0);
        ilu.factorize(&a).unwrap();
        let mut x1 = vec![0.0; 80];
        let pre = solve_pbicgstab(&a, &ilu, &b, &mut x1, 1e-10, 500);

        assert!(pre.is_converged());
        assert!(pre.iterations < plain.iterations);
        for i in 0..80 {
            assert_relative_eq!(x0[i], x1[i], epsilon = 1e-7);
        }
    }

    #[test]
    fn test_pbicgstab_iteration_cap() {
        let a = convection_diffusion(100);
        let b = vec![1.0; 100];
        let mut x = vec![0.0; 100];
        let report = solve_pbicgstab(&a, &IdentityPreconditioner, &b, &mut x, 1e-14, 2);
        assert_eq!(report.status, SolveStatus::MaxIterationsReached);
        assert_eq!(report.iterations, 2);
        assert!(report.ratio > 1e-14);
    }

    #[test]
    fn test_zero_rhs() {
        let a = convection_diffusion(4);
        let mut x = vec![1.0; 4];
        let report = solve_pbicgstab(&a, &IdentityPreconditioner, &[0.0; 4], &mut x, 1e-6, 10);
        assert!(report.is_converged());
        assert_eq!(x, vec![0.0; 4]);
    }
}
