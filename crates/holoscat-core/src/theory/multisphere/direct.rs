//! Direct solve of the coupled multisphere system.
//!
//! LU decomposition with partial pivoting via `faer`. The cost is cubic in
//! the total mode count, so this is practical for a handful of spheres and
//! serves as a reference for the iterative methods.

use faer::complex_native::c64;
use faer::linalg::solvers::SpSolver;
use ndarray::{Array1, Array2};
use num_complex::Complex64;

use super::iterative::{relative_residual, SolveReport, SolveStatus};
use crate::theory::ScatteringError;

/// Solve $\mathbf{A}\mathbf{x} = \mathbf{b}$ by LU decomposition.
///
/// The report counts the factorisation as one iteration. A singular system
/// leaves non-finite entries in the solution and is reported as
/// [`SolveStatus::Diverged`].
///
/// # Arguments
/// * `matrix` - Square system matrix.
/// * `rhs` - Right-hand side, one entry per row of `matrix`.
pub fn solve_direct(
    matrix: &Array2<Complex64>,
    rhs: &Array1<Complex64>,
) -> Result<SolveReport, ScatteringError> {
    let dim = matrix.nrows();
    if dim != matrix.ncols() || dim != rhs.len() {
        return Err(ScatteringError::LinAlg(format!(
            "system of shape {:?} does not match right-hand side of length {}",
            matrix.dim(),
            rhs.len()
        )));
    }

    let a = faer::Mat::<c64>::from_fn(dim, dim, |i, j| {
        let v = matrix[[i, j]];
        c64::new(v.re, v.im)
    });
    let b = faer::Col::<c64>::from_fn(dim, |i| c64::new(rhs[i].re, rhs[i].im));

    let lu = a.partial_piv_lu();
    let x = lu.solve(&b);

    let solution: Array1<Complex64> = (0..dim).map(|i| Complex64::new(x[i].re, x[i].im)).collect();
    if solution.iter().any(|v| !v.is_finite()) {
        log::warn!("LU solve of a {dim}×{dim} system produced non-finite values");
        return Ok(SolveReport {
            solution,
            iterations: 1,
            residual: f64::INFINITY,
            status: SolveStatus::Diverged,
        });
    }
    let residual = relative_residual(matrix, &solution, rhs);
    Ok(SolveReport {
        solution,
        iterations: 1,
        residual,
        status: SolveStatus::Converged,
    })
}
