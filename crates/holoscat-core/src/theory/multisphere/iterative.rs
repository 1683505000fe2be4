//! Iterative solvers for the coupled multisphere system.
//!
//! Both solvers work on the dense system $(\mathbf{I} + \mathbf{D}\mathbf{T})\,\mathbf{s} = -\mathbf{D}\mathbf{p}$
//! and report how they stopped rather than failing: the caller decides how
//! a stop maps to an error.

use ndarray::{Array1, Array2};
use num_complex::Complex64;

/// Stopping rules shared by the iterative solvers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IterationControl {
    /// Maximum number of iterations.
    pub max_iterations: usize,
    /// Relative residual at which iteration stops.
    pub tolerance: f64,
    /// Relative residual beyond which the iteration is declared divergent.
    pub divergence_limit: f64,
}

/// How an iterative solve ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    Converged,
    /// Non-finite values or a residual past the divergence limit.
    Diverged,
    /// The iteration budget ran out.
    Exhausted,
}

#[derive(Debug, Clone)]
pub struct SolveReport {
    pub solution: Array1<Complex64>,
    pub iterations: usize,
    /// Relative residual tracked by the solver.
    pub residual: f64,
    pub status: SolveStatus,
}

pub(crate) fn norm(v: &Array1<Complex64>) -> f64 {
    v.iter().map(|c| c.norm_sqr()).sum::<f64>().sqrt()
}

/// $\sum_i \bar{x}_i y_i$.
fn inner(x: &Array1<Complex64>, y: &Array1<Complex64>) -> Complex64 {
    x.iter().zip(y).map(|(a, b)| a.conj() * b).sum()
}

fn diverged(rel: f64, control: &IterationControl) -> bool {
    !rel.is_finite() || rel > control.divergence_limit
}

/// Relative residual $\|b - Ax\| / \|b\|$.
pub fn relative_residual(a: &Array2<Complex64>, x: &Array1<Complex64>, b: &Array1<Complex64>) -> f64 {
    let b_norm = norm(b);
    if b_norm == 0.0 {
        return norm(x);
    }
    norm(&(b - &a.dot(x))) / b_norm
}

/// BiCGSTAB (van der Vorst 1992).
pub fn bicgstab(a: &Array2<Complex64>, b: &Array1<Complex64>, control: &IterationControl) -> SolveReport {
    let dim = b.len();
    let zero = Complex64::new(0.0, 0.0);
    let mut x = Array1::from_elem(dim, zero);
    let b_norm = norm(b);
    if b_norm == 0.0 {
        return SolveReport {
            solution: x,
            iterations: 0,
            residual: 0.0,
            status: SolveStatus::Converged,
        };
    }

    let mut r = b.clone();
    let r0 = r.clone();
    let mut rho = Complex64::new(1.0, 0.0);
    let mut alpha = Complex64::new(1.0, 0.0);
    let mut omega = Complex64::new(1.0, 0.0);
    let mut p = Array1::from_elem(dim, zero);
    let mut v = Array1::from_elem(dim, zero);
    let mut rel = 1.0;

    let stop = |x: Array1<Complex64>, iterations, residual, status| SolveReport {
        solution: x,
        iterations,
        residual,
        status,
    };

    for iter in 1..=control.max_iterations {
        let rho_new = inner(&r0, &r);
        if rho_new.norm() < 1e-300 {
            log::warn!("BiCGSTAB breakdown at iteration {iter} (rho = 0)");
            return stop(x, iter, rel, SolveStatus::Exhausted);
        }
        let beta = (rho_new / rho) * (alpha / omega);
        rho = rho_new;

        p = &r + &((&p - &(&v * omega)) * beta);
        v = a.dot(&p);
        let r0v = inner(&r0, &v);
        if r0v.norm() < 1e-300 {
            log::warn!("BiCGSTAB breakdown at iteration {iter} (r0·v = 0)");
            return stop(x, iter, rel, SolveStatus::Exhausted);
        }
        alpha = rho / r0v;

        let s = &r - &(&v * alpha);
        let s_rel = norm(&s) / b_norm;
        if diverged(s_rel, control) {
            return stop(x, iter, s_rel, SolveStatus::Diverged);
        }
        if s_rel < control.tolerance {
            x = &x + &(&p * alpha);
            log::debug!("BiCGSTAB converged at half-step {iter}: residual {s_rel:.3e}");
            return stop(x, iter, s_rel, SolveStatus::Converged);
        }

        let t = a.dot(&s);
        let tt = inner(&t, &t);
        if tt.norm() < 1e-300 {
            return stop(x, iter, rel, SolveStatus::Exhausted);
        }
        omega = inner(&t, &s) / tt;

        x = &x + &(&p * alpha) + &(&s * omega);
        r = &s - &(&t * omega);
        rel = norm(&r) / b_norm;
        log::debug!("BiCGSTAB iteration {iter}: relative residual {rel:.3e}");

        if diverged(rel, control) {
            return stop(x, iter, rel, SolveStatus::Diverged);
        }
        if rel < control.tolerance {
            return stop(x, iter, rel, SolveStatus::Converged);
        }
        if omega.norm() < 1e-300 {
            return stop(x, iter, rel, SolveStatus::Exhausted);
        }
    }

    stop(x, control.max_iterations, rel, SolveStatus::Exhausted)
}

/// Order-of-scattering iteration $x_{k+1} = x_k + (b - A x_k)$.
///
/// Starting from zero, iterate $k$ adds the $k$-th order of multiple
/// scattering between the spheres. Converges only when the coupling
/// operator has spectral radius below one.
pub fn order_of_scattering(
    a: &Array2<Complex64>,
    b: &Array1<Complex64>,
    control: &IterationControl,
) -> SolveReport {
    let mut x = Array1::from_elem(b.len(), Complex64::new(0.0, 0.0));
    let b_norm = norm(b);
    if b_norm == 0.0 {
        return SolveReport {
            solution: x,
            iterations: 0,
            residual: 0.0,
            status: SolveStatus::Converged,
        };
    }
    let mut rel = 1.0;
    for iter in 1..=control.max_iterations {
        let r = b - &a.dot(&x);
        rel = norm(&r) / b_norm;
        log::debug!("order of scattering {iter}: relative residual {rel:.3e}");
        if diverged(rel, control) {
            return SolveReport {
                solution: x,
                iterations: iter,
                residual: rel,
                status: SolveStatus::Diverged,
            };
        }
        if rel < control.tolerance {
            return SolveReport {
                solution: x,
                iterations: iter - 1,
                residual: rel,
                status: SolveStatus::Converged,
            };
        }
        x += &r;
    }
    SolveReport {
        solution: x,
        iterations: control.max_iterations,
        residual: rel,
        status: SolveStatus::Exhausted,
    }
}
