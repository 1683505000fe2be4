//! Special functions for partial-wave expansions.
//!
//! - Spherical Bessel functions $j_n$, $y_n$ and the outgoing Hankel
//!   function $h_n = j_n + i y_n$ of real argument.
//! - The logarithmic derivative $D_n(z) = \psi_n'(z)/\psi_n(z)$ of the
//!   Riccati-Bessel function at complex argument.
//! - Fully normalised associated Legendre functions $\bar P_n^m(\cos\theta)$
//!   together with the angular functions $\bar\pi_n^m = m \bar P_n^m/\sin\theta$
//!   and $\bar\tau_n^m = d\bar P_n^m/d\theta$, evaluated without dividing by
//!   $\sin\theta$ so they stay finite on the axis.
//! - Gauss-Legendre quadrature on $[-1, 1]$.
//!
//! The normalisation is
//! $\int |\bar P_n^m(\cos\theta) e^{im\phi}|^2 d\Omega = 1$, without the
//! Condon-Shortley phase.

use num_complex::Complex64;

const RESCALE_LIMIT: f64 = 1e250;

/// Spherical Bessel functions $j_0(x), \dots, j_{n_{max}}(x)$.
///
/// Upward recurrence is used while it is stable ($n_{max} \le x$);
/// otherwise Miller's downward recurrence is normalised against whichever
/// of $j_0$, $j_1$ is larger in magnitude.
pub fn spherical_jn(n_max: usize, x: f64) -> Vec<f64> {
    let mut out = vec![0.0; n_max + 1];
    if x == 0.0 {
        out[0] = 1.0;
        return out;
    }
    let (s, c) = x.sin_cos();
    let j0 = s / x;
    let j1 = s / (x * x) - c / x;

    if (n_max as f64) <= x {
        out[0] = j0;
        if n_max >= 1 {
            out[1] = j1;
        }
        for n in 1..n_max {
            out[n + 1] = (2 * n + 1) as f64 / x * out[n] - out[n - 1];
        }
        return out;
    }

    let top = n_max.max(x.ceil() as usize);
    let start = top + 15 + (10.0 * top as f64).sqrt() as usize;
    let mut next = 0.0;
    let mut current = 1e-300;
    // Values at orders 0 and 1 are tracked even when n_max == 0.
    let mut low = [0.0f64; 2];
    for n in (1..=start).rev() {
        let prev = (2 * n + 1) as f64 / x * current - next;
        next = current;
        current = prev;
        // `current` now holds order n - 1 and `next` order n.
        if current.abs() > RESCALE_LIMIT {
            let f = 1.0 / RESCALE_LIMIT;
            current *= f;
            next *= f;
            for v in out.iter_mut().skip(n + 1) {
                *v *= f;
            }
        }
        if n <= n_max {
            out[n] = next;
        }
        if n == 1 {
            low = [current, next];
        }
    }
    out[0] = low[0];
    let scale = if j0.abs() >= j1.abs() {
        j0 / low[0]
    } else {
        j1 / low[1]
    };
    for v in out.iter_mut() {
        *v *= scale;
    }
    out
}

/// Spherical Bessel functions of the second kind $y_0(x), \dots, y_{n_{max}}(x)$.
///
/// Upward recurrence is stable for $y_n$ at every order. `x` must be positive.
pub fn spherical_yn(n_max: usize, x: f64) -> Vec<f64> {
    let mut out = vec![0.0; n_max + 1];
    let (s, c) = x.sin_cos();
    out[0] = -c / x;
    if n_max >= 1 {
        out[1] = -c / (x * x) - s / x;
    }
    for n in 1..n_max {
        out[n + 1] = (2 * n + 1) as f64 / x * out[n] - out[n - 1];
    }
    out
}

/// Outgoing spherical Hankel functions $h_n^{(1)}(x) = j_n(x) + i y_n(x)$.
pub fn spherical_hn(n_max: usize, x: f64) -> Vec<Complex64> {
    let j = spherical_jn(n_max, x);
    let y = spherical_yn(n_max, x);
    j.into_iter()
        .zip(y)
        .map(|(j, y)| Complex64::new(j, y))
        .collect()
}

/// Riccati-Bessel functions $\psi_n(x) = x j_n(x)$ and
/// $\xi_n(x) = x h_n^{(1)}(x)$ for $n = 0, \dots, n_{max}$.
pub fn riccati_psi_xi(n_max: usize, x: f64) -> (Vec<f64>, Vec<Complex64>) {
    let psi = spherical_jn(n_max, x).into_iter().map(|j| x * j).collect();
    let xi = spherical_hn(n_max, x).into_iter().map(|h| h * x).collect();
    (psi, xi)
}

/// Logarithmic derivative $D_n(z)$ for $n = 0, \dots, n_{max}$ by downward
/// recurrence, started well above both $n_{max}$ and $|z|$.
pub fn log_derivative(n_max: usize, z: Complex64) -> Vec<Complex64> {
    let start = n_max.max(z.norm().ceil() as usize) + 16;
    let mut d = Complex64::new(0.0, 0.0);
    let mut out = vec![Complex64::new(0.0, 0.0); n_max + 1];
    for n in (1..=start).rev() {
        if n <= n_max {
            out[n] = d;
        }
        let nz = n as f64 / z;
        d = nz - 1.0 / (d + nz);
    }
    out[0] = d;
    out
}

/// Index of $(n, m)$, $0 \le m \le n$, in a packed triangular table.
#[inline]
pub fn tri_index(n: usize, m: usize) -> usize {
    n * (n + 1) / 2 + m
}

/// Normalised Legendre functions and angular derivatives at one polar angle.
#[derive(Debug, Clone)]
pub struct LegendreTable {
    n_max: usize,
    p: Vec<f64>,
    pi: Vec<f64>,
    tau: Vec<f64>,
}

impl LegendreTable {
    /// Tabulate all $0 \le m \le n \le n_{max}$ at $\theta$ given by its
    /// cosine and (non-negative) sine.
    pub fn new(n_max: usize, cos_theta: f64, sin_theta: f64) -> Self {
        let x = cos_theta;
        let s = sin_theta;
        let size = tri_index(n_max, n_max) + 1;
        let mut p = vec![0.0; size];
        // u = P / sin(theta), built by the same recurrences without the
        // leading factor of sin(theta); only used for m >= 1.
        let mut u = vec![0.0; size];

        p[0] = 1.0 / (4.0 * std::f64::consts::PI).sqrt();
        for m in 0..=n_max {
            if m > 0 {
                let f = ((2 * m + 1) as f64 / (2 * m) as f64).sqrt();
                let prev = p[tri_index(m - 1, m - 1)];
                u[tri_index(m, m)] = f * prev;
                p[tri_index(m, m)] = f * s * prev;
            }
            if m + 1 <= n_max {
                let f = ((2 * m + 3) as f64).sqrt() * x;
                p[tri_index(m + 1, m)] = f * p[tri_index(m, m)];
                u[tri_index(m + 1, m)] = f * u[tri_index(m, m)];
            }
            for n in (m + 2)..=n_max {
                let nf = n as f64;
                let mf = m as f64;
                let a = ((4.0 * nf * nf - 1.0) / (nf * nf - mf * mf)).sqrt();
                let b = (((nf - 1.0).powi(2) - mf * mf) / (4.0 * (nf - 1.0).powi(2) - 1.0)).sqrt();
                let (i1, i2) = (tri_index(n - 1, m), tri_index(n - 2, m));
                p[tri_index(n, m)] = a * (x * p[i1] - b * p[i2]);
                u[tri_index(n, m)] = a * (x * u[i1] - b * u[i2]);
            }
        }

        let mut pi = vec![0.0; size];
        let mut tau = vec![0.0; size];
        for n in 1..=n_max {
            let nf = n as f64;
            tau[tri_index(n, 0)] = -(nf * (nf + 1.0)).sqrt() * p[tri_index(n, 1)];
            for m in 1..=n {
                let mf = m as f64;
                let idx = tri_index(n, m);
                pi[idx] = mf * u[idx];
                let lower = if n > m { u[tri_index(n - 1, m)] } else { 0.0 };
                let c = ((2.0 * nf + 1.0) * (nf * nf - mf * mf) / (2.0 * nf - 1.0)).sqrt();
                tau[idx] = nf * x * u[idx] - c * lower;
            }
        }

        Self { n_max, p, pi, tau }
    }

    pub fn n_max(&self) -> usize {
        self.n_max
    }

    /// $\bar P_n^m$.
    #[inline]
    pub fn p(&self, n: usize, m: usize) -> f64 {
        self.p[tri_index(n, m)]
    }

    /// $\bar\pi_n^m = m \bar P_n^m / \sin\theta$.
    #[inline]
    pub fn pi(&self, n: usize, m: usize) -> f64 {
        self.pi[tri_index(n, m)]
    }

    /// $\bar\tau_n^m = d\bar P_n^m / d\theta$.
    #[inline]
    pub fn tau(&self, n: usize, m: usize) -> f64 {
        self.tau[tri_index(n, m)]
    }
}

/// Gauss-Legendre nodes and weights on $[-1, 1]$, nodes descending.
pub fn gauss_legendre(n: usize) -> (Vec<f64>, Vec<f64>) {
    let mut nodes = vec![0.0; n];
    let mut weights = vec![0.0; n];
    let nf = n as f64;
    for i in 0..(n + 1) / 2 {
        let mut z = (std::f64::consts::PI * (i as f64 + 0.75) / (nf + 0.5)).cos();
        let mut dp = 0.0;
        for _ in 0..100 {
            let (mut p0, mut p1) = (1.0, z);
            for k in 2..=n {
                let kf = k as f64;
                let p2 = ((2.0 * kf - 1.0) * z * p1 - (kf - 1.0) * p0) / kf;
                p0 = p1;
                p1 = p2;
            }
            let pn = if n == 0 { 1.0 } else { p1 };
            let pn_1 = if n == 0 { 0.0 } else { p0 };
            dp = nf * (z * pn - pn_1) / (z * z - 1.0);
            let dz = pn / dp;
            z -= dz;
            if dz.abs() < 1e-15 {
                break;
            }
        }
        let w = 2.0 / ((1.0 - z * z) * dp * dp);
        nodes[i] = z;
        nodes[n - 1 - i] = -z;
        weights[i] = w;
        weights[n - 1 - i] = w;
    }
    (nodes, weights)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use std::f64::consts::PI;

    #[test]
    fn test_jn_closed_forms() {
        for &x in &[0.1, 1.0, 3.7, 12.0] {
            let j = spherical_jn(3, x);
            let (s, c) = x.sin_cos();
            let j2 = (3.0 / (x * x) - 1.0) * s / x - 3.0 * c / (x * x);
            assert_relative_eq!(j[0], s / x, max_relative = 1e-12);
            assert_relative_eq!(j[2], j2, max_relative = 1e-9, epsilon = 1e-14);
        }
    }

    #[test]
    fn test_jn_small_argument_high_order() {
        // j_n(x) ~ x^n / (2n+1)!! for x -> 0
        let x = 1e-3;
        let j = spherical_jn(10, x);
        let double_fact: f64 = (1..=21).step_by(2).map(|k| k as f64).product();
        assert_relative_eq!(j[10], x.powi(10) / double_fact, max_relative = 1e-6);
        assert!(j.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_jn_upward_matches_downward() {
        // Upward branch for n_max <= x, Miller branch otherwise.
        let x = 20.0;
        let up = spherical_jn(20, x);
        let down = spherical_jn(40, x);
        for n in 0..=20 {
            assert_abs_diff_eq!(up[n], down[n], epsilon = 1e-10);
        }
    }

    #[test]
    fn test_wronskian() {
        // j_n y_{n-1} - j_{n-1} y_n = 1/x^2
        let x = 4.3;
        let j = spherical_jn(25, x);
        let y = spherical_yn(25, x);
        for n in 1..=25 {
            let w = j[n] * y[n - 1] - j[n - 1] * y[n];
            assert_relative_eq!(w, 1.0 / (x * x), max_relative = 1e-8);
        }
    }

    #[test]
    fn test_log_derivative_real_limit() {
        // D_1(x) = psi_1'/psi_1 with psi_1 = sin x / x - cos x
        let x = 2.5;
        let d = log_derivative(1, Complex64::new(x, 0.0));
        let psi = x.sin() / x - x.cos();
        let dpsi = x.cos() / x - x.sin() / (x * x) + x.sin();
        assert_relative_eq!(d[1].re, dpsi / psi, max_relative = 1e-10);
        assert_abs_diff_eq!(d[1].im, 0.0, epsilon = 1e-14);
    }

    #[test]
    fn test_gauss_legendre_exactness() {
        let (x, w) = gauss_legendre(7);
        assert_abs_diff_eq!(w.iter().sum::<f64>(), 2.0, epsilon = 1e-14);
        let int: f64 = x.iter().zip(&w).map(|(x, w)| w * x.powi(12)).sum();
        assert_abs_diff_eq!(int, 2.0 / 13.0, epsilon = 1e-14);
        assert!(x.windows(2).all(|p| p[0] > p[1]));
    }

    #[test]
    fn test_legendre_orthonormality() {
        let n_max = 8;
        let (nodes, weights) = gauss_legendre(n_max + 2);
        let tables: Vec<LegendreTable> = nodes
            .iter()
            .map(|&x| LegendreTable::new(n_max, x, (1.0 - x * x).sqrt()))
            .collect();
        for m in 0..=n_max {
            for n in m..=n_max {
                for n2 in m..=n_max {
                    let ip: f64 = tables
                        .iter()
                        .zip(&weights)
                        .map(|(t, w)| 2.0 * PI * w * t.p(n, m) * t.p(n2, m))
                        .sum();
                    let expected = if n == n2 { 1.0 } else { 0.0 };
                    assert_abs_diff_eq!(ip, expected, epsilon = 1e-12);
                }
            }
        }
    }

    #[test]
    fn test_angular_functions_norm() {
        // Integral of (tau^2 + pi^2) over the sphere is n(n+1).
        let n_max = 6;
        let (nodes, weights) = gauss_legendre(2 * n_max + 4);
        for n in 1..=n_max {
            for m in 0..=n {
                let total: f64 = nodes
                    .iter()
                    .zip(&weights)
                    .map(|(&x, w)| {
                        let t = LegendreTable::new(n_max, x, (1.0 - x * x).sqrt());
                        2.0 * PI * w * (t.tau(n, m).powi(2) + t.pi(n, m).powi(2))
                    })
                    .sum();
                assert_relative_eq!(total, (n * (n + 1)) as f64, max_relative = 1e-10);
            }
        }
    }

    #[test]
    fn test_tau_matches_finite_difference() {
        let theta: f64 = 0.7;
        let h = 1e-6;
        let at = |t: f64| LegendreTable::new(5, t.cos(), t.sin());
        let (lo, mid, hi) = (at(theta - h), at(theta), at(theta + h));
        for n in 1..=5 {
            for m in 0..=n {
                let fd = (hi.p(n, m) - lo.p(n, m)) / (2.0 * h);
                assert_abs_diff_eq!(mid.tau(n, m), fd, epsilon = 1e-7);
            }
        }
    }

    #[test]
    fn test_pole_is_finite() {
        let t = LegendreTable::new(10, 1.0, 0.0);
        // Only m = 1 survives on the axis.
        assert!(t.pi(3, 1).abs() > 0.0);
        assert_abs_diff_eq!(t.pi(3, 2), 0.0, epsilon = 1e-15);
        assert_abs_diff_eq!(t.tau(3, 1), t.pi(3, 1), epsilon = 1e-12);
    }
}
