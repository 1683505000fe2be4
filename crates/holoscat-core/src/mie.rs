//! Lorenz-Mie theory for homogeneous spheres.
//!
//! Coefficients, near- and far-field scattered fields, efficiencies and
//! amplitude scattering matrix elements for a sphere illuminated by a unit
//! plane wave $\hat{\mathbf{p}}\, e^{ikz}$. Time dependence is $e^{-i\omega t}$
//! and the scattered wave is built from outgoing Hankel functions
//! $h_n^{(1)}$, following the conventions of Bohren & Huffman:
//!
//! $$
//! \mathbf{E}_s = \sum_n E_n \left( i a_n \mathbf{N}_{e1n}^{(3)} - b_n \mathbf{M}_{o1n}^{(3)} \right),
//! \qquad E_n = i^n \frac{2n+1}{n(n+1)}.
//! $$
//!
//! # Reference
//! Bohren & Huffman, *Absorption and Scattering of Light by Small Particles* (1983).

use holoscat_geometry::Point3;
use num_complex::Complex64;

use crate::special::{log_derivative, riccati_psi_xi, spherical_hn};
use crate::types::Efficiencies;

const I: Complex64 = Complex64::new(0.0, 1.0);

/// Number of partial waves needed for size parameter `x` (Wiscombe 1980).
pub fn wiscombe_order(x: f64) -> usize {
    (x + 4.05 * x.cbrt() + 2.0).round().max(1.0) as usize
}

/// Electric ($a_n$) and magnetic ($b_n$) partial-wave coefficients.
///
/// Entry `i` holds order `n = i + 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct MieCoefficients {
    pub a: Vec<Complex64>,
    pub b: Vec<Complex64>,
}

impl MieCoefficients {
    /// Coefficients for size parameter `x` and relative index `m`, up to
    /// order `n_max`.
    ///
    /// Uses the logarithmic derivative $D_n(mx)$ by downward recurrence:
    ///
    /// $$
    /// a_n = \frac{(D_n/m + n/x)\psi_n - \psi_{n-1}}{(D_n/m + n/x)\xi_n - \xi_{n-1}},
    /// \quad
    /// b_n = \frac{(m D_n + n/x)\psi_n - \psi_{n-1}}{(m D_n + n/x)\xi_n - \xi_{n-1}}.
    /// $$
    pub fn compute(x: f64, m: Complex64, n_max: usize) -> Self {
        let d = log_derivative(n_max, m * x);
        let (psi, xi) = riccati_psi_xi(n_max, x);
        let mut a = Vec::with_capacity(n_max);
        let mut b = Vec::with_capacity(n_max);
        for n in 1..=n_max {
            let nx = n as f64 / x;
            let ta = d[n] / m + nx;
            let tb = d[n] * m + nx;
            a.push((ta * psi[n] - psi[n - 1]) / (ta * xi[n] - xi[n - 1]));
            b.push((tb * psi[n] - psi[n - 1]) / (tb * xi[n] - xi[n - 1]));
        }
        Self { a, b }
    }

    /// Coefficients truncated at the Wiscombe order for `x`.
    pub fn for_sphere(x: f64, m: Complex64) -> Self {
        Self::compute(x, m, wiscombe_order(x))
    }

    pub fn n_max(&self) -> usize {
        self.a.len()
    }

    /// Highest order whose coefficients reach `threshold` in magnitude (at
    /// least 1).
    pub fn significant_order(&self, threshold: f64) -> usize {
        self.a
            .iter()
            .zip(&self.b)
            .rposition(|(a, b)| a.norm().max(b.norm()) >= threshold)
            .map_or(1, |i| i + 1)
    }
}

/// Bohren-Huffman angular functions $\pi_n$, $\tau_n$ for $n = 1..n_{max}$
/// (index 0 holds order 1).
pub fn angular_functions(n_max: usize, cos_theta: f64) -> (Vec<f64>, Vec<f64>) {
    let mut pi = vec![0.0; n_max + 1];
    let mut tau = vec![0.0; n_max + 1];
    if n_max >= 1 {
        pi[1] = 1.0;
        tau[1] = cos_theta;
    }
    for n in 2..=n_max {
        let nf = n as f64;
        pi[n] = (2.0 * nf - 1.0) / (nf - 1.0) * cos_theta * pi[n - 1] - nf / (nf - 1.0) * pi[n - 2];
        tau[n] = nf * cos_theta * pi[n] - (nf + 1.0) * pi[n - 1];
    }
    pi.remove(0);
    tau.remove(0);
    (pi, tau)
}

/// How the radial dependence of the scattered field is evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RadialMode {
    /// Use exact Hankel functions rather than their far-field asymptote.
    pub full_radial_dependence: bool,
    /// Keep the radial field component.
    pub compute_escat_radial: bool,
}

impl Default for RadialMode {
    fn default() -> Self {
        Self {
            full_radial_dependence: true,
            compute_escat_radial: true,
        }
    }
}

/// Scattered field (Cartesian) at `rel`, the observation point relative to
/// the sphere centre in a frame where the incident wave travels along +z.
///
/// `polarization` is the unit transverse incident polarisation; the x- and
/// y-polarised solutions are superposed.
pub fn scattered_field(
    coeffs: &MieCoefficients,
    rel: Point3,
    k: f64,
    polarization: [f64; 2],
    mode: RadialMode,
) -> [Complex64; 3] {
    let n_max = coeffs.n_max();
    let (r, theta, phi) = rel.to_spherical();
    let rho = k * r;
    let (sin_t, cos_t) = theta.sin_cos();
    let (sin_p, cos_p) = phi.sin_cos();

    // Radial functions h_n(rho) and (rho h_n)'/rho.
    let (h, dh): (Vec<Complex64>, Vec<Complex64>) = if mode.full_radial_dependence {
        let h = spherical_hn(n_max, rho);
        let dh = (0..=n_max)
            .map(|n| if n == 0 { Complex64::new(0.0, 0.0) } else { h[n - 1] - h[n] * (n as f64 / rho) })
            .collect();
        (h, dh)
    } else {
        let e = Complex64::from_polar(1.0 / rho, rho);
        (0..=n_max)
            .map(|n| ((-I).powu(n as u32 + 1) * e, (-I).powu(n as u32) * e))
            .unzip()
    };

    let (pi, tau) = angular_functions(n_max, cos_t);
    let mut er = Complex64::new(0.0, 0.0);
    let mut et = Complex64::new(0.0, 0.0);
    let mut ep = Complex64::new(0.0, 0.0);
    let mut i_n = Complex64::new(1.0, 0.0);
    for n in 1..=n_max {
        i_n *= I;
        let nf = n as f64;
        let en = i_n * ((2.0 * nf + 1.0) / (nf * (nf + 1.0)));
        let (a, b) = (coeffs.a[n - 1], coeffs.b[n - 1]);
        let (p, t) = (pi[n - 1], tau[n - 1]);
        er += en * I * a * (nf * (nf + 1.0)) * sin_t * p * h[n] / rho;
        et += en * (I * a * t * dh[n] - b * p * h[n]);
        ep += en * (-I * a * p * dh[n] + b * t * h[n]);
    }
    if !mode.compute_escat_radial {
        er = Complex64::new(0.0, 0.0);
    }

    let [px, py] = polarization;
    let c = px * cos_p + py * sin_p;
    let s = px * sin_p - py * cos_p;
    let (er, et, ep) = (er * c, et * c, ep * s);

    [
        er * (sin_t * cos_p) + et * (cos_t * cos_p) - ep * sin_p,
        er * (sin_t * sin_p) + et * (cos_t * sin_p) + ep * cos_p,
        er * cos_t - et * sin_t,
    ]
}

/// Extinction, scattering and absorption efficiencies and the asymmetry
/// parameter.
pub fn efficiencies(coeffs: &MieCoefficients, x: f64) -> Efficiencies {
    let n_max = coeffs.n_max();
    let mut q_ext = 0.0;
    let mut q_sca = 0.0;
    let mut g_sum = 0.0;
    for i in 0..n_max {
        let nf = (i + 1) as f64;
        let (a, b) = (coeffs.a[i], coeffs.b[i]);
        q_ext += (2.0 * nf + 1.0) * (a + b).re;
        q_sca += (2.0 * nf + 1.0) * (a.norm_sqr() + b.norm_sqr());
        g_sum += (2.0 * nf + 1.0) / (nf * (nf + 1.0)) * (a * b.conj()).re;
        if i + 1 < n_max {
            let (a1, b1) = (coeffs.a[i + 1], coeffs.b[i + 1]);
            g_sum += nf * (nf + 2.0) / (nf + 1.0) * (a * a1.conj() + b * b1.conj()).re;
        }
    }
    let x2 = x * x;
    let q_ext = 2.0 / x2 * q_ext;
    let q_sca = 2.0 / x2 * q_sca;
    let asymmetry = if q_sca > 0.0 {
        4.0 / x2 * g_sum / q_sca
    } else {
        0.0
    };
    Efficiencies {
        q_sca,
        q_abs: q_ext - q_sca,
        q_ext,
        asymmetry,
    }
}

/// Amplitude scattering matrix elements $(S_1, S_2)$ at polar angle `theta`.
pub fn amplitude_matrix(coeffs: &MieCoefficients, theta: f64) -> (Complex64, Complex64) {
    let (pi, tau) = angular_functions(coeffs.n_max(), theta.cos());
    let mut s1 = Complex64::new(0.0, 0.0);
    let mut s2 = Complex64::new(0.0, 0.0);
    for i in 0..coeffs.n_max() {
        let nf = (i + 1) as f64;
        let f = (2.0 * nf + 1.0) / (nf * (nf + 1.0));
        let (a, b) = (coeffs.a[i], coeffs.b[i]);
        s1 += f * (a * pi[i] + b * tau[i]);
        s2 += f * (a * tau[i] + b * pi[i]);
    }
    (s1, s2)
}
