//! Regular-wave coefficients by projection on a sphere.
//!
//! Any field that is regular inside a ball about a sphere centre (the
//! incident plane wave, or the outgoing wave of another sphere) is expanded
//! in regular waves $\mathbf{M}^{(1)}_{nm}$, $\mathbf{N}^{(1)}_{nm}$ by
//! sampling it on concentric spheres and projecting onto the orthonormal
//! harmonics $\mathbf{C}$, $\mathbf{B}$, $Y\hat r$:
//!
//! $$
//! \gamma^C_{nm} = \oint \mathbf{F}\cdot\overline{\mathbf{C}_{nm}}\,d\Omega = p_{nm} j_n(kR),
//! $$
//!
//! and likewise for the electric modes, whose tangential and radial parts
//! scale as $(\rho j_n)'/\rho$ and $\sqrt{n(n+1)}\, j_n/\rho$. The polar
//! integral uses Gauss-Legendre nodes in $\cos\theta$ and the azimuthal
//! integral a forward FFT. Two radii are combined in a least-squares sense
//! so that no order sits on a zero of $j_n$.

use std::f64::consts::PI;

use holoscat_geometry::Point3;
use ndarray::Array2;
use num_complex::Complex64;
use rustfft::FftPlanner;

use super::vswf::{mode_count, mode_index, SphericalBasis, I};
use crate::special::{gauss_legendre, spherical_jn, LegendreTable};

const ZERO: Complex64 = Complex64::new(0.0, 0.0);

/// Quadrature sphere about one expansion centre.
#[derive(Debug, Clone)]
pub(crate) struct ProjectionSphere {
    center: Point3,
    order: usize,
    radii: [f64; 2],
    cos_theta: Vec<f64>,
    weights: Vec<f64>,
    n_phi: usize,
    tables: Vec<LegendreTable>,
}

impl ProjectionSphere {
    /// Projection onto orders `1..=order` of a field whose angular content on
    /// the sampling spheres is negligible beyond degree `band`.
    ///
    /// `radius` is the outer sampling radius; the inner one sits a quarter
    /// wavelength further in, or at half the radius for small spheres.
    pub(crate) fn new(center: Point3, order: usize, radius: f64, k: f64, band: usize) -> Self {
        let inner = if k * radius > PI {
            radius - PI / (2.0 * k)
        } else {
            0.5 * radius
        };
        let n_theta = (band + order) / 2 + 2;
        let n_phi = band + order + 2;
        let (cos_theta, weights) = gauss_legendre(n_theta);
        let tables = cos_theta
            .iter()
            .map(|&x| LegendreTable::new(order, x, (1.0 - x * x).max(0.0).sqrt()))
            .collect();
        Self {
            center,
            order,
            radii: [radius, inner],
            cos_theta,
            weights,
            n_phi,
            tables,
        }
    }

    /// Regular-wave coefficients of `n_sources` fields at once.
    ///
    /// `source(point, values)` writes the Cartesian field of every source at
    /// `point` into `values`. Returns a `(2L, n_sources)` matrix, `L` being
    /// the mode count of this sphere's order.
    pub(crate) fn project<F>(&self, k: f64, n_sources: usize, mut source: F) -> Array2<Complex64>
    where
        F: FnMut(Point3, &mut [[Complex64; 3]]),
    {
        let order = self.order;
        let l_total = mode_count(order);
        let n_phi = self.n_phi;
        let mut planner = FftPlanner::<f64>::new();
        let fft = planner.plan_fft_forward(n_phi);

        let mut values = vec![[ZERO; 3]; n_sources];
        // Ring samples laid out as [component][source][phi].
        let mut ring = vec![ZERO; 3 * n_sources * n_phi];
        let row = |comp: usize, s: usize| (comp * n_sources + s) * n_phi;
        let scale = 2.0 * PI / n_phi as f64;

        // Per radius: projections onto C, B and Y r_hat.
        let mut gamma: Vec<[Array2<Complex64>; 3]> = (0..2)
            .map(|_| {
                [
                    Array2::zeros((l_total, n_sources)),
                    Array2::zeros((l_total, n_sources)),
                    Array2::zeros((l_total, n_sources)),
                ]
            })
            .collect();

        for (ri, &radius) in self.radii.iter().enumerate() {
            for (t, (&ct, &w)) in self.cos_theta.iter().zip(&self.weights).enumerate() {
                let st = (1.0 - ct * ct).max(0.0).sqrt();
                for q in 0..n_phi {
                    let phi = scale * q as f64;
                    let basis = SphericalBasis::new(st, ct, phi);
                    source(self.center + basis.r_hat * radius, &mut values);
                    for (s, v) in values.iter().enumerate() {
                        let sph = basis.to_spherical(*v);
                        for comp in 0..3 {
                            ring[row(comp, s) + q] = sph[comp];
                        }
                    }
                }
                for chunk in ring.chunks_mut(n_phi) {
                    fft.process(chunk);
                }

                let table = &self.tables[t];
                let [gc, gb, gp] = &mut gamma[ri];
                for n in 1..=order {
                    let norm = 1.0 / ((n * (n + 1)) as f64).sqrt();
                    for m in -(n as i64)..=(n as i64) {
                        let am = m.unsigned_abs() as usize;
                        let bin = if m >= 0 { am } else { n_phi - am };
                        let pi = table.pi(n, am) * m.signum() as f64;
                        let tau = table.tau(n, am);
                        let p = table.p(n, am);
                        let idx = mode_index(n, m);
                        for s in 0..n_sources {
                            let g_r = ring[row(0, s) + bin] * scale;
                            let g_t = ring[row(1, s) + bin] * scale;
                            let g_p = ring[row(2, s) + bin] * scale;
                            gc[[idx, s]] += (-I * pi * g_t - tau * g_p) * (w * norm);
                            gb[[idx, s]] += (tau * g_t - I * pi * g_p) * (w * norm);
                            gp[[idx, s]] += g_r * (w * p);
                        }
                    }
                }
            }
        }

        let radial: Vec<Vec<f64>> = self
            .radii
            .iter()
            .map(|&r| spherical_jn(order, k * r))
            .collect();
        let mut out = Array2::zeros((2 * l_total, n_sources));
        for n in 1..=order {
            let nf = n as f64;
            let mut m_weights = [0.0; 2];
            let mut n_weights = [(0.0, 0.0); 2];
            for (ri, &r) in self.radii.iter().enumerate() {
                let rho = k * r;
                let j = &radial[ri];
                m_weights[ri] = j[n];
                n_weights[ri] = (j[n - 1] - nf * j[n] / rho, (nf * (nf + 1.0)).sqrt() * j[n] / rho);
            }
            let m_denom: f64 = m_weights.iter().map(|v| v * v).sum();
            let n_denom: f64 = n_weights.iter().map(|(b, p)| b * b + p * p).sum();
            for m in -(n as i64)..=(n as i64) {
                let idx = mode_index(n, m);
                for s in 0..n_sources {
                    let mut mag = ZERO;
                    let mut ele = ZERO;
                    for ri in 0..2 {
                        let [gc, gb, gp] = &gamma[ri];
                        mag += gc[[idx, s]] * m_weights[ri];
                        ele += gb[[idx, s]] * n_weights[ri].0 + gp[[idx, s]] * n_weights[ri].1;
                    }
                    out[[idx, s]] = mag / m_denom;
                    out[[l_total + idx, s]] = ele / n_denom;
                }
            }
        }
        out
    }
}
