//! Vector spherical wave functions.
//!
//! Modes are indexed by $(n, m)$ with $1 \le n \le N$, $|m| \le n$, packed
//! as $l = n(n+1) + m - 1$, so a sphere truncated at order $N$ carries
//! $L = N(N+2)$ modes of each type. Coefficient vectors hold the $L$
//! magnetic ($\mathbf{M}$) modes followed by the $L$ electric
//! ($\mathbf{N}$) modes.
//!
//! With $Y_{nm} = \bar P_n^{|m|}(\cos\theta) e^{im\phi}$ the tangential
//! harmonics are
//!
//! $$
//! \mathbf{C}_{nm} = \frac{i\,\mathrm{sgn}(m)\bar\pi\,\hat\theta - \bar\tau\,\hat\phi}{\sqrt{n(n+1)}} e^{im\phi},
//! \qquad
//! \mathbf{B}_{nm} = \frac{\bar\tau\,\hat\theta + i\,\mathrm{sgn}(m)\bar\pi\,\hat\phi}{\sqrt{n(n+1)}} e^{im\phi},
//! $$
//!
//! and $\mathbf{M} = z_n(\rho)\mathbf{C}$,
//! $\mathbf{N} = \sqrt{n(n+1)}\,\frac{z_n}{\rho} Y_{nm}\hat r + \frac{(\rho z_n)'}{\rho}\mathbf{B}$.
//! Together with $Y_{nm}\hat r$ they are orthonormal on the unit sphere.

use holoscat_geometry::Point3;
use num_complex::Complex64;

use crate::special::{spherical_hn, LegendreTable};

pub(crate) const I: Complex64 = Complex64::new(0.0, 1.0);
const ZERO: Complex64 = Complex64::new(0.0, 0.0);

/// Number of modes of one type up to order `order`.
pub(crate) fn mode_count(order: usize) -> usize {
    order * (order + 2)
}

pub(crate) fn mode_index(n: usize, m: i64) -> usize {
    ((n * (n + 1)) as i64 + m - 1) as usize
}

/// Order `n` of packed mode `l`.
pub(crate) fn mode_order(l: usize) -> usize {
    let mut n = ((l + 1) as f64).sqrt() as usize;
    while n * n > l + 1 {
        n -= 1;
    }
    while (n + 1) * (n + 1) <= l + 1 {
        n += 1;
    }
    n
}

/// Local spherical unit vectors at one direction.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SphericalBasis {
    pub r_hat: Point3,
    pub theta_hat: Point3,
    pub phi_hat: Point3,
}

impl SphericalBasis {
    pub(crate) fn new(sin_theta: f64, cos_theta: f64, phi: f64) -> Self {
        let (sp, cp) = phi.sin_cos();
        Self {
            r_hat: Point3::new(sin_theta * cp, sin_theta * sp, cos_theta),
            theta_hat: Point3::new(cos_theta * cp, cos_theta * sp, -sin_theta),
            phi_hat: Point3::new(-sp, cp, 0.0),
        }
    }

    pub(crate) fn to_cartesian(&self, v: [Complex64; 3]) -> [Complex64; 3] {
        let [r, t, p] = v;
        [
            r * self.r_hat.x + t * self.theta_hat.x + p * self.phi_hat.x,
            r * self.r_hat.y + t * self.theta_hat.y + p * self.phi_hat.y,
            r * self.r_hat.z + t * self.theta_hat.z + p * self.phi_hat.z,
        ]
    }

    pub(crate) fn to_spherical(&self, v: [Complex64; 3]) -> [Complex64; 3] {
        let dot = |u: &Point3| v[0] * u.x + v[1] * u.y + v[2] * u.z;
        [dot(&self.r_hat), dot(&self.theta_hat), dot(&self.phi_hat)]
    }
}

/// Outgoing waves $\mathbf{M}^{(3)}_{nm}$, $\mathbf{N}^{(3)}_{nm}$ at `rel`
/// (relative to the expansion centre), in Cartesian components.
///
/// `out` must hold `2 * mode_count(order)` entries.
pub(crate) fn outgoing_waves(order: usize, k: f64, rel: Point3, out: &mut [[Complex64; 3]]) {
    let l_total = mode_count(order);
    let (r, theta, phi) = rel.to_spherical();
    let rho = k * r;
    let (st, ct) = theta.sin_cos();
    let basis = SphericalBasis::new(st, ct, phi);
    let h = spherical_hn(order, rho);
    let table = LegendreTable::new(order, ct, st);
    let phase: Vec<Complex64> = (0..=order)
        .map(|m| Complex64::from_polar(1.0, m as f64 * phi))
        .collect();

    for n in 1..=order {
        let nn = (n * (n + 1)) as f64;
        let norm = 1.0 / nn.sqrt();
        let hn = h[n];
        let dh = h[n - 1] - hn * (n as f64 / rho);
        let radial = hn * (nn.sqrt() / rho);
        for m in -(n as i64)..=(n as i64) {
            let am = m.unsigned_abs() as usize;
            let e = if m >= 0 { phase[am] } else { phase[am].conj() };
            let pi = table.pi(n, am) * m.signum() as f64;
            let tau = table.tau(n, am);
            let c_theta = I * pi * e * norm;
            let c_phi = -tau * e * norm;
            let b_theta = tau * e * norm;
            let b_phi = I * pi * e * norm;
            let idx = mode_index(n, m);
            out[idx] = basis.to_cartesian([ZERO, hn * c_theta, hn * c_phi]);
            out[l_total + idx] =
                basis.to_cartesian([radial * table.p(n, am) * e, dh * b_theta, dh * b_phi]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_mode_indexing() {
        assert_eq!(mode_count(3), 15);
        assert_eq!(mode_index(1, -1), 0);
        assert_eq!(mode_index(1, 1), 2);
        assert_eq!(mode_index(3, 3), 14);
        for l in 0..mode_count(6) {
            let n = mode_order(l);
            assert!(l + 1 >= n * n && l < mode_count(n), "l = {l}, n = {n}");
        }
    }

    #[test]
    fn test_basis_round_trip() {
        let b = SphericalBasis::new(0.6, 0.8, 1.1);
        let v = [
            Complex64::new(1.0, 2.0),
            Complex64::new(-0.5, 0.0),
            Complex64::new(0.0, 3.0),
        ];
        let back = b.to_spherical(b.to_cartesian(v));
        for c in 0..3 {
            assert_abs_diff_eq!(back[c].re, v[c].re, epsilon = 1e-14);
            assert_abs_diff_eq!(back[c].im, v[c].im, epsilon = 1e-14);
        }
    }

    #[test]
    fn test_outgoing_waves_are_transverse_far_away() {
        // M has no radial part; N's radial part decays one order faster.
        let order = 3;
        let mut out = vec![[ZERO; 3]; 2 * mode_count(order)];
        let rel = Point3::new(3e3, -2e3, 4e3);
        outgoing_waves(order, 1.0, rel, &mut out);
        let r_hat = rel * (1.0 / rel.norm());
        for wave in &out {
            let radial = wave[0] * r_hat.x + wave[1] * r_hat.y + wave[2] * r_hat.z;
            let total = (wave[0].norm_sqr() + wave[1].norm_sqr() + wave[2].norm_sqr()).sqrt();
            assert!(radial.norm() <= 1e-2 * total + 1e-15);
        }
    }
}
