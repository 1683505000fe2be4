//! Coupled multipole (T-matrix) scattering by clusters of spheres.
//!
//! Each sphere's scattered field is expanded in outgoing vector spherical
//! waves about its own centre. The field incident on sphere $i$ is the
//! illumination plus the scattered fields of all other spheres,
//! re-expanded in regular waves about $c_i$. Requiring every sphere to
//! respond to its total incident field as an isolated Mie sphere gives
//!
//! $$
//! \mathbf{s}_i + \mathbf{D}_i \sum_{j \ne i} \mathbf{T}_{ij}\,\mathbf{s}_j = -\mathbf{D}_i\,\mathbf{p}_i,
//! $$
//!
//! where $\mathbf{D}_i$ holds the Mie coefficients ($b_n$ for magnetic and
//! $a_n$ for electric modes), $\mathbf{p}_i$ the incident-wave coefficients
//! and $\mathbf{T}_{ij}$ the outgoing-to-regular re-expansion operator.
//! Both $\mathbf{p}_i$ and $\mathbf{T}_{ij}$ come from projecting the
//! source fields onto quadrature spheres (see `translation`).
//!
//! # Module Structure
//! - `vswf` — mode packing and outgoing waves
//! - `translation` — regular-wave coefficients by projection
//! - [`iterative`] — BiCGSTAB and order-of-scattering iterations
//! - [`direct`] — dense LU solve

pub mod direct;
pub mod iterative;
mod translation;
mod vswf;

use holoscat_geometry::{OverlapWarning, Point3, Scatterer, ScattererKind, Sphere};
use ndarray::{Array1, Array2};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use self::iterative::{IterationControl, SolveReport, SolveStatus};
use self::translation::ProjectionSphere;
use self::vswf::{mode_count, mode_order, outgoing_waves};
use super::{beam_frame, Operation, ScatteringError, ScatteringTheory};
use crate::mie::{wiscombe_order, MieCoefficients};
use crate::optics::Beam;

const FIELD_KINDS: &[ScattererKind] = &[ScattererKind::Sphere, ScattererKind::SphereCluster];
const ZERO: Complex64 = Complex64::new(0.0, 0.0);

/// Relative residual past which an iteration is treated as divergent.
const DIVERGENCE_LIMIT: f64 = 1e8;

/// Algorithm used to solve the coupled system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExpansionMethod {
    #[default]
    #[serde(rename = "bicgstab")]
    BiCgStab = 0,
    #[serde(rename = "order_of_scattering")]
    OrderOfScattering = 1,
    #[serde(rename = "direct")]
    DirectLu = 2,
}

impl ExpansionMethod {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::BiCgStab),
            1 => Some(Self::OrderOfScattering),
            2 => Some(Self::DirectLu),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Multisphere scattering theory and its solver settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Multisphere {
    /// Iteration budget of the iterative solvers.
    #[serde(default = "default_niter")]
    pub niter: usize,
    /// Largest true relative residual accepted for a solution.
    #[serde(default = "default_eps")]
    pub eps: f64,
    /// Mie coefficients below this magnitude truncate a sphere's expansion.
    #[serde(default = "default_qeps1")]
    pub qeps1: f64,
    /// Relative residual at which iteration stops.
    #[serde(default = "default_qeps2")]
    pub qeps2: f64,
    #[serde(default)]
    pub meth: ExpansionMethod,
    /// Overlap, as a fraction of combined radii, beyond which a pair of
    /// spheres is rejected.
    #[serde(default = "default_overlap_tolerance")]
    pub overlap_tolerance: f64,
    /// Largest size parameter $ka$ of a single sphere.
    #[serde(default = "default_max_size_parameter")]
    pub max_size_parameter: f64,
    /// Largest cluster size parameter times sphere count.
    #[serde(default = "default_max_size_product")]
    pub max_size_product: f64,
    /// Largest number of unknowns in the coupled system, estimated from
    /// the Wiscombe order of each sphere.
    #[serde(default = "default_max_modes")]
    pub max_modes: usize,
}

fn default_niter() -> usize {
    200
}
fn default_eps() -> f64 {
    1e-6
}
fn default_qeps1() -> f64 {
    1e-5
}
fn default_qeps2() -> f64 {
    1e-8
}
fn default_overlap_tolerance() -> f64 {
    0.9
}
fn default_max_size_parameter() -> f64 {
    100.0
}
fn default_max_size_product() -> f64 {
    300.0
}
fn default_max_modes() -> usize {
    6000
}

impl Default for Multisphere {
    fn default() -> Self {
        Self {
            niter: default_niter(),
            eps: default_eps(),
            qeps1: default_qeps1(),
            qeps2: default_qeps2(),
            meth: ExpansionMethod::default(),
            overlap_tolerance: default_overlap_tolerance(),
            max_size_parameter: default_max_size_parameter(),
            max_size_product: default_max_size_product(),
            max_modes: default_max_modes(),
        }
    }
}

/// Solved outgoing-wave expansion of a cluster.
#[derive(Debug, Clone)]
pub struct ClusterExpansion {
    /// Sphere centres in the beam frame.
    centers: Vec<Point3>,
    orders: Vec<usize>,
    /// Per sphere: magnetic then electric outgoing-wave coefficients.
    coefficients: Vec<Array1<Complex64>>,
    k: f64,
    iterations: usize,
    residual: f64,
}

impl ClusterExpansion {
    /// Truncation order of each sphere.
    pub fn orders(&self) -> &[usize] {
        &self.orders
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// True relative residual of the accepted solution.
    pub fn residual(&self) -> f64 {
        self.residual
    }

    /// Scattered field at detector-frame `positions`, one row per position.
    pub fn fields(&self, positions: &[Point3]) -> Array2<Complex64> {
        let mut out = Array2::zeros((positions.len(), 3));
        let mut waves = Vec::new();
        for ((center, &order), coeffs) in self.centers.iter().zip(&self.orders).zip(&self.coefficients) {
            waves.resize(2 * mode_count(order), [ZERO; 3]);
            for (i, &p) in positions.iter().enumerate() {
                outgoing_waves(order, self.k, beam_frame(p) - *center, &mut waves);
                for (wave, &c) in waves.iter().zip(coeffs.iter()) {
                    for comp in 0..3 {
                        out[[i, comp]] += wave[comp] * c;
                    }
                }
            }
        }
        out
    }
}

/// Mie coefficients of one sphere laid out as the diagonal of $\mathbf{D}$.
fn response_diagonal(coeffs: &MieCoefficients, order: usize) -> Vec<Complex64> {
    let l_total = mode_count(order);
    (0..2 * l_total)
        .map(|row| {
            if row < l_total {
                coeffs.b[mode_order(row) - 1]
            } else {
                coeffs.a[mode_order(row - l_total) - 1]
            }
        })
        .collect()
}

impl Multisphere {
    pub fn new() -> Self {
        Self::default()
    }

    fn control(&self) -> IterationControl {
        IterationControl {
            max_iterations: self.niter,
            tolerance: self.qeps2,
            divergence_limit: DIVERGENCE_LIMIT,
        }
    }

    fn spheres<'a>(&self, scatterer: &'a Scatterer) -> Result<Vec<&'a Sphere>, ScatteringError> {
        scatterer
            .spheres()
            .ok_or_else(|| self.incompatible(scatterer.kind()))
    }

    /// Build and solve the coupled system for `spheres`.
    pub fn expand(&self, spheres: &[&Sphere], beam: &Beam) -> Result<ClusterExpansion, ScatteringError> {
        let k = beam.k;
        let centers: Vec<Point3> = spheres.iter().map(|s| beam_frame(s.center)).collect();

        let mut orders = Vec::with_capacity(spheres.len());
        let mut diagonals = Vec::with_capacity(spheres.len());
        for sphere in spheres {
            let coeffs = MieCoefficients::for_sphere(
                beam.size_parameter(sphere.r),
                beam.relative_index(sphere.n),
            );
            let order = coeffs.significant_order(self.qeps1);
            log::debug!(
                "multisphere: sphere at {:?} truncated at order {order} of {}",
                sphere.center,
                coeffs.n_max()
            );
            diagonals.push(response_diagonal(&coeffs, order));
            orders.push(order);
        }

        let mut offsets = Vec::with_capacity(spheres.len() + 1);
        let mut dim = 0;
        offsets.push(dim);
        for &order in &orders {
            dim += 2 * mode_count(order);
            offsets.push(dim);
        }

        let mut d_min = f64::INFINITY;
        for i in 0..centers.len() {
            for j in (i + 1)..centers.len() {
                d_min = d_min.min(centers[i].distance(&centers[j]));
            }
        }
        if d_min == 0.0 {
            return Err(ScatteringError::UnrealizableScatterer(
                "two spheres share a centre".to_string(),
            ));
        }

        let mut matrix = Array2::<Complex64>::eye(dim);
        let mut rhs = Array1::<Complex64>::zeros(dim);
        let [px, py] = beam.polarization;

        for i in 0..spheres.len() {
            let radius = spheres[i].r.min(d_min / 4.0);
            let plane_band = orders[i] + 20 + (k * radius).ceil() as usize;
            let band = (0..spheres.len())
                .filter(|&j| j != i)
                .map(|j| orders[j] + 30)
                .fold(plane_band, usize::max);
            let sphere = ProjectionSphere::new(centers[i], orders[i], radius, k, band);

            // Source 0 is the illumination; then every mode of every other sphere.
            let others: Vec<usize> = (0..spheres.len()).filter(|&j| j != i).collect();
            let mut columns = Vec::with_capacity(others.len());
            let mut n_sources = 1;
            for &j in &others {
                columns.push(n_sources);
                n_sources += 2 * mode_count(orders[j]);
            }
            let projected = sphere.project(k, n_sources, |pt, values| {
                let e = Complex64::from_polar(1.0, k * pt.z);
                values[0] = [e * px, e * py, ZERO];
                for (&j, &col) in others.iter().zip(&columns) {
                    let width = 2 * mode_count(orders[j]);
                    outgoing_waves(orders[j], k, pt - centers[j], &mut values[col..col + width]);
                }
            });

            let d = &diagonals[i];
            for (row, &dr) in d.iter().enumerate() {
                rhs[offsets[i] + row] = -dr * projected[[row, 0]];
                for (&j, &col) in others.iter().zip(&columns) {
                    for c in 0..(offsets[j + 1] - offsets[j]) {
                        matrix[[offsets[i] + row, offsets[j] + c]] += dr * projected[[row, col + c]];
                    }
                }
            }
        }

        if matrix.iter().chain(rhs.iter()).any(|v| !v.is_finite()) {
            return Err(ScatteringError::NumericDivergence { iteration: 0 });
        }
        log::debug!("multisphere: solving {dim} coupled modes with {:?}", self.meth);

        let (solution, iterations) = self.solve(&matrix, &rhs)?;
        let residual = iterative::relative_residual(&matrix, &solution, &rhs);
        if !residual.is_finite() {
            return Err(ScatteringError::NumericDivergence { iteration: iterations });
        }
        if residual > self.eps {
            return Err(ScatteringError::ConvergenceFailure { iterations, residual });
        }
        log::info!(
            "multisphere: {} spheres, {dim} modes, converged in {iterations} iterations (residual {residual:.2e})",
            spheres.len()
        );

        let coefficients = (0..spheres.len())
            .map(|i| solution.slice(ndarray::s![offsets[i]..offsets[i + 1]]).to_owned())
            .collect();
        Ok(ClusterExpansion {
            centers,
            orders,
            coefficients,
            k,
            iterations,
            residual,
        })
    }

    /// Solution and iteration count, or the error the stop maps to.
    fn solve(
        &self,
        matrix: &Array2<Complex64>,
        rhs: &Array1<Complex64>,
    ) -> Result<(Array1<Complex64>, usize), ScatteringError> {
        let control = self.control();
        let report: SolveReport = match self.meth {
            ExpansionMethod::DirectLu => direct::solve_direct(matrix, rhs)?,
            ExpansionMethod::BiCgStab => iterative::bicgstab(matrix, rhs, &control),
            ExpansionMethod::OrderOfScattering => iterative::order_of_scattering(matrix, rhs, &control),
        };
        match report.status {
            SolveStatus::Converged => Ok((report.solution, report.iterations)),
            SolveStatus::Diverged => Err(ScatteringError::NumericDivergence {
                iteration: report.iterations,
            }),
            SolveStatus::Exhausted => Err(ScatteringError::ConvergenceFailure {
                iterations: report.iterations,
                residual: report.residual,
            }),
        }
    }
}

impl ScatteringTheory for Multisphere {
    fn name(&self) -> &'static str {
        "Multisphere"
    }

    fn capabilities(&self, op: Operation) -> &'static [ScattererKind] {
        match op {
            Operation::Field | Operation::Intensity | Operation::Hologram => FIELD_KINDS,
            Operation::CrossSections | Operation::ScatteringMatrix => &[],
        }
    }

    fn check_realizable(
        &self,
        scatterer: &Scatterer,
        beam: &Beam,
        overlaps: &[OverlapWarning],
    ) -> Result<(), ScatteringError> {
        let spheres = self.spheres(scatterer)?;
        for sphere in &spheres {
            let x = beam.size_parameter(sphere.r);
            if x > self.max_size_parameter {
                return Err(ScatteringError::UnrealizableScatterer(format!(
                    "size parameter {x:.1} of sphere with radius {} exceeds {}",
                    sphere.r, self.max_size_parameter
                )));
            }
        }

        let centroid = Point3::centroid(spheres.iter().map(|s| &s.center)).unwrap_or(Point3::ORIGIN);
        let extent = spheres
            .iter()
            .map(|s| s.center.distance(&centroid) + s.r)
            .fold(0.0, f64::max);
        let product = beam.size_parameter(extent) * spheres.len() as f64;
        if product > self.max_size_product {
            return Err(ScatteringError::UnrealizableScatterer(format!(
                "cluster size parameter times sphere count is {product:.1}, above {}",
                self.max_size_product
            )));
        }

        let modes: usize = spheres
            .iter()
            .map(|s| {
                let order = wiscombe_order(beam.size_parameter(s.r));
                2 * order * (order + 2)
            })
            .sum();
        if modes > self.max_modes {
            return Err(ScatteringError::UnrealizableScatterer(format!(
                "the coupled expansion needs about {modes} modes, above {}",
                self.max_modes
            )));
        }

        if let Some(w) = overlaps.iter().find(|w| w.fraction > self.overlap_tolerance) {
            return Err(ScatteringError::UnrealizableScatterer(format!(
                "{w}, beyond the tolerated {:.0}%",
                100.0 * self.overlap_tolerance
            )));
        }
        Ok(())
    }

    fn raw_fields(
        &self,
        scatterer: &Scatterer,
        positions: &[Point3],
        beam: &Beam,
    ) -> Result<Array2<Complex64>, ScatteringError> {
        let spheres = self.spheres(scatterer)?;
        Ok(self.expand(&spheres, beam)?.fields(positions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optics::Optics;

    fn beam() -> Beam {
        Optics::new(658e-9, 1.33).beam().unwrap()
    }

    fn sphere(x: f64) -> Sphere {
        Sphere::new(Complex64::new(1.5811, 1e-4), 0.5e-6, [x, 7e-6, 10e-6])
    }

    #[test]
    fn test_method_codes() {
        for code in 0..3 {
            assert_eq!(ExpansionMethod::from_code(code).map(ExpansionMethod::code), Some(code));
        }
        assert_eq!(ExpansionMethod::from_code(3), None);
        assert_eq!(ExpansionMethod::default(), ExpansionMethod::BiCgStab);
    }

    #[test]
    fn test_response_diagonal_layout() {
        let coeffs = MieCoefficients::for_sphere(3.0, Complex64::new(1.5, 0.0));
        let d = response_diagonal(&coeffs, 2);
        assert_eq!(d.len(), 16);
        assert_eq!(d[0], coeffs.b[0]);
        assert_eq!(d[3], coeffs.b[1]);
        assert_eq!(d[8], coeffs.a[0]);
        assert_eq!(d[15], coeffs.a[1]);
    }

    #[test]
    fn test_pair_solves_with_every_method() {
        let (s1, s2) = (sphere(7.1e-6), sphere(6e-6));
        let b = beam();
        let mut fields = Vec::new();
        for meth in [ExpansionMethod::BiCgStab, ExpansionMethod::DirectLu] {
            let theory = Multisphere {
                meth,
                ..Multisphere::default()
            };
            let expansion = theory.expand(&[&s1, &s2], &b).unwrap();
            assert!(expansion.residual() <= theory.eps);
            assert_eq!(expansion.orders().len(), 2);
            fields.push(expansion.fields(&[Point3::new(5e-6, 6e-6, 0.0)]));
        }
        for c in 0..3 {
            assert!((fields[0][[0, c]] - fields[1][[0, c]]).norm() <= 1e-5 * fields[1][[0, c]].norm() + 1e-12);
        }
    }

    #[test]
    fn test_direct_solve_of_singular_system_diverges() {
        let theory = Multisphere {
            meth: ExpansionMethod::DirectLu,
            ..Multisphere::default()
        };
        let matrix = Array2::<Complex64>::zeros((4, 4));
        let rhs = Array1::from_elem(4, Complex64::new(1.0, 0.0));
        assert!(matches!(
            theory.solve(&matrix, &rhs),
            Err(ScatteringError::NumericDivergence { iteration: 1 })
        ));
    }

    #[test]
    fn test_mode_count_ceiling() {
        let b = beam();
        let large = Scatterer::from(Sphere::new(Complex64::new(1.5, 0.0), 150.0 / b.k, [0.0, 0.0, 100e-6]));
        assert!(matches!(
            Multisphere::default().check_realizable(&large, &b, &[]),
            Err(ScatteringError::UnrealizableScatterer(_))
        ));

        // Only the mode estimate applies once the size ceilings are lifted.
        let lifted = Multisphere {
            max_size_parameter: f64::INFINITY,
            max_size_product: f64::INFINITY,
            ..Multisphere::default()
        };
        match lifted.check_realizable(&large, &b, &[]) {
            Err(ScatteringError::UnrealizableScatterer(msg)) => assert!(msg.contains("modes"), "{msg}"),
            other => panic!("expected an unrealizable scatterer, got {other:?}"),
        }
        let pair = Scatterer::from(holoscat_geometry::SphereCluster::new(vec![
            sphere(7.1e-6).into(),
            sphere(6e-6).into(),
        ]));
        assert!(lifted.check_realizable(&pair, &b, &[]).is_ok());
    }

    #[test]
    fn test_size_product_ceiling() {
        let theory = Multisphere::default();
        let far = Scatterer::from(holoscat_geometry::SphereCluster::new(vec![
            Sphere::new(Complex64::new(1.5, 0.0), 0.5e-6, [7.1, 7e-6, 10e-6]).into(),
            sphere(6e-6).into(),
        ]));
        assert!(matches!(
            theory.check_realizable(&far, &beam(), &[]),
            Err(ScatteringError::UnrealizableScatterer(_))
        ));
    }
}
