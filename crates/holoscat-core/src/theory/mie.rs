//! Lorenz-Mie theory as a [`ScatteringTheory`].
//!
//! Clusters are handled by coherent superposition: each member scatters the
//! incident wave independently, phased by the incident wave at its centre.
//! Multiple scattering between members is ignored; use
//! [`super::multisphere::Multisphere`] when it matters.

use holoscat_geometry::{OverlapWarning, Point3, Scatterer, ScattererKind, Sphere};
use ndarray::{Array2, Array3};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use super::{beam_frame, Operation, ScatteringError, ScatteringTheory};
use crate::mie::{amplitude_matrix, efficiencies, scattered_field, MieCoefficients, RadialMode};
use crate::optics::Beam;
use crate::types::CrossSections;

const FIELD_KINDS: &[ScattererKind] = &[ScattererKind::Sphere, ScattererKind::SphereCluster];
const SINGLE_SPHERE: &[ScattererKind] = &[ScattererKind::Sphere];

/// Mie scattering theory and its options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mie {
    /// Largest sphere size parameter $ka$ accepted.
    #[serde(default = "default_max_size_parameter")]
    pub max_size_parameter: f64,
    /// Exact Hankel functions; otherwise their far-field asymptote.
    #[serde(default = "default_true")]
    pub full_radial_dependence: bool,
    /// Keep the radial component of the scattered field.
    #[serde(default = "default_true")]
    pub compute_escat_radial: bool,
}

fn default_max_size_parameter() -> f64 {
    1000.0
}

fn default_true() -> bool {
    true
}

impl Default for Mie {
    fn default() -> Self {
        Self {
            max_size_parameter: default_max_size_parameter(),
            full_radial_dependence: true,
            compute_escat_radial: true,
        }
    }
}

impl Mie {
    pub fn new() -> Self {
        Self::default()
    }

    fn radial_mode(&self) -> RadialMode {
        RadialMode {
            full_radial_dependence: self.full_radial_dependence,
            compute_escat_radial: self.compute_escat_radial,
        }
    }

    fn spheres<'a>(&self, scatterer: &'a Scatterer) -> Result<Vec<&'a Sphere>, ScatteringError> {
        scatterer
            .spheres()
            .ok_or_else(|| self.incompatible(scatterer.kind()))
    }

    fn single_sphere<'a>(&self, scatterer: &'a Scatterer) -> Result<&'a Sphere, ScatteringError> {
        match scatterer {
            Scatterer::Sphere(s) => Ok(s),
            other => Err(self.incompatible(other.kind())),
        }
    }
}

impl ScatteringTheory for Mie {
    fn name(&self) -> &'static str {
        "Mie"
    }

    fn capabilities(&self, op: Operation) -> &'static [ScattererKind] {
        match op {
            Operation::Field | Operation::Intensity | Operation::Hologram => FIELD_KINDS,
            Operation::CrossSections | Operation::ScatteringMatrix => SINGLE_SPHERE,
        }
    }

    fn check_realizable(
        &self,
        scatterer: &Scatterer,
        beam: &Beam,
        _overlaps: &[OverlapWarning],
    ) -> Result<(), ScatteringError> {
        for sphere in self.spheres(scatterer)? {
            let x = beam.size_parameter(sphere.r);
            if x > self.max_size_parameter {
                return Err(ScatteringError::UnrealizableScatterer(format!(
                    "size parameter {x:.1} of sphere with radius {} exceeds {}",
                    sphere.r, self.max_size_parameter
                )));
            }
        }
        Ok(())
    }

    fn raw_fields(
        &self,
        scatterer: &Scatterer,
        positions: &[Point3],
        beam: &Beam,
    ) -> Result<Array2<Complex64>, ScatteringError> {
        let mode = self.radial_mode();
        let mut out = Array2::zeros((positions.len(), 3));
        for sphere in self.spheres(scatterer)? {
            let x = beam.size_parameter(sphere.r);
            let coeffs = MieCoefficients::for_sphere(x, beam.relative_index(sphere.n));
            log::debug!("Mie: sphere at {:?}, x = {x:.3}, {} orders", sphere.center, coeffs.n_max());
            let center = beam_frame(sphere.center);
            let phase = Complex64::from_polar(1.0, beam.k * center.z);
            for (i, &p) in positions.iter().enumerate() {
                let e = scattered_field(&coeffs, beam_frame(p) - center, beam.k, beam.polarization, mode);
                for c in 0..3 {
                    out[[i, c]] += e[c] * phase;
                }
            }
        }
        Ok(out)
    }

    fn raw_cross_sections(
        &self,
        scatterer: &Scatterer,
        beam: &Beam,
    ) -> Result<CrossSections, ScatteringError> {
        let sphere = self.single_sphere(scatterer)?;
        let x = beam.size_parameter(sphere.r);
        let coeffs = MieCoefficients::for_sphere(x, beam.relative_index(sphere.n));
        Ok(efficiencies(&coeffs, x).to_cross_sections(sphere.r))
    }

    fn raw_scat_matrix(
        &self,
        scatterer: &Scatterer,
        theta: &[f64],
        beam: &Beam,
    ) -> Result<Array3<Complex64>, ScatteringError> {
        let sphere = self.single_sphere(scatterer)?;
        let coeffs = MieCoefficients::for_sphere(
            beam.size_parameter(sphere.r),
            beam.relative_index(sphere.n),
        );
        let mut out = Array3::zeros((theta.len(), 2, 2));
        for (i, &t) in theta.iter().enumerate() {
            let (s1, s2) = amplitude_matrix(&coeffs, t);
            out[[i, 0, 0]] = s2;
            out[[i, 1, 1]] = s1;
        }
        Ok(out)
    }
}
