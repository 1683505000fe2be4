//! Scattering theories and the calculation entry points.
//!
//! The [`ScatteringTheory`] trait defines the operations every theory
//! offers: scattered field, intensity, hologram, cross-sections and
//! amplitude scattering matrix. Each theory declares, per operation, the
//! scatterer kinds it can handle; a scatterer (or any member of a cluster)
//! of another kind is rejected before anything is computed.
//!
//! Every calculation runs the same checks in the same order:
//!
//! 1. scatterer kinds against the theory's capability table;
//! 2. optics and schema attributes the operation needs (wavelength, pixel
//!    scale, sample geometry);
//! 3. scatterer validation and the theory's feasibility limits;
//! 4. for field-based operations, every sphere clear of the detector plane;
//! 5. the theory's own algorithm, on selected samples only.
//!
//! Two theories are provided: [`mie::Mie`] (closed-form series,
//! superposed over cluster members) and [`multisphere::Multisphere`]
//! (coupled multipole expansion).

pub mod mie;
pub mod multisphere;

use holoscat_geometry::{OverlapWarning, Point3, Scatterer, ScattererError, ScattererKind};
use ndarray::{Array1, Array2, Array3};
use num_complex::Complex64;
use thiserror::Error;

use crate::optics::{Beam, Optics};
use crate::schema::Schema;
use crate::types::CrossSections;

/// Errors that can occur during a scattering calculation.
#[derive(Debug, Error)]
pub enum ScatteringError {
    #[error("The implementation of the {theory} scattering theory doesn't know how to handle scatterers of type {kind}")]
    IncompatibleTheory {
        theory: &'static str,
        kind: ScattererKind,
    },

    #[error("Unrealizable scatterer: {0}")]
    UnrealizableScatterer(String),

    #[error("Multisphere calculation failed to converge after {iterations} iterations (residual: {residual:.2e}); try a larger niter or looser eps")]
    ConvergenceFailure { iterations: usize, residual: f64 },

    #[error("Multisphere expansion produced non-finite or diverging values at iteration {iteration}; spheres may overlap too strongly")]
    NumericDivergence { iteration: usize },

    #[error("Optics configuration is missing the {0}")]
    MissingConfiguration(&'static str),

    #[error("Invalid optics: {0}")]
    InvalidOptics(String),

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("Invalid scatterer parameters: {0}")]
    Parameter(ScattererError),

    #[error("Invalid theory configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Linear algebra error: {0}")]
    LinAlg(String),
}

impl From<ScattererError> for ScatteringError {
    fn from(e: ScattererError) -> Self {
        match e {
            ScattererError::Unrealizable(reason) => ScatteringError::UnrealizableScatterer(reason),
            other => ScatteringError::Parameter(other),
        }
    }
}

/// The calculations a theory can be asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Field,
    Intensity,
    Hologram,
    CrossSections,
    ScatteringMatrix,
}

/// Map detector-frame coordinates (height above the detector) to the frame
/// in which the illumination travels along +z.
pub(crate) fn beam_frame(p: Point3) -> Point3 {
    Point3::new(p.x, p.y, -p.z)
}

/// A scattering theory.
///
/// Implementors supply the capability table and the raw algorithms; the
/// `calc_*` methods add the checks and sample bookkeeping shared by all
/// theories.
pub trait ScatteringTheory {
    /// Human-readable name, as used in error messages.
    fn name(&self) -> &'static str;

    /// Scatterer kinds accepted for `op`, including cluster members.
    fn capabilities(&self, op: Operation) -> &'static [ScattererKind];

    /// Theory-specific limits on validated scatterers.
    fn check_realizable(
        &self,
        scatterer: &Scatterer,
        beam: &Beam,
        overlaps: &[OverlapWarning],
    ) -> Result<(), ScatteringError>;

    /// Scattered field at detector-frame `positions`, one row per position.
    fn raw_fields(
        &self,
        scatterer: &Scatterer,
        positions: &[Point3],
        beam: &Beam,
    ) -> Result<Array2<Complex64>, ScatteringError>;

    fn raw_cross_sections(
        &self,
        scatterer: &Scatterer,
        _beam: &Beam,
    ) -> Result<CrossSections, ScatteringError> {
        Err(self.incompatible(scatterer.kind()))
    }

    /// Amplitude matrices `[[S2, S3], [S4, S1]]` at polar angles `theta`.
    fn raw_scat_matrix(
        &self,
        scatterer: &Scatterer,
        _theta: &[f64],
        _beam: &Beam,
    ) -> Result<Array3<Complex64>, ScatteringError> {
        Err(self.incompatible(scatterer.kind()))
    }

    fn incompatible(&self, kind: ScattererKind) -> ScatteringError {
        ScatteringError::IncompatibleTheory {
            theory: self.name(),
            kind,
        }
    }

    /// Reject the scatterer if it, or any cluster member, has a kind the
    /// theory cannot handle for `op`.
    fn check_compatible(&self, scatterer: &Scatterer, op: Operation) -> Result<(), ScatteringError> {
        let accepted = self.capabilities(op);
        match scatterer.kinds().into_iter().find(|k| !accepted.contains(k)) {
            Some(kind) => Err(self.incompatible(kind)),
            None => Ok(()),
        }
    }

    /// Scattered electric field, shape `(samples, 3)`. Unselected samples
    /// are zero.
    fn calc_field(
        &self,
        scatterer: &Scatterer,
        schema: &Schema,
    ) -> Result<Array2<Complex64>, ScatteringError> {
        self.check_compatible(scatterer, Operation::Field)?;
        selected_field(self, scatterer, schema)
    }

    /// Scattered intensity $|\mathbf{E}_s|^2$ per sample.
    fn calc_intensity(
        &self,
        scatterer: &Scatterer,
        schema: &Schema,
    ) -> Result<Array1<f64>, ScatteringError> {
        self.check_compatible(scatterer, Operation::Intensity)?;
        let field = selected_field(self, scatterer, schema)?;
        Ok(field
            .rows()
            .into_iter()
            .map(|row| row.iter().map(|c| c.norm_sqr()).sum::<f64>())
            .collect())
    }

    /// Hologram $|\hat{\mathbf{p}} + \alpha \mathbf{E}_s|^2$ per sample, for a
    /// unit reference wave and scattered-field amplitude factor `scaling`.
    /// Unselected samples are zero.
    fn calc_holo(
        &self,
        scatterer: &Scatterer,
        schema: &Schema,
        scaling: f64,
    ) -> Result<Array1<f64>, ScatteringError> {
        self.check_compatible(scatterer, Operation::Hologram)?;
        let field = selected_field(self, scatterer, schema)?;
        let [px, py] = schema.optics.unit_polarization()?;
        let reference = [Complex64::new(px, 0.0), Complex64::new(py, 0.0), Complex64::new(0.0, 0.0)];
        Ok((0..schema.len())
            .map(|i| {
                if !schema.is_selected(i) {
                    return 0.0;
                }
                (0..3)
                    .map(|c| (reference[c] + field[[i, c]] * scaling).norm_sqr())
                    .sum::<f64>()
            })
            .collect())
    }

    /// Scattering, absorption and extinction cross-sections.
    fn calc_cross_sections(
        &self,
        scatterer: &Scatterer,
        optics: &Optics,
    ) -> Result<CrossSections, ScatteringError> {
        self.check_compatible(scatterer, Operation::CrossSections)?;
        let beam = optics.beam()?;
        let overlaps = scatterer.validate()?;
        self.check_realizable(scatterer, &beam, &overlaps)?;
        self.raw_cross_sections(scatterer, &beam)
    }

    /// Amplitude scattering matrix at the angles of an angular schema,
    /// shape `(angles, 2, 2)`. Unselected angles are zero.
    fn calc_scat_matrix(
        &self,
        scatterer: &Scatterer,
        schema: &Schema,
    ) -> Result<Array3<Complex64>, ScatteringError> {
        self.check_compatible(scatterer, Operation::ScatteringMatrix)?;
        let theta = schema.angles_theta()?;
        let beam = schema.optics.beam()?;
        let overlaps = scatterer.validate()?;
        self.check_realizable(scatterer, &beam, &overlaps)?;

        let selected = schema.selected_indices();
        let angles: Vec<f64> = selected.iter().map(|&i| theta[i]).collect();
        let raw = self.raw_scat_matrix(scatterer, &angles, &beam)?;
        let mut out = Array3::zeros((theta.len(), 2, 2));
        for (row, &i) in selected.iter().enumerate() {
            out.slice_mut(ndarray::s![i, .., ..])
                .assign(&raw.slice(ndarray::s![row, .., ..]));
        }
        Ok(out)
    }
}

/// Checks shared by the field-based operations, then the theory's field at
/// the selected samples, scattered back into a full-size array.
fn selected_field<T: ScatteringTheory + ?Sized>(
    theory: &T,
    scatterer: &Scatterer,
    schema: &Schema,
) -> Result<Array2<Complex64>, ScatteringError> {
    let beam = schema.optics.beam()?;
    let positions = schema.positions()?;
    let overlaps = scatterer.validate()?;
    theory.check_realizable(scatterer, &beam, &overlaps)?;
    check_above_detector(scatterer)?;

    let selected = schema.selected_indices();
    let points: Vec<Point3> = selected.iter().map(|&i| positions[i]).collect();
    log::debug!(
        "{}: evaluating {} of {} samples",
        theory.name(),
        points.len(),
        positions.len()
    );
    let raw = theory.raw_fields(scatterer, &points, &beam)?;
    let mut out = Array2::zeros((positions.len(), 3));
    for (row, &i) in selected.iter().enumerate() {
        out.row_mut(i).assign(&raw.row(row));
    }
    Ok(out)
}

/// Field calculations need every sphere (or the bounding sphere of any
/// other scatterer) strictly above the detector plane `z = 0`.
fn check_above_detector(scatterer: &Scatterer) -> Result<(), ScatteringError> {
    let extents: Vec<(Point3, f64)> = match scatterer.spheres() {
        Some(spheres) => spheres.iter().map(|s| (s.center, s.r)).collect(),
        None => vec![(scatterer.center(), scatterer.bounding_radius())],
    };
    match extents.into_iter().find(|(c, r)| c.z <= *r) {
        Some((c, r)) => Err(ScatteringError::UnrealizableScatterer(format!(
            "scatterer of radius {r} at height {} reaches the detector plane",
            c.z
        ))),
        None => Ok(()),
    }
}
