//! Detector sampling.
//!
//! A [`Schema`] lists where the scattered light is sampled and which of
//! those samples are actually computed. Image grids are stored row-major:
//! pixel `(i, j)` is sample `i * ny + j` and sits at `(i * px, j * py, 0)`
//! in the detector frame.

use holoscat_geometry::Point3;
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::optics::Optics;
use crate::theory::ScatteringError;

/// Sample layout on the detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SampleGeometry {
    /// A rectangular pixel grid of `(nx, ny)` pixels.
    ImageGrid { shape: (usize, usize) },
    /// Arbitrary points in the detector frame (m).
    Points(Vec<Point3>),
    /// Far-field polar scattering angles (rad).
    Angles(Vec<f64>),
}

/// Detector geometry, optics, and an optional selection mask.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub geometry: SampleGeometry,
    pub optics: Optics,
    /// `Some(mask)` restricts computation to samples whose entry is `true`.
    #[serde(default)]
    pub selection: Option<Vec<bool>>,
}

impl Schema {
    pub fn new(geometry: SampleGeometry, optics: Optics) -> Self {
        Self {
            geometry,
            optics,
            selection: None,
        }
    }

    pub fn image(shape: (usize, usize), optics: Optics) -> Self {
        Self::new(SampleGeometry::ImageGrid { shape }, optics)
    }

    /// Square `n × n` image.
    pub fn square(n: usize, optics: Optics) -> Self {
        Self::image((n, n), optics)
    }

    pub fn points(points: Vec<Point3>, optics: Optics) -> Self {
        Self::new(SampleGeometry::Points(points), optics)
    }

    pub fn angles(theta: Vec<f64>, optics: Optics) -> Self {
        Self::new(SampleGeometry::Angles(theta), optics)
    }

    /// Restrict computation to the samples flagged in `mask`.
    pub fn with_selection(mut self, mask: Vec<bool>) -> Result<Self, ScatteringError> {
        if mask.len() != self.len() {
            return Err(ScatteringError::InvalidSchema(format!(
                "selection has {} entries for {} samples",
                mask.len(),
                self.len()
            )));
        }
        self.selection = Some(mask);
        Ok(self)
    }

    /// Select a random `fraction` of the samples, reproducibly for a given
    /// `seed`.
    pub fn with_random_fraction(self, fraction: f64, seed: u64) -> Result<Self, ScatteringError> {
        if !(fraction > 0.0 && fraction <= 1.0) {
            return Err(ScatteringError::InvalidSchema(format!(
                "random selection fraction must lie in (0, 1], got {fraction}"
            )));
        }
        let len = self.len();
        let amount = ((fraction * len as f64).round() as usize).clamp(1, len.max(1));
        let mut rng = StdRng::seed_from_u64(seed);
        let mut mask = vec![false; len];
        if len > 0 {
            for i in rand::seq::index::sample(&mut rng, len, amount) {
                mask[i] = true;
            }
        }
        log::debug!("selected {amount} of {len} samples (seed {seed})");
        self.with_selection(mask)
    }

    /// Total number of samples, selected or not.
    pub fn len(&self) -> usize {
        match &self.geometry {
            SampleGeometry::ImageGrid { shape } => shape.0 * shape.1,
            SampleGeometry::Points(p) => p.len(),
            SampleGeometry::Angles(a) => a.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn image_shape(&self) -> Option<(usize, usize)> {
        match self.geometry {
            SampleGeometry::ImageGrid { shape } => Some(shape),
            _ => None,
        }
    }

    pub fn is_selected(&self, index: usize) -> bool {
        match &self.selection {
            Some(mask) => mask.get(index).copied().unwrap_or(false),
            None => index < self.len(),
        }
    }

    pub fn selected_indices(&self) -> Vec<usize> {
        (0..self.len()).filter(|&i| self.is_selected(i)).collect()
    }

    /// Detector-frame positions of every sample.
    pub fn positions(&self) -> Result<Vec<Point3>, ScatteringError> {
        match &self.geometry {
            SampleGeometry::ImageGrid { shape: (nx, ny) } => {
                let [px, py] = self.optics.pixel_scale()?;
                let mut out = Vec::with_capacity(nx * ny);
                for i in 0..*nx {
                    for j in 0..*ny {
                        out.push(Point3::new(i as f64 * px, j as f64 * py, 0.0));
                    }
                }
                Ok(out)
            }
            SampleGeometry::Points(p) => Ok(p.clone()),
            SampleGeometry::Angles(_) => Err(ScatteringError::InvalidSchema(
                "angular schema has no detector positions".to_string(),
            )),
        }
    }

    /// Scattering angles of an angular schema.
    pub fn angles_theta(&self) -> Result<&[f64], ScatteringError> {
        match &self.geometry {
            SampleGeometry::Angles(a) => Ok(a),
            _ => Err(ScatteringError::InvalidSchema(
                "scattering matrices need an angular schema".to_string(),
            )),
        }
    }

    /// Reshape per-sample values of an image schema into `(nx, ny)`.
    pub fn to_image(&self, values: &Array1<f64>) -> Result<Array2<f64>, ScatteringError> {
        let shape = self.image_shape().ok_or_else(|| {
            ScatteringError::InvalidSchema("schema is not an image grid".to_string())
        })?;
        Array2::from_shape_vec(shape, values.to_vec())
            .map_err(|e| ScatteringError::InvalidSchema(e.to_string()))
    }
}
