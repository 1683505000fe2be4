//! Illumination and imaging optics.
//!
//! Optics values may be built before every attribute is known. Missing
//! attributes are reported by the accessors when a calculation first needs
//! them, as [`ScatteringError::MissingConfiguration`].

use serde::{Deserialize, Serialize};

use crate::theory::ScatteringError;

/// Wavelength, medium, polarisation and detector sampling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Optics {
    /// Vacuum wavelength (m).
    #[serde(default)]
    pub wavelength: Option<f64>,
    /// Refractive index of the medium.
    #[serde(default = "default_index")]
    pub index: f64,
    /// Transverse polarisation (x, y) of the illumination. Normalised on use.
    #[serde(default = "default_polarization")]
    pub polarization: [f64; 2],
    /// Pixel pitch (x, y) at the sample plane (m).
    #[serde(default)]
    pub pixel_scale: Option<[f64; 2]>,
    /// Beam divergence (rad). Only collimated illumination is modelled.
    #[serde(default)]
    pub divergence: f64,
}

fn default_index() -> f64 {
    1.0
}

fn default_polarization() -> [f64; 2] {
    [1.0, 0.0]
}

impl Default for Optics {
    fn default() -> Self {
        Self {
            wavelength: None,
            index: default_index(),
            polarization: default_polarization(),
            pixel_scale: None,
            divergence: 0.0,
        }
    }
}

/// A collimated, linearly or elliptically polarised plane wave travelling
/// towards the detector, in a form the theories consume directly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Beam {
    /// Wavenumber in the medium (1/m).
    pub k: f64,
    /// Medium refractive index.
    pub index: f64,
    /// Unit transverse polarisation.
    pub polarization: [f64; 2],
}

impl Beam {
    /// Refractive index relative to the medium.
    pub fn relative_index(&self, n: num_complex::Complex64) -> num_complex::Complex64 {
        n / self.index
    }

    /// Size parameter $k a$ of a sphere of radius `radius`.
    pub fn size_parameter(&self, radius: f64) -> f64 {
        self.k * radius
    }
}

impl Optics {
    pub fn new(wavelength: f64, index: f64) -> Self {
        Self {
            wavelength: Some(wavelength),
            index,
            ..Self::default()
        }
    }

    /// Optics in a medium of index `index`, with the wavelength still unset.
    pub fn in_medium(index: f64) -> Self {
        Self {
            index,
            ..Self::default()
        }
    }

    pub fn with_wavelength(mut self, wavelength: f64) -> Self {
        self.wavelength = Some(wavelength);
        self
    }

    pub fn with_polarization(mut self, polarization: [f64; 2]) -> Self {
        self.polarization = polarization;
        self
    }

    /// Square pixels of pitch `scale`.
    pub fn with_pixel_scale(self, scale: f64) -> Self {
        self.with_pixel_scale_xy([scale, scale])
    }

    pub fn with_pixel_scale_xy(mut self, scale: [f64; 2]) -> Self {
        self.pixel_scale = Some(scale);
        self
    }

    pub fn with_divergence(mut self, divergence: f64) -> Self {
        self.divergence = divergence;
        self
    }

    pub fn wavelength(&self) -> Result<f64, ScatteringError> {
        match self.wavelength {
            Some(w) if w.is_finite() && w > 0.0 => Ok(w),
            Some(w) => Err(ScatteringError::InvalidOptics(format!(
                "wavelength must be positive, got {w}"
            ))),
            None => Err(ScatteringError::MissingConfiguration("wavelength")),
        }
    }

    /// Wavelength in the medium.
    pub fn med_wavelength(&self) -> Result<f64, ScatteringError> {
        Ok(self.wavelength()? / self.index)
    }

    /// Wavenumber in the medium, $2\pi n_{med} / \lambda$.
    pub fn wavenumber(&self) -> Result<f64, ScatteringError> {
        Ok(2.0 * std::f64::consts::PI / self.med_wavelength()?)
    }

    pub fn pixel_scale(&self) -> Result<[f64; 2], ScatteringError> {
        self.pixel_scale
            .ok_or(ScatteringError::MissingConfiguration("pixel scale"))
    }

    pub fn unit_polarization(&self) -> Result<[f64; 2], ScatteringError> {
        let [px, py] = self.polarization;
        let norm = px.hypot(py);
        if norm == 0.0 || !norm.is_finite() {
            return Err(ScatteringError::InvalidOptics(format!(
                "polarization {:?} has no direction",
                self.polarization
            )));
        }
        Ok([px / norm, py / norm])
    }

    /// Everything a theory needs about the illumination, checked.
    pub fn beam(&self) -> Result<Beam, ScatteringError> {
        let k = self.wavenumber()?;
        if !(self.index.is_finite() && self.index > 0.0) {
            return Err(ScatteringError::InvalidOptics(format!(
                "medium index must be positive, got {}",
                self.index
            )));
        }
        if self.divergence != 0.0 {
            return Err(ScatteringError::InvalidOptics(format!(
                "divergent illumination ({} rad) is not supported",
                self.divergence
            )));
        }
        Ok(Beam {
            k,
            index: self.index,
            polarization: self.unit_polarization()?,
        })
    }
}
