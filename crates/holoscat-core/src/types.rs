//! Result containers shared by the theories.

use serde::{Deserialize, Serialize};

/// Optical cross-sections of a single scatterer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CrossSections {
    /// Scattering cross-section (m²).
    pub scattering: f64,
    /// Absorption cross-section (m²).
    pub absorption: f64,
    /// Extinction cross-section (m²).
    pub extinction: f64,
    /// Asymmetry parameter $\langle\cos\theta\rangle$.
    pub asymmetry: f64,
}

/// Dimensionless efficiencies $Q = C / \pi a^2$.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Efficiencies {
    pub q_sca: f64,
    pub q_abs: f64,
    pub q_ext: f64,
    pub asymmetry: f64,
}

impl Efficiencies {
    /// Scale to cross-sections for a sphere of radius `radius`.
    pub fn to_cross_sections(self, radius: f64) -> CrossSections {
        let area = std::f64::consts::PI * radius * radius;
        CrossSections {
            scattering: self.q_sca * area,
            absorption: self.q_abs * area,
            extinction: self.q_ext * area,
            asymmetry: self.asymmetry,
        }
    }
}
