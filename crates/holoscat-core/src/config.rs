//! TOML configuration of the scattering theories.

use serde::{Deserialize, Serialize};

use crate::theory::mie::Mie;
use crate::theory::multisphere::Multisphere;
use crate::theory::ScatteringError;

/// Settings for every theory. Missing tables and keys take their defaults.
///
/// ```toml
/// [mie]
/// max_size_parameter = 500.0
///
/// [multisphere]
/// niter = 400
/// meth = "order_of_scattering"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TheoryConfig {
    #[serde(default)]
    pub mie: Mie,
    #[serde(default)]
    pub multisphere: Multisphere,
}

impl TheoryConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ScatteringError> {
        Ok(toml::from_str(text)?)
    }
}
