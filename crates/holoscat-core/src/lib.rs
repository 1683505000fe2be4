//! # Holoscat Core
//!
//! Forward models of light scattering for digital holographic microscopy.
//! A scatterer (see `holoscat_geometry`) is illuminated by a plane wave and
//! the scattered field is sampled on a detector; the hologram is the
//! interference of that field with the unscattered reference wave.
//!
//! ## Architecture
//!
//! All theories implement the [`theory::ScatteringTheory`] trait, which
//! provides checked field, intensity, hologram, cross-section and
//! scattering-matrix calculations. Two theories are available:
//! [`theory::mie::Mie`] for isolated spheres (and non-interacting
//! superpositions) and [`theory::multisphere::Multisphere`] for clusters
//! with full multiple scattering.
//!
//! ## Modules
//!
//! - [`optics`] — wavelength, medium, polarisation, pixel scale.
//! - [`schema`] — where the field is sampled, with optional selection.
//! - [`theory`] — the theory trait, errors and both theories.
//! - [`mie`] — Lorenz-Mie coefficients and fields.
//! - [`special`] — spherical Bessel, Legendre and quadrature routines.
//! - [`config`] — TOML settings for the theories.
//! - [`types`] — result containers.

pub mod config;
pub mod mie;
pub mod optics;
pub mod schema;
pub mod special;
pub mod theory;
pub mod types;

pub use config::TheoryConfig;
pub use optics::Optics;
pub use schema::Schema;
pub use theory::mie::Mie;
pub use theory::multisphere::{ExpansionMethod, Multisphere};
pub use theory::{Operation, ScatteringError, ScatteringTheory};
pub use types::CrossSections;
