//! # Holoscat Geometry
//!
//! Descriptions of the objects that scatter light in a holographic
//! microscope. This crate provides:
//!
//! - **Positions** ([`point`]) — a plain 3-vector with named accessors.
//! - **Scatterers** ([`scatterer`]) — spheres, coated spheres, ellipsoids,
//!   and ordered clusters, with validation and overlap detection.
//! - **Parameter maps** ([`parameters`]) — lossless flattening of any
//!   scatterer into `key → f64` pairs for persistence and fitting.

pub mod parameters;
pub mod point;
pub mod scatterer;

pub use parameters::ParameterMap;
pub use point::Point3;
pub use scatterer::{
    CoatedSphere, Ellipsoid, OverlapWarning, Scatterer, ScattererError, ScattererKind, Sphere,
    SphereCluster,
};
