//! Shared optical train and scatterers for the integration tests.
#![allow(dead_code)]

use holoscat_core::Optics;
use holoscat_geometry::{Scatterer, Sphere, SphereCluster};
use num_complex::Complex64;

pub const WAVELENGTH: f64 = 658e-9;
pub const MEDIUM_INDEX: f64 = 1.33;
pub const PIXEL: f64 = 0.1151e-6;
pub const SCALING: f64 = 0.6;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn xoptics() -> Optics {
    Optics::new(WAVELENGTH, MEDIUM_INDEX)
        .with_pixel_scale(PIXEL)
        .with_polarization([1.0, 0.0])
}

pub fn yoptics() -> Optics {
    xoptics().with_polarization([0.0, 1.0])
}

pub fn sphere(r: f64, center: [f64; 3]) -> Sphere {
    Sphere::new(Complex64::new(1.5811, 1e-4), r, center)
}

/// Two spheres of radius 0.5 um with centres 1.1 um apart.
pub fn pair() -> Scatterer {
    SphereCluster::new(vec![
        sphere(0.5e-6, [7.1e-6, 7e-6, 10e-6]).into(),
        sphere(0.5e-6, [6e-6, 7e-6, 10e-6]).into(),
    ])
    .into()
}

pub fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

pub fn std_dev(values: &[f64]) -> f64 {
    let m = mean(values);
    (values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}

pub fn max(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}

pub fn min(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::INFINITY, f64::min)
}
