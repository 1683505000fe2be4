//! Coupled multisphere calculations on sphere clusters.

mod common;

use approx::assert_relative_eq;
use common::*;
use holoscat_core::schema::Schema;
use holoscat_core::{
    ExpansionMethod, Mie, Multisphere, Operation, ScatteringError, ScatteringTheory, TheoryConfig,
};
use holoscat_geometry::{CoatedSphere, Ellipsoid, Point3, Scatterer, ScattererKind, Sphere, SphereCluster};
use num_complex::Complex64;

#[test]
fn test_defaults() {
    let theory = Multisphere::default();
    assert_eq!(theory.niter, 200);
    assert_eq!(theory.eps, 1e-6);
    assert_eq!(theory.qeps1, 1e-5);
    assert_eq!(theory.qeps2, 1e-8);
    assert_eq!(theory.meth, ExpansionMethod::BiCgStab);
    assert_eq!(theory.overlap_tolerance, 0.9);
    assert_eq!(theory.max_size_parameter, 100.0);
    assert_eq!(theory.max_size_product, 300.0);
    assert_eq!(theory.max_modes, 6000);
    assert!(theory.capabilities(Operation::CrossSections).is_empty());
    assert_eq!(
        theory.capabilities(Operation::Hologram),
        &[ScattererKind::Sphere, ScattererKind::SphereCluster]
    );
}

#[test]
fn test_two_sphere_hologram() {
    init_logging();
    let schema = Schema::square(128, xoptics());
    let holo = Multisphere::new().calc_holo(&pair(), &schema, SCALING).unwrap();
    let values = holo.to_vec();
    assert!(values.iter().all(|v| v.is_finite() && *v >= 0.0));
    eprintln!(
        "two-sphere hologram: mean {:.5}, std {:.5}, max {:.5}",
        mean(&values),
        std_dev(&values),
        max(&values)
    );
    assert_relative_eq!(max(&values), 1.4140292298443309, max_relative = 2e-3);
    assert_relative_eq!(mean(&values), 0.9955420925817654, max_relative = 2e-3);
    assert_relative_eq!(std_dev(&values), 0.09558537595025796, max_relative = 2e-3);
}

#[test]
fn test_orthogonal_polarizations() {
    // A sphere on the pixel diagonal: swapping polarization transposes the
    // hologram.
    let s: Scatterer = Sphere::new(Complex64::new(1.59, 1e-4), 0.85e-6, [5.76e-6, 5.76e-6, 15e-6]).into();
    let theory = Multisphere::new();
    let xholo = theory.calc_holo(&s, &Schema::square(128, xoptics()), SCALING).unwrap();
    let yholo = theory.calc_holo(&s, &Schema::square(128, yoptics()), SCALING).unwrap();
    let (xv, yv) = (xholo.to_vec(), yholo.to_vec());

    assert!(xv.iter().zip(&yv).any(|(a, b)| (a - b).abs() > 1e-3));
    assert_relative_eq!(max(&xv), max(&yv), max_relative = 1e-7);
    assert_relative_eq!(min(&xv), min(&yv), max_relative = 1e-7);
    for i in [10, 40, 77] {
        for j in [3, 51, 120] {
            assert_relative_eq!(xv[i * 128 + j], yv[j * 128 + i], max_relative = 1e-7);
        }
    }
}

#[test]
fn test_spheres_must_clear_the_detector() {
    let schema = Schema::square(8, xoptics());
    for z in [0.0, 0.3e-6] {
        let low: Scatterer = SphereCluster::new(vec![
            sphere(0.5e-6, [1e-6, 1e-6, z]).into(),
            sphere(0.5e-6, [3e-6, 1e-6, 5e-6]).into(),
        ])
        .into();
        assert!(matches!(
            Multisphere::new().calc_holo(&low, &schema, SCALING),
            Err(ScatteringError::UnrealizableScatterer(_))
        ));
    }
}

#[test]
fn test_large_sphere_is_rejected_before_expansion() {
    let optics = xoptics();
    let k = optics.wavenumber().unwrap();
    let large: Scatterer = sphere(150.0 / k, [0.0, 0.0, 100e-6]).into();
    let schema = Schema::square(4, optics);
    assert!(matches!(
        Multisphere::new().calc_holo(&large, &schema, SCALING),
        Err(ScatteringError::UnrealizableScatterer(_))
    ));
    let lifted = Multisphere {
        max_size_parameter: 1e4,
        max_size_product: 1e4,
        ..Multisphere::default()
    };
    assert!(matches!(
        lifted.calc_holo(&large, &schema, SCALING),
        Err(ScatteringError::UnrealizableScatterer(_))
    ));
}

#[test]
fn test_intensity_is_field_magnitude_squared() {
    let schema = Schema::square(16, xoptics());
    let theory = Multisphere::new();
    let field = theory.calc_field(&pair(), &schema).unwrap();
    let intensity = theory.calc_intensity(&pair(), &schema).unwrap();
    for (i, row) in field.rows().into_iter().enumerate() {
        let expected: f64 = row.iter().map(|c| c.norm_sqr()).sum();
        assert!((intensity[i] - expected).abs() <= 1e-12 * expected.max(1e-30));
    }
}

#[test]
fn test_single_sphere_matches_mie() {
    let s: Scatterer = sphere(0.5e-6, [1e-6, 0.5e-6, 10e-6]).into();
    let points: Vec<Point3> = [(0.0, 0.0), (1e-6, 0.5e-6), (3e-6, -2e-6), (-4e-6, 5e-6)]
        .iter()
        .map(|&(x, y)| Point3::new(x, y, 0.0))
        .collect();
    let schema = Schema::points(points, xoptics().with_polarization([0.6, 0.8]));
    let multi = Multisphere {
        qeps1: 1e-12,
        ..Multisphere::default()
    };
    let expected = Mie::new().calc_field(&s, &schema).unwrap();
    let got = multi.calc_field(&s, &schema).unwrap();
    let scale = expected.iter().map(|c| c.norm()).fold(0.0, f64::max);
    for (g, e) in got.iter().zip(expected.iter()) {
        assert!((g - e).norm() <= 1e-6 * scale, "multisphere {g}, Mie {e}");
    }
}

#[test]
fn test_coupling_changes_the_field() {
    // Detector points below the pair, where both spheres scatter strongly.
    let points: Vec<Point3> = (0..25)
        .map(|i| Point3::new(5.5e-6 + 0.5e-6 * (i / 5) as f64, 6e-6 + 0.5e-6 * (i % 5) as f64, 0.0))
        .collect();
    let schema = Schema::points(points, xoptics());
    let coupled = Multisphere::new().calc_holo(&pair(), &schema, SCALING).unwrap();
    let superposed = Mie::new().calc_holo(&pair(), &schema, SCALING).unwrap();
    let worst = coupled
        .iter()
        .zip(superposed.iter())
        .map(|(a, b)| (a - b).abs())
        .fold(0.0, f64::max);
    assert!(worst > 1e-4, "coupled and superposed holograms agree to {worst:e}");
}

#[test]
fn test_selection_matches_full_grid() {
    let theory = Multisphere::new();
    let full = Schema::square(48, xoptics());
    let subset = Schema::square(48, xoptics()).with_random_fraction(0.1, 3).unwrap();
    let holo = theory.calc_holo(&pair(), &full, SCALING).unwrap();
    let sub = theory.calc_holo(&pair(), &subset, SCALING).unwrap();
    for i in subset.selected_indices() {
        assert!((sub[i] - holo[i]).abs() <= 1e-12 * holo[i]);
    }
    assert!((0..subset.len())
        .filter(|&i| !subset.is_selected(i))
        .all(|i| sub[i] == 0.0));
}

#[test]
fn test_small_iteration_budget_fails_to_converge() {
    let schema = Schema::square(8, xoptics());
    let starved = Multisphere {
        niter: 2,
        ..Multisphere::default()
    };
    match starved.calc_holo(&pair(), &schema, SCALING) {
        Err(ScatteringError::ConvergenceFailure { iterations, residual }) => {
            assert!(iterations <= 2);
            assert!(residual > 0.0);
        }
        other => panic!("expected a convergence failure, got {other:?}"),
    }
    assert!(Multisphere::default().calc_holo(&pair(), &schema, SCALING).is_ok());
}

#[test]
fn test_direct_solve_agrees_with_bicgstab() {
    let schema = Schema::square(12, xoptics());
    let krylov = Multisphere::new().calc_holo(&pair(), &schema, SCALING).unwrap();
    let direct = Multisphere {
        meth: ExpansionMethod::DirectLu,
        ..Multisphere::default()
    }
    .calc_holo(&pair(), &schema, SCALING)
    .unwrap();
    for (a, b) in krylov.iter().zip(direct.iter()) {
        assert!((a - b).abs() < 1e-5, "{a} vs {b}");
    }
}

#[test]
fn test_heavy_overlap_diverges() {
    let overlapping: Scatterer = SphereCluster::new(vec![
        sphere(0.5e-6, [3e-6, 3e-6, 10e-6]).into(),
        sphere(0.5e-6, [3.4e-6, 3e-6, 10e-6]).into(),
    ])
    .into();
    assert_eq!(overlapping.validate().unwrap().len(), 1);
    let theory = Multisphere {
        meth: ExpansionMethod::OrderOfScattering,
        ..Multisphere::default()
    };
    let result = theory.calc_holo(&overlapping, &Schema::square(8, xoptics()), SCALING);
    assert!(
        matches!(result, Err(ScatteringError::NumericDivergence { .. })),
        "got {result:?}"
    );
}

#[test]
fn test_slight_overlap_warns_and_succeeds() {
    let overlapping: Scatterer = SphereCluster::new(vec![
        sphere(0.5e-6, [3e-6, 3e-6, 10e-6]).into(),
        sphere(0.5e-6, [3.9e-6, 3e-6, 10e-6]).into(),
    ])
    .into();
    let warnings = overlapping.validate().unwrap();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].fraction < 0.9);

    let theory = Multisphere {
        meth: ExpansionMethod::DirectLu,
        ..Multisphere::default()
    };
    let holo = theory
        .calc_holo(&overlapping, &Schema::square(16, xoptics()), SCALING)
        .unwrap();
    assert!(holo.iter().all(|v| v.is_finite()));
}

#[test]
fn test_coincident_centres_are_unrealizable() {
    let stacked: Scatterer = SphereCluster::new(vec![
        sphere(0.5e-6, [3e-6, 3e-6, 10e-6]).into(),
        sphere(0.4e-6, [3e-6, 3e-6, 10e-6]).into(),
    ])
    .into();
    assert!(matches!(
        Multisphere::new().calc_holo(&stacked, &Schema::square(8, xoptics()), SCALING),
        Err(ScatteringError::UnrealizableScatterer(_))
    ));
}

#[test]
fn test_unrealizable_clusters() {
    let schema = Schema::square(8, xoptics());
    let theory = Multisphere::new();

    let far_apart: Scatterer = SphereCluster::new(vec![
        sphere(0.5e-6, [7.1, 7e-6, 10e-6]).into(),
        sphere(0.5e-6, [6e-6, 7e-6, 10e-6]).into(),
    ])
    .into();
    assert!(matches!(
        theory.calc_holo(&far_apart, &schema, SCALING),
        Err(ScatteringError::UnrealizableScatterer(_))
    ));

    let huge: Scatterer = SphereCluster::new(vec![
        sphere(0.5, [7.1, 7e-6, 10e-6]).into(),
        sphere(0.5e-6, [6e-6, 7e-6, 10e-6]).into(),
    ])
    .into();
    assert!(matches!(
        theory.calc_holo(&huge, &schema, SCALING),
        Err(ScatteringError::UnrealizableScatterer(_))
    ));

    let negative: Scatterer = SphereCluster::new(vec![
        sphere(-1.0, [7.1e-6, 7e-6, 10e-6]).into(),
        sphere(0.5e-6, [6e-6, 7e-6, 10e-6]).into(),
    ])
    .into();
    assert!(matches!(
        theory.calc_holo(&negative, &schema, SCALING),
        Err(ScatteringError::UnrealizableScatterer(_))
    ));
}

#[test]
fn test_incompatible_kinds_are_rejected() {
    let theory = Multisphere::new();
    let schema = Schema::square(8, xoptics());
    let coated: Scatterer = CoatedSphere::new(
        vec![Complex64::new(1.59, 0.0), Complex64::new(1.33, 0.0)],
        vec![0.4e-6, 0.5e-6],
        [1e-6, 1e-6, 5e-6],
    )
    .into();
    let ellipsoid: Scatterer =
        Ellipsoid::new(Complex64::new(1.59, 0.0), [0.5e-6, 0.5e-6, 0.8e-6], [4e-6, 1e-6, 5e-6]).into();
    let mixed: Scatterer = SphereCluster::new(vec![sphere(0.5e-6, [1e-6, 1e-6, 5e-6]).into(), ellipsoid]).into();

    match theory.calc_holo(&coated, &schema, SCALING) {
        Err(ScatteringError::IncompatibleTheory { theory, kind }) => {
            assert_eq!(theory, "Multisphere");
            assert_eq!(kind, ScattererKind::CoatedSphere);
        }
        other => panic!("expected an incompatible theory error, got {other:?}"),
    }
    for result in [
        theory.calc_field(&mixed, &schema).err(),
        theory.calc_intensity(&mixed, &schema).err(),
        theory.calc_holo(&mixed, &schema, SCALING).err(),
    ] {
        assert!(matches!(
            result,
            Some(ScatteringError::IncompatibleTheory {
                kind: ScattererKind::Ellipsoid,
                ..
            })
        ));
    }
    assert!(matches!(
        theory.calc_cross_sections(&pair(), &xoptics()),
        Err(ScatteringError::IncompatibleTheory { .. })
    ));
}

#[test]
fn test_theories_from_toml() {
    let config = TheoryConfig::from_toml_str(
        r#"
        [multisphere]
        niter = 2
        "#,
    )
    .unwrap();
    assert!(matches!(
        config
            .multisphere
            .calc_holo(&pair(), &Schema::square(8, xoptics()), SCALING),
        Err(ScatteringError::ConvergenceFailure { .. })
    ));
    assert_eq!(config.mie, Mie::default());
}
