//! Scatterer descriptions.
//!
//! A [`Scatterer`] is an immutable value: a homogeneous sphere, a layered
//! sphere, an axis-aligned ellipsoid, or an ordered cluster of other
//! scatterers. Refractive indices are absolute (not relative to the medium);
//! the theories divide by the medium index themselves.
//!
//! Validation reports geometric impossibilities as errors and geometric
//! overlaps between cluster members as [`OverlapWarning`] values.

use std::collections::BTreeSet;
use std::fmt;

use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::parameters::{
    get_complex, get_point, get_real, has_complex, indexed_key, insert_complex, insert_nested,
    insert_point, nested_groups, sequence_len, ParameterMap,
};
use crate::point::Point3;

/// Errors raised while building or checking a scatterer.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScattererError {
    #[error("Unrealizable scatterer: {0}")]
    Unrealizable(String),

    #[error("Missing parameter '{0}'")]
    MissingParameter(String),

    #[error("Malformed parameter key '{0}'")]
    MalformedParameter(String),

    #[error("Parameters do not describe any known scatterer layout")]
    UnknownLayout,
}

/// Discriminant of the [`Scatterer`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ScattererKind {
    Sphere,
    CoatedSphere,
    Ellipsoid,
    SphereCluster,
}

impl fmt::Display for ScattererKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScattererKind::Sphere => "Sphere",
            ScattererKind::CoatedSphere => "CoatedSphere",
            ScattererKind::Ellipsoid => "Ellipsoid",
            ScattererKind::SphereCluster => "SphereCluster",
        };
        f.write_str(name)
    }
}

/// Two cluster members whose bounding spheres intersect.
///
/// `first` and `second` index the flattened member list (see
/// [`SphereCluster::members`]); `depth` is the interpenetration length
/// $a_i + a_j - d_{ij}$.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlapWarning {
    pub first: usize,
    pub second: usize,
    pub depth: f64,
    /// `depth` as a fraction of the combined radii.
    pub fraction: f64,
}

impl fmt::Display for OverlapWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "scatterers {} and {} overlap by {:.3e} m ({:.1}% of combined radii)",
            self.first,
            self.second,
            self.depth,
            100.0 * self.fraction
        )
    }
}

/// A homogeneous sphere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sphere {
    /// Refractive index.
    pub n: Complex64,
    /// Radius (m).
    pub r: f64,
    pub center: Point3,
}

/// A sphere made of concentric shells, listed from the core outward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoatedSphere {
    /// Refractive index of each layer.
    pub n: Vec<Complex64>,
    /// Outer radius of each layer (m), strictly increasing.
    pub r: Vec<f64>,
    pub center: Point3,
}

/// An ellipsoid with semi-axes along x, y and z.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ellipsoid {
    pub n: Complex64,
    /// Semi-axis lengths (m).
    pub r: [f64; 3],
    pub center: Point3,
}

/// An ordered collection of scatterers.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SphereCluster {
    pub scatterers: Vec<Scatterer>,
}

/// Any object that can scatter light.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Scatterer {
    Sphere(Sphere),
    CoatedSphere(CoatedSphere),
    Ellipsoid(Ellipsoid),
    SphereCluster(SphereCluster),
}

fn check_radius(r: f64, what: &str) -> Result<(), ScattererError> {
    if r.is_finite() && r > 0.0 {
        Ok(())
    } else {
        Err(ScattererError::Unrealizable(format!(
            "{what} must be positive and finite, got {r}"
        )))
    }
}

fn check_index(n: Complex64) -> Result<(), ScattererError> {
    if n.re.is_finite() && n.im.is_finite() {
        Ok(())
    } else {
        Err(ScattererError::Unrealizable(format!(
            "refractive index must be finite, got {n}"
        )))
    }
}

fn check_center(c: &Point3) -> Result<(), ScattererError> {
    if c.is_finite() {
        Ok(())
    } else {
        Err(ScattererError::Unrealizable(format!(
            "center must be finite, got {c:?}"
        )))
    }
}

impl Sphere {
    pub fn new(n: Complex64, r: f64, center: impl Into<Point3>) -> Self {
        Self {
            n,
            r,
            center: center.into(),
        }
    }

    fn check(&self) -> Result<(), ScattererError> {
        check_radius(self.r, "sphere radius")?;
        check_index(self.n)?;
        check_center(&self.center)
    }

    pub fn to_parameters(&self) -> ParameterMap {
        let mut map = ParameterMap::new();
        insert_complex(&mut map, "n", self.n);
        map.insert("r".to_string(), self.r);
        insert_point(&mut map, "center", self.center);
        map
    }

    pub fn from_parameters(map: &ParameterMap) -> Result<Self, ScattererError> {
        Ok(Self {
            n: get_complex(map, "n")?,
            r: get_real(map, "r")?,
            center: get_point(map, "center")?,
        })
    }
}

impl CoatedSphere {
    pub fn new(n: Vec<Complex64>, r: Vec<f64>, center: impl Into<Point3>) -> Self {
        Self {
            n,
            r,
            center: center.into(),
        }
    }

    /// Radius of the outermost layer.
    pub fn outer_radius(&self) -> f64 {
        self.r.last().copied().unwrap_or(0.0)
    }

    fn check(&self) -> Result<(), ScattererError> {
        if self.r.is_empty() || self.n.len() != self.r.len() {
            return Err(ScattererError::Unrealizable(format!(
                "coated sphere needs one index per layer, got {} indices for {} radii",
                self.n.len(),
                self.r.len()
            )));
        }
        for &r in &self.r {
            check_radius(r, "layer radius")?;
        }
        if self.r.windows(2).any(|w| w[1] <= w[0]) {
            return Err(ScattererError::Unrealizable(format!(
                "layer radii must increase outward, got {:?}",
                self.r
            )));
        }
        for &n in &self.n {
            check_index(n)?;
        }
        check_center(&self.center)
    }

    pub fn to_parameters(&self) -> ParameterMap {
        let mut map = ParameterMap::new();
        for (i, &n) in self.n.iter().enumerate() {
            insert_complex(&mut map, &indexed_key("n", i), n);
        }
        for (i, &r) in self.r.iter().enumerate() {
            map.insert(indexed_key("r", i), r);
        }
        insert_point(&mut map, "center", self.center);
        map
    }

    pub fn from_parameters(map: &ParameterMap) -> Result<Self, ScattererError> {
        let layers = sequence_len(map, "n")?;
        let n = (0..layers)
            .map(|i| get_complex(map, &indexed_key("n", i)))
            .collect::<Result<Vec<_>, _>>()?;
        let r = (0..sequence_len(map, "r")?)
            .map(|i| get_real(map, &indexed_key("r", i)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            n,
            r,
            center: get_point(map, "center")?,
        })
    }
}

impl Ellipsoid {
    pub fn new(n: Complex64, r: [f64; 3], center: impl Into<Point3>) -> Self {
        Self {
            n,
            r,
            center: center.into(),
        }
    }

    fn check(&self) -> Result<(), ScattererError> {
        for &r in &self.r {
            check_radius(r, "semi-axis")?;
        }
        check_index(self.n)?;
        check_center(&self.center)
    }

    pub fn to_parameters(&self) -> ParameterMap {
        let mut map = ParameterMap::new();
        insert_complex(&mut map, "n", self.n);
        for (i, &r) in self.r.iter().enumerate() {
            map.insert(indexed_key("r", i), r);
        }
        insert_point(&mut map, "center", self.center);
        map
    }

    pub fn from_parameters(map: &ParameterMap) -> Result<Self, ScattererError> {
        Ok(Self {
            n: get_complex(map, "n")?,
            r: [
                get_real(map, "r[0]")?,
                get_real(map, "r[1]")?,
                get_real(map, "r[2]")?,
            ],
            center: get_point(map, "center")?,
        })
    }
}

impl SphereCluster {
    pub fn new(scatterers: Vec<Scatterer>) -> Self {
        Self { scatterers }
    }

    /// Append a member. Order only affects parameter keys.
    pub fn add(&mut self, scatterer: impl Into<Scatterer>) {
        self.scatterers.push(scatterer.into());
    }

    pub fn len(&self) -> usize {
        self.scatterers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scatterers.is_empty()
    }

    /// Non-cluster members in depth-first order, nested clusters flattened.
    pub fn members(&self) -> Vec<&Scatterer> {
        let mut out = Vec::new();
        for s in &self.scatterers {
            match s {
                Scatterer::SphereCluster(inner) => out.extend(inner.members()),
                other => out.push(other),
            }
        }
        out
    }

    /// All pairs of members whose bounding spheres intersect.
    pub fn overlaps(&self) -> Vec<OverlapWarning> {
        let members = self.members();
        let mut out = Vec::new();
        for i in 0..members.len() {
            for j in (i + 1)..members.len() {
                let (ci, ai) = (members[i].center(), members[i].bounding_radius());
                let (cj, aj) = (members[j].center(), members[j].bounding_radius());
                let depth = ai + aj - ci.distance(&cj);
                if depth > 0.0 {
                    out.push(OverlapWarning {
                        first: i,
                        second: j,
                        depth,
                        fraction: depth / (ai + aj),
                    });
                }
            }
        }
        out
    }

    pub fn to_parameters(&self) -> ParameterMap {
        let mut map = ParameterMap::new();
        for (i, s) in self.scatterers.iter().enumerate() {
            insert_nested(&mut map, &indexed_key("scatterers", i), s.to_parameters());
        }
        map
    }

    pub fn from_parameters(map: &ParameterMap) -> Result<Self, ScattererError> {
        let scatterers = nested_groups(map, "scatterers")?
            .iter()
            .map(Scatterer::from_parameters)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { scatterers })
    }
}

impl Scatterer {
    pub fn kind(&self) -> ScattererKind {
        match self {
            Scatterer::Sphere(_) => ScattererKind::Sphere,
            Scatterer::CoatedSphere(_) => ScattererKind::CoatedSphere,
            Scatterer::Ellipsoid(_) => ScattererKind::Ellipsoid,
            Scatterer::SphereCluster(_) => ScattererKind::SphereCluster,
        }
    }

    /// The kind of this scatterer together with the kinds of all members,
    /// recursively.
    pub fn kinds(&self) -> BTreeSet<ScattererKind> {
        let mut out = BTreeSet::new();
        self.collect_kinds(&mut out);
        out
    }

    fn collect_kinds(&self, out: &mut BTreeSet<ScattererKind>) {
        out.insert(self.kind());
        if let Scatterer::SphereCluster(c) = self {
            for s in &c.scatterers {
                s.collect_kinds(out);
            }
        }
    }

    /// Every homogeneous sphere in this scatterer, or `None` if it contains
    /// anything else.
    pub fn spheres(&self) -> Option<Vec<&Sphere>> {
        match self {
            Scatterer::Sphere(s) => Some(vec![s]),
            Scatterer::SphereCluster(c) => c
                .members()
                .into_iter()
                .map(|m| match m {
                    Scatterer::Sphere(s) => Some(s),
                    _ => None,
                })
                .collect(),
            _ => None,
        }
    }

    /// Geometric centre; the centroid of the member centres for a cluster.
    pub fn center(&self) -> Point3 {
        match self {
            Scatterer::Sphere(s) => s.center,
            Scatterer::CoatedSphere(s) => s.center,
            Scatterer::Ellipsoid(e) => e.center,
            Scatterer::SphereCluster(c) => {
                let centers: Vec<Point3> = c.members().iter().map(|m| m.center()).collect();
                Point3::centroid(&centers).unwrap_or(Point3::ORIGIN)
            }
        }
    }

    /// Radius of the smallest sphere about [`Scatterer::center`] that
    /// encloses the scatterer.
    pub fn bounding_radius(&self) -> f64 {
        match self {
            Scatterer::Sphere(s) => s.r,
            Scatterer::CoatedSphere(s) => s.outer_radius(),
            Scatterer::Ellipsoid(e) => e.r.iter().copied().fold(0.0, f64::max),
            Scatterer::SphereCluster(c) => {
                let center = self.center();
                c.members()
                    .iter()
                    .map(|m| m.center().distance(&center) + m.bounding_radius())
                    .fold(0.0, f64::max)
            }
        }
    }

    fn check(&self) -> Result<(), ScattererError> {
        match self {
            Scatterer::Sphere(s) => s.check(),
            Scatterer::CoatedSphere(s) => s.check(),
            Scatterer::Ellipsoid(e) => e.check(),
            Scatterer::SphereCluster(c) => {
                if c.is_empty() {
                    return Err(ScattererError::Unrealizable(
                        "cluster has no members".to_string(),
                    ));
                }
                c.scatterers.iter().try_for_each(Scatterer::check)
            }
        }
    }

    /// Check that the scatterer is physically meaningful.
    ///
    /// Every radius must be positive and finite, layered spheres must grow
    /// outward, and clusters must be non-empty with valid members. Overlaps
    /// between cluster members are not errors: they are logged and returned.
    pub fn validate(&self) -> Result<Vec<OverlapWarning>, ScattererError> {
        self.check()?;
        let warnings = match self {
            Scatterer::SphereCluster(c) => c.overlaps(),
            _ => Vec::new(),
        };
        for w in &warnings {
            log::warn!("{w}");
        }
        Ok(warnings)
    }

    pub fn is_valid(&self) -> bool {
        self.check().is_ok()
    }

    pub fn to_parameters(&self) -> ParameterMap {
        match self {
            Scatterer::Sphere(s) => s.to_parameters(),
            Scatterer::CoatedSphere(s) => s.to_parameters(),
            Scatterer::Ellipsoid(e) => e.to_parameters(),
            Scatterer::SphereCluster(c) => c.to_parameters(),
        }
    }

    /// Rebuild a scatterer, inferring its kind from the key layout.
    pub fn from_parameters(map: &ParameterMap) -> Result<Self, ScattererError> {
        if map.keys().any(|k| k.starts_with("scatterers[")) {
            return SphereCluster::from_parameters(map).map(Scatterer::SphereCluster);
        }
        if map.contains_key("r") {
            return Sphere::from_parameters(map).map(Scatterer::Sphere);
        }
        if has_complex(map, "n[0]") {
            return CoatedSphere::from_parameters(map).map(Scatterer::CoatedSphere);
        }
        if map.contains_key("r[0]") && has_complex(map, "n") {
            return Ellipsoid::from_parameters(map).map(Scatterer::Ellipsoid);
        }
        Err(ScattererError::UnknownLayout)
    }
}

impl From<Sphere> for Scatterer {
    fn from(s: Sphere) -> Self {
        Scatterer::Sphere(s)
    }
}

impl From<CoatedSphere> for Scatterer {
    fn from(s: CoatedSphere) -> Self {
        Scatterer::CoatedSphere(s)
    }
}

impl From<Ellipsoid> for Scatterer {
    fn from(e: Ellipsoid) -> Self {
        Scatterer::Ellipsoid(e)
    }
}

impl From<SphereCluster> for Scatterer {
    fn from(c: SphereCluster) -> Self {
        Scatterer::SphereCluster(c)
    }
}
