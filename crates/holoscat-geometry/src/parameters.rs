//! Flat parameter maps.
//!
//! Every scatterer can be flattened into a sorted map from string keys to
//! real numbers, and rebuilt from such a map without loss. Keys follow a
//! small grammar:
//!
//! - a real scalar is stored under its name (`r`);
//! - a complex number is split into `name.real` and `name.imag`;
//! - sequence elements carry a bracketed index (`center[0]`, `r[2]`);
//! - members of a cluster are nested under `scatterers[i].`.
//!
//! A complex element of a sequence therefore reads `n[1].real`, and the
//! x coordinate of the third member of a cluster reads
//! `scatterers[2].center[0]`.

use std::collections::{BTreeMap, BTreeSet};

use num_complex::Complex64;

use crate::point::Point3;
use crate::scatterer::ScattererError;

/// Sorted mapping from compound keys to values.
pub type ParameterMap = BTreeMap<String, f64>;

pub(crate) fn indexed_key(name: &str, index: usize) -> String {
    format!("{name}[{index}]")
}

pub(crate) fn insert_complex(map: &mut ParameterMap, key: &str, value: Complex64) {
    map.insert(format!("{key}.real"), value.re);
    map.insert(format!("{key}.imag"), value.im);
}

pub(crate) fn insert_point(map: &mut ParameterMap, key: &str, value: Point3) {
    for (i, c) in value.to_array().into_iter().enumerate() {
        map.insert(indexed_key(key, i), c);
    }
}

/// Insert every entry of `inner` into `map` with `prefix` prepended.
pub(crate) fn insert_nested(map: &mut ParameterMap, prefix: &str, inner: ParameterMap) {
    for (k, v) in inner {
        map.insert(format!("{prefix}.{k}"), v);
    }
}

pub(crate) fn get_real(map: &ParameterMap, key: &str) -> Result<f64, ScattererError> {
    map.get(key)
        .copied()
        .ok_or_else(|| ScattererError::MissingParameter(key.to_string()))
}

pub(crate) fn get_complex(map: &ParameterMap, key: &str) -> Result<Complex64, ScattererError> {
    let re = get_real(map, &format!("{key}.real"))?;
    let im = get_real(map, &format!("{key}.imag"))?;
    Ok(Complex64::new(re, im))
}

pub(crate) fn get_point(map: &ParameterMap, key: &str) -> Result<Point3, ScattererError> {
    Ok(Point3::new(
        get_real(map, &indexed_key(key, 0))?,
        get_real(map, &indexed_key(key, 1))?,
        get_real(map, &indexed_key(key, 2))?,
    ))
}

pub(crate) fn has_complex(map: &ParameterMap, key: &str) -> bool {
    map.contains_key(&format!("{key}.real"))
}

/// Split `name[i]rest` into `(i, rest)` for keys beginning with `name[`.
///
/// Returns `Ok(None)` for keys that do not start with `name[`.
fn split_index<'a>(key: &'a str, name: &str) -> Result<Option<(usize, &'a str)>, ScattererError> {
    let Some(tail) = key.strip_prefix(name).and_then(|t| t.strip_prefix('[')) else {
        return Ok(None);
    };
    let close = tail
        .find(']')
        .ok_or_else(|| ScattererError::MalformedParameter(key.to_string()))?;
    let index = tail[..close]
        .parse::<usize>()
        .map_err(|_| ScattererError::MalformedParameter(key.to_string()))?;
    Ok(Some((index, &tail[close + 1..])))
}

/// Number of elements of the sequence `name`, read from `name[i]...` keys.
///
/// Indices must be contiguous from zero; a gap is reported as the first
/// missing element.
pub(crate) fn sequence_len(map: &ParameterMap, name: &str) -> Result<usize, ScattererError> {
    let mut indices = BTreeSet::new();
    for key in map.keys() {
        if let Some((i, _)) = split_index(key, name)? {
            indices.insert(i);
        }
    }
    for (expected, &i) in indices.iter().enumerate() {
        if i != expected {
            return Err(ScattererError::MissingParameter(indexed_key(name, expected)));
        }
    }
    Ok(indices.len())
}

/// Group `name[i].rest` entries by index, stripping the `name[i].` prefix.
pub(crate) fn nested_groups(
    map: &ParameterMap,
    name: &str,
) -> Result<Vec<ParameterMap>, ScattererError> {
    let mut groups: BTreeMap<usize, ParameterMap> = BTreeMap::new();
    for (key, &value) in map {
        if let Some((i, rest)) = split_index(key, name)? {
            let rest = rest
                .strip_prefix('.')
                .ok_or_else(|| ScattererError::MalformedParameter(key.clone()))?;
            groups.entry(i).or_default().insert(rest.to_string(), value);
        }
    }
    let mut out = Vec::with_capacity(groups.len());
    for (expected, (i, group)) in groups.into_iter().enumerate() {
        if i != expected {
            return Err(ScattererError::MissingParameter(indexed_key(name, expected)));
        }
        out.push(group);
    }
    Ok(out)
}
