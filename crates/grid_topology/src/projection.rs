//! Source coordinate system → geographic lon/lat (EPSG:4326) transforms.
//!
//! The engine only needs a forward transform from the patch's source CRS to
//! lon/lat degrees. EPSG:4326 and EPSG:3857 are built-in fast paths. With the
//! `proj` feature (on by default) any other EPSG code resolves through its
//! proj4 definition; transforms can also be registered explicitly on a
//! [`ProjectionRegistry`] constructed at startup and handed to the code that
//! needs it.

use std::collections::HashMap;
use std::f64::consts::PI;
use std::fmt;
use std::sync::Arc;

use glam::DVec2;

use crate::error::{GridError, GridResult};

/// WGS84 / spherical Mercator earth radius in meters.
pub const EARTH_RADIUS: f64 = 6_378_137.0;

/// Forward transform into lon/lat degrees.
pub trait CoordinateTransform: Send + Sync {
  fn forward(&self, point: DVec2) -> GridResult<DVec2>;
}

/// A resolved source projection.
#[derive(Clone)]
pub enum Projection {
  /// Source coordinates already are lon/lat degrees (EPSG:4326).
  LonLat,
  /// Spherical Web Mercator meters (EPSG:3857).
  WebMercator,
  /// User-registered transform.
  Custom(Arc<dyn CoordinateTransform>),
}

impl Projection {
  #[inline]
  pub fn forward(&self, point: DVec2) -> GridResult<DVec2> {
    match self {
      Projection::LonLat => Ok(point),
      Projection::WebMercator => Ok(web_mercator_to_lon_lat(point)),
      Projection::Custom(transform) => transform.forward(point),
    }
  }
}

impl fmt::Debug for Projection {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Projection::LonLat => f.write_str("LonLat"),
      Projection::WebMercator => f.write_str("WebMercator"),
      Projection::Custom(_) => f.write_str("Custom(..)"),
    }
  }
}

/// EPSG:3857 meters → lon/lat degrees.
#[inline]
pub fn web_mercator_to_lon_lat(point: DVec2) -> DVec2 {
  let lon = point.x / EARTH_RADIUS * 180.0 / PI;
  let lat = (2.0 * (point.y / EARTH_RADIUS).exp().atan() - PI / 2.0) * 180.0 / PI;
  DVec2::new(lon, lat)
}

/// proj4-backed transform from a source CRS to WGS84 lon/lat.
#[cfg(feature = "proj")]
pub struct Proj4Transform {
  source: proj4rs::proj::Proj,
  target: proj4rs::proj::Proj,
  source_is_geographic: bool,
}

#[cfg(feature = "proj")]
impl Proj4Transform {
  const WGS84: &'static str = "+proj=longlat +datum=WGS84 +no_defs";

  /// Transform for a proj4 definition string, e.g. the `+proj=tmerc ...`
  /// line of a national grid.
  pub fn from_proj_string(definition: &str) -> GridResult<Self> {
    let source = proj4rs::proj::Proj::from_proj_string(definition)
      .map_err(|e| GridError::Reprojection(format!("{}: {}", definition, e)))?;
    let target = proj4rs::proj::Proj::from_proj_string(Self::WGS84)
      .map_err(|e| GridError::Reprojection(e.to_string()))?;
    Ok(Self {
      source,
      target,
      source_is_geographic: definition.contains("+proj=longlat") || definition.contains("+proj=latlong"),
    })
  }

  /// Transform for an EPSG code from the bundled definition table.
  pub fn from_epsg(code: &str) -> GridResult<Self> {
    let key = normalize_epsg(code);
    let definition = key
      .strip_prefix("EPSG:")
      .and_then(|digits| digits.parse::<u16>().ok())
      .and_then(crs_definitions::from_code)
      .ok_or_else(|| GridError::UnknownProjection(key.clone()))?;
    Self::from_proj_string(definition.proj4)
  }
}

#[cfg(feature = "proj")]
impl CoordinateTransform for Proj4Transform {
  fn forward(&self, point: DVec2) -> GridResult<DVec2> {
    // Geographic coordinates travel in radians.
    let mut xyz = if self.source_is_geographic {
      (point.x.to_radians(), point.y.to_radians(), 0.0)
    } else {
      (point.x, point.y, 0.0)
    };
    proj4rs::transform::transform(&self.source, &self.target, &mut xyz)
      .map_err(|e| GridError::Reprojection(format!("({}, {}): {}", point.x, point.y, e)))?;
    Ok(DVec2::new(xyz.0.to_degrees(), xyz.1.to_degrees()))
  }
}

/// Normalize `"2326"`, `"epsg:2326"` and `"EPSG:2326"` to `"EPSG:2326"`.
pub fn normalize_epsg(code: &str) -> String {
  let trimmed = code.trim();
  let digits = trimmed
    .strip_prefix("EPSG:")
    .or_else(|| trimmed.strip_prefix("epsg:"))
    .unwrap_or(trimmed);
  format!("EPSG:{}", digits)
}

/// Explicit registry of known source projections.
///
/// Lookups never consult global state: callers build one registry and pass
/// it by reference. Falling back to a default is an explicit call.
#[derive(Clone, Debug)]
pub struct ProjectionRegistry {
  projections: HashMap<String, Projection>,
}

impl ProjectionRegistry {
  /// Registry with EPSG:4326 and EPSG:3857.
  pub fn new() -> Self {
    let mut projections = HashMap::new();
    projections.insert("EPSG:4326".to_string(), Projection::LonLat);
    projections.insert("EPSG:3857".to_string(), Projection::WebMercator);
    Self { projections }
  }

  /// Register (or replace) the transform for an EPSG code.
  pub fn register(&mut self, code: &str, transform: Arc<dyn CoordinateTransform>) {
    self
      .projections
      .insert(normalize_epsg(code), Projection::Custom(transform));
  }

  pub fn contains(&self, code: &str) -> bool {
    self.projections.contains_key(&normalize_epsg(code))
  }

  /// Register a proj4 definition string for an EPSG code.
  #[cfg(feature = "proj")]
  pub fn register_proj_string(&mut self, code: &str, definition: &str) -> GridResult<()> {
    let transform = Proj4Transform::from_proj_string(definition)?;
    self.register(code, Arc::new(transform));
    Ok(())
  }

  /// Look up a projection, failing on unknown codes.
  ///
  /// Registered codes win; with the `proj` feature other EPSG codes are
  /// resolved from the bundled definitions.
  pub fn get(&self, code: &str) -> GridResult<Projection> {
    let key = normalize_epsg(code);
    if let Some(projection) = self.projections.get(&key) {
      return Ok(projection.clone());
    }
    #[cfg(feature = "proj")]
    {
      let transform = Proj4Transform::from_epsg(&key)?;
      Ok(Projection::Custom(Arc::new(transform)))
    }
    #[cfg(not(feature = "proj"))]
    {
      Err(GridError::UnknownProjection(key))
    }
  }

  /// Look up a projection, falling back to `default` for unknown codes.
  pub fn get_or_default(&self, code: &str, default: Projection) -> Projection {
    self.get(code).unwrap_or(default)
  }

  pub fn len(&self) -> usize {
    self.projections.len()
  }

  pub fn is_empty(&self) -> bool {
    self.projections.is_empty()
  }
}

impl Default for ProjectionRegistry {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  struct Offset(DVec2);

  impl CoordinateTransform for Offset {
    fn forward(&self, point: DVec2) -> GridResult<DVec2> {
      Ok(point + self.0)
    }
  }

  #[test]
  fn test_normalize_epsg() {
    assert_eq!(normalize_epsg("2326"), "EPSG:2326");
    assert_eq!(normalize_epsg("epsg:2326"), "EPSG:2326");
    assert_eq!(normalize_epsg(" EPSG:4326 "), "EPSG:4326");
  }

  #[test]
  fn test_builtins_present() {
    let registry = ProjectionRegistry::new();
    assert!(registry.contains("4326"));
    assert!(registry.contains("EPSG:3857"));
    assert_eq!(registry.len(), 2);
  }

  #[test]
  fn test_lon_lat_is_identity() {
    let p = DVec2::new(114.17, 22.31);
    assert_eq!(Projection::LonLat.forward(p).unwrap(), p);
  }

  #[test]
  fn test_web_mercator_origin_and_edge() {
    let origin = web_mercator_to_lon_lat(DVec2::ZERO);
    assert!(origin.length() < 1e-12);

    let edge = web_mercator_to_lon_lat(DVec2::new(PI * EARTH_RADIUS, 0.0));
    assert!((edge.x - 180.0).abs() < 1e-9);
  }

  #[test]
  fn test_unknown_code_errors_and_default_falls_back() {
    let registry = ProjectionRegistry::new();
    assert!(matches!(
      registry.get("99999"),
      Err(GridError::UnknownProjection(code)) if code == "EPSG:99999"
    ));
    let fallback = registry.get_or_default("99999", Projection::LonLat);
    assert!(matches!(fallback, Projection::LonLat));
  }

  #[test]
  fn test_register_custom() {
    let mut registry = ProjectionRegistry::new();
    registry.register("2326", Arc::new(Offset(DVec2::new(1.0, 2.0))));
    let projection = registry.get("EPSG:2326").unwrap();
    assert_eq!(projection.forward(DVec2::ZERO).unwrap(), DVec2::new(1.0, 2.0));
  }

  /// HK1980 grid false origin sits at the projection origin
  /// (22.3121 N, 114.1786 E) give or take the datum shift to WGS84.
  #[cfg(feature = "proj")]
  #[test]
  fn test_hk1980_grid_resolves_from_epsg() {
    let registry = ProjectionRegistry::new();
    let projection = registry.get("EPSG:2326").unwrap();
    let lon_lat = projection.forward(DVec2::new(836_694.05, 819_069.8)).unwrap();
    assert!((lon_lat.x - 114.178_556).abs() < 0.01, "lon {}", lon_lat.x);
    assert!((lon_lat.y - 22.312_133).abs() < 0.01, "lat {}", lon_lat.y);
  }

  #[cfg(feature = "proj")]
  #[test]
  fn test_registered_proj_string_overrides_table() {
    let mut registry = ProjectionRegistry::new();
    registry
      .register_proj_string("EPSG:900913", "+proj=longlat +datum=WGS84 +no_defs")
      .unwrap();
    let projection = registry.get("900913").unwrap();
    let lon_lat = projection.forward(DVec2::new(114.17, 22.31)).unwrap();
    assert!((lon_lat - DVec2::new(114.17, 22.31)).length() < 1e-9);
    assert!(registry.register_proj_string("EPSG:1", "+proj=nonsense").is_err());
  }
}
