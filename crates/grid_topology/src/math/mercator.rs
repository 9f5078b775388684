//! Normalized Web Mercator coordinates, the unit square used by the map
//! renderer (x and y in `[0, 1]`, y growing southward).

use std::f64::consts::PI;

use glam::DVec2;

/// Normalized Mercator x for a longitude in degrees.
#[inline]
pub fn mercator_x_from_lng(lng: f64) -> f64 {
  (180.0 + lng) / 360.0
}

/// Normalized Mercator y for a latitude in degrees.
#[inline]
pub fn mercator_y_from_lat(lat: f64) -> f64 {
  (180.0 - (180.0 / PI) * (PI / 4.0 + lat * PI / 360.0).tan().ln()) / 360.0
}

/// Normalized Mercator coordinate for `(lng, lat)` in degrees.
#[inline]
pub fn from_lon_lat(lon_lat: DVec2) -> DVec2 {
  DVec2::new(mercator_x_from_lng(lon_lat.x), mercator_y_from_lat(lon_lat.y))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_origin_maps_to_center() {
    let m = from_lon_lat(DVec2::ZERO);
    assert!((m.x - 0.5).abs() < 1e-15);
    assert!((m.y - 0.5).abs() < 1e-15);
  }

  #[test]
  fn test_antimeridian_edges() {
    assert_eq!(mercator_x_from_lng(-180.0), 0.0);
    assert_eq!(mercator_x_from_lng(180.0), 1.0);
  }

  #[test]
  fn test_north_is_smaller_y() {
    assert!(mercator_y_from_lat(22.3) < 0.5);
    assert!(mercator_y_from_lat(-33.9) > 0.5);
  }
}
