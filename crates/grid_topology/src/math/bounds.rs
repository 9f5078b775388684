//! Axis-aligned 2D bounding box with double precision for projected extents.

use glam::DVec2;
use serde::{Deserialize, Serialize};

use super::lerp;

/// Double-precision axis-aligned bounding box of a patch, in the patch's
/// source coordinate system.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox2D {
	/// Minimum corner (inclusive).
	pub min: DVec2,
	/// Maximum corner (inclusive).
	pub max: DVec2,
}

impl BoundingBox2D {
	/// Create a new box from min and max corners.
	///
	/// # Panics
	/// Debug-asserts that min <= max on both axes.
	pub fn new(min: DVec2, max: DVec2) -> Self {
		debug_assert!(
			min.x <= max.x && min.y <= max.y,
			"bounding box min must be <= max on all axes"
		);
		Self { min, max }
	}

	/// Create from the `[minx, miny, maxx, maxy]` array used on the wire.
	pub fn from_array(bounds: [f64; 4]) -> Self {
		Self::new(
			DVec2::new(bounds[0], bounds[1]),
			DVec2::new(bounds[2], bounds[3]),
		)
	}

	/// `[minx, miny, maxx, maxy]`.
	pub fn to_array(&self) -> [f64; 4] {
		[self.min.x, self.min.y, self.max.x, self.max.y]
	}

	/// True when min <= max on both axes and every coordinate is finite.
	pub fn is_valid(&self) -> bool {
		self.min.is_finite()
			&& self.max.is_finite()
			&& self.min.x <= self.max.x
			&& self.min.y <= self.max.y
	}

	#[inline]
	pub fn x_min(&self) -> f64 {
		self.min.x
	}

	#[inline]
	pub fn y_min(&self) -> f64 {
		self.min.y
	}

	#[inline]
	pub fn x_max(&self) -> f64 {
		self.max.x
	}

	#[inline]
	pub fn y_max(&self) -> f64 {
		self.max.y
	}

	/// Check if this box contains a point (boundary inclusive).
	#[inline]
	pub fn contains_point(&self, point: DVec2) -> bool {
		point.x >= self.min.x
			&& point.x <= self.max.x
			&& point.y >= self.min.y
			&& point.y <= self.max.y
	}

	/// Check if this box overlaps with another (touching counts).
	#[inline]
	pub fn overlaps(&self, other: &BoundingBox2D) -> bool {
		self.min.x <= other.max.x
			&& self.max.x >= other.min.x
			&& self.min.y <= other.max.y
			&& self.max.y >= other.min.y
	}

	/// Get the size of the box (max - min).
	#[inline]
	pub fn size(&self) -> DVec2 {
		self.max - self.min
	}

	/// Get the center of the box.
	#[inline]
	pub fn center(&self) -> DVec2 {
		(self.min + self.max) * 0.5
	}

	/// Map a normalized `(u, v)` in `[0, 1]^2` to a point inside the box.
	#[inline]
	pub fn point_at(&self, u: f64, v: f64) -> DVec2 {
		DVec2::new(
			lerp(self.min.x, self.max.x, u),
			lerp(self.min.y, self.max.y, v),
		)
	}
}
