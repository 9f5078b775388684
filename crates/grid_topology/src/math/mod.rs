//! Pure geometry helpers shared by the grid geometry and the render path.
//!
//! - [`bounds`]: `BoundingBox2D` - patch extent in source coordinates
//! - [`fraction`]: `Fraction` - exact, GCD-reduced cell boundaries
//! - [`double`]: `DoubleF32` - high/low float split for render precision
//! - [`mercator`]: lon/lat to normalized Mercator

pub mod bounds;
pub mod double;
pub mod fraction;
pub mod mercator;

pub use bounds::BoundingBox2D;
pub use double::{encode_float_to_double, DoubleF32};
pub use fraction::{gcd, Fraction};

/// Linear interpolation `(1 - t) * a + t * b`.
///
/// Evaluated in this exact form so `t = 0` and `t = 1` return the endpoints
/// bit-for-bit.
#[inline]
pub fn lerp(a: f64, b: f64, t: f64) -> f64 {
  (1.0 - t) * a + t * b
}
