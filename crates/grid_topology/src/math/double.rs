//! Double-float emulation for float32-only render pipelines.
//!
//! A world-scale Mercator coordinate stored as a single `f32` loses
//! sub-meter precision. Splitting it into an `f32` high part plus the `f32`
//! residual lets the vertex shader reconstruct it as `high + low`.
//!
//! Both parts are made relative to a reference point (the patch center) by
//! subtracting the reference's high and low parts *separately*, never the
//! recombined value.

/// A value split into an `f32` high part and an `f32` residual.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DoubleF32 {
  pub high: f32,
  pub low: f32,
}

impl DoubleF32 {
  /// Split `value` into `high = f32(value)` and `low = f32(value - high)`.
  #[inline]
  pub fn encode(value: f64) -> Self {
    let high = value as f32;
    let low = (value - high as f64) as f32;
    Self { high, low }
  }

  /// `high + low` evaluated in double precision.
  #[inline]
  pub fn decode(self) -> f64 {
    self.high as f64 + self.low as f64
  }

  /// Subtract a reference part-wise: `(high - ref.high, low - ref.low)`.
  #[inline]
  pub fn relative_to(self, reference: DoubleF32) -> Self {
    Self {
      high: self.high - reference.high,
      low: self.low - reference.low,
    }
  }
}

/// `[high, low]` pair for `value`.
#[inline]
pub fn encode_float_to_double(value: f64) -> [f32; 2] {
  let encoded = DoubleF32::encode(value);
  [encoded.high, encoded.low]
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_exact_f32_has_zero_low() {
    let encoded = DoubleF32::encode(0.5);
    assert_eq!(encoded.high, 0.5);
    assert_eq!(encoded.low, 0.0);
  }

  #[test]
  fn test_low_captures_residual() {
    let value = 0.817_355_123_456_789_f64;
    let encoded = DoubleF32::encode(value);
    assert_ne!(encoded.high as f64, value);
    assert_eq!(encoded.high, value as f32);
    // Recombined error is far below a single f32 ulp at this magnitude
    assert!((encoded.decode() - value).abs() < 1e-12);
  }

  #[test]
  fn test_relative_to_is_part_wise() {
    let a = DoubleF32 { high: 0.75, low: 1e-9 };
    let b = DoubleF32 { high: 0.5, low: 4e-9 };
    let rel = a.relative_to(b);
    assert_eq!(rel.high, 0.25);
    assert_eq!(rel.low, 1e-9_f32 - 4e-9_f32);
  }

  /// Part-wise relative values keep precision a single f32 difference loses.
  #[test]
  fn test_relative_precision_beats_single_float() {
    let center = 0.817_355_0_f64;
    let point = center + 3.0e-9; // roughly 12 cm in Mercator units
    let rel = DoubleF32::encode(point).relative_to(DoubleF32::encode(center));
    let reconstructed = rel.high as f64 + rel.low as f64;
    assert!((reconstructed - 3.0e-9).abs() < 1e-13);

    let naive = (point as f32 - center as f32) as f64;
    assert!((naive - 3.0e-9).abs() > (reconstructed - 3.0e-9).abs());
  }

  #[test]
  fn test_encode_float_to_double_pair() {
    let [high, low] = encode_float_to_double(1.0 / 3.0);
    assert_eq!(high, (1.0_f64 / 3.0) as f32);
    assert_eq!(low, ((1.0_f64 / 3.0) - high as f64) as f32);
  }
}
