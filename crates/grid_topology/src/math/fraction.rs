//! Exact rational coordinates for cell extents.
//!
//! Cell boundaries are kept as reduced `numerator / denominator` pairs so that
//! repeated subdivision never accumulates floating point drift. Conversion to
//! `f64` only happens at the projection step.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Greatest common divisor (Euclid). `gcd(0, 0) == 0`.
#[inline]
pub fn gcd(mut a: u64, mut b: u64) -> u64 {
  while b != 0 {
    let t = a % b;
    a = b;
    b = t;
  }
  a
}

/// Non-negative rational number in lowest terms.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct Fraction {
  pub num: u64,
  pub den: u64,
}

impl Fraction {
  pub const ZERO: Fraction = Fraction { num: 0, den: 1 };
  pub const ONE: Fraction = Fraction { num: 1, den: 1 };

  /// Build `num / den` reduced by their GCD.
  ///
  /// # Panics
  /// Debug-asserts `den != 0`.
  pub fn simplify(num: u64, den: u64) -> Self {
    debug_assert!(den != 0, "fraction denominator must be non-zero");
    let divisor = gcd(num, den);
    if divisor == 0 {
      return Self::ZERO;
    }
    Self {
      num: num / divisor,
      den: den / divisor,
    }
  }

  #[inline]
  pub fn to_f64(self) -> f64 {
    self.num as f64 / self.den as f64
  }

  /// `[numerator, denominator]`, the pair layout used by serialized nodes.
  #[inline]
  pub fn as_pair(self) -> [u64; 2] {
    [self.num, self.den]
  }
}

impl Default for Fraction {
  fn default() -> Self {
    Self::ZERO
  }
}

impl PartialOrd for Fraction {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl Ord for Fraction {
  fn cmp(&self, other: &Self) -> Ordering {
    // Cross-multiplication in u128 cannot overflow for u64 parts.
    let lhs = self.num as u128 * other.den as u128;
    let rhs = other.num as u128 * self.den as u128;
    lhs.cmp(&rhs)
  }
}

impl fmt::Display for Fraction {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}", self.num, self.den)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_gcd() {
    assert_eq!(gcd(12, 18), 6);
    assert_eq!(gcd(7, 13), 1);
    assert_eq!(gcd(0, 5), 5);
    assert_eq!(gcd(0, 0), 0);
  }

  #[test]
  fn test_simplify_reduces() {
    assert_eq!(Fraction::simplify(2, 4), Fraction { num: 1, den: 2 });
    assert_eq!(Fraction::simplify(6, 9), Fraction { num: 2, den: 3 });
    assert_eq!(Fraction::simplify(5, 5), Fraction::ONE);
  }

  #[test]
  fn test_zero_numerator_normalizes() {
    assert_eq!(Fraction::simplify(0, 16), Fraction::ZERO);
  }

  /// Same boundary reached through different subdivision paths compares equal.
  #[test]
  fn test_equal_after_different_paths() {
    // 1/2 of a 2-wide grid == 2/4 of a 4-wide grid == 3/6 of a 6-wide grid
    let a = Fraction::simplify(1, 2);
    let b = Fraction::simplify(2, 4);
    let c = Fraction::simplify(3, 6);
    assert_eq!(a, b);
    assert_eq!(b, c);
  }

  #[test]
  fn test_ordering() {
    assert!(Fraction::simplify(1, 3) < Fraction::simplify(1, 2));
    assert!(Fraction::simplify(2, 3) > Fraction::simplify(3, 5));
    assert_eq!(
      Fraction::simplify(4, 8).cmp(&Fraction::simplify(1, 2)),
      Ordering::Equal
    );
  }

  #[test]
  fn test_to_f64() {
    assert_eq!(Fraction::simplify(3, 4).to_f64(), 0.75);
    assert_eq!(Fraction::ONE.to_f64(), 1.0);
  }
}
