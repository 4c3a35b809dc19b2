//! Numeric element types for the sparse solver.

use std::fmt::Debug;
use std::ops::{Add, AddAssign, Div, Mul, MulAssign, Neg, Sub, SubAssign};

use num_complex::Complex64;

/// Arithmetic needed by the sparse LU factorization.
///
/// Implemented for `f64` (DC and transient analysis) and [`Complex64`]
/// (small-signal analysis). Magnitude is the absolute value for reals and the
/// modulus for complex numbers.
pub trait Scalar:
    Copy
    + Debug
    + PartialEq
    + Send
    + Sync
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + AddAssign
    + SubAssign
    + MulAssign
    + 'static
{
    /// Additive identity.
    fn zero() -> Self;

    /// Multiplicative identity.
    fn one() -> Self;

    /// Magnitude used for pivot selection.
    fn magnitude(&self) -> f64;

    /// `1 / self`.
    fn reciprocal(&self) -> Self {
        Self::one() / *self
    }

    fn is_zero(&self) -> bool {
        *self == Self::zero()
    }

    fn is_one(&self) -> bool {
        *self == Self::one()
    }

    /// True when any component is NaN.
    fn is_nan(&self) -> bool;
}

impl Scalar for f64 {
    fn zero() -> Self {
        0.0
    }

    fn one() -> Self {
        1.0
    }

    fn magnitude(&self) -> f64 {
        self.abs()
    }

    fn is_nan(&self) -> bool {
        f64::is_nan(*self)
    }
}

impl Scalar for Complex64 {
    fn zero() -> Self {
        Complex64::new(0.0, 0.0)
    }

    fn one() -> Self {
        Complex64::new(1.0, 0.0)
    }

    fn magnitude(&self) -> f64 {
        self.norm()
    }

    fn reciprocal(&self) -> Self {
        self.inv()
    }

    fn is_nan(&self) -> bool {
        Complex64::is_nan(*self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_complex_magnitude_is_modulus() {
        let z = Complex64::new(3.0, -4.0);
        assert_relative_eq!(z.magnitude(), 5.0);
        let r = Scalar::reciprocal(&z);
        assert_relative_eq!((z * r).re, 1.0, epsilon = 1e-15);
        assert_relative_eq!((z * r).im, 0.0, epsilon = 1e-15);
    }

    #[test]
    fn test_identities() {
        assert!(<f64 as Scalar>::zero().is_zero());
        assert!(<f64 as Scalar>::one().is_one());
        assert!(<Complex64 as Scalar>::one().is_one());
        assert!(!Complex64::new(1.0, 1e-20).is_one());
    }
}
