//! Scalar capability shared by the real and complex message models.
//!
//! Every message family except the variances carries values of type
//! [`Scalar`]: `f64` for the real engines, [`Complex64`] for `AMPcomplex`
//! and the seeded Fourier operator. Variances are always real.

use core::fmt::Debug;
use core::ops::{Add, AddAssign, Mul, Neg, Sub};

use num_complex::Complex64;

/// Field element carried by means, residuals and operator entries.
pub trait Scalar:
    Copy
    + Debug
    + PartialEq
    + Send
    + Sync
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Neg<Output = Self>
    + AddAssign
    + 'static
{
    /// `true` for the complex data model.
    const IS_COMPLEX: bool;

    /// Additive identity.
    fn zero() -> Self;

    /// Embed a real number.
    fn from_real(re: f64) -> Self;

    /// Complex conjugate (identity for reals).
    fn conj(self) -> Self;

    /// Squared modulus.
    fn norm_sqr(self) -> f64;

    /// Multiply by a real factor.
    fn scale(self, k: f64) -> Self;

    /// `false` if any component is NaN or infinite.
    fn is_finite(self) -> bool;
}

impl Scalar for f64 {
    const IS_COMPLEX: bool = false;

    #[inline]
    fn zero() -> Self {
        0.0
    }

    #[inline]
    fn from_real(re: f64) -> Self {
        re
    }

    #[inline]
    fn conj(self) -> Self {
        self
    }

    #[inline]
    fn norm_sqr(self) -> f64 {
        self * self
    }

    #[inline]
    fn scale(self, k: f64) -> Self {
        self * k
    }

    #[inline]
    fn is_finite(self) -> bool {
        f64::is_finite(self)
    }
}

impl Scalar for Complex64 {
    const IS_COMPLEX: bool = true;

    #[inline]
    fn zero() -> Self {
        Complex64::new(0.0, 0.0)
    }

    #[inline]
    fn from_real(re: f64) -> Self {
        Complex64::new(re, 0.0)
    }

    #[inline]
    fn conj(self) -> Self {
        Complex64::new(self.re, -self.im)
    }

    #[inline]
    fn norm_sqr(self) -> f64 {
        self.re * self.re + self.im * self.im
    }

    #[inline]
    fn scale(self, k: f64) -> Self {
        Complex64::new(self.re * k, self.im * k)
    }

    #[inline]
    fn is_finite(self) -> bool {
        self.re.is_finite() && self.im.is_finite()
    }
}

/// Mean squared distance between two equally long vectors.
pub fn mean_squared_distance<T: Scalar>(a: &[T], b: &[T]) -> f64 {
    if a.is_empty() {
        return 0.0;
    }
    let total: f64 = a.iter().zip(b).map(|(&x, &y)| (x - y).norm_sqr()).sum();
    total / a.len() as f64
}

/// Build a vector by evaluating `f` at every index in `0..n`.
///
/// Each index is computed independently, so with the `parallel` feature the
/// work is spread over the rayon pool with results identical to the serial
/// path.
pub(crate) fn map_indexed<U, F>(n: usize, f: F) -> Vec<U>
where
    U: Send,
    F: Fn(usize) -> U + Sync + Send,
{
    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        (0..n).into_par_iter().map(f).collect()
    }
    #[cfg(not(feature = "parallel"))]
    {
        (0..n).map(f).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complex_conj_and_norm() {
        let z = Complex64::new(3.0, -4.0);
        assert_eq!(Scalar::conj(z), Complex64::new(3.0, 4.0));
        assert_eq!(Scalar::norm_sqr(z), 25.0);
        assert_eq!(Scalar::scale(z, 0.5), Complex64::new(1.5, -2.0));
    }

    #[test]
    fn test_real_is_finite() {
        assert!(Scalar::is_finite(1.0_f64));
        assert!(!Scalar::is_finite(f64::NAN));
        assert!(!Scalar::is_finite(Complex64::new(0.0, f64::INFINITY)));
    }

    #[test]
    fn test_mean_squared_distance() {
        let a = [1.0, 2.0, 3.0];
        let b = [1.0, 0.0, 3.0];
        assert!((mean_squared_distance(&a, &b) - 4.0 / 3.0).abs() < 1e-15);
        assert_eq!(mean_squared_distance::<f64>(&[], &[]), 0.0);
    }

    #[test]
    fn test_map_indexed_keeps_order() {
        let v = map_indexed(5, |i| i * i);
        assert_eq!(v, vec![0, 1, 4, 9, 16]);
    }
}
