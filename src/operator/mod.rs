/*
 * This source code is licensed under the Business Source License 1.1.
 * See LICENSE in the root directory for full details.
 */

//! Measurement operators.
//!
//! The engine only ever sees the [`Operator`] capability: products with `G`,
//! with its conjugate transpose, and with the elementwise squared modulus
//! `|G|²` in both directions. Two implementations exist:
//!
//! - [`DenseOperator`]: an explicit `M × N` matrix, O(MN) per product.
//! - [`SeededOperator`]: a block-structured Hadamard or Fourier operator
//!   whose products cost O(N log N), and whose squared products collapse to
//!   O(M + N) block sums ([`multiply_transpose_squared`]).
//!
//! # Invariants
//!
//! - Every product reads its input and writes a freshly allocated output; no
//!   operator holds mutable state, so one operator may be shared by reference
//!   across iterations and threads.
//! - `transpose` multiplies by the conjugate transpose `Gᴴ`.
//! - `forward_squared` and `transpose_squared` use `|G_μi|²`.

mod dense;
mod fast;
mod seeded;
mod transform;

use core::ops::Range;

use crate::scalar::Scalar;

pub use dense::{center, DenseMatrix, DenseOperator};
pub use fast::multiply_transpose_squared;
pub use seeded::{BlockLayout, SeededOperator};
pub use transform::{BlockTransform, Fourier, Hadamard};

/// Linear measurement operator `G` of shape `rows × cols`.
///
/// # Panics
///
/// Every product panics when its input length does not match the operator.
/// [`crate::Amp`] checks all lengths once, before the first pass.
pub trait Operator<T: Scalar>: Send + Sync {
    /// Number of measurements `M`.
    fn rows(&self) -> usize;

    /// Number of signal entries `N`.
    fn cols(&self) -> usize;

    /// `G·x` for `x` of length `cols`.
    fn forward(&self, x: &[T]) -> Vec<T>;

    /// `Gᴴ·y` for `y` of length `rows`.
    fn transpose(&self, y: &[T]) -> Vec<T>;

    /// `|G|²·v` for `v` of length `cols`.
    fn forward_squared(&self, v: &[f64]) -> Vec<f64>;

    /// `(|G|²)ᵀ·u` for `u` of length `rows`.
    fn transpose_squared(&self, u: &[f64]) -> Vec<f64>;

    /// Mean of `|G_μi|²` over all entries.
    fn mean_square(&self) -> f64;

    /// Row ranges sharing one noise variance. Dense operators have a single block.
    fn row_blocks(&self) -> Vec<Range<usize>> {
        vec![0..self.rows()]
    }
}
