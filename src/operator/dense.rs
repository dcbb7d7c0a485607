//! Dense operator with optional cached products.
//!
//! With [`Storage::SaveSpeed`] the conjugate transpose, the squared modulus
//! and its transpose are materialised once (three extra operator-sized
//! buffers). With [`Storage::SaveMemory`] they are recomputed entry by entry
//! inside each product. Both modes visit entries in the same order and
//! multiply the same values, so their results are bitwise identical.

use tracing::debug;

use super::Operator;
use crate::config::{MeanRemoval, Storage};
use crate::error::{AmpError, AmpResult};
use crate::scalar::{map_indexed, Scalar};

// ─── DenseMatrix ────────────────────────────────────────────────────────────

/// Row-major `rows × cols` matrix.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DenseMatrix<T> {
    rows: usize,
    cols: usize,
    data: Vec<T>,
}

impl<T: Scalar> DenseMatrix<T> {
    /// Wrap row-major `data`.
    pub fn new(rows: usize, cols: usize, data: Vec<T>) -> AmpResult<Self> {
        if rows == 0 || cols == 0 {
            return Err(AmpError::config(format!("matrix must be non-empty, got {rows} x {cols}")));
        }
        AmpError::check_len("matrix entries", rows * cols, data.len())?;
        Ok(Self { rows, cols, data })
    }

    /// Build from a list of equally long rows.
    pub fn from_rows(rows: &[Vec<T>]) -> AmpResult<Self> {
        let cols = rows.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(rows.len() * cols);
        for row in rows {
            AmpError::check_len("matrix row", cols, row.len())?;
            data.extend_from_slice(row);
        }
        Self::new(rows.len(), cols, data)
    }

    /// All-zero matrix.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self { rows, cols, data: vec![T::zero(); rows * cols] }
    }

    /// Number of rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Entry at `(row, col)`.
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> T {
        self.data[row * self.cols + col]
    }

    /// Overwrite the entry at `(row, col)`.
    #[inline]
    pub fn set(&mut self, row: usize, col: usize, value: T) {
        self.data[row * self.cols + col] = value;
    }

    /// One row as a slice.
    #[inline]
    pub fn row(&self, row: usize) -> &[T] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    /// Row-major entries.
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Conjugate transpose `Gᴴ`.
    pub fn adjoint(&self) -> Self {
        let mut out = Self::zeros(self.cols, self.rows);
        for r in 0..self.rows {
            for (c, &g) in self.row(r).iter().enumerate() {
                out.set(c, r, g.conj());
            }
        }
        out
    }

    /// `G·x`.
    pub fn mul_vec(&self, x: &[T]) -> Vec<T> {
        map_indexed(self.rows, |r| dot(self.row(r), x))
    }
}

#[inline]
fn dot<T: Scalar>(row: &[T], x: &[T]) -> T {
    let mut acc = T::zero();
    for (&g, &v) in row.iter().zip(x) {
        acc += g * v;
    }
    acc
}

#[inline]
fn dot_real(row: &[f64], x: &[f64]) -> f64 {
    let mut acc = 0.0;
    for (&g, &v) in row.iter().zip(x) {
        acc += g * v;
    }
    acc
}

// ─── DenseOperator ──────────────────────────────────────────────────────────

/// Products cached under [`Storage::SaveSpeed`].
#[derive(Clone, Debug)]
struct Cache<T> {
    adjoint: DenseMatrix<T>,
    /// `|G|²`, row-major `rows × cols`.
    squared: Vec<f64>,
    /// `(|G|²)ᵀ`, row-major `cols × rows`.
    squared_t: Vec<f64>,
}

/// Explicit matrix operator.
#[derive(Clone, Debug)]
pub struct DenseOperator<T> {
    matrix: DenseMatrix<T>,
    cache: Option<Cache<T>>,
    mean_square: f64,
}

impl<T: Scalar> DenseOperator<T> {
    /// Wrap `matrix`, caching its derived products when `storage` asks for speed.
    pub fn new(matrix: DenseMatrix<T>, storage: Storage) -> Self {
        let (rows, cols) = (matrix.rows(), matrix.cols());
        let total: f64 = matrix.as_slice().iter().map(|g| g.norm_sqr()).sum();
        let mean_square = total / (rows * cols) as f64;

        let cache = match storage {
            Storage::SaveMemory => None,
            Storage::SaveSpeed => {
                let squared: Vec<f64> = matrix.as_slice().iter().map(|g| g.norm_sqr()).collect();
                let mut squared_t = vec![0.0; rows * cols];
                for r in 0..rows {
                    for c in 0..cols {
                        squared_t[c * rows + r] = squared[r * cols + c];
                    }
                }
                Some(Cache { adjoint: matrix.adjoint(), squared, squared_t })
            }
        };
        debug!(rows, cols, ?storage, mean_square, "dense operator ready");
        Self { matrix, cache, mean_square }
    }

    /// The underlying matrix.
    pub fn matrix(&self) -> &DenseMatrix<T> {
        &self.matrix
    }

    /// Whether derived products are cached.
    pub fn storage(&self) -> Storage {
        if self.cache.is_some() {
            Storage::SaveSpeed
        } else {
            Storage::SaveMemory
        }
    }
}

impl<T: Scalar> Operator<T> for DenseOperator<T> {
    fn rows(&self) -> usize {
        self.matrix.rows()
    }

    fn cols(&self) -> usize {
        self.matrix.cols()
    }

    fn forward(&self, x: &[T]) -> Vec<T> {
        assert_eq!(x.len(), self.cols(), "forward: input length");
        self.matrix.mul_vec(x)
    }

    fn transpose(&self, y: &[T]) -> Vec<T> {
        assert_eq!(y.len(), self.rows(), "transpose: input length");
        match &self.cache {
            Some(cache) => cache.adjoint.mul_vec(y),
            None => {
                let m = &self.matrix;
                map_indexed(m.cols(), |c| {
                    let mut acc = T::zero();
                    for (r, &v) in y.iter().enumerate() {
                        acc += m.get(r, c).conj() * v;
                    }
                    acc
                })
            }
        }
    }

    fn forward_squared(&self, v: &[f64]) -> Vec<f64> {
        assert_eq!(v.len(), self.cols(), "forward_squared: input length");
        let (rows, cols) = (self.rows(), self.cols());
        match &self.cache {
            Some(cache) => map_indexed(rows, |r| dot_real(&cache.squared[r * cols..(r + 1) * cols], v)),
            None => map_indexed(rows, |r| {
                let mut acc = 0.0;
                for (&g, &x) in self.matrix.row(r).iter().zip(v) {
                    acc += g.norm_sqr() * x;
                }
                acc
            }),
        }
    }

    fn transpose_squared(&self, u: &[f64]) -> Vec<f64> {
        assert_eq!(u.len(), self.rows(), "transpose_squared: input length");
        let (rows, cols) = (self.rows(), self.cols());
        match &self.cache {
            Some(cache) => map_indexed(cols, |c| dot_real(&cache.squared_t[c * rows..(c + 1) * rows], u)),
            None => map_indexed(cols, |c| {
                let mut acc = 0.0;
                for (r, &x) in u.iter().enumerate() {
                    acc += self.matrix.get(r, c).norm_sqr() * x;
                }
                acc
            }),
        }
    }

    fn mean_square(&self) -> f64 {
        self.mean_square
    }
}

// ─── Mean removal ───────────────────────────────────────────────────────────

/// Centre `matrix` and `y` according to `mode`.
///
/// The removed means are not discarded: one row `√M·m` is appended to the
/// operator and `√M·ȳ` to the measurements, where `m` holds the removed
/// column means and `ȳ = m·x` the mean measurement. The centred system
/// satisfies `G'·x = y'` for every `x` with `G·x = y`.
///
/// [`MeanRemoval::Shared`] is rejected: subtracting one global mean `s`
/// leaves `s·Σx` in every row, which no transform of `y` can supply.
pub fn center<T: Scalar>(matrix: &DenseMatrix<T>, y: &[T], mode: MeanRemoval) -> AmpResult<(DenseMatrix<T>, Vec<T>)> {
    AmpError::check_len("measurements", matrix.rows(), y.len())?;
    match mode {
        MeanRemoval::Off => return Ok((matrix.clone(), y.to_vec())),
        MeanRemoval::Shared => return Err(MeanRemoval::shared_unsupported()),
        MeanRemoval::PerColumn => {}
    }
    let (rows, cols) = (matrix.rows(), matrix.cols());
    let inv_rows = 1.0 / rows as f64;

    let mut means = vec![T::zero(); cols];
    for r in 0..rows {
        for (acc, &g) in means.iter_mut().zip(matrix.row(r)) {
            *acc += g;
        }
    }
    for m in means.iter_mut() {
        *m = m.scale(inv_rows);
    }

    let mut y_mean = T::zero();
    for &v in y {
        y_mean += v;
    }
    let y_mean = y_mean.scale(inv_rows);
    let root = (rows as f64).sqrt();

    let mut data = Vec::with_capacity((rows + 1) * cols);
    for r in 0..rows {
        data.extend(matrix.row(r).iter().zip(&means).map(|(&g, &m)| g - m));
    }
    data.extend(means.iter().map(|m| m.scale(root)));

    let mut centred: Vec<T> = y.iter().map(|&v| v - y_mean).collect();
    centred.push(y_mean.scale(root));

    debug!(?mode, rows = rows + 1, cols, "operator centred");
    Ok((DenseMatrix::new(rows + 1, cols, data)?, centred))
}
