//! Block-structured seeded operators.
//!
//! The operator is an `L × C` grid of blocks. Block `(l, c)` has
//! `Mblock(l) × Nblock` entries
//!
//! ```text
//! G[(l, r), (c, j)] = √J(l, c) · s(l, r) · T[mode(l, c, r)][j]
//! ```
//!
//! where `T` is the unnormalised Hadamard or Fourier transform, `s` the row
//! signs and `mode` the slices of [`SeededTables`]. Every entry of block
//! `(l, c)` therefore has `|G|² = J(l, c)`.

use core::ops::Range;
use std::sync::Arc;

use tracing::debug;

use super::dense::DenseMatrix;
use super::fast::multiply_transpose_squared;
use super::transform::BlockTransform;
use super::Operator;
use crate::error::{AmpError, AmpResult};
use crate::permutation::SeededTables;
use crate::scalar::{map_indexed, Scalar};

// ─── BlockLayout ────────────────────────────────────────────────────────────

/// Block partition and coupling weights of a seeded operator.
///
/// # Invariants
///
/// - `sum(Mblock) = M` and `C · Nblock = N`.
/// - `Nblock ≥ 2` and every `Mblock(l)` lies in `1..=Nblock`.
/// - `J(l, c)` is finite and non-negative.
/// - The nonzero entries of each column of `J` form one non-empty
///   contiguous run that starts at row block `c − 1` or later.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "RawLayout", into = "RawLayout")
)]
pub struct BlockLayout {
    row_blocks: Vec<usize>,
    col_block: usize,
    col_blocks: usize,
    coupling: Vec<f64>,
    row_offsets: Vec<usize>,
}

/// Serialized form of a layout; deserializing goes through [`BlockLayout::new`].
#[cfg(feature = "serde")]
#[derive(serde::Serialize, serde::Deserialize)]
struct RawLayout {
    row_blocks: Vec<usize>,
    col_block: usize,
    coupling: Vec<Vec<f64>>,
}

#[cfg(feature = "serde")]
impl TryFrom<RawLayout> for BlockLayout {
    type Error = AmpError;

    fn try_from(raw: RawLayout) -> AmpResult<Self> {
        BlockLayout::new(raw.row_blocks, raw.col_block, raw.coupling)
    }
}

#[cfg(feature = "serde")]
impl From<BlockLayout> for RawLayout {
    fn from(layout: BlockLayout) -> Self {
        let coupling = layout.coupling.chunks(layout.col_blocks).map(<[f64]>::to_vec).collect();
        RawLayout { row_blocks: layout.row_blocks, col_block: layout.col_block, coupling }
    }
}

impl BlockLayout {
    /// Validate and build a layout. `coupling` is `J`, one inner vector per row block.
    pub fn new(row_blocks: Vec<usize>, col_block: usize, coupling: Vec<Vec<f64>>) -> AmpResult<Self> {
        if row_blocks.is_empty() {
            return Err(AmpError::config("a seeded operator needs at least one row block"));
        }
        AmpError::check_len("coupling rows", row_blocks.len(), coupling.len())?;
        let col_blocks = coupling[0].len();
        if col_blocks == 0 {
            return Err(AmpError::config("a seeded operator needs at least one column block"));
        }
        if col_block < 2 {
            return Err(AmpError::config(format!("column block size must be at least 2, got {col_block}")));
        }
        for (l, &size) in row_blocks.iter().enumerate() {
            if size == 0 || size > col_block {
                return Err(AmpError::config(format!(
                    "row block {l} has {size} rows; it must hold between 1 and {col_block}"
                )));
            }
        }

        let mut flat = Vec::with_capacity(row_blocks.len() * col_blocks);
        for row in &coupling {
            AmpError::check_len("coupling columns", col_blocks, row.len())?;
            for &j in row {
                if !(j >= 0.0 && j.is_finite()) {
                    return Err(AmpError::config(format!("coupling weights must be finite and >= 0, got {j}")));
                }
            }
            flat.extend_from_slice(row);
        }

        let num_rows = row_blocks.len();
        for c in 0..col_blocks {
            let nonzero: Vec<usize> = (0..num_rows).filter(|&l| flat[l * col_blocks + c] != 0.0).collect();
            let (Some(&first), Some(&last)) = (nonzero.first(), nonzero.last()) else {
                return Err(AmpError::config(format!("column block {c} is not coupled to any row block")));
            };
            if last - first + 1 != nonzero.len() {
                return Err(AmpError::config(format!("coupling of column block {c} is not one contiguous band")));
            }
            if first + 1 < c {
                return Err(AmpError::config(format!(
                    "coupling of column block {c} starts at row block {first}, above the band"
                )));
            }
        }

        let mut row_offsets = Vec::with_capacity(num_rows + 1);
        row_offsets.push(0);
        for &size in &row_blocks {
            let last = row_offsets[row_offsets.len() - 1];
            row_offsets.push(last + size);
        }

        Ok(Self { row_blocks, col_block, col_blocks, coupling: flat, row_offsets })
    }

    /// Number of row blocks `L`.
    pub fn num_row_blocks(&self) -> usize {
        self.row_blocks.len()
    }

    /// Number of column blocks `C`.
    pub fn num_col_blocks(&self) -> usize {
        self.col_blocks
    }

    /// `Mblock(l)`.
    pub fn row_block_size(&self, l: usize) -> usize {
        self.row_blocks[l]
    }

    /// `Nblock`.
    pub fn col_block_size(&self) -> usize {
        self.col_block
    }

    /// `J(l, c)`.
    #[inline]
    pub fn coupling(&self, l: usize, c: usize) -> f64 {
        self.coupling[l * self.col_blocks + c]
    }

    /// Total number of rows `M`.
    pub fn rows(&self) -> usize {
        self.row_offsets[self.row_blocks.len()]
    }

    /// Total number of columns `N`.
    pub fn cols(&self) -> usize {
        self.col_blocks * self.col_block
    }

    /// Rows of row block `l`.
    pub fn row_range(&self, l: usize) -> Range<usize> {
        self.row_offsets[l]..self.row_offsets[l + 1]
    }

    /// Columns of column block `c`.
    pub fn col_range(&self, c: usize) -> Range<usize> {
        c * self.col_block..(c + 1) * self.col_block
    }

    /// Row blocks coupled to column block `c`.
    pub fn coupled_rows(&self, c: usize) -> impl Iterator<Item = usize> + '_ {
        (0..self.num_row_blocks()).filter(move |&l| self.coupling(l, c) != 0.0)
    }

    /// Column blocks coupled to row block `l`.
    pub fn coupled_cols(&self, l: usize) -> impl Iterator<Item = usize> + '_ {
        (0..self.col_blocks).filter(move |&c| self.coupling(l, c) != 0.0)
    }
}

// ─── SeededOperator ─────────────────────────────────────────────────────────

/// Seeded operator over block transform `K`.
#[derive(Clone, Debug)]
pub struct SeededOperator<K> {
    layout: Arc<BlockLayout>,
    tables: Arc<SeededTables>,
    transform: K,
    mean_square: f64,
}

impl<K: BlockTransform> SeededOperator<K> {
    /// Build the operator, drawing its tables from `seed`.
    pub fn new(layout: BlockLayout, seed: u64) -> AmpResult<Self> {
        let tables = SeededTables::build(&layout, seed);
        Self::with_tables(Arc::new(layout), Arc::new(tables))
    }

    /// Build the operator around existing, shared tables.
    pub fn with_tables(layout: Arc<BlockLayout>, tables: Arc<SeededTables>) -> AmpResult<Self> {
        if !tables.fits(&layout) {
            return Err(AmpError::config("seeded tables were built for a different block layout"));
        }
        let transform = K::plan(layout.col_block_size())?;
        let mut total = 0.0;
        for l in 0..layout.num_row_blocks() {
            for c in 0..layout.num_col_blocks() {
                total += layout.row_block_size(l) as f64 * layout.coupling(l, c);
            }
        }
        let mean_square = total / (layout.rows() * layout.num_col_blocks()) as f64;
        debug!(
            transform = K::NAME,
            rows = layout.rows(),
            cols = layout.cols(),
            row_blocks = layout.num_row_blocks(),
            col_blocks = layout.num_col_blocks(),
            "seeded operator ready"
        );
        Ok(Self { layout, tables, transform, mean_square })
    }

    /// Block partition and couplings.
    pub fn layout(&self) -> &BlockLayout {
        &self.layout
    }

    /// Shared sign and mode tables.
    pub fn tables(&self) -> &Arc<SeededTables> {
        &self.tables
    }

    /// The explicit dense matrix this operator multiplies by.
    pub fn materialize(&self) -> DenseMatrix<K::Elem> {
        let layout = &*self.layout;
        let mut out = DenseMatrix::zeros(layout.rows(), layout.cols());
        for l in 0..layout.num_row_blocks() {
            let signs = self.tables.signs(l);
            let rows = layout.row_range(l);
            for c in layout.coupled_cols(l) {
                let scale = layout.coupling(l, c).sqrt();
                let modes = self.tables.modes(l, c);
                let cols = layout.col_range(c);
                for (r, (&mode, &sign)) in modes.iter().zip(signs).enumerate() {
                    for (j, col) in cols.clone().enumerate() {
                        out.set(rows.start + r, col, self.transform.entry(mode, j).scale(scale * sign));
                    }
                }
            }
        }
        out
    }
}

impl<K: BlockTransform> Operator<K::Elem> for SeededOperator<K> {
    fn rows(&self) -> usize {
        self.layout.rows()
    }

    fn cols(&self) -> usize {
        self.layout.cols()
    }

    fn forward(&self, x: &[K::Elem]) -> Vec<K::Elem> {
        assert_eq!(x.len(), self.cols(), "forward: input length");
        let layout = &*self.layout;
        let spectra = map_indexed(layout.num_col_blocks(), |c| {
            let mut block = x[layout.col_range(c)].to_vec();
            self.transform.forward(&mut block);
            block
        });

        let mut out = vec![K::Elem::zero(); layout.rows()];
        for (c, spectrum) in spectra.iter().enumerate() {
            for l in layout.coupled_rows(c) {
                let scale = layout.coupling(l, c).sqrt();
                let rows = layout.row_range(l);
                let signs = self.tables.signs(l);
                for ((y, &mode), &sign) in out[rows].iter_mut().zip(self.tables.modes(l, c)).zip(signs) {
                    *y += spectrum[mode].scale(scale * sign);
                }
            }
        }
        out
    }

    fn transpose(&self, y: &[K::Elem]) -> Vec<K::Elem> {
        assert_eq!(y.len(), self.rows(), "transpose: input length");
        let layout = &*self.layout;
        let blocks = map_indexed(layout.num_col_blocks(), |c| {
            let mut acc = vec![K::Elem::zero(); layout.col_block_size()];
            for l in layout.coupled_rows(c) {
                let scale = layout.coupling(l, c).sqrt();
                let signs = self.tables.signs(l);
                for ((&v, &mode), &sign) in y[layout.row_range(l)].iter().zip(self.tables.modes(l, c)).zip(signs) {
                    acc[mode] += v.scale(scale * sign);
                }
            }
            self.transform.adjoint(&mut acc);
            acc
        });
        blocks.concat()
    }

    fn forward_squared(&self, v: &[f64]) -> Vec<f64> {
        assert_eq!(v.len(), self.cols(), "forward_squared: input length");
        let layout = &*self.layout;
        let sums: Vec<f64> = (0..layout.num_col_blocks()).map(|c| v[layout.col_range(c)].iter().sum()).collect();
        let mut out = vec![0.0; layout.rows()];
        for l in 0..layout.num_row_blocks() {
            let mut acc = 0.0;
            for (c, &s) in sums.iter().enumerate() {
                acc += layout.coupling(l, c) * s;
            }
            out[layout.row_range(l)].fill(acc);
        }
        out
    }

    fn transpose_squared(&self, u: &[f64]) -> Vec<f64> {
        assert_eq!(u.len(), self.rows(), "transpose_squared: input length");
        multiply_transpose_squared(u, &self.layout)
    }

    fn mean_square(&self) -> f64 {
        self.mean_square
    }

    fn row_blocks(&self) -> Vec<Range<usize>> {
        (0..self.layout.num_row_blocks()).map(|l| self.layout.row_range(l)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::{Fourier, Hadamard};

    #[test]
    fn test_layout_dimensions() {
        let layout = BlockLayout::new(vec![3, 5], 8, vec![vec![1.0, 0.0], vec![0.2, 0.7]]).unwrap();
        assert_eq!(layout.rows(), 8);
        assert_eq!(layout.cols(), 16);
        assert_eq!(layout.row_range(1), 3..8);
        assert_eq!(layout.col_range(1), 8..16);
    }

    #[test]
    fn test_layout_rejections() {
        // Oversized row block.
        assert!(BlockLayout::new(vec![9], 8, vec![vec![1.0]]).is_err());
        // Uncoupled column block.
        assert!(BlockLayout::new(vec![4, 4], 8, vec![vec![1.0, 0.0], vec![1.0, 0.0]]).is_err());
        // Broken band.
        assert!(BlockLayout::new(vec![2, 2, 2], 4, vec![vec![1.0], vec![0.0], vec![1.0]]).is_err());
        // Band starting above row block c − 1.
        assert!(BlockLayout::new(vec![2, 2], 4, vec![vec![1.0, 1.0, 1.0], vec![0.0, 0.0, 1.0]]).is_err());
        // Negative weight.
        assert!(BlockLayout::new(vec![2], 4, vec![vec![-1.0]]).is_err());
        // Ragged coupling.
        assert!(matches!(
            BlockLayout::new(vec![2, 2], 4, vec![vec![1.0, 1.0], vec![1.0]]),
            Err(AmpError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_squared_entries_equal_coupling() {
        let layout = BlockLayout::new(vec![2, 3], 4, vec![vec![0.5, 0.0], vec![2.0, 1.0]]).unwrap();
        let op = SeededOperator::<Fourier>::new(layout, 9).unwrap();
        let dense = op.materialize();
        for r in 0..2 {
            for c in 0..4 {
                assert!((dense.get(r, c).norm_sqr() - 0.5).abs() < 1e-12);
                assert_eq!(dense.get(r, c + 4).norm_sqr(), 0.0);
            }
        }
        for r in 2..5 {
            for c in 0..8 {
                let expected = if c < 4 { 2.0 } else { 1.0 };
                assert!((dense.get(r, c).norm_sqr() - expected).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_hadamard_products_match_materialized() {
        let layout = BlockLayout::new(vec![4, 4], 8, vec![vec![1.0, 0.5], vec![0.25, 1.0]]).unwrap();
        let op = SeededOperator::<Hadamard>::new(layout, 1).unwrap();
        let dense = op.materialize();
        let x: Vec<f64> = (0..16).map(|i| (i as f64 * 0.3).sin()).collect();
        let y: Vec<f64> = (0..8).map(|i| 1.0 - i as f64 * 0.2).collect();
        let fx = op.forward(&x);
        for (a, b) in fx.iter().zip(dense.mul_vec(&x)) {
            assert!((a - b).abs() < 1e-12);
        }
        let ty = op.transpose(&y);
        for (a, b) in ty.iter().zip(dense.adjoint().mul_vec(&y)) {
            assert!((a - b).abs() < 1e-12);
        }
        let v: Vec<f64> = (0..16).map(|i| i as f64 * 0.1).collect();
        let squared = DenseMatrix::new(8, 16, dense.as_slice().iter().map(|g| g * g).collect()).unwrap();
        for (a, b) in op.forward_squared(&v).iter().zip(squared.mul_vec(&v)) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn test_row_blocks_follow_layout() {
        let layout = BlockLayout::new(vec![3, 5], 8, vec![vec![1.0], vec![1.0]]).unwrap();
        let op = SeededOperator::<Hadamard>::new(layout, 0).unwrap();
        assert_eq!(Operator::<f64>::row_blocks(&op), vec![0..3, 3..8]);
        assert!((op.mean_square() - 1.0).abs() < 1e-15);
    }
}
