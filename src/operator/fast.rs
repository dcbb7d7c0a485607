//! Transpose-of-squared product for seeded operators.
//!
//! Every entry of block `(l, c)` has `|G|² = J(l, c)`, so
//!
//! ```text
//! ((|G|²)ᵀ u)[(c, j)] = Σ_l J(l, c) · Σ_{μ ∈ row block l} u_μ
//! ```
//!
//! is the same for every `j` in column block `c`. One pass over `u` gives
//! the row-block sums; one short scan of each column of `J` gives the result.
//! O(M + N) instead of O(MN).

use super::seeded::BlockLayout;

/// `(|G|²)ᵀ·u` for the seeded operator with block structure `layout`.
///
/// For column block `c` the scan starts at row block `c − 1` (clamped to the
/// first), skips zeros until the coupled band begins and stops at the first
/// zero after it. [`BlockLayout::new`] guarantees the band is contiguous and
/// starts no earlier than `c − 1`, so the scan sees every nonzero weight.
///
/// # Panics
///
/// Panics if `u.len()` differs from `layout.rows()`.
pub fn multiply_transpose_squared(u: &[f64], layout: &BlockLayout) -> Vec<f64> {
    assert_eq!(u.len(), layout.rows(), "multiply_transpose_squared: input length");
    let sums: Vec<f64> =
        (0..layout.num_row_blocks()).map(|l| u[layout.row_range(l)].iter().sum()).collect();

    let mut z = vec![0.0; layout.cols()];
    for c in 0..layout.num_col_blocks() {
        let mut acc = 0.0;
        let mut in_band = false;
        for (l, &s) in sums.iter().enumerate().skip(c.saturating_sub(1)) {
            let j = layout.coupling(l, c);
            if j == 0.0 {
                if in_band {
                    break;
                }
                continue;
            }
            in_band = true;
            acc += j * s;
        }
        z[layout.col_range(c)].fill(acc);
    }
    z
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_sums_broadcast() {
        // J = [[1, 0], [2, 3]]; Mblock = [1, 2]; Nblock = 2.
        let layout = BlockLayout::new(vec![1, 2], 2, vec![vec![1.0, 0.0], vec![2.0, 3.0]]).unwrap();
        let z = multiply_transpose_squared(&[1.0, 2.0, 4.0], &layout);
        assert_eq!(z, vec![13.0, 13.0, 18.0, 18.0]);
    }

    #[test]
    fn test_scan_skips_leading_zeros() {
        // Column 1 is coupled to row blocks 1..3 only.
        let layout = BlockLayout::new(vec![2, 2, 2], 4, vec![vec![1.0, 0.0], vec![0.5, 1.0], vec![0.0, 2.0]])
        .unwrap();
        let z = multiply_transpose_squared(&[1.0, 1.0, 2.0, 2.0, 3.0, 3.0], &layout);
        assert_eq!(&z[..4], &[4.0; 4]);
        assert_eq!(&z[4..], &[16.0; 4]);
    }

    #[test]
    #[should_panic(expected = "input length")]
    fn test_short_input_panics() {
        let layout = BlockLayout::new(vec![1, 2], 2, vec![vec![1.0, 0.0], vec![2.0, 3.0]]).unwrap();
        multiply_transpose_squared(&[1.0, 2.0], &layout);
    }
}
