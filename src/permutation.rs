/*
 * This source code is licensed under the Business Source License 1.1.
 * See LICENSE in the root directory for full details.
 */

//! Sign flips and mode assignments for seeded operators.
//!
//! Built once per run from a seed, then shared read-only (behind an `Arc`)
//! by every product of the operator.
//!
//! # Construction
//!
//! 1. For each row block `l`, exactly `⌊Mblock(l)/2⌋` rows, chosen at random,
//!    get sign `−1`; the rest get `+1`.
//! 2. For each column block `c`, a random permutation of the `Nblock`
//!    transform modes is drawn. Position 0 never holds mode 0 (the constant
//!    mode); if it would, positions 0 and 1 are swapped.
//! 3. Walking `l` upward over the nonzero couplings `J(l, c)`, consecutive
//!    slices of length `Mblock(l)` are cut from that permutation. When fewer
//!    than `Mblock(l)` entries remain, a fresh permutation is drawn and the
//!    cut restarts at its beginning.
//!
//! # Invariants
//!
//! - Within one permutation no mode is handed out twice.
//! - `modes(l, c)` is empty exactly when `J(l, c) = 0`.
//! - The tables depend only on the layout and the seed.

use hashbrown::HashMap;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use crate::operator::BlockLayout;

/// Random permutation of `0..n` whose first entry is not the constant mode.
pub fn mode_permutation<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Vec<usize> {
    let mut perm: Vec<usize> = (0..n).collect();
    perm.shuffle(rng);
    if n >= 2 && perm[0] == 0 {
        perm.swap(0, 1);
    }
    perm
}

/// `±1` signs with exactly `⌊size/2⌋` negative entries at random positions.
pub fn sign_flips<R: Rng + ?Sized>(size: usize, rng: &mut R) -> Vec<f64> {
    let mut signs = vec![1.0; size];
    for i in rand::seq::index::sample(rng, size, size / 2).iter() {
        signs[i] = -1.0;
    }
    signs
}

/// Per-row signs and per-`(row block, column block)` mode slices.
#[derive(Clone, Debug, PartialEq)]
pub struct SeededTables {
    signs: Vec<Vec<f64>>,
    modes: HashMap<(usize, usize), Vec<usize>>,
    refreshes: usize,
}

impl SeededTables {
    /// Deterministic tables for `layout` from a `ChaCha8` stream seeded with `seed`.
    pub fn build(layout: &BlockLayout, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let tables = Self::build_with(layout, &mut rng);
        debug!(seed, refreshes = tables.refreshes, "seeded tables built");
        tables
    }

    /// Tables drawn from an arbitrary random source.
    pub fn build_with<R: Rng + ?Sized>(layout: &BlockLayout, rng: &mut R) -> Self {
        let signs: Vec<Vec<f64>> =
            (0..layout.num_row_blocks()).map(|l| sign_flips(layout.row_block_size(l), rng)).collect();

        let n = layout.col_block_size();
        let mut modes = HashMap::new();
        let mut refreshes = 0;
        for c in 0..layout.num_col_blocks() {
            let mut perm = mode_permutation(n, rng);
            let mut cursor = 0;
            for l in 0..layout.num_row_blocks() {
                if layout.coupling(l, c) == 0.0 {
                    continue;
                }
                let need = layout.row_block_size(l);
                if n - cursor < need {
                    perm = mode_permutation(n, rng);
                    cursor = 0;
                    refreshes += 1;
                }
                modes.insert((l, c), perm[cursor..cursor + need].to_vec());
                cursor += need;
            }
        }
        Self { signs, modes, refreshes }
    }

    /// Signs of the rows of row block `l`.
    pub fn signs(&self, l: usize) -> &[f64] {
        &self.signs[l]
    }

    /// Modes read by the rows of row block `l` from column block `c`.
    pub fn modes(&self, l: usize, c: usize) -> &[usize] {
        self.modes.get(&(l, c)).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether the tables have the shape `layout` requires.
    pub fn fits(&self, layout: &BlockLayout) -> bool {
        self.signs.len() == layout.num_row_blocks()
            && (0..layout.num_row_blocks()).all(|l| {
                self.signs[l].len() == layout.row_block_size(l)
                    && (0..layout.num_col_blocks()).all(|c| {
                        let modes = self.modes(l, c);
                        let expected = if layout.coupling(l, c) == 0.0 { 0 } else { layout.row_block_size(l) };
                        modes.len() == expected && modes.iter().all(|&m| m < layout.col_block_size())
                    })
            })
    }

    /// Number of permutations drawn after a column block's first one ran out.
    pub fn refreshes(&self) -> usize {
        self.refreshes
    }
}
