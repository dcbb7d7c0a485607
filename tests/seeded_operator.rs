//! Seeded structured operators against their materialised dense matrices,
//! permutation properties, and end-to-end runs.

use std::sync::Arc;

use amp_core::operator::multiply_transpose_squared;
use amp_core::permutation::mode_permutation;
use amp_core::{
    solve, AmpConfig, BlockLayout, Complex64, Fourier, Hadamard, Method, Operator, OperatorSpec, Prior, PriorKind,
    SeededOperator, SeededTables, Signal,
};
use approx::assert_relative_eq;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

// ─── helpers ─────────────────────────────────────────────────────────────────

fn two_by_two() -> BlockLayout {
    BlockLayout::new(vec![4, 6], 8, vec![vec![1.0, 0.3], vec![0.5, 2.0]]).unwrap()
}

fn banded_three_by_two() -> BlockLayout {
    BlockLayout::new(vec![6, 4, 4], 8, vec![vec![1.0, 0.0], vec![0.4, 1.5], vec![0.0, 0.25]]).unwrap()
}

/// Four column blocks of 64 with a tridiagonal coupling, α = 1/2.
fn chain() -> BlockLayout {
    let (blocks, rows, j1) = (4, 32, 0.2);
    let scale = 1.0 / (rows as f64 * (1.0 + 2.0 * j1));
    let coupling = (0..blocks)
        .map(|l| {
            (0..blocks)
                .map(|c: usize| match l.abs_diff(c) {
                    0 => scale,
                    1 => j1 * scale,
                    _ => 0.0,
                })
                .collect::<Vec<f64>>()
        })
        .collect();
    BlockLayout::new(vec![rows; blocks], 64, coupling).unwrap()
}

fn dense_transpose_squared(op: &SeededOperator<Hadamard>, u: &[f64]) -> Vec<f64> {
    let g = op.materialize();
    (0..g.cols()).map(|col| (0..g.rows()).map(|row| g.get(row, col).powi(2) * u[row]).sum()).collect()
}

// ─── fast multiply ───────────────────────────────────────────────────────────

#[test]
fn fast_multiply_matches_dense_two_by_two() {
    let layout = two_by_two();
    let op = SeededOperator::<Hadamard>::new(layout.clone(), 17).unwrap();
    let u: Vec<f64> = (0..layout.rows()).map(|i| 0.1 + i as f64 * 0.37).collect();

    let fast = multiply_transpose_squared(&u, &layout);
    let dense = dense_transpose_squared(&op, &u);
    for (a, b) in fast.iter().zip(&dense) {
        assert_relative_eq!(*a, *b, max_relative = 1e-12);
    }
    assert_eq!(op.transpose_squared(&u), fast);
}

#[test]
fn fast_multiply_matches_dense_banded() {
    let layout = banded_three_by_two();
    let op = SeededOperator::<Hadamard>::new(layout.clone(), 3).unwrap();
    let u: Vec<f64> = (0..layout.rows()).map(|i| 1.0 / (1.0 + i as f64)).collect();

    let fast = multiply_transpose_squared(&u, &layout);
    let dense = dense_transpose_squared(&op, &u);
    for (a, b) in fast.iter().zip(&dense) {
        assert_relative_eq!(*a, *b, max_relative = 1e-12);
    }
}

#[test]
fn forward_squared_matches_dense() {
    let layout = banded_three_by_two();
    let op = SeededOperator::<Fourier>::new(layout.clone(), 9).unwrap();
    let g = op.materialize();
    let v: Vec<f64> = (0..layout.cols()).map(|i| (i % 5) as f64 + 0.5).collect();
    let fast = op.forward_squared(&v);
    for row in 0..g.rows() {
        let dense: f64 = (0..g.cols()).map(|col| g.get(row, col).norm_sqr() * v[col]).sum();
        assert_relative_eq!(fast[row], dense, max_relative = 1e-10);
    }
}

#[test]
fn fourier_products_match_dense() {
    let layout = two_by_two();
    let op = SeededOperator::<Fourier>::new(layout.clone(), 21).unwrap();
    let g = op.materialize();
    let x: Vec<Complex64> =
        (0..layout.cols()).map(|i| Complex64::new((i as f64 * 0.7).sin(), (i as f64 * 0.3).cos())).collect();
    let y: Vec<Complex64> = (0..layout.rows()).map(|i| Complex64::new(1.0 / (1.0 + i as f64), -0.2)).collect();

    let fwd = op.forward(&x);
    for (a, b) in fwd.iter().zip(g.mul_vec(&x)) {
        assert!((a - b).norm() < 1e-10, "{a} vs {b}");
    }
    let back = op.transpose(&y);
    for (a, b) in back.iter().zip(g.adjoint().mul_vec(&y)) {
        assert!((a - b).norm() < 1e-10, "{a} vs {b}");
    }
}

// ─── permutations ────────────────────────────────────────────────────────────

#[test]
fn constant_mode_never_leads_a_permutation() {
    for seed in 0..1000 {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        assert_ne!(mode_permutation(16, &mut rng)[0], 0, "seed {seed}");
    }
}

#[test]
fn first_coupled_block_never_reads_constant_mode_first() {
    let layout = banded_three_by_two();
    for seed in 0..1000 {
        let tables = SeededTables::build(&layout, seed);
        assert_ne!(tables.modes(0, 0)[0], 0, "seed {seed}");
        assert_ne!(tables.modes(1, 1)[0], 0, "seed {seed}");
    }
}

#[test]
fn shared_tables_give_identical_operators() {
    let layout = Arc::new(two_by_two());
    let tables = Arc::new(SeededTables::build(&layout, 5));
    let a = SeededOperator::<Hadamard>::with_tables(layout.clone(), tables.clone()).unwrap();
    let b = SeededOperator::<Hadamard>::new((*layout).clone(), 5).unwrap();
    assert_eq!(a.materialize(), b.materialize());

    let other = Arc::new(banded_three_by_two());
    assert!(SeededOperator::<Hadamard>::with_tables(other, tables).is_err());
}

// ─── end to end ──────────────────────────────────────────────────────────────

#[test]
fn seeded_hadamard_recovers() {
    let layout = chain();
    let mut rng = ChaCha8Rng::seed_from_u64(31);
    let unit = Normal::new(0.0, 1.0).unwrap();
    let x: Vec<f64> =
        (0..layout.cols()).map(|_| if rng.gen::<f64>() < 0.1 { unit.sample(&mut rng) } else { 0.0 }).collect();
    let y = SeededOperator::<Hadamard>::new(layout.clone(), 77).unwrap().forward(&x);

    let config = AmpConfig { print: 0, ..AmpConfig::with_method(Method::AmpSeededHadamard) };
    let out = solve(
        Signal::Real(y),
        OperatorSpec::Seeded { layout, seed: 77 },
        Prior::sparse_gauss(0.1, 0.0, 1.0),
        &config,
        Some(Signal::Real(x)),
    )
    .unwrap();
    assert!(out.mse().unwrap() < 1e-3, "mse {:?}", out.mse());
    assert!(out.as_real().is_some());
}

#[test]
fn seeded_fourier_recovers() {
    let layout = chain();
    let mut rng = ChaCha8Rng::seed_from_u64(32);
    let half = Normal::new(0.0, 0.5f64.sqrt()).unwrap();
    let x: Vec<Complex64> = (0..layout.cols())
        .map(|_| {
            if rng.gen::<f64>() < 0.1 {
                Complex64::new(half.sample(&mut rng), half.sample(&mut rng))
            } else {
                Complex64::new(0.0, 0.0)
            }
        })
        .collect();
    let y = SeededOperator::<Fourier>::new(layout.clone(), 78).unwrap().forward(&x);

    let config = AmpConfig { print: 0, ..AmpConfig::with_method(Method::AmpSeededFourier) };
    let prior = Prior::new(0.1, PriorKind::Complex { mean: Complex64::new(0.0, 0.0), var: 1.0 });
    let spec = OperatorSpec::Seeded { layout, seed: 78 };
    let out = solve(Signal::Complex(y), spec, prior, &config, Some(Signal::Complex(x))).unwrap();
    assert!(out.mse().unwrap() < 1e-3, "mse {:?}", out.mse());
}

#[test]
fn hadamard_needs_power_of_two_blocks() {
    let layout = BlockLayout::new(vec![3], 6, vec![vec![1.0]]).unwrap();
    let config = AmpConfig::with_method(Method::AmpSeededHadamard);
    let spec = OperatorSpec::Seeded { layout, seed: 0 };
    let err = solve(Signal::Real(vec![0.0; 3]), spec, Prior::sparse_gauss(0.1, 0.0, 1.0), &config, None).unwrap_err();
    assert!(err.is_configuration());
}

#[test]
fn mean_removal_is_rejected_for_seeded_methods() {
    let config = AmpConfig {
        remove_mean: amp_core::MeanRemoval::PerColumn,
        ..AmpConfig::with_method(Method::AmpSeededHadamard)
    };
    let err = solve(
        Signal::Real(vec![0.0; 10]),
        OperatorSpec::Seeded { layout: two_by_two(), seed: 0 },
        Prior::sparse_gauss(0.1, 0.0, 1.0),
        &config,
        None,
    )
    .unwrap_err();
    assert!(err.is_configuration());
}
