//! # amp-core
//!
//! Approximate message passing (AMP) for compressed sensing.
//!
//! ---
//!
//! ## The problem
//!
//! Recover a signal `x` of length `N` from `M < N` noisy linear measurements
//!
//! ```text
//! y = G·x + ξ,    ξ ~ N(0, Δ)
//! ```
//!
//! given a prior on the entries of `x` (sparse, bounded, binary, ...). AMP
//! iterates cheap per-variable posterior updates ("denoisers") against
//! Gaussian cavity messages, with an Onsager correction that keeps the
//! cavity statistics honest on random or randomly structured operators.
//!
//! **Priors**: eleven families behind one closed enum, each with its
//! denoiser and the gradient of its log partition function for
//! hyperparameter learning.
//!
//! **Operators**: explicit dense matrices (real or complex, with optional
//! cached squared products), or seeded structured operators built from
//! sign-flipped, mode-permuted Fourier or Hadamard blocks with a coupling
//! matrix `J`. The seeded operator never materialises `G`: products are
//! block transforms and the squared products are O(M + N).
//!
//! ## The pipeline
//!
//! ```text
//! AmpConfig ─┐
//! Prior ─────┼──> Amp::new ──> step()* ──> AmpReport
//! Operator ──┘        │            │
//!   DenseOperator     │            ├── Denoiser (per variable, optional rayon)
//!   SeededOperator ───┘            └── learning: prior gradient, noise EM
//!     SeededTables (permutation)
//!     BlockTransform (Fourier, Hadamard)
//! ```
//!
//! ## Module overview
//!
//! | Module | Key types | What it does |
//! |--------|-----------|--------------|
//! | [`config`] | [`AmpConfig`], [`Method`], [`MeanRemoval`] | Run options, validated once |
//! | [`prior`] | [`Prior`], [`PriorKind`], [`Denoiser`] | Posterior moments and learning gradients |
//! | [`operator`] | [`Operator`], [`DenseOperator`], [`SeededOperator`] | `G`, `Gᴴ`, `|G|²`, `(|G|²)ᵀ` products |
//! | [`permutation`] | [`SeededTables`] | Sign and mode tables of seeded operators |
//! | [`engine`] | [`Amp`], [`Phase`] | The damped AMP recursion |
//! | [`report`] | [`AmpReport`], [`Status`] | Estimate, learned parameters, diagnostics |
//! | [`solver`] | [`solve`], [`Signal`], [`OperatorSpec`] | Method dispatch in one call |
//! | [`special`] | [`special::TruncatedNormal`] | erfcx, log-domain tails, truncated moments |
//! | [`scalar`] | [`Scalar`] | Real and complex message models |
//! | [`error`] | [`AmpError`] | Configuration and divergence errors |
//!
//! ## Example
//!
//! ```
//! use amp_core::{solve, AmpConfig, DenseMatrix, OperatorSpec, Prior, Signal};
//!
//! let g = DenseMatrix::from_rows(&[vec![1.0, 0.0, 0.5], vec![0.0, 1.0, 0.5]])?;
//! let config = AmpConfig { print: 0, nb_iter: 50, ..AmpConfig::default() };
//! let out = solve(
//!     Signal::Real(vec![1.0, 0.0]),
//!     OperatorSpec::Dense(g),
//!     Prior::sparse_gauss(0.3, 0.0, 1.0),
//!     &config,
//!     None,
//! )?;
//! assert_eq!(out.variances().len(), 3);
//! # Ok::<(), amp_core::AmpError>(())
//! ```
//!
//! ## Features
//!
//! `serde` derives serialization for configuration, priors and reports.
//! `parallel` spreads the per-variable denoising over the rayon pool.
//! `python-ffi` builds the PyO3 bindings of the `ffi` module.
//!
//! ## License
//!
//! Business Source License 1.1.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod config;
pub mod engine;
pub mod error;
pub mod operator;
pub mod permutation;
pub mod prior;
pub mod report;
pub mod scalar;
pub mod solver;
pub mod special;

#[cfg(feature = "python-ffi")]
pub mod ffi;

pub use config::{AmpConfig, MeanRemoval, Method, Storage};
pub use engine::{Amp, Phase};
pub use error::{AmpError, AmpResult};
pub use operator::{BlockLayout, DenseMatrix, DenseOperator, Fourier, Hadamard, Operator, SeededOperator};
pub use permutation::SeededTables;
pub use prior::{Denoiser, Evaluation, Posterior, Prior, PriorKind};
pub use report::{AmpReport, IterationRecord, Status};
pub use scalar::Scalar;
pub use solver::{solve, OperatorSpec, Reconstruction, Signal};

pub use num_complex::Complex64;
