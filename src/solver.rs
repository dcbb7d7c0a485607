//! One-call entry point: pick the engine for a method and run it.
//!
//! [`solve`] checks that the method, the operator specification and the
//! measurement kind agree, builds the operator (dense with the configured
//! storage, or seeded with the transform the method names), applies mean
//! removal for dense operators, and runs [`Amp`] to a terminal phase.
//!
//! | Method | Operator | Measurements |
//! |--------|----------|--------------|
//! | `AMP`, `AMPtap` | [`OperatorSpec::Dense`] | [`Signal::Real`] |
//! | `AMPcomplex` | [`OperatorSpec::DenseComplex`] | [`Signal::Complex`] |
//! | `AMPseededHadamard` | [`OperatorSpec::Seeded`] | [`Signal::Real`] |
//! | `AMPseededFourier` | [`OperatorSpec::Seeded`] | [`Signal::Complex`] |

use num_complex::Complex64;
use tracing::debug;

use crate::config::{AmpConfig, Method};
use crate::engine::Amp;
use crate::error::{AmpError, AmpResult};
use crate::operator::{center, BlockLayout, DenseMatrix, DenseOperator, Fourier, Hadamard, Operator, SeededOperator};
use crate::prior::{Denoiser, Prior};
use crate::report::{AmpReport, IterationRecord, Status};
use crate::scalar::Scalar;

/// A real or complex vector: measurements or a reference signal.
#[derive(Clone, Debug, PartialEq)]
pub enum Signal {
    /// Real entries.
    Real(Vec<f64>),
    /// Complex entries.
    Complex(Vec<Complex64>),
}

impl Signal {
    /// Number of entries.
    pub fn len(&self) -> usize {
        match self {
            Signal::Real(v) => v.len(),
            Signal::Complex(v) => v.len(),
        }
    }

    /// Whether the vector is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn into_real(self, what: &str) -> AmpResult<Vec<f64>> {
        match self {
            Signal::Real(v) => Ok(v),
            Signal::Complex(_) => Err(AmpError::config(format!("{what} must be real for this method"))),
        }
    }

    fn into_complex(self, what: &str) -> AmpResult<Vec<Complex64>> {
        match self {
            Signal::Complex(v) => Ok(v),
            Signal::Real(_) => Err(AmpError::config(format!("{what} must be complex for this method"))),
        }
    }
}

/// How the measurement operator is given.
#[derive(Clone, Debug)]
pub enum OperatorSpec {
    /// Explicit real matrix.
    Dense(DenseMatrix<f64>),
    /// Explicit complex matrix.
    DenseComplex(DenseMatrix<Complex64>),
    /// Seeded structured operator; the transform follows from the method.
    Seeded {
        /// Block sizes and coupling strengths.
        layout: BlockLayout,
        /// Seed of the sign and mode tables.
        seed: u64,
    },
}

impl OperatorSpec {
    fn kind(&self) -> &'static str {
        match self {
            OperatorSpec::Dense(_) => "dense real",
            OperatorSpec::DenseComplex(_) => "dense complex",
            OperatorSpec::Seeded { .. } => "seeded",
        }
    }
}

/// Report of a real or complex run.
#[derive(Clone, Debug, PartialEq)]
pub enum Reconstruction {
    /// From a real-message method.
    Real(AmpReport<f64>),
    /// From a complex-message method.
    Complex(AmpReport<Complex64>),
}

impl Reconstruction {
    /// The real report, if the run used real messages.
    pub fn as_real(&self) -> Option<&AmpReport<f64>> {
        match self {
            Reconstruction::Real(r) => Some(r),
            Reconstruction::Complex(_) => None,
        }
    }

    /// The complex report, if the run used complex messages.
    pub fn as_complex(&self) -> Option<&AmpReport<Complex64>> {
        match self {
            Reconstruction::Complex(r) => Some(r),
            Reconstruction::Real(_) => None,
        }
    }

    /// How the run ended.
    pub fn status(&self) -> Status {
        match self {
            Reconstruction::Real(r) => r.status,
            Reconstruction::Complex(r) => r.status,
        }
    }

    /// Learned prior.
    pub fn prior(&self) -> &Prior {
        match self {
            Reconstruction::Real(r) => &r.prior,
            Reconstruction::Complex(r) => &r.prior,
        }
    }

    /// Posterior variances.
    pub fn variances(&self) -> &[f64] {
        match self {
            Reconstruction::Real(r) => &r.variances,
            Reconstruction::Complex(r) => &r.variances,
        }
    }

    /// Noise variance per measurement.
    pub fn noise(&self) -> &[f64] {
        match self {
            Reconstruction::Real(r) => &r.noise,
            Reconstruction::Complex(r) => &r.noise,
        }
    }

    /// Final MSE against the reference, when one was given.
    pub fn mse(&self) -> Option<f64> {
        match self {
            Reconstruction::Real(r) => r.mse,
            Reconstruction::Complex(r) => r.mse,
        }
    }

    /// Per-iteration diagnostics.
    pub fn history(&self) -> &[IterationRecord] {
        match self {
            Reconstruction::Real(r) => &r.history,
            Reconstruction::Complex(r) => &r.history,
        }
    }
}

/// Validate, build the operator for `config.method` and run to completion.
///
/// On [`AmpError::NumericDivergence`] the error carries the report of the
/// last valid iteration, reachable through [`AmpError::last_state`].
pub fn solve(
    y: Signal,
    operator: OperatorSpec,
    prior: Prior,
    config: &AmpConfig,
    reference: Option<Signal>,
) -> AmpResult<Reconstruction> {
    config.validate()?;
    let storage = config.storage()?;
    let method = config.method;
    debug!(method = %method, operator = operator.kind(), measurements = y.len(), "solve");

    match (method, operator) {
        (Method::Amp | Method::AmpTap, OperatorSpec::Dense(matrix)) => {
            let (matrix, y) = center(&matrix, &y.into_real("measurements")?, config.remove_mean)?;
            let op = DenseOperator::new(matrix, storage);
            let reference = reference.map(|r| r.into_real("reference")).transpose()?;
            run(&op, y, prior, config, reference, Reconstruction::Real)
        }
        (Method::AmpComplex, OperatorSpec::DenseComplex(matrix)) => {
            let (matrix, y) = center(&matrix, &y.into_complex("measurements")?, config.remove_mean)?;
            let op = DenseOperator::new(matrix, storage);
            let reference = reference.map(|r| r.into_complex("reference")).transpose()?;
            run(&op, y, prior, config, reference, Reconstruction::Complex)
        }
        (Method::AmpSeededHadamard, OperatorSpec::Seeded { layout, seed }) => {
            let op = SeededOperator::<Hadamard>::new(layout, seed)?;
            let reference = reference.map(|r| r.into_real("reference")).transpose()?;
            run(&op, y.into_real("measurements")?, prior, config, reference, Reconstruction::Real)
        }
        (Method::AmpSeededFourier, OperatorSpec::Seeded { layout, seed }) => {
            let op = SeededOperator::<Fourier>::new(layout, seed)?;
            let reference = reference.map(|r| r.into_complex("reference")).transpose()?;
            run(&op, y.into_complex("measurements")?, prior, config, reference, Reconstruction::Complex)
        }
        (method, operator) => Err(AmpError::config(format!(
            "method {method} cannot run on a {} operator",
            operator.kind()
        ))),
    }
}

fn run<T, O>(
    op: &O,
    y: Vec<T>,
    prior: Prior,
    config: &AmpConfig,
    reference: Option<Vec<T>>,
    wrap: fn(AmpReport<T>) -> Reconstruction,
) -> AmpResult<Reconstruction>
where
    T: Scalar,
    O: Operator<T> + ?Sized,
    Prior: Denoiser<T>,
{
    let mut amp = Amp::new(op, y, prior, config)?;
    if let Some(reference) = reference {
        amp = amp.with_reference(reference)?;
    }
    match amp.run() {
        Ok(report) => Ok(wrap(report)),
        Err(err) => Err(err.with_last_state(wrap(amp.report()))),
    }
}
