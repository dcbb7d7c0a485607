//! Results handed back to the caller.

use crate::prior::Prior;
use crate::scalar::Scalar;

/// How a run ended, or where a snapshot of a live run stands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Status {
    /// The mean squared change of the estimate fell below `conv`.
    Converged,
    /// `nb_iter` passes ran without meeting the threshold. Not an error.
    MaxIterReached,
    /// The next pass went non-finite; the report holds the last valid state.
    Diverged,
    /// Snapshot taken before any stopping rule fired.
    Running,
}

/// Diagnostics of one iteration.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IterationRecord {
    /// 1-based iteration number.
    pub iteration: usize,
    /// `(1/N)·Σ|a_new − a_old|²`.
    pub change: f64,
    /// Mean squared error against the reference signal, when one was given.
    pub mse: Option<f64>,
    /// Prior density after this iteration.
    pub rho: f64,
    /// Mean noise variance after this iteration.
    pub noise: f64,
}

/// Final state of a run.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AmpReport<T> {
    /// Posterior means, length `N`.
    pub estimate: Vec<T>,
    /// Posterior variances, length `N`.
    pub variances: Vec<f64>,
    /// Prior with its (possibly learned) hyperparameters.
    pub prior: Prior,
    /// Estimated density.
    pub rho: f64,
    /// Noise variance of every measurement, length `M`.
    pub noise: Vec<f64>,
    /// Final mean squared error against the reference, when one was given.
    pub mse: Option<f64>,
    /// One record per iteration, for plotting.
    pub history: Vec<IterationRecord>,
    /// Number of passes run.
    pub iterations: usize,
    /// Convergence flag.
    pub status: Status,
}

impl<T: Scalar> AmpReport<T> {
    /// Whether the run met its convergence threshold.
    pub fn converged(&self) -> bool {
        self.status == Status::Converged
    }

    /// The MSE curve, one value per iteration that had a reference.
    pub fn mse_curve(&self) -> Vec<f64> {
        self.history.iter().filter_map(|r| r.mse).collect()
    }
}
