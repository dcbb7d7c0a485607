//! Error taxonomy for the AMP engine.
//!
//! Configuration problems (invalid option combinations, out-of-domain prior
//! hyperparameters, mismatched dimensions) are reported before any iteration
//! runs. Numeric divergence terminates a run; through [`crate::solve`] it
//! carries the last valid state. Hitting the iteration cap is not an error;
//! it is reported through [`crate::report::Status`].

use thiserror::Error;

use crate::solver::Reconstruction;

/// Result alias used throughout the crate.
pub type AmpResult<T> = Result<T, AmpError>;

/// Errors raised while configuring or running the AMP engine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AmpError {
    /// Mutually exclusive or otherwise invalid option combination.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A prior hyperparameter lies outside its domain.
    #[error("invalid hyperparameter `{name}` = {value} for prior {prior}: {reason}")]
    InvalidHyperparameter {
        /// Prior kind name, e.g. `SparseGauss`.
        prior: &'static str,
        /// Hyperparameter name.
        name: &'static str,
        /// Offending value.
        value: f64,
        /// Which constraint was violated.
        reason: &'static str,
    },

    /// Operator, measurement or block dimensions do not agree.
    #[error("dimension mismatch in {what}: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// What was being checked.
        what: &'static str,
        /// Expected length.
        expected: usize,
        /// Length found.
        actual: usize,
    },

    /// A NaN or infinity appeared in the message state.
    ///
    /// The engine keeps the state of `last_valid` and refuses further steps.
    #[error("numeric divergence at iteration {iteration}: {quantity} became non-finite (last valid iteration {last_valid})")]
    NumericDivergence {
        /// Iteration whose update produced the non-finite value.
        iteration: usize,
        /// Last iteration whose state was committed.
        last_valid: usize,
        /// Which message family diverged.
        quantity: &'static str,
        /// Report of iteration `last_valid`, with [`crate::Status::Diverged`].
        /// Filled in by [`crate::solve`]; `None` straight from the engine.
        last_state: Option<Box<Reconstruction>>,
    },
}

impl AmpError {
    /// `true` for every error raised before iteration starts.
    pub fn is_configuration(&self) -> bool {
        !matches!(self, AmpError::NumericDivergence { .. })
    }

    /// The last valid state of a diverged run, when one was attached.
    pub fn last_state(&self) -> Option<&Reconstruction> {
        match self {
            AmpError::NumericDivergence { last_state, .. } => last_state.as_deref(),
            _ => None,
        }
    }

    pub(crate) fn with_last_state(mut self, state: Reconstruction) -> Self {
        if let AmpError::NumericDivergence { last_state, .. } = &mut self {
            *last_state = Some(Box::new(state));
        }
        self
    }

    pub(crate) fn config(msg: impl Into<String>) -> Self {
        AmpError::Configuration(msg.into())
    }

    pub(crate) fn check_len(what: &'static str, expected: usize, actual: usize) -> AmpResult<()> {
        if expected == actual {
            Ok(())
        } else {
            Err(AmpError::DimensionMismatch { what, expected, actual })
        }
    }
}
