/*
 * This source code is licensed under the Business Source License 1.1.
 * See LICENSE in the root directory for full details.
 */

//! The AMP iteration engine.
//!
//! # Recursion
//!
//! With `Δ` the noise variance, `a, v` the variable messages and `w, V` the
//! measurement messages, one pass computes
//!
//! ```text
//! V'  = |G|²·v
//! w'  = G·a − (y − w)·V' / (Δ + V)          (Δ + V' with alpha_big)
//! V, w ← dump_mes·(V, w) + (1 − dump_mes)·(V', w')
//! Σ²  = 1 / ((|G|²)ᵀ · 1/(Δ + V))
//! R   = a + Σ² · Gᴴ·((y − w)/(Δ + V))
//! a', v' = denoise(R, Σ²)
//! a, v ← dump_mes·(a, v) + (1 − dump_mes)·(a', v')
//! ```
//!
//! `Method::Amp` replaces both squared products by `mean(|G|²)` times a sum.
//!
//! # Invariants
//!
//! - Each pass writes fresh buffers and commits them only when every value
//!   is finite; otherwise the previous state is kept and the phase becomes
//!   [`Phase::Diverged`].
//! - `v ≥ 0`, `Δ > 0` and `Δ + V > 0` for every committed state.
//! - The operator is only borrowed; nothing operator-sized is allocated
//!   inside a pass.

use core::ops::Range;

use tracing::{debug, info, warn};

use crate::config::AmpConfig;
use crate::error::{AmpError, AmpResult};
use crate::operator::Operator;
use crate::prior::{Denoiser, Evaluation, Prior, MAX_HYPERPARAMETERS};
use crate::report::{AmpReport, IterationRecord, Status};
use crate::scalar::{map_indexed, mean_squared_distance, Scalar};

/// Smallest noise variance noise learning may produce.
pub const NOISE_FLOOR: f64 = 1e-300;

/// Lifecycle of a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Phase {
    /// Starting messages are set; no pass has run.
    Initializing,
    /// At least one pass ran and no stopping rule fired.
    Iterating,
    /// The estimate stopped moving.
    Converged,
    /// The iteration cap was reached.
    MaxIterReached,
    /// A pass produced a non-finite value; the last valid state is kept.
    Diverged,
}

impl Phase {
    /// Whether no further pass will run.
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Converged | Phase::MaxIterReached | Phase::Diverged)
    }
}

/// One candidate pass, committed only if every value is finite.
struct Pass<T> {
    w: Vec<T>,
    big_v: Vec<f64>,
    a: Vec<T>,
    v: Vec<f64>,
    gradient: Option<[f64; MAX_HYPERPARAMETERS]>,
}

/// AMP engine over operator `O` with messages of type `T`.
pub struct Amp<'op, T: Scalar, O: Operator<T> + ?Sized> {
    op: &'op O,
    y: Vec<T>,
    prior: Prior,
    config: AmpConfig,
    reference: Option<Vec<T>>,
    blocks: Vec<Range<usize>>,
    mean_square: f64,
    a: Vec<T>,
    v: Vec<f64>,
    w: Vec<T>,
    big_v: Vec<f64>,
    noise: Vec<f64>,
    iteration: usize,
    phase: Phase,
    history: Vec<IterationRecord>,
    divergence: Option<AmpError>,
}

impl<'op, T, O> Amp<'op, T, O>
where
    T: Scalar,
    O: Operator<T> + ?Sized,
    Prior: Denoiser<T>,
{
    /// Validate the inputs and set the starting messages.
    ///
    /// `config.signal_rho`, when set, replaces the prior's density.
    pub fn new(op: &'op O, y: Vec<T>, mut prior: Prior, config: &AmpConfig) -> AmpResult<Self> {
        config.validate()?;
        if config.method.is_complex() != T::IS_COMPLEX {
            return Err(AmpError::config(format!(
                "method {} does not match {} messages",
                config.method,
                if T::IS_COMPLEX { "complex" } else { "real" }
            )));
        }
        AmpError::check_len("measurements", op.rows(), y.len())?;
        if let Some(rho) = config.signal_rho {
            if prior.kind.uses_rho() {
                prior.rho = rho;
            }
        }
        prior.validate()?;
        if prior.is_complex() && !T::IS_COMPLEX {
            return Err(AmpError::config("the Complex prior needs complex messages"));
        }

        let (m, n) = (op.rows(), op.cols());
        let coverage = op.transpose_squared(&vec![1.0; m]);
        if let Some(col) = coverage.iter().position(|&s| !(s > 0.0 && s.is_finite())) {
            return Err(AmpError::config(format!("operator column {col} is zero or not finite")));
        }
        if y.iter().any(|v| !v.is_finite()) {
            return Err(AmpError::config("measurements must be finite"));
        }

        let start = Denoiser::<T>::moments(&prior);
        let a = vec![start.mean; n];
        let v = vec![start.var; n];
        let mean_square = op.mean_square();
        let blocks = op.row_blocks();

        let mut engine = Self {
            op,
            w: y.clone(),
            y,
            prior,
            config: config.clone(),
            reference: None,
            blocks,
            mean_square,
            a,
            v,
            big_v: Vec::new(),
            noise: vec![config.var_noise; m],
            iteration: 0,
            phase: Phase::Initializing,
            history: Vec::new(),
            divergence: None,
        };
        engine.big_v = engine.measurement_variance(&engine.v);
        debug!(
            method = %engine.config.method,
            rows = m,
            cols = n,
            prior = engine.prior.kind.name(),
            rho = engine.prior.rho,
            noise_blocks = engine.blocks.len(),
            "amp initialised"
        );
        Ok(engine)
    }

    /// Track the mean squared error against `reference` at every iteration.
    pub fn with_reference(mut self, reference: Vec<T>) -> AmpResult<Self> {
        AmpError::check_len("reference signal", self.op.cols(), reference.len())?;
        self.reference = Some(reference);
        Ok(self)
    }

    // ─── Accessors ─────────────────────────────────────────────────────────

    /// Current lifecycle phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Passes run so far.
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// Posterior means of the last committed state.
    pub fn estimate(&self) -> &[T] {
        &self.a
    }

    /// Posterior variances of the last committed state.
    pub fn variances(&self) -> &[f64] {
        &self.v
    }

    /// Noise variance of every measurement.
    pub fn noise(&self) -> &[f64] {
        &self.noise
    }

    /// Prior with its current hyperparameters.
    pub fn prior(&self) -> &Prior {
        &self.prior
    }

    /// Per-iteration diagnostics so far.
    pub fn history(&self) -> &[IterationRecord] {
        &self.history
    }

    /// Mean squared error of the current estimate, when a reference is set.
    pub fn mse(&self) -> Option<f64> {
        self.reference.as_ref().map(|r| mean_squared_distance(&self.a, r))
    }

    // ─── Driving ───────────────────────────────────────────────────────────

    /// Run one damped pass and return the resulting phase.
    ///
    /// A terminal phase is returned unchanged; a diverged engine keeps
    /// returning its divergence error.
    pub fn step(&mut self) -> AmpResult<Phase> {
        match self.phase {
            Phase::Converged | Phase::MaxIterReached => return Ok(self.phase),
            Phase::Diverged => {
                return Err(self.divergence.clone().unwrap_or(AmpError::NumericDivergence {
                    iteration: self.iteration + 1,
                    last_valid: self.iteration,
                    quantity: "state",
                    last_state: None,
                }))
            }
            Phase::Initializing | Phase::Iterating => {}
        }

        let pass = self.compute_pass();
        if let Some(quantity) = Self::first_non_finite(&pass) {
            let err = AmpError::NumericDivergence {
                iteration: self.iteration + 1,
                last_valid: self.iteration,
                quantity,
                last_state: None,
            };
            warn!(iteration = self.iteration + 1, quantity, "amp diverged; keeping last valid state");
            self.phase = Phase::Diverged;
            self.divergence = Some(err.clone());
            return Err(err);
        }

        let change = mean_squared_distance(&pass.a, &self.a);
        self.w = pass.w;
        self.big_v = pass.big_v;
        self.a = pass.a;
        self.v = pass.v;
        self.iteration += 1;

        if let Some(gradient) = pass.gradient {
            let k = self.prior.kind.learnable().len();
            self.prior.apply_gradient(&gradient[..k], self.config.dump_learn);
        }
        if self.config.learn && self.config.option_noise {
            self.learn_noise();
        }

        let record = IterationRecord {
            iteration: self.iteration,
            change,
            mse: self.mse(),
            rho: self.prior.rho,
            noise: self.noise.iter().sum::<f64>() / self.noise.len() as f64,
        };
        self.history.push(record);
        if self.config.print > 0 && self.iteration % self.config.print == 0 {
            info!(
                iteration = record.iteration,
                change = record.change,
                mse = record.mse,
                rho = record.rho,
                noise = record.noise,
                "amp progress"
            );
        }

        self.phase = if change < self.config.conv {
            debug!(iteration = self.iteration, change, "amp converged");
            Phase::Converged
        } else if self.iteration >= self.config.nb_iter {
            warn!(iteration = self.iteration, change, "amp hit the iteration cap without converging");
            Phase::MaxIterReached
        } else {
            Phase::Iterating
        };
        Ok(self.phase)
    }

    /// Iterate to a terminal phase and report.
    pub fn run(&mut self) -> AmpResult<AmpReport<T>> {
        while !self.step()?.is_terminal() {}
        Ok(self.report())
    }

    /// Snapshot of the current state as a report.
    ///
    /// The status follows the phase: a diverged engine reports
    /// [`Status::Diverged`] with its last valid state, one that has not
    /// stopped yet reports [`Status::Running`].
    pub fn report(&self) -> AmpReport<T> {
        AmpReport {
            estimate: self.a.clone(),
            variances: self.v.clone(),
            prior: self.prior.clone(),
            rho: self.prior.rho,
            noise: self.noise.clone(),
            mse: self.mse(),
            history: self.history.clone(),
            iterations: self.iteration,
            status: match self.phase {
                Phase::Converged => Status::Converged,
                Phase::MaxIterReached => Status::MaxIterReached,
                Phase::Diverged => Status::Diverged,
                Phase::Initializing | Phase::Iterating => Status::Running,
            },
        }
    }

    // ─── Pass ──────────────────────────────────────────────────────────────

    fn measurement_variance(&self, v: &[f64]) -> Vec<f64> {
        if self.config.method.uniform_variance() {
            let total: f64 = v.iter().sum();
            vec![self.mean_square * total; self.op.rows()]
        } else {
            self.op.forward_squared(v)
        }
    }

    fn compute_pass(&self) -> Pass<T> {
        let damp = self.config.dump_mes;
        let keep = 1.0 - damp;
        let m = self.op.rows();

        // Measurement side.
        let fresh_v = self.measurement_variance(&self.v);
        let ga = self.op.forward(&self.a);
        let mut w = Vec::with_capacity(m);
        let mut big_v = Vec::with_capacity(m);
        for mu in 0..m {
            let old_v = self.big_v[mu];
            let denom = self.noise[mu] + if self.config.alpha_big { fresh_v[mu] } else { old_v };
            let onsager = (self.y[mu] - self.w[mu]).scale(fresh_v[mu] / denom);
            let fresh_w = ga[mu] - onsager;
            w.push(self.w[mu].scale(damp) + fresh_w.scale(keep));
            big_v.push(damp * old_v + keep * fresh_v[mu]);
        }

        // Variable side.
        let inv: Vec<f64> = big_v.iter().zip(&self.noise).map(|(&bv, &d)| 1.0 / (d + bv)).collect();
        let residual: Vec<T> = (0..m).map(|mu| (self.y[mu] - w[mu]).scale(inv[mu])).collect();
        let precision = if self.config.method.uniform_variance() {
            vec![self.mean_square * inv.iter().sum::<f64>(); self.op.cols()]
        } else {
            self.op.transpose_squared(&inv)
        };
        let back = self.op.transpose(&residual);

        let prior = &self.prior;
        let evaluations: Vec<Evaluation<T>> = map_indexed(self.op.cols(), |i| {
            let s2 = 1.0 / precision[i];
            let r = self.a[i] + back[i].scale(s2);
            Denoiser::<T>::evaluate(prior, r, s2)
        });

        let mut a = Vec::with_capacity(evaluations.len());
        let mut v = Vec::with_capacity(evaluations.len());
        let learnable = prior.kind.learnable().len();
        let mut gradient = [0.0; MAX_HYPERPARAMETERS];
        for (i, e) in evaluations.iter().enumerate() {
            a.push(self.a[i].scale(damp) + e.posterior.mean.scale(keep));
            v.push(damp * self.v[i] + keep * e.posterior.var);
            for (g, &d) in gradient.iter_mut().zip(e.gradient.iter()) {
                *g += d;
            }
        }
        let n = evaluations.len() as f64;
        for g in gradient.iter_mut() {
            *g /= n;
        }
        let learn = self.config.learn && learnable > 0;

        Pass { w, big_v, a, v, gradient: learn.then_some(gradient) }
    }

    fn first_non_finite(pass: &Pass<T>) -> Option<&'static str> {
        if !pass.big_v.iter().all(|x| x.is_finite() && *x >= 0.0) {
            return Some("measurement variance");
        }
        if !pass.w.iter().all(|x| x.is_finite()) {
            return Some("measurement residual");
        }
        if !pass.a.iter().all(|x| x.is_finite()) {
            return Some("estimate");
        }
        if !pass.v.iter().all(|x| x.is_finite() && *x >= 0.0) {
            return Some("variance");
        }
        if let Some(g) = &pass.gradient {
            if !g.iter().all(|x| x.is_finite()) {
                return Some("hyperparameter gradient");
            }
        }
        None
    }

    // ─── Noise learning ────────────────────────────────────────────────────

    /// `Δ ← Σ|y − w|²/(1 + V/Δ)² / Σ 1/(1 + V/Δ)` per row block, damped.
    fn learn_noise(&mut self) {
        let damp = self.config.dump_learn;
        for block in &self.blocks {
            let delta = self.noise[block.start];
            let (mut num, mut den) = (0.0, 0.0);
            for mu in block.clone() {
                let f = 1.0 / (1.0 + self.big_v[mu] / delta);
                num += (self.y[mu] - self.w[mu]).norm_sqr() * f * f;
                den += f;
            }
            if den > 0.0 && num.is_finite() {
                let learned = (damp * delta + (1.0 - damp) * num / den).max(NOISE_FLOOR);
                self.noise[block.clone()].fill(learned);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use num_complex::Complex64;

    use super::*;
    use crate::config::{Method, Storage};
    use crate::operator::{DenseMatrix, DenseOperator};

    fn identity_like(n: usize) -> DenseOperator<f64> {
        let mut m = DenseMatrix::zeros(n, n);
        for i in 0..n {
            m.set(i, i, 1.0);
        }
        DenseOperator::new(m, Storage::SaveSpeed)
    }

    #[test]
    fn test_first_pass_by_hand() {
        // G = I, dense prior N(0, 2), Δ = 0.5, undamped. Starting from a = 0,
        // v = 2 the first pass sees w = 0, V = 2, so Σ² = 2.5 and R = y.
        let op = identity_like(3);
        let config = AmpConfig { dump_mes: 0.0, var_noise: 0.5, print: 0, ..AmpConfig::default() };
        let y = vec![1.0, -2.0, 0.5];
        let mut amp = Amp::new(&op, y.clone(), Prior::sparse_gauss(1.0, 0.0, 2.0), &config).unwrap();
        assert_eq!(amp.phase(), Phase::Initializing);
        assert_eq!(amp.step().unwrap(), Phase::Iterating);
        assert_eq!(amp.report().status, Status::Running);
        for (a, yi) in amp.estimate().iter().zip(&y) {
            assert_relative_eq!(*a, yi * 2.0 / 4.5, epsilon = 1e-12);
        }
        for v in amp.variances() {
            assert_relative_eq!(*v, 2.0 * 2.5 / 4.5, epsilon = 1e-12);
        }
        assert_eq!(amp.history().len(), 1);
    }

    #[test]
    fn test_cap_is_reported_not_raised() {
        let op = identity_like(4);
        let config = AmpConfig { nb_iter: 2, conv: 1e-300, print: 1, ..AmpConfig::default() };
        let mut amp = Amp::new(&op, vec![1.0, 0.0, 0.0, 2.0], Prior::sparse_gauss(0.5, 0.0, 1.0), &config).unwrap();
        let report = amp.run().unwrap();
        assert_eq!(report.status, Status::MaxIterReached);
        assert_eq!(report.iterations, 2);
        assert_eq!(report.history.len(), 2);
        assert_eq!(amp.step().unwrap(), Phase::MaxIterReached);
    }

    #[test]
    fn test_divergence_keeps_last_valid_state() {
        let op = identity_like(2);
        let config = AmpConfig { print: 0, ..AmpConfig::default() };
        let mut amp = Amp::new(&op, vec![1.0, 1.0], Prior::sparse_gauss(0.5, 0.0, 1.0), &config).unwrap();
        amp.step().unwrap();
        let before = amp.estimate().to_vec();
        amp.y[0] = f64::NAN;
        let err = amp.step().unwrap_err();
        assert!(matches!(err, AmpError::NumericDivergence { iteration: 2, last_valid: 1, .. }), "{err}");
        assert_eq!(amp.phase(), Phase::Diverged);
        assert_eq!(amp.estimate(), &before[..]);
        assert!(amp.step().is_err());
        let report = amp.report();
        assert_eq!(report.status, Status::Diverged);
        assert_eq!(report.estimate, before);
        assert_eq!(report.iterations, 1);
    }

    #[test]
    fn test_rejects_mismatched_inputs() {
        let op = identity_like(3);
        let config = AmpConfig::default();
        let prior = Prior::sparse_gauss(0.5, 0.0, 1.0);
        assert!(matches!(Amp::new(&op, vec![1.0; 2], prior.clone(), &config), Err(AmpError::DimensionMismatch { .. })));
        let complex_method = AmpConfig::with_method(Method::AmpComplex);
        assert!(Amp::new(&op, vec![1.0; 3], prior.clone(), &complex_method).is_err());
        let complex_kind = crate::prior::PriorKind::Complex { mean: Complex64::new(0.0, 0.0), var: 1.0 };
        let complex_prior = Prior::new(0.5, complex_kind);
        assert!(Amp::new(&op, vec![1.0; 3], complex_prior, &config).is_err());
        let amp = Amp::new(&op, vec![1.0; 3], prior, &config).unwrap();
        assert!(amp.with_reference(vec![0.0; 4]).is_err());
    }

    #[test]
    fn test_zero_column_is_rejected() {
        let m = DenseMatrix::from_rows(&[vec![1.0, 0.0], vec![2.0, 0.0]]).unwrap();
        let op = DenseOperator::new(m, Storage::SaveMemory);
        let config = AmpConfig { save_memory: true, save_speed: false, ..AmpConfig::default() };
        assert!(Amp::new(&op, vec![1.0, 2.0], Prior::sparse_gauss(0.5, 0.0, 1.0), &config).is_err());
    }

    #[test]
    fn test_signal_rho_overrides_prior() {
        let op = identity_like(2);
        let config = AmpConfig { signal_rho: Some(0.05), ..AmpConfig::default() };
        let amp = Amp::new(&op, vec![0.0, 0.0], Prior::sparse_gauss(0.5, 0.0, 1.0), &config).unwrap();
        assert_eq!(amp.prior().rho, 0.05);
    }

    #[test]
    fn test_noise_update_by_hand() {
        let op = identity_like(2);
        let config = AmpConfig { learn: true, option_noise: true, var_noise: 1.0, print: 0, ..AmpConfig::default() };
        let mut amp = Amp::new(&op, vec![3.0, 1.0], Prior::sparse_gauss(0.5, 0.0, 1.0), &config).unwrap();
        amp.w = vec![1.0, 1.0];
        amp.big_v = vec![1.0, 3.0];
        amp.learn_noise();
        // f = [1/2, 1/4]: Σ|y − w|² f² = 4/4 = 1, Σ f = 3/4.
        assert_relative_eq!(amp.noise()[0], 4.0 / 3.0, epsilon = 1e-12);
        assert_eq!(amp.noise()[0], amp.noise()[1]);
    }
}
