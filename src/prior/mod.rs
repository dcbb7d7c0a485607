/*
 * This source code is licensed under the Business Source License 1.1.
 * See LICENSE in the root directory for full details.
 */

//! Prior descriptors and their scalar denoisers.
//!
//! A [`Prior`] pairs a density `rho` with one closed [`PriorKind`]. Given the
//! cavity statistics `(R, Σ²)` that AMP hands a single variable, the prior's
//! [`Denoiser`] returns the posterior mean and variance of
//!
//! ```text
//! p(x | R, Σ²) ∝ P₀(x) · N(x; R, Σ²)
//! ```
//!
//! and, for learning, the gradient of `ln Z(R, Σ²)` with respect to each
//! learnable hyperparameter.
//!
//! # Invariants
//!
//! - Posterior variances are never negative.
//! - As `Σ² → ∞` every denoiser returns the prior's own mean and variance
//!   ([`Denoiser::moments`]).
//! - Mixture weights are combined in the log domain; no exponential of an
//!   unnormalised log weight is ever formed.

mod binary;
mod gaussian;
mod truncated;

use num_complex::Complex64;

use crate::error::{AmpError, AmpResult};
use crate::scalar::Scalar;

/// Maximum number of learnable hyperparameters of any prior (rho + 4).
pub const MAX_HYPERPARAMETERS: usize = 5;

/// Smallest density a learning step may produce.
pub const RHO_FLOOR: f64 = 1e-12;

/// Smallest variance-like hyperparameter a learning step may produce.
pub const VAR_FLOOR: f64 = 1e-30;

/// Default density `M/(10N)` of a problem with `rows` measurements and
/// `cols` unknowns, capped at 1.
pub fn default_rho(rows: usize, cols: usize) -> f64 {
    (rows as f64 / (10.0 * cols.max(1) as f64)).min(1.0)
}

/// Gradient of `ln Z` with respect to the learnable hyperparameters, in the
/// order given by [`PriorKind::learnable`].
pub type Gradient = heapless::Vec<f64, MAX_HYPERPARAMETERS>;

pub(crate) fn gradient_of(values: &[f64]) -> Gradient {
    let mut g = Gradient::new();
    for &v in values.iter().take(MAX_HYPERPARAMETERS) {
        let _ = g.push(v);
    }
    g
}

// ─── Posterior ──────────────────────────────────────────────────────────────

/// First two posterior moments of one variable.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Posterior<T> {
    /// Posterior mean.
    pub mean: T,
    /// Posterior variance (`E|x − mean|²`).
    pub var: f64,
}

/// Posterior moments together with the hyperparameter gradient.
#[derive(Clone, Debug, PartialEq)]
pub struct Evaluation<T> {
    /// Posterior moments.
    pub posterior: Posterior<T>,
    /// `∂ ln Z / ∂θ` for each learnable hyperparameter.
    pub gradient: Gradient,
}

// ─── Denoiser ───────────────────────────────────────────────────────────────

/// Scalar denoising capability shared by every prior kind.
pub trait Denoiser<T: Scalar> {
    /// Posterior moments and log-partition gradient for cavity `(r, s2)`.
    fn evaluate(&self, r: T, s2: f64) -> Evaluation<T>;

    /// Unconditional mean and variance of the prior.
    fn moments(&self) -> Posterior<T>;

    /// Posterior mean and variance for cavity `(r, s2)`.
    fn denoise(&self, r: T, s2: f64) -> Posterior<T> {
        self.evaluate(r, s2).posterior
    }

    /// `∂ ln Z / ∂θ` for cavity `(r, s2)`.
    fn gradient(&self, r: T, s2: f64) -> Gradient {
        self.evaluate(r, s2).gradient
    }
}

// ─── PriorKind ──────────────────────────────────────────────────────────────

/// The supported prior families and their variant-specific hyperparameters.
///
/// "Sparse" kinds mix a point mass at zero (weight `1 − rho`) with the named
/// active component (weight `rho`).
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PriorKind {
    /// Active component `N(mean, var)`.
    SparseGauss {
        /// Mean of the Gaussian component.
        mean: f64,
        /// Variance of the Gaussian component.
        var: f64,
    },
    /// Active component `N(mean, var)` truncated to `[min, max]`.
    SparseGaussCut {
        /// Mean of the untruncated Gaussian.
        mean: f64,
        /// Variance of the untruncated Gaussian.
        var: f64,
        /// Lower bound (may be `-inf`).
        min: f64,
        /// Upper bound (may be `+inf`).
        max: f64,
    },
    /// Active component `N(mean, var)` truncated to `[0, ∞)`.
    SparseGaussPositive {
        /// Mean of the untruncated Gaussian.
        mean: f64,
        /// Variance of the untruncated Gaussian.
        var: f64,
    },
    /// `(1 − rho)·N(mean1, var1) + rho·N(mean2, var2)`.
    TwoGauss {
        /// Mean of the first component.
        mean1: f64,
        /// Variance of the first component.
        var1: f64,
        /// Mean of the second component.
        mean2: f64,
        /// Variance of the second component.
        var2: f64,
    },
    /// Active component is a point mass at one.
    SparseBinary,
    /// Active component `expo·exp(−expo·x)` on `x > 0`.
    SparseExponential {
        /// Rate of the exponential.
        expo: f64,
    },
    /// Active component uniform on `[c_down, c_up]`.
    SparseConstant {
        /// Lower end of the support.
        c_down: f64,
        /// Upper end of the support.
        c_up: f64,
    },
    /// `(beta/2)·exp(−beta·|x|)`; `rho` is not used.
    Laplace {
        /// Inverse scale.
        beta: f64,
    },
    /// Tempered L1 penalty on `[min, max]`: the posterior is
    /// `∝ exp(−beta·(|x| + (x − R)²/(2Σ²)))`, the soft threshold as `beta → ∞`.
    /// `rho` is not used.
    L1 {
        /// Inverse temperature.
        beta: f64,
        /// Lower bound (may be `-inf`).
        min: f64,
        /// Upper bound (may be `+inf`).
        max: f64,
    },
    /// `x ∈ {−1, +1}` with `P(x = +1) = rho`.
    Binary1,
    /// Active component circular complex Gaussian `CN(mean, var)`.
    Complex {
        /// Complex mean.
        mean: Complex64,
        /// Variance `E|x − mean|²`.
        var: f64,
    },
}

impl PriorKind {
    /// Canonical name of the kind, as accepted by [`PriorKind::from_name`].
    pub fn name(&self) -> &'static str {
        match self {
            PriorKind::SparseGauss { .. } => "SparseGauss",
            PriorKind::SparseGaussCut { .. } => "SparseGaussCut",
            PriorKind::SparseGaussPositive { .. } => "SparseGaussPositive",
            PriorKind::TwoGauss { .. } => "2Gauss",
            PriorKind::SparseBinary => "SparseBinary",
            PriorKind::SparseExponential { .. } => "SparseExponential",
            PriorKind::SparseConstant { .. } => "SparseConstant",
            PriorKind::Laplace { .. } => "Laplace",
            PriorKind::L1 { .. } => "L1",
            PriorKind::Binary1 => "Binary1",
            PriorKind::Complex { .. } => "Complex",
        }
    }

    /// Names of the hyperparameters updated by learning, in gradient order.
    pub fn learnable(&self) -> &'static [&'static str] {
        match self {
            PriorKind::SparseGauss { .. } => &["rho", "mean", "var"],
            PriorKind::TwoGauss { .. } => &["rho", "mean1", "mean2"],
            PriorKind::SparseExponential { .. } => &["rho", "expo"],
            PriorKind::Complex { .. } => &["rho", "var"],
            PriorKind::Laplace { .. } => &["beta"],
            PriorKind::L1 { .. } => &[],
            PriorKind::SparseGaussCut { .. }
            | PriorKind::SparseGaussPositive { .. }
            | PriorKind::SparseBinary
            | PriorKind::SparseConstant { .. }
            | PriorKind::Binary1 => &["rho"],
        }
    }

    /// Whether the kind has a density parameter.
    pub fn uses_rho(&self) -> bool {
        !matches!(self, PriorKind::Laplace { .. } | PriorKind::L1 { .. })
    }

    /// Build a prior from its canonical name and named hyperparameters.
    ///
    /// Missing hyperparameters take their per-kind defaults:
    ///
    /// | Kind | Defaults |
    /// |------|----------|
    /// | `SparseGauss`, `SparseGaussPositive` | `mean = 0`, `var = 1` |
    /// | `SparseGaussCut` | `mean = 0`, `var = 1`, `min = -1`, `max = 1` |
    /// | `2Gauss` | `mean1 = -1`, `var1 = 0.1`, `mean2 = 1`, `var2 = 0.1` |
    /// | `SparseExponential` | `expo = 1` |
    /// | `SparseConstant` | `c_down = 0`, `c_up = 1` |
    /// | `Laplace` | `beta = 1` |
    /// | `L1` | `beta = 1`, `min = -inf`, `max = +inf` |
    /// | `Complex` | `mean_re = 0`, `mean_im = 0`, `var = 1` |
    ///
    /// `rho` defaults to [`default_rho`] of the `rows × cols` problem the
    /// prior is meant for, or to 1 for kinds without a density. Unknown names
    /// and parameters are configuration errors; domains are checked by
    /// [`Prior::validate`].
    pub fn from_name(name: &str, params: &[(&str, f64)], rows: usize, cols: usize) -> AmpResult<Prior> {
        let allowed: &[&str] = match name {
            "SparseGauss" | "SparseGaussPositive" => &["mean", "var"],
            "SparseGaussCut" => &["mean", "var", "min", "max"],
            "2Gauss" => &["mean1", "var1", "mean2", "var2"],
            "SparseBinary" | "Binary1" => &[],
            "SparseExponential" => &["expo"],
            "SparseConstant" => &["c_down", "c_up"],
            "Laplace" => &["beta"],
            "L1" => &["beta", "min", "max"],
            "Complex" => &["mean_re", "mean_im", "var"],
            other => return Err(AmpError::config(format!("unknown prior `{other}`"))),
        };
        for (key, _) in params {
            if *key != "rho" && !allowed.contains(key) {
                return Err(AmpError::config(format!("prior {name} has no hyperparameter `{key}`")));
            }
        }
        let get = |key: &str, default: f64| {
            params.iter().rev().find(|(k, _)| *k == key).map_or(default, |(_, v)| *v)
        };

        let kind = match name {
            "SparseGauss" => PriorKind::SparseGauss { mean: get("mean", 0.0), var: get("var", 1.0) },
            "SparseGaussCut" => PriorKind::SparseGaussCut {
                mean: get("mean", 0.0),
                var: get("var", 1.0),
                min: get("min", -1.0),
                max: get("max", 1.0),
            },
            "SparseGaussPositive" => PriorKind::SparseGaussPositive { mean: get("mean", 0.0), var: get("var", 1.0) },
            "2Gauss" => PriorKind::TwoGauss {
                mean1: get("mean1", -1.0),
                var1: get("var1", 0.1),
                mean2: get("mean2", 1.0),
                var2: get("var2", 0.1),
            },
            "SparseBinary" => PriorKind::SparseBinary,
            "SparseExponential" => PriorKind::SparseExponential { expo: get("expo", 1.0) },
            "SparseConstant" => PriorKind::SparseConstant { c_down: get("c_down", 0.0), c_up: get("c_up", 1.0) },
            "Laplace" => PriorKind::Laplace { beta: get("beta", 1.0) },
            "L1" => PriorKind::L1 {
                beta: get("beta", 1.0),
                min: get("min", f64::NEG_INFINITY),
                max: get("max", f64::INFINITY),
            },
            "Binary1" => PriorKind::Binary1,
            _ => PriorKind::Complex {
                mean: Complex64::new(get("mean_re", 0.0), get("mean_im", 0.0)),
                var: get("var", 1.0),
            },
        };
        let rho = get("rho", if kind.uses_rho() { default_rho(rows, cols) } else { 1.0 });
        let prior = Prior::new(rho, kind);
        prior.validate()?;
        Ok(prior)
    }
}

// ─── Prior ──────────────────────────────────────────────────────────────────

/// A prior descriptor: density plus kind-specific hyperparameters.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Prior {
    /// Fraction of entries drawn from the active component.
    pub rho: f64,
    /// Prior family and its hyperparameters.
    pub kind: PriorKind,
}

impl Prior {
    /// Pair a density with a kind.
    pub fn new(rho: f64, kind: PriorKind) -> Self {
        Self { rho, kind }
    }

    /// Gauss-Bernoulli prior `(1 − rho)·δ(x) + rho·N(mean, var)`.
    pub fn sparse_gauss(rho: f64, mean: f64, var: f64) -> Self {
        Self::new(rho, PriorKind::SparseGauss { mean, var })
    }

    /// `kind` with the default density [`default_rho`] of a problem.
    pub fn for_problem(kind: PriorKind, rows: usize, cols: usize) -> Self {
        Self::new(default_rho(rows, cols), kind)
    }

    /// Check every hyperparameter against its domain.
    pub fn validate(&self) -> AmpResult<()> {
        let prior = self.kind.name();
        let bad = |name: &'static str, value: f64, reason: &'static str| {
            Err(AmpError::InvalidHyperparameter { prior, name, value, reason })
        };
        if !(self.rho > 0.0 && self.rho <= 1.0) {
            return bad("rho", self.rho, "must lie in (0, 1]");
        }
        let positive = |name: &'static str, value: f64| {
            if value > 0.0 && value.is_finite() {
                Ok(())
            } else {
                bad(name, value, "must be positive and finite")
            }
        };
        let finite = |name: &'static str, value: f64| {
            if value.is_finite() {
                Ok(())
            } else {
                bad(name, value, "must be finite")
            }
        };
        let ordered = |name: &'static str, lo: f64, hi: f64| {
            if lo < hi && !lo.is_nan() {
                Ok(())
            } else {
                bad(name, lo, "lower bound must be below upper bound")
            }
        };

        match self.kind {
            PriorKind::SparseGauss { mean, var } | PriorKind::SparseGaussPositive { mean, var } => {
                finite("mean", mean)?;
                positive("var", var)
            }
            PriorKind::SparseGaussCut { mean, var, min, max } => {
                finite("mean", mean)?;
                positive("var", var)?;
                ordered("min", min, max)
            }
            PriorKind::TwoGauss { mean1, var1, mean2, var2 } => {
                finite("mean1", mean1)?;
                positive("var1", var1)?;
                finite("mean2", mean2)?;
                positive("var2", var2)
            }
            PriorKind::SparseBinary | PriorKind::Binary1 => Ok(()),
            PriorKind::SparseExponential { expo } => positive("expo", expo),
            PriorKind::SparseConstant { c_down, c_up } => {
                finite("c_down", c_down)?;
                finite("c_up", c_up)?;
                ordered("c_down", c_down, c_up)
            }
            PriorKind::Laplace { beta } => positive("beta", beta),
            PriorKind::L1 { beta, min, max } => {
                positive("beta", beta)?;
                ordered("min", min, max)
            }
            PriorKind::Complex { mean, var } => {
                finite("mean_re", mean.re)?;
                finite("mean_im", mean.im)?;
                positive("var", var)
            }
        }
    }

    /// Whether the prior requires the complex message model.
    pub fn is_complex(&self) -> bool {
        matches!(self.kind, PriorKind::Complex { .. })
    }

    /// Current values of the learnable hyperparameters, in gradient order.
    pub fn learnable_values(&self) -> Gradient {
        match self.kind {
            PriorKind::SparseGauss { mean, var } => gradient_of(&[self.rho, mean, var]),
            PriorKind::TwoGauss { mean1, mean2, .. } => gradient_of(&[self.rho, mean1, mean2]),
            PriorKind::SparseExponential { expo } => gradient_of(&[self.rho, expo]),
            PriorKind::Complex { var, .. } => gradient_of(&[self.rho, var]),
            PriorKind::Laplace { beta } => gradient_of(&[beta]),
            PriorKind::L1 { .. } => Gradient::new(),
            _ => gradient_of(&[self.rho]),
        }
    }

    /// Move the hyperparameters along the averaged log-partition gradient.
    ///
    /// `grad` is `(1/N)·Σᵢ ∂ ln Zᵢ/∂θ`. Each hyperparameter takes the
    /// natural-gradient step whose fixed point is the EM update (e.g. `rho`
    /// moves to the mean posterior activation), then the result is damped:
    /// `θ ← dump_learn·θ_old + (1 − dump_learn)·θ_step`, and clamped into
    /// its domain. A gradient of the wrong length is ignored.
    pub fn apply_gradient(&mut self, grad: &[f64], dump_learn: f64) {
        if grad.len() != self.kind.learnable().len() || grad.is_empty() {
            return;
        }
        let blend = |old: f64, new: f64| dump_learn * old + (1.0 - dump_learn) * new;

        if !self.kind.uses_rho() {
            if let PriorKind::Laplace { beta } = &mut self.kind {
                let mean_abs = 1.0 / *beta - grad[0];
                if mean_abs > 0.0 {
                    *beta = blend(*beta, 1.0 / mean_abs).max(VAR_FLOOR);
                }
            }
            return;
        }

        let rho = self.rho.clamp(RHO_FLOOR, 1.0 - RHO_FLOOR);
        let active = (rho + rho * (1.0 - rho) * grad[0]).clamp(RHO_FLOOR, 1.0 - RHO_FLOOR);
        self.rho = blend(self.rho, active).clamp(RHO_FLOOR, 1.0);

        match &mut self.kind {
            PriorKind::SparseGauss { mean, var } => {
                let new_mean = *mean + *var / active * grad[1];
                let new_var = *var + 2.0 * *var * *var / active * grad[2];
                *mean = blend(*mean, new_mean);
                *var = blend(*var, new_var).max(VAR_FLOOR);
            }
            PriorKind::TwoGauss { mean1, var1, mean2, var2 } => {
                let new1 = *mean1 + *var1 / (1.0 - active) * grad[1];
                let new2 = *mean2 + *var2 / active * grad[2];
                *mean1 = blend(*mean1, new1);
                *mean2 = blend(*mean2, new2);
            }
            PriorKind::SparseExponential { expo } => {
                let mean_active = active / *expo - grad[1];
                if mean_active > 0.0 {
                    *expo = blend(*expo, active / mean_active).max(VAR_FLOOR);
                }
            }
            PriorKind::Complex { var, .. } => {
                let new_var = *var + *var * *var / active * grad[1];
                *var = blend(*var, new_var).max(VAR_FLOOR);
            }
            _ => {}
        }
    }
}

// ─── Dispatch ───────────────────────────────────────────────────────────────

impl Denoiser<f64> for Prior {
    fn evaluate(&self, r: f64, s2: f64) -> Evaluation<f64> {
        let rho = self.rho;
        match self.kind {
            PriorKind::SparseGauss { mean, var } => gaussian::sparse_gauss(rho, mean, var, r, s2),
            PriorKind::SparseGaussCut { mean, var, min, max } => {
                truncated::sparse_gauss_cut(rho, mean, var, min, max, r, s2)
            }
            PriorKind::SparseGaussPositive { mean, var } => {
                truncated::sparse_gauss_cut(rho, mean, var, 0.0, f64::INFINITY, r, s2)
            }
            PriorKind::TwoGauss { mean1, var1, mean2, var2 } => {
                gaussian::two_gauss(rho, mean1, var1, mean2, var2, r, s2)
            }
            PriorKind::SparseBinary => binary::sparse_binary(rho, r, s2),
            PriorKind::SparseExponential { expo } => truncated::sparse_exponential(rho, expo, r, s2),
            PriorKind::SparseConstant { c_down, c_up } => truncated::sparse_constant(rho, c_down, c_up, r, s2),
            PriorKind::Laplace { beta } => truncated::laplace(beta, r, s2),
            PriorKind::L1 { beta, min, max } => truncated::l1(beta, min, max, r, s2),
            PriorKind::Binary1 => binary::binary1(rho, r, s2),
            PriorKind::Complex { mean, var } => {
                // Restricted to the real axis the active component is N(Re m, var/2).
                let e = gaussian::sparse_gauss(rho, mean.re, 0.5 * var, r, s2);
                let g = &e.gradient;
                Evaluation { posterior: e.posterior, gradient: gradient_of(&[g[0], 0.5 * g[2]]) }
            }
        }
    }

    fn moments(&self) -> Posterior<f64> {
        let rho = self.rho;
        let mixture = |mean: f64, var: f64| Posterior {
            mean: rho * mean,
            var: rho * var + rho * (1.0 - rho) * mean * mean,
        };
        match self.kind {
            PriorKind::SparseGauss { mean, var } => mixture(mean, var),
            PriorKind::SparseGaussCut { mean, var, min, max } => {
                let t = crate::special::TruncatedNormal::new(mean, var, min, max);
                mixture(t.mean, t.var)
            }
            PriorKind::SparseGaussPositive { mean, var } => {
                let t = crate::special::TruncatedNormal::new(mean, var, 0.0, f64::INFINITY);
                mixture(t.mean, t.var)
            }
            PriorKind::TwoGauss { mean1, var1, mean2, var2 } => {
                let d = mean2 - mean1;
                Posterior {
                    mean: (1.0 - rho) * mean1 + rho * mean2,
                    var: (1.0 - rho) * var1 + rho * var2 + rho * (1.0 - rho) * d * d,
                }
            }
            PriorKind::SparseBinary => mixture(1.0, 0.0),
            PriorKind::SparseExponential { expo } => mixture(1.0 / expo, 1.0 / (expo * expo)),
            PriorKind::SparseConstant { c_down, c_up } => {
                let w = c_up - c_down;
                mixture(0.5 * (c_down + c_up), w * w / 12.0)
            }
            PriorKind::Laplace { beta } => Posterior { mean: 0.0, var: 2.0 / (beta * beta) },
            PriorKind::L1 { beta, min, max } => truncated::l1_moments(beta, min, max),
            PriorKind::Binary1 => Posterior { mean: 2.0 * rho - 1.0, var: 4.0 * rho * (1.0 - rho) },
            PriorKind::Complex { mean, var } => mixture(mean.re, 0.5 * var),
        }
    }
}

impl Denoiser<Complex64> for Prior {
    fn evaluate(&self, r: Complex64, s2: f64) -> Evaluation<Complex64> {
        match self.kind {
            PriorKind::Complex { mean, var } => gaussian::complex_sparse_gauss(self.rho, mean, var, r, s2),
            _ => {
                // Real and imaginary parts are independent draws from the real prior.
                // Learning sees them as two scalars, so the gradient is their average.
                let re = Denoiser::<f64>::evaluate(self, r.re, 0.5 * s2);
                let im = Denoiser::<f64>::evaluate(self, r.im, 0.5 * s2);
                let gradient = re.gradient.iter().zip(im.gradient.iter()).map(|(a, b)| 0.5 * (a + b));
                let mut g = Gradient::new();
                for v in gradient {
                    let _ = g.push(v);
                }
                Evaluation {
                    posterior: Posterior {
                        mean: Complex64::new(re.posterior.mean, im.posterior.mean),
                        var: re.posterior.var + im.posterior.var,
                    },
                    gradient: g,
                }
            }
        }
    }

    fn moments(&self) -> Posterior<Complex64> {
        match self.kind {
            PriorKind::Complex { mean, var } => {
                let rho = self.rho;
                Posterior { mean: mean * rho, var: rho * var + rho * (1.0 - rho) * mean.norm_sqr() }
            }
            _ => {
                let m = Denoiser::<f64>::moments(self);
                Posterior { mean: Complex64::new(m.mean, m.mean), var: 2.0 * m.var }
            }
        }
    }
}

#[cfg(test)]
mod tests;
