//! Denoisers whose posteriors are (mixtures of) truncated Gaussians.
//!
//! Each active component is written as `weight · TruncatedNormal`, with the
//! weight kept as a log so that two pieces can be compared through
//! [`sigmoid`] whatever their magnitude.

use super::gaussian::{gaussian_product, rho_gradient};
use super::{gradient_of, Evaluation, Gradient, Posterior};
use crate::special::{ln_gauss, sigmoid, TruncatedNormal};

/// Two-component posterior `pi·A + (1 − pi)·B` from component moments.
fn mix(pi: f64, mean_a: f64, var_a: f64, mean_b: f64, var_b: f64) -> Posterior<f64> {
    let gap = mean_a - mean_b;
    Posterior {
        mean: pi * mean_a + (1.0 - pi) * mean_b,
        var: pi * var_a + (1.0 - pi) * var_b + pi * (1.0 - pi) * gap * gap,
    }
}

/// Spike at zero (log weight `l0`) against an active piece (log weight `l1`).
fn spike_and(l1: f64, l0: f64, active: &TruncatedNormal, rho: f64) -> Evaluation<f64> {
    let pi = sigmoid(l1 - l0);
    Evaluation {
        posterior: mix(pi, active.mean, active.var, 0.0, 0.0),
        gradient: gradient_of(&[rho_gradient(pi, rho)]),
    }
}

pub(super) fn sparse_gauss_cut(
    rho: f64,
    mean: f64,
    var: f64,
    lo: f64,
    hi: f64,
    r: f64,
    s2: f64,
) -> Evaluation<f64> {
    let prior_mass = TruncatedNormal::new(mean, var, lo, hi).log_mass;
    let (a, v) = gaussian_product(mean, var, r, s2);
    let active = TruncatedNormal::new(a, v, lo, hi);
    let l1 = rho.ln() + ln_gauss(r, mean, var + s2) + active.log_mass - prior_mass;
    let l0 = (1.0 - rho).ln() + ln_gauss(0.0, r, s2);
    spike_and(l1, l0, &active, rho)
}

pub(super) fn sparse_exponential(rho: f64, expo: f64, r: f64, s2: f64) -> Evaluation<f64> {
    // expo·exp(−expo·x)·N(x; r, s2) = expo·exp(expo²s2/2 − expo·r)·N(x; r − expo·s2, s2)
    let active = TruncatedNormal::new(r - expo * s2, s2, 0.0, f64::INFINITY);
    let l1 = rho.ln() + expo.ln() + 0.5 * expo * expo * s2 - expo * r + active.log_mass;
    let l0 = (1.0 - rho).ln() + ln_gauss(0.0, r, s2);
    let pi = sigmoid(l1 - l0);
    Evaluation {
        posterior: mix(pi, active.mean, active.var, 0.0, 0.0),
        gradient: gradient_of(&[rho_gradient(pi, rho), pi * (1.0 / expo - active.mean)]),
    }
}

pub(super) fn sparse_constant(rho: f64, c_down: f64, c_up: f64, r: f64, s2: f64) -> Evaluation<f64> {
    let active = TruncatedNormal::new(r, s2, c_down, c_up);
    let l1 = rho.ln() - (c_up - c_down).ln() + active.log_mass;
    let l0 = (1.0 - rho).ln() + ln_gauss(0.0, r, s2);
    spike_and(l1, l0, &active, rho)
}

/// Positive and negative halves of a posterior `∝ exp(−β|x|)·N(x; r, s2)`
/// restricted to `[lo, hi]`, as `(ln weight, moments)` pairs. The common
/// factor `exp(β²s2/2)` is dropped from both weights.
fn exponential_halves(
    beta: f64,
    var: f64,
    shift: f64,
    lo: f64,
    hi: f64,
    r: f64,
) -> (Option<(f64, TruncatedNormal)>, Option<(f64, TruncatedNormal)>) {
    let plus_lo = lo.max(0.0);
    let minus_hi = hi.min(0.0);
    let plus = (hi > plus_lo).then(|| {
        let t = TruncatedNormal::new(r - shift, var, plus_lo, hi);
        (-beta * r + t.log_mass, t)
    });
    let minus = (minus_hi > lo).then(|| {
        let t = TruncatedNormal::new(r + shift, var, lo, minus_hi);
        (beta * r + t.log_mass, t)
    });
    (plus, minus)
}

fn combine_halves(
    halves: (Option<(f64, TruncatedNormal)>, Option<(f64, TruncatedNormal)>),
) -> (f64, TruncatedNormal, TruncatedNormal) {
    let empty = TruncatedNormal { log_mass: f64::NEG_INFINITY, mean: 0.0, var: 0.0 };
    match halves {
        (Some((lp, p)), Some((lm, m))) => (sigmoid(lp - lm), p, m),
        (Some((_, p)), None) => (1.0, p, empty),
        (None, Some((_, m))) => (0.0, empty, m),
        (None, None) => (0.5, empty, empty),
    }
}

pub(super) fn laplace(beta: f64, r: f64, s2: f64) -> Evaluation<f64> {
    let halves = exponential_halves(beta, s2, beta * s2, f64::NEG_INFINITY, f64::INFINITY, r);
    let (pi, plus, minus) = combine_halves(halves);
    let mean_abs = pi * plus.mean - (1.0 - pi) * minus.mean;
    Evaluation {
        posterior: mix(pi, plus.mean, plus.var, minus.mean, minus.var),
        gradient: gradient_of(&[1.0 / beta - mean_abs]),
    }
}

/// Tempered L1 on `[lo, hi]`.
///
/// `exp(−β(|x| + (x − r)²/(2s2)))` is, on each half line, a Gaussian of
/// variance `s2/β` centred at `r ∓ s2`. As `β → ∞` the mean tends to the
/// soft threshold `sign(r)·max(|r| − s2, 0)` clipped to the bounds.
pub(super) fn l1(beta: f64, lo: f64, hi: f64, r: f64, s2: f64) -> Evaluation<f64> {
    let halves = exponential_halves(beta, s2 / beta, s2, lo, hi, r);
    let (pi, plus, minus) = combine_halves(halves);
    Evaluation { posterior: mix(pi, plus.mean, plus.var, minus.mean, minus.var), gradient: Gradient::new() }
}

/// `ln ∫ exp(−β·x) dx` over `[lo, hi] ⊂ [0, ∞)` plus the mean and variance
/// of the normalised density.
fn truncated_exponential(beta: f64, lo: f64, hi: f64) -> (f64, f64, f64) {
    let inv = 1.0 / beta;
    if hi == f64::INFINITY {
        return (-beta * lo - beta.ln(), lo + inv, inv * inv);
    }
    let w = hi - lo;
    let tail = (-beta * w).exp();
    let kept = -(-beta * w).exp_m1();
    let mean = inv - w * tail / kept;
    let var = inv * inv - w * w * tail / (kept * kept);
    (-beta * lo + kept.ln() - beta.ln(), lo + mean, var.max(0.0))
}

/// Moments of the L1 prior `∝ exp(−β|x|)` on `[lo, hi]`.
pub(super) fn l1_moments(beta: f64, lo: f64, hi: f64) -> Posterior<f64> {
    let plus = (hi > lo.max(0.0)).then(|| truncated_exponential(beta, lo.max(0.0), hi));
    let minus = (hi.min(0.0) > lo).then(|| {
        let (w, m, v) = truncated_exponential(beta, (-hi).max(0.0), -lo);
        (w, -m, v)
    });
    match (plus, minus) {
        (Some((wp, mp, vp)), Some((wm, mm, vm))) => mix(sigmoid(wp - wm), mp, vp, mm, vm),
        (Some((_, mp, vp)), None) => Posterior { mean: mp, var: vp },
        (None, Some((_, mm, vm))) => Posterior { mean: mm, var: vm },
        (None, None) => Posterior { mean: 0.0, var: 0.0 },
    }
}
