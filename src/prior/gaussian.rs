//! Gaussian-mixture denoisers: Gauss-Bernoulli, two Gaussians, complex CN.

use num_complex::Complex64;

use super::{gradient_of, Evaluation, Posterior, RHO_FLOOR};
use crate::special::{ln_gauss, sigmoid};

/// `∂ ln Z / ∂rho` given the posterior activation `pi`.
pub(super) fn rho_gradient(pi: f64, rho: f64) -> f64 {
    let rho = rho.clamp(RHO_FLOOR, 1.0 - RHO_FLOOR);
    (pi - rho) / (rho * (1.0 - rho))
}

/// Product of `N(x; mean, var)` and `N(x; r, s2)`, as mean and variance.
#[inline]
pub(super) fn gaussian_product(mean: f64, var: f64, r: f64, s2: f64) -> (f64, f64) {
    let total = var + s2;
    ((mean * s2 + r * var) / total, var * s2 / total)
}

pub(super) fn sparse_gauss(rho: f64, mean: f64, var: f64, r: f64, s2: f64) -> Evaluation<f64> {
    let l1 = rho.ln() + ln_gauss(r, mean, var + s2);
    let l0 = (1.0 - rho).ln() + ln_gauss(r, 0.0, s2);
    let pi = sigmoid(l1 - l0);
    let (a, v) = gaussian_product(mean, var, r, s2);
    let d = a - mean;

    Evaluation {
        posterior: Posterior { mean: pi * a, var: pi * v + pi * (1.0 - pi) * a * a },
        gradient: gradient_of(&[rho_gradient(pi, rho), pi * d / var, pi * (d * d + v - var) / (2.0 * var * var)]),
    }
}

pub(super) fn two_gauss(
    rho: f64,
    mean1: f64,
    var1: f64,
    mean2: f64,
    var2: f64,
    r: f64,
    s2: f64,
) -> Evaluation<f64> {
    let l2 = rho.ln() + ln_gauss(r, mean2, var2 + s2);
    let l1 = (1.0 - rho).ln() + ln_gauss(r, mean1, var1 + s2);
    let pi = sigmoid(l2 - l1);
    let (a1, v1) = gaussian_product(mean1, var1, r, s2);
    let (a2, v2) = gaussian_product(mean2, var2, r, s2);
    let gap = a2 - a1;

    Evaluation {
        posterior: Posterior {
            mean: (1.0 - pi) * a1 + pi * a2,
            var: (1.0 - pi) * v1 + pi * v2 + pi * (1.0 - pi) * gap * gap,
        },
        gradient: gradient_of(&[rho_gradient(pi, rho), (1.0 - pi) * (a1 - mean1) / var1, pi * (a2 - mean2) / var2]),
    }
}

/// Gauss-Bernoulli prior with a circular complex Gaussian active part.
///
/// `CN(x; m, v) = exp(−|x − m|²/v) / (π·v)`, so the cavity and the active
/// component combine exactly as in the real case with `|·|²` in place of
/// the square and no factor one half.
pub(super) fn complex_sparse_gauss(
    rho: f64,
    mean: Complex64,
    var: f64,
    r: Complex64,
    s2: f64,
) -> Evaluation<Complex64> {
    use core::f64::consts::PI;

    let l1 = rho.ln() - (r - mean).norm_sqr() / (var + s2) - (PI * (var + s2)).ln();
    let l0 = (1.0 - rho).ln() - r.norm_sqr() / s2 - (PI * s2).ln();
    let pi = sigmoid(l1 - l0);
    let total = var + s2;
    let a = (mean * s2 + r * var) / total;
    let v = var * s2 / total;

    Evaluation {
        posterior: Posterior { mean: a * pi, var: pi * v + pi * (1.0 - pi) * a.norm_sqr() },
        gradient: gradient_of(&[rho_gradient(pi, rho), pi * (((a - mean).norm_sqr() + v) / (var * var) - 1.0 / var)]),
    }
}
