//! Error-function family and log-domain Gaussian helpers.
//!
//! The prior denoisers need Gaussian tail masses far beyond the range where
//! `1 - erf(x)` keeps any precision, so everything is built on the scaled
//! complementary error function `erfcx(x) = exp(x²)·erfc(x)`:
//!
//! ```text
//! 0 ≤ x < 2 : erfcx = exp(x²) − 2/√π · Σ 2ⁿ x²ⁿ⁺¹ / (2n+1)!!   (positive-term series)
//! x ≥ 2     : erfcx = 1 / (√π · (x + ½/(x + 1/(x + 3/2/(x + …)))))  (Laplace continued fraction)
//! x < 0     : erfcx(x) = 2·exp(x²) − erfcx(−x)
//! ```

use core::f64::consts::{FRAC_2_SQRT_PI, PI, SQRT_2};

/// √π.
const SQRT_PI: f64 = 1.772_453_850_905_516;

/// ln √(2π).
const LN_SQRT_2PI: f64 = 0.918_938_533_204_672_8;

/// √(2/π).
const SQRT_2_OVER_PI: f64 = 0.797_884_560_802_865_4;

/// Below this argument the series is used, above it the continued fraction.
const SERIES_LIMIT: f64 = 2.0;

/// Scaled complementary error function `exp(x²)·erfc(x)`.
pub fn erfcx(x: f64) -> f64 {
    if x.is_nan() {
        return f64::NAN;
    }
    if x < 0.0 {
        return 2.0 * (x * x).exp() - erfcx(-x);
    }
    if x == 0.0 {
        return 1.0;
    }
    if x < SERIES_LIMIT {
        let x2 = x * x;
        let mut term = x;
        let mut sum = x;
        let mut n = 0u32;
        loop {
            n += 1;
            term *= 2.0 * x2 / f64::from(2 * n + 1);
            sum += term;
            if term <= sum * 1e-17 || n > 200 {
                break;
            }
        }
        return x2.exp() - FRAC_2_SQRT_PI * sum;
    }
    if x.is_infinite() {
        return 0.0;
    }
    let terms = if x < 5.0 { 120 } else { 40 };
    let mut t = x;
    for k in (1..=terms).rev() {
        t = x + (f64::from(k) * 0.5) / t;
    }
    1.0 / (SQRT_PI * t)
}

/// Complementary error function.
pub fn erfc(x: f64) -> f64 {
    if x >= 0.0 {
        erfcx(x) * (-x * x).exp()
    } else {
        2.0 - erfc(-x)
    }
}

/// `ln P(Z > z)` for a standard normal `Z`.
pub fn ln_normal_sf(z: f64) -> f64 {
    if z == f64::INFINITY {
        return f64::NEG_INFINITY;
    }
    if z == f64::NEG_INFINITY {
        return 0.0;
    }
    if z > -1.0 {
        let u = z / SQRT_2;
        (0.5 * erfcx(u)).ln() - u * u
    } else {
        (-0.5 * erfc(-z / SQRT_2)).ln_1p()
    }
}

/// `ln P(Z < z)` for a standard normal `Z`.
pub fn ln_normal_cdf(z: f64) -> f64 {
    ln_normal_sf(-z)
}

/// Inverse Mills ratio `φ(z) / P(Z > z)`.
pub fn mills_ratio(z: f64) -> f64 {
    if z == f64::NEG_INFINITY {
        return 0.0;
    }
    SQRT_2_OVER_PI / erfcx(z / SQRT_2)
}

/// Log density of `N(mean, var)` at `x`.
pub fn ln_gauss(x: f64, mean: f64, var: f64) -> f64 {
    let d = x - mean;
    -d * d / (2.0 * var) - 0.5 * (2.0 * PI * var).ln()
}

/// Numerically stable logistic function.
pub fn sigmoid(t: f64) -> f64 {
    if t >= 0.0 {
        1.0 / (1.0 + (-t).exp())
    } else {
        let e = t.exp();
        e / (1.0 + e)
    }
}

fn ln_std_pdf(z: f64) -> f64 {
    if z.is_infinite() {
        return f64::NEG_INFINITY;
    }
    -0.5 * z * z - LN_SQRT_2PI
}

/// `N(mean, var)` restricted to `[lo, hi]`: its log mass and its moments.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TruncatedNormal {
    /// `ln P(lo ≤ X ≤ hi)` for `X ~ N(mean, var)`.
    pub log_mass: f64,
    /// Mean of the truncated distribution.
    pub mean: f64,
    /// Variance of the truncated distribution.
    pub var: f64,
}

/// Standard normal `Z` restricted to `[a, b]` with `0 ≤ a < b`.
///
/// Returns `(ln mass, E[Z − a], Var Z)`. Moments are taken relative to the
/// lower bound so that intervals deep in the tail keep their precision.
fn upper_interval(a: f64, b: f64) -> (f64, f64, f64) {
    let tail = |t: f64| {
        let lam = mills_ratio(t);
        let excess = lam - t;
        (ln_normal_sf(t), excess, 1.0 - lam * excess)
    };
    let (ln_a, ex_a, var_a) = tail(a);
    if b == f64::INFINITY {
        return (ln_a, ex_a, var_a);
    }
    let (ln_b, ex_b, var_b) = tail(b);
    let q = (ln_b - ln_a).exp();
    let keep = -(ln_b - ln_a).exp_m1();
    let shift = (b - a) + ex_b;
    let m1 = (ex_a - q * shift) / keep;
    let m2 = (var_a + ex_a * ex_a - q * (var_b + shift * shift)) / keep;
    (ln_a + keep.ln(), m1, (m2 - m1 * m1).max(0.0))
}

impl TruncatedNormal {
    /// Moments of `N(mean, var)` conditioned on `[lo, hi]`. Bounds may be infinite.
    pub fn new(mean: f64, var: f64, lo: f64, hi: f64) -> Self {
        let sd = var.sqrt();
        let a = (lo - mean) / sd;
        let b = (hi - mean) / sd;
        if !(a < b) {
            return Self { log_mass: f64::NEG_INFINITY, mean: mean.clamp(lo, hi), var: 0.0 };
        }

        let (log_mass, m, v) = if a >= 0.0 {
            let (log_mass, excess, v) = upper_interval(a, b);
            (log_mass, mean + sd * (a + excess), var * v)
        } else if b <= 0.0 {
            let (log_mass, excess, v) = upper_interval(-b, -a);
            (log_mass, mean - sd * (excess - b), var * v)
        } else if a == f64::NEG_INFINITY && b == f64::INFINITY {
            (0.0, mean, var)
        } else {
            // The interval contains the mode: no tail cancellation.
            let log_mass = (-(ln_normal_sf(b).exp() + ln_normal_cdf(a).exp())).ln_1p();
            let pa = (ln_std_pdf(a) - log_mass).exp();
            let pb = (ln_std_pdf(b) - log_mass).exp();
            let edge = |z: f64, p: f64| if z.is_finite() { z * p } else { 0.0 };
            let d = pa - pb;
            (log_mass, mean + sd * d, var * (1.0 + edge(a, pa) - edge(b, pb) - d * d))
        };

        Self { log_mass, mean: m.clamp(lo, hi), var: v.clamp(0.0, var) }
    }
}
