use super::gaussian::rho_gradient;
use super::{gradient_of, Evaluation, Posterior};
use crate::special::sigmoid;

/// `(1 − rho)·δ(x) + rho·δ(x − 1)`.
pub(super) fn sparse_binary(rho: f64, r: f64, s2: f64) -> Evaluation<f64> {
    // ln[rho·N(1; r, s2)] − ln[(1 − rho)·N(0; r, s2)]
    let h = rho.ln() - (1.0 - rho).ln() + (2.0 * r - 1.0) / (2.0 * s2);
    let pi = sigmoid(h);
    Evaluation {
        posterior: Posterior { mean: pi, var: pi * (1.0 - pi) },
        gradient: gradient_of(&[rho_gradient(pi, rho)]),
    }
}

/// `(1 − rho)·δ(x + 1) + rho·δ(x − 1)`.
pub(super) fn binary1(rho: f64, r: f64, s2: f64) -> Evaluation<f64> {
    let h = rho.ln() - (1.0 - rho).ln() + 2.0 * r / s2;
    let pi = sigmoid(h);
    Evaluation {
        posterior: Posterior { mean: 2.0 * pi - 1.0, var: 4.0 * pi * (1.0 - pi) },
        gradient: gradient_of(&[rho_gradient(pi, rho)]),
    }
}
