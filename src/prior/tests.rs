use num_complex::Complex64;

use super::*;
use crate::special::{ln_gauss, sigmoid};

fn all_kinds() -> Vec<Prior> {
    vec![
        Prior::new(0.3, PriorKind::SparseGauss { mean: 0.5, var: 2.0 }),
        Prior::new(0.4, PriorKind::SparseGaussCut { mean: 0.2, var: 1.0, min: -0.5, max: 1.5 }),
        Prior::new(0.25, PriorKind::SparseGaussPositive { mean: 0.0, var: 1.0 }),
        Prior::new(0.6, PriorKind::TwoGauss { mean1: -1.0, var1: 0.1, mean2: 1.0, var2: 0.1 }),
        Prior::new(0.2, PriorKind::SparseBinary),
        Prior::new(0.3, PriorKind::SparseExponential { expo: 2.0 }),
        Prior::new(0.5, PriorKind::SparseConstant { c_down: -1.0, c_up: 2.0 }),
        Prior::new(1.0, PriorKind::Laplace { beta: 1.5 }),
        Prior::new(1.0, PriorKind::L1 { beta: 2.0, min: -1.0, max: 3.0 }),
        Prior::new(0.7, PriorKind::Binary1),
        Prior::new(0.35, PriorKind::Complex { mean: Complex64::new(0.5, -0.2), var: 1.0 }),
    ]
}

#[test]
fn test_every_kind_validates() {
    for prior in all_kinds() {
        prior.validate().unwrap_or_else(|e| panic!("{}: {e}", prior.kind.name()));
    }
}

#[test]
fn test_ignorant_message_returns_prior_moments() {
    for prior in all_kinds() {
        let expected = Denoiser::<f64>::moments(&prior);
        let got = Denoiser::<f64>::denoise(&prior, 0.1, 1e6);
        let name = prior.kind.name();
        assert!(
            (got.mean - expected.mean).abs() < 1e-2 * (1.0 + expected.mean.abs()),
            "{name}: mean {} vs {}",
            got.mean,
            expected.mean
        );
        assert!(
            (got.var - expected.var).abs() < 1e-2 * (1.0 + expected.var),
            "{name}: var {} vs {}",
            got.var,
            expected.var
        );
    }
}

#[test]
fn test_ignorant_message_complex() {
    for prior in all_kinds() {
        let expected = Denoiser::<Complex64>::moments(&prior);
        let got = Denoiser::<Complex64>::denoise(&prior, Complex64::new(0.1, -0.1), 1e6);
        let name = prior.kind.name();
        assert!((got.mean - expected.mean).norm() < 2e-2 * (1.0 + expected.mean.norm()), "{name}");
        assert!((got.var - expected.var).abs() < 2e-2 * (1.0 + expected.var), "{name}");
    }
}

#[test]
fn test_posterior_is_finite_and_nonnegative() {
    let cavities = [(-50.0, 1e-6), (-2.0, 0.01), (0.0, 0.5), (0.7, 1.0), (3.0, 10.0), (1e3, 1e-3)];
    for prior in all_kinds() {
        for &(r, s2) in &cavities {
            let e = Denoiser::<f64>::evaluate(&prior, r, s2);
            let name = prior.kind.name();
            assert!(e.posterior.mean.is_finite(), "{name} at ({r}, {s2})");
            assert!(e.posterior.var.is_finite() && e.posterior.var >= 0.0, "{name} at ({r}, {s2})");
            assert!(e.gradient.iter().all(|g| g.is_finite()), "{name} at ({r}, {s2})");
        }
    }
}

#[test]
fn test_gradient_length_matches_learnable() {
    for prior in all_kinds() {
        let n = prior.kind.learnable().len();
        assert_eq!(Denoiser::<f64>::gradient(&prior, 0.3, 0.2).len(), n, "{}", prior.kind.name());
        let z = Complex64::new(0.3, 0.1);
        assert_eq!(Denoiser::<Complex64>::gradient(&prior, z, 0.2).len(), n, "{}", prior.kind.name());
        assert_eq!(prior.learnable_values().len(), n);
    }
}

#[test]
fn test_l1_approaches_soft_threshold() {
    let s2 = 0.5;
    let soft = |r: f64| r.signum() * (r.abs() - s2).max(0.0);
    let err = |beta: f64, r: f64| {
        let prior = Prior::new(1.0, PriorKind::L1 { beta, min: f64::NEG_INFINITY, max: f64::INFINITY });
        (Denoiser::<f64>::denoise(&prior, r, s2).mean - soft(r)).abs()
    };

    assert!(err(10.0, 0.6) > err(100.0, 0.6));
    assert!(err(100.0, 0.6) > err(1e4, 0.6));
    for r in [2.0, -1.3, 0.6, 0.2, -0.4, 0.0] {
        assert!(err(1e4, r) < 1e-3, "r = {r}: error {}", err(1e4, r));
    }
}

#[test]
fn test_l1_respects_bounds() {
    let prior = Prior::new(1.0, PriorKind::L1 { beta: 50.0, min: 0.0, max: 1.0 });
    for r in [-3.0, 0.2, 5.0] {
        let p = Denoiser::<f64>::denoise(&prior, r, 0.1);
        assert!((0.0..=1.0).contains(&p.mean), "r = {r}: {}", p.mean);
    }
}

#[test]
fn test_sparse_binary_is_bernoulli() {
    let prior = Prior::new(0.5, PriorKind::SparseBinary);
    // Symmetric evidence at r = 1/2 leaves the prior odds unchanged.
    let p = Denoiser::<f64>::denoise(&prior, 0.5, 0.3);
    assert!((p.mean - 0.5).abs() < 1e-12);
    assert!((p.var - 0.25).abs() < 1e-12);
    let strong = Denoiser::<f64>::denoise(&prior, 1.0, 1e-4);
    assert!((strong.mean - 1.0).abs() < 1e-9);
}

#[test]
fn test_complex_kind_matches_gauss_on_real_axis() {
    let complex = Prior::new(0.3, PriorKind::Complex { mean: Complex64::new(0.4, 9.0), var: 1.2 });
    let real = Prior::sparse_gauss(0.3, 0.4, 0.6);
    let a = Denoiser::<f64>::denoise(&complex, 0.8, 0.2);
    let b = Denoiser::<f64>::denoise(&real, 0.8, 0.2);
    assert_eq!(a, b);
}

#[test]
fn test_rho_step_moves_to_mean_activation() {
    let mut prior = Prior::new(0.2, PriorKind::SparseBinary);
    let cavities = [(0.9, 0.1), (0.1, 0.1), (0.5, 0.2), (1.4, 0.05)];
    let n = cavities.len() as f64;
    let mut grad = 0.0;
    let mut activation = 0.0;
    for &(r, s2) in &cavities {
        let e = Denoiser::<f64>::evaluate(&prior, r, s2);
        grad += e.gradient[0] / n;
        activation += e.posterior.mean / n;
    }
    prior.apply_gradient(&[grad], 0.0);
    assert!((prior.rho - activation).abs() < 1e-12, "{} vs {activation}", prior.rho);
}

#[test]
fn test_rho_step_with_complex_messages_counts_both_parts() {
    // SparseBinary activation is the posterior mean, so EM over the 2N real
    // scalars moves rho to the mean of both parts.
    let mut prior = Prior::new(0.2, PriorKind::SparseBinary);
    let cavities = [(Complex64::new(0.9, 0.1), 0.2), (Complex64::new(0.5, 1.4), 0.4)];
    let n = cavities.len() as f64;
    let mut grad = 0.0;
    let mut activation = 0.0;
    for &(r, s2) in &cavities {
        let e = Denoiser::<Complex64>::evaluate(&prior, r, s2);
        grad += e.gradient[0] / n;
        activation += (e.posterior.mean.re + e.posterior.mean.im) / (2.0 * n);
    }
    prior.apply_gradient(&[grad], 0.0);
    assert!((prior.rho - activation).abs() < 1e-12, "{} vs {activation}", prior.rho);
}

#[test]
fn test_gauss_mean_step_is_em_update() {
    let (rho, mean, var) = (0.4, 0.0, 1.0);
    let mut prior = Prior::sparse_gauss(rho, mean, var);
    let cavities = [(1.2, 0.1), (-0.3, 0.2), (2.0, 0.05)];
    let n = cavities.len() as f64;

    let mut grad = [0.0; 3];
    let (mut num, mut den) = (0.0, 0.0);
    for &(r, s2) in &cavities {
        let e = Denoiser::<f64>::evaluate(&prior, r, s2);
        for (g, v) in grad.iter_mut().zip(e.gradient.iter()) {
            *g += v / n;
        }
        let pi = sigmoid(rho.ln() + ln_gauss(r, mean, var + s2) - (1.0 - rho).ln() - ln_gauss(r, 0.0, s2));
        let a = (mean * s2 + r * var) / (s2 + var);
        num += pi * a;
        den += pi;
    }
    prior.apply_gradient(&grad, 0.0);
    let PriorKind::SparseGauss { mean: learned, .. } = prior.kind else {
        panic!("kind changed");
    };
    assert!((learned - num / den).abs() < 1e-12, "{learned} vs {}", num / den);
    assert!((prior.rho - den / n).abs() < 1e-12);
}

#[test]
fn test_laplace_step_matches_mean_magnitude() {
    let mut prior = Prior::new(1.0, PriorKind::Laplace { beta: 2.0 });
    prior.apply_gradient(&[1.0 / 2.0 - 0.25], 0.0);
    assert_eq!(prior.kind, PriorKind::Laplace { beta: 4.0 });
}

#[test]
fn test_full_damping_freezes_hyperparameters() {
    let mut prior = Prior::new(0.3, PriorKind::SparseExponential { expo: 1.5 });
    let before = prior.clone();
    prior.apply_gradient(&[0.7, -0.2], 1.0);
    assert_eq!(prior, before);
}

#[test]
fn test_learning_stays_in_domain() {
    let mut prior = Prior::sparse_gauss(0.5, 0.0, 1.0);
    prior.apply_gradient(&[1e9, 0.0, -1e9], 0.0);
    assert!(prior.rho <= 1.0 && prior.rho > 0.0);
    prior.validate().unwrap();
}

#[test]
fn test_from_name_defaults() {
    let p = PriorKind::from_name("2Gauss", &[], 150, 500).unwrap();
    assert!((p.rho - 0.03).abs() < 1e-15, "{}", p.rho);
    assert_eq!(p.kind, PriorKind::TwoGauss { mean1: -1.0, var1: 0.1, mean2: 1.0, var2: 0.1 });

    let p = PriorKind::from_name("SparseGaussCut", &[("rho", 0.05), ("max", 4.0)], 150, 500).unwrap();
    assert_eq!(p.rho, 0.05);
    assert_eq!(p.kind, PriorKind::SparseGaussCut { mean: 0.0, var: 1.0, min: -1.0, max: 4.0 });

    let p = PriorKind::from_name("L1", &[], 150, 500).unwrap();
    assert_eq!(p.kind, PriorKind::L1 { beta: 1.0, min: f64::NEG_INFINITY, max: f64::INFINITY });
    assert_eq!(p.rho, 1.0);

    // More measurements than ten times the unknowns still gives a valid density.
    assert_eq!(PriorKind::from_name("SparseBinary", &[], 50, 4).unwrap().rho, 1.0);
}

#[test]
fn test_from_name_rejects_unknowns() {
    assert!(PriorKind::from_name("Cauchy", &[], 10, 20).unwrap_err().is_configuration());
    assert!(PriorKind::from_name("Laplace", &[("expo", 1.0)], 10, 20).is_err());
}

#[test]
fn test_invalid_hyperparameters_are_named() {
    let err = PriorKind::from_name("SparseExponential", &[("expo", -1.0)], 10, 20).unwrap_err();
    assert!(matches!(err, AmpError::InvalidHyperparameter { name: "expo", .. }), "{err}");

    let err = Prior::new(0.0, PriorKind::SparseBinary).validate().unwrap_err();
    assert!(matches!(err, AmpError::InvalidHyperparameter { name: "rho", .. }));

    let cut = Prior::new(0.1, PriorKind::SparseGaussCut { mean: 0.0, var: 1.0, min: 2.0, max: 1.0 });
    assert!(cut.validate().is_err());
}

#[test]
fn test_for_problem_density() {
    let p = Prior::for_problem(PriorKind::SparseBinary, 150, 500);
    assert!((p.rho - 0.03).abs() < 1e-15);
}
