//! Python FFI bindings via PyO3.
//!
//! Exposes real-valued reconstruction on dense matrices and on seeded
//! Hadamard operators. Complex methods are available from the Rust API.
//!
//! # Building the Python extension
//!
//! ```bash
//! pip install maturin
//! maturin develop --features python-ffi
//! ```
//!
//! # Usage
//!
//! ```python
//! from amp_core import Options, reconstruct
//!
//! opts = Options(method="AMPtap", nb_iter=500, learn=True)
//! report = reconstruct(y, G, prior="SparseGauss", params={"var": 1.0}, options=opts, reference=x)
//! print(report.mse, report.rho, report.converged)
//! plot(report.mse_history)
//! ```

use std::collections::HashMap;

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use crate::config::{AmpConfig, MeanRemoval, Method};
use crate::error::AmpError;
use crate::operator::{BlockLayout, DenseMatrix};
use crate::prior::{Prior, PriorKind};
use crate::report::AmpReport;
use crate::solver::{solve, OperatorSpec, Reconstruction, Signal};

fn to_py(e: AmpError) -> PyErr {
    PyValueError::new_err(e.to_string())
}

fn build_prior(name: &str, params: Option<HashMap<String, f64>>, rows: usize, cols: usize) -> PyResult<Prior> {
    let params = params.unwrap_or_default();
    let pairs: Vec<(&str, f64)> = params.iter().map(|(k, v)| (k.as_str(), *v)).collect();
    PriorKind::from_name(name, &pairs, rows, cols).map_err(to_py)
}

fn real_report(out: Reconstruction) -> PyResult<PyReport> {
    match out {
        Reconstruction::Real(inner) => Ok(PyReport { inner }),
        Reconstruction::Complex(_) => Err(PyValueError::new_err("complex runs are not exposed to Python")),
    }
}

// ── Options ───────────────────────────────────────────────────────────────────

/// Run options. Every argument has the documented default.
#[pyclass(name = "Options")]
#[derive(Clone)]
pub struct PyOptions {
    inner: AmpConfig,
}

#[pymethods]
impl PyOptions {
    /// Create run options.
    ///
    /// Args:
    ///     method:       "AMP", "AMPtap" or "AMPseededHadamard" (default "AMPtap")
    ///     save_memory:  recompute squared products instead of caching them
    ///     nb_iter:      iteration cap (default 1000)
    ///     print:        progress log period, 0 = silent (default 10)
    ///     conv:         threshold on the mean squared change (default 1e-8)
    ///     learn:        learn prior hyperparameters
    ///     signal_rho:   override the prior density
    ///     var_noise:    noise variance (default 1e-10)
    ///     dump_mes:     message damping in [0, 1) (default 0.5)
    ///     dump_learn:   learning damping in [0, 1] (default 0)
    ///     option_noise: learn the noise variance (with learn)
    ///     remove_mean:  0 off, 1 per column (2, shared, is refused)
    ///     alpha_big:    normalise the Onsager term with the fresh variance
    #[new]
    #[pyo3(signature = (
        method="AMPtap", save_memory=false, nb_iter=1000, print=10, conv=1e-8, learn=false,
        signal_rho=None, var_noise=1e-10, dump_mes=0.5, dump_learn=0.0, option_noise=false,
        remove_mean=0, alpha_big=false
    ))]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        method: &str,
        save_memory: bool,
        nb_iter: usize,
        print: usize,
        conv: f64,
        learn: bool,
        signal_rho: Option<f64>,
        var_noise: f64,
        dump_mes: f64,
        dump_learn: f64,
        option_noise: bool,
        remove_mean: u8,
        alpha_big: bool,
    ) -> PyResult<Self> {
        let method: Method = method.parse().map_err(to_py)?;
        if method.is_complex() {
            return Err(PyValueError::new_err(format!("method {method} needs complex data; use the Rust API")));
        }
        let inner = AmpConfig {
            method,
            save_memory,
            save_speed: !save_memory,
            nb_iter,
            print,
            conv,
            learn,
            signal_rho,
            var_noise,
            dump_mes,
            dump_learn,
            option_noise,
            remove_mean: MeanRemoval::try_from(remove_mean).map_err(to_py)?,
            alpha_big,
        };
        inner.validate().map_err(to_py)?;
        Ok(Self { inner })
    }

    /// Selected method name.
    #[getter]
    pub fn method(&self) -> &'static str {
        self.inner.method.name()
    }

    /// Python repr string.
    pub fn __repr__(&self) -> String {
        format!(
            "Options(method={}, nb_iter={}, conv={:e}, learn={})",
            self.inner.method, self.inner.nb_iter, self.inner.conv, self.inner.learn,
        )
    }
}

// ── Report ────────────────────────────────────────────────────────────────────

/// Result of a reconstruction.
#[pyclass(name = "Report")]
pub struct PyReport {
    inner: AmpReport<f64>,
}

#[pymethods]
impl PyReport {
    /// Posterior means.
    #[getter]
    pub fn estimate(&self) -> Vec<f64> {
        self.inner.estimate.clone()
    }
    /// Posterior variances.
    #[getter]
    pub fn variances(&self) -> Vec<f64> {
        self.inner.variances.clone()
    }
    /// Estimated density.
    #[getter]
    pub fn rho(&self) -> f64 {
        self.inner.rho
    }
    /// Noise variance of every measurement.
    #[getter]
    pub fn noise(&self) -> Vec<f64> {
        self.inner.noise.clone()
    }
    /// Final MSE against the reference, or None.
    #[getter]
    pub fn mse(&self) -> Option<f64> {
        self.inner.mse
    }
    /// One MSE value per iteration (empty without a reference).
    #[getter]
    pub fn mse_history(&self) -> Vec<f64> {
        self.inner.mse_curve()
    }
    /// Passes run.
    #[getter]
    pub fn iterations(&self) -> usize {
        self.inner.iterations
    }
    /// True if the convergence threshold was met.
    #[getter]
    pub fn converged(&self) -> bool {
        self.inner.converged()
    }
    /// Prior kind name.
    #[getter]
    pub fn prior(&self) -> &'static str {
        self.inner.prior.kind.name()
    }

    /// Python repr string.
    pub fn __repr__(&self) -> String {
        format!(
            "Report(prior={}, rho={:.4}, iterations={}, converged={})",
            self.inner.prior.kind.name(),
            self.inner.rho,
            self.inner.iterations,
            self.inner.converged(),
        )
    }
}

// ── Entry points ──────────────────────────────────────────────────────────────

/// Reconstruct a real signal from `y = G·x + noise` with a dense `G`.
///
/// Args:
///     y:         measurements, length M
///     matrix:    M rows of N floats
///     prior:     prior kind name (default "SparseGauss")
///     params:    hyperparameters by name; rho defaults to M/(10N)
///     options:   Options (default Options())
///     reference: true signal for MSE tracking
#[pyfunction]
#[pyo3(signature = (y, matrix, prior="SparseGauss", params=None, options=None, reference=None))]
pub fn reconstruct(
    y: Vec<f64>,
    matrix: Vec<Vec<f64>>,
    prior: &str,
    params: Option<HashMap<String, f64>>,
    options: Option<PyOptions>,
    reference: Option<Vec<f64>>,
) -> PyResult<PyReport> {
    let config = options.map(|o| o.inner).unwrap_or_default();
    let matrix = DenseMatrix::from_rows(&matrix).map_err(to_py)?;
    let prior = build_prior(prior, params, matrix.rows(), matrix.cols())?;
    let out = solve(Signal::Real(y), OperatorSpec::Dense(matrix), prior, &config, reference.map(Signal::Real))
        .map_err(to_py)?;
    real_report(out)
}

/// Reconstruct a real signal measured by a seeded Hadamard operator.
///
/// Args:
///     y:          measurements, length sum(row_blocks)
///     row_blocks: rows per row block
///     col_block:  columns per column block (a power of two)
///     coupling:   row_blocks × column blocks variance matrix J
///     seed:       seed of the sign and mode tables
#[pyfunction]
#[pyo3(signature = (y, row_blocks, col_block, coupling, seed, prior="SparseGauss", params=None, options=None, reference=None))]
#[allow(clippy::too_many_arguments)]
pub fn reconstruct_seeded(
    y: Vec<f64>,
    row_blocks: Vec<usize>,
    col_block: usize,
    coupling: Vec<Vec<f64>>,
    seed: u64,
    prior: &str,
    params: Option<HashMap<String, f64>>,
    options: Option<PyOptions>,
    reference: Option<Vec<f64>>,
) -> PyResult<PyReport> {
    let config = match options {
        Some(o) => o.inner,
        None => AmpConfig::with_method(Method::AmpSeededHadamard),
    };
    let layout = BlockLayout::new(row_blocks, col_block, coupling).map_err(to_py)?;
    let prior = build_prior(prior, params, layout.rows(), layout.cols())?;
    let spec = OperatorSpec::Seeded { layout, seed };
    let out = solve(Signal::Real(y), spec, prior, &config, reference.map(Signal::Real)).map_err(to_py)?;
    real_report(out)
}

// ── Module entry point ────────────────────────────────────────────────────────

/// AMP compressed-sensing reconstruction.
#[pymodule]
pub fn amp_core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyOptions>()?;
    m.add_class::<PyReport>()?;
    m.add_function(wrap_pyfunction!(reconstruct, m)?)?;
    m.add_function(wrap_pyfunction!(reconstruct_seeded, m)?)?;
    m.add("__version__", env!("CARGO_PKG_VERSION"))?;
    Ok(())
}
