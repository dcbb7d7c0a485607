//! Fast block transforms behind the seeded operators.
//!
//! Both transforms are unnormalised: every matrix entry has unit modulus.
//!
//! ```text
//! Hadamard (Sylvester order):  H[k][j] = (−1)^popcount(k & j)
//! Fourier:                     F[k][j] = exp(−2πi·k·j / n)
//! ```

use std::fmt;
use std::sync::Arc;

use num_complex::Complex64;
use rustfft::{Fft, FftPlanner};

use crate::error::{AmpError, AmpResult};
use crate::scalar::Scalar;

/// An `n × n` transform with unit-modulus entries and an O(n log n) product.
pub trait BlockTransform: Send + Sync + Sized {
    /// Entry type of the transform matrix.
    type Elem: Scalar;

    /// Transform name used in logs and errors.
    const NAME: &'static str;

    /// Plan a transform of size `n`.
    fn plan(n: usize) -> AmpResult<Self>;

    /// Transform size.
    fn size(&self) -> usize;

    /// `block ← T·block`.
    fn forward(&self, block: &mut [Self::Elem]);

    /// `block ← Tᴴ·block`.
    fn adjoint(&self, block: &mut [Self::Elem]);

    /// Matrix entry `T[mode][j]`.
    fn entry(&self, mode: usize, j: usize) -> Self::Elem;
}

// ─── Hadamard ───────────────────────────────────────────────────────────────

/// Walsh-Hadamard transform; `n` must be a power of two.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Hadamard {
    n: usize,
}

/// In-place fast Walsh-Hadamard butterfly, Sylvester ordering.
pub(crate) fn fwht(data: &mut [f64]) {
    let n = data.len();
    let mut h = 1;
    while h < n {
        for start in (0..n).step_by(2 * h) {
            for i in start..start + h {
                let a = data[i];
                let b = data[i + h];
                data[i] = a + b;
                data[i + h] = a - b;
            }
        }
        h *= 2;
    }
}

impl BlockTransform for Hadamard {
    type Elem = f64;

    const NAME: &'static str = "Hadamard";

    fn plan(n: usize) -> AmpResult<Self> {
        if !n.is_power_of_two() {
            return Err(AmpError::config(format!("Hadamard block size must be a power of two, got {n}")));
        }
        Ok(Self { n })
    }

    fn size(&self) -> usize {
        self.n
    }

    fn forward(&self, block: &mut [f64]) {
        fwht(block);
    }

    fn adjoint(&self, block: &mut [f64]) {
        // Sylvester Hadamard matrices are symmetric.
        fwht(block);
    }

    fn entry(&self, mode: usize, j: usize) -> f64 {
        if (mode & j).count_ones() % 2 == 0 {
            1.0
        } else {
            -1.0
        }
    }
}

// ─── Fourier ────────────────────────────────────────────────────────────────

/// Discrete Fourier transform planned with `rustfft`.
#[derive(Clone)]
pub struct Fourier {
    n: usize,
    fft_forward: Arc<dyn Fft<f64>>,
    fft_inverse: Arc<dyn Fft<f64>>,
}

impl fmt::Debug for Fourier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fourier").field("n", &self.n).finish()
    }
}

impl BlockTransform for Fourier {
    type Elem = Complex64;

    const NAME: &'static str = "Fourier";

    fn plan(n: usize) -> AmpResult<Self> {
        if n == 0 {
            return Err(AmpError::config("Fourier block size must be positive"));
        }
        let mut planner = FftPlanner::new();
        Ok(Self { n, fft_forward: planner.plan_fft_forward(n), fft_inverse: planner.plan_fft_inverse(n) })
    }

    fn size(&self) -> usize {
        self.n
    }

    fn forward(&self, block: &mut [Complex64]) {
        self.fft_forward.process(block);
    }

    fn adjoint(&self, block: &mut [Complex64]) {
        // rustfft's inverse is unnormalised, i.e. exactly Fᴴ.
        self.fft_inverse.process(block);
    }

    fn entry(&self, mode: usize, j: usize) -> Complex64 {
        let phase = ((mode * j) % self.n) as f64 / self.n as f64;
        Complex64::from_polar(1.0, -2.0 * core::f64::consts::PI * phase)
    }
}
