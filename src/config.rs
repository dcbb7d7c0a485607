/*
 * This source code is licensed under the Business Source License 1.1.
 * See LICENSE in the root directory for full details.
 */

//! Run configuration.
//!
//! One immutable [`AmpConfig`] is built by the caller, validated once and
//! passed by reference to the engine. Nothing in the crate reads ambient
//! or global options.
//!
//! # Defaults
//!
//! | Option | Default |
//! |--------|---------|
//! | `method` | `AMPtap` |
//! | `save_speed` / `save_memory` | `true` / `false` |
//! | `nb_iter` | 1000 |
//! | `print` | 10 (0 = silent) |
//! | `conv` | 1e-8 |
//! | `learn` | off |
//! | `signal_rho` | none (prior's own rho; named priors default to `M/(10N)`) |
//! | `var_noise` | 1e-10 |
//! | `dump_mes` | 0.5 |
//! | `dump_learn` | 0 |
//! | `option_noise` | off |
//! | `remove_mean` | off |
//! | `alpha_big` | off |

use core::fmt;
use core::str::FromStr;

use crate::error::{AmpError, AmpResult};

// ─── Method ─────────────────────────────────────────────────────────────────

/// AMP variant, selecting the message model and the operator it runs on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Method {
    /// Dense real operator; measurement and cavity variances use the mean
    /// squared entry of the operator instead of the full squared products.
    Amp,
    /// Dense real operator with the full `G∘G` products (TAP form).
    AmpTap,
    /// Dense complex operator, complex messages.
    AmpComplex,
    /// Seeded Fourier operator, complex messages.
    AmpSeededFourier,
    /// Seeded Hadamard operator, real messages.
    AmpSeededHadamard,
}

impl Method {
    /// Name as accepted by [`FromStr`].
    pub fn name(self) -> &'static str {
        match self {
            Method::Amp => "AMP",
            Method::AmpTap => "AMPtap",
            Method::AmpComplex => "AMPcomplex",
            Method::AmpSeededFourier => "AMPseededFourier",
            Method::AmpSeededHadamard => "AMPseededHadamard",
        }
    }

    /// Whether messages are complex.
    pub fn is_complex(self) -> bool {
        matches!(self, Method::AmpComplex | Method::AmpSeededFourier)
    }

    /// Whether the method runs on a seeded structured operator.
    pub fn is_seeded(self) -> bool {
        matches!(self, Method::AmpSeededFourier | Method::AmpSeededHadamard)
    }

    /// Whether variances are approximated by one shared value.
    pub fn uniform_variance(self) -> bool {
        matches!(self, Method::Amp)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Method {
    type Err = AmpError;

    fn from_str(s: &str) -> AmpResult<Self> {
        match s {
            "AMP" => Ok(Method::Amp),
            "AMPtap" => Ok(Method::AmpTap),
            "AMPcomplex" => Ok(Method::AmpComplex),
            "AMPseededFourier" => Ok(Method::AmpSeededFourier),
            "AMPseededHadamard" => Ok(Method::AmpSeededHadamard),
            other => Err(AmpError::config(format!("unknown method `{other}`"))),
        }
    }
}

// ─── MeanRemoval ────────────────────────────────────────────────────────────

/// Centring of a dense operator and its measurements before iterating.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MeanRemoval {
    /// Operator used as given (`remove_mean = 0`).
    #[default]
    Off,
    /// Each column's own mean is removed (`remove_mean = 1`).
    PerColumn,
    /// One global mean removed from every entry (`remove_mean = 2`).
    ///
    /// Recognised but refused by [`AmpConfig::validate`]: the shift `s·Σx`
    /// it leaves in every measurement is unknown, so the centred system no
    /// longer describes `y`. Use [`MeanRemoval::PerColumn`].
    Shared,
}

impl MeanRemoval {
    pub(crate) fn shared_unsupported() -> AmpError {
        AmpError::config(
            "remove_mean = 2 (shared) cannot keep y = G·x: the global shift depends on the unknown signal; \
             use remove_mean = 1",
        )
    }
}

impl TryFrom<u8> for MeanRemoval {
    type Error = AmpError;

    fn try_from(code: u8) -> AmpResult<Self> {
        match code {
            0 => Ok(MeanRemoval::Off),
            1 => Ok(MeanRemoval::PerColumn),
            2 => Ok(MeanRemoval::Shared),
            other => Err(AmpError::config(format!("remove_mean must be 0, 1 or 2, got {other}"))),
        }
    }
}

// ─── Storage ────────────────────────────────────────────────────────────────

/// Whether squared and transposed operator products are cached.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Storage {
    /// Recompute `G∘G` and `Gᵀ` entries on every multiply.
    SaveMemory,
    /// Cache `Gᴴ`, `G∘Ḡ` and its transpose once at setup.
    SaveSpeed,
}

// ─── AmpConfig ──────────────────────────────────────────────────────────────

/// Options for one reconstruction run.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct AmpConfig {
    /// AMP variant.
    pub method: Method,
    /// Recompute operator products on the fly. Exclusive with `save_speed`.
    pub save_memory: bool,
    /// Cache operator products. Exclusive with `save_memory`.
    pub save_speed: bool,
    /// Iteration cap.
    pub nb_iter: usize,
    /// Progress line every `print` iterations; 0 silences it.
    pub print: usize,
    /// Convergence threshold on the mean squared change of the estimate.
    pub conv: f64,
    /// Learn prior hyperparameters (and the noise, with `option_noise`).
    pub learn: bool,
    /// Overrides the prior's density when set.
    pub signal_rho: Option<f64>,
    /// Initial noise variance.
    pub var_noise: f64,
    /// Damping of the message updates, in `[0, 1)`.
    pub dump_mes: f64,
    /// Damping of the learning updates, in `[0, 1]`.
    pub dump_learn: f64,
    /// Learn the noise variance per row block when `learn` is set.
    pub option_noise: bool,
    /// Operator centring (dense operators only).
    pub remove_mean: MeanRemoval,
    /// Normalise the Onsager term with the fresh measurement variance.
    /// Intended for measurement rates at or above one.
    pub alpha_big: bool,
}

impl Default for AmpConfig {
    fn default() -> Self {
        Self {
            method: Method::AmpTap,
            save_memory: false,
            save_speed: true,
            nb_iter: 1000,
            print: 10,
            conv: 1e-8,
            learn: false,
            signal_rho: None,
            var_noise: 1e-10,
            dump_mes: 0.5,
            dump_learn: 0.0,
            option_noise: false,
            remove_mean: MeanRemoval::Off,
            alpha_big: false,
        }
    }
}

impl AmpConfig {
    /// Default options for `method`.
    pub fn with_method(method: Method) -> Self {
        Self { method, ..Self::default() }
    }

    /// The storage mode selected by the exclusive `save_memory`/`save_speed` pair.
    pub fn storage(&self) -> AmpResult<Storage> {
        match (self.save_memory, self.save_speed) {
            (true, false) => Ok(Storage::SaveMemory),
            (false, true) => Ok(Storage::SaveSpeed),
            (true, true) => Err(AmpError::config("save_memory and save_speed are mutually exclusive")),
            (false, false) => Err(AmpError::config("one of save_memory or save_speed must be set")),
        }
    }

    /// Check every option against its domain.
    pub fn validate(&self) -> AmpResult<()> {
        self.storage()?;
        if self.nb_iter == 0 {
            return Err(AmpError::config("nb_iter must be positive"));
        }
        if !(self.conv > 0.0 && self.conv.is_finite()) {
            return Err(AmpError::config(format!("conv must be positive, got {}", self.conv)));
        }
        if !(self.var_noise > 0.0 && self.var_noise.is_finite()) {
            return Err(AmpError::config(format!("var_noise must be positive, got {}", self.var_noise)));
        }
        if !(0.0..1.0).contains(&self.dump_mes) {
            return Err(AmpError::config(format!("dump_mes must lie in [0, 1), got {}", self.dump_mes)));
        }
        if !(0.0..=1.0).contains(&self.dump_learn) {
            return Err(AmpError::config(format!("dump_learn must lie in [0, 1], got {}", self.dump_learn)));
        }
        if let Some(rho) = self.signal_rho {
            if !(rho > 0.0 && rho <= 1.0) {
                return Err(AmpError::config(format!("signal_rho must lie in (0, 1], got {rho}")));
            }
        }
        if self.remove_mean != MeanRemoval::Off && self.method.is_seeded() {
            return Err(AmpError::config("remove_mean applies to dense operators only"));
        }
        if self.remove_mean == MeanRemoval::Shared {
            return Err(MeanRemoval::shared_unsupported());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = AmpConfig::default();
        assert_eq!(c.nb_iter, 1000);
        assert_eq!(c.print, 10);
        assert_eq!(c.conv, 1e-8);
        assert_eq!(c.var_noise, 1e-10);
        assert_eq!(c.dump_mes, 0.5);
        assert_eq!(c.storage(), Ok(Storage::SaveSpeed));
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_storage_flags_are_exclusive() {
        let both = AmpConfig { save_memory: true, save_speed: true, ..AmpConfig::default() };
        assert!(matches!(both.validate(), Err(AmpError::Configuration(_))));
        let neither = AmpConfig { save_memory: false, save_speed: false, ..AmpConfig::default() };
        assert!(neither.validate().is_err());
        let memory = AmpConfig { save_memory: true, save_speed: false, ..AmpConfig::default() };
        assert_eq!(memory.storage(), Ok(Storage::SaveMemory));
    }

    #[test]
    fn test_method_names_round_trip() {
        for m in [
            Method::Amp,
            Method::AmpTap,
            Method::AmpComplex,
            Method::AmpSeededFourier,
            Method::AmpSeededHadamard,
        ] {
            assert_eq!(m.name().parse::<Method>(), Ok(m));
        }
        assert!("AMPfast".parse::<Method>().is_err());
    }

    #[test]
    fn test_mean_removal_codes() {
        assert_eq!(MeanRemoval::try_from(1), Ok(MeanRemoval::PerColumn));
        assert_eq!(MeanRemoval::try_from(2), Ok(MeanRemoval::Shared));
        assert!(MeanRemoval::try_from(3).is_err());
    }

    #[test]
    fn test_out_of_domain_options() {
        let bad_damping = AmpConfig { dump_mes: 1.0, ..AmpConfig::default() };
        assert!(bad_damping.validate().is_err());
        let bad_rho = AmpConfig { signal_rho: Some(1.5), ..AmpConfig::default() };
        assert!(bad_rho.validate().is_err());
        let seeded_centring = AmpConfig {
            method: Method::AmpSeededHadamard,
            remove_mean: MeanRemoval::PerColumn,
            ..AmpConfig::default()
        };
        assert!(seeded_centring.validate().is_err());
        let shared = AmpConfig { remove_mean: MeanRemoval::Shared, ..AmpConfig::default() };
        assert!(matches!(shared.validate(), Err(AmpError::Configuration(_))));
    }
}
