//! Escape-fraction prescriptions.
//!
//! The parameter file selects one of eight prescriptions by number. The
//! selection is turned into an [`EscapeFractionPrescription`] once at
//! startup and then bound into an [`EscapeFractionFn`], so call sites never
//! branch on the selector again.
//!
//! # Prescriptions
//!
//! | # | Variant | Form |
//! |---|---------|------|
//! | 0 | `Constant` | `fesc` |
//! | 1 | `HaloMassPowerLaw` | `10^(1 - 0.2 log10 Mh)` |
//! | 2 | `HaloMassScaled` | `alpha Mh^beta` |
//! | 3 | `EjectedLinear` | `alpha f_ej + beta` |
//! | 4 | `QuasarBoosted` | `base (1 - w) + boosted w` |
//! | 5 | `HaloMassDecreasing` | log-interpolation, capped at `fesc_low` |
//! | 6 | `HaloMassIncreasing` | log-interpolation, floored at `fesc_low` |
//! | 7 | `EjectedPowerLaw` | `alpha f_ej^beta` |
//!
//! `Mh` is the FOF halo mass in Msun (h removed), `f_ej` the ejected
//! fraction and `w` the quasar fractional-photon weight.

use serde::{Deserialize, Serialize};

use crate::error::RecipeError;

/// Raw escape-fraction settings as they appear in the parameter file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscapeFractionConfig {
    /// Prescription selector, `0..=7`.
    #[serde(rename = "fescPrescription", default)]
    pub prescription: i64,
    /// Constant escape fraction for prescription 0.
    #[serde(rename = "fesc", default = "default_fesc")]
    pub fesc: f64,
    /// Normalisation for prescriptions 2, 3 and 7.
    #[serde(rename = "alpha", default)]
    pub alpha: f64,
    /// Slope or offset for prescriptions 2, 3 and 7.
    #[serde(rename = "beta", default)]
    pub beta: f64,
    /// Escape fraction outside quasar episodes (prescription 4).
    #[serde(rename = "quasar_baseline", default = "default_fesc")]
    pub quasar_baseline: f64,
    /// Escape fraction during quasar episodes (prescription 4).
    #[serde(rename = "quasar_boosted", default = "default_quasar_boosted")]
    pub quasar_boosted: f64,
    /// Boost duration in dynamical times (prescription 4).
    #[serde(rename = "N_dyntime", default = "default_n_dyntime")]
    pub n_dyntime: f64,
    /// Escape fraction at `mh_low` (prescriptions 5 and 6).
    #[serde(rename = "fesc_low", default = "default_fesc_low")]
    pub fesc_low: f64,
    /// Escape fraction at `mh_high` (prescriptions 5 and 6).
    #[serde(rename = "fesc_high", default = "default_fesc_high")]
    pub fesc_high: f64,
    /// Lower anchor halo mass in Msun (prescriptions 5 and 6).
    #[serde(rename = "MH_low", default = "default_mh_low")]
    pub mh_low: f64,
    /// Upper anchor halo mass in Msun (prescriptions 5 and 6).
    #[serde(rename = "MH_high", default = "default_mh_high")]
    pub mh_high: f64,
}

const fn default_fesc() -> f64 {
    0.2
}

const fn default_quasar_boosted() -> f64 {
    1.0
}

const fn default_n_dyntime() -> f64 {
    2.5
}

const fn default_fesc_low() -> f64 {
    0.95
}

const fn default_fesc_high() -> f64 {
    0.05
}

const fn default_mh_low() -> f64 {
    1.0e8
}

const fn default_mh_high() -> f64 {
    1.0e12
}

impl Default for EscapeFractionConfig {
    fn default() -> Self {
        Self {
            prescription: 0,
            fesc: default_fesc(),
            alpha: 0.0,
            beta: 0.0,
            quasar_baseline: default_fesc(),
            quasar_boosted: default_quasar_boosted(),
            n_dyntime: default_n_dyntime(),
            fesc_low: default_fesc_low(),
            fesc_high: default_fesc_high(),
            mh_low: default_mh_low(),
            mh_high: default_mh_high(),
        }
    }
}

/// A fully parameterised escape-fraction prescription.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum EscapeFractionPrescription {
    /// Same escape fraction for every galaxy.
    Constant {
        /// The escape fraction.
        fesc: f64,
    },
    /// Legacy halo-mass power law.
    HaloMassPowerLaw,
    /// `alpha * Mh^beta`.
    HaloMassScaled {
        /// Normalisation.
        alpha: f64,
        /// Power-law slope.
        beta: f64,
    },
    /// `alpha * f_ej + beta`.
    EjectedLinear {
        /// Slope.
        alpha: f64,
        /// Offset.
        beta: f64,
    },
    /// Baseline escape fraction boosted during quasar episodes.
    QuasarBoosted {
        /// Escape fraction outside episodes.
        baseline: f64,
        /// Escape fraction inside episodes.
        boosted: f64,
        /// Episode length in dynamical times.
        n_dyntime: f64,
    },
    /// Escape fraction falling from `fesc_low` towards `fesc_high` with
    /// halo mass.
    HaloMassDecreasing {
        /// Anchor values.
        anchors: MassAnchors,
    },
    /// Escape fraction rising from `fesc_low` towards `fesc_high` with
    /// halo mass.
    HaloMassIncreasing {
        /// Anchor values.
        anchors: MassAnchors,
    },
    /// `alpha * f_ej^beta`.
    EjectedPowerLaw {
        /// Normalisation.
        alpha: f64,
        /// Power-law slope.
        beta: f64,
    },
}

/// Anchor points for the halo-mass interpolating prescriptions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MassAnchors {
    /// Escape fraction at `mh_low`.
    pub fesc_low: f64,
    /// Escape fraction at `mh_high`.
    pub fesc_high: f64,
    /// Lower anchor mass (Msun).
    pub mh_low: f64,
    /// Upper anchor mass (Msun).
    pub mh_high: f64,
}

impl MassAnchors {
    /// Interpolation exponent `-log10(Mh / mh_low) / log10(mh_high / mh_low)`.
    fn exponent(&self, mh: f64) -> f64 {
        -(mh / self.mh_low).log10() / (self.mh_high / self.mh_low).log10()
    }
}

/// Per-galaxy inputs to an escape-fraction evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FescInputs {
    /// FOF halo mass (1e10 Msun/h).
    pub halo_mass: f64,
    /// Ejected gas fraction in `[0, 1]`.
    pub ejected_fraction: f64,
    /// Quasar fractional-photon weight in `[0, 1]`.
    pub quasar_weight: f64,
}

/// A bound escape-fraction function.
pub type EscapeFractionFn = Box<dyn Fn(&FescInputs) -> Result<f64, RecipeError> + Send + Sync>;

impl EscapeFractionPrescription {
    /// Build a prescription from the parameter-file selector and values.
    ///
    /// # Errors
    ///
    /// Returns [`RecipeError::UnknownPrescription`] for a selector outside
    /// `0..=7`, or [`RecipeError::InvalidParameter`] when the anchors of an
    /// interpolating prescription are degenerate.
    pub fn from_config(config: &EscapeFractionConfig) -> Result<Self, RecipeError> {
        let anchors = MassAnchors {
            fesc_low: config.fesc_low,
            fesc_high: config.fesc_high,
            mh_low: config.mh_low,
            mh_high: config.mh_high,
        };
        let prescription = match config.prescription {
            0 => Self::Constant { fesc: config.fesc },
            1 => Self::HaloMassPowerLaw,
            2 => Self::HaloMassScaled {
                alpha: config.alpha,
                beta: config.beta,
            },
            3 => Self::EjectedLinear {
                alpha: config.alpha,
                beta: config.beta,
            },
            4 => Self::QuasarBoosted {
                baseline: config.quasar_baseline,
                boosted: config.quasar_boosted,
                n_dyntime: config.n_dyntime,
            },
            5 => Self::HaloMassDecreasing { anchors },
            6 => Self::HaloMassIncreasing { anchors },
            7 => Self::EjectedPowerLaw {
                alpha: config.alpha,
                beta: config.beta,
            },
            other => return Err(RecipeError::UnknownPrescription(other)),
        };
        prescription.validate()?;
        Ok(prescription)
    }

    fn validate(&self) -> Result<(), RecipeError> {
        match self {
            Self::HaloMassDecreasing { anchors } | Self::HaloMassIncreasing { anchors } => {
                if anchors.mh_low <= 0.0 || anchors.mh_high <= anchors.mh_low {
                    return Err(RecipeError::InvalidParameter {
                        name: "MH_low",
                        reason: format!(
                            "need 0 < MH_low < MH_high, got {} and {}",
                            anchors.mh_low, anchors.mh_high
                        ),
                    });
                }
                if anchors.fesc_high >= 1.0 && matches!(self, Self::HaloMassIncreasing { .. }) {
                    return Err(RecipeError::InvalidParameter {
                        name: "fesc_high",
                        reason: String::from("must be below 1 for the increasing prescription"),
                    });
                }
                Ok(())
            }
            Self::QuasarBoosted { n_dyntime, .. } if *n_dyntime < 0.0 => {
                Err(RecipeError::InvalidParameter {
                    name: "N_dyntime",
                    reason: format!("must be non-negative, got {n_dyntime}"),
                })
            }
            _ => Ok(()),
        }
    }

    /// Short name used in diagnostics.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Constant { .. } => "constant",
            Self::HaloMassPowerLaw => "halo-mass-power-law",
            Self::HaloMassScaled { .. } => "halo-mass-scaled",
            Self::EjectedLinear { .. } => "ejected-linear",
            Self::QuasarBoosted { .. } => "quasar-boosted",
            Self::HaloMassDecreasing { .. } => "halo-mass-decreasing",
            Self::HaloMassIncreasing { .. } => "halo-mass-increasing",
            Self::EjectedPowerLaw { .. } => "ejected-power-law",
        }
    }

    /// Whether escape fractions depend on the quasar state machine.
    pub const fn uses_quasar_tracking(&self) -> bool {
        matches!(self, Self::QuasarBoosted { .. })
    }

    /// Boost duration in dynamical times, zero for non-quasar prescriptions.
    pub const fn quasar_boost_dyntimes(&self) -> f64 {
        match self {
            Self::QuasarBoosted { n_dyntime, .. } => *n_dyntime,
            _ => 0.0,
        }
    }

    /// Evaluate the raw (unchecked) escape fraction.
    fn raw(&self, inputs: &FescInputs, hubble_h: f64) -> f64 {
        let mh = inputs.halo_mass * 1.0e10 / hubble_h;
        match *self {
            Self::Constant { fesc } => fesc,
            Self::HaloMassPowerLaw => 10_f64.powf(1.0 - 0.2 * mh.log10()),
            Self::HaloMassScaled { alpha, beta } => alpha * mh.powf(beta),
            Self::EjectedLinear { alpha, beta } => alpha * inputs.ejected_fraction + beta,
            Self::QuasarBoosted {
                baseline, boosted, ..
            } => baseline * (1.0 - inputs.quasar_weight) + boosted * inputs.quasar_weight,
            Self::HaloMassDecreasing { anchors } => {
                let base = anchors.fesc_low * (anchors.fesc_low / anchors.fesc_high);
                base.powf(anchors.exponent(mh)).min(anchors.fesc_low)
            }
            Self::HaloMassIncreasing { anchors } => {
                let low = 1.0 - anchors.fesc_low;
                let base = low * (low / (1.0 - anchors.fesc_high));
                (1.0 - base.powf(anchors.exponent(mh))).max(anchors.fesc_low)
            }
            Self::EjectedPowerLaw { alpha, beta } => alpha * inputs.ejected_fraction.powf(beta),
        }
    }

    /// Bind this prescription into a reusable function object.
    ///
    /// The returned function fails with
    /// [`RecipeError::InvalidEscapeFraction`] whenever the prescription
    /// yields a value outside `[0, 1]` (or NaN).
    pub fn bind(self, hubble_h: f64) -> EscapeFractionFn {
        Box::new(move |inputs: &FescInputs| {
            let value = self.raw(inputs, hubble_h);
            if (0.0..=1.0).contains(&value) {
                Ok(value)
            } else {
                Err(RecipeError::InvalidEscapeFraction {
                    value,
                    prescription: self.name(),
                    halo_mass: inputs.halo_mass,
                    ejected_fraction: inputs.ejected_fraction,
                })
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const H: f64 = 0.73;

    fn config(prescription: i64) -> EscapeFractionConfig {
        EscapeFractionConfig {
            prescription,
            alpha: 0.5,
            beta: 0.1,
            ..EscapeFractionConfig::default()
        }
    }

    fn eval(prescription: i64, inputs: FescInputs) -> Result<f64, RecipeError> {
        let p = EscapeFractionPrescription::from_config(&config(prescription))?;
        let f = p.bind(H);
        f(&inputs)
    }

    #[test]
    fn every_prescription_binds_and_stays_in_range() {
        let inputs = FescInputs {
            halo_mass: 10.0,
            ejected_fraction: 0.3,
            quasar_weight: 0.5,
        };
        for n in [0, 3, 4, 5, 6, 7] {
            let value = eval(n, inputs);
            assert!(value.is_ok(), "prescription {n} failed: {value:?}");
            let v = value.ok().unwrap_or(-1.0);
            assert!((0.0..=1.0).contains(&v), "prescription {n} gave {v}");
        }
    }

    #[test]
    fn unknown_selector_is_rejected() {
        let result = EscapeFractionPrescription::from_config(&config(8));
        assert!(matches!(result, Err(RecipeError::UnknownPrescription(8))));
    }

    #[test]
    fn constant_ignores_inputs() {
        let v = eval(0, FescInputs::default());
        assert!(v.is_ok_and(|v| (v - 0.2).abs() < 1e-12));
    }

    #[test]
    fn quasar_weight_interpolates() {
        let base = eval(4, FescInputs::default());
        assert!(base.is_ok_and(|v| (v - 0.2).abs() < 1e-12));
        let full = eval(
            4,
            FescInputs {
                quasar_weight: 1.0,
                ..FescInputs::default()
            },
        );
        assert!(full.is_ok_and(|v| (v - 1.0).abs() < 1e-12));
    }

    #[test]
    fn decreasing_prescription_hits_anchors() {
        let at_low = eval(
            5,
            FescInputs {
                halo_mass: 1.0e8 * H / 1.0e10,
                ..FescInputs::default()
            },
        );
        // At the lower anchor the exponent is zero, so the cap applies.
        assert!(at_low.is_ok_and(|v| (v - 0.95).abs() < 1e-9));

        let at_high = eval(
            5,
            FescInputs {
                halo_mass: 1.0e12 * H / 1.0e10,
                ..FescInputs::default()
            },
        );
        assert!(at_high.is_ok_and(|v| v < 0.95));
    }

    #[test]
    fn out_of_range_value_is_an_error() {
        let mut cfg = config(3);
        cfg.alpha = 2.0;
        cfg.beta = 0.5;
        let p = EscapeFractionPrescription::from_config(&cfg);
        assert!(p.is_ok());
        if let Ok(p) = p {
            let f = p.bind(H);
            let result = f(&FescInputs {
                ejected_fraction: 0.9,
                ..FescInputs::default()
            });
            assert!(matches!(
                result,
                Err(RecipeError::InvalidEscapeFraction { .. })
            ));
        }
    }

    #[test]
    fn degenerate_anchors_are_rejected() {
        let mut cfg = config(5);
        cfg.mh_high = cfg.mh_low;
        assert!(EscapeFractionPrescription::from_config(&cfg).is_err());
    }

    #[test]
    fn only_quasar_prescription_tracks_quasars() {
        let p = EscapeFractionPrescription::from_config(&config(4));
        assert!(p.is_ok_and(|p| p.uses_quasar_tracking()));
        let p = EscapeFractionPrescription::from_config(&config(0));
        assert!(p.is_ok_and(|p| !p.uses_quasar_tracking()));
    }
}
