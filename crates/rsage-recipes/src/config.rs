//! Configuration for the physical recipes.
//!
//! Every field maps to a parameter-file key through `#[serde(rename)]` and
//! has a named default, so a parameter file only needs to mention the knobs
//! it changes. The [`PhysicsConfig`] struct bundles every tunable so that
//! the evolution driver and tests can override defaults.

use serde::{Deserialize, Deserializer, Serialize};

/// Tunable coefficients and on/off switches for the physics recipes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct PhysicsConfig {
    /// Enable supernova reheating and ejection.
    #[serde(rename = "SupernovaRecipeOn", default = "default_true", deserialize_with = "flag")]
    pub supernova_on: bool,
    /// Enable black-hole growth and quasar winds during mergers.
    #[serde(rename = "AGNrecipeOn", default = "default_true", deserialize_with = "flag")]
    pub agn_on: bool,
    /// Enable the disk-instability check after minor mergers.
    #[serde(rename = "DiskInstabilityOn", default = "default_true", deserialize_with = "flag")]
    pub disk_instability_on: bool,
    /// Enable photo-ionization suppression of infall.
    #[serde(rename = "ReionizationOn", default = "default_true", deserialize_with = "flag")]
    pub reionization_on: bool,
    /// Instantaneous recycling (`true`) or delayed supernova feedback.
    #[serde(rename = "IRA", default = "default_true", deserialize_with = "flag")]
    pub instantaneous_recycling: bool,

    /// Star-formation efficiency per dynamical time.
    #[serde(rename = "SfrEfficiency", default = "default_sfr_efficiency")]
    pub sfr_efficiency: f64,
    /// Mass of cold gas reheated per unit of stars formed.
    #[serde(rename = "FeedbackReheatingEpsilon", default = "default_reheating_epsilon")]
    pub feedback_reheating_epsilon: f64,
    /// Fraction of supernova energy available to eject hot gas.
    #[serde(rename = "FeedbackEjectionEfficiency", default = "default_ejection_efficiency")]
    pub feedback_ejection_efficiency: f64,
    /// Scales the critical velocity for reincorporating ejected gas.
    #[serde(rename = "ReIncorporationFactor", default = "default_reincorporation_factor")]
    pub reincorporation_factor: f64,
    /// Black-hole accretion efficiency during mergers.
    #[serde(rename = "BlackHoleGrowthRate", default = "default_bh_growth_rate")]
    pub black_hole_growth_rate: f64,
    /// Fraction of accreted rest mass released as quasar wind energy.
    #[serde(rename = "QuasarModeEfficiency", default = "default_quasar_efficiency")]
    pub quasar_mode_efficiency: f64,
    /// Fraction of newly formed stellar mass returned to the cold gas.
    #[serde(rename = "RecycleFraction", default = "default_recycle_fraction")]
    pub recycle_fraction: f64,
    /// Metal mass produced per unit stellar mass formed.
    #[serde(rename = "Yield", default = "default_yield")]
    pub metal_yield: f64,
    /// Mass ratio above which a merger is major.
    #[serde(rename = "ThreshMajorMerger", default = "default_thresh_major")]
    pub thresh_major_merger: f64,
    /// Subhalo-to-baryon mass ratio below which satellites are disrupted.
    #[serde(rename = "ThresholdSatDisruption", default = "default_sat_disruption")]
    pub threshold_sat_disruption: f64,
    /// Redshift at which reionization starts.
    #[serde(rename = "Reionization_z0", default = "default_reion_z0")]
    pub reionization_z0: f64,
    /// Redshift at which reionization completes.
    #[serde(rename = "Reionization_zr", default = "default_reion_zr")]
    pub reionization_zr: f64,
    /// Energy per supernova (erg).
    #[serde(rename = "EnergySN", default = "default_energy_sn")]
    pub energy_sn: f64,
    /// Supernovae per solar mass of stars formed.
    #[serde(rename = "EtaSN", default = "default_eta_sn")]
    pub eta_sn: f64,
    /// Width of one delayed-supernova bin (Myr).
    #[serde(rename = "TimeResolutionSN", default = "default_time_resolution_sn")]
    pub time_resolution_sn: f64,
}

const fn default_true() -> bool {
    true
}

const fn default_sfr_efficiency() -> f64 {
    0.05
}

const fn default_reheating_epsilon() -> f64 {
    3.0
}

const fn default_ejection_efficiency() -> f64 {
    0.3
}

const fn default_reincorporation_factor() -> f64 {
    0.15
}

const fn default_bh_growth_rate() -> f64 {
    0.015
}

const fn default_quasar_efficiency() -> f64 {
    0.005
}

const fn default_recycle_fraction() -> f64 {
    0.43
}

const fn default_yield() -> f64 {
    0.025
}

const fn default_thresh_major() -> f64 {
    0.3
}

const fn default_sat_disruption() -> f64 {
    1.0
}

const fn default_reion_z0() -> f64 {
    8.0
}

const fn default_reion_zr() -> f64 {
    7.0
}

const fn default_energy_sn() -> f64 {
    1.0e51
}

const fn default_eta_sn() -> f64 {
    5.0e-3
}

const fn default_time_resolution_sn() -> f64 {
    10.0
}

/// Accept `0`/`1` integers as well as booleans for on/off switches.
///
/// # Errors
///
/// Fails for anything that is neither a boolean nor an integer.
pub fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }

    match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => Ok(b),
        Flag::Int(i) => Ok(i != 0),
    }
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            supernova_on: true,
            agn_on: true,
            disk_instability_on: true,
            reionization_on: true,
            instantaneous_recycling: true,
            sfr_efficiency: default_sfr_efficiency(),
            feedback_reheating_epsilon: default_reheating_epsilon(),
            feedback_ejection_efficiency: default_ejection_efficiency(),
            reincorporation_factor: default_reincorporation_factor(),
            black_hole_growth_rate: default_bh_growth_rate(),
            quasar_mode_efficiency: default_quasar_efficiency(),
            recycle_fraction: default_recycle_fraction(),
            metal_yield: default_yield(),
            thresh_major_merger: default_thresh_major(),
            threshold_sat_disruption: default_sat_disruption(),
            reionization_z0: default_reion_z0(),
            reionization_zr: default_reion_zr(),
            energy_sn: default_energy_sn(),
            eta_sn: default_eta_sn(),
            time_resolution_sn: default_time_resolution_sn(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_map_gives_defaults() {
        let parsed: Result<PhysicsConfig, _> = serde_json::from_str("{}");
        assert!(parsed.is_ok());
        assert_eq!(parsed.ok(), Some(PhysicsConfig::default()));
    }

    #[test]
    fn integer_flags_are_accepted() {
        let parsed: Result<PhysicsConfig, _> =
            serde_json::from_str(r#"{"AGNrecipeOn": 0, "SupernovaRecipeOn": 1, "IRA": false}"#);
        assert!(parsed.is_ok());
        if let Ok(cfg) = parsed {
            assert!(!cfg.agn_on);
            assert!(cfg.supernova_on);
            assert!(!cfg.instantaneous_recycling);
        }
    }

    #[test]
    fn integer_values_fill_float_fields() {
        let parsed: Result<PhysicsConfig, _> = serde_json::from_str(r#"{"ThreshMajorMerger": 1}"#);
        assert!(parsed.is_ok_and(|c| (c.thresh_major_merger - 1.0).abs() < f64::EPSILON));
    }
}
