//! Physical constants, internal code units, and cosmological parameters.
//!
//! Internal units are Mpc/h for length, 1e10 Msun/h for mass and km/s for
//! velocity. Time is derived (`length / velocity`), which makes one code
//! time unit roughly 978 Gyr/h.

use serde::{Deserialize, Serialize};

use rsage_types::STEPS;

/// Gravitational constant (cgs).
pub const GRAVITY: f64 = 6.672e-8;
/// Solar mass in grams.
pub const SOLAR_MASS: f64 = 1.989e33;
/// Seconds per year.
pub const SEC_PER_YEAR: f64 = 3.155e7;
/// Seconds per megayear.
pub const SEC_PER_MEGAYEAR: f64 = 3.155e13;
/// Hubble constant in h/s.
pub const HUBBLE: f64 = 3.2407789e-18;
/// Speed of light in cm/s.
pub const SPEED_OF_LIGHT: f64 = 2.9979e10;

/// Unit length: one megaparsec in centimetres.
pub const UNIT_LENGTH_IN_CM: f64 = 3.08568e24;
/// Unit mass: 1e10 solar masses in grams.
pub const UNIT_MASS_IN_G: f64 = 1.989e43;
/// Unit velocity: one km/s in cm/s.
pub const UNIT_VELOCITY_IN_CM_PER_S: f64 = 1.0e5;

/// Derived code units, computed once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Units {
    /// Code time unit in seconds.
    pub time_in_s: f64,
    /// Code time unit in megayears.
    pub time_in_megayears: f64,
    /// Gravitational constant in code units.
    pub g: f64,
    /// Hubble constant in code units (h = 1).
    pub hubble: f64,
    /// Code energy unit in erg.
    pub energy_in_cgs: f64,
    /// Multiplier turning a summed per-substep SFR into Msun/yr.
    pub sfr_conversion: f64,
}

impl Units {
    /// Derive all code units from the fixed base units.
    pub fn new() -> Self {
        let time_in_s = UNIT_LENGTH_IN_CM / UNIT_VELOCITY_IN_CM_PER_S;
        let g = GRAVITY / UNIT_LENGTH_IN_CM.powi(3) * UNIT_MASS_IN_G * time_in_s.powi(2);
        #[allow(clippy::cast_precision_loss)]
        let steps = STEPS as f64;
        Self {
            time_in_s,
            time_in_megayears: time_in_s / SEC_PER_MEGAYEAR,
            g,
            hubble: HUBBLE * time_in_s,
            energy_in_cgs: UNIT_MASS_IN_G * UNIT_LENGTH_IN_CM.powi(2) / time_in_s.powi(2),
            sfr_conversion: UNIT_MASS_IN_G / time_in_s * SEC_PER_YEAR / SOLAR_MASS / steps,
        }
    }

    /// Speed of light in code velocity units.
    pub fn speed_of_light(&self) -> f64 {
        SPEED_OF_LIGHT / UNIT_VELOCITY_IN_CM_PER_S
    }

    /// Supernova energy per unit mass of stars formed, in code units.
    ///
    /// `energy_sn` is erg per supernova and `eta_sn` supernovae per solar
    /// mass of stars formed.
    pub fn supernova_energy_per_mass(&self, energy_sn: f64, eta_sn: f64, hubble_h: f64) -> f64 {
        let eta_code = eta_sn * (UNIT_MASS_IN_G / SOLAR_MASS) / hubble_h;
        let energy_code = energy_sn / self.energy_in_cgs * hubble_h;
        eta_code * energy_code
    }
}

impl Default for Units {
    fn default() -> Self {
        Self::new()
    }
}

/// Cosmological parameters of the underlying N-body run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Cosmology {
    /// Dimensionless Hubble parameter.
    pub hubble_h: f64,
    /// Matter density parameter.
    pub omega: f64,
    /// Dark-energy density parameter.
    pub omega_lambda: f64,
    /// Cosmic baryon fraction.
    pub baryon_frac: f64,
    /// Simulation particle mass (1e10 Msun/h).
    pub part_mass: f64,
    /// Comoving box side (Mpc/h).
    pub box_size: f64,
}

impl Cosmology {
    /// `H(z)^2` in code units.
    pub fn hubble_of_z_squared(&self, units: &Units, redshift: f64) -> f64 {
        let zplus1 = 1.0 + redshift;
        let curvature = 1.0 - self.omega - self.omega_lambda;
        units.hubble.powi(2)
            * (self.omega * zplus1.powi(3) + curvature * zplus1.powi(2) + self.omega_lambda)
    }

    /// Integrand of the lookback-time integral in scale factor.
    fn time_integrand(&self, a: f64) -> f64 {
        let curvature = 1.0 - self.omega - self.omega_lambda;
        1.0 / (self.omega / a + curvature + self.omega_lambda * a * a).sqrt()
    }

    /// Time between redshift `z` and today, in code units.
    ///
    /// Composite Simpson integration over scale factor with a fixed number of
    /// intervals, which is accurate to well below the snapshot spacing.
    pub fn time_to_present(&self, units: &Units, redshift: f64) -> f64 {
        const INTERVALS: u32 = 2000;
        let a_start = 1.0 / (1.0 + redshift);
        let width = (1.0 - a_start) / f64::from(INTERVALS);

        let mut sum = self.time_integrand(a_start) + self.time_integrand(1.0);
        for i in 1..INTERVALS {
            let a = a_start + f64::from(i) * width;
            let weight = if i % 2 == 1 { 4.0 } else { 2.0 };
            sum += weight * self.time_integrand(a);
        }

        sum * width / 3.0 / units.hubble
    }

    /// Comoving volume of the box in `(Mpc)^3`, h removed.
    pub fn box_volume_mpc3(&self) -> f64 {
        (self.box_size / self.hubble_h).powi(3)
    }
}

impl Default for Cosmology {
    fn default() -> Self {
        // Millennium-like defaults, used by tests and the synthetic demo.
        Self {
            hubble_h: 0.73,
            omega: 0.25,
            omega_lambda: 0.75,
            baryon_frac: 0.17,
            part_mass: 0.0860657,
            box_size: 62.5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_time_unit_is_about_a_terayear() {
        let units = Units::new();
        assert!(units.time_in_megayears > 9.7e5 && units.time_in_megayears < 9.8e5);
    }

    #[test]
    fn hubble_time_in_code_units_is_near_one() {
        let units = Units::new();
        assert!((units.hubble - 100.0).abs() < 0.1);
    }

    #[test]
    fn lookback_time_grows_with_redshift() {
        let units = Units::new();
        let cosmo = Cosmology::default();
        let near = cosmo.time_to_present(&units, 0.5);
        let far = cosmo.time_to_present(&units, 6.0);
        assert!(near > 0.0);
        assert!(far > near);
        assert!(cosmo.time_to_present(&units, 0.0).abs() < 1e-12);
    }

    #[test]
    fn universe_age_is_plausible() {
        let units = Units::new();
        let cosmo = Cosmology::default();
        let h = cosmo.hubble_h;
        let age_gyr = cosmo.time_to_present(&units, 1000.0) * units.time_in_megayears / h / 1000.0;
        assert!(age_gyr > 12.0 && age_gyr < 15.0, "age was {age_gyr}");
    }

    #[test]
    fn sfr_conversion_includes_steps() {
        let units = Units::new();
        #[allow(clippy::cast_precision_loss)]
        let per_step = units.sfr_conversion * STEPS as f64;
        let expected = UNIT_MASS_IN_G / units.time_in_s * SEC_PER_YEAR / SOLAR_MASS;
        assert!((per_step - expected).abs() / expected < 1e-12);
    }
}
