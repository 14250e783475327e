//! Virial quantities of halos and disk sizes.

use rsage_types::{Halo, HaloIndex};

use crate::units::{Cosmology, Units};

/// Virial mass of a halo (1e10 Msun/h).
///
/// FOF roots with a valid spherical-overdensity mass use it directly; every
/// other halo falls back to particle count times particle mass.
pub fn virial_mass(halo: &Halo, index: HaloIndex, part_mass: f64) -> f64 {
    if halo.is_fof_root(index) && halo.mvir >= 0.0 {
        halo.mvir
    } else {
        f64::from(halo.len) * part_mass
    }
}

/// Radius enclosing 200 times the critical density at `redshift` (Mpc/h).
pub fn virial_radius(mvir: f64, redshift: f64, cosmo: &Cosmology, units: &Units) -> f64 {
    let rhocrit =
        3.0 * cosmo.hubble_of_z_squared(units, redshift) / (8.0 * std::f64::consts::PI * units.g);
    let fac = 1.0 / (200.0 * 4.0 * std::f64::consts::PI / 3.0 * rhocrit);
    (mvir * fac).cbrt()
}

/// Circular velocity at the virial radius (km/s); zero for a zero radius.
pub fn virial_velocity(mvir: f64, rvir: f64, units: &Units) -> f64 {
    if rvir > 0.0 {
        (units.g * mvir / rvir).sqrt()
    } else {
        0.0
    }
}

/// Exponential disk scale length from the halo spin (Mo, Mao & White).
pub fn disk_scale_radius(spin: &[f64; 3], vvir: f64, rvir: f64) -> f64 {
    if vvir > 0.0 && rvir > 0.0 {
        let magnitude = spin.iter().map(|s| s * s).sum::<f64>().sqrt();
        let lambda = magnitude / (1.414 * vvir * rvir);
        (lambda / 1.414) * rvir
    } else {
        0.1 * rvir
    }
}

/// Dynamical time `Rvir / Vvir` in code units; zero when `Vvir` is zero.
pub fn dynamical_time(rvir: f64, vvir: f64) -> f64 {
    if vvir > 0.0 { rvir / vvir } else { 0.0 }
}
