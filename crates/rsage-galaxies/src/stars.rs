//! Applying star formation and supernova feedback to a galaxy.
//!
//! The recipes in `rsage_recipes::physics` decide how much mass moves.
//! These functions move it between reservoirs, carrying metals along.

use rsage_recipes::physics::{burst_efficiency, metallicity, supernova_feedback};
use rsage_types::BurstMode;

use crate::context::ModelContext;
use crate::galaxy::Galaxy;

/// Turn `stars` of cold gas into stars during substep `step`.
///
/// The long-lived fraction `1 - RecycleFraction` stays locked in stars;
/// new metals go back into the cold gas. Without instantaneous recycling
/// the stars also enter the delayed-supernova ring.
pub fn form_stars(
    galaxy: &mut Galaxy,
    stars: f64,
    dt: f64,
    step: usize,
    into_bulge: bool,
    ctx: &ModelContext<'_>,
) {
    if stars <= 0.0 {
        return;
    }
    let physics = ctx.physics;

    if dt > 0.0 {
        let slots = if into_bulge {
            &mut galaxy.sfr_bulge
        } else {
            &mut galaxy.sfr_disk
        };
        if let Some(slot) = slots.get_mut(step) {
            *slot += stars / dt;
        }
    }

    let b = &mut galaxy.baryons;
    let z = metallicity(b.cold_gas, b.metals_cold_gas);
    let locked = (1.0 - physics.recycle_fraction) * stars;
    b.cold_gas -= locked;
    b.metals_cold_gas -= z * locked;
    b.stellar_mass += locked;
    b.metals_stellar_mass += z * locked;
    if into_bulge {
        b.bulge_mass += locked;
        b.metals_bulge_mass += z * locked;
    }

    let new_metals = physics.metal_yield * stars;
    if b.cold_gas > 1.0e-8 {
        b.metals_cold_gas += new_metals;
    } else {
        b.metals_hot_gas += new_metals;
    }

    if !physics.instantaneous_recycling {
        galaxy.supernovae.push(stars);
    }
}

/// Reheat cold gas into the hot halo and eject hot gas from it.
pub fn apply_feedback(galaxy: &mut Galaxy, reheated: f64, ejected: f64) {
    let b = &mut galaxy.baryons;

    let reheated = reheated.clamp(0.0, b.cold_gas.max(0.0));
    if reheated > 0.0 {
        let z = metallicity(b.cold_gas, b.metals_cold_gas);
        b.cold_gas -= reheated;
        b.metals_cold_gas -= z * reheated;
        b.hot_gas += reheated;
        b.metals_hot_gas += z * reheated;
    }

    let ejected = ejected.clamp(0.0, b.hot_gas.max(0.0));
    if ejected > 0.0 {
        let z = metallicity(b.hot_gas, b.metals_hot_gas);
        b.hot_gas -= ejected;
        b.metals_hot_gas -= z * ejected;
        b.ejected_mass += ejected;
        b.metals_ejected_mass += z * ejected;
        b.ejected_mass_sn += ejected;
    }
}

/// Collisional starburst in `galaxy`. Returns the stellar mass formed.
///
/// `feedback_vvir` is the virial velocity of the FOF central, whose
/// potential the supernova ejecta must escape.
pub fn starburst(
    galaxy: &mut Galaxy,
    mass_ratio: f64,
    mode: BurstMode,
    feedback_vvir: f64,
    dt: f64,
    step: usize,
    ctx: &ModelContext<'_>,
) -> f64 {
    let cold = galaxy.baryons.cold_gas;
    let stars = (burst_efficiency(mass_ratio, mode) * cold).max(0.0);
    let feedback_stars = if ctx.physics.instantaneous_recycling {
        stars
    } else {
        0.0
    };
    let masses = supernova_feedback(
        stars,
        feedback_stars,
        cold,
        feedback_vvir,
        ctx.supernova_energy_per_mass(),
        ctx.physics,
    );
    let stars = masses.stars.min(cold.max(0.0));

    form_stars(galaxy, stars, dt, step, true, ctx);
    apply_feedback(galaxy, masses.reheated, masses.ejected);
    stars
}
