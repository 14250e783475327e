//! Satellite mergers and tidal disruption.
//!
//! # Merger sequence
//!
//! 1. Refuse if either party has already merged.
//! 2. Mass ratio of (stellar + cold) between the two, smaller over larger.
//! 3. Add every reservoir, the star-formation history and the delayed
//!    supernova ring of the satellite into the central.
//! 4. Grow the central black hole; a quasar wind that ejects gas is noted
//!    in the central's history for the grid's quasar tracking.
//! 5. Collisional starburst, which may check disk instability.
//! 6. Classify as major or minor.
//! 7. Record the satellite, copy it into the merged store, release it.
//!
//! Disruption skips the recipes: the satellite's gas goes to the central's
//! hot halo and its stars to the intracluster light.

use tracing::{debug, warn};

use rsage_grid::SelfconGrid;
use rsage_recipes::physics::{
    black_hole_accretion, disk_critical_mass, dynamical_friction_time, metallicity,
    quasar_wind_energy,
};
use rsage_recipes::virial::virial_mass;
use rsage_types::{BurstMode, GalaxyIndex, Halo, HaloIndex, MergeType};

use crate::context::ModelContext;
use crate::error::GalaxyError;
use crate::galaxy::{Baryons, Galaxy, HaloProperties};
use crate::recorder::record;
use crate::stars::starburst;
use crate::store::{GalaxyStore, MergedStore};

/// Where and when a merger takes place.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergerSite {
    /// The galaxy being absorbed.
    pub satellite: GalaxyIndex,
    /// The galaxy absorbing it.
    pub merger_central: GalaxyIndex,
    /// Central of the FOF group, whose potential feedback must escape.
    pub central: GalaxyIndex,
    /// Snapshot being evolved.
    pub snapshot: u32,
    /// Lookback time of the substep (code units).
    pub time: f64,
    /// Substep length (code units).
    pub dt: f64,
    /// Substep index.
    pub step: usize,
}

// ---------------------------------------------------------------------------
// Scheduling
// ---------------------------------------------------------------------------

/// Dynamical-friction time for `galaxy` in `sat_halo` to sink into the
/// centre of `central_halo`.
///
/// `None` means "do not schedule": the halos coincide, or the satellite
/// mass or Coulomb logarithm is not positive.
///
/// # Errors
///
/// Returns [`GalaxyError::HaloNotFound`] if either halo index is invalid.
pub fn estimate_merge_time(
    sat_halo: HaloIndex,
    central_halo: HaloIndex,
    galaxy: &Galaxy,
    halos: &[Halo],
    ctx: &ModelContext<'_>,
) -> Result<Option<f64>, GalaxyError> {
    if sat_halo == central_halo {
        warn!(
            galaxy = %galaxy.id,
            halo = %sat_halo,
            galaxy_type = galaxy.galaxy_type.code(),
            "satellite and central share a halo, merger not scheduled"
        );
        return Ok(None);
    }
    let sat = halos
        .get(sat_halo.into_inner())
        .ok_or(GalaxyError::HaloNotFound(sat_halo))?;
    let central = halos
        .get(central_halo.into_inner())
        .ok_or(GalaxyError::HaloNotFound(central_halo))?;

    let satellite_mass = virial_mass(sat, sat_halo, ctx.cosmo.part_mass)
        + galaxy.baryons.stellar_mass
        + galaxy.baryons.cold_gas;
    let host = HaloProperties::of_halo(central, central_halo, ctx);
    Ok(dynamical_friction_time(
        central.len,
        sat.len,
        satellite_mass,
        host.rvir,
        host.vvir,
        ctx.units,
    ))
}

/// Whether a satellite has been stripped below the disruption threshold
/// at substep `step`.
pub fn is_disrupted(galaxy: &Galaxy, step: usize, ctx: &ModelContext<'_>) -> bool {
    let baryons = galaxy.baryons.stellar_mass + galaxy.baryons.cold_gas;
    baryons > 0.0 && galaxy.current_mvir(step) / baryons <= ctx.physics.threshold_sat_disruption
}

// ---------------------------------------------------------------------------
// Merger
// ---------------------------------------------------------------------------

/// Merge the satellite into the merger central. Returns the merger's
/// classification.
///
/// # Errors
///
/// Returns [`GalaxyError::AlreadyMerged`] if either party has merged,
/// [`GalaxyError::SelfMerger`] or [`GalaxyError::GalaxyNotFound`] for bad
/// indices, and any error from recording or copying the satellite.
pub fn perform_merger(
    store: &mut GalaxyStore,
    merged: &mut MergedStore,
    site: &MergerSite,
    halos: &[Halo],
    ctx: &ModelContext<'_>,
    selfcon: Option<&mut SelfconGrid>,
) -> Result<MergeType, GalaxyError> {
    let feedback_vvir = store.get(site.central)?.props.vvir;
    let (sat, central) = store.pair_mut(site.satellite, site.merger_central)?;
    ensure_live(sat, central)?;

    let ratio = mass_ratio(&sat.baryons, &central.baryons);
    add_galaxies_together(central, sat);

    let mut wind = 0.0;
    if ctx.physics.agn_on {
        wind += grow_black_hole(central, ratio, ctx);
    }
    wind += collisional_starburst(central, ratio, BurstMode::Merger, feedback_vvir, site, ctx);
    if wind > 0.0 {
        note_quasar_wind(central, site, sat.props.len, ctx)?;
    }

    let kind = if ratio > ctx.physics.thresh_major_merger {
        make_bulge_from_burst(central);
        central.merge.time_of_last_major_merger = Some(site.time);
        MergeType::Major
    } else {
        central.merge.time_of_last_minor_merger = Some(site.time);
        MergeType::Minor
    };
    central.merge.last_merge_type = kind;
    sat.merge.merge_type = kind;
    sat.merge.merge_into_id = Some(central.id);
    sat.merge.merge_time = None;

    debug!(
        satellite = %sat.id,
        central = %central.id,
        snapshot = site.snapshot,
        step = site.step,
        ratio,
        kind = ?kind,
        "galaxies merged"
    );

    retire(sat, site.step.saturating_add(1), merged, halos, ctx, selfcon)?;
    Ok(kind)
}

/// Dissolve the satellite into the central's hot gas and intracluster
/// stars.
///
/// # Errors
///
/// Same as [`perform_merger`].
#[allow(clippy::too_many_arguments)]
pub fn disrupt_to_ics(
    store: &mut GalaxyStore,
    merged: &mut MergedStore,
    satellite: GalaxyIndex,
    central: GalaxyIndex,
    completed_substeps: usize,
    halos: &[Halo],
    ctx: &ModelContext<'_>,
    selfcon: Option<&mut SelfconGrid>,
) -> Result<(), GalaxyError> {
    let (sat, central) = store.pair_mut(satellite, central)?;
    ensure_live(sat, central)?;

    let s = sat.baryons;
    let c = &mut central.baryons;
    c.hot_gas += s.cold_gas + s.hot_gas;
    c.metals_hot_gas += s.metals_cold_gas + s.metals_hot_gas;
    c.ejected_mass += s.ejected_mass;
    c.metals_ejected_mass += s.metals_ejected_mass;
    c.ejected_mass_sn += s.ejected_mass_sn;
    c.ejected_mass_qso += s.ejected_mass_qso;
    c.ics += s.ics + s.stellar_mass;
    c.metals_ics += s.metals_ics + s.metals_stellar_mass;

    sat.merge.merge_type = MergeType::Disruption;
    sat.merge.merge_into_id = Some(central.id);
    sat.merge.merge_time = None;

    debug!(satellite = %sat.id, central = %central.id, "satellite disrupted");
    retire(sat, completed_substeps, merged, halos, ctx, selfcon)
}

fn ensure_live(sat: &Galaxy, central: &Galaxy) -> Result<(), GalaxyError> {
    if sat.is_merged() {
        return Err(GalaxyError::AlreadyMerged {
            galaxy: sat.id,
            other: central.id,
        });
    }
    if central.is_merged() {
        return Err(GalaxyError::AlreadyMerged {
            galaxy: central.id,
            other: sat.id,
        });
    }
    Ok(())
}

/// Record the satellite's last snapshot, copy it into the merged store,
/// then free and freeze it.
fn retire(
    sat: &mut Galaxy,
    completed_substeps: usize,
    merged: &mut MergedStore,
    halos: &[Halo],
    ctx: &ModelContext<'_>,
    selfcon: Option<&mut SelfconGrid>,
) -> Result<(), GalaxyError> {
    record(sat, halos, completed_substeps, ctx, selfcon)?;
    merged.push_copy(sat)?;
    sat.release()?;
    sat.mark_merged();
    Ok(())
}

fn mass_ratio(a: &Baryons, b: &Baryons) -> f64 {
    let ma = a.stellar_mass + a.cold_gas;
    let mb = b.stellar_mass + b.cold_gas;
    let (small, large) = if ma < mb { (ma, mb) } else { (mb, ma) };
    if large > 0.0 { small / large } else { 1.0 }
}

fn add_galaxies_together(central: &mut Galaxy, sat: &Galaxy) {
    let s = sat.baryons;
    let c = &mut central.baryons;
    c.cold_gas += s.cold_gas;
    c.metals_cold_gas += s.metals_cold_gas;
    c.stellar_mass += s.stellar_mass;
    c.metals_stellar_mass += s.metals_stellar_mass;
    c.hot_gas += s.hot_gas;
    c.metals_hot_gas += s.metals_hot_gas;
    c.ejected_mass += s.ejected_mass;
    c.metals_ejected_mass += s.metals_ejected_mass;
    c.ejected_mass_sn += s.ejected_mass_sn;
    c.ejected_mass_qso += s.ejected_mass_qso;
    c.ics += s.ics;
    c.metals_ics += s.metals_ics;
    c.black_hole_mass += s.black_hole_mass;
    c.quasar_accretion_mass += s.quasar_accretion_mass;

    // Satellite stars settle in the bulge.
    c.bulge_mass += s.stellar_mass;
    c.metals_bulge_mass += s.metals_stellar_mass;

    let incoming = sat.sfr_disk.iter().zip(&sat.sfr_bulge);
    for (bulge, (disk_s, bulge_s)) in central.sfr_bulge.iter_mut().zip(incoming) {
        *bulge += disk_s + bulge_s;
    }
    central.supernovae.absorb(&sat.supernovae);
}

// ---------------------------------------------------------------------------
// Black hole growth and quasar winds
// ---------------------------------------------------------------------------

/// Feed the black hole from the cold disk and blow the resulting quasar
/// wind. Returns the gas mass the wind ejected.
pub fn grow_black_hole(galaxy: &mut Galaxy, mass_ratio: f64, ctx: &ModelContext<'_>) -> f64 {
    let vvir = galaxy.props.vvir;
    let b = &mut galaxy.baryons;
    let accreted = black_hole_accretion(mass_ratio, vvir, b.cold_gas, ctx.physics);
    if accreted <= 0.0 {
        return 0.0;
    }
    let z = metallicity(b.cold_gas, b.metals_cold_gas);
    b.black_hole_mass += accreted;
    b.cold_gas -= accreted;
    b.metals_cold_gas -= z * accreted;
    b.quasar_accretion_mass += accreted;

    quasar_wind(b, vvir, quasar_wind_energy(accreted, ctx.physics, ctx.units))
}

/// Eject cold gas, and hot gas too if the wind is strong enough, when the
/// wind energy beats the gas binding energy.
fn quasar_wind(b: &mut Baryons, vvir: f64, energy: f64) -> f64 {
    let cold_energy = 0.5 * b.cold_gas * vvir * vvir;
    let hot_energy = 0.5 * b.hot_gas * vvir * vvir;
    let mut ejected = 0.0;

    if energy > cold_energy {
        ejected += b.cold_gas;
        b.ejected_mass += b.cold_gas;
        b.metals_ejected_mass += b.metals_cold_gas;
        b.cold_gas = 0.0;
        b.metals_cold_gas = 0.0;
    }
    if energy > cold_energy + hot_energy {
        ejected += b.hot_gas;
        b.ejected_mass += b.hot_gas;
        b.metals_ejected_mass += b.metals_hot_gas;
        b.hot_gas = 0.0;
        b.metals_hot_gas = 0.0;
    }
    b.ejected_mass_qso += ejected;
    ejected
}

fn note_quasar_wind(
    central: &mut Galaxy,
    site: &MergerSite,
    companion_len: u32,
    ctx: &ModelContext<'_>,
) -> Result<(), GalaxyError> {
    let galaxy = central.id;
    let snapshots = ctx.snapshots();
    let step = i32::try_from(site.step).map_err(|_err| GalaxyError::ArithmeticOverflow {
        what: "quasar substep",
    })?;
    let len = i32::try_from(companion_len).map_err(|_err| GalaxyError::InvalidLength {
        galaxy,
        snapshot: site.snapshot,
        len: u64::from(companion_len),
    })?;
    let row = central
        .history_mut()?
        .row_mut(site.snapshot)
        .ok_or(GalaxyError::SnapshotOutOfRange {
            galaxy,
            snapshot: site.snapshot,
            snapshots,
        })?;
    row.quasar_activity = 1;
    row.quasar_substep = step;
    row.len_merger_gal = len;
    debug!(galaxy = %galaxy, snapshot = site.snapshot, step, companion_len, "quasar wind");
    Ok(())
}

// ---------------------------------------------------------------------------
// Starbursts and disk instability
// ---------------------------------------------------------------------------

/// Burst, then check the disk if the merger was minor. Returns the mass
/// ejected by any quasar wind the disk check set off.
fn collisional_starburst(
    galaxy: &mut Galaxy,
    mass_ratio: f64,
    mode: BurstMode,
    feedback_vvir: f64,
    site: &MergerSite,
    ctx: &ModelContext<'_>,
) -> f64 {
    starburst(galaxy, mass_ratio, mode, feedback_vvir, site.dt, site.step, ctx);
    if ctx.physics.disk_instability_on
        && mode == BurstMode::Merger
        && mass_ratio < ctx.physics.thresh_major_merger
    {
        check_disk_instability(galaxy, feedback_vvir, site.dt, site.step, ctx)
    } else {
        0.0
    }
}

/// Move the part of the disk above the stability limit into the bulge.
///
/// Unstable stars go straight to the bulge. Unstable gas feeds the black
/// hole and bursts. Returns the mass ejected by the resulting quasar wind.
pub fn check_disk_instability(
    galaxy: &mut Galaxy,
    feedback_vvir: f64,
    dt: f64,
    step: usize,
    ctx: &ModelContext<'_>,
) -> f64 {
    let b = galaxy.baryons;
    let disk_mass = b.cold_gas + (b.stellar_mass - b.bulge_mass);
    if disk_mass <= 0.0 {
        return 0.0;
    }
    let critical = disk_critical_mass(
        galaxy.props.vmax,
        galaxy.props.disk_scale_radius,
        ctx.units,
    );
    if disk_mass <= critical {
        return 0.0;
    }

    let excess = (disk_mass - critical).min(disk_mass);
    let unstable_gas = excess * b.cold_gas.max(0.0) / disk_mass;
    let unstable_stars = excess - unstable_gas;

    if unstable_stars > 0.0 {
        let z = metallicity(
            b.stellar_mass - b.bulge_mass,
            b.metals_stellar_mass - b.metals_bulge_mass,
        );
        let gb = &mut galaxy.baryons;
        gb.bulge_mass = (gb.bulge_mass + unstable_stars).min(gb.stellar_mass);
        gb.metals_bulge_mass =
            (gb.metals_bulge_mass + z * unstable_stars).min(gb.metals_stellar_mass);
    }

    let mut wind = 0.0;
    if unstable_gas > 0.0 && b.cold_gas > 0.0 {
        let ratio = unstable_gas / b.cold_gas;
        if ctx.physics.agn_on {
            wind += grow_black_hole(galaxy, ratio, ctx);
        }
        starburst(galaxy, ratio, BurstMode::DiskInstability, feedback_vvir, dt, step, ctx);
    }
    wind
}

/// A major merger turns the whole stellar body into a bulge.
pub fn make_bulge_from_burst(galaxy: &mut Galaxy) {
    galaxy.baryons.bulge_mass = galaxy.baryons.stellar_mass;
    galaxy.baryons.metals_bulge_mass = galaxy.baryons.metals_stellar_mass;
    for (bulge, disk) in galaxy.sfr_bulge.iter_mut().zip(galaxy.sfr_disk.iter_mut()) {
        *bulge += *disk;
        *disk = 0.0;
    }
}

#[cfg(test)]
#[allow(clippy::indexing_slicing, clippy::panic)]
mod tests {
    use rsage_types::GalaxyType;

    use super::*;
    use crate::context::testing::{Fixture, halo};

    /// A 1000-particle FOF root with a 100-particle subhalo, both at
    /// snapshot 2, each holding one galaxy.
    fn setup(fx: &Fixture) -> (Vec<Halo>, GalaxyStore) {
        let mut sub = halo(2, 100, 0);
        sub.pos = [12.0, 20.0, 30.0];
        let halos = vec![halo(2, 1000, 0), sub];
        let mut store = GalaxyStore::new();
        let ctx = fx.ctx();
        for i in 0..2 {
            if let Err(e) = store.allocate(HaloIndex::new(i), &halos, &ctx) {
                panic!("allocate: {e}");
            }
        }
        if let Ok(sat) = store.get_mut(GalaxyIndex::new(1)) {
            sat.galaxy_type = GalaxyType::Satellite;
        }
        (halos, store)
    }

    fn site() -> MergerSite {
        MergerSite {
            satellite: GalaxyIndex::new(1),
            merger_central: GalaxyIndex::new(0),
            central: GalaxyIndex::new(0),
            snapshot: 2,
            time: 0.05,
            dt: 0.001,
            step: 3,
        }
    }

    fn galaxy(store: &mut GalaxyStore, i: usize) -> &mut Galaxy {
        match store.get_mut(GalaxyIndex::new(i)) {
            Ok(g) => g,
            Err(e) => panic!("galaxy {i}: {e}"),
        }
    }

    #[test]
    fn minor_merger_sets_only_the_minor_time() {
        let mut fx = Fixture::new();
        fx.physics.disk_instability_on = false;
        fx.physics.agn_on = false;
        let (halos, mut store) = setup(&fx);
        let mut merged = MergedStore::new();
        galaxy(&mut store, 0).baryons.stellar_mass = 10.0;
        galaxy(&mut store, 1).baryons.stellar_mass = 1.5;

        let kind = perform_merger(&mut store, &mut merged, &site(), &halos, &fx.ctx(), None);
        assert!(matches!(kind, Ok(MergeType::Minor)), "{kind:?}");

        let central = galaxy(&mut store, 0);
        assert_eq!(central.merge.last_merge_type, MergeType::Minor);
        assert_eq!(central.merge.time_of_last_minor_merger, Some(0.05));
        assert!(central.merge.time_of_last_major_merger.is_none());
        assert!((central.baryons.stellar_mass - 11.5).abs() < 1e-12);
        assert!((central.baryons.bulge_mass - 1.5).abs() < 1e-12);

        let central_id = central.id;
        let sat = galaxy(&mut store, 1);
        assert!(sat.is_merged());
        assert!(!sat.is_allocated());
        assert_eq!(sat.merge.merge_type, MergeType::Minor);
        assert_eq!(sat.merge.merge_into_id, Some(central_id));

        assert_eq!(merged.len(), 1);
        let record = &merged.records()[0];
        assert!(record.is_allocated());
        assert!(record.history().and_then(|h| h.row(2)).is_some_and(|r| r.is_recorded()));
    }

    #[test]
    fn major_merger_builds_a_bulge() {
        let mut fx = Fixture::new();
        fx.physics.agn_on = false;
        let (halos, mut store) = setup(&fx);
        let mut merged = MergedStore::new();
        {
            let c = galaxy(&mut store, 0);
            c.baryons.stellar_mass = 2.0;
            c.baryons.metals_stellar_mass = 0.02;
            c.sfr_disk[0] = 4.0;
        }
        galaxy(&mut store, 1).baryons.stellar_mass = 1.0;

        let kind = perform_merger(&mut store, &mut merged, &site(), &halos, &fx.ctx(), None);
        assert!(matches!(kind, Ok(MergeType::Major)), "{kind:?}");

        let central = galaxy(&mut store, 0);
        assert_eq!(central.merge.time_of_last_major_merger, Some(0.05));
        assert!(central.merge.time_of_last_minor_merger.is_none());
        assert!((central.baryons.bulge_mass - central.baryons.stellar_mass).abs() < 1e-12);
        assert!(central.sfr_disk.iter().all(|s| *s == 0.0));
        assert!((central.sfr_bulge[0] - 4.0).abs() < 1e-12);
    }

    #[test]
    fn merging_twice_is_refused() {
        let fx = Fixture::new();
        let (halos, mut store) = setup(&fx);
        let mut merged = MergedStore::new();
        let first = perform_merger(&mut store, &mut merged, &site(), &halos, &fx.ctx(), None);
        assert!(first.is_ok(), "{first:?}");
        let second = perform_merger(&mut store, &mut merged, &site(), &halos, &fx.ctx(), None);
        assert!(matches!(second, Err(GalaxyError::AlreadyMerged { .. })));
        assert_eq!(merged.len(), 1);
    }

    #[test]
    fn empty_galaxies_merge_as_equals() {
        let mut fx = Fixture::new();
        fx.physics.agn_on = false;
        let (halos, mut store) = setup(&fx);
        let mut merged = MergedStore::new();
        let kind = perform_merger(&mut store, &mut merged, &site(), &halos, &fx.ctx(), None);
        assert!(matches!(kind, Ok(MergeType::Major)));
    }

    #[test]
    fn merger_conserves_baryons_without_feedback() {
        let mut fx = Fixture::new();
        fx.physics.supernova_on = false;
        fx.physics.agn_on = false;
        let (halos, mut store) = setup(&fx);
        let mut merged = MergedStore::new();
        {
            let c = galaxy(&mut store, 0);
            c.baryons.cold_gas = 3.0;
            c.baryons.hot_gas = 5.0;
            c.baryons.stellar_mass = 4.0;
        }
        {
            let s = galaxy(&mut store, 1);
            s.baryons.cold_gas = 1.0;
            s.baryons.hot_gas = 0.5;
            s.baryons.stellar_mass = 0.5;
            s.baryons.ejected_mass = 0.25;
        }
        let before: f64 = store.iter().map(|g| g.baryons.total()).sum();
        assert!(perform_merger(&mut store, &mut merged, &site(), &halos, &fx.ctx(), None).is_ok());
        let after = galaxy(&mut store, 0).baryons.total();
        assert!((before - after).abs() < 1e-9);
    }

    #[test]
    fn strong_quasar_wind_is_noted_in_history() {
        let mut fx = Fixture::new();
        fx.physics.disk_instability_on = false;
        fx.physics.black_hole_growth_rate = 1.0;
        fx.physics.quasar_mode_efficiency = 1.0;
        let (halos, mut store) = setup(&fx);
        let mut merged = MergedStore::new();
        {
            let c = galaxy(&mut store, 0);
            c.baryons.cold_gas = 1.0;
            c.baryons.stellar_mass = 1.0;
        }
        galaxy(&mut store, 1).baryons.cold_gas = 1.0;

        assert!(perform_merger(&mut store, &mut merged, &site(), &halos, &fx.ctx(), None).is_ok());
        let central = galaxy(&mut store, 0);
        assert!(central.baryons.black_hole_mass > 0.0);
        assert!(central.baryons.ejected_mass_qso > 0.0);
        let row = central.history().and_then(|h| h.row(2)).copied();
        assert!(row.is_some_and(|r| {
            r.quasar_activity == 1 && r.quasar_substep == 3 && r.len_merger_gal == 100
        }));
    }

    #[test]
    fn disruption_moves_stars_to_ics() {
        let fx = Fixture::new();
        let (halos, mut store) = setup(&fx);
        let mut merged = MergedStore::new();
        {
            let s = galaxy(&mut store, 1);
            s.baryons.cold_gas = 1.0;
            s.baryons.hot_gas = 2.0;
            s.baryons.stellar_mass = 3.0;
            s.baryons.ics = 0.5;
        }
        let r = disrupt_to_ics(
            &mut store,
            &mut merged,
            GalaxyIndex::new(1),
            GalaxyIndex::new(0),
            4,
            &halos,
            &fx.ctx(),
            None,
        );
        assert!(r.is_ok(), "{r:?}");
        let central = galaxy(&mut store, 0);
        assert!((central.baryons.hot_gas - 3.0).abs() < 1e-12);
        assert!((central.baryons.ics - 3.5).abs() < 1e-12);
        assert!(central.baryons.stellar_mass.abs() < f64::EPSILON);
        let sat = galaxy(&mut store, 1);
        assert_eq!(sat.merge.merge_type, MergeType::Disruption);
        assert!(sat.is_merged());
        assert_eq!(merged.len(), 1);
    }

    #[test]
    fn disruption_threshold_compares_halo_to_baryons() {
        let fx = Fixture::new();
        let (_, mut store) = setup(&fx);
        let g = galaxy(&mut store, 1);
        g.props.mvir = 1.0;
        g.props.delta_mvir = 0.0;
        assert!(!is_disrupted(g, 9, &fx.ctx()));
        g.baryons.stellar_mass = 0.5;
        assert!(!is_disrupted(g, 9, &fx.ctx()));
        g.baryons.stellar_mass = 1.0;
        assert!(is_disrupted(g, 9, &fx.ctx()));
    }

    #[test]
    fn merge_time_needs_distinct_halos() {
        let fx = Fixture::new();
        let (halos, mut store) = setup(&fx);
        let ctx = fx.ctx();
        let g = galaxy(&mut store, 1);
        let same = estimate_merge_time(HaloIndex::new(0), HaloIndex::new(0), g, &halos, &ctx);
        assert!(matches!(same, Ok(None)));
        let t = estimate_merge_time(HaloIndex::new(1), HaloIndex::new(0), g, &halos, &ctx);
        assert!(matches!(t, Ok(Some(t)) if t > 0.0));
        let missing = estimate_merge_time(HaloIndex::new(7), HaloIndex::new(0), g, &halos, &ctx);
        assert!(matches!(missing, Err(GalaxyError::HaloNotFound(_))));
    }

    #[test]
    fn unstable_disk_feeds_the_bulge() {
        let fx = Fixture::new();
        let (_, mut store) = setup(&fx);
        let ctx = fx.ctx();
        let g = galaxy(&mut store, 0);
        g.baryons.stellar_mass = 10.0;
        let vvir = g.props.vvir;
        check_disk_instability(g, vvir, 0.001, 0, &ctx);
        assert!(g.baryons.bulge_mass > 0.0);
        assert!(g.baryons.bulge_mass <= g.baryons.stellar_mass);
    }
}
