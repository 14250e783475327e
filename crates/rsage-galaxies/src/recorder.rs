//! Snapshot recording of galaxy state into its history.

use tracing::trace;

use rsage_grid::{SelfconGrid, cell_index};
use rsage_recipes::physics::{metallicity, reionization_modifier};
use rsage_recipes::virial::{dynamical_time, virial_mass};
use rsage_recipes::{FescInputs, calculate_photons, photons_e50, uv_magnitude};
use rsage_types::{GalaxyId, Halo};

use crate::context::ModelContext;
use crate::error::GalaxyError;
use crate::galaxy::{Baryons, Galaxy};

/// Capture `galaxy`'s state at the snapshot of its current halo.
///
/// `completed_substeps` is how many substeps of star formation count
/// towards the snapshot's SFR: all of them for survivors, fewer for a
/// galaxy that merged part-way through. At the reionization-feedback
/// snapshot the galaxy's escaping photons also go into `selfcon`.
///
/// # Errors
///
/// Returns [`GalaxyError::HaloNotFound`], a wrapped
/// [`rsage_grid::GridError::GridIndexOutOfBounds`],
/// [`GalaxyError::InvalidFraction`], [`GalaxyError::InvalidLength`],
/// [`GalaxyError::SnapshotOutOfRange`], [`GalaxyError::HistoryReleased`],
/// or a wrapped escape-fraction error.
pub fn record(
    galaxy: &mut Galaxy,
    halos: &[Halo],
    completed_substeps: usize,
    ctx: &ModelContext<'_>,
    selfcon: Option<&mut SelfconGrid>,
) -> Result<(), GalaxyError> {
    let id = galaxy.id;
    let halo = halos
        .get(galaxy.halo.into_inner())
        .ok_or(GalaxyError::HaloNotFound(galaxy.halo))?;
    let snapshot = halo.snap_num;
    let fof_index = halo.first_halo_in_fof_group;
    let fof_halo = halos
        .get(fof_index.into_inner())
        .ok_or(GalaxyError::HaloNotFound(fof_index))?;
    let fof_mass = virial_mass(fof_halo, fof_index, ctx.cosmo.part_mass);

    let props = galaxy.props;
    let b = galaxy.baryons;
    let type_code = galaxy.galaxy_type.code();

    // 1. Grid cell.
    let cell = cell_index(&props.pos, ctx.grid_size, ctx.cosmo.box_size)?;

    // 2-4. Star formation and metallicity.
    let sfr = galaxy.sfr_sum(completed_substeps) * ctx.units.sfr_conversion;
    let z = metallicity(b.cold_gas, b.metals_cold_gas);

    // 5. Ejected fractions.
    let ejected_fraction = ejected_share(id, snapshot, "ejected fraction", b.ejected_mass, &b)?;
    let ejected_fraction_sn =
        ejected_share(id, snapshot, "supernova ejected fraction", b.ejected_mass_sn, &b)?;
    let ejected_fraction_qso =
        ejected_share(id, snapshot, "quasar ejected fraction", b.ejected_mass_qso, &b)?;

    // 6. Photons, escape fraction and derived scalars.
    let photons = calculate_photons(sfr, z);
    let fesc = (ctx.fesc)(&FescInputs {
        halo_mass: fof_mass,
        ejected_fraction,
        quasar_weight: 0.0,
    })?;

    let len = i32::try_from(props.len).map_err(|_err| GalaxyError::InvalidLength {
        galaxy: id,
        snapshot,
        len: u64::from(props.len),
    })?;
    let cell_code = i32::try_from(cell).map_err(|_err| GalaxyError::ArithmeticOverflow {
        what: "recorded cell index",
    })?;
    let fof_code =
        i32::try_from(fof_index.into_inner()).map_err(|_err| GalaxyError::ArithmeticOverflow {
            what: "recorded FOF halo index",
        })?;

    let redshift = ctx.redshift(snapshot);
    let reion = reionization_modifier(fof_mass, redshift, ctx.physics, ctx.cosmo, ctx.units);
    let tdyn_myr = dynamical_time(props.rvir, props.vvir) * ctx.units.time_in_megayears;

    let snapshots = ctx.snapshots();
    let row = galaxy
        .history_mut()?
        .row_mut(snapshot)
        .ok_or(GalaxyError::SnapshotOutOfRange {
            galaxy: id,
            snapshot,
            snapshots,
        })?;
    row.cell = cell_code;
    row.galaxy_type = type_code;
    row.fof_halo_nr = fof_code;
    row.len = len;
    row.cold_gas = b.cold_gas;
    row.hot_gas = b.hot_gas;
    row.ejected_mass = b.ejected_mass;
    row.stellar_mass = b.stellar_mass;
    row.black_hole_mass = b.black_hole_mass;
    row.sfr = sfr;
    row.metallicity = z;
    row.fof_mass = fof_mass;
    row.halo_mass = props.mvir;
    row.ejected_fraction = ejected_fraction;
    row.ejected_fraction_sn = ejected_fraction_sn;
    row.ejected_fraction_qso = ejected_fraction_qso;
    row.dynamical_time_myr = tdyn_myr;
    row.reion_modifier = reion;
    row.ngamma_hi = photons.hi;
    row.ngamma_hei = photons.hei;
    row.ngamma_heii = photons.heii;
    row.fesc = fesc;
    row.muv = uv_magnitude(sfr);

    // 7. Self-consistent photon grid.
    if let Some(grid) = selfcon
        && ctx.reion_snapshot == Some(snapshot)
        && props.len > ctx.halo_part_cut
    {
        grid.add(&props.pos, photons_e50(photons.hi) * fesc)?;
    }

    trace!(galaxy = %id, snapshot, cell, sfr, "galaxy recorded");
    Ok(())
}

/// `part / (hot + cold + ejected)`.
///
/// Exactly zero for negative ejected mass or no gas at all. Anything else
/// outside `[0, 1]` means the reservoirs are corrupt.
fn ejected_share(
    galaxy: GalaxyId,
    snapshot: u32,
    name: &'static str,
    part: f64,
    b: &Baryons,
) -> Result<f64, GalaxyError> {
    let gas = b.total_gas();
    if b.ejected_mass < 0.0 || gas == 0.0 {
        return Ok(0.0);
    }
    let value = part / gas;
    if !(0.0..=1.0).contains(&value) {
        return Err(GalaxyError::InvalidFraction {
            galaxy,
            snapshot,
            name,
            value,
            ejected: b.ejected_mass,
            hot: b.hot_gas,
            cold: b.cold_gas,
        });
    }
    Ok(value.clamp(0.0, 1.0))
}

#[cfg(test)]
#[allow(clippy::indexing_slicing, clippy::panic)]
mod tests {
    use rsage_types::{GalaxyType, HaloIndex, STEPS};

    use super::*;
    use crate::context::testing::{Fixture, halo};

    fn galaxy(fx: &Fixture, halos: &[Halo]) -> Galaxy {
        let g = Galaxy::new(GalaxyId::new(7), HaloIndex::new(0), &halos[0], &fx.ctx());
        match g {
            Ok(g) => g,
            Err(e) => panic!("galaxy: {e}"),
        }
    }

    #[test]
    fn record_fills_the_snapshot_row() {
        let fx = Fixture::new();
        let halos = vec![halo(3, 200, 0)];
        let mut g = galaxy(&fx, &halos);
        g.baryons.cold_gas = 1.0;
        g.baryons.metals_cold_gas = 0.01;
        g.baryons.hot_gas = 2.0;
        g.baryons.ejected_mass = 1.0;
        g.baryons.ejected_mass_sn = 0.75;
        g.baryons.ejected_mass_qso = 0.25;
        g.baryons.stellar_mass = 0.5;
        g.sfr_disk = [1.0; STEPS];

        let r = record(&mut g, &halos, STEPS, &fx.ctx(), None);
        assert!(r.is_ok(), "{r:?}");

        let row = g.history().and_then(|h| h.row(3)).copied();
        assert!(row.is_some());
        if let Some(row) = row {
            // [10, 20, 30] in a 62.5 box on a 4^3 grid is (0, 1, 1).
            assert_eq!(row.cell, 5);
            assert_eq!(row.galaxy_type, GalaxyType::Central.code());
            assert_eq!(row.len, 200);
            assert!((row.ejected_fraction - 0.25).abs() < 1e-12);
            assert!((row.ejected_fraction_sn - 0.1875).abs() < 1e-12);
            assert!((row.metallicity - 0.01).abs() < 1e-12);
            let expected_sfr = 10.0 * fx.units.sfr_conversion;
            assert!((row.sfr - expected_sfr).abs() < 1e-9 * expected_sfr);
            assert!(row.ngamma_hi > 50.0);
            assert!((row.fesc - 0.2).abs() < 1e-12);
            assert!(row.muv < 0.0);
            assert!(row.dynamical_time_myr > 0.0);
        }
    }

    #[test]
    fn quiescent_galaxy_has_zero_photons_and_sentinel_magnitude() {
        let fx = Fixture::new();
        let halos = vec![halo(2, 200, 0)];
        let mut g = galaxy(&fx, &halos);
        assert!(record(&mut g, &halos, STEPS, &fx.ctx(), None).is_ok());
        let row = g.history().and_then(|h| h.row(2)).copied();
        assert!(row.is_some_and(|r| {
            r.ngamma_hi.abs() < f64::EPSILON
                && (r.muv - rsage_recipes::NO_LUMINOSITY_MAGNITUDE).abs() < f64::EPSILON
                && r.ejected_fraction.abs() < f64::EPSILON
        }));
    }

    #[test]
    fn partial_substeps_only_count_completed_star_formation() {
        let fx = Fixture::new();
        let halos = vec![halo(2, 200, 0)];
        let mut g = galaxy(&fx, &halos);
        g.sfr_disk = [1.0; STEPS];
        assert!(record(&mut g, &halos, 4, &fx.ctx(), None).is_ok());
        let sfr = g.history().and_then(|h| h.row(2)).map(|r| r.sfr);
        let expected = 4.0 * fx.units.sfr_conversion;
        assert!(sfr.is_some_and(|s| (s - expected).abs() < 1e-9 * expected));
    }

    #[test]
    fn corrupt_ejected_split_is_an_error() {
        let fx = Fixture::new();
        let halos = vec![halo(2, 200, 0)];
        let mut g = galaxy(&fx, &halos);
        g.baryons.ejected_mass = 1.0;
        g.baryons.ejected_mass_sn = 5.0;
        let r = record(&mut g, &halos, STEPS, &fx.ctx(), None);
        assert!(matches!(r, Err(GalaxyError::InvalidFraction { .. })));
    }

    #[test]
    fn position_outside_box_is_fatal() {
        let fx = Fixture::new();
        let halos = vec![halo(2, 200, 0)];
        let mut g = galaxy(&fx, &halos);
        g.props.pos = [70.0, 1.0, 1.0];
        let r = record(&mut g, &halos, STEPS, &fx.ctx(), None);
        assert!(matches!(r, Err(GalaxyError::Grid(_))));
    }

    #[test]
    fn reionization_snapshot_feeds_selfcon_grid() {
        let fx = Fixture::new();
        let halos = vec![halo(4, 200, 0)];
        let mut g = galaxy(&fx, &halos);
        g.baryons.cold_gas = 1.0;
        g.sfr_disk = [1.0; STEPS];
        let mut ctx = fx.ctx();
        ctx.reion_snapshot = Some(4);
        let grid = SelfconGrid::new(ctx.grid_size, fx.cosmo.box_size);
        assert!(grid.is_ok());
        if let Ok(mut grid) = grid {
            assert!(record(&mut g, &halos, STEPS, &ctx, Some(&mut grid)).is_ok());
            assert_eq!(grid.sources, 1);
            assert!(grid.total() > 0.0);
        }
    }

    #[test]
    fn released_history_cannot_be_recorded() {
        let fx = Fixture::new();
        let halos = vec![halo(2, 200, 0)];
        let mut g = galaxy(&fx, &halos);
        assert!(g.release().is_ok());
        let r = record(&mut g, &halos, STEPS, &fx.ctx(), None);
        assert!(matches!(r, Err(GalaxyError::HistoryReleased { .. })));
    }
}
