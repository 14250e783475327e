//! A satellite's life from infall to merger, through the public API.

#![allow(clippy::panic, clippy::indexing_slicing)]

use rsage_galaxies::{
    GalaxyError, GalaxyStore, MergedStore, MergerSite, ModelContext, estimate_merge_time,
    perform_merger, record,
};
use rsage_recipes::{Cosmology, EscapeFractionPrescription, PhysicsConfig, Units};
use rsage_types::{GalaxyIndex, GalaxyType, Halo, HaloIndex, MergeType, STEPS};

fn halo(snap: u32, len: u32, root: usize, pos: [f64; 3]) -> Halo {
    Halo {
        snap_num: snap,
        len,
        first_halo_in_fof_group: HaloIndex::new(root),
        next_halo_in_fof_group: None,
        descendant: None,
        first_progenitor: None,
        next_progenitor: None,
        pos,
        vel: [0.0; 3],
        mvir: f64::from(len) * 0.086,
        vmax: 200.0,
        spin: [0.02, 0.01, 0.01],
        most_bound_id: 1,
    }
}

#[test]
fn satellite_merges_and_leaves_a_terminal_record() {
    let physics = PhysicsConfig {
        agn_on: false,
        disk_instability_on: false,
        ..PhysicsConfig::default()
    };
    let cosmo = Cosmology::default();
    let units = Units::new();
    let redshifts = [10.0, 8.0, 6.0];
    let fesc = EscapeFractionPrescription::Constant { fesc: 0.3 }.bind(cosmo.hubble_h);
    let ctx = ModelContext {
        physics: &physics,
        cosmo: &cosmo,
        units: &units,
        redshifts: &redshifts,
        grid_size: 8,
        halo_part_cut: 32,
        reion_snapshot: None,
        fesc: &fesc,
    };

    let halos = vec![
        halo(1, 2000, 0, [30.0, 30.0, 30.0]),
        halo(1, 200, 0, [31.0, 30.0, 30.0]),
    ];
    let mut store = GalaxyStore::new();
    let central = store.allocate(HaloIndex::new(0), &halos, &ctx);
    let satellite = store.allocate(HaloIndex::new(1), &halos, &ctx);
    let (Ok(central), Ok(satellite)) = (central, satellite) else {
        panic!("allocation failed");
    };

    let merge_time = match store.get_mut(satellite) {
        Ok(sat) => {
            sat.galaxy_type = GalaxyType::Satellite;
            sat.baryons.stellar_mass = 0.2;
            sat.baryons.cold_gas = 0.1;
            sat.sfr_disk = [0.5; STEPS];
            let t = estimate_merge_time(HaloIndex::new(1), HaloIndex::new(0), sat, &halos, &ctx);
            sat.merge.merge_time = t.ok().flatten();
            sat.merge.merge_time
        }
        Err(e) => panic!("{e}"),
    };
    assert!(merge_time.is_some_and(|t| t > 0.0));

    if let Ok(c) = store.get_mut(central) {
        c.baryons.stellar_mass = 5.0;
        c.baryons.cold_gas = 1.0;
    }

    let site = MergerSite {
        satellite,
        merger_central: central,
        central,
        snapshot: 1,
        time: 0.04,
        dt: 0.002,
        step: 6,
    };
    let mut merged = MergedStore::new();
    let kind = perform_merger(&mut store, &mut merged, &site, &halos, &ctx, None);
    assert!(matches!(kind, Ok(MergeType::Minor)), "{kind:?}");

    // The survivor is recorded at the end of the snapshot as usual.
    if let Ok(c) = store.get_mut(central) {
        assert!(record(c, &halos, STEPS, &ctx, None).is_ok());
    }
    assert_eq!(store.iter_live().count(), 1);

    let terminal = &merged.records()[0];
    let row = terminal.history().and_then(|h| h.row(1)).copied();
    let sfr = 7.0 * 0.5 * units.sfr_conversion;
    assert!(row.is_some_and(|r| r.is_recorded() && (r.sfr - sfr).abs() < 1e-9 * sfr));

    let json = serde_json::to_value(terminal.merge);
    assert!(json.is_ok_and(|v| v["merge_type"] == "Minor" && v["merge_time"].is_null()));

    let again = perform_merger(&mut store, &mut merged, &site, &halos, &ctx, None);
    assert!(matches!(again, Err(GalaxyError::AlreadyMerged { .. })));
    assert!(store.get(GalaxyIndex::new(1)).is_ok_and(|g| g.is_merged()));
}
