//! Read-only model parameters shared by every galaxy operation.

use rsage_recipes::{Cosmology, EscapeFractionFn, PhysicsConfig, Units};

/// Everything a galaxy operation needs to know about the run.
///
/// Borrowed from the driver's simulation context; nothing here changes
/// while a worker evolves its trees.
pub struct ModelContext<'a> {
    /// Recipe switches and coefficients.
    pub physics: &'a PhysicsConfig,
    /// Cosmological parameters.
    pub cosmo: &'a Cosmology,
    /// Derived code units.
    pub units: &'a Units,
    /// Redshift of every snapshot.
    pub redshifts: &'a [f64],
    /// Cells per grid side.
    pub grid_size: u32,
    /// Minimum particle count for grid and quasar bookkeeping.
    pub halo_part_cut: u32,
    /// Snapshot whose photons feed the self-consistent grid.
    pub reion_snapshot: Option<u32>,
    /// Bound escape-fraction recipe.
    pub fesc: &'a EscapeFractionFn,
}

impl ModelContext<'_> {
    /// Number of snapshots in the run.
    pub const fn snapshots(&self) -> usize {
        self.redshifts.len()
    }

    /// Redshift of `snapshot`, or zero past the end of the table.
    pub fn redshift(&self, snapshot: u32) -> f64 {
        usize::try_from(snapshot)
            .ok()
            .and_then(|s| self.redshifts.get(s))
            .copied()
            .unwrap_or(0.0)
    }

    /// Supernova energy per unit stellar mass in code units.
    pub fn supernova_energy_per_mass(&self) -> f64 {
        self.units.supernova_energy_per_mass(
            self.physics.energy_sn,
            self.physics.eta_sn,
            self.cosmo.hubble_h,
        )
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Fixtures shared by this crate's unit tests.

    use rsage_recipes::{Cosmology, EscapeFractionFn, EscapeFractionPrescription, PhysicsConfig, Units};
    use rsage_types::{Halo, HaloIndex};

    use super::ModelContext;

    /// Owned parameters a [`ModelContext`] can borrow from.
    pub struct Fixture {
        pub physics: PhysicsConfig,
        pub cosmo: Cosmology,
        pub units: Units,
        pub redshifts: Vec<f64>,
        pub fesc: EscapeFractionFn,
    }

    impl Fixture {
        pub fn new() -> Self {
            let cosmo = Cosmology::default();
            Self {
                physics: PhysicsConfig::default(),
                cosmo,
                units: Units::new(),
                redshifts: vec![12.0, 10.0, 8.0, 7.0, 6.0, 5.0],
                fesc: EscapeFractionPrescription::Constant { fesc: 0.2 }.bind(cosmo.hubble_h),
            }
        }

        pub fn ctx(&self) -> ModelContext<'_> {
            ModelContext {
                physics: &self.physics,
                cosmo: &self.cosmo,
                units: &self.units,
                redshifts: &self.redshifts,
                grid_size: 4,
                halo_part_cut: 32,
                reion_snapshot: None,
                fesc: &self.fesc,
            }
        }
    }

    /// A root halo of `len` particles at `snap`.
    pub fn halo(snap: u32, len: u32, index: usize) -> Halo {
        Halo {
            snap_num: snap,
            len,
            first_halo_in_fof_group: HaloIndex::new(index),
            next_halo_in_fof_group: None,
            descendant: None,
            first_progenitor: None,
            next_progenitor: None,
            pos: [10.0, 20.0, 30.0],
            vel: [0.0; 3],
            mvir: f64::from(len) * 0.0860657,
            vmax: 150.0,
            spin: [0.01, 0.02, 0.005],
            most_bound_id: 42,
        }
    }
}
