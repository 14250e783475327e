//! The galaxy record.

use serde::{Deserialize, Serialize};

use rsage_grid::{GridContributor, QuasarTracker, SnapshotSample};
use rsage_recipes::virial::{disk_scale_radius, virial_mass, virial_radius, virial_velocity};
use rsage_types::{GalaxyId, GalaxyType, Halo, HaloIndex, MergeType, STEPS};

use crate::context::ModelContext;
use crate::error::GalaxyError;
use crate::history::GalaxyHistory;
use crate::sn::DelayedSupernovae;

/// Properties inherited from the host halo.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct HaloProperties {
    /// Comoving position (Mpc/h).
    pub pos: [f64; 3],
    /// Peculiar velocity (km/s).
    pub vel: [f64; 3],
    /// Particle count.
    pub len: u32,
    /// Virial mass (1e10 Msun/h).
    pub mvir: f64,
    /// Virial mass gained since the previous snapshot.
    pub delta_mvir: f64,
    /// Virial radius (Mpc/h).
    pub rvir: f64,
    /// Virial velocity (km/s).
    pub vvir: f64,
    /// Maximum circular velocity (km/s).
    pub vmax: f64,
    /// Exponential disk scale length (Mpc/h).
    pub disk_scale_radius: f64,
}

impl HaloProperties {
    /// Virial properties of `halo` at its own snapshot.
    pub fn of_halo(halo: &Halo, index: HaloIndex, ctx: &ModelContext<'_>) -> Self {
        let mvir = virial_mass(halo, index, ctx.cosmo.part_mass);
        let rvir = virial_radius(mvir, ctx.redshift(halo.snap_num), ctx.cosmo, ctx.units);
        let vvir = virial_velocity(mvir, rvir, ctx.units);
        Self {
            pos: halo.pos,
            vel: halo.vel,
            len: halo.len,
            mvir,
            delta_mvir: 0.0,
            rvir,
            vvir,
            vmax: halo.vmax,
            disk_scale_radius: disk_scale_radius(&halo.spin, vvir, rvir),
        }
    }
}

/// Baryonic reservoirs (1e10 Msun/h), each with its metal content.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Baryons {
    /// Cold disk gas.
    pub cold_gas: f64,
    /// Metals in the cold gas.
    pub metals_cold_gas: f64,
    /// Hot halo gas.
    pub hot_gas: f64,
    /// Metals in the hot gas.
    pub metals_hot_gas: f64,
    /// Gas ejected beyond the halo.
    pub ejected_mass: f64,
    /// Metals in the ejected gas.
    pub metals_ejected_mass: f64,
    /// Part of `ejected_mass` driven out by supernovae.
    pub ejected_mass_sn: f64,
    /// Part of `ejected_mass` driven out by quasar winds.
    pub ejected_mass_qso: f64,
    /// Stars (disk plus bulge).
    pub stellar_mass: f64,
    /// Metals in the stars.
    pub metals_stellar_mass: f64,
    /// Bulge stars.
    pub bulge_mass: f64,
    /// Metals in the bulge.
    pub metals_bulge_mass: f64,
    /// Intracluster stars.
    pub ics: f64,
    /// Metals in the intracluster stars.
    pub metals_ics: f64,
    /// Central black hole.
    pub black_hole_mass: f64,
    /// Mass accreted by the black hole in quasar mode.
    pub quasar_accretion_mass: f64,
}

impl Baryons {
    /// Every baryon attributed to the galaxy.
    pub fn total(&self) -> f64 {
        self.cold_gas
            + self.hot_gas
            + self.ejected_mass
            + self.stellar_mass
            + self.ics
            + self.black_hole_mass
    }

    /// Hot, cold, and ejected gas.
    pub fn total_gas(&self) -> f64 {
        self.hot_gas + self.cold_gas + self.ejected_mass
    }

    /// Remove `mass` of ejected gas, taking the source split and metals
    /// along proportionally.
    pub fn remove_ejected(&mut self, mass: f64) {
        if self.ejected_mass <= 0.0 || mass <= 0.0 {
            return;
        }
        let fraction = (mass / self.ejected_mass).min(1.0);
        self.ejected_mass -= self.ejected_mass * fraction;
        self.metals_ejected_mass -= self.metals_ejected_mass * fraction;
        self.ejected_mass_sn -= self.ejected_mass_sn * fraction;
        self.ejected_mass_qso -= self.ejected_mass_qso * fraction;
    }
}

/// Merger bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MergeState {
    /// How this galaxy ended, if it has.
    pub merge_type: MergeType,
    /// Classification of the latest merger this galaxy absorbed.
    pub last_merge_type: MergeType,
    /// Galaxy this one merged into.
    pub merge_into_id: Option<GalaxyId>,
    /// Remaining time until the satellite merges (code units).
    pub merge_time: Option<f64>,
    /// Lookback time of the latest major merger.
    pub time_of_last_major_merger: Option<f64>,
    /// Lookback time of the latest minor merger.
    pub time_of_last_minor_merger: Option<f64>,
}

/// A galaxy and everything it owns.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct Galaxy {
    /// Unique per worker.
    pub id: GalaxyId,
    /// Central, satellite or orphan.
    pub galaxy_type: GalaxyType,
    /// Halo the galaxy currently sits in.
    pub halo: HaloIndex,
    /// Most-bound particle of the halo the galaxy was born in.
    pub most_bound_id: i64,
    /// Host halo properties.
    pub props: HaloProperties,
    /// Baryonic reservoirs.
    pub baryons: Baryons,
    /// Disk star formation per substep (mass per code time).
    pub sfr_disk: [f64; STEPS],
    /// Bulge star formation per substep (mass per code time).
    pub sfr_bulge: [f64; STEPS],
    /// Delayed supernova ring.
    pub supernovae: DelayedSupernovae,
    /// Merger bookkeeping.
    pub merge: MergeState,
    /// Quasar boost state for the grid.
    pub quasar: QuasarTracker,
    history: Option<GalaxyHistory>,
    is_merged: bool,
}

impl Galaxy {
    /// A fresh central galaxy in `halo`.
    ///
    /// # Errors
    ///
    /// Returns [`GalaxyError::OutOfMemory`] if the owned arrays cannot be
    /// allocated, or a wrapped recipe error for an invalid supernova time
    /// resolution. Nothing is leaked on failure.
    pub fn new(
        id: GalaxyId,
        index: HaloIndex,
        halo: &Halo,
        ctx: &ModelContext<'_>,
    ) -> Result<Self, GalaxyError> {
        let history = GalaxyHistory::try_new(ctx.snapshots())?;
        let supernovae = DelayedSupernovae::try_new(ctx.physics.time_resolution_sn)?;
        Ok(Self {
            id,
            galaxy_type: GalaxyType::Central,
            halo: index,
            most_bound_id: halo.most_bound_id,
            props: HaloProperties::of_halo(halo, index, ctx),
            baryons: Baryons::default(),
            sfr_disk: [0.0; STEPS],
            sfr_bulge: [0.0; STEPS],
            supernovae,
            merge: MergeState::default(),
            quasar: QuasarTracker::new(),
            history: Some(history),
            is_merged: false,
        })
    }

    /// Two-phase deep copy for the merged store.
    ///
    /// Value fields are copied, then the history and the supernova ring are
    /// re-allocated and copied. The copy starts with an idle quasar tracker.
    ///
    /// # Errors
    ///
    /// Returns [`GalaxyError::OutOfMemory`] if an owned array cannot be
    /// allocated.
    pub fn try_clone(&self) -> Result<Self, GalaxyError> {
        let history = self
            .history
            .as_ref()
            .map(GalaxyHistory::try_clone)
            .transpose()?;
        let supernovae = self.supernovae.try_clone()?;
        Ok(Self {
            id: self.id,
            galaxy_type: self.galaxy_type,
            halo: self.halo,
            most_bound_id: self.most_bound_id,
            props: self.props,
            baryons: self.baryons,
            sfr_disk: self.sfr_disk,
            sfr_bulge: self.sfr_bulge,
            supernovae,
            merge: self.merge,
            quasar: QuasarTracker::new(),
            history,
            is_merged: self.is_merged,
        })
    }

    /// Whether the history arrays are still held.
    pub const fn is_allocated(&self) -> bool {
        self.history.is_some()
    }

    /// Whether the galaxy has merged or been disrupted.
    pub const fn is_merged(&self) -> bool {
        self.is_merged
    }

    /// The history, if still held.
    pub const fn history(&self) -> Option<&GalaxyHistory> {
        self.history.as_ref()
    }

    /// Mutable access to the history.
    ///
    /// # Errors
    ///
    /// Returns [`GalaxyError::HistoryReleased`] after release.
    pub fn history_mut(&mut self) -> Result<&mut GalaxyHistory, GalaxyError> {
        let galaxy = self.id;
        self.history
            .as_mut()
            .ok_or(GalaxyError::HistoryReleased { galaxy })
    }

    /// Drop the history arrays.
    ///
    /// # Errors
    ///
    /// Returns [`GalaxyError::DoubleRelease`] if already released.
    pub fn release(&mut self) -> Result<(), GalaxyError> {
        match self.history.take() {
            Some(_) => Ok(()),
            None => Err(GalaxyError::DoubleRelease { galaxy: self.id }),
        }
    }

    /// Freeze the record. Happens exactly once, after release.
    pub(crate) const fn mark_merged(&mut self) {
        self.is_merged = true;
    }

    /// Star formation summed over the first `substeps` substeps.
    pub fn sfr_sum(&self, substeps: usize) -> f64 {
        self.sfr_disk
            .iter()
            .zip(&self.sfr_bulge)
            .take(substeps)
            .map(|(disk, bulge)| disk + bulge)
            .sum()
    }

    /// Clear the per-substep star formation at the start of a snapshot.
    pub const fn reset_sfr(&mut self) {
        self.sfr_disk = [0.0; STEPS];
        self.sfr_bulge = [0.0; STEPS];
    }

    /// Virial mass of the halo at substep `step`, interpolating the mass
    /// gained over the snapshot.
    pub fn current_mvir(&self, step: usize) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        let remaining = 1.0 - (step.saturating_add(1)) as f64 / STEPS as f64;
        self.props.mvir - self.props.delta_mvir * remaining
    }
}

impl GridContributor for Galaxy {
    fn galaxy_id(&self) -> GalaxyId {
        self.id
    }

    fn sample(&self, snapshot: u32) -> Option<SnapshotSample> {
        self.history.as_ref()?.row(snapshot)?.sample()
    }

    fn quasar_mut(&mut self) -> &mut QuasarTracker {
        &mut self.quasar
    }
}
