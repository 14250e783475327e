//! Snapshot-indexed history of a galaxy.
//!
//! One [`HistoryRow`] per snapshot. Rows a galaxy never reached keep their
//! sentinel values, which the grid and the binary writer both recognise.

use serde::{Deserialize, Serialize};

use rsage_grid::{QuasarEvent, SnapshotSample};
use rsage_recipes::NO_LUMINOSITY_MAGNITUDE;
use rsage_types::PhotonBudget;

use crate::error::GalaxyError;

/// Sentinel for integer fields the galaxy never wrote.
pub const UNSET: i32 = -1;

/// Sentinel for ejected fractions the galaxy never wrote.
pub const UNSET_FRACTION: f64 = -1.0;

/// Everything recorded about a galaxy at one snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoryRow {
    /// Flattened grid cell, or [`UNSET`].
    pub cell: i32,
    /// Galaxy type code, or [`UNSET`].
    pub galaxy_type: i32,
    /// Index of the host FOF root halo, or [`UNSET`].
    pub fof_halo_nr: i32,
    /// Host halo particle count, or [`UNSET`].
    pub len: i32,
    /// 1 if a quasar wind fired this snapshot.
    pub quasar_activity: i32,
    /// Substep the wind fired in.
    pub quasar_substep: i32,
    /// Particle count of the merging companion that triggered the wind.
    pub len_merger_gal: i32,
    /// Cold gas (1e10 Msun/h).
    pub cold_gas: f64,
    /// Hot gas (1e10 Msun/h).
    pub hot_gas: f64,
    /// Ejected gas (1e10 Msun/h).
    pub ejected_mass: f64,
    /// Stellar mass (1e10 Msun/h).
    pub stellar_mass: f64,
    /// Black-hole mass (1e10 Msun/h).
    pub black_hole_mass: f64,
    /// Star-formation rate (Msun/yr).
    pub sfr: f64,
    /// Cold-gas metallicity.
    pub metallicity: f64,
    /// Virial mass of the host FOF root (1e10 Msun/h).
    pub fof_mass: f64,
    /// Virial mass of the galaxy's own halo (1e10 Msun/h).
    pub halo_mass: f64,
    /// Ejected over total gas, or [`UNSET_FRACTION`].
    pub ejected_fraction: f64,
    /// Supernova-ejected over total gas, or [`UNSET_FRACTION`].
    pub ejected_fraction_sn: f64,
    /// Quasar-ejected over total gas, or [`UNSET_FRACTION`].
    pub ejected_fraction_qso: f64,
    /// Dynamical time `Rvir / Vvir` (Myr).
    pub dynamical_time_myr: f64,
    /// Reionization infall modifier.
    pub reion_modifier: f64,
    /// log10 HI-ionizing photon rate.
    pub ngamma_hi: f64,
    /// log10 HeI-ionizing photon rate.
    pub ngamma_hei: f64,
    /// log10 HeII-ionizing photon rate.
    pub ngamma_heii: f64,
    /// Escape fraction.
    pub fesc: f64,
    /// 1500 Angstrom absolute magnitude.
    pub muv: f64,
}

impl HistoryRow {
    /// A row the galaxy never wrote.
    pub const EMPTY: Self = Self {
        cell: UNSET,
        galaxy_type: UNSET,
        fof_halo_nr: UNSET,
        len: UNSET,
        quasar_activity: 0,
        quasar_substep: 0,
        len_merger_gal: 0,
        cold_gas: 0.0,
        hot_gas: 0.0,
        ejected_mass: 0.0,
        stellar_mass: 0.0,
        black_hole_mass: 0.0,
        sfr: 0.0,
        metallicity: 0.0,
        fof_mass: 0.0,
        halo_mass: 0.0,
        ejected_fraction: UNSET_FRACTION,
        ejected_fraction_sn: UNSET_FRACTION,
        ejected_fraction_qso: UNSET_FRACTION,
        dynamical_time_myr: 0.0,
        reion_modifier: 0.0,
        ngamma_hi: 0.0,
        ngamma_hei: 0.0,
        ngamma_heii: 0.0,
        fesc: 0.0,
        muv: NO_LUMINOSITY_MAGNITUDE,
    };

    /// Whether the galaxy was recorded at this snapshot.
    pub const fn is_recorded(&self) -> bool {
        self.cell >= 0
    }

    /// The row as seen by the grid aggregator, if recorded.
    pub fn sample(&self) -> Option<SnapshotSample> {
        let cell = usize::try_from(self.cell).ok()?;
        let len = u32::try_from(self.len).ok()?;
        Some(SnapshotSample {
            cell,
            len,
            stellar_mass: self.stellar_mass,
            sfr: self.sfr,
            fof_mass: self.fof_mass,
            ejected_fraction: self.ejected_fraction,
            fesc: self.fesc,
            photons: PhotonBudget {
                hi: self.ngamma_hi,
                hei: self.ngamma_hei,
                heii: self.ngamma_heii,
            },
            quasar: QuasarEvent {
                fired: self.quasar_activity == 1,
                substep: u32::try_from(self.quasar_substep).unwrap_or(0),
                companion_len: u32::try_from(self.len_merger_gal).unwrap_or(0),
                dynamical_time_myr: self.dynamical_time_myr,
            },
        })
    }
}

impl Default for HistoryRow {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// The full history of one galaxy.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct GalaxyHistory {
    rows: Vec<HistoryRow>,
}

impl GalaxyHistory {
    /// Allocate `snapshots` empty rows.
    ///
    /// # Errors
    ///
    /// Returns [`GalaxyError::OutOfMemory`] if the allocation fails.
    pub fn try_new(snapshots: usize) -> Result<Self, GalaxyError> {
        let mut rows = Vec::new();
        rows.try_reserve_exact(snapshots)
            .map_err(|_err| GalaxyError::OutOfMemory {
                what: "galaxy history",
                len: snapshots,
            })?;
        rows.resize(snapshots, HistoryRow::EMPTY);
        Ok(Self { rows })
    }

    /// Deep copy into a freshly allocated history.
    ///
    /// # Errors
    ///
    /// Returns [`GalaxyError::OutOfMemory`] if the allocation fails.
    pub fn try_clone(&self) -> Result<Self, GalaxyError> {
        let mut rows = Vec::new();
        rows.try_reserve_exact(self.rows.len())
            .map_err(|_err| GalaxyError::OutOfMemory {
                what: "merged galaxy history",
                len: self.rows.len(),
            })?;
        rows.extend_from_slice(&self.rows);
        Ok(Self { rows })
    }

    /// Number of snapshots covered.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the history covers no snapshots.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row at `snapshot`.
    pub fn row(&self, snapshot: u32) -> Option<&HistoryRow> {
        usize::try_from(snapshot).ok().and_then(|s| self.rows.get(s))
    }

    /// Mutable row at `snapshot`.
    pub fn row_mut(&mut self, snapshot: u32) -> Option<&mut HistoryRow> {
        usize::try_from(snapshot)
            .ok()
            .and_then(|s| self.rows.get_mut(s))
    }

    /// All rows in snapshot order.
    pub fn rows(&self) -> &[HistoryRow] {
        &self.rows
    }

    /// One field across every snapshot, in snapshot order.
    pub fn column<T>(&self, field: impl Fn(&HistoryRow) -> T) -> Vec<T> {
        self.rows.iter().map(field).collect()
    }
}
