//! Binning galaxy histories into grid layers.
//!
//! The outer loop runs over output snapshots in ascending order and the
//! inner loop over galaxies, so each galaxy's [`QuasarTracker`] sees its
//! snapshots in time order.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use rsage_recipes::{EscapeFractionFn, EscapeFractionPrescription, FescInputs, photons_e50};
use rsage_types::{GalaxyId, PhotonBudget};

use crate::error::GridError;
use crate::grid::{GalaxyDiagnostic, Grid};
use crate::quasar::{QuasarEvent, QuasarEventCounts, QuasarSettings, QuasarTracker};

/// Cell totals above this are treated as corrupt (1e50 photons/s).
pub const PHOTON_CEILING: f64 = 1.0e100;

/// Recorded fesc and grid fesc differing by more than this are logged.
const FESC_DRIFT_TOLERANCE: f64 = 0.05;

/// A galaxy's recorded state at one snapshot, as seen by the grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SnapshotSample {
    /// Flattened grid cell.
    pub cell: usize,
    /// Particle count of the host halo.
    pub len: u32,
    /// Stellar mass (1e10 Msun/h).
    pub stellar_mass: f64,
    /// Star-formation rate (Msun/yr).
    pub sfr: f64,
    /// FOF halo mass (1e10 Msun/h).
    pub fof_mass: f64,
    /// Ejected gas fraction.
    pub ejected_fraction: f64,
    /// Escape fraction recorded during evolution.
    pub fesc: f64,
    /// Intrinsic log10 photon rates.
    pub photons: PhotonBudget,
    /// Quasar event recorded at this snapshot.
    pub quasar: QuasarEvent,
}

/// Anything with a recorded history that can be binned into the grid.
pub trait GridContributor {
    /// Identifier used in diagnostics and errors.
    fn galaxy_id(&self) -> GalaxyId;

    /// The recorded state at `snapshot`, or `None` if the galaxy did not
    /// exist then.
    fn sample(&self, snapshot: u32) -> Option<SnapshotSample>;

    /// The galaxy's quasar state machine.
    fn quasar_mut(&mut self) -> &mut QuasarTracker;
}

/// Inputs shared by every galaxy in one aggregation pass.
pub struct GridPass<'a> {
    /// Bound escape-fraction function.
    pub fesc: &'a EscapeFractionFn,
    /// The prescription `fesc` was bound from.
    pub prescription: EscapeFractionPrescription,
    /// Substeps per snapshot.
    pub steps: u32,
    /// Span of the interval ending at each snapshot (Myr), by snapshot.
    pub dt_myr: &'a [f64],
}

/// Tallies from one aggregation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UpdateStats {
    /// Galaxy-snapshot pairs binned into the grid.
    pub included: u64,
    /// Galaxy-snapshot pairs skipped by the selection.
    pub skipped: u64,
    /// Quasar events seen by the state machines.
    pub quasar: QuasarEventCounts,
}

impl UpdateStats {
    /// Add another pass's tallies.
    pub const fn absorb(&mut self, other: Self) {
        self.included = self.included.saturating_add(other.included);
        self.skipped = self.skipped.saturating_add(other.skipped);
        self.quasar.absorb(other.quasar);
    }
}

impl Grid {
    /// Bin every contributor into every layer.
    ///
    /// # Errors
    ///
    /// See [`Grid::update_layer`].
    pub fn update<C: GridContributor>(
        &mut self,
        contributors: &mut [C],
        pass: &GridPass<'_>,
    ) -> Result<UpdateStats, GridError> {
        let mut stats = UpdateStats::default();
        for layer in 0..self.layers.len() {
            stats.absorb(self.update_layer(layer, contributors.iter_mut(), pass)?);
        }
        Ok(stats)
    }

    /// Bin contributors into the layer at position `layer_index`.
    ///
    /// A galaxy contributes when its stellar mass is positive, its SFR is
    /// non-negative, its FOF mass is positive, and its halo has more than
    /// `halo_part_cut` particles.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::LayerNotFound`], [`GridError::CellOutOfRange`],
    /// [`GridError::InvalidQuasarWeight`], [`GridError::EscapeFraction`],
    /// [`GridError::GridUnderflow`], or [`GridError::GridOverflow`].
    pub fn update_layer<'c, C, I>(
        &mut self,
        layer_index: usize,
        contributors: I,
        pass: &GridPass<'_>,
    ) -> Result<UpdateStats, GridError>
    where
        C: GridContributor + 'c,
        I: IntoIterator<Item = &'c mut C>,
    {
        let self_consistent = self.config.self_consistent;
        let halo_part_cut = self.config.halo_part_cut;
        let layer = self
            .layers
            .get_mut(layer_index)
            .ok_or(GridError::LayerNotFound(layer_index))?;
        let snapshot = layer.snapshot;
        let cells = layer.cells();
        let usize_snap = usize::try_from(snapshot).unwrap_or(usize::MAX);
        let dt_myr = pass.dt_myr.get(usize_snap).copied().unwrap_or(0.0);
        let settings = QuasarSettings {
            steps: pass.steps,
            boost_dyntimes: pass.prescription.quasar_boost_dyntimes(),
            halo_part_cut,
        };
        let track_quasars = pass.prescription.uses_quasar_tracking();

        let mut stats = UpdateStats::default();
        for contributor in contributors {
            let galaxy = contributor.galaxy_id();
            let Some(sample) = contributor.sample(snapshot) else {
                stats.skipped = stats.skipped.saturating_add(1);
                continue;
            };
            if sample.cell >= cells {
                return Err(GridError::CellOutOfRange {
                    galaxy,
                    snapshot,
                    cell: sample.cell,
                    cells,
                });
            }
            let selected = sample.stellar_mass > 0.0
                && sample.sfr >= 0.0
                && sample.fof_mass > 0.0
                && sample.len > halo_part_cut;
            if !selected {
                stats.skipped = stats.skipped.saturating_add(1);
                continue;
            }
            stats.included = stats.included.saturating_add(1);

            let quasar_weight = if track_quasars {
                let tracker = contributor.quasar_mut();
                let counts = tracker.update(galaxy, snapshot, &sample.quasar, dt_myr, &settings)?;
                stats.quasar.absorb(counts);
                tracker.fractional_photon()
            } else {
                0.0
            };

            let fesc = (pass.fesc)(&FescInputs {
                halo_mass: sample.fof_mass,
                ejected_fraction: sample.ejected_fraction,
                quasar_weight,
            })
            .map_err(|source| GridError::EscapeFraction {
                galaxy,
                snapshot,
                source,
            })?;
            if (fesc - sample.fesc).abs() > FESC_DRIFT_TOLERANCE {
                debug!(
                    galaxy = %galaxy,
                    snapshot,
                    grid_fesc = fesc,
                    recorded_fesc = sample.fesc,
                    "escape fraction differs from the recorded value"
                );
            }

            let ngamma = photons_e50(sample.photons.hi);
            let escaping = ngamma * fesc;
            let cell = sample.cell;
            if sample.photons.hi > 0.0 {
                add_to_cell(&mut layer.nion_hi, cell, escaping, galaxy, snapshot)?;
                if !self_consistent {
                    let hei = photons_e50(sample.photons.hei) * fesc;
                    let heii = photons_e50(sample.photons.heii) * fesc;
                    add_to_cell(&mut layer.nion_hei, cell, hei, galaxy, snapshot)?;
                    add_to_cell(&mut layer.nion_heii, cell, heii, galaxy, snapshot)?;
                }
            }

            if let Some(count) = layer.gal_count.get_mut(cell) {
                *count = count.saturating_add(1);
            }
            if !self_consistent {
                if let Some(sfr) = layer.sfr.get_mut(cell) {
                    *sfr += sample.sfr;
                }
                if let Some(mass) = layer.stellar_mass.get_mut(cell) {
                    *mass += sample.stellar_mass;
                }
            }

            layer.diagnostics.push(GalaxyDiagnostic {
                rank: 0,
                galaxy,
                snapshot,
                fesc,
                mvir: sample.fof_mass,
                mstar: sample.stellar_mass,
                ngamma,
                ngamma_fesc: escaping,
            });
        }

        if stats.quasar.below_cut > 0 {
            warn!(
                snapshot,
                ignored = stats.quasar.below_cut,
                "quasar events ignored: companion below particle cut"
            );
        }
        debug!(
            snapshot,
            included = stats.included,
            skipped = stats.skipped,
            "grid layer updated"
        );
        Ok(stats)
    }
}

/// Add `contribution` to `cells[cell]` and sanity-check the total.
fn add_to_cell(
    cells: &mut [f64],
    cell: usize,
    contribution: f64,
    galaxy: GalaxyId,
    snapshot: u32,
) -> Result<(), GridError> {
    let count = cells.len();
    let slot = cells.get_mut(cell).ok_or(GridError::CellOutOfRange {
        galaxy,
        snapshot,
        cell,
        cells: count,
    })?;
    *slot += contribution;
    let total = *slot;
    if contribution < 0.0 || total < 0.0 {
        return Err(GridError::GridUnderflow {
            galaxy,
            snapshot,
            cell,
            contribution,
            total,
        });
    }
    if !total.is_finite() || total > PHOTON_CEILING {
        return Err(GridError::GridOverflow {
            galaxy,
            snapshot,
            cell,
            contribution,
            total,
        });
    }
    Ok(())
}
