//! The simulation context shared read-only by every worker.

use serde::Serialize;
use tracing::info;

use rsage_galaxies::ModelContext;
use rsage_grid::{GridConfig, GridPass, UpdateStats};
use rsage_recipes::{Cosmology, EscapeFractionFn, EscapeFractionPrescription, Units};
use rsage_types::STEPS;

use crate::config::{ConfigError, RunConfig};
use crate::snapshots::{SnapshotError, SnapshotTable};

/// Errors raised while assembling the simulation context.
#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    /// The configuration is invalid.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// The snapshot table could not be built.
    #[error("snapshot table error: {0}")]
    Snapshots(#[from] SnapshotError),
}

/// Run-wide state, built once at startup and shared by every worker.
pub struct SimulationContext {
    /// The parsed parameter file.
    pub config: RunConfig,
    /// Cosmological parameters.
    pub cosmo: Cosmology,
    /// Derived code units.
    pub units: Units,
    /// Snapshot timing.
    pub snapshots: SnapshotTable,
    /// The configured escape-fraction prescription.
    pub prescription: EscapeFractionPrescription,
    /// `prescription` bound to the run's Hubble parameter.
    pub fesc: EscapeFractionFn,
    /// Grid shape and selection.
    pub grid: GridConfig,
}

impl SimulationContext {
    /// Build the context from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::Config`] if validation fails or
    /// [`ContextError::Snapshots`] if the snapshot table cannot be built.
    pub fn new(config: RunConfig) -> Result<Self, ContextError> {
        config.validate()?;
        let cosmo = config.cosmology();
        let units = Units::new();
        let count = config.snapshot_count()?;
        let snapshots = match &config.snap_list_file {
            Some(path) => SnapshotTable::read(path, count, &cosmo, &units)?,
            None => SnapshotTable::uniform(count, &cosmo, &units)?,
        };
        let prescription = config.escape_prescription()?;
        let fesc = prescription.bind(cosmo.hubble_h);
        let grid = config.grid_config();

        info!(
            snapshots = snapshots.len(),
            first_redshift = snapshots.redshifts.first().copied().unwrap_or(0.0),
            last_redshift = snapshots.redshifts.last().copied().unwrap_or(0.0),
            fesc = prescription.name(),
            grid_size = grid.grid_size,
            self_consistent = grid.self_consistent,
            "simulation context ready"
        );

        Ok(Self {
            config,
            cosmo,
            units,
            snapshots,
            prescription,
            fesc,
            grid,
        })
    }

    /// Borrowed view for galaxy operations.
    pub fn model(&self) -> ModelContext<'_> {
        ModelContext {
            physics: &self.config.physics,
            cosmo: &self.cosmo,
            units: &self.units,
            redshifts: &self.snapshots.redshifts,
            grid_size: self.grid.grid_size,
            halo_part_cut: self.grid.halo_part_cut,
            reion_snapshot: self.grid.reion_snapshot,
            fesc: &self.fesc,
        }
    }

    /// Inputs for one grid aggregation pass.
    pub fn grid_pass(&self) -> GridPass<'_> {
        GridPass {
            fesc: &self.fesc,
            prescription: self.prescription,
            steps: u32::try_from(STEPS).unwrap_or(u32::MAX),
            dt_myr: &self.snapshots.dt_myr,
        }
    }
}

/// What one worker did, summed over its files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct WorkerCounters {
    /// Tree files processed.
    pub files: u64,
    /// Trees evolved.
    pub trees: u64,
    /// Trees skipped because they held no halos.
    pub empty_trees: u64,
    /// Galaxies created.
    pub galaxies_created: u64,
    /// Minor mergers.
    pub minor_mergers: u64,
    /// Major mergers.
    pub major_mergers: u64,
    /// Satellites disrupted into intracluster stars.
    pub disruptions: u64,
    /// Galaxies that became orphans.
    pub orphans: u64,
    /// Galaxies written to the surviving-galaxy files.
    pub galaxies_written: u64,
    /// Records written to the merged-galaxy files.
    pub merged_written: u64,
    /// Grid aggregation tallies.
    pub grid: UpdateStats,
}

impl WorkerCounters {
    /// Add another worker's or file's counters.
    pub const fn absorb(&mut self, other: &Self) {
        self.files = self.files.saturating_add(other.files);
        self.trees = self.trees.saturating_add(other.trees);
        self.empty_trees = self.empty_trees.saturating_add(other.empty_trees);
        self.galaxies_created = self.galaxies_created.saturating_add(other.galaxies_created);
        self.minor_mergers = self.minor_mergers.saturating_add(other.minor_mergers);
        self.major_mergers = self.major_mergers.saturating_add(other.major_mergers);
        self.disruptions = self.disruptions.saturating_add(other.disruptions);
        self.orphans = self.orphans.saturating_add(other.orphans);
        self.galaxies_written = self.galaxies_written.saturating_add(other.galaxies_written);
        self.merged_written = self.merged_written.saturating_add(other.merged_written);
        self.grid.absorb(other.grid);
    }
}


#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::testing::synthetic_config;
    use super::*;

    #[test]
    fn context_exposes_consistent_views() {
        let dir = std::env::temp_dir();
        let Some(config) = synthetic_config(&dir) else {
            panic!("synthetic config failed to parse");
        };
        let ctx = SimulationContext::new(config);
        assert!(ctx.is_ok());
        if let Ok(ctx) = ctx {
            let model = ctx.model();
            assert_eq!(model.snapshots(), 12);
            assert_eq!(model.grid_size, 8);
            let pass = ctx.grid_pass();
            assert_eq!(pass.steps, 10);
            assert_eq!(pass.dt_myr.len(), 12);
            assert!(pass.prescription.uses_quasar_tracking());
        }
    }

    #[test]
    fn counters_absorb_by_field() {
        let mut a = WorkerCounters {
            trees: 2,
            minor_mergers: 1,
            ..WorkerCounters::default()
        };
        let b = WorkerCounters {
            trees: 3,
            disruptions: 4,
            ..WorkerCounters::default()
        };
        a.absorb(&b);
        assert_eq!(a.trees, 5);
        assert_eq!(a.minor_mergers, 1);
        assert_eq!(a.disruptions, 4);
    }
}
