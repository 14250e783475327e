//! Error types for grid construction, aggregation, and reduction.

use rsage_types::GalaxyId;

/// Errors raised by the grid aggregator.
///
/// Every variant is fatal for the run: a bad cell index or an impossible
/// photon count means the output cannot be trusted.
#[derive(Debug, thiserror::Error)]
pub enum GridError {
    /// A position maps outside the grid.
    #[error("position [{x}, {y}, {z}] lies outside the box [0, {box_size}) for a {grid_size}^3 grid")]
    GridIndexOutOfBounds {
        /// X coordinate (Mpc/h).
        x: f64,
        /// Y coordinate (Mpc/h).
        y: f64,
        /// Z coordinate (Mpc/h).
        z: f64,
        /// Box side (Mpc/h).
        box_size: f64,
        /// Cells per side.
        grid_size: u32,
    },

    /// A stored cell index is not inside `[0, grid_size^3)`.
    #[error("galaxy {galaxy} has cell index {cell} at snapshot {snapshot}, grid holds {cells} cells")]
    CellOutOfRange {
        /// The offending galaxy.
        galaxy: GalaxyId,
        /// Snapshot of the stored index.
        snapshot: u32,
        /// The stored index.
        cell: usize,
        /// Number of cells in the grid.
        cells: usize,
    },

    /// A cell's photon total became negative.
    #[error("galaxy {galaxy} drove cell {cell} negative at snapshot {snapshot}: contribution {contribution:.6e}, cell total {total:.6e} (1e50 photons/s)")]
    GridUnderflow {
        /// Galaxy whose contribution was being added.
        galaxy: GalaxyId,
        /// Snapshot of the layer.
        snapshot: u32,
        /// Cell index.
        cell: usize,
        /// Photons added by this galaxy.
        contribution: f64,
        /// Cell total after the addition.
        total: f64,
    },

    /// A cell's photon total exceeded the sanity ceiling or became
    /// non-finite.
    #[error("galaxy {galaxy} overflowed cell {cell} at snapshot {snapshot}: contribution {contribution:.6e}, cell total {total:.6e} (1e50 photons/s)")]
    GridOverflow {
        /// Galaxy whose contribution was being added.
        galaxy: GalaxyId,
        /// Snapshot of the layer.
        snapshot: u32,
        /// Cell index.
        cell: usize,
        /// Photons added by this galaxy.
        contribution: f64,
        /// Cell total after the addition.
        total: f64,
    },

    /// The quasar state machine produced a weight outside `[0, 1]`.
    #[error("galaxy {galaxy} has quasar fractional-photon weight {weight} at snapshot {snapshot}")]
    InvalidQuasarWeight {
        /// The offending galaxy.
        galaxy: GalaxyId,
        /// Snapshot being processed.
        snapshot: u32,
        /// The out-of-range weight.
        weight: f64,
    },

    /// Worker grids disagree in shape and cannot be summed.
    #[error("cannot reduce grid from worker {rank}: {reason}")]
    ReductionMismatch {
        /// Rank of the worker whose grid did not match the master.
        rank: usize,
        /// Description of the mismatch.
        reason: String,
    },

    /// No grid layer exists at the requested position.
    #[error("grid layer {0} does not exist")]
    LayerNotFound(usize),

    /// The reduction was given no grids at all.
    #[error("no worker grids to reduce")]
    NothingToReduce,

    /// The grid configuration is unusable.
    #[error("invalid grid configuration: {reason}")]
    InvalidConfig {
        /// What is wrong with the configuration.
        reason: String,
    },

    /// An escape-fraction recipe failed while binning a galaxy.
    #[error("escape fraction for galaxy {galaxy} at snapshot {snapshot}: {source}")]
    EscapeFraction {
        /// The galaxy being binned.
        galaxy: GalaxyId,
        /// Snapshot of the layer.
        snapshot: u32,
        /// The underlying recipe error.
        source: rsage_recipes::RecipeError,
    },
}
