//! Ionizing photon grids for rsage.
//!
//! Galaxies are binned by position into a `GridSize^3` mesh for each output
//! snapshot. Each cell accumulates escaping HI, HeI and HeII photons along
//! with star formation, stellar mass, and a galaxy count. Each worker
//! fills its own [`Grid`] and [`reduce_grids`] sums them once every worker
//! has finished.
//!
//! # Modules
//!
//! - [`cell`] -- Position to flattened cell index
//! - [`error`] -- [`GridError`]
//! - [`grid`] -- [`Grid`], [`GridLayer`], [`GridConfig`]
//! - [`quasar`] -- [`QuasarTracker`], the quasar boost state machine
//! - [`reduce`] -- Cross-worker summation
//! - [`selfcon`] -- Photon grid for the self-consistent reionization loop
//! - [`summary`] -- Per-layer totals
//! - [`update`] -- [`GridContributor`] and the binning pass

pub mod cell;
pub mod error;
pub mod grid;
pub mod quasar;
pub mod reduce;
pub mod selfcon;
pub mod summary;
pub mod update;

pub use cell::{cell_count, cell_index};
pub use error::GridError;
pub use grid::{GalaxyDiagnostic, Grid, GridConfig, GridLayer};
pub use quasar::{QuasarEvent, QuasarEventCounts, QuasarSettings, QuasarTracker};
pub use reduce::reduce_grids;
pub use selfcon::SelfconGrid;
pub use summary::{GridSummary, LayerSummary, summarize_grid};
pub use update::{GridContributor, GridPass, PHOTON_CEILING, SnapshotSample, UpdateStats};
