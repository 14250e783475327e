//! Error types for galaxy storage, recording, and merging.

use rsage_grid::GridError;
use rsage_recipes::RecipeError;
use rsage_types::{GalaxyId, GalaxyIndex, HaloIndex};

/// Errors raised while allocating, recording, or merging galaxies.
#[derive(Debug, thiserror::Error)]
pub enum GalaxyError {
    /// An owned array could not be allocated.
    #[error("out of memory allocating {what} ({len} elements)")]
    OutOfMemory {
        /// Which array failed.
        what: &'static str,
        /// Requested element count.
        len: usize,
    },

    /// A galaxy's history arrays were released a second time.
    #[error("history of galaxy {galaxy} released twice")]
    DoubleRelease {
        /// The galaxy.
        galaxy: GalaxyId,
    },

    /// A galaxy's history was written after it had been released.
    #[error("history of galaxy {galaxy} used after release")]
    HistoryReleased {
        /// The galaxy.
        galaxy: GalaxyId,
    },

    /// A merger or disruption involved a galaxy that has already merged.
    #[error("galaxy {galaxy} has already merged (merging with {other})")]
    AlreadyMerged {
        /// The galaxy that is already merged.
        galaxy: GalaxyId,
        /// The other party of the attempted merger.
        other: GalaxyId,
    },

    /// A galaxy was asked to merge with itself.
    #[error("galaxy index {0} cannot merge with itself")]
    SelfMerger(GalaxyIndex),

    /// A computed fraction fell outside `[0, 1]` or was NaN.
    #[error("galaxy {galaxy} has {name} = {value} at snapshot {snapshot} (ejected {ejected:.6e}, hot {hot:.6e}, cold {cold:.6e})")]
    InvalidFraction {
        /// The galaxy.
        galaxy: GalaxyId,
        /// Snapshot being recorded.
        snapshot: u32,
        /// Which fraction.
        name: &'static str,
        /// The raw value.
        value: f64,
        /// Ejected mass (1e10 Msun/h).
        ejected: f64,
        /// Hot gas (1e10 Msun/h).
        hot: f64,
        /// Cold gas (1e10 Msun/h).
        cold: f64,
    },

    /// No galaxy exists at the index.
    #[error("no galaxy at index {0}")]
    GalaxyNotFound(GalaxyIndex),

    /// No halo exists at the index.
    #[error("no halo at index {0}")]
    HaloNotFound(HaloIndex),

    /// A snapshot lies beyond the history length.
    #[error("galaxy {galaxy} has no history slot for snapshot {snapshot} (history holds {snapshots})")]
    SnapshotOutOfRange {
        /// The galaxy.
        galaxy: GalaxyId,
        /// The requested snapshot.
        snapshot: u32,
        /// History length.
        snapshots: usize,
    },

    /// A particle count does not fit the recorded integer width.
    #[error("galaxy {galaxy} has halo length {len} at snapshot {snapshot}, beyond the recordable range")]
    InvalidLength {
        /// The galaxy.
        galaxy: GalaxyId,
        /// Snapshot being recorded.
        snapshot: u32,
        /// The particle count.
        len: u64,
    },

    /// An integer counter or index overflowed.
    #[error("arithmetic overflow computing {what}")]
    ArithmeticOverflow {
        /// What was being computed.
        what: &'static str,
    },

    /// A grid operation failed.
    #[error("grid error: {0}")]
    Grid(#[from] GridError),

    /// A recipe rejected its inputs.
    #[error("recipe error: {0}")]
    Recipe(#[from] RecipeError),
}
