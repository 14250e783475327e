//! Galaxy records, their snapshot histories, and the merger engine.
//!
//! This crate owns everything a worker knows about its galaxies while it
//! evolves a tree: the arena they live in, the snapshot-indexed history
//! the grid reads, and the recipes-driven operations that move mass
//! between galaxies. It performs no I/O.
//!
//! # Modules
//!
//! - [`context`] -- [`ModelContext`]: read-only run parameters
//! - [`error`] -- [`GalaxyError`]
//! - [`galaxy`] -- [`Galaxy`] and its reservoirs
//! - [`history`] -- [`GalaxyHistory`], one [`HistoryRow`] per snapshot
//! - [`mergers`] -- Merging, disruption, black holes, disk instability
//! - [`recorder`] -- [`record`]: capture a galaxy at a snapshot
//! - [`sn`] -- Delayed supernova ring
//! - [`stars`] -- Star formation and supernova feedback
//! - [`store`] -- [`GalaxyStore`] and [`MergedStore`]

pub mod context;
pub mod error;
pub mod galaxy;
pub mod history;
pub mod mergers;
pub mod recorder;
pub mod sn;
pub mod stars;
pub mod store;

pub use context::ModelContext;
pub use error::GalaxyError;
pub use galaxy::{Baryons, Galaxy, HaloProperties, MergeState};
pub use history::{GalaxyHistory, HistoryRow, UNSET, UNSET_FRACTION};
pub use mergers::{
    MergerSite, check_disk_instability, disrupt_to_ics, estimate_merge_time, grow_black_hole,
    is_disrupted, make_bulge_from_burst, perform_merger,
};
pub use recorder::record;
pub use sn::{DelayedSupernovae, SUPERNOVA_WINDOW_MYR};
pub use stars::{apply_feedback, form_stars, starburst};
pub use store::{GalaxyStore, MergedStore};
