//! Shared type definitions for the rsage galaxy evolution engine.
//!
//! This crate is the single source of truth for the identifiers, enums and
//! plain records that flow between the recipe, grid, galaxy and driver
//! crates. It has no behaviour beyond small accessors.
//!
//! # Modules
//!
//! - [`ids`] -- Newtype identifiers and arena indices
//! - [`enums`] -- Galaxy classification, merge types, photon species, sharding
//! - [`structs`] -- Halo records and photon budgets

pub mod enums;
pub mod ids;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{BurstMode, GalaxyType, MergeType, PhotonSpecies, ShardStrategy};
pub use ids::{FileNr, GalaxyId, GalaxyIndex, HaloIndex};
pub use structs::{Halo, PhotonBudget};

/// Number of integration substeps per snapshot interval.
pub const STEPS: usize = 10;
