//! Enumeration types shared across the workspace.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Galaxy classification
// ---------------------------------------------------------------------------

/// Position of a galaxy inside its friends-of-friends group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum GalaxyType {
    /// The galaxy sitting in the FOF group's root halo.
    Central,
    /// A galaxy that still has its own subhalo inside the group.
    Satellite,
    /// A galaxy whose subhalo has been lost; it is tracked until it merges
    /// or is disrupted.
    Orphan,
}

impl GalaxyType {
    /// Integer code written to output files (0 central, 1 satellite,
    /// 2 orphan).
    pub const fn code(self) -> i32 {
        match self {
            Self::Central => 0,
            Self::Satellite => 1,
            Self::Orphan => 2,
        }
    }

    /// Whether the galaxy orbits a central (satellite or orphan).
    pub const fn is_satellite(self) -> bool {
        matches!(self, Self::Satellite | Self::Orphan)
    }
}

/// How a galaxy ended its independent life, or how the latest merger it
/// absorbed was classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum MergeType {
    /// No merger has happened.
    #[default]
    None,
    /// Mass ratio at or below the major-merger threshold.
    Minor,
    /// Mass ratio above the major-merger threshold.
    Major,
    /// Tidally disrupted; content dumped into the central's hot gas and
    /// intracluster stars.
    Disruption,
}

impl MergeType {
    /// Integer code written to output files.
    pub const fn code(self) -> i32 {
        match self {
            Self::None => 0,
            Self::Minor => 1,
            Self::Major => 2,
            Self::Disruption => 4,
        }
    }
}

/// Which starburst flavour the collisional starburst recipe runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BurstMode {
    /// Galaxy-galaxy merger: burst efficiency `0.56 * ratio^0.7`.
    Merger,
    /// Disk instability: burst efficiency equals the raw mass ratio.
    DiskInstability,
}

// ---------------------------------------------------------------------------
// Photons
// ---------------------------------------------------------------------------

/// Ionizing photon species tracked on the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PhotonSpecies {
    /// Neutral hydrogen ionizing photons (13.6 eV).
    HI,
    /// Neutral helium ionizing photons (24.6 eV).
    HeI,
    /// Singly ionized helium ionizing photons (54.4 eV).
    HeII,
}

impl PhotonSpecies {
    /// All species in output order.
    pub const ALL: [Self; 3] = [Self::HI, Self::HeI, Self::HeII];

    /// Short label used in file names and log fields.
    pub const fn label(self) -> &'static str {
        match self {
            Self::HI => "HI",
            Self::HeI => "HeI",
            Self::HeII => "HeII",
        }
    }
}

// ---------------------------------------------------------------------------
// Work distribution
// ---------------------------------------------------------------------------

/// How tree files are assigned to workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ShardStrategy {
    /// File `n` goes to worker `n % workers`.
    #[default]
    RoundRobin,
    /// Each worker receives one contiguous block of files.
    Contiguous,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn galaxy_type_codes() {
        assert_eq!(GalaxyType::Central.code(), 0);
        assert_eq!(GalaxyType::Satellite.code(), 1);
        assert_eq!(GalaxyType::Orphan.code(), 2);
        assert!(GalaxyType::Orphan.is_satellite());
        assert!(!GalaxyType::Central.is_satellite());
    }

    #[test]
    fn merge_type_defaults_to_none() {
        assert_eq!(MergeType::default(), MergeType::None);
        assert_eq!(MergeType::Disruption.code(), 4);
    }

    #[test]
    fn species_labels_are_distinct() {
        let labels: Vec<&str> = PhotonSpecies::ALL.iter().map(|s| s.label()).collect();
        assert_eq!(labels, vec!["HI", "HeI", "HeII"]);
    }
}
