//! Core record types: halos from the merger tree and photon budgets.

use serde::{Deserialize, Serialize};

use crate::enums::PhotonSpecies;
use crate::ids::HaloIndex;

// ---------------------------------------------------------------------------
// Halo
// ---------------------------------------------------------------------------

/// A dark-matter halo from an external merger-tree catalogue.
///
/// Halos are read-only to the engine. All links are indices into the same
/// tree's halo array. Mass is in 1e10 Msun/h, positions in Mpc/h and
/// velocities in km/s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Halo {
    /// Snapshot this halo exists at.
    pub snap_num: u32,
    /// Number of simulation particles bound to the halo.
    pub len: u32,
    /// Root halo of the FOF group; equals this halo's own index for roots.
    pub first_halo_in_fof_group: HaloIndex,
    /// Next halo in the same FOF group.
    #[serde(default)]
    pub next_halo_in_fof_group: Option<HaloIndex>,
    /// Halo this one becomes at the next snapshot.
    #[serde(default)]
    pub descendant: Option<HaloIndex>,
    /// Most massive progenitor at the previous snapshot.
    #[serde(default)]
    pub first_progenitor: Option<HaloIndex>,
    /// Next progenitor sharing the same descendant.
    #[serde(default)]
    pub next_progenitor: Option<HaloIndex>,
    /// Comoving position.
    pub pos: [f64; 3],
    /// Peculiar velocity.
    #[serde(default)]
    pub vel: [f64; 3],
    /// Spherical-overdensity virial mass; negative when unavailable.
    pub mvir: f64,
    /// Maximum circular velocity.
    pub vmax: f64,
    /// Specific angular momentum vector.
    #[serde(default)]
    pub spin: [f64; 3],
    /// Identifier of the most bound particle.
    #[serde(default)]
    pub most_bound_id: i64,
}

impl Halo {
    /// Whether this halo is the root of its FOF group.
    pub fn is_fof_root(&self, own_index: HaloIndex) -> bool {
        self.first_halo_in_fof_group == own_index
    }
}

// ---------------------------------------------------------------------------
// Photon budget
// ---------------------------------------------------------------------------

/// Ionizing photon production of one galaxy, as `log10(photons / s)`.
///
/// A budget of all zeros means the galaxy formed no stars; zero is used
/// as the sentinel instead of `-inf`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PhotonBudget {
    /// Hydrogen-ionizing photons.
    pub hi: f64,
    /// Neutral-helium-ionizing photons.
    pub hei: f64,
    /// Singly-ionized-helium-ionizing photons.
    pub heii: f64,
}

impl PhotonBudget {
    /// Budget of a galaxy that produces nothing.
    pub const ZERO: Self = Self {
        hi: 0.0,
        hei: 0.0,
        heii: 0.0,
    };

    /// Log10 photon rate for one species.
    pub const fn get(&self, species: PhotonSpecies) -> f64 {
        match species {
            PhotonSpecies::HI => self.hi,
            PhotonSpecies::HeI => self.hei,
            PhotonSpecies::HeII => self.heii,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn halo_deserializes_with_missing_links() {
        let json = r#"{
            "snap_num": 3,
            "len": 120,
            "first_halo_in_fof_group": 0,
            "pos": [1.0, 2.0, 3.0],
            "mvir": 12.5,
            "vmax": 150.0
        }"#;
        let halo: Result<Halo, _> = serde_json::from_str(json);
        assert!(halo.is_ok());
        if let Ok(h) = halo {
            assert_eq!(h.descendant, None);
            assert!(h.is_fof_root(HaloIndex::new(0)));
            assert!(!h.is_fof_root(HaloIndex::new(1)));
        }
    }

    #[test]
    fn zero_budget_reports_zero_for_every_species() {
        for species in PhotonSpecies::ALL {
            assert!(PhotonBudget::ZERO.get(species).abs() < f64::EPSILON);
        }
    }
}
