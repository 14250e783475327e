//! Galaxy arena and the merged-galaxy store.
//!
//! A [`GalaxyStore`] holds every galaxy of the tree being evolved, indexed
//! by [`GalaxyIndex`]. Galaxies are never removed while the tree is live;
//! a merged galaxy stays in place, frozen, so indices stay stable. Terminal
//! records are deep-copied into a [`MergedStore`] that outlives the tree.

use tracing::trace;

use rsage_types::{GalaxyId, GalaxyIndex, Halo, HaloIndex};

use crate::context::ModelContext;
use crate::error::GalaxyError;
use crate::galaxy::Galaxy;

/// Per-worker arena of live galaxies.
#[derive(Debug, Default)]
pub struct GalaxyStore {
    galaxies: Vec<Galaxy>,
    next_id: u64,
}

impl GalaxyStore {
    /// An empty store whose first galaxy gets id 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a central galaxy in `halo_index` and return its index.
    ///
    /// # Errors
    ///
    /// Returns [`GalaxyError::HaloNotFound`], [`GalaxyError::OutOfMemory`],
    /// or [`GalaxyError::ArithmeticOverflow`] if the id counter wraps.
    pub fn allocate(
        &mut self,
        halo_index: HaloIndex,
        halos: &[Halo],
        ctx: &ModelContext<'_>,
    ) -> Result<GalaxyIndex, GalaxyError> {
        let halo = halos
            .get(halo_index.into_inner())
            .ok_or(GalaxyError::HaloNotFound(halo_index))?;
        let id = GalaxyId::new(self.next_id);
        let next = id
            .checked_next()
            .ok_or(GalaxyError::ArithmeticOverflow { what: "galaxy id" })?;

        self.galaxies
            .try_reserve(1)
            .map_err(|_err| GalaxyError::OutOfMemory {
                what: "galaxy store",
                len: self.galaxies.len().saturating_add(1),
            })?;
        let galaxy = Galaxy::new(id, halo_index, halo, ctx)?;
        let index = GalaxyIndex::new(self.galaxies.len());
        self.galaxies.push(galaxy);
        self.next_id = next.into_inner();

        trace!(galaxy = %id, halo = %halo_index, "galaxy allocated");
        Ok(index)
    }

    /// Drop the history arrays of the galaxy at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`GalaxyError::GalaxyNotFound`] or
    /// [`GalaxyError::DoubleRelease`].
    pub fn release(&mut self, index: GalaxyIndex) -> Result<(), GalaxyError> {
        self.get_mut(index)?.release()
    }

    /// The galaxy at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`GalaxyError::GalaxyNotFound`].
    pub fn get(&self, index: GalaxyIndex) -> Result<&Galaxy, GalaxyError> {
        self.galaxies
            .get(index.into_inner())
            .ok_or(GalaxyError::GalaxyNotFound(index))
    }

    /// Mutable access to the galaxy at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`GalaxyError::GalaxyNotFound`].
    pub fn get_mut(&mut self, index: GalaxyIndex) -> Result<&mut Galaxy, GalaxyError> {
        self.galaxies
            .get_mut(index.into_inner())
            .ok_or(GalaxyError::GalaxyNotFound(index))
    }

    /// Two distinct galaxies at once, in argument order.
    ///
    /// # Errors
    ///
    /// Returns [`GalaxyError::SelfMerger`] if the indices coincide and
    /// [`GalaxyError::GalaxyNotFound`] if either is out of range.
    pub fn pair_mut(
        &mut self,
        first: GalaxyIndex,
        second: GalaxyIndex,
    ) -> Result<(&mut Galaxy, &mut Galaxy), GalaxyError> {
        let (a, b) = (first.into_inner(), second.into_inner());
        if a == b {
            return Err(GalaxyError::SelfMerger(first));
        }
        let len = self.galaxies.len();
        if a >= len {
            return Err(GalaxyError::GalaxyNotFound(first));
        }
        if b >= len {
            return Err(GalaxyError::GalaxyNotFound(second));
        }
        let (low, high) = (a.min(b), a.max(b));
        let (head, tail) = self.galaxies.split_at_mut(high);
        let low_ref = head.get_mut(low).ok_or(GalaxyError::GalaxyNotFound(first))?;
        let high_ref = tail.first_mut().ok_or(GalaxyError::GalaxyNotFound(second))?;
        if a < b {
            Ok((low_ref, high_ref))
        } else {
            Ok((high_ref, low_ref))
        }
    }

    /// Galaxies that have not merged, with their indices.
    pub fn iter_live(&self) -> impl Iterator<Item = (GalaxyIndex, &Galaxy)> {
        self.galaxies
            .iter()
            .enumerate()
            .filter(|(_, g)| !g.is_merged())
            .map(|(i, g)| (GalaxyIndex::new(i), g))
    }

    /// Every galaxy, merged or not.
    pub fn iter(&self) -> impl Iterator<Item = &Galaxy> {
        self.galaxies.iter()
    }

    /// Every galaxy, mutably.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Galaxy> {
        self.galaxies.iter_mut()
    }

    /// Number of galaxies, merged or not.
    pub fn len(&self) -> usize {
        self.galaxies.len()
    }

    /// Whether the store holds no galaxies.
    pub fn is_empty(&self) -> bool {
        self.galaxies.is_empty()
    }

    /// Move out the galaxies still live at the end of a tree, leaving the
    /// store empty. The id counter keeps running.
    pub fn drain_live(&mut self) -> Vec<Galaxy> {
        let galaxies = std::mem::take(&mut self.galaxies);
        galaxies.into_iter().filter(|g| !g.is_merged()).collect()
    }
}

/// Append-only store of terminal galaxy records.
#[derive(Debug, Default)]
pub struct MergedStore {
    records: Vec<Galaxy>,
}

impl MergedStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a deep copy of `galaxy`.
    ///
    /// # Errors
    ///
    /// Returns [`GalaxyError::OutOfMemory`] if the copy or the slot cannot
    /// be allocated.
    pub fn push_copy(&mut self, galaxy: &Galaxy) -> Result<(), GalaxyError> {
        let copy = galaxy.try_clone()?;
        self.records
            .try_reserve(1)
            .map_err(|_err| GalaxyError::OutOfMemory {
                what: "merged store",
                len: self.records.len().saturating_add(1),
            })?;
        self.records.push(copy);
        Ok(())
    }

    /// Terminal records in the order they were added.
    pub fn records(&self) -> &[Galaxy] {
        &self.records
    }

    /// Mutable access to the records, for the grid's quasar trackers.
    pub fn records_mut(&mut self) -> &mut [Galaxy] {
        &mut self.records
    }

    /// Number of terminal records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Move every record out, leaving the store empty.
    pub fn take(&mut self) -> Vec<Galaxy> {
        std::mem::take(&mut self.records)
    }
}
