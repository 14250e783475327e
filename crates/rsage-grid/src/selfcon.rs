//! Photon grid for the self-consistent reionization loop.
//!
//! While galaxies evolve through the reionization-feedback snapshot, the
//! recorder drops each sufficiently large galaxy's escaping HI photons into
//! this grid. The external ionization solver reads the reduced result.

use serde::{Deserialize, Serialize};

use crate::cell::{cell_count, cell_index};
use crate::error::GridError;

/// Single-snapshot escaping HI photon grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelfconGrid {
    /// Cells per side.
    pub grid_size: u32,
    /// Box side (Mpc/h).
    pub box_size: f64,
    /// Escaping HI photons per cell (1e50 photons/s).
    pub nion_hi: Vec<f64>,
    /// Number of galaxies added.
    pub sources: u64,
}

impl SelfconGrid {
    /// An empty grid.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::InvalidConfig`] if the cell count overflows.
    pub fn new(grid_size: u32, box_size: f64) -> Result<Self, GridError> {
        let cells = cell_count(grid_size)?;
        Ok(Self {
            grid_size,
            box_size,
            nion_hi: vec![0.0; cells],
            sources: 0,
        })
    }

    /// Add `photons_e50` escaping photons at `pos`.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::GridIndexOutOfBounds`] for a position outside
    /// the box.
    pub fn add(&mut self, pos: &[f64; 3], photons_e50: f64) -> Result<usize, GridError> {
        let cell = cell_index(pos, self.grid_size, self.box_size)?;
        let cells = self.nion_hi.len();
        let slot = self.nion_hi.get_mut(cell).ok_or(GridError::InvalidConfig {
            reason: format!("cell {cell} beyond {cells} self-consistent cells"),
        })?;
        *slot += photons_e50;
        self.sources = self.sources.saturating_add(1);
        Ok(cell)
    }

    /// Element-wise add another worker's grid into this one.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::ReductionMismatch`] if the shapes differ.
    pub fn absorb(&mut self, other: &Self, rank: usize) -> Result<(), GridError> {
        if other.nion_hi.len() != self.nion_hi.len() {
            return Err(GridError::ReductionMismatch {
                rank,
                reason: format!(
                    "self-consistent grid has {} cells, master has {}",
                    other.nion_hi.len(),
                    self.nion_hi.len()
                ),
            });
        }
        for (mine, theirs) in self.nion_hi.iter_mut().zip(&other.nion_hi) {
            *mine += theirs;
        }
        self.sources = self.sources.saturating_add(other.sources);
        Ok(())
    }

    /// Sum over all cells.
    pub fn total(&self) -> f64 {
        self.nion_hi.iter().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_lands_in_expected_cell() {
        let grid = SelfconGrid::new(2, 10.0);
        assert!(grid.is_ok());
        if let Ok(mut grid) = grid {
            let cell = grid.add(&[6.0, 1.0, 6.0], 3.5);
            assert_eq!(cell.ok(), Some(5));
            assert!((grid.total() - 3.5).abs() < 1e-12);
            assert_eq!(grid.sources, 1);
        }
    }

    #[test]
    fn absorb_requires_same_shape() {
        let a = SelfconGrid::new(2, 10.0);
        let b = SelfconGrid::new(3, 10.0);
        assert!(a.is_ok() && b.is_ok());
        if let (Ok(mut a), Ok(b)) = (a, b) {
            assert!(matches!(
                a.absorb(&b, 1),
                Err(GridError::ReductionMismatch { rank: 1, .. })
            ));
        }
    }
}
