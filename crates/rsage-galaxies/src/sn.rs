//! Delayed supernova bookkeeping.
//!
//! When instantaneous recycling is off, stars formed in a galaxy go into a
//! ring of time bins spanning the 50 Myr over which massive stars explode.
//! Each snapshot releases the average mass per bin as supernova-driving
//! stellar mass, then the ring shifts by the snapshot's length.

use serde::{Deserialize, Serialize};

use rsage_recipes::RecipeError;

use crate::error::GalaxyError;

/// Lifetime window of supernova progenitors (Myr).
pub const SUPERNOVA_WINDOW_MYR: f64 = 50.0;

/// Ring of recently formed stellar mass, newest bin first.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct DelayedSupernovae {
    resolution_myr: f64,
    bins: Vec<f64>,
}

impl DelayedSupernovae {
    /// A zeroed ring with bins `resolution_myr` wide.
    ///
    /// # Errors
    ///
    /// Returns [`RecipeError::InvalidParameter`] (wrapped) if the resolution
    /// is not in `(0, 50]`, and [`GalaxyError::OutOfMemory`] if the ring
    /// cannot be allocated.
    pub fn try_new(resolution_myr: f64) -> Result<Self, GalaxyError> {
        let len = bin_count(resolution_myr)?;
        let mut bins = Vec::new();
        bins.try_reserve_exact(len)
            .map_err(|_err| GalaxyError::OutOfMemory {
                what: "delayed supernova ring",
                len,
            })?;
        bins.resize(len, 0.0);
        Ok(Self {
            resolution_myr,
            bins,
        })
    }

    /// Deep copy into a freshly allocated ring.
    ///
    /// # Errors
    ///
    /// Returns [`GalaxyError::OutOfMemory`] if the allocation fails.
    pub fn try_clone(&self) -> Result<Self, GalaxyError> {
        let mut bins = Vec::new();
        bins.try_reserve_exact(self.bins.len())
            .map_err(|_err| GalaxyError::OutOfMemory {
                what: "merged delayed supernova ring",
                len: self.bins.len(),
            })?;
        bins.extend_from_slice(&self.bins);
        Ok(Self {
            resolution_myr: self.resolution_myr,
            bins,
        })
    }

    /// Number of bins.
    pub fn len(&self) -> usize {
        self.bins.len()
    }

    /// Whether the ring has no bins.
    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    /// Stellar mass held in every bin.
    pub fn bins(&self) -> &[f64] {
        &self.bins
    }

    /// Total stellar mass in the ring.
    pub fn total(&self) -> f64 {
        self.bins.iter().sum()
    }

    /// Add newly formed stars to the newest bin.
    pub fn push(&mut self, stars: f64) {
        if let Some(newest) = self.bins.first_mut() {
            *newest += stars.max(0.0);
        }
    }

    /// Stellar mass whose supernovae go off over one snapshot.
    pub fn release(&self) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        let len = self.bins.len().max(1) as f64;
        self.total() / len
    }

    /// Age the ring by `dt_myr`, dropping bins that leave the window.
    ///
    /// Shifts by `round(dt_myr / resolution)` bins, at least one.
    pub fn advance(&mut self, dt_myr: f64) {
        let raw = (dt_myr / self.resolution_myr).round();
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let shift = if raw.is_finite() && raw > 1.0 {
            raw as usize
        } else {
            1
        };
        let shift = shift.min(self.bins.len());
        self.bins.rotate_right(shift);
        for bin in self.bins.iter_mut().take(shift) {
            *bin = 0.0;
        }
    }

    /// Add another ring into this one bin by bin.
    pub fn absorb(&mut self, other: &Self) {
        for (mine, theirs) in self.bins.iter_mut().zip(&other.bins) {
            *mine += theirs;
        }
    }
}

/// `ceil(50 / resolution)`.
fn bin_count(resolution_myr: f64) -> Result<usize, GalaxyError> {
    if !(resolution_myr > 0.0 && resolution_myr <= SUPERNOVA_WINDOW_MYR) {
        return Err(RecipeError::InvalidParameter {
            name: "TimeResolutionSN",
            reason: format!("{resolution_myr} Myr must lie in (0, {SUPERNOVA_WINDOW_MYR}]"),
        }
        .into());
    }
    let bins = (SUPERNOVA_WINDOW_MYR / resolution_myr).ceil();
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    Ok(bins as usize)
}

#[cfg(test)]
#[allow(clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn ring_length_rounds_up() {
        assert_eq!(DelayedSupernovae::try_new(10.0).map(|r| r.len()).ok(), Some(5));
        assert_eq!(DelayedSupernovae::try_new(15.0).map(|r| r.len()).ok(), Some(4));
        assert_eq!(DelayedSupernovae::try_new(50.0).map(|r| r.len()).ok(), Some(1));
    }

    #[test]
    fn resolution_beyond_window_is_rejected() {
        assert!(DelayedSupernovae::try_new(50.1).is_err());
        assert!(DelayedSupernovae::try_new(0.0).is_err());
        assert!(DelayedSupernovae::try_new(f64::NAN).is_err());
    }

    #[test]
    fn stars_age_out_of_the_window() {
        let ring = DelayedSupernovae::try_new(10.0);
        assert!(ring.is_ok());
        if let Ok(mut ring) = ring {
            ring.push(5.0);
            assert!((ring.release() - 1.0).abs() < 1e-12);
            ring.advance(20.0);
            assert!((ring.total() - 5.0).abs() < 1e-12);
            assert!((ring.bins()[2] - 5.0).abs() < 1e-12);
            ring.advance(30.0);
            assert!(ring.total().abs() < f64::EPSILON);
        }
    }

    #[test]
    fn short_snapshot_still_shifts_one_bin() {
        let ring = DelayedSupernovae::try_new(10.0);
        assert!(ring.is_ok());
        if let Ok(mut ring) = ring {
            ring.push(1.0);
            ring.advance(0.1);
            assert!(ring.bins()[0].abs() < f64::EPSILON);
            assert!((ring.bins()[1] - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn absorb_adds_componentwise() {
        let a = DelayedSupernovae::try_new(10.0);
        let b = DelayedSupernovae::try_new(10.0);
        assert!(a.is_ok() && b.is_ok());
        if let (Ok(mut a), Ok(mut b)) = (a, b) {
            a.push(1.0);
            b.push(2.0);
            b.advance(10.0);
            b.push(3.0);
            a.absorb(&b);
            assert!((a.bins()[0] - 4.0).abs() < 1e-12);
            assert!((a.bins()[1] - 2.0).abs() < 1e-12);
        }
    }
}
