//! Snapshot scale factors, redshifts, ages and time steps.

use std::path::{Path, PathBuf};

use serde::Serialize;

use rsage_recipes::{Cosmology, Units};

/// Redshift of the first snapshot when no snapshot list is given.
pub const DEFAULT_FIRST_REDSHIFT: f64 = 20.0;

/// Redshift of the last snapshot when no snapshot list is given.
pub const DEFAULT_LAST_REDSHIFT: f64 = 5.0;

/// Errors raised while building the snapshot table.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// The snapshot list could not be read.
    #[error("failed to read snapshot list {}: {source}", path.display())]
    Io {
        /// The list file.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A token in the snapshot list is not a number.
    #[error("snapshot list entry {index} is not a number: {token:?}")]
    NotANumber {
        /// 0-based entry index.
        index: usize,
        /// The offending token.
        token: String,
    },

    /// The list holds fewer scale factors than the run has snapshots.
    #[error("snapshot list has {found} scale factors, run needs {needed}")]
    TooFew {
        /// Entries found.
        found: usize,
        /// Snapshots in the run.
        needed: usize,
    },

    /// Scale factors must lie in `(0, 1]` and increase with snapshot.
    #[error("scale factor {value} of snapshot {snapshot} is not in (0, 1] or not increasing")]
    BadScaleFactor {
        /// The snapshot.
        snapshot: usize,
        /// Its scale factor.
        value: f64,
    },

    /// A run needs at least one snapshot.
    #[error("snapshot table is empty")]
    Empty,
}

/// Per-snapshot timing for the whole run, indexed by snapshot number.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotTable {
    /// Expansion factor.
    pub scale_factors: Vec<f64>,
    /// Redshift, `1/a - 1`.
    pub redshifts: Vec<f64>,
    /// Time from the snapshot to today (code units). Decreases with
    /// snapshot number.
    pub ages: Vec<f64>,
    /// Time since the previous snapshot (code units); zero for snapshot 0.
    pub dt: Vec<f64>,
    /// `dt` in Myr.
    pub dt_myr: Vec<f64>,
}

impl SnapshotTable {
    /// Build the table from increasing scale factors.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::Empty`] or [`SnapshotError::BadScaleFactor`].
    pub fn from_scale_factors(
        scale_factors: Vec<f64>,
        cosmo: &Cosmology,
        units: &Units,
    ) -> Result<Self, SnapshotError> {
        if scale_factors.is_empty() {
            return Err(SnapshotError::Empty);
        }
        let mut previous = 0.0;
        for (snapshot, &a) in scale_factors.iter().enumerate() {
            if a.is_nan() || a <= previous || a > 1.0 {
                return Err(SnapshotError::BadScaleFactor { snapshot, value: a });
            }
            previous = a;
        }

        let redshifts: Vec<f64> = scale_factors.iter().map(|a| 1.0 / a - 1.0).collect();
        let ages: Vec<f64> = redshifts
            .iter()
            .map(|&z| cosmo.time_to_present(units, z))
            .collect();
        let dt: Vec<f64> = std::iter::once(0.0)
            .chain(ages.windows(2).map(|w| match w {
                [earlier, later] => earlier - later,
                _ => 0.0,
            }))
            .collect();
        let dt_myr = dt.iter().map(|t| t * units.time_in_megayears).collect();

        Ok(Self {
            scale_factors,
            redshifts,
            ages,
            dt,
            dt_myr,
        })
    }

    /// `count` snapshots evenly spaced in scale factor between
    /// [`DEFAULT_FIRST_REDSHIFT`] and [`DEFAULT_LAST_REDSHIFT`].
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::Empty`] for a zero count.
    pub fn uniform(count: usize, cosmo: &Cosmology, units: &Units) -> Result<Self, SnapshotError> {
        let a_first = 1.0 / (1.0 + DEFAULT_FIRST_REDSHIFT);
        let a_last = 1.0 / (1.0 + DEFAULT_LAST_REDSHIFT);
        #[allow(clippy::cast_precision_loss)]
        let span = count.saturating_sub(1).max(1) as f64;
        #[allow(clippy::cast_precision_loss)]
        let factors = (0..count)
            .map(|s| a_first + (a_last - a_first) * s as f64 / span)
            .collect();
        Self::from_scale_factors(factors, cosmo, units)
    }

    /// Read the first `count` scale factors from a whitespace-separated
    /// list.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::Io`], [`SnapshotError::NotANumber`],
    /// [`SnapshotError::TooFew`], or a table construction error.
    pub fn read(
        path: &Path,
        count: usize,
        cosmo: &Cosmology,
        units: &Units,
    ) -> Result<Self, SnapshotError> {
        let text = std::fs::read_to_string(path).map_err(|source| SnapshotError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let factors = text
            .split_whitespace()
            .take(count)
            .enumerate()
            .map(|(index, token)| {
                token.parse::<f64>().map_err(|_err| SnapshotError::NotANumber {
                    index,
                    token: token.to_owned(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        if factors.len() < count {
            return Err(SnapshotError::TooFew {
                found: factors.len(),
                needed: count,
            });
        }
        Self::from_scale_factors(factors, cosmo, units)
    }

    /// Number of snapshots.
    pub fn len(&self) -> usize {
        self.scale_factors.len()
    }

    /// Whether the table is empty. Never true for a constructed table.
    pub fn is_empty(&self) -> bool {
        self.scale_factors.is_empty()
    }

    /// Time since the previous snapshot, or zero for an unknown snapshot.
    pub fn delta_t(&self, snapshot: u32) -> f64 {
        usize::try_from(snapshot)
            .ok()
            .and_then(|s| self.dt.get(s))
            .copied()
            .unwrap_or(0.0)
    }

    /// Age of `snapshot`, or zero for an unknown snapshot.
    pub fn age(&self, snapshot: u32) -> f64 {
        usize::try_from(snapshot)
            .ok()
            .and_then(|s| self.ages.get(s))
            .copied()
            .unwrap_or(0.0)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn table(factors: Vec<f64>) -> Result<SnapshotTable, SnapshotError> {
        SnapshotTable::from_scale_factors(factors, &Cosmology::default(), &Units::new())
    }

    #[test]
    fn ages_decrease_and_first_step_is_zero() {
        let t = table(vec![0.05, 0.08, 0.1, 0.125, 0.2]);
        assert!(t.is_ok());
        if let Ok(t) = t {
            assert!(t.ages.windows(2).all(|w| w.first() > w.last()));
            assert!(t.delta_t(0).abs() < f64::EPSILON);
            assert!(t.dt.iter().skip(1).all(|&d| d > 0.0));
            assert!(t.dt_myr.iter().skip(1).all(|&d| d > 1.0));
            assert!((t.redshifts.first().copied().unwrap_or(0.0) - 19.0).abs() < 1e-9);
            assert!((t.age(1) - t.age(2) - t.delta_t(2)).abs() < 1e-12);
        }
    }

    #[test]
    fn scale_factors_must_increase() {
        assert!(matches!(
            table(vec![0.1, 0.05]),
            Err(SnapshotError::BadScaleFactor { snapshot: 1, .. })
        ));
        assert!(matches!(table(vec![0.0]), Err(SnapshotError::BadScaleFactor { .. })));
        assert!(matches!(table(Vec::new()), Err(SnapshotError::Empty)));
    }

    #[test]
    fn uniform_table_spans_default_redshifts() {
        let t = SnapshotTable::uniform(8, &Cosmology::default(), &Units::new());
        assert!(t.is_ok_and(|t| {
            t.len() == 8
                && (t.redshifts.first().copied().unwrap_or(0.0) - DEFAULT_FIRST_REDSHIFT).abs() < 1e-9
                && (t.redshifts.last().copied().unwrap_or(0.0) - DEFAULT_LAST_REDSHIFT).abs() < 1e-9
        }));
    }

    #[test]
    fn list_file_is_read_and_truncated() {
        let dir = tempfile::tempdir();
        let Ok(dir) = dir else { panic!("tempdir") };
        let path = dir.path().join("a_list.txt");
        assert!(std::fs::write(&path, "0.05 0.06\n0.07\n0.08 0.09\n").is_ok());

        let t = SnapshotTable::read(&path, 4, &Cosmology::default(), &Units::new());
        assert!(t.is_ok_and(|t| t.len() == 4));

        let short = SnapshotTable::read(&path, 9, &Cosmology::default(), &Units::new());
        assert!(matches!(short, Err(SnapshotError::TooFew { found: 5, needed: 9 })));

        assert!(std::fs::write(&path, "0.05 abc").is_ok());
        let bad = SnapshotTable::read(&path, 2, &Cosmology::default(), &Units::new());
        assert!(matches!(bad, Err(SnapshotError::NotANumber { index: 1, .. })));
    }
}
