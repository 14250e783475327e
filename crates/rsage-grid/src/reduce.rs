//! Cross-worker grid reduction.
//!
//! Workers fill private grids. Once every worker has finished, the grids
//! are summed cell by cell into the rank-0 grid. Per-galaxy diagnostics are
//! concatenated in rank order and stamped with the rank that binned them.

use tracing::info;

use crate::error::GridError;
use crate::grid::{GalaxyDiagnostic, Grid, GridLayer};

/// Sum `grids` (indexed by worker rank) into a single master grid.
///
/// # Errors
///
/// Returns [`GridError::NothingToReduce`] for an empty input and
/// [`GridError::ReductionMismatch`] if any worker's grid differs in layer
/// count, snapshot order, cell count, or self-consistent mode.
pub fn reduce_grids(grids: Vec<Grid>) -> Result<Grid, GridError> {
    let mut workers = grids.into_iter();
    let mut master = workers.next().ok_or(GridError::NothingToReduce)?;

    for (offset, grid) in workers.enumerate() {
        let rank = offset.saturating_add(1);
        if grid.layers.len() != master.layers.len() {
            return Err(GridError::ReductionMismatch {
                rank,
                reason: format!(
                    "{} layers, master has {}",
                    grid.layers.len(),
                    master.layers.len()
                ),
            });
        }
        for (mine, theirs) in master.layers.iter_mut().zip(grid.layers) {
            absorb_layer(mine, theirs, rank)?;
        }
        match (master.selfcon.as_mut(), grid.selfcon.as_ref()) {
            (Some(mine), Some(theirs)) => mine.absorb(theirs, rank)?,
            (None, None) => {}
            _ => {
                return Err(GridError::ReductionMismatch {
                    rank,
                    reason: "self-consistent mode differs from master".to_owned(),
                });
            }
        }
    }

    info!(
        layers = master.layers.len(),
        cells = master.layers.first().map_or(0, GridLayer::cells),
        "worker grids reduced"
    );
    Ok(master)
}

fn absorb_layer(mine: &mut GridLayer, theirs: GridLayer, rank: usize) -> Result<(), GridError> {
    if mine.snapshot != theirs.snapshot {
        return Err(GridError::ReductionMismatch {
            rank,
            reason: format!(
                "layer for snapshot {}, master expects {}",
                theirs.snapshot, mine.snapshot
            ),
        });
    }
    if mine.cells() != theirs.cells() {
        return Err(GridError::ReductionMismatch {
            rank,
            reason: format!(
                "snapshot {} layer has {} cells, master has {}",
                theirs.snapshot,
                theirs.cells(),
                mine.cells()
            ),
        });
    }

    sum_into(&mut mine.nion_hi, &theirs.nion_hi);
    sum_into(&mut mine.nion_hei, &theirs.nion_hei);
    sum_into(&mut mine.nion_heii, &theirs.nion_heii);
    sum_into(&mut mine.sfr, &theirs.sfr);
    sum_into(&mut mine.stellar_mass, &theirs.stellar_mass);
    for (a, b) in mine.gal_count.iter_mut().zip(&theirs.gal_count) {
        *a = a.saturating_add(*b);
    }
    mine.diagnostics
        .extend(theirs.diagnostics.into_iter().map(|d| GalaxyDiagnostic { rank, ..d }));
    Ok(())
}

fn sum_into(dst: &mut [f64], src: &[f64]) {
    for (a, b) in dst.iter_mut().zip(src) {
        *a += b;
    }
}
