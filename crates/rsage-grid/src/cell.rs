//! Mapping from comoving position to flattened grid cell.

use crate::error::GridError;

/// Flattened cell index of `pos` in a `grid_size^3` grid spanning
/// `[0, box_size)` on each axis.
///
/// The mapping is `floor(x / box * gs)` per axis, flattened as
/// `(ix * gs + iy) * gs + iz`. A coordinate strictly below `box_size` that
/// rounds up to `gs` is pulled back to the last cell.
///
/// # Errors
///
/// Returns [`GridError::GridIndexOutOfBounds`] if any coordinate is
/// negative, at or beyond `box_size`, or not finite, and
/// [`GridError::InvalidConfig`] for a zero grid size or non-positive box.
pub fn cell_index(pos: &[f64; 3], grid_size: u32, box_size: f64) -> Result<usize, GridError> {
    if grid_size == 0 || box_size.is_nan() || box_size <= 0.0 {
        return Err(GridError::InvalidConfig {
            reason: format!("grid size {grid_size} and box size {box_size} must be positive"),
        });
    }

    let out_of_bounds = || GridError::GridIndexOutOfBounds {
        x: pos[0],
        y: pos[1],
        z: pos[2],
        box_size,
        grid_size,
    };

    let gs = usize::try_from(grid_size).map_err(|_err| out_of_bounds())?;
    let mut flat: usize = 0;
    for &coord in pos {
        if !coord.is_finite() || coord < 0.0 || coord >= box_size {
            return Err(out_of_bounds());
        }
        let scaled = (coord / box_size * f64::from(grid_size)).floor();
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let axis = (scaled as usize).min(gs.saturating_sub(1));
        flat = flat
            .checked_mul(gs)
            .and_then(|v| v.checked_add(axis))
            .ok_or_else(out_of_bounds)?;
    }
    Ok(flat)
}

/// Total cell count `grid_size^3`.
///
/// # Errors
///
/// Returns [`GridError::InvalidConfig`] if the count overflows `usize`.
pub fn cell_count(grid_size: u32) -> Result<usize, GridError> {
    usize::try_from(grid_size)
        .ok()
        .and_then(|gs| gs.checked_mul(gs).and_then(|sq| sq.checked_mul(gs)))
        .ok_or_else(|| GridError::InvalidConfig {
            reason: format!("grid size {grid_size} overflows the cell count"),
        })
}
