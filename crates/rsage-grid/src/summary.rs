//! Per-layer totals of a reduced grid.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::grid::{Grid, GridLayer};

/// Totals for one layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSummary {
    /// Snapshot of the layer.
    pub snapshot: u32,
    /// Redshift of the snapshot.
    pub redshift: f64,
    /// Galaxies binned into the layer.
    pub galaxies: u64,
    /// Escaping HI photons (1e50 photons/s).
    pub photons_hi: f64,
    /// Escaping HeI photons (1e50 photons/s).
    pub photons_hei: f64,
    /// Escaping HeII photons (1e50 photons/s).
    pub photons_heii: f64,
    /// Escaping HI photons per physical volume (1e50 photons/s/Mpc^3).
    pub photons_hi_per_mpc3: f64,
    /// Cells with a positive HI photon count.
    pub source_cells: u64,
    /// `source_cells` over the total cell count.
    pub source_fraction: f64,
}

/// Totals for every layer of a grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSummary {
    /// One entry per layer, in layer order.
    pub layers: Vec<LayerSummary>,
    /// Total HI photons in the self-consistent grid, if present.
    pub selfcon_photons_hi: Option<f64>,
}

/// Summarise `grid`, logging one line per layer.
///
/// `redshifts` is indexed by snapshot; missing entries report as NaN.
pub fn summarize_grid(grid: &Grid, redshifts: &[f64]) -> GridSummary {
    let physical_side = grid.config.box_size / grid.config.hubble_h;
    let volume = physical_side * physical_side * physical_side;

    let layers = grid
        .layers
        .iter()
        .map(|layer| summarize_layer(layer, redshifts, volume))
        .collect::<Vec<_>>();

    for s in &layers {
        info!(
            snapshot = s.snapshot,
            redshift = s.redshift,
            galaxies = s.galaxies,
            photons_hi = s.photons_hi,
            photons_hei = s.photons_hei,
            photons_heii = s.photons_heii,
            photons_hi_per_mpc3 = s.photons_hi_per_mpc3,
            source_cells = s.source_cells,
            source_fraction = s.source_fraction,
            "grid layer summary"
        );
    }

    GridSummary {
        layers,
        selfcon_photons_hi: grid.selfcon.as_ref().map(crate::SelfconGrid::total),
    }
}

fn summarize_layer(layer: &GridLayer, redshifts: &[f64], volume: f64) -> LayerSummary {
    let photons_hi: f64 = layer.nion_hi.iter().sum();
    let source_cells = layer.nion_hi.iter().filter(|&&n| n > 0.0).count();
    let cells = layer.cells();

    #[allow(clippy::cast_precision_loss)]
    let source_fraction = if cells == 0 {
        0.0
    } else {
        source_cells as f64 / cells as f64
    };

    let redshift = usize::try_from(layer.snapshot)
        .ok()
        .and_then(|s| redshifts.get(s))
        .copied()
        .unwrap_or(f64::NAN);

    LayerSummary {
        snapshot: layer.snapshot,
        redshift,
        galaxies: layer.gal_count.iter().sum(),
        photons_hi,
        photons_hei: layer.nion_hei.iter().sum(),
        photons_heii: layer.nion_heii.iter().sum(),
        photons_hi_per_mpc3: if volume > 0.0 { photons_hi / volume } else { 0.0 },
        source_cells: u64::try_from(source_cells).unwrap_or(u64::MAX),
        source_fraction,
    }
}

#[cfg(test)]
#[allow(clippy::indexing_slicing, clippy::panic)]
mod tests {
    use super::*;
    use crate::grid::GridConfig;

    #[test]
    fn summary_counts_sources_and_galaxies() {
        let mut grid = Grid::new(GridConfig {
            grid_size: 2,
            box_size: 7.0,
            hubble_h: 0.7,
            halo_part_cut: 0,
            self_consistent: false,
            output_snapshots: vec![1],
            reion_snapshot: None,
        })
        .unwrap_or_else(|e| panic!("grid: {e}"));
        grid.layers[0].nion_hi[0] = 500.0;
        grid.layers[0].nion_hi[3] = 500.0;
        grid.layers[0].gal_count[0] = 2;
        grid.layers[0].gal_count[3] = 1;

        let summary = summarize_grid(&grid, &[12.0, 10.0]);
        let layer = &summary.layers[0];
        assert!((layer.redshift - 10.0).abs() < 1e-12);
        assert_eq!(layer.galaxies, 3);
        assert_eq!(layer.source_cells, 2);
        assert!((layer.source_fraction - 0.25).abs() < 1e-12);
        // Physical side is 10 Mpc.
        assert!((layer.photons_hi_per_mpc3 - 1.0).abs() < 1e-9);
        assert!(summary.selfcon_photons_hi.is_none());
    }

    #[test]
    fn summary_serializes() {
        let grid = Grid::new(GridConfig {
            grid_size: 1,
            box_size: 1.0,
            hubble_h: 1.0,
            halo_part_cut: 0,
            self_consistent: true,
            output_snapshots: vec![0],
            reion_snapshot: Some(0),
        })
        .unwrap_or_else(|e| panic!("grid: {e}"));
        let json = serde_json::to_string(&summarize_grid(&grid, &[]));
        assert!(json.is_ok_and(|j| j.contains("selfcon_photons_hi")));
    }
}
