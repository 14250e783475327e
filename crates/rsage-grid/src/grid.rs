//! Grid layers and the per-worker grid container.

use serde::{Deserialize, Serialize};

use rsage_types::GalaxyId;

use crate::cell::cell_count;
use crate::error::GridError;
use crate::selfcon::SelfconGrid;

/// Static description of the grid shared by every worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridConfig {
    /// Cells per side.
    pub grid_size: u32,
    /// Box side (Mpc/h).
    pub box_size: f64,
    /// Dimensionless Hubble parameter, for per-volume diagnostics.
    pub hubble_h: f64,
    /// Halos must have more particles than this to contribute.
    pub halo_part_cut: u32,
    /// Whether the grid feeds a self-consistent reionization loop.
    pub self_consistent: bool,
    /// Snapshots that get a grid layer, in ascending order.
    pub output_snapshots: Vec<u32>,
    /// Snapshot whose photons feed the self-consistent grid.
    pub reion_snapshot: Option<u32>,
}

impl GridConfig {
    /// Number of cells in one layer.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::InvalidConfig`] on overflow.
    pub fn cells(&self) -> Result<usize, GridError> {
        cell_count(self.grid_size)
    }
}

/// Per-galaxy values written while binning one layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GalaxyDiagnostic {
    /// Worker that binned the galaxy. Galaxy ids are only unique per rank.
    pub rank: usize,
    /// The contributing galaxy.
    pub galaxy: GalaxyId,
    /// Snapshot of the layer.
    pub snapshot: u32,
    /// Escape fraction used.
    pub fesc: f64,
    /// FOF halo mass (1e10 Msun/h).
    pub mvir: f64,
    /// Stellar mass (1e10 Msun/h).
    pub mstar: f64,
    /// Intrinsic HI photons (1e50 photons/s).
    pub ngamma: f64,
    /// Escaping HI photons (1e50 photons/s).
    pub ngamma_fesc: f64,
}

/// One snapshot's worth of gridded quantities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridLayer {
    /// Snapshot this layer bins.
    pub snapshot: u32,
    /// Escaping HI-ionizing photons per cell (1e50 photons/s).
    pub nion_hi: Vec<f64>,
    /// Escaping HeI-ionizing photons per cell (1e50 photons/s).
    pub nion_hei: Vec<f64>,
    /// Escaping HeII-ionizing photons per cell (1e50 photons/s).
    pub nion_heii: Vec<f64>,
    /// Star-formation rate per cell (Msun/yr).
    pub sfr: Vec<f64>,
    /// Stellar mass per cell (1e10 Msun/h).
    pub stellar_mass: Vec<f64>,
    /// Contributing galaxies per cell.
    pub gal_count: Vec<u64>,
    /// Per-galaxy values, in contribution order.
    pub diagnostics: Vec<GalaxyDiagnostic>,
}

impl GridLayer {
    /// An empty layer of `cells` cells.
    pub fn new(snapshot: u32, cells: usize) -> Self {
        Self {
            snapshot,
            nion_hi: vec![0.0; cells],
            nion_hei: vec![0.0; cells],
            nion_heii: vec![0.0; cells],
            sfr: vec![0.0; cells],
            stellar_mass: vec![0.0; cells],
            gal_count: vec![0; cells],
            diagnostics: Vec::new(),
        }
    }

    /// Number of cells in the layer.
    pub fn cells(&self) -> usize {
        self.nion_hi.len()
    }
}

/// All grid layers owned by one worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    /// Shape and selection settings.
    pub config: GridConfig,
    /// One layer per output snapshot.
    pub layers: Vec<GridLayer>,
    /// Self-consistent photon grid, present in self-consistent mode.
    pub selfcon: Option<SelfconGrid>,
}

impl Grid {
    /// Allocate empty layers for every output snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::InvalidConfig`] for a zero grid size, a
    /// non-positive box, or an overflowing cell count.
    pub fn new(config: GridConfig) -> Result<Self, GridError> {
        if config.grid_size == 0 || config.box_size.is_nan() || config.box_size <= 0.0 {
            return Err(GridError::InvalidConfig {
                reason: format!(
                    "grid size {} and box size {} must be positive",
                    config.grid_size, config.box_size
                ),
            });
        }
        let cells = config.cells()?;
        let layers = config
            .output_snapshots
            .iter()
            .map(|&snap| GridLayer::new(snap, cells))
            .collect();
        let selfcon = if config.self_consistent {
            Some(SelfconGrid::new(config.grid_size, config.box_size)?)
        } else {
            None
        };
        Ok(Self {
            config,
            layers,
            selfcon,
        })
    }

    /// Layer at position `index`.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::LayerNotFound`] if the index is out of range.
    pub fn layer(&self, index: usize) -> Result<&GridLayer, GridError> {
        self.layers.get(index).ok_or(GridError::LayerNotFound(index))
    }

    /// Total HI photons in every layer, in layer order.
    pub fn total_hi(&self) -> Vec<f64> {
        self.layers.iter().map(|l| l.nion_hi.iter().sum()).collect()
    }
}
