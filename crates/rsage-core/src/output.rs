//! Binary galaxy files and grid files.
//!
//! A galaxy file is a fixed-size header followed by one record per galaxy.
//! The header depends on per-tree galaxy counts, so a zeroed placeholder is
//! written first and [`GalaxyWriter::finalize`] rewrites it in place once
//! every tree is done. All values are little-endian.
//!
//! Grid layers are written as raw `f64` cells, one file per field and
//! output snapshot, plus a JSON summary. Per-galaxy diagnostics go to one
//! JSON array per layer, each entry tagged with its worker rank.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use rsage_galaxies::{Galaxy, HistoryRow};
use rsage_grid::{Grid, GridSummary};
use rsage_recipes::Cosmology;
use rsage_types::{FileNr, GalaxyId, PhotonSpecies, STEPS};

/// Errors raised while writing or reading output files.
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    /// A file could not be created, written, or read.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// The file.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The grid summary could not be serialized.
    #[error("failed to write grid summary {}: {source}", path.display())]
    Json {
        /// The summary file.
        path: PathBuf,
        /// The serializer error.
        source: serde_json::Error,
    },

    /// A count does not fit the 32-bit header field.
    #[error("{what} = {value} does not fit a 32-bit header field")]
    TooLarge {
        /// Which count.
        what: &'static str,
        /// The count.
        value: usize,
    },

    /// A galaxy handed to the writer no longer holds its history.
    #[error("galaxy {galaxy} has no history to write")]
    MissingHistory {
        /// The galaxy.
        galaxy: GalaxyId,
    },

    /// A galaxy's history length differs from the file's snapshot count.
    #[error("galaxy {galaxy} has {found} history rows, file expects {expected}")]
    HistoryLength {
        /// The galaxy.
        galaxy: GalaxyId,
        /// Rows held.
        found: usize,
        /// Snapshots in the file.
        expected: usize,
    },

    /// A tree number is beyond the trees the file was opened for.
    #[error("tree {tree} is out of range for a file of {trees} trees")]
    TreeOutOfRange {
        /// The tree.
        tree: usize,
        /// Trees in the file.
        trees: usize,
    },

    /// A file being read does not follow the layout.
    #[error("malformed galaxy file {}: {reason}", path.display())]
    Malformed {
        /// The file.
        path: PathBuf,
        /// What was wrong.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// File names
// ---------------------------------------------------------------------------

/// `<dir>/<prefix>_z<z>_<file>`, the surviving-galaxy file.
pub fn galaxy_file_path(dir: &Path, prefix: &str, redshift: f64, file: FileNr) -> PathBuf {
    dir.join(format!("{prefix}_z{redshift:.3}_{file}"))
}

/// `<dir>/<prefix>_MergedGalaxies_<file>`.
pub fn merged_file_path(dir: &Path, prefix: &str, file: FileNr) -> PathBuf {
    dir.join(format!("{prefix}_MergedGalaxies_{file}"))
}

/// `<dir>/<prefix>_<field>_<snapshot>` for one grid layer.
pub fn grid_file_path(dir: &Path, prefix: &str, field: &str, snapshot: u32) -> PathBuf {
    dir.join(format!("{prefix}_{field}_{snapshot:03}"))
}

// ---------------------------------------------------------------------------
// Galaxy files
// ---------------------------------------------------------------------------

/// Cosmology and grid shape stamped into every galaxy file header.
#[derive(Debug, Clone, PartialEq)]
pub struct FileHeader {
    /// Substeps per snapshot.
    pub steps: i32,
    /// Redshift of every snapshot.
    pub redshifts: Vec<f64>,
    /// Cosmology of the run.
    pub cosmo: Cosmology,
    /// Cells per grid side.
    pub grid_size: i32,
    /// Galaxies written per tree.
    pub tree_counts: Vec<i32>,
    /// Galaxies in the file.
    pub total: i32,
}

impl FileHeader {
    /// Header bytes for `snapshots` snapshots and `trees` trees.
    pub const fn byte_len(snapshots: usize, trees: usize) -> usize {
        // 5 + (6 + S) * 2 + Ntrees four-byte words.
        let words = 5_usize
            .saturating_add(snapshots.saturating_add(6).saturating_mul(2))
            .saturating_add(trees);
        words.saturating_mul(4)
    }
}

/// One galaxy record read back from a file.
#[derive(Debug, Clone, PartialEq)]
pub struct GalaxyRecord {
    /// Tree within the file.
    pub tree: i32,
    /// History, one row per snapshot.
    pub rows: Vec<HistoryRow>,
}

/// Writes one galaxy file.
pub struct GalaxyWriter {
    path: PathBuf,
    out: BufWriter<File>,
    snapshots: usize,
    tree_counts: Vec<i32>,
    total: i32,
}

impl GalaxyWriter {
    /// Create the file and reserve its header.
    ///
    /// # Errors
    ///
    /// Returns [`OutputError::Io`] if the file cannot be created or written.
    pub fn create(path: PathBuf, snapshots: usize, trees: usize) -> Result<Self, OutputError> {
        let file = File::create(&path).map_err(|source| OutputError::Io {
            path: path.clone(),
            source,
        })?;
        let mut out = BufWriter::new(file);
        let placeholder = vec![0_u8; FileHeader::byte_len(snapshots, trees)];
        out.write_all(&placeholder).map_err(|source| OutputError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(Self {
            path,
            out,
            snapshots,
            tree_counts: vec![0; trees],
            total: 0,
        })
    }

    /// Galaxies written so far.
    pub const fn total(&self) -> i32 {
        self.total
    }

    /// Append one galaxy of tree `tree`.
    ///
    /// # Errors
    ///
    /// Returns [`OutputError::MissingHistory`],
    /// [`OutputError::HistoryLength`], [`OutputError::TreeOutOfRange`],
    /// [`OutputError::TooLarge`], or [`OutputError::Io`].
    pub fn write(&mut self, tree: usize, galaxy: &Galaxy) -> Result<(), OutputError> {
        let history = galaxy.history().ok_or(OutputError::MissingHistory { galaxy: galaxy.id })?;
        if history.len() != self.snapshots {
            return Err(OutputError::HistoryLength {
                galaxy: galaxy.id,
                found: history.len(),
                expected: self.snapshots,
            });
        }
        let trees = self.tree_counts.len();
        let tree_nr = i32::try_from(tree).map_err(|_err| OutputError::TooLarge {
            what: "tree number",
            value: tree,
        })?;
        let count = self
            .tree_counts
            .get_mut(tree)
            .ok_or(OutputError::TreeOutOfRange { tree, trees })?;
        let next_count = count.checked_add(1).ok_or(OutputError::TooLarge {
            what: "galaxies in tree",
            value: usize::MAX,
        })?;
        let next_total = self.total.checked_add(1).ok_or(OutputError::TooLarge {
            what: "galaxies in file",
            value: usize::MAX,
        })?;

        let mut buf = Vec::with_capacity(record_len(self.snapshots));
        buf.extend_from_slice(&tree_nr.to_le_bytes());
        for column in INT_COLUMNS {
            for row in history.rows() {
                buf.extend_from_slice(&column(row).to_le_bytes());
            }
        }
        for column in FLOAT_COLUMNS {
            for row in history.rows() {
                buf.extend_from_slice(&column(row).to_le_bytes());
            }
        }
        self.out.write_all(&buf).map_err(|source| OutputError::Io {
            path: self.path.clone(),
            source,
        })?;

        *count = next_count;
        self.total = next_total;
        Ok(())
    }

    /// Rewrite the header and flush. Returns the path and galaxy count.
    ///
    /// # Errors
    ///
    /// Returns [`OutputError::TooLarge`] or [`OutputError::Io`].
    pub fn finalize(
        mut self,
        redshifts: &[f64],
        cosmo: &Cosmology,
        grid_size: u32,
    ) -> Result<(PathBuf, i32), OutputError> {
        let header = FileHeader {
            steps: i32::try_from(STEPS).map_err(|_err| OutputError::TooLarge {
                what: "STEPS",
                value: STEPS,
            })?,
            redshifts: redshifts.to_vec(),
            cosmo: *cosmo,
            grid_size: i32::try_from(grid_size).map_err(|_err| OutputError::TooLarge {
                what: "GridSize",
                value: usize::try_from(grid_size).unwrap_or(usize::MAX),
            })?,
            tree_counts: std::mem::take(&mut self.tree_counts),
            total: self.total,
        };
        let bytes = encode_header(&header)?;
        let path = self.path;
        let io = |source| OutputError::Io {
            path: path.clone(),
            source,
        };
        self.out.flush().map_err(io)?;
        self.out.seek(SeekFrom::Start(0)).map_err(io)?;
        self.out.write_all(&bytes).map_err(io)?;
        self.out.flush().map_err(io)?;

        debug!(file = %path.display(), galaxies = header.total, "galaxy file finalized");
        Ok((path, header.total))
    }
}

type IntColumn = fn(&HistoryRow) -> i32;
type FloatColumn = fn(&HistoryRow) -> f64;

const INT_FIELDS: usize = 7;
const FLOAT_FIELDS: usize = 19;

/// Integer arrays in file order.
const INT_COLUMNS: [IntColumn; INT_FIELDS] = [
    |r| r.cell,
    |r| r.galaxy_type,
    |r| r.fof_halo_nr,
    |r| r.len,
    |r| r.quasar_activity,
    |r| r.quasar_substep,
    |r| r.len_merger_gal,
];

/// Float arrays in file order, MUV last.
const FLOAT_COLUMNS: [FloatColumn; FLOAT_FIELDS] = [
    |r| r.cold_gas,
    |r| r.hot_gas,
    |r| r.ejected_mass,
    |r| r.stellar_mass,
    |r| r.black_hole_mass,
    |r| r.sfr,
    |r| r.metallicity,
    |r| r.fof_mass,
    |r| r.halo_mass,
    |r| r.ejected_fraction,
    |r| r.ejected_fraction_sn,
    |r| r.ejected_fraction_qso,
    |r| r.dynamical_time_myr,
    |r| r.reion_modifier,
    |r| r.ngamma_hi,
    |r| r.ngamma_hei,
    |r| r.ngamma_heii,
    |r| r.fesc,
    |r| r.muv,
];

const fn record_len(snapshots: usize) -> usize {
    let per_snapshot = 4_usize
        .saturating_mul(INT_FIELDS)
        .saturating_add(8_usize.saturating_mul(FLOAT_FIELDS));
    4_usize.saturating_add(per_snapshot.saturating_mul(snapshots))
}

fn encode_header(header: &FileHeader) -> Result<Vec<u8>, OutputError> {
    let snapshots = header.redshifts.len();
    let count = |what, value: usize| {
        i32::try_from(value).map_err(|_err| OutputError::TooLarge { what, value })
    };
    let c = &header.cosmo;

    let mut buf = Vec::with_capacity(FileHeader::byte_len(snapshots, header.tree_counts.len()));
    buf.extend_from_slice(&header.steps.to_le_bytes());
    buf.extend_from_slice(&count("snapshots", snapshots)?.to_le_bytes());
    for z in &header.redshifts {
        buf.extend_from_slice(&z.to_le_bytes());
    }
    for v in [c.hubble_h, c.omega, c.omega_lambda, c.baryon_frac, c.part_mass, c.box_size] {
        buf.extend_from_slice(&v.to_le_bytes());
    }
    buf.extend_from_slice(&header.grid_size.to_le_bytes());
    buf.extend_from_slice(&count("trees", header.tree_counts.len())?.to_le_bytes());
    buf.extend_from_slice(&header.total.to_le_bytes());
    for n in &header.tree_counts {
        buf.extend_from_slice(&n.to_le_bytes());
    }
    Ok(buf)
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

struct Cursor<R> {
    inner: R,
    path: PathBuf,
}

impl<R: Read> Cursor<R> {
    fn bytes<const N: usize>(&mut self) -> Result<[u8; N], OutputError> {
        let mut buf = [0_u8; N];
        self.inner.read_exact(&mut buf).map_err(|source| OutputError::Io {
            path: self.path.clone(),
            source,
        })?;
        Ok(buf)
    }

    fn i32(&mut self) -> Result<i32, OutputError> {
        self.bytes().map(i32::from_le_bytes)
    }

    fn f64(&mut self) -> Result<f64, OutputError> {
        self.bytes().map(f64::from_le_bytes)
    }

    fn count(&mut self, what: &str) -> Result<usize, OutputError> {
        let raw = self.i32()?;
        usize::try_from(raw).map_err(|_err| OutputError::Malformed {
            path: self.path.clone(),
            reason: format!("negative {what} {raw}"),
        })
    }
}

/// Read a galaxy file back: its header and every record.
///
/// # Errors
///
/// Returns [`OutputError::Io`] for a truncated or unreadable file and
/// [`OutputError::Malformed`] for inconsistent counts.
pub fn read_galaxy_file(path: &Path) -> Result<(FileHeader, Vec<GalaxyRecord>), OutputError> {
    let file = File::open(path).map_err(|source| OutputError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut cur = Cursor {
        inner: BufReader::new(file),
        path: path.to_path_buf(),
    };

    let steps = cur.i32()?;
    let snapshots = cur.count("snapshot count")?;
    let redshifts = (0..snapshots).map(|_| cur.f64()).collect::<Result<Vec<_>, _>>()?;
    let mut cosmo_values = [0.0; 6];
    for v in &mut cosmo_values {
        *v = cur.f64()?;
    }
    let [hubble_h, omega, omega_lambda, baryon_frac, part_mass, box_size] = cosmo_values;
    let grid_size = cur.i32()?;
    let trees = cur.count("tree count")?;
    let total = cur.i32()?;
    let tree_counts = (0..trees).map(|_| cur.i32()).collect::<Result<Vec<_>, _>>()?;

    let declared: i64 = tree_counts.iter().copied().map(i64::from).sum();
    if declared != i64::from(total) {
        return Err(OutputError::Malformed {
            path: path.to_path_buf(),
            reason: format!("tree counts sum to {declared}, header says {total}"),
        });
    }

    let setters_int: [fn(&mut HistoryRow, i32); INT_FIELDS] = [
        |r, v| r.cell = v,
        |r, v| r.galaxy_type = v,
        |r, v| r.fof_halo_nr = v,
        |r, v| r.len = v,
        |r, v| r.quasar_activity = v,
        |r, v| r.quasar_substep = v,
        |r, v| r.len_merger_gal = v,
    ];
    let setters_float: [fn(&mut HistoryRow, f64); FLOAT_FIELDS] = [
        |r, v| r.cold_gas = v,
        |r, v| r.hot_gas = v,
        |r, v| r.ejected_mass = v,
        |r, v| r.stellar_mass = v,
        |r, v| r.black_hole_mass = v,
        |r, v| r.sfr = v,
        |r, v| r.metallicity = v,
        |r, v| r.fof_mass = v,
        |r, v| r.halo_mass = v,
        |r, v| r.ejected_fraction = v,
        |r, v| r.ejected_fraction_sn = v,
        |r, v| r.ejected_fraction_qso = v,
        |r, v| r.dynamical_time_myr = v,
        |r, v| r.reion_modifier = v,
        |r, v| r.ngamma_hi = v,
        |r, v| r.ngamma_hei = v,
        |r, v| r.ngamma_heii = v,
        |r, v| r.fesc = v,
        |r, v| r.muv = v,
    ];

    let total_records = usize::try_from(total).unwrap_or(0);
    let mut records = Vec::new();
    for _ in 0..total_records {
        let tree = cur.i32()?;
        let mut rows = vec![HistoryRow::EMPTY; snapshots];
        for set in setters_int {
            for row in &mut rows {
                set(row, cur.i32()?);
            }
        }
        for set in setters_float {
            for row in &mut rows {
                set(row, cur.f64()?);
            }
        }
        records.push(GalaxyRecord { tree, rows });
    }

    let header = FileHeader {
        steps,
        redshifts,
        cosmo: Cosmology {
            hubble_h,
            omega,
            omega_lambda,
            baryon_frac,
            part_mass,
            box_size,
        },
        grid_size,
        tree_counts,
        total,
    };
    Ok((header, records))
}

// ---------------------------------------------------------------------------
// Grid files
// ---------------------------------------------------------------------------

fn write_cells<T: Copy>(
    path: &Path,
    cells: &[T],
    encode: impl Fn(T) -> [u8; 8],
) -> Result<(), OutputError> {
    let io = |source| OutputError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut out = BufWriter::new(File::create(path).map_err(io)?);
    for &cell in cells {
        out.write_all(&encode(cell)).map_err(io)?;
    }
    out.flush().map_err(io)
}

/// Write every layer of the master grid with its per-galaxy diagnostics,
/// the self-consistent grid if present, and the JSON summary. Returns the
/// files written.
///
/// # Errors
///
/// Returns [`OutputError::Io`] or [`OutputError::Json`].
pub fn write_grid(
    grid: &Grid,
    summary: &GridSummary,
    dir: &Path,
    prefix: &str,
) -> Result<Vec<PathBuf>, OutputError> {
    let mut written = Vec::new();
    for layer in &grid.layers {
        let species = PhotonSpecies::ALL.into_iter().zip([
            &layer.nion_hi,
            &layer.nion_hei,
            &layer.nion_heii,
        ]);
        for (s, cells) in species {
            let path = grid_file_path(dir, prefix, &format!("nion_{}", s.label()), layer.snapshot);
            write_cells(&path, cells, f64::to_le_bytes)?;
            written.push(path);
        }

        if !grid.config.self_consistent {
            let path = grid_file_path(dir, prefix, "galcount", layer.snapshot);
            write_cells(&path, &layer.gal_count, u64::to_le_bytes)?;
            written.push(path);
            for (field, cells) in [("stellarmass", &layer.stellar_mass), ("sfr", &layer.sfr)] {
                let path = grid_file_path(dir, prefix, field, layer.snapshot);
                write_cells(&path, cells, f64::to_le_bytes)?;
                written.push(path);
            }
        }

        let path = dir.join(format!("{prefix}_diagnostics_{:03}.json", layer.snapshot));
        write_json(&path, &layer.diagnostics)?;
        written.push(path);
    }

    if let Some(selfcon) = &grid.selfcon {
        let path = dir.join(format!("{prefix}_selfcon_nion_HI"));
        write_cells(&path, &selfcon.nion_hi, f64::to_le_bytes)?;
        written.push(path);
    }

    let path = dir.join(format!("{prefix}_grid_summary.json"));
    write_json(&path, summary)?;
    written.push(path);

    info!(
        dir = %dir.display(),
        layers = grid.layers.len(),
        files = written.len(),
        "grid written"
    );
    Ok(written)
}

fn write_json<T: serde::Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), OutputError> {
    let file = File::create(path).map_err(|source| OutputError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut out = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut out, value).map_err(|source| OutputError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    out.flush().map_err(|source| OutputError::Io {
        path: path.to_path_buf(),
        source,
    })
}
