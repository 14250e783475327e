//! Parameter-file loading and the typed run configuration.
//!
//! A run is described by one parameter file, in either of two forms:
//!
//! - the flat `Key  Value` format, where a line starting with `%` or `-`
//!   is a comment and values are read as integer, float or string;
//! - a YAML mapping with the same keys (`.yaml` / `.yml` files).
//!
//! Both forms become one key/value map that deserializes into
//! [`RunConfig`]. Field names follow the parameter-file keys through
//! `#[serde(rename)]`; optional keys carry named defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Number, Value};

use rsage_grid::GridConfig;
use rsage_recipes::config::flag;
use rsage_recipes::{
    Cosmology, EscapeFractionConfig, EscapeFractionPrescription, PhysicsConfig, RecipeError,
};
use rsage_types::{FileNr, ShardStrategy};

/// Keys every parameter file must set.
pub const REQUIRED_KEYS: [&str; 14] = [
    "FileNameGalaxies",
    "OutputDir",
    "FirstFile",
    "LastFile",
    "LastSnapShotNr",
    "BoxSize",
    "GridSize",
    "Hubble_h",
    "Omega",
    "OmegaLambda",
    "PartMass",
    "BaryonFrac",
    "LowSnap",
    "HighSnap",
];

/// Largest accepted `GridSize`.
pub const MAX_GRID_SIZE: u32 = 1024;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the parameter file from disk.
    #[error("failed to read parameter file {}: {source}", path.display())]
    Io {
        /// The file being read.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse parameter YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A YAML parameter file is not a mapping of keys to values.
    #[error("parameter YAML must be a mapping of keys to values")]
    NotAMapping,

    /// A flat parameter line has a key but no value.
    #[error("line {line} of the parameter file has no value: {content:?}")]
    MalformedLine {
        /// 1-based line number.
        line: usize,
        /// The offending line.
        content: String,
    },

    /// A key appears twice.
    #[error("parameter {key} is set twice (again on line {line})")]
    DuplicateKey {
        /// The repeated key.
        key: String,
        /// 1-based line of the second occurrence.
        line: usize,
    },

    /// A required key is absent.
    #[error("required parameter {0} is missing")]
    MissingKey(&'static str),

    /// A value has the wrong type.
    #[error("malformed parameter value: {source}")]
    Value {
        /// The underlying deserialization error.
        source: serde_json::Error,
    },

    /// A value is outside its valid range.
    #[error("invalid parameter {key}: {reason}")]
    Invalid {
        /// The parameter.
        key: &'static str,
        /// Why it was rejected.
        reason: String,
    },

    /// The escape-fraction or recipe parameters are inconsistent.
    #[error("recipe parameters rejected: {0}")]
    Recipe(#[from] RecipeError),
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(source: serde_json::Error) -> Self {
        Self::Value { source }
    }
}

/// Where merger trees come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TreeSourceKind {
    /// `<SimulationDir>/<TreeName>_<filenr>.json` files.
    #[default]
    Json,
    /// Seeded synthetic trees.
    Synthetic,
}

/// Everything a run is configured with.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RunConfig {
    /// Prefix of every output file.
    #[serde(rename = "FileNameGalaxies")]
    pub file_name_galaxies: String,
    /// Directory output files are written to.
    #[serde(rename = "OutputDir")]
    pub output_dir: PathBuf,
    /// Prefix of the tree files.
    #[serde(rename = "TreeName", default = "default_tree_name")]
    pub tree_name: String,
    /// Directory holding the tree files.
    #[serde(rename = "SimulationDir", default = "default_simulation_dir")]
    pub simulation_dir: PathBuf,
    /// Tree provider.
    #[serde(rename = "TreeSource", default)]
    pub tree_source: TreeSourceKind,
    /// Whitespace-separated snapshot scale factors.
    #[serde(rename = "SnapListFile", default)]
    pub snap_list_file: Option<PathBuf>,
    /// First tree file.
    #[serde(rename = "FirstFile")]
    pub first_file: u32,
    /// Last tree file, inclusive.
    #[serde(rename = "LastFile")]
    pub last_file: u32,
    /// Last snapshot number of the simulation.
    #[serde(rename = "LastSnapShotNr")]
    pub last_snapshot: u32,
    /// Parallel workers.
    #[serde(rename = "NumWorkers", default = "default_num_workers")]
    pub num_workers: usize,
    /// How tree files are spread over workers.
    #[serde(rename = "ShardStrategy", default)]
    pub shard_strategy: ShardStrategy,
    /// Trees per file for the synthetic provider.
    #[serde(rename = "TreesPerFile", default = "default_trees_per_file")]
    pub trees_per_file: u32,
    /// Seed of the synthetic provider.
    #[serde(rename = "Seed", default = "default_seed")]
    pub seed: u64,

    /// Comoving box side (Mpc/h).
    #[serde(rename = "BoxSize")]
    pub box_size: f64,
    /// Dimensionless Hubble parameter.
    #[serde(rename = "Hubble_h")]
    pub hubble_h: f64,
    /// Matter density parameter.
    #[serde(rename = "Omega")]
    pub omega: f64,
    /// Dark-energy density parameter.
    #[serde(rename = "OmegaLambda")]
    pub omega_lambda: f64,
    /// Simulation particle mass (1e10 Msun/h).
    #[serde(rename = "PartMass")]
    pub part_mass: f64,
    /// Cosmic baryon fraction.
    #[serde(rename = "BaryonFrac")]
    pub baryon_frac: f64,

    /// Cells per grid side.
    #[serde(rename = "GridSize")]
    pub grid_size: u32,
    /// First gridded snapshot.
    #[serde(rename = "LowSnap")]
    pub low_snap: u32,
    /// Last gridded snapshot, inclusive.
    #[serde(rename = "HighSnap")]
    pub high_snap: u32,
    /// Halos need more particles than this to be gridded.
    #[serde(rename = "HaloPartCut", default = "default_halo_part_cut")]
    pub halo_part_cut: u32,
    /// Whether the grid feeds a self-consistent reionization loop.
    #[serde(rename = "SelfConsistent", default, deserialize_with = "flag")]
    pub self_consistent: bool,
    /// Snapshot whose photons feed the self-consistent grid.
    #[serde(rename = "ReionSnap", default, deserialize_with = "optional_snapshot")]
    pub reion_snap: Option<u32>,
    /// Ionizing-photon tables; only Starburst99 (`1`) exists.
    #[serde(rename = "PhotonPrescription", default = "default_photon_prescription")]
    pub photon_prescription: i64,

    /// Recipe switches and coefficients.
    #[serde(flatten)]
    pub physics: PhysicsConfig,
    /// Escape-fraction selector and parameters.
    #[serde(flatten)]
    pub escape: EscapeFractionConfig,
}

fn default_tree_name() -> String {
    String::from("trees")
}

fn default_simulation_dir() -> PathBuf {
    PathBuf::from(".")
}

const fn default_num_workers() -> usize {
    1
}

const fn default_trees_per_file() -> u32 {
    8
}

const fn default_seed() -> u64 {
    42
}

const fn default_halo_part_cut() -> u32 {
    32
}

const fn default_photon_prescription() -> i64 {
    1
}

/// `ReionSnap` accepts a negative number for "none".
fn optional_snapshot<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<i64>::deserialize(deserializer)?;
    Ok(raw.and_then(|s| u32::try_from(s).ok()))
}

impl RunConfig {
    /// Load a parameter file, choosing the format by extension.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, a parse
    /// error for malformed content, or a validation error.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let is_yaml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"));
        if is_yaml {
            Self::parse_yaml(&contents)
        } else {
            Self::parse_flat(&contents)
        }
    }

    /// Parse the flat `Key  Value` format.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MalformedLine`], [`ConfigError::DuplicateKey`],
    /// [`ConfigError::MissingKey`], or a value or validation error.
    pub fn parse_flat(text: &str) -> Result<Self, ConfigError> {
        Self::from_map(flat_map(text)?)
    }

    /// Parse a YAML mapping.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`], [`ConfigError::NotAMapping`],
    /// [`ConfigError::MissingKey`], or a value or validation error.
    pub fn parse_yaml(text: &str) -> Result<Self, ConfigError> {
        match serde_yml::from_str::<Value>(text)? {
            Value::Object(map) => Self::from_map(map),
            _ => Err(ConfigError::NotAMapping),
        }
    }

    fn from_map(map: Map<String, Value>) -> Result<Self, ConfigError> {
        if let Some(missing) = REQUIRED_KEYS.iter().find(|k| !map.contains_key(**k)) {
            return Err(ConfigError::MissingKey(missing));
        }
        let config: Self = serde_json::from_value(Value::Object(map))?;
        config.validate()?;
        Ok(config)
    }

    /// Check ranges and cross-field consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad parameter, or
    /// [`ConfigError::Recipe`] for inconsistent escape-fraction settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_GRID_SIZE).contains(&self.grid_size) {
            return Err(invalid(
                "GridSize",
                format!("{} is outside 1..={MAX_GRID_SIZE}", self.grid_size),
            ));
        }
        if self.low_snap > self.high_snap {
            return Err(invalid(
                "LowSnap",
                format!("{} is above HighSnap {}", self.low_snap, self.high_snap),
            ));
        }
        if self.high_snap > self.last_snapshot {
            return Err(invalid(
                "HighSnap",
                format!("{} is above LastSnapShotNr {}", self.high_snap, self.last_snapshot),
            ));
        }
        if self.first_file > self.last_file {
            return Err(invalid(
                "FirstFile",
                format!("{} is above LastFile {}", self.first_file, self.last_file),
            ));
        }
        if self.self_consistent {
            match self.reion_snap {
                Some(s) if (self.low_snap..=self.high_snap).contains(&s) => {}
                other => {
                    return Err(invalid(
                        "ReionSnap",
                        format!(
                            "{other:?} must lie in {}..={} when SelfConsistent is on",
                            self.low_snap, self.high_snap
                        ),
                    ));
                }
            }
        }
        if self.num_workers == 0 {
            return Err(invalid("NumWorkers", String::from("must be at least 1")));
        }
        let positive = [
            ("BoxSize", self.box_size),
            ("Hubble_h", self.hubble_h),
            ("PartMass", self.part_mass),
        ];
        if let Some((key, value)) = positive.iter().find(|(_, v)| v.is_nan() || *v <= 0.0) {
            return Err(invalid(key, format!("{value} must be positive")));
        }
        let t = self.physics.time_resolution_sn;
        if t.is_nan() || t <= 0.0 || t > 50.0 {
            return Err(invalid(
                "TimeResolutionSN",
                format!("{t} Myr must lie in (0, 50]"),
            ));
        }
        if self.photon_prescription != 1 {
            return Err(invalid(
                "PhotonPrescription",
                format!("{} is not supported, use 1 (Starburst99)", self.photon_prescription),
            ));
        }
        self.escape_prescription()?;
        Ok(())
    }

    /// Cosmological parameters of the run.
    pub const fn cosmology(&self) -> Cosmology {
        Cosmology {
            hubble_h: self.hubble_h,
            omega: self.omega,
            omega_lambda: self.omega_lambda,
            baryon_frac: self.baryon_frac,
            part_mass: self.part_mass,
            box_size: self.box_size,
        }
    }

    /// Number of snapshots, `LastSnapShotNr + 1`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the count overflows.
    pub fn snapshot_count(&self) -> Result<usize, ConfigError> {
        usize::try_from(self.last_snapshot)
            .ok()
            .and_then(|n| n.checked_add(1))
            .ok_or_else(|| invalid("LastSnapShotNr", String::from("too large")))
    }

    /// Snapshots that get a grid layer.
    pub fn output_snapshots(&self) -> Vec<u32> {
        (self.low_snap..=self.high_snap).collect()
    }

    /// Snapshot feeding the self-consistent grid, if that mode is on.
    pub const fn reion_snapshot(&self) -> Option<u32> {
        if self.self_consistent {
            self.reion_snap
        } else {
            None
        }
    }

    /// Grid shape and selection.
    pub fn grid_config(&self) -> GridConfig {
        GridConfig {
            grid_size: self.grid_size,
            box_size: self.box_size,
            hubble_h: self.hubble_h,
            halo_part_cut: self.halo_part_cut,
            self_consistent: self.self_consistent,
            output_snapshots: self.output_snapshots(),
            reion_snapshot: self.reion_snapshot(),
        }
    }

    /// The configured escape-fraction prescription.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Recipe`] for an unknown selector or
    /// degenerate parameters.
    pub fn escape_prescription(&self) -> Result<EscapeFractionPrescription, ConfigError> {
        Ok(EscapeFractionPrescription::from_config(&self.escape)?)
    }

    /// Every tree file of the run, in order.
    pub fn files(&self) -> impl Iterator<Item = FileNr> {
        (self.first_file..=self.last_file).map(FileNr::new)
    }
}

fn invalid(key: &'static str, reason: String) -> ConfigError {
    ConfigError::Invalid { key, reason }
}

/// Split flat parameter text into a key/value map.
fn flat_map(text: &str) -> Result<Map<String, Value>, ConfigError> {
    let mut map = Map::new();
    for (number, raw) in text.lines().enumerate() {
        let line_nr = number.saturating_add(1);
        let line = raw.trim();
        if line.is_empty() || line.starts_with('%') || line.starts_with('-') {
            continue;
        }
        let mut parts = line.split_whitespace();
        let (Some(key), Some(value)) = (parts.next(), parts.next()) else {
            return Err(ConfigError::MalformedLine {
                line: line_nr,
                content: line.to_owned(),
            });
        };
        if map.contains_key(key) {
            return Err(ConfigError::DuplicateKey {
                key: key.to_owned(),
                line: line_nr,
            });
        }
        map.insert(key.to_owned(), scalar(value));
    }
    Ok(map)
}

/// Integer if it parses as one, then float, otherwise string.
fn scalar(value: &str) -> Value {
    if let Ok(i) = value.parse::<i64>() {
        return Value::from(i);
    }
    value
        .parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map_or_else(|| Value::String(value.to_owned()), Value::Number)
}
