//! Merger-tree providers.
//!
//! A [`TreeSource`] turns a tree-file number into the halo arrays of every
//! tree in that file. Two providers exist:
//!
//! - [`JsonTreeSource`] reads `<SimulationDir>/<TreeName>_<filenr>.json`
//!   holding `{"trees": [[Halo, ...], ...]}`.
//! - [`SyntheticTreeSource`] grows deterministic trees from a seed: a main
//!   branch that accretes a few smaller branches, each of which falls in as
//!   a subhalo, is stripped, and finally sinks into the main halo.
//!
//! Every tree is checked by [`validate_tree`] before evolution.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use rsage_types::{FileNr, Halo, HaloIndex};

use crate::config::{RunConfig, TreeSourceKind};

/// Errors raised while loading or checking merger trees.
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    /// A tree file could not be opened.
    #[error("failed to open tree file {}: {source}", path.display())]
    Io {
        /// The tree file.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A tree file is not valid JSON of the expected shape.
    #[error("failed to parse tree file {}: {source}", path.display())]
    Json {
        /// The tree file.
        path: PathBuf,
        /// The underlying parse error.
        source: serde_json::Error,
    },

    /// A halo link points outside the tree.
    #[error("tree {tree}, halo {halo}: {link} points at {target}, tree holds {len} halos")]
    InvalidLink {
        /// Tree within the file.
        tree: usize,
        /// The halo holding the link.
        halo: usize,
        /// Which link.
        link: &'static str,
        /// The target index.
        target: HaloIndex,
        /// Halos in the tree.
        len: usize,
    },

    /// A link joins halos at inconsistent snapshots.
    #[error("tree {tree}, halo {halo}: {link} goes from snapshot {from} to {to}")]
    InconsistentSnapshot {
        /// Tree within the file.
        tree: usize,
        /// The halo holding the link.
        halo: usize,
        /// Which link.
        link: &'static str,
        /// Snapshot of the halo.
        from: u32,
        /// Snapshot of the target.
        to: u32,
    },

    /// A halo sits past the last snapshot.
    #[error("tree {tree}, halo {halo} is at snapshot {snapshot}, run has {snapshots}")]
    SnapshotOutOfRange {
        /// Tree within the file.
        tree: usize,
        /// The halo.
        halo: usize,
        /// Its snapshot.
        snapshot: u32,
        /// Snapshots in the run.
        snapshots: usize,
    },

    /// A FOF root does not point at itself.
    #[error("tree {tree}, halo {halo}: FOF root {root} is not its own root")]
    BadFofRoot {
        /// Tree within the file.
        tree: usize,
        /// The halo.
        halo: usize,
        /// The root it names.
        root: HaloIndex,
    },
}

/// Every tree of one file.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeFile {
    /// The file number.
    pub file: FileNr,
    /// Halo arrays, one per tree.
    pub trees: Vec<Vec<Halo>>,
}

/// On-disk shape of a JSON tree file.
#[derive(Debug, Serialize, Deserialize)]
pub struct TreeFileJson {
    /// Halo arrays, one per tree.
    pub trees: Vec<Vec<Halo>>,
}

/// Supplies merger trees by file number. Shared by every worker.
pub trait TreeSource: Sync {
    /// Load every tree of `file`.
    ///
    /// # Errors
    ///
    /// Returns a [`TreeError`] if the file cannot be produced.
    fn load(&self, file: FileNr) -> Result<TreeFile, TreeError>;
}

/// The provider the configuration asks for.
pub fn source_for(config: &RunConfig) -> Box<dyn TreeSource> {
    match config.tree_source {
        TreeSourceKind::Json => Box::new(JsonTreeSource::new(
            config.simulation_dir.clone(),
            config.tree_name.clone(),
        )),
        TreeSourceKind::Synthetic => Box::new(SyntheticTreeSource {
            seed: config.seed,
            trees_per_file: config.trees_per_file,
            snapshots: config.last_snapshot.saturating_add(1),
            part_mass: config.part_mass,
            box_size: config.box_size,
        }),
    }
}

// ---------------------------------------------------------------------------
// JSON
// ---------------------------------------------------------------------------

/// Reads trees from JSON files.
#[derive(Debug, Clone)]
pub struct JsonTreeSource {
    dir: PathBuf,
    name: String,
}

impl JsonTreeSource {
    /// Trees named `<name>_<filenr>.json` under `dir`.
    pub const fn new(dir: PathBuf, name: String) -> Self {
        Self { dir, name }
    }

    /// Path of tree file `file`.
    pub fn path(&self, file: FileNr) -> PathBuf {
        self.dir.join(format!("{}_{file}.json", self.name))
    }
}

impl TreeSource for JsonTreeSource {
    fn load(&self, file: FileNr) -> Result<TreeFile, TreeError> {
        let path = self.path(file);
        let TreeFileJson { trees } = read_json(&path)?;
        debug!(file = %file, trees = trees.len(), path = %path.display(), "tree file read");
        Ok(TreeFile { file, trees })
    }
}

fn read_json(path: &Path) -> Result<TreeFileJson, TreeError> {
    let handle = File::open(path).map_err(|source| TreeError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_reader(BufReader::new(handle)).map_err(|source| TreeError::Json {
        path: path.to_path_buf(),
        source,
    })
}

// ---------------------------------------------------------------------------
// Synthetic
// ---------------------------------------------------------------------------

/// Grows deterministic trees from a seed.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticTreeSource {
    /// Base seed; each file mixes in its number.
    pub seed: u64,
    /// Trees generated per file.
    pub trees_per_file: u32,
    /// Snapshots in the run.
    pub snapshots: u32,
    /// Particle mass (1e10 Msun/h).
    pub part_mass: f64,
    /// Box side (Mpc/h).
    pub box_size: f64,
}

/// One progenitor line in a synthetic tree.
#[derive(Debug, Clone)]
struct Branch {
    born: u32,
    /// First snapshot as a subhalo of the main branch.
    infall: u32,
    /// Last snapshot the branch exists.
    last: u32,
    most_bound_id: i64,
    lens: Vec<u32>,
    positions: Vec<[f64; 3]>,
    spin: [f64; 3],
}

impl Branch {
    fn at(&self, snap: u32) -> Option<usize> {
        if snap < self.born || snap > self.last {
            return None;
        }
        usize::try_from(snap.saturating_sub(self.born)).ok()
    }

    const fn is_subhalo(&self, snap: u32) -> bool {
        snap >= self.infall
    }
}

impl TreeSource for SyntheticTreeSource {
    fn load(&self, file: FileNr) -> Result<TreeFile, TreeError> {
        let mut rng = StdRng::seed_from_u64(self.seed ^ u64::from(file.into_inner()).rotate_left(17));
        let trees = (0..self.trees_per_file)
            .map(|_| self.grow(&mut rng))
            .collect::<Vec<_>>();
        debug!(file = %file, trees = trees.len(), "synthetic trees grown");
        Ok(TreeFile { file, trees })
    }
}

impl SyntheticTreeSource {
    fn grow(&self, rng: &mut StdRng) -> Vec<Halo> {
        let last = self.snapshots.saturating_sub(1);
        let start = rng.random_range(0..=last / 3);
        let margin = self.box_size * 0.1;
        let centre = [
            rng.random_range(margin..self.box_size - margin),
            rng.random_range(margin..self.box_size - margin),
            rng.random_range(margin..self.box_size - margin),
        ];

        let mut next_id: i64 = rng.random_range(0..1_000_000_i64).saturating_mul(1000);
        let mut take_id = || {
            next_id = next_id.saturating_add(1);
            next_id
        };

        let main_base = rng.random_range(40.0..200.0);
        let mut branches = vec![Branch {
            born: start,
            infall: u32::MAX,
            last,
            most_bound_id: take_id(),
            lens: (start..=last)
                .map(|s| particles(main_base * 1.18_f64.powi(exponent(s, start))))
                .collect(),
            positions: (start..=last)
                .map(|s| self.wrap(shift(centre, 0.02 * f64::from(s.saturating_sub(start)))))
                .collect(),
            spin: random_spin(rng),
        }];

        // Accreted branches need a snapshot to exist on their own and one
        // to fall in.
        if last >= start.saturating_add(2) {
            let count = rng.random_range(0..=3_u32);
            for _ in 0..count {
                let born = rng.random_range(start..=last.saturating_sub(2));
                let infall = rng.random_range(born.saturating_add(1)..=last);
                let last_snap = infall.saturating_add(rng.random_range(0..=2_u32)).min(last);
                let base = rng.random_range(25.0..(main_base * 0.6).max(30.0));
                let offset = [
                    rng.random_range(-2.0..2.0),
                    rng.random_range(-2.0..2.0),
                    rng.random_range(-2.0..2.0),
                ];
                let lens = (born..=last_snap)
                    .map(|s| {
                        if s < infall {
                            particles(base * 1.1_f64.powi(exponent(s, born)))
                        } else {
                            let grown = base * 1.1_f64.powi(exponent(infall, born));
                            particles(grown * 0.6_f64.powi(exponent(s, infall).saturating_add(1)))
                        }
                    })
                    .collect();
                let positions = (born..=last_snap)
                    .map(|s| {
                        // The offset shrinks to a tenth once inside the group.
                        let shrink = if s < infall {
                            1.0 - 0.5 * f64::from(s.saturating_sub(born))
                                / f64::from(infall.saturating_sub(born))
                        } else {
                            0.1
                        };
                        let main = branches
                            .first()
                            .and_then(|m| m.at(s).and_then(|i| m.positions.get(i)))
                            .copied()
                            .unwrap_or(centre);
                        let ([mx, my, mz], [ox, oy, oz]) = (main, offset);
                        self.wrap([mx + ox * shrink, my + oy * shrink, mz + oz * shrink])
                    })
                    .collect();
                branches.push(Branch {
                    born,
                    infall,
                    last: last_snap,
                    most_bound_id: take_id(),
                    lens,
                    positions,
                    spin: random_spin(rng),
                });
            }
        }

        link_progenitors(self.link(&branches))
    }

    /// Lay the branches out snapshot by snapshot and wire every link.
    fn link(&self, branches: &[Branch]) -> Vec<Halo> {
        let snapshots = usize::try_from(self.snapshots).unwrap_or(0);
        let mut index: Vec<Vec<Option<HaloIndex>>> = vec![vec![None; snapshots]; branches.len()];
        let mut order = Vec::new();

        for snap in 0..self.snapshots {
            // Main halo first, then its subhalos, then independent roots.
            let subs = branches
                .iter()
                .enumerate()
                .skip(1)
                .filter(|(_, b)| b.at(snap).is_some() && b.is_subhalo(snap));
            let roots = branches
                .iter()
                .enumerate()
                .skip(1)
                .filter(|(_, b)| b.at(snap).is_some() && !b.is_subhalo(snap));
            let main = branches
                .first()
                .filter(|m| m.at(snap).is_some())
                .map(|m| (0, m));
            for (b, _) in main.into_iter().chain(subs).chain(roots) {
                let slot = index
                    .get_mut(b)
                    .and_then(|row| row.get_mut(usize::try_from(snap).unwrap_or(usize::MAX)));
                if let Some(slot) = slot {
                    *slot = Some(HaloIndex::new(order.len()));
                    order.push((b, snap));
                }
            }
        }

        let lookup = |b: usize, snap: u32| -> Option<HaloIndex> {
            index
                .get(b)
                .and_then(|row| row.get(usize::try_from(snap).ok()?))
                .copied()
                .flatten()
        };

        order
            .iter()
            .enumerate()
            .filter_map(|(own, &(b, snap))| {
                let branch = branches.get(b)?;
                let i = branch.at(snap)?;
                let own = HaloIndex::new(own);
                let len = branch.lens.get(i).copied().unwrap_or(1);
                let is_sub = b != 0 && branch.is_subhalo(snap);

                let first_halo_in_fof_group = if is_sub { lookup(0, snap)? } else { own };
                let group_members: Vec<HaloIndex> = order
                    .iter()
                    .filter(|&&(ob, os)| {
                        os == snap && ob != 0 && branches.get(ob).is_some_and(|o| o.is_subhalo(os))
                    })
                    .filter_map(|&(ob, os)| lookup(ob, os))
                    .collect();
                let next_halo_in_fof_group = if b == 0 {
                    group_members.first().copied()
                } else if is_sub {
                    let at = group_members.iter().position(|&m| m == own)?;
                    group_members.get(at.saturating_add(1)).copied()
                } else {
                    None
                };

                let next_snap = snap.saturating_add(1);
                let descendant = lookup(b, next_snap).or_else(|| {
                    if b != 0 && next_snap < self.snapshots {
                        lookup(0, next_snap)
                    } else {
                        None
                    }
                });

                Some(Halo {
                    snap_num: snap,
                    len,
                    first_halo_in_fof_group,
                    next_halo_in_fof_group,
                    descendant,
                    first_progenitor: None,
                    next_progenitor: None,
                    pos: branch.positions.get(i).copied().unwrap_or([0.0; 3]),
                    vel: [0.0; 3],
                    mvir: f64::from(len) * self.part_mass,
                    vmax: 20.0 * f64::from(len).cbrt(),
                    spin: branch.spin,
                    most_bound_id: branch.most_bound_id,
                })
            })
            .collect()
    }

    fn wrap(&self, pos: [f64; 3]) -> [f64; 3] {
        pos.map(|x| x.rem_euclid(self.box_size))
    }
}

/// Chain every halo's progenitors through `next_progenitor`, most massive
/// first, and point `first_progenitor` at the head of the chain. Branches
/// sinking into the main halo end up trailing its main progenitor.
fn link_progenitors(mut halos: Vec<Halo>) -> Vec<Halo> {
    let mut progenitors: Vec<Vec<usize>> = vec![Vec::new(); halos.len()];
    for (i, halo) in halos.iter().enumerate() {
        if let Some(list) = halo
            .descendant
            .and_then(|d| progenitors.get_mut(d.into_inner()))
        {
            list.push(i);
        }
    }
    for (descendant, mut list) in progenitors.into_iter().enumerate() {
        list.sort_by_key(|&p| std::cmp::Reverse(halos.get(p).map_or(0, |h| h.len)));
        if let Some(d) = halos.get_mut(descendant) {
            d.first_progenitor = list.first().copied().map(HaloIndex::new);
        }
        for pair in list.windows(2) {
            if let [p, next] = *pair
                && let Some(h) = halos.get_mut(p)
            {
                h.next_progenitor = Some(HaloIndex::new(next));
            }
        }
        if let Some(&tail) = list.last()
            && let Some(h) = halos.get_mut(tail)
        {
            h.next_progenitor = None;
        }
    }
    halos
}

fn exponent(snap: u32, from: u32) -> i32 {
    i32::try_from(snap.saturating_sub(from)).unwrap_or(i32::MAX)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn particles(x: f64) -> u32 {
    x.clamp(1.0, 1.0e9) as u32
}

fn shift(pos: [f64; 3], by: f64) -> [f64; 3] {
    pos.map(|x| x + by)
}

fn random_spin(rng: &mut StdRng) -> [f64; 3] {
    [
        rng.random_range(0.005..0.05),
        rng.random_range(0.005..0.05),
        rng.random_range(0.005..0.05),
    ]
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Check links, snapshots and FOF roots of tree `tree`.
///
/// # Errors
///
/// Returns the first [`TreeError`] found.
pub fn validate_tree(tree: usize, halos: &[Halo], snapshots: usize) -> Result<(), TreeError> {
    let len = halos.len();
    let target = |halo: usize, link: &'static str, t: HaloIndex| -> Result<&Halo, TreeError> {
        halos.get(t.into_inner()).ok_or(TreeError::InvalidLink {
            tree,
            halo,
            link,
            target: t,
            len,
        })
    };

    for (i, h) in halos.iter().enumerate() {
        if !usize::try_from(h.snap_num).is_ok_and(|s| s < snapshots) {
            return Err(TreeError::SnapshotOutOfRange {
                tree,
                halo: i,
                snapshot: h.snap_num,
                snapshots,
            });
        }

        let root = target(i, "first_halo_in_fof_group", h.first_halo_in_fof_group)?;
        if !root.is_fof_root(h.first_halo_in_fof_group) {
            return Err(TreeError::BadFofRoot {
                tree,
                halo: i,
                root: h.first_halo_in_fof_group,
            });
        }
        let checks = [
            ("first_halo_in_fof_group", Some(h.first_halo_in_fof_group)),
            ("next_halo_in_fof_group", h.next_halo_in_fof_group),
            ("descendant", h.descendant),
            ("first_progenitor", h.first_progenitor),
            ("next_progenitor", h.next_progenitor),
        ];
        for (link, t) in checks {
            let Some(t) = t else { continue };
            let other = target(i, link, t)?;
            let consistent = match link {
                "descendant" => other.snap_num > h.snap_num,
                "first_progenitor" => other.snap_num < h.snap_num,
                _ => other.snap_num == h.snap_num,
            };
            if !consistent {
                return Err(TreeError::InconsistentSnapshot {
                    tree,
                    halo: i,
                    link,
                    from: h.snap_num,
                    to: other.snap_num,
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::indexing_slicing, clippy::panic)]
mod tests {
    use super::*;

    fn source(seed: u64) -> SyntheticTreeSource {
        SyntheticTreeSource {
            seed,
            trees_per_file: 6,
            snapshots: 12,
            part_mass: 0.01,
            box_size: 25.0,
        }
    }

    #[test]
    fn synthetic_trees_are_valid() {
        let file = source(3).load(FileNr::new(2));
        assert!(file.is_ok());
        if let Ok(file) = file {
            assert_eq!(file.trees.len(), 6);
            for (t, halos) in file.trees.iter().enumerate() {
                assert!(!halos.is_empty());
                let r = validate_tree(t, halos, 12);
                assert!(r.is_ok(), "{r:?}");
                assert!(halos.iter().all(|h| h.pos.iter().all(|&x| (0.0..=25.0).contains(&x))));
            }
        }
    }

    #[test]
    fn synthetic_trees_are_deterministic_per_file() {
        let a = source(9).load(FileNr::new(1)).ok();
        let b = source(9).load(FileNr::new(1)).ok();
        let c = source(9).load(FileNr::new(2)).ok();
        assert!(a.is_some());
        assert_eq!(a, b);
        assert_ne!(a.map(|f| f.trees), c.map(|f| f.trees));
    }

    #[test]
    fn main_branch_reaches_the_last_snapshot() {
        let file = source(5).load(FileNr::new(0));
        assert!(file.is_ok_and(|f| {
            f.trees.iter().all(|halos| {
                halos
                    .iter()
                    .enumerate()
                    .any(|(i, h)| h.snap_num == 11 && h.is_fof_root(HaloIndex::new(i)))
            })
        }));
    }

    #[test]
    fn progenitor_chains_follow_descendants() {
        let file = source(11).load(FileNr::new(4));
        let Ok(file) = file else {
            panic!("synthetic load failed: {:?}", file.err());
        };
        for halos in &file.trees {
            for (i, h) in halos.iter().enumerate() {
                let mut p = h.first_progenitor;
                while let Some(idx) = p {
                    assert_eq!(halos[idx.into_inner()].descendant, Some(HaloIndex::new(i)));
                    p = halos[idx.into_inner()].next_progenitor;
                }
            }
        }
    }

    #[test]
    fn dangling_link_is_rejected() {
        let file = source(1).load(FileNr::new(0));
        let Ok(mut file) = file else {
            panic!("synthetic load failed: {:?}", file.err());
        };
        let halos = &mut file.trees[0];
        let n = halos.len();
        halos[0].descendant = Some(HaloIndex::new(n.saturating_add(5)));
        assert!(matches!(
            validate_tree(0, halos, 12),
            Err(TreeError::InvalidLink { link: "descendant", .. })
        ));
    }

    #[test]
    fn json_source_reads_tree_files() {
        let dir = tempfile::tempdir();
        let Ok(dir) = dir else { panic!("tempdir") };
        let grown = source(2).load(FileNr::new(0));
        let Ok(grown) = grown else {
            panic!("synthetic load failed: {:?}", grown.err());
        };
        let text = serde_json::to_string(&TreeFileJson {
            trees: grown.trees.clone(),
        });
        let Ok(text) = text else {
            panic!("tree file did not serialize: {:?}", text.err());
        };
        assert!(std::fs::write(dir.path().join("trees_7.json"), text).is_ok());

        let json = JsonTreeSource::new(dir.path().to_path_buf(), String::from("trees"));
        let loaded = json.load(FileNr::new(7));
        assert!(loaded.is_ok_and(|f| f.file == FileNr::new(7) && f.trees == grown.trees));
        assert!(matches!(json.load(FileNr::new(8)), Err(TreeError::Io { .. })));
    }
}
