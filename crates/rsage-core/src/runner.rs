//! Workers: sharding tree files, evolving them, and reducing the grids.
//!
//! Each worker owns a disjoint shard of tree files, its own galaxy store
//! and its own grid. Within a worker, files and trees are processed in
//! order. The parallel collect is the only synchronization point; the
//! grids are reduced afterwards in rank order.

use std::path::PathBuf;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use rsage_grid::{Grid, GridError, reduce_grids};
use rsage_types::{FileNr, ShardStrategy};

use crate::context::{SimulationContext, WorkerCounters};
use crate::evolve::{EvolveError, TreeRun, WorkerState, evolve_tree};
use crate::output::{GalaxyWriter, OutputError, galaxy_file_path, merged_file_path};
use crate::tree::{TreeError, TreeSource};

/// Errors that abort a run.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// A tree file could not be loaded.
    #[error("tree error: {0}")]
    Tree(#[from] TreeError),

    /// Evolving a tree failed.
    #[error("evolution error: {0}")]
    Evolve(#[from] EvolveError),

    /// Writing galaxy files failed.
    #[error("output error: {0}")]
    Output(#[from] OutputError),

    /// A worker's grid could not be built or updated.
    #[error("worker {rank}: grid error: {source}")]
    Grid {
        /// Worker rank.
        rank: usize,
        /// The underlying error.
        source: GridError,
    },

    /// Reducing the worker grids failed.
    #[error("grid reduction failed: {0}")]
    Reduce(GridError),

    /// The output directory could not be created.
    #[error("failed to create output directory {}: {source}", path.display())]
    OutputDir {
        /// The directory.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A run needs at least one worker.
    #[error("NumWorkers must be at least 1")]
    NoWorkers,
}

/// What one worker hands back at the barrier.
#[derive(Debug)]
pub struct WorkerOutput {
    /// Worker rank.
    pub rank: usize,
    /// The worker's private grid.
    pub grid: Grid,
    /// The worker's totals.
    pub counters: WorkerCounters,
    /// Galaxy files written, in order.
    pub files: Vec<PathBuf>,
}

/// The reduced result of every worker.
#[derive(Debug)]
pub struct RunOutput {
    /// The master grid.
    pub grid: Grid,
    /// Counters summed over workers.
    pub counters: WorkerCounters,
    /// Per-worker counters, by rank.
    pub per_worker: Vec<WorkerCounters>,
    /// Galaxy files written by every worker.
    pub files: Vec<PathBuf>,
}

/// Files of `files` assigned to `rank` out of `workers`.
///
/// `RoundRobin` assigns file `n` to rank `n % workers`. `Contiguous` splits
/// the list into `workers` blocks whose sizes differ by at most one.
pub fn shard_files(
    files: &[FileNr],
    workers: usize,
    rank: usize,
    strategy: ShardStrategy,
) -> Vec<FileNr> {
    if workers == 0 || rank >= workers {
        return Vec::new();
    }
    match strategy {
        ShardStrategy::RoundRobin => files
            .iter()
            .copied()
            .filter(|f| {
                usize::try_from(f.into_inner())
                    .ok()
                    .and_then(|n| n.checked_rem(workers))
                    == Some(rank)
            })
            .collect(),
        ShardStrategy::Contiguous => {
            let n = files.len();
            let base = n.checked_div(workers).unwrap_or(0);
            let extra = n.checked_rem(workers).unwrap_or(0);
            // The first `extra` ranks take one file more.
            let start = base
                .saturating_mul(rank)
                .saturating_add(rank.min(extra));
            let len = base.saturating_add(usize::from(rank < extra));
            files.iter().copied().skip(start).take(len).collect()
        }
    }
}

/// Evolve every tree of the files assigned to `rank`.
///
/// # Errors
///
/// Returns the first tree, evolution, grid, or output error. The worker
/// stops at the first error.
pub fn run_worker(
    rank: usize,
    workers: usize,
    sim: &SimulationContext,
    source: &dyn TreeSource,
) -> Result<WorkerOutput, RunnerError> {
    let config = &sim.config;
    let all: Vec<FileNr> = config.files().collect();
    let shard = shard_files(&all, workers, rank, config.shard_strategy);
    info!(rank, files = shard.len(), "worker started");

    let ctx = sim.model();
    let pass = sim.grid_pass();
    let grid_err = |source| RunnerError::Grid { rank, source };
    let mut grid = Grid::new(sim.grid.clone()).map_err(grid_err)?;
    let mut state = WorkerState::new();
    let mut written = Vec::new();

    let snapshots = sim.snapshots.len();
    let file_redshift = sim
        .snapshots
        .redshifts
        .get(usize::try_from(config.high_snap).unwrap_or(usize::MAX))
        .copied()
        .unwrap_or(0.0);

    for file in shard {
        let tree_file = source.load(file)?;
        let trees = tree_file.trees.len();
        let mut galaxies = GalaxyWriter::create(
            galaxy_file_path(&config.output_dir, &config.file_name_galaxies, file_redshift, file),
            snapshots,
            trees,
        )?;
        let mut merged = GalaxyWriter::create(
            merged_file_path(&config.output_dir, &config.file_name_galaxies, file),
            snapshots,
            trees,
        )?;

        for (tree, halos) in tree_file.trees.iter().enumerate() {
            if halos.is_empty() {
                warn!(rank, file = %file, tree, "empty tree skipped");
                state.counters.empty_trees = state.counters.empty_trees.saturating_add(1);
                continue;
            }
            let run = TreeRun { file, tree, halos };
            evolve_tree(&run, &ctx, &sim.snapshots, &mut state, grid.selfcon.as_mut())?;
            state.counters.trees = state.counters.trees.saturating_add(1);

            let mut survivors = state.store.drain_live();
            let mut retired = state.merged.take();
            let mut stats = grid.update(&mut survivors, &pass).map_err(grid_err)?;
            stats.absorb(grid.update(&mut retired, &pass).map_err(grid_err)?);
            state.counters.grid.absorb(stats);

            for galaxy in &survivors {
                galaxies.write(tree, galaxy)?;
            }
            for galaxy in &retired {
                merged.write(tree, galaxy)?;
            }
            debug!(
                rank,
                file = %file,
                tree,
                halos = halos.len(),
                survivors = survivors.len(),
                merged = retired.len(),
                "tree done"
            );
        }

        let (path, survivors) =
            galaxies.finalize(&sim.snapshots.redshifts, &sim.cosmo, config.grid_size)?;
        let (merged_path, retired) =
            merged.finalize(&sim.snapshots.redshifts, &sim.cosmo, config.grid_size)?;
        let c = &mut state.counters;
        c.files = c.files.saturating_add(1);
        c.galaxies_written = c
            .galaxies_written
            .saturating_add(u64::try_from(survivors).unwrap_or(0));
        c.merged_written = c.merged_written.saturating_add(u64::try_from(retired).unwrap_or(0));
        written.push(path);
        written.push(merged_path);

        info!(
            rank,
            file = %file,
            trees,
            galaxies = survivors,
            merged = retired,
            "file done"
        );
    }

    info!(
        rank,
        trees = state.counters.trees,
        galaxies = state.counters.galaxies_written,
        "worker finished"
    );
    Ok(WorkerOutput {
        rank,
        grid,
        counters: state.counters,
        files: written,
    })
}

/// Run every worker in parallel, then reduce their grids into the master
/// grid in rank order.
///
/// # Errors
///
/// Returns [`RunnerError::NoWorkers`], [`RunnerError::OutputDir`], the
/// first worker error, or [`RunnerError::Reduce`].
pub fn run(sim: &SimulationContext, source: &dyn TreeSource) -> Result<RunOutput, RunnerError> {
    let workers = sim.config.num_workers;
    if workers == 0 {
        return Err(RunnerError::NoWorkers);
    }
    let dir = &sim.config.output_dir;
    std::fs::create_dir_all(dir).map_err(|source| RunnerError::OutputDir {
        path: dir.clone(),
        source,
    })?;

    info!(workers, strategy = ?sim.config.shard_strategy, "starting workers");
    let mut outputs = (0..workers)
        .into_par_iter()
        .map(|rank| run_worker(rank, workers, sim, source))
        .collect::<Result<Vec<_>, _>>()?;
    outputs.sort_by_key(|o| o.rank);

    let mut counters = WorkerCounters::default();
    let mut per_worker = Vec::with_capacity(outputs.len());
    let mut files = Vec::new();
    let mut grids = Vec::with_capacity(outputs.len());
    for output in outputs {
        counters.absorb(&output.counters);
        per_worker.push(output.counters);
        files.extend(output.files);
        grids.push(output.grid);
    }
    let grid = reduce_grids(grids).map_err(RunnerError::Reduce)?;

    info!(
        trees = counters.trees,
        galaxies = counters.galaxies_written,
        merged = counters.merged_written,
        mergers = counters.minor_mergers.saturating_add(counters.major_mergers),
        disruptions = counters.disruptions,
        "all workers joined"
    );
    Ok(RunOutput {
        grid,
        counters,
        per_worker,
        files,
    })
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::context::testing::synthetic_config;
    use crate::tree::source_for;

    fn files(range: std::ops::RangeInclusive<u32>) -> Vec<FileNr> {
        range.map(FileNr::new).collect()
    }

    #[test]
    fn round_robin_uses_file_number() {
        let all = files(0..=7);
        let shard = shard_files(&all, 3, 1, ShardStrategy::RoundRobin);
        assert_eq!(shard, vec![FileNr::new(1), FileNr::new(4), FileNr::new(7)]);
    }

    #[test]
    fn contiguous_blocks_cover_every_file_once() {
        let all = files(10..=19);
        let mut seen = Vec::new();
        for rank in 0..4 {
            let shard = shard_files(&all, 4, rank, ShardStrategy::Contiguous);
            assert!(shard.len() == 2 || shard.len() == 3);
            seen.extend(shard);
        }
        assert_eq!(seen, all);
    }

    #[test]
    fn shards_partition_the_files() {
        let all = files(0..=12);
        for strategy in [ShardStrategy::RoundRobin, ShardStrategy::Contiguous] {
            let mut seen: Vec<FileNr> = (0..5)
                .flat_map(|rank| shard_files(&all, 5, rank, strategy))
                .collect();
            seen.sort();
            assert_eq!(seen, all, "{strategy:?}");
        }
        assert!(shard_files(&all, 0, 0, ShardStrategy::RoundRobin).is_empty());
        assert!(shard_files(&all, 2, 2, ShardStrategy::Contiguous).is_empty());
    }

    #[test]
    fn worker_writes_one_galaxy_and_one_merged_file_per_file() {
        let dir = tempfile::tempdir();
        let Ok(dir) = dir else { panic!("tempdir") };
        let Some(mut config) = synthetic_config(dir.path()) else {
            panic!("config");
        };
        config.num_workers = 2;
        let Ok(sim) = SimulationContext::new(config) else {
            panic!("context");
        };
        let source = source_for(&sim.config);

        let out = run(&sim, source.as_ref());
        let Ok(out) = out else {
            panic!("run failed: {:?}", out.err());
        };
        assert_eq!(out.files.len(), 8);
        assert!(out.files.iter().all(|p| p.exists()));
        assert_eq!(out.counters.files, 4);
        assert_eq!(out.counters.trees, 12);
        assert!(out.counters.galaxies_written >= 12);
        assert_eq!(out.per_worker.len(), 2);
        assert!(out.counters.grid.included > 0);
        assert_eq!(out.grid.layers.len(), 8);
    }

    #[test]
    fn zero_workers_is_rejected() {
        let dir = tempfile::tempdir();
        let Ok(dir) = dir else { panic!("tempdir") };
        let Some(mut config) = synthetic_config(dir.path()) else {
            panic!("config");
        };
        config.num_workers = 1;
        let Ok(mut sim) = SimulationContext::new(config) else {
            panic!("context");
        };
        sim.config.num_workers = 0;
        let source = source_for(&sim.config);
        assert!(matches!(run(&sim, source.as_ref()), Err(RunnerError::NoWorkers)));
    }
}
