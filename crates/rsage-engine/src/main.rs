//! Command-line driver for rsage.
//!
//! # Run Sequence
//!
//! 1. Initialize structured logging (tracing)
//! 2. Load the parameter file and apply command-line overrides
//! 3. Build the simulation context: cosmology, snapshots, escape fraction
//! 4. Run every worker over its shard of tree files
//! 5. Reduce the worker grids into the master grid
//! 6. Write the master grid and its summary

mod error;

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use rsage_core::config::RunConfig;
use rsage_core::context::SimulationContext;
use rsage_core::output::write_grid;
use rsage_core::runner;
use rsage_core::tree::source_for;
use rsage_grid::summarize_grid;

use crate::error::EngineError;

/// Evolve galaxies through merger trees and grid their ionizing photons.
#[derive(Parser, Debug)]
#[command(name = "rsage", version, about)]
struct Cli {
    /// Parameter file: flat `Key Value` lines, or YAML (`.yaml`/`.yml`).
    param_file: PathBuf,

    /// Override `NumWorkers`.
    #[arg(short, long)]
    workers: Option<usize>,

    /// Override `OutputDir`.
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Log as JSON lines instead of text.
    #[arg(long)]
    log_json: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // 1. Initialize structured logging.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }

    info!(param_file = %cli.param_file.display(), "rsage starting");
    run(&cli).with_context(|| format!("run with {} failed", cli.param_file.display()))
}

fn run(cli: &Cli) -> Result<(), EngineError> {
    // 2. Load configuration.
    let mut config = RunConfig::from_file(&cli.param_file)?;
    if let Some(workers) = cli.workers {
        config.num_workers = workers;
    }
    if let Some(dir) = &cli.output_dir {
        config.output_dir.clone_from(dir);
    }
    info!(
        output_dir = %config.output_dir.display(),
        files = config.files().count(),
        workers = config.num_workers,
        snapshots = config.last_snapshot,
        "configuration loaded"
    );

    // 3. Build the shared context.
    let sim = SimulationContext::new(config)?;
    let source = source_for(&sim.config);

    // 4-5. Workers, then the reduction.
    let out = runner::run(&sim, source.as_ref())?;
    info!(counters = %serde_json::to_string(&out.counters)?, "run counters");

    // 6. Master grid.
    let summary = summarize_grid(&out.grid, &sim.snapshots.redshifts);
    for layer in &summary.layers {
        info!(
            snapshot = layer.snapshot,
            redshift = layer.redshift,
            galaxies = layer.galaxies,
            photons_hi = layer.photons_hi,
            source_fraction = layer.source_fraction,
            "grid layer"
        );
    }
    let written = write_grid(
        &out.grid,
        &summary,
        &sim.config.output_dir,
        &sim.config.file_name_galaxies,
    )?;

    info!(
        galaxy_files = out.files.len(),
        grid_files = written.len(),
        "rsage finished"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_overrides() {
        let cli = Cli::try_parse_from(["rsage", "params.txt", "-w", "4", "--log-json"]);
        assert!(cli.is_ok());
        if let Ok(cli) = cli {
            assert_eq!(cli.param_file, PathBuf::from("params.txt"));
            assert_eq!(cli.workers, Some(4));
            assert!(cli.output_dir.is_none());
            assert!(cli.log_json);
        }
    }

    #[test]
    fn cli_requires_a_parameter_file() {
        assert!(Cli::try_parse_from(["rsage"]).is_err());
    }
}
