//! Run orchestration for rsage.
//!
//! This crate turns a parameter file and a set of merger trees into galaxy
//! files and a master photon grid. It owns everything between the physics
//! crates and the binary: configuration, snapshot timing, tree input, the
//! snapshot-by-snapshot evolution driver, the worker runner, and output.
//!
//! # Modules
//!
//! - [`config`] -- [`RunConfig`]: the parameter file, flat or YAML.
//! - [`context`] -- [`SimulationContext`], built once and shared by every
//!   worker, plus [`WorkerCounters`].
//! - [`evolve`] -- [`evolve_tree`]: galaxy construction, the substep loop,
//!   and merger checks for one tree.
//! - [`output`] -- Binary galaxy files, grid files, and the file reader.
//! - [`runner`] -- File sharding, parallel workers, and grid reduction.
//! - [`snapshots`] -- [`SnapshotTable`]: redshifts, ages, time steps.
//! - [`tree`] -- [`TreeSource`] with JSON and synthetic providers.
//!
//! [`RunConfig`]: config::RunConfig
//! [`SimulationContext`]: context::SimulationContext
//! [`WorkerCounters`]: context::WorkerCounters
//! [`evolve_tree`]: evolve::evolve_tree
//! [`SnapshotTable`]: snapshots::SnapshotTable
//! [`TreeSource`]: tree::TreeSource

pub mod config;
pub mod context;
pub mod evolve;
pub mod output;
pub mod runner;
pub mod snapshots;
pub mod tree;
