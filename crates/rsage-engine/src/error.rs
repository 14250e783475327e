//! Error types for the rsage binary.
//!
//! [`EngineError`] wraps every failure between reading the parameter file
//! and writing the master grid.

/// Top-level error for a run.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The parameter file could not be read or parsed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: rsage_core::config::ConfigError,
    },

    /// The simulation context could not be assembled.
    #[error("context error: {source}")]
    Context {
        /// The underlying context error.
        #[from]
        source: rsage_core::context::ContextError,
    },

    /// A worker or the reduction failed.
    #[error("runner error: {source}")]
    Runner {
        /// The underlying runner error.
        #[from]
        source: rsage_core::runner::RunnerError,
    },

    /// The master grid could not be written.
    #[error("output error: {source}")]
    Output {
        /// The underlying output error.
        #[from]
        source: rsage_core::output::OutputError,
    },

    /// The run report could not be serialized.
    #[error("report error: {source}")]
    Report {
        /// The underlying serializer error.
        #[from]
        source: serde_json::Error,
    },
}
