//! Error types for the engine binary.
//!
//! [`EngineError`] wraps every failure mode during startup and the run, so
//! `main` can propagate with `?`.

/// Top-level error for the engine binary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: smartqueue_core::config::ConfigError,
    },

    /// The control loop refused to start.
    #[error("runner error: {source}")]
    Runner {
        /// The underlying runner error.
        #[from]
        source: smartqueue_core::runner::RunnerError,
    },

    /// The HTTP server failed to start.
    #[error("server error: {message}")]
    Server {
        /// Description of the server failure.
        message: String,
    },
}
