//! Runtime error types.

use thiserror::Error;

use crate::config::ConfigError;

/// Errors that can occur during runtime operations.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration could not be loaded or failed validation.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// `run` was called while another `run` is still active.
    #[error("Runtime is already running")]
    AlreadyRunning,

    /// The dispatch limiter was closed while events were still pending.
    #[error("Dispatch limiter closed")]
    LimiterClosed,
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
