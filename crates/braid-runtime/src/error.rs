//! Runtime error types.

use thiserror::Error;

use crate::config::ConfigError;

/// Errors raised while assembling or tearing down a runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Configuration loading or validation failed.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Plugin construction or registration failed.
    #[error(transparent)]
    Engine(#[from] braid_core::error::Error),

    /// A plugin args section could not be converted for decoding.
    #[error("plugin '{tag}' args are not decodable: {reason}")]
    BadPluginArgs {
        /// Tag of the offending plugin entry.
        tag: String,
        /// What went wrong.
        reason: String,
    },

    /// Waiting for the shutdown signal failed.
    #[error("signal wait failed: {0}")]
    Signal(#[from] std::io::Error),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
