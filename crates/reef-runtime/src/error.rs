//! Runtime error types.

use reef_core::ConfigError;
use reef_framework::PluginError;
use thiserror::Error;

/// Errors that can occur while assembling or running the framework.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Settings extraction failed (bad types, malformed env overrides).
    #[error("Failed to load settings: {0}")]
    Settings(#[from] Box<figment::Error>),

    /// The startup configuration file could not be read or parsed.
    #[error("Failed to read {path}: {message}")]
    ConfigFile { path: String, message: String },

    /// A required configuration option could not be resolved.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Startup was aborted by a plugin failure.
    #[error(transparent)]
    Plugin(#[from] PluginError),
}

impl From<figment::Error> for RuntimeError {
    fn from(e: figment::Error) -> Self {
        Self::Settings(Box::new(e))
    }
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
