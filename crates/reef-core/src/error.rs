//! Unified error types for the Reef core crates.
//!
//! Framework-level errors (plugin discovery, lifecycle) are defined in
//! `reef-framework`; this module covers configuration resolution and the
//! key/value collaborator.

use thiserror::Error;

use crate::config::{ExpectedType, Source};

/// Boxed error type used by plugin hooks and event handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

// =============================================================================
// Config Errors
// =============================================================================

/// Errors that can occur during configuration resolution.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// No legal source supplied a value and the option has no default.
    #[error("missing required configuration option '{key}' (searched: {searched})")]
    MissingRequiredConfig {
        /// The dotted key that could not be resolved.
        key: String,
        /// Human-readable list of the sources that were consulted.
        searched: String,
    },

    /// A source held a value that could not be coerced to the expected type.
    ///
    /// The supplying source is carried as `origin`; thiserror reserves the
    /// field name `source` for an underlying `std::error::Error`.
    #[error("config option '{key}': cannot coerce {found:?} from {origin} to {expected}")]
    TypeMismatch {
        /// The dotted key being resolved.
        key: String,
        /// The type the option declares.
        expected: ExpectedType,
        /// Debug rendering of the raw value that was found.
        found: String,
        /// The source that supplied the offending value.
        origin: Source,
    },

    /// Two different owners registered a default for the same key.
    ///
    /// This indicates a packaging bug and is fatal at startup.
    #[error("default for '{key}' already registered by '{existing_owner}' (rejected re-registration by '{new_owner}')")]
    DefaultCollision {
        /// The contested key.
        key: String,
        /// Owner of the default already in place.
        existing_owner: String,
        /// Owner whose registration was rejected.
        new_owner: String,
    },

    /// A `watch` was requested for an option whose capability set has no
    /// change-notifying source.
    #[error("config option '{key}' cannot be watched: no watchable source in its capability set")]
    WatchUnsupported {
        /// The dotted key.
        key: String,
    },

    /// The persistent KV store reported a failure.
    #[error("kv store error: {0}")]
    KvUnavailable(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
