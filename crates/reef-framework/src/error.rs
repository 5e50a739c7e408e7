//! Plugin-layer error taxonomy.

use std::time::Duration;

use reef_core::ConfigError;

use crate::manifest::PluginId;

/// Errors raised while discovering, ordering, loading, or unloading plugins.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PluginError {
    /// A package directory or manifest file could not be read.
    #[error("Failed to read {path}: {message}")]
    ManifestRead { path: String, message: String },

    /// A manifest file exists but is not valid.
    #[error("Invalid manifest at {path}: {message}")]
    ManifestParse { path: String, message: String },

    /// Two discovered packages resolved to the same plugin id.
    #[error("Duplicate plugin id {id}: already discovered at {first_path}, found again at {second_path}")]
    DuplicateManifest {
        id: PluginId,
        first_path: String,
        second_path: String,
    },

    /// A plugin identifier string is not of the form `group:name`.
    #[error("Invalid plugin id {0:?}: expected \"group:name\"")]
    InvalidId(String),

    /// A requested plugin was never discovered.
    #[error("Unknown plugin {id}")]
    UnknownPlugin { id: PluginId },

    /// A manifest names an entry with no registered constructor.
    #[error("Plugin {id} declares entry {entry:?} but no such constructor is registered")]
    UnknownEntry { id: PluginId, entry: String },

    /// A declared dependency cannot be satisfied.
    #[error("Plugin {id} requires {dependency}, which {reason}")]
    MissingDependency {
        id: PluginId,
        dependency: PluginId,
        reason: String,
    },

    /// A group of plugins depend on each other in a cycle.
    #[error("Dependency cycle among plugins: {}", members.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "))]
    DependencyCycle { members: Vec<PluginId> },

    /// A plugin's `load` hook returned an error.
    #[error("Plugin {id} failed to load: {message}")]
    LoadFailure { id: PluginId, message: String },

    /// A plugin's `unload` hook returned an error.
    #[error("Plugin {id} failed to unload: {message}")]
    UnloadFailure { id: PluginId, message: String },

    /// A lifecycle hook exceeded its deadline and was cancelled.
    #[error("Plugin {id} {hook} hook exceeded {timeout:?} and was cancelled")]
    HookTimeout {
        id: PluginId,
        hook: &'static str,
        timeout: Duration,
    },

    /// Startup was aborted before this plugin was reached.
    #[error("Startup aborted before plugin {id} was loaded")]
    StartupAborted { id: PluginId },

    /// A configuration failure surfaced through the plugin layer.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type PluginResult<T> = Result<T, PluginError>;
