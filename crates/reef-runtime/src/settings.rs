//! Runtime settings loaded from `framework.toml`, environment variables,
//! and built-in defaults.
//!
//! Settings describe the framework's own shape: which package roots to
//! scan, which plugins to enable, how to log, and the lifecycle deadlines.
//! They are distinct from the layered per-option configuration that plugins
//! read at runtime — the same file feeds both, but settings are extracted
//! once at startup while the manifest tree stays live in the resolver.
//!
//! # Priority (lowest to highest)
//!
//! 1. Built-in defaults
//! 2. `framework.toml`
//! 3. Environment variables (`REEF_*`, `__` as section separator, e.g.
//!    `REEF_LOG__LEVEL=debug`)

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use reef_core::{ConfigOption, ConfigValue, ExpectedType, SourceSet};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{RuntimeError, RuntimeResult};

/// Default startup configuration file, searched in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "framework.toml";

/// Environment variable prefix for settings overrides.
pub const ENV_PREFIX: &str = "REEF_";

// =============================================================================
// Schema
// =============================================================================

/// Top-level runtime settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeSettings {
    pub project: ProjectSettings,
    pub bot: BotSettings,
    pub log: LogSettings,
    pub plugins: PluginSettings,
}

/// `[project]` — identity shown in logs and reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSettings {
    pub name: String,
    pub friendly_name: String,
}

impl Default for ProjectSettings {
    fn default() -> Self {
        Self {
            name: "reef-bot".to_string(),
            friendly_name: "Reef Bot".to_string(),
        }
    }
}

/// `[bot]` — framework-level behavior knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotSettings {
    /// Prefix that marks a chat message as a command.
    pub command_prefix: String,
    /// Deadline for each plugin `load`/`unload` hook, in seconds.
    pub hook_timeout_secs: u64,
    /// Deadline for each event handler per delivery, in seconds.
    pub handler_timeout_secs: u64,
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            command_prefix: "!".to_string(),
            hook_timeout_secs: 30,
            handler_timeout_secs: 5,
        }
    }
}

/// `[log]` — logging setup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    /// Base filter level (`trace`..`error`); `RUST_LOG` still wins.
    pub level: String,
    /// Emit to stdout.
    pub console: bool,
    /// Optional log file path; appends, no rotation.
    pub file: Option<PathBuf>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            console: true,
            file: None,
        }
    }
}

/// `[plugins]` — discovery roots and the enabled set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PluginSettings {
    /// Plugin ids or `group:*` wildcards to load at startup.
    pub enabled: Vec<String>,
    /// Directories to scan for plugin packages.
    pub packages: Vec<PackageEntry>,
    /// Abort the whole startup on the first plugin failure instead of
    /// skipping only the failed subtree.
    pub abort_on_failure: bool,
}

/// One `[[plugins.packages]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageEntry {
    pub group: String,
    pub path: PathBuf,
}

// =============================================================================
// Loading
// =============================================================================

impl RuntimeSettings {
    /// Loads settings and the raw configuration tree.
    ///
    /// The tree is the whole parsed file as JSON; the runtime feeds it to
    /// the resolver's manifest source so plugin options can read from it.
    /// An explicitly given `path` must exist; the default file is optional.
    pub fn load(path: Option<&Path>) -> RuntimeResult<(Self, serde_json::Value)> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };

        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        let mut tree = serde_json::Value::Object(serde_json::Map::new());

        if path.is_file() {
            let raw =
                std::fs::read_to_string(&path).map_err(|e| RuntimeError::ConfigFile {
                    path: path.display().to_string(),
                    message: e.to_string(),
                })?;
            let parsed: toml::Value =
                toml::from_str(&raw).map_err(|e| RuntimeError::ConfigFile {
                    path: path.display().to_string(),
                    message: e.to_string(),
                })?;
            tree = serde_json::to_value(&parsed).map_err(|e| RuntimeError::ConfigFile {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
            figment = figment.merge(Toml::string(&raw));
        } else if required {
            return Err(RuntimeError::ConfigFile {
                path: path.display().to_string(),
                message: "file not found".to_string(),
            });
        } else {
            debug!(path = %path.display(), "No configuration file, using defaults");
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));
        let settings: Self = figment.extract().map_err(Box::new)?;
        Ok((settings, tree))
    }
}

// =============================================================================
// Framework config options
// =============================================================================

/// Declarations for the options the framework itself resolves through the
/// layered config system (as opposed to the startup settings above).
pub mod options {
    use super::*;

    /// Gateway token. Secrets never live in files, so the capability set
    /// admits only the environment; having no default makes it required.
    pub fn bot_token() -> ConfigOption {
        ConfigOption::new("bot.token", ExpectedType::String)
            .sources(SourceSet::ENV_ONLY)
            .describe("bot gateway token (set BOT_TOKEN)")
    }

    /// Command prefix; any source may override the `!` default.
    pub fn command_prefix() -> ConfigOption {
        ConfigOption::new("bot.command_prefix", ExpectedType::String)
            .default(ConfigValue::String("!".to_string()))
            .describe("prefix marking a message as a command")
    }

    /// Log level is fixed at startup and only meaningful in the file.
    pub fn log_level() -> ConfigOption {
        ConfigOption::new("log.level", ExpectedType::String)
            .default(ConfigValue::String("info".to_string()))
            .sources(SourceSet::FILE_ONLY)
            .describe("base logging level")
    }
}
