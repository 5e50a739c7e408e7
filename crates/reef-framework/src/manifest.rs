//! Plugin identity and manifest parsing.
//!
//! Every plugin package ships a `plugin.toml` describing its identity,
//! entry constructor, dependencies, and default configuration. The group
//! half of a plugin's identity comes from the package root it was
//! discovered under, never from the manifest itself, so a package cannot
//! impersonate another group.
//!
//! ```toml
//! [plugin]
//! name = "dms"
//! version = "1.2.0"
//! description = "Direct-message relay"
//! entry = "dms"
//!
//! [dependencies]
//! plugins = ["core:events"]
//!
//! [config]
//! relay_channel = "inbox"
//! max_queue = 128
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use reef_core::ConfigValue;
use serde::{Deserialize, Serialize};

use crate::error::{PluginError, PluginResult};

/// File name every plugin package must carry at its root.
pub const MANIFEST_FILE_NAME: &str = "plugin.toml";

// =============================================================================
// PluginId
// =============================================================================

/// Fully-qualified plugin identity, rendered `group:name`.
///
/// Ordering is lexicographic on `(group, name)`; the registry relies on
/// this for deterministic load-order tie-breaking.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PluginId {
    group: String,
    name: String,
}

impl PluginId {
    pub fn new(group: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
        }
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for PluginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.group, self.name)
    }
}

impl FromStr for PluginId {
    type Err = PluginError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((group, name)) if !group.is_empty() && !name.is_empty() && name != "*" => {
                Ok(Self::new(group, name))
            }
            _ => Err(PluginError::InvalidId(s.to_string())),
        }
    }
}

// =============================================================================
// PluginManifest
// =============================================================================

/// Parsed, validated contents of one `plugin.toml`.
#[derive(Debug, Clone)]
pub struct PluginManifest {
    /// Identity assigned at discovery: package-root group + manifest name.
    pub id: PluginId,
    /// Semantic version string, informational only.
    pub version: String,
    /// Human-readable description, may be empty.
    pub description: String,
    /// Constructor entry name; defaults to the plugin name.
    pub entry: String,
    /// Plugins that must be running before this one loads.
    pub dependencies: Vec<PluginId>,
    /// Default configuration, flattened to dotted keys relative to the
    /// plugin's config scope.
    pub config_defaults: BTreeMap<String, ConfigValue>,
}

#[derive(Deserialize)]
struct ManifestFile {
    plugin: PluginSection,
    #[serde(default)]
    dependencies: DependencySection,
    #[serde(default)]
    config: toml::Table,
}

#[derive(Deserialize)]
struct PluginSection {
    name: String,
    version: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    entry: Option<String>,
}

#[derive(Default, Deserialize)]
struct DependencySection {
    #[serde(default)]
    plugins: Vec<String>,
}

impl PluginManifest {
    /// Parses manifest `content` for a package discovered under `group`.
    ///
    /// `path` is used only for error reporting. The plugin name is
    /// normalized to lowercase with spaces collapsed to underscores.
    pub fn parse(group: &str, path: &str, content: &str) -> PluginResult<Self> {
        let file: ManifestFile = toml::from_str(content).map_err(|e| PluginError::ManifestParse {
            path: path.to_string(),
            message: e.to_string(),
        })?;

        let name = normalize_name(&file.plugin.name);
        if name.is_empty() {
            return Err(PluginError::ManifestParse {
                path: path.to_string(),
                message: "plugin name must not be empty".to_string(),
            });
        }
        if file.plugin.version.trim().is_empty() {
            return Err(PluginError::ManifestParse {
                path: path.to_string(),
                message: "plugin version must not be empty".to_string(),
            });
        }

        let entry = file
            .plugin
            .entry
            .map(|e| normalize_name(&e))
            .unwrap_or_else(|| name.clone());

        let mut dependencies = Vec::with_capacity(file.dependencies.plugins.len());
        for dep in &file.dependencies.plugins {
            let id: PluginId = dep.parse().map_err(|_| PluginError::ManifestParse {
                path: path.to_string(),
                message: format!("dependency {dep:?} is not of the form \"group:name\""),
            })?;
            dependencies.push(id);
        }

        let mut config_defaults = BTreeMap::new();
        flatten_config("", &file.config, path, &mut config_defaults)?;

        Ok(Self {
            id: PluginId::new(group, name),
            version: file.plugin.version,
            description: file.plugin.description,
            entry,
            dependencies,
            config_defaults,
        })
    }
}

fn normalize_name(raw: &str) -> String {
    raw.trim().to_lowercase().replace(' ', "_")
}

/// Flattens a `[config]` table into dotted keys. Nested tables recurse;
/// floats and datetimes have no [`ConfigValue`] representation and are
/// rejected rather than silently dropped.
fn flatten_config(
    prefix: &str,
    table: &toml::Table,
    path: &str,
    out: &mut BTreeMap<String, ConfigValue>,
) -> PluginResult<()> {
    for (key, value) in table {
        let dotted = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            toml::Value::String(s) => {
                out.insert(dotted, ConfigValue::String(s.clone()));
            }
            toml::Value::Integer(i) => {
                out.insert(dotted, ConfigValue::Integer(*i));
            }
            toml::Value::Boolean(b) => {
                out.insert(dotted, ConfigValue::Bool(*b));
            }
            toml::Value::Array(items) => {
                let mut list = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        toml::Value::String(s) => list.push(s.clone()),
                        other => {
                            return Err(PluginError::ManifestParse {
                                path: path.to_string(),
                                message: format!(
                                    "config key {dotted:?}: lists may only contain strings, found {other}"
                                ),
                            });
                        }
                    }
                }
                out.insert(dotted, ConfigValue::List(list));
            }
            toml::Value::Table(nested) => {
                flatten_config(&dotted, nested, path, out)?;
            }
            other => {
                return Err(PluginError::ManifestParse {
                    path: path.to_string(),
                    message: format!("config key {dotted:?}: unsupported value {other}"),
                });
            }
        }
    }
    Ok(())
}
