//! [`ConfigKey`] — the dotted path identifying one logical setting.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A dotted configuration path such as `bot.command_prefix`.
///
/// The key is the canonical identity of a setting; each source adapter
/// derives its own lookup name from it:
///
/// | Source | Derived name |
/// |--------|--------------|
/// | Manifest file | nested tables walked segment by segment |
/// | Environment | `UPPER_SNAKE` join (`BOT_COMMAND_PREFIX`) |
/// | KV store | slash join (`bot/command_prefix`) |
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigKey(String);

impl ConfigKey {
    /// Creates a key from a dotted path.
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// Returns the dotted path as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Iterates the path segments.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }

    /// Appends a relative dotted path, producing a new key.
    pub fn join(&self, tail: &str) -> Self {
        Self(format!("{}.{}", self.0, tail))
    }

    /// Environment variable name for this key (`bot.command_prefix` →
    /// `BOT_COMMAND_PREFIX`).
    pub fn env_name(&self) -> String {
        self.segments()
            .map(|s| s.to_ascii_uppercase())
            .collect::<Vec<_>>()
            .join("_")
    }

    /// KV store path for this key (`bot.command_prefix` →
    /// `bot/command_prefix`).
    ///
    /// Slashes inside a segment are replaced with underscores so the derived
    /// path cannot collide with another key's hierarchy.
    pub fn kv_name(&self) -> String {
        self.segments()
            .map(|s| s.replace('/', "_"))
            .collect::<Vec<_>>()
            .join("/")
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConfigKey {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

impl From<String> for ConfigKey {
    fn from(path: String) -> Self {
        Self::new(path)
    }
}
