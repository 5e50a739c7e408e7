//! Configuration sources and their read-only adapters.
//!
//! Every origin a value can come from is wrapped in a [`SourceAdapter`] — a
//! uniform, read-only view the resolver walks in precedence order.
//! Precedence is fixed and never varies per key:
//!
//! ```text
//! KV store (3)  >  Environment (2)  >  Manifest file (1)  >  Default (0)
//! ```
//!
//! An option's [`SourceSet`] capability set restricts which of these ranks
//! may legally supply it; the resolver skips any source outside the set even
//! when it holds a conflicting value.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use crate::config::key::ConfigKey;
use crate::config::value::ConfigValue;
use crate::error::{ConfigError, ConfigResult};
use crate::kv::KvStore;

// =============================================================================
// Source + SourceSet
// =============================================================================

/// A ranked origin of configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    /// Registered default table (rank 0, lowest).
    Default,
    /// Structured manifest file, read once at startup (rank 1).
    ManifestFile,
    /// Environment variable, read once at startup (rank 2).
    Environment,
    /// Persistent KV store, live and watchable (rank 3, highest).
    KvStore,
}

impl Source {
    /// All sources, highest rank first — the resolver's walk order.
    pub const DESCENDING: [Source; 4] = [
        Source::KvStore,
        Source::Environment,
        Source::ManifestFile,
        Source::Default,
    ];

    /// Precedence rank; higher overrides lower.
    pub fn rank(self) -> u8 {
        match self {
            Self::Default => 0,
            Self::ManifestFile => 1,
            Self::Environment => 2,
            Self::KvStore => 3,
        }
    }

    /// Whether values from this source arrive typed (vs. raw strings that
    /// need parsing).
    pub fn is_structured(self) -> bool {
        !matches!(self, Self::Environment)
    }

    fn bit(self) -> u8 {
        1 << self.rank()
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Default => "default",
            Self::ManifestFile => "manifest",
            Self::Environment => "env",
            Self::KvStore => "kv",
        };
        f.write_str(name)
    }
}

/// The set of sources an option may legally be supplied from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceSet(u8);

impl SourceSet {
    /// Every source (`*` in the option docs).
    pub const ALL: Self = Self(0b1111);
    /// Only the default table.
    pub const DEFAULT_ONLY: Self = Self(1 << 0);
    /// Environment plus default — typical for secrets that must not live in
    /// files or the KV store.
    pub const ENV_ONLY: Self = Self(1 << 2 | 1 << 0);
    /// Manifest file plus default — static, discovery-critical options.
    pub const FILE_ONLY: Self = Self(1 << 1 | 1 << 0);

    /// Empty set.
    pub fn empty() -> Self {
        Self(0)
    }

    /// Returns the set with `source` added.
    pub fn with(self, source: Source) -> Self {
        Self(self.0 | source.bit())
    }

    /// Whether `source` may supply the option.
    pub fn contains(self, source: Source) -> bool {
        self.0 & source.bit() != 0
    }

    /// Human-readable rendering for error messages, highest rank first.
    pub fn friendly(self) -> String {
        let names: Vec<String> = Source::DESCENDING
            .iter()
            .filter(|s| self.contains(**s))
            .map(|s| s.to_string())
            .collect();
        names.join(" > ")
    }
}

impl Default for SourceSet {
    fn default() -> Self {
        Self::ALL
    }
}

// =============================================================================
// SourceAdapter
// =============================================================================

/// Uniform read-only view over one configuration origin.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// The source this adapter represents.
    fn source(&self) -> Source;

    /// Fetches the raw value for `key`, or `None` when this origin does not
    /// supply it.
    async fn get(&self, key: &ConfigKey) -> ConfigResult<Option<ConfigValue>>;
}

// =============================================================================
// DefaultTable
// =============================================================================

/// The rank-0 default source: a merged table of registered defaults.
///
/// Each entry remembers its owner (the framework or a plugin id) so a second
/// registration of the same key by a *different* owner is rejected as a
/// packaging bug. Re-registration by the same owner is idempotent.
pub struct DefaultTable {
    entries: RwLock<HashMap<ConfigKey, (String, ConfigValue)>>,
}

impl DefaultTable {
    /// Creates an empty default table.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Merges `mapping` into the table on behalf of `owner`.
    pub fn register(
        &self,
        owner: &str,
        mapping: impl IntoIterator<Item = (ConfigKey, ConfigValue)>,
    ) -> ConfigResult<()> {
        let mut entries = self.entries.write();
        for (key, value) in mapping {
            if let Some((existing_owner, _)) = entries.get(&key)
                && existing_owner != owner
            {
                return Err(ConfigError::DefaultCollision {
                    key: key.to_string(),
                    existing_owner: existing_owner.clone(),
                    new_owner: owner.to_string(),
                });
            }
            entries.insert(key, (owner.to_string(), value));
        }
        Ok(())
    }

    /// Looks up a registered default.
    pub fn get(&self, key: &ConfigKey) -> Option<ConfigValue> {
        self.entries.read().get(key).map(|(_, v)| v.clone())
    }
}

impl Default for DefaultTable {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceAdapter for DefaultTable {
    fn source(&self) -> Source {
        Source::Default
    }

    async fn get(&self, key: &ConfigKey) -> ConfigResult<Option<ConfigValue>> {
        Ok(DefaultTable::get(self, key))
    }
}

// =============================================================================
// ManifestSource
// =============================================================================

/// The rank-1 manifest-file source: a structured tree read once at startup.
///
/// The runtime parses `framework.toml` into a JSON tree and hands it here;
/// lookups walk nested tables segment by segment.
pub struct ManifestSource {
    tree: Value,
}

impl ManifestSource {
    /// Wraps an already-parsed manifest tree.
    pub fn new(tree: Value) -> Self {
        Self { tree }
    }

    fn lookup(&self, key: &ConfigKey) -> Option<&Value> {
        let mut node = &self.tree;
        for segment in key.segments() {
            node = node.as_object()?.get(segment)?;
        }
        Some(node)
    }
}

#[async_trait]
impl SourceAdapter for ManifestSource {
    fn source(&self) -> Source {
        Source::ManifestFile
    }

    async fn get(&self, key: &ConfigKey) -> ConfigResult<Option<ConfigValue>> {
        Ok(self.lookup(key).and_then(ConfigValue::from_json))
    }
}

// =============================================================================
// EnvSource
// =============================================================================

/// The rank-2 environment source. Always yields raw strings; coercion parses
/// them against the option's declared type.
pub struct EnvSource;

#[async_trait]
impl SourceAdapter for EnvSource {
    fn source(&self) -> Source {
        Source::Environment
    }

    async fn get(&self, key: &ConfigKey) -> ConfigResult<Option<ConfigValue>> {
        match std::env::var(key.env_name()) {
            Ok(raw) => Ok(Some(ConfigValue::String(raw))),
            Err(_) => Ok(None),
        }
    }
}

// =============================================================================
// KvSource
// =============================================================================

/// The rank-3 persistent KV source, backed by an external [`KvStore`]
/// collaborator. The only source that supports change notification.
pub struct KvSource {
    store: Arc<dyn KvStore>,
}

impl KvSource {
    /// Wraps a KV store driver.
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// The underlying store, used by the resolver's watch bridging.
    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }
}

#[async_trait]
impl SourceAdapter for KvSource {
    fn source(&self) -> Source {
        Source::KvStore
    }

    async fn get(&self, key: &ConfigKey) -> ConfigResult<Option<ConfigValue>> {
        self.store.get(&key.kv_name()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precedence_ranks_are_fixed() {
        assert!(Source::KvStore.rank() > Source::Environment.rank());
        assert!(Source::Environment.rank() > Source::ManifestFile.rank());
        assert!(Source::ManifestFile.rank() > Source::Default.rank());
    }

    #[test]
    fn source_set_membership() {
        assert!(SourceSet::ALL.contains(Source::KvStore));
        assert!(!SourceSet::ENV_ONLY.contains(Source::ManifestFile));
        assert!(SourceSet::ENV_ONLY.contains(Source::Environment));
        assert!(SourceSet::ENV_ONLY.contains(Source::Default));

        let custom = SourceSet::empty().with(Source::KvStore);
        assert!(custom.contains(Source::KvStore));
        assert!(!custom.contains(Source::Default));
    }

    #[test]
    fn default_table_rejects_cross_owner_collision() {
        let table = DefaultTable::new();
        table
            .register("framework", [(ConfigKey::new("bot.prefix"), ConfigValue::String("!".into()))])
            .unwrap();

        // Same owner is idempotent.
        table
            .register("framework", [(ConfigKey::new("bot.prefix"), ConfigValue::String("!".into()))])
            .unwrap();

        let err = table
            .register("core:dms", [(ConfigKey::new("bot.prefix"), ConfigValue::String("?".into()))])
            .unwrap_err();
        assert!(matches!(err, ConfigError::DefaultCollision { .. }));
    }

    #[tokio::test]
    async fn manifest_source_walks_nested_tables() {
        let source = ManifestSource::new(serde_json::json!({
            "bot": { "command_prefix": "!" },
            "plugins": { "enabled": ["core:*"] },
        }));

        let value = source.get(&ConfigKey::new("bot.command_prefix")).await.unwrap();
        assert_eq!(value, Some(ConfigValue::String("!".into())));

        let missing = source.get(&ConfigKey::new("bot.token")).await.unwrap();
        assert_eq!(missing, None);
    }
}
