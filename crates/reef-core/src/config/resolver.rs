//! [`ConfigResolver`] — merges source adapters into one logical tree.
//!
//! The resolver walks sources from highest legal rank to lowest (restricted
//! to the option's capability set), returns the first value found, and
//! coerces it to the option's declared type. Resolution is total: every
//! declared option either resolves from some legal source, falls back to a
//! default, or fails loudly with
//! [`ConfigError::MissingRequiredConfig`].
//!
//! # Example
//!
//! ```rust,ignore
//! let resolver = Arc::new(
//!     ConfigResolver::new()
//!         .with_manifest(ManifestSource::new(tree))
//!         .with_kv(Arc::new(MemoryKv::new())),
//! );
//!
//! let prefix = ConfigOption::new("bot.command_prefix", ExpectedType::String)
//!     .default(ConfigValue::String("!".into()));
//! let value: String = resolver.get(&prefix).await?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::config::key::ConfigKey;
use crate::config::source::{
    DefaultTable, EnvSource, KvSource, ManifestSource, Source, SourceAdapter, SourceSet,
};
use crate::config::value::{ConfigValue, ExpectedType, FromConfigValue, ResolvedValue, coerce};
use crate::error::{ConfigError, ConfigResult};
use crate::kv::KvStore;

// =============================================================================
// ConfigOption
// =============================================================================

/// Declaration of a single configuration option: its key, declared type,
/// optional default, capability set, and cache policy.
///
/// An option without a default is *required* — resolution fails with
/// [`ConfigError::MissingRequiredConfig`] when no legal source supplies it.
#[derive(Debug, Clone)]
pub struct ConfigOption {
    /// The dotted key this option resolves.
    pub key: ConfigKey,
    /// The type the resolved value must coerce to.
    pub expected: ExpectedType,
    /// Fallback value when no source supplies the key. `None` = required.
    pub default: Option<ConfigValue>,
    /// Which sources may legally supply this option.
    pub sources: SourceSet,
    /// Optional human-readable description, shown in error reports.
    pub description: String,
    /// Cache TTL for resolved values; `None` re-resolves on every lookup.
    pub cache_ttl: Option<Duration>,
}

impl ConfigOption {
    /// Declares an option with the full capability set and no default.
    pub fn new(key: impl Into<ConfigKey>, expected: ExpectedType) -> Self {
        Self {
            key: key.into(),
            expected,
            default: None,
            sources: SourceSet::ALL,
            description: String::new(),
            cache_ttl: None,
        }
    }

    /// Sets the default value.
    pub fn default(mut self, value: ConfigValue) -> Self {
        self.default = Some(value);
        self
    }

    /// Restricts the capability set.
    pub fn sources(mut self, sources: SourceSet) -> Self {
        self.sources = sources;
        self
    }

    /// Attaches a description.
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Enables caching of resolved values for `ttl`.
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }
}

/// Callback invoked by [`ConfigResolver::watch`] with each re-resolved value.
pub type WatchCallback = Arc<dyn Fn(ResolvedValue) + Send + Sync>;

// =============================================================================
// ConfigResolver
// =============================================================================

struct CacheEntry {
    resolved: ResolvedValue,
    expires_at: Instant,
}

/// Process-wide configuration resolver.
///
/// Constructed once at startup and shared behind an `Arc`; plugins see it
/// only through their scoped config view.
pub struct ConfigResolver {
    defaults: DefaultTable,
    manifest: Option<ManifestSource>,
    env: EnvSource,
    kv: Option<KvSource>,
    cache: Mutex<HashMap<(ConfigKey, SourceSet), CacheEntry>>,
}

impl ConfigResolver {
    /// Creates a resolver with only the default and environment sources.
    pub fn new() -> Self {
        Self {
            defaults: DefaultTable::new(),
            manifest: None,
            env: EnvSource,
            kv: None,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Attaches the startup-read manifest tree.
    pub fn with_manifest(mut self, manifest: ManifestSource) -> Self {
        self.manifest = Some(manifest);
        self
    }

    /// Attaches the persistent KV store driver.
    pub fn with_kv(mut self, store: Arc<dyn KvStore>) -> Self {
        self.kv = Some(KvSource::new(store));
        self
    }

    /// Merges `mapping` into the default source on behalf of `owner`.
    ///
    /// A collision with a default registered by a different owner is a
    /// startup-time error — two components disagreeing about a default
    /// indicates a packaging bug.
    pub fn register_defaults(
        &self,
        owner: &str,
        mapping: impl IntoIterator<Item = (ConfigKey, ConfigValue)>,
    ) -> ConfigResult<()> {
        let mapping: Vec<(ConfigKey, ConfigValue)> = mapping.into_iter().collect();
        let keys: Vec<ConfigKey> = mapping.iter().map(|(k, _)| k.clone()).collect();
        self.defaults.register(owner, mapping)?;
        for key in &keys {
            self.invalidate(key);
        }
        debug!(owner, count = keys.len(), "Registered config defaults");
        Ok(())
    }

    /// Resolves `option` to a value with provenance.
    pub async fn resolve(&self, option: &ConfigOption) -> ConfigResult<ResolvedValue> {
        if let Some(ttl) = option.cache_ttl {
            let cache_key = (option.key.clone(), option.sources);
            if let Some(entry) = self.cache.lock().get(&cache_key)
                && entry.expires_at > Instant::now()
            {
                trace!(key = %option.key, "Config cache hit");
                return Ok(entry.resolved.clone());
            }

            let resolved = self.resolve_uncached(option).await?;
            self.cache.lock().insert(
                cache_key,
                CacheEntry {
                    resolved: resolved.clone(),
                    expires_at: Instant::now() + ttl,
                },
            );
            return Ok(resolved);
        }

        self.resolve_uncached(option).await
    }

    /// Resolves `option` and converts the value to `T`.
    ///
    /// The option's declared type must match `T`'s expected type; a mismatch
    /// surfaces as [`ConfigError::TypeMismatch`].
    pub async fn get<T: FromConfigValue>(&self, option: &ConfigOption) -> ConfigResult<T> {
        let resolved = self.resolve(option).await?;
        let source = resolved.source;
        let found = format!("{:?}", resolved.value);
        T::from_value(resolved.value).ok_or(ConfigError::TypeMismatch {
            key: option.key.to_string(),
            expected: T::EXPECTED,
            found,
            origin: source,
        })
    }

    /// Registers a live-reload hook for `option`.
    ///
    /// Only the KV store supports change notification; environment and
    /// manifest sources are read once at startup and never watched. When the
    /// store reports a change, the cache entry is invalidated immediately,
    /// the option is re-resolved, and `callback` receives the new value.
    ///
    /// # Panics
    ///
    /// Must be called from within a Tokio runtime. The runtime handle is
    /// captured at registration, so the store driver is free to fire its
    /// notification from any thread.
    pub fn watch(
        self: &Arc<Self>,
        option: ConfigOption,
        callback: WatchCallback,
    ) -> ConfigResult<()> {
        if !option.sources.contains(Source::KvStore) {
            return Err(ConfigError::WatchUnsupported {
                key: option.key.to_string(),
            });
        }
        let Some(kv) = &self.kv else {
            return Err(ConfigError::WatchUnsupported {
                key: option.key.to_string(),
            });
        };

        let resolver = Arc::clone(self);
        let option = Arc::new(option);
        let kv_name = option.key.kv_name();
        let handle = tokio::runtime::Handle::current();
        kv.store().watch(
            &kv_name,
            Arc::new(move |_new| {
                let resolver = Arc::clone(&resolver);
                let option = Arc::clone(&option);
                let callback = Arc::clone(&callback);
                resolver.invalidate(&option.key);
                handle.spawn(async move {
                    match resolver.resolve(&option).await {
                        Ok(resolved) => callback(resolved),
                        Err(e) => {
                            warn!(key = %option.key, error = %e, "Re-resolution after KV change failed");
                        }
                    }
                });
            }),
        );
        Ok(())
    }

    /// Drops every cached entry for `key`, regardless of capability set.
    pub fn invalidate(&self, key: &ConfigKey) {
        self.cache.lock().retain(|(k, _), _| k != key);
    }

    async fn resolve_uncached(&self, option: &ConfigOption) -> ConfigResult<ResolvedValue> {
        for source in Source::DESCENDING {
            if !option.sources.contains(source) {
                continue;
            }

            // The default rank merges the registered table with the option's
            // own declared default.
            if source == Source::Default {
                let fallback = self
                    .defaults
                    .get(&option.key)
                    .or_else(|| option.default.clone());
                if let Some(raw) = fallback {
                    let value =
                        coerce(raw, option.expected, option.key.as_str(), Source::Default)?;
                    trace!(key = %option.key, source = %Source::Default, "Config option resolved");
                    return Ok(ResolvedValue {
                        value,
                        source: Source::Default,
                    });
                }
                continue;
            }

            let adapter: Option<&dyn SourceAdapter> = match source {
                Source::KvStore => self.kv.as_ref().map(|kv| kv as &dyn SourceAdapter),
                Source::Environment => Some(&self.env),
                Source::ManifestFile => {
                    self.manifest.as_ref().map(|m| m as &dyn SourceAdapter)
                }
                Source::Default => unreachable!(),
            };
            let Some(adapter) = adapter else { continue };

            if let Some(raw) = adapter.get(&option.key).await? {
                let value = coerce(raw, option.expected, option.key.as_str(), source)?;
                trace!(key = %option.key, source = %source, "Config option resolved");
                return Ok(ResolvedValue { value, source });
            }
        }

        Err(ConfigError::MissingRequiredConfig {
            key: option.key.to_string(),
            searched: option.sources.friendly(),
        })
    }
}

impl Default for ConfigResolver {
    fn default() -> Self {
        Self::new()
    }
}
