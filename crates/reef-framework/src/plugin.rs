//! The [`Plugin`] trait, constructor registry, and per-plugin context.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use reef_core::{
    BoxError, ConfigKey, ConfigOption, ConfigResolver, ConfigResult, EventBus, EventHandler,
    FromConfigValue, PublishReport, ResolvedValue, SubscriptionId,
};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::manifest::PluginId;

// =============================================================================
// Plugin trait
// =============================================================================

/// A loadable unit of bot functionality.
///
/// Both hooks default to no-ops so trivial plugins only implement what they
/// need. Hooks run under the lifecycle manager's deadline; on timeout the
/// context's cancellation token is triggered and the hook future dropped, so
/// long-running work should select against [`PluginContext::cancelled`].
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Called once when the plugin transitions to `Loading`. Returning an
    /// error marks the plugin `Failed` and skips its dependents.
    async fn load(&mut self, ctx: &PluginContext) -> Result<(), BoxError> {
        let _ = ctx;
        Ok(())
    }

    /// Called once when the plugin transitions to `Unloading`. Errors are
    /// logged but never interrupt the shutdown sequence.
    async fn unload(&mut self, ctx: &PluginContext) -> Result<(), BoxError> {
        let _ = ctx;
        Ok(())
    }
}

/// Factory producing a fresh plugin instance per load.
pub type PluginConstructor = Arc<dyn Fn() -> Box<dyn Plugin> + Send + Sync>;

/// Maps `(group, entry)` pairs to plugin constructors.
///
/// Manifests name an entry; hosts register the matching constructor here
/// before discovery. A manifest whose entry has no constructor fails to
/// load with [`crate::PluginError::UnknownEntry`].
#[derive(Default)]
pub struct ConstructorTable {
    entries: HashMap<(String, String), PluginConstructor>,
}

impl ConstructorTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `constructor` for `entry` within `group`. Re-registering
    /// the same entry replaces the previous constructor with a warning.
    pub fn register(
        &mut self,
        group: impl Into<String>,
        entry: impl Into<String>,
        constructor: impl Fn() -> Box<dyn Plugin> + Send + Sync + 'static,
    ) {
        let key = (group.into(), entry.into());
        if self
            .entries
            .insert(key.clone(), Arc::new(constructor))
            .is_some()
        {
            warn!(group = %key.0, entry = %key.1, "Constructor re-registered, keeping the latest");
        }
    }

    pub fn get(&self, group: &str, entry: &str) -> Option<PluginConstructor> {
        self.entries
            .get(&(group.to_string(), entry.to_string()))
            .cloned()
    }
}

// =============================================================================
// PluginContext
// =============================================================================

/// Per-plugin handle passed to lifecycle hooks.
///
/// The context scopes configuration reads to the plugin's own subtree
/// (`plugins.<group>.<name>.*`) and brands bus subscriptions with the
/// plugin's id so they are revoked automatically at unload.
#[derive(Clone)]
pub struct PluginContext {
    id: PluginId,
    scope: ConfigKey,
    resolver: Arc<ConfigResolver>,
    bus: Arc<EventBus>,
    cancellation: CancellationToken,
}

impl PluginContext {
    pub(crate) fn new(
        id: PluginId,
        resolver: Arc<ConfigResolver>,
        bus: Arc<EventBus>,
        cancellation: CancellationToken,
    ) -> Self {
        let scope = config_scope(&id);
        Self {
            id,
            scope,
            resolver,
            bus,
            cancellation,
        }
    }

    pub fn id(&self) -> &PluginId {
        &self.id
    }

    /// Resolves completion when the hook deadline has fired and the manager
    /// has given up on this hook.
    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Turns a key relative to this plugin's config subtree into the full
    /// dotted key (`plugins.<group>.<name>.<key>`).
    pub fn scoped_key(&self, key: &str) -> ConfigKey {
        self.scope.join(key)
    }

    /// Declares an option scoped to this plugin's config subtree. Builder
    /// methods on [`ConfigOption`] apply as usual.
    pub fn option(&self, key: &str, expected: reef_core::ExpectedType) -> ConfigOption {
        ConfigOption::new(self.scoped_key(key), expected)
    }

    /// Reads one scoped config key with the full capability set; manifest
    /// `[config]` defaults make most reads total.
    pub async fn config<T: FromConfigValue>(&self, key: &str) -> ConfigResult<T> {
        let option = ConfigOption::new(self.scoped_key(key), T::EXPECTED);
        self.resolver.get(&option).await
    }

    /// Resolves a pre-built option (typically from [`Self::option`]) with
    /// provenance attached.
    pub async fn resolve(&self, option: &ConfigOption) -> ConfigResult<ResolvedValue> {
        self.resolver.resolve(option).await
    }

    /// Registers a live-reload watch on a scoped option.
    pub fn watch(
        &self,
        option: ConfigOption,
        callback: reef_core::WatchCallback,
    ) -> ConfigResult<()> {
        self.resolver.watch(option, callback)
    }

    /// Subscribes to a bus topic on behalf of this plugin. The subscription
    /// is revoked automatically when the plugin unloads.
    pub fn subscribe(&self, topic: &str, handler: EventHandler) -> SubscriptionId {
        self.bus
            .subscribe(topic, Some(&self.id.to_string()), handler)
    }

    /// Publishes to the shared bus.
    pub async fn publish(&self, topic: &str, payload: serde_json::Value) -> PublishReport {
        self.bus.publish(topic, payload).await
    }
}

/// The config subtree reserved for a plugin's own options.
pub(crate) fn config_scope(id: &PluginId) -> ConfigKey {
    ConfigKey::new(format!("plugins.{}.{}", id.group(), id.name()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scoped_keys_live_under_the_plugin_subtree() {
        let ctx = PluginContext::new(
            PluginId::new("core", "dms"),
            Arc::new(ConfigResolver::new()),
            Arc::new(EventBus::new(std::time::Duration::from_secs(1))),
            CancellationToken::new(),
        );
        assert_eq!(ctx.scoped_key("relay_channel").as_str(), "plugins.core.dms.relay_channel");
        assert_eq!(ctx.scoped_key("retry.enabled").as_str(), "plugins.core.dms.retry.enabled");
    }

    #[test]
    fn constructor_table_lookup() {
        struct Noop;
        #[async_trait]
        impl Plugin for Noop {}

        let mut table = ConstructorTable::new();
        table.register("core", "dms", || Box::new(Noop) as Box<dyn Plugin>);
        assert!(table.get("core", "dms").is_some());
        assert!(table.get("core", "events").is_none());
        assert!(table.get("fun", "dms").is_none());
    }
}
