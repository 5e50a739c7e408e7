//! Plugin lifecycle state machine.
//!
//! The manager drives every plugin through
//! `Discovered → Loading → Running → Unloading → Unloaded`, with `Failed`
//! and `Skipped` as terminal startup states. Load hooks run sequentially in
//! plan order under a deadline; a failure marks the plugin `Failed`, skips
//! its dependents, and (unless configured to abort) leaves the rest of the
//! startup untouched. Unload walks the exact reverse of the recorded load
//! order, so a plugin's dependencies are still running while it tears down.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use reef_core::{ConfigResolver, EventBus};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::{PluginError, PluginResult};
use crate::manifest::PluginId;
use crate::plugin::{Plugin, PluginContext};
use crate::registry::{LoadPlan, PluginRegistry};
use crate::report::{PluginReportEntry, StartupReport};

// =============================================================================
// State
// =============================================================================

/// Lifecycle state of one plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginState {
    /// Manifest parsed; not yet part of any load plan.
    Discovered,
    /// `load` hook currently running.
    Loading,
    /// Loaded successfully; handlers live.
    Running,
    /// `unload` hook currently running.
    Unloading,
    /// Cleanly unloaded.
    Unloaded,
    /// `load` hook errored or timed out.
    Failed,
    /// Never attempted: a dependency was unavailable or startup aborted.
    Skipped,
}

impl std::fmt::Display for PluginState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Discovered => "discovered",
            Self::Loading => "loading",
            Self::Running => "running",
            Self::Unloading => "unloading",
            Self::Unloaded => "unloaded",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

struct PluginRecord {
    state: PluginState,
    error: Option<PluginError>,
    instance: Option<Box<dyn Plugin>>,
}

impl PluginRecord {
    fn new() -> Self {
        Self {
            state: PluginState::Discovered,
            error: None,
            instance: None,
        }
    }
}

/// Tunables for the lifecycle manager.
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Deadline for each `load`/`unload` hook.
    pub hook_timeout: Duration,
    /// When `true`, the first load failure aborts startup instead of
    /// skipping only the failed plugin's dependents.
    pub abort_on_failure: bool,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            hook_timeout: Duration::from_secs(30),
            abort_on_failure: false,
        }
    }
}

// =============================================================================
// LifecycleManager
// =============================================================================

/// Owns every plugin instance and its lifecycle state.
pub struct LifecycleManager {
    registry: PluginRegistry,
    resolver: Arc<ConfigResolver>,
    bus: Arc<EventBus>,
    options: LifecycleOptions,
    records: BTreeMap<PluginId, PluginRecord>,
    load_order: Vec<PluginId>,
}

impl LifecycleManager {
    /// Creates a manager over a populated registry. Every discovered plugin
    /// starts in [`PluginState::Discovered`].
    pub fn new(
        registry: PluginRegistry,
        resolver: Arc<ConfigResolver>,
        bus: Arc<EventBus>,
        options: LifecycleOptions,
    ) -> Self {
        let records = registry
            .manifests()
            .map(|m| (m.id.clone(), PluginRecord::new()))
            .collect();
        Self {
            registry,
            resolver,
            bus,
            options,
            records,
            load_order: Vec::new(),
        }
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    pub fn state(&self, id: &PluginId) -> Option<PluginState> {
        self.records.get(id).map(|r| r.state)
    }

    /// Ids of currently running plugins, in load order.
    pub fn running(&self) -> &[PluginId] {
        &self.load_order
    }

    // =========================================================================
    // Loading
    // =========================================================================

    /// Executes a load plan.
    ///
    /// Blocked plugins are marked `Skipped` up front. Plan entries load
    /// sequentially; when one fails, its dependents later in the plan are
    /// skipped, and with `abort_on_failure` the whole remainder is skipped
    /// and the triggering error returned.
    pub async fn load_all(&mut self, plan: &LoadPlan) -> PluginResult<()> {
        for (id, err) in &plan.blocked {
            warn!(plugin = %id, error = %err, "Plugin blocked, skipping");
            self.mark(id, PluginState::Skipped, Some(err.clone()));
        }

        for (idx, id) in plan.order.iter().enumerate() {
            if let Some(dep) = self.unavailable_dependency(id) {
                let err = PluginError::MissingDependency {
                    id: id.clone(),
                    dependency: dep.clone(),
                    reason: "failed to load".to_string(),
                };
                warn!(plugin = %id, error = %err, "Dependency unavailable, skipping");
                self.mark(id, PluginState::Skipped, Some(err.clone()));
                if self.options.abort_on_failure {
                    self.abort_remaining(&plan.order[idx + 1..]);
                    return Err(err);
                }
                continue;
            }

            if let Err(err) = self.load_one(id).await
                && self.options.abort_on_failure
            {
                self.abort_remaining(&plan.order[idx + 1..]);
                return Err(err);
            }
        }

        Ok(())
    }

    /// First declared dependency of `id` that is not currently running.
    fn unavailable_dependency(&self, id: &PluginId) -> Option<&PluginId> {
        self.registry
            .manifest(id)?
            .dependencies
            .iter()
            .find(|dep| self.state(dep) != Some(PluginState::Running))
    }

    fn abort_remaining(&mut self, rest: &[PluginId]) {
        for id in rest {
            let err = PluginError::StartupAborted { id: id.clone() };
            self.mark(id, PluginState::Skipped, Some(err));
        }
    }

    async fn load_one(&mut self, id: &PluginId) -> PluginResult<()> {
        let Some(manifest) = self.registry.manifest(id) else {
            let err = PluginError::UnknownPlugin { id: id.clone() };
            self.mark(id, PluginState::Failed, Some(err.clone()));
            return Err(err);
        };

        let Some(constructor) = self.registry.constructor_for(manifest) else {
            let err = PluginError::UnknownEntry {
                id: id.clone(),
                entry: manifest.entry.clone(),
            };
            error!(plugin = %id, error = %err, "Plugin failed to load");
            self.mark(id, PluginState::Failed, Some(err.clone()));
            return Err(err);
        };

        info!(plugin = %id, "Loading plugin");
        self.mark(id, PluginState::Loading, None);

        let mut instance = constructor();
        let token = CancellationToken::new();
        let ctx = PluginContext::new(
            id.clone(),
            Arc::clone(&self.resolver),
            Arc::clone(&self.bus),
            token.clone(),
        );

        let outcome = tokio::time::timeout(self.options.hook_timeout, instance.load(&ctx)).await;
        match outcome {
            Ok(Ok(())) => {
                if let Some(record) = self.records.get_mut(id) {
                    record.instance = Some(instance);
                }
                self.mark(id, PluginState::Running, None);
                self.load_order.push(id.clone());
                info!(plugin = %id, "Plugin running");
                Ok(())
            }
            Ok(Err(e)) => {
                let err = PluginError::LoadFailure {
                    id: id.clone(),
                    message: e.to_string(),
                };
                error!(plugin = %id, error = %err, "Plugin failed to load");
                // Drop whatever the half-loaded plugin subscribed.
                self.bus.revoke_owner(&id.to_string());
                self.mark(id, PluginState::Failed, Some(err.clone()));
                Err(err)
            }
            Err(_) => {
                token.cancel();
                let err = PluginError::HookTimeout {
                    id: id.clone(),
                    hook: "load",
                    timeout: self.options.hook_timeout,
                };
                error!(plugin = %id, error = %err, "Plugin failed to load");
                self.bus.revoke_owner(&id.to_string());
                self.mark(id, PluginState::Failed, Some(err.clone()));
                Err(err)
            }
        }
    }

    // =========================================================================
    // Unloading
    // =========================================================================

    /// Unloads every running plugin in the exact reverse of load order.
    ///
    /// Unload errors and timeouts are recorded and logged but never stop the
    /// sequence; every plugin ends `Unloaded`.
    pub async fn unload_all(&mut self) {
        let order: Vec<PluginId> = self.load_order.iter().rev().cloned().collect();
        for id in &order {
            self.unload_one(id).await;
        }
        self.load_order.clear();
    }

    async fn unload_one(&mut self, id: &PluginId) {
        let Some(record) = self.records.get_mut(id) else {
            return;
        };
        if record.state != PluginState::Running {
            return;
        }
        record.state = PluginState::Unloading;
        let instance = record.instance.take();

        info!(plugin = %id, "Unloading plugin");
        // Revoke first so no event lands in a half-torn-down plugin.
        self.bus.revoke_owner(&id.to_string());

        if let Some(mut instance) = instance {
            let token = CancellationToken::new();
            let ctx = PluginContext::new(
                id.clone(),
                Arc::clone(&self.resolver),
                Arc::clone(&self.bus),
                token.clone(),
            );
            match tokio::time::timeout(self.options.hook_timeout, instance.unload(&ctx)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    let err = PluginError::UnloadFailure {
                        id: id.clone(),
                        message: e.to_string(),
                    };
                    warn!(plugin = %id, error = %err, "Plugin unload hook failed");
                    if let Some(record) = self.records.get_mut(id) {
                        record.error = Some(err);
                    }
                }
                Err(_) => {
                    token.cancel();
                    let err = PluginError::HookTimeout {
                        id: id.clone(),
                        hook: "unload",
                        timeout: self.options.hook_timeout,
                    };
                    warn!(plugin = %id, error = %err, "Plugin unload hook timed out");
                    if let Some(record) = self.records.get_mut(id) {
                        record.error = Some(err);
                    }
                }
            }
        }

        if let Some(record) = self.records.get_mut(id) {
            record.state = PluginState::Unloaded;
        }
        info!(plugin = %id, "Plugin unloaded");
    }

    // =========================================================================
    // Reload
    // =========================================================================

    /// Reloads `id` together with every running plugin that transitively
    /// depends on it.
    ///
    /// The subtree is unloaded in reverse load order, then loaded again in
    /// its original relative order. A dependent that fails to come back is
    /// marked `Failed` (its own dependents `Skipped`) without undoing the
    /// rest; the returned result reflects the target plugin only.
    pub async fn reload(&mut self, id: &PluginId) -> PluginResult<()> {
        if !self.records.contains_key(id) {
            return Err(PluginError::UnknownPlugin { id: id.clone() });
        }

        let affected = self.registry.dependents_of(id, &self.load_order);
        info!(plugin = %id, affected = affected.len(), "Reloading plugin subtree");

        for member in affected.iter().rev() {
            self.unload_one(member).await;
        }
        self.load_order.retain(|p| !affected.contains(p));

        let mut target_result = Ok(());
        let to_load: Vec<PluginId> = if affected.is_empty() {
            // Not currently running (failed earlier, or never enabled):
            // attempt a fresh solo load.
            vec![id.clone()]
        } else {
            affected
        };

        for member in &to_load {
            let result = if let Some(dep) = self.unavailable_dependency(member) {
                let err = PluginError::MissingDependency {
                    id: member.clone(),
                    dependency: dep.clone(),
                    reason: "failed to load".to_string(),
                };
                warn!(plugin = %member, error = %err, "Dependency unavailable, skipping");
                self.mark(member, PluginState::Skipped, Some(err.clone()));
                Err(err)
            } else {
                self.load_one(member).await
            };
            if member == id {
                target_result = result;
            }
        }

        target_result
    }

    // =========================================================================
    // Reporting
    // =========================================================================

    /// Snapshot of every plugin's state for the startup report.
    pub fn report(&self) -> StartupReport {
        let plugins = self
            .records
            .iter()
            .map(|(id, record)| PluginReportEntry {
                id: id.clone(),
                state: record.state,
                error: record.error.as_ref().map(ToString::to_string),
            })
            .collect();
        StartupReport {
            plugins,
            config_errors: Vec::new(),
        }
    }

    fn mark(&mut self, id: &PluginId, state: PluginState, error: Option<PluginError>) {
        if let Some(record) = self.records.get_mut(id) {
            record.state = state;
            record.error = error;
        }
    }
}
