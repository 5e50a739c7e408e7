//! Main runtime orchestration.
//!
//! The runtime wires the config resolver, event bus, plugin registry, and
//! lifecycle manager together from the startup settings, then drives the
//! whole framework through start, signal-based wait, and shutdown.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use reef_runtime::ReefRuntime;
//!
//! let mut constructors = ConstructorTable::new();
//! constructors.register("core", "dms", || Box::new(DmRelay::new()) as Box<dyn Plugin>);
//!
//! let mut runtime = ReefRuntime::builder()
//!     .config_file("framework.toml")
//!     .constructors(constructors)
//!     .build()?;
//! runtime.run().await?;
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use reef_core::{ConfigResolver, EventBus, KvStore, ManifestSource, topics};
use reef_framework::{
    ConstructorTable, LifecycleManager, LifecycleOptions, PackageRoot, PluginId, PluginRegistry,
    PluginState, StartupReport,
};
use tokio::signal;
use tracing::{error, info, warn};

use crate::error::RuntimeResult;
use crate::logging;
use crate::settings::{RuntimeSettings, options};

/// The assembled framework: settings, shared services, and the lifecycle
/// manager, ready to start.
pub struct ReefRuntime {
    settings: RuntimeSettings,
    resolver: Arc<ConfigResolver>,
    bus: Arc<EventBus>,
    manager: LifecycleManager,
    /// Problems recorded before any plugin loaded (discovery, selection).
    startup_errors: Vec<String>,
}

impl ReefRuntime {
    /// Creates a runtime builder.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    pub fn settings(&self) -> &RuntimeSettings {
        &self.settings
    }

    pub fn resolver(&self) -> &Arc<ConfigResolver> {
        &self.resolver
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn plugin_state(&self, id: &PluginId) -> Option<PluginState> {
        self.manager.state(id)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Starts the framework: verifies required configuration, loads the
    /// enabled plugins, and publishes the startup outcome on the bus.
    ///
    /// Returns the startup report even when some plugins failed; only a
    /// missing required option or an aborted startup is an error.
    pub async fn start(&mut self) -> RuntimeResult<StartupReport> {
        info!(
            project = %self.settings.project.name,
            "Starting {}",
            self.settings.project.friendly_name
        );

        // Required and environment-only: fail before any plugin loads.
        let _token: String = self.resolver.get(&options::bot_token()).await?;

        let plan = self
            .manager
            .registry()
            .load_plan(&self.settings.plugins.enabled);
        let mut startup_errors = std::mem::take(&mut self.startup_errors);
        startup_errors.extend(plan.errors.iter().map(ToString::to_string));

        let load_result = self.manager.load_all(&plan).await;

        let mut report = self.manager.report();
        report.config_errors = startup_errors;

        if report.has_failures() {
            warn!("Startup completed with failures\n{report}");
            self.bus
                .publish(topics::STARTUP_FAILED, report.to_json())
                .await;
        } else {
            info!(
                running = self.manager.running().len(),
                "Startup complete"
            );
            self.bus.publish(topics::STARTED, report.to_json()).await;
        }

        // Only an aborted startup surfaces as an error; individual plugin
        // failures are visible in the report.
        if self.settings.plugins.abort_on_failure
            && let Err(e) = load_result
        {
            error!(error = %e, "Startup aborted");
            return Err(e.into());
        }

        Ok(report)
    }

    /// Unloads every running plugin in reverse load order and announces the
    /// shutdown on the bus.
    pub async fn stop(&mut self) {
        info!("Stopping {}", self.settings.project.friendly_name);
        self.manager.unload_all().await;
        self.bus
            .publish(topics::STOPPED, serde_json::json!({}))
            .await;
        info!("Stopped");
    }

    /// Runs the framework until Ctrl+C (or SIGTERM on unix), then shuts
    /// down cleanly.
    pub async fn run(&mut self) -> RuntimeResult<StartupReport> {
        let report = self.start().await?;
        info!("Reef is running. Press Ctrl+C to stop.");
        wait_for_shutdown().await;
        self.stop().await;
        Ok(report)
    }

    /// Reloads one plugin together with its running dependents.
    pub async fn reload(&mut self, id: &PluginId) -> RuntimeResult<()> {
        self.manager.reload(id).await?;
        Ok(())
    }
}

/// Waits for shutdown signals (Ctrl+C or SIGTERM).
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(sig) => sig,
            Err(e) => {
                error!(error = %e, "Failed to register SIGTERM handler");
                let _ = signal::ctrl_c().await;
                return;
            }
        };

        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = signal::ctrl_c().await;
        info!("Received Ctrl+C, shutting down");
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder assembling a [`ReefRuntime`] from settings, registered plugin
/// constructors, and an optional KV driver.
#[derive(Default)]
pub struct RuntimeBuilder {
    config_file: Option<PathBuf>,
    constructors: ConstructorTable,
    kv: Option<Arc<dyn KvStore>>,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the startup configuration file. Without this, `framework.toml`
    /// in the working directory is used when present.
    pub fn config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// Provides the plugin constructor table.
    pub fn constructors(mut self, constructors: ConstructorTable) -> Self {
        self.constructors = constructors;
        self
    }

    /// Attaches a persistent KV store driver, enabling the highest-ranked
    /// config source and live option watching.
    pub fn kv(mut self, store: Arc<dyn KvStore>) -> Self {
        self.kv = Some(store);
        self
    }

    /// Loads settings, initializes logging, and discovers plugins.
    pub fn build(self) -> RuntimeResult<ReefRuntime> {
        let (settings, tree) = RuntimeSettings::load(self.config_file.as_deref())?;
        logging::init(&settings.log);

        let mut resolver = ConfigResolver::new().with_manifest(ManifestSource::new(tree));
        if let Some(store) = self.kv {
            resolver = resolver.with_kv(store);
        }
        let resolver = Arc::new(resolver);
        let bus = Arc::new(EventBus::new(Duration::from_secs(
            settings.bot.handler_timeout_secs,
        )));

        let roots: Vec<PackageRoot> = settings
            .plugins
            .packages
            .iter()
            .map(|entry| PackageRoot::new(entry.group.clone(), entry.path.clone()))
            .collect();

        let mut registry = PluginRegistry::new(self.constructors);
        let discovery = registry.discover(&roots, &resolver);
        let startup_errors: Vec<String> =
            discovery.errors.iter().map(ToString::to_string).collect();

        let manager = LifecycleManager::new(
            registry,
            Arc::clone(&resolver),
            Arc::clone(&bus),
            LifecycleOptions {
                hook_timeout: Duration::from_secs(settings.bot.hook_timeout_secs),
                abort_on_failure: settings.plugins.abort_on_failure,
            },
        );

        Ok(ReefRuntime {
            settings,
            resolver,
            bus,
            manager,
            startup_errors,
        })
    }
}
