//! # Reef Framework
//!
//! Plugin discovery, dependency ordering, and lifecycle management on top
//! of `reef-core`.
//!
//! A host registers plugin constructors in a [`ConstructorTable`], points
//! the [`PluginRegistry`] at its package roots, and hands the populated
//! registry to a [`LifecycleManager`]:
//!
//! ```rust,ignore
//! let mut registry = PluginRegistry::new(constructors);
//! let discovery = registry.discover(&roots, &resolver);
//! let plan = registry.load_plan(&enabled);
//!
//! let mut manager = LifecycleManager::new(registry, resolver, bus, options);
//! manager.load_all(&plan).await?;
//! ```
//!
//! Plugins see the framework only through [`PluginContext`]: scoped
//! configuration reads, owner-branded bus subscriptions, and the
//! cancellation token bounding their hooks.

pub mod error;
pub mod manager;
pub mod manifest;
pub mod plugin;
pub mod registry;
pub mod report;

pub use error::{PluginError, PluginResult};
pub use manager::{LifecycleManager, LifecycleOptions, PluginState};
pub use manifest::{MANIFEST_FILE_NAME, PluginId, PluginManifest};
pub use plugin::{ConstructorTable, Plugin, PluginConstructor, PluginContext};
pub use registry::{DiscoveryReport, LoadPlan, PackageRoot, PluginRegistry};
pub use report::{PluginReportEntry, StartupReport};
