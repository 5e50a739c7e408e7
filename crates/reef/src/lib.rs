//! # Reef
//!
//! A plugin-centric bot framework core: layered configuration, manifest
//! driven plugin discovery, deterministic lifecycle management, and an
//! in-process event bus.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     ┌───────────────────┐     ┌────────────────────────────┐
//! │   Runtime    │────▶│ LifecycleManager  │────▶│ Plugin core:events         │
//! │ (settings,   │     │ (toposorted load, │────▶│ Plugin core:storage        │
//! │  signals)    │     │  reverse unload)  │────▶│ Plugin ...                 │
//! └──────┬───────┘     └───────────────────┘     └──────────┬─────────────────┘
//!        │                                                  │
//!        ▼                                                  ▼
//!  ConfigResolver  ◀── defaults / file / env / kv ──▶   EventBus
//! ```
//!
//! - **Runtime**: loads settings, wires services, handles signals
//! - **LifecycleManager**: drives plugins through their state machine
//! - **ConfigResolver**: merges ranked config sources per declared option
//! - **EventBus**: ordered, isolated, owner-scoped publish/subscribe
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use reef::prelude::*;
//!
//! struct Greeter;
//!
//! #[async_trait]
//! impl Plugin for Greeter {
//!     async fn load(&mut self, ctx: &PluginContext) -> Result<(), BoxError> {
//!         let prefix: String = ctx.config("prefix").await?;
//!         ctx.subscribe("member.joined", Arc::new(move |payload| {
//!             Box::pin(async move { Ok(()) })
//!         }));
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> reef::runtime::RuntimeResult<()> {
//!     let mut constructors = ConstructorTable::new();
//!     constructors.register("core", "greeter", || Box::new(Greeter) as Box<dyn Plugin>);
//!
//!     let mut runtime = ReefRuntime::builder()
//!         .constructors(constructors)
//!         .build()?;
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```

pub use reef_core as core;
pub use reef_framework as framework;
pub use reef_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use reef::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use reef_runtime::{ReefRuntime, RuntimeBuilder, RuntimeSettings};

    // Plugin system - the unit of functionality
    pub use reef_framework::{
        ConstructorTable, LifecycleManager, Plugin, PluginContext, PluginId, PluginState,
        StartupReport,
    };

    // Configuration - declared options and typed reads
    pub use reef_core::{
        ConfigKey, ConfigOption, ConfigResolver, ConfigValue, ExpectedType, ResolvedValue, Source,
        SourceSet,
    };

    // Event bus
    pub use reef_core::{EventBus, EventHandler, PublishReport, SubscriptionId, topics};

    // Persistent store collaborator
    pub use reef_core::{KvStore, MemoryKv};

    // Error plumbing
    pub use reef_core::{BoxError, ConfigError};
    pub use reef_framework::PluginError;
    pub use reef_runtime::RuntimeError;
}
