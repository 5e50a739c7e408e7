//! # Reef Runtime
//!
//! Orchestration layer for the Reef bot framework: loads settings, sets up
//! logging, assembles the config resolver and event bus, discovers plugins,
//! and drives startup/shutdown.
//!
//! ```rust,ignore
//! use reef_runtime::ReefRuntime;
//!
//! let mut runtime = ReefRuntime::builder()
//!     .constructors(constructors)
//!     .build()?;
//! runtime.run().await?;
//! ```

pub mod error;
pub mod logging;
pub mod runtime;
pub mod settings;

pub use error::{RuntimeError, RuntimeResult};
pub use runtime::{ReefRuntime, RuntimeBuilder};
pub use settings::{
    BotSettings, DEFAULT_CONFIG_FILE, LogSettings, PackageEntry, PluginSettings, ProjectSettings,
    RuntimeSettings, options,
};
