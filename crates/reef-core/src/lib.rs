//! # Reef Core
//!
//! The core engine of the Reef bot framework: the layered configuration
//! resolver, the persistent KV collaborator interface, and the inter-plugin
//! event bus.
//!
//! ## Architecture
//!
//! Reef is built leaf-first:
//!
//! - **Source adapters** ([`SourceAdapter`]): uniform read-only views over
//!   one configuration origin each — defaults, manifest file, environment,
//!   KV store.
//! - **Config resolver** ([`ConfigResolver`]): merges adapters by fixed
//!   precedence into one logical tree and resolves dotted keys to typed
//!   values with provenance.
//! - **Event bus** ([`EventBus`]): in-process publish/subscribe channel
//!   decoupling plugins from each other's concrete types.
//!
//! The plugin registry and lifecycle manager that consume these live in
//! `reef-framework`; orchestration lives in `reef-runtime`.

pub mod bus;
pub mod config;
pub mod error;
pub mod kv;

pub use bus::{EventBus, EventHandler, PublishReport, SubscriptionId, topics};
pub use config::{
    ConfigKey, ConfigOption, ConfigResolver, ConfigValue, ExpectedType, FromConfigValue,
    ManifestSource, ResolvedValue, Source, SourceAdapter, SourceSet, WatchCallback,
};
pub use error::{BoxError, ConfigError, ConfigResult};
pub use kv::{KvStore, KvWatchCallback, MemoryKv};
