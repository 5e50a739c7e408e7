//! Layered configuration: keys, values, sources, and the resolver.
//!
//! Values are merged from four ranked origins — registered defaults, the
//! startup manifest file, environment variables, and the persistent KV
//! store — under a fixed precedence order. Each declared option carries a
//! capability set restricting which origins may legally supply it.

mod key;
mod resolver;
mod source;
mod value;

pub use key::ConfigKey;
pub use resolver::{ConfigOption, ConfigResolver, WatchCallback};
pub use source::{
    DefaultTable, EnvSource, KvSource, ManifestSource, Source, SourceAdapter, SourceSet,
};
pub use value::{
    ConfigValue, ExpectedType, FromConfigValue, LIST_DELIMITER, ResolvedValue, coerce,
};
