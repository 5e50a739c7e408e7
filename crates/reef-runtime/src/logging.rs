//! Logging setup for the Reef runtime.
//!
//! Built on `tracing` and `tracing-subscriber`, driven by the `[log]`
//! section of the settings. `RUST_LOG` takes precedence over the configured
//! level so operators can raise verbosity without touching the file.

use std::ffi::OsStr;
use std::path::Path;

use tracing_subscriber::prelude::*;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, fmt};

use crate::settings::LogSettings;

/// Initialize logging from settings.
///
/// Safe to call more than once; repeated initialization is ignored.
pub fn init(settings: &LogSettings) {
    let _ = try_init(settings);
}

/// Try to initialize logging, returning an error if a global subscriber is
/// already installed.
pub fn try_init(settings: &LogSettings) -> Result<(), TryInitError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.level));

    let console_layer = settings
        .console
        .then(|| fmt::layer().compact().with_writer(std::io::stdout));

    let file_layer = settings.file.as_ref().map(|path| {
        let appender = tracing_appender::rolling::never(
            path.parent().unwrap_or_else(|| Path::new(".")),
            path.file_name().unwrap_or_else(|| OsStr::new("reef.log")),
        );
        fmt::layer().with_ansi(false).with_writer(appender)
    });

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .with(filter)
        .try_init()
}
