//! Full runtime assembly: settings file, discovery, startup events, and
//! shutdown.
//!
//! All scenarios share one test body because they manipulate the
//! process-wide `BOT_TOKEN` environment variable.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use reef_core::{BoxError, topics};
use reef_framework::{ConstructorTable, Plugin, PluginContext, PluginState};
use reef_runtime::{ReefRuntime, RuntimeError};
use tempfile::TempDir;

struct Greeter;

#[async_trait]
impl Plugin for Greeter {}

struct Grumpy;

#[async_trait]
impl Plugin for Grumpy {
    async fn load(&mut self, _ctx: &PluginContext) -> Result<(), BoxError> {
        Err("out of ink".into())
    }
}

fn write_workspace(dir: &Path, package: &str) -> std::path::PathBuf {
    let packages = dir.join("plugins");
    let pkg = packages.join(package);
    std::fs::create_dir_all(&pkg).unwrap();
    std::fs::write(
        pkg.join("plugin.toml"),
        format!("[plugin]\nname = {package:?}\nversion = \"0.1.0\"\n"),
    )
    .unwrap();

    let config = dir.join("framework.toml");
    std::fs::write(
        &config,
        format!(
            r#"
                [log]
                console = false

                [plugins]
                enabled = ["core:*"]

                [[plugins.packages]]
                group = "core"
                path = {path:?}
            "#,
            path = packages.display().to_string(),
        ),
    )
    .unwrap();
    config
}

fn counter(bus: &reef_core::EventBus, topic: &str) -> Arc<AtomicUsize> {
    let count = Arc::new(AtomicUsize::new(0));
    let count_clone = Arc::clone(&count);
    bus.subscribe(
        topic,
        None,
        Arc::new(move |_| {
            let count = Arc::clone(&count_clone);
            Box::pin(async move {
                count.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        }),
    );
    count
}

#[tokio::test]
async fn startup_lifecycle() {
    // SAFETY: tests in this binary are the only accessors of BOT_TOKEN,
    // and every mutation happens inside this single test body.
    unsafe { std::env::remove_var("BOT_TOKEN") };

    let dir = TempDir::new().unwrap();
    let config = write_workspace(dir.path(), "greeter");

    let mut table = ConstructorTable::new();
    table.register("core", "greeter", || Box::new(Greeter) as Box<dyn Plugin>);
    let mut runtime = ReefRuntime::builder()
        .config_file(&config)
        .constructors(table)
        .build()
        .unwrap();

    // Without the token the runtime refuses to load anything.
    let err = runtime.start().await.unwrap_err();
    assert!(matches!(err, RuntimeError::Config(_)), "{err}");
    let id = "core:greeter".parse().unwrap();
    assert_eq!(runtime.plugin_state(&id), Some(PluginState::Discovered));

    // SAFETY: see above.
    unsafe { std::env::set_var("BOT_TOKEN", "sekrit") };

    let started = counter(runtime.bus(), topics::STARTED);
    let stopped = counter(runtime.bus(), topics::STOPPED);

    let report = runtime.start().await.unwrap();
    assert!(!report.has_failures(), "{report}");
    assert_eq!(runtime.plugin_state(&id), Some(PluginState::Running));
    assert_eq!(started.load(Ordering::SeqCst), 1);

    runtime.stop().await;
    assert_eq!(runtime.plugin_state(&id), Some(PluginState::Unloaded));
    assert_eq!(stopped.load(Ordering::SeqCst), 1);

    // A failing plugin lands in the report and the failure topic fires.
    let dir = TempDir::new().unwrap();
    let config = write_workspace(dir.path(), "grumpy");
    let mut table = ConstructorTable::new();
    table.register("core", "grumpy", || Box::new(Grumpy) as Box<dyn Plugin>);
    let mut runtime = ReefRuntime::builder()
        .config_file(&config)
        .constructors(table)
        .build()
        .unwrap();
    let failed = counter(runtime.bus(), topics::STARTUP_FAILED);

    let report = runtime.start().await.unwrap();
    assert!(report.has_failures());
    let grumpy = "core:grumpy".parse().unwrap();
    assert_eq!(runtime.plugin_state(&grumpy), Some(PluginState::Failed));
    assert_eq!(failed.load(Ordering::SeqCst), 1);

    // SAFETY: see above.
    unsafe { std::env::remove_var("BOT_TOKEN") };
}
