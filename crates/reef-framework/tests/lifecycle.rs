//! End-to-end lifecycle tests: discovery from real package directories,
//! load planning, hook execution, and teardown.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reef_core::{BoxError, ConfigResolver, EventBus};
use reef_framework::{
    ConstructorTable, LifecycleManager, LifecycleOptions, PackageRoot, Plugin, PluginContext,
    PluginId, PluginRegistry, PluginState,
};
use tempfile::TempDir;

type Log = Arc<Mutex<Vec<String>>>;

struct Recording {
    tag: String,
    log: Log,
    fail_load: bool,
    hang_load: bool,
}

#[async_trait]
impl Plugin for Recording {
    async fn load(&mut self, _ctx: &PluginContext) -> Result<(), BoxError> {
        if self.hang_load {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }
        if self.fail_load {
            return Err("refused to start".into());
        }
        self.log.lock().push(format!("load:{}", self.tag));
        Ok(())
    }

    async fn unload(&mut self, _ctx: &PluginContext) -> Result<(), BoxError> {
        self.log.lock().push(format!("unload:{}", self.tag));
        Ok(())
    }
}

fn write_package(root: &Path, name: &str, deps: &[&str], config: &str) {
    let dir = root.join(name);
    std::fs::create_dir_all(&dir).unwrap();
    let deps_list = deps
        .iter()
        .map(|d| format!("{d:?}"))
        .collect::<Vec<_>>()
        .join(", ");
    let manifest = format!(
        "[plugin]\nname = {name:?}\nversion = \"0.1.0\"\n\n[dependencies]\nplugins = [{deps_list}]\n{config}"
    );
    std::fs::write(dir.join("plugin.toml"), manifest).unwrap();
}

fn register_recording(table: &mut ConstructorTable, entry: &str, log: &Log) {
    register_variant(table, entry, log, false, false);
}

fn register_variant(table: &mut ConstructorTable, entry: &str, log: &Log, fail: bool, hang: bool) {
    let log = Arc::clone(log);
    let tag = entry.to_string();
    table.register("core", entry, move || {
        Box::new(Recording {
            tag: tag.clone(),
            log: Arc::clone(&log),
            fail_load: fail,
            hang_load: hang,
        }) as Box<dyn Plugin>
    });
}

struct Harness {
    _dir: TempDir,
    manager: LifecycleManager,
    plan: reef_framework::LoadPlan,
}

fn id(s: &str) -> PluginId {
    s.parse().unwrap()
}

/// Discovers the given packages and builds a manager with default options.
fn build(
    packages: &[(&str, &[&str])],
    table: ConstructorTable,
    options: LifecycleOptions,
) -> Harness {
    let dir = TempDir::new().unwrap();
    for (name, deps) in packages {
        write_package(dir.path(), name, deps, "");
    }
    let roots = vec![PackageRoot::new("core", dir.path())];
    let resolver = Arc::new(ConfigResolver::new());
    let bus = Arc::new(EventBus::new(Duration::from_secs(1)));

    let mut registry = PluginRegistry::new(table);
    let discovery = registry.discover(&roots, &resolver);
    assert!(discovery.errors.is_empty(), "{:?}", discovery.errors);

    let plan = registry.load_plan(&["core:*".to_string()]);
    let manager = LifecycleManager::new(registry, resolver, bus, options);
    Harness {
        _dir: dir,
        manager,
        plan,
    }
}

#[tokio::test]
async fn startup_and_shutdown_round_trip() {
    let log: Log = Arc::default();
    let mut table = ConstructorTable::new();
    for entry in ["events", "storage", "bot"] {
        register_recording(&mut table, entry, &log);
    }

    let mut h = build(
        &[
            ("bot", &["core:storage", "core:events"]),
            ("events", &[]),
            ("storage", &["core:events"]),
        ],
        table,
        LifecycleOptions::default(),
    );

    h.manager.load_all(&h.plan).await.unwrap();
    for name in ["core:events", "core:storage", "core:bot"] {
        assert_eq!(h.manager.state(&id(name)), Some(PluginState::Running));
    }
    assert_eq!(
        *log.lock(),
        vec!["load:events", "load:storage", "load:bot"]
    );

    h.manager.unload_all().await;
    for name in ["core:events", "core:storage", "core:bot"] {
        assert_eq!(h.manager.state(&id(name)), Some(PluginState::Unloaded));
    }
    assert_eq!(
        log.lock()[3..],
        ["unload:bot", "unload:storage", "unload:events"]
    );
}

#[tokio::test]
async fn failed_plugin_skips_dependents_but_not_the_rest() {
    let log: Log = Arc::default();
    let mut table = ConstructorTable::new();
    register_variant(&mut table, "alpha", &log, true, false);
    register_recording(&mut table, "beta", &log);
    register_recording(&mut table, "gamma", &log);

    let mut h = build(
        &[
            ("alpha", &[]),
            ("beta", &["core:alpha"]),
            ("gamma", &[]),
        ],
        table,
        LifecycleOptions::default(),
    );

    h.manager.load_all(&h.plan).await.unwrap();
    assert_eq!(h.manager.state(&id("core:alpha")), Some(PluginState::Failed));
    assert_eq!(h.manager.state(&id("core:beta")), Some(PluginState::Skipped));
    assert_eq!(h.manager.state(&id("core:gamma")), Some(PluginState::Running));
    // Beta's hooks never ran.
    assert_eq!(*log.lock(), vec!["load:gamma"]);

    let report = h.manager.report();
    assert!(report.has_failures());

    h.manager.unload_all().await;
    assert_eq!(log.lock()[1..], ["unload:gamma"]);
    // A plugin that never loaded is never unloaded.
    assert_eq!(h.manager.state(&id("core:alpha")), Some(PluginState::Failed));
}

#[tokio::test]
async fn abort_on_failure_skips_the_remainder() {
    let log: Log = Arc::default();
    let mut table = ConstructorTable::new();
    register_variant(&mut table, "alpha", &log, true, false);
    register_recording(&mut table, "gamma", &log);

    let mut h = build(
        &[("alpha", &[]), ("gamma", &[])],
        table,
        LifecycleOptions {
            abort_on_failure: true,
            ..LifecycleOptions::default()
        },
    );

    let err = h.manager.load_all(&h.plan).await.unwrap_err();
    assert!(err.to_string().contains("failed to load"));
    assert_eq!(h.manager.state(&id("core:alpha")), Some(PluginState::Failed));
    assert_eq!(h.manager.state(&id("core:gamma")), Some(PluginState::Skipped));
    assert!(log.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn hanging_load_hook_times_out() {
    let log: Log = Arc::default();
    let mut table = ConstructorTable::new();
    register_variant(&mut table, "slow", &log, false, true);

    let mut h = build(
        &[("slow", &[])],
        table,
        LifecycleOptions {
            hook_timeout: Duration::from_millis(100),
            ..LifecycleOptions::default()
        },
    );

    h.manager.load_all(&h.plan).await.unwrap();
    assert_eq!(h.manager.state(&id("core:slow")), Some(PluginState::Failed));

    let report = h.manager.report();
    let entry = report
        .plugins
        .iter()
        .find(|p| p.id == id("core:slow"))
        .unwrap();
    assert!(entry.error.as_ref().unwrap().contains("exceeded"));
}

#[tokio::test]
async fn subscriptions_are_revoked_at_unload() {
    struct Subscriber {
        hits: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Plugin for Subscriber {
        async fn load(&mut self, ctx: &PluginContext) -> Result<(), BoxError> {
            let hits = Arc::clone(&self.hits);
            ctx.subscribe(
                "tick",
                Arc::new(move |_| {
                    let hits = Arc::clone(&hits);
                    Box::pin(async move {
                        hits.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    })
                }),
            );
            Ok(())
        }
    }

    let hits = Arc::new(AtomicUsize::new(0));
    let hits_clone = Arc::clone(&hits);
    let mut table = ConstructorTable::new();
    table.register("core", "listener", move || {
        Box::new(Subscriber {
            hits: Arc::clone(&hits_clone),
        }) as Box<dyn Plugin>
    });

    let dir = TempDir::new().unwrap();
    write_package(dir.path(), "listener", &[], "");
    let resolver = Arc::new(ConfigResolver::new());
    let bus = Arc::new(EventBus::new(Duration::from_secs(1)));
    let mut registry = PluginRegistry::new(table);
    registry.discover(&[PackageRoot::new("core", dir.path())], &resolver);
    let plan = registry.load_plan(&["core:listener".to_string()]);
    let mut manager =
        LifecycleManager::new(registry, resolver, Arc::clone(&bus), LifecycleOptions::default());

    manager.load_all(&plan).await.unwrap();
    bus.publish("tick", serde_json::json!({})).await;
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    manager.unload_all().await;
    bus.publish("tick", serde_json::json!({})).await;
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn reload_restarts_the_dependent_subtree() {
    let log: Log = Arc::default();
    let mut table = ConstructorTable::new();
    for entry in ["base", "mid", "top", "other"] {
        register_recording(&mut table, entry, &log);
    }

    let mut h = build(
        &[
            ("base", &[]),
            ("mid", &["core:base"]),
            ("top", &["core:mid"]),
            ("other", &[]),
        ],
        table,
        LifecycleOptions::default(),
    );

    h.manager.load_all(&h.plan).await.unwrap();
    log.lock().clear();

    h.manager.reload(&id("core:base")).await.unwrap();
    assert_eq!(
        *log.lock(),
        vec![
            "unload:top",
            "unload:mid",
            "unload:base",
            "load:base",
            "load:mid",
            "load:top",
        ]
    );
    for name in ["core:base", "core:mid", "core:top", "core:other"] {
        assert_eq!(h.manager.state(&id(name)), Some(PluginState::Running));
    }
}

#[tokio::test]
async fn manifest_config_defaults_reach_the_plugin() {
    struct ConfigReader {
        seen: Log,
    }

    #[async_trait]
    impl Plugin for ConfigReader {
        async fn load(&mut self, ctx: &PluginContext) -> Result<(), BoxError> {
            let greeting: String = ctx.config("greeting").await?;
            let retries: i64 = ctx.config("retry.max").await?;
            self.seen.lock().push(format!("{greeting}/{retries}"));
            Ok(())
        }
    }

    let seen: Log = Arc::default();
    let seen_clone = Arc::clone(&seen);
    let mut table = ConstructorTable::new();
    table.register("core", "greeter", move || {
        Box::new(ConfigReader {
            seen: Arc::clone(&seen_clone),
        }) as Box<dyn Plugin>
    });

    let dir = TempDir::new().unwrap();
    write_package(
        dir.path(),
        "greeter",
        &[],
        "\n[config]\ngreeting = \"hello\"\n\n[config.retry]\nmax = 3\n",
    );
    let resolver = Arc::new(ConfigResolver::new());
    let bus = Arc::new(EventBus::new(Duration::from_secs(1)));
    let mut registry = PluginRegistry::new(table);
    let discovery = registry.discover(&[PackageRoot::new("core", dir.path())], &resolver);
    assert!(discovery.errors.is_empty());

    let plan = registry.load_plan(&["core:*".to_string()]);
    let mut manager = LifecycleManager::new(registry, resolver, bus, LifecycleOptions::default());
    manager.load_all(&plan).await.unwrap();
    assert_eq!(*seen.lock(), vec!["hello/3"]);
}

#[tokio::test]
async fn discovery_collects_errors_without_stopping() {
    let log: Log = Arc::default();
    let mut table = ConstructorTable::new();
    register_recording(&mut table, "good", &log);

    let dir = TempDir::new().unwrap();
    write_package(dir.path(), "good", &[], "");
    let broken = dir.path().join("broken");
    std::fs::create_dir_all(&broken).unwrap();
    std::fs::write(broken.join("plugin.toml"), "not valid toml [").unwrap();

    let resolver = Arc::new(ConfigResolver::new());
    let mut registry = PluginRegistry::new(table);
    let discovery = registry.discover(&[PackageRoot::new("core", dir.path())], &resolver);

    assert_eq!(discovery.discovered, vec![id("core:good")]);
    assert_eq!(discovery.errors.len(), 1);
}
