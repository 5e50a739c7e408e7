//! Plugin discovery and dependency ordering.
//!
//! The registry scans package roots for `plugin.toml` manifests, collecting
//! every discovery problem into a report instead of aborting on the first
//! one, then computes a deterministic load order over whatever subset the
//! host enables.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::PathBuf;

use reef_core::{ConfigResolver, ConfigValue};
use tracing::{debug, info, warn};

use crate::error::PluginError;
use crate::manifest::{MANIFEST_FILE_NAME, PluginId, PluginManifest};
use crate::plugin::{ConstructorTable, config_scope};

/// A directory holding plugin packages, all belonging to one group.
#[derive(Debug, Clone)]
pub struct PackageRoot {
    pub group: String,
    pub path: PathBuf,
}

impl PackageRoot {
    pub fn new(group: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            group: group.into(),
            path: path.into(),
        }
    }
}

/// Everything found (and everything wrong) during one discovery pass.
#[derive(Debug, Default)]
pub struct DiscoveryReport {
    /// Ids of successfully discovered plugins, sorted.
    pub discovered: Vec<PluginId>,
    /// Per-package problems; one bad manifest never hides the others.
    pub errors: Vec<PluginError>,
}

/// The computed load plan for one set of enabled plugins.
#[derive(Debug, Default)]
pub struct LoadPlan {
    /// Plugins to load, dependencies before dependents, ties broken by
    /// `(group, name)` lexicographic order.
    pub order: Vec<PluginId>,
    /// Plugins that cannot be loaded at all, with the reason. These will be
    /// marked `Skipped` without their hooks ever running.
    pub blocked: Vec<(PluginId, PluginError)>,
    /// Request-level problems, e.g. enabled names that were never
    /// discovered.
    pub errors: Vec<PluginError>,
}

/// Holds discovered manifests and the constructor table they bind to.
pub struct PluginRegistry {
    constructors: ConstructorTable,
    manifests: BTreeMap<PluginId, PluginManifest>,
    manifest_paths: HashMap<PluginId, String>,
}

impl PluginRegistry {
    pub fn new(constructors: ConstructorTable) -> Self {
        Self {
            constructors,
            manifests: BTreeMap::new(),
            manifest_paths: HashMap::new(),
        }
    }

    pub fn manifest(&self, id: &PluginId) -> Option<&PluginManifest> {
        self.manifests.get(id)
    }

    pub fn manifests(&self) -> impl Iterator<Item = &PluginManifest> {
        self.manifests.values()
    }

    pub fn contains(&self, id: &PluginId) -> bool {
        self.manifests.contains_key(id)
    }

    /// Looks up the constructor a manifest's entry names.
    pub fn constructor_for(&self, manifest: &PluginManifest) -> Option<crate::plugin::PluginConstructor> {
        self.constructors.get(manifest.id.group(), &manifest.entry)
    }

    // =========================================================================
    // Discovery
    // =========================================================================

    /// Scans every package root for manifests.
    ///
    /// Each immediate subdirectory containing a `plugin.toml` is one plugin
    /// package. Parse failures, duplicate ids, and default-registration
    /// collisions are collected in the report; discovery always visits every
    /// package. Manifest `[config]` defaults are registered with the
    /// resolver under the plugin's config scope, owned by the plugin id.
    pub fn discover(&mut self, roots: &[PackageRoot], resolver: &ConfigResolver) -> DiscoveryReport {
        let mut report = DiscoveryReport::default();

        for root in roots {
            let entries = match std::fs::read_dir(&root.path) {
                Ok(entries) => entries,
                Err(e) => {
                    report.errors.push(PluginError::ManifestRead {
                        path: root.path.display().to_string(),
                        message: e.to_string(),
                    });
                    continue;
                }
            };

            // Sort directory entries so discovery order (and thus error
            // order) is stable across platforms.
            let mut packages: Vec<PathBuf> = entries
                .filter_map(|e| e.ok().map(|e| e.path()))
                .filter(|p| p.is_dir())
                .collect();
            packages.sort();

            for package in packages {
                let manifest_path = package.join(MANIFEST_FILE_NAME);
                if !manifest_path.is_file() {
                    debug!(path = %package.display(), "No manifest, skipping directory");
                    continue;
                }
                match self.discover_one(&root.group, &manifest_path, resolver) {
                    Ok(id) => report.discovered.push(id),
                    Err(e) => {
                        warn!(path = %manifest_path.display(), error = %e, "Plugin discovery failed");
                        report.errors.push(e);
                    }
                }
            }
        }

        report.discovered.sort();
        info!(
            discovered = report.discovered.len(),
            errors = report.errors.len(),
            "Plugin discovery complete"
        );
        report
    }

    fn discover_one(
        &mut self,
        group: &str,
        manifest_path: &std::path::Path,
        resolver: &ConfigResolver,
    ) -> Result<PluginId, PluginError> {
        let path_str = manifest_path.display().to_string();
        let content = std::fs::read_to_string(manifest_path).map_err(|e| PluginError::ManifestRead {
            path: path_str.clone(),
            message: e.to_string(),
        })?;

        let manifest = PluginManifest::parse(group, &path_str, &content)?;
        let id = manifest.id.clone();

        if let Some(first_path) = self.manifest_paths.get(&id) {
            return Err(PluginError::DuplicateManifest {
                id,
                first_path: first_path.clone(),
                second_path: path_str,
            });
        }

        let scope = config_scope(&id);
        let defaults: Vec<(reef_core::ConfigKey, ConfigValue)> = manifest
            .config_defaults
            .iter()
            .map(|(key, value)| (scope.join(key), value.clone()))
            .collect();
        resolver.register_defaults(&id.to_string(), defaults)?;

        debug!(plugin = %id, version = %manifest.version, "Discovered plugin");
        self.manifest_paths.insert(id.clone(), path_str);
        self.manifests.insert(id.clone(), manifest);
        Ok(id)
    }

    // =========================================================================
    // Selection and ordering
    // =========================================================================

    /// Expands an enabled-plugins list into a concrete id set.
    ///
    /// Entries are either exact ids (`core:dms`) or group wildcards
    /// (`core:*`, every discovered plugin in the group). Unknown ids and
    /// malformed entries become errors; a wildcard over a group with no
    /// discovered plugins is merely logged.
    pub fn expand_enabled(&self, enabled: &[String]) -> (BTreeSet<PluginId>, Vec<PluginError>) {
        let mut selected = BTreeSet::new();
        let mut errors = Vec::new();

        for entry in enabled {
            if let Some(group) = entry.strip_suffix(":*") {
                let before = selected.len();
                for id in self.manifests.keys().filter(|id| id.group() == group) {
                    selected.insert(id.clone());
                }
                if selected.len() == before {
                    warn!(group, "Wildcard matched no discovered plugins");
                }
                continue;
            }
            match entry.parse::<PluginId>() {
                Ok(id) if self.contains(&id) => {
                    selected.insert(id);
                }
                Ok(id) => errors.push(PluginError::UnknownPlugin { id }),
                Err(e) => errors.push(e),
            }
        }

        (selected, errors)
    }

    /// Computes the load order for the enabled set.
    ///
    /// Dependencies come before dependents; among plugins whose dependencies
    /// are equally satisfied, `(group, name)` lexicographic order decides.
    /// Plugins with unsatisfiable dependencies (undiscovered, not enabled,
    /// or in a cycle) land in `blocked` together with every transitive
    /// dependent, and the rest of the plan proceeds without them.
    pub fn load_plan(&self, enabled: &[String]) -> LoadPlan {
        let (selected, errors) = self.expand_enabled(enabled);
        let mut plan = LoadPlan {
            errors,
            ..LoadPlan::default()
        };

        // Block plugins whose direct dependencies are unavailable.
        let mut blocked: BTreeMap<PluginId, PluginError> = BTreeMap::new();
        for id in &selected {
            let Some(manifest) = self.manifests.get(id) else {
                continue;
            };
            for dep in &manifest.dependencies {
                let reason = if !self.contains(dep) {
                    "was never discovered"
                } else if !selected.contains(dep) {
                    "is not enabled"
                } else {
                    continue;
                };
                blocked.insert(
                    id.clone(),
                    PluginError::MissingDependency {
                        id: id.clone(),
                        dependency: dep.clone(),
                        reason: reason.to_string(),
                    },
                );
                break;
            }
        }

        // Propagate blockage to transitive dependents.
        loop {
            let mut changed = false;
            for id in &selected {
                if blocked.contains_key(id) {
                    continue;
                }
                let Some(manifest) = self.manifests.get(id) else {
                    continue;
                };
                if let Some(dep) = manifest.dependencies.iter().find(|d| blocked.contains_key(*d)) {
                    blocked.insert(
                        id.clone(),
                        PluginError::MissingDependency {
                            id: id.clone(),
                            dependency: dep.clone(),
                            reason: "cannot be loaded".to_string(),
                        },
                    );
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }

        let mut remaining: BTreeSet<&PluginId> =
            selected.iter().filter(|id| !blocked.contains_key(*id)).collect();

        // Kahn's algorithm with an ordered frontier: always load the
        // lexicographically smallest ready plugin next.
        let mut in_degree: BTreeMap<&PluginId, usize> = BTreeMap::new();
        let mut dependents: BTreeMap<&PluginId, Vec<&PluginId>> = BTreeMap::new();
        for id in remaining.iter().copied() {
            let manifest = &self.manifests[id];
            let deps: Vec<&PluginId> = manifest
                .dependencies
                .iter()
                .filter(|d| remaining.contains(*d))
                .collect();
            in_degree.insert(id, deps.len());
            for dep in deps {
                dependents.entry(dep).or_default().push(id);
            }
        }

        let mut ready: BTreeSet<&PluginId> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(id, _)| *id)
            .collect();

        while let Some(next) = ready.iter().next().copied() {
            ready.remove(next);
            remaining.remove(next);
            plan.order.push(next.clone());
            for dependent in dependents.get(next).into_iter().flatten() {
                let degree = in_degree.get_mut(dependent).map(|d| {
                    *d -= 1;
                    *d
                });
                if degree == Some(0) {
                    ready.insert(*dependent);
                }
            }
        }

        // Anything still remaining sits on or behind a cycle.
        if !remaining.is_empty() {
            let cycle_members = self.cycle_members(&remaining);
            let members: Vec<PluginId> = cycle_members.iter().map(|id| (*id).clone()).collect();
            let leftover: Vec<&PluginId> = remaining.iter().copied().collect();
            for id in remaining.iter().copied() {
                if cycle_members.contains(id) {
                    blocked.insert(
                        id.clone(),
                        PluginError::DependencyCycle {
                            members: members.clone(),
                        },
                    );
                } else {
                    let dep = self.manifests[id]
                        .dependencies
                        .iter()
                        .find(|d| leftover.contains(d))
                        .cloned()
                        .unwrap_or_else(|| id.clone());
                    blocked.insert(
                        id.clone(),
                        PluginError::MissingDependency {
                            id: id.clone(),
                            dependency: dep,
                            reason: "is part of a dependency cycle".to_string(),
                        },
                    );
                }
            }
        }

        plan.blocked = blocked.into_iter().collect();
        plan
    }

    /// Finds the plugins within `nodes` that lie on a cycle (reachable from
    /// themselves through dependency edges restricted to `nodes`).
    fn cycle_members<'a>(&self, nodes: &BTreeSet<&'a PluginId>) -> BTreeSet<&'a PluginId> {
        let mut members = BTreeSet::new();
        for &start in nodes {
            let mut stack: Vec<&PluginId> = self.manifests[start]
                .dependencies
                .iter()
                .filter_map(|d| nodes.get(d).copied())
                .collect();
            let mut seen: HashSet<&PluginId> = HashSet::new();
            while let Some(current) = stack.pop() {
                if current == start {
                    members.insert(start);
                    break;
                }
                if !seen.insert(current) {
                    continue;
                }
                stack.extend(
                    self.manifests[current]
                        .dependencies
                        .iter()
                        .filter_map(|d| nodes.get(d).copied()),
                );
            }
        }
        members
    }

    /// Plugins in `within` that transitively depend on `id`, in the order
    /// they appear in `within`. Used to tear down and rebuild a reload
    /// subtree.
    pub fn dependents_of(&self, id: &PluginId, within: &[PluginId]) -> Vec<PluginId> {
        let mut affected: HashSet<&PluginId> = HashSet::new();
        affected.insert(id);
        // `within` is a valid load order, so one forward pass suffices.
        for candidate in within {
            if affected.contains(candidate) {
                continue;
            }
            if let Some(manifest) = self.manifests.get(candidate)
                && manifest.dependencies.iter().any(|d| affected.contains(d))
            {
                affected.insert(candidate);
            }
        }
        within
            .iter()
            .filter(|c| affected.contains(c))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(manifests: Vec<(&str, &str, Vec<&str>)>) -> PluginRegistry {
        let mut registry = PluginRegistry::new(ConstructorTable::new());
        for (group, name, deps) in manifests {
            let deps_toml: Vec<String> = deps.iter().map(|d| format!("{d:?}")).collect();
            let content = format!(
                "[plugin]\nname = {name:?}\nversion = \"0.1.0\"\n\n[dependencies]\nplugins = [{}]\n",
                deps_toml.join(", ")
            );
            let manifest = PluginManifest::parse(group, "test", &content).unwrap();
            registry
                .manifest_paths
                .insert(manifest.id.clone(), format!("{group}/{name}"));
            registry.manifests.insert(manifest.id.clone(), manifest);
        }
        registry
    }

    fn ids(raw: &[&str]) -> Vec<PluginId> {
        raw.iter().map(|s| s.parse().unwrap()).collect()
    }

    fn enabled(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn independent_plugins_load_in_lexical_order() {
        let registry = registry_with(vec![
            ("core", "c", vec![]),
            ("core", "a", vec![]),
            ("core", "b", vec![]),
        ]);
        let plan = registry.load_plan(&enabled(&["core:*"]));
        assert_eq!(plan.order, ids(&["core:a", "core:b", "core:c"]));
        assert!(plan.blocked.is_empty());
        assert!(plan.errors.is_empty());
    }

    #[test]
    fn dependencies_come_before_dependents() {
        let registry = registry_with(vec![
            ("core", "bot", vec!["core:storage", "core:events"]),
            ("core", "events", vec![]),
            ("core", "storage", vec!["core:events"]),
        ]);
        let plan = registry.load_plan(&enabled(&["core:*"]));
        assert_eq!(plan.order, ids(&["core:events", "core:storage", "core:bot"]));
    }

    #[test]
    fn missing_dependency_blocks_the_subtree_only() {
        let registry = registry_with(vec![
            ("core", "a", vec!["core:ghost"]),
            ("core", "b", vec!["core:a"]),
            ("core", "c", vec![]),
        ]);
        let plan = registry.load_plan(&enabled(&["core:*"]));
        assert_eq!(plan.order, ids(&["core:c"]));
        assert_eq!(plan.blocked.len(), 2);
        assert!(matches!(
            plan.blocked[0],
            (ref id, PluginError::MissingDependency { .. }) if *id == PluginId::new("core", "a")
        ));
    }

    #[test]
    fn dependency_outside_the_enabled_set_blocks() {
        let registry = registry_with(vec![
            ("core", "a", vec![]),
            ("core", "b", vec!["core:a"]),
        ]);
        let plan = registry.load_plan(&enabled(&["core:b"]));
        assert!(plan.order.is_empty());
        assert!(matches!(
            plan.blocked[0].1,
            PluginError::MissingDependency { ref reason, .. } if reason == "is not enabled"
        ));
    }

    #[test]
    fn cycles_are_reported_with_their_members() {
        let registry = registry_with(vec![
            ("core", "a", vec!["core:b"]),
            ("core", "b", vec!["core:a"]),
            ("core", "c", vec!["core:a"]),
            ("core", "d", vec![]),
        ]);
        let plan = registry.load_plan(&enabled(&["core:*"]));
        assert_eq!(plan.order, ids(&["core:d"]));

        let blocked: BTreeMap<_, _> = plan.blocked.into_iter().collect();
        assert!(matches!(
            blocked[&PluginId::new("core", "a")],
            PluginError::DependencyCycle { ref members } if *members == ids(&["core:a", "core:b"])
        ));
        assert!(matches!(
            blocked[&PluginId::new("core", "c")],
            PluginError::MissingDependency { .. }
        ));
    }

    #[test]
    fn unknown_enabled_names_are_collected() {
        let registry = registry_with(vec![("core", "a", vec![])]);
        let plan = registry.load_plan(&enabled(&["core:a", "core:missing", "not-an-id"]));
        assert_eq!(plan.order, ids(&["core:a"]));
        assert_eq!(plan.errors.len(), 2);
        assert!(matches!(plan.errors[0], PluginError::UnknownPlugin { .. }));
        assert!(matches!(plan.errors[1], PluginError::InvalidId(_)));
    }

    #[test]
    fn wildcard_selects_only_its_group() {
        let registry = registry_with(vec![
            ("core", "a", vec![]),
            ("fun", "b", vec![]),
        ]);
        let plan = registry.load_plan(&enabled(&["fun:*"]));
        assert_eq!(plan.order, ids(&["fun:b"]));
    }

    #[test]
    fn dependents_of_walks_the_subtree_in_load_order() {
        let registry = registry_with(vec![
            ("core", "a", vec![]),
            ("core", "b", vec!["core:a"]),
            ("core", "c", vec!["core:b"]),
            ("core", "d", vec![]),
        ]);
        let order = ids(&["core:a", "core:b", "core:c", "core:d"]);
        let target = PluginId::new("core", "b");
        assert_eq!(
            registry.dependents_of(&target, &order),
            ids(&["core:b", "core:c"])
        );
    }
}
