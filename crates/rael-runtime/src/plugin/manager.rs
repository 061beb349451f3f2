use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

use tracing::{debug, info, warn};

use super::abi::{is_native_library, LibloadingLoader, ModuleLoader};
use super::context::PluginContext;
use super::ffi_bridge::PluginHandle;
use super::plugin_trait::{ConfigMap, PluginInfo};
use crate::config::RuntimeConfig;
use crate::error::{PluginError, PluginResult};
use crate::hooks::{Hook, LoadEvent};
use crate::services::{ServiceRegistry, HOST_OWNER};
use crate::watch::{HotReloader, ReloadTarget};

/// Table entry for a live plugin.
struct LoadedPlugin {
    handle: Arc<PluginHandle>,
    /// Reported once at load; never re-queried under the table lock
    info: PluginInfo,
    path: PathBuf,
    /// Tags the services this instance provided
    instance: u64,
    enabled: bool,
    /// Set by the first `unload`; later callers back off
    unloading: bool,
    config: ConfigMap,
}

/// Loads, tracks and unloads native plugins.
///
/// Plugin code (`attach_context`, `initialize`, `shutdown`, `on_enable`,
/// `on_disable`, `on_config_change`) and lifecycle hook handlers always run
/// with the table lock released, so they may call back into the manager.
pub struct PluginManager {
    config: RuntimeConfig,
    loader: Arc<dyn ModuleLoader>,
    plugins: RwLock<HashMap<String, LoadedPlugin>>,
    services: ServiceRegistry,
    hot_reloader: HotReloader,
    on_load: Hook<LoadEvent>,
    on_unload: Hook<str>,
    on_enable: Hook<str>,
    on_disable: Hook<str>,
    next_instance: AtomicU64,
    self_ref: Weak<PluginManager>,
}

impl PluginManager {
    pub fn new(config: RuntimeConfig) -> Arc<Self> {
        Self::with_loader(config, Arc::new(LibloadingLoader))
    }

    /// Build a manager on top of a custom module loader.
    pub fn with_loader(config: RuntimeConfig, loader: Arc<dyn ModuleLoader>) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let target: Weak<dyn ReloadTarget> = weak.clone();
            let hot_reloader = HotReloader::new(
                target,
                config.plugins.directory.clone(),
                config.plugins.config_directory.clone(),
                config.watcher.watch_mode(),
            );
            Self {
                config,
                loader,
                plugins: RwLock::new(HashMap::new()),
                services: ServiceRegistry::new(),
                hot_reloader,
                on_load: Hook::new("plugin_load"),
                on_unload: Hook::new("plugin_unload"),
                on_enable: Hook::new("plugin_enable"),
                on_disable: Hook::new("plugin_disable"),
                next_instance: AtomicU64::new(HOST_OWNER + 1),
                self_ref: weak.clone(),
            }
        })
    }

    /// `load_all` when `auto_load` is set, then hot reload when `hot_reload` is set.
    pub fn start(&self) -> PluginResult<usize> {
        let loaded = if self.config.plugins.auto_load {
            self.load_all()?
        } else {
            0
        };
        if self.config.plugins.hot_reload {
            self.hot_reloader.enable()?;
        }
        Ok(loaded)
    }

    /// Load the library at `path` and return the id its plugin reports.
    ///
    /// Any failure releases what was acquired (hook handlers and services the
    /// instance registered, the instance itself, the library) and fires the
    /// load hook with the file stem and `false`. When the id is already loaded,
    /// the current plugin is only retired once the new instance initialized,
    /// so a failed replacement leaves it untouched.
    pub fn load(&self, path: &Path) -> PluginResult<String> {
        match self.load_inner(path) {
            Ok(id) => {
                self.on_load.call(&LoadEvent::new(id.as_str(), true));
                Ok(id)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to load plugin");
                self.on_load.call(&LoadEvent::new(file_stem(path), false));
                Err(e)
            }
        }
    }

    fn load_inner(&self, path: &Path) -> PluginResult<String> {
        let handle = PluginHandle::open(self.loader.as_ref(), path)?;

        let info = catch_unwind(AssertUnwindSafe(|| handle.plugin().info())).map_err(|_| {
            PluginError::ConstructionFailure {
                path: path.to_path_buf(),
                reason: "panicked while reporting info".into(),
            }
        })?;
        if info.id.is_empty() {
            return Err(PluginError::ConstructionFailure {
                path: path.to_path_buf(),
                reason: "reported an empty id".into(),
            });
        }
        let id = info.id.clone();

        let instance = self.next_instance.fetch_add(1, Ordering::Relaxed);
        let services_before = self.services.checkpoint();
        let hooks_before = self.hook_registrations(&id);

        let ctx = PluginContext::from_weak(
            id.as_str(),
            instance,
            self.self_ref.clone(),
            self.config.plugins.data_root.clone(),
        );
        let initialized = catch_unwind(AssertUnwindSafe(|| {
            handle.plugin().attach_context(ctx);
            handle.plugin().initialize()
        }))
        .unwrap_or_else(|_| {
            warn!(plugin = %id, "Plugin panicked during initialize");
            false
        });

        if !initialized {
            // Handlers and services registered during initialize live in the library
            let added: BTreeSet<String> = self
                .hook_registrations(&id)
                .difference(&hooks_before)
                .cloned()
                .collect();
            self.drop_registrations(&added);
            self.services.roll_back(instance, &services_before);
            drop(handle);
            return Err(PluginError::InitFailure { id });
        }

        let entry = LoadedPlugin {
            handle: Arc::new(handle),
            info,
            path: path.to_path_buf(),
            instance,
            enabled: true,
            unloading: false,
            config: ConfigMap::new(),
        };
        let version = entry.info.version.clone();

        let displaced = self
            .plugins
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.clone(), entry);

        // Last load wins. An entry already being unloaded is finished by that unloader.
        if let Some(old) = displaced.filter(|old| !old.unloading) {
            info!(plugin = %id, old = %old.path.display(), path = %path.display(), "Replacing loaded plugin");
            self.retire(&id, old, instance, &hooks_before);
        }

        info!(plugin = %id, version = %version, path = %path.display(), "Plugin loaded");
        Ok(id)
    }

    /// Shut down an instance displaced from the table by a newer load of `id`.
    ///
    /// `old_hooks` are the registrations held under `id` before the new
    /// instance initialized. Services the new instance provided survive even
    /// if the old shutdown removes them by name.
    fn retire(&self, id: &str, old: LoadedPlugin, instance: u64, old_hooks: &BTreeSet<String>) {
        let provided = self.services.checkpoint_owned(instance);

        self.on_unload.call(id);
        old.handle.shutdown();

        self.drop_registrations(old_hooks);
        let leftover = self.services.remove_owned_by(old.instance);
        if !leftover.is_empty() {
            debug!(plugin = %id, services = ?leftover, "Removed services left by replaced plugin");
        }
        self.services.restore_missing(provided);
        drop(old);
    }

    /// Unload `id`. Returns false if it is not loaded or already being unloaded.
    ///
    /// The unload hook fires while the plugin is still queryable, then the
    /// plugin is shut down and its entry removed. The library closes once the
    /// last outstanding [`PluginHandle`] reference is dropped.
    pub fn unload(&self, id: &str) -> bool {
        let (handle, instance) = {
            let mut plugins = self.plugins.write().unwrap_or_else(|e| e.into_inner());
            match plugins.get_mut(id) {
                Some(entry) if !entry.unloading => {
                    entry.unloading = true;
                    (entry.handle.clone(), entry.instance)
                }
                _ => return false,
            }
        };

        self.on_unload.call(id);
        handle.shutdown();

        let removed = {
            let mut plugins = self.plugins.write().unwrap_or_else(|e| e.into_inner());
            let same = plugins
                .get(id)
                .is_some_and(|entry| Arc::ptr_eq(&entry.handle, &handle));
            if same {
                plugins.remove(id);
            }
            same
        };

        // Registrations go before the library closes; a replacement loaded
        // meanwhile owns the id's hook registrations now
        if removed {
            self.drop_hook_registrations(id);
        }
        let leftover = self.services.remove_owned_by(instance);
        if !leftover.is_empty() {
            debug!(plugin = %id, services = ?leftover, "Removed services left by unloaded plugin");
        }
        drop(handle);
        info!(plugin = %id, "Plugin unloaded");
        true
    }

    /// Unload `id` and load it again from the path it was first loaded from.
    pub fn reload(&self, id: &str) -> PluginResult<String> {
        let path = self
            .plugin_path(id)
            .ok_or_else(|| PluginError::NotFound(id.to_string()))?;

        if !self.unload(id) {
            return Err(PluginError::NotFound(id.to_string()));
        }
        self.load(&path)
    }

    /// Load every native library in the plugin directory, in file-name order.
    ///
    /// Stems on the deny-list are skipped. A failing library is logged and the
    /// scan continues. Returns how many plugins were loaded.
    pub fn load_all(&self) -> PluginResult<usize> {
        let dir = &self.config.plugins.directory;
        if !dir.is_dir() {
            warn!(path = %dir.display(), "Plugin directory does not exist");
            return Ok(0);
        }

        let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && is_native_library(path))
            .collect();
        paths.sort();

        let mut loaded = 0;
        for path in paths {
            let stem = file_stem(&path);
            if self.config.plugins.is_disabled(&stem) {
                info!(plugin = %stem, "Skipping disabled plugin");
                continue;
            }
            if self.load(&path).is_ok() {
                loaded += 1;
            }
        }

        info!(path = %dir.display(), loaded, "Plugin directory scanned");
        Ok(loaded)
    }

    pub fn unload_all(&self) {
        let ids: Vec<String> = self
            .plugins
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();

        for id in ids {
            self.unload(&id);
        }
    }

    /// Enable `id`. True if loaded; the callback and hook fire only on a transition.
    pub fn enable(&self, id: &str) -> bool {
        let handle = {
            let mut plugins = self.plugins.write().unwrap_or_else(|e| e.into_inner());
            let Some(entry) = plugins.get_mut(id) else {
                return false;
            };
            if entry.enabled {
                return true;
            }
            entry.enabled = true;
            entry.handle.clone()
        };

        if catch_unwind(AssertUnwindSafe(|| handle.plugin().on_enable())).is_err() {
            warn!(plugin = %id, "Plugin panicked in on_enable");
        }
        self.on_enable.call(id);
        debug!(plugin = %id, "Plugin enabled");
        true
    }

    /// Disable `id`. True if loaded; the callback and hook fire only on a transition.
    pub fn disable(&self, id: &str) -> bool {
        let handle = {
            let mut plugins = self.plugins.write().unwrap_or_else(|e| e.into_inner());
            let Some(entry) = plugins.get_mut(id) else {
                return false;
            };
            if !entry.enabled {
                return true;
            }
            entry.enabled = false;
            entry.handle.clone()
        };

        if catch_unwind(AssertUnwindSafe(|| handle.plugin().on_disable())).is_err() {
            warn!(plugin = %id, "Plugin panicked in on_disable");
        }
        self.on_disable.call(id);
        debug!(plugin = %id, "Plugin disabled");
        true
    }

    /// Declared dependencies of `id`. Advisory only; empty if not loaded.
    pub fn resolve_dependencies(&self, id: &str) -> Vec<String> {
        self.plugins
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .map(|entry| entry.info.dependencies.clone())
            .unwrap_or_default()
    }

    /// Loaded plugins that declare `id` as a dependency, sorted.
    pub fn get_dependents(&self, id: &str) -> Vec<String> {
        let plugins = self.plugins.read().unwrap_or_else(|e| e.into_inner());
        let mut dependents: Vec<String> = plugins
            .iter()
            .filter(|(_, entry)| entry.info.dependencies.iter().any(|d| d == id))
            .map(|(plugin_id, _)| plugin_id.clone())
            .collect();
        dependents.sort();
        dependents
    }

    /// Declared dependencies of `id` that are not loaded.
    pub fn missing_dependencies(&self, id: &str) -> Vec<String> {
        let plugins = self.plugins.read().unwrap_or_else(|e| e.into_inner());
        plugins
            .get(id)
            .map(|entry| {
                entry
                    .info
                    .dependencies
                    .iter()
                    .filter(|dep| !plugins.contains_key(dep.as_str()))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Loaded plugin ids ordered so every plugin follows the loaded plugins it
    /// depends on. Dependencies that are not loaded are ignored.
    pub fn dependency_order(&self) -> PluginResult<Vec<String>> {
        let graph: BTreeMap<String, Vec<String>> = self
            .plugins
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(id, entry)| (id.clone(), entry.info.dependencies.clone()))
            .collect();
        topological_order(&graph)
    }

    /// Replace the config of `id` and deliver it through `on_config_change`.
    pub fn set_plugin_config(&self, id: &str, config: ConfigMap) -> PluginResult<()> {
        let handle = {
            let mut plugins = self.plugins.write().unwrap_or_else(|e| e.into_inner());
            let entry = plugins
                .get_mut(id)
                .ok_or_else(|| PluginError::NotFound(id.to_string()))?;
            entry.config = config.clone();
            entry.handle.clone()
        };

        if catch_unwind(AssertUnwindSafe(|| handle.plugin().on_config_change(&config))).is_err() {
            warn!(plugin = %id, "Plugin panicked in on_config_change");
        }
        Ok(())
    }

    pub fn get_plugin_config(&self, id: &str) -> Option<ConfigMap> {
        self.plugins
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .map(|entry| entry.config.clone())
    }

    /// Shared handle to the plugin loaded as `id`.
    ///
    /// Holding it past `unload` keeps the library mapped but the plugin has
    /// already been shut down.
    pub fn get_plugin(&self, id: &str) -> Option<Arc<PluginHandle>> {
        self.plugins
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .map(|entry| entry.handle.clone())
    }

    /// Info of every loaded plugin, sorted by id.
    pub fn list_plugins(&self) -> Vec<PluginInfo> {
        let mut infos: Vec<PluginInfo> = self
            .plugins
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .map(|entry| entry.info.clone())
            .collect();
        infos.sort_by(|a, b| a.id.cmp(&b.id));
        infos
    }

    pub fn is_loaded(&self, id: &str) -> bool {
        self.plugins
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(id)
    }

    pub fn is_enabled(&self, id: &str) -> bool {
        self.plugins
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .is_some_and(|entry| entry.enabled)
    }

    /// Path `id` was loaded from.
    pub fn plugin_path(&self, id: &str) -> Option<PathBuf> {
        self.plugins
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .map(|entry| entry.path.clone())
    }

    /// Host-side context scoped to `id`.
    pub fn context_for(&self, id: &str) -> PluginContext {
        PluginContext::from_weak(
            id,
            HOST_OWNER,
            self.self_ref.clone(),
            self.config.plugins.data_root.clone(),
        )
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn services(&self) -> &ServiceRegistry {
        &self.services
    }

    pub fn hot_reloader(&self) -> &HotReloader {
        &self.hot_reloader
    }

    pub fn on_load(&self) -> &Hook<LoadEvent> {
        &self.on_load
    }

    pub fn on_unload(&self) -> &Hook<str> {
        &self.on_unload
    }

    pub fn on_enable(&self) -> &Hook<str> {
        &self.on_enable
    }

    pub fn on_disable(&self) -> &Hook<str> {
        &self.on_disable
    }

    fn drop_hook_registrations(&self, id: &str) {
        self.on_load.remove_by_plugin(id);
        self.on_unload.remove_by_plugin(id);
        self.on_enable.remove_by_plugin(id);
        self.on_disable.remove_by_plugin(id);
    }

    /// Lifecycle hook registration ids currently owned by `id`.
    fn hook_registrations(&self, id: &str) -> BTreeSet<String> {
        let mut ids: BTreeSet<String> = self.on_load.registration_ids(id).into_iter().collect();
        ids.extend(self.on_unload.registration_ids(id));
        ids.extend(self.on_enable.registration_ids(id));
        ids.extend(self.on_disable.registration_ids(id));
        ids
    }

    fn drop_registrations(&self, registrations: &BTreeSet<String>) {
        for reg in registrations {
            let _ = self.on_load.remove(reg)
                || self.on_unload.remove(reg)
                || self.on_enable.remove(reg)
                || self.on_disable.remove(reg);
        }
    }

    fn id_for_path(&self, path: &Path) -> Option<String> {
        let wanted = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        self.plugins
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|(_, entry)| {
                entry.path == path || entry.path.canonicalize().is_ok_and(|p| p == wanted)
            })
            .map(|(id, _)| id.clone())
    }

    fn default_path(&self, id: &str) -> PathBuf {
        self.config
            .plugins
            .directory
            .join(format!("{}.{}", id, std::env::consts::DLL_EXTENSION))
    }
}

impl ReloadTarget for PluginManager {
    fn reload_plugin(&self, id: &str, path: Option<&Path>) -> bool {
        let loaded_id = path
            .and_then(|p| self.id_for_path(p))
            .or_else(|| self.is_loaded(id).then(|| id.to_string()));

        if let Some(loaded_id) = loaded_id {
            return self.reload(&loaded_id).is_ok();
        }

        if self.config.plugins.is_disabled(id) {
            debug!(plugin = %id, "Not loading disabled plugin");
            return false;
        }
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.default_path(id));
        self.load(&path).is_ok()
    }

    fn plugin_state(&self, id: &str) -> Option<ConfigMap> {
        self.get_plugin_config(id)
    }

    fn apply_state(&self, id: &str, state: ConfigMap) -> bool {
        self.set_plugin_config(id, state).is_ok()
    }

    fn loaded_plugins(&self) -> Vec<String> {
        self.list_plugins().into_iter().map(|info| info.id).collect()
    }
}

impl Drop for PluginManager {
    fn drop(&mut self) {
        self.hot_reloader.disable();
        self.unload_all();
    }
}

impl std::fmt::Debug for PluginManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginManager")
            .field("directory", &self.config.plugins.directory)
            .field("plugins", &self.loaded_plugins())
            .finish()
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Kahn's algorithm over `id -> dependencies`; ties break by id.
fn topological_order(graph: &BTreeMap<String, Vec<String>>) -> PluginResult<Vec<String>> {
    let mut pending: BTreeMap<&str, BTreeSet<&str>> = graph
        .iter()
        .map(|(id, deps)| {
            let deps = deps
                .iter()
                .map(String::as_str)
                .filter(|dep| graph.contains_key(*dep) && *dep != id.as_str())
                .collect();
            (id.as_str(), deps)
        })
        .collect();

    let mut order = Vec::with_capacity(pending.len());
    loop {
        let ready: Vec<&str> = pending
            .iter()
            .filter(|(_, deps)| deps.is_empty())
            .map(|(id, _)| *id)
            .collect();
        if ready.is_empty() {
            break;
        }
        for id in ready {
            pending.remove(id);
            for deps in pending.values_mut() {
                deps.remove(id);
            }
            order.push(id.to_string());
        }
    }

    if pending.is_empty() {
        Ok(order)
    } else {
        Err(PluginError::DependencyCycle(
            pending.keys().map(|id| id.to_string()).collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn graph(edges: &[(&str, &[&str])]) -> BTreeMap<String, Vec<String>> {
        edges
            .iter()
            .map(|(id, deps)| (id.to_string(), deps.iter().map(|d| d.to_string()).collect()))
            .collect()
    }

    fn test_manager(dir: &Path) -> Arc<PluginManager> {
        let mut config = RuntimeConfig::default();
        config.plugins.directory = dir.to_path_buf();
        config.plugins.config_directory = dir.join("config");
        config.plugins.data_root = dir.join("data");
        config.plugins.hot_reload = false;
        PluginManager::new(config)
    }

    #[test]
    fn test_topological_order_puts_dependencies_first() {
        let order = topological_order(&graph(&[
            ("gamma", &["beta"]),
            ("beta", &["alpha"]),
            ("alpha", &[]),
            ("delta", &["missing"]),
        ]))
        .unwrap();
        assert_eq!(order, vec!["alpha", "delta", "beta", "gamma"]);
    }

    #[test]
    fn test_topological_order_detects_cycle() {
        let err = topological_order(&graph(&[
            ("a", &["b"]),
            ("b", &["a"]),
            ("c", &[]),
            ("d", &["a"]),
        ]))
        .unwrap_err();
        match err {
            PluginError::DependencyCycle(ids) => assert_eq!(ids, vec!["a", "b", "d"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_self_dependency_is_ignored() {
        let order = topological_order(&graph(&[("solo", &["solo"])])).unwrap();
        assert_eq!(order, vec!["solo"]);
    }

    #[test]
    fn test_load_missing_library_fires_failed_load_hook() {
        let dir = tempfile::tempdir().unwrap();
        let manager = test_manager(dir.path());

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        manager.on_load().add(
            move |e: &LoadEvent| {
                sink.lock().unwrap().push(e.clone());
                true
            },
            crate::hooks::HookPriority::Normal,
            "",
        );

        let result = manager.load(&dir.path().join("ghost.so"));
        assert!(matches!(result, Err(PluginError::OpenFailure { .. })));
        assert_eq!(*events.lock().unwrap(), vec![LoadEvent::new("ghost", false)]);
        assert!(manager.list_plugins().is_empty());
    }

    #[test]
    fn test_load_all_skips_non_libraries() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"hello").unwrap();
        let manager = test_manager(dir.path());
        assert_eq!(manager.load_all().unwrap(), 0);
    }

    #[test]
    fn test_load_all_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let manager = test_manager(&dir.path().join("absent"));
        assert_eq!(manager.load_all().unwrap(), 0);
    }

    #[test]
    fn test_unknown_id_operations() {
        let dir = tempfile::tempdir().unwrap();
        let manager = test_manager(dir.path());

        assert!(!manager.unload("ghost"));
        assert!(!manager.enable("ghost"));
        assert!(!manager.disable("ghost"));
        assert!(!manager.is_loaded("ghost"));
        assert!(!manager.is_enabled("ghost"));
        assert!(manager.get_plugin("ghost").is_none());
        assert!(manager.get_plugin_config("ghost").is_none());
        assert!(manager.resolve_dependencies("ghost").is_empty());
        assert!(matches!(manager.reload("ghost"), Err(PluginError::NotFound(_))));
        assert!(matches!(
            manager.set_plugin_config("ghost", ConfigMap::new()),
            Err(PluginError::NotFound(_))
        ));
        assert!(manager.dependency_order().unwrap().is_empty());
    }

    #[test]
    fn test_default_path_uses_platform_extension() {
        let dir = tempfile::tempdir().unwrap();
        let manager = test_manager(dir.path());
        let path = manager.default_path("alpha");
        assert_eq!(path.parent(), Some(dir.path()));
        assert_eq!(
            path.extension().and_then(|e| e.to_str()),
            Some(std::env::consts::DLL_EXTENSION)
        );
    }
}
