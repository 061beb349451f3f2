//! Hot reload: turns file events in the plugin and config directories into
//! plugin reloads and config updates.

use std::collections::HashMap;
use std::fs;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use super::watcher::{FileChangeEvent, FileChangeKind, FileWatcher, WatchMode};
use crate::error::{PluginError, PluginResult};
use crate::plugin::abi::is_native_library;
use crate::plugin::plugin_trait::ConfigMap;

/// What the reloader drives. Implemented by the plugin manager, which keeps
/// ownership of every plugin handle.
pub trait ReloadTarget: Send + Sync {
    /// Reload `id` if loaded, otherwise load it from `path` (or the default
    /// location for `id`). Returns whether a live instance exists afterwards.
    fn reload_plugin(&self, id: &str, path: Option<&Path>) -> bool;

    /// Current config of `id`, if loaded.
    fn plugin_state(&self, id: &str) -> Option<ConfigMap>;

    /// Replace the config of `id`. Returns false if `id` is not loaded.
    fn apply_state(&self, id: &str, state: ConfigMap) -> bool;

    fn loaded_plugins(&self) -> Vec<String>;
}

/// Notified after every reload attempt with `(plugin_id, success)`.
pub type ReloadCallback = Arc<dyn Fn(&str, bool) + Send + Sync>;

struct ReloaderShared {
    target: Weak<dyn ReloadTarget>,
    plugin_directory: PathBuf,
    config_directory: PathBuf,
    callbacks: Mutex<Vec<ReloadCallback>>,
    saved_states: Mutex<HashMap<String, ConfigMap>>,
    digests: Mutex<HashMap<PathBuf, String>>,
}

impl ReloaderShared {
    fn handle_event(&self, event: &FileChangeEvent) {
        if event.kind == FileChangeKind::Deleted {
            debug!(path = %event.path.display(), "Ignoring deleted file");
            self.forget_digest(&event.path);
            return;
        }

        if is_native_library(&event.path) {
            if !self.digest_changed(&event.path) {
                debug!(path = %event.path.display(), "Library content unchanged, skipping reload");
                return;
            }
            if let Some(id) = file_stem(&event.path) {
                self.reload_plugin(&id, Some(&event.path));
            }
        } else if is_config_file(&event.path) {
            if let Err(e) = self.reload_config(&event.path) {
                warn!(path = %event.path.display(), error = %e, "Failed to apply plugin config");
            }
        }
    }

    fn reload_plugin(&self, id: &str, path: Option<&Path>) -> bool {
        let Some(target) = self.target.upgrade() else {
            warn!(plugin = %id, "Reload requested after the manager was dropped");
            return false;
        };

        self.save_state(target.as_ref(), id);
        let success = target.reload_plugin(id, path);
        if success {
            self.restore_state(target.as_ref(), id);
            info!(plugin = %id, "Plugin hot-reloaded");
        } else {
            self.saved_states
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(id);
            warn!(plugin = %id, "Plugin hot reload failed");
        }

        self.notify(id, success);
        success
    }

    fn reload_config(&self, path: &Path) -> PluginResult<bool> {
        let Some(id) = file_stem(path) else {
            return Ok(false);
        };

        let config = match parse_config_file(path) {
            Ok(config) => config,
            Err(e) => {
                self.notify(&id, false);
                return Err(e);
            }
        };

        let applied = match self.target.upgrade() {
            Some(target) => target.apply_state(&id, config),
            None => false,
        };
        if applied {
            info!(plugin = %id, path = %path.display(), "Plugin config reloaded");
        } else {
            debug!(plugin = %id, "Config change for a plugin that is not loaded");
        }

        self.notify(&id, applied);
        Ok(applied)
    }

    fn save_state(&self, target: &dyn ReloadTarget, id: &str) -> bool {
        match target.plugin_state(id) {
            Some(state) => {
                self.saved_states
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .insert(id.to_string(), state);
                true
            }
            None => false,
        }
    }

    fn restore_state(&self, target: &dyn ReloadTarget, id: &str) -> bool {
        let saved = self
            .saved_states
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id);
        match saved {
            Some(state) if !state.is_empty() => target.apply_state(id, state),
            Some(_) => true,
            None => false,
        }
    }

    fn notify(&self, id: &str, success: bool) {
        let callbacks = self
            .callbacks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        for callback in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(id, success))).is_err() {
                warn!(plugin = %id, "Reload callback panicked");
            }
        }
    }

    /// Record the digest of `path`; true when it differs from the last one seen.
    fn digest_changed(&self, path: &Path) -> bool {
        let digest = match fs::read(path) {
            Ok(bytes) => compute_digest(&bytes),
            // Unreadable mid-write; let the loader report the failure
            Err(_) => return true,
        };
        let mut digests = self.digests.lock().unwrap_or_else(|e| e.into_inner());
        digests.insert(path.to_path_buf(), digest.clone()).as_deref() != Some(digest.as_str())
    }

    fn forget_digest(&self, path: &Path) {
        self.digests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(path);
    }

    fn seed_digests(&self) {
        let Ok(entries) = fs::read_dir(&self.plugin_directory) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if !is_native_library(&path) {
                continue;
            }
            // Watcher events carry canonical paths
            let key = path.canonicalize().unwrap_or(path);
            if let Ok(bytes) = fs::read(&key) {
                self.digests
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .insert(key, compute_digest(&bytes));
            }
        }
    }
}

/// Watches the plugin and config directories and reloads what changes.
pub struct HotReloader {
    shared: Arc<ReloaderShared>,
    watcher: FileWatcher,
    enabled: AtomicBool,
    dispatcher_installed: AtomicBool,
}

impl HotReloader {
    pub fn new(
        target: Weak<dyn ReloadTarget>,
        plugin_directory: impl Into<PathBuf>,
        config_directory: impl Into<PathBuf>,
        mode: WatchMode,
    ) -> Self {
        Self {
            shared: Arc::new(ReloaderShared {
                target,
                plugin_directory: plugin_directory.into(),
                config_directory: config_directory.into(),
                callbacks: Mutex::new(Vec::new()),
                saved_states: Mutex::new(HashMap::new()),
                digests: Mutex::new(HashMap::new()),
            }),
            watcher: FileWatcher::new(mode),
            enabled: AtomicBool::new(false),
            dispatcher_installed: AtomicBool::new(false),
        }
    }

    pub fn plugin_directory(&self) -> &Path {
        &self.shared.plugin_directory
    }

    pub fn config_directory(&self) -> &Path {
        &self.shared.config_directory
    }

    /// Arm watches on both directories and start the watcher thread.
    ///
    /// A missing config directory is created. A missing plugin directory is
    /// skipped; calling `enable` again after `disable` arms it once it exists.
    pub fn enable(&self) -> PluginResult<()> {
        if self.enabled.load(Ordering::SeqCst) {
            return Ok(());
        }

        let config_dir = &self.shared.config_directory;
        if !config_dir.is_dir() {
            match fs::create_dir_all(config_dir) {
                Ok(()) => debug!(path = %config_dir.display(), "Created plugin config directory"),
                Err(e) => {
                    warn!(path = %config_dir.display(), error = %e, "Cannot create plugin config directory")
                }
            }
        }

        let mut dirs = vec![self.shared.plugin_directory.clone()];
        if self.shared.config_directory != self.shared.plugin_directory {
            dirs.push(self.shared.config_directory.clone());
        }
        for dir in &dirs {
            if dir.is_dir() {
                self.watcher.watch(dir, false)?;
            } else {
                warn!(path = %dir.display(), "Hot reload directory does not exist, skipping");
            }
        }

        if !self.dispatcher_installed.swap(true, Ordering::SeqCst) {
            let shared = Arc::downgrade(&self.shared);
            self.watcher.on_change(move |event| {
                if let Some(shared) = shared.upgrade() {
                    shared.handle_event(event);
                }
            });
        }

        self.shared.seed_digests();
        self.watcher.start()?;
        self.enabled.store(true, Ordering::SeqCst);
        info!(
            plugins = %self.shared.plugin_directory.display(),
            configs = %self.shared.config_directory.display(),
            "Hot reload enabled"
        );
        Ok(())
    }

    pub fn disable(&self) {
        if self.enabled.swap(false, Ordering::SeqCst) {
            self.watcher.stop();
            info!("Hot reload disabled");
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn on_reload<F>(&self, callback: F)
    where
        F: Fn(&str, bool) + Send + Sync + 'static,
    {
        self.shared
            .callbacks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Arc::new(callback));
    }

    /// Reload `id`, carrying its config across the unload/load cycle.
    pub fn reload_plugin(&self, id: &str) -> bool {
        self.shared.reload_plugin(id, None)
    }

    /// Apply a `<id>.json` / `<id>.yaml` file to plugin `<id>`.
    pub fn reload_config(&self, path: &Path) -> PluginResult<bool> {
        self.shared.reload_config(path)
    }

    /// Reload every loaded plugin. Returns how many came back.
    pub fn reload_all(&self) -> usize {
        let Some(target) = self.shared.target.upgrade() else {
            return 0;
        };
        let ids = target.loaded_plugins();
        drop(target);

        ids.iter()
            .filter(|id| self.shared.reload_plugin(id, None))
            .count()
    }

    /// Capture the config of `id` for a later [`HotReloader::restore_state`].
    pub fn save_state(&self, id: &str) -> bool {
        match self.shared.target.upgrade() {
            Some(target) => self.shared.save_state(target.as_ref(), id),
            None => false,
        }
    }

    pub fn restore_state(&self, id: &str) -> bool {
        match self.shared.target.upgrade() {
            Some(target) => self.shared.restore_state(target.as_ref(), id),
            None => false,
        }
    }

    /// Process one file event on the calling thread.
    pub fn handle_event(&self, event: &FileChangeEvent) {
        self.shared.handle_event(event);
    }
}

impl Drop for HotReloader {
    fn drop(&mut self) {
        self.disable();
    }
}

impl std::fmt::Debug for HotReloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HotReloader")
            .field("plugin_directory", &self.shared.plugin_directory)
            .field("config_directory", &self.shared.config_directory)
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

fn file_stem(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(str::to_string)
}

fn is_config_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("json" | "yaml" | "yml")
    )
}

fn compute_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Parse a flat JSON object or YAML mapping into a [`ConfigMap`].
///
/// Scalars are stringified; nested values are kept as JSON text.
pub fn parse_config_file(path: &Path) -> PluginResult<ConfigMap> {
    let content = fs::read_to_string(path)?;
    let invalid = |reason: String| PluginError::Config {
        path: path.to_path_buf(),
        reason,
    };

    let value: serde_json::Value = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str(&content).map_err(|e| invalid(e.to_string()))?,
        _ => serde_yaml::from_str(&content).map_err(|e| invalid(e.to_string()))?,
    };

    let object = match value {
        serde_json::Value::Object(object) => object,
        serde_json::Value::Null => return Ok(ConfigMap::new()),
        _ => return Err(invalid("expected a mapping at the top level".into())),
    };

    Ok(object
        .into_iter()
        .map(|(key, value)| {
            let text = match value {
                serde_json::Value::String(s) => s,
                serde_json::Value::Null => String::new(),
                other => other.to_string(),
            };
            (key, text)
        })
        .collect())
}
