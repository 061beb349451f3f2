use std::any::Any;
use std::path::PathBuf;
use std::sync::{Arc, Weak};

use tracing::{error, info, warn};

use super::manager::PluginManager;
use super::plugin_trait::ConfigMap;
use crate::services::HOST_OWNER;

/// Per-plugin view of the host, handed to a plugin through `attach_context`.
///
/// Holds a weak manager reference: a context kept by a plugin never keeps the
/// manager alive, and every manager-backed call degrades to a no-op once the
/// manager is gone.
#[derive(Clone)]
pub struct PluginContext {
    plugin_id: String,
    /// Load attempt this context was issued for; tags provided services
    instance: u64,
    manager: Weak<PluginManager>,
    data_root: PathBuf,
}

impl PluginContext {
    pub fn new(plugin_id: impl Into<String>, manager: &Arc<PluginManager>) -> Self {
        Self::from_weak(
            plugin_id,
            HOST_OWNER,
            Arc::downgrade(manager),
            manager.config().plugins.data_root.clone(),
        )
    }

    pub(crate) fn from_weak(
        plugin_id: impl Into<String>,
        instance: u64,
        manager: Weak<PluginManager>,
        data_root: PathBuf,
    ) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            instance,
            manager,
            data_root,
        }
    }

    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    pub fn manager(&self) -> Option<Arc<PluginManager>> {
        self.manager.upgrade()
    }

    pub fn info(&self, message: &str) {
        info!(plugin = %self.plugin_id, "{}", message);
    }

    pub fn warn(&self, message: &str) {
        warn!(plugin = %self.plugin_id, "{}", message);
    }

    pub fn error(&self, message: &str) {
        error!(plugin = %self.plugin_id, "{}", message);
    }

    /// Publish a service in the manager's registry. Returns false if the manager is gone.
    ///
    /// The registration is owned by this plugin instance: a failed load rolls
    /// it back and unloading removes whatever the instance left behind.
    pub fn provide_service<T>(&self, name: &str, service: Arc<T>) -> bool
    where
        T: Any + Send + Sync,
    {
        match self.manager.upgrade() {
            Some(manager) => {
                manager.services().register_owned(name, service, self.instance);
                true
            }
            None => false,
        }
    }

    /// Remove a service this instance provided. Leaves the name alone once
    /// another instance has registered over it.
    pub fn withdraw_service(&self, name: &str) -> bool {
        self.manager
            .upgrade()
            .is_some_and(|m| m.services().unregister_owned(name, self.instance))
    }

    pub fn require_service<T>(&self, name: &str) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        self.manager.upgrade()?.services().get_service::<T>(name)
    }

    /// This plugin's current config; empty when none was set.
    pub fn get_config(&self) -> ConfigMap {
        self.manager
            .upgrade()
            .and_then(|m| m.get_plugin_config(&self.plugin_id))
            .unwrap_or_default()
    }

    pub fn get_config_value(&self, key: &str, default: &str) -> String {
        self.get_config()
            .remove(key)
            .unwrap_or_else(|| default.to_string())
    }

    /// `<data_root>/<id>/data`
    pub fn data_directory(&self) -> PathBuf {
        self.data_root.join(&self.plugin_id).join("data")
    }

    /// `<data_root>/<id>/config`
    pub fn config_directory(&self) -> PathBuf {
        self.data_root.join(&self.plugin_id).join("config")
    }
}

impl std::fmt::Debug for PluginContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginContext")
            .field("plugin_id", &self.plugin_id)
            .field("instance", &self.instance)
            .field("data_root", &self.data_root)
            .finish()
    }
}
