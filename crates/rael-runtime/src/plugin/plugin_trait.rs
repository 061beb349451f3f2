//! Core Plugin trait, defined in rael-runtime so the FFI bridge can reference it
//! without circular dependencies. Re-exported by rael-plugin-sdk for plugin authors.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use super::context::PluginContext;

/// Opaque, unschematized per-plugin configuration.
pub type ConfigMap = HashMap<String, String>;

/// Metadata a plugin reports about itself. Immutable once reported.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginInfo {
    /// Unique, stable identifier
    pub id: String,
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub description: String,
    /// Ids of plugins this one expects to be present (advisory only)
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl PluginInfo {
    pub fn new(id: impl Into<String>, name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version: version.into(),
            ..Default::default()
        }
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_dependency(mut self, id: impl Into<String>) -> Self {
        self.dependencies.push(id.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// The capability contract every loadable unit implements.
///
/// Plugin authors implement this trait and use `declare_plugin!` to export it.
/// All methods take `&self`: the manager calls into plugin code without holding
/// any of its own locks, so a plugin may call back into the host freely.
/// Implementations keep their mutable state behind atomics or mutexes.
pub trait Plugin: Send + Sync {
    /// Plugin metadata
    fn info(&self) -> PluginInfo;

    /// Called exactly once per loaded instance. Returning false aborts the load.
    fn initialize(&self) -> bool;

    /// Release resources. Called once, right before the instance is destroyed.
    fn shutdown(&self);

    fn is_initialized(&self) -> bool;

    /// Receives the host facade. Called once, before `initialize`.
    fn attach_context(&self, _ctx: PluginContext) {}

    fn on_enable(&self) {}

    fn on_disable(&self) {}

    fn on_config_change(&self, _config: &ConfigMap) {}
}
