//! Error taxonomy for the plugin runtime.

use std::path::PathBuf;

use thiserror::Error;

/// Result alias used throughout the runtime.
pub type PluginResult<T> = Result<T, PluginError>;

/// Errors produced while loading, driving or watching plugins.
///
/// Every load-path variant is produced only after the partially acquired
/// resources (library handle, plugin instance) have been released.
#[derive(Debug, Error)]
pub enum PluginError {
    /// The shared library could not be found or mapped.
    #[error("Failed to open plugin library {path:?}: {reason}")]
    OpenFailure { path: PathBuf, reason: String },

    /// A required entry point is not exported by the library.
    #[error("Plugin library {path:?} is missing symbol '{symbol}'")]
    SymbolMissing { path: PathBuf, symbol: String },

    /// The library was built against a different plugin ABI.
    #[error("Plugin library {path:?} has ABI version {found}, host expects {expected}")]
    AbiMismatch {
        path: PathBuf,
        expected: u32,
        found: u32,
    },

    /// `create_plugin` returned null or panicked.
    #[error("Plugin library {path:?} failed to construct an instance: {reason}")]
    ConstructionFailure { path: PathBuf, reason: String },

    /// `initialize()` returned false or panicked.
    #[error("Plugin '{id}' failed to initialize")]
    InitFailure { id: String },

    /// Operation on an id that is not loaded.
    #[error("Plugin '{0}' is not loaded")]
    NotFound(String),

    /// Declared dependencies between loaded plugins form a cycle.
    #[error("Dependency cycle between plugins: {}", .0.join(", "))]
    DependencyCycle(Vec<String>),

    /// The file watcher could not be armed.
    #[error("File watcher error: {0}")]
    Watch(String),

    /// A plugin config file could not be parsed.
    #[error("Invalid plugin config {path:?}: {reason}")]
    Config { path: PathBuf, reason: String },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<notify::Error> for PluginError {
    fn from(err: notify::Error) -> Self {
        PluginError::Watch(err.to_string())
    }
}
