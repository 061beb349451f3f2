pub mod config;
pub mod error;
pub mod extension;
pub mod hooks;
pub mod plugin;
pub mod services;
pub mod watch;

pub use config::{PluginsConfig, RuntimeConfig, WatcherConfig, WatcherKind};
pub use error::{PluginError, PluginResult};
pub use extension::{ExtensionFactory, ExtensionPoint};
pub use hooks::{Hook, HookHandler, HookPriority, LoadEvent};
pub use plugin::{
    ConfigMap, LibloadingLoader, ModuleLoader, NativeModule, Plugin, PluginContext, PluginHandle,
    PluginInfo, PluginManager, ABI_VERSION,
};
pub use services::ServiceRegistry;
pub use watch::{
    FileChangeEvent, FileChangeKind, FileWatcher, HotReloader, ReloadTarget, WatchMode,
};

/// Initialize structured JSON logging on stderr
pub fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    fmt()
        .json()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
}
