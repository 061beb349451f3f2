pub mod deps;
pub mod init;
pub mod list;
pub mod load;
pub mod watch;

use std::sync::Arc;

use rael_runtime::{PluginManager, RuntimeConfig};

/// Manager for one-shot commands: no auto-load, no watcher.
fn one_shot_manager(mut config: RuntimeConfig) -> Arc<PluginManager> {
    config.plugins.auto_load = false;
    config.plugins.hot_reload = false;
    PluginManager::new(config)
}
