use anyhow::Result;
use rael_runtime::{PluginManager, RuntimeConfig};
use tracing::info;

/// Load plugins, hot-reload until Ctrl-C, then unload everything.
pub async fn execute(mut config: RuntimeConfig) -> Result<()> {
    config.plugins.hot_reload = true;
    let plugin_dir = config.plugins.directory.clone();
    let manager = PluginManager::new(config);

    manager.hot_reloader().on_reload(|id, success| {
        if success {
            println!("Reloaded '{}'", id);
        } else {
            println!("Reload of '{}' failed", id);
        }
    });

    let loaded = manager.start()?;
    println!("Loaded {} plugin(s); watching {:?} (Ctrl-C to stop)", loaded, plugin_dir);

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    manager.hot_reloader().disable();
    manager.unload_all();
    println!("All plugins unloaded.");
    Ok(())
}
