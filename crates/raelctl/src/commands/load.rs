use anyhow::{Context, Result};
use rael_runtime::RuntimeConfig;
use std::path::Path;
use tracing::info;

use super::one_shot_manager;

pub fn execute(config: RuntimeConfig, path: &Path) -> Result<()> {
    let manager = one_shot_manager(config);
    let id = manager
        .load(path)
        .with_context(|| format!("Failed to load plugin {:?}", path))?;

    let info = manager
        .list_plugins()
        .into_iter()
        .find(|p| p.id == id)
        .context("Plugin vanished after load")?;

    info!(plugin = %id, "Plugin loaded successfully");
    println!("Plugin '{}' {} loaded from {:?}", info.id, info.version, path);
    if !info.author.is_empty() {
        println!("  author: {}", info.author);
    }
    for dep in manager.missing_dependencies(&id) {
        println!("  missing dependency: {}", dep);
    }
    for service in manager.services().list_services() {
        println!("  service: {}", service);
    }

    Ok(())
}
