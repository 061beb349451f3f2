use anyhow::Result;
use rael_runtime::RuntimeConfig;

use super::one_shot_manager;

pub fn execute(config: RuntimeConfig) -> Result<()> {
    let manager = one_shot_manager(config);
    manager.load_all()?;

    let plugins = manager.list_plugins();
    if plugins.is_empty() {
        println!("No plugins loaded.");
        return Ok(());
    }

    for info in &plugins {
        if info.dependencies.is_empty() {
            println!("{}", info.id);
        } else {
            println!("{} -> {}", info.id, info.dependencies.join(", "));
        }
        for missing in manager.missing_dependencies(&info.id) {
            println!("  missing: {}", missing);
        }
    }

    let order = manager.dependency_order()?;
    println!("Load order: {}", order.join(", "));

    Ok(())
}
