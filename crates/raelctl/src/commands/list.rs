use anyhow::Result;
use rael_runtime::RuntimeConfig;

use super::one_shot_manager;
use crate::cli::OutputFormat;

pub fn execute(config: RuntimeConfig, format: OutputFormat) -> Result<()> {
    let plugin_dir = config.plugins.directory.clone();
    let manager = one_shot_manager(config);
    manager.load_all()?;
    let plugins = manager.list_plugins();

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&plugins)?),
        OutputFormat::Text if plugins.is_empty() => {
            println!("No plugins loaded.");
            println!("Plugin directory: {:?}", plugin_dir);
        }
        OutputFormat::Text => {
            println!("Loaded plugins:");
            for info in plugins {
                let state = if manager.is_enabled(&info.id) {
                    "enabled"
                } else {
                    "disabled"
                };
                println!("  {} {} ({}) [{}]", info.id, info.version, info.name, state);
                if !info.description.is_empty() {
                    println!("      {}", info.description);
                }
            }
        }
    }

    Ok(())
}
