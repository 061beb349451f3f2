use anyhow::Result;
use std::path::Path;

const DEFAULT_CONFIG: &str = r#"# RAEL plugin host configuration

[plugins]
directory = "./plugins"
config_directory = "./plugins/config"
data_root = "~/.rael/plugins"
auto_load = true
hot_reload = true
disabled = []

[watcher]
# "poll" or "native"
mode = "poll"
poll_interval_ms = 1000
debounce_ms = 500
"#;

/// Initialize a new config file
pub fn run_init(path: &Path) -> Result<()> {
    if path.exists() {
        anyhow::bail!("Config already exists at {:?}", path);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, DEFAULT_CONFIG)?;
    println!("Created config at {:?}", path);
    Ok(())
}
