//! Host configuration (`rael.toml`).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::watch::WatchMode;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub plugins: PluginsConfig,

    #[serde(default)]
    pub watcher: WatcherConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PluginsConfig {
    /// Flat directory of plugin libraries
    #[serde(default = "default_directory")]
    pub directory: PathBuf,

    /// Directory of per-plugin `<id>.json` / `<id>.yaml` files watched by hot reload
    #[serde(default = "default_config_directory")]
    pub config_directory: PathBuf,

    /// Root of per-plugin `data` and `config` directories
    #[serde(default = "default_data_root")]
    pub data_root: PathBuf,

    #[serde(default = "default_true")]
    pub auto_load: bool,

    #[serde(default = "default_true")]
    pub hot_reload: bool,

    /// Library stems skipped by `load_all` and hot reload
    #[serde(default)]
    pub disabled: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WatcherKind {
    #[default]
    Poll,
    Native,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct WatcherConfig {
    #[serde(default)]
    pub mode: WatcherKind,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_debounce")]
    pub debounce_ms: u64,
}

fn default_directory() -> PathBuf {
    PathBuf::from("./plugins")
}

fn default_config_directory() -> PathBuf {
    PathBuf::from("./plugins/config")
}

fn default_data_root() -> PathBuf {
    match std::env::var("HOME") {
        Ok(home) => PathBuf::from(home).join(".rael").join("plugins"),
        Err(_) => PathBuf::from(".rael").join("plugins"),
    }
}

fn default_true() -> bool {
    true
}

fn default_poll_interval() -> u64 {
    1000
}

fn default_debounce() -> u64 {
    500
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            directory: default_directory(),
            config_directory: default_config_directory(),
            data_root: default_data_root(),
            auto_load: default_true(),
            hot_reload: default_true(),
            disabled: Vec::new(),
        }
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            mode: WatcherKind::default(),
            poll_interval_ms: default_poll_interval(),
            debounce_ms: default_debounce(),
        }
    }
}

impl WatcherConfig {
    pub fn watch_mode(&self) -> WatchMode {
        match self.mode {
            WatcherKind::Poll => WatchMode::Poll {
                interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            },
            WatcherKind::Native => WatchMode::Native {
                debounce: Duration::from_millis(self.debounce_ms),
            },
        }
    }
}

impl PluginsConfig {
    pub fn is_disabled(&self, stem: &str) -> bool {
        self.disabled.iter().any(|d| d == stem)
    }
}

impl RuntimeConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse runtime config")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = RuntimeConfig::from_toml_str("").unwrap();
        assert_eq!(config.plugins.directory, PathBuf::from("./plugins"));
        assert!(config.plugins.auto_load);
        assert!(config.plugins.hot_reload);
        assert!(config.plugins.data_root.ends_with(".rael/plugins"));
        assert_eq!(
            config.watcher.watch_mode(),
            WatchMode::Poll {
                interval: Duration::from_millis(1000)
            }
        );
    }

    #[test]
    fn test_full_config() {
        let config = RuntimeConfig::from_toml_str(
            r#"
[plugins]
directory = "/opt/rael/plugins"
config_directory = "/etc/rael/plugins"
data_root = "/var/lib/rael"
auto_load = false
hot_reload = false
disabled = ["legacy"]

[watcher]
mode = "native"
debounce_ms = 250
"#,
        )
        .unwrap();

        assert_eq!(config.plugins.directory, PathBuf::from("/opt/rael/plugins"));
        assert!(!config.plugins.auto_load);
        assert!(config.plugins.is_disabled("legacy"));
        assert!(!config.plugins.is_disabled("alpha"));
        assert_eq!(config.watcher.poll_interval_ms, 1000);
        assert_eq!(
            config.watcher.watch_mode(),
            WatchMode::Native {
                debounce: Duration::from_millis(250)
            }
        );
    }

    #[test]
    fn test_invalid_mode_rejected() {
        assert!(RuntimeConfig::from_toml_str("[watcher]\nmode = \"inotify\"\n").is_err());
    }

    #[test]
    fn test_load_missing_file_has_context() {
        let err = RuntimeConfig::load(Path::new("/nonexistent/rael.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/rael.toml"));
    }
}
