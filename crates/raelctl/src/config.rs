use anyhow::Result;
use rael_runtime::RuntimeConfig;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "rael.toml";

/// Load config from `path`, else `./rael.toml` if present, else defaults.
/// `~` in configured paths is expanded.
pub fn load_config(path: Option<&Path>) -> Result<RuntimeConfig> {
    let default_path = Path::new(DEFAULT_CONFIG_FILE);
    let mut config = match path {
        Some(path) => RuntimeConfig::load(path)?,
        None if default_path.exists() => RuntimeConfig::load(default_path)?,
        None => RuntimeConfig::default(),
    };

    config.plugins.directory = expand(&config.plugins.directory);
    config.plugins.config_directory = expand(&config.plugins.config_directory);
    config.plugins.data_root = expand(&config.plugins.data_root);
    Ok(config)
}

fn expand(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_explicit_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rael.toml");
        std::fs::write(
            &path,
            "[plugins]\ndirectory = \"/srv/plugins\"\ndisabled = [\"legacy\"]\n",
        )
        .unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.plugins.directory, PathBuf::from("/srv/plugins"));
        assert_eq!(config.plugins.disabled, vec!["legacy".to_string()]);
    }

    #[test]
    fn test_invalid_config_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rael.toml");
        std::fs::write(&path, "[plugins\n").unwrap();
        assert!(load_config(Some(&path)).is_err());
    }

    #[test]
    fn test_expand_leaves_plain_paths() {
        assert_eq!(expand(Path::new("/opt/rael")), PathBuf::from("/opt/rael"));
        assert_eq!(expand(Path::new("./plugins")), PathBuf::from("./plugins"));
    }

    #[test]
    fn test_expand_tilde() {
        if std::env::var("HOME").is_ok() {
            assert!(!expand(Path::new("~/.rael/plugins")).starts_with("~"));
        }
    }
}
