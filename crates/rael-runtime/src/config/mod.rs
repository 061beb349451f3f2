pub mod settings;

pub use settings::{PluginsConfig, RuntimeConfig, WatcherConfig, WatcherKind};
