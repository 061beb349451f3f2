pub mod reloader;
pub mod watcher;

pub use reloader::{parse_config_file, HotReloader, ReloadCallback, ReloadTarget};
pub use watcher::{ChangeCallback, FileChangeEvent, FileChangeKind, FileWatcher, WatchMode};
