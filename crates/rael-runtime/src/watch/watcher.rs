//! Background file watcher emitting Created / Modified / Deleted events.
//!
//! Two backends share one snapshot-and-diff core:
//! - `Poll`: the thread re-enumerates every watched path each interval.
//! - `Native`: OS notifications via `notify-debouncer-mini`; every debounced
//!   path is reconciled against the snapshot to classify the change.
//!
//! Cancellation is an explicit message on the control channel, never a sleep.

use std::collections::{HashMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, Debouncer};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{PluginError, PluginResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileChangeKind {
    Created,
    Modified,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChangeEvent {
    pub kind: FileChangeKind,
    pub path: PathBuf,
    pub timestamp: DateTime<Utc>,
}

impl FileChangeEvent {
    fn new(kind: FileChangeKind, path: PathBuf) -> Self {
        Self {
            kind,
            path,
            timestamp: Utc::now(),
        }
    }
}

/// How the background thread learns about changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchMode {
    Poll { interval: Duration },
    Native { debounce: Duration },
}

impl Default for WatchMode {
    fn default() -> Self {
        WatchMode::Poll {
            interval: Duration::from_secs(1),
        }
    }
}

/// Callback invoked on the watcher thread for every event.
pub type ChangeCallback = Arc<dyn Fn(&FileChangeEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    modified: Option<SystemTime>,
    len: u64,
}

impl FileStamp {
    fn of(path: &Path) -> Option<Self> {
        let meta = std::fs::metadata(path).ok()?;
        if !meta.is_file() {
            return None;
        }
        Some(Self {
            modified: meta.modified().ok(),
            len: meta.len(),
        })
    }
}

#[derive(Debug, Clone)]
struct WatchedPath {
    path: PathBuf,
    recursive: bool,
}

impl WatchedPath {
    fn covers(&self, path: &Path) -> bool {
        if path == self.path {
            return true;
        }
        if self.recursive {
            path.starts_with(&self.path)
        } else {
            path.parent() == Some(self.path.as_path())
        }
    }
}

#[derive(Default)]
struct WatcherState {
    watched: Vec<WatchedPath>,
    snapshot: HashMap<PathBuf, FileStamp>,
}

enum Signal {
    Stop,
    Changed(Vec<PathBuf>),
}

struct Control {
    tx: mpsc::Sender<Signal>,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct Shared {
    state: Mutex<WatcherState>,
    callbacks: Mutex<Vec<ChangeCallback>>,
    native: Mutex<Option<Debouncer<RecommendedWatcher>>>,
}

impl Shared {
    fn poll_once(&self) -> Vec<FileChangeEvent> {
        let events = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            let mut current = HashMap::new();
            for watched in &state.watched {
                scan(&watched.path, watched.recursive, &mut current);
            }
            let events = diff(&state.snapshot, &current);
            state.snapshot = current;
            events
        };
        self.dispatch(&events);
        events
    }

    fn reconcile(&self, paths: Vec<PathBuf>) -> Vec<FileChangeEvent> {
        let mut events = Vec::new();
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            let WatcherState { watched, snapshot } = &mut *state;

            for path in paths {
                let Some(root) = watched.iter().find(|w| w.covers(&path)) else {
                    continue;
                };

                if path.is_dir() {
                    let mut found = HashMap::new();
                    scan(&path, root.recursive, &mut found);
                    for (file, stamp) in found {
                        if !watched.iter().any(|w| w.covers(&file)) {
                            continue;
                        }
                        match snapshot.insert(file.clone(), stamp) {
                            None => events.push(FileChangeEvent::new(FileChangeKind::Created, file)),
                            Some(old) if old != stamp => {
                                events.push(FileChangeEvent::new(FileChangeKind::Modified, file))
                            }
                            Some(_) => {}
                        }
                    }
                    continue;
                }

                match (snapshot.get(&path).copied(), FileStamp::of(&path)) {
                    (None, Some(stamp)) => {
                        snapshot.insert(path.clone(), stamp);
                        events.push(FileChangeEvent::new(FileChangeKind::Created, path));
                    }
                    (Some(old), Some(stamp)) if old != stamp => {
                        snapshot.insert(path.clone(), stamp);
                        events.push(FileChangeEvent::new(FileChangeKind::Modified, path));
                    }
                    (Some(_), Some(_)) => {}
                    (_, None) => {
                        // A removed file, or a removed directory and everything under it
                        let gone: Vec<PathBuf> = snapshot
                            .keys()
                            .filter(|p| p.starts_with(&path))
                            .cloned()
                            .collect();
                        for p in gone {
                            snapshot.remove(&p);
                            events.push(FileChangeEvent::new(FileChangeKind::Deleted, p));
                        }
                    }
                }
            }
        }
        self.dispatch(&events);
        events
    }

    fn dispatch(&self, events: &[FileChangeEvent]) {
        if events.is_empty() {
            return;
        }
        let callbacks = self
            .callbacks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        for event in events {
            debug!(kind = ?event.kind, path = %event.path.display(), "File change detected");
            for callback in &callbacks {
                if catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
                    warn!(path = %event.path.display(), "File change callback panicked");
                }
            }
        }
    }
}

/// Watches files and directories from a single background thread.
///
/// `watch` snapshots synchronously, so only changes made afterwards are
/// reported. Dropping the watcher stops the thread.
pub struct FileWatcher {
    mode: WatchMode,
    shared: Arc<Shared>,
    control: Mutex<Option<Control>>,
    /// Thread signalled from its own callback, joined by the next `start` or `stop`
    retired: Mutex<Option<JoinHandle<()>>>,
}

impl FileWatcher {
    pub fn new(mode: WatchMode) -> Self {
        Self {
            mode,
            shared: Arc::new(Shared::default()),
            control: Mutex::new(None),
            retired: Mutex::new(None),
        }
    }

    pub fn mode(&self) -> WatchMode {
        self.mode
    }

    /// Start watching `path` and record its current contents.
    pub fn watch(&self, path: &Path, recursive: bool) -> PluginResult<()> {
        let root = path.canonicalize().map_err(|e| {
            PluginError::Watch(format!("Cannot watch {}: {}", path.display(), e))
        })?;

        {
            let mut state = self.shared.state.lock().unwrap_or_else(|e| e.into_inner());
            match state.watched.iter_mut().find(|w| w.path == root) {
                Some(existing) => existing.recursive = recursive,
                None => state.watched.push(WatchedPath {
                    path: root.clone(),
                    recursive,
                }),
            }
            let mut found = HashMap::new();
            scan(&root, recursive, &mut found);
            state.snapshot.extend(found);
        }

        if let Some(debouncer) = self
            .shared
            .native
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_mut()
        {
            debouncer.watcher().watch(&root, recursive_mode(recursive))?;
        }

        info!(path = %root.display(), recursive, "Watching path");
        Ok(())
    }

    /// Stop watching `path`. Returns whether it was watched.
    pub fn unwatch(&self, path: &Path) -> bool {
        let root = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());

        let removed = {
            let mut state = self.shared.state.lock().unwrap_or_else(|e| e.into_inner());
            let before = state.watched.len();
            state.watched.retain(|w| w.path != root);
            let removed = before != state.watched.len();
            if removed {
                let WatcherState { watched, snapshot } = &mut *state;
                snapshot.retain(|p, _| watched.iter().any(|w| w.covers(p)));
            }
            removed
        };

        if removed {
            if let Some(debouncer) = self
                .shared
                .native
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .as_mut()
            {
                let _ = debouncer.watcher().unwatch(&root);
            }
            info!(path = %root.display(), "Stopped watching path");
        }
        removed
    }

    pub fn watched_paths(&self) -> Vec<PathBuf> {
        let state = self.shared.state.lock().unwrap_or_else(|e| e.into_inner());
        state.watched.iter().map(|w| w.path.clone()).collect()
    }

    /// Register a callback. Callbacks run on the watcher thread and must not block for long.
    pub fn on_change<F>(&self, callback: F)
    where
        F: Fn(&FileChangeEvent) + Send + Sync + 'static,
    {
        self.shared
            .callbacks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Arc::new(callback));
    }

    /// Run one diff pass over every watched path on the calling thread.
    pub fn poll_once(&self) -> Vec<FileChangeEvent> {
        self.shared.poll_once()
    }

    /// Spawn the background thread. No-op if already running.
    pub fn start(&self) -> PluginResult<()> {
        let mut control = self.control.lock().unwrap_or_else(|e| e.into_inner());
        if control.is_some() {
            return Ok(());
        }
        self.join_retired();

        let (tx, rx) = mpsc::channel::<Signal>();

        if let WatchMode::Native { debounce } = self.mode {
            let fs_tx = tx.clone();
            let mut debouncer = new_debouncer(debounce, move |res: DebounceEventResult| match res {
                Ok(events) => {
                    let paths = events.into_iter().map(|e| e.path).collect();
                    let _ = fs_tx.send(Signal::Changed(paths));
                }
                Err(e) => warn!(error = ?e, "File watcher error"),
            })?;

            for watched in self.watched_snapshot() {
                debouncer
                    .watcher()
                    .watch(&watched.path, recursive_mode(watched.recursive))?;
            }
            *self.shared.native.lock().unwrap_or_else(|e| e.into_inner()) = Some(debouncer);
        }

        let shared = self.shared.clone();
        let mode = self.mode;
        let handle = thread::Builder::new()
            .name("rael-file-watcher".into())
            .spawn(move || run_loop(shared, mode, rx));

        let handle = match handle {
            Ok(handle) => handle,
            Err(e) => {
                self.shared.native.lock().unwrap_or_else(|e| e.into_inner()).take();
                return Err(e.into());
            }
        };

        info!(mode = ?self.mode, "File watcher started");
        *control = Some(Control { tx, handle });
        Ok(())
    }

    /// Stop the background thread and wait for it to exit.
    ///
    /// When called from the watcher thread itself (a callback tearing down its
    /// owner), the thread is signalled and joined by the next `start` or `stop`.
    pub fn stop(&self) {
        let control = self
            .control
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();

        if let Some(Control { tx, handle }) = control {
            let _ = tx.send(Signal::Stop);
            if handle.thread().id() == thread::current().id() {
                debug!("File watcher stop requested from its own thread");
                *self.retired.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
            } else if handle.join().is_err() {
                warn!("File watcher thread panicked");
            }
            info!("File watcher stopped");
        }
        self.join_retired();

        self.shared
            .native
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
    }

    pub fn is_running(&self) -> bool {
        self.control
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Wait for a thread stopped from its own callback. Skipped on that thread,
    /// which exits once the callback returns.
    fn join_retired(&self) {
        let mut retired = self.retired.lock().unwrap_or_else(|e| e.into_inner());
        let own_thread = retired
            .as_ref()
            .is_some_and(|h| h.thread().id() == thread::current().id());
        if own_thread {
            return;
        }
        if let Some(handle) = retired.take() {
            if handle.join().is_err() {
                warn!("File watcher thread panicked");
            }
        }
    }

    fn watched_snapshot(&self) -> Vec<WatchedPath> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .watched
            .clone()
    }
}

impl Default for FileWatcher {
    fn default() -> Self {
        Self::new(WatchMode::default())
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for FileWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileWatcher")
            .field("mode", &self.mode)
            .field("running", &self.is_running())
            .finish()
    }
}

fn run_loop(shared: Arc<Shared>, mode: WatchMode, rx: mpsc::Receiver<Signal>) {
    loop {
        let signal = match mode {
            WatchMode::Poll { interval } => match rx.recv_timeout(interval) {
                Ok(signal) => signal,
                Err(RecvTimeoutError::Timeout) => {
                    shared.poll_once();
                    continue;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            },
            WatchMode::Native { .. } => match rx.recv() {
                Ok(signal) => signal,
                Err(_) => break,
            },
        };

        match signal {
            Signal::Stop => break,
            Signal::Changed(paths) => {
                shared.reconcile(paths);
            }
        }
    }
}

fn recursive_mode(recursive: bool) -> RecursiveMode {
    if recursive {
        RecursiveMode::Recursive
    } else {
        RecursiveMode::NonRecursive
    }
}

/// Record every regular file under `root` into `out`.
fn scan(root: &Path, recursive: bool, out: &mut HashMap<PathBuf, FileStamp>) {
    if let Some(stamp) = FileStamp::of(root) {
        out.insert(root.to_path_buf(), stamp);
        return;
    }
    let mut visited = HashSet::new();
    scan_dir(root, recursive, out, &mut visited);
}

fn scan_dir(
    dir: &Path,
    recursive: bool,
    out: &mut HashMap<PathBuf, FileStamp>,
    visited: &mut HashSet<PathBuf>,
) {
    // Symlink loop protection
    if let Ok(canonical) = dir.canonicalize() {
        if !visited.insert(canonical) {
            return;
        }
    }

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!(path = %dir.display(), error = %e, "Skipping unreadable directory");
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            if recursive {
                scan_dir(&path, recursive, out, visited);
            }
        } else if let Some(stamp) = FileStamp::of(&path) {
            out.insert(path, stamp);
        }
    }
}

fn diff(
    before: &HashMap<PathBuf, FileStamp>,
    after: &HashMap<PathBuf, FileStamp>,
) -> Vec<FileChangeEvent> {
    let mut events = Vec::new();
    for (path, stamp) in after {
        match before.get(path) {
            None => events.push(FileChangeEvent::new(FileChangeKind::Created, path.clone())),
            Some(old) if old != stamp => {
                events.push(FileChangeEvent::new(FileChangeKind::Modified, path.clone()))
            }
            Some(_) => {}
        }
    }
    for path in before.keys() {
        if !after.contains_key(path) {
            events.push(FileChangeEvent::new(FileChangeKind::Deleted, path.clone()));
        }
    }
    events.sort_by(|a, b| a.path.cmp(&b.path));
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(events: &[FileChangeEvent]) -> Vec<(FileChangeKind, String)> {
        events
            .iter()
            .map(|e| {
                (
                    e.kind,
                    e.path.file_name().unwrap().to_string_lossy().to_string(),
                )
            })
            .collect()
    }

    #[test]
    fn test_single_created_between_ticks() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("existing.so"), b"old").unwrap();

        let watcher = FileWatcher::default();
        watcher.watch(dir.path(), false).unwrap();
        assert!(watcher.poll_once().is_empty());

        std::fs::write(dir.path().join("alpha.so"), b"new").unwrap();
        let events = watcher.poll_once();
        assert_eq!(names(&events), vec![(FileChangeKind::Created, "alpha.so".to_string())]);

        assert!(watcher.poll_once().is_empty());
    }

    #[test]
    fn test_modified_and_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.json");
        let b = dir.path().join("b.json");
        std::fs::write(&a, b"{}").unwrap();
        std::fs::write(&b, b"{}").unwrap();

        let watcher = FileWatcher::default();
        watcher.watch(dir.path(), false).unwrap();

        // Length change is detected even with coarse mtime resolution
        std::fs::write(&a, br#"{"k":"v"}"#).unwrap();
        std::fs::remove_file(&b).unwrap();

        let events = watcher.poll_once();
        assert_eq!(
            names(&events),
            vec![
                (FileChangeKind::Modified, "a.json".to_string()),
                (FileChangeKind::Deleted, "b.json".to_string()),
            ]
        );
    }

    #[test]
    fn test_recursive_flag() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("nested");
        std::fs::create_dir(&nested).unwrap();

        let flat = FileWatcher::default();
        flat.watch(dir.path(), false).unwrap();
        let deep = FileWatcher::default();
        deep.watch(dir.path(), true).unwrap();

        std::fs::write(nested.join("inner.so"), b"x").unwrap();

        assert!(flat.poll_once().is_empty());
        assert_eq!(
            names(&deep.poll_once()),
            vec![(FileChangeKind::Created, "inner.so".to_string())]
        );
    }

    #[test]
    fn test_callbacks_receive_events() {
        let dir = tempfile::tempdir().unwrap();
        let watcher = FileWatcher::default();
        watcher.watch(dir.path(), false).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        watcher.on_change(move |event| sink.lock().unwrap().push(event.kind));
        watcher.on_change(|_| panic!("bad callback"));

        std::fs::write(dir.path().join("x.so"), b"x").unwrap();
        watcher.poll_once();

        assert_eq!(*seen.lock().unwrap(), vec![FileChangeKind::Created]);
    }

    #[test]
    fn test_unwatch_stops_reporting() {
        let dir = tempfile::tempdir().unwrap();
        let watcher = FileWatcher::default();
        watcher.watch(dir.path(), false).unwrap();
        assert_eq!(watcher.watched_paths().len(), 1);

        assert!(watcher.unwatch(dir.path()));
        assert!(!watcher.unwatch(dir.path()));

        std::fs::write(dir.path().join("late.so"), b"x").unwrap();
        assert!(watcher.poll_once().is_empty());
    }

    #[test]
    fn test_watch_missing_path_fails() {
        let watcher = FileWatcher::default();
        let result = watcher.watch(Path::new("/nonexistent/rael/plugins"), true);
        assert!(matches!(result, Err(PluginError::Watch(_))));
    }

    #[test]
    fn test_reconcile_classifies_paths() {
        let dir = tempfile::tempdir().unwrap();
        let watcher = FileWatcher::default();
        watcher.watch(dir.path(), false).unwrap();
        let root = dir.path().canonicalize().unwrap();

        let file = root.join("beta.so");
        std::fs::write(&file, b"v1").unwrap();
        let created = watcher.shared.reconcile(vec![file.clone()]);
        assert_eq!(names(&created), vec![(FileChangeKind::Created, "beta.so".to_string())]);

        std::fs::write(&file, b"version-2").unwrap();
        let modified = watcher.shared.reconcile(vec![file.clone()]);
        assert_eq!(names(&modified), vec![(FileChangeKind::Modified, "beta.so".to_string())]);

        std::fs::remove_file(&file).unwrap();
        let deleted = watcher.shared.reconcile(vec![file.clone()]);
        assert_eq!(names(&deleted), vec![(FileChangeKind::Deleted, "beta.so".to_string())]);

        // Outside every watched root
        let stray = tempfile::tempdir().unwrap();
        let outside = stray.path().join("x.so");
        std::fs::write(&outside, b"x").unwrap();
        assert!(watcher.shared.reconcile(vec![outside]).is_empty());
    }

    #[test]
    fn test_background_poll_thread() {
        let dir = tempfile::tempdir().unwrap();
        let watcher = FileWatcher::new(WatchMode::Poll {
            interval: Duration::from_millis(20),
        });
        watcher.watch(dir.path(), false).unwrap();

        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        watcher.on_change(move |event| {
            let _ = tx.lock().unwrap().send(event.clone());
        });

        watcher.start().unwrap();
        assert!(watcher.is_running());

        std::fs::write(dir.path().join("gamma.so"), b"x").unwrap();
        let event = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(event.kind, FileChangeKind::Created);

        watcher.stop();
        assert!(!watcher.is_running());
        // Idempotent
        watcher.stop();
    }

    #[test]
    fn test_restart_after_stop_from_callback() {
        let dir = tempfile::tempdir().unwrap();
        let watcher = Arc::new(FileWatcher::new(WatchMode::Poll {
            interval: Duration::from_millis(20),
        }));
        watcher.watch(dir.path(), false).unwrap();

        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        let owner = Arc::downgrade(&watcher);
        watcher.on_change(move |event| {
            if let Some(watcher) = owner.upgrade() {
                watcher.stop();
            }
            let _ = tx.lock().unwrap().send(event.path.clone());
        });

        watcher.start().unwrap();
        std::fs::write(dir.path().join("first.so"), b"x").unwrap();
        let first = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(first.ends_with("first.so"));
        assert!(!watcher.is_running());

        // The stopped thread is joined before a new one starts
        watcher.start().unwrap();
        assert!(watcher.is_running());
        assert!(watcher.retired.lock().unwrap().is_none());

        std::fs::write(dir.path().join("second.so"), b"x").unwrap();
        let second = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(second.ends_with("second.so"));
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    }
}
