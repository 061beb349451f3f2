//! Instrumented in-process module loader shared by the integration tests.
//!
//! Libraries are plain files on disk; their stem selects a registered
//! `Blueprint` describing the plugin the "library" produces.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::ffi::c_void;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rael_runtime::plugin::abi::{drop_raw_instance, into_raw_instance, EntryPoints};
use rael_runtime::{
    ConfigMap, HookPriority, ModuleLoader, NativeModule, Plugin, PluginContext, PluginError,
    PluginInfo, PluginResult, RuntimeConfig, ABI_VERSION,
};

thread_local! {
    // Handed from `entry_points` to `create_pending` on the loading thread
    static PENDING: RefCell<Option<Box<dyn Plugin>>> = const { RefCell::new(None) };
}

extern "C" fn create_pending() -> *mut c_void {
    match PENDING.with(|p| p.borrow_mut().take()) {
        Some(plugin) => into_raw_instance(plugin),
        None => std::ptr::null_mut(),
    }
}

extern "C" fn destroy_instance(raw: *mut c_void) {
    unsafe { drop_raw_instance(raw) }
}

#[derive(Default)]
pub struct Counters {
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    pub created: AtomicUsize,
    pub dropped: AtomicUsize,
    pub initialized: AtomicUsize,
    pub shutdowns: AtomicUsize,
    pub enables: AtomicUsize,
    pub disables: AtomicUsize,
    pub last_config: Mutex<Option<ConfigMap>>,
}

impl Counters {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Behavior {
    #[default]
    Normal,
    /// Registers an enable-hook handler and provides `<id>.svc`, then
    /// returns false from `initialize`
    FailInit,
    PanicInit,
    /// Calls back into the manager from `initialize`
    Reentrant,
    NullInstance,
    /// Provides `<id>.svc` (its version string) and an enable-hook handler;
    /// `shutdown` unregisters the service by name through the raw registry
    Serving,
}

#[derive(Debug, Clone)]
pub struct Blueprint {
    pub info: PluginInfo,
    pub behavior: Behavior,
    pub abi_version: u32,
    pub missing_symbol: bool,
}

impl Blueprint {
    pub fn new(id: &str, version: &str) -> Self {
        Self {
            info: PluginInfo::new(id, id.to_uppercase(), version),
            behavior: Behavior::Normal,
            abi_version: ABI_VERSION,
            missing_symbol: false,
        }
    }

    pub fn depends_on(mut self, id: &str) -> Self {
        self.info = self.info.with_dependency(id);
        self
    }

    pub fn behaving(mut self, behavior: Behavior) -> Self {
        self.behavior = behavior;
        self
    }
}

pub struct TestPlugin {
    info: PluginInfo,
    behavior: Behavior,
    counters: Arc<Counters>,
    ready: AtomicBool,
    ctx: Mutex<Option<PluginContext>>,
}

impl TestPlugin {
    fn new(blueprint: &Blueprint, counters: Arc<Counters>) -> Self {
        counters.created.fetch_add(1, Ordering::SeqCst);
        Self {
            info: blueprint.info.clone(),
            behavior: blueprint.behavior,
            counters,
            ready: AtomicBool::new(false),
            ctx: Mutex::new(None),
        }
    }

    fn context(&self) -> Option<PluginContext> {
        self.ctx.lock().unwrap().clone()
    }

    fn service_name(&self) -> String {
        format!("{}.svc", self.info.id)
    }
}

impl Plugin for TestPlugin {
    fn info(&self) -> PluginInfo {
        self.info.clone()
    }

    fn initialize(&self) -> bool {
        match self.behavior {
            Behavior::FailInit => {
                if let Some(ctx) = self.context() {
                    ctx.provide_service(&self.service_name(), Arc::new(self.info.version.clone()));
                    if let Some(manager) = ctx.manager() {
                        manager
                            .on_enable()
                            .add(|_: &str| true, HookPriority::Normal, &self.info.id);
                    }
                }
                return false;
            }
            Behavior::Serving => {
                let ctx = self.context().expect("context attached before initialize");
                ctx.provide_service(&self.service_name(), Arc::new(self.info.version.clone()));
                if let Some(manager) = ctx.manager() {
                    manager
                        .on_enable()
                        .add(|_: &str| true, HookPriority::Normal, &self.info.id);
                }
            }
            Behavior::PanicInit => panic!("initialize exploded"),
            Behavior::Reentrant => {
                let ctx = self.context().expect("context attached before initialize");
                let manager = ctx.manager().expect("manager alive during load");
                let _ = manager.list_plugins();
                let _ = manager.is_loaded(&self.info.id);
                ctx.provide_service("reentrant.marker", Arc::new(self.info.id.clone()));
                manager
                    .on_enable()
                    .add(|_: &str| true, HookPriority::Normal, &self.info.id);
            }
            Behavior::Normal | Behavior::NullInstance => {}
        }
        self.counters.initialized.fetch_add(1, Ordering::SeqCst);
        self.ready.store(true, Ordering::SeqCst);
        true
    }

    fn shutdown(&self) {
        if self.behavior == Behavior::Serving {
            if let Some(manager) = self.context().and_then(|c| c.manager()) {
                manager.services().unregister_service(&self.service_name());
            }
        }
        self.counters.shutdowns.fetch_add(1, Ordering::SeqCst);
        self.ready.store(false, Ordering::SeqCst);
    }

    fn is_initialized(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn attach_context(&self, ctx: PluginContext) {
        *self.ctx.lock().unwrap() = Some(ctx);
    }

    fn on_enable(&self) {
        self.counters.enables.fetch_add(1, Ordering::SeqCst);
    }

    fn on_disable(&self) {
        self.counters.disables.fetch_add(1, Ordering::SeqCst);
    }

    fn on_config_change(&self, config: &ConfigMap) {
        *self.counters.last_config.lock().unwrap() = Some(config.clone());
    }
}

impl Drop for TestPlugin {
    fn drop(&mut self) {
        self.counters.dropped.fetch_add(1, Ordering::SeqCst);
    }
}

struct FakeModule {
    path: PathBuf,
    blueprint: Blueprint,
    counters: Arc<Counters>,
}

impl NativeModule for FakeModule {
    fn path(&self) -> &Path {
        &self.path
    }

    fn abi_version(&self) -> PluginResult<u32> {
        Ok(self.blueprint.abi_version)
    }

    fn entry_points(&self) -> PluginResult<EntryPoints> {
        if self.blueprint.missing_symbol {
            return Err(PluginError::SymbolMissing {
                path: self.path.clone(),
                symbol: "destroy_plugin".into(),
            });
        }
        if self.blueprint.behavior != Behavior::NullInstance {
            let plugin = TestPlugin::new(&self.blueprint, self.counters.clone());
            PENDING.with(|p| *p.borrow_mut() = Some(Box::new(plugin)));
        }
        Ok(EntryPoints {
            create: create_pending,
            destroy: destroy_instance,
        })
    }
}

impl Drop for FakeModule {
    fn drop(&mut self) {
        self.counters.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Loader that "opens" any file whose stem has a registered blueprint.
#[derive(Default)]
pub struct FakeLoader {
    blueprints: Mutex<HashMap<String, Blueprint>>,
    pub counters: Arc<Counters>,
}

impl FakeLoader {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register(&self, stem: &str, blueprint: Blueprint) {
        self.blueprints
            .lock()
            .unwrap()
            .insert(stem.to_string(), blueprint);
    }

    pub fn opened(&self) -> usize {
        Counters::get(&self.counters.opened)
    }

    pub fn closed(&self) -> usize {
        Counters::get(&self.counters.closed)
    }

    /// Every opened module was closed and every created instance destroyed.
    pub fn assert_no_leaks(&self) {
        assert_eq!(self.opened(), self.closed(), "module handles leaked");
        assert_eq!(
            Counters::get(&self.counters.created),
            Counters::get(&self.counters.dropped),
            "plugin instances leaked"
        );
    }
}

impl ModuleLoader for FakeLoader {
    fn open(&self, path: &Path) -> PluginResult<Box<dyn NativeModule>> {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        let blueprint = self
            .blueprints
            .lock()
            .unwrap()
            .get(&stem)
            .cloned()
            .ok_or_else(|| PluginError::OpenFailure {
                path: path.to_path_buf(),
                reason: "no such library".into(),
            })?;

        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeModule {
            path: path.to_path_buf(),
            blueprint,
            counters: self.counters.clone(),
        }))
    }
}

/// Config rooted in `dir`, with auto-load on and hot reload off.
pub fn test_config(dir: &Path) -> RuntimeConfig {
    let mut config = RuntimeConfig::default();
    config.plugins.directory = dir.to_path_buf();
    config.plugins.config_directory = dir.join("config");
    config.plugins.data_root = dir.join("data");
    config.plugins.hot_reload = false;
    config
}

/// Write a placeholder library file.
pub fn write_library(dir: &Path, file_name: &str, content: &[u8]) -> PathBuf {
    let path = dir.join(file_name);
    std::fs::write(&path, content).unwrap();
    path
}

pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    condition()
}
