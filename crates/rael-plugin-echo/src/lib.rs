//! Sample plugin: publishes an [`EchoService`] and logs every plugin load.
//!
//! Build with `cargo build -p rael-plugin-echo` and copy the resulting
//! `librael_plugin_echo.{so,dylib}` / `rael_plugin_echo.dll` into the plugin
//! directory.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use rael_plugin_sdk::{
    declare_plugin, ConfigMap, HookPriority, LoadEvent, Plugin, PluginContext, PluginInfo,
};

pub const PLUGIN_ID: &str = "echo";
pub const SERVICE_NAME: &str = "echo.service";

/// Echoes text back with a configurable prefix.
#[derive(Debug)]
pub struct EchoService {
    prefix: RwLock<String>,
    calls: AtomicUsize,
}

impl EchoService {
    fn new(prefix: &str) -> Self {
        Self {
            prefix: RwLock::new(prefix.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn echo(&self, text: &str) -> String {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let prefix = self.prefix.read().unwrap_or_else(|e| e.into_inner());
        format!("{}{}", prefix, text)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    fn set_prefix(&self, prefix: &str) {
        *self.prefix.write().unwrap_or_else(|e| e.into_inner()) = prefix.to_string();
    }
}

#[derive(Default)]
pub struct EchoPlugin {
    ctx: Mutex<Option<PluginContext>>,
    service: Mutex<Option<Arc<EchoService>>>,
    initialized: AtomicBool,
    enabled: AtomicBool,
}

impl EchoPlugin {
    fn context(&self) -> Option<PluginContext> {
        self.ctx.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Plugin for EchoPlugin {
    fn info(&self) -> PluginInfo {
        PluginInfo::new(PLUGIN_ID, "Echo", env!("CARGO_PKG_VERSION"))
            .with_author("RAEL")
            .with_description("Echo service and load logger")
            .with_metadata("service", SERVICE_NAME)
    }

    fn attach_context(&self, ctx: PluginContext) {
        *self.ctx.lock().unwrap_or_else(|e| e.into_inner()) = Some(ctx);
    }

    fn initialize(&self) -> bool {
        let Some(ctx) = self.context() else {
            return false;
        };

        let service = Arc::new(EchoService::new(&ctx.get_config_value("prefix", "echo: ")));
        if !ctx.provide_service(SERVICE_NAME, service.clone()) {
            return false;
        }
        *self.service.lock().unwrap_or_else(|e| e.into_inner()) = Some(service);

        if let Some(manager) = ctx.manager() {
            let logger = ctx.clone();
            manager.on_load().add(
                move |event: &LoadEvent| {
                    if event.success {
                        logger.info(&format!("plugin loaded: {}", event.plugin_id));
                    } else {
                        logger.warn(&format!("plugin failed to load: {}", event.plugin_id));
                    }
                    true
                },
                HookPriority::Monitor,
                PLUGIN_ID,
            );
        }

        self.initialized.store(true, Ordering::SeqCst);
        self.enabled.store(true, Ordering::SeqCst);
        ctx.info("initialized");
        true
    }

    fn shutdown(&self) {
        if let Some(ctx) = self.context() {
            ctx.withdraw_service(SERVICE_NAME);
            ctx.info("shut down");
        }
        self.service.lock().unwrap_or_else(|e| e.into_inner()).take();
        self.initialized.store(false, Ordering::SeqCst);
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    fn on_enable(&self) {
        self.enabled.store(true, Ordering::SeqCst);
    }

    fn on_disable(&self) {
        self.enabled.store(false, Ordering::SeqCst);
    }

    fn on_config_change(&self, config: &ConfigMap) {
        if let (Some(prefix), Some(service)) = (
            config.get("prefix"),
            self.service.lock().unwrap_or_else(|e| e.into_inner()).as_ref(),
        ) {
            service.set_prefix(prefix);
        }
    }
}

declare_plugin!(EchoPlugin);
